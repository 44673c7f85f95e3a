use std::collections::{BTreeMap, VecDeque};

use drm::control::crtc;
use tracing::{debug, instrument, trace};

use crate::error::PlanError;
use crate::framebuffer::ImportFramebuffer;
use crate::layer::{Layer, LayerKey};
use crate::oracle::{FeasibilityOracle, PlaneBinding};
use crate::plan::{Accumulator, CompositionPlan, EntryBuilder};
use crate::plane::{PlaneInfo, PlanePools};
use crate::planner::{PlanStrategy, ProvisionedFrame};

/// The feasibility-probing plane assignment strategy.
///
/// Claims one primary plane, extracts the top-most cursor layer for a
/// dedicated cursor plane, and distributes the remaining layers across
/// overlay planes back-to-front. Every candidate binding is validated with
/// a cumulative test commit; an infeasible candidate is folded into the
/// currently accumulating plane's pre-composited group instead of failing
/// the frame. The only hard failures are a missing crtc-capable primary
/// plane and a layer set with no non-cursor layer.
#[derive(Debug, Default, Clone, Copy)]
pub struct CapabilityPlanner;

impl PlanStrategy for CapabilityPlanner {
    #[instrument(level = "debug", skip_all, fields(crtc = ?crtc, layers = layers.len()))]
    #[profiling::function]
    fn provision(
        &self,
        layers: &BTreeMap<LayerKey, Layer>,
        crtc: crtc::Handle,
        mut pools: PlanePools,
        oracle: &mut dyn FeasibilityOracle,
        importer: &mut dyn ImportFramebuffer,
    ) -> Result<ProvisionedFrame, PlanError> {
        let Some(primary) = pools.primary.pop_usable(crtc) else {
            debug!("no crtc-capable primary plane");
            return Err(PlanError::NoUsableConfiguration(crtc));
        };

        // the top-most cursor-flagged layer gets separate handling
        let cursor = layers
            .iter()
            .rev()
            .find(|(_, layer)| layer.is_cursor)
            .map(|(key, layer)| (*key, layer));
        let cursor_key = cursor.map(|(key, _)| key);

        let mut pending: VecDeque<(LayerKey, &Layer)> = layers
            .iter()
            .filter(|(key, _)| Some(**key) != cursor_key)
            .map(|(key, layer)| (*key, layer))
            .collect();

        // the primary needs at least one non-cursor layer
        let Some((first_key, first_layer)) = pending.pop_front() else {
            debug!("no non-cursor layer for the primary plane");
            return Err(PlanError::NoUsableConfiguration(crtc));
        };

        let mut committed: Vec<PlaneBinding> = Vec::new();
        let mut finished: Vec<EntryBuilder> = Vec::new();
        let mut accumulator = Accumulator::default();

        // bind the bottom-most layer to the primary; an infeasible probe
        // forces pre-composition for its entry but planning continues
        // optimistically for the rest
        let mut builder = EntryBuilder::new(primary, first_key);
        match try_bind(
            &builder.plane,
            crtc,
            first_key,
            first_layer,
            &committed,
            oracle,
            importer,
        ) {
            Some(binding) => committed.push(binding),
            None => builder.forced = true,
        }
        accumulator.advance(builder, &mut finished);

        // overlay sweep: feasible layers claim the candidate overlay and it
        // becomes the accumulating plane, infeasible ones fold into the
        // current group and the candidate is retried for the next layer
        let mut candidate = pools.overlay.pop_usable(crtc);
        for (key, layer) in pending {
            match candidate.take() {
                Some(overlay) => {
                    match try_bind(&overlay, crtc, key, layer, &committed, oracle, importer) {
                        Some(binding) => {
                            committed.push(binding);
                            accumulator.advance(EntryBuilder::new(overlay, key), &mut finished);
                            candidate = pools.overlay.pop_usable(crtc);
                        }
                        None => {
                            candidate = Some(overlay);
                            fold(&mut accumulator, &mut finished, key);
                        }
                    }
                }
                None => fold(&mut accumulator, &mut finished, key),
            }
        }
        if let Some(overlay) = candidate {
            pools.overlay.restore(overlay);
        }

        // cursor: probe a dedicated plane in front of everything committed;
        // on failure the plane goes back to its pool and the cursor layer
        // folds into the primary's group, it is never dropped
        let mut cursor_entry = None;
        if let Some((key, layer)) = cursor {
            match pools.cursor.pop_usable(crtc) {
                Some(plane) => {
                    match try_bind(&plane, crtc, key, layer, &committed, oracle, importer) {
                        Some(binding) => {
                            committed.push(binding);
                            cursor_entry = Some(EntryBuilder::new(plane, key));
                        }
                        None => {
                            trace!(cursor = %key, "cursor plane infeasible, folding into primary");
                            pools.cursor.restore(plane);
                            fold_into_primary(&mut accumulator, &mut finished, key);
                        }
                    }
                }
                None => {
                    trace!(cursor = %key, "no crtc-capable cursor plane, folding into primary");
                    fold_into_primary(&mut accumulator, &mut finished, key);
                }
            }
        }

        accumulator.flush(&mut finished);
        if let Some(builder) = cursor_entry {
            finished.push(builder);
        }

        let plan = CompositionPlan {
            entries: finished
                .into_iter()
                .map(|builder| builder.finish(crtc))
                .collect(),
        };
        debug!(entries = plan.len(), "provisioned frame");

        Ok(ProvisionedFrame {
            plan,
            unclaimed: pools,
            unassigned: Vec::new(),
        })
    }
}

/// Append an infeasible layer to the currently accumulating group
fn fold(accumulator: &mut Accumulator, finished: &mut [EntryBuilder], key: LayerKey) {
    if let Some(current) = accumulator.current_mut() {
        current.push(key);
    } else if let Some(last) = finished.last_mut() {
        last.push(key);
    }
}

/// Append the cursor layer to the primary plane's group, whether that
/// builder is still accumulating or already finished
fn fold_into_primary(accumulator: &mut Accumulator, finished: &mut [EntryBuilder], key: LayerKey) {
    if let Some(first) = finished.first_mut() {
        first.push(key);
    } else if let Some(current) = accumulator.current_mut() {
        current.push(key);
    }
}

/// Probe one candidate (plane, layer) binding.
///
/// Three independent conditions force pre-composition for the candidate:
/// the plane's hardware cannot composite the layer, no framebuffer object
/// can be created for the buffer, or the cumulative test commit including
/// all previously committed bindings is rejected. `None` means "fold this
/// layer into the current group", never a hard error.
#[profiling::function]
fn try_bind(
    plane: &PlaneInfo,
    crtc: crtc::Handle,
    key: LayerKey,
    layer: &Layer,
    committed: &[PlaneBinding],
    oracle: &mut dyn FeasibilityOracle,
    importer: &mut dyn ImportFramebuffer,
) -> Option<PlaneBinding> {
    if !plane.can_composite(layer) {
        trace!(layer = %key, plane = ?plane.handle, "plane cannot composite layer");
        return None;
    }

    let fb = match importer.framebuffer(key, layer, plane.type_) {
        Ok(fb) => fb,
        Err(err) => {
            debug!(layer = %key, ?err, "failed to create framebuffer for layer");
            return None;
        }
    };

    let binding = PlaneBinding {
        plane: plane.handle,
        fb,
        src: layer.src,
        dst: layer.dst,
        alpha: layer.alpha,
    };

    let mut bindings = committed.to_vec();
    bindings.push(binding);
    match oracle.test_commit(crtc, &bindings) {
        Ok(()) => Some(binding),
        Err(err) => {
            trace!(layer = %key, plane = ?plane.handle, ?err, "test commit rejected candidate");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use drm_fourcc::DrmFourcc;
    use smallvec::smallvec;

    use super::*;
    use crate::plan::{PlanEntry, PlanEntryKind};
    use crate::planner::harness::*;

    fn keys(entry: &PlanEntry) -> Vec<u64> {
        entry.sources.iter().map(|key| key.0).collect()
    }

    #[test]
    fn three_layers_all_direct() {
        let layers = layers(2, true);
        let mut oracle = ScriptedOracle::default();
        let mut importer = MockImporter::default();

        let frame = CapabilityPlanner
            .provision(&layers, crtc_handle(), pools(1, 1), &mut oracle, &mut importer)
            .unwrap();

        let entries = &frame.plan.entries;
        assert_eq!(3, entries.len());
        assert_eq!(PlanEntryKind::Direct, entries[0].kind);
        assert_eq!(plane_handle(1), entries[0].plane.handle);
        assert_eq!(vec![0], keys(&entries[0]));
        assert_eq!(PlanEntryKind::Direct, entries[1].kind);
        assert_eq!(plane_handle(10), entries[1].plane.handle);
        assert_eq!(vec![1], keys(&entries[1]));
        assert_eq!(PlanEntryKind::Direct, entries[2].kind);
        assert_eq!(plane_handle(20), entries[2].plane.handle);
        assert_eq!(vec![2], keys(&entries[2]));
        assert!(frame.unassigned.is_empty());
    }

    #[test]
    fn infeasible_overlay_folds_into_primary() {
        let layers = layers(2, true);
        let mut oracle = ScriptedOracle::default();
        oracle.rejected_planes.insert(plane_handle(10));
        let mut importer = MockImporter::default();

        let frame = CapabilityPlanner
            .provision(&layers, crtc_handle(), pools(1, 1), &mut oracle, &mut importer)
            .unwrap();

        let entries = &frame.plan.entries;
        assert_eq!(2, entries.len());
        assert_eq!(PlanEntryKind::Precomposited, entries[0].kind);
        assert_eq!(plane_handle(1), entries[0].plane.handle);
        assert_eq!(vec![0, 1], keys(&entries[0]));
        assert_eq!(PlanEntryKind::Direct, entries[1].kind);
        assert_eq!(vec![2], keys(&entries[1]));
        // the rejected overlay went back into the pool
        assert_eq!(1, frame.unclaimed.overlay.len());
    }

    #[test]
    fn no_primary_plane_fails() {
        let layers = layers(2, false);
        let mut oracle = ScriptedOracle::default();
        let mut importer = MockImporter::default();
        let mut pools = pools(1, 0);
        pools.primary = Default::default();

        let err = CapabilityPlanner
            .provision(&layers, crtc_handle(), pools, &mut oracle, &mut importer)
            .unwrap_err();
        assert!(matches!(err, PlanError::NoUsableConfiguration(_)));
    }

    #[test]
    fn cursor_only_layer_set_fails() {
        let layers = layers(0, true);
        let mut oracle = ScriptedOracle::default();
        let mut importer = MockImporter::default();

        let err = CapabilityPlanner
            .provision(&layers, crtc_handle(), pools(1, 1), &mut oracle, &mut importer)
            .unwrap_err();
        assert!(matches!(err, PlanError::NoUsableConfiguration(_)));
    }

    #[test]
    fn single_primary_collects_all_layers() {
        let layers = layers(3, false);
        let mut oracle = ScriptedOracle::default();
        let mut importer = MockImporter::default();

        let frame = CapabilityPlanner
            .provision(&layers, crtc_handle(), pools(0, 0), &mut oracle, &mut importer)
            .unwrap();

        let entries = &frame.plan.entries;
        assert_eq!(1, entries.len());
        assert_eq!(PlanEntryKind::Precomposited, entries[0].kind);
        assert_eq!(vec![0, 1, 2], keys(&entries[0]));
    }

    #[test]
    fn infeasible_cursor_folds_into_finished_primary() {
        // the overlay claim finishes the primary's builder before the
        // cursor probe runs
        let layers = layers(2, true);
        let mut oracle = ScriptedOracle::default();
        oracle.rejected_planes.insert(plane_handle(20));
        let mut importer = MockImporter::default();

        let frame = CapabilityPlanner
            .provision(&layers, crtc_handle(), pools(1, 1), &mut oracle, &mut importer)
            .unwrap();

        let entries = &frame.plan.entries;
        assert_eq!(2, entries.len());
        assert_eq!(PlanEntryKind::Precomposited, entries[0].kind);
        assert_eq!(plane_handle(1), entries[0].plane.handle);
        assert_eq!(vec![0, 2], keys(&entries[0]));
        assert_eq!(PlanEntryKind::Direct, entries[1].kind);
        assert_eq!(plane_handle(10), entries[1].plane.handle);
        // the cursor plane went back into the pool
        assert_eq!(1, frame.unclaimed.cursor.len());
    }

    #[test]
    fn infeasible_cursor_folds_into_accumulating_primary() {
        let layers = layers(1, true);
        let mut oracle = ScriptedOracle::default();
        oracle.rejected_planes.insert(plane_handle(20));
        let mut importer = MockImporter::default();

        let frame = CapabilityPlanner
            .provision(&layers, crtc_handle(), pools(0, 1), &mut oracle, &mut importer)
            .unwrap();

        let entries = &frame.plan.entries;
        assert_eq!(1, entries.len());
        assert_eq!(PlanEntryKind::Precomposited, entries[0].kind);
        assert_eq!(vec![0, 1], keys(&entries[0]));
    }

    #[test]
    fn missing_cursor_plane_folds_cursor_layer() {
        let layers = layers(1, true);
        let mut oracle = ScriptedOracle::default();
        let mut importer = MockImporter::default();

        let frame = CapabilityPlanner
            .provision(&layers, crtc_handle(), pools(0, 0), &mut oracle, &mut importer)
            .unwrap();

        let entries = &frame.plan.entries;
        assert_eq!(1, entries.len());
        assert_eq!(PlanEntryKind::Precomposited, entries[0].kind);
        assert_eq!(vec![0, 1], keys(&entries[0]));
    }

    #[test]
    fn forced_precomposition_survives_empty_sweep() {
        // a rejected primary probe with no overlays and no further layers
        // must still force the entry kind
        let layers = layers(1, false);
        let mut oracle = ScriptedOracle::default();
        oracle.rejected_planes.insert(plane_handle(1));
        let mut importer = MockImporter::default();

        let frame = CapabilityPlanner
            .provision(&layers, crtc_handle(), pools(0, 0), &mut oracle, &mut importer)
            .unwrap();

        let entries = &frame.plan.entries;
        assert_eq!(1, entries.len());
        assert_eq!(PlanEntryKind::Precomposited, entries[0].kind);
        assert_eq!(vec![0], keys(&entries[0]));
    }

    #[test]
    fn overlay_pool_exhaustion_folds_remainder() {
        let layers = layers(4, false);
        let mut oracle = ScriptedOracle::default();
        let mut importer = MockImporter::default();

        let frame = CapabilityPlanner
            .provision(&layers, crtc_handle(), pools(1, 0), &mut oracle, &mut importer)
            .unwrap();

        let entries = &frame.plan.entries;
        assert_eq!(2, entries.len());
        assert_eq!(PlanEntryKind::Direct, entries[0].kind);
        assert_eq!(vec![0], keys(&entries[0]));
        assert_eq!(PlanEntryKind::Precomposited, entries[1].kind);
        assert_eq!(plane_handle(10), entries[1].plane.handle);
        assert_eq!(vec![1, 2, 3], keys(&entries[1]));
    }

    #[test]
    fn rejected_overlay_is_retried_for_next_layer() {
        // the overlay rejects layer 1 but accepts layer 2
        let layers = layers(3, false);
        let mut oracle = ScriptedOracle::default();
        oracle
            .rejected_bindings
            .insert((plane_handle(10), fb_handle(LayerKey(1))));
        let mut importer = MockImporter::default();

        let frame = CapabilityPlanner
            .provision(&layers, crtc_handle(), pools(1, 0), &mut oracle, &mut importer)
            .unwrap();

        let entries = &frame.plan.entries;
        assert_eq!(2, entries.len());
        assert_eq!(PlanEntryKind::Precomposited, entries[0].kind);
        assert_eq!(vec![0, 1], keys(&entries[0]));
        assert_eq!(PlanEntryKind::Direct, entries[1].kind);
        assert_eq!(plane_handle(10), entries[1].plane.handle);
        assert_eq!(vec![2], keys(&entries[1]));
    }

    #[test]
    fn capability_mismatch_skips_the_oracle() {
        let mut layer_set = layers(1, false);
        // no plane in the pools supports Nv12
        layer_set.insert(LayerKey(1), layer(DrmFourcc::Nv12, false));
        let mut oracle = ScriptedOracle::default();
        let mut importer = MockImporter::default();

        let frame = CapabilityPlanner
            .provision(&layer_set, crtc_handle(), pools(1, 0), &mut oracle, &mut importer)
            .unwrap();

        assert_eq!(1, frame.plan.len());
        assert_eq!(vec![0, 1], keys(&frame.plan.entries[0]));
        // only the primary probe reached the driver
        assert_eq!(1, oracle.calls);
    }

    #[test]
    fn importer_failure_folds_layer() {
        let layers = layers(2, false);
        let mut oracle = ScriptedOracle::default();
        let mut importer = MockImporter::default();
        importer.fail.insert(LayerKey(1));

        let frame = CapabilityPlanner
            .provision(&layers, crtc_handle(), pools(1, 0), &mut oracle, &mut importer)
            .unwrap();

        assert_eq!(1, frame.plan.len());
        assert_eq!(vec![0, 1], keys(&frame.plan.entries[0]));
        assert_eq!(1, oracle.calls);
    }

    #[test]
    fn unclaimed_planes_are_returned() {
        let layers = layers(2, false);
        let mut oracle = ScriptedOracle::default();
        let mut importer = MockImporter::default();

        let frame = CapabilityPlanner
            .provision(&layers, crtc_handle(), pools(3, 1), &mut oracle, &mut importer)
            .unwrap();

        assert_eq!(2, frame.plan.len());
        assert_eq!(2, frame.unclaimed.overlay.len());
        assert_eq!(1, frame.unclaimed.cursor.len());
        assert!(frame.unclaimed.primary.is_empty());
    }

    #[test]
    fn probe_cost_is_bounded_by_planes() {
        let layers = layers(2, true);
        let mut oracle = ScriptedOracle::default();
        let mut importer = MockImporter::default();

        let frame = CapabilityPlanner
            .provision(&layers, crtc_handle(), pools(2, 1), &mut oracle, &mut importer)
            .unwrap();

        // one probe per claimed plane in the all-feasible case
        assert_eq!(frame.plan.len(), oracle.calls);
    }

    #[test]
    fn every_layer_has_a_home() {
        let layer_set = layers(5, true);
        let mut oracle = ScriptedOracle::default();
        oracle
            .rejected_bindings
            .insert((plane_handle(10), fb_handle(LayerKey(2))));
        let mut importer = MockImporter::default();

        let frame = CapabilityPlanner
            .provision(&layer_set, crtc_handle(), pools(2, 1), &mut oracle, &mut importer)
            .unwrap();

        let mut assigned: Vec<_> = frame.plan.assigned_layers().collect();
        assigned.sort();
        assigned.dedup();
        let expected: Vec<_> = layer_set.keys().copied().collect();
        assert_eq!(expected, assigned);

        // and no plane appears in more than one entry
        let planes: Vec<_> = frame.plan.entries.iter().map(|e| e.plane.handle).collect();
        let unique: std::collections::HashSet<_> = planes.iter().copied().collect();
        assert_eq!(planes.len(), unique.len());
    }

    #[test]
    fn identical_inputs_yield_identical_plans() {
        let layers = layers(3, true);
        let mut importer = MockImporter::default();

        let mut first_oracle = ScriptedOracle::default();
        first_oracle.rejected_planes.insert(plane_handle(11));
        let first = CapabilityPlanner
            .provision(&layers, crtc_handle(), pools(2, 1), &mut first_oracle, &mut importer)
            .unwrap();

        let mut second_oracle = ScriptedOracle::default();
        second_oracle.rejected_planes.insert(plane_handle(11));
        let second = CapabilityPlanner
            .provision(&layers, crtc_handle(), pools(2, 1), &mut second_oracle, &mut importer)
            .unwrap();

        assert_eq!(first.plan, second.plan);
    }

    #[test]
    fn cursor_fold_preserves_sources_smallvec_order() {
        let layers = layers(1, true);
        let mut oracle = ScriptedOracle::default();
        oracle.rejected_planes.insert(plane_handle(20));
        let mut importer = MockImporter::default();

        let frame = CapabilityPlanner
            .provision(&layers, crtc_handle(), pools(0, 1), &mut oracle, &mut importer)
            .unwrap();

        let expected: smallvec::SmallVec<[LayerKey; 1]> = smallvec![LayerKey(0), LayerKey(1)];
        assert_eq!(expected, frame.plan.entries[0].sources);
    }
}
