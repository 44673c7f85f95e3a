use std::collections::BTreeMap;

use drm::control::crtc;
use tracing::{debug, instrument};

use crate::error::PlanError;
use crate::framebuffer::ImportFramebuffer;
use crate::layer::{Layer, LayerKey};
use crate::oracle::FeasibilityOracle;
use crate::plan::{CompositionPlan, EntryBuilder};
use crate::plane::PlanePools;
use crate::planner::{PlanStrategy, ProvisionedFrame};

/// The conservative baseline strategy.
///
/// Always reserves one primary plane for the back-most layer without
/// probing feasibility and leaves every other layer for the caller to
/// pre-composite. Overlay and cursor planes are never claimed. Guarantees
/// primary plane availability, which matters on hardware that ties vblank
/// generation to an enabled primary plane, at the cost of overlay
/// utilization.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimplePlanner;

impl PlanStrategy for SimplePlanner {
    #[instrument(level = "debug", skip_all, fields(crtc = ?crtc, layers = layers.len()))]
    fn provision(
        &self,
        layers: &BTreeMap<LayerKey, Layer>,
        crtc: crtc::Handle,
        mut pools: PlanePools,
        _oracle: &mut dyn FeasibilityOracle,
        _importer: &mut dyn ImportFramebuffer,
    ) -> Result<ProvisionedFrame, PlanError> {
        let Some(primary) = pools.primary.pop_usable(crtc) else {
            debug!("no crtc-capable primary plane");
            return Err(PlanError::NoUsableConfiguration(crtc));
        };

        let mut keys = layers.keys().copied();
        let Some(back_most) = keys.next() else {
            debug!("empty layer set");
            return Err(PlanError::NoUsableConfiguration(crtc));
        };

        let plan = CompositionPlan {
            entries: vec![EntryBuilder::new(primary, back_most).finish(crtc)],
        };

        Ok(ProvisionedFrame {
            plan,
            unclaimed: pools,
            unassigned: keys.collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanEntryKind;
    use crate::planner::harness::*;

    #[test]
    fn reserves_primary_for_back_most_layer() {
        let layers = layers(3, false);
        let mut oracle = ScriptedOracle::default();
        let mut importer = MockImporter::default();

        let frame = SimplePlanner
            .provision(&layers, crtc_handle(), pools(2, 1), &mut oracle, &mut importer)
            .unwrap();

        assert_eq!(1, frame.plan.len());
        let entry = &frame.plan.entries[0];
        assert_eq!(PlanEntryKind::Direct, entry.kind);
        assert_eq!(plane_handle(1), entry.plane.handle);
        assert_eq!(&[LayerKey(0)][..], &entry.sources[..]);
        assert_eq!(vec![LayerKey(1), LayerKey(2)], frame.unassigned);
    }

    #[test]
    fn never_claims_overlay_or_cursor_planes() {
        let layers = layers(2, true);
        let mut oracle = ScriptedOracle::default();
        let mut importer = MockImporter::default();

        let frame = SimplePlanner
            .provision(&layers, crtc_handle(), pools(2, 1), &mut oracle, &mut importer)
            .unwrap();

        assert_eq!(2, frame.unclaimed.overlay.len());
        assert_eq!(1, frame.unclaimed.cursor.len());
        // never probes or imports
        assert_eq!(0, oracle.calls);
        assert!(importer.calls.is_empty());
    }

    #[test]
    fn no_primary_plane_fails() {
        let layers = layers(1, false);
        let mut oracle = ScriptedOracle::default();
        let mut importer = MockImporter::default();
        let mut pools = pools(0, 0);
        pools.primary = Default::default();

        let err = SimplePlanner
            .provision(&layers, crtc_handle(), pools, &mut oracle, &mut importer)
            .unwrap_err();
        assert!(matches!(err, PlanError::NoUsableConfiguration(_)));
    }

    #[test]
    fn empty_layer_set_fails() {
        let layers = layers(0, false);
        let mut oracle = ScriptedOracle::default();
        let mut importer = MockImporter::default();

        let err = SimplePlanner
            .provision(&layers, crtc_handle(), pools(0, 0), &mut oracle, &mut importer)
            .unwrap_err();
        assert!(matches!(err, PlanError::NoUsableConfiguration(_)));
    }
}
