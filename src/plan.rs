//! The composition plan produced by a planning pass.

use drm::control::crtc;
use smallvec::{smallvec, SmallVec};

use crate::layer::LayerKey;
use crate::plane::PlaneInfo;

/// How the layers of a [`PlanEntry`] reach their plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanEntryKind {
    /// A single layer's buffer is scanned out directly
    Direct,
    /// The source layers are merged into one composited buffer first
    Precomposited,
}

/// One plane's assignment within a [`CompositionPlan`]
#[derive(Debug, Clone, PartialEq)]
pub struct PlanEntry {
    /// How the sources reach the plane
    pub kind: PlanEntryKind,
    /// The claimed plane, moved out of its pool
    pub plane: PlaneInfo,
    /// Crtc the plane will be committed on
    pub crtc: crtc::Handle,
    /// Source layer keys in ascending (back-to-front) order
    pub sources: SmallVec<[LayerKey; 1]>,
}

/// Ordered set of plane assignments for one frame.
///
/// Every plane appears at most once and every assigned layer key appears in
/// exactly one entry's source list. Entries are ordered bottom-most plane
/// first, with a dedicated cursor entry last if one was claimed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositionPlan {
    /// The plan entries
    pub entries: Vec<PlanEntry>,
}

impl CompositionPlan {
    /// Iterator over all layer keys referenced by the plan
    pub fn assigned_layers(&self) -> impl Iterator<Item = LayerKey> + '_ {
        self.entries.iter().flat_map(|entry| entry.sources.iter().copied())
    }

    /// Number of entries in the plan
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the plan is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A plane claimed during planning together with the layers routed to it.
///
/// Builders stay mutable until the whole pass is over, so late decisions
/// (folding an infeasible cursor into the bottom-most group) can still
/// change the final entry kind.
#[derive(Debug)]
pub(crate) struct EntryBuilder {
    pub(crate) plane: PlaneInfo,
    pub(crate) sources: SmallVec<[LayerKey; 1]>,
    /// Set when a feasibility probe for this plane failed, forcing the
    /// entry to be emitted as pre-composited even with a single source
    pub(crate) forced: bool,
}

impl EntryBuilder {
    pub(crate) fn new(plane: PlaneInfo, key: LayerKey) -> Self {
        EntryBuilder {
            plane,
            sources: smallvec![key],
            forced: false,
        }
    }

    pub(crate) fn push(&mut self, key: LayerKey) {
        self.sources.push(key);
    }

    pub(crate) fn finish(self, crtc: crtc::Handle) -> PlanEntry {
        let kind = if self.sources.len() == 1 && !self.forced {
            PlanEntryKind::Direct
        } else {
            PlanEntryKind::Precomposited
        };
        PlanEntry {
            kind,
            plane: self.plane,
            crtc,
            sources: self.sources,
        }
    }
}

/// Explicit state of the "currently accumulating plane" during a sweep.
///
/// The sweep either has no current plane or is accumulating sources for
/// one; finishing the current builder and starting a fresh one is a single
/// explicit transition instead of loop-position bookkeeping.
#[derive(Debug, Default)]
pub(crate) enum Accumulator {
    #[default]
    Idle,
    Accumulating(EntryBuilder),
}

impl Accumulator {
    /// Finish the current builder (if any) onto `finished` and start
    /// accumulating for `builder`
    pub(crate) fn advance(&mut self, builder: EntryBuilder, finished: &mut Vec<EntryBuilder>) {
        if let Accumulator::Accumulating(prev) = std::mem::replace(self, Accumulator::Accumulating(builder)) {
            finished.push(prev);
        }
    }

    /// Finish the current builder (if any) onto `finished`, leaving the
    /// accumulator idle
    pub(crate) fn flush(&mut self, finished: &mut Vec<EntryBuilder>) {
        if let Accumulator::Accumulating(builder) = std::mem::take(self) {
            finished.push(builder);
        }
    }

    /// The builder currently accumulating, if any
    pub(crate) fn current_mut(&mut self) -> Option<&mut EntryBuilder> {
        match self {
            Accumulator::Idle => None,
            Accumulator::Accumulating(builder) => Some(builder),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use drm::control::{plane, PlaneType};

    use super::*;

    fn plane_info(id: u32) -> PlaneInfo {
        PlaneInfo {
            handle: plane::Handle::from(NonZeroU32::new(id).unwrap()),
            type_: PlaneType::Overlay,
            crtcs: Vec::new(),
            formats: Vec::new(),
        }
    }

    fn crtc_handle(id: u32) -> crtc::Handle {
        crtc::Handle::from(NonZeroU32::new(id).unwrap())
    }

    #[test]
    fn single_unforced_source_is_direct() {
        let builder = EntryBuilder::new(plane_info(1), LayerKey(0));
        let entry = builder.finish(crtc_handle(1));
        assert_eq!(PlanEntryKind::Direct, entry.kind);
        assert_eq!(&[LayerKey(0)][..], &entry.sources[..]);
    }

    #[test]
    fn forced_flag_overrides_single_source() {
        let mut builder = EntryBuilder::new(plane_info(1), LayerKey(0));
        builder.forced = true;
        assert_eq!(PlanEntryKind::Precomposited, builder.finish(crtc_handle(1)).kind);
    }

    #[test]
    fn multiple_sources_are_precomposited() {
        let mut builder = EntryBuilder::new(plane_info(1), LayerKey(0));
        builder.push(LayerKey(1));
        let entry = builder.finish(crtc_handle(1));
        assert_eq!(PlanEntryKind::Precomposited, entry.kind);
        assert_eq!(&[LayerKey(0), LayerKey(1)][..], &entry.sources[..]);
    }

    #[test]
    fn accumulator_advance_finishes_previous() {
        let mut finished = Vec::new();
        let mut acc = Accumulator::default();

        acc.advance(EntryBuilder::new(plane_info(1), LayerKey(0)), &mut finished);
        assert!(finished.is_empty());

        acc.advance(EntryBuilder::new(plane_info(2), LayerKey(1)), &mut finished);
        assert_eq!(1, finished.len());
        assert_eq!(plane_info(1), finished[0].plane);

        acc.flush(&mut finished);
        assert_eq!(2, finished.len());
        assert!(acc.current_mut().is_none());
    }
}
