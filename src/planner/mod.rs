//! Plane assignment planning.
//!
//! A planner consumes a frame's layer set and the device's plane pools and
//! produces a [`CompositionPlan`]: an ordered sequence of plane assignments
//! distinguishing direct scanout from pre-composited groups. Two strategies
//! exist, selected at startup through [`PlannerKind`]:
//!
//! - [`CapabilityPlanner`] probes real hardware feasibility per candidate
//!   binding and distributes layers across overlay and cursor planes.
//! - [`SimplePlanner`] is the conservative baseline that only ever claims a
//!   primary plane.
//!
//! Pools are passed by value and the unclaimed remainder is handed back, so
//! the caller can explicitly disable unused hardware planes for the frame.
//! On [`PlanError`] the caller is expected to discard the frame's plan and
//! fall back to full composition; keep a canonical copy of the pools and
//! pass a clone per planning pass.

use std::collections::BTreeMap;

use drm::control::crtc;

use crate::error::PlanError;
use crate::framebuffer::ImportFramebuffer;
use crate::layer::{Layer, LayerKey};
use crate::oracle::FeasibilityOracle;
use crate::plan::CompositionPlan;
use crate::plane::PlanePools;

mod capability;
mod simple;

pub use capability::CapabilityPlanner;
pub use simple::SimplePlanner;

/// Result of one planning pass
#[derive(Debug)]
pub struct ProvisionedFrame {
    /// The plane assignments for the frame
    pub plan: CompositionPlan,
    /// Planes that were not claimed by the plan
    pub unclaimed: PlanePools,
    /// Layers the strategy left for the caller to pre-composite.
    ///
    /// Always empty for [`CapabilityPlanner`]; the simple strategy returns
    /// everything but the back-most layer here.
    pub unassigned: Vec<LayerKey>,
}

/// A plane assignment strategy.
///
/// Planning is single-threaded per pass, layers are read-only and the plan
/// only references them by key.
pub trait PlanStrategy {
    /// Provision the frame's layers onto the given plane pools for `crtc`
    fn provision(
        &self,
        layers: &BTreeMap<LayerKey, Layer>,
        crtc: crtc::Handle,
        pools: PlanePools,
        oracle: &mut dyn FeasibilityOracle,
        importer: &mut dyn ImportFramebuffer,
    ) -> Result<ProvisionedFrame, PlanError>;
}

/// Which planning strategy to use, chosen by configuration at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlannerKind {
    /// Primary-only baseline, never probes feasibility
    Simple,
    /// Feasibility-probing planner using overlay and cursor planes
    #[default]
    CapabilityAware,
}

impl PlannerKind {
    /// Instantiate the strategy for this kind
    pub fn strategy(self) -> Box<dyn PlanStrategy> {
        match self {
            PlannerKind::Simple => Box::new(SimplePlanner),
            PlannerKind::CapabilityAware => Box::new(CapabilityPlanner),
        }
    }
}
