#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

//! # drm-scanout: plane assignment planning for direct scanout
//!
//! This crate decides, per frame, which hardware planes of a drm/kms device
//! scan out which visual layers directly and which layers have to be merged
//! into a pre-composited buffer first. The resulting [`CompositionPlan`] is
//! the sole output; committing it (and rendering the pre-composited groups)
//! is up to the embedding compositor.
//!
//! ## Structure of the crate
//!
//! - [`planner`] holds the assignment strategies. [`CapabilityPlanner`]
//!   validates every candidate binding against the driver with cumulative
//!   test-only atomic commits and distributes layers over primary, overlay
//!   and cursor planes; [`SimplePlanner`] is the primary-only baseline.
//!   [`PlannerKind`] selects between them at startup.
//! - [`oracle`] is the feasibility side: [`FeasibilityOracle`] and its
//!   atomic implementation over [`AtomicCommitFlags::TEST_ONLY`].
//! - [`framebuffer`] creates and caches driver-level framebuffer objects
//!   for probe candidates, narrowing alpha-carrying formats for primary
//!   plane scanout.
//! - [`plane`] enumerates and classifies a device's planes into explicitly
//!   drainable pools.
//! - [`vblank`] paces frame submission with a one-slot rendezvous.
//!
//! Probing never fails a frame: infeasible candidates are folded into
//! pre-composited groups, and the only hard error is
//! [`PlanError::NoUsableConfiguration`], on which the caller falls back to
//! full composition.
//!
//! [`AtomicCommitFlags::TEST_ONLY`]: drm::control::AtomicCommitFlags::TEST_ONLY
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use std::fs::File;
//! use std::os::unix::io::OwnedFd;
//!
//! use drm_scanout::{
//!     AtomicFeasibilityOracle, DrmDeviceFd, DrmFramebufferImporter, Layer, LayerKey,
//!     PlanePools, PlanStrategy, PlannerKind,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let file = File::options().read(true).write(true).open("/dev/dri/card0")?;
//! let fd = DrmDeviceFd::new(OwnedFd::from(file));
//!
//! let pools = PlanePools::from_device(&fd)?;
//! let all_planes = pools
//!     .primary
//!     .iter()
//!     .chain(pools.overlay.iter())
//!     .chain(pools.cursor.iter())
//!     .map(|plane| plane.handle)
//!     .collect::<Vec<_>>();
//! let mut oracle = AtomicFeasibilityOracle::new(fd.clone(), all_planes)?;
//! let mut importer = DrmFramebufferImporter::new(fd);
//! let planner = PlannerKind::default().strategy();
//!
//! # let crtc: drm::control::crtc::Handle = todo!();
//! # let layers: BTreeMap<LayerKey, Layer> = BTreeMap::new();
//! let frame = planner.provision(&layers, crtc, pools.clone(), &mut oracle, &mut importer)?;
//! for entry in &frame.plan.entries {
//!     println!("{:?} on {:?}: {:?}", entry.kind, entry.plane.handle, entry.sources);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod fd;
pub mod format;
pub mod framebuffer;
pub mod layer;
pub mod oracle;
pub mod plan;
pub mod plane;
pub mod planner;
pub mod vblank;

pub use crate::error::{Error, PlanError};
pub use crate::fd::{DevPath, DrmDeviceFd};
pub use crate::framebuffer::{DrmFramebufferImporter, Framebuffer, ImportFramebuffer, ScanoutFramebuffer};
pub use crate::layer::{DisplayFrame, Layer, LayerKey, ScanoutBuffer, SourceCrop};
pub use crate::oracle::{AtomicFeasibilityOracle, FeasibilityOracle, PlaneBinding};
pub use crate::plan::{CompositionPlan, PlanEntry, PlanEntryKind};
pub use crate::plane::{PlaneInfo, PlanePool, PlanePools};
pub use crate::planner::{
    CapabilityPlanner, PlanStrategy, PlannerKind, ProvisionedFrame, SimplePlanner,
};
pub use crate::vblank::{SignalPolicy, VblankWatch};
