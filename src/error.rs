//! Error types of this crate.

use std::io;
use std::path::PathBuf;

use drm::control::{crtc, plane, RawResourceHandle};

/// Errors thrown by the driver-facing parts of this crate.
///
/// None of these are fatal to a frame: the planner absorbs every probe
/// failure into forced pre-composition and only surfaces [`PlanError`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The drm device returned an error on access
    #[error(transparent)]
    Access(#[from] AccessError),
    /// The atomic test commit was rejected by the driver
    #[error("Atomic test failed for crtc ({0:?})")]
    TestFailed(crtc::Handle),
    /// The device is missing a required property
    #[error("The device is missing a required property '{name}' for handle ({handle:?})")]
    UnknownProperty {
        /// Property handle
        handle: RawResourceHandle,
        /// Property name
        name: &'static str,
    },
    /// The plane is not known to the device
    #[error("Plane `{0:?}` is not known to the device")]
    UnknownPlane(plane::Handle),
    /// The buffer carries no gem handle, so no framebuffer can be attached
    #[error("Buffer has no gem handle for plane 0, cannot attach a framebuffer")]
    NoGemHandle,
}

/// Error encountered while accessing the drm device
#[derive(Debug, thiserror::Error)]
#[error("Access error: {errmsg} on device `{dev:?}`")]
pub struct AccessError {
    /// Error message associated to the access error
    pub errmsg: &'static str,
    /// Device on which the error was generated
    pub dev: Option<PathBuf>,
    /// Underlying device error
    #[source]
    pub source: io::Error,
}

/// Error returned by [`PlanStrategy::provision`](crate::planner::PlanStrategy::provision).
///
/// Resource exhaustion (no usable primary plane, or no non-cursor layer to
/// put on it) is surfaced as a single code; the caller is expected to discard
/// the frame's plan and fall back to full GPU composition.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// No usable device configuration could be provisioned for this crtc
    #[error("No usable device configuration for crtc ({0:?})")]
    NoUsableConfiguration(crtc::Handle),
}
