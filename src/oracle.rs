//! Feasibility probing via test-only atomic commits.
//!
//! The planner never guesses whether the hardware can scan out a tentative
//! plane set, it asks the driver: every candidate binding committed so far
//! in the pass plus the newest one is encoded into a single atomic request
//! and submitted with [`AtomicCommitFlags::TEST_ONLY`]. The driver validates
//! the whole configuration without presenting anything and without consuming
//! a vblank.

use std::collections::HashMap;

use drm::control::atomic::AtomicModeReq;
use drm::control::{crtc, framebuffer, plane, property, AtomicCommitFlags, Device as ControlDevice};
use tracing::{instrument, trace};

use crate::error::{AccessError, Error};
use crate::fd::{DevPath, DrmDeviceFd};
use crate::layer::{DisplayFrame, SourceCrop};

/// A tentative plane to framebuffer binding, used while probing
/// feasibility before committing to an assignment. Not persisted beyond
/// one planning step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneBinding {
    /// The candidate plane
    pub plane: plane::Handle,
    /// Framebuffer to scan out
    pub fb: framebuffer::Handle,
    /// Source crop in buffer coordinates
    pub src: SourceCrop,
    /// Target rectangle on the crtc
    pub dst: DisplayFrame,
    /// Plane-wide alpha in `0.0..=1.0`
    pub alpha: f32,
}

/// Asks whether a set of plane bindings can be committed on a crtc.
///
/// The call must be cumulative and free of side effects on hardware state.
/// It is expected to be a kernel round-trip, so the planner issues it once
/// per candidate plane transition rather than once per layer.
pub trait FeasibilityOracle {
    /// Test whether the given bindings are committable together on `crtc`
    fn test_commit(&mut self, crtc: crtc::Handle, bindings: &[PlaneBinding]) -> Result<(), Error>;
}

type PlaneProps = HashMap<String, property::Handle>;

/// Production [`FeasibilityOracle`] over the atomic api.
///
/// Caches the property name to handle mapping of every plane at
/// construction, so a probe is a single request build plus one ioctl.
#[derive(Debug)]
pub struct AtomicFeasibilityOracle {
    fd: DrmDeviceFd,
    props: HashMap<plane::Handle, PlaneProps>,
}

impl AtomicFeasibilityOracle {
    /// Create an oracle for the given planes.
    ///
    /// Fails if property enumeration fails for any of the planes. The
    /// device needs the atomic client capability enabled.
    pub fn new(
        fd: DrmDeviceFd,
        planes: impl IntoIterator<Item = plane::Handle>,
    ) -> Result<Self, Error> {
        let mut props = HashMap::new();
        for plane in planes {
            props.insert(plane, map_props(&fd, plane)?);
        }
        Ok(AtomicFeasibilityOracle { fd, props })
    }

    fn plane_prop(&self, plane: plane::Handle, name: &'static str) -> Result<property::Handle, Error> {
        let props = self.props.get(&plane).ok_or(Error::UnknownPlane(plane))?;
        props
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownProperty {
                handle: plane.into(),
                name,
            })
    }

    fn build_request(
        &self,
        crtc: crtc::Handle,
        bindings: &[PlaneBinding],
    ) -> Result<AtomicModeReq, Error> {
        let mut req = AtomicModeReq::new();

        for binding in bindings {
            let plane = binding.plane;
            req.add_property(
                plane,
                self.plane_prop(plane, "CRTC_ID")?,
                property::Value::CRTC(Some(crtc)),
            );
            req.add_property(
                plane,
                self.plane_prop(plane, "FB_ID")?,
                property::Value::Framebuffer(Some(binding.fb)),
            );
            // src coordinates are in 16.16 fixed point
            req.add_property(
                plane,
                self.plane_prop(plane, "SRC_X")?,
                property::Value::UnsignedRange(to_fixed(binding.src.x)),
            );
            req.add_property(
                plane,
                self.plane_prop(plane, "SRC_Y")?,
                property::Value::UnsignedRange(to_fixed(binding.src.y)),
            );
            req.add_property(
                plane,
                self.plane_prop(plane, "SRC_W")?,
                property::Value::UnsignedRange(to_fixed(binding.src.w)),
            );
            req.add_property(
                plane,
                self.plane_prop(plane, "SRC_H")?,
                property::Value::UnsignedRange(to_fixed(binding.src.h)),
            );
            req.add_property(
                plane,
                self.plane_prop(plane, "CRTC_X")?,
                property::Value::SignedRange(binding.dst.x as i64),
            );
            req.add_property(
                plane,
                self.plane_prop(plane, "CRTC_Y")?,
                property::Value::SignedRange(binding.dst.y as i64),
            );
            req.add_property(
                plane,
                self.plane_prop(plane, "CRTC_W")?,
                property::Value::UnsignedRange(binding.dst.w as u64),
            );
            req.add_property(
                plane,
                self.plane_prop(plane, "CRTC_H")?,
                property::Value::UnsignedRange(binding.dst.h as u64),
            );
            // alpha is optional on older hardware
            if let Ok(alpha_prop) = self.plane_prop(plane, "alpha") {
                req.add_property(
                    plane,
                    alpha_prop,
                    property::Value::UnsignedRange((binding.alpha.clamp(0.0, 1.0) * u16::MAX as f32) as u64),
                );
            }
        }

        Ok(req)
    }
}

impl FeasibilityOracle for AtomicFeasibilityOracle {
    #[instrument(level = "trace", skip(self, bindings))]
    #[profiling::function]
    fn test_commit(&mut self, crtc: crtc::Handle, bindings: &[PlaneBinding]) -> Result<(), Error> {
        let req = self.build_request(crtc, bindings)?;
        trace!(?crtc, planes = bindings.len(), "testing atomic configuration");
        self.fd
            .atomic_commit(AtomicCommitFlags::TEST_ONLY, req)
            .map_err(|_| Error::TestFailed(crtc))
    }
}

pub(crate) fn map_props(fd: &DrmDeviceFd, plane: plane::Handle) -> Result<PlaneProps, Error> {
    let props = fd.get_properties(plane).map_err(|source| {
        Error::Access(AccessError {
            errmsg: "Error reading properties",
            dev: fd.dev_path(),
            source,
        })
    })?;

    let (handles, _) = props.as_props_and_values();
    let mut mapping = HashMap::new();
    for handle in handles {
        let info = fd.get_property(*handle).map_err(|source| {
            Error::Access(AccessError {
                errmsg: "Error reading property info",
                dev: fd.dev_path(),
                source,
            })
        })?;
        let name = info.name().to_string_lossy().into_owned();
        mapping.insert(name, *handle);
    }

    Ok(mapping)
}

/// Converts to 16.16 fixed point as expected by the SRC_* plane properties
fn to_fixed(n: f64) -> u64 {
    f64::round(n * (1 << 16) as f64) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_point_conversion() {
        assert_eq!(0, to_fixed(0.0));
        assert_eq!(1 << 16, to_fixed(1.0));
        assert_eq!(1920 << 16, to_fixed(1920.0));
        assert_eq!((1 << 16) + (1 << 15), to_fixed(1.5));
    }
}
