//! Plane enumeration, classification and the drainable plane pools.

use std::collections::VecDeque;

use drm::control::{crtc, plane, Device as ControlDevice, PlaneType};
use drm_fourcc::DrmFourcc;
use tracing::{debug, warn};

use crate::error::{AccessError, Error};
use crate::fd::{DevPath, DrmDeviceFd};
use crate::format::primary_scanout_format;
use crate::layer::Layer;

/// Static description of a hardware plane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneInfo {
    /// Handle of the plane
    pub handle: plane::Handle,
    /// Type of the plane
    pub type_: PlaneType,
    /// Crtcs the plane can be used on
    pub crtcs: Vec<crtc::Handle>,
    /// Formats the plane can scan out
    pub formats: Vec<DrmFourcc>,
}

impl PlaneInfo {
    /// Whether the plane can be used with the given crtc
    pub fn supports_crtc(&self, crtc: crtc::Handle) -> bool {
        self.crtcs.contains(&crtc)
    }

    /// Whether the plane's hardware can scan out the given layer.
    ///
    /// Takes the primary plane format narrowing into account: a primary
    /// plane only needs to support the opaque equivalent of an alpha
    /// carrying layer format, because the framebuffer is attached with the
    /// narrowed format there.
    pub fn can_composite(&self, layer: &Layer) -> bool {
        let format = match self.type_ {
            PlaneType::Primary => primary_scanout_format(layer.buffer.format),
            _ => layer.buffer.format,
        };
        self.formats.contains(&format)
    }
}

/// An explicitly drainable queue of unclaimed planes.
///
/// The planner takes pools by value and hands the unclaimed remainder back,
/// so claiming a plane is a move out of the queue instead of an erase while
/// iterating over a caller owned container.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PlanePool(VecDeque<PlaneInfo>);

impl PlanePool {
    /// Create a pool out of the given planes, preserving their order
    pub fn new(planes: impl IntoIterator<Item = PlaneInfo>) -> Self {
        PlanePool(planes.into_iter().collect())
    }

    /// Claim the first plane in the pool usable with the given crtc
    pub fn pop_usable(&mut self, crtc: crtc::Handle) -> Option<PlaneInfo> {
        let pos = self.0.iter().position(|plane| plane.supports_crtc(crtc))?;
        self.0.remove(pos)
    }

    /// Hand a claimed plane back, making it the next candidate again
    pub fn restore(&mut self, plane: PlaneInfo) {
        self.0.push_front(plane);
    }

    /// Number of unclaimed planes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the pool is drained
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterator over the unclaimed planes
    pub fn iter(&self) -> impl Iterator<Item = &PlaneInfo> {
        self.0.iter()
    }
}

impl Extend<PlaneInfo> for PlanePool {
    fn extend<T: IntoIterator<Item = PlaneInfo>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

/// The classified plane pools of one device
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PlanePools {
    /// Primary planes
    pub primary: PlanePool,
    /// Overlay planes
    pub overlay: PlanePool,
    /// Cursor planes
    pub cursor: PlanePool,
}

impl PlanePools {
    /// Enumerate and classify all planes of the given device.
    ///
    /// Requires the universal planes client capability to be enabled on the
    /// device, otherwise only primary and cursor planes will be reported by
    /// the kernel.
    pub fn from_device(fd: &DrmDeviceFd) -> Result<PlanePools, Error> {
        let res = fd.resource_handles().map_err(|source| {
            Error::Access(AccessError {
                errmsg: "Error loading drm resources",
                dev: fd.dev_path(),
                source,
            })
        })?;
        let planes = fd.plane_handles().map_err(|source| {
            Error::Access(AccessError {
                errmsg: "Error loading planes",
                dev: fd.dev_path(),
                source,
            })
        })?;

        let mut pools = PlanePools::default();
        for plane in planes {
            let info = fd.get_plane(plane).map_err(|source| {
                Error::Access(AccessError {
                    errmsg: "Failed to get plane info",
                    dev: fd.dev_path(),
                    source,
                })
            })?;

            let type_ = match plane_type(fd, plane)? {
                Some(type_) => type_,
                None => {
                    warn!(?plane, "plane without type property, skipping");
                    continue;
                }
            };

            let crtcs = res.filter_crtcs(info.possible_crtcs());
            let formats = info
                .formats()
                .iter()
                .filter_map(|format| DrmFourcc::try_from(*format).ok())
                .collect::<Vec<_>>();

            let info = PlaneInfo {
                handle: plane,
                type_,
                crtcs,
                formats,
            };
            debug!(?plane, ?type_, "classified plane");

            match type_ {
                PlaneType::Primary => pools.primary.0.push_back(info),
                PlaneType::Overlay => pools.overlay.0.push_back(info),
                PlaneType::Cursor => pools.cursor.0.push_back(info),
            }
        }

        Ok(pools)
    }
}

fn plane_type(fd: &DrmDeviceFd, plane: plane::Handle) -> Result<Option<PlaneType>, Error> {
    let props = fd.get_properties(plane).map_err(|source| {
        Error::Access(AccessError {
            errmsg: "Failed to get plane properties",
            dev: fd.dev_path(),
            source,
        })
    })?;

    let (ids, vals) = props.as_props_and_values();
    for (&id, &val) in ids.iter().zip(vals.iter()) {
        if let Ok(info) = fd.get_property(id) {
            if info.name().to_str().map(|x| x == "type").unwrap_or(false) {
                if val == (PlaneType::Primary as u32).into() {
                    return Ok(Some(PlaneType::Primary));
                }
                if val == (PlaneType::Cursor as u32).into() {
                    return Ok(Some(PlaneType::Cursor));
                }
                if val == (PlaneType::Overlay as u32).into() {
                    return Ok(Some(PlaneType::Overlay));
                }
            }
        }
    }

    Ok(None)
}
