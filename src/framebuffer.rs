//! Lazy framebuffer object creation for probe candidates.
//!
//! A layer can only be bound to a plane once its buffer has a driver-level
//! framebuffer object. The planner requests them on demand through
//! [`ImportFramebuffer`]; the production implementation attaches them with
//! `ADDFB2` and caches per gem handle, narrowing alpha-carrying formats to
//! their opaque equivalents for primary plane scanout.

use drm::buffer::PlanarBuffer;
use drm::control::{framebuffer, Device as ControlDevice, FbCmd2Flags, PlaneType};
use drm_fourcc::{DrmFourcc, DrmModifier};
use indexmap::IndexMap;
use tracing::{trace, warn};

use crate::error::{AccessError, Error};
use crate::fd::{DevPath, DrmDeviceFd};
use crate::format::primary_scanout_format;
use crate::layer::{Layer, LayerKey, ScanoutBuffer};

/// A framebuffer object usable for scanout
pub trait Framebuffer: AsRef<framebuffer::Handle> {
    /// Format the framebuffer was attached with
    fn format(&self) -> DrmFourcc;
}

/// An owned driver-level framebuffer object.
///
/// Destroys the framebuffer on drop. Destruction failures are logged and
/// otherwise ignored, the kernel reclaims the object with the fd anyway.
#[derive(Debug)]
pub struct ScanoutFramebuffer {
    fb: framebuffer::Handle,
    format: DrmFourcc,
    drm: DrmDeviceFd,
}

impl AsRef<framebuffer::Handle> for ScanoutFramebuffer {
    fn as_ref(&self) -> &framebuffer::Handle {
        &self.fb
    }
}

impl Framebuffer for ScanoutFramebuffer {
    fn format(&self) -> DrmFourcc {
        self.format
    }
}

impl Drop for ScanoutFramebuffer {
    fn drop(&mut self) {
        trace!(fb = ?self.fb, "destroying framebuffer");
        if let Err(err) = self.drm.destroy_framebuffer(self.fb) {
            warn!(fb = ?self.fb, ?err, "failed to destroy framebuffer");
        }
    }
}

/// Wrapper around a buffer reporting the opaque equivalent of its format
struct OpaqueBufferWrapper<'a>(&'a ScanoutBuffer);

impl PlanarBuffer for OpaqueBufferWrapper<'_> {
    fn size(&self) -> (u32, u32) {
        self.0.size()
    }

    fn format(&self) -> DrmFourcc {
        primary_scanout_format(self.0.format())
    }

    fn modifier(&self) -> Option<DrmModifier> {
        self.0.modifier()
    }

    fn pitches(&self) -> [u32; 4] {
        self.0.pitches()
    }

    fn handles(&self) -> [Option<drm::buffer::Handle>; 4] {
        self.0.handles()
    }

    fn offsets(&self) -> [u32; 4] {
        self.0.offsets()
    }
}

/// Produces framebuffer objects for probe candidates on demand.
///
/// `plane_type` is the type of the plane the layer is being probed on, so
/// implementations can apply plane specific format handling.
pub trait ImportFramebuffer {
    /// Get or create a framebuffer object for the given layer
    fn framebuffer(
        &mut self,
        key: LayerKey,
        layer: &Layer,
        plane_type: PlaneType,
    ) -> Result<framebuffer::Handle, Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    gem: drm::buffer::Handle,
    opaque: bool,
}

/// [`ImportFramebuffer`] implementation attaching framebuffers with `ADDFB2`.
///
/// Framebuffers are cached per gem handle (and per narrowing variant, the
/// same buffer may be attached twice with different formats), so repeated
/// probes of the same layer stay cheap. Entries live until [`cleanup`] or
/// [`clear`] retires them.
///
/// [`cleanup`]: Self::cleanup
/// [`clear`]: Self::clear
#[derive(Debug)]
pub struct DrmFramebufferImporter {
    fd: DrmDeviceFd,
    cache: IndexMap<CacheKey, ScanoutFramebuffer>,
}

impl DrmFramebufferImporter {
    /// Create an importer attaching framebuffers on the given device
    pub fn new(fd: DrmDeviceFd) -> Self {
        DrmFramebufferImporter {
            fd,
            cache: IndexMap::new(),
        }
    }

    /// Retire cached framebuffers whose gem handle is no longer live
    pub fn cleanup(&mut self, live: impl Fn(drm::buffer::Handle) -> bool) {
        self.cache.retain(|key, _| live(key.gem));
    }

    /// Retire all cached framebuffers
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    fn import(&self, buffer: &ScanoutBuffer, opaque: bool) -> Result<ScanoutFramebuffer, Error> {
        let flags = if buffer.modifier.is_some() {
            FbCmd2Flags::MODIFIERS
        } else {
            FbCmd2Flags::empty()
        };

        let (fb, format) = if opaque {
            let wrapper = OpaqueBufferWrapper(buffer);
            let fb = self.fd.add_planar_framebuffer(&wrapper, flags);
            (fb, wrapper.format())
        } else {
            (self.fd.add_planar_framebuffer(buffer, flags), buffer.format)
        };

        let fb = fb.map_err(|source| {
            Error::Access(AccessError {
                errmsg: "Failed to add framebuffer",
                dev: self.fd.dev_path(),
                source,
            })
        })?;

        Ok(ScanoutFramebuffer {
            fb,
            format,
            drm: self.fd.clone(),
        })
    }
}

impl ImportFramebuffer for DrmFramebufferImporter {
    #[profiling::function]
    fn framebuffer(
        &mut self,
        key: LayerKey,
        layer: &Layer,
        plane_type: PlaneType,
    ) -> Result<framebuffer::Handle, Error> {
        let gem = layer.buffer.handles[0].ok_or(Error::NoGemHandle)?;
        let opaque = plane_type == PlaneType::Primary
            && primary_scanout_format(layer.buffer.format) != layer.buffer.format;
        let cache_key = CacheKey { gem, opaque };

        if let Some(fb) = self.cache.get(&cache_key) {
            return Ok(*fb.as_ref());
        }

        let fb = self.import(&layer.buffer, opaque)?;
        trace!(layer = %key, fb = ?fb.as_ref(), opaque, "attached framebuffer");
        let handle = *fb.as_ref();
        self.cache.insert(cache_key, fb);
        Ok(handle)
    }
}
