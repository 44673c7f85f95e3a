//! Ref-counted wrapper around an open drm device node.

use std::fs;
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::path::PathBuf;
use std::sync::Arc;

use drm::control::Device as ControlDevice;
use drm::Device as BasicDevice;
use tracing::info;

/// Trait for resolving the path of an open device node
pub trait DevPath {
    /// Returns the path of the open device if possible
    fn dev_path(&self) -> Option<PathBuf>;
}

impl<A: AsFd> DevPath for A {
    fn dev_path(&self) -> Option<PathBuf> {
        fs::read_link(format!("/proc/self/fd/{:?}", self.as_fd().as_raw_fd())).ok()
    }
}

#[derive(Debug)]
struct InternalDrmDeviceFd {
    fd: OwnedFd,
}

impl Drop for InternalDrmDeviceFd {
    fn drop(&mut self) {
        info!("Dropping device: {:?}", self.fd.dev_path());
    }
}

/// Ref-counted file descriptor of an open drm device
///
/// The fd is expected to be opened (and, where required, made drm master)
/// by the caller; this crate only issues property queries, `ADDFB2`/`RMFB`
/// and test-only atomic commits on it.
#[derive(Debug, Clone)]
pub struct DrmDeviceFd(Arc<InternalDrmDeviceFd>);

impl AsFd for DrmDeviceFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.fd.as_fd()
    }
}

impl AsRawFd for DrmDeviceFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0.fd.as_raw_fd()
    }
}

impl DrmDeviceFd {
    /// Create a new `DrmDeviceFd` out of an open drm node.
    ///
    /// Clone the returned value instead of wrapping the same fd twice,
    /// otherwise the device node may be closed while still in use.
    pub fn new(fd: OwnedFd) -> DrmDeviceFd {
        DrmDeviceFd(Arc::new(InternalDrmDeviceFd { fd }))
    }
}

impl BasicDevice for DrmDeviceFd {}
impl ControlDevice for DrmDeviceFd {}
