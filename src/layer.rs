//! The per-frame layer set consumed by the planners.

use std::fmt;

use drm::buffer::PlanarBuffer;
use drm_fourcc::{DrmFourcc, DrmModifier};

/// Stable key identifying a layer within one frame's layer set.
///
/// Keys order the layer stack: ascending keys run back-to-front, so the
/// lowest key is the bottom-most layer and the cursor is searched for from
/// the highest key downwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerKey(pub u64);

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for LayerKey {
    fn from(key: u64) -> Self {
        LayerKey(key)
    }
}

/// Source crop of a layer in buffer coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceCrop {
    /// Horizontal offset into the buffer
    pub x: f64,
    /// Vertical offset into the buffer
    pub y: f64,
    /// Width of the sampled region
    pub w: f64,
    /// Height of the sampled region
    pub h: f64,
}

impl SourceCrop {
    /// Crop covering a whole buffer of the given size
    pub fn from_buffer_size((w, h): (u32, u32)) -> Self {
        SourceCrop {
            x: 0.0,
            y: 0.0,
            w: w as f64,
            h: h as f64,
        }
    }
}

/// Target rectangle of a layer on the crtc in screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayFrame {
    /// Horizontal position on the crtc
    pub x: i32,
    /// Vertical position on the crtc
    pub y: i32,
    /// Width on the crtc
    pub w: u32,
    /// Height on the crtc
    pub h: u32,
}

/// Geometry and memory description of an already imported scanout buffer.
///
/// This is the format/geometry/handle tuple the platform buffer import step
/// produces. The gem handles are owned by the importing entity, this type
/// only references them for the duration of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanoutBuffer {
    /// Size of the buffer in pixels
    pub size: (u32, u32),
    /// Format of the buffer
    pub format: DrmFourcc,
    /// Explicit format modifier, if the buffer was imported with one
    pub modifier: Option<DrmModifier>,
    /// Per-plane pitches
    pub pitches: [u32; 4],
    /// Per-plane offsets
    pub offsets: [u32; 4],
    /// Per-plane gem handles
    pub handles: [Option<drm::buffer::Handle>; 4],
}

impl PlanarBuffer for ScanoutBuffer {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn format(&self) -> DrmFourcc {
        self.format
    }

    fn modifier(&self) -> Option<DrmModifier> {
        self.modifier
    }

    fn pitches(&self) -> [u32; 4] {
        self.pitches
    }

    fn handles(&self) -> [Option<drm::buffer::Handle>; 4] {
        self.handles
    }

    fn offsets(&self) -> [u32; 4] {
        self.offsets
    }
}

/// A single visual layer of one frame.
///
/// Layers are created by the caller per frame and are read-only to the
/// planner; the planner only records their keys in the resulting plan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layer {
    /// The imported buffer backing this layer
    pub buffer: ScanoutBuffer,
    /// Region of the buffer to sample from
    pub src: SourceCrop,
    /// Region of the crtc to display on
    pub dst: DisplayFrame,
    /// Plane-wide alpha in `0.0..=1.0`
    pub alpha: f32,
    /// Whether the buffer was flagged as a cursor by the producer
    pub is_cursor: bool,
}

impl Layer {
    /// Fullscreen-style layer showing the whole buffer at the given position
    pub fn from_buffer(buffer: ScanoutBuffer, x: i32, y: i32) -> Self {
        Layer {
            buffer,
            src: SourceCrop::from_buffer_size(buffer.size),
            dst: DisplayFrame {
                x,
                y,
                w: buffer.size.0,
                h: buffer.size.1,
            },
            alpha: 1.0,
            is_cursor: false,
        }
    }
}
