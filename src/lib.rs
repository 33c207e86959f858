//! # Cinnabar Graphics
//!
//! Backend-execution core for a real-time renderer: turns an
//! already-sorted, API-agnostic frame of draw/compute/blit items into
//! concrete GPU objects, cached pipelines, descriptor bindings and
//! command-buffer submissions.
//!
//! ## Overview
//!
//! - [`Renderer`] - resource tables, caches and the submission loop
//! - [`backend::RenderBackend`] - device seam, one implementation per API
//!   (wgpu, plus a null backend for tests and headless use)
//! - [`frame::Frame`] - the consumed, pre-sorted item list
//! - [`pipeline::PipelineCache`] - content-hashed pipeline reuse
//! - [`uniforms::ScratchBuffer`] - per-frame transient constant memory
//!
//! ## Example
//!
//! ```ignore
//! use cinnabar_graphics::{Renderer, RendererInit};
//! use cinnabar_graphics::backend::{NullBackend, SurfaceTarget};
//!
//! let mut renderer = Renderer::init(
//!     RendererInit::default(),
//!     Box::new(NullBackend::new()),
//!     SurfaceTarget::Headless,
//! )?;
//!
//! let mut frame = build_frame();
//! let stats = renderer.submit(&mut frame)?;
//! ```

pub mod backend;
pub mod error;
pub mod frame;
pub mod handle;
pub mod pipeline;
pub mod renderer;
pub mod resources;
pub mod shader;
pub mod submit;
pub mod swapchain;
pub mod types;
pub mod uniforms;

pub use error::RenderError;
pub use frame::{Frame, RenderItem, SortKey};
pub use renderer::{Renderer, RendererInit};
pub use submit::FrameStats;

/// Maximum number of views in one frame.
pub const MAX_VIEWS: usize = 256;
/// Maximum vertex streams per draw.
pub const MAX_VERTEX_STREAMS: usize = 4;
/// Maximum texture/sampler stages per draw.
pub const MAX_TEXTURE_SAMPLERS: usize = 16;
/// Maximum color attachments of a frame buffer.
pub const MAX_COLOR_ATTACHMENTS: usize = 4;
/// Occlusion query slots per renderer.
pub const MAX_OCCLUSION_QUERIES: usize = 256;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

static_assertions::const_assert!(MAX_VERTEX_STREAMS <= 8);
static_assertions::const_assert!(MAX_TEXTURE_SAMPLERS <= 32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_null_backend_name() {
        use crate::backend::{NullBackend, RenderBackend};
        let backend = NullBackend::new();
        assert_eq!(backend.name(), "Null");
    }
}
