//! ### English
//! Rendering building blocks: output surfaces, the external-texture frame source, and the
//! concrete GL pipeline/backend.
//!
//! ### 中文
//! 渲染构件：输出表面、外部纹理帧源，以及具体的 GL 管线/后端。

mod frame_source;
mod glow_pipeline;
mod surface;
#[cfg(all(feature = "surfman", target_os = "android"))]
mod surfman_backend;

pub use frame_source::{FrameSource, IDENTITY_TRANSFORM};
pub use glow_pipeline::{GlowFramePipeline, TextureLatch};
pub use surface::RenderSurface;
#[cfg(all(feature = "surfman", target_os = "android"))]
pub use surfman_backend::{AndroidWindow, BoundWidget, SurfmanBackend, SurfmanContext};
