//! ### English
//! `gl_frame_relay` crate root.
//! Re-exports the relay API; the implementation lives under `engine`.
//!
//! ### 中文
//! `gl_frame_relay` 的 crate 根。
//! 重新导出中继 API；具体实现位于 `engine` 模块。

mod engine;

pub use engine::backend::{GlBackend, LatchedFrame, TextureId};
pub use engine::config::{DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_STALL_TIMEOUT, RelayConfig};
pub use engine::error::{BackendError, RelayError};
pub use engine::pipeline::{CaptureFormat, CodecParameters};
pub use engine::rendering::{
    FrameSource, GlowFramePipeline, IDENTITY_TRANSFORM, RenderSurface, TextureLatch,
};
#[cfg(all(feature = "surfman", target_os = "android"))]
pub use engine::rendering::{AndroidWindow, SurfmanBackend};
pub use engine::runtime::{
    FrameNotifier, GlRelay, RelayEvents, RelayPhase, RelayStats, SurfaceEvent,
};
