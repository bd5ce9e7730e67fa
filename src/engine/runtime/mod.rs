//! ### English
//! Relay runtime orchestration (public API).
//!
//! ### 中文
//! 中继运行时编排（对外公开 API）。

mod events;
mod gl_relay;
mod monitor;
mod render_thread;
mod stats;

pub use events::{FrameNotifier, RelayEvents, SurfaceEvent};
pub use gl_relay::GlRelay;
pub use monitor::RelayPhase;
pub use stats::RelayStats;
