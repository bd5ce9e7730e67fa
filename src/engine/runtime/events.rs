//! ### English
//! Host-facing event surface: frame-available callbacks and display surface lifecycle.
//!
//! ### 中文
//! 面向宿主的事件接口：帧可用回调与显示表面生命周期。

use std::sync::Arc;

use dpi::PhysicalSize;

use super::monitor::FrameSignal;

/// ### English
/// Lifecycle notification for the display window.
///
/// ### 中文
/// 显示窗口的生命周期通知。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent<W> {
    /// ### English
    /// The display window became available. Starts the relay.
    ///
    /// ### 中文
    /// 显示窗口可用，启动中继。
    Created(W),
    /// ### English
    /// The display window was resized. Informational; the viewport follows the surface size.
    ///
    /// ### 中文
    /// 显示窗口尺寸变化；仅作通知，视口会跟随表面尺寸。
    Changed { size: PhysicalSize<u32> },
    /// ### English
    /// The display window is going away. Stops the relay.
    ///
    /// ### 中文
    /// 显示窗口即将销毁，停止中继。
    Destroyed,
}

/// ### English
/// Callbacks a host forwards into the relay.
///
/// Both methods may be called from any thread and never wait on rendering
/// (`SurfaceEvent::Created` performs the start-up handshake).
///
/// ### 中文
/// 宿主转发给中继的回调。
///
/// 两个方法都可在任意线程调用，且不会等待渲染
/// （`SurfaceEvent::Created` 会执行启动握手）。
pub trait RelayEvents<W> {
    fn on_frame_available(&self);

    fn on_surface_event(&self, event: SurfaceEvent<W>);
}

/// ### English
/// Cloneable handle for signalling frames from a producer callback without borrowing the relay.
///
/// ### 中文
/// 可克隆的句柄，用于在生产者回调中发送帧信号而无需借用中继。
#[derive(Clone)]
pub struct FrameNotifier {
    signal: Arc<FrameSignal>,
}

impl FrameNotifier {
    pub(super) fn new(signal: Arc<FrameSignal>) -> Self {
        Self { signal }
    }

    /// ### English
    /// Signals that a new frame is available. Never blocks on rendering.
    ///
    /// ### 中文
    /// 通知有新帧可用；不会因渲染而阻塞。
    pub fn notify(&self) {
        self.signal.notify_frame();
    }
}

impl std::fmt::Debug for FrameNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameNotifier").finish_non_exhaustive()
    }
}
