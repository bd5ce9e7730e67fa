//! ### English
//! Synchronization shared between a `GlRelay` and its render thread.
//!
//! Two locks make up the monitor:
//! - `FrameSignal` guards the coalesced wake flags. Its critical sections are a few stores,
//!   so producers signalling a frame never wait on rendering.
//! - The secondary slot lock is held by the render thread for a whole frame pass, so attach
//!   and detach land either fully before or fully after a frame.
//!
//! ### 中文
//! `GlRelay` 与其渲染线程之间共享的同步对象。
//!
//! 监视器由两把锁组成：
//! - `FrameSignal` 保护合并后的唤醒标记；临界区只有几次写入，因此生产者发送帧信号时
//!   不会等待渲染。
//! - 副表面槽位锁在整个帧绘制过程中由渲染线程持有，因此 attach/detach 只会完整地发生在
//!   某一帧之前或之后。

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::engine::backend::GlBackend;
use crate::engine::rendering::RenderSurface;

use super::stats::RelayStats;

/// ### English
/// Lifecycle phase of a relay.
///
/// ### 中文
/// 中继的生命周期阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RelayPhase {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl RelayPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// ### English
/// How the render thread should leave its loop.
///
/// ### 中文
/// 渲染线程退出循环的方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ShutdownMode {
    /// ### English
    /// Release surfaces, park the context and frame source for a later restart.
    ///
    /// ### 中文
    /// 释放表面，挂起上下文与帧源以便之后重启。
    Suspend,
    /// ### English
    /// Release everything, including the frame source and the root context.
    ///
    /// ### 中文
    /// 释放全部资源，包括帧源与根上下文。
    Dispose,
}

/// ### English
/// Why the render thread woke up.
///
/// ### 中文
/// 渲染线程被唤醒的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Wake {
    Frame,
    Housekeeping,
    Shutdown(ShutdownMode),
    Stalled,
}

#[derive(Debug, Default)]
struct SignalState {
    frame_pending: bool,
    housekeeping: bool,
    shutdown: Option<ShutdownMode>,
}

impl SignalState {
    /// ### English
    /// Consumes the highest-priority wake reason, if any.
    ///
    /// ### 中文
    /// 取走优先级最高的唤醒原因（若有）。
    fn take(&mut self) -> Option<Wake> {
        if let Some(mode) = self.shutdown {
            return Some(Wake::Shutdown(mode));
        }
        if self.frame_pending {
            self.frame_pending = false;
            self.housekeeping = false;
            return Some(Wake::Frame);
        }
        if self.housekeeping {
            self.housekeeping = false;
            return Some(Wake::Housekeeping);
        }
        None
    }
}

#[derive(Debug, Default)]
struct StatsCounters {
    frames_rendered: AtomicU64,
    secondary_frames: AtomicU64,
    stalls: AtomicU64,
    signals: AtomicU64,
    frame_errors: AtomicU64,
}

/// ### English
/// Coalescing frame-available signal plus the relay's phase and counters.
///
/// ### 中文
/// 可合并的“帧可用”信号，以及中继的阶段与计数器。
#[derive(Debug, Default)]
pub(super) struct FrameSignal {
    state: Mutex<SignalState>,
    wake: Condvar,
    phase: AtomicU8,
    stats: StatsCounters,
}

impl FrameSignal {
    /// ### English
    /// Marks a frame as pending and wakes the render thread. Bursts collapse into one pass.
    ///
    /// ### 中文
    /// 标记有帧待处理并唤醒渲染线程；连续多次信号会合并为一次绘制。
    pub(super) fn notify_frame(&self) {
        self.stats.signals.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();
        state.frame_pending = true;
        drop(state);
        self.wake.notify_one();
    }

    pub(super) fn request_housekeeping(&self) {
        let mut state = self.state.lock();
        state.housekeeping = true;
        drop(state);
        self.wake.notify_one();
    }

    /// ### English
    /// Requests the render loop to exit. `Dispose` overrides a pending `Suspend`.
    ///
    /// ### 中文
    /// 请求渲染循环退出；`Dispose` 会覆盖尚未处理的 `Suspend`。
    pub(super) fn request_shutdown(&self, mode: ShutdownMode) {
        let mut state = self.state.lock();
        if state.shutdown != Some(ShutdownMode::Dispose) {
            state.shutdown = Some(mode);
        }
        drop(state);
        self.wake.notify_all();
    }

    pub(super) fn shutdown_requested(&self) -> bool {
        self.state.lock().shutdown.is_some()
    }

    /// ### English
    /// Clears shutdown and housekeeping flags before a new render thread is spawned.
    /// A frame signalled while stopped stays pending and is relayed right after start.
    ///
    /// ### 中文
    /// 在启动新的渲染线程前清除退出与清理标记。
    /// 停止期间收到的帧信号会保留，并在启动后立即转绘。
    pub(super) fn reset(&self) {
        let mut state = self.state.lock();
        state.shutdown = None;
        state.housekeeping = false;
    }

    /// ### English
    /// Blocks until a wake reason arrives or `timeout` elapses (`Wake::Stalled`).
    ///
    /// ### 中文
    /// 阻塞直到出现唤醒原因，或经过 `timeout` 后返回 `Wake::Stalled`。
    pub(super) fn wait(&self, timeout: Duration) -> Wake {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(wake) = state.take() {
                return wake;
            }
            if self.wake.wait_until(&mut state, deadline).timed_out() {
                return state.take().unwrap_or(Wake::Stalled);
            }
        }
    }

    pub(super) fn phase(&self) -> RelayPhase {
        RelayPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(super) fn set_phase(&self, phase: RelayPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// ### English
    /// Moves `from -> to` only if the current phase is `from`.
    ///
    /// ### 中文
    /// 仅当当前阶段为 `from` 时才切换到 `to`。
    pub(super) fn transition(&self, from: RelayPhase, to: RelayPhase) -> bool {
        self.phase
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(super) fn record_frame(&self) {
        self.stats.frames_rendered.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_secondary_frame(&self) {
        self.stats.secondary_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_stall(&self) {
        self.stats.stalls.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_frame_error(&self) {
        self.stats.frame_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn stats(&self) -> RelayStats {
        RelayStats {
            frames_rendered: self.stats.frames_rendered.load(Ordering::Relaxed),
            secondary_frames: self.stats.secondary_frames.load(Ordering::Relaxed),
            stalls: self.stats.stalls.load(Ordering::Relaxed),
            signals: self.stats.signals.load(Ordering::Relaxed),
            frame_errors: self.stats.frame_errors.load(Ordering::Relaxed),
        }
    }
}

/// ### English
/// State of the secondary (encoder) output.
///
/// ### 中文
/// 副（编码器）输出的状态。
pub(super) enum SlotState<B: GlBackend> {
    Empty,
    /// ### English
    /// Window attached; the render thread builds its surface on the next frame.
    ///
    /// ### 中文
    /// 窗口已附着；渲染线程会在下一帧为其创建表面。
    Requested(B::Window),
    Bound(RenderSurface<B>),
}

/// ### English
/// Secondary output slot plus surfaces waiting for the render thread to release them.
///
/// ### 中文
/// 副输出槽位，以及等待渲染线程释放的表面。
pub(super) struct SecondarySlot<B: GlBackend> {
    pub(super) state: SlotState<B>,
    pub(super) retired: Vec<RenderSurface<B>>,
}

impl<B: GlBackend> SecondarySlot<B> {
    fn new() -> Self {
        Self {
            state: SlotState::Empty,
            retired: Vec::new(),
        }
    }

    /// ### English
    /// Stores `window`, retiring any realized surface. Returns `true` if one was retired.
    ///
    /// ### 中文
    /// 保存 `window`，并退役已创建的表面；若有表面被退役则返回 `true`。
    pub(super) fn attach(&mut self, window: B::Window) -> bool {
        match std::mem::replace(&mut self.state, SlotState::Requested(window)) {
            SlotState::Bound(surface) => {
                self.retired.push(surface);
                true
            }
            SlotState::Requested(_) | SlotState::Empty => false,
        }
    }

    /// ### English
    /// Clears the slot. Returns `(was_attached, retired_surface)`.
    ///
    /// ### 中文
    /// 清空槽位；返回 `(是否曾附着, 是否退役了表面)`。
    pub(super) fn detach(&mut self) -> (bool, bool) {
        match std::mem::replace(&mut self.state, SlotState::Empty) {
            SlotState::Bound(surface) => {
                self.retired.push(surface);
                (true, true)
            }
            SlotState::Requested(_) => (true, false),
            SlotState::Empty => (false, false),
        }
    }

    pub(super) fn is_attached(&self) -> bool {
        !matches!(self.state, SlotState::Empty)
    }
}

/// ### English
/// Monitor owned by one `GlRelay` and shared only with its render thread.
///
/// ### 中文
/// 由单个 `GlRelay` 持有、仅与其渲染线程共享的监视器。
pub(super) struct Monitor<B: GlBackend> {
    pub(super) signal: Arc<FrameSignal>,
    pub(super) secondary: Mutex<SecondarySlot<B>>,
}

impl<B: GlBackend> Monitor<B> {
    pub(super) fn new() -> Self {
        Self {
            signal: Arc::new(FrameSignal::default()),
            secondary: Mutex::new(SecondarySlot::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn burst_of_signals_collapses_into_one_wake() {
        let signal = FrameSignal::default();
        for _ in 0..5 {
            signal.notify_frame();
        }
        assert_eq!(signal.wait(Duration::from_millis(10)), Wake::Frame);
        assert_eq!(signal.wait(Duration::from_millis(10)), Wake::Stalled);
        assert_eq!(signal.stats().signals, 5);
    }

    #[test]
    fn shutdown_takes_priority_and_is_sticky() {
        let signal = FrameSignal::default();
        signal.notify_frame();
        signal.request_shutdown(ShutdownMode::Suspend);
        assert_eq!(
            signal.wait(Duration::from_millis(10)),
            Wake::Shutdown(ShutdownMode::Suspend)
        );
        signal.request_shutdown(ShutdownMode::Dispose);
        signal.request_shutdown(ShutdownMode::Suspend);
        assert_eq!(
            signal.wait(Duration::from_millis(10)),
            Wake::Shutdown(ShutdownMode::Dispose)
        );
        signal.reset();
        assert!(!signal.shutdown_requested());
    }

    #[test]
    fn reset_keeps_a_pending_frame() {
        let signal = FrameSignal::default();
        signal.notify_frame();
        signal.request_housekeeping();
        signal.request_shutdown(ShutdownMode::Suspend);
        signal.reset();
        assert_eq!(signal.wait(Duration::from_millis(10)), Wake::Frame);
        assert_eq!(signal.wait(Duration::from_millis(10)), Wake::Stalled);
    }

    #[test]
    fn frame_wake_absorbs_pending_housekeeping() {
        let signal = FrameSignal::default();
        signal.request_housekeeping();
        assert_eq!(signal.wait(Duration::from_millis(10)), Wake::Housekeeping);
        signal.request_housekeeping();
        signal.notify_frame();
        assert_eq!(signal.wait(Duration::from_millis(10)), Wake::Frame);
        assert_eq!(signal.wait(Duration::from_millis(10)), Wake::Stalled);
    }

    #[test]
    fn shutdown_interrupts_a_blocked_wait() {
        let signal = Arc::new(FrameSignal::default());
        let waiter = {
            let signal = signal.clone();
            thread::spawn(move || {
                let started = Instant::now();
                (signal.wait(Duration::from_secs(30)), started.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(20));
        signal.request_shutdown(ShutdownMode::Suspend);
        let (wake, elapsed) = waiter.join().unwrap();
        assert_eq!(wake, Wake::Shutdown(ShutdownMode::Suspend));
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn phase_transitions_only_from_expected_phase() {
        let signal = FrameSignal::default();
        assert_eq!(signal.phase(), RelayPhase::Stopped);
        assert!(!signal.transition(RelayPhase::Running, RelayPhase::Stopping));
        signal.set_phase(RelayPhase::Starting);
        assert!(signal.transition(RelayPhase::Starting, RelayPhase::Running));
        assert_eq!(signal.phase(), RelayPhase::Running);
    }
}
