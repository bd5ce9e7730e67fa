//! ### English
//! Dedicated render thread: owns the backend, the primary surface, and the frame source
//! while running, and relays each signalled frame onto the primary and secondary surfaces.
//!
//! ### 中文
//! 独立渲染线程：运行期间持有后端、主表面与帧源，并把每个收到信号的帧转绘到
//! 主表面和副表面。

use std::sync::Arc;
use std::thread;

use crossbeam_channel as channel;

use crate::engine::backend::{GlBackend, TextureId};
use crate::engine::config::RelayConfig;
use crate::engine::error::{BackendError, RelayError};
use crate::engine::rendering::{FrameSource, RenderSurface};

use super::monitor::{
    FrameSignal, Monitor, RelayPhase, SecondarySlot, ShutdownMode, SlotState, Wake,
};

/// ### English
/// GPU state that survives a stop/restart cycle.
///
/// ### 中文
/// 在停止/重启周期之间保留的 GPU 状态。
pub(super) struct GpuState<B: GlBackend> {
    pub(super) context: B::Context,
    pub(super) source: FrameSource<B>,
}

/// ### English
/// Everything the relay owns while no render thread is running.
///
/// ### 中文
/// 没有渲染线程运行时由中继持有的全部状态。
pub(super) struct Parked<B: GlBackend> {
    pub(super) backend: B,
    pub(super) gpu: Option<GpuState<B>>,
}

/// ### English
/// Initialization bundle moved into the render thread.
///
/// ### 中文
/// 移入渲染线程的初始化参数包。
pub(super) struct RenderThreadInit<B: GlBackend> {
    pub(super) parked: Parked<B>,
    pub(super) display: B::Window,
    pub(super) monitor: Arc<Monitor<B>>,
    pub(super) config: RelayConfig,
    /// ### English
    /// Single-use start-up handshake (capacity 1).
    ///
    /// ### 中文
    /// 一次性启动握手（容量为 1）。
    pub(super) ready: channel::Sender<Result<TextureId, RelayError>>,
}

struct RenderThread<B: GlBackend> {
    backend: B,
    primary: RenderSurface<B>,
    source: FrameSource<B>,
    monitor: Arc<Monitor<B>>,
    config: RelayConfig,
}

/// ### English
/// Render thread entry. Returns the parked state once the loop exits.
///
/// ### 中文
/// 渲染线程入口；循环退出后返回挂起状态。
pub(super) fn run<B: GlBackend>(init: RenderThreadInit<B>) -> Parked<B> {
    let RenderThreadInit {
        parked,
        display,
        monitor,
        config,
        ready,
    } = init;
    let _guard = PanicGuard {
        signal: &monitor.signal,
    };

    let mut thread = match RenderThread::start(parked, display, monitor.clone(), config) {
        Ok(thread) => thread,
        Err((err, parked)) => {
            tracing::error!(error = %err, "render thread failed to start");
            monitor.signal.set_phase(RelayPhase::Stopped);
            let _ = ready.send(Err(err));
            return parked;
        }
    };

    monitor
        .signal
        .transition(RelayPhase::Starting, RelayPhase::Running);
    let _ = ready.send(Ok(thread.source.texture_id()));
    drop(ready);

    let mode = thread.run_loop();
    let parked = thread.finish(mode);
    monitor.signal.set_phase(RelayPhase::Stopped);
    tracing::info!(?mode, "render thread stopped");
    parked
}

/// ### English
/// Marks the relay stopped if the render thread unwinds, so `phase()` never reports a dead
/// thread as running.
///
/// ### 中文
/// 渲染线程因 panic 展开时把中继标记为已停止，避免 `phase()` 把已退出的线程报告为运行中。
struct PanicGuard<'a> {
    signal: &'a FrameSignal,
}

impl Drop for PanicGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.signal.set_phase(RelayPhase::Stopped);
            tracing::error!("render thread panicked");
        }
    }
}

/// ### English
/// Disposal thread entry: frees GPU state parked by a suspended run.
///
/// Runs on a short-lived thread owned by the relay, with the parked root context made
/// current (without a surface) so the texture and program are deleted in their share group.
///
/// ### 中文
/// 销毁线程入口：释放挂起运行遗留的 GPU 状态。
///
/// 在中继持有的短生命周期线程上执行，并以无表面方式把挂起的根上下文设为 current，
/// 确保纹理与程序在其共享组中被删除。
pub(super) fn dispose<B: GlBackend>(parked: Parked<B>) -> B {
    let Parked { mut backend, gpu } = parked;
    let Some(GpuState {
        context,
        mut source,
    }) = gpu
    else {
        return backend;
    };

    match backend.make_context_current(&context) {
        Ok(()) => source.release(&mut backend),
        Err(err) => {
            tracing::warn!(error = %err, "failed to make parked context current; texture is freed with its context");
            source.abandon();
        }
    }
    if let Err(err) = backend.release_current() {
        tracing::warn!(error = %err, "failed to release current context");
    }
    if let Err(err) = backend.destroy_context(context) {
        tracing::warn!(error = %err, "failed to destroy parked root context");
    }
    tracing::debug!("parked GPU state disposed");
    backend
}

impl<B: GlBackend> RenderThread<B> {
    /// ### English
    /// Creates (or reuses) the root context, binds the display surface, and creates the
    /// frame source on first start.
    ///
    /// ### 中文
    /// 创建（或复用）根上下文，绑定显示表面，并在首次启动时创建帧源。
    fn start(
        parked: Parked<B>,
        display: B::Window,
        monitor: Arc<Monitor<B>>,
        config: RelayConfig,
    ) -> Result<Self, (RelayError, Parked<B>)> {
        let Parked {
            mut backend,
            gpu,
        } = parked;

        let (context, source) = match gpu {
            Some(GpuState { context, source }) => (context, Some(source)),
            None => match backend.create_context(None) {
                Ok(context) => (context, None),
                Err(err) => return Err((err.into(), Parked { backend, gpu: None })),
            },
        };

        let primary = match RenderSurface::with_context(&mut backend, context, display) {
            Ok(primary) => primary,
            Err((err, context)) => {
                let parked = park_or_destroy(backend, context, source);
                return Err((err.into(), parked));
            }
        };
        tracing::debug!(window = ?primary.window(), "display surface created");

        if let Err(err) = primary.make_current(&mut backend) {
            return Err(abort_start(backend, primary, source, err));
        }

        let source = match source {
            Some(source) => source,
            None => match FrameSource::create_texture(&mut backend, config.clear_color) {
                Ok(source) => source,
                Err(err) => return Err(abort_start(backend, primary, None, err)),
            },
        };

        Ok(Self {
            backend,
            primary,
            source,
            monitor,
            config,
        })
    }

    fn run_loop(&mut self) -> ShutdownMode {
        loop {
            match self.monitor.signal.wait(self.config.stall_timeout) {
                Wake::Frame => self.render_frame(),
                Wake::Housekeeping => {
                    let monitor = self.monitor.clone();
                    let mut slot = monitor.secondary.lock();
                    self.release_retired(&mut slot);
                }
                Wake::Stalled => {
                    self.monitor.signal.record_stall();
                    tracing::warn!(
                        timeout_ms = self.config.stall_timeout.as_millis() as u64,
                        "no frame available within timeout; still waiting"
                    );
                }
                Wake::Shutdown(mode) => return mode,
            }
        }
    }

    /// ### English
    /// One relay pass. The slot lock is held throughout, so attach/detach never interleave.
    ///
    /// ### 中文
    /// 一次转绘；全程持有槽位锁，保证 attach/detach 不会与其交错。
    fn render_frame(&mut self) {
        let monitor = self.monitor.clone();
        let mut slot = monitor.secondary.lock();
        self.release_retired(&mut slot);
        self.realize_secondary(&mut slot);

        if let Err(err) = self.draw_primary() {
            self.monitor.signal.record_frame_error();
            tracing::warn!(error = %err, "failed to relay frame to display surface");
            return;
        }
        self.monitor.signal.record_frame();

        if let SlotState::Bound(secondary) = &mut slot.state {
            match draw_secondary(&mut self.backend, &mut self.source, secondary) {
                Ok(()) => self.monitor.signal.record_secondary_frame(),
                Err(err) => {
                    self.monitor.signal.record_frame_error();
                    tracing::warn!(
                        window = ?secondary.window(),
                        error = %err,
                        "failed to relay frame to secondary surface"
                    );
                }
            }
        }
    }

    fn draw_primary(&mut self) -> Result<(), BackendError> {
        self.primary.make_current(&mut self.backend)?;
        self.source.update_frame(&mut self.backend)?;
        let viewport = self.primary.size(&self.backend);
        self.source.draw_frame(&mut self.backend, viewport)?;
        self.primary.swap_buffer(&mut self.backend)?;
        tracing::trace!(
            timestamp_ns = self.source.last_timestamp_ns(),
            "relayed frame to display surface"
        );
        Ok(())
    }

    fn realize_secondary(&mut self, slot: &mut SecondarySlot<B>) {
        let SlotState::Requested(window) = std::mem::replace(&mut slot.state, SlotState::Empty)
        else {
            return;
        };
        match RenderSurface::shared_with(&mut self.backend, &self.primary, window.clone()) {
            Ok(surface) => {
                tracing::info!(window = ?window, "secondary surface attached");
                slot.state = SlotState::Bound(surface);
            }
            Err(err) => {
                tracing::error!(window = ?window, error = %err, "failed to create secondary surface; dropping it");
            }
        }
    }

    fn release_retired(&mut self, slot: &mut SecondarySlot<B>) {
        for mut surface in slot.retired.drain(..) {
            tracing::debug!(window = ?surface.window(), "releasing detached secondary surface");
            surface.release(&mut self.backend);
        }
    }

    /// ### English
    /// Leaves the loop: releases surfaces and either parks or disposes the GPU state.
    ///
    /// A bound secondary surface is released and its window re-queued, so a restart keeps
    /// feeding the same encoder.
    ///
    /// ### 中文
    /// 退出循环：释放表面，并挂起或销毁 GPU 状态。
    ///
    /// 已绑定的副表面会被释放，其窗口重新排队，因此重启后仍会继续输出给同一编码器。
    fn finish(mut self, mode: ShutdownMode) -> Parked<B> {
        {
            let monitor = self.monitor.clone();
            let mut slot = monitor.secondary.lock();
            self.release_retired(&mut slot);
            match std::mem::replace(&mut slot.state, SlotState::Empty) {
                SlotState::Bound(mut surface) => {
                    let window = surface.window().clone();
                    surface.release(&mut self.backend);
                    if mode == ShutdownMode::Suspend {
                        slot.state = SlotState::Requested(window);
                    }
                }
                SlotState::Requested(window) if mode == ShutdownMode::Suspend => {
                    slot.state = SlotState::Requested(window);
                }
                SlotState::Requested(_) | SlotState::Empty => {}
            }
        }

        let Self {
            mut backend,
            mut primary,
            mut source,
            ..
        } = self;

        if mode == ShutdownMode::Dispose {
            if let Err(err) = primary.make_current(&mut backend) {
                tracing::warn!(error = %err, "failed to make display surface current for teardown");
            }
            source.release(&mut backend);
        }

        primary.release(&mut backend);
        let context = primary.take_context();
        if let Err(err) = backend.release_current() {
            tracing::warn!(error = %err, "failed to release current context");
        }

        let Some(context) = context else {
            return Parked { backend, gpu: None };
        };

        match mode {
            ShutdownMode::Suspend => Parked {
                backend,
                gpu: Some(GpuState { context, source }),
            },
            ShutdownMode::Dispose => {
                if let Err(err) = backend.destroy_context(context) {
                    tracing::warn!(error = %err, "failed to destroy root context");
                }
                Parked { backend, gpu: None }
            }
        }
    }
}

fn draw_secondary<B: GlBackend>(
    backend: &mut B,
    source: &mut FrameSource<B>,
    secondary: &mut RenderSurface<B>,
) -> Result<(), BackendError> {
    secondary.make_current(backend)?;
    let viewport = secondary.size(backend);
    source.draw_frame(backend, viewport)?;
    secondary.set_presentation_time(backend, source.last_timestamp_ns())?;
    secondary.swap_buffer(backend)
}

/// ### English
/// Keeps a previously created frame source (and its context) for the next start; a
/// context created by this attempt is destroyed instead.
///
/// ### 中文
/// 保留之前创建的帧源（及其上下文）以供下次启动；本次尝试新建的上下文则直接销毁。
fn park_or_destroy<B: GlBackend>(
    mut backend: B,
    context: B::Context,
    source: Option<FrameSource<B>>,
) -> Parked<B> {
    match source {
        Some(source) => Parked {
            backend,
            gpu: Some(GpuState { context, source }),
        },
        None => {
            if let Err(err) = backend.destroy_context(context) {
                tracing::warn!(error = %err, "failed to destroy context after failed start");
            }
            Parked { backend, gpu: None }
        }
    }
}

fn abort_start<B: GlBackend>(
    mut backend: B,
    mut primary: RenderSurface<B>,
    source: Option<FrameSource<B>>,
    err: BackendError,
) -> (RelayError, Parked<B>) {
    primary.release(&mut backend);
    let _ = backend.release_current();
    let parked = match primary.take_context() {
        Some(context) => park_or_destroy(backend, context, source),
        None => Parked { backend, gpu: None },
    };
    (err.into(), parked)
}
