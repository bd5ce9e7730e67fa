//! ### English
//! `GlRelay`: public handle that spawns and owns the dedicated render thread.
//!
//! ### 中文
//! `GlRelay`：负责创建并持有独立渲染线程的对外句柄。

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel as channel;
use parking_lot::Mutex;

use crate::engine::backend::{GlBackend, TextureId};
use crate::engine::config::RelayConfig;
use crate::engine::error::RelayError;

use super::events::{FrameNotifier, RelayEvents, SurfaceEvent};
use super::monitor::{Monitor, RelayPhase, ShutdownMode};
use super::render_thread::{self, Parked, RenderThreadInit};
use super::stats::RelayStats;

/// ### English
/// Who currently holds the backend.
///
/// ### 中文
/// 当前由谁持有后端。
enum Worker<B: GlBackend> {
    /// ### English
    /// No render thread; backend (and GPU state from a previous run) parked here.
    ///
    /// ### 中文
    /// 没有渲染线程；后端（以及上次运行的 GPU 状态）挂起在此处。
    Idle(Parked<B>),
    /// ### English
    /// A render thread owns the backend and hands it back when joined.
    ///
    /// ### 中文
    /// 渲染线程持有后端，join 时归还。
    Running(JoinHandle<Option<Parked<B>>>),
    Disposed,
    /// ### English
    /// The render thread died without returning the backend.
    ///
    /// ### 中文
    /// 渲染线程异常退出且未归还后端。
    Lost,
}

/// ### English
/// Relays frames from an external-texture producer to a display window and, optionally, a
/// secondary encoder window, on one dedicated render thread.
///
/// All methods take `&self` and may be called from any thread. `start` blocks on the
/// start-up handshake; everything else returns without waiting on rendering, except
/// `shutdown`, which joins the render thread.
///
/// ### 中文
/// 在单个独立渲染线程上，把外部纹理生产者的帧转绘到显示窗口，以及可选的副（编码器）窗口。
///
/// 所有方法都接收 `&self`，可在任意线程调用。`start` 会阻塞等待启动握手；除会 join
/// 渲染线程的 `shutdown` 外，其余方法都不会等待渲染。
pub struct GlRelay<B: GlBackend> {
    monitor: Arc<Monitor<B>>,
    display: Mutex<B::Window>,
    /// ### English
    /// Held across the whole start handshake, so concurrent starts run one at a time.
    ///
    /// ### 中文
    /// 在整个启动握手期间持有，因此并发的 start 会串行执行。
    worker: Mutex<Worker<B>>,
    texture: Mutex<Option<TextureId>>,
    config: RelayConfig,
}

impl<B: GlBackend> GlRelay<B> {
    /// ### English
    /// Creates a stopped relay for `display`. Nothing touches the GPU until `start`.
    ///
    /// ### 中文
    /// 为 `display` 创建一个处于停止状态的中继；在 `start` 之前不会访问 GPU。
    pub fn new(backend: B, display: B::Window, config: RelayConfig) -> Self {
        Self {
            monitor: Arc::new(Monitor::new()),
            display: Mutex::new(display),
            worker: Mutex::new(Worker::Idle(Parked { backend, gpu: None })),
            texture: Mutex::new(None),
            config: config.normalized(),
        }
    }

    /// ### English
    /// Starts the render thread and returns the external texture id producers should write
    /// into.
    ///
    /// Idempotent while running. After `stop`, a restart reuses the same context and texture,
    /// so the returned id does not change.
    ///
    /// ### 中文
    /// 启动渲染线程，并返回生产者应写入的外部纹理 id。
    ///
    /// 运行中重复调用是幂等的。`stop` 之后重启会复用同一上下文与纹理，因此返回的 id 不变。
    pub fn start(&self) -> Result<TextureId, RelayError> {
        let mut worker = self.worker.lock();

        if let Worker::Running(handle) = &*worker {
            if !handle.is_finished()
                && !self.monitor.signal.shutdown_requested()
                && self.monitor.signal.phase() == RelayPhase::Running
            {
                if let Some(texture) = *self.texture.lock() {
                    tracing::debug!("relay already running");
                    return Ok(texture);
                }
            }
        }

        let parked = match std::mem::replace(&mut *worker, Worker::Lost) {
            Worker::Idle(parked) => parked,
            Worker::Running(handle) => {
                self.monitor.signal.request_shutdown(ShutdownMode::Suspend);
                match handle.join() {
                    Ok(Some(parked)) => parked,
                    Ok(None) | Err(_) => {
                        self.monitor.signal.set_phase(RelayPhase::Stopped);
                        tracing::error!("render thread exited without returning the backend");
                        return Err(RelayError::ThreadExited);
                    }
                }
            }
            Worker::Disposed => {
                *worker = Worker::Disposed;
                return Err(RelayError::ShutDown);
            }
            Worker::Lost => return Err(RelayError::ThreadExited),
        };

        let restart = parked.gpu.is_some();
        self.monitor.signal.reset();
        self.monitor.signal.set_phase(RelayPhase::Starting);

        let (ready_tx, ready_rx) = channel::bounded(1);
        let (init_tx, init_rx) = channel::bounded::<RenderThreadInit<B>>(1);
        let init = RenderThreadInit {
            parked,
            display: self.display.lock().clone(),
            monitor: self.monitor.clone(),
            config: self.config.clone(),
            ready: ready_tx,
        };

        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || init_rx.recv().ok().map(render_thread::run));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                self.monitor.signal.set_phase(RelayPhase::Stopped);
                *worker = Worker::Idle(init.parked);
                tracing::error!(error = %err, "failed to spawn render thread");
                return Err(RelayError::Spawn(err));
            }
        };
        if let Err(channel::SendError(init)) = init_tx.send(init) {
            self.monitor.signal.set_phase(RelayPhase::Stopped);
            *worker = Worker::Idle(init.parked);
            let _ = handle.join();
            return Err(RelayError::ThreadExited);
        }

        match ready_rx.recv_timeout(self.config.handshake_timeout) {
            Ok(Ok(texture)) => {
                *self.texture.lock() = Some(texture);
                *worker = Worker::Running(handle);
                tracing::info!(texture = texture.0, restart, "relay started");
                Ok(texture)
            }
            Ok(Err(err)) => {
                *worker = match handle.join() {
                    Ok(Some(parked)) => Worker::Idle(parked),
                    Ok(None) | Err(_) => Worker::Lost,
                };
                self.monitor.signal.set_phase(RelayPhase::Stopped);
                Err(err)
            }
            Err(channel::RecvTimeoutError::Timeout) => {
                self.monitor.signal.set_phase(RelayPhase::Stopping);
                self.monitor.signal.request_shutdown(ShutdownMode::Suspend);
                *worker = Worker::Running(handle);
                tracing::error!(
                    timeout_ms = self.config.handshake_timeout.as_millis() as u64,
                    "render thread did not become ready in time"
                );
                Err(RelayError::HandshakeTimeout(self.config.handshake_timeout))
            }
            Err(channel::RecvTimeoutError::Disconnected) => {
                *worker = match handle.join() {
                    Ok(Some(parked)) => Worker::Idle(parked),
                    Ok(None) | Err(_) => Worker::Lost,
                };
                self.monitor.signal.set_phase(RelayPhase::Stopped);
                Err(RelayError::ThreadExited)
            }
        }
    }

    /// ### English
    /// Asks the render thread to stop after its current frame and returns immediately.
    ///
    /// Surfaces are released on the render thread; the context and texture stay parked for
    /// the next `start`. No-op when not running.
    ///
    /// ### 中文
    /// 请求渲染线程在当前帧结束后停止，并立即返回。
    ///
    /// 表面在渲染线程上释放；上下文与纹理会挂起以供下次 `start` 使用。未运行时无操作。
    pub fn stop(&self) {
        let signal = &self.monitor.signal;
        if signal.transition(RelayPhase::Running, RelayPhase::Stopping)
            || signal.transition(RelayPhase::Starting, RelayPhase::Stopping)
        {
            signal.request_shutdown(ShutdownMode::Suspend);
            tracing::info!("relay stop requested");
        }
    }

    /// ### English
    /// Routes every following frame to `window` as well, timestamped with the source
    /// capture time. Replaces any previously attached window.
    ///
    /// The surface is created on the render thread before the next frame is drawn. An
    /// attached window survives stop/start.
    ///
    /// ### 中文
    /// 之后的每一帧也会转绘到 `window`，并带上源采集时间戳；会替换之前附着的窗口。
    ///
    /// 表面会在绘制下一帧之前于渲染线程上创建。附着的窗口在 stop/start 之间保持有效。
    pub fn attach_secondary(&self, window: B::Window) {
        tracing::debug!(window = ?window, "attaching secondary window");
        let retired = self.monitor.secondary.lock().attach(window);
        if retired {
            self.monitor.signal.request_housekeeping();
        }
    }

    /// ### English
    /// Stops routing frames to the secondary window. Returns whether one was attached.
    ///
    /// Waits only for an in-flight frame; once this returns, no later frame reaches the
    /// old window.
    ///
    /// ### 中文
    /// 停止向副窗口转绘；返回之前是否有附着的窗口。
    ///
    /// 只会等待正在进行的一帧；返回后不会再有帧写入旧窗口。
    pub fn detach_secondary(&self) -> bool {
        let (was_attached, retired) = self.monitor.secondary.lock().detach();
        if retired {
            self.monitor.signal.request_housekeeping();
        }
        if was_attached {
            tracing::debug!("secondary window detached");
        }
        was_attached
    }

    pub fn is_secondary_attached(&self) -> bool {
        self.monitor.secondary.lock().is_attached()
    }

    /// ### English
    /// Replaces the display window used by the next `start`.
    ///
    /// ### 中文
    /// 替换下次 `start` 使用的显示窗口。
    pub fn set_display_window(&self, window: B::Window) {
        *self.display.lock() = window;
    }

    /// ### English
    /// External texture id, once the relay has started at least once.
    ///
    /// ### 中文
    /// 外部纹理 id；中继至少启动过一次后才有值。
    pub fn texture_id(&self) -> Option<TextureId> {
        *self.texture.lock()
    }

    pub fn phase(&self) -> RelayPhase {
        self.monitor.signal.phase()
    }

    pub fn stats(&self) -> RelayStats {
        self.monitor.signal.stats()
    }

    pub fn frame_notifier(&self) -> FrameNotifier {
        FrameNotifier::new(self.monitor.signal.clone())
    }

    /// ### English
    /// Stops the render thread, destroys every GPU resource, and joins the thread.
    /// Idempotent; later `start` calls fail with `RelayError::ShutDown`.
    ///
    /// ### 中文
    /// 停止渲染线程、销毁全部 GPU 资源并 join 线程。
    /// 幂等；之后调用 `start` 会返回 `RelayError::ShutDown`。
    pub fn shutdown(&self) {
        let mut worker = self.worker.lock();
        let parked = match std::mem::replace(&mut *worker, Worker::Disposed) {
            Worker::Running(handle) => {
                if self.monitor.signal.phase() != RelayPhase::Stopped {
                    self.monitor.signal.set_phase(RelayPhase::Stopping);
                }
                self.monitor.signal.request_shutdown(ShutdownMode::Dispose);
                match handle.join() {
                    Ok(parked) => parked,
                    Err(_) => {
                        tracing::error!("render thread panicked during shutdown");
                        None
                    }
                }
            }
            Worker::Idle(parked) => Some(parked),
            Worker::Disposed | Worker::Lost => return,
        };

        if let Some(parked) = parked {
            self.dispose_parked(parked);
        }
        self.monitor.secondary.lock().detach();
        *self.texture.lock() = None;
        self.monitor.signal.set_phase(RelayPhase::Stopped);
        tracing::info!("relay shut down");
    }

    /// ### English
    /// Frees GPU state left parked by a suspended run on a short-lived thread named like
    /// the render thread, so no GPU call ever runs on the caller's thread.
    ///
    /// ### 中文
    /// 在与渲染线程同名的短生命周期线程上释放挂起运行遗留的 GPU 状态，
    /// 保证 GPU 调用不会发生在调用方线程上。
    fn dispose_parked(&self, parked: Parked<B>) {
        if parked.gpu.is_none() {
            return;
        }

        let (parked_tx, parked_rx) = channel::bounded::<Parked<B>>(1);
        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || parked_rx.recv().ok().map(render_thread::dispose));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                tracing::error!(error = %err, "failed to spawn disposal thread; disposing on caller thread");
                render_thread::dispose(parked);
                return;
            }
        };
        if let Err(channel::SendError(parked)) = parked_tx.send(parked) {
            tracing::error!("disposal thread exited early; disposing on caller thread");
            render_thread::dispose(parked);
        }
        if handle.join().is_err() {
            tracing::error!("disposal thread panicked");
        }
    }
}

impl<B: GlBackend> RelayEvents<B::Window> for GlRelay<B> {
    fn on_frame_available(&self) {
        self.monitor.signal.notify_frame();
    }

    fn on_surface_event(&self, event: SurfaceEvent<B::Window>) {
        match event {
            SurfaceEvent::Created(window) => {
                tracing::info!(window = ?window, "display window created");
                self.set_display_window(window);
                if let Err(err) = self.start() {
                    tracing::error!(error = %err, "failed to start relay for new display window");
                }
            }
            SurfaceEvent::Changed { size } => {
                tracing::debug!(width = size.width, height = size.height, "display window resized");
            }
            SurfaceEvent::Destroyed => {
                tracing::info!("display window destroyed");
                self.stop();
            }
        }
    }
}

impl<B: GlBackend> fmt::Debug for GlRelay<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlRelay")
            .field("phase", &self.phase())
            .field("texture", &self.texture_id())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl<B: GlBackend> Drop for GlRelay<B> {
    /// ### English
    /// Drop guard: release every GPU resource and join the render thread.
    ///
    /// ### 中文
    /// Drop 兜底：释放所有 GPU 资源并 join 渲染线程。
    fn drop(&mut self) {
        self.shutdown();
    }
}
