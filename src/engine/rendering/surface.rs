//! ### English
//! One renderable output surface bound to a GPU context.
//!
//! ### 中文
//! 绑定到某个 GPU 上下文的单个可渲染输出表面。

use dpi::PhysicalSize;

use crate::engine::backend::GlBackend;
use crate::engine::error::BackendError;

/// ### English
/// Window surface plus the context it renders with.
///
/// The primary (display) surface borrows the relay's root context for the duration of a
/// run and hands it back through `take_context` after `release`. A secondary (encoder)
/// surface owns an extra context that shares objects with the primary's and destroys it on
/// `release`.
///
/// ### 中文
/// 窗口表面及其渲染所用的上下文。
///
/// 主（显示）表面在一次运行期间借用中继的根上下文，并在 `release` 之后通过
/// `take_context` 归还。副（编码器）表面持有一个与主上下文共享对象的额外上下文，
/// 并在 `release` 时销毁它。
pub struct RenderSurface<B: GlBackend> {
    /// ### English
    /// Context used for drawing into `surface` (`None` once handed back or destroyed).
    ///
    /// ### 中文
    /// 向 `surface` 绘制时使用的上下文（归还或销毁后为 `None`）。
    context: Option<B::Context>,
    /// ### English
    /// Window surface (`None` once released).
    ///
    /// ### 中文
    /// 窗口表面（释放后为 `None`）。
    surface: Option<B::Surface>,
    /// ### English
    /// Native window this surface was created from.
    ///
    /// ### 中文
    /// 创建该表面所用的原生窗口。
    window: B::Window,
    /// ### English
    /// Whether `release` destroys `context`.
    ///
    /// ### 中文
    /// `release` 时是否销毁 `context`。
    owns_context: bool,
}

impl<B: GlBackend> RenderSurface<B> {
    /// ### English
    /// Creates a surface for `window` on a lent context.
    ///
    /// On failure the context is handed back together with the error.
    ///
    /// ### 中文
    /// 在借用的上下文上为 `window` 创建表面。
    ///
    /// 失败时上下文会随错误一起归还。
    pub fn with_context(
        backend: &mut B,
        mut context: B::Context,
        window: B::Window,
    ) -> Result<Self, (BackendError, B::Context)> {
        match backend.create_window_surface(&mut context, &window) {
            Ok(surface) => Ok(Self {
                context: Some(context),
                surface: Some(surface),
                window,
                owns_context: false,
            }),
            Err(err) => Err((err, context)),
        }
    }

    /// ### English
    /// Creates a surface for `window` with a new context sharing objects with `primary`.
    ///
    /// ### 中文
    /// 为 `window` 创建表面，并新建一个与 `primary` 共享对象的上下文。
    pub fn shared_with(
        backend: &mut B,
        primary: &RenderSurface<B>,
        window: B::Window,
    ) -> Result<Self, BackendError> {
        let share = primary.context.as_ref().ok_or(BackendError::Released)?;
        let mut context = backend.create_context(Some(share))?;
        match backend.create_window_surface(&mut context, &window) {
            Ok(surface) => Ok(Self {
                context: Some(context),
                surface: Some(surface),
                window,
                owns_context: true,
            }),
            Err(err) => {
                if let Err(destroy_err) = backend.destroy_context(context) {
                    tracing::warn!(error = %destroy_err, "failed to destroy orphaned shared context");
                }
                Err(err)
            }
        }
    }

    fn parts(&self) -> Result<(&B::Context, &B::Surface), BackendError> {
        match (&self.context, &self.surface) {
            (Some(context), Some(surface)) => Ok((context, surface)),
            _ => Err(BackendError::Released),
        }
    }

    /// ### English
    /// Binds this surface's context to the calling thread.
    ///
    /// ### 中文
    /// 将该表面的上下文绑定到调用线程。
    pub fn make_current(&self, backend: &mut B) -> Result<(), BackendError> {
        let (context, surface) = self.parts()?;
        backend.make_current(context, surface)
    }

    /// ### English
    /// Commits the drawn buffer. The surface must be current.
    ///
    /// ### 中文
    /// 提交已绘制的缓冲区；调用前该表面必须为 current。
    pub fn swap_buffer(&mut self, backend: &mut B) -> Result<(), BackendError> {
        match (&mut self.context, &self.surface) {
            (Some(context), Some(surface)) => backend.swap_buffers(context, surface),
            _ => Err(BackendError::Released),
        }
    }

    /// ### English
    /// Stamps the next swap with the source capture time.
    ///
    /// ### 中文
    /// 用源采集时间为下一次 swap 打时间戳。
    pub fn set_presentation_time(
        &self,
        backend: &mut B,
        timestamp_ns: i64,
    ) -> Result<(), BackendError> {
        let (context, surface) = self.parts()?;
        backend.set_presentation_time(context, surface, timestamp_ns)
    }

    /// ### English
    /// Current size in physical pixels (zero once released).
    ///
    /// ### 中文
    /// 当前物理像素尺寸（释放后为 0）。
    pub fn size(&self, backend: &B) -> PhysicalSize<u32> {
        match self.parts() {
            Ok((context, surface)) => backend.surface_size(context, surface),
            Err(_) => PhysicalSize::new(0, 0),
        }
    }

    pub fn window(&self) -> &B::Window {
        &self.window
    }

    /// ### English
    /// Destroys the surface and, if owned, the context (idempotent, best effort).
    ///
    /// ### 中文
    /// 销毁表面，若持有上下文则一并销毁（幂等，尽力而为）。
    pub fn release(&mut self, backend: &mut B) {
        let Some(surface) = self.surface.take() else {
            return;
        };

        if let Some(context) = self.context.as_mut() {
            if let Err(err) = backend.destroy_surface(context, surface) {
                tracing::warn!(window = ?self.window, error = %err, "failed to destroy window surface");
            }
        }

        if self.owns_context {
            if let Some(context) = self.context.take() {
                if let Err(err) = backend.destroy_context(context) {
                    tracing::warn!(window = ?self.window, error = %err, "failed to destroy shared context");
                }
            }
        }
    }

    /// ### English
    /// Hands a lent context back after `release`.
    ///
    /// ### 中文
    /// 在 `release` 之后归还借用的上下文。
    pub fn take_context(&mut self) -> Option<B::Context> {
        if self.owns_context || self.surface.is_some() {
            return None;
        }
        self.context.take()
    }
}

impl<B: GlBackend> Drop for RenderSurface<B> {
    fn drop(&mut self) {
        if self.surface.is_some() {
            tracing::warn!(window = ?self.window, "render surface dropped without release; leaking it");
        }
    }
}
