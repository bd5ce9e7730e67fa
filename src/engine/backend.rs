//! ### English
//! GPU backend seam.
//!
//! The relay never talks to EGL/GL directly. Every context, surface, and texture operation
//! goes through `GlBackend`, which is moved onto the render thread and only ever called
//! from there. Between runs (after `stop()`), the backend and its parked context travel
//! back to the owning `GlRelay` through the render thread's join handle.
//!
//! ### 中文
//! GPU 后端接口。
//!
//! 中继从不直接调用 EGL/GL。所有上下文、表面和纹理操作都经由 `GlBackend` 完成；
//! 后端会被移动到渲染线程，且只在该线程上调用。两次运行之间（`stop()` 之后），
//! 后端及其挂起的上下文通过渲染线程的 join handle 回到所属的 `GlRelay`。

use std::fmt;

use dpi::PhysicalSize;

use super::error::BackendError;

/// ### English
/// Producer-facing name of the external texture (a GL texture object name).
///
/// ### 中文
/// 面向生产者的外部纹理名称（GL 纹理对象名）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// ### English
/// Result of latching the newest producer image into the external texture.
///
/// ### 中文
/// 把生产者的最新图像锁存进外部纹理后的结果。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatchedFrame {
    /// ### English
    /// Capture timestamp in nanoseconds, as reported by the producer.
    ///
    /// ### 中文
    /// 生产者报告的采集时间戳（纳秒）。
    pub timestamp_ns: i64,
    /// ### English
    /// Column-major 4x4 texture-coordinate transform reported by the producer.
    ///
    /// ### 中文
    /// 生产者报告的列主序 4x4 纹理坐标变换矩阵。
    pub transform: [f32; 16],
}

/// ### English
/// Platform GPU stack used by the relay (EGL + GLES on Android).
///
/// Thread affinity: all methods are invoked on a relay-owned GPU thread: the render thread,
/// or the short-lived disposal thread that frees parked state on shutdown. Implementations
/// may assume that whatever they made current stays current until the next `make_current`,
/// `make_context_current` or `release_current` call on the same backend.
///
/// ### 中文
/// 中继使用的平台 GPU 栈（Android 上为 EGL + GLES）。
///
/// 线程亲和性：所有方法都在中继持有的 GPU 线程上调用，即渲染线程，或在关闭时释放挂起
/// 状态的短生命周期销毁线程。实现可以假设自己设置为 current 的对象会一直保持，直到同一
/// 后端上的下一次 `make_current`、`make_context_current` 或 `release_current` 调用。
pub trait GlBackend: Send + 'static {
    /// ### English
    /// GPU context. Must be movable between threads while not current.
    ///
    /// ### 中文
    /// GPU 上下文。在非 current 状态下必须可以跨线程移动。
    type Context: Send + 'static;
    /// ### English
    /// Window surface created from a `Window` for one context.
    ///
    /// ### 中文
    /// 基于 `Window` 为某个上下文创建的窗口表面。
    type Surface: Send + 'static;
    /// ### English
    /// Externally owned native window (display view or encoder input surface).
    ///
    /// ### 中文
    /// 外部持有的原生窗口（显示 view 或编码器输入表面）。
    type Window: Clone + fmt::Debug + Send + 'static;
    /// ### English
    /// External texture plus draw pipeline.
    ///
    /// ### 中文
    /// 外部纹理及其绘制管线。
    type Pipeline: Send + 'static;

    /// ### English
    /// Creates a context; when `share_with` is set, the new context shares GL objects
    /// (textures, programs) with it.
    ///
    /// ### 中文
    /// 创建上下文；若提供 `share_with`，新上下文与其共享 GL 对象（纹理、程序）。
    fn create_context(
        &mut self,
        share_with: Option<&Self::Context>,
    ) -> Result<Self::Context, BackendError>;

    fn destroy_context(&mut self, context: Self::Context) -> Result<(), BackendError>;

    fn create_window_surface(
        &mut self,
        context: &mut Self::Context,
        window: &Self::Window,
    ) -> Result<Self::Surface, BackendError>;

    fn destroy_surface(
        &mut self,
        context: &mut Self::Context,
        surface: Self::Surface,
    ) -> Result<(), BackendError>;

    fn make_current(
        &mut self,
        context: &Self::Context,
        surface: &Self::Surface,
    ) -> Result<(), BackendError>;

    /// ### English
    /// Makes `context` current without a window surface. Used only to free parked GPU
    /// state after the surfaces are gone.
    ///
    /// ### 中文
    /// 在没有窗口表面的情况下把 `context` 设为 current；仅用于在表面释放后销毁挂起的
    /// GPU 状态。
    fn make_context_current(&mut self, context: &Self::Context) -> Result<(), BackendError>;

    /// ### English
    /// Detaches any context from the calling thread.
    ///
    /// ### 中文
    /// 解除调用线程上绑定的上下文。
    fn release_current(&mut self) -> Result<(), BackendError>;

    fn swap_buffers(
        &mut self,
        context: &mut Self::Context,
        surface: &Self::Surface,
    ) -> Result<(), BackendError>;

    /// ### English
    /// Stamps the next swap of `surface` with `timestamp_ns`.
    ///
    /// ### 中文
    /// 为 `surface` 的下一次 swap 标记时间戳 `timestamp_ns`。
    fn set_presentation_time(
        &mut self,
        context: &Self::Context,
        surface: &Self::Surface,
        timestamp_ns: i64,
    ) -> Result<(), BackendError>;

    fn surface_size(&self, context: &Self::Context, surface: &Self::Surface) -> PhysicalSize<u32>;

    /// ### English
    /// Allocates the external texture and draw pipeline. A context is current.
    /// `clear_color` is applied before every blit.
    ///
    /// ### 中文
    /// 分配外部纹理与绘制管线；调用时已有 current 上下文。
    /// 每次绘制前使用 `clear_color` 清屏。
    fn create_pipeline(&mut self, clear_color: [f32; 4]) -> Result<Self::Pipeline, BackendError>;

    fn texture_id(&self, pipeline: &Self::Pipeline) -> TextureId;

    /// ### English
    /// Latches the newest producer image. `None` means nothing new was available.
    ///
    /// ### 中文
    /// 锁存生产者的最新图像；`None` 表示没有新图像。
    fn update_frame(
        &mut self,
        pipeline: &mut Self::Pipeline,
    ) -> Result<Option<LatchedFrame>, BackendError>;

    /// ### English
    /// Blits the external texture onto whatever surface is current.
    ///
    /// ### 中文
    /// 把外部纹理绘制到当前 current 的表面上。
    fn draw_frame(
        &mut self,
        pipeline: &mut Self::Pipeline,
        viewport: PhysicalSize<u32>,
        transform: &[f32; 16],
    ) -> Result<(), BackendError>;

    fn destroy_pipeline(&mut self, pipeline: Self::Pipeline) -> Result<(), BackendError>;
}
