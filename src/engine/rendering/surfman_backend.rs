//! ### English
//! `GlBackend` built on surfman (EGL on Android).
//!
//! Each surfman context carries exactly one bound widget surface: the root context binds the
//! display window for the duration of a run, and every encoder surface gets its own context
//! created in the root's share group. Presentation timestamps go through
//! `eglPresentationTimeANDROID`, which surfman does not wrap.
//!
//! ### 中文
//! 基于 surfman 的 `GlBackend`（Android 上为 EGL）。
//!
//! 每个 surfman 上下文只绑定一个 widget 表面：根上下文在一次运行期间绑定显示窗口，
//! 每个编码器表面则在根上下文的共享组中拥有自己的上下文。呈现时间戳通过
//! `eglPresentationTimeANDROID` 设置（surfman 未封装该扩展）。

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::Arc;

use dpi::PhysicalSize;
use euclid::default::Size2D;
use surfman::{
    Connection, Context, ContextAttributeFlags, ContextAttributes, ContextDescriptor, Device,
    GLVersion, SurfaceAccess, SurfaceType,
};

use crate::engine::backend::{GlBackend, LatchedFrame, TextureId};
use crate::engine::error::BackendError;

use super::glow_pipeline::{GlowFramePipeline, TextureLatch};

type EglPresentationTimeAndroid =
    unsafe extern "C" fn(display: *const c_void, surface: *const c_void, time_ns: i64) -> u32;

/// ### English
/// `ANativeWindow*` handed over by the platform glue, with its size at hand-over time.
/// The glue keeps the window alive while it is attached to the relay.
///
/// ### 中文
/// 平台胶水层交给中继的 `ANativeWindow*` 及其交付时的尺寸。
/// 窗口附着在中继期间由胶水层保证其存活。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AndroidWindow {
    pub native_window: NonNull<c_void>,
    pub size: PhysicalSize<u32>,
}

unsafe impl Send for AndroidWindow {}

/// ### English
/// surfman context moved between the relay and its render thread while not current.
///
/// ### 中文
/// 在非 current 状态下于中继与渲染线程之间移动的 surfman 上下文。
pub struct SurfmanContext(Context);

unsafe impl Send for SurfmanContext {}

/// ### English
/// Marker for the widget surface bound inside a `SurfmanContext`.
///
/// ### 中文
/// 表示已绑定在 `SurfmanContext` 内部的 widget 表面。
#[derive(Debug)]
pub struct BoundWidget {
    window: AndroidWindow,
}

/// ### English
/// surfman device plus the loaded GL entry points.
///
/// ### 中文
/// surfman 设备以及已加载的 GL 函数入口。
pub struct SurfmanBackend<L: TextureLatch> {
    connection: Connection,
    device: Device,
    descriptor: ContextDescriptor,
    glow: Option<Arc<glow::Context>>,
    presentation_time: Option<EglPresentationTimeAndroid>,
    latch: Option<L>,
}

unsafe impl<L: TextureLatch> Send for SurfmanBackend<L> {}

fn surfman_err(kind: fn(String) -> BackendError) -> impl Fn(surfman::Error) -> BackendError {
    move |err| kind(format!("{err:?}"))
}

impl<L: TextureLatch> SurfmanBackend<L> {
    /// ### English
    /// Opens the default EGL display and prepares a GLES 3.0 context descriptor.
    ///
    /// `latch` is moved into the external texture pipeline when the relay first starts.
    ///
    /// ### 中文
    /// 打开默认 EGL display 并准备 GLES 3.0 上下文描述符。
    ///
    /// `latch` 会在中继首次启动时移入外部纹理管线。
    pub fn new(latch: L) -> Result<Self, BackendError> {
        let connection = Connection::new().map_err(surfman_err(BackendError::Context))?;
        let adapter = connection
            .create_adapter()
            .map_err(surfman_err(BackendError::Context))?;
        let device = connection
            .create_device(&adapter)
            .map_err(surfman_err(BackendError::Context))?;
        let descriptor = device
            .create_context_descriptor(&ContextAttributes {
                version: GLVersion::new(3, 0),
                flags: ContextAttributeFlags::empty(),
            })
            .map_err(surfman_err(BackendError::Context))?;

        Ok(Self {
            connection,
            device,
            descriptor,
            glow: None,
            presentation_time: None,
            latch: Some(latch),
        })
    }

    fn load_entry_points(&mut self, context: &Context) {
        if self.glow.is_some() {
            return;
        }
        let device = &self.device;
        let glow = unsafe {
            glow::Context::from_loader_function(|name| device.get_proc_address(context, name))
        };
        self.glow = Some(Arc::new(glow));

        let proc = device.get_proc_address(context, "eglPresentationTimeANDROID");
        self.presentation_time = (!proc.is_null()).then(|| unsafe {
            std::mem::transmute::<*const c_void, EglPresentationTimeAndroid>(proc)
        });
        if self.presentation_time.is_none() {
            tracing::warn!("eglPresentationTimeANDROID unavailable; encoder frames use swap time");
        }
    }
}

impl<L: TextureLatch> GlBackend for SurfmanBackend<L> {
    type Context = SurfmanContext;
    type Surface = BoundWidget;
    type Window = AndroidWindow;
    type Pipeline = GlowFramePipeline<L>;

    fn create_context(
        &mut self,
        share_with: Option<&SurfmanContext>,
    ) -> Result<SurfmanContext, BackendError> {
        let context = self
            .device
            .create_context(&self.descriptor, share_with.map(|shared| &shared.0))
            .map_err(surfman_err(BackendError::Context))?;
        self.load_entry_points(&context);
        Ok(SurfmanContext(context))
    }

    fn destroy_context(&mut self, mut context: SurfmanContext) -> Result<(), BackendError> {
        self.device
            .destroy_context(&mut context.0)
            .map_err(surfman_err(BackendError::Release))
    }

    fn create_window_surface(
        &mut self,
        context: &mut SurfmanContext,
        window: &AndroidWindow,
    ) -> Result<BoundWidget, BackendError> {
        let size = Size2D::new(window.size.width as i32, window.size.height as i32);
        let native_widget = unsafe {
            self.connection
                .create_native_widget_from_ptr(window.native_window.as_ptr(), size)
        };
        let surface = self
            .device
            .create_surface(
                &context.0,
                SurfaceAccess::GPUOnly,
                SurfaceType::Widget { native_widget },
            )
            .map_err(surfman_err(BackendError::Surface))?;
        self.device
            .bind_surface_to_context(&mut context.0, surface)
            .map_err(|(err, mut surface)| {
                let _ = self.device.destroy_surface(&mut context.0, &mut surface);
                BackendError::Surface(format!("{err:?}"))
            })?;
        Ok(BoundWidget { window: *window })
    }

    fn destroy_surface(
        &mut self,
        context: &mut SurfmanContext,
        _surface: BoundWidget,
    ) -> Result<(), BackendError> {
        let unbound = self
            .device
            .unbind_surface_from_context(&mut context.0)
            .map_err(surfman_err(BackendError::Release))?;
        if let Some(mut surface) = unbound {
            self.device
                .destroy_surface(&mut context.0, &mut surface)
                .map_err(surfman_err(BackendError::Release))?;
        }
        Ok(())
    }

    fn make_current(
        &mut self,
        context: &SurfmanContext,
        _surface: &BoundWidget,
    ) -> Result<(), BackendError> {
        self.device
            .make_context_current(&context.0)
            .map_err(surfman_err(BackendError::MakeCurrent))
    }

    fn make_context_current(&mut self, context: &SurfmanContext) -> Result<(), BackendError> {
        self.device
            .make_context_current(&context.0)
            .map_err(surfman_err(BackendError::MakeCurrent))
    }

    fn release_current(&mut self) -> Result<(), BackendError> {
        self.device
            .make_no_context_current()
            .map_err(surfman_err(BackendError::MakeCurrent))
    }

    fn swap_buffers(
        &mut self,
        context: &mut SurfmanContext,
        _surface: &BoundWidget,
    ) -> Result<(), BackendError> {
        let Some(mut surface) = self
            .device
            .unbind_surface_from_context(&mut context.0)
            .map_err(surfman_err(BackendError::Swap))?
        else {
            return Err(BackendError::Released);
        };
        let presented = self.device.present_surface(&context.0, &mut surface);
        self.device
            .bind_surface_to_context(&mut context.0, surface)
            .map_err(|(err, mut surface)| {
                let _ = self.device.destroy_surface(&mut context.0, &mut surface);
                BackendError::Swap(format!("{err:?}"))
            })?;
        presented.map_err(surfman_err(BackendError::Swap))
    }

    fn set_presentation_time(
        &mut self,
        context: &SurfmanContext,
        _surface: &BoundWidget,
        timestamp_ns: i64,
    ) -> Result<(), BackendError> {
        let Some(presentation_time) = self.presentation_time else {
            return Ok(());
        };
        let display = self.device.native_device().egl_display;
        let native = self.device.native_context(&context.0);
        let ok = unsafe {
            presentation_time(
                display as *const c_void,
                native.egl_draw_surface as *const c_void,
                timestamp_ns,
            )
        };
        if ok == 0 {
            return Err(BackendError::PresentationTime(
                "eglPresentationTimeANDROID returned EGL_FALSE".to_string(),
            ));
        }
        Ok(())
    }

    fn surface_size(&self, context: &SurfmanContext, surface: &BoundWidget) -> PhysicalSize<u32> {
        match self.device.context_surface_info(&context.0) {
            Ok(Some(info)) => PhysicalSize::new(
                info.size.width.max(0) as u32,
                info.size.height.max(0) as u32,
            ),
            _ => surface.window.size,
        }
    }

    fn create_pipeline(
        &mut self,
        clear_color: [f32; 4],
    ) -> Result<GlowFramePipeline<L>, BackendError> {
        let gl = self
            .glow
            .clone()
            .ok_or_else(|| BackendError::Pipeline("GL entry points not loaded".to_string()))?;
        let latch = self
            .latch
            .take()
            .ok_or_else(|| BackendError::Pipeline("texture latch already in use".to_string()))?;
        GlowFramePipeline::new(gl, latch, clear_color).map_err(|(err, latch)| {
            self.latch = Some(latch);
            err
        })
    }

    fn texture_id(&self, pipeline: &GlowFramePipeline<L>) -> TextureId {
        pipeline.texture_id()
    }

    fn update_frame(
        &mut self,
        pipeline: &mut GlowFramePipeline<L>,
    ) -> Result<Option<LatchedFrame>, BackendError> {
        Ok(pipeline.latch())
    }

    fn draw_frame(
        &mut self,
        pipeline: &mut GlowFramePipeline<L>,
        viewport: PhysicalSize<u32>,
        transform: &[f32; 16],
    ) -> Result<(), BackendError> {
        pipeline.draw(viewport, transform)
    }

    fn destroy_pipeline(&mut self, pipeline: GlowFramePipeline<L>) -> Result<(), BackendError> {
        self.latch = Some(pipeline.destroy());
        Ok(())
    }
}
