//! ### English
//! `glow` implementation of the external-texture blit.
//!
//! The producer (camera preview) renders into a `GL_TEXTURE_EXTERNAL_OES` texture; each
//! draw samples it through the producer-reported texture transform onto a full-viewport quad.
//!
//! ### 中文
//! 外部纹理绘制的 `glow` 实现。
//!
//! 生产者（相机预览）渲染到 `GL_TEXTURE_EXTERNAL_OES` 纹理；每次绘制都按生产者报告的
//! 纹理变换对其采样，并铺满整个视口。

use std::sync::Arc;

use dpi::PhysicalSize;
use glow::HasContext as _;

use crate::engine::backend::{LatchedFrame, TextureId};
use crate::engine::error::BackendError;

/// ### English
/// `GL_TEXTURE_EXTERNAL_OES` (from `OES_EGL_image_external`).
///
/// ### 中文
/// `GL_TEXTURE_EXTERNAL_OES`（来自 `OES_EGL_image_external` 扩展）。
const TEXTURE_EXTERNAL_OES: u32 = 0x8D65;

const VERTEX_SHADER: &str = r#"
uniform mat4 uTexMatrix;
attribute vec4 aPosition;
attribute vec4 aTextureCoord;
varying vec2 vTextureCoord;
void main() {
    gl_Position = aPosition;
    vTextureCoord = (uTexMatrix * aTextureCoord).xy;
}
"#;

const FRAGMENT_SHADER: &str = r#"
#extension GL_OES_EGL_image_external : require
precision mediump float;
varying vec2 vTextureCoord;
uniform samplerExternalOES sTexture;
void main() {
    gl_FragColor = texture2D(sTexture, vTextureCoord);
}
"#;

/// ### English
/// Full-viewport triangle strip, interleaved `x, y, u, v`.
///
/// ### 中文
/// 覆盖整个视口的三角形带，交错存放 `x, y, u, v`。
const QUAD: [f32; 16] = [
    -1.0, -1.0, 0.0, 0.0, //
    1.0, -1.0, 1.0, 0.0, //
    -1.0, 1.0, 0.0, 1.0, //
    1.0, 1.0, 1.0, 1.0,
];

const FLOATS_PER_VERTEX: i32 = 4;
const VERTEX_STRIDE: i32 = FLOATS_PER_VERTEX * std::mem::size_of::<f32>() as i32;
const TEX_COORD_OFFSET: i32 = 2 * std::mem::size_of::<f32>() as i32;

fn quad_bytes() -> Vec<u8> {
    QUAD.iter().flat_map(|v| v.to_ne_bytes()).collect()
}

/// ### English
/// Platform hook that pulls the newest producer image into the external texture
/// (`SurfaceTexture.updateTexImage` on Android).
///
/// ### 中文
/// 把生产者最新图像拉入外部纹理的平台钩子（Android 上即 `SurfaceTexture.updateTexImage`）。
pub trait TextureLatch: Send + 'static {
    fn latch(&mut self, texture: TextureId) -> Option<LatchedFrame>;
}

impl<F> TextureLatch for F
where
    F: FnMut(TextureId) -> Option<LatchedFrame> + Send + 'static,
{
    fn latch(&mut self, texture: TextureId) -> Option<LatchedFrame> {
        self(texture)
    }
}

/// ### English
/// External texture, blit program, and quad buffer living in one share group.
///
/// ### 中文
/// 位于同一共享组中的外部纹理、绘制程序与四边形缓冲区。
pub struct GlowFramePipeline<L: TextureLatch> {
    gl: Arc<glow::Context>,
    texture: glow::NativeTexture,
    program: glow::NativeProgram,
    vertex_buffer: glow::NativeBuffer,
    a_position: u32,
    a_texture_coord: u32,
    u_tex_matrix: Option<glow::NativeUniformLocation>,
    u_texture: Option<glow::NativeUniformLocation>,
    clear_color: [f32; 4],
    latch: L,
}

// SAFETY: GL handles are plain object names; the pipeline is only used on the render thread
// that has its share group current, and moves between threads only while no context is current.
unsafe impl<L: TextureLatch> Send for GlowFramePipeline<L> {}

impl<L: TextureLatch> GlowFramePipeline<L> {
    /// ### English
    /// Creates the texture, program, and vertex buffer. A context must be current.
    /// On failure the latch is handed back together with the error.
    ///
    /// ### 中文
    /// 创建纹理、程序与顶点缓冲区；调用前必须已有 current 上下文。
    /// 失败时 latch 会随错误一起归还。
    pub fn new(
        gl: Arc<glow::Context>,
        latch: L,
        clear_color: [f32; 4],
    ) -> Result<Self, (BackendError, L)> {
        let program = match unsafe { link_program(&gl) } {
            Ok(program) => program,
            Err(err) => return Err((err, latch)),
        };

        let (a_position, a_texture_coord, u_tex_matrix, u_texture) = unsafe {
            (
                gl.get_attrib_location(program, "aPosition"),
                gl.get_attrib_location(program, "aTextureCoord"),
                gl.get_uniform_location(program, "uTexMatrix"),
                gl.get_uniform_location(program, "sTexture"),
            )
        };
        let (Some(a_position), Some(a_texture_coord)) = (a_position, a_texture_coord) else {
            unsafe { gl.delete_program(program) };
            return Err((
                BackendError::Pipeline("blit program is missing vertex attributes".to_string()),
                latch,
            ));
        };

        let texture = match unsafe { gl.create_texture() } {
            Ok(texture) => texture,
            Err(err) => {
                unsafe { gl.delete_program(program) };
                return Err((BackendError::Pipeline(err), latch));
            }
        };
        unsafe {
            gl.bind_texture(TEXTURE_EXTERNAL_OES, Some(texture));
            gl.tex_parameter_i32(
                TEXTURE_EXTERNAL_OES,
                glow::TEXTURE_MIN_FILTER,
                glow::LINEAR as i32,
            );
            gl.tex_parameter_i32(
                TEXTURE_EXTERNAL_OES,
                glow::TEXTURE_MAG_FILTER,
                glow::LINEAR as i32,
            );
            gl.tex_parameter_i32(
                TEXTURE_EXTERNAL_OES,
                glow::TEXTURE_WRAP_S,
                glow::CLAMP_TO_EDGE as i32,
            );
            gl.tex_parameter_i32(
                TEXTURE_EXTERNAL_OES,
                glow::TEXTURE_WRAP_T,
                glow::CLAMP_TO_EDGE as i32,
            );
            gl.bind_texture(TEXTURE_EXTERNAL_OES, None);
        }

        let vertex_buffer = match unsafe { gl.create_buffer() } {
            Ok(buffer) => buffer,
            Err(err) => {
                unsafe {
                    gl.delete_texture(texture);
                    gl.delete_program(program);
                }
                return Err((BackendError::Pipeline(err), latch));
            }
        };
        unsafe {
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vertex_buffer));
            gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, &quad_bytes(), glow::STATIC_DRAW);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
        }

        Ok(Self {
            gl,
            texture,
            program,
            vertex_buffer,
            a_position,
            a_texture_coord,
            u_tex_matrix,
            u_texture,
            clear_color,
            latch,
        })
    }

    pub fn texture_id(&self) -> TextureId {
        TextureId(self.texture.0.get())
    }

    /// ### English
    /// Pulls the newest producer image through the platform latch.
    ///
    /// ### 中文
    /// 通过平台钩子拉取生产者的最新图像。
    pub fn latch(&mut self) -> Option<LatchedFrame> {
        let texture = self.texture_id();
        self.latch.latch(texture)
    }

    /// ### English
    /// Draws the external texture over the whole viewport of the current surface.
    ///
    /// ### 中文
    /// 在当前表面的整个视口上绘制外部纹理。
    pub fn draw(
        &mut self,
        viewport: PhysicalSize<u32>,
        transform: &[f32; 16],
    ) -> Result<(), BackendError> {
        let gl = &self.gl;
        let [r, g, b, a] = self.clear_color;
        unsafe {
            gl.viewport(0, 0, viewport.width as i32, viewport.height as i32);
            gl.clear_color(r, g, b, a);
            gl.clear(glow::COLOR_BUFFER_BIT);

            gl.use_program(Some(self.program));
            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(TEXTURE_EXTERNAL_OES, Some(self.texture));
            gl.uniform_1_i32(self.u_texture.as_ref(), 0);
            gl.uniform_matrix_4_f32_slice(self.u_tex_matrix.as_ref(), false, transform);

            gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vertex_buffer));
            gl.enable_vertex_attrib_array(self.a_position);
            gl.vertex_attrib_pointer_f32(self.a_position, 2, glow::FLOAT, false, VERTEX_STRIDE, 0);
            gl.enable_vertex_attrib_array(self.a_texture_coord);
            gl.vertex_attrib_pointer_f32(
                self.a_texture_coord,
                2,
                glow::FLOAT,
                false,
                VERTEX_STRIDE,
                TEX_COORD_OFFSET,
            );

            gl.draw_arrays(glow::TRIANGLE_STRIP, 0, QUAD.len() as i32 / FLOATS_PER_VERTEX);

            gl.disable_vertex_attrib_array(self.a_position);
            gl.disable_vertex_attrib_array(self.a_texture_coord);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
            gl.bind_texture(TEXTURE_EXTERNAL_OES, None);
            gl.use_program(None);
        }

        match unsafe { gl.get_error() } {
            glow::NO_ERROR => Ok(()),
            code => Err(BackendError::Pipeline(format!("draw failed: GL error 0x{code:x}"))),
        }
    }

    /// ### English
    /// Deletes the GL objects and hands the latch back. A context of the same share group
    /// must be current.
    ///
    /// ### 中文
    /// 删除 GL 对象并归还 latch；调用前必须有同一共享组的上下文为 current。
    pub fn destroy(self) -> L {
        unsafe {
            self.gl.delete_buffer(self.vertex_buffer);
            self.gl.delete_texture(self.texture);
            self.gl.delete_program(self.program);
        }
        self.latch
    }
}

unsafe fn compile_shader(
    gl: &glow::Context,
    kind: u32,
    source: &str,
) -> Result<glow::NativeShader, BackendError> {
    let shader = unsafe { gl.create_shader(kind) }.map_err(BackendError::Pipeline)?;
    unsafe {
        gl.shader_source(shader, source);
        gl.compile_shader(shader);
        if !gl.get_shader_compile_status(shader) {
            let log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            return Err(BackendError::Pipeline(format!("shader compile failed: {log}")));
        }
    }
    Ok(shader)
}

unsafe fn link_program(gl: &glow::Context) -> Result<glow::NativeProgram, BackendError> {
    let vertex = unsafe { compile_shader(gl, glow::VERTEX_SHADER, VERTEX_SHADER)? };
    let fragment = match unsafe { compile_shader(gl, glow::FRAGMENT_SHADER, FRAGMENT_SHADER) } {
        Ok(shader) => shader,
        Err(err) => {
            unsafe { gl.delete_shader(vertex) };
            return Err(err);
        }
    };

    let program = match unsafe { gl.create_program() } {
        Ok(program) => program,
        Err(err) => {
            unsafe {
                gl.delete_shader(vertex);
                gl.delete_shader(fragment);
            }
            return Err(BackendError::Pipeline(err));
        }
    };

    unsafe {
        gl.attach_shader(program, vertex);
        gl.attach_shader(program, fragment);
        gl.link_program(program);
        gl.detach_shader(program, vertex);
        gl.detach_shader(program, fragment);
        gl.delete_shader(vertex);
        gl.delete_shader(fragment);

        if !gl.get_program_link_status(program) {
            let log = gl.get_program_info_log(program);
            gl.delete_program(program);
            return Err(BackendError::Pipeline(format!("program link failed: {log}")));
        }
    }
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_is_a_full_viewport_strip() {
        let vertices = QUAD.len() as i32 / FLOATS_PER_VERTEX;
        assert_eq!(vertices, 4);
        assert_eq!(quad_bytes().len(), QUAD.len() * 4);
        for vertex in QUAD.chunks(FLOATS_PER_VERTEX as usize) {
            assert_eq!(vertex[0].abs(), 1.0);
            assert_eq!(vertex[1].abs(), 1.0);
            assert_eq!(vertex[2], (vertex[0] + 1.0) / 2.0);
            assert_eq!(vertex[3], (vertex[1] + 1.0) / 2.0);
        }
    }

    #[test]
    fn shaders_sample_the_external_texture_through_the_transform() {
        assert!(FRAGMENT_SHADER.contains("samplerExternalOES sTexture"));
        assert!(VERTEX_SHADER.contains("uTexMatrix * aTextureCoord"));
    }

    #[test]
    fn closures_act_as_texture_latches() {
        let mut latch = |texture: TextureId| {
            Some(LatchedFrame {
                timestamp_ns: i64::from(texture.0) * 10,
                transform: crate::engine::rendering::IDENTITY_TRANSFORM,
            })
        };
        let frame = TextureLatch::latch(&mut latch, TextureId(7));
        assert_eq!(frame.map(|f| f.timestamp_ns), Some(70));
    }
}
