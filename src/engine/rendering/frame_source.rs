//! ### English
//! External texture fed by the frame producer, plus the pipeline that blits it.
//!
//! ### 中文
//! 由帧生产者写入的外部纹理，以及把它绘制出去的管线。

use dpi::PhysicalSize;

use crate::engine::backend::{GlBackend, LatchedFrame, TextureId};
use crate::engine::error::BackendError;

/// ### English
/// Identity texture transform (used until the producer reports one).
///
/// ### 中文
/// 单位纹理变换矩阵（生产者报告之前使用）。
pub const IDENTITY_TRANSFORM: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// ### English
/// Owns the external texture and tracks the last latched frame.
///
/// ### 中文
/// 持有外部纹理，并记录最近一次锁存的帧。
pub struct FrameSource<B: GlBackend> {
    pipeline: Option<B::Pipeline>,
    texture_id: TextureId,
    last_timestamp_ns: i64,
    last_transform: [f32; 16],
}

impl<B: GlBackend> FrameSource<B> {
    /// ### English
    /// Allocates the external texture and draw pipeline. A context must be current.
    ///
    /// ### 中文
    /// 分配外部纹理与绘制管线；调用前必须已有 current 上下文。
    pub fn create_texture(backend: &mut B, clear_color: [f32; 4]) -> Result<Self, BackendError> {
        let pipeline = backend.create_pipeline(clear_color)?;
        let texture_id = backend.texture_id(&pipeline);
        tracing::debug!(texture = texture_id.0, "created external texture");
        Ok(Self {
            pipeline: Some(pipeline),
            texture_id,
            last_timestamp_ns: 0,
            last_transform: IDENTITY_TRANSFORM,
        })
    }

    /// ### English
    /// Producer-facing texture handle.
    ///
    /// ### 中文
    /// 面向生产者的纹理句柄。
    pub fn texture_id(&self) -> TextureId {
        self.texture_id
    }

    /// ### English
    /// Timestamp of the most recently latched frame (nanoseconds).
    ///
    /// ### 中文
    /// 最近一次锁存帧的时间戳（纳秒）。
    pub fn last_timestamp_ns(&self) -> i64 {
        self.last_timestamp_ns
    }

    /// ### English
    /// Latches the newest producer image. Without a new image the previous frame is kept.
    ///
    /// ### 中文
    /// 锁存生产者的最新图像；没有新图像时保留上一帧。
    pub fn update_frame(&mut self, backend: &mut B) -> Result<(), BackendError> {
        let pipeline = self.pipeline.as_mut().ok_or(BackendError::Released)?;
        if let Some(LatchedFrame {
            timestamp_ns,
            transform,
        }) = backend.update_frame(pipeline)?
        {
            self.last_timestamp_ns = timestamp_ns;
            self.last_transform = transform;
        }
        Ok(())
    }

    /// ### English
    /// Blits the texture onto the current surface; call once per target surface.
    ///
    /// ### 中文
    /// 把纹理绘制到当前 current 的表面；每个目标表面调用一次。
    pub fn draw_frame(
        &mut self,
        backend: &mut B,
        viewport: PhysicalSize<u32>,
    ) -> Result<(), BackendError> {
        let pipeline = self.pipeline.as_mut().ok_or(BackendError::Released)?;
        backend.draw_frame(pipeline, viewport, &self.last_transform)
    }

    /// ### English
    /// Drops the pipeline without GL calls, for when no context of its share group can be
    /// made current. The objects go away with the share group.
    ///
    /// ### 中文
    /// 不发出 GL 调用直接丢弃管线，用于无法把其共享组的上下文设为 current 的情况；
    /// 相关对象会随共享组一起释放。
    pub(crate) fn abandon(&mut self) {
        if self.pipeline.take().is_some() {
            tracing::debug!(texture = self.texture_id.0, "abandoned external texture");
        }
    }

    /// ### English
    /// Frees the texture and pipeline (idempotent, best effort).
    ///
    /// ### 中文
    /// 释放纹理与管线（幂等，尽力而为）。
    pub fn release(&mut self, backend: &mut B) {
        let Some(pipeline) = self.pipeline.take() else {
            return;
        };
        if let Err(err) = backend.destroy_pipeline(pipeline) {
            tracing::warn!(texture = self.texture_id.0, error = %err, "failed to release external texture");
        }
    }
}

impl<B: GlBackend> Drop for FrameSource<B> {
    fn drop(&mut self) {
        if self.pipeline.is_some() {
            tracing::warn!(texture = self.texture_id.0, "frame source dropped without release; leaking it");
        }
    }
}
