//! ### English
//! Error types for the relay and for the GPU backend seam.
//!
//! Only start-up failures reach callers; everything after the handshake is logged.
//!
//! ### 中文
//! 中继与 GPU 后端接口的错误类型。
//!
//! 只有启动阶段的失败会返回给调用方；握手之后的错误只记录日志。

use std::time::Duration;

/// ### English
/// Failure reported by a `GlBackend` call.
///
/// ### 中文
/// `GlBackend` 调用返回的失败。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("failed to create GPU context: {0}")]
    Context(String),
    #[error("failed to create window surface: {0}")]
    Surface(String),
    #[error("failed to make surface current: {0}")]
    MakeCurrent(String),
    #[error("failed to swap buffers: {0}")]
    Swap(String),
    #[error("failed to set presentation time: {0}")]
    PresentationTime(String),
    #[error("external texture pipeline error: {0}")]
    Pipeline(String),
    #[error("failed to release GPU resource: {0}")]
    Release(String),
    /// ### English
    /// The surface or texture was already released.
    ///
    /// ### 中文
    /// 表面或纹理已被释放。
    #[error("resource already released")]
    Released,
}

/// ### English
/// Failure returned by `GlRelay::start`.
///
/// ### 中文
/// `GlRelay::start` 返回的失败。
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("render thread initialization failed: {0}")]
    Backend(#[from] BackendError),
    #[error("timed out after {0:?} waiting for the render thread to become ready")]
    HandshakeTimeout(Duration),
    #[error("render thread exited before completing the start-up handshake")]
    ThreadExited,
    #[error("failed to spawn render thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("relay has been shut down")]
    ShutDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_converts_into_relay_error() {
        let err: RelayError = BackendError::Surface("no window".to_string()).into();
        assert!(matches!(err, RelayError::Backend(BackendError::Surface(_))));
        assert_eq!(
            err.to_string(),
            "render thread initialization failed: failed to create window surface: no window"
        );
    }

    #[test]
    fn handshake_timeout_names_the_duration() {
        let err = RelayError::HandshakeTimeout(Duration::from_millis(250));
        assert!(err.to_string().contains("250ms"));
    }
}
