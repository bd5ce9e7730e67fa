//! ### English
//! Relay configuration.
//!
//! Durations are expressed in milliseconds when deserialized so embedders can keep the
//! relay settings in their own JSON/TOML configuration.
//!
//! ### 中文
//! 中继配置。
//!
//! 反序列化时时长以毫秒表示，便于宿主把中继设置放进自己的 JSON/TOML 配置中。

use std::time::Duration;

use serde::Deserialize;

/// ### English
/// Default frame wait before a stall is reported.
///
/// ### 中文
/// 报告卡顿前等待帧的默认时长。
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_millis(2500);

/// ### English
/// Default time `start()` waits for the render thread handshake.
///
/// ### 中文
/// `start()` 等待渲染线程握手的默认时长。
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULT_THREAD_NAME: &str = "gl-relay";

/// ### English
/// Tunables for one `GlRelay`.
///
/// ### 中文
/// 单个 `GlRelay` 的可调参数。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// ### English
    /// Bounded wait for a frame signal. Expiry is a diagnostic, never a shutdown.
    ///
    /// ### 中文
    /// 等待帧信号的上限；超时仅用于诊断，不会导致退出。
    #[serde(rename = "stall_timeout_ms", with = "millis")]
    pub stall_timeout: Duration,
    /// ### English
    /// How long `start()` blocks on the render thread handshake.
    ///
    /// ### 中文
    /// `start()` 阻塞等待渲染线程握手的时长。
    #[serde(rename = "handshake_timeout_ms", with = "millis")]
    pub handshake_timeout: Duration,
    /// ### English
    /// Name given to the dedicated render thread.
    ///
    /// ### 中文
    /// 独立渲染线程的名称。
    pub thread_name: String,
    /// ### English
    /// RGBA clear color applied before each blit.
    ///
    /// ### 中文
    /// 每次绘制前使用的 RGBA 清屏颜色。
    pub clear_color: [f32; 4],
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl RelayConfig {
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn with_clear_color(mut self, rgba: [f32; 4]) -> Self {
        self.clear_color = rgba;
        self
    }

    /// ### English
    /// Clamps zero timeouts to 1 ms so waits never spin.
    ///
    /// ### 中文
    /// 把为 0 的超时钳制为 1 毫秒，避免等待退化为空转。
    pub(crate) fn normalized(mut self) -> Self {
        let floor = Duration::from_millis(1);
        self.stall_timeout = self.stall_timeout.max(floor);
        self.handshake_timeout = self.handshake_timeout.max(floor);
        if self.thread_name.is_empty() {
            self.thread_name = DEFAULT_THREAD_NAME.to_string();
        }
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_reference_stall_timeout() {
        let config = RelayConfig::default();
        assert_eq!(config.stall_timeout, Duration::from_millis(2500));
        assert_eq!(config.thread_name, "gl-relay");
    }

    #[test]
    fn deserializes_millisecond_fields_and_fills_defaults() {
        let config: RelayConfig =
            serde_json::from_str(r#"{ "stall_timeout_ms": 100, "thread_name": "preview" }"#)
                .unwrap();
        assert_eq!(config.stall_timeout, Duration::from_millis(100));
        assert_eq!(config.handshake_timeout, DEFAULT_HANDSHAKE_TIMEOUT);
        assert_eq!(config.thread_name, "preview");
    }

    #[test]
    fn normalized_clamps_zero_durations() {
        let config = RelayConfig::default()
            .with_stall_timeout(Duration::ZERO)
            .with_thread_name("")
            .normalized();
        assert_eq!(config.stall_timeout, Duration::from_millis(1));
        assert_eq!(config.thread_name, "gl-relay");
    }
}
