//! ### English
//! Values exchanged with a streaming peer around the relay: the resolved capture mode and
//! the H.264 codec parameters produced by the encoder fed from the secondary window.
//!
//! ### 中文
//! 围绕中继与流媒体对端交换的值：最终确定的采集模式，以及由副窗口驱动的编码器产出的
//! H.264 编解码参数。

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use dpi::PhysicalSize;
use serde::{Deserialize, Serialize};

/// ### English
/// Capture mode chosen for the producer.
///
/// ### 中文
/// 为生产者选定的采集模式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureFormat {
    pub size: PhysicalSize<u32>,
    pub framerate: u32,
}

impl CaptureFormat {
    pub fn new(width: u32, height: u32, framerate: u32) -> Self {
        Self {
            size: PhysicalSize::new(width, height),
            framerate,
        }
    }

    /// ### English
    /// Frame interval in nanoseconds (0 when the framerate is unknown).
    ///
    /// ### 中文
    /// 帧间隔（纳秒）；帧率未知时为 0。
    pub fn frame_interval_ns(&self) -> i64 {
        if self.framerate == 0 {
            return 0;
        }
        1_000_000_000 / i64::from(self.framerate)
    }
}

/// ### English
/// H.264 parameter sets announced to a peer.
///
/// ### 中文
/// 发送给对端的 H.264 参数集。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecParameters {
    /// ### English
    /// `profile-level-id`: six hex digits (profile_idc, constraint flags, level_idc).
    ///
    /// ### 中文
    /// `profile-level-id`：六位十六进制数（profile_idc、约束标志、level_idc）。
    pub profile_level: String,
    pub sps: Vec<u8>,
    pub pps: Vec<u8>,
}

impl CodecParameters {
    /// ### English
    /// Builds parameters from raw SPS/PPS NAL units, deriving `profile_level` from the SPS.
    /// Returns `None` if the SPS is too short to carry a profile.
    ///
    /// ### 中文
    /// 由原始 SPS/PPS NAL 单元构建参数，并从 SPS 推导 `profile_level`。
    /// SPS 过短、无法携带 profile 时返回 `None`。
    pub fn from_nal_units(sps: Vec<u8>, pps: Vec<u8>) -> Option<Self> {
        let profile_level = profile_level_id(&sps)?;
        Some(Self {
            profile_level,
            sps,
            pps,
        })
    }

    /// ### English
    /// Parses base64-encoded SPS/PPS as exchanged with the peer.
    ///
    /// ### 中文
    /// 解析与对端交换的 base64 编码 SPS/PPS。
    pub fn from_base64(
        profile_level: impl Into<String>,
        sps: &str,
        pps: &str,
    ) -> Result<Self, base64::DecodeError> {
        Ok(Self {
            profile_level: profile_level.into(),
            sps: STANDARD.decode(sps.trim())?,
            pps: STANDARD.decode(pps.trim())?,
        })
    }

    pub fn sps_base64(&self) -> String {
        STANDARD.encode(&self.sps)
    }

    pub fn pps_base64(&self) -> String {
        STANDARD.encode(&self.pps)
    }

    /// ### English
    /// `sprop-parameter-sets` value: `<sps>,<pps>` in base64.
    ///
    /// ### 中文
    /// `sprop-parameter-sets` 取值：base64 形式的 `<sps>,<pps>`。
    pub fn sprop_parameter_sets(&self) -> String {
        format!("{},{}", self.sps_base64(), self.pps_base64())
    }

    /// ### English
    /// Parses a `sprop-parameter-sets` value back into parameters.
    ///
    /// ### 中文
    /// 将 `sprop-parameter-sets` 取值解析回参数。
    pub fn from_sprop_parameter_sets(
        profile_level: impl Into<String>,
        value: &str,
    ) -> Result<Self, base64::DecodeError> {
        let (sps, pps) = value.split_once(',').unwrap_or((value, ""));
        Self::from_base64(profile_level, sps, pps)
    }
}

/// ### English
/// Hex `profile-level-id` from an SPS NAL unit (bytes 1..4 after the NAL header).
///
/// ### 中文
/// 从 SPS NAL 单元（NAL 头之后的第 1..4 字节）得到十六进制 `profile-level-id`。
fn profile_level_id(sps: &[u8]) -> Option<String> {
    let bytes = sps.get(1..4)?;
    Some(bytes.iter().map(|b| format!("{b:02x}")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPS: [u8; 8] = [0x67, 0x42, 0xc0, 0x1f, 0xda, 0x02, 0x80, 0xbf];
    const PPS: [u8; 4] = [0x68, 0xce, 0x3c, 0x80];

    #[test]
    fn profile_level_comes_from_sps_header() {
        let params = CodecParameters::from_nal_units(SPS.to_vec(), PPS.to_vec()).unwrap();
        assert_eq!(params.profile_level, "42c01f");
        assert!(CodecParameters::from_nal_units(vec![0x67, 0x42], PPS.to_vec()).is_none());
    }

    #[test]
    fn sprop_parameter_sets_joins_base64_with_comma() {
        let params = CodecParameters::from_nal_units(SPS.to_vec(), PPS.to_vec()).unwrap();
        assert_eq!(params.pps_base64(), "aM48gA==");
        let sprop = params.sprop_parameter_sets();
        assert_eq!(sprop, format!("{},aM48gA==", params.sps_base64()));

        let parsed = CodecParameters::from_sprop_parameter_sets("42c01f", &sprop).unwrap();
        assert_eq!(parsed, params);
    }

    #[test]
    fn invalid_base64_is_rejected() {
        assert!(CodecParameters::from_base64("42c01f", "not base64!", "aM48gA==").is_err());
    }

    #[test]
    fn capture_format_deserializes_from_json() {
        let format: CaptureFormat =
            serde_json::from_str(r#"{"size":{"width":640,"height":480},"framerate":30}"#).unwrap();
        assert_eq!(format, CaptureFormat::new(640, 480, 30));
        assert_eq!(format.frame_interval_ns(), 33_333_333);
        assert_eq!(CaptureFormat::new(1, 1, 0).frame_interval_ns(), 0);
    }
}
