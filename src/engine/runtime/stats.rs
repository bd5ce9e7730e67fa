/// ### English
/// Snapshot of relay counters since construction.
///
/// ### 中文
/// 自构造以来的中继计数快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// ### English
    /// Completed draw-and-swap passes on the primary surface.
    ///
    /// ### 中文
    /// 主表面上完成的绘制并 swap 次数。
    pub frames_rendered: u64,
    /// ### English
    /// Completed passes on the secondary surface.
    ///
    /// ### 中文
    /// 副表面上完成的绘制次数。
    pub secondary_frames: u64,
    /// ### English
    /// Waits that expired without a frame signal.
    ///
    /// ### 中文
    /// 超时仍未收到帧信号的等待次数。
    pub stalls: u64,
    /// ### English
    /// Frame-available signals received (before coalescing).
    ///
    /// ### 中文
    /// 收到的帧可用信号数（合并前）。
    pub signals: u64,
    pub frame_errors: u64,
}
