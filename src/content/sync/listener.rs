//! 同步监听器回调接口

use crate::content::sync::models::{SyncProgress, SyncStats};

/// 同步监听器
///
/// 回调在同步任务内部同步调用，实现方不应阻塞
pub trait SyncListener: Send + Sync {
    /// 一轮同步开始
    fn on_sync_start(&self);

    /// 阶段边界的进度
    fn on_sync_progress(&self, progress: &SyncProgress);

    /// 同步结束（包括离线和已是最新）
    fn on_sync_finish(&self, stats: &SyncStats);

    /// 整个阶段失败，本轮没有提交
    fn on_sync_failed(&self, reason: &str);
}

/// 默认空实现（无操作）
pub struct EmptySyncListener;

impl SyncListener for EmptySyncListener {
    fn on_sync_start(&self) {
        // 默认不做任何处理
    }

    fn on_sync_progress(&self, _progress: &SyncProgress) {
        // 默认不做任何处理
    }

    fn on_sync_finish(&self, _stats: &SyncStats) {
        // 默认不做任何处理
    }

    fn on_sync_failed(&self, _reason: &str) {
        // 默认不做任何处理
    }
}
