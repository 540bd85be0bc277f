use tokio::sync::mpsc;

/// 累计进度更新，按缓冲块刷新粒度发送
///
/// transferred 单调不减，最后一条的值等于实际传输总字节数。
#[derive(Debug, Clone, Copy)]
pub struct ProgressUpdate {
    pub transferred: u64,
    pub total: u64,
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressUpdate>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressUpdate>;

/// 创建进度通道
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}
