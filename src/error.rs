use crate::core::pipeline::PipelineError;
use thiserror::Error;

/// 同步调用的错误面
///
/// 每个变体对应一个失败阶段；除 RollbackFailed 外，失败时
/// 远端目标要么保持同步前的完整状态，要么（增量模式）保留
/// 已成功上传的部分。
#[derive(Debug, Error)]
pub enum SyncError {
    /// 本地枚举失败，发生在任何远端修改之前
    #[error("扫描本地目录失败: {0}")]
    Walk(anyhow::Error),

    /// 临时目录创建失败（全量模式）
    #[error("创建临时目录失败: {0}")]
    Stage(anyhow::Error),

    /// 远程基目录创建失败（增量模式）
    #[error("创建远程目录失败: {0}")]
    Prepare(anyhow::Error),

    /// 条目传输聚合失败
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// 目标改名备份失败
    #[error("创建备份失败: {0}")]
    Backup(anyhow::Error),

    /// 切换失败且没有备份可恢复，目标从未存在过
    #[error("重命名临时目录失败: {0}")]
    Swap(anyhow::Error),

    /// 切换失败，已从备份恢复原状
    #[error("同步失败, 已从备份恢复: {0}")]
    SwapRestored(anyhow::Error),

    /// 切换失败且备份恢复也失败，远端可能处于不一致状态，
    /// 两个原因都保留以便人工干预
    #[error("同步失败且恢复失败: 切换错误: {swap}; 恢复错误: {restore}")]
    RollbackFailed {
        swap: anyhow::Error,
        restore: anyhow::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::TransferError;

    #[test]
    fn pipeline_error_reports_count() {
        let err = SyncError::from(PipelineError {
            errors: vec![TransferError {
                rel_path: "a.txt".to_string(),
                cause: anyhow::anyhow!("boom"),
            }],
        });

        assert!(err.to_string().contains("1 个条目"));
    }

    #[test]
    fn rollback_failed_carries_both_causes() {
        let err = SyncError::RollbackFailed {
            swap: anyhow::anyhow!("rename denied"),
            restore: anyhow::anyhow!("backup gone"),
        };

        let msg = err.to_string();
        assert!(msg.contains("rename denied"));
        assert!(msg.contains("backup gone"));
    }
}
