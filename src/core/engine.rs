use crate::core::pipeline::UploadPipeline;
use crate::core::policy::{ChangePolicy, ChangeReason};
use crate::core::progress::ProgressSender;
use crate::core::walker::{Entry, LocalWalker};
use crate::error::SyncError;
use crate::remote::{self, RemoteFs};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 同步模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// 全量替换：临时目录 + 备份 + 原子切换
    Full,
    /// 增量：只传缺失或变化的文件，绝不删除远端
    Incremental,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Full => write!(f, "full"),
            SyncMode::Incremental => write!(f, "incremental"),
        }
    }
}

/// 同步参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    pub local_path: String,
    pub remote_path: String,
    #[serde(default = "default_mode")]
    pub mode: SyncMode,
    /// 并发 worker 数（≥1）
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_mode() -> SyncMode {
    SyncMode::Incremental
}

fn default_workers() -> usize {
    4
}

/// 同步报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub files_scanned: u32,
    pub files_uploaded: u32,
    pub files_skipped: u32,
    pub dirs_created: u32,
    pub bytes_transferred: u64,
    /// 耗时（秒）
    pub duration: u64,
}

/// 一次同步调用的会话状态：条目集合与待传字节总量
///
/// 在一次 sync 调用开始时创建，结束时丢弃，从不跨调用复用。
struct SyncSession {
    entries: Vec<Entry>,
    total_bytes: u64,
}

impl SyncSession {
    fn new(entries: Vec<Entry>) -> Self {
        let total_bytes = entries.iter().filter(|e| !e.is_dir).map(|e| e.size).sum();
        Self {
            entries,
            total_bytes,
        }
    }
}

/// 备份步骤的结果，切换失败时决定回滚路径
enum BackupState {
    /// 目标不存在，无备份可做
    None,
    /// 目标已改名到备份路径
    Taken(String),
}

/// 同步引擎
///
/// 持有调用方提供的已打开远程句柄；引擎本身在调用之间无状态。
/// 同一个引擎值不支持并发调用 sync。
pub struct SyncEngine {
    remote: Arc<dyn RemoteFs>,
    settings: SyncSettings,
    policy: ChangePolicy,
}

impl SyncEngine {
    pub fn new(remote: Arc<dyn RemoteFs>, settings: SyncSettings) -> Self {
        Self {
            remote,
            settings,
            policy: ChangePolicy,
        }
    }

    /// 执行同步；progress 为可选的进度接收端
    pub async fn sync(&self, progress: Option<ProgressSender>) -> Result<SyncReport, SyncError> {
        let start_time = chrono::Utc::now().timestamp();

        info!(
            "开始同步: {} -> {}:{} (模式: {}, workers: {})",
            self.settings.local_path,
            self.remote.name(),
            self.settings.remote_path,
            self.settings.mode,
            self.settings.workers
        );

        let walker = LocalWalker::new(&self.settings.local_path);
        let entries = walker.walk().await.map_err(SyncError::Walk)?;
        let session = SyncSession::new(entries);

        info!(
            "本地扫描完成: {} 个条目, 共 {} 字节",
            session.entries.len(),
            session.total_bytes
        );

        let mut report = match self.settings.mode {
            SyncMode::Full => self.full_sync(&session, progress).await?,
            SyncMode::Incremental => self.incremental_sync(&session, progress).await?,
        };

        let end_time = chrono::Utc::now().timestamp();
        report.duration = (end_time - start_time).max(0) as u64;

        info!(
            "同步完成: 上传 {} 个文件, 跳过 {} 个, {} 字节, 耗时 {}s",
            report.files_uploaded, report.files_skipped, report.bytes_transferred, report.duration
        );

        Ok(report)
    }

    /// 全量替换策略
    ///
    /// 状态机: Staging -> Uploaded -> BackedUp -> Swapped -> Committed。
    /// 临时目录在任何退出路径上都尽力清理；切换成功后该路径
    /// 已不存在，清理自然落空。
    async fn full_sync(
        &self,
        session: &SyncSession,
        progress: Option<ProgressSender>,
    ) -> Result<SyncReport, SyncError> {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let target = self.settings.remote_path.trim_end_matches('/').to_string();
        let temp_path = remote::join(
            remote::parent(&target),
            &format!(".sync_tmp_{}", timestamp),
        );
        let backup_path = format!("{}.bak_{}", target, timestamp);

        info!("创建临时目录: {}", temp_path);
        self.remote
            .mkdir_all(&temp_path)
            .await
            .map_err(SyncError::Stage)?;

        let result = self
            .full_sync_staged(session, &temp_path, &target, &backup_path, progress)
            .await;

        self.cleanup_dir(&temp_path, "临时").await;

        result
    }

    async fn full_sync_staged(
        &self,
        session: &SyncSession,
        temp_path: &str,
        target: &str,
        backup_path: &str,
        progress: Option<ProgressSender>,
    ) -> Result<SyncReport, SyncError> {
        // Uploaded: 全部条目传到临时目录，不做增量过滤。
        // 管道失败在这里返回即是安全中止——目标还未被动过。
        let pipeline = UploadPipeline::new(self.remote.clone(), self.settings.workers);
        let stats = pipeline
            .upload(
                session.entries.clone(),
                temp_path,
                session.total_bytes,
                progress,
            )
            .await?;

        // BackedUp: 目标已存在时先改名备份；不存在则跳过
        let backup = match self.remote.stat(target).await {
            Ok(Some(_)) => {
                info!("创建备份: {} -> {}", target, backup_path);
                self.remote
                    .rename(target, backup_path)
                    .await
                    .map_err(SyncError::Backup)?;
                BackupState::Taken(backup_path.to_string())
            }
            Ok(None) => BackupState::None,
            Err(e) => return Err(SyncError::Backup(e)),
        };

        // Swapped: 原子切换临时目录到目标路径
        info!("切换目录: {} -> {}", temp_path, target);
        if let Err(swap_err) = self.remote.rename(temp_path, target).await {
            return match backup {
                BackupState::Taken(backup_path) => {
                    // 回滚：把备份改名回目标
                    warn!("切换失败, 尝试从备份恢复: {}", swap_err);
                    match self.remote.rename(&backup_path, target).await {
                        Ok(()) => Err(SyncError::SwapRestored(swap_err)),
                        Err(restore_err) => Err(SyncError::RollbackFailed {
                            swap: swap_err,
                            restore: restore_err,
                        }),
                    }
                }
                BackupState::None => Err(SyncError::Swap(swap_err)),
            };
        }

        // Committed: 移除备份，失败只是清理麻烦，不算同步失败
        if let BackupState::Taken(backup_path) = backup {
            self.cleanup_dir(&backup_path, "备份").await;
        }

        Ok(SyncReport {
            files_scanned: session.entries.len() as u32,
            files_uploaded: stats.files_completed as u32,
            files_skipped: 0,
            dirs_created: stats.dirs_created as u32,
            bytes_transferred: stats.bytes_transferred,
            duration: 0,
        })
    }

    /// 增量策略
    ///
    /// 目录条目总是重新断言（创建廉价且幂等），文件条目按策略过滤。
    /// 无原子性保证；失败时已传文件保持在位。
    async fn incremental_sync(
        &self,
        session: &SyncSession,
        progress: Option<ProgressSender>,
    ) -> Result<SyncReport, SyncError> {
        let target = self.settings.remote_path.trim_end_matches('/').to_string();

        self.remote
            .mkdir_all(&target)
            .await
            .map_err(SyncError::Prepare)?;

        let mut selected = Vec::new();
        let mut skipped = 0u32;
        let mut upload_bytes = 0u64;

        for entry in &session.entries {
            if entry.is_dir {
                selected.push(entry.clone());
                continue;
            }

            let remote_file = remote::join(&target, &entry.rel_path);
            let meta = match self.remote.stat(&remote_file).await {
                Ok(meta) => meta,
                Err(e) => {
                    // stat 出错按缺失处理：宁可重传，不做破坏性动作
                    debug!("stat 失败, 视为缺失: {}: {}", remote_file, e);
                    None
                }
            };

            match self.policy.decide(entry, meta.as_ref()) {
                ChangeReason::Unchanged => {
                    debug!("跳过未变化文件: {}", entry.rel_path);
                    skipped += 1;
                }
                reason => {
                    debug!("需要上传: {} ({:?})", entry.rel_path, reason);
                    upload_bytes += entry.size;
                    selected.push(entry.clone());
                }
            }
        }

        info!(
            "增量过滤完成: {} 个条目待处理, {} 个跳过, {} 字节待传",
            selected.len(),
            skipped,
            upload_bytes
        );

        let pipeline = UploadPipeline::new(self.remote.clone(), self.settings.workers);
        let stats = pipeline
            .upload(selected, &target, upload_bytes, progress)
            .await?;

        Ok(SyncReport {
            files_scanned: session.entries.len() as u32,
            files_uploaded: stats.files_completed as u32,
            files_skipped: skipped,
            dirs_created: stats.dirs_created as u32,
            bytes_transferred: stats.bytes_transferred,
            duration: 0,
        })
    }

    /// 尽力删除远程目录；路径不存在时落空，失败只记警告
    async fn cleanup_dir(&self, path: &str, label: &str) {
        match self.remote.stat(path).await {
            Ok(Some(_)) => {
                info!("清理{}目录: {}", label, path);
                if let Err(e) = self.remote.remove_dir_all(path).await {
                    warn!("删除{}目录失败: {}: {}", label, path, e);
                }
            }
            Ok(None) => {}
            Err(e) => debug!("检查{}目录失败: {}: {}", label, path, e),
        }
    }
}
