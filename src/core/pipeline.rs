use crate::core::progress::{ProgressSender, ProgressUpdate};
use crate::core::walker::Entry;
use crate::remote::{self, RemoteFs};
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// 流式复制缓冲区大小
const COPY_BUF_SIZE: usize = 32 * 1024;
/// 远程文件默认权限
const REMOTE_FILE_MODE: u32 = 0o644;

/// 单个条目的传输失败
#[derive(Debug, Error)]
#[error("{rel_path}: {cause}")]
pub struct TransferError {
    pub rel_path: String,
    pub cause: anyhow::Error,
}

/// 管道聚合错误：所有 worker 退出后统一上报，
/// 单个条目失败不会中断其余条目的传输
#[derive(Debug, Error)]
#[error("{} 个条目传输失败", .errors.len())]
pub struct PipelineError {
    pub errors: Vec<TransferError>,
}

/// 一次 upload 调用的传输统计
#[derive(Debug, Default, Clone)]
pub struct UploadStats {
    pub files_completed: u64,
    pub dirs_created: u64,
    pub bytes_transferred: u64,
}

#[derive(Debug, Default)]
struct PipelineStats {
    files_completed: AtomicU64,
    dirs_created: AtomicU64,
}

/// 固定大小缓冲区池，跨 worker 复用以减少分配
struct BufferPool {
    bufs: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    fn new() -> Self {
        Self {
            bufs: Mutex::new(Vec::new()),
        }
    }

    fn acquire(&self) -> Vec<u8> {
        self.bufs
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| vec![0u8; COPY_BUF_SIZE])
    }

    fn release(&self, buf: Vec<u8>) {
        self.bufs.lock().unwrap().push(buf);
    }
}

/// 上传管道：有界并发地执行远端副作用
///
/// 目录条目做幂等递归 mkdir，文件条目做流式内容复制加元数据修正。
pub struct UploadPipeline {
    remote: Arc<dyn RemoteFs>,
    workers: usize,
}

impl UploadPipeline {
    pub fn new(remote: Arc<dyn RemoteFs>, workers: usize) -> Self {
        Self {
            remote,
            workers: workers.max(1),
        }
    }

    /// 把条目上传到远程基路径下
    ///
    /// 每个条目独立传输，错误收集到共享列表；全部 worker 退出后
    /// 如有失败返回聚合错误。total_bytes 用于进度上报。
    pub async fn upload(
        &self,
        entries: Vec<Entry>,
        remote_base: &str,
        total_bytes: u64,
        progress: Option<ProgressSender>,
    ) -> Result<UploadStats, PipelineError> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let transferred = Arc::new(AtomicU64::new(0));
        let errors = Arc::new(Mutex::new(Vec::<TransferError>::new()));
        let stats = Arc::new(PipelineStats::default());
        let buffers = Arc::new(BufferPool::new());

        let mut handles = Vec::with_capacity(entries.len());

        for entry in entries {
            let permit = semaphore.clone().acquire_owned().await.unwrap();
            let remote = self.remote.clone();
            let remote_base = remote_base.to_string();
            let transferred = transferred.clone();
            let errors = errors.clone();
            let stats = stats.clone();
            let buffers = buffers.clone();
            let progress = progress.clone();

            let handle = tokio::spawn(async move {
                let result = if entry.is_dir {
                    Self::create_dir(remote.as_ref(), &remote_base, &entry).await
                } else {
                    Self::upload_file(
                        remote.as_ref(),
                        &remote_base,
                        &entry,
                        &buffers,
                        &transferred,
                        total_bytes,
                        progress.as_ref(),
                    )
                    .await
                };

                match result {
                    Ok(()) => {
                        if entry.is_dir {
                            stats.dirs_created.fetch_add(1, Ordering::Relaxed);
                        } else {
                            stats.files_completed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(e) => {
                        let mut errs = errors.lock().unwrap();
                        errs.push(TransferError {
                            rel_path: entry.rel_path.clone(),
                            cause: e,
                        });
                    }
                }

                drop(permit);
            });

            handles.push(handle);
        }

        // 等待全部 worker 退出后再汇总错误
        for handle in handles {
            let _ = handle.await;
        }

        let collected = std::mem::take(&mut *errors.lock().unwrap());
        if !collected.is_empty() {
            return Err(PipelineError { errors: collected });
        }

        Ok(UploadStats {
            files_completed: stats.files_completed.load(Ordering::Relaxed),
            dirs_created: stats.dirs_created.load(Ordering::Relaxed),
            bytes_transferred: transferred.load(Ordering::SeqCst),
        })
    }

    /// 创建远程目录（幂等）
    async fn create_dir(remote: &dyn RemoteFs, base: &str, entry: &Entry) -> Result<()> {
        let remote_dir = remote::join(base, &entry.rel_path);
        debug!("创建远程目录: {}", remote_dir);

        remote
            .mkdir_all(&remote_dir)
            .await
            .with_context(|| format!("创建远程目录失败: {}", remote_dir))
    }

    /// 上传单个文件：流式复制加元数据修正
    async fn upload_file(
        remote: &dyn RemoteFs,
        base: &str,
        entry: &Entry,
        buffers: &BufferPool,
        transferred: &AtomicU64,
        total_bytes: u64,
        progress: Option<&ProgressSender>,
    ) -> Result<()> {
        let remote_file = remote::join(base, &entry.rel_path);

        // 先确保父目录存在；与目录条目的创建并发时依赖 mkdir 的幂等性
        let parent = remote::parent(&remote_file);
        if !parent.is_empty() {
            remote
                .mkdir_all(parent)
                .await
                .with_context(|| format!("创建父目录失败: {}", parent))?;
        }

        let mut local = tokio::fs::File::open(&entry.path)
            .await
            .with_context(|| format!("打开本地文件失败: {}", entry.path.display()))?;

        let mut writer = remote
            .create(&remote_file)
            .await
            .with_context(|| format!("创建远程文件失败: {}", remote_file))?;

        let mut buf = buffers.acquire();
        let copy_result = async {
            loop {
                let n = local.read(&mut buf).await.context("读取本地文件失败")?;
                if n == 0 {
                    break;
                }
                writer
                    .write_all(&buf[..n])
                    .await
                    .with_context(|| format!("写入远程文件失败: {}", remote_file))?;

                // 累计字节在单一原子计数器上推进，随块刷新上报
                let cumulative = transferred.fetch_add(n as u64, Ordering::SeqCst) + n as u64;
                if let Some(tx) = progress {
                    let _ = tx.send(ProgressUpdate {
                        transferred: cumulative,
                        total: total_bytes,
                    });
                }
            }
            writer
                .shutdown()
                .await
                .with_context(|| format!("关闭远程文件失败: {}", remote_file))?;
            Ok::<(), anyhow::Error>(())
        }
        .await;
        buffers.release(buf);
        copy_result?;

        // 元数据修正是尽力而为，失败只记警告：内容正确性优先于元数据保真
        if let Err(e) = remote.chmod(&remote_file, REMOTE_FILE_MODE).await {
            warn!("设置权限失败: {}: {}", remote_file, e);
        }
        let now = chrono::Utc::now().timestamp();
        if let Err(e) = remote.set_times(&remote_file, now, entry.modified_time).await {
            warn!("设置修改时间失败: {}: {}", remote_file, e);
        }

        debug!("已上传: {} ({} 字节)", entry.rel_path, entry.size);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::progress;
    use crate::core::walker::LocalWalker;
    use crate::remote::LocalRemote;
    use std::path::Path;

    fn write_tree(root: &Path, files: &[(&str, &str)]) {
        for (rel, content) in files {
            let path = root.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, content).unwrap();
        }
    }

    async fn run_upload(workers: usize) -> (UploadStats, u64) {
        let local = tempfile::tempdir().unwrap();
        let remote_root = tempfile::tempdir().unwrap();
        write_tree(
            local.path(),
            &[
                ("a.txt", "0123456789"),
                ("sub/b.txt", "01234"),
                ("sub/deep/c.txt", "0123456"),
            ],
        );

        let entries = LocalWalker::new(local.path()).walk().await.unwrap();
        let total: u64 = entries.iter().filter(|e| !e.is_dir).map(|e| e.size).sum();

        let remote = Arc::new(LocalRemote::new(remote_root.path()).unwrap());
        let pipeline = UploadPipeline::new(remote, workers);

        let (tx, mut rx) = progress::channel();
        let stats = pipeline.upload(entries, "dst", total, Some(tx)).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(remote_root.path().join("dst/a.txt")).unwrap(),
            "0123456789"
        );
        assert_eq!(
            std::fs::read_to_string(remote_root.path().join("dst/sub/deep/c.txt")).unwrap(),
            "0123456"
        );

        // 进度单调不减，末值等于总量
        let mut last = 0u64;
        while let Ok(update) = rx.try_recv() {
            assert!(update.transferred >= last);
            assert_eq!(update.total, total);
            last = update.transferred;
        }

        (stats, last)
    }

    #[tokio::test]
    async fn upload_streams_files_single_worker() {
        let (stats, final_progress) = run_upload(1).await;

        assert_eq!(stats.files_completed, 3);
        assert_eq!(stats.bytes_transferred, 22);
        assert_eq!(final_progress, 22);
    }

    #[tokio::test]
    async fn upload_byte_totals_independent_of_worker_count() {
        let (stats, final_progress) = run_upload(4).await;

        assert_eq!(stats.files_completed, 3);
        assert_eq!(stats.bytes_transferred, 22);
        assert_eq!(final_progress, 22);
    }

    #[tokio::test]
    async fn errors_are_collected_not_short_circuited() {
        let local = tempfile::tempdir().unwrap();
        let remote_root = tempfile::tempdir().unwrap();
        write_tree(local.path(), &[("ok.txt", "fine")]);

        let mut entries = LocalWalker::new(local.path()).walk().await.unwrap();
        // 指向不存在本地文件的条目
        entries.push(Entry {
            path: local.path().join("vanished.txt"),
            rel_path: "vanished.txt".to_string(),
            size: 4,
            modified_time: 0,
            is_dir: false,
        });

        let remote = Arc::new(LocalRemote::new(remote_root.path()).unwrap());
        let pipeline = UploadPipeline::new(remote, 2);

        let err = pipeline.upload(entries, "dst", 8, None).await.unwrap_err();
        assert_eq!(err.errors.len(), 1);
        assert_eq!(err.errors[0].rel_path, "vanished.txt");

        // 失败的条目不影响其余条目落盘
        assert_eq!(
            std::fs::read_to_string(remote_root.path().join("dst/ok.txt")).unwrap(),
            "fine"
        );
    }
}
