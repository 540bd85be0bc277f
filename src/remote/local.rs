use super::{RemoteFs, RemoteMeta, RemoteWriter};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;

/// 本地文件系统适配器，所有路径相对 base 解析
///
/// 同步到本机目录时使用，也是测试套件的远端实现。
pub struct LocalRemote {
    base_path: PathBuf,
    name: String,
}

impl LocalRemote {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = path.into();
        if !base_path.exists() {
            std::fs::create_dir_all(&base_path)?;
        }
        let name = format!("local:{}", base_path.display());
        Ok(Self { base_path, name })
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = path.trim_start_matches('/').trim_start_matches('\\');
        if path.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }
}

#[async_trait]
impl RemoteFs for LocalRemote {
    async fn stat(&self, path: &str) -> Result<Option<RemoteMeta>> {
        let full_path = self.resolve(path);

        match fs::metadata(&full_path).await {
            Ok(metadata) => {
                let modified = metadata
                    .modified()?
                    .duration_since(std::time::UNIX_EPOCH)?
                    .as_secs() as i64;

                Ok(Some(RemoteMeta {
                    size: if metadata.is_dir() { 0 } else { metadata.len() },
                    modified_time: modified,
                    is_dir: metadata.is_dir(),
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn mkdir_all(&self, path: &str) -> Result<()> {
        fs::create_dir_all(self.resolve(path)).await?;
        Ok(())
    }

    async fn create(&self, path: &str) -> Result<RemoteWriter> {
        let full_path = self.resolve(path);
        let file = fs::File::create(&full_path)
            .await
            .with_context(|| format!("创建文件失败: {}", full_path.display()))?;
        Ok(Box::new(file))
    }

    async fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(self.resolve(path), std::fs::Permissions::from_mode(mode)).await?;
        }
        #[cfg(not(unix))]
        let _ = (path, mode);
        Ok(())
    }

    async fn set_times(&self, path: &str, atime: i64, mtime: i64) -> Result<()> {
        let full_path = self.resolve(path);

        // FileTimes 只有阻塞版本
        tokio::task::spawn_blocking(move || -> Result<()> {
            let file = std::fs::File::options().write(true).open(&full_path)?;
            let to_system_time = |secs: i64| {
                std::time::UNIX_EPOCH + std::time::Duration::from_secs(secs.max(0) as u64)
            };
            let times = std::fs::FileTimes::new()
                .set_accessed(to_system_time(atime))
                .set_modified(to_system_time(mtime));
            file.set_times(times)?;
            Ok(())
        })
        .await??;

        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        fs::rename(self.resolve(from), self.resolve(to)).await?;
        Ok(())
    }

    async fn remove_dir_all(&self, path: &str) -> Result<()> {
        fs::remove_dir_all(self.resolve(path)).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn stat_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let remote = LocalRemote::new(dir.path()).unwrap();

        assert!(remote.stat("nope.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_write_and_stat() {
        let dir = tempfile::tempdir().unwrap();
        let remote = LocalRemote::new(dir.path()).unwrap();

        remote.mkdir_all("sub").await.unwrap();
        let mut writer = remote.create("sub/a.txt").await.unwrap();
        writer.write_all(b"hello").await.unwrap();
        writer.shutdown().await.unwrap();

        let meta = remote.stat("sub/a.txt").await.unwrap().unwrap();
        assert_eq!(meta.size, 5);
        assert!(!meta.is_dir);
    }

    #[tokio::test]
    async fn set_times_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let remote = LocalRemote::new(dir.path()).unwrap();

        let mut writer = remote.create("a.txt").await.unwrap();
        writer.write_all(b"x").await.unwrap();
        writer.shutdown().await.unwrap();

        remote.set_times("a.txt", 1_700_000_100, 1_700_000_000).await.unwrap();
        let meta = remote.stat("a.txt").await.unwrap().unwrap();
        assert_eq!(meta.modified_time, 1_700_000_000);
    }
}
