pub mod local;
pub mod sftp;

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::AsyncWrite;

pub use local::LocalRemote;
pub use sftp::SftpRemote;

/// 远程文件元数据（用于变更判定）
#[derive(Debug, Clone)]
pub struct RemoteMeta {
    pub size: u64,
    pub modified_time: i64,
    pub is_dir: bool,
}

/// 远程写句柄：流式写入，shutdown 时关闭
pub type RemoteWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// 远程文件系统抽象接口
#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// 获取元数据；路径不存在时返回 None
    async fn stat(&self, path: &str) -> Result<Option<RemoteMeta>>;

    /// 递归创建目录（幂等，并发调用同一路径不报错）
    async fn mkdir_all(&self, path: &str) -> Result<()>;

    /// 创建/截断文件并返回写句柄
    async fn create(&self, path: &str) -> Result<RemoteWriter>;

    /// 设置文件权限
    async fn chmod(&self, path: &str, mode: u32) -> Result<()>;

    /// 设置访问时间和修改时间（epoch 秒）
    async fn set_times(&self, path: &str, atime: i64, mtime: i64) -> Result<()>;

    /// 重命名；目录重命名在此边界上视为原子操作
    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// 递归删除目录
    async fn remove_dir_all(&self, path: &str) -> Result<()>;

    /// 适配器名称（用于日志）
    fn name(&self) -> &str;
}

/// 拼接远程路径（统一使用 / 分隔符）
pub fn join(base: &str, rel: &str) -> String {
    let rel = rel.trim_start_matches('/');
    if base == "/" {
        return format!("/{}", rel);
    }
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        rel.to_string()
    } else {
        format!("{}/{}", base, rel)
    }
}

/// 远程路径的父目录；顶层相对路径返回空串
pub fn parent(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some(("", _)) => "/",
        Some((p, _)) => p,
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join() {
        assert_eq!(join("/data/www", "a.txt"), "/data/www/a.txt");
        assert_eq!(join("/data/www/", "sub/b.txt"), "/data/www/sub/b.txt");
        assert_eq!(join("/", "a.txt"), "/a.txt");
        assert_eq!(join("", ".sync_tmp_x"), ".sync_tmp_x");
        assert_eq!(join("www", "a.txt"), "www/a.txt");
    }

    #[test]
    fn test_parent() {
        assert_eq!(parent("/data/www"), "/data");
        assert_eq!(parent("/www"), "/");
        assert_eq!(parent("www"), "");
        assert_eq!(parent("data/www/"), "data");
    }
}
