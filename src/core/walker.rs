use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// 本地文件系统条目
///
/// rel_path 相对同步根计算，是本地到远端位置映射的稳定标识，
/// 一次同步内唯一；扫描完成后不再变化。
#[derive(Debug, Clone)]
pub struct Entry {
    /// 本地绝对路径
    pub path: PathBuf,
    /// 相对同步根的路径（/ 分隔）
    pub rel_path: String,
    /// 字节数，目录为 0
    pub size: u64,
    /// 修改时间（epoch 秒），仅增量判定使用
    pub modified_time: i64,
    pub is_dir: bool,
}

/// 本地目录遍历器
pub struct LocalWalker {
    root: PathBuf,
}

impl LocalWalker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 递归枚举根目录下的所有条目，不含根目录本身
    ///
    /// 遍历中的任何 IO 错误（权限、文件消失）立即失败，
    /// 不使用不完整的本地快照。
    pub async fn walk(&self) -> Result<Vec<Entry>> {
        let root = self.root.clone();

        // walkdir 是阻塞遍历，放到 blocking 线程避免卡住 runtime
        tokio::task::spawn_blocking(move || Self::walk_blocking(&root))
            .await
            .context("遍历任务失败")?
    }

    fn walk_blocking(root: &Path) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();

        for item in WalkDir::new(root).follow_links(false) {
            let item =
                item.with_context(|| format!("遍历本地目录失败: {}", root.display()))?;
            let metadata = item
                .metadata()
                .with_context(|| format!("读取元数据失败: {}", item.path().display()))?;

            let rel = item
                .path()
                .strip_prefix(root)
                .with_context(|| format!("计算相对路径失败: {}", item.path().display()))?;

            // 跳过根目录本身
            if rel.as_os_str().is_empty() {
                continue;
            }

            let rel_path = rel
                .to_str()
                .with_context(|| format!("路径不是合法 UTF-8: {}", rel.display()))?
                .replace('\\', "/");

            let modified_time = metadata
                .modified()
                .with_context(|| format!("读取修改时间失败: {}", item.path().display()))?
                .duration_since(std::time::UNIX_EPOCH)
                .context("修改时间早于 epoch")?
                .as_secs() as i64;

            if metadata.is_dir() {
                debug!("发现目录: {}", rel_path);
            } else {
                debug!("发现文件: {} ({} 字节)", rel_path, metadata.len());
            }

            entries.push(Entry {
                path: item.path().to_path_buf(),
                rel_path,
                size: if metadata.is_dir() { 0 } else { metadata.len() },
                modified_time,
                is_dir: metadata.is_dir(),
            });
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn write_tree(root: &Path, files: &[(&str, &str)]) {
        for (rel, content) in files {
            let path = root.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, content).unwrap();
        }
    }

    #[tokio::test]
    async fn walk_collects_all_descendants() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path(), &[("a.txt", "0123456789"), ("sub/b.txt", "01234")]);

        let entries = LocalWalker::new(dir.path()).walk().await.unwrap();
        let by_rel: HashMap<_, _> = entries.iter().map(|e| (e.rel_path.as_str(), e)).collect();

        assert_eq!(entries.len(), 3);
        assert_eq!(by_rel["a.txt"].size, 10);
        assert!(!by_rel["a.txt"].is_dir);
        assert!(by_rel["sub"].is_dir);
        assert_eq!(by_rel["sub"].size, 0);
        assert_eq!(by_rel["sub/b.txt"].size, 5);
    }

    #[tokio::test]
    async fn walk_never_emits_root() {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path(), &[("a.txt", "x")]);

        let entries = LocalWalker::new(dir.path()).walk().await.unwrap();
        assert!(entries.iter().all(|e| !e.rel_path.is_empty()));
    }

    #[tokio::test]
    async fn walk_fails_on_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");

        assert!(LocalWalker::new(&missing).walk().await.is_err());
    }
}
