use super::{RemoteFs, RemoteMeta, RemoteWriter};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use russh::client;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{FileAttributes, StatusCode};
use std::sync::Arc;
use tracing::debug;

/// 接受任意主机密钥，不做 known_hosts 校验
struct AcceptingHandler;

impl client::Handler for AcceptingHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// SFTP 适配器
///
/// 持有一条 SSH 会话上的 SFTP 子系统通道；SftpSession 自带请求多路复用，
/// 可被多个 worker 并发调用。
pub struct SftpRemote {
    sftp: SftpSession,
    // SSH 会话句柄随适配器存活，drop 时关闭连接
    _session: client::Handle<AcceptingHandler>,
    name: String,
}

impl SftpRemote {
    /// 建立 SSH 连接（密码认证）并打开 SFTP 子系统
    pub async fn connect(host: &str, port: u16, user: &str, password: &str) -> Result<Self> {
        let config = Arc::new(client::Config::default());
        let mut session = client::connect(config, (host, port), AcceptingHandler)
            .await
            .with_context(|| format!("SSH 连接失败: {}:{}", host, port))?;

        let auth = session
            .authenticate_password(user, password)
            .await
            .context("SSH 认证请求失败")?;
        if !auth.success() {
            return Err(anyhow!("SSH 密码认证被拒绝: {}@{}", user, host));
        }

        let channel = session.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .context("SFTP 会话初始化失败")?;

        let name = format!("sftp://{}@{}:{}", user, host, port);
        debug!("SFTP 会话已建立: {}", name);

        Ok(Self {
            sftp,
            _session: session,
            name,
        })
    }

    /// 递归删除目录树；SFTP 协议的 rmdir 不递归
    fn remove_tree<'a>(&'a self, path: String) -> BoxFuture<'a, Result<()>> {
        async move {
            for entry in self.sftp.read_dir(path.clone()).await? {
                let child = super::join(&path, &entry.file_name());
                if entry.file_type().is_dir() {
                    self.remove_tree(child).await?;
                } else {
                    self.sftp.remove_file(child).await?;
                }
            }
            self.sftp.remove_dir(path).await?;
            Ok(())
        }
        .boxed()
    }
}

#[async_trait]
impl RemoteFs for SftpRemote {
    async fn stat(&self, path: &str) -> Result<Option<RemoteMeta>> {
        match self.sftp.metadata(path.to_string()).await {
            Ok(attrs) => Ok(Some(RemoteMeta {
                size: attrs.size.unwrap_or(0),
                modified_time: attrs.mtime.map_or(0, |t| t as i64),
                is_dir: attrs.is_dir(),
            })),
            Err(russh_sftp::client::error::Error::Status(status))
                if status.status_code == StatusCode::NoSuchFile =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn mkdir_all(&self, path: &str) -> Result<()> {
        let mut current = String::new();
        if path.starts_with('/') {
            current.push('/');
        }

        for comp in path.split('/').filter(|c| !c.is_empty()) {
            if !current.is_empty() && !current.ends_with('/') {
                current.push('/');
            }
            current.push_str(comp);

            if self.sftp.metadata(current.clone()).await.is_ok() {
                continue;
            }
            if let Err(e) = self.sftp.create_dir(current.clone()).await {
                // 并发创建同一目录时可能已被其他 worker 建好
                if self.sftp.metadata(current.clone()).await.is_err() {
                    return Err(
                        anyhow::Error::from(e).context(format!("创建目录失败: {}", current))
                    );
                }
            }
        }

        Ok(())
    }

    async fn create(&self, path: &str) -> Result<RemoteWriter> {
        let file = self
            .sftp
            .create(path.to_string())
            .await
            .with_context(|| format!("创建远程文件失败: {}", path))?;
        Ok(Box::new(file))
    }

    async fn chmod(&self, path: &str, mode: u32) -> Result<()> {
        let attrs = FileAttributes {
            permissions: Some(mode),
            ..Default::default()
        };
        self.sftp.set_metadata(path.to_string(), attrs).await?;
        Ok(())
    }

    async fn set_times(&self, path: &str, atime: i64, mtime: i64) -> Result<()> {
        let attrs = FileAttributes {
            atime: Some(atime.max(0) as u32),
            mtime: Some(mtime.max(0) as u32),
            ..Default::default()
        };
        self.sftp.set_metadata(path.to_string(), attrs).await?;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.sftp.rename(from.to_string(), to.to_string()).await?;
        Ok(())
    }

    async fn remove_dir_all(&self, path: &str) -> Result<()> {
        self.remove_tree(path.to_string()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
