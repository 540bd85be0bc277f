use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};
use upsync::core::progress;
use upsync::{AppConfig, SftpRemote, SyncEngine};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());
    let config = AppConfig::load(Path::new(&config_path))?;

    let _log_guard = upsync::logging::init(&config.log);

    info!(
        "连接 SSH: {}@{}:{}",
        config.ssh.user, config.ssh.host, config.ssh.port
    );
    let remote = SftpRemote::connect(
        &config.ssh.host,
        config.ssh.port,
        &config.ssh.user,
        &config.ssh.password,
    )
    .await?;

    let engine = SyncEngine::new(Arc::new(remote), config.sync.clone());

    // 进度条由引擎的进度通道驱动
    let (tx, mut rx) = progress::channel();
    let bar_task = tokio::spawn(async move {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{bar:40} {percent}% {bytes}/{total_bytes} ({bytes_per_sec})",
            )
            .unwrap(),
        );
        while let Some(update) = rx.recv().await {
            bar.set_length(update.total);
            bar.set_position(update.transferred);
        }
        bar.finish_and_clear();
    });

    let result = engine.sync(Some(tx)).await;
    let _ = bar_task.await;

    match result {
        Ok(report) => {
            info!(
                "同步成功: 上传 {} 个文件, 跳过 {} 个, 共 {} 字节",
                report.files_uploaded, report.files_skipped, report.bytes_transferred
            );
            Ok(())
        }
        Err(e) => {
            error!("同步失败: {}", e);
            Err(e.into())
        }
    }
}
