pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod remote;

pub use config::{AppConfig, SshConfig};
pub use core::engine::{SyncEngine, SyncMode, SyncReport, SyncSettings};
pub use error::SyncError;
pub use remote::{LocalRemote, RemoteFs, RemoteMeta, SftpRemote};
