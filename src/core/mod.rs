pub mod engine;
pub mod pipeline;
pub mod policy;
pub mod progress;
pub mod walker;

pub use engine::{SyncEngine, SyncMode, SyncReport, SyncSettings};
pub use pipeline::{PipelineError, TransferError, UploadPipeline, UploadStats};
pub use policy::{ChangePolicy, ChangeReason};
pub use progress::{ProgressReceiver, ProgressSender, ProgressUpdate};
pub use walker::{Entry, LocalWalker};
