//! Email-gated report downloads.

mod email;
mod record;
mod service;

pub use email::Email;
pub use record::{DownloadLog, DownloadRecord, FileDownloadLog, MemoryDownloadLog};
pub use service::{DownloadGrant, DownloadService};
