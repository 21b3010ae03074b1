//! Download engine: configuration, logging, the download ledger, resumable
//! transfers and the orchestrator that ties them together.

pub mod cache;
pub mod config_loader;
pub mod logger;
pub mod orchestration;
pub mod report;
pub mod retry;
pub mod transfer;

#[cfg(test)]
mod tests;

// Re-export commonly used types for convenience
pub use cache::DownloadCache;
pub use config_loader::{AppConfig, ConfigManager, LoadStatus};
pub use logger::init_logger;
pub use orchestration::{Orchestrator, targets_from_config};
pub use report::RunReport;
pub use transfer::HttpTransfer;
