//! Pipeline entry points.
//!
//! - `sync`: fetch, filter, resolve and create tickets for one source
//! - `migrate`: normalize the keys of an existing state file

pub mod migrate;
pub mod report;
pub mod retry;
pub mod sync;

pub use migrate::{MigrationReport, run_migration};
pub use report::{ItemOutcome, ItemReport, SyncReport};
pub use retry::RetryPolicy;
pub use sync::{Phase, SyncEngine, SyncOptions};
