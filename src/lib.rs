pub mod cache;
pub mod config;
pub mod dedupe;
pub mod files;
pub mod import;
pub mod models;
pub mod parser;
pub mod poller;
pub mod schema;
pub mod storage;

// Convenient re-exports for tests and external callers
pub use cache::*;
pub use config::*;
pub use dedupe::*;
pub use files::*;
pub use import::*;
pub use models::*;
pub use poller::*;
pub use storage::*;
