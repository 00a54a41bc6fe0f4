//! Queue Service backends.

pub mod file;
pub mod memory;

pub use file::FileQueueService;
pub use memory::InMemoryQueueService;
