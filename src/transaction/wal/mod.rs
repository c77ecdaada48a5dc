pub mod log_manager;

pub use log_manager::{LogError, LogIterator, LogManager};
