pub mod config;
pub mod store;
pub mod task;

mod error;

pub use config::{Config, ConfigIo};
pub use error::{Error, Result};
pub use store::{MemoryStore, Store};
pub use task::Task;
