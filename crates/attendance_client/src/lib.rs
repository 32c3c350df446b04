pub mod admin;
pub mod capture;
pub mod config;
pub mod error;
pub mod fallback;
pub mod local;
pub mod remote;
pub mod report;
pub mod student;
pub mod teacher;

pub use config::{ClientConfig, ConfigError, StoreMode};
pub use error::ClientError;
pub use fallback::{connect, FallbackStore, StoreLocation};
pub use local::storage::{FileStorage, KeyValueStorage, MemoryStorage};
pub use local::LocalStore;
pub use remote::RemoteStore;
