pub mod config;
pub mod error;

pub use config::NotecryptConfig;
pub use error::{NotecryptError, NotecryptResult};
