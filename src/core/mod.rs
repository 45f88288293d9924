pub mod config;
pub mod error;

pub use config::TopomConfig;
pub use error::{Result, TopomError};
