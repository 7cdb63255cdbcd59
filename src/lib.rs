pub mod batch;
pub mod cmd;
pub mod config;
mod error;
pub mod formats;
pub mod logs;
pub mod metadata;
pub mod paths;
pub mod progress;
pub mod reporter;
pub mod session;
pub mod tools;
pub mod urls;

pub use error::{EngineError, Result};
