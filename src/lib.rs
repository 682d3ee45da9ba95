pub mod assertion;
pub mod config;
pub mod error;
pub mod extract;
pub mod feeder;
pub mod http;
pub mod logger;
pub mod render;
pub mod runner;
pub mod scenario;
pub mod variable;

// Re-export commonly used types
pub use error::{Result, RuloadError};
