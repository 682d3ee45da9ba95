pub mod client;
pub mod request;
pub mod response;
pub mod think_time;
pub mod types;

// Re-export commonly used types for convenient access
pub use client::{Client, DEFAULT_TIMEOUT};
pub use request::RenderedRequest;
pub use response::Response;
pub use think_time::ThinkTime;
pub use types::{Method, Status};
