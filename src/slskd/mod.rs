pub mod client;
pub mod types;

// Re-export public API
pub use client::SlskdClient;
pub use types::*;
