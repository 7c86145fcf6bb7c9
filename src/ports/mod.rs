pub mod fallback;
pub mod peer;
