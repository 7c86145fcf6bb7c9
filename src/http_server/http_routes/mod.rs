pub mod artists;
pub mod health;
pub mod requests;
