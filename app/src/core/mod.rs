pub mod cache;
pub mod coordinator;
pub mod time;
