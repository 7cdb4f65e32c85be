pub mod loader;
pub mod manager;
pub mod types;
