pub mod log_store;
pub mod migrations;
pub mod pool;
