pub mod cancellation;
pub mod config;
pub mod db_connect;
pub mod env;
pub mod logging;
pub mod progress_callback;
pub mod signature_cache;
