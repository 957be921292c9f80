pub mod cluster_layout;
pub mod config_loader;
pub mod histogram;
pub mod history_engine;
pub mod overview;
pub mod store;
pub mod transport;
pub mod user_detail;
