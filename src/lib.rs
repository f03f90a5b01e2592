pub mod config;
pub mod engine;
pub mod init;
pub mod listener;
pub mod rules;
pub mod store;
pub mod websites;
