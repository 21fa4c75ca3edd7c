pub mod analyze;
pub mod config;
pub mod import;
pub mod init;
pub mod queue;
pub mod recipes;
pub mod status;
