pub mod chat;
pub mod classify;
pub mod config_cmd;
pub mod import;
pub mod init;
pub mod state;
