pub mod auth;
pub mod config;
pub mod dispatch;
pub mod message;
