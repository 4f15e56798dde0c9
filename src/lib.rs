#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod comments;
pub mod config;
pub mod layout;
pub mod ranking;
pub mod reddit;
pub mod request;
pub mod session;
pub mod target;
pub mod validate;
pub mod vote;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
