//! Command implementations

pub mod config;
pub mod job;
pub mod link_code;
pub mod ping;
pub mod submit;
