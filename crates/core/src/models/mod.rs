//! Data models for Zenith

mod plan;
mod user;

pub use plan::*;
pub use user::*;
