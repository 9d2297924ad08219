//! HTTP handlers for the presign gateway

mod health;
mod verify;

pub use health::*;
pub use verify::*;
