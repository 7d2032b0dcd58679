//! API handlers module

pub mod context;
pub mod health;
