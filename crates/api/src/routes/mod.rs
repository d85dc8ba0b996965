//! Route handlers

pub mod dashboard;
pub mod push;
pub mod setup;
