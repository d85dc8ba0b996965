//! OBD-II Protocol Implementation
//!
//! This crate provides async serial communication with ELM327-compatible
//! OBD-II adapters: connection setup, Mode 01 PID queries, reply parsing
//! and decoding of raw bytes into values with one fixed unit per PID.

mod client;
pub mod elm327;
mod error;
mod pid;
mod protocol;

pub use client::ObdClient;
pub use error::ObdError;
pub use pid::{Pid, PidResponse};
pub use protocol::ObdProtocol;
