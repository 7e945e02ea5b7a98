// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually starting the commands behind a
//! run, using `tokio::process::Command`, and exposing each one as a
//! [`ProcessHandle`]: a merged stream of raw output chunks, an exit
//! notification, and a way to signal the process.
//!
//! - [`process`] defines the launch spec and the handle types.
//! - [`backend`] provides the `ProcessBackend` trait and the concrete
//!   `RealProcessBackend` used in production, which tests can replace with a
//!   scripted fake.

pub mod backend;
pub mod process;

pub use backend::{ProcessBackend, RealProcessBackend};
pub use process::{
    LaunchSpec, OutputChunk, ProcessControl, ProcessHandle, ProcessParts, ProcessSignal,
};
