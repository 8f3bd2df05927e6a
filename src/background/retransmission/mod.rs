// File: src/background/retransmission/mod.rs

//! Contingency retransmission job
//!
//! Replays queued documents to the authority as contingency batches.
//! Only one cycle runs at a time; a tick that finds one in progress is skipped.

pub mod config;
mod cycle;
pub mod job;
mod poll;
pub mod window;


pub use config::RetransmissionConfig;
pub use job::{RetransmissionJob, TickReport};
pub use window::OperatingWindow;
