//! Command-line front end for axwhisper.

pub mod cli;
pub mod config;
pub mod transcribe;
