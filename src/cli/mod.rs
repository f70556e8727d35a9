//! Command line interface

pub mod args;
pub mod output;

pub use args::{Args, AudioCodec, VerbosityLevel};
pub use output::{OutputFormatter, ProgressDisplay};
