//! Extraction engine boundary and its implementations

pub mod engine;
pub mod formats;
#[cfg(test)]
pub mod mock;
pub mod ytdlp;

pub use engine::*;
pub use formats::*;
pub use ytdlp::*;
