//! Core functionality for ytgrab

pub mod catalog;
pub mod downloader;
pub mod media;
pub mod outcome;
pub mod progress;

pub use catalog::*;
pub use downloader::*;
pub use media::*;
pub use outcome::*;
pub use progress::*;
