//! Download orchestration for ytgrab

pub mod fallback;
pub mod playlist;
pub mod selection;
pub mod task;

pub use fallback::*;
pub use playlist::*;
pub use selection::*;
pub use task::*;
