//! Supporting utilities
//!
//! Cross-cutting helpers that do not belong to any one component of the
//! update pipeline. Currently this is the terminal progress wrapper used by
//! the console front-end.

pub mod progress;

pub use progress::ProgressBar;
