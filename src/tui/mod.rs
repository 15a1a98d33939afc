//! Interactive terminal pieces
//!
//! - `fuzzy`: weighted-ratio scorer and top-K ranking (pure)
//! - `selector`: type-to-filter prompt loop with crossterm key/render adapters
//! - `prompts`: dialoguer single-choice and yes/no prompts, console messages

pub mod fuzzy;
pub mod prompts;
pub mod selector;

pub use selector::{TerminalKeys, TerminalView, select_with_fuzzy_filter};
