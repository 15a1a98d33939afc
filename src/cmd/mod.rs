pub mod assign;
pub mod progress;
