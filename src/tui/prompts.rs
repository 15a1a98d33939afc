//! Single-choice and yes/no prompts, plus console message helpers
//!
//! Esc (or q) in a prompt maps to `Cancelled`, the same as in the filter prompt.

use crate::error::{AssignerError, Result};
use colored::Colorize;
use crossterm::{
    cursor::MoveTo,
    execute,
    terminal::{Clear, ClearType},
};
use dialoguer::{Confirm, Select, theme::ColorfulTheme};
use std::io;

/// Prompt for yes/no confirmation with a default value
pub fn confirm(message: &str, default: bool) -> Result<bool> {
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(message)
        .default(default)
        .interact_opt()
        .map_err(cancel_on_interrupt)?
        .ok_or(AssignerError::Cancelled)
}

/// Prompt for selection from a list of options
pub fn select<T: ToString>(message: &str, options: &[T], default: usize) -> Result<usize> {
    let items: Vec<String> = options.iter().map(|o| o.to_string()).collect();
    Select::with_theme(&ColorfulTheme::default())
        .with_prompt(message)
        .items(&items)
        .default(default.min(items.len().saturating_sub(1)))
        .interact_opt()
        .map_err(cancel_on_interrupt)?
        .ok_or(AssignerError::Cancelled)
}

/// Ctrl+C inside a dialoguer prompt surfaces as an interrupted read
fn cancel_on_interrupt(err: dialoguer::Error) -> AssignerError {
    match err {
        dialoguer::Error::IO(e) if e.kind() == io::ErrorKind::Interrupted => AssignerError::Cancelled,
        other => other.into(),
    }
}

/// Clear the terminal and move the cursor home
pub fn clear_screen() -> Result<()> {
    execute!(io::stdout(), Clear(ClearType::All), MoveTo(0, 0))?;
    Ok(())
}

/// Display a section header
pub fn section_header(title: &str) {
    println!();
    println!("{}", "─".repeat(60).dimmed());
    println!("{}", title.cyan().bold());
    println!("{}", "─".repeat(60).dimmed());
}

/// Display a success message
pub fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Display an info message
pub fn info(message: &str) {
    println!("{} {}", "→".cyan(), message);
}

/// Display a warning message
pub fn warning(message: &str) {
    println!("{} {}", "!".yellow().bold(), message);
}

/// Display an error message
pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupted_prompt_is_cancelled() {
        let err = cancel_on_interrupt(dialoguer::Error::IO(io::Error::from(
            io::ErrorKind::Interrupted,
        )));
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_other_prompt_errors_are_kept() {
        let err = cancel_on_interrupt(dialoguer::Error::IO(io::Error::from(
            io::ErrorKind::BrokenPipe,
        )));
        assert!(matches!(err, AssignerError::DialoguerError(_)));
    }

    #[test]
    fn test_section_header() {
        // Just ensure it doesn't panic
        section_header("Test Section");
    }
}
