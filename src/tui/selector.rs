//! Type-to-filter selector
//!
//! A session owns the query buffer and the ranked view derived from it. Keys
//! come from a `KeySource`, frames go to a `SelectorView`; the crossterm
//! implementations of both live at the bottom of this file.

use super::fuzzy;
use crate::error::{AssignerError, Result};
use colored::Colorize;
use crossterm::{
    cursor::MoveTo,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    queue,
    terminal::{Clear, ClearType, disable_raw_mode, enable_raw_mode},
};
use std::io::{self, Write};

/// Input understood by the selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorKey {
    Char(char),
    Backspace,
    Confirm,
    Cancel,
    Other,
}

/// What a key did to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Redraw,
    Unchanged,
    Confirm,
    Cancel,
}

pub trait KeySource {
    /// Block until the next key
    fn next_key(&mut self) -> Result<SelectorKey>;
}

/// One full repaint of the selector
#[derive(Debug)]
pub struct Frame<'a> {
    pub prompt: &'a str,
    pub rows: Vec<&'a str>,
    pub query: &'a str,
}

pub trait SelectorView {
    /// Replace whatever was drawn before with `frame`
    fn render(&mut self, frame: &Frame<'_>) -> Result<()>;
}

/// State of one selection prompt
pub struct FuzzySelector<'a, S> {
    candidates: &'a [S],
    limit: usize,
    query: String,
    ranked: Vec<usize>,
}

impl<'a, S: AsRef<str>> FuzzySelector<'a, S> {
    pub fn new(candidates: &'a [S], limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            candidates,
            limit,
            query: String::new(),
            ranked: fuzzy::rank(candidates, "", limit),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Current ranking as positions into the candidate slice
    pub fn ranked(&self) -> &[usize] {
        &self.ranked
    }

    pub fn frame<'p>(&'p self, prompt: &'p str) -> Frame<'p> {
        Frame {
            prompt,
            rows: self
                .ranked
                .iter()
                .map(|&i| self.candidates[i].as_ref())
                .collect(),
            query: &self.query,
        }
    }

    pub fn handle(&mut self, key: SelectorKey) -> Step {
        match key {
            SelectorKey::Char(c) => {
                self.query.push(c);
                self.rerank();
                Step::Redraw
            }
            SelectorKey::Backspace => {
                if self.query.pop().is_some() {
                    self.rerank();
                    Step::Redraw
                } else {
                    Step::Unchanged
                }
            }
            SelectorKey::Confirm => Step::Confirm,
            SelectorKey::Cancel => Step::Cancel,
            SelectorKey::Other => Step::Unchanged,
        }
    }

    /// Final ranking against the final buffer
    pub fn finish(mut self) -> Vec<usize> {
        self.rerank();
        self.ranked
    }

    fn rerank(&mut self) {
        self.ranked = fuzzy::rank(self.candidates, &self.query, self.limit);
    }
}

/// Run a filter prompt until the user confirms, returning the ranked positions
///
/// The result holds at most `limit` positions into `candidates`, best match
/// first. Fails with `Cancelled` when the user aborts.
pub fn select_with_fuzzy_filter<S, K, V>(
    candidates: &[S],
    prompt: &str,
    limit: usize,
    keys: &mut K,
    view: &mut V,
) -> Result<Vec<usize>>
where
    S: AsRef<str>,
    K: KeySource,
    V: SelectorView,
{
    let mut session = FuzzySelector::new(candidates, limit);
    view.render(&session.frame(prompt))?;

    loop {
        match session.handle(keys.next_key()?) {
            Step::Redraw => view.render(&session.frame(prompt))?,
            Step::Unchanged => {}
            Step::Confirm => {
                tracing::debug!("filter '{}' confirmed for {}", session.query(), prompt);
                return Ok(session.finish());
            }
            Step::Cancel => return Err(AssignerError::Cancelled),
        }
    }
}

// ============================================================================
// Terminal adapters
// ============================================================================

/// Raw mode for the duration of a single key read
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Map a crossterm key to selector input
///
/// Ctrl+C cannot raise SIGINT while raw mode is on, so it cancels like Esc.
pub fn map_key(key: KeyEvent) -> SelectorKey {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let alt = key.modifiers.contains(KeyModifiers::ALT);

    match key.code {
        KeyCode::Esc => SelectorKey::Cancel,
        KeyCode::Char('c') if ctrl => SelectorKey::Cancel,
        KeyCode::Enter => SelectorKey::Confirm,
        KeyCode::Backspace => SelectorKey::Backspace,
        KeyCode::Char(c) if !ctrl && !alt && !c.is_control() => SelectorKey::Char(c),
        _ => SelectorKey::Other,
    }
}

/// Reads key presses from the terminal
pub struct TerminalKeys;

impl KeySource for TerminalKeys {
    fn next_key(&mut self) -> Result<SelectorKey> {
        let _raw = RawModeGuard::enable()?;
        loop {
            // Release/repeat events (Windows) and resize/mouse events are skipped
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    return Ok(map_key(key));
                }
            }
        }
    }
}

/// Clears the screen and draws the ranked table with the query below it
pub struct TerminalView<W: Write> {
    out: W,
}

impl TerminalView<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> SelectorView for TerminalView<W> {
    fn render(&mut self, frame: &Frame<'_>) -> Result<()> {
        queue!(self.out, Clear(ClearType::All), MoveTo(0, 0))?;

        writeln!(self.out, "{}", "Name".bold())?;
        writeln!(self.out, "{}", "─".repeat(60).dimmed())?;
        if frame.rows.is_empty() {
            writeln!(self.out, "  {}", "(nothing to choose from)".dimmed())?;
        }
        for row in &frame.rows {
            writeln!(self.out, "  {}", row)?;
        }
        writeln!(self.out, "{}", "─".repeat(60).dimmed())?;
        write!(
            self.out,
            "Please type in the name of the {} to filter the results: {}",
            frame.prompt, frame.query
        )?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct ScriptedKeys(VecDeque<SelectorKey>);

    impl ScriptedKeys {
        fn new(keys: &[SelectorKey]) -> Self {
            Self(keys.iter().copied().collect())
        }

        fn typed(text: &str, then: SelectorKey) -> Self {
            let mut keys: VecDeque<SelectorKey> = text.chars().map(SelectorKey::Char).collect();
            keys.push_back(then);
            Self(keys)
        }
    }

    impl KeySource for ScriptedKeys {
        fn next_key(&mut self) -> Result<SelectorKey> {
            Ok(self.0.pop_front().expect("script ran out of keys"))
        }
    }

    #[derive(Default)]
    struct RecordingView {
        frames: Vec<(Vec<String>, String)>,
    }

    impl SelectorView for RecordingView {
        fn render(&mut self, frame: &Frame<'_>) -> Result<()> {
            self.frames.push((
                frame.rows.iter().map(|r| r.to_string()).collect(),
                frame.query.to_string(),
            ));
            Ok(())
        }
    }

    const APPS: [&str; 3] = ["Contoso-API", "Contoso-Web", "Fabrikam-App"];

    fn run(candidates: &[&str], limit: usize, keys: &mut ScriptedKeys) -> (Result<Vec<usize>>, RecordingView) {
        let mut view = RecordingView::default();
        let result = select_with_fuzzy_filter(candidates, "application", limit, keys, &mut view);
        (result, view)
    }

    #[test]
    fn test_typed_query_filters_candidates() {
        let mut keys = ScriptedKeys::typed("Contoso", SelectorKey::Confirm);
        let (result, _) = run(&APPS, 2, &mut keys);
        let names: Vec<&str> = result.unwrap().into_iter().map(|i| APPS[i]).collect();
        assert_eq!(names, vec!["Contoso-API", "Contoso-Web"]);
    }

    #[test]
    fn test_type_then_backspace_matches_initial_ranking() {
        let mut keys = ScriptedKeys::new(&[
            SelectorKey::Char('c'),
            SelectorKey::Backspace,
            SelectorKey::Confirm,
        ]);
        let (result, view) = run(&APPS, 10, &mut keys);
        let result = result.unwrap();

        assert_eq!(result, fuzzy::rank(&APPS, "", 10));
        assert_eq!(view.frames.first(), view.frames.last());
    }

    #[test]
    fn test_escape_cancels() {
        let mut keys = ScriptedKeys::new(&[SelectorKey::Char('x'), SelectorKey::Cancel]);
        let (result, _) = run(&APPS, 10, &mut keys);
        assert!(matches!(result, Err(AssignerError::Cancelled)));
    }

    #[test]
    fn test_empty_candidates_return_empty() {
        let empty: [&str; 0] = [];
        let mut keys = ScriptedKeys::typed("abc", SelectorKey::Confirm);
        let (result, view) = run(&empty, 10, &mut keys);
        assert!(result.unwrap().is_empty());
        assert!(view.frames.iter().all(|(rows, _)| rows.is_empty()));
    }

    #[test]
    fn test_ignored_keys_do_not_redraw() {
        let mut keys = ScriptedKeys::new(&[
            SelectorKey::Other,
            SelectorKey::Backspace, // empty buffer
            SelectorKey::Other,
            SelectorKey::Confirm,
        ]);
        let (result, view) = run(&APPS, 10, &mut keys);
        assert_eq!(result.unwrap().len(), 3);
        assert_eq!(view.frames.len(), 1);
    }

    #[test]
    fn test_every_frame_matches_its_query() {
        let mut keys = ScriptedKeys::typed("fab app", SelectorKey::Confirm);
        let (_, view) = run(&APPS, 2, &mut keys);

        assert_eq!(view.frames.len(), 8);
        for (rows, query) in &view.frames {
            let expected: Vec<String> = fuzzy::rank(&APPS, query, 2)
                .into_iter()
                .map(|i| APPS[i].to_string())
                .collect();
            assert_eq!(rows, &expected);
        }
        assert_eq!(view.frames.last().unwrap().1, "fab app");
    }

    #[test]
    fn test_zero_limit_is_clamped() {
        let session = FuzzySelector::new(&APPS, 0);
        assert_eq!(session.ranked().len(), 1);
    }

    #[test]
    fn test_maps_terminal_keys() {
        let plain = |code| KeyEvent::new(code, KeyModifiers::NONE);
        assert_eq!(map_key(plain(KeyCode::Esc)), SelectorKey::Cancel);
        assert_eq!(map_key(plain(KeyCode::Enter)), SelectorKey::Confirm);
        assert_eq!(map_key(plain(KeyCode::Backspace)), SelectorKey::Backspace);
        assert_eq!(map_key(plain(KeyCode::Char(' '))), SelectorKey::Char(' '));
        assert_eq!(
            map_key(KeyEvent::new(KeyCode::Char('A'), KeyModifiers::SHIFT)),
            SelectorKey::Char('A')
        );
        assert_eq!(
            map_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            SelectorKey::Cancel
        );
        assert_eq!(
            map_key(KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL)),
            SelectorKey::Other
        );
        assert_eq!(map_key(plain(KeyCode::Up)), SelectorKey::Other);
        assert_eq!(map_key(plain(KeyCode::Tab)), SelectorKey::Other);
    }

    #[test]
    fn test_terminal_view_draws_rows_and_query() {
        let mut view = TerminalView::new(Vec::new());
        view.render(&Frame {
            prompt: "application containing the app role",
            rows: vec!["Contoso-API", "Contoso-Web"],
            query: "cont",
        })
        .unwrap();

        let out = String::from_utf8(view.into_inner()).unwrap();
        assert!(out.contains("Contoso-API"));
        assert!(out.contains("Contoso-Web"));
        assert!(out.contains("application containing the app role to filter the results: cont"));
    }
}
