//! Input handling for Parlor TUI.

use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

use crate::command::{Command, CommandError, parse_command};

const MAX_EVENTS_PER_FRAME: usize = 64; // never starve rendering

fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// The prompt being typed, with a grapheme-indexed cursor.
#[derive(Debug, Default, Clone)]
pub struct InputLine {
    text: String,
    cursor: usize,
}

impl InputLine {
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Cursor position in graphemes.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Text left of the cursor.
    #[must_use]
    pub fn before_cursor(&self) -> &str {
        &self.text[..self.byte_index()]
    }

    pub fn take_text(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.text)
    }

    pub fn move_cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_cursor_right(&mut self) {
        self.cursor = self.cursor.saturating_add(1).min(self.grapheme_count());
    }

    pub fn move_cursor_home(&mut self) {
        self.cursor = 0;
    }

    pub fn move_cursor_end(&mut self) {
        self.cursor = self.grapheme_count();
    }

    pub fn enter_char(&mut self, new_char: char) {
        let index = self.byte_index();
        self.text.insert(index, new_char);
        self.move_cursor_right();
    }

    pub fn enter_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let index = self.byte_index();
        let before = self.text[..index].graphemes(true).count();
        self.text.insert_str(index, text);
        // Re-count: inserted text can merge with neighbouring graphemes.
        let end = index + text.len();
        self.cursor = self.text[..end].graphemes(true).count().max(before);
    }

    pub fn delete_char(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let start = self.byte_index_at(self.cursor - 1);
        let end = self.byte_index_at(self.cursor);
        self.text.replace_range(start..end, "");
        self.move_cursor_left();
    }

    pub fn delete_char_forward(&mut self) {
        if self.cursor >= self.grapheme_count() {
            return;
        }
        let start = self.byte_index_at(self.cursor);
        let end = self.byte_index_at(self.cursor + 1);
        self.text.replace_range(start..end, "");
    }

    pub fn delete_word_backwards(&mut self) {
        while self.cursor > 0 && self.grapheme_is_whitespace(self.cursor - 1) {
            self.delete_char();
        }
        while self.cursor > 0 && !self.grapheme_is_whitespace(self.cursor - 1) {
            self.delete_char();
        }
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    #[must_use]
    pub fn grapheme_count(&self) -> usize {
        self.text.graphemes(true).count()
    }

    fn grapheme_is_whitespace(&self, index: usize) -> bool {
        self.text
            .graphemes(true)
            .nth(index)
            .is_some_and(|grapheme| grapheme.chars().all(char::is_whitespace))
    }

    fn byte_index(&self) -> usize {
        self.byte_index_at(self.cursor)
    }

    fn byte_index_at(&self, grapheme_index: usize) -> usize {
        self.text
            .grapheme_indices(true)
            .nth(grapheme_index)
            .map_or(self.text.len(), |(index, _)| index)
    }
}

/// What the host loop should do in response to input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Submit(String),
    Command(Command),
    InvalidCommand(CommandError),
    Clear,
    Continue,
    ScrollUp,
    ScrollDown,
    ScrollBottom,
    Redraw,
    Quit,
}

/// Wait up to `timeout` for input and translate every pending event.
///
/// Editing keys update `input` in place and produce no action.
pub fn poll_actions(input: &mut InputLine, timeout: Duration) -> Result<Vec<Action>> {
    let mut actions = Vec::new();
    if !event::poll(timeout)? {
        return Ok(actions);
    }

    for _ in 0..MAX_EVENTS_PER_FRAME {
        let event = event::read()?;
        if let Some(action) = apply_event(input, event) {
            actions.push(action);
        }
        if !event::poll(Duration::ZERO)? {
            break;
        }
    }
    Ok(actions)
}

pub fn apply_event(input: &mut InputLine, event: Event) -> Option<Action> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => apply_key(input, key),
        Event::Paste(text) => {
            input.enter_text(&normalize_line_endings(&text));
            None
        }
        Event::Resize(..) => Some(Action::Redraw),
        _ => None,
    }
}

pub fn apply_key(input: &mut InputLine, key: KeyEvent) -> Option<Action> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let newline = matches!(
        (key.code, key.modifiers),
        (KeyCode::Enter, m) if m.contains(KeyModifiers::SHIFT) || m.contains(KeyModifiers::ALT)
    ) || (ctrl && key.code == KeyCode::Char('j'));

    if newline {
        input.enter_char('\n');
        return None;
    }

    match key.code {
        KeyCode::Char('c') if ctrl => Some(Action::Quit),
        KeyCode::Char('l') if ctrl => Some(Action::Clear),
        KeyCode::Char('r') if ctrl => Some(Action::Continue),
        KeyCode::Char('u') if ctrl => {
            input.clear();
            None
        }
        KeyCode::Char('w') if ctrl => {
            input.delete_word_backwards();
            None
        }
        KeyCode::Enter => submit(input),
        KeyCode::Esc => {
            if input.text().is_empty() {
                Some(Action::ScrollBottom)
            } else {
                input.clear();
                None
            }
        }
        KeyCode::PageUp => Some(Action::ScrollUp),
        KeyCode::PageDown => Some(Action::ScrollDown),
        KeyCode::Backspace => {
            input.delete_char();
            None
        }
        KeyCode::Delete => {
            input.delete_char_forward();
            None
        }
        KeyCode::Left => {
            input.move_cursor_left();
            None
        }
        KeyCode::Right => {
            input.move_cursor_right();
            None
        }
        KeyCode::Home => {
            input.move_cursor_home();
            None
        }
        KeyCode::End => {
            input.move_cursor_end();
            None
        }
        KeyCode::Char(c) if !ctrl && c != '\r' => {
            input.enter_char(c);
            None
        }
        _ => None,
    }
}

fn submit(input: &mut InputLine) -> Option<Action> {
    if input.text().trim().is_empty() {
        return None;
    }
    let line = input.take_text();
    match parse_command(&line) {
        Some(Ok(command)) => {
            debug!(?command, "command entered");
            Some(Action::Command(command))
        }
        Some(Err(err)) => Some(Action::InvalidCommand(err)),
        None => Some(Action::Submit(line)),
    }
}
