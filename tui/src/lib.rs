//! TUI rendering and input handling for Parlor.

mod command;
mod input;
mod theme;

pub use command::{Command, CommandError, HELP_TEXT, TokenAdjust, parse_command};
pub use input::{Action, InputLine, apply_event, apply_key, poll_actions};
pub use theme::{Glyphs, Palette, UiOptions, glyphs, palette, spinner_frame, styles};

use std::borrow::Cow;

use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Margin, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{
        Block, BorderType, Borders, Padding, Paragraph, Scrollbar, ScrollbarOrientation,
        ScrollbarState, Wrap,
    },
};
use unicode_width::UnicodeWidthStr;

use parlor_engine::{STREAMING_CURSOR, Session, TurnPhase};
use parlor_types::Role;

const MAX_INPUT_ROWS: u16 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Warning,
    Error,
}

/// Everything the view needs beyond the session itself.
#[derive(Debug, Default)]
pub struct ViewState {
    pub input: InputLine,
    options: UiOptions,
    notice: Option<(NoticeKind, String)>,
    streaming: Option<String>,
    /// Rows scrolled up from the bottom of the transcript.
    scroll_back: u16,
    tick: usize,
}

impl ViewState {
    #[must_use]
    pub fn new(options: UiOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn options(&self) -> UiOptions {
        self.options
    }

    pub fn set_notice(&mut self, kind: NoticeKind, text: impl Into<String>) {
        self.notice = Some((kind, text.into()));
    }

    pub fn clear_notice(&mut self) {
        self.notice = None;
    }

    #[must_use]
    pub fn notice(&self) -> Option<(NoticeKind, &str)> {
        self.notice.as_ref().map(|(kind, text)| (*kind, text.as_str()))
    }

    /// Show an empty in-progress reply until the first partial arrives.
    pub fn begin_streaming(&mut self) {
        self.streaming = Some(String::new());
        self.scroll_back = 0;
    }

    pub fn update_streaming(&mut self, display: String) {
        self.streaming = Some(display);
    }

    pub fn end_streaming(&mut self) {
        self.streaming = None;
    }

    #[must_use]
    pub fn streaming(&self) -> Option<&str> {
        self.streaming.as_deref()
    }

    pub fn scroll_up(&mut self, rows: u16) {
        self.scroll_back = self.scroll_back.saturating_add(rows);
    }

    pub fn scroll_down(&mut self, rows: u16) {
        self.scroll_back = self.scroll_back.saturating_sub(rows);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_back = 0;
    }

    pub fn tick(&mut self) {
        self.tick = self.tick.wrapping_add(1);
    }
}

/// Main draw function
pub fn draw(frame: &mut Frame, session: &Session, view: &ViewState) {
    let palette = palette(view.options);
    let glyphs = glyphs(view.options);
    let bg_block = Block::default().style(Style::default().bg(palette.bg_dark));
    frame.render_widget(bg_block, frame.area());

    let input_rows = u16::try_from(view.input.text().split('\n').count())
        .unwrap_or(MAX_INPUT_ROWS)
        .clamp(1, MAX_INPUT_ROWS);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Min(1),                 // Transcript
            Constraint::Length(input_rows + 2), // Input
            Constraint::Length(1),              // Status bar
        ])
        .split(frame.area());

    draw_transcript(frame, session, view, chunks[0], &palette, &glyphs);
    draw_input(frame, session, view, chunks[1], &palette, &glyphs);
    draw_status_bar(frame, session, view, chunks[2], &palette, &glyphs);
}

fn draw_transcript(
    frame: &mut Frame,
    session: &Session,
    view: &ViewState,
    area: Rect,
    palette: &Palette,
    glyphs: &Glyphs,
) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(palette.text_muted))
        .padding(Padding::horizontal(1));

    let lines = transcript_lines(session, view, palette, glyphs);

    let inner = block.inner(area);
    let total_lines = wrapped_line_count(&lines, inner.width);
    let max_scroll = total_lines.saturating_sub(inner.height);
    let scroll_offset = max_scroll - view.scroll_back.min(max_scroll);

    let transcript = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((scroll_offset, 0));
    frame.render_widget(transcript, area);

    if max_scroll > 0 {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some(glyphs.arrow_up))
            .end_symbol(Some(glyphs.arrow_down))
            .track_symbol(Some(glyphs.track))
            .thumb_symbol(glyphs.thumb)
            .style(Style::default().fg(palette.text_muted));

        let mut scrollbar_state =
            ScrollbarState::new(max_scroll as usize).position(scroll_offset as usize);

        frame.render_stateful_widget(
            scrollbar,
            area.inner(Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }
}

fn transcript_lines(
    session: &Session,
    view: &ViewState,
    palette: &Palette,
    glyphs: &Glyphs,
) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let content_style = Style::default().fg(palette.text_secondary);

    for (index, message) in session.history().messages().iter().enumerate() {
        if index > 0 {
            lines.push(Line::from(""));
        }
        push_header(&mut lines, message.role(), palette, glyphs);
        push_body(&mut lines, message.content(), content_style);
    }

    if let Some(partial) = view.streaming() {
        lines.push(Line::from(""));
        push_header(&mut lines, Role::Assistant, palette, glyphs);
        let body = partial.strip_suffix(STREAMING_CURSOR).unwrap_or(partial);
        if body.is_empty() {
            let spinner = spinner_frame(view.tick, view.options);
            lines.push(Line::from(vec![
                Span::styled(spinner, Style::default().fg(palette.primary)),
                Span::styled(" Thinking...", Style::default().fg(palette.text_muted)),
            ]));
        } else {
            let mut text = body.to_string();
            text.push_str(glyphs.cursor);
            push_body(&mut lines, &text, content_style);
        }
    }

    lines
}

fn push_header(lines: &mut Vec<Line<'static>>, role: Role, palette: &Palette, glyphs: &Glyphs) {
    let (icon, name, style) = match role {
        Role::System => (glyphs.system, "System", styles::system_name(palette)),
        Role::User => (glyphs.user, "You", styles::user_name(palette)),
        Role::Assistant => (glyphs.assistant, "Assistant", styles::assistant_name(palette)),
    };
    lines.push(Line::from(vec![
        Span::styled(format!("{icon} "), style),
        Span::styled(name, style),
    ]));
}

fn push_body(lines: &mut Vec<Line<'static>>, content: &str, style: Style) {
    let safe = terminal_safe(content);
    for line in safe.split('\n') {
        lines.push(Line::from(Span::styled(format!("  {line}"), style)));
    }
}

/// Drop escape sequences and control characters a model could emit.
fn terminal_safe(text: &str) -> Cow<'_, str> {
    let unsafe_char = |c: char| (c.is_control() && c != '\n') || c == '\t';
    if !text.chars().any(unsafe_char) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\t' => out.push_str("    "),
            '\x1b' => {
                // CSI: ESC [ params final-byte
                if chars.next_if_eq(&'[').is_some() {
                    while chars.next().is_some_and(|c| !('@'..='~').contains(&c)) {}
                }
            }
            c if c.is_control() && c != '\n' => {}
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn wrapped_line_count(lines: &[Line], width: u16) -> u16 {
    let width = width.max(1) as usize;
    let mut total: u16 = 0;

    for line in lines {
        let line_width = line.width();
        let rows = if line_width == 0 {
            1
        } else {
            ((line_width - 1) / width) + 1
        };
        total = total.saturating_add(u16::try_from(rows).unwrap_or(u16::MAX));
    }

    total
}

fn draw_input(
    frame: &mut Frame,
    session: &Session,
    view: &ViewState,
    area: Rect,
    palette: &Palette,
    glyphs: &Glyphs,
) {
    let streaming = session.phase() == TurnPhase::Streaming;
    let (mode_label, mode_style, border_style) = if streaming {
        (
            " GENERATING ",
            styles::mode_streaming(palette),
            Style::default().fg(palette.primary),
        )
    } else {
        (
            " READY ",
            styles::mode_ready(palette),
            Style::default().fg(palette.green),
        )
    };

    let hints = vec![
        Span::styled("Enter", styles::key_highlight(palette)),
        Span::styled(" send  ", styles::key_hint(palette)),
        Span::styled("Ctrl+R", styles::key_highlight(palette)),
        Span::styled(" continue  ", styles::key_hint(palette)),
        Span::styled("Ctrl+L", styles::key_highlight(palette)),
        Span::styled(" clear  ", styles::key_hint(palette)),
        Span::styled("Ctrl+C", styles::key_highlight(palette)),
        Span::styled(" quit ", styles::key_hint(palette)),
    ];

    let prefix = format!(" {} ", glyphs.prompt);
    let indent = " ".repeat(prefix.width());
    let text_style = Style::default().fg(palette.text_primary);
    let input_lines: Vec<Line> = view
        .input
        .text()
        .split('\n')
        .enumerate()
        .map(|(row, line)| {
            let lead = if row == 0 { prefix.clone() } else { indent.clone() };
            Line::from(vec![
                Span::styled(lead, Style::default().fg(palette.green)),
                Span::styled(line.to_string(), text_style),
            ])
        })
        .collect();

    // Keep the cursor row visible when the draft is taller than the box.
    let before = view.input.before_cursor();
    let cursor_row = u16::try_from(before.matches('\n').count()).unwrap_or(u16::MAX);
    let visible_rows = area.height.saturating_sub(2).max(1);
    let vertical_scroll = cursor_row.saturating_sub(visible_rows - 1);

    let cursor_col = before.rsplit('\n').next().unwrap_or_default().width() + prefix.width();
    let content_width = area.width.saturating_sub(2).max(1);
    let cursor_col = u16::try_from(cursor_col).unwrap_or(u16::MAX);
    let horizontal_scroll = cursor_col.saturating_sub(content_width - 1);

    let token_cap = Line::from(Span::styled(
        format!(" max {} tokens ", session.settings().token_cap),
        styles::key_hint(palette),
    ))
    .alignment(Alignment::Right);

    let input = Paragraph::new(input_lines)
        .scroll((vertical_scroll, horizontal_scroll))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(border_style)
                .title_top(Line::from(vec![Span::styled(mode_label, mode_style)]))
                .title_top(Line::from(hints).alignment(Alignment::Right))
                .title_bottom(token_cap),
        );
    frame.render_widget(input, area);

    frame.set_cursor_position((
        area.x
            .saturating_add(1)
            .saturating_add(cursor_col - horizontal_scroll),
        area.y
            .saturating_add(1)
            .saturating_add(cursor_row - vertical_scroll),
    ));
}

fn draw_status_bar(
    frame: &mut Frame,
    session: &Session,
    view: &ViewState,
    area: Rect,
    palette: &Palette,
    glyphs: &Glyphs,
) {
    let (status_text, status_style) = if let Some((kind, text)) = view.notice() {
        let (prefix, color) = match kind {
            NoticeKind::Error => ("Error: ", palette.error),
            NoticeKind::Warning => ("Warning: ", palette.warning),
            NoticeKind::Info => ("", palette.text_secondary),
        };
        (format!("{prefix}{text}"), Style::default().fg(color))
    } else if session.phase() == TurnPhase::Streaming {
        let spinner = spinner_frame(view.tick, view.options);
        (
            format!("{spinner} Generating..."),
            Style::default().fg(palette.primary),
        )
    } else if let Some(label) = session.model_label() {
        (
            format!(
                "{} {label} │ {} messages",
                glyphs.status_ready,
                session.history().len()
            ),
            Style::default().fg(palette.success),
        )
    } else {
        (
            format!(
                "{} No model selected │ /models lists choices, /model LABEL picks one",
                glyphs.status_missing
            ),
            Style::default()
                .fg(palette.error)
                .add_modifier(Modifier::BOLD),
        )
    };

    let status = Paragraph::new(Line::from(vec![
        Span::raw(" "),
        Span::styled(status_text, status_style),
    ]));
    frame.render_widget(status, area);
}
