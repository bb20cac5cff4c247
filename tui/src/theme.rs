//! Color theme and glyphs for Parlor TUI.
//!
//! Uses Kanagawa Wave palette by default with an optional high-contrast override.

use ratatui::style::{Color, Modifier, Style};

/// Display switches read from the `[ui]` config section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UiOptions {
    pub ascii_only: bool,
    pub high_contrast: bool,
}

/// Kanagawa Wave color palette constants.
mod colors {
    use super::Color;

    // === Backgrounds (Sumi Ink) ===
    pub const BG_DARK: Color = Color::Rgb(22, 22, 29); // sumiInk0
    pub const BG_HIGHLIGHT: Color = Color::Rgb(42, 42, 55); // sumiInk4

    // === Foregrounds (Fuji) ===
    pub const TEXT_PRIMARY: Color = Color::Rgb(220, 215, 186); // fujiWhite
    pub const TEXT_SECONDARY: Color = Color::Rgb(200, 192, 147); // oldWhite
    pub const TEXT_MUTED: Color = Color::Rgb(114, 113, 105); // fujiGray

    // === Primary/Brand ===
    pub const PRIMARY: Color = Color::Rgb(149, 127, 184); // oniViolet

    // === Accent Colors ===
    pub const GREEN: Color = Color::Rgb(152, 187, 108); // springGreen
    pub const YELLOW: Color = Color::Rgb(230, 195, 132); // carpYellow
    pub const ORANGE: Color = Color::Rgb(255, 160, 102); // surimiOrange
    pub const RED: Color = Color::Rgb(255, 93, 98); // peachRed
}

/// Resolved theme palette used by the UI.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub bg_dark: Color,
    pub bg_highlight: Color,
    pub text_primary: Color,
    pub text_secondary: Color,
    pub text_muted: Color,
    pub primary: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    pub peach: Color,
    pub green: Color,
}

impl Palette {
    #[must_use]
    pub fn standard() -> Self {
        Self {
            bg_dark: colors::BG_DARK,
            bg_highlight: colors::BG_HIGHLIGHT,
            text_primary: colors::TEXT_PRIMARY,
            text_secondary: colors::TEXT_SECONDARY,
            text_muted: colors::TEXT_MUTED,
            primary: colors::PRIMARY,
            success: colors::GREEN,
            warning: colors::YELLOW,
            error: colors::RED,
            peach: colors::ORANGE,
            green: colors::GREEN,
        }
    }

    #[must_use]
    pub fn high_contrast() -> Self {
        Self {
            bg_dark: Color::Black,
            bg_highlight: Color::DarkGray,
            text_primary: Color::White,
            text_secondary: Color::Gray,
            text_muted: Color::DarkGray,
            primary: Color::White,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            peach: Color::Yellow,
            green: Color::Green,
        }
    }
}

#[must_use]
pub fn palette(options: UiOptions) -> Palette {
    if options.high_contrast {
        Palette::high_contrast()
    } else {
        Palette::standard()
    }
}

/// ASCII/Unicode glyphs for icons and spinners.
#[derive(Debug, Clone, Copy)]
pub struct Glyphs {
    pub system: &'static str,
    pub user: &'static str,
    pub assistant: &'static str,
    pub prompt: &'static str,
    pub cursor: &'static str,
    pub status_ready: &'static str,
    pub status_missing: &'static str,
    pub arrow_up: &'static str,
    pub arrow_down: &'static str,
    pub track: &'static str,
    pub thumb: &'static str,
    pub spinner_frames: &'static [&'static str],
}

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const SPINNER_FRAMES_ASCII: &[&str] = &["|", "/", "-", "\\"];

#[must_use]
pub fn glyphs(options: UiOptions) -> Glyphs {
    if options.ascii_only {
        Glyphs {
            system: "S",
            user: "U",
            assistant: "A",
            prompt: ">",
            cursor: "_",
            status_ready: "*",
            status_missing: "o",
            arrow_up: "^",
            arrow_down: "v",
            track: "|",
            thumb: "#",
            spinner_frames: SPINNER_FRAMES_ASCII,
        }
    } else {
        Glyphs {
            system: "●",
            user: "○",
            assistant: "◇",
            prompt: "❯",
            cursor: "▌",
            status_ready: "●",
            status_missing: "○",
            arrow_up: "↑",
            arrow_down: "↓",
            track: "│",
            thumb: "█",
            spinner_frames: SPINNER_FRAMES,
        }
    }
}

#[must_use]
pub fn spinner_frame(tick: usize, options: UiOptions) -> &'static str {
    let frames = glyphs(options).spinner_frames;
    frames[tick % frames.len()]
}

/// Pre-defined styles for common UI elements.
pub mod styles {
    use super::{Modifier, Palette, Style};

    #[must_use]
    pub fn user_name(palette: &Palette) -> Style {
        Style::default()
            .fg(palette.green)
            .add_modifier(Modifier::BOLD)
    }

    #[must_use]
    pub fn assistant_name(palette: &Palette) -> Style {
        Style::default()
            .fg(palette.primary)
            .add_modifier(Modifier::BOLD)
    }

    #[must_use]
    pub fn system_name(palette: &Palette) -> Style {
        Style::default()
            .fg(palette.text_muted)
            .add_modifier(Modifier::BOLD)
    }

    #[must_use]
    pub fn mode_ready(palette: &Palette) -> Style {
        Style::default()
            .fg(palette.bg_dark)
            .bg(palette.green)
            .add_modifier(Modifier::BOLD)
    }

    #[must_use]
    pub fn mode_streaming(palette: &Palette) -> Style {
        Style::default()
            .fg(palette.bg_dark)
            .bg(palette.primary)
            .add_modifier(Modifier::BOLD)
    }

    #[must_use]
    pub fn key_hint(palette: &Palette) -> Style {
        Style::default().fg(palette.text_muted)
    }

    #[must_use]
    pub fn key_highlight(palette: &Palette) -> Style {
        Style::default()
            .fg(palette.peach)
            .add_modifier(Modifier::BOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::{UiOptions, glyphs, spinner_frame};

    #[test]
    fn spinner_frame_cycles() {
        let options = UiOptions::default();
        assert_ne!(spinner_frame(0, options), spinner_frame(1, options));
        assert_eq!(spinner_frame(0, options), spinner_frame(10, options));
    }

    #[test]
    fn ascii_glyphs_are_ascii() {
        let glyphs = glyphs(UiOptions {
            ascii_only: true,
            high_contrast: false,
        });
        for glyph in [
            glyphs.system,
            glyphs.user,
            glyphs.assistant,
            glyphs.prompt,
            glyphs.cursor,
            glyphs.thumb,
        ] {
            assert!(glyph.is_ascii(), "{glyph} is not ASCII");
        }
        assert!(glyphs.spinner_frames.iter().all(|frame| frame.is_ascii()));
    }
}
