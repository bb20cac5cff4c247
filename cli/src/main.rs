//! Parlor CLI - Binary entry point and terminal session management.
//!
//! # Architecture
//!
//! The CLI bridges [`parlor_engine`] (session state) and [`parlor_tui`]
//! (rendering), providing RAII-based terminal management with guaranteed
//! cleanup.
//!
//! ```text
//! main() -> build_session() -> TerminalSession::new() -> run_app() -> ChatApp + TUI
//! ```
//!
//! # Event Loop
//!
//! 1. Render frame
//! 2. Poll input (blocking while idle, non-blocking while a reply streams)
//! 3. Apply actions to the session
//! 4. Advance the streaming reply by one step

mod app;
mod print;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{DisableBracketedPaste, EnableBracketedPaste},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;
use std::{
    fs::{self, OpenOptions},
    io::{Stdout, stdout},
    path::PathBuf,
    sync::Mutex,
    time::Duration,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use parlor_engine::{
    ChatSettings, DEFAULT_MODELS_FILE, ModelCache, ModelRegistry, ParlorConfig, Session,
    default_loader,
};
use parlor_tui::{UiOptions, draw, poll_actions};

use crate::app::ChatApp;

#[derive(Parser, Debug)]
#[command(name = "parlor")]
#[command(about = "Chat with local language models in the terminal", long_about = None)]
struct Args {
    /// Model registry file (`label | reference` per line).
    #[arg(long, short = 'm')]
    models: Option<PathBuf>,

    /// Config file to use instead of ~/.parlor/config.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Registry label to select at startup.
    #[arg(long)]
    model: Option<String>,

    /// Answer one prompt on stdout and exit.
    #[arg(short = 'p', long = "print")]
    print: Option<String>,

    /// Override the maximum number of generated tokens.
    #[arg(long)]
    max_tokens: Option<u32>,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // Without a log file, stay silent rather than writing over the TUI.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, std::fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.parlor/logs/parlor.log
    if let Some(config_path) = ParlorConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("parlor.log"));
    }

    // Fallback: ./.parlor/logs/parlor.log
    candidates.push(PathBuf::from(".parlor").join("logs").join("parlor.log"));

    candidates
}

fn load_config(args: &Args) -> Result<ParlorConfig> {
    let config = match &args.config {
        Some(path) => ParlorConfig::load_from(path)?,
        None => ParlorConfig::load()?.unwrap_or_default(),
    };
    Ok(config)
}

/// Registry path: CLI flag, then `PARLOR_MODELS` / config, then `models.txt`.
fn models_path(args: &Args, config: &ParlorConfig) -> PathBuf {
    args.models
        .clone()
        .or_else(|| config.models_file())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MODELS_FILE))
}

fn build_session(args: &Args, config: &ParlorConfig) -> Result<Session> {
    let mut settings: ChatSettings = config.chat_settings()?;
    if let Some(value) = args.max_tokens {
        settings.token_cap = value
            .try_into()
            .with_context(|| format!("invalid --max-tokens {value}"))?;
    }

    let path = models_path(args, config);
    let registry = ModelRegistry::load(&path)?;
    Ok(Session::new(settings, registry, ModelCache::new(default_loader())))
}

/// Startup selection: `--model`, then `app.default_model`, then the first
/// registry entry naming a real model.
fn initial_model(args: &Args, config: &ParlorConfig, session: &Session) -> Option<String> {
    args.model
        .clone()
        .or_else(|| config.default_model().map(str::to_string))
        .or_else(|| {
            session
                .registry()
                .first_loadable()
                .map(|entry| entry.label().to_string())
        })
}

fn ui_options(config: &ParlorConfig) -> UiOptions {
    config.ui.as_ref().map_or_else(UiOptions::default, |ui| UiOptions {
        ascii_only: ui.ascii_only,
        high_contrast: ui.high_contrast,
    })
}

/// RAII guard for terminal state: raw mode, bracketed paste and the
/// alternate screen are restored on drop, including after panics.
struct TerminalSession {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalSession {
    fn new() -> Result<Self> {
        enable_raw_mode()?;

        let mut out = stdout();
        if let Err(err) = execute!(out, EnterAlternateScreen, EnableBracketedPaste) {
            let _ = disable_raw_mode();
            let _ = execute!(out, LeaveAlternateScreen, DisableBracketedPaste);
            return Err(err.into());
        }

        match Terminal::new(CrosstermBackend::new(out)) {
            Ok(terminal) => Ok(Self { terminal }),
            Err(err) => {
                let _ = disable_raw_mode();
                let _ = execute!(stdout(), LeaveAlternateScreen, DisableBracketedPaste);
                Err(err.into())
            }
        }
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(
            self.terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableBracketedPaste
        );
        let _ = self.terminal.show_cursor();
    }
}

const IDLE_POLL: Duration = Duration::from_millis(250);

fn run_app<B>(terminal: &mut Terminal<B>, app: &mut ChatApp) -> Result<()>
where
    B: Backend,
    B::Error: Send + Sync + 'static,
{
    loop {
        terminal.draw(|frame| draw(frame, app.session(), app.view()))?;

        let timeout = if app.is_streaming() {
            Duration::ZERO
        } else {
            IDLE_POLL
        };
        for action in poll_actions(&mut app.view_mut().input, timeout)? {
            app.handle(action);
        }
        if app.should_quit() {
            return Ok(());
        }

        app.pump();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let config = load_config(&args)?;
    let mut session = build_session(&args, &config)?;
    let label = initial_model(&args, &config, &session);

    if let Some(prompt) = &args.print {
        return print::print_reply(&mut session, label.as_deref(), prompt, stdout().lock());
    }

    let mut app = ChatApp::new(session, ui_options(&config));
    if let Some(label) = label {
        app.select_model(&label);
    }

    let result = {
        let mut session = TerminalSession::new()?;
        run_app(&mut session.terminal, &mut app)
    };

    if let Err(err) = result {
        eprintln!("Error: {err:?}");
    }
    Ok(())
}
