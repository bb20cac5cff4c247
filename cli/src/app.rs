//! Glue between key actions, the session and the view.
//!
//! The host loop owns one [`ChatApp`], feeds it [`Action`]s from the input
//! layer, calls [`ChatApp::pump`] while a reply streams, and redraws after
//! each call.

use std::fmt::Display;

use parlor_engine::{STREAMING_CURSOR, Session, TokenCap, Turn, TurnProgress, TurnRequest};
use parlor_tui::{Action, Command, HELP_TEXT, NoticeKind, TokenAdjust, UiOptions, ViewState};

const SCROLL_STEP: u16 = 10;

pub(crate) struct ChatApp {
    session: Session,
    view: ViewState,
    turn: Option<Turn>,
    quit: bool,
}

impl ChatApp {
    pub(crate) fn new(session: Session, options: UiOptions) -> Self {
        Self {
            session,
            view: ViewState::new(options),
            turn: None,
            quit: false,
        }
    }

    pub(crate) fn session(&self) -> &Session {
        &self.session
    }

    pub(crate) fn view(&self) -> &ViewState {
        &self.view
    }

    pub(crate) fn view_mut(&mut self) -> &mut ViewState {
        &mut self.view
    }

    pub(crate) fn should_quit(&self) -> bool {
        self.quit
    }

    pub(crate) fn is_streaming(&self) -> bool {
        self.turn.is_some()
    }

    pub(crate) fn handle(&mut self, action: Action) {
        match action {
            Action::Quit => self.quit(),
            Action::Redraw => {}
            Action::ScrollUp => self.view.scroll_up(SCROLL_STEP),
            Action::ScrollDown => self.view.scroll_down(SCROLL_STEP),
            Action::ScrollBottom => self.view.scroll_to_bottom(),
            Action::Submit(text) => self.submit(&text),
            Action::Continue => self.continue_reply(),
            Action::Clear => self.clear(),
            Action::Command(command) => self.run_command(command),
            Action::InvalidCommand(err) => self.report(&err),
        }
    }

    /// Advance the streaming reply by one step, committing or rolling back
    /// when it ends.
    pub(crate) fn pump(&mut self) {
        let Some(turn) = self.turn.as_mut() else {
            return;
        };
        self.view.tick();
        match turn.advance() {
            Ok(TurnProgress::Partial(display)) => self.view.update_streaming(display),
            Ok(TurnProgress::Done) => {
                if let Some(turn) = self.turn.take() {
                    self.session.commit(turn.finish());
                }
                self.view.end_streaming();
            }
            Err(err) => {
                if let Some(turn) = self.turn.take() {
                    self.session.abort_turn(turn);
                }
                self.view.end_streaming();
                self.report(&err);
            }
        }
    }

    fn quit(&mut self) {
        if let Some(turn) = self.turn.take() {
            tracing::info!("quitting mid-reply, discarding partial output");
            self.session.abort_turn(turn);
            self.view.end_streaming();
        }
        self.quit = true;
    }

    fn submit(&mut self, text: &str) {
        self.view.clear_notice();
        match self.session.submit(text) {
            Ok(request) => self.start(request),
            Err(err) => self.report(&err),
        }
    }

    fn continue_reply(&mut self) {
        self.view.clear_notice();
        match self.session.prepare_continuation() {
            Ok(Some(request)) => self.start(request),
            Ok(None) => self
                .view
                .set_notice(NoticeKind::Info, "Nothing to continue yet"),
            Err(err) => self.report(&err),
        }
    }

    fn start(&mut self, request: TurnRequest) {
        match self.session.begin_turn(request) {
            Ok(turn) => {
                self.view.begin_streaming();
                if !turn.text().is_empty() {
                    self.view
                        .update_streaming(format!("{}{STREAMING_CURSOR}", turn.text()));
                }
                self.turn = Some(turn);
            }
            Err(err) => self.report(&err),
        }
    }

    fn clear(&mut self) {
        match self.session.clear() {
            Ok(()) => {
                self.view.scroll_to_bottom();
                self.view.set_notice(NoticeKind::Info, "Conversation cleared");
            }
            Err(err) => self.report(&err),
        }
    }

    fn run_command(&mut self, command: Command) {
        match command {
            Command::Clear => self.clear(),
            Command::Continue => self.continue_reply(),
            Command::Tokens(adjust) => self.adjust_tokens(&adjust),
            Command::System(text) => match self.session.set_system_prompt(text) {
                Ok(()) => self
                    .view
                    .set_notice(NoticeKind::Info, "System prompt updated"),
                Err(err) => self.report(&err),
            },
            Command::Model(label) => self.select_model(&label),
            Command::Models => {
                let current = self.session.model_label();
                let labels: Vec<String> = self
                    .session
                    .registry()
                    .labels()
                    .map(|label| {
                        if Some(label) == current {
                            format!("[{label}]")
                        } else {
                            label.to_string()
                        }
                    })
                    .collect();
                self.view
                    .set_notice(NoticeKind::Info, format!("Models: {}", labels.join(", ")));
            }
            Command::Help => self.view.set_notice(NoticeKind::Info, HELP_TEXT),
            Command::Quit => self.quit(),
        }
    }

    fn adjust_tokens(&mut self, adjust: &TokenAdjust) {
        let current = self.session.settings().token_cap;
        let cap = match adjust {
            TokenAdjust::Up => current.step_up(),
            TokenAdjust::Down => current.step_down(),
            TokenAdjust::Set(value) => match TokenCap::new(*value) {
                Ok(cap) => cap,
                Err(err) => {
                    self.report(&err);
                    return;
                }
            },
        };
        self.session.set_token_cap(cap);
        self.view
            .set_notice(NoticeKind::Info, format!("Max tokens: {cap}"));
    }

    pub(crate) fn select_model(&mut self, label: &str) {
        match self.session.select_model(label) {
            Ok(Some(selected)) => {
                let text = format!("Using {selected}");
                self.view.set_notice(NoticeKind::Info, text);
            }
            Ok(None) => self
                .view
                .set_notice(NoticeKind::Warning, "No model selected"),
            Err(err) => self.report(&err),
        }
    }

    fn report(&mut self, err: &dyn Display) {
        tracing::warn!(error = %err, "action failed");
        self.view.set_notice(NoticeKind::Error, err.to_string());
    }
}
