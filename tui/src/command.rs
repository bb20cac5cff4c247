//! Slash commands typed into the input line.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenAdjust {
    Set(u32),
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Clear,
    Continue,
    Tokens(TokenAdjust),
    System(String),
    Model(String),
    Models,
    Help,
    Quit,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command `/{0}` (try /help)")]
    Unknown(String),
    #[error("/{0} needs an argument")]
    MissingArgument(&'static str),
    #[error("`{0}` is not a token count (use a number, + or -)")]
    InvalidTokens(String),
}

pub const HELP_TEXT: &str = "Enter send · Ctrl+R continue · Ctrl+L clear · PgUp/PgDn scroll · \
Ctrl+C quit · /tokens N|+|- · /system TEXT · /model LABEL · /models";

/// Parse a line starting with `/`.
///
/// Returns `None` for lines that are not commands.
pub fn parse_command(line: &str) -> Option<Result<Command, CommandError>> {
    let body = line.trim().strip_prefix('/')?;
    let (name, arg) = match body.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (body, ""),
    };

    let command = match name {
        "clear" => Ok(Command::Clear),
        "continue" | "c" => Ok(Command::Continue),
        "tokens" | "max" => parse_tokens(arg).map(Command::Tokens),
        "system" => required(arg, "system").map(|text| Command::System(text.to_string())),
        "model" => required(arg, "model").map(|label| Command::Model(label.to_string())),
        "models" => Ok(Command::Models),
        "help" | "?" => Ok(Command::Help),
        "quit" | "q" | "exit" => Ok(Command::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    };
    Some(command)
}

fn required<'a>(arg: &'a str, name: &'static str) -> Result<&'a str, CommandError> {
    if arg.is_empty() {
        Err(CommandError::MissingArgument(name))
    } else {
        Ok(arg)
    }
}

fn parse_tokens(arg: &str) -> Result<TokenAdjust, CommandError> {
    match required(arg, "tokens")? {
        "+" => Ok(TokenAdjust::Up),
        "-" => Ok(TokenAdjust::Down),
        value => value
            .parse()
            .map(TokenAdjust::Set)
            .map_err(|_| CommandError::InvalidTokens(value.to_string())),
    }
}
