//! Non-interactive mode: answer one prompt on a writer.
//!
//! Each partial from the turn is the whole re-sanitized reply, which can
//! shrink when a control marker split across deltas completes. Only the
//! settled prefix is written: leading and trailing whitespace and any
//! trailing half-marker wait for later deltas.

use std::io::{self, Write};

use anyhow::{Result, bail};

use parlor_engine::{STREAMING_CURSOR, Session, unsettled_marker_start};

/// Stream one reply for `prompt` to `out`, ending with a newline.
pub(crate) fn print_reply<W: Write>(
    session: &mut Session,
    label: Option<&str>,
    prompt: &str,
    out: W,
) -> Result<()> {
    let Some(label) = label else {
        bail!("no model available; add one to the registry or pass --model");
    };
    if session.select_model(label)?.is_none() {
        bail!("`{label}` is a placeholder entry, not a model");
    }

    let request = session.submit(prompt)?;
    let mut echo = StreamEcho::new(out);
    let reply = session.run_turn(request, |display| echo.partial(display))?;
    echo.finish(reply.content())?;
    Ok(())
}

struct StreamEcho<W> {
    out: W,
    printed: String,
    diverged: bool,
    error: Option<io::Error>,
}

impl<W: Write> StreamEcho<W> {
    fn new(out: W) -> Self {
        Self {
            out,
            printed: String::new(),
            diverged: false,
            error: None,
        }
    }

    fn partial(&mut self, display: &str) {
        if self.diverged || self.error.is_some() {
            return;
        }
        let text = display
            .strip_suffix(STREAMING_CURSOR)
            .unwrap_or(display)
            .trim();
        let settled = text[..unsettled_marker_start(text)].trim_end();

        match settled.strip_prefix(self.printed.as_str()) {
            Some("") => {}
            Some(new) => {
                if let Err(err) = write_flush(&mut self.out, new) {
                    self.error = Some(err);
                    return;
                }
                self.printed.push_str(new);
            }
            None => {
                tracing::warn!(printed = self.printed.len(), "reply rewrote printed text");
                self.diverged = true;
            }
        }
    }

    fn finish(mut self, content: &str) -> io::Result<()> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        match content.strip_prefix(self.printed.as_str()) {
            Some(rest) => self.out.write_all(rest.as_bytes())?,
            None => {
                self.out.write_all(b"\n")?;
                self.out.write_all(content.as_bytes())?;
            }
        }
        self.out.write_all(b"\n")?;
        self.out.flush()
    }
}

fn write_flush<W: Write>(out: &mut W, text: &str) -> io::Result<()> {
    out.write_all(text.as_bytes())?;
    out.flush()
}
