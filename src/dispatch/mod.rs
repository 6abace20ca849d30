pub mod parser;
pub mod registry;

use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use tracing::debug;

use crate::errors::{ShellError, ShellResult};
use crate::session::Session;
use parser::Redirect;
use registry::CommandRegistry;

/// What a handler produced. Per-item failures (one missing file out of
/// three) go into `errors` while the rest of the work still happens.
#[derive(Debug, Default)]
pub struct Output {
    pub text: String,
    pub errors: Vec<ShellError>,
    pub exit: bool,
}

impl Output {
    pub fn line(&mut self, s: impl AsRef<str>) {
        self.text.push_str(s.as_ref());
        self.text.push('\n');
    }

    pub fn error(&mut self, e: ShellError) { self.errors.push(e); }

    pub fn text(s: impl Into<String>) -> Self { Self { text: s.into(), ..Self::default() } }

    pub fn exit() -> Self { Self { exit: true, ..Self::default() } }
}

/// What a front-end shows for one line of input.
#[derive(Debug, Default, Serialize)]
pub struct Reply {
    pub output: String,
    pub errors: Vec<String>,
    pub exit: bool,
    #[serde(skip)]
    pub codes: Vec<&'static str>,
}

impl Reply {
    fn failed(e: ShellError) -> Self {
        Self { errors: vec![e.to_string()], codes: vec![e.code()], ..Self::default() }
    }

    fn push_error(&mut self, e: ShellError) {
        self.codes.push(e.code());
        self.errors.push(e.to_string());
    }

    pub fn is_ok(&self) -> bool { self.errors.is_empty() }

    /// Output followed by one `error: ...` line per failure.
    pub fn render(&self) -> String {
        let mut s = self.output.clone();
        for e in &self.errors {
            s.push_str("error: ");
            s.push_str(e);
            s.push('\n');
        }
        s
    }
}

#[derive(Clone, Default)]
pub struct Dispatcher {
    registry: CommandRegistry,
}

impl Dispatcher {
    pub fn new() -> Self { Self { registry: CommandRegistry::new() } }

    pub fn registry(&self) -> &CommandRegistry { &self.registry }

    /// Runs one raw line against `session`. Lines that fail to split or name
    /// an unknown command leave the session untouched; everything else is
    /// appended to history before it runs.
    pub fn execute(&self, session: &mut Session, line: &str) -> Reply {
        let cmd = match parser::parse(line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => return Reply::default(),
            Err(e) => return Reply::failed(e),
        };
        let Some(handler) = self.registry.get(&cmd.name) else {
            debug!(command = %cmd.name, "unknown command");
            return Reply::failed(ShellError::UnknownCommand(cmd.name));
        };

        session.record(line.trim());
        debug!(command = %cmd.name, args = ?cmd.args, cwd = %session.display_cwd(), "dispatch");

        let mut reply = match handler.run(session, &cmd.args) {
            Ok(out) => {
                let mut reply = Reply { exit: out.exit, ..Reply::default() };
                match &cmd.redirect {
                    Some(r) => {
                        if let Err(e) = write_redirect(session, r, &out.text) {
                            reply.push_error(e);
                        }
                    }
                    None => reply.output = out.text,
                }
                for e in out.errors {
                    reply.push_error(e);
                }
                reply
            }
            Err(e) => Reply::failed(e),
        };
        if session.ensure_cwd() {
            reply.output.push_str("working directory removed, back at project root\n");
        }
        reply
    }
}

fn write_redirect(session: &Session, r: &Redirect, text: &str) -> ShellResult<()> {
    let target = session.resolve(&r.target)?;
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(r.append)
        .truncate(!r.append)
        .open(&target)?;
    file.write_all(text.as_bytes())?;
    Ok(())
}
