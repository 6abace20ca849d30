use rustyline::{error::ReadlineError, DefaultEditor};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::{dispatch::Dispatcher, session::Session};

pub const BANNER: &str = "Burrow sandboxed terminal\nType 'help' to see commands, 'exit' to leave.";

pub struct Repl {
    editor: DefaultEditor,
    session: Session,
    dispatcher: Dispatcher,
    history_file: Option<PathBuf>,
}

impl Repl {
    pub fn new(session: Session, history_file: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut editor = DefaultEditor::new()?;
        if let Some(path) = &history_file {
            if let Err(e) = editor.load_history(path) {
                debug!(path = %path.display(), error = %e, "no line history loaded");
            }
        }
        Ok(Self { editor, session, dispatcher: Dispatcher::new(), history_file })
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        println!("{BANNER}");
        loop {
            match self.editor.readline(&prompt(&self.session)) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if let Err(e) = self.editor.add_history_entry(line.as_str()) {
                        warn!(error = %e, "couldn't add to line history");
                    }
                    let reply = self.dispatcher.execute(&mut self.session, &line);
                    let mut stdout = io::stdout().lock();
                    stdout.write_all(reply.render().as_bytes())?;
                    stdout.flush()?;
                    if reply.exit {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => {
                    println!("exit");
                    break;
                }
                Err(e) => {
                    self.persist_history();
                    return Err(e.into());
                }
            }
        }
        self.persist_history();
        Ok(())
    }

    fn persist_history(&mut self) {
        let Some(path) = &self.history_file else { return };
        if let Err(e) = self.editor.save_history(path) {
            warn!(path = %path.display(), error = %e, "couldn't save line history");
        }
    }
}

/// `burrow:/` at the root, `burrow:/sub/dir` below it.
pub fn prompt(session: &Session) -> String {
    format!("burrow:{}$ ", session.display_cwd())
}
