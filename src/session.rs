use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::confine::Confiner;
use crate::errors::ShellResult;

/// Asks the user a yes/no question on behalf of a command.
pub trait Prompter {
    fn confirm(&mut self, question: &str) -> bool;
}

/// Terminal prompter: reads one line from stdin, only `y` accepts.
pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn confirm(&mut self, question: &str) -> bool {
        print!("{question} [y/N]: ");
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(0) | Err(_) => false,
            Ok(_) => answer.trim().eq_ignore_ascii_case("y"),
        }
    }
}

/// Used where nobody can answer, e.g. the web UI.
pub struct DeclinePrompter;

impl Prompter for DeclinePrompter {
    fn confirm(&mut self, _question: &str) -> bool { false }
}

/// One shell session: the confinement root, where the user is, and what they
/// have typed so far.
pub struct Session {
    confiner: Confiner,
    cwd: PathBuf,
    history: Vec<String>,
    history_limit: usize,
    max_output_bytes: usize,
    prompter: Box<dyn Prompter + Send>,
}

impl Session {
    pub fn new(confiner: Confiner, prompter: Box<dyn Prompter + Send>) -> Self {
        let cwd = confiner.root().to_path_buf();
        Self { confiner, cwd, history: Vec::new(), history_limit: 50, max_output_bytes: 256 * 1024, prompter }
    }

    pub fn from_config(cfg: &Config, root: &Path, prompter: Box<dyn Prompter + Send>) -> anyhow::Result<Self> {
        let confiner = Confiner::new(root, cfg.shell.confine)?;
        let mut session = Self::new(confiner, prompter);
        session.history_limit = cfg.shell.history_limit;
        session.max_output_bytes = cfg.limits.max_output_kb * 1024;
        Ok(session)
    }

    pub fn root(&self) -> &Path { self.confiner.root() }

    pub fn cwd(&self) -> &Path { &self.cwd }

    /// Resolves a user path through the confiner relative to the cwd.
    pub fn resolve(&self, input: &str) -> ShellResult<PathBuf> {
        self.confiner.resolve(&self.cwd, input)
    }

    /// Resolves the entry itself, leaving a trailing symlink unfollowed.
    pub fn resolve_entry(&self, input: &str) -> ShellResult<PathBuf> {
        self.confiner.resolve_entry(&self.cwd, input)
    }

    /// Only accepts directories inside the root; returns whether cwd moved.
    pub fn set_cwd(&mut self, dir: PathBuf) -> bool {
        if self.confiner.contains(&dir) && dir.is_dir() {
            self.cwd = dir;
            true
        } else {
            false
        }
    }

    /// Moves back to the root if the cwd vanished; returns whether it did.
    pub fn ensure_cwd(&mut self) -> bool {
        if self.cwd.is_dir() {
            return false;
        }
        self.cwd = self.confiner.root().to_path_buf();
        true
    }

    pub fn display_cwd(&self) -> String { self.confiner.virtual_path(&self.cwd) }

    pub fn display_path(&self, path: &Path) -> String { self.confiner.virtual_path(path) }

    pub fn record(&mut self, line: &str) { self.history.push(line.to_string()); }

    pub fn history(&self) -> &[String] { &self.history }

    pub fn history_limit(&self) -> usize { self.history_limit }

    pub fn max_output_bytes(&self) -> usize { self.max_output_bytes }

    pub fn confirm(&mut self, question: &str) -> bool { self.prompter.confirm(question) }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::confine::ConfinePolicy;

    pub struct AcceptPrompter;

    impl Prompter for AcceptPrompter {
        fn confirm(&mut self, _question: &str) -> bool { true }
    }

    pub fn session_in(root: &Path, policy: ConfinePolicy) -> Session {
        Session::new(Confiner::new(root, policy).unwrap(), Box::new(DeclinePrompter))
    }
}
