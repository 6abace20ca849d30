use crate::{
    dispatch::{registry::Command, Output},
    errors::{ShellError, ShellResult},
    session::Session,
};

/// Built from the registry's other entries, so it never drifts from the table.
#[derive(Default)]
pub struct Help {
    entries: Vec<(&'static str, &'static str)>,
}

impl Help {
    pub const USAGE: &'static str = "help";
    pub const SUMMARY: &'static str = "Show this help";

    pub fn add(&mut self, usage: &'static str, summary: &'static str) {
        self.entries.push((usage, summary));
    }
}

impl Command for Help {
    fn name(&self) -> &'static str { "help" }
    fn usage(&self) -> &'static str { Self::USAGE }
    fn summary(&self) -> &'static str { Self::SUMMARY }
    fn run(&self, _session: &mut Session, _args: &[String]) -> ShellResult<Output> {
        let width = self.entries.iter().map(|(u, _)| u.len()).max().unwrap_or(0);
        let mut out = Output::default();
        out.line("Built-in commands:");
        for (usage, summary) in &self.entries {
            out.line(format!("  {usage:<width$}  {summary}"));
        }
        out.line(format!("  {:<width$}  Leave terminal", "exit | quit"));
        Ok(out)
    }
}

pub struct History;

impl Command for History {
    fn name(&self) -> &'static str { "history" }
    fn usage(&self) -> &'static str { "history [N]" }
    fn summary(&self) -> &'static str { "Show recent command history" }
    fn run(&self, session: &mut Session, args: &[String]) -> ShellResult<Output> {
        let limit = match args.first() {
            Some(n) => n.parse::<usize>().map_err(|_| ShellError::InvalidCount)?,
            None => session.history_limit(),
        };
        let entries = session.history();
        let start = entries.len().saturating_sub(limit);
        let mut out = Output::default();
        for (i, line) in entries.iter().enumerate().skip(start) {
            out.line(format!("{}: {line}", i + 1));
        }
        Ok(out)
    }
}

pub struct Exit;

impl Command for Exit {
    fn name(&self) -> &'static str { "exit" }
    fn usage(&self) -> &'static str { "exit" }
    fn summary(&self) -> &'static str { "Leave terminal" }
    fn run(&self, _session: &mut Session, _args: &[String]) -> ShellResult<Output> {
        Ok(Output::exit())
    }
}

#[cfg(test)]
mod tests {
    use crate::confine::ConfinePolicy;
    use crate::dispatch::Dispatcher;
    use crate::session::testing::session_in;

    #[test]
    fn help_lists_every_command_once() {
        let tmp = tempfile::tempdir().unwrap();
        let mut s = session_in(tmp.path(), ConfinePolicy::Clamp);
        let out = Dispatcher::new().execute(&mut s, "help").output;
        assert!(out.starts_with("Built-in commands:\n"));
        for usage in ["ls [-a] [path]", "rm [-r] [-f] <path>...", "head [-n N] <file>...", "history [N]", "exit | quit"] {
            assert_eq!(out.matches(usage).count(), 1, "{usage} in\n{out}");
        }
        assert!(!out.contains("\n  exit  "));
    }

    #[test]
    fn history_limits_to_last_n_keeping_numbers() {
        let tmp = tempfile::tempdir().unwrap();
        let mut s = session_in(tmp.path(), ConfinePolicy::Clamp);
        let d = Dispatcher::new();
        for _ in 0..4 {
            d.execute(&mut s, "pwd");
        }
        assert_eq!(d.execute(&mut s, "history 2").output, "4: pwd\n5: history 2\n");
        assert_eq!(d.execute(&mut s, "history nope").render(), "error: invalid N\n");
    }

    #[test]
    fn exit_and_quit_end_the_session() {
        let tmp = tempfile::tempdir().unwrap();
        let mut s = session_in(tmp.path(), ConfinePolicy::Clamp);
        let d = Dispatcher::new();
        assert!(d.execute(&mut s, "exit").exit);
        assert!(d.execute(&mut s, "quit").exit);
        assert!(!d.execute(&mut s, "pwd").exit);
    }
}
