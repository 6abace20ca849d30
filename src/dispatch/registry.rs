use crate::{errors::ShellResult, session::Session};
use std::sync::Arc;

use super::Output;

pub type DynCommand = Arc<dyn Command + Send + Sync + 'static>;

/// The fixed command table. Names are unique; `quit` is registered as a
/// second name for `exit`.
#[derive(Clone)]
pub struct CommandRegistry {
    commands: Vec<(String, DynCommand)>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        use crate::commands::{fs, meta, system, text, transfer};
        let exit: DynCommand = Arc::new(meta::Exit);
        let mut commands: Vec<(String, DynCommand)> = vec![
            entry(fs::Pwd),
            entry(fs::Ls),
            entry(fs::Cd),
            entry(fs::Mkdir),
            entry(fs::Rm),
            entry(fs::Touch),
            entry(text::Cat),
            entry(text::Echo),
            entry(transfer::Cp),
            entry(transfer::Mv),
            entry(text::Head),
            entry(text::Tail),
            entry(system::Ps),
            entry(system::Sysmon),
            entry(system::Df),
            entry(meta::History),
            ("exit".to_string(), exit.clone()),
        ];
        let mut help = meta::Help::default();
        help.add(meta::Help::USAGE, meta::Help::SUMMARY);
        // exit is listed by help itself together with quit
        for (_, cmd) in commands.iter().filter(|(n, _)| n != "exit") {
            help.add(cmd.usage(), cmd.summary());
        }
        commands.push(entry(help));
        commands.push(("quit".to_string(), exit));
        commands.sort_by(|a, b| a.0.cmp(&b.0));
        Self { commands }
    }

    pub fn get(&self, name: &str) -> Option<DynCommand> { self.commands.iter().find(|(n, _)| n == name).map(|(_, c)| c.clone()) }
    pub fn list_names(&self) -> Vec<String> { self.commands.iter().map(|(n, _)| n.clone()).collect() }
}

fn entry<C: Command + Send + Sync + 'static>(cmd: C) -> (String, DynCommand) {
    let cmd: DynCommand = Arc::new(cmd);
    (cmd.name().to_string(), cmd)
}

impl Default for CommandRegistry {
    fn default() -> Self { Self::new() }
}

/// One built-in. Handlers get the session explicitly and report either a
/// text [`Output`] (which may carry per-item errors) or a single error.
pub trait Command {
    fn name(&self) -> &'static str;
    fn usage(&self) -> &'static str;
    fn summary(&self) -> &'static str;
    fn run(&self, session: &mut Session, args: &[String]) -> ShellResult<Output>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_is_registered() {
        let reg = CommandRegistry::new();
        let names = reg.list_names();
        for expected in [
            "ls", "cd", "pwd", "mkdir", "rm", "touch", "cat", "echo", "cp", "mv", "head", "tail", "ps", "sysmon",
            "df", "help", "history", "exit", "quit",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
        assert_eq!(names.len(), 19);
    }

    #[test]
    fn quit_is_exit() {
        let reg = CommandRegistry::new();
        assert_eq!(reg.get("quit").unwrap().name(), "exit");
        assert!(reg.get("frobnicate").is_none());
    }
}
