use std::fs::{self, OpenOptions};
use std::time::SystemTime;

use super::{file_name, split_flags};
use crate::{
    dispatch::{registry::Command, Output},
    errors::{ShellError, ShellResult},
    session::Session,
};

pub struct Pwd;

impl Command for Pwd {
    fn name(&self) -> &'static str { "pwd" }
    fn usage(&self) -> &'static str { "pwd" }
    fn summary(&self) -> &'static str { "Print working directory" }
    fn run(&self, session: &mut Session, _args: &[String]) -> ShellResult<Output> {
        Ok(Output::text(format!("{}\n", session.cwd().display())))
    }
}

pub struct Ls;

impl Command for Ls {
    fn name(&self) -> &'static str { "ls" }
    fn usage(&self) -> &'static str { "ls [-a] [path]" }
    fn summary(&self) -> &'static str { "List files (add -a to include hidden)" }
    fn run(&self, session: &mut Session, args: &[String]) -> ShellResult<Output> {
        let (flags, operands) = split_flags(args, &['a'], self.usage())?;
        let show_all = flags.contains(&'a');
        let path = session.resolve(operands.last().copied().unwrap_or(""))?;
        let meta = fs::metadata(&path).map_err(|_| ShellError::not_found("path not found"))?;
        let mut out = Output::default();
        if !meta.is_dir() {
            out.line(file_name(&path));
            return Ok(out);
        }
        let mut entries: Vec<(bool, String)> = fs::read_dir(&path)?
            .filter_map(|e| e.ok())
            .map(|e| (e.path().is_dir(), e.file_name().to_string_lossy().into_owned()))
            .collect();
        // directories first, then case-insensitive by name
        entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.to_lowercase().cmp(&b.1.to_lowercase())));
        for (is_dir, name) in entries {
            if !show_all && name.starts_with('.') {
                continue;
            }
            if is_dir {
                out.line(format!("{name}/"));
            } else {
                out.line(name);
            }
        }
        Ok(out)
    }
}

pub struct Cd;

impl Command for Cd {
    fn name(&self) -> &'static str { "cd" }
    fn usage(&self) -> &'static str { "cd [path]" }
    fn summary(&self) -> &'static str { "Change directory (sandboxed to project root)" }
    fn run(&self, session: &mut Session, args: &[String]) -> ShellResult<Output> {
        let target = match args.first() {
            Some(p) => session.resolve(p)?,
            None => session.root().to_path_buf(),
        };
        if !session.set_cwd(target) {
            return Err(ShellError::not_found("no such directory"));
        }
        Ok(Output::default())
    }
}

pub struct Mkdir;

impl Command for Mkdir {
    fn name(&self) -> &'static str { "mkdir" }
    fn usage(&self) -> &'static str { "mkdir <dir>..." }
    fn summary(&self) -> &'static str { "Create directories (supports multiple)" }
    fn run(&self, session: &mut Session, args: &[String]) -> ShellResult<Output> {
        if args.is_empty() {
            return Err(ShellError::Usage(self.usage()));
        }
        let mut out = Output::default();
        for d in args {
            match session.resolve(d) {
                Ok(p) => {
                    if let Err(e) = fs::create_dir_all(&p) {
                        out.error(e.into());
                    }
                }
                Err(e) => out.error(e),
            }
        }
        Ok(out)
    }
}

pub struct Rm;

impl Command for Rm {
    fn name(&self) -> &'static str { "rm" }
    fn usage(&self) -> &'static str { "rm [-r] [-f] <path>..." }
    fn summary(&self) -> &'static str { "Remove files; -r for directories, -f skips the prompt" }
    fn run(&self, session: &mut Session, args: &[String]) -> ShellResult<Output> {
        let (flags, operands) = split_flags(args, &['r', 'f'], self.usage())?;
        if operands.is_empty() {
            return Err(ShellError::Usage(self.usage()));
        }
        let recursive = flags.contains(&'r');
        let force = flags.contains(&'f');
        let mut out = Output::default();
        for raw in operands {
            let path = match session.resolve_entry(raw) {
                Ok(p) => p,
                Err(e) => {
                    out.error(e);
                    continue;
                }
            };
            if path == session.root() {
                out.error(ShellError::Refused("refusing to remove the project root".into()));
                continue;
            }
            let Ok(meta) = fs::symlink_metadata(&path) else {
                out.error(ShellError::not_found(format!("not found: {raw}")));
                continue;
            };
            let removed = if meta.is_dir() {
                if !recursive {
                    out.error(ShellError::IsADirectory(raw.to_string()));
                    continue;
                }
                let question = format!("rm -r {}", session.display_path(&path));
                if !force && !session.confirm(&question) {
                    out.line("aborted");
                    continue;
                }
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            if let Err(e) = removed {
                out.error(e.into());
            }
        }
        Ok(out)
    }
}

pub struct Touch;

impl Command for Touch {
    fn name(&self) -> &'static str { "touch" }
    fn usage(&self) -> &'static str { "touch <file>..." }
    fn summary(&self) -> &'static str { "Create empty file(s) or update mtime" }
    fn run(&self, session: &mut Session, args: &[String]) -> ShellResult<Output> {
        if args.is_empty() {
            return Err(ShellError::Usage(self.usage()));
        }
        let mut out = Output::default();
        for f in args {
            if let Err(e) = touch(session, f) {
                out.error(e);
            }
        }
        Ok(out)
    }
}

fn touch(session: &Session, raw: &str) -> ShellResult<()> {
    let path = session.resolve(raw)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    file.set_modified(SystemTime::now())?;
    Ok(())
}
