use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use super::line_count;
use crate::{
    dispatch::{registry::Command, Output},
    errors::{ShellError, ShellResult},
    session::Session,
};

pub struct Cat;

impl Command for Cat {
    fn name(&self) -> &'static str { "cat" }
    fn usage(&self) -> &'static str { "cat <file>..." }
    fn summary(&self) -> &'static str { "Print file(s)" }
    fn run(&self, session: &mut Session, args: &[String]) -> ShellResult<Output> {
        if args.is_empty() {
            return Err(ShellError::Usage(self.usage()));
        }
        let mut out = Output::default();
        for f in args {
            match existing_file(session, f).and_then(|p| Ok(fs::read(p)?)) {
                Ok(bytes) => out.text.push_str(&String::from_utf8_lossy(&bytes)),
                Err(e) => out.error(e),
            }
        }
        Ok(out)
    }
}

pub struct Echo;

impl Command for Echo {
    fn name(&self) -> &'static str { "echo" }
    fn usage(&self) -> &'static str { "echo [text]" }
    fn summary(&self) -> &'static str { "Print text (> file to write, >> to append)" }
    fn run(&self, _session: &mut Session, args: &[String]) -> ShellResult<Output> {
        let mut out = Output::default();
        out.line(args.join(" "));
        Ok(out)
    }
}

pub struct Head;

impl Command for Head {
    fn name(&self) -> &'static str { "head" }
    fn usage(&self) -> &'static str { "head [-n N] <file>..." }
    fn summary(&self) -> &'static str { "First N lines (default 10)" }
    fn run(&self, session: &mut Session, args: &[String]) -> ShellResult<Output> {
        slice_lines(session, args, self.usage(), false)
    }
}

pub struct Tail;

impl Command for Tail {
    fn name(&self) -> &'static str { "tail" }
    fn usage(&self) -> &'static str { "tail [-n N] <file>..." }
    fn summary(&self) -> &'static str { "Last N lines (default 10)" }
    fn run(&self, session: &mut Session, args: &[String]) -> ShellResult<Output> {
        slice_lines(session, args, self.usage(), true)
    }
}

fn existing_file(session: &Session, raw: &str) -> ShellResult<PathBuf> {
    let path = session.resolve(raw)?;
    if !path.is_file() {
        return Err(ShellError::not_found(format!("no such file: {raw}")));
    }
    Ok(path)
}

fn slice_lines(session: &Session, args: &[String], usage: &'static str, from_end: bool) -> ShellResult<Output> {
    let (n, files) = line_count(args, usage)?;
    let mut out = Output::default();
    if n <= 0 {
        return Ok(out);
    }
    let n = n as usize;
    for f in files {
        let lines = existing_file(session, f).and_then(|p| {
            let reader = BufReader::new(File::open(p)?);
            if from_end { last_lines(reader, n) } else { first_lines(reader, n) }
        });
        match lines {
            Ok(lines) => lines.iter().for_each(|l| out.text.push_str(&String::from_utf8_lossy(l))),
            Err(e) => out.error(e),
        }
    }
    Ok(out)
}

/// Lines keep their terminators so the output reproduces the file exactly.
fn first_lines(mut reader: impl BufRead, n: usize) -> ShellResult<Vec<Vec<u8>>> {
    let mut lines = Vec::with_capacity(n);
    while lines.len() < n {
        let mut buf = Vec::new();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        lines.push(buf);
    }
    Ok(lines)
}

fn last_lines(mut reader: impl BufRead, n: usize) -> ShellResult<Vec<Vec<u8>>> {
    let mut window = VecDeque::with_capacity(n);
    loop {
        let mut buf = Vec::new();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        if window.len() == n {
            window.pop_front();
        }
        window.push_back(buf);
    }
    Ok(window.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confine::ConfinePolicy;
    use crate::dispatch::Dispatcher;
    use crate::session::testing::session_in;
    use assert_fs::prelude::*;

    fn numbered(n: usize) -> String {
        (1..=n).map(|i| format!("line {i}\n")).collect()
    }

    #[test]
    fn cat_concatenates_and_reports_missing() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.txt").write_str("alpha\n").unwrap();
        temp.child("b.txt").write_str("beta").unwrap();
        let mut s = session_in(temp.path(), ConfinePolicy::Clamp);
        let r = Dispatcher::new().execute(&mut s, "cat a.txt missing.txt b.txt");
        assert_eq!(r.output, "alpha\nbeta");
        assert_eq!(r.errors, ["no such file: missing.txt"]);
    }

    #[test]
    fn cat_refuses_directories_and_reads_invalid_utf8() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("dir").create_dir_all().unwrap();
        temp.child("bin").write_binary(&[0x66, 0xff, 0x6f]).unwrap();
        let mut s = session_in(temp.path(), ConfinePolicy::Clamp);
        let d = Dispatcher::new();
        assert_eq!(d.execute(&mut s, "cat dir").errors, ["no such file: dir"]);
        assert_eq!(d.execute(&mut s, "cat bin").output, "f\u{fffd}o");
        assert_eq!(d.execute(&mut s, "cat").codes, ["Usage"]);
    }

    #[test]
    fn echo_joins_with_single_spaces() {
        let temp = assert_fs::TempDir::new().unwrap();
        let mut s = session_in(temp.path(), ConfinePolicy::Clamp);
        let d = Dispatcher::new();
        assert_eq!(d.execute(&mut s, "echo   a   'b  c'").output, "a b  c\n");
        assert_eq!(d.execute(&mut s, "echo").output, "\n");
    }

    #[test]
    fn head_and_tail_default_to_ten() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("n.txt").write_str(&numbered(15)).unwrap();
        let mut s = session_in(temp.path(), ConfinePolicy::Clamp);
        let d = Dispatcher::new();
        assert_eq!(d.execute(&mut s, "head n.txt").output, numbered(10));
        let tail = d.execute(&mut s, "tail n.txt").output;
        assert!(tail.starts_with("line 6\n") && tail.ends_with("line 15\n"));
        assert_eq!(tail.lines().count(), 10);
    }

    #[test]
    fn head_and_tail_honor_n() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("n.txt").write_str(&numbered(5)).unwrap();
        let mut s = session_in(temp.path(), ConfinePolicy::Clamp);
        let d = Dispatcher::new();
        assert_eq!(d.execute(&mut s, "head -n 2 n.txt").output, "line 1\nline 2\n");
        assert_eq!(d.execute(&mut s, "tail -n 2 n.txt").output, "line 4\nline 5\n");
        assert_eq!(d.execute(&mut s, "tail -n 99 n.txt").output, numbered(5));
        assert_eq!(d.execute(&mut s, "head -n 0 n.txt").output, "");
        assert_eq!(d.execute(&mut s, "head -n -3 n.txt").output, "");
        assert_eq!(d.execute(&mut s, "head -n x n.txt").render(), "error: invalid N\n");
        assert_eq!(d.execute(&mut s, "tail nope.txt").errors, ["no such file: nope.txt"]);
    }
}
