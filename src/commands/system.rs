use std::path::Path;
use std::process::{Command as Process, Stdio};

use crate::{
    dispatch::{registry::Command, Output},
    errors::{ShellError, ShellResult},
    session::Session,
};

/// Locale variables handed to child programs; everything else is cleared.
const PASS_ENV: &[&str] = &["LANG", "LC_ALL", "TZ"];

pub struct Ps;

impl Command for Ps {
    fn name(&self) -> &'static str { "ps" }
    fn usage(&self) -> &'static str { "ps" }
    fn summary(&self) -> &'static str { "Show running processes (system)" }
    fn run(&self, session: &mut Session, _args: &[String]) -> ShellResult<Output> {
        Ok(Output::text(run_program(session, "ps", &["-e", "-o", "pid,comm,pcpu,pmem"])?))
    }
}

pub struct Sysmon;

impl Command for Sysmon {
    fn name(&self) -> &'static str { "sysmon" }
    fn usage(&self) -> &'static str { "sysmon" }
    fn summary(&self) -> &'static str { "CPU & memory snapshot" }
    fn run(&self, session: &mut Session, _args: &[String]) -> ShellResult<Output> {
        let mut out = Output::default();
        out.line(format!("Snapshot @ {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S")));
        if let Some([one, five, fifteen]) = load_average() {
            out.line(format!("loadavg: 1m={one:.2} 5m={five:.2} 15m={fifteen:.2}"));
        }
        match memory_summary(session) {
            Ok(text) => out.text.push_str(&text),
            Err(e) => out.error(e),
        }
        Ok(out)
    }
}

pub struct Df;

impl Command for Df {
    fn name(&self) -> &'static str { "df" }
    fn usage(&self) -> &'static str { "df" }
    fn summary(&self) -> &'static str { "Disk usage for project root" }
    fn run(&self, session: &mut Session, _args: &[String]) -> ShellResult<Output> {
        let usage = disk_usage(session.root())?;
        let gb = |b: u64| b as f64 / (1024u64.pow(3)) as f64;
        Ok(Output::text(format!(
            "Filesystem (project root): total={:.2}G used={:.2}G free={:.2}G\n",
            gb(usage.total),
            gb(usage.used),
            gb(usage.free)
        )))
    }
}

/// Runs a system program found on PATH with a scrubbed environment and
/// returns its stdout and stderr, capped at the session's output limit.
fn run_program(session: &Session, program: &'static str, args: &[&str]) -> ShellResult<String> {
    let full = which::which(program).map_err(|_| ShellError::Unsupported(program))?;
    let mut command = Process::new(&full);
    command.args(args).stdin(Stdio::null()).env_clear();
    for k in PASS_ENV {
        if let Ok(v) = std::env::var(k) {
            command.env(k, v);
        }
    }
    let output = command.output()?;
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(truncate(text, session.max_output_bytes()))
}

fn truncate(mut text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str("[output truncated]\n");
    text
}

#[cfg(unix)]
fn load_average() -> Option<[f64; 3]> {
    let mut loads = [0f64; 3];
    // SAFETY: the buffer holds exactly the three samples requested.
    let n = unsafe { libc::getloadavg(loads.as_mut_ptr(), 3) };
    (n == 3).then_some(loads)
}

#[cfg(not(unix))]
fn load_average() -> Option<[f64; 3]> {
    None
}

#[cfg(target_os = "linux")]
fn memory_summary(_session: &Session) -> ShellResult<String> {
    let meminfo = std::fs::read_to_string("/proc/meminfo")?;
    Ok(meminfo.lines().take(5).map(|l| format!("{}\n", l.trim())).collect())
}

#[cfg(target_os = "macos")]
fn memory_summary(session: &Session) -> ShellResult<String> {
    run_program(session, "vm_stat", &[])
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn memory_summary(_session: &Session) -> ShellResult<String> {
    Err(ShellError::Unsupported("memory info"))
}

struct DiskUsage {
    total: u64,
    used: u64,
    free: u64,
}

#[cfg(unix)]
fn disk_usage(path: &Path) -> ShellResult<DiskUsage> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| ShellError::Io(std::io::Error::from(std::io::ErrorKind::InvalidInput)))?;
    // SAFETY: statvfs is plain old data and is fully written on success.
    let mut st: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut st) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    let frsize = st.f_frsize as u64;
    let total = st.f_blocks as u64 * frsize;
    Ok(DiskUsage {
        total,
        used: total.saturating_sub(st.f_bfree as u64 * frsize),
        free: st.f_bavail as u64 * frsize,
    })
}

#[cfg(not(unix))]
fn disk_usage(_path: &Path) -> ShellResult<DiskUsage> {
    Err(ShellError::Unsupported("df"))
}
