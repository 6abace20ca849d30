use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::file_name;
use crate::{
    dispatch::{registry::Command, Output},
    errors::{ShellError, ShellResult},
    session::Session,
};

pub struct Cp;

impl Command for Cp {
    fn name(&self) -> &'static str { "cp" }
    fn usage(&self) -> &'static str { "cp <src> <dst>" }
    fn summary(&self) -> &'static str { "Copy file/dir (dst may be dir)" }
    fn run(&self, session: &mut Session, args: &[String]) -> ShellResult<Output> {
        let (src, dst) = endpoints(session, args, self.usage(), false)?;
        let mut out = Output::default();
        if src.is_dir() {
            let dst = if dst.is_dir() { dst.join(file_name(&src)) } else { dst };
            if dst.starts_with(&src) {
                return Err(ShellError::Refused(format!(
                    "cannot copy {} into itself",
                    session.display_path(&src)
                )));
            }
            copy_tree(session, &src, &dst, &mut out)?;
        } else {
            let dst = if dst.is_dir() { dst.join(file_name(&src)) } else { dst };
            // fs::copy truncates dst before reading src
            if same_file(&src, &dst) {
                return Err(ShellError::Refused(format!(
                    "'{}' and '{}' are the same file",
                    session.display_path(&src),
                    session.display_path(&dst)
                )));
            }
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&src, &dst)?;
        }
        Ok(out)
    }
}

pub struct Mv;

impl Command for Mv {
    fn name(&self) -> &'static str { "mv" }
    fn usage(&self) -> &'static str { "mv <src> <dst>" }
    fn summary(&self) -> &'static str { "Move/rename" }
    fn run(&self, session: &mut Session, args: &[String]) -> ShellResult<Output> {
        let (src, dst) = endpoints(session, args, self.usage(), true)?;
        if src == session.root() {
            return Err(ShellError::Refused("refusing to move the project root".into()));
        }
        let dst = if dst.is_dir() { dst.join(file_name(&src)) } else { dst };
        if dst == src {
            return Ok(Output::default());
        }
        let src_is_dir = fs::symlink_metadata(&src).map(|m| m.is_dir()).unwrap_or(false);
        if src_is_dir && dst.starts_with(&src) {
            return Err(ShellError::Refused(format!(
                "cannot move {} into itself",
                session.display_path(&src)
            )));
        }
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        match fs::rename(&src, &dst) {
            Ok(()) => {}
            Err(e) if is_cross_device(&e) => {
                // rename cannot cross filesystems; fall back to copy then delete
                let mut out = Output::default();
                if src_is_dir {
                    copy_tree(session, &src, &dst, &mut out)?;
                    if out.errors.is_empty() {
                        fs::remove_dir_all(&src)?;
                    }
                } else {
                    fs::copy(&src, &dst)?;
                    fs::remove_file(&src)?;
                }
                return Ok(out);
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Output::default())
    }
}

/// With `link_itself`, a source that is a symlink names the link rather than
/// its target.
fn endpoints(
    session: &Session,
    args: &[String],
    usage: &'static str,
    link_itself: bool,
) -> ShellResult<(PathBuf, PathBuf)> {
    let [src, dst] = args else {
        return Err(ShellError::Usage(usage));
    };
    let src = if link_itself { session.resolve_entry(src)? } else { session.resolve(src)? };
    if fs::symlink_metadata(&src).is_err() {
        return Err(ShellError::not_found("source not found"));
    }
    let dst = session.resolve(dst)?;
    Ok((src, dst))
}

#[cfg(unix)]
fn same_file(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    if a == b {
        return true;
    }
    match (fs::metadata(a), fs::metadata(b)) {
        (Ok(x), Ok(y)) => x.dev() == y.dev() && x.ino() == y.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_file(a: &Path, b: &Path) -> bool {
    a == b
}

#[cfg(unix)]
fn is_cross_device(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(not(unix))]
fn is_cross_device(_e: &io::Error) -> bool {
    false
}

/// Recursive copy that merges into an existing `dst`. Symlinks are followed
/// only when their target stays inside the root; directory links are skipped
/// so a link back to an ancestor cannot recurse forever.
fn copy_tree(session: &Session, src: &Path, dst: &Path, out: &mut Output) -> ShellResult<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let kind = entry.file_type()?;
        if kind.is_dir() {
            copy_tree(session, &from, &to, out)?;
        } else if kind.is_symlink() {
            match dunce::canonicalize(&from) {
                Ok(target) if target.starts_with(session.root()) && target.is_file() => {
                    fs::copy(&target, &to)?;
                }
                _ => out.error(ShellError::Refused(format!("skipped link: {}", session.display_path(&from)))),
            }
        } else {
            fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::confine::ConfinePolicy;
    use crate::dispatch::Dispatcher;
    use crate::session::testing::session_in;
    use assert_fs::prelude::*;

    #[test]
    fn cp_file_to_new_name_and_into_dir() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.txt").write_str("A").unwrap();
        temp.child("box").create_dir_all().unwrap();
        let mut s = session_in(temp.path(), ConfinePolicy::Clamp);
        let d = Dispatcher::new();
        assert!(d.execute(&mut s, "cp a.txt b.txt").is_ok());
        assert!(d.execute(&mut s, "cp a.txt box").is_ok());
        assert!(d.execute(&mut s, "cp a.txt deep/er/c.txt").is_ok());
        temp.child("b.txt").assert("A");
        temp.child("box/a.txt").assert("A");
        temp.child("deep/er/c.txt").assert("A");
        temp.child("a.txt").assert("A");
    }

    #[test]
    fn cp_onto_itself_is_refused() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.txt").write_str("precious\n").unwrap();
        let mut s = session_in(temp.path(), ConfinePolicy::Clamp);
        let d = Dispatcher::new();
        let r = d.execute(&mut s, "cp a.txt a.txt");
        assert_eq!(r.errors, ["'/a.txt' and '/a.txt' are the same file"]);
        temp.child("a.txt").assert("precious\n");
        assert_eq!(d.execute(&mut s, "cp a.txt .").codes, ["Refused"]);
        temp.child("a.txt").assert("precious\n");
    }

    #[cfg(unix)]
    #[test]
    fn cp_onto_a_hard_link_is_refused() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.txt").write_str("precious\n").unwrap();
        std::fs::hard_link(temp.child("a.txt").path(), temp.child("b.txt").path()).unwrap();
        let mut s = session_in(temp.path(), ConfinePolicy::Clamp);
        assert_eq!(Dispatcher::new().execute(&mut s, "cp a.txt b.txt").codes, ["Refused"]);
        temp.child("b.txt").assert("precious\n");
    }

    #[test]
    fn mv_onto_itself_changes_nothing() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.txt").write_str("precious\n").unwrap();
        let mut s = session_in(temp.path(), ConfinePolicy::Clamp);
        let d = Dispatcher::new();
        assert!(d.execute(&mut s, "mv a.txt a.txt").is_ok());
        assert!(d.execute(&mut s, "mv a.txt .").is_ok());
        temp.child("a.txt").assert("precious\n");
    }

    #[cfg(unix)]
    #[test]
    fn mv_moves_the_link_not_its_target() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("real.txt").write_str("keep").unwrap();
        std::os::unix::fs::symlink(temp.child("real.txt").path(), temp.child("alias").path()).unwrap();
        let mut s = session_in(temp.path(), ConfinePolicy::Clamp);
        assert!(Dispatcher::new().execute(&mut s, "mv alias renamed").is_ok());
        temp.child("real.txt").assert("keep");
        assert!(std::fs::symlink_metadata(temp.child("renamed").path()).unwrap().file_type().is_symlink());
        assert!(std::fs::symlink_metadata(temp.child("alias").path()).is_err());
    }

    #[test]
    fn cp_directory_recursively() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/one.txt").write_str("1").unwrap();
        temp.child("src/sub/two.txt").write_str("2").unwrap();
        temp.child("dest").create_dir_all().unwrap();
        let mut s = session_in(temp.path(), ConfinePolicy::Clamp);
        let d = Dispatcher::new();
        assert!(d.execute(&mut s, "cp src copy").is_ok());
        temp.child("copy/sub/two.txt").assert("2");
        assert!(d.execute(&mut s, "cp src dest").is_ok());
        temp.child("dest/src/one.txt").assert("1");
        assert_eq!(d.execute(&mut s, "cp src src/sub").codes, ["Refused"]);
    }

    #[cfg(unix)]
    #[test]
    fn cp_tree_skips_links_leaving_root() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/ok.txt").write_str("ok").unwrap();
        std::os::unix::fs::symlink("/etc/hostname", temp.child("src/leak").path()).unwrap();
        std::os::unix::fs::symlink(temp.child("src/ok.txt").path(), temp.child("src/alias").path()).unwrap();
        let mut s = session_in(temp.path(), ConfinePolicy::Clamp);
        let r = Dispatcher::new().execute(&mut s, "cp src out");
        assert_eq!(r.codes, ["Refused"]);
        assert!(!temp.child("out/leak").path().exists());
        temp.child("out/alias").assert("ok");
    }

    #[test]
    fn cp_and_mv_need_two_operands_and_a_source() {
        let temp = assert_fs::TempDir::new().unwrap();
        let mut s = session_in(temp.path(), ConfinePolicy::Clamp);
        let d = Dispatcher::new();
        assert_eq!(d.execute(&mut s, "cp only").render(), "error: usage: cp <src> <dst>\n");
        assert_eq!(d.execute(&mut s, "mv a b c").codes, ["Usage"]);
        assert_eq!(d.execute(&mut s, "mv ghost b").render(), "error: source not found\n");
    }

    #[test]
    fn mv_renames_and_moves_into_dir() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.txt").write_str("A").unwrap();
        temp.child("dir").create_dir_all().unwrap();
        let mut s = session_in(temp.path(), ConfinePolicy::Clamp);
        let d = Dispatcher::new();
        assert!(d.execute(&mut s, "mv a.txt b.txt").is_ok());
        assert!(!temp.child("a.txt").path().exists());
        assert!(d.execute(&mut s, "mv b.txt dir").is_ok());
        temp.child("dir/b.txt").assert("A");
        assert!(d.execute(&mut s, "mv dir new/place").is_ok());
        temp.child("new/place/b.txt").assert("A");
        assert_eq!(d.execute(&mut s, "mv new new/place").codes, ["Refused"]);
    }
}
