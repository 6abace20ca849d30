//! Path confinement: every path a command touches is resolved here first.
//!
//! Resolution walks the path one component at a time. `.` is dropped, `..`
//! pops, and any prefix that exists on disk is canonicalized, so a symlink is
//! followed at the point where it appears rather than after lexical cleanup.
//! Components that do not exist yet are kept as written, which lets `mkdir`
//! and `touch` name new paths. The result is then checked against the
//! canonical root and, if it escapes, clamped or rejected per [`ConfinePolicy`].

use serde::Deserialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

use crate::errors::{ShellError, ShellResult};

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConfinePolicy {
    /// Map an escaping path to `root/<final component>`, or the root itself.
    #[default]
    Clamp,
    /// Fail with [`ShellError::PathOutsideRoot`].
    Reject,
}

#[derive(Debug, Clone)]
pub struct Confiner {
    root: PathBuf,
    policy: ConfinePolicy,
}

impl Confiner {
    pub fn new(root: &Path, policy: ConfinePolicy) -> anyhow::Result<Self> {
        let root = dunce::canonicalize(root)?;
        if !root.is_dir() {
            anyhow::bail!("root is not a directory: {}", root.display());
        }
        Ok(Self { root, policy })
    }

    pub fn root(&self) -> &Path { &self.root }

    pub fn contains(&self, path: &Path) -> bool { path.starts_with(&self.root) }

    /// Resolves `input` against `cwd`. An empty input names `cwd` itself.
    /// Any `Ok` path returned lies inside the root.
    pub fn resolve(&self, cwd: &Path, input: &str) -> ShellResult<PathBuf> {
        if input.is_empty() {
            return Ok(cwd.to_path_buf());
        }
        let raw = Path::new(input);
        let joined = if raw.is_absolute() { raw.to_path_buf() } else { cwd.join(raw) };
        match resolve_lenient(&joined) {
            Some(p) if self.contains(&p) => Ok(p),
            resolved => self.escape(raw, resolved),
        }
    }

    /// Like [`resolve`](Self::resolve) but leaves the final component
    /// unfollowed, so `rm`/`mv` act on a symlink itself rather than its target.
    pub fn resolve_entry(&self, cwd: &Path, input: &str) -> ShellResult<PathBuf> {
        let raw = Path::new(input);
        let Some(Component::Normal(name)) = raw.components().next_back() else {
            return self.resolve(cwd, input);
        };
        let parent = raw.parent().map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();
        let base = if parent.is_empty() { cwd.to_path_buf() } else { self.resolve(cwd, &parent)? };
        let entry = base.join(name);
        if fs::symlink_metadata(&entry).map(|m| m.file_type().is_symlink()).unwrap_or(false) {
            return Ok(entry);
        }
        self.resolve(cwd, input)
    }

    fn escape(&self, raw: &Path, resolved: Option<PathBuf>) -> ShellResult<PathBuf> {
        let landed = resolved.unwrap_or_else(|| raw.to_path_buf());
        match self.policy {
            ConfinePolicy::Reject => {
                warn!(input = %raw.display(), resolved = %landed.display(), "path outside root rejected");
                Err(ShellError::PathOutsideRoot(raw.to_path_buf()))
            }
            ConfinePolicy::Clamp => {
                let clamped = landed
                    .file_name()
                    .map(|name| self.root.join(name))
                    .and_then(|p| resolve_lenient(&p))
                    .filter(|p| self.contains(p))
                    .unwrap_or_else(|| self.root.clone());
                warn!(input = %raw.display(), clamped = %clamped.display(), "path outside root clamped");
                Ok(clamped)
            }
        }
    }

    /// Path as shown to the user: `/` for the root, `/sub/dir` below it.
    pub fn virtual_path(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => "/".to_string(),
            Ok(rel) => format!("/{}", rel.to_string_lossy()),
            Err(_) => path.display().to_string(),
        }
    }
}

/// `None` when an existing component cannot be canonicalized (a dangling or
/// looping symlink); its target cannot be checked, so callers treat it as an
/// escape.
fn resolve_lenient(path: &Path) -> Option<PathBuf> {
    let mut acc = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::Prefix(_) | Component::RootDir => acc.push(comp.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                acc.pop();
            }
            Component::Normal(part) => {
                acc.push(part);
                if fs::symlink_metadata(&acc).is_ok() {
                    acc = dunce::canonicalize(&acc).ok()?;
                }
            }
        }
    }
    Some(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sandbox(policy: ConfinePolicy) -> (tempfile::TempDir, Confiner) {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("sub/deeper")).unwrap();
        fs::write(tmp.path().join("sub/notes.txt"), "n").unwrap();
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink("/", tmp.path().join("escape")).unwrap();
            std::os::unix::fs::symlink("sub", tmp.path().join("inner")).unwrap();
            std::os::unix::fs::symlink(tmp.path().join("gone"), tmp.path().join("dangling")).unwrap();
        }
        let confiner = Confiner::new(tmp.path(), policy).unwrap();
        (tmp, confiner)
    }

    #[test]
    fn relative_paths_join_cwd() {
        let (_tmp, c) = sandbox(ConfinePolicy::Reject);
        let sub = c.root().join("sub");
        assert_eq!(c.resolve(&sub, "notes.txt").unwrap(), sub.join("notes.txt"));
        assert_eq!(c.resolve(&sub, "deeper/../notes.txt").unwrap(), sub.join("notes.txt"));
        assert_eq!(c.resolve(&sub, "").unwrap(), sub);
        assert_eq!(c.resolve(&sub, "..").unwrap(), c.root());
    }

    #[test]
    fn missing_tail_is_kept_lexically() {
        let (_tmp, c) = sandbox(ConfinePolicy::Reject);
        let got = c.resolve(c.root(), "new/dir/./file.txt").unwrap();
        assert_eq!(got, c.root().join("new/dir/file.txt"));
    }

    #[test]
    fn absolute_path_inside_root_is_accepted() {
        let (_tmp, c) = sandbox(ConfinePolicy::Reject);
        let abs = c.root().join("sub/notes.txt");
        assert_eq!(c.resolve(c.root(), abs.to_str().unwrap()).unwrap(), abs);
    }

    #[test]
    fn reject_policy_refuses_escape() {
        let (_tmp, c) = sandbox(ConfinePolicy::Reject);
        let err = c.resolve(c.root(), "../../etc/passwd").unwrap_err();
        assert!(matches!(err, ShellError::PathOutsideRoot(_)));
        assert!(c.resolve(c.root(), "/etc/hosts").is_err());
    }

    #[test]
    fn clamp_policy_maps_back_under_root() {
        let (_tmp, c) = sandbox(ConfinePolicy::Clamp);
        assert_eq!(c.resolve(c.root(), "../../etc/passwd").unwrap(), c.root().join("passwd"));
        assert_eq!(c.resolve(c.root(), "/").unwrap(), c.root());
        assert_eq!(c.resolve(c.root(), "..").unwrap(), c.root());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_followed_before_the_check() {
        let (_tmp, c) = sandbox(ConfinePolicy::Reject);
        assert!(c.resolve(c.root(), "escape/etc").is_err());
        assert_eq!(c.resolve(c.root(), "inner/notes.txt").unwrap(), c.root().join("sub/notes.txt"));
        assert!(c.resolve(c.root(), "dangling").is_err());

        let (_tmp, c) = sandbox(ConfinePolicy::Clamp);
        // `escape` itself lives in root but points at `/`; clamping lands on root.
        assert_eq!(c.resolve(c.root(), "escape").unwrap(), c.root());
    }

    #[cfg(unix)]
    #[test]
    fn entry_resolution_keeps_trailing_link() {
        let (_tmp, c) = sandbox(ConfinePolicy::Reject);
        assert_eq!(c.resolve_entry(c.root(), "escape").unwrap(), c.root().join("escape"));
        assert_eq!(c.resolve_entry(c.root(), "dangling").unwrap(), c.root().join("dangling"));
        assert_eq!(c.resolve_entry(c.root(), "./inner").unwrap(), c.root().join("inner"));
        // links in the middle are still followed
        assert_eq!(c.resolve_entry(c.root(), "inner/notes.txt").unwrap(), c.root().join("sub/notes.txt"));
        assert!(c.resolve_entry(c.root(), "escape/etc").is_err());
        assert!(c.resolve_entry(c.root(), "../outside").is_err());
        assert_eq!(c.resolve_entry(&c.root().join("sub"), "..").unwrap(), c.root());
    }

    #[test]
    fn virtual_path_hides_the_real_root() {
        let (_tmp, c) = sandbox(ConfinePolicy::Clamp);
        assert_eq!(c.virtual_path(c.root()), "/");
        assert_eq!(c.virtual_path(&c.root().join("sub/deeper")), "/sub/deeper");
    }

    fn segment() -> impl Strategy<Value = &'static str> {
        prop::sample::select(vec!["..", ".", "sub", "deeper", "inner", "escape", "missing", "notes.txt"])
    }

    fn dotted_path() -> impl Strategy<Value = String> {
        (any::<bool>(), prop::collection::vec(segment(), 1..8)).prop_map(|(absolute, segs)| {
            let body = segs.join("/");
            if absolute { format!("/{body}") } else { body }
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]
        #[test]
        fn dotdot_never_escapes(input in dotted_path(), from_sub in any::<bool>()) {
            for policy in [ConfinePolicy::Clamp, ConfinePolicy::Reject] {
                let (_tmp, c) = sandbox(policy);
                let cwd = if from_sub { c.root().join("sub") } else { c.root().to_path_buf() };
                match c.resolve(&cwd, &input) {
                    Ok(p) => prop_assert!(p.starts_with(c.root()), "{input} -> {}", p.display()),
                    Err(e) => prop_assert!(policy == ConfinePolicy::Reject && matches!(e, ShellError::PathOutsideRoot(_))),
                }
            }
        }
    }

    #[cfg(feature = "proptests")]
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(2048))]
        #[test]
        fn dotdot_never_escapes_deep(segs in prop::collection::vec(segment(), 1..32)) {
            let (_tmp, c) = sandbox(ConfinePolicy::Clamp);
            let input = segs.join("/");
            let p = c.resolve(&c.root().join("sub/deeper"), &input).unwrap();
            prop_assert!(p.starts_with(c.root()));
        }
    }
}
