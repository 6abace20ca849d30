pub mod fs;
pub mod meta;
pub mod system;
pub mod text;
pub mod transfer;

use std::path::Path;

use crate::errors::{ShellError, ShellResult};

/// Splits `-x`-style switches from operands. Combined short flags (`-rf`)
/// are expanded; anything unknown is reported as a usage error.
pub(crate) fn split_flags<'a>(
    args: &'a [String],
    known: &[char],
    usage: &'static str,
) -> ShellResult<(Vec<char>, Vec<&'a str>)> {
    let mut flags = Vec::new();
    let mut operands = Vec::new();
    for a in args {
        match a.strip_prefix('-') {
            Some(rest) if !rest.is_empty() => {
                for c in rest.chars() {
                    if !known.contains(&c) {
                        return Err(ShellError::Usage(usage));
                    }
                    flags.push(c);
                }
            }
            _ => operands.push(a.as_str()),
        }
    }
    Ok((flags, operands))
}

/// `-n N` for head/tail. Returns the count and the remaining operands.
pub(crate) fn line_count<'a>(args: &'a [String], usage: &'static str) -> ShellResult<(i64, Vec<&'a str>)> {
    let mut n = 10;
    let mut files = Vec::new();
    let mut iter = args.iter();
    while let Some(a) = iter.next() {
        if a == "-n" {
            n = iter.next().and_then(|v| v.parse::<i64>().ok()).ok_or(ShellError::InvalidCount)?;
        } else {
            files.push(a.as_str());
        }
    }
    if files.is_empty() {
        return Err(ShellError::Usage(usage));
    }
    Ok((n, files))
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "/".to_string())
}
