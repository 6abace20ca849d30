use crate::errors::{ShellError, ShellResult};

/// A command as issued: name, arguments, and an optional output redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub name: String,
    pub args: Vec<String>,
    pub redirect: Option<Redirect>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub target: String,
    pub append: bool,
}

#[derive(Debug)]
struct Word {
    text: String,
    /// Any part was quoted or escaped, so `>` inside it is literal.
    quoted: bool,
}

/// Splits a line into a [`CommandLine`]. Blank lines give `Ok(None)`.
pub fn parse(line: &str) -> ShellResult<Option<CommandLine>> {
    let words = split_words(line)?;
    let mut args = Vec::with_capacity(words.len());
    let mut redirect = None;
    let mut iter = words.into_iter();
    while let Some(word) = iter.next() {
        if word.quoted || !word.text.starts_with('>') {
            args.push(word.text);
            continue;
        }
        let (append, attached) = match word.text.strip_prefix(">>") {
            Some(rest) => (true, rest),
            None => (false, &word.text[1..]),
        };
        let target = if attached.is_empty() {
            iter.next().map(|w| w.text).ok_or_else(|| ShellError::Parse("missing redirect target".into()))?
        } else {
            attached.to_string()
        };
        redirect = Some(Redirect { target, append });
    }
    if args.is_empty() {
        return match redirect {
            Some(_) => Err(ShellError::Parse("missing command before redirect".into())),
            None => Ok(None),
        };
    }
    let name = args.remove(0);
    Ok(Some(CommandLine { name, args, redirect }))
}

fn split_words(line: &str) -> ShellResult<Vec<Word>> {
    let mut words = Vec::new();
    let mut cur = String::new();
    let mut in_word = false;
    let mut quoted = false;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                quoted = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => cur.push(ch),
                        None => return Err(ShellError::Parse("no closing quotation".into())),
                    }
                }
            }
            '"' => {
                in_word = true;
                quoted = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch @ ('"' | '\\')) => cur.push(ch),
                            Some(ch) => {
                                cur.push('\\');
                                cur.push(ch);
                            }
                            None => return Err(ShellError::Parse("no closing quotation".into())),
                        },
                        Some(ch) => cur.push(ch),
                        None => return Err(ShellError::Parse("no closing quotation".into())),
                    }
                }
            }
            '\\' => {
                in_word = true;
                quoted = true;
                match chars.next() {
                    Some(ch) => cur.push(ch),
                    None => return Err(ShellError::Parse("no escaped character".into())),
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(Word { text: std::mem::take(&mut cur), quoted });
                    in_word = false;
                    quoted = false;
                }
            }
            c => {
                in_word = true;
                cur.push(c);
            }
        }
    }
    if in_word {
        words.push(Word { text: cur, quoted });
    }
    Ok(words)
}
