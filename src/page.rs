//! Server-rendered HTML for the web front-end. No scripts: every action is a
//! plain form POST followed by a redirect back to `/`.

use std::fmt::Write;
use std::fs;
use std::path::Path;

/// One transcript block: the command typed (none for the banner) and what
/// it printed.
#[derive(Debug, Clone)]
pub struct Entry {
    pub command: Option<String>,
    pub output: String,
}

pub struct PageView<'a> {
    pub transcript: &'a [Entry],
    pub history: &'a [String],
    pub cwd: &'a str,
    pub browser: Vec<BrowserItem>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum BrowserItem {
    File(String),
    Dir { name: String, children: Vec<String> },
    Error(String),
}

const QUICK_ACTIONS: &[&str] = &["pwd", "ls", "sysmon", "df"];
const BROWSER_CHILDREN: usize = 8;

/// First level of `root` plus a peek into each directory. Hidden entries are
/// skipped at the first level.
pub fn browse(root: &Path) -> Vec<BrowserItem> {
    let mut names = match fs::read_dir(root) {
        Ok(rd) => rd.filter_map(|e| e.ok()).map(|e| e.file_name().to_string_lossy().into_owned()).collect::<Vec<_>>(),
        Err(e) => return vec![BrowserItem::Error(format!("browser error: {e}"))],
    };
    names.sort();
    names
        .into_iter()
        .filter(|n| !n.starts_with('.'))
        .map(|name| {
            let path = root.join(&name);
            if !path.is_dir() {
                return BrowserItem::File(name);
            }
            let mut children: Vec<String> = fs::read_dir(&path)
                .map(|rd| {
                    rd.filter_map(|e| e.ok())
                        .map(|e| {
                            let child = e.file_name().to_string_lossy().into_owned();
                            if e.path().is_dir() { format!("{child}/") } else { child }
                        })
                        .collect()
                })
                .unwrap_or_default();
            children.sort();
            children.truncate(BROWSER_CHILDREN);
            BrowserItem::Dir { name, children }
        })
        .collect()
}

pub fn render(view: &PageView<'_>) -> String {
    let mut html = String::with_capacity(4096);
    html.push_str(HEAD);
    html.push_str("<main><section class=\"term\"><h2>Burrow Terminal</h2><div class=\"out\">");
    for entry in view.transcript {
        if let Some(cmd) = &entry.command {
            let _ = write!(html, "<div class=\"cmd\">$ {}</div>", escape(cmd));
        }
        if !entry.output.is_empty() {
            let _ = write!(html, "<pre>{}</pre>", escape(entry.output.trim_end_matches('\n')));
        }
    }
    html.push_str("</div>");
    html.push_str(
        "<form method=\"post\" action=\"/run\" class=\"run\">\
         <input name=\"command\" autofocus autocomplete=\"off\" \
         placeholder=\"e.g., ls, pwd, mkdir demo, cd demo, touch a.txt\">\
         <button type=\"submit\">Run</button></form></section>",
    );

    html.push_str("<aside><h3>Quick Actions</h3><div class=\"quick\">");
    for action in QUICK_ACTIONS {
        let _ = write!(
            html,
            "<form method=\"post\" action=\"/run\"><input type=\"hidden\" name=\"command\" value=\"{a}\">\
             <button type=\"submit\">{a}</button></form>",
            a = escape(action)
        );
    }
    html.push_str("</div><h3>Project Browser</h3><ul class=\"tree\">");
    for item in &view.browser {
        match item {
            BrowserItem::File(name) => {
                let _ = write!(html, "<li>{}</li>", escape(name));
            }
            BrowserItem::Dir { name, children } => {
                let _ = write!(html, "<li><b>{}/</b><ul>", escape(name));
                for c in children {
                    let _ = write!(html, "<li>{}</li>", escape(c));
                }
                html.push_str("</ul></li>");
            }
            BrowserItem::Error(msg) => {
                let _ = write!(html, "<li class=\"err\">{}</li>", escape(msg));
            }
        }
    }
    html.push_str("</ul><h3>History</h3><ol class=\"hist\">");
    for line in view.history {
        let _ = write!(html, "<li>{}</li>", escape(line));
    }
    let _ = write!(
        html,
        "</ol><form method=\"post\" action=\"/clear\"><button type=\"submit\">Clear Output</button></form>\
         <p class=\"cwd\">cwd: {}</p></aside></main></body></html>",
        escape(view.cwd)
    );
    html
}

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

const HEAD: &str = r#"<!doctype html><html><head><meta charset="utf-8"><title>Burrow Terminal</title>
<style>
body{font-family:system-ui,sans-serif;margin:0;background:#f4f4f2}
main{display:flex;gap:1.5rem;padding:1.5rem}
.term{flex:2;min-width:0}
aside{flex:1}
.out{background:#111;color:#ddd;border-radius:6px;padding:.75rem;max-height:65vh;overflow:auto}
.out pre{margin:.25rem 0 .75rem;white-space:pre-wrap}
.cmd{color:#8fd18f;font-family:monospace}
.run{display:flex;gap:.5rem;margin-top:.75rem}
.run input{flex:1;font-family:monospace;padding:.4rem}
.quick{display:grid;grid-template-columns:1fr 1fr;gap:.4rem}
.quick button{width:100%}
.tree,.hist{font-family:monospace;font-size:.9rem}
.err{color:#a00}
.cwd{color:#666}
</style></head><body>"#;
