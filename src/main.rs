mod commands;
mod config;
mod confine;
mod dispatch;
mod errors;
mod logging;
mod page;
mod repl;
mod security;
mod server;
mod session;


use crate::config::Config;
use anyhow::Context;
use std::path::PathBuf;
use tracing::info;

const DEFAULT_CONFIG: &str = "burrow.toml";

#[derive(Debug, PartialEq, Eq)]
enum Mode {
    Repl,
    Serve,
}

struct Args {
    config: Option<PathBuf>,
    root: Option<PathBuf>,
    mode: Mode,
}

fn usage() -> ! {
    eprintln!("usage: burrow [--config PATH] [--root DIR] [repl|serve]");
    std::process::exit(2);
}

fn parse_args(args: &[String]) -> Args {
    let mut parsed = Args { config: None, root: None, mode: Mode::Repl };
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                if i >= args.len() { eprintln!("--config requires a path"); usage(); }
                parsed.config = Some(PathBuf::from(&args[i]));
            }
            "--root" => {
                i += 1;
                if i >= args.len() { eprintln!("--root requires a directory"); usage(); }
                parsed.root = Some(PathBuf::from(&args[i]));
            }
            "repl" => parsed.mode = Mode::Repl,
            "serve" => parsed.mode = Mode::Serve,
            "-h" | "--help" => usage(),
            other => {
                eprintln!("unknown argument: {other}");
                usage();
            }
        }
        i += 1;
    }
    parsed
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut cfg = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None if PathBuf::from(DEFAULT_CONFIG).exists() => {
            Config::load(&PathBuf::from(DEFAULT_CONFIG)).context("loading burrow.toml")?
        }
        None => Config::default(),
    };
    if let Some(root) = &args.root {
        cfg.root.root_dir = root.clone();
    }
    cfg.validate().context("validating config")?;
    Ok(cfg)
}

fn main() -> anyhow::Result<()> {
    let argv: Vec<String> = std::env::args().collect();
    let args = parse_args(&argv);
    match args.mode {
        Mode::Repl => logging::init("warn", false),
        Mode::Serve => logging::init("info", true),
    }

    let cfg = load_config(&args)?;
    let root = config::canonical_root(&cfg.root.root_dir).context("resolving project root")?;

    match args.mode {
        Mode::Repl => {
            let session = session::Session::from_config(&cfg, &root, Box::new(session::StdinPrompter))?;
            let mut repl = repl::Repl::new(session, cfg.history_path(&root))?;
            repl.run()
        }
        Mode::Serve => {
            let addr = format!("{}:{}", cfg.server.bind_addr, cfg.server.port);
            let commands = dispatch::Dispatcher::new().registry().list_names();
            info!(addr = %addr, root = %root.display(), policy = ?cfg.shell.confine, commands = ?commands, "burrow ready");
            println!("burrow ready addr={} root={} commands=[{}]", addr, root.display(), commands.join(","));
            let rt = tokio::runtime::Runtime::new().context("starting runtime")?;
            rt.block_on(server::serve(cfg, root))
        }
    }
}
