use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use kestrel::config::Config;
use kestrel::repl::Repl;
use kestrel::{Runtime, logging};

/// Coding agent that drives shell, file, todo, skill and sub-agent tools.
#[derive(Parser, Debug)]
#[command(name = "kestrel", version, about)]
struct Cli {
    /// Config file (default: ./kestrel.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write debug logs to ~/.kestrel/kestrel.log
    #[arg(long)]
    log: bool,

    /// Print full tool results instead of previews
    #[arg(short, long)]
    verbose: bool,

    /// Working directory the agent operates in
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Directory holding one subdirectory per skill
    #[arg(long)]
    skills_dir: Option<PathBuf>,

    /// Run a single turn with this input and exit
    #[arg(short, long)]
    prompt: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenv::dotenv().ok();

    if let Some(path) = logging::init(cli.log).context("failed to set up logging")? {
        eprintln!("Logging to {}", path.display());
    }

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_env();
    if let Some(workdir) = cli.workdir {
        config.workspace.workdir = Some(workdir);
    }
    if let Some(skills_dir) = cli.skills_dir {
        config.workspace.skills_dir = Some(skills_dir);
    }
    config.observe.verbose |= cli.verbose;

    let cwd = std::env::current_dir().context("cannot determine current directory")?;
    let mut runtime = Runtime::from_config(&config, &cwd)?;

    match cli.prompt {
        Some(prompt) => {
            let reply = runtime.send(&prompt).await?;
            println!("{}", reply);
        }
        None => Repl::new().run(&mut runtime).await?,
    }
    Ok(())
}
