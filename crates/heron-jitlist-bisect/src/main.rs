use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use clap::Parser;
use heron_jit_exec::config::{ENV_DEBUG, ENV_ENABLE, ENV_LIST_FILE};
use heron_jit_exec::{AllowList, bisect};
use tracing_subscriber::filter::EnvFilter;

mod harvest;

/// Find the smallest set of jitted functions that makes a command fail.
#[derive(Parser)]
#[command(name = "heron-jitlist-bisect", version)]
struct Cli {
    /// Start from this jit-list instead of harvesting one from a debug run
    #[arg(long)]
    initial_list: Option<PathBuf>,

    /// Where the minimized jit-list is written
    #[arg(long, default_value = "jitlist-bisected.txt")]
    output: PathBuf,

    /// Directory for the scratch jit-list handed to each trial run
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Command to run, e.g. `-- heron script.hn`
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let candidates = match &cli.initial_list {
        Some(path) => AllowList::from_file(path)?.sorted_names(),
        None => harvest_compiled(&cli.command)?,
    };
    tracing::info!(target: "heron::bisect", candidates = candidates.len(), "starting bisection");

    let workdir = match &cli.workdir {
        Some(dir) => dir.clone(),
        None => std::env::temp_dir(),
    };
    let scratch = workdir.join(format!("heron-jitlist-{}.txt", std::process::id()));

    let result = bisect(candidates, |list| run_with_list(&cli.command, &scratch, list));
    let _ = std::fs::remove_file(&scratch);
    let minimal = result?;

    write_list(&cli.output, &minimal)
        .with_context(|| format!("failed to write {}", cli.output.display()))?;
    for name in &minimal {
        println!("{name}");
    }
    tracing::info!(
        target: "heron::bisect",
        functions = minimal.len(),
        output = %cli.output.display(),
        "wrote minimized jit-list"
    );
    Ok(())
}

/// Run the command once with compile tracing on and collect what it compiled.
fn harvest_compiled(command: &[String]) -> Result<Vec<String>> {
    let output = command_for(command)
        .env(ENV_ENABLE, "1")
        .env(ENV_DEBUG, "1")
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("failed to run {}", command[0]))?;
    if output.status.success() {
        bail!("command succeeded during jit-list generation");
    }

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    let names = harvest::compiled_names(&text);
    if names.is_empty() {
        bail!("no compiled functions found in the output of {}", command[0]);
    }
    Ok(names)
}

/// Does the command succeed when only `list` may be compiled?
fn run_with_list(command: &[String], scratch: &Path, list: &[String]) -> std::io::Result<bool> {
    write_list(scratch, list)?;
    let status = command_for(command)
        .env(ENV_LIST_FILE, scratch)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    tracing::debug!(target: "heron::bisect", functions = list.len(), success = status.success(), "trial run");
    Ok(status.success())
}

fn command_for(command: &[String]) -> Command {
    let mut cmd = Command::new(&command[0]);
    cmd.args(&command[1..]);
    cmd
}

fn write_list(path: &Path, names: &[String]) -> std::io::Result<()> {
    let mut contents = names.join("\n");
    if !contents.is_empty() {
        contents.push('\n');
    }
    std::fs::write(path, contents)
}
