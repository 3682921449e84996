//! `rp completions`: shell completion scripts for every `rp` subcommand.
//!
//! `--stdout` prints the script for piping into a shell profile; otherwise
//! it lands in `--out-dir` under the name clap_complete picks for the shell
//! (`rp.bash`, `_rp`, `rp.fish`, ...).

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::{Shell as CompletionShell, generate, generate_to};
use std::{fs, io::Write};

use crate::cli::{AppContext, Cli, CompletionsArgs, Shell};

pub const BIN_NAME: &str = "rp";

impl From<Shell> for CompletionShell {
    fn from(shell: Shell) -> Self {
        match shell {
            Shell::Bash => CompletionShell::Bash,
            Shell::Zsh => CompletionShell::Zsh,
            Shell::Fish => CompletionShell::Fish,
            Shell::PowerShell => CompletionShell::PowerShell,
            Shell::Elvish => CompletionShell::Elvish,
        }
    }
}

/// Completion script for `shell` as bytes.
pub fn script(shell: Shell) -> Vec<u8> {
    let mut buf = Vec::new();
    generate(CompletionShell::from(shell), &mut Cli::command(), BIN_NAME, &mut buf);
    buf
}

pub fn run(args: CompletionsArgs, ctx: &AppContext) -> Result<()> {
    if args.stdout {
        let mut out = std::io::stdout().lock();
        out.write_all(&script(args.shell))
            .and_then(|_| out.flush())
            .context("write completion script")?;
        return Ok(());
    }

    let dir = args
        .out_dir
        .context("--out-dir is required unless --stdout is set")?;

    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    let path = generate_to(CompletionShell::from(args.shell), &mut Cli::command(), BIN_NAME, &dir)
        .context("generate completion file")?;

    if !ctx.quiet {
        eprintln!("Wrote {BIN_NAME} completion to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn bash_script_knows_subcommands() {
        let text = String::from_utf8_lossy(&script(Shell::Bash)).into_owned();
        for sub in ["render", "select", "templates", "completions"] {
            assert!(text.contains(sub), "missing {sub}");
        }
    }

    #[test]
    fn out_dir_is_created_and_filled() -> Result<()> {
        let tmp = TempDir::new()?;
        let dir = tmp.path().join("completions");
        let args = CompletionsArgs { shell: Shell::Fish, out_dir: Some(dir.clone()), stdout: false };
        run(args, &AppContext { quiet: true, no_color: true, verbose: false })?;
        assert!(dir.join("rp.fish").is_file());
        Ok(())
    }

    #[test]
    fn out_dir_required_without_stdout() {
        let args = CompletionsArgs { shell: Shell::Zsh, out_dir: None, stdout: false };
        assert!(run(args, &AppContext { quiet: true, no_color: true, verbose: false }).is_err());
    }
}
