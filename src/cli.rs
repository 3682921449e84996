use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub verbose: bool,  // global --verbose
}

#[derive(Parser)]
#[command(name = "rp")]
#[command(about = "Assemble LLM prompts from repository files and layered templates")]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress progress bars and the token breakdown
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Debug logging to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    pub fn context(&self) -> AppContext {
        AppContext {
            quiet: self.quiet,
            no_color: self.no_color,
            verbose: self.verbose,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render a template into a prompt
    Render(RenderArgs),

    /// List the files a query selects
    Select(SelectArgs),

    /// Display the repository tree
    Tree(TreeArgs),

    /// List templates visible across layers
    Templates(TemplatesArgs),

    /// Initialize a roughprompt.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct RenderArgs {
    /// Template address (`name`, `@name`, `<name>`); defaults to "default"
    pub template: Option<String>,

    /// Repository root
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// File query (e.g. `src|.rs;!_test.rs`); overrides front matter
    #[arg(short, long)]
    pub select: Option<String>,

    /// Query filtering the directory tree; overrides front matter
    #[arg(long)]
    pub dirtree: Option<String>,

    /// Extra content: `-` (stdin), `text:...`, `file:...`, `clip:`, `clipboard`, or a path
    #[arg(short, long)]
    pub content: Vec<String>,

    /// Template variant tried first (e.g. `review` picks `x.review.md`)
    #[arg(long)]
    pub mode: Option<String>,

    /// Output file path (stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Copy result to clipboard instead of writing it
    #[arg(long)]
    pub clipboard: bool,

    /// Model or encoding for token counts (e.g. gpt-4o, o200k_base, approx)
    #[arg(long)]
    pub model: Option<String>,

    /// Write per-source metrics as JSON
    #[arg(long, value_name = "PATH")]
    pub metrics_json: Option<PathBuf>,

    /// Skip the token breakdown table
    #[arg(long)]
    pub no_breakdown: bool,
}

#[derive(Debug, Args)]
pub struct SelectArgs {
    /// Query to evaluate
    pub pattern: String,

    /// Repository root
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Use the fzf-style dialect (`'word`, `^prefix`, `suffix$`, `!term`, `|`)
    #[arg(long)]
    pub fzf: bool,

    /// Print selections as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct TreeArgs {
    /// Repository root
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Only show files matching this query
    #[arg(long)]
    pub dirtree: Option<String>,
}

#[derive(Debug, Args)]
pub struct TemplatesArgs {
    /// Repository root
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; required unless --stdout is set
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn render_flags_parse() {
        let cli = Cli::parse_from([
            "rp", "render", "@review", "-s", "src|.rs", "-c", "text:hi", "-c", "-", "--mode", "short", "--quiet",
        ]);
        assert!(cli.context().quiet);
        let Commands::Render(args) = cli.command else {
            panic!("expected render");
        };
        assert_eq!(args.template.as_deref(), Some("@review"));
        assert_eq!(args.select.as_deref(), Some("src|.rs"));
        assert_eq!(args.content, vec!["text:hi", "-"]);
        assert_eq!(args.mode.as_deref(), Some("short"));
    }
}
