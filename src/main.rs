use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use roughprompt::cli::{AppContext, Cli, Commands};
use roughprompt::core::select::SelectError;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Build a context once, pass everywhere
    let ctx = cli.context();
    init_tracing(&ctx);

    match dispatch(cli.command, &ctx) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(err);
            ExitCode::FAILURE
        }
    }
}

fn dispatch(command: Commands, ctx: &AppContext) -> Result<()> {
    match command {
        Commands::Render(args) => roughprompt::cli_ext::render_cmd::run(args, ctx),
        Commands::Select(args) => roughprompt::cli_ext::select_cmd::run(args, ctx),
        Commands::Tree(args) => roughprompt::cli_ext::tree_cmd::run(args, ctx),
        Commands::Templates(args) => roughprompt::cli_ext::templates_cmd::run(args, ctx),
        Commands::Init(args) => roughprompt::infra::config::init(args, ctx),
        Commands::Completions(args) => roughprompt::completion::run(args, ctx),
    }
}

/// Logs go to stderr so rendered prompts on stdout stay clean.
fn init_tracing(ctx: &AppContext) {
    let default = if ctx.verbose { "roughprompt=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_target(false)
        .with_ansi(!ctx.no_color)
        .with_writer(std::io::stderr)
        .init();
}

/// Query errors get a miette report with a help line; everything else prints its chain.
fn report(err: anyhow::Error) {
    match err.downcast::<SelectError>() {
        Ok(select) => eprintln!("{:?}", miette::Report::new(select)),
        Err(err) => eprintln!("Error: {err:#}"),
    }
}
