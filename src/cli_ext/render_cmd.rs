//! `rp render`: assemble a prompt and deliver it.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use tracing::{info, instrument};

use crate::{
    cli::{AppContext, RenderArgs},
    core::pipeline::{Pipeline, PromptOutput, RenderRequest, breakdown_table},
    infra::{
        config::load_config,
        io::{copy_to_clipboard, write_output},
    },
};

#[instrument(skip_all, fields(template = args.template.as_deref().unwrap_or("default")))]
pub fn run(
    args: RenderArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config = load_config(&args.root)?;
    let output_path = args
        .output
        .clone()
        .or_else(|| config.output.clone());

    let pipeline = Pipeline::new(config);
    let request = request_from(&args, ctx);
    let out = pipeline.run(&request)?;
    info!(template = %out.template, files = out.selections.len(), "prompt rendered");

    deliver(&args, ctx, &out, output_path.as_deref())?;

    if let Some(path) = &args.metrics_json
    {
        fs::write(path, out.metrics.to_json()?)
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    }

    if !ctx.quiet && !args.no_breakdown
    {
        eprintln!("{}", breakdown_table(&out.metrics)?);
    }
    Ok(())
}

fn request_from(
    args: &RenderArgs,
    ctx: &AppContext,
) -> RenderRequest
{
    RenderRequest {
        root: args.root.clone(),
        template: args.template.clone(),
        select: args.select.clone(),
        dirtree: args.dirtree.clone(),
        content: args.content.clone(),
        mode: args.mode.clone(),
        model: args.model.clone(),
        quiet: ctx.quiet,
    }
}

fn deliver(
    args: &RenderArgs,
    ctx: &AppContext,
    out: &PromptOutput,
    output_path: Option<&Path>,
) -> Result<()>
{
    if args.clipboard
    {
        copy_to_clipboard(&out.text)?;
        if !ctx.quiet
        {
            let msg = format!("Copied {} bytes to clipboard", out.text.len());
            if ctx.no_color
            {
                eprintln!("{msg}");
            }
            else
            {
                eprintln!("{}", msg.green());
            }
        }
        return Ok(());
    }

    write_output(output_path, &out.text)?;
    if let Some(path) = output_path
        && !ctx.quiet
    {
        eprintln!("Wrote {}", path.display());
    }
    Ok(())
}
