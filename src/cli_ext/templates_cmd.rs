//! `rp templates`: list every template the resolver can see.

use anyhow::Result;
use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};
use tracing::instrument;

use crate::{
    cli::{AppContext, TemplatesArgs},
    core::{pipeline::Pipeline, template::resolve::TemplateListing},
    infra::config::load_config,
};

#[derive(Tabled)]
struct TemplateRow
{
    #[tabled(rename = "Template")]
    path: String,
    #[tabled(rename = "Layer")]
    layer: String,
    #[tabled(rename = "Status")]
    status: String,
}

#[instrument(skip_all)]
pub fn run(
    args: TemplatesArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config = load_config(&args.root)?;
    let root = dunce::canonicalize(&args.root).unwrap_or_else(|_| args.root.clone());
    let listings = Pipeline::new(config)
        .resolver(&root, None)
        .list();

    let rows: Vec<TemplateRow> = listings
        .into_iter()
        .map(|l| row(l, ctx.no_color))
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));
    Ok(())
}

fn row(
    listing: TemplateListing,
    no_color: bool,
) -> TemplateRow
{
    let status = match (listing.shadowed, no_color)
    {
        (false, _) => "active".to_string(),
        (true, true) => "shadowed".to_string(),
        (true, false) => "shadowed".dimmed().to_string(),
    };
    TemplateRow { path: listing.path, layer: listing.layer, status }
}
