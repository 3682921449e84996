//! `rp tree`: print the indexed repository as a tree.

use anyhow::Result;
use tracing::instrument;

use crate::{
    cli::{AppContext, TreeArgs},
    core::{select::Matcher, tree::DirTree},
    infra::{config::load_config, walk::FileWalker},
};

#[instrument(skip_all)]
pub fn run(
    args: TreeArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config = load_config(&args.root)?;
    let index = FileWalker::new(&config.ignore_patterns)?.index(&args.root)?;

    let paths = match args.dirtree.as_deref()
    {
        Some(query) => Matcher::parse(query)?
            .matches(&index.files())
            .sorted(),
        None => index.files(),
    };

    let tree = DirTree::from_paths(index.root_label(), &paths);
    let rendered = if ctx.no_color { tree.render()? } else { tree.render_colored()? };
    print!("{rendered}");
    Ok(())
}
