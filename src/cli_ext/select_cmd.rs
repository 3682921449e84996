//! `rp select`: preview which files (and lines) a query picks.

use anyhow::Result;
use itertools::Itertools;
use serde::Serialize;
use tracing::instrument;

use crate::{
    cli::{AppContext, SelectArgs},
    core::select::{FileSelection, FzfQuery, select_files},
    infra::{config::load_config, walk::FileWalker},
};

#[derive(Serialize)]
struct SelectReport<'a>
{
    query: &'a str,
    dialect: &'static str,
    files: Vec<FileSelection>,
}

#[instrument(skip_all, fields(pattern = %args.pattern))]
pub fn run(
    args: SelectArgs,
    _ctx: &AppContext,
) -> Result<()>
{
    let config = load_config(&args.root)?;
    let index = FileWalker::new(&config.ignore_patterns)?.index(&args.root)?;
    let paths = index.files();

    let (dialect, files) = if args.fzf
    {
        let matched = FzfQuery::parse(&args.pattern)?.matches(&paths);
        let files = matched
            .sorted()
            .into_iter()
            .map(FileSelection::whole)
            .collect();
        ("fzf", files)
    }
    else
    {
        ("query", select_files(&args.pattern, &paths)?)
    };

    if args.json
    {
        let report = SelectReport { query: &args.pattern, dialect, files };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for file in &files
    {
        println!("{}", format_selection(file));
    }
    Ok(())
}

/// `path` for whole files, `path#a,b#c,d` for line ranges.
fn format_selection(file: &FileSelection) -> String
{
    std::iter::once(file.path.clone())
        .chain(file.ranges.iter().map(ToString::to_string))
        .join("#")
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::core::ranges::LineRange;

    #[test]
    fn whole_files_print_bare_paths()
    {
        assert_eq!(format_selection(&FileSelection::whole("src/lib.rs")), "src/lib.rs");
    }

    #[test]
    fn ranges_are_appended()
    {
        let sel = FileSelection {
            path: "a.rs".into(),
            ranges: vec![LineRange::new(1, 3).unwrap(), LineRange::new(8, 9).unwrap()],
        };
        assert_eq!(format_selection(&sel), "a.rs#1,3#8,9");
    }
}
