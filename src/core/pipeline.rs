//! Prompt assembly: index the repository, select files, render the template,
//! and account for every byte that went in.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use minijinja::value::Value;
use rayon::prelude::*;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tracing::{debug, info, instrument, warn};

use crate::core::content::{self, LoaderRegistry};
use crate::core::metrics::{MetricItem, MetricKind, MetricsCollector, counter_for};
use crate::core::ranges::{LineRange, read_ranges};
use crate::core::select::{FileSelection, Matcher};
use crate::core::template::{Renderer, Resolver, Template, TemplateData};
use crate::core::tree::DirTree;
use crate::infra::config::Config;
use crate::infra::io::read_text;
use crate::infra::walk::{DirectoryIndex, FileWalker};

pub const DEFAULT_TEMPLATE: &str = "default";

/// What to render and with which overrides. `None` falls back to front
/// matter, then config.
#[derive(Debug, Clone, Default)]
pub struct RenderRequest {
    pub root: PathBuf,
    pub template: Option<String>,
    pub select: Option<String>,
    pub dirtree: Option<String>,
    pub content: Vec<String>,
    pub mode: Option<String>,
    pub model: Option<String>,
    pub quiet: bool,
}

/// One selected file as templates see it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileEntry {
    pub path: String,
    pub ranges: Vec<LineRange>,
    pub content: String,
}

pub struct PromptOutput {
    pub text: String,
    pub template: String,
    pub selections: Vec<FileSelection>,
    pub metrics: Arc<MetricsCollector>,
}

pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self, root: &Path) -> Result<DirectoryIndex> {
        FileWalker::new(&self.config.ignore_patterns)?.index(root)
    }

    pub fn resolver(&self, root: &Path, mode: Option<String>) -> Resolver {
        Resolver::standard(root, &self.config.template_dirs).with_mode(mode)
    }

    #[instrument(skip_all, fields(root = %req.root.display()))]
    pub fn run(&self, req: &RenderRequest) -> Result<PromptOutput> {
        let index = self.index(&req.root)?;
        let model = req.model.as_deref().unwrap_or(&self.config.model);
        let metrics = Arc::new(MetricsCollector::new(counter_for(model)?)?);

        let address = req.template.as_deref().unwrap_or(DEFAULT_TEMPLATE);
        let base_mode = req.mode.clone().or_else(|| self.config.mode.clone());

        // Peek at the front matter first: its mode applies only when the command line gave none
        let peek = self
            .resolver(index.root(), base_mode.clone())
            .load(address, None)
            .with_context(|| format!("Failed to load template `{address}`"))?;
        let mode = match (&req.mode, peek.front_matter.mode.clone()) {
            (None, Some(fm_mode)) => {
                debug!(mode = %fm_mode, "using front-matter mode");
                Some(fm_mode)
            }
            _ => base_mode,
        };

        let renderer = self.renderer(index.root(), mode, &metrics);
        let template = renderer.load(address, None)?;

        let query = req.select.clone().or_else(|| template.front_matter.select.clone());
        let selections = match query.as_deref() {
            Some(q) => Matcher::parse(q)?.select(&index.files()),
            None => Vec::new(),
        };
        info!(selected = selections.len(), "files selected");

        let files = Arc::new(read_selected(&index, &selections, req.quiet)?);
        for file in files.iter() {
            metrics.add(MetricKind::File, file.path.clone(), file.content.clone())?;
        }

        let inputs = LoaderRegistry::default().load_each(&req.content)?;
        for input in &inputs {
            metrics.add(MetricKind::User, input.spec.clone(), input.text.clone())?;
        }

        let dirtree = req.dirtree.clone().or_else(|| template.front_matter.dirtree.clone());
        let data = self.template_data(&index, files, content::join(&inputs), dirtree)?;

        let text = renderer.render(&template, &data)?;
        metrics.add(MetricKind::Final, "prompt", text.clone())?;
        metrics.wait()?;

        Ok(PromptOutput {
            text,
            template: template.path().to_string(),
            selections,
            metrics,
        })
    }

    fn renderer(&self, root: &Path, mode: Option<String>, metrics: &Arc<MetricsCollector>) -> Renderer {
        let sink = Arc::clone(metrics);
        Renderer::new(Arc::new(self.resolver(root, mode)))
            .with_max_depth(self.config.max_layout_depth)
            .with_observer(move |t: &Template| {
                if let Err(err) = sink.add(MetricKind::Template, t.path(), t.body.clone()) {
                    warn!(%err, template = t.path(), "template not counted");
                }
            })
    }

    fn template_data(
        &self,
        index: &DirectoryIndex,
        files: Arc<Vec<FileEntry>>,
        input: String,
        dirtree: Option<String>,
    ) -> Result<TemplateData> {
        let mut data = TemplateData::new();

        let listed = Arc::clone(&files);
        data.insert_lazy("Files", move || Ok(Value::from_serialize(listed.as_slice())));
        data.insert_lazy("FileMap", move || Ok(Value::from(file_map(&files))));

        // Parse eagerly so a bad query fails the command rather than the template
        let tree_paths = match dirtree.as_deref() {
            Some(q) => Matcher::parse(q)?.matches(&index.files()).sorted(),
            None => index.files(),
        };
        let label = index.root_label();
        data.insert_lazy("Tree", move || {
            Ok(Value::from(DirTree::from_paths(label.clone(), tree_paths.as_slice()).render()?))
        });

        data.insert("Input", input);

        let notes = self.config.notes_file.as_ref().map(|p| index.root().join(p));
        data.insert_lazy("Notes", move || match &notes {
            Some(path) if path.is_file() => {
                let text = read_text(path).with_context(|| format!("Failed to read notes {}", path.display()))?;
                Ok(Value::from(text))
            }
            _ => Ok(Value::from("")),
        });

        Ok(data)
    }
}

/// Read selections in parallel, preserving their order.
fn read_selected(index: &DirectoryIndex, selections: &[FileSelection], quiet: bool) -> Result<Vec<FileEntry>> {
    let progress = if quiet || selections.len() < 2 {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(selections.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    };

    let entries = selections
        .par_iter()
        .map(|sel| -> Result<FileEntry> {
            let abs = index.absolute(&sel.path);
            let content = if sel.is_whole() {
                read_text(&abs).with_context(|| format!("Failed to read {}", sel.path))?
            } else {
                read_ranges(&abs, &sel.path, &sel.ranges)?
            };
            progress.inc(1);
            Ok(FileEntry {
                path: sel.path.clone(),
                ranges: sel.ranges.clone(),
                content,
            })
        })
        .collect::<Result<Vec<_>>>();

    progress.finish_and_clear();
    entries
}

/// Each file under a `` `path` `` heading in a fenced block.
pub fn file_map(files: &[FileEntry]) -> String {
    let mut out = String::new();
    for file in files {
        let fence = fence_for(&file.content);
        let lang = Path::new(&file.path)
            .extension()
            .map(|ext| ext.to_string_lossy())
            .unwrap_or_default();
        out.push_str(&format!("`{}`\n{fence}{lang}\n", file.path));
        out.push_str(&file.content);
        if !file.content.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&format!("{fence}\n\n"));
    }
    out
}

/// A backtick fence longer than any run inside `content`.
fn fence_for(content: &str) -> String {
    let longest = content
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}

#[derive(Tabled)]
struct BreakdownRow {
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Source")]
    key: String,
    #[tabled(rename = "Tokens")]
    tokens: usize,
    #[tabled(rename = "Bytes")]
    bytes: usize,
    #[tabled(rename = "Lines")]
    lines: usize,
}

impl BreakdownRow {
    fn new(kind: impl Into<String>, key: impl Into<String>, item: MetricItem) -> Self {
        Self {
            kind: kind.into(),
            key: key.into(),
            tokens: item.tokens,
            bytes: item.bytes,
            lines: item.lines,
        }
    }
}

/// Per-source token table with totals.
pub fn breakdown_table(metrics: &MetricsCollector) -> Result<String> {
    let mut rows: Vec<BreakdownRow> = metrics
        .entries()?
        .into_iter()
        .filter(|(k, _)| k.kind != MetricKind::Final)
        .map(|(k, v)| BreakdownRow::new(k.kind.as_str(), k.key, v))
        .collect();

    for kind in [MetricKind::File, MetricKind::Template, MetricKind::User] {
        let sum = metrics.sum_by(kind)?;
        if sum != MetricItem::default() {
            rows.push(BreakdownRow::new("subtotal", kind.as_str(), sum));
        }
    }
    rows.push(BreakdownRow::new("total", "inputs", metrics.total()?));
    if let Some(item) = metrics.get(MetricKind::Final, "prompt")? {
        rows.push(BreakdownRow::new("final", "prompt", item));
    }

    Ok(Table::new(rows).with(Style::rounded()).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;
    use assert_fs::prelude::*;

    fn config() -> Config {
        Config {
            model: "approx".to_string(),
            ..Config::default()
        }
    }

    fn repo() -> Result<TempDir> {
        let tmp = TempDir::new()?;
        tmp.child("src/main.rs").write_str("fn main() {}\n")?;
        tmp.child("src/lib.rs").write_str("pub mod a;\npub mod b;\npub mod c;\n")?;
        tmp.child("src/lib_test.rs").write_str("#[test]\nfn t() {}\n")?;
        tmp.child("README.md").write_str("# demo\n")?;
        Ok(tmp)
    }

    #[test]
    fn renders_selected_files_through_a_repo_template() -> Result<()> {
        let tmp = repo()?;
        tmp.child("prompt.md").write_str(
            "---\nselect = \"src|.rs|!_test.rs\"\n---\n{% for f in Files %}[{{ f.Path }}]{% endfor %}",
        )?;

        let req = RenderRequest {
            root: tmp.path().to_path_buf(),
            template: Some("@prompt".to_string()),
            quiet: true,
            ..RenderRequest::default()
        };
        let out = Pipeline::new(config()).run(&req)?;

        assert_eq!(out.text, "[src/lib.rs][src/main.rs]");
        assert!(out.metrics.get(MetricKind::File, "src/main.rs")?.is_some());
        assert!(out.metrics.get(MetricKind::Template, "prompt.md")?.is_some());
        assert_eq!(out.metrics.get(MetricKind::Final, "prompt")?.map(|m| m.bytes), Some(out.text.len()));
        Ok(())
    }

    #[test]
    fn cli_select_wins_and_ranges_are_marked() -> Result<()> {
        let tmp = repo()?;
        tmp.child("p.md").write_str("---\nselect = \"README\"\n---\n{{ FileMap }}")?;

        let req = RenderRequest {
            root: tmp.path().to_path_buf(),
            template: Some("p".to_string()),
            select: Some("=src/lib.rs#2,3".to_string()),
            quiet: true,
            ..RenderRequest::default()
        };
        let out = Pipeline::new(config()).run(&req)?;
        assert_eq!(out.text, "`src/lib.rs`\n```rs\n--- src/lib.rs#2,3 ---\npub mod b;\npub mod c;\n```\n\n");
        Ok(())
    }

    #[test]
    fn front_matter_mode_selects_variants() -> Result<()> {
        let tmp = repo()?;
        tmp.child("p.md").write_str("---\nmode = \"short\"\n---\n{{ partial('part') }}")?;
        tmp.child("part.md").write_str("long")?;
        tmp.child("part.short.md").write_str("short")?;

        let mut req = RenderRequest {
            root: tmp.path().to_path_buf(),
            template: Some("p".to_string()),
            quiet: true,
            ..RenderRequest::default()
        };
        assert_eq!(Pipeline::new(config()).run(&req)?.text, "short");

        req.mode = Some("other".to_string());
        assert_eq!(Pipeline::new(config()).run(&req)?.text, "long");
        Ok(())
    }

    #[test]
    fn tree_input_and_notes_accessors() -> Result<()> {
        let tmp = repo()?;
        tmp.child(".roughprompt/notes.md").write_str("remember this")?;
        tmp.child("t.md").write_str("{{ Input }}|{{ Notes }}|{{ Tree }}")?;

        let req = RenderRequest {
            root: tmp.path().to_path_buf(),
            template: Some("t".to_string()),
            dirtree: Some("README".to_string()),
            content: vec!["text:first".to_string(), "text:second".to_string()],
            quiet: true,
            ..RenderRequest::default()
        };
        let out = Pipeline::new(config()).run(&req)?;
        let (head, tree) = out.text.split_once("remember this|").unwrap_or_default();
        assert_eq!(head, "first\n\nsecond|");
        assert!(tree.contains("README.md"));
        assert!(!tree.contains("main.rs"));
        assert!(out.metrics.get(MetricKind::User, "text:first")?.is_some());
        Ok(())
    }

    #[test]
    fn builtin_default_template_renders() -> Result<()> {
        let tmp = repo()?;
        let req = RenderRequest {
            root: tmp.path().to_path_buf(),
            select: Some("main.rs".to_string()),
            content: vec!["text:Explain this program.".to_string()],
            quiet: true,
            ..RenderRequest::default()
        };
        let out = Pipeline::new(config()).run(&req)?;
        assert_eq!(out.template, "default.md");
        assert!(out.text.starts_with("Explain this program.\n\n"));
        assert!(out.text.contains("## Directory structure"));
        assert!(out.text.contains("`src/main.rs`\n```rs\nfn main() {}\n```"));

        let table = breakdown_table(&out.metrics)?;
        assert!(table.contains("src/main.rs"));
        assert!(table.contains("layouts/prompt.md"));
        Ok(())
    }

    #[test]
    fn bad_query_fails_the_run() -> Result<()> {
        let tmp = repo()?;
        let req = RenderRequest {
            root: tmp.path().to_path_buf(),
            select: Some("/(".to_string()),
            quiet: true,
            ..RenderRequest::default()
        };
        let err = Pipeline::new(config()).run(&req).err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("regex"), "{err}");
        Ok(())
    }

    #[test]
    fn fence_language_comes_from_the_file_name() {
        let entry = |path: &str| FileEntry {
            path: path.to_string(),
            ranges: Vec::new(),
            content: "x\n".to_string(),
        };
        assert_eq!(file_map(&[entry("v1.2/Makefile")]), "`v1.2/Makefile`\n```\nx\n```\n\n");
        assert_eq!(file_map(&[entry("v1.2/main.go")]), "`v1.2/main.go`\n```go\nx\n```\n\n");
    }

    #[test]
    fn fences_outgrow_content_backticks() {
        assert_eq!(fence_for("plain"), "```");
        assert_eq!(fence_for("has ```` inside"), "`````");
    }
}
