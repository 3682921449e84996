//! Directory-tree diagram over a flat list of `/`-separated paths.
//! Directories are inferred from path segments and printed with a trailing
//! `/`; siblings sort directories first, then by name.

use std::collections::BTreeMap;

use anyhow::Result;
use owo_colors::OwoColorize;
use ptree::{PrintConfig, TreeBuilder};

#[derive(Debug, Default)]
struct TreeNode {
    children: BTreeMap<String, TreeNode>,
}

impl TreeNode {
    fn insert(&mut self, path: &str) {
        let mut node = self;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            node = node.children.entry(segment.to_string()).or_default();
        }
    }
}

/// Tree of selected paths under a root label.
#[derive(Debug)]
pub struct DirTree {
    label: String,
    root: TreeNode,
}

impl DirTree {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            root: TreeNode::default(),
        }
    }

    pub fn from_paths<S: AsRef<str>>(label: impl Into<String>, paths: &[S]) -> Self {
        let mut tree = Self::new(label);
        for path in paths {
            tree.insert(path.as_ref());
        }
        tree
    }

    pub fn insert(&mut self, path: &str) {
        self.root.insert(path);
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Plain text, suitable for embedding in a prompt.
    pub fn render(&self) -> Result<String> {
        self.write(false)
    }

    /// Colored by extension for terminal display.
    pub fn render_colored(&self) -> Result<String> {
        self.write(true)
    }

    fn write(&self, colored: bool) -> Result<String> {
        let mut builder = TreeBuilder::new(format!("{}/", self.label));
        add_children(&mut builder, &self.root.children, colored);

        let mut out = Vec::new();
        ptree::write_tree_with(&builder.build(), &mut out, &PrintConfig::default())?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

fn add_children(builder: &mut TreeBuilder, children: &BTreeMap<String, TreeNode>, colored: bool) {
    // Directories first, each group already sorted by the map
    let (dirs, files): (Vec<_>, Vec<_>) = children.iter().partition(|(_, n)| !n.children.is_empty());

    for (name, node) in dirs {
        let label = if colored {
            format!("{}/", name.blue())
        } else {
            format!("{name}/")
        };
        builder.begin_child(label);
        add_children(builder, &node.children, colored);
        builder.end_child();
    }

    for (name, _) in files {
        let label = if colored { color_by_ext(name) } else { name.clone() };
        builder.add_empty_child(label);
    }
}

fn color_by_ext(name: &str) -> String {
    let ext = name.rsplit_once('.').map(|(_, e)| e).unwrap_or_default();
    match ext {
        "rs" => name.yellow().to_string(),
        "py" => name.green().to_string(),
        "js" | "jsx" | "ts" | "tsx" => name.cyan().to_string(),
        "go" => name.magenta().to_string(),
        "c" | "cpp" | "cc" | "h" | "hpp" => name.red().to_string(),
        "toml" | "yaml" | "yml" | "json" => name.bright_blue().to_string(),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nests_and_orders_directories_first() -> Result<()> {
        let tree = DirTree::from_paths("repo", &["src/main.rs", "README.md", "src/core/mod.rs", "Cargo.toml"]);
        let text = tree.render()?;
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "repo/");
        let pos = |needle: &str| {
            lines
                .iter()
                .position(|l| l.ends_with(needle))
                .unwrap_or(usize::MAX)
        };
        assert!(pos("src/") < pos("Cargo.toml"));
        assert!(pos("core/") < pos("main.rs"));
        assert!(pos("mod.rs") < pos("main.rs"));
        assert!(pos("Cargo.toml") < pos("README.md"));
        assert_eq!(lines.len(), 7);
        Ok(())
    }

    #[test]
    fn plain_render_has_no_escape_codes() -> Result<()> {
        let text = DirTree::from_paths("r", &["a/b.rs"]).render()?;
        assert!(!text.contains('\u{1b}'));
        Ok(())
    }

    #[test]
    fn empty_tree_is_just_the_root() -> Result<()> {
        let tree = DirTree::new("root");
        assert!(tree.is_empty());
        assert_eq!(tree.render()?.trim_end(), "root/");
        Ok(())
    }
}
