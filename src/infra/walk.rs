//! Gitignore-aware repository index.
//! - Respects .gitignore, .git/info/exclude, and global gitignore
//! - Extra ignore globs match paths relative to the root (early prune + late filter)
//! - Hidden files are included; `.git` itself is always skipped
//! - Paths come back `/`-separated and sorted
//!
//! Backed by ripgrep's `ignore` crate and `globset`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::{DirEntry, WalkBuilder};
use tracing::{debug, warn};

/// Always pruned, whatever the config says.
pub const DEFAULT_IGNORES: &[&str] = &["**/.git", "**/.hg", "**/.svn", "**/node_modules", "**/target"];

/// One walked entry, relative to the index root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexEntry
{
    pub path: String,
    pub is_dir: bool,
}

/// Flat listing of a repository.
#[derive(Debug, Clone, Default)]
pub struct DirectoryIndex
{
    root: PathBuf,
    entries: Vec<IndexEntry>,
}

impl DirectoryIndex
{
    /// Build an index from already-known relative paths (all treated as files).
    pub fn from_files<S: AsRef<str>>(
        root: impl Into<PathBuf>,
        files: &[S],
    ) -> Self
    {
        let mut entries: Vec<IndexEntry> = files
            .iter()
            .map(|f| IndexEntry { path: f.as_ref().to_string(), is_dir: false })
            .collect();
        entries.sort();
        Self { root: root.into(), entries }
    }

    pub fn root(&self) -> &Path
    {
        &self.root
    }

    pub fn entries(&self) -> &[IndexEntry]
    {
        &self.entries
    }

    /// Regular files, sorted.
    pub fn files(&self) -> Vec<String>
    {
        self.entries
            .iter()
            .filter(|e| !e.is_dir)
            .map(|e| e.path.clone())
            .collect()
    }

    pub fn dirs(&self) -> Vec<String>
    {
        self.entries
            .iter()
            .filter(|e| e.is_dir)
            .map(|e| e.path.clone())
            .collect()
    }

    pub fn len(&self) -> usize
    {
        self.entries
            .len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.entries
            .is_empty()
    }

    /// Absolute location of an indexed path.
    pub fn absolute(
        &self,
        path: &str,
    ) -> PathBuf
    {
        self.root
            .join(path)
    }

    /// Label for the root directory in tree diagrams.
    pub fn root_label(&self) -> String
    {
        self.root
            .file_name()
            .map_or_else(|| ".".to_string(), |n| n.to_string_lossy().into_owned())
    }
}

/// Gitignore-aware walker with extra ignore globs.
pub struct FileWalker
{
    /// Compiled set of additional ignore patterns
    ignore_patterns: GlobSet,

    /// Include hidden (dot) files; default true
    include_hidden: bool,

    /// Maximum recursion depth; default None (unbounded)
    max_depth: Option<usize>,
}

impl FileWalker
{
    /// Walker with [`DEFAULT_IGNORES`] plus `additional_ignores`
    /// (e.g. "dist/**", "**/*.min.js").
    pub fn new(additional_ignores: &[String]) -> Result<Self>
    {
        let mut builder = GlobSetBuilder::new();

        for pattern in DEFAULT_IGNORES
            .iter()
            .copied()
            .chain(
                additional_ignores
                    .iter()
                    .map(String::as_str),
            )
        {
            builder.add(Glob::new(pattern).with_context(|| format!("Invalid ignore pattern `{pattern}`"))?);
        }

        Ok(Self { ignore_patterns: builder.build()?, include_hidden: true, max_depth: None })
    }

    /// (Optional) Include or exclude hidden files (dotfiles).
    pub fn with_include_hidden(
        mut self,
        include_hidden: bool,
    ) -> Self
    {
        self.include_hidden = include_hidden;
        self
    }

    /// (Optional) Limit recursion depth (`None` = unbounded).
    pub fn with_max_depth(
        mut self,
        depth: Option<usize>,
    ) -> Self
    {
        self.max_depth = depth;
        self
    }

    fn build_walk(
        &self,
        root: &Path,
    ) -> WalkBuilder
    {
        let mut b = WalkBuilder::new(root);

        // WalkBuilder::hidden(true) skips dotfiles
        b.hidden(!self.include_hidden);

        b.git_ignore(true);
        b.git_global(true);
        b.git_exclude(true);
        b.max_depth(self.max_depth);

        // Early directory pruning on the path relative to the root
        let extra = self
            .ignore_patterns
            .clone();
        let base = root.to_path_buf();
        b.filter_entry(move |ent: &DirEntry| {
            let is_dir = ent
                .file_type()
                .is_some_and(|ft| ft.is_dir());
            if !is_dir
            {
                return true;
            }
            let rel = ent
                .path()
                .strip_prefix(&base)
                .unwrap_or(ent.path());
            rel.as_os_str()
                .is_empty()
                || !extra.is_match(rel)
        });

        b
    }

    /// Index everything under `root`.
    pub fn index<P: AsRef<Path>>(
        &self,
        root: P,
    ) -> Result<DirectoryIndex>
    {
        let root = dunce::canonicalize(root.as_ref()).with_context(|| format!("Cannot open {}", root.as_ref().display()))?;

        let mut entries = Vec::new();
        for result in self
            .build_walk(&root)
            .build()
        {
            let entry = match result
            {
                Ok(entry) => entry,
                Err(err) =>
                {
                    warn!(%err, "skipping unreadable entry");
                    continue;
                }
            };
            let Some(file_type) = entry.file_type()
            else
            {
                continue;
            };
            let Ok(rel) = entry
                .path()
                .strip_prefix(&root)
            else
            {
                continue;
            };
            if rel
                .as_os_str()
                .is_empty()
                || self
                    .ignore_patterns
                    .is_match(rel)
            {
                continue;
            }

            let path = rel
                .to_string_lossy()
                .replace('\\', "/");
            entries.push(IndexEntry { path, is_dir: file_type.is_dir() });
        }

        // Deterministic order (stable CLI & tests)
        entries.sort();
        debug!(root = %root.display(), entries = entries.len(), "indexed");

        Ok(DirectoryIndex { root, entries })
    }
}
