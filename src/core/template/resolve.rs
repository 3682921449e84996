//! Layered template addressing.
//!
//! Layers are searched highest priority first: the repository root, extra
//! template directories, the user's config directory, then the templates
//! compiled into the binary. An address picks which layers it may hit:
//!
//! - `<name>`  built-in (last) layer only
//! - `@name`   repository (first) layer only
//! - `./name`, `../name`  relative to the current template, in its own layer
//! - `name`    every layer, first hit wins

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::WalkBuilder;
use tracing::{debug, trace};

use super::{FrontMatterError, Template, TemplateRef};
use crate::infra::io::read_text;

/// Errors raised while locating or loading a template.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError
{
    #[error("template `{address}` not found in any filesystem (searched: {searched})")]
    NotFound
    {
        address: String, searched: String
    },

    #[error("relative address `{address}` needs a current template")]
    NoCurrentTemplate
    {
        address: String
    },

    #[error("address `{address}` escapes the root of its filesystem")]
    EscapesRoot
    {
        address: String
    },

    #[error("failed to read template {path} from {layer}")]
    Read
    {
        path: String,
        layer: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid front matter in {path}")]
    FrontMatter
    {
        path: String,
        #[source]
        source: FrontMatterError,
    },
}

/// One filesystem a template can come from.
pub trait ContentSource: Send + Sync
{
    fn read(
        &self,
        path: &str,
    ) -> io::Result<String>;

    fn exists(
        &self,
        path: &str,
    ) -> bool;

    /// Template paths this source offers, `/`-separated and sorted.
    fn list(&self) -> Vec<String>;
}

/// Templates under a directory on disk.
#[derive(Debug, Clone)]
pub struct DirSource
{
    root: PathBuf,
}

impl DirSource
{
    pub fn new(root: impl Into<PathBuf>) -> Self
    {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path
    {
        &self.root
    }
}

impl ContentSource for DirSource
{
    fn read(
        &self,
        path: &str,
    ) -> io::Result<String>
    {
        read_text(self.root.join(path))
    }

    fn exists(
        &self,
        path: &str,
    ) -> bool
    {
        self.root
            .join(path)
            .is_file()
    }

    fn list(&self) -> Vec<String>
    {
        if !self.root.is_dir()
        {
            return Vec::new();
        }

        let mut out: Vec<String> = WalkBuilder::new(&self.root)
            .build()
            .filter_map(Result::ok)
            .filter(|e| {
                e.file_type()
                    .is_some_and(|t| t.is_file())
            })
            .filter(|e| {
                e.path()
                    .extension()
                    .is_some_and(|x| x == "md")
            })
            .filter_map(|e| {
                e.path()
                    .strip_prefix(&self.root)
                    .ok()
                    .map(|p| {
                        p.to_string_lossy()
                            .replace('\\', "/")
                    })
            })
            .collect();
        out.sort();
        out
    }
}

/// Templates held in memory: the built-ins, and fixtures in tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySource
{
    files: BTreeMap<String, String>,
}

impl MemorySource
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn with(
        mut self,
        path: impl Into<String>,
        body: impl Into<String>,
    ) -> Self
    {
        self.insert(path, body);
        self
    }

    pub fn insert(
        &mut self,
        path: impl Into<String>,
        body: impl Into<String>,
    )
    {
        self.files
            .insert(path.into(), body.into());
    }

    /// Templates shipped with the binary.
    pub fn builtin() -> Self
    {
        Self::new()
            .with("default.md", include_str!("../../../templates/default.md"))
            .with("review.md", include_str!("../../../templates/review.md"))
            .with("layouts/prompt.md", include_str!("../../../templates/layouts/prompt.md"))
            .with("partials/files.md", include_str!("../../../templates/partials/files.md"))
            .with("partials/tree.md", include_str!("../../../templates/partials/tree.md"))
    }
}

impl ContentSource for MemorySource
{
    fn read(
        &self,
        path: &str,
    ) -> io::Result<String>
    {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{path} is not in memory")))
    }

    fn exists(
        &self,
        path: &str,
    ) -> bool
    {
        self.files
            .contains_key(path)
    }

    fn list(&self) -> Vec<String>
    {
        self.files
            .keys()
            .cloned()
            .collect()
    }
}

/// A named content source.
#[derive(Clone)]
pub struct Layer
{
    pub name: String,
    pub source: Arc<dyn ContentSource>,
}

impl Layer
{
    pub fn new(
        name: impl Into<String>,
        source: impl ContentSource + 'static,
    ) -> Self
    {
        Self { name: name.into(), source: Arc::new(source) }
    }
}

impl fmt::Debug for Layer
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result
    {
        f.debug_struct("Layer")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A parsed template address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address<'a>
{
    System(&'a str),
    RepoRoot(&'a str),
    Relative(&'a str),
    Bare(&'a str),
}

impl<'a> Address<'a>
{
    pub fn parse(address: &'a str) -> Self
    {
        let address = address.trim();
        if let Some(inner) = address
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
        {
            return Address::System(inner.trim());
        }
        if let Some(rest) = address.strip_prefix('@')
        {
            return Address::RepoRoot(rest);
        }
        if address.starts_with("./") || address.starts_with("../")
        {
            return Address::Relative(address);
        }
        Address::Bare(address)
    }
}

/// One row of `rp templates`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateListing
{
    pub path: String,
    pub layer: String,
    pub shadowed: bool,
}

/// Maps addresses to templates across ordered layers.
#[derive(Debug, Clone, Default)]
pub struct Resolver
{
    layers: Vec<Layer>,
    mode: Option<String>,
}

impl Resolver
{
    pub fn new(layers: Vec<Layer>) -> Self
    {
        Self { layers, mode: None }
    }

    /// Repository root, extra directories, the user config dir, and the built-ins.
    pub fn standard(
        repo_root: &Path,
        template_dirs: &[PathBuf],
    ) -> Self
    {
        let mut layers = vec![Layer::new("repo", DirSource::new(repo_root))];

        for dir in template_dirs
        {
            let dir = if dir.is_absolute() { dir.clone() } else { repo_root.join(dir) };
            layers.push(Layer::new(format!("dir:{}", dir.display()), DirSource::new(dir)));
        }

        if let Some(config_dir) = dirs::config_dir()
        {
            let user = config_dir
                .join("roughprompt")
                .join("templates");
            layers.push(Layer::new("user", DirSource::new(user)));
        }

        layers.push(Layer::new("builtin", MemorySource::builtin()));
        Self::new(layers)
    }

    pub fn with_mode(
        mut self,
        mode: Option<String>,
    ) -> Self
    {
        self.mode = mode.filter(|m| !m.trim().is_empty());
        self
    }

    pub fn mode(&self) -> Option<&str>
    {
        self.mode
            .as_deref()
    }

    pub fn layers(&self) -> &[Layer]
    {
        &self.layers
    }

    pub fn layer_name(
        &self,
        index: usize,
    ) -> &str
    {
        self.layers
            .get(index)
            .map_or("?", |l| l.name.as_str())
    }

    /// Locate `address`, resolving relative forms against `current`.
    pub fn resolve(
        &self,
        address: &str,
        current: Option<&TemplateRef>,
    ) -> Result<TemplateRef, ResolveError>
    {
        let not_found = |scope: &[usize]| ResolveError::NotFound {
            address: address.to_string(),
            searched: scope
                .iter()
                .map(|&i| self.layer_name(i))
                .collect::<Vec<_>>()
                .join(", "),
        };

        let (name, scope): (String, Vec<usize>) = match Address::parse(address)
        {
            Address::System(name) => (
                normalize(name, address)?,
                self.layers
                    .len()
                    .checked_sub(1)
                    .into_iter()
                    .collect(),
            ),
            Address::RepoRoot(name) => (normalize(name, address)?, if self.layers.is_empty() { vec![] } else { vec![0] }),
            Address::Relative(rel) =>
            {
                let current = current.ok_or_else(|| ResolveError::NoCurrentTemplate { address: address.to_string() })?;
                let base = current
                    .path
                    .rsplit_once('/')
                    .map_or("", |(dir, _)| dir);
                let joined = if base.is_empty() { rel.to_string() } else { format!("{base}/{rel}") };
                (normalize(&joined, address)?, vec![current.layer])
            }
            Address::Bare(name) => (normalize(name, address)?, (0..self.layers.len()).collect()),
        };

        if name.is_empty()
        {
            return Err(not_found(&scope));
        }

        let candidates = self.candidates(&name);
        for &index in &scope
        {
            let Some(layer) = self
                .layers
                .get(index)
            else
            {
                continue;
            };
            for candidate in &candidates
            {
                trace!(layer = %layer.name, %candidate, "probing");
                if layer
                    .source
                    .exists(candidate)
                {
                    debug!(%address, layer = %layer.name, path = %candidate, "resolved template");
                    return Ok(TemplateRef { layer: index, path: candidate.clone() });
                }
            }
        }

        Err(not_found(&scope))
    }

    /// Raw text of a resolved template.
    pub fn read(
        &self,
        origin: &TemplateRef,
    ) -> Result<String, ResolveError>
    {
        let read_err = |source| ResolveError::Read {
            path: origin.path.clone(),
            layer: self
                .layer_name(origin.layer)
                .to_string(),
            source,
        };

        let layer = self
            .layers
            .get(origin.layer)
            .ok_or_else(|| read_err(io::Error::new(io::ErrorKind::NotFound, "no such layer")))?;
        layer
            .source
            .read(&origin.path)
            .map_err(read_err)
    }

    /// Resolve and parse in one step.
    pub fn load(
        &self,
        address: &str,
        current: Option<&TemplateRef>,
    ) -> Result<Template, ResolveError>
    {
        let origin = self.resolve(address, current)?;
        let text = self.read(&origin)?;
        let path = origin
            .path
            .clone();
        Template::parse(origin, &text).map_err(|source| ResolveError::FrontMatter { path, source })
    }

    /// Every template visible across layers; lower layers' copies are shadowed.
    pub fn list(&self) -> Vec<TemplateListing>
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();

        for layer in &self.layers
        {
            for path in layer
                .source
                .list()
            {
                let shadowed = !seen.insert(path.clone());
                out.push(TemplateListing { path, layer: layer.name.clone(), shadowed });
            }
        }

        out
    }

    /// Names tried in order within one layer.
    fn candidates(
        &self,
        name: &str,
    ) -> Vec<String>
    {
        let mut out = Vec::with_capacity(4);
        let ext = split_extension(name);

        if let Some(mode) = self.mode()
        {
            match ext
            {
                Some((stem, ext)) => out.push(format!("{stem}.{mode}.{ext}")),
                None =>
                {
                    out.push(format!("{name}.{mode}.md"));
                    out.push(format!("{name}.{mode}"));
                }
            }
        }

        out.push(name.to_string());
        if ext.is_none()
        {
            out.push(format!("{name}.md"));
        }

        out
    }
}

/// `(stem, ext)` when the final path segment has an extension.
fn split_extension(name: &str) -> Option<(&str, &str)>
{
    let file_start = name
        .rfind('/')
        .map_or(0, |i| i + 1);
    let dot = name[file_start..].rfind('.')?;
    if dot == 0
    {
        return None;
    }
    let split = file_start + dot;
    Some((&name[..split], &name[split + 1..]))
}

/// Collapse `.` and `..` segments; climbing above the root is an error.
fn normalize(
    path: &str,
    address: &str,
) -> Result<String, ResolveError>
{
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/')
    {
        match segment
        {
            "" | "." => {}
            ".." =>
            {
                if parts
                    .pop()
                    .is_none()
                {
                    return Err(ResolveError::EscapesRoot { address: address.to_string() });
                }
            }
            s => parts.push(s),
        }
    }
    Ok(parts.join("/"))
}
