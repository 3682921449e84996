//! `--content` sources.
//!
//! A spec is tried against, in order: `-` (stdin), a registered `scheme:`
//! prefix, a bare alias, and finally a filesystem path with `~` and `$VAR`
//! expansion.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use tracing::debug;

use crate::infra::io::{read_clipboard, read_stdin, read_text};

pub trait ContentLoader {
    fn load(&self) -> Result<String>;
}

struct StdinLoader;

impl ContentLoader for StdinLoader {
    fn load(&self) -> Result<String> {
        read_stdin()
    }
}

struct FileLoader(PathBuf);

impl ContentLoader for FileLoader {
    fn load(&self) -> Result<String> {
        read_text(&self.0).with_context(|| format!("Failed to read content file {}", self.0.display()))
    }
}

struct TextLoader(String);

impl ContentLoader for TextLoader {
    fn load(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

struct ClipboardLoader;

impl ContentLoader for ClipboardLoader {
    fn load(&self) -> Result<String> {
        read_clipboard()
    }
}

type Factory = fn(&str) -> Result<Box<dyn ContentLoader>>;

fn file_loader(rest: &str) -> Result<Box<dyn ContentLoader>> {
    Ok(Box::new(FileLoader(expand_path(rest)?)))
}

fn text_loader(rest: &str) -> Result<Box<dyn ContentLoader>> {
    Ok(Box::new(TextLoader(rest.to_string())))
}

fn clipboard_loader(_: &str) -> Result<Box<dyn ContentLoader>> {
    Ok(Box::new(ClipboardLoader))
}

fn expand_path(spec: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(spec).with_context(|| format!("Failed to expand `{spec}`"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// One loaded source, remembered by its spec for accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedContent {
    pub spec: String,
    pub text: String,
}

pub struct LoaderRegistry {
    schemes: IndexMap<&'static str, Factory>,
    aliases: IndexMap<&'static str, Factory>,
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        let mut schemes: IndexMap<&'static str, Factory> = IndexMap::new();
        schemes.insert("file", file_loader);
        schemes.insert("text", text_loader);
        schemes.insert("clip", clipboard_loader);

        let mut aliases: IndexMap<&'static str, Factory> = IndexMap::new();
        aliases.insert("clipboard", clipboard_loader);

        Self { schemes, aliases }
    }
}

impl LoaderRegistry {
    pub fn resolve(&self, spec: &str) -> Result<Box<dyn ContentLoader>> {
        if spec == "-" {
            return Ok(Box::new(StdinLoader));
        }

        if let Some((scheme, rest)) = spec.split_once(':')
            && let Some(factory) = self.schemes.get(scheme)
        {
            debug!(scheme, "content via scheme");
            return factory(rest);
        }

        if let Some(factory) = self.aliases.get(spec) {
            debug!(alias = spec, "content via alias");
            return factory("");
        }

        let path = expand_path(spec)?;
        if !path.is_file() {
            bail!(
                "content source `{spec}` is not a scheme ({}), an alias ({}), or an existing file",
                self.schemes.keys().map(|s| format!("{s}:")).collect::<Vec<_>>().join(", "),
                self.aliases.keys().copied().collect::<Vec<_>>().join(", ")
            );
        }
        Ok(Box::new(FileLoader(path)))
    }

    pub fn load_each(&self, specs: &[String]) -> Result<Vec<LoadedContent>> {
        specs
            .iter()
            .map(|spec| {
                let text = self
                    .resolve(spec)?
                    .load()
                    .with_context(|| format!("Failed to load content `{spec}`"))?;
                Ok(LoadedContent {
                    spec: spec.clone(),
                    text,
                })
            })
            .collect()
    }
}

/// Sources separated by a blank line.
pub fn join(contents: &[LoadedContent]) -> String {
    contents
        .iter()
        .map(|c| c.text.trim_end_matches('\n'))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::TempDir;
    use assert_fs::prelude::*;

    #[test]
    fn text_and_file_schemes() -> Result<()> {
        let tmp = TempDir::new()?;
        let notes = tmp.child("notes.md");
        notes.write_str("from file\n")?;

        let registry = LoaderRegistry::default();
        let specs = vec![
            "text:inline words".to_string(),
            format!("file:{}", notes.path().display()),
            notes.path().display().to_string(),
        ];
        let loaded = registry.load_each(&specs)?;
        assert_eq!(loaded[0].text, "inline words");
        assert_eq!(loaded[1].text, "from file\n");
        assert_eq!(loaded[2].spec, specs[2]);
        assert_eq!(join(&loaded), "inline words\n\nfrom file\n\nfrom file");
        Ok(())
    }

    #[test]
    fn text_keeps_everything_after_the_first_colon() -> Result<()> {
        let registry = LoaderRegistry::default();
        assert_eq!(registry.resolve("text:a:b")?.load()?, "a:b");
        Ok(())
    }

    #[test]
    fn unknown_specs_explain_themselves() {
        let registry = LoaderRegistry::default();
        let err = registry.resolve("nope:missing/file.txt").err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("not a scheme"), "{err}");
        assert!(err.contains("clipboard"), "{err}");

        assert!(registry.resolve("$ROUGHPROMPT_TEST_SURELY_UNSET/x").is_err());
    }
}
