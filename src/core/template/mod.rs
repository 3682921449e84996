//! Prompt templates: front matter, layered resolution, and rendering.
//!
//! A template file may open with a fenced TOML block:
//!
//! ```text
//! ---
//! layout = "<layouts/markdown>"
//! select = "src|.rs"
//! ---
//! body text
//! ```
//!
//! The fence is a repeated `---`, `+++` or three backticks; the opening line
//! may carry a `toml` tag (`---toml`).

pub mod render;
pub mod resolve;

pub use render::{RenderError, Renderer, TemplateData};
pub use resolve::{Address, ContentSource, DirSource, Layer, MemorySource, ResolveError, Resolver};

use serde::Deserialize;

/// Front-matter parsing errors.
#[derive(Debug, thiserror::Error)]
pub enum FrontMatterError
{
    #[error("front matter opened with `{delimiter}` is never closed")]
    Unterminated
    {
        delimiter: String
    },

    #[error("unsupported front matter format `{tag}` (only toml is understood)")]
    UnsupportedFormat
    {
        tag: String
    },

    #[error("invalid TOML in front matter: {source}")]
    InvalidToml
    {
        #[source]
        source: toml::de::Error,
    },
}

/// Recognized front-matter keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FrontMatter
{
    /// Layout addresses separated by `;`, first listed is innermost.
    pub layout: Option<String>,
    /// Selection query used when the CLI gives none.
    pub select: Option<String>,
    /// Query filtering the directory tree diagram.
    pub dirtree: Option<String>,
    /// Addresses inlined ahead of the body; `!` renders them.
    pub before: Option<String>,
    /// Addresses inlined after the body; `!` renders them.
    pub after: Option<String>,
    /// Variant suffix tried first during resolution.
    pub mode: Option<String>,
}

/// Which layer a template came from, and where inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateRef
{
    pub layer: usize,
    pub path: String,
}

impl std::fmt::Display for TemplateRef
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result
    {
        write!(f, "{}", self.path)
    }
}

/// A loaded template. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct Template
{
    pub origin: TemplateRef,
    pub body: String,
    pub front_matter: FrontMatter,
    pub raw_front_matter: toml::Table,
}

impl Template
{
    /// Split `source` into front matter and body.
    pub fn parse(
        origin: TemplateRef,
        source: &str,
    ) -> Result<Self, FrontMatterError>
    {
        let (raw, body) = split_front_matter(source)?;

        let raw_front_matter: toml::Table = match raw
        {
            Some(text) => toml::from_str(text).map_err(|source| FrontMatterError::InvalidToml { source })?,
            None => toml::Table::new(),
        };
        let front_matter: FrontMatter = toml::Value::Table(raw_front_matter.clone())
            .try_into()
            .map_err(|source| FrontMatterError::InvalidToml { source })?;

        Ok(Self { origin, body: body.to_string(), front_matter, raw_front_matter })
    }

    pub fn path(&self) -> &str
    {
        &self.origin.path
    }
}

/// Split a `;` separated address list, dropping empty entries.
pub fn split_addresses(list: Option<&str>) -> Vec<&str>
{
    list.unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Returns `(front_matter, body)`. Files without a fence have no front matter.
pub fn split_front_matter(source: &str) -> Result<(Option<&str>, &str), FrontMatterError>
{
    let text = source
        .strip_prefix('\u{feff}')
        .unwrap_or(source);

    let (first, rest) = match text.find('\n')
    {
        Some(i) => (&text[..i], &text[i + 1..]),
        None => (text, ""),
    };
    let first = first.trim_end_matches('\r');

    let Some(fence) = ["---", "+++", "```"]
        .into_iter()
        .find(|f| first.starts_with(f))
    else
    {
        return Ok((None, text));
    };

    let tag = first[fence.len()..].trim();
    if tag
        .chars()
        .any(|c| c == fence.chars().next().unwrap_or_default())
    {
        // A longer rule such as `-----` is body text, not a fence
        return Ok((None, text));
    }
    if !tag.is_empty() && !tag.eq_ignore_ascii_case("toml")
    {
        // ```go and friends open an ordinary code block
        if fence == "```"
        {
            return Ok((None, text));
        }
        return Err(FrontMatterError::UnsupportedFormat { tag: tag.to_string() });
    }

    let mut offset = 0usize;
    for line in rest.split_inclusive('\n')
    {
        if line.trim_end_matches(['\r', '\n']) == fence
        {
            let front = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Ok((Some(front), body));
        }
        offset += line.len();
    }

    Err(FrontMatterError::Unterminated { delimiter: first.to_string() })
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn origin() -> TemplateRef
    {
        TemplateRef { layer: 0, path: "t.md".into() }
    }

    #[test]
    fn parses_each_fence_style()
    {
        for src in [
            "---\nlayout = \"base\"\n---\nBODY",
            "+++\nlayout = \"base\"\n+++\nBODY",
            "```toml\nlayout = \"base\"\n```\nBODY",
            "---toml\r\nlayout = \"base\"\r\n---\r\nBODY",
        ]
        {
            let t = Template::parse(origin(), src).unwrap();
            assert_eq!(t.front_matter.layout.as_deref(), Some("base"), "{src:?}");
            assert_eq!(t.body, "BODY");
        }
    }

    #[test]
    fn no_front_matter_keeps_whole_body()
    {
        let t = Template::parse(origin(), "just text\n---\n").unwrap();
        assert_eq!(t.body, "just text\n---\n");
        assert_eq!(t.front_matter, FrontMatter::default());
    }

    #[test]
    fn unknown_keys_stay_in_raw_table()
    {
        let t = Template::parse(origin(), "---\nselect = \"src\"\naudience = \"reviewers\"\n---\n").unwrap();
        assert_eq!(t.front_matter.select.as_deref(), Some("src"));
        assert_eq!(t.raw_front_matter["audience"].as_str(), Some("reviewers"));
        assert_eq!(t.body, "");
    }

    #[test]
    fn unterminated_and_invalid()
    {
        assert!(matches!(
            Template::parse(origin(), "---\nlayout = \"x\"\nbody"),
            Err(FrontMatterError::Unterminated { .. })
        ));
        assert!(matches!(
            Template::parse(origin(), "---\nlayout = \n---\n"),
            Err(FrontMatterError::InvalidToml { .. })
        ));
        assert!(matches!(
            Template::parse(origin(), "---yaml\nlayout: x\n---\n"),
            Err(FrontMatterError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            Template::parse(origin(), "---\nlayout = 3\n---\n"),
            Err(FrontMatterError::InvalidToml { .. })
        ));
    }

    #[test]
    fn leading_code_block_is_body()
    {
        let src = "```go\nfunc main() {}\n```\nExplain this.\n";
        let t = Template::parse(origin(), src).unwrap();
        assert_eq!(t.body, src);
        assert!(t.raw_front_matter.is_empty());
        assert!(t.front_matter.layout.is_none());
    }

    #[test]
    fn address_lists()
    {
        assert_eq!(split_addresses(Some(" a ; ;<b>;")), vec!["a", "<b>"]);
        assert!(split_addresses(None).is_empty());
    }
}
