//! File selection query language.
//!
//! A query compiles into a [`Matcher`] tree which is evaluated against the
//! flat path list of a directory index. Recognition order at each level:
//!
//! 1. `A;B`           union
//! 2. `=path#s,e`     exact path, optional line range
//! 3. `A|B`           compound (each term narrows the previous result)
//! 4. `!A`            negation
//! 5. `/expr`         regex
//! 6. `*`, `?`, `**`  glob
//! 7. anything else   fuzzy subsequence
//!
//! Separators inside `()`, `[]` or `{}` groups, or escaped with `\`, do not
//! split, so `/(foo|bar)` stays one regex.

pub mod fuzzy;
pub mod fzf;

pub use fuzzy::FuzzyPattern;
pub use fzf::FzfQuery;

use std::str::FromStr;

use globset::{GlobBuilder, GlobMatcher};
use miette::Diagnostic;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::core::pathset::PathSet;
use crate::core::ranges::{LineRange, coalesce, intersect};

/// Query syntax errors. Each variant carries the offending sub-pattern.
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum SelectError
{
    #[error("invalid regex `{pattern}`: {source}")]
    #[diagnostic(
        code(select::invalid_regex),
        help("regex terms start with `/`; escape a literal `|` or `;` with `\\`")
    )]
    InvalidRegex
    {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid glob `{pattern}`: {source}")]
    #[diagnostic(code(select::invalid_glob))]
    InvalidGlob
    {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("empty negation in `{pattern}`")]
    #[diagnostic(code(select::empty_negation), help("write `!` directly before a pattern, e.g. `!_test.go`"))]
    EmptyNegation
    {
        pattern: String
    },

    #[error("path traversal is not allowed: `{pattern}`")]
    #[diagnostic(code(select::path_traversal), help("queries are relative to the repository root"))]
    PathTraversal
    {
        pattern: String
    },

    #[error("lonely `{meta}` in `{pattern}`")]
    #[diagnostic(code(select::lonely_meta), help("anchors and quotes must be attached to a word"))]
    LonelyMeta
    {
        pattern: String, meta: String
    },

    #[error("invalid line range in `{pattern}`: {reason}")]
    #[diagnostic(code(select::invalid_range), help("use `=path#start,end` with 1 <= start <= end"))]
    InvalidRange
    {
        pattern: String, reason: String
    },

    #[error("missing path after `=` in `{pattern}`")]
    #[diagnostic(code(select::empty_exact))]
    EmptyExactPath
    {
        pattern: String
    },

    #[error("no valid patterns in `{query}`")]
    #[diagnostic(code(select::no_patterns))]
    NoValidPatterns
    {
        query: String
    },
}

/// One file picked by a query: the whole file when `ranges` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSelection
{
    pub path: String,
    pub ranges: Vec<LineRange>,
}

impl FileSelection
{
    pub fn whole(path: impl Into<String>) -> Self
    {
        Self { path: path.into(), ranges: Vec::new() }
    }

    pub fn is_whole(&self) -> bool
    {
        self.ranges
            .is_empty()
    }
}

/// Which lines of a matched file a query asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Coverage
{
    Whole,
    Lines(Vec<LineRange>),
}

impl Coverage
{
    /// Union of two coverages; the whole file absorbs everything.
    fn merge(
        self,
        other: Self,
    ) -> Self
    {
        match (self, other)
        {
            (Coverage::Whole, _) | (_, Coverage::Whole) => Coverage::Whole,
            (Coverage::Lines(mut a), Coverage::Lines(b)) =>
            {
                a.extend(b);
                Coverage::Lines(coalesce(a))
            }
        }
    }

    /// Intersection of two coverages; the whole file is the identity.
    fn narrow(
        self,
        other: Self,
    ) -> Self
    {
        match (self, other)
        {
            (Coverage::Whole, x) | (x, Coverage::Whole) => x,
            (Coverage::Lines(a), Coverage::Lines(b)) => Coverage::Lines(intersect(&a, &b)),
        }
    }
}

/// Compiled query term.
#[derive(Debug, Clone)]
pub enum Matcher
{
    Fuzzy(FuzzyPattern),
    Regex(Regex),
    Glob
    {
        pattern: String, matcher: GlobMatcher
    },
    Exact
    {
        path: String, range: Option<LineRange>
    },
    Negation(Box<Matcher>),
    Compound(Vec<Matcher>),
    Union(Vec<Matcher>),
}

impl Matcher
{
    /// Compile a query string.
    pub fn parse(query: &str) -> Result<Self, SelectError>
    {
        let trimmed = query.trim();

        let only_separators = trimmed
            .chars()
            .all(|c| c == ';' || c == '|' || c.is_whitespace());
        if !query.is_empty() && only_separators
        {
            return Err(SelectError::NoValidPatterns { query: query.to_string() });
        }

        let parts = split_top_level(trimmed, ';');
        if parts.len() == 1
        {
            return Self::parse_term(trimmed);
        }

        let branches = parse_each(parts, query)?;
        Ok(Self::collapse(branches, Matcher::Union))
    }

    fn parse_term(raw: &str) -> Result<Self, SelectError>
    {
        let term = strip_relative(raw.trim())?;

        if let Some(rest) = term.strip_prefix('=')
        {
            return Self::parse_exact(rest, raw);
        }

        let parts = split_top_level(term, '|');
        if parts.len() > 1
        {
            let steps = parse_each(parts, raw)?;
            return Ok(Self::collapse(steps, Matcher::Compound));
        }

        if let Some(rest) = term.strip_prefix('!')
        {
            let rest = rest.trim();
            if rest.is_empty()
            {
                return Err(SelectError::EmptyNegation { pattern: raw.to_string() });
            }
            return Ok(Matcher::Negation(Box::new(Self::parse_term(rest)?)));
        }

        if let Some(expr) = term.strip_prefix('/')
        {
            let re = Regex::new(expr).map_err(|source| SelectError::InvalidRegex {
                pattern: term.to_string(),
                source,
            })?;
            return Ok(Matcher::Regex(re));
        }

        if is_glob(term)
        {
            let matcher = GlobBuilder::new(term)
                .literal_separator(true)
                .build()
                .map_err(|source| SelectError::InvalidGlob { pattern: term.to_string(), source })?
                .compile_matcher();
            return Ok(Matcher::Glob { pattern: term.to_string(), matcher });
        }

        Ok(Matcher::Fuzzy(FuzzyPattern::new(term)))
    }

    fn parse_exact(
        rest: &str,
        raw: &str,
    ) -> Result<Self, SelectError>
    {
        let rest = strip_relative(rest.trim())?;

        let (path, range) = match rest.rsplit_once('#')
        {
            Some((path, spec)) => (path, Some(parse_range(spec, raw)?)),
            None => (rest, None),
        };

        if path.is_empty()
        {
            return Err(SelectError::EmptyExactPath { pattern: raw.to_string() });
        }
        if path
            .split('/')
            .any(|seg| seg == "..")
        {
            return Err(SelectError::PathTraversal { pattern: raw.to_string() });
        }

        Ok(Matcher::Exact { path: path.to_string(), range })
    }

    fn collapse(
        mut items: Vec<Matcher>,
        wrap: fn(Vec<Matcher>) -> Matcher,
    ) -> Matcher
    {
        if items.len() == 1
        {
            return items.swap_remove(0);
        }
        wrap(items)
    }

    /// Per-path predicate; agrees with [`Matcher::eval`] on every universe.
    pub fn is_match(
        &self,
        path: &str,
    ) -> bool
    {
        match self
        {
            Matcher::Fuzzy(p) => p.is_match(path),
            Matcher::Regex(re) => re.is_match(path),
            Matcher::Glob { matcher, .. } => matcher.is_match(path),
            Matcher::Exact { path: want, .. } => want == path,
            Matcher::Negation(inner) => !inner.is_match(path),
            Matcher::Compound(steps) => steps
                .iter()
                .all(|m| m.is_match(path)),
            Matcher::Union(branches) => branches
                .iter()
                .any(|m| m.is_match(path)),
        }
    }

    /// Evaluate against `universe` using set algebra.
    pub fn eval(
        &self,
        universe: &PathSet<String>,
    ) -> PathSet<String>
    {
        match self
        {
            Matcher::Negation(inner) => universe.difference(&inner.eval(universe)),
            Matcher::Compound(steps) => steps
                .iter()
                .fold(universe.clone(), |narrowed, step| step.eval(&narrowed)),
            Matcher::Union(branches) => branches
                .iter()
                .fold(PathSet::new(), |acc, branch| acc.union(&branch.eval(universe))),
            leaf => universe
                .iter()
                .filter(|p| leaf.is_match(p))
                .cloned()
                .collect(),
        }
    }

    /// Matching paths out of a flat list.
    pub fn matches(
        &self,
        paths: &[String],
    ) -> PathSet<String>
    {
        let universe: PathSet<String> = paths
            .iter()
            .cloned()
            .collect();
        self.eval(&universe)
    }

    /// Lines of `path` requested by this matcher. Only meaningful for matched paths.
    pub fn coverage(
        &self,
        path: &str,
    ) -> Coverage
    {
        match self
        {
            Matcher::Exact { range: Some(r), .. } => Coverage::Lines(vec![*r]),
            Matcher::Union(branches) => branches
                .iter()
                .filter(|b| b.is_match(path))
                .map(|b| b.coverage(path))
                .reduce(Coverage::merge)
                .unwrap_or(Coverage::Whole),
            Matcher::Compound(steps) => steps
                .iter()
                .map(|s| s.coverage(path))
                .fold(Coverage::Whole, Coverage::narrow),
            _ => Coverage::Whole,
        }
    }

    /// Matched files with their line ranges, sorted by path.
    ///
    /// A file whose requested ranges intersect to nothing is dropped.
    #[instrument(level = "debug", skip(self, paths), fields(candidates = paths.len()))]
    pub fn select(
        &self,
        paths: &[String],
    ) -> Vec<FileSelection>
    {
        let selected: Vec<FileSelection> = self
            .matches(paths)
            .sorted()
            .into_iter()
            .filter_map(|path| match self.coverage(&path)
            {
                Coverage::Whole => Some(FileSelection::whole(path)),
                Coverage::Lines(ranges) if ranges.is_empty() => None,
                Coverage::Lines(ranges) => Some(FileSelection { path, ranges }),
            })
            .collect();

        debug!(selected = selected.len(), "query evaluated");
        selected
    }
}

impl FromStr for Matcher
{
    type Err = SelectError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        Self::parse(s)
    }
}

/// Compile `query` and select from `paths` in one step.
pub fn select_files(
    query: &str,
    paths: &[String],
) -> Result<Vec<FileSelection>, SelectError>
{
    Ok(Matcher::parse(query)?.select(paths))
}

fn parse_each(
    parts: Vec<&str>,
    whole: &str,
) -> Result<Vec<Matcher>, SelectError>
{
    let items = parts
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Matcher::parse_term)
        .collect::<Result<Vec<_>, _>>()?;

    if items.is_empty()
    {
        return Err(SelectError::NoValidPatterns { query: whole.to_string() });
    }
    Ok(items)
}

/// Strip leading `./` and refuse terms that climb out of the root.
fn strip_relative(term: &str) -> Result<&str, SelectError>
{
    if term == ".." || term.starts_with("../")
    {
        return Err(SelectError::PathTraversal { pattern: term.to_string() });
    }

    let mut t = term;
    while let Some(rest) = t.strip_prefix("./")
    {
        t = rest;
    }

    if t.starts_with("../")
    {
        return Err(SelectError::PathTraversal { pattern: term.to_string() });
    }
    Ok(t)
}

fn parse_range(
    spec: &str,
    raw: &str,
) -> Result<LineRange, SelectError>
{
    let invalid = |reason: &str| SelectError::InvalidRange {
        pattern: raw.to_string(),
        reason: reason.to_string(),
    };

    let (start, end) = spec
        .split_once(',')
        .ok_or_else(|| invalid("expected `#start,end`"))?;
    let start: usize = start
        .trim()
        .parse()
        .map_err(|_| invalid("start is not a number"))?;
    let end: usize = end
        .trim()
        .parse()
        .map_err(|_| invalid("end is not a number"))?;

    LineRange::new(start, end).map_err(|e| invalid(&e.to_string()))
}

fn is_glob(term: &str) -> bool
{
    term.contains(['*', '?'])
}

/// Split on `sep` outside bracket groups and escapes.
fn split_top_level(
    s: &str,
    sep: char,
) -> Vec<&str>
{
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut escaped = false;

    for (i, c) in s.char_indices()
    {
        if escaped
        {
            escaped = false;
            continue;
        }
        match c
        {
            '\\' => escaped = true,
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 =>
            {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ =>
            {}
        }
    }
    parts.push(&s[start..]);
    parts
}
