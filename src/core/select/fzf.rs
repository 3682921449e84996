//! fzf-style query dialect used for quick diagnostic filtering.
//!
//! Whitespace-separated terms are ANDed; a standalone `|` ORs its
//! neighbours. Term forms:
//!
//! | Term      | Meaning                                       |
//! |-----------|-----------------------------------------------|
//! | `word`    | ordered subsequence (smart case)              |
//! | `'word`   | `word` starting at a word boundary            |
//! | `'word'`  | `word` bounded by word boundaries on both ends |
//! | `^word`   | path starts with `word`                       |
//! | `word$`   | path ends with `word`                         |
//! | `^word$`  | path equals `word`                            |
//! | `!term`   | inverts any of the above                      |
//!
//! Matching is boolean; nothing is scored or ranked.

use crate::core::pathset::PathSet;
use crate::core::select::{FuzzyPattern, SelectError};

#[derive(Debug, Clone)]
enum TermKind
{
    Fuzzy(FuzzyPattern),
    WordPrefix(String),
    WordExact(String),
    Prefix(String),
    Suffix(String),
    Equal(String),
}

#[derive(Debug, Clone)]
struct Term
{
    kind: TermKind,
    negated: bool,
}

impl Term
{
    fn parse(token: &str) -> Result<Self, SelectError>
    {
        let lonely = |meta: &str| SelectError::LonelyMeta {
            pattern: token.to_string(),
            meta: meta.to_string(),
        };

        let (negated, body) = match token.strip_prefix('!')
        {
            Some(rest) => (true, rest),
            None => (false, token),
        };
        if body.is_empty()
        {
            return Err(lonely("!"));
        }

        let kind = if let Some(word) = body.strip_prefix('\'')
        {
            match word.strip_suffix('\'')
            {
                Some(inner) if !inner.is_empty() => TermKind::WordExact(inner.to_string()),
                Some(_) => return Err(lonely("'")),
                None if word.is_empty() => return Err(lonely("'")),
                None => TermKind::WordPrefix(word.to_string()),
            }
        }
        else if let Some(rest) = body.strip_prefix('^')
        {
            match rest.strip_suffix('$')
            {
                Some("") => return Err(lonely("^$")),
                Some(inner) => TermKind::Equal(inner.to_string()),
                None if rest.is_empty() => return Err(lonely("^")),
                None => TermKind::Prefix(rest.to_string()),
            }
        }
        else if let Some(rest) = body.strip_suffix('$')
        {
            if rest.is_empty()
            {
                return Err(lonely("$"));
            }
            TermKind::Suffix(rest.to_string())
        }
        else
        {
            TermKind::Fuzzy(FuzzyPattern::new(body))
        };

        Ok(Self { kind, negated })
    }

    fn is_match(
        &self,
        path: &str,
    ) -> bool
    {
        let hit = match &self.kind
        {
            TermKind::Fuzzy(p) => p.is_match(path),
            TermKind::WordPrefix(w) => find_bounded(path, w, false),
            TermKind::WordExact(w) => find_bounded(path, w, true),
            TermKind::Prefix(p) => path.starts_with(p.as_str()),
            TermKind::Suffix(s) => path.ends_with(s.as_str()),
            TermKind::Equal(e) => path == e,
        };
        hit != self.negated
    }
}

/// Compiled fzf-style query: a conjunction of OR-groups.
#[derive(Debug, Clone, Default)]
pub struct FzfQuery
{
    groups: Vec<Vec<Term>>,
}

impl FzfQuery
{
    pub fn parse(query: &str) -> Result<Self, SelectError>
    {
        let mut groups: Vec<Vec<Term>> = Vec::new();
        let mut join_next = false;

        for token in query.split_whitespace()
        {
            if token == "|"
            {
                if groups.is_empty() || join_next
                {
                    return Err(SelectError::LonelyMeta {
                        pattern: query.to_string(),
                        meta: "|".to_string(),
                    });
                }
                join_next = true;
                continue;
            }

            let term = Term::parse(token)?;
            match groups.last_mut()
            {
                Some(group) if join_next => group.push(term),
                _ => groups.push(vec![term]),
            }
            join_next = false;
        }

        if join_next
        {
            return Err(SelectError::LonelyMeta {
                pattern: query.to_string(),
                meta: "|".to_string(),
            });
        }

        Ok(Self { groups })
    }

    pub fn is_match(
        &self,
        path: &str,
    ) -> bool
    {
        self.groups
            .iter()
            .all(|group| {
                group
                    .iter()
                    .any(|t| t.is_match(path))
            })
    }

    pub fn matches(
        &self,
        paths: &[String],
    ) -> PathSet<String>
    {
        paths
            .iter()
            .filter(|p| self.is_match(p))
            .cloned()
            .collect()
    }
}

fn is_boundary(c: Option<char>) -> bool
{
    c.is_none_or(|c| !c.is_alphanumeric())
}

/// Does `word` occur in `hay` starting at a word boundary (and, when
/// `both_ends`, also ending at one)?
fn find_bounded(
    hay: &str,
    word: &str,
    both_ends: bool,
) -> bool
{
    hay.match_indices(word)
        .any(|(i, _)| {
            let before = hay[..i]
                .chars()
                .next_back();
            let after = hay[i + word.len()..]
                .chars()
                .next();
            is_boundary(before) && (!both_ends || is_boundary(after))
        })
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn run(
        query: &str,
        items: &[&str],
    ) -> Vec<String>
    {
        let files: Vec<String> = items
            .iter()
            .map(|s| s.to_string())
            .collect();
        FzfQuery::parse(query)
            .unwrap()
            .matches(&files)
            .sorted()
    }

    const FILES: &[&str] = &["src/main.rs", "src/domain.rs", "tests/main_test.rs", "README.md"];

    #[test]
    fn anchors()
    {
        assert_eq!(run("^src", FILES), vec!["src/domain.rs", "src/main.rs"]);
        assert_eq!(run(".md$", FILES), vec!["README.md"]);
        assert_eq!(run("^README.md$", FILES), vec!["README.md"]);
    }

    #[test]
    fn word_boundaries()
    {
        // `main` at a boundary: src/main.rs and tests/main_test.rs, not domain.rs
        assert_eq!(run("'main", FILES), vec!["src/main.rs", "tests/main_test.rs"]);
        // bounded on both sides: `_` is a boundary as well
        assert_eq!(run("'test'", FILES), vec!["tests/main_test.rs"]);
        assert_eq!(run("'ain", FILES), Vec::<String>::new());
    }

    #[test]
    fn and_or_not()
    {
        assert_eq!(run("src !domain", FILES), vec!["src/main.rs"]);
        assert_eq!(run("^tests | .md$", FILES), vec!["README.md", "tests/main_test.rs"]);
        assert_eq!(run("", FILES).len(), FILES.len());
    }

    #[test]
    fn lonely_meta_characters()
    {
        for q in ["'", "^", "$", "!", "''", "^$", "| a", "a |", "a | | b"]
        {
            let err = FzfQuery::parse(q).unwrap_err();
            assert!(matches!(err, SelectError::LonelyMeta { .. }), "{q}: {err}");
        }
    }
}
