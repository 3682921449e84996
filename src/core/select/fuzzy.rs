//! Ordered-subsequence matching shared by both query dialects.

/// A fuzzy term: matches when every pattern char appears in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuzzyPattern
{
    needle: Vec<char>,
    case_sensitive: bool,
}

impl FuzzyPattern
{
    /// Smart case: the match ignores case unless the pattern has an uppercase char.
    pub fn new(pattern: &str) -> Self
    {
        let case_sensitive = pattern
            .chars()
            .any(char::is_uppercase);
        let needle = if case_sensitive
        {
            pattern
                .chars()
                .collect()
        }
        else
        {
            pattern
                .chars()
                .flat_map(char::to_lowercase)
                .collect()
        };
        Self { needle, case_sensitive }
    }

    pub fn is_empty(&self) -> bool
    {
        self.needle
            .is_empty()
    }

    pub fn is_match(
        &self,
        candidate: &str,
    ) -> bool
    {
        let mut wanted = self
            .needle
            .iter()
            .peekable();

        for c in candidate.chars()
        {
            let Some(&&next) = wanted.peek()
            else
            {
                break;
            };
            let hit = if self.case_sensitive
            {
                c == next
            }
            else
            {
                c.to_lowercase()
                    .eq(std::iter::once(next))
            };
            if hit
            {
                wanted.next();
            }
        }

        wanted
            .peek()
            .is_none()
    }
}
