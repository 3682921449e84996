//! Line ranges for partial-file selection.
//!
//! Ranges are 1-based and inclusive. After [`coalesce`] they are sorted by
//! start and neither overlap nor touch, which is the only shape
//! [`extract_ranges`] accepts.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use serde::Serialize;

/// Errors raised while building or applying line ranges.
#[derive(Debug, thiserror::Error)]
pub enum RangeError
{
    #[error("invalid line range {start},{end}: lines are 1-based and start must not exceed end")]
    Invalid
    {
        start: usize, end: usize
    },

    #[error("line ranges must be coalesced before extraction (got {ranges})")]
    NotCoalesced
    {
        ranges: String
    },

    #[error("failed to read {path}")]
    Io
    {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Inclusive 1-based span of lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LineRange
{
    pub start: usize,
    pub end: usize,
}

impl LineRange
{
    pub fn new(
        start: usize,
        end: usize,
    ) -> Result<Self, RangeError>
    {
        if start == 0 || start > end
        {
            return Err(RangeError::Invalid { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(
        &self,
        line: usize,
    ) -> bool
    {
        self.start <= line && line <= self.end
    }
}

impl fmt::Display for LineRange
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result
    {
        write!(f, "{},{}", self.start, self.end)
    }
}

/// Sort and merge overlapping or adjacent ranges into normal form.
pub fn coalesce(mut ranges: Vec<LineRange>) -> Vec<LineRange>
{
    ranges.sort_unstable_by_key(|r| (r.start, r.end));

    let mut merged: Vec<LineRange> = Vec::with_capacity(ranges.len());
    for r in ranges
    {
        if let Some(last) = merged.last_mut()
            && r.start <= last.end.saturating_add(1)
        {
            last.end = last
                .end
                .max(r.end);
            continue;
        }
        merged.push(r);
    }

    merged
}

/// True when `ranges` is already in coalesced normal form.
pub fn is_coalesced(ranges: &[LineRange]) -> bool
{
    ranges
        .windows(2)
        .all(|w| w[0].end.saturating_add(1) < w[1].start)
}

/// Lines covered by both inputs. Both inputs must be coalesced.
pub fn intersect(
    a: &[LineRange],
    b: &[LineRange],
) -> Vec<LineRange>
{
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len()
    {
        let start = a[i]
            .start
            .max(b[j].start);
        let end = a[i]
            .end
            .min(b[j].end);
        if start <= end
        {
            out.push(LineRange { start, end });
        }

        // Advance whichever span finishes first
        if a[i].end < b[j].end
        {
            i += 1;
        }
        else
        {
            j += 1;
        }
    }

    out
}

/// Marker line emitted ahead of each extracted block.
pub fn marker(
    path: &str,
    range: LineRange,
) -> String
{
    format!("--- {path}#{range} ---\n")
}

/// Extract coalesced `ranges` from `reader` in a single pass.
///
/// Every block is preceded by a `--- path#start,end ---` marker. A range whose
/// end runs past EOF is clamped; a range starting past EOF is dropped. Empty
/// `ranges` return the input verbatim.
pub fn extract_ranges<R: BufRead>(
    mut reader: R,
    path: &str,
    ranges: &[LineRange],
) -> Result<String, RangeError>
{
    let io_err = |source| RangeError::Io { path: path.to_string(), source };

    if !is_coalesced(ranges)
    {
        return Err(RangeError::NotCoalesced { ranges: describe(ranges) });
    }

    if ranges.is_empty()
    {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(io_err)?;
        return Ok(String::from_utf8_lossy(&bytes).into_owned());
    }

    let mut out = String::new();

    let mut line_no = 0usize;
    let mut buf: Vec<u8> = Vec::new();
    let mut pending = ranges.iter();
    let mut current = pending.next();
    let mut block = String::new();

    while let Some(range) = current
    {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(io_err)?;
        if n == 0
        {
            break;
        }
        line_no += 1;

        if line_no < range.start
        {
            continue;
        }

        // Same lossy policy as whole-file reads
        block.push_str(&String::from_utf8_lossy(&buf));

        if line_no == range.end
        {
            flush_block(&mut out, path, *range, line_no, &mut block);
            current = pending.next();
        }
    }

    // EOF inside a range: clamp its end to the last line read
    if let Some(range) = current
        && line_no >= range.start
    {
        flush_block(&mut out, path, *range, line_no, &mut block);
    }

    Ok(out)
}

/// Open `file` and extract `ranges`, labelling markers with `display_path`.
pub fn read_ranges(
    file: &Path,
    display_path: &str,
    ranges: &[LineRange],
) -> Result<String, RangeError>
{
    let handle = File::open(file).map_err(|source| RangeError::Io {
        path: display_path.to_string(),
        source,
    })?;
    extract_ranges(BufReader::new(handle), display_path, ranges)
}

fn flush_block(
    out: &mut String,
    path: &str,
    range: LineRange,
    last_line: usize,
    block: &mut String,
)
{
    let shown = LineRange { start: range.start, end: last_line.min(range.end) };
    out.push_str(&marker(path, shown));
    out.push_str(block);
    if !block.ends_with('\n')
    {
        out.push('\n');
    }
    block.clear();
}

fn describe(ranges: &[LineRange]) -> String
{
    ranges
        .iter()
        .map(|r| format!("[{r}]"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests
{
    use std::io::Cursor;

    use proptest::prelude::*;

    use super::*;

    fn r(
        start: usize,
        end: usize,
    ) -> LineRange
    {
        LineRange::new(start, end).unwrap()
    }

    #[test]
    fn coalesce_merges_overlaps_and_keeps_gaps()
    {
        let got = coalesce(vec![r(5, 10), r(1, 3), r(8, 15), r(20, 25)]);
        assert_eq!(got, vec![r(1, 3), r(5, 15), r(20, 25)]);
    }

    #[test]
    fn coalesce_merges_adjacent()
    {
        assert_eq!(coalesce(vec![r(1, 2), r(3, 4)]), vec![r(1, 4)]);
        assert_eq!(coalesce(vec![r(1, 1), r(3, 3), r(5, 5)]), vec![r(1, 1), r(3, 3), r(5, 5)]);
    }

    #[test]
    fn new_rejects_zero_and_reversed()
    {
        assert!(LineRange::new(0, 3).is_err());
        assert!(LineRange::new(4, 3).is_err());
        assert!(LineRange::new(3, 3).is_ok());
    }

    #[test]
    fn intersect_overlapping_lists()
    {
        let a = vec![r(1, 5), r(10, 20)];
        let b = vec![r(3, 12), r(18, 30)];
        assert_eq!(intersect(&a, &b), vec![r(3, 5), r(10, 12), r(18, 20)]);
        assert!(intersect(&a, &[]).is_empty());
    }

    #[test]
    fn extract_emits_markers_in_range_order()
    {
        let content = "l1\nl2\nl3\nl4\nl5\n";
        let got = extract_ranges(Cursor::new(content), "src/a.rs", &[r(1, 2), r(4, 4)]).unwrap();
        assert_eq!(got, "--- src/a.rs#1,2 ---\nl1\nl2\n--- src/a.rs#4,4 ---\nl4\n");
    }

    #[test]
    fn extract_without_ranges_is_verbatim()
    {
        let content = "a\nb";
        assert_eq!(extract_ranges(Cursor::new(content), "x", &[]).unwrap(), "a\nb");
    }

    #[test]
    fn extract_clamps_end_and_drops_ranges_past_eof()
    {
        let content = "l1\nl2\nl3";
        let got = extract_ranges(Cursor::new(content), "f", &[r(2, 9), r(20, 22)]).unwrap();
        assert_eq!(got, "--- f#2,3 ---\nl2\nl3\n");
    }

    #[test]
    fn range_ending_at_usize_max_merges_without_overflow()
    {
        let got = coalesce(vec![r(1, usize::MAX), r(2, 3)]);
        assert_eq!(got, vec![r(1, usize::MAX)]);
        assert!(is_coalesced(&got));
        assert!(!is_coalesced(&[r(1, usize::MAX), r(usize::MAX, usize::MAX)]));
    }

    #[test]
    fn extract_reads_invalid_utf8_lossily()
    {
        let content: &[u8] = b"l1\ncaf\xe9\nl3\n";
        let got = extract_ranges(Cursor::new(content), "legacy.c", &[r(2, 2)]).unwrap();
        assert_eq!(got, "--- legacy.c#2,2 ---\ncaf\u{FFFD}\n");

        let whole = extract_ranges(Cursor::new(content), "legacy.c", &[]).unwrap();
        assert!(whole.starts_with("l1\ncaf\u{FFFD}"));
    }

    #[test]
    fn extract_rejects_unmerged_ranges()
    {
        let err = extract_ranges(Cursor::new("x\n"), "f", &[r(3, 5), r(1, 2)]).unwrap_err();
        assert!(matches!(err, RangeError::NotCoalesced { .. }));
    }

    fn arb_ranges() -> impl Strategy<Value = Vec<LineRange>>
    {
        proptest::collection::vec((1usize..60, 0usize..8), 0..12).prop_map(|v| {
            v.into_iter()
                .map(|(s, len)| LineRange { start: s, end: s + len })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn coalesce_is_idempotent(ranges in arb_ranges()) {
            let once = coalesce(ranges);
            prop_assert!(is_coalesced(&once));
            prop_assert_eq!(coalesce(once.clone()), once);
        }

        #[test]
        fn coalesce_covers_each_line_exactly_once(ranges in arb_ranges()) {
            let merged = coalesce(ranges.clone());
            for line in 1..80usize {
                let covered_in = ranges.iter().any(|r| r.contains(line));
                let hits = merged.iter().filter(|r| r.contains(line)).count();
                prop_assert_eq!(hits, usize::from(covered_in));
            }
        }
    }
}
