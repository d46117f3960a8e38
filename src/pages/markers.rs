use std::fmt;
use std::str::FromStr;

use regex::Regex;

use super::RawPage;
use crate::error::Error;

/// Matches `<span id="page-12-0"></span>`, the self-closing form, or a bare
/// opening tag. Anything else that merely looks like a marker stays text.
const MARKER_PATTERN: &str = r#"<span\s+id="page-\d+-\d+"\s*/?>(?:\s*</span>)?"#;

pub struct MarkerSplitter {
    marker: Regex,
}

impl MarkerSplitter {
    pub fn new() -> Self {
        Self {
            marker: Regex::new(MARKER_PATTERN).expect("marker pattern is valid"),
        }
    }

    pub fn split(&self, document: &str) -> Vec<RawPage> {
        self.marker
            .split(document)
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .enumerate()
            .map(|(index, text)| RawPage {
                index,
                text: text.to_string(),
            })
            .collect()
    }

    /// Inverse of `split` for documents assembled from separate sources.
    pub fn marker(major: usize, minor: usize) -> String {
        format!(r#"<span id="page-{}-{}"></span>"#, major, minor)
    }
}

impl Default for MarkerSplitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Half-open `[start, end)` window over raw pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: usize,
    pub end: usize,
}

impl PageRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn select(&self, pages: Vec<RawPage>) -> Vec<RawPage> {
        let end = self.end.min(pages.len());
        if self.start >= end {
            return Vec::new();
        }
        pages
            .into_iter()
            .skip(self.start)
            .take(end - self.start)
            .collect()
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.end == usize::MAX {
            write!(f, "[{}, end)", self.start)
        } else {
            write!(f, "[{}, {})", self.start, self.end)
        }
    }
}

impl FromStr for PageRange {
    type Err = Error;

    /// Accepts `2:4`, `2-4` and the open-ended `2:`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::PageRange(s.to_string());
        let (start, end) = s
            .split_once(':')
            .or_else(|| s.split_once('-'))
            .ok_or_else(invalid)?;

        let start = start.trim().parse::<usize>().map_err(|_| invalid())?;
        let end = match end.trim() {
            "" => usize::MAX,
            end => end.parse::<usize>().map_err(|_| invalid())?,
        };
        Ok(Self { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(pages: &[RawPage]) -> Vec<&str> {
        pages.iter().map(|p| p.text.as_str()).collect()
    }

    #[test]
    fn splits_at_markers_and_drops_them() {
        let splitter = MarkerSplitter::new();
        let doc = r#"A.<span id="page-0-0"></span>B.<span id="page-1-0"></span>C."#;

        let pages = splitter.split(doc);

        assert_eq!(texts(&pages), vec!["A.", "B.", "C."]);
        assert_eq!(pages[2].index, 2);
    }

    #[test]
    fn accepts_open_and_self_closing_tags() {
        let splitter = MarkerSplitter::new();
        let doc = "A.\n<span id=\"page-0-0\">\nB.\n<span id=\"page-7-3\"/>\nC.";

        assert_eq!(texts(&splitter.split(doc)), vec!["A.", "B.", "C."]);
    }

    #[test]
    fn marker_numbers_do_not_affect_order() {
        let splitter = MarkerSplitter::new();
        let doc = format!(
            "first{}second{}third",
            MarkerSplitter::marker(9, 9),
            MarkerSplitter::marker(0, 0)
        );

        assert_eq!(texts(&splitter.split(&doc)), vec!["first", "second", "third"]);
    }

    #[test]
    fn malformed_markers_stay_in_text() {
        let splitter = MarkerSplitter::new();
        let doc = r#"one <span id="page-a-1"></span> two <span id="page-3"></span> three"#;

        let pages = splitter.split(doc);

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].text, doc);
    }

    #[test]
    fn no_markers_yields_trimmed_document() {
        let splitter = MarkerSplitter::new();

        let pages = splitter.split("  \n Just one page of text.\n\n");

        assert_eq!(texts(&pages), vec!["Just one page of text."]);
    }

    #[test]
    fn blank_segments_are_discarded() {
        let splitter = MarkerSplitter::new();
        let doc = format!(
            "{m}  \n{m}A{m}\n\t{m}B{m}",
            m = MarkerSplitter::marker(1, 0)
        );

        assert_eq!(texts(&splitter.split(&doc)), vec!["A", "B"]);
        assert!(splitter.split("   \n ").is_empty());
    }

    #[test]
    fn range_keeps_half_open_window() {
        let pages: Vec<RawPage> = (0..10)
            .map(|index| RawPage {
                index,
                text: format!("page {}", index),
            })
            .collect();

        let kept = PageRange::new(2, 4).select(pages);

        assert_eq!(texts(&kept), vec!["page 2", "page 3"]);
        assert_eq!(kept[0].index, 2);
    }

    #[test]
    fn range_is_clamped() {
        let pages: Vec<RawPage> = (0..3)
            .map(|index| RawPage {
                index,
                text: index.to_string(),
            })
            .collect();

        assert_eq!(PageRange::new(1, 99).select(pages.clone()).len(), 2);
        assert!(PageRange::new(5, 9).select(pages.clone()).is_empty());
        assert!(PageRange::new(2, 1).select(pages).is_empty());
    }

    #[test]
    fn parses_ranges() {
        assert_eq!("2:4".parse::<PageRange>().unwrap(), PageRange::new(2, 4));
        assert_eq!("2-4".parse::<PageRange>().unwrap(), PageRange::new(2, 4));
        assert_eq!(
            "3:".parse::<PageRange>().unwrap(),
            PageRange::new(3, usize::MAX)
        );
        assert!("four".parse::<PageRange>().is_err());
        assert!("1:x".parse::<PageRange>().is_err());
    }

    #[test]
    fn open_range_displays_without_sentinel() {
        assert_eq!(PageRange::new(2, 4).to_string(), "[2, 4)");
        assert_eq!("3:".parse::<PageRange>().unwrap().to_string(), "[3, end)");
    }
}
