use regex::Regex;

use super::{word_count, RawPage, Unit};

const SENTENCE_END: &str = r#"([.!?]+["'”’)\]]*)\s+"#;
const HEADING: &str =
    r"(?m)^[ \t]*(?:#{1,6}[ \t]+\S|(?:Chapter|CHAPTER|Part|PART)[ \t]+[0-9IVXLC]+\b)";

/// Greedily packs raw pages towards a word target, then hard-splits any unit
/// that still ends up above `target * oversize_ratio`.
pub struct LengthBalancer {
    target_words: usize,
    oversize_ratio: f64,
    sentence_end: Regex,
    heading: Regex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Boundary {
    SentenceEnd,
    Heading,
}

impl LengthBalancer {
    pub fn new(target_words: usize, oversize_ratio: f64) -> Self {
        Self {
            target_words: target_words.max(1),
            oversize_ratio: oversize_ratio.max(1.0),
            sentence_end: Regex::new(SENTENCE_END).expect("sentence pattern is valid"),
            heading: Regex::new(HEADING).expect("heading pattern is valid"),
        }
    }

    pub fn target_words(&self) -> usize {
        self.target_words
    }

    pub fn threshold(&self) -> usize {
        (self.target_words as f64 * self.oversize_ratio).floor() as usize
    }

    pub fn balance(&self, pages: &[RawPage]) -> Vec<Unit> {
        let mut packed: Vec<(std::ops::Range<usize>, String)> = Vec::new();
        let mut current = String::new();
        let mut current_words = 0;
        let mut first_page = 0;
        let mut last_page = 0;

        for page in pages {
            let page_words = word_count(&page.text);
            if !current.is_empty() && current_words + page_words >= self.target_words {
                packed.push((first_page..last_page + 1, std::mem::take(&mut current)));
                current_words = 0;
            }
            if current.is_empty() {
                first_page = page.index;
            } else {
                current.push_str("\n\n");
            }
            current.push_str(&page.text);
            current_words += page_words;
            last_page = page.index;
        }
        if !current.trim().is_empty() {
            packed.push((first_page..last_page + 1, current));
        }

        let threshold = self.threshold();
        let mut units = Vec::new();
        for (pages, text) in packed {
            if word_count(&text) > threshold {
                let pieces = self.hard_split(&text);
                log::debug!(
                    "Unit over {} words from pages {:?} hard-split into {} pieces",
                    threshold,
                    pages,
                    pieces.len()
                );
                for piece in pieces {
                    units.push(Unit::new(units.len(), pages.clone(), piece));
                }
            } else {
                units.push(Unit::new(units.len(), pages, text));
            }
        }
        units
    }

    /// Cuts `text` into pieces of at most `threshold` words, preferring the
    /// boundary closest to the target word offset.
    pub fn hard_split(&self, text: &str) -> Vec<String> {
        let threshold = self.threshold();
        let mut pieces = Vec::new();
        let mut rest = text.trim();

        while word_count(rest) > threshold {
            let cut = self.cut_point(rest);
            let (head, tail) = rest.split_at(cut);
            let head = head.trim();
            if !head.is_empty() {
                pieces.push(head.to_string());
            }
            rest = tail.trim_start();
        }
        if !rest.is_empty() {
            pieces.push(rest.to_string());
        }
        pieces
    }

    /// Byte offset to cut `rest` at. Only called when `rest` holds more than
    /// `target_words` words, so the offset is always inside the text.
    fn cut_point(&self, rest: &str) -> usize {
        let target_offset = match word_end(rest, self.target_words) {
            Some(offset) => offset,
            None => return rest.len(),
        };

        let sentences = self
            .sentence_end
            .captures_iter(rest)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.end())
            .take_while(|&end| end <= target_offset)
            .map(|end| (end, Boundary::SentenceEnd));
        let headings = self
            .heading
            .find_iter(rest)
            .map(|m| m.start())
            .take_while(|&start| start <= target_offset)
            .map(|start| (start, Boundary::Heading));

        sentences
            .chain(headings)
            .filter(|&(at, _)| at > 0 && !rest[..at].trim().is_empty())
            .max()
            .map(|(at, _)| at)
            .unwrap_or(target_offset)
    }
}

/// Byte offset just past the `n`-th whitespace-delimited word.
fn word_end(text: &str, n: usize) -> Option<usize> {
    let mut words = 0;
    let mut in_word = false;
    for (at, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if in_word {
                words += 1;
                if words == n {
                    return Some(at);
                }
            }
            in_word = false;
        } else {
            in_word = true;
        }
    }
    if in_word && words + 1 == n {
        return Some(text.len());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(index: usize, text: String) -> RawPage {
        RawPage { index, text }
    }

    fn words(n: usize, word: &str) -> String {
        vec![word; n].join(" ")
    }

    fn squash(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn packs_pages_until_target_is_reached() {
        let balancer = LengthBalancer::new(100, 1.5);
        let pages: Vec<RawPage> = (0..3).map(|i| raw(i, words(40, "word"))).collect();

        let units = balancer.balance(&pages);

        let sizes: Vec<usize> = units.iter().map(|u| u.word_count).collect();
        assert_eq!(sizes, vec![80, 40]);
        assert_eq!(units[0].pages, 0..2);
        assert_eq!(units[1].pages, 2..3);
        assert_eq!(units[1].index, 1);
    }

    #[test]
    fn page_reaching_target_exactly_starts_a_new_unit() {
        let balancer = LengthBalancer::new(100, 1.5);
        let pages = vec![raw(0, words(50, "a")), raw(1, words(50, "b"))];

        let sizes: Vec<usize> = balancer
            .balance(&pages)
            .iter()
            .map(|u| u.word_count)
            .collect();

        assert_eq!(sizes, vec![50, 50]);
    }

    #[test]
    fn large_first_page_is_not_preceded_by_an_empty_unit() {
        let balancer = LengthBalancer::new(100, 1.5);
        let pages = vec![raw(0, words(120, "a")), raw(1, words(10, "b"))];

        let units = balancer.balance(&pages);

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].word_count, 120);
    }

    #[test]
    fn oversized_unit_without_sentences_is_cut_at_word_offset() {
        let balancer = LengthBalancer::new(100, 1.5);
        let pages = vec![raw(0, words(500, "lorem"))];

        let units = balancer.balance(&pages);

        assert!(units.len() >= 4);
        for unit in &units {
            assert!(unit.word_count <= 150, "unit has {} words", unit.word_count);
            assert_eq!(unit.pages, 0..1);
        }
        let total: usize = units.iter().map(|u| u.word_count).sum();
        assert_eq!(total, 500);
        let joined: Vec<String> = units.iter().map(|u| u.text.clone()).collect();
        assert_eq!(squash(&joined.join(" ")), squash(&words(500, "lorem")));
    }

    #[test]
    fn hard_split_prefers_sentence_ends() {
        let balancer = LengthBalancer::new(100, 1.5);
        // 25 sentences of 20 words each.
        let sentence = format!("{} end.", words(19, "w"));
        let text = vec![sentence.as_str(); 25].join(" ");

        let pieces = balancer.hard_split(&text);

        assert!(pieces.len() >= 4);
        for piece in &pieces {
            assert!(word_count(piece) <= 150);
            assert!(piece.ends_with("end."), "cut mid-sentence: {}", piece);
        }
        assert_eq!(squash(&pieces.join(" ")), squash(&text));
    }

    #[test]
    fn hard_split_uses_latest_boundary_before_target() {
        let balancer = LengthBalancer::new(10, 1.5);
        let text = format!(
            "{} one. {} two. {}",
            words(3, "a"),
            words(4, "b"),
            words(20, "c")
        );

        let pieces = balancer.hard_split(&text);

        assert_eq!(pieces[0], format!("{} one. {} two.", words(3, "a"), words(4, "b")));
    }

    #[test]
    fn hard_split_cuts_before_headings() {
        let balancer = LengthBalancer::new(10, 1.5);
        let text = format!("{}\n# Chapter Two\n{}", words(6, "x"), words(20, "y"));

        let pieces = balancer.hard_split(&text);

        assert_eq!(pieces[0], words(6, "x"));
        assert!(pieces[1].starts_with("# Chapter Two"));
        for piece in &pieces {
            assert!(word_count(piece) <= 15);
        }
    }

    #[test]
    fn hard_split_is_char_boundary_safe() {
        let balancer = LengthBalancer::new(5, 1.0);
        let text = words(23, "größe—ü");

        let pieces = balancer.hard_split(&text);

        assert_eq!(pieces.len(), 5);
        assert_eq!(squash(&pieces.join(" ")), text);
    }

    #[test]
    fn unit_at_threshold_is_left_alone() {
        let balancer = LengthBalancer::new(100, 1.5);
        let pages = vec![raw(0, words(150, "ok"))];

        let units = balancer.balance(&pages);

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].word_count, 150);
    }

    #[test]
    fn word_end_finds_offsets() {
        assert_eq!(word_end("a bb ccc", 2), Some(4));
        assert_eq!(word_end("a bb ccc", 3), Some(8));
        assert_eq!(word_end("  a  ", 1), Some(3));
        assert_eq!(word_end("a bb", 3), None);
    }
}
