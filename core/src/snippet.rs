//! Best-window snippet extraction.

use crate::document::Document;
use crate::index::SearchIndex;
use crate::positional::PositionMap;
use crate::tokenizer::TokenStream;
use crate::DocId;
use serde::Serialize;
use std::collections::BTreeSet;

/// Token range `[start, end]` of a document's content and the number of
/// distinct matched terms inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: usize,
    pub end: usize,
    pub distinct: usize,
}

/// Picks the window of `window_size` tokens holding the most distinct matched
/// terms. Candidates are centred on each match of `doc_id` and clamped to the
/// document; the first best candidate wins ties.
///
/// Returns `None` when the document has no tokens or `window_size` is zero.
pub fn best_window(words: &[String], doc_id: DocId, positions: &PositionMap, window_size: usize) -> Option<Window> {
    let size = window_size.min(words.len());
    if size == 0 {
        return None;
    }
    let last = words.len() - 1;
    let mut best = Window { start: 0, end: size - 1, distinct: 0 };

    for per_doc in positions.values() {
        let Some(offsets) = per_doc.get(&doc_id) else { continue };
        for &pos in offsets {
            let start = pos.saturating_sub(size / 2);
            let end = last.min(start + size - 1);
            let start = (end + 1).saturating_sub(size);

            let distinct = words[start..=end]
                .iter()
                .filter(|w| positions.contains_key(w.as_str()))
                .collect::<BTreeSet<_>>()
                .len();
            if distinct > best.distinct {
                best = Window { start, end, distinct };
            }
        }
    }
    Some(best)
}

/// Offsets, relative to `window.start`, of tokens that are matched terms.
pub fn highlight_offsets(words: &[String], window: &Window, positions: &PositionMap) -> Vec<usize> {
    words[window.start..=window.end]
        .iter()
        .enumerate()
        .filter(|(_, w)| positions.contains_key(w.as_str()))
        .map(|(i, _)| i)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snippet {
    /// Original content text covered by the window.
    pub text: String,
    /// Window-relative token offsets of matched terms.
    pub highlights: Vec<usize>,
    /// Byte ranges of the highlighted tokens within `text`.
    pub marks: Vec<(usize, usize)>,
}

impl Snippet {
    /// Wraps every highlighted token in `open` / `close`.
    pub fn marked(&self, open: &str, close: &str) -> String {
        let mut out = String::with_capacity(self.text.len());
        let mut last = 0;
        for &(s, e) in &self.marks {
            out.push_str(&self.text[last..s]);
            out.push_str(open);
            out.push_str(&self.text[s..e]);
            out.push_str(close);
            last = e;
        }
        out.push_str(&self.text[last..]);
        out
    }
}

/// Renders the snippet of `doc` around the matches in `positions`.
///
/// `words` are the indexed content tokens and `stream` the content
/// re-tokenized with spans. The text is sliced from the untouched content, so
/// casing and punctuation survive; when the two token sequences disagree the
/// window is rendered from the indexed tokens instead.
pub fn render(doc: &Document, words: &[String], stream: &TokenStream, positions: &PositionMap, window_size: usize) -> Snippet {
    let Some(window) = best_window(words, doc.id, positions, window_size) else {
        return Snippet::default();
    };
    let highlights = highlight_offsets(words, &window, positions);

    if stream.len() != words.len() {
        tracing::warn!(doc_id = doc.id, "stored tokens do not match content, rendering from tokens");
        let text = words[window.start..=window.end].join(" ");
        return Snippet { text, highlights, marks: Vec::new() };
    }

    let base = stream.spans[window.start].start;
    let text = doc.content[base..stream.spans[window.end].end].to_string();
    let marks = highlights
        .iter()
        .map(|&i| {
            let span = &stream.spans[window.start + i];
            (span.start - base, span.end - base)
        })
        .collect();
    Snippet { text, highlights, marks }
}

impl SearchIndex {
    /// Snippet of `doc_id` around the matches in `positions`; `None` for an
    /// unknown document.
    pub fn snippet(&self, doc_id: DocId, positions: &PositionMap, window_size: usize) -> Option<Snippet> {
        let doc = self.get(doc_id)?;
        let tokenized = self.get_tokenized(doc_id)?;
        let stream = self.tokenizer.tokenize(&doc.content, true);
        Some(render(doc, &tokenized.content, &stream, positions, window_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::RawDocument;
    use crate::ranker::{FieldType, SearchMode};

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    fn positions(entries: &[(&str, DocId, &[usize])]) -> PositionMap {
        let mut map = PositionMap::new();
        for (term, doc, offsets) in entries {
            map.entry(term.to_string()).or_default().insert(*doc, offsets.to_vec());
        }
        map
    }

    #[test]
    fn window_is_clamped_to_short_documents() {
        let w = words("a b c");
        let pos = positions(&[("b", 0, &[1])]);
        let win = best_window(&w, 0, &pos, 20).unwrap();
        assert_eq!((win.start, win.end, win.distinct), (0, 2, 1));
        assert_eq!(highlight_offsets(&w, &win, &pos), vec![1]);
    }

    #[test]
    fn window_with_most_distinct_terms_wins() {
        let w = words("x a x x x x x x b x c x");
        let pos = positions(&[("a", 0, &[1]), ("b", 0, &[8]), ("c", 0, &[10])]);
        let win = best_window(&w, 0, &pos, 4).unwrap();
        assert_eq!(win.distinct, 2);
        assert!(win.start <= 8 && win.end >= 10);
        assert_eq!(win.end - win.start + 1, 4);
    }

    #[test]
    fn window_near_the_end_is_shifted_back() {
        let w = words("a b c d e f");
        let pos = positions(&[("f", 0, &[5])]);
        let win = best_window(&w, 0, &pos, 4).unwrap();
        assert_eq!((win.start, win.end), (2, 5));
    }

    #[test]
    fn empty_inputs_have_no_window() {
        let pos = positions(&[("a", 0, &[0])]);
        assert!(best_window(&[], 0, &pos, 5).is_none());
        assert!(best_window(&words("a"), 0, &pos, 0).is_none());
    }

    #[test]
    fn other_documents_are_ignored() {
        let w = words("a b c d e f");
        let pos = positions(&[("f", 7, &[5])]);
        let win = best_window(&w, 0, &pos, 2).unwrap();
        assert_eq!((win.start, win.end, win.distinct), (0, 1, 0));
    }

    #[test]
    fn snippet_keeps_original_text() {
        let mut index = SearchIndex::new();
        index.add_document(RawDocument::new(
            "Roach",
            "Geralt's horse, Roach, is always called Roach. Nobody knows why!",
        ));
        let res = index.search_ranked("roach", 10, FieldType::Content, SearchMode::Plain).unwrap();
        let snippet = index.snippet(0, &res.positions, 4).unwrap();
        assert_eq!(snippet.text, "Geralt's horse, Roach, is");
        assert_eq!(snippet.highlights, vec![2]);
        assert_eq!(snippet.marked("<em>", "</em>"), "Geralt's horse, <em>Roach</em>, is");
    }

    #[test]
    fn snippet_of_unknown_document_is_none() {
        let index = SearchIndex::new();
        assert!(index.snippet(3, &PositionMap::new(), 10).is_none());
    }
}
