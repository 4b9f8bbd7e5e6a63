use crate::config::StemmerLanguage;
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::Stemmer;
use std::collections::BTreeMap;
use std::ops::Range;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)[\p{L}\p{N}][\p{L}\p{N}_']*").expect("valid regex");
}

/// Normalized tokens of one text field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStream {
    pub tokens: Vec<String>,
    /// term -> offsets into `tokens`
    pub positions: BTreeMap<String, Vec<usize>>,
    /// Byte range of every token in the source text.
    pub spans: Vec<Range<usize>>,
}

impl TokenStream {
    pub fn push(&mut self, term: String, span: Range<usize>) {
        self.positions.entry(term.clone()).or_default().push(self.tokens.len());
        self.tokens.push(term);
        self.spans.push(span);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Text normalization boundary used by the index.
pub trait Tokenizer: Send + Sync {
    /// Splits `text` into normalized tokens. Content fields may receive heavier
    /// normalization (stemming) than titles, headings and query terms.
    fn tokenize(&self, text: &str, is_content: bool) -> TokenStream;

    /// Tokenizes a multi-valued field (toc, headings) as one space-joined text.
    fn tokenize_all(&self, parts: &[String], is_content: bool) -> TokenStream {
        self.tokenize(&parts.join(" "), is_content)
    }
}

/// Default tokenizer: NFKC normalization, lowercase, and Snowball stemming for
/// content fields. Stopwords are kept so positional distances stay exact.
pub struct Analyzer {
    stemmer: Stemmer,
}

impl Analyzer {
    pub fn new(language: StemmerLanguage) -> Self {
        Self { stemmer: Stemmer::create(language.into()) }
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(StemmerLanguage::English)
    }
}

impl Tokenizer for Analyzer {
    fn tokenize(&self, text: &str, is_content: bool) -> TokenStream {
        let mut stream = TokenStream::default();
        for mat in RE.find_iter(text) {
            let normalized = mat.as_str().nfkc().collect::<String>().to_lowercase();
            let term = if is_content {
                self.stemmer.stem(&normalized).into_owned()
            } else {
                normalized
            };
            stream.push(term, mat.range());
        }
        stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = Analyzer::default().tokenize("Running, runner's run!", true);
        assert!(t.tokens.iter().any(|w| w == "run"));
    }

    #[test]
    fn only_content_is_stemmed() {
        let a = Analyzer::default();
        assert_eq!(a.tokenize("Running", false).tokens, vec!["running"]);
        assert_eq!(a.tokenize("Running", true).tokens, vec!["run"]);
    }

    #[test]
    fn spans_point_into_source() {
        let text = "Geralt, of   Rivia!";
        let t = Analyzer::default().tokenize(text, false);
        let words: Vec<&str> = t.spans.iter().map(|s| &text[s.clone()]).collect();
        assert_eq!(words, vec!["Geralt", "of", "Rivia"]);
    }
}
