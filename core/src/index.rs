//! Document store.
//!
//! [`SearchIndex`] owns the documents, their tokenized forms and every derived
//! structure. Each public mutation ends with a synchronous [`SearchIndex::rebuild`],
//! so readers never observe postings, norms or positions that disagree with
//! the stored documents.

use crate::config::EngineConfig;
use crate::document::{Document, Lookup, RawDocument, TokenizedDocument};
use crate::error::{IndexError, Result};
use crate::lang::{detect_or_unknown, CommandDetector, LanguageDetector, NoDetector};
use crate::positional::{self, PositionMap};
use crate::tfidf::{self, FieldSet, NormTable, PostingTable};
use crate::tokenizer::{Analyzer, Tokenizer};
use crate::DocId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

/// Everything that is persisted for an index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexState {
    /// Tokenized documents in ascending id order.
    pub collection: Vec<TokenizedDocument>,
    pub doc_cache: BTreeMap<DocId, Document>,
    /// Postings over toc, headings and content.
    pub index: PostingTable,
    pub title_index: PostingTable,
    pub norms: NormTable,
    pub title_norms: NormTable,
    pub positions_map: PositionMap,
    /// Next id handed out by [`SearchIndex::add_documents`].
    #[serde(default)]
    pub next_id: DocId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub terms: usize,
    pub title_terms: usize,
}

pub struct SearchIndex {
    pub(crate) state: IndexState,
    pub(crate) tokenizer: Box<dyn Tokenizer>,
    detector: Box<dyn LanguageDetector>,
    detect_language: bool,
    pub(crate) title_weight: f32,
}

impl Default for SearchIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::from_config(&EngineConfig::default())
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let detector: Box<dyn LanguageDetector> = match (&config.language_detector, config.detect_language) {
            (Some(cmd), true) => Box::new(CommandDetector::new(cmd.clone())),
            _ => Box::new(NoDetector),
        };
        Self {
            state: IndexState::default(),
            tokenizer: Box::new(Analyzer::new(config.stemmer)),
            detector,
            detect_language: config.detect_language,
            title_weight: config.title_weight,
        }
    }

    pub fn with_tokenizer(mut self, tokenizer: Box<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    /// Replaces the detector and turns detection on.
    pub fn with_detector(mut self, detector: Box<dyn LanguageDetector>) -> Self {
        self.detector = detector;
        self.detect_language = true;
        self
    }

    /// Installs a previously persisted state as-is.
    pub fn with_state(mut self, state: IndexState) -> Self {
        self.state = state;
        self
    }

    pub fn from_state(config: &EngineConfig, state: IndexState) -> Self {
        Self::from_config(config).with_state(state)
    }

    pub fn state(&self) -> &IndexState {
        &self.state
    }

    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.tokenizer.as_ref()
    }

    pub fn postings(&self, field: FieldSet) -> &PostingTable {
        match field {
            FieldSet::Title => &self.state.title_index,
            FieldSet::NonTitle => &self.state.index,
        }
    }

    pub fn norms(&self, field: FieldSet) -> &NormTable {
        match field {
            FieldSet::Title => &self.state.title_norms,
            FieldSet::NonTitle => &self.state.norms,
        }
    }

    pub fn positions(&self) -> &PositionMap {
        &self.state.positions_map
    }

    pub fn tokenize_document(&self, doc: &Document) -> TokenizedDocument {
        let t = &self.tokenizer;
        TokenizedDocument {
            id: doc.id,
            title: t.tokenize(&doc.title, false).tokens,
            toc: t.tokenize_all(&doc.toc, false).tokens,
            h1: t.tokenize_all(&doc.h1, false).tokens,
            h2: t.tokenize_all(&doc.h2, false).tokens,
            h3: t.tokenize_all(&doc.h3, false).tokens,
            content: t.tokenize(&doc.content, true).tokens,
            lang: doc.lang.clone(),
        }
    }

    fn detect_languages(&self, docs: &mut [Document]) {
        if !self.detect_language || docs.is_empty() {
            return;
        }
        let texts: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();
        let tags = detect_or_unknown(self.detector.as_ref(), &texts);
        for (doc, tag) in docs.iter_mut().zip(tags) {
            doc.lang = tag;
        }
    }

    /// Language of a query string, when detection is enabled and succeeds.
    pub fn detect_query_language(&self, query: &str) -> Option<String> {
        if !self.detect_language {
            return None;
        }
        detect_or_unknown(self.detector.as_ref(), &[query]).pop().flatten()
    }

    /// Adds documents under freshly assigned ids and rebuilds the index.
    pub fn add_documents(&mut self, raws: Vec<RawDocument>) -> Vec<DocId> {
        if raws.is_empty() {
            return Vec::new();
        }
        let mut docs: Vec<Document> = raws
            .into_iter()
            .map(|raw| {
                let id = self.state.next_id;
                self.state.next_id += 1;
                Document::from_raw(id, raw)
            })
            .collect();
        self.detect_languages(&mut docs);

        let ids: Vec<DocId> = docs.iter().map(|d| d.id).collect();
        tracing::info!(count = ids.len(), first_id = ids[0], "adding documents");
        for doc in docs {
            let tokenized = self.tokenize_document(&doc);
            self.state.collection.push(tokenized);
            self.state.doc_cache.insert(doc.id, doc);
        }
        self.rebuild();
        ids
    }

    pub fn add_document(&mut self, raw: RawDocument) -> DocId {
        self.add_documents(vec![raw])[0]
    }

    /// Replaces the fields of existing documents. Unknown ids are logged and
    /// skipped; the ids actually updated are returned.
    pub fn update_documents(&mut self, updates: Vec<(DocId, RawDocument)>) -> Vec<DocId> {
        let mut docs = Vec::with_capacity(updates.len());
        for (id, raw) in updates {
            if self.state.doc_cache.contains_key(&id) {
                docs.push(Document::from_raw(id, raw));
            } else {
                tracing::warn!(doc_id = id, "cannot update unknown document");
            }
        }
        if docs.is_empty() {
            return Vec::new();
        }
        self.detect_languages(&mut docs);

        let ids: Vec<DocId> = docs.iter().map(|d| d.id).collect();
        tracing::info!(count = ids.len(), "updating documents");
        for doc in docs {
            let tokenized = self.tokenize_document(&doc);
            if let Some(slot) = self.state.collection.iter_mut().find(|d| d.id == doc.id) {
                *slot = tokenized;
            }
            self.state.doc_cache.insert(doc.id, doc);
        }
        self.rebuild();
        ids
    }

    pub fn update_document(&mut self, id: DocId, raw: RawDocument) -> Result<()> {
        if self.update_documents(vec![(id, raw)]).is_empty() {
            return Err(IndexError::DocumentNotFound(id));
        }
        Ok(())
    }

    /// Removes documents; unknown ids are logged and skipped.
    pub fn remove_documents(&mut self, ids: &[DocId]) -> Vec<DocId> {
        let mut removed = Vec::new();
        for &id in ids {
            if self.state.doc_cache.remove(&id).is_none() {
                tracing::warn!(doc_id = id, "cannot remove unknown document");
                continue;
            }
            self.state.collection.retain(|d| d.id != id);
            removed.push(id);
        }
        if !removed.is_empty() {
            tracing::info!(count = removed.len(), "removed documents");
            self.rebuild();
        }
        removed
    }

    pub fn get(&self, id: DocId) -> Option<&Document> {
        let doc = self.state.doc_cache.get(&id);
        if doc.is_none() {
            tracing::warn!(doc_id = id, "document not found");
        }
        doc
    }

    /// Batch get that keeps going past missing ids.
    pub fn get_many(&self, ids: &[DocId]) -> Vec<Lookup<'_>> {
        ids.iter()
            .map(|&id| match self.state.doc_cache.get(&id) {
                Some(doc) => Lookup::Found(doc),
                None => {
                    tracing::warn!(doc_id = id, "document not found");
                    Lookup::NotFound(id)
                }
            })
            .collect()
    }

    pub fn get_tokenized(&self, id: DocId) -> Option<&TokenizedDocument> {
        self.state
            .collection
            .binary_search_by_key(&id, |d| d.id)
            .ok()
            .map(|i| &self.state.collection[i])
    }

    /// Ids of every live document, ascending.
    pub fn doc_ids(&self) -> Vec<DocId> {
        self.state.collection.iter().map(|d| d.id).collect()
    }

    pub fn len(&self) -> usize {
        self.state.collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.collection.is_empty()
    }

    pub fn max_doc_id(&self) -> Option<DocId> {
        self.state.collection.last().map(|d| d.id)
    }

    /// Vocabulary over every field of every document.
    pub fn keywords(&self) -> BTreeSet<&str> {
        let mut words = BTreeSet::new();
        for doc in &self.state.collection {
            words.extend(doc.title.iter().map(String::as_str));
            words.extend(doc.non_title_tokens().map(String::as_str));
        }
        words
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            documents: self.state.collection.len(),
            terms: self.state.index.len(),
            title_terms: self.state.title_index.len(),
        }
    }

    /// Recomputes posting tables, norms and the positional index from the
    /// current collection. The only place derived state is written.
    pub fn rebuild(&mut self) {
        let start = Instant::now();
        let state = &mut self.state;
        let (index, norms) = tfidf::build(&state.collection, FieldSet::NonTitle);
        let (title_index, title_norms) = tfidf::build(&state.collection, FieldSet::Title);
        state.index = index;
        state.norms = norms;
        state.title_index = title_index;
        state.title_norms = title_norms;
        state.positions_map = positional::build(&state.collection);

        let stats = self.stats();
        tracing::info!(
            documents = stats.documents,
            terms = stats.terms,
            title_terms = stats.title_terms,
            took_ms = start.elapsed().as_millis() as u64,
            "index rebuilt"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(title: &str, content: &str) -> RawDocument {
        RawDocument::new(title, content)
    }

    fn sample() -> SearchIndex {
        let mut index = SearchIndex::new();
        index.add_documents(vec![
            raw("Geralt of Rivia", "geralt hunts monsters"),
            raw("Witcher Lore", "geralt geralt geralt geralt rides"),
            raw("Kaer Morhen", "keep in the mountains"),
        ]);
        index
    }

    #[test]
    fn ids_are_assigned_in_order_and_never_reused() {
        let mut index = sample();
        assert_eq!(index.doc_ids(), vec![0, 1, 2]);
        index.remove_documents(&[2]);
        let id = index.add_document(raw("Ciri", "the lady of time"));
        assert_eq!(id, 3);
        assert_eq!(index.max_doc_id(), Some(3));
    }

    #[test]
    fn remove_purges_every_structure() {
        let mut index = sample();
        assert_eq!(index.remove_documents(&[1, 42]), vec![1]);

        assert!(index.get(1).is_none());
        assert!(index.get_tokenized(1).is_none());
        assert!(!index.norms(FieldSet::NonTitle).contains_key(&1));
        assert!(!index.norms(FieldSet::Title).contains_key(&1));
        for table in [index.postings(FieldSet::NonTitle), index.postings(FieldSet::Title)] {
            assert!(table.values().all(|e| e.weight(1).is_none()));
        }
        assert!(index.positions().values().all(|per_doc| !per_doc.contains_key(&1)));
        assert!(!index.positions().contains_key("ride"));

        let lookups = index.get_many(&[0, 1]);
        assert!(matches!(lookups[0], Lookup::Found(doc) if doc.id == 0));
        assert_eq!(lookups[1], Lookup::NotFound(1));
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn missing_single_lookup_is_logged() {
        let index = sample();
        let logs = Captured::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            assert!(index.get(0).is_some());
            assert!(index.get(42).is_none());
        });
        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text.matches("document not found").count(), 1);
        assert!(text.contains("doc_id=42"));
    }

    #[test]
    fn update_rewrites_tokens_and_statistics() {
        let mut index = sample();
        index
            .update_document(2, raw("Kaer Morhen", "geralt trains in the keep"))
            .unwrap();
        assert_eq!(index.get(2).unwrap().content, "geralt trains in the keep");
        assert_eq!(index.postings(FieldSet::NonTitle)["geralt"].doc_ids(), vec![0, 1, 2]);
        // geralt is now in every document
        assert_eq!(index.postings(FieldSet::NonTitle)["geralt"].idf, 0.0);
        assert!(!index.positions().contains_key("mountain"));
    }

    #[test]
    fn update_of_unknown_document_is_an_error() {
        let mut index = sample();
        let err = index.update_document(9, raw("x", "y")).unwrap_err();
        assert!(matches!(err, IndexError::DocumentNotFound(9)));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn content_is_stemmed_but_titles_are_not() {
        let mut index = SearchIndex::new();
        index.add_document(raw("Hunting Monsters", "hunting monsters"));
        let doc = index.get_tokenized(0).unwrap();
        assert_eq!(doc.title, vec!["hunting", "monsters"]);
        assert_eq!(doc.content, vec!["hunt", "monster"]);
    }

    #[test]
    fn keywords_span_all_fields() {
        let mut index = SearchIndex::new();
        let mut doc = raw("Title", "body");
        doc.toc = vec!["contents".into()];
        doc.h3 = vec!["deep".into()];
        index.add_document(doc);
        let kw = index.keywords();
        for w in ["title", "body", "contents", "deep"] {
            assert!(kw.contains(w), "{w}");
        }
    }

    struct Whitespace;

    impl Tokenizer for Whitespace {
        fn tokenize(&self, text: &str, _is_content: bool) -> crate::tokenizer::TokenStream {
            let mut stream = crate::tokenizer::TokenStream::default();
            let mut offset = 0;
            for word in text.split(' ').filter(|w| !w.is_empty()) {
                let start = offset + text[offset..].find(word).unwrap_or(0);
                offset = start + word.len();
                stream.push(word.to_string(), start..offset);
            }
            stream
        }
    }

    #[test]
    fn custom_tokenizer_is_used_for_every_field() {
        let mut index = SearchIndex::new().with_tokenizer(Box::new(Whitespace));
        index.add_document(raw("Hunting Monsters", "Hunting monsters!"));
        let doc = index.get_tokenized(0).unwrap();
        assert_eq!(doc.title, vec!["Hunting", "Monsters"]);
        assert_eq!(doc.content, vec!["Hunting", "monsters!"]);
    }

    struct FixedDetector;

    impl LanguageDetector for FixedDetector {
        fn detect(&self, texts: &[&str]) -> Result<Vec<Option<String>>> {
            Ok(texts.iter().map(|_| Some("cs".to_string())).collect())
        }
    }

    struct BrokenDetector;

    impl LanguageDetector for BrokenDetector {
        fn detect(&self, _texts: &[&str]) -> Result<Vec<Option<String>>> {
            Err(IndexError::Detector("offline".into()))
        }
    }

    #[test]
    fn detected_language_is_stored_on_both_forms() {
        let mut index = SearchIndex::new().with_detector(Box::new(FixedDetector));
        let id = index.add_document(raw("Zaklínač", "Geralt z Rivie"));
        assert_eq!(index.get(id).unwrap().lang.as_deref(), Some("cs"));
        assert_eq!(index.get_tokenized(id).unwrap().lang.as_deref(), Some("cs"));
        assert_eq!(index.detect_query_language("dotaz").as_deref(), Some("cs"));
    }

    #[test]
    fn detector_failure_does_not_abort_indexing() {
        let mut index = SearchIndex::new().with_detector(Box::new(BrokenDetector));
        let id = index.add_document(raw("Title", "body"));
        assert_eq!(index.get(id).unwrap().lang, None);
        assert_eq!(index.len(), 1);
    }
}
