//! Vector space ranking.
//!
//! Scores are cosine similarities between a TF-IDF query vector and each
//! document, computed separately against the title and non-title posting
//! tables and combined per [`FieldType`].

use crate::error::{IndexError, Result};
use crate::index::SearchIndex;
use crate::positional::{self, PositionMap};
use crate::tfidf::{term_frequencies, FieldSet, NormTable, PostingTable};
use crate::tokenizer::Tokenizer;
use crate::DocId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Which fields a query is scored against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    All,
    Title,
    Content,
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(FieldType::All),
            "title" => Ok(FieldType::Title),
            "content" => Ok(FieldType::Content),
            other => Err(format!("unknown field `{other}`, expected all, title or content")),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FieldType::All => "all",
            FieldType::Title => "title",
            FieldType::Content => "content",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    #[default]
    Plain,
    /// Adjacent terms only; same as `Proximity(1)`.
    Phrase,
    Proximity(usize),
}

impl SearchMode {
    pub fn proximity(self) -> usize {
        match self {
            SearchMode::Plain => 0,
            SearchMode::Phrase => 1,
            SearchMode::Proximity(n) => n,
        }
    }
}

/// Top-k documents with their scores, best first, plus the positional entries
/// of the query terms restricted to those documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedResults {
    pub doc_ids: Vec<DocId>,
    pub scores: Vec<f32>,
    pub positions: PositionMap,
}

impl RankedResults {
    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DocId, f32)> + '_ {
        self.doc_ids.iter().copied().zip(self.scores.iter().copied())
    }
}

/// Sum of `1 / (1 + distance)` over every pair of positions of every pair of
/// distinct terms lying at most `proximity` tokens apart, per document.
/// Documents with no such pair are absent from the result.
pub fn proximity_scores(terms: &[String], positions: &PositionMap, proximity: usize) -> BTreeMap<DocId, f32> {
    let mut scores = BTreeMap::new();
    for (i, a) in terms.iter().enumerate() {
        let Some(docs_a) = positions.get(a) else { continue };
        for b in &terms[i + 1..] {
            let Some(docs_b) = positions.get(b) else { continue };
            for (doc_id, pos_a) in docs_a {
                let Some(pos_b) = docs_b.get(doc_id) else { continue };
                for &pa in pos_a {
                    for &pb in pos_b {
                        let distance = pa.abs_diff(pb);
                        if distance <= proximity {
                            *scores.entry(*doc_id).or_insert(0.0) += 1.0 / (1.0 + distance as f32);
                        }
                    }
                }
            }
        }
    }
    scores
}

/// Query terms in first-occurrence order without repeats.
fn distinct_terms(tokens: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for t in tokens {
        if !out.contains(t) {
            out.push(t.clone());
        }
    }
    out
}

/// A query in the token forms each posting table is keyed by.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryTerms {
    /// Content-mode (stemmed) tokens; proximity pairs come from these.
    pub stemmed: Vec<String>,
    /// Tokens matched against the non-title table.
    pub non_title: Vec<String>,
    pub title: Vec<String>,
}

impl QueryTerms {
    pub fn analyze(tokenizer: &dyn Tokenizer, query: &str) -> Self {
        let stemmed = tokenizer.tokenize(query, true).tokens;
        let title = tokenizer.tokenize(query, false).tokens;
        let non_title = merge_forms(&stemmed, &title);
        Self { stemmed, non_title, title }
    }

    /// Pre-tokenized query used as-is for every table.
    pub fn from_tokens(tokens: &[String]) -> Self {
        Self { stemmed: tokens.to_vec(), non_title: tokens.to_vec(), title: tokens.to_vec() }
    }
}

/// The non-title table holds stemmed content next to unstemmed toc and
/// heading terms, so every query word contributes its stem and, when
/// stemming changed it, its plain form as well.
fn merge_forms(stemmed: &[String], plain: &[String]) -> Vec<String> {
    if stemmed.len() != plain.len() {
        let mut out = stemmed.to_vec();
        out.extend(plain.iter().filter(|t| !stemmed.contains(t)).cloned());
        return out;
    }
    let mut out = Vec::with_capacity(stemmed.len() * 2);
    for (s, p) in stemmed.iter().zip(plain) {
        out.push(s.clone());
        if s != p {
            out.push(p.clone());
        }
    }
    out
}

/// Borrowed view of the statistics a ranked query reads.
///
/// Tables a query's [`FieldType`] does not touch may be empty.
#[derive(Debug, Clone, Copy)]
pub struct Ranker<'a> {
    pub index: &'a PostingTable,
    pub norms: &'a NormTable,
    pub title_index: &'a PostingTable,
    pub title_norms: &'a NormTable,
    pub positions: &'a PositionMap,
    pub title_weight: f32,
}

impl<'a> Ranker<'a> {
    fn postings(&self, field: FieldSet) -> &'a PostingTable {
        match field {
            FieldSet::Title => self.title_index,
            FieldSet::NonTitle => self.index,
        }
    }

    fn field_norms(&self, field: FieldSet) -> &'a NormTable {
        match field {
            FieldSet::Title => self.title_norms,
            FieldSet::NonTitle => self.norms,
        }
    }

    pub fn query_vector(&self, tokens: &[String], field: FieldSet) -> BTreeMap<String, f32> {
        let postings = self.postings(field);
        term_frequencies(tokens)
            .into_iter()
            .map(|(term, tf)| {
                let idf = postings.get(&term).map(|e| e.idf).unwrap_or(0.0);
                (term, tf * idf)
            })
            .collect()
    }

    /// Cosine similarity between a query vector and one document of `field`.
    pub fn cosine_similarity(&self, query: &BTreeMap<String, f32>, doc_id: DocId, field: FieldSet) -> Result<f32> {
        let doc_norm = self
            .field_norms(field)
            .get(&doc_id)
            .copied()
            .ok_or(IndexError::InconsistentState(doc_id))?;
        let postings = self.postings(field);

        let mut dot = 0.0f32;
        let mut query_norm = 0.0f32;
        for (term, weight) in query {
            if let Some(doc_weight) = postings.get(term).and_then(|e| e.weight(doc_id)) {
                dot += weight * doc_weight;
            }
            query_norm += weight * weight;
        }
        let sim = dot / (query_norm.sqrt() * doc_norm);
        Ok(if sim.is_finite() { sim } else { 0.0 })
    }

    /// Scores every document in `doc_ids` and keeps the best `k`.
    ///
    /// With `proximity > 0` and at least two distinct terms, only documents
    /// where some pair of query terms lies within `proximity` tokens are kept,
    /// and their proximity score is added. Single-term queries skip the filter.
    pub fn rank(
        &self,
        doc_ids: &[DocId],
        query: &QueryTerms,
        k: usize,
        field: FieldType,
        proximity: usize,
    ) -> Result<RankedResults> {
        let content_query = self.query_vector(&query.non_title, FieldSet::NonTitle);
        let title_query = self.query_vector(&query.title, FieldSet::Title);

        let mut scored: Vec<(DocId, f32)> = Vec::with_capacity(doc_ids.len());
        for &id in doc_ids {
            let score = match field {
                FieldType::Content => self.cosine_similarity(&content_query, id, FieldSet::NonTitle)?,
                FieldType::Title => self.cosine_similarity(&title_query, id, FieldSet::Title)?,
                FieldType::All => {
                    self.cosine_similarity(&content_query, id, FieldSet::NonTitle)?
                        + self.title_weight * self.cosine_similarity(&title_query, id, FieldSet::Title)?
                }
            };
            scored.push((id, score));
        }

        let terms = distinct_terms(&query.stemmed);
        if proximity > 0 && terms.len() >= 2 {
            let boosts = proximity_scores(&terms, self.positions, proximity);
            scored.retain_mut(|(id, score)| match boosts.get(id) {
                Some(boost) => {
                    *score += boost;
                    true
                }
                None => false,
            });
        }

        // stable: equal scores keep ascending id order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        let doc_ids: Vec<DocId> = scored.iter().map(|(id, _)| *id).collect();
        let scores = scored.iter().map(|(_, s)| *s).collect();
        let positions = positional::restrict(self.positions, &terms, &doc_ids);
        Ok(RankedResults { doc_ids, scores, positions })
    }
}

impl SearchIndex {
    pub fn ranker(&self) -> Ranker<'_> {
        Ranker {
            index: &self.state.index,
            norms: &self.state.norms,
            title_index: &self.state.title_index,
            title_norms: &self.state.title_norms,
            positions: &self.state.positions_map,
            title_weight: self.title_weight,
        }
    }

    pub fn cosine_similarity(&self, query: &BTreeMap<String, f32>, doc_id: DocId, field: FieldSet) -> Result<f32> {
        self.ranker().cosine_similarity(query, doc_id, field)
    }

    /// Ranks every document against already normalized `tokens`.
    pub fn search(&self, tokens: &[String], k: usize, field: FieldType, proximity: usize) -> Result<RankedResults> {
        self.ranker().rank(&self.doc_ids(), &QueryTerms::from_tokens(tokens), k, field, proximity)
    }

    /// Tokenizes `query` and ranks it. The title table is queried with
    /// title-mode tokens; the non-title table with both forms.
    pub fn search_ranked(&self, query: &str, k: usize, field: FieldType, mode: SearchMode) -> Result<RankedResults> {
        let terms = QueryTerms::analyze(self.tokenizer(), query);
        tracing::debug!(query, ?terms, %field, ?mode, "ranked search");
        self.ranker().rank(&self.doc_ids(), &terms, k, field, mode.proximity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::RawDocument;

    fn index(docs: &[(&str, &str)]) -> SearchIndex {
        let mut index = SearchIndex::new();
        index.add_documents(docs.iter().map(|(t, c)| RawDocument::new(*t, *c)).collect());
        index
    }

    fn witchers() -> SearchIndex {
        index(&[
            ("Geralt of Rivia", "geralt hunts monsters"),
            ("Witcher Lore", "geralt geralt geralt geralt rides"),
            ("Kaer Morhen", "keep in the mountains"),
        ])
    }

    #[test]
    fn field_type_parses_case_insensitively() {
        assert_eq!("TITLE".parse::<FieldType>().unwrap(), FieldType::Title);
        assert_eq!("content".parse::<FieldType>().unwrap(), FieldType::Content);
        assert!("body".parse::<FieldType>().is_err());
    }

    #[test]
    fn content_prefers_repetition_all_prefers_title() {
        let index = witchers();

        let content = index.search_ranked("geralt", 10, FieldType::Content, SearchMode::Plain).unwrap();
        assert_eq!(content.doc_ids[..2], [1, 0]);
        assert!((content.scores[0] - 0.5090).abs() < 1e-3);
        assert!((content.scores[1] - 0.2525).abs() < 1e-3);

        let all = index.search_ranked("geralt", 10, FieldType::All, SearchMode::Plain).unwrap();
        assert_eq!(all.doc_ids[..2], [0, 1]);
        assert!((all.scores[0] - (0.2525 + 1.5 / 3f32.sqrt())).abs() < 1e-3);
    }

    #[test]
    fn unmatched_documents_score_zero_instead_of_nan() {
        let index = witchers();
        let res = index.search_ranked("geralt", 10, FieldType::Title, SearchMode::Plain).unwrap();
        assert_eq!(res.len(), 3);
        assert_eq!(res.doc_ids[0], 0);
        assert!(res.scores.iter().all(|s| s.is_finite()));
        assert_eq!(res.scores[1..], [0.0, 0.0]);
        // ties keep ascending id order
        assert_eq!(res.doc_ids[1..], [1, 2]);
    }

    #[test]
    fn k_is_clamped() {
        let index = witchers();
        assert_eq!(index.search_ranked("geralt", 1, FieldType::All, SearchMode::Plain).unwrap().len(), 1);
        assert_eq!(index.search_ranked("geralt", 50, FieldType::All, SearchMode::Plain).unwrap().len(), 3);
        assert!(index.search_ranked("geralt", 0, FieldType::All, SearchMode::Plain).unwrap().is_empty());
    }

    #[test]
    fn ranking_is_deterministic() {
        let index = witchers();
        let a = index.search_ranked("geralt keep", 10, FieldType::All, SearchMode::Plain).unwrap();
        let b = index.search_ranked("geralt keep", 10, FieldType::All, SearchMode::Plain).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn proximity_filters_and_boosts() {
        let index = index(&[
            ("one", "sword x silver y z"),
            ("two", "sword a b c d e f g h i silver"),
        ]);
        let res = index.search_ranked("sword silver", 10, FieldType::Content, SearchMode::Proximity(3)).unwrap();
        assert_eq!(res.doc_ids, vec![0]);
        let plain = index.search_ranked("sword silver", 10, FieldType::Content, SearchMode::Plain).unwrap();
        assert!((res.scores[0] - plain.scores[0] - 1.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn phrase_requires_adjacency() {
        let index = index(&[("a", "white wolf howls"), ("b", "white old wolf")]);
        let res = index.search_ranked("white wolf", 10, FieldType::All, SearchMode::Phrase).unwrap();
        assert_eq!(res.doc_ids, vec![0]);
    }

    #[test]
    fn single_term_proximity_does_not_filter() {
        let index = witchers();
        let res = index.search_ranked("geralt", 10, FieldType::Content, SearchMode::Proximity(2)).unwrap();
        let plain = index.search_ranked("geralt", 10, FieldType::Content, SearchMode::Plain).unwrap();
        assert_eq!(res, plain);
    }

    #[test]
    fn positions_are_restricted_to_results() {
        let index = witchers();
        let res = index.search_ranked("geralt", 1, FieldType::Content, SearchMode::Plain).unwrap();
        assert_eq!(res.positions["geralt"].keys().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(res.positions["geralt"][&1], vec![0, 1, 2, 3]);
    }

    #[test]
    fn missing_norm_is_an_inconsistency() {
        let mut index = witchers();
        index.state.norms.remove(&2);
        let err = index.search_ranked("geralt", 10, FieldType::Content, SearchMode::Plain).unwrap_err();
        assert!(matches!(err, IndexError::InconsistentState(2)));
    }

    #[test]
    fn proximity_scores_sum_every_close_pair() {
        let mut positions = PositionMap::new();
        positions.entry("a".into()).or_default().insert(0, vec![0, 4]);
        positions.entry("b".into()).or_default().insert(0, vec![1]);
        let scores = proximity_scores(&["a".into(), "b".into()], &positions, 3);
        // distances 1 and 3
        assert!((scores[&0] - (0.5 + 0.25)).abs() < 1e-6);
    }

    #[test]
    fn heading_only_match_is_ranked() {
        let mut kaer = RawDocument::new("Kaer Morhen", "a keep in the north");
        kaer.h2 = vec!["Monsters".into()];
        let mut index = SearchIndex::new();
        index.add_documents(vec![kaer, RawDocument::new("Roach", "a horse on the road")]);

        let res = index.search_ranked("monsters", 10, FieldType::Content, SearchMode::Plain).unwrap();
        assert_eq!(res.doc_ids, vec![0, 1]);
        assert!(res.scores[0] > 0.0);
        assert_eq!(res.scores[1], 0.0);
        assert_eq!(index.search_boolean("monsters", FieldType::Content).doc_ids, vec![0]);
    }

    #[test]
    fn stemmed_and_plain_forms_are_both_queried() {
        let terms = QueryTerms::analyze(&crate::tokenizer::Analyzer::default(), "Biography of geralt");
        assert_eq!(terms.stemmed, vec!["biographi", "of", "geralt"]);
        assert_eq!(terms.title, vec!["biography", "of", "geralt"]);
        assert_eq!(terms.non_title, vec!["biographi", "biography", "of", "geralt"]);
    }

    #[test]
    fn pre_tokenized_search_and_direct_cosine() {
        let index = witchers();
        let tokens = vec!["geralt".to_string()];
        let res = index.search(&tokens, 10, FieldType::Content, 0).unwrap();
        assert_eq!(res, index.search_ranked("geralt", 10, FieldType::Content, SearchMode::Plain).unwrap());

        let query = index.ranker().query_vector(&tokens, FieldSet::NonTitle);
        let sim = index.cosine_similarity(&query, 1, FieldSet::NonTitle).unwrap();
        assert!((sim - res.scores[0]).abs() < 1e-6);
        assert_eq!(index.cosine_similarity(&query, 2, FieldSet::NonTitle).unwrap(), 0.0);
    }
}
