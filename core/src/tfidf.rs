//! TF-IDF posting statistics.
//!
//! One builder serves both posting tables; [`FieldSet`] selects which token
//! fields of a [`TokenizedDocument`] are counted.

use crate::document::TokenizedDocument;
use crate::DocId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which fields a posting table is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldSet {
    Title,
    /// toc + h1 + h2 + h3 + content
    NonTitle,
}

/// Postings of one term.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostingEntry {
    /// Collection-wide IDF, shared by every document in `doc_tf_idf`.
    pub idf: f32,
    /// (document, TF-IDF weight) sorted by document id.
    pub doc_tf_idf: Vec<(DocId, f32)>,
}

impl PostingEntry {
    pub fn weight(&self, doc_id: DocId) -> Option<f32> {
        self.doc_tf_idf
            .binary_search_by_key(&doc_id, |(id, _)| *id)
            .ok()
            .map(|i| self.doc_tf_idf[i].1)
    }

    pub fn doc_ids(&self) -> Vec<DocId> {
        self.doc_tf_idf.iter().map(|(id, _)| *id).collect()
    }
}

pub type PostingTable = BTreeMap<String, PostingEntry>;
pub type NormTable = BTreeMap<DocId, f32>;

fn field_tokens(doc: &TokenizedDocument, field: FieldSet) -> Box<dyn Iterator<Item = &String> + '_> {
    match field {
        FieldSet::Title => Box::new(doc.title.iter()),
        FieldSet::NonTitle => Box::new(doc.non_title_tokens()),
    }
}

/// Log-dampened term frequency: `1 + log10(count)` for every term present.
pub fn term_frequencies<'a, I>(tokens: I) -> BTreeMap<String, f32>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    for token in tokens {
        *counts.entry(token.clone()).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(term, count)| (term, 1.0 + (count as f32).log10()))
        .collect()
}

/// `log10(n / df)`; zero for an empty collection.
pub fn idf(n: usize, df: usize) -> f32 {
    if n == 0 || df == 0 {
        return 0.0;
    }
    (n as f32 / df as f32).log10()
}

/// Computes the posting table and per-document L2 norms for `field`.
///
/// Every document of `collection` receives a norm entry, including documents
/// with no tokens in the selected fields (norm 0).
pub fn build(collection: &[TokenizedDocument], field: FieldSet) -> (PostingTable, NormTable) {
    let n = collection.len();

    let mut df: BTreeMap<&str, usize> = BTreeMap::new();
    let mut doc_tfs: Vec<(DocId, BTreeMap<String, f32>)> = Vec::with_capacity(n);
    for doc in collection {
        let tf = term_frequencies(field_tokens(doc, field));
        doc_tfs.push((doc.id, tf));
    }
    for (_, tf) in &doc_tfs {
        for term in tf.keys() {
            *df.entry(term.as_str()).or_insert(0) += 1;
        }
    }
    let idfs: BTreeMap<String, f32> = df
        .into_iter()
        .map(|(term, df_t)| (term.to_string(), idf(n, df_t)))
        .collect();

    let mut postings = PostingTable::new();
    let mut norms = NormTable::new();
    for (doc_id, tf) in doc_tfs {
        let mut norm = 0.0f32;
        for (term, tf_t) in tf {
            let term_idf = idfs.get(&term).copied().unwrap_or(0.0);
            let weight = tf_t * term_idf;
            norm += weight * weight;
            postings
                .entry(term)
                .or_insert_with(|| PostingEntry { idf: term_idf, doc_tf_idf: Vec::new() })
                .doc_tf_idf
                .push((doc_id, weight));
        }
        norms.insert(doc_id, norm.sqrt());
    }

    // Collections are kept in id order, but a loaded or hand-built collection
    // may not be; lookups binary-search on the id.
    for entry in postings.values_mut() {
        entry.doc_tf_idf.sort_by_key(|(id, _)| *id);
    }

    (postings, norms)
}
