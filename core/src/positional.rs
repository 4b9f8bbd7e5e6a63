use crate::document::TokenizedDocument;
use crate::DocId;
use std::collections::{BTreeMap, BTreeSet};

/// term -> document -> ascending content-token offsets
pub type PositionMap = BTreeMap<String, BTreeMap<DocId, Vec<usize>>>;

/// Builds the positional index from the content field of every document.
pub fn build(collection: &[TokenizedDocument]) -> PositionMap {
    let mut map = PositionMap::new();
    for doc in collection {
        for (offset, term) in doc.content.iter().enumerate() {
            map.entry(term.clone())
                .or_default()
                .entry(doc.id)
                .or_default()
                .push(offset);
        }
    }
    map
}

/// Entries of `terms` limited to the documents in `doc_ids`.
///
/// Terms unknown to the index are left out; known terms with no remaining
/// documents are kept with an empty map.
pub fn restrict<'a, I>(map: &PositionMap, terms: I, doc_ids: &[DocId]) -> PositionMap
where
    I: IntoIterator<Item = &'a String>,
{
    let keep: BTreeSet<DocId> = doc_ids.iter().copied().collect();
    let mut out = PositionMap::new();
    for term in terms {
        if let Some(per_doc) = map.get(term) {
            let filtered = per_doc
                .iter()
                .filter(|(id, _)| keep.contains(id))
                .map(|(id, pos)| (*id, pos.clone()))
                .collect();
            out.insert(term.clone(), filtered);
        }
    }
    out
}
