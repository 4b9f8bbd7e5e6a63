//! TREC-style run files for relevance evaluation.

use crate::error::Result;
use crate::index::SearchIndex;
use crate::loader::{EvalQuery, ExternalDocument};
use crate::ranker::{FieldType, SearchMode};
use crate::DocId;
use std::collections::BTreeMap;

pub const RUN_TAG: &str = "runindex1";

/// Indexes a CSV collection and returns the mapping back to external ids.
pub fn index_collection(index: &mut SearchIndex, docs: Vec<ExternalDocument>) -> BTreeMap<DocId, String> {
    let (external, raws): (Vec<String>, Vec<_>) = docs.into_iter().map(|d| (d.external_id, d.raw)).unzip();
    let ids = index.add_documents(raws);
    ids.into_iter().zip(external).collect()
}

/// One `qid Q0 d<docid> rank score runindex1` line per hit, ranks from 1.
///
/// Queries are run on their title over all fields. Documents without an
/// entry in `external_ids` are reported under their internal id.
pub fn trec_run(
    index: &SearchIndex,
    queries: &[EvalQuery],
    external_ids: &BTreeMap<DocId, String>,
    k: usize,
) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for query in queries {
        let results = index.search_ranked(&query.title, k, FieldType::All, SearchMode::Plain)?;
        tracing::debug!(qid = %query.id, hits = results.len(), "evaluated query");
        for (rank, (doc_id, score)) in results.iter().enumerate() {
            let doc = external_ids.get(&doc_id).cloned().unwrap_or_else(|| doc_id.to_string());
            lines.push(format!("{} Q0 d{} {} {:.6} {}", query.id, doc, rank + 1, score, RUN_TAG));
        }
    }
    Ok(lines)
}
