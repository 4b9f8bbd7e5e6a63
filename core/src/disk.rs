//! Disk-resident search over the file-based layout.
//!
//! [`DiskIndex`] keeps only the directory path in memory; opening it checks
//! `meta.json`. Every query loads the parts it reads (posting tables, norms, positions, the
//! document cache for lookups and snippets) and drops them when it returns.

use crate::boolean::{compile_lenient, BooleanResults, Matcher};
use crate::config::EngineConfig;
use crate::document::Document;
use crate::error::Result;
use crate::persist::{load_doc_cache, load_meta, load_norms, load_positions, load_postings, IndexPaths};
use crate::positional::PositionMap;
use crate::ranker::{FieldType, QueryTerms, RankedResults, Ranker, SearchMode};
use crate::snippet::{render, Snippet};
use crate::tfidf::{FieldSet, NormTable, PostingTable};
use crate::tokenizer::{Analyzer, Tokenizer};
use crate::DocId;
use std::collections::BTreeMap;
use std::time::Instant;

pub struct DiskIndex {
    paths: IndexPaths,
    tokenizer: Box<dyn Tokenizer>,
    title_weight: f32,
}

impl DiskIndex {
    /// Opens the directory at `config.index_path`; only `meta.json` is read.
    pub fn open(config: &EngineConfig) -> Result<Self> {
        let paths = IndexPaths::new(&config.index_path);
        let meta = load_meta(&paths)?;
        tracing::info!(path = %paths.root.display(), documents = meta.num_docs, "opened disk index");
        Ok(Self {
            paths,
            tokenizer: Box::new(Analyzer::new(config.stemmer)),
            title_weight: config.title_weight,
        })
    }

    fn load_table(&self, field: FieldSet, needed: bool) -> Result<(PostingTable, NormTable)> {
        if !needed {
            return Ok(Default::default());
        }
        Ok((load_postings(&self.paths, field)?, load_norms(&self.paths, field)?))
    }

    pub fn search_ranked(&self, query: &str, k: usize, field: FieldType, mode: SearchMode) -> Result<RankedResults> {
        let start = Instant::now();
        let terms = QueryTerms::analyze(self.tokenizer.as_ref(), query);

        let (index, norms) = self.load_table(FieldSet::NonTitle, field != FieldType::Title)?;
        let (title_index, title_norms) = self.load_table(FieldSet::Title, field != FieldType::Content)?;
        let positions = load_positions(&self.paths)?;

        // every document has an entry in both norm tables
        let scored_norms = if field == FieldType::Title { &title_norms } else { &norms };
        let doc_ids: Vec<DocId> = scored_norms.keys().copied().collect();

        let ranker = Ranker {
            index: &index,
            norms: &norms,
            title_index: &title_index,
            title_norms: &title_norms,
            positions: &positions,
            title_weight: self.title_weight,
        };
        let results = ranker.rank(&doc_ids, &terms, k, field, mode.proximity())?;
        tracing::debug!(query, %field, ?mode, hits = results.len(), took_ms = start.elapsed().as_millis() as u64, "disk ranked search");
        Ok(results)
    }

    /// Boolean search; a malformed query yields no results.
    pub fn search_boolean(&self, query: &str, field: FieldType) -> Result<BooleanResults> {
        let postfix = compile_lenient(self.tokenizer.as_ref(), query);
        if postfix.is_empty() {
            return Ok(BooleanResults::default());
        }
        let index = if field == FieldType::Title { PostingTable::new() } else { load_postings(&self.paths, FieldSet::NonTitle)? };
        let title_index = if field == FieldType::Content { PostingTable::new() } else { load_postings(&self.paths, FieldSet::Title)? };
        let doc_ids: Vec<DocId> = load_norms(&self.paths, FieldSet::NonTitle)?.into_keys().collect();
        let positions = load_positions(&self.paths)?;

        let matcher = Matcher { index: &index, title_index: &title_index, positions: &positions, doc_ids: &doc_ids };
        Ok(matcher.evaluate(&postfix, field))
    }

    /// Looks up documents in one pass over the document cache. Missing ids
    /// are logged and come back as `None`.
    pub fn get_many(&self, ids: &[DocId]) -> Result<Vec<(DocId, Option<Document>)>> {
        let mut cache = load_doc_cache(&self.paths)?;
        Ok(ids
            .iter()
            .map(|&id| {
                let doc = cache.remove(&id);
                if doc.is_none() {
                    tracing::warn!(doc_id = id, "document not found");
                }
                (id, doc)
            })
            .collect())
    }

    pub fn get(&self, id: DocId) -> Result<Option<Document>> {
        Ok(self.get_many(&[id])?.pop().and_then(|(_, doc)| doc))
    }

    /// Snippets of `ids` around the matches in `positions`, rendered from the
    /// cached content. Unknown ids are left out.
    pub fn snippets(&self, ids: &[DocId], positions: &PositionMap, window_size: usize) -> Result<BTreeMap<DocId, Snippet>> {
        let mut out = BTreeMap::new();
        for (id, doc) in self.get_many(ids)? {
            let Some(doc) = doc else { continue };
            let stream = self.tokenizer.tokenize(&doc.content, true);
            out.insert(id, render(&doc, &stream.tokens, &stream, positions, window_size));
        }
        Ok(out)
    }
}
