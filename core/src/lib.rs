//! Document search engine.
//!
//! Documents with a title, table of contents, three heading levels and a body
//! are tokenized, indexed with TF-IDF statistics for two field sets (title and
//! everything else) and a positional index over the body. Queries are either
//! ranked free-text queries (cosine similarity, optional proximity/phrase
//! filtering) or boolean `AND`/`OR`/`NOT` expressions, answered either from
//! an in-memory [`SearchIndex`] or straight from a saved directory with
//! [`DiskIndex`].

pub mod boolean;
pub mod config;
pub mod disk;
pub mod document;
pub mod error;
pub mod eval;
pub mod index;
pub mod lang;
pub mod loader;
pub mod persist;
pub mod positional;
pub mod ranker;
pub mod snippet;
pub mod tfidf;
pub mod tokenizer;

pub type DocId = u32;

pub use boolean::{BoolToken, BooleanResults};
pub use config::EngineConfig;
pub use disk::DiskIndex;
pub use document::{Document, Lookup, RawDocument, TokenizedDocument};
pub use error::{IndexError, QueryError, Result};
pub use index::{IndexState, IndexStats, SearchIndex};
pub use positional::PositionMap;
pub use ranker::{FieldType, QueryTerms, RankedResults, SearchMode};
pub use snippet::Snippet;
pub use tfidf::{FieldSet, NormTable, PostingEntry, PostingTable};
