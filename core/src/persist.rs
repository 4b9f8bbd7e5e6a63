//! On-disk index layouts.
//!
//! The single-file layout stores the whole [`IndexState`] as one JSON object.
//! The file-based layout splits it across a directory so parts can be loaded
//! on their own (the document cache alone is enough to serve `get`).

use crate::config::{EngineConfig, IndexLayout};
use crate::document::{Document, TokenizedDocument};
use crate::error::{IndexError, Result};
use crate::index::{IndexState, SearchIndex};
use crate::positional::PositionMap;
use crate::tfidf::{FieldSet, NormTable, PostingTable};
use crate::DocId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub next_id: DocId,
    pub created_at: String,
    pub version: u32,
}

/// File names of the file-based layout under `root`.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn doc_cache(&self) -> PathBuf { self.root.join("doc_cache.json") }
    pub fn tokenized_docs(&self) -> PathBuf { self.root.join("tokenized_docs.json") }
    pub fn positions_map(&self) -> PathBuf { self.root.join("positions_map.json") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    pub fn postings(&self, field: FieldSet) -> PathBuf {
        match field {
            FieldSet::NonTitle => self.root.join("tf_idf.json"),
            FieldSet::Title => self.root.join("title_tf_idf.json"),
        }
    }
    pub fn norms(&self, field: FieldSet) -> PathBuf {
        match field {
            FieldSet::NonTitle => self.root.join("norms.json"),
            FieldSet::Title => self.root.join("title_norms.json"),
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    let mut w = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut w, value)?;
    w.flush()?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let r = BufReader::new(File::open(path)?);
    serde_json::from_reader(r).map_err(|e| IndexError::Malformed {
        file: path.display().to_string(),
        message: e.to_string(),
    })
}

pub fn save_index_json<P: AsRef<Path>>(path: P, state: &IndexState) -> Result<()> {
    write_json(path.as_ref(), state)
}

pub fn load_index_json<P: AsRef<Path>>(path: P) -> Result<IndexState> {
    read_json(path.as_ref())
}

pub fn save_doc_cache(paths: &IndexPaths, docs: &BTreeMap<DocId, Document>) -> Result<()> {
    write_json(&paths.doc_cache(), docs)
}

pub fn load_doc_cache(paths: &IndexPaths) -> Result<BTreeMap<DocId, Document>> {
    read_json(&paths.doc_cache())
}

pub fn save_tokenized_docs(paths: &IndexPaths, collection: &[TokenizedDocument]) -> Result<()> {
    let by_id: BTreeMap<DocId, &TokenizedDocument> = collection.iter().map(|d| (d.id, d)).collect();
    write_json(&paths.tokenized_docs(), &by_id)
}

/// Tokenized collection in ascending id order.
pub fn load_tokenized_docs(paths: &IndexPaths) -> Result<Vec<TokenizedDocument>> {
    let by_id: BTreeMap<DocId, TokenizedDocument> = read_json(&paths.tokenized_docs())?;
    Ok(by_id.into_values().collect())
}

pub fn save_positions(paths: &IndexPaths, positions: &PositionMap) -> Result<()> {
    write_json(&paths.positions_map(), positions)
}

pub fn load_positions(paths: &IndexPaths) -> Result<PositionMap> {
    read_json(&paths.positions_map())
}

pub fn save_postings(paths: &IndexPaths, field: FieldSet, postings: &PostingTable) -> Result<()> {
    write_json(&paths.postings(field), postings)
}

pub fn load_postings(paths: &IndexPaths, field: FieldSet) -> Result<PostingTable> {
    read_json(&paths.postings(field))
}

pub fn save_norms(paths: &IndexPaths, field: FieldSet, norms: &NormTable) -> Result<()> {
    write_json(&paths.norms(field), norms)
}

pub fn load_norms(paths: &IndexPaths, field: FieldSet) -> Result<NormTable> {
    read_json(&paths.norms(field))
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    let json = serde_json::to_string_pretty(meta)?;
    create_dir_all(&paths.root)?;
    std::fs::write(paths.meta(), json)?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let meta: MetaFile = read_json(&paths.meta())?;
    if meta.version != FORMAT_VERSION {
        return Err(IndexError::Malformed {
            file: paths.meta().display().to_string(),
            message: format!("unsupported format version {}", meta.version),
        });
    }
    Ok(meta)
}

pub fn save_index_dir(paths: &IndexPaths, state: &IndexState) -> Result<()> {
    save_doc_cache(paths, &state.doc_cache)?;
    save_tokenized_docs(paths, &state.collection)?;
    save_positions(paths, &state.positions_map)?;
    save_postings(paths, FieldSet::NonTitle, &state.index)?;
    save_postings(paths, FieldSet::Title, &state.title_index)?;
    save_norms(paths, FieldSet::NonTitle, &state.norms)?;
    save_norms(paths, FieldSet::Title, &state.title_norms)?;
    save_meta(
        paths,
        &MetaFile {
            num_docs: state.collection.len() as u32,
            next_id: state.next_id,
            created_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
            version: FORMAT_VERSION,
        },
    )
}

pub fn load_index_dir(paths: &IndexPaths) -> Result<IndexState> {
    let meta = load_meta(paths)?;
    let state = IndexState {
        collection: load_tokenized_docs(paths)?,
        doc_cache: load_doc_cache(paths)?,
        index: load_postings(paths, FieldSet::NonTitle)?,
        title_index: load_postings(paths, FieldSet::Title)?,
        norms: load_norms(paths, FieldSet::NonTitle)?,
        title_norms: load_norms(paths, FieldSet::Title)?,
        positions_map: load_positions(paths)?,
        next_id: meta.next_id,
    };
    if state.collection.len() != meta.num_docs as usize {
        tracing::warn!(
            expected = meta.num_docs,
            found = state.collection.len(),
            "document count differs from meta.json"
        );
    }
    Ok(state)
}

/// Saves `index` to `config.index_path` in the configured layout.
pub fn save_index(config: &EngineConfig, index: &SearchIndex) -> Result<()> {
    let path = &config.index_path;
    match config.layout {
        IndexLayout::SingleFile => save_index_json(path, index.state())?,
        IndexLayout::FileBased => save_index_dir(&IndexPaths::new(path), index.state())?,
    }
    tracing::info!(path = %path.display(), layout = ?config.layout, documents = index.len(), "index saved");
    Ok(())
}

/// Loads the index at `config.index_path` in the configured layout.
pub fn load_index(config: &EngineConfig) -> Result<SearchIndex> {
    let path = &config.index_path;
    let state = match config.layout {
        IndexLayout::SingleFile => load_index_json(path)?,
        IndexLayout::FileBased => load_index_dir(&IndexPaths::new(path))?,
    };
    tracing::info!(path = %path.display(), documents = state.collection.len(), "index loaded");
    Ok(SearchIndex::from_state(config, state))
}

/// [`load_index`], or an empty index when nothing has been saved yet.
pub fn load_or_create(config: &EngineConfig) -> Result<SearchIndex> {
    let exists = match config.layout {
        IndexLayout::SingleFile => config.index_path.is_file(),
        IndexLayout::FileBased => IndexPaths::new(&config.index_path).meta().is_file(),
    };
    if exists {
        load_index(config)
    } else {
        tracing::info!(path = %config.index_path.display(), "no saved index, starting empty");
        Ok(SearchIndex::from_config(config))
    }
}
