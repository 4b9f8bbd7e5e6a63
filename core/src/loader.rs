//! Reading source documents and evaluation queries from disk.

use crate::document::RawDocument;
use crate::error::{IndexError, Result};
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A document from a CSV collection, keeping the id the collection uses.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalDocument {
    pub external_id: String,
    pub raw: RawDocument,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalQuery {
    pub id: String,
    pub title: String,
    pub description: String,
}

fn malformed(path: &Path, message: impl Into<String>) -> IndexError {
    IndexError::Malformed { file: path.display().to_string(), message: message.into() }
}

/// Reads one crawler JSON file. The file may hold a single document or an
/// array of them; `.jsonl` files hold one document per line.
pub fn load_json_document<P: AsRef<Path>>(path: P) -> Result<Vec<RawDocument>> {
    let path = path.as_ref();
    if path.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        let reader = BufReader::new(File::open(path)?);
        let mut docs = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let doc = serde_json::from_str(&line).map_err(|e| malformed(path, format!("line {}: {e}", n + 1)))?;
            docs.push(doc);
        }
        return Ok(docs);
    }

    let json: serde_json::Value = serde_json::from_reader(BufReader::new(File::open(path)?))
        .map_err(|e| malformed(path, e.to_string()))?;
    let docs = match json {
        serde_json::Value::Array(arr) => arr
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<RawDocument>, _>>(),
        value @ serde_json::Value::Object(_) => serde_json::from_value(value).map(|d| vec![d]),
        _ => return Err(malformed(path, "expected a document object or an array of documents")),
    };
    docs.map_err(|e| malformed(path, e.to_string()))
}

/// Every `.json` / `.jsonl` file under `dir`, in path order.
pub fn json_files<P: AsRef<Path>>(dir: P) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file())
        .filter(|p| matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")))
        .collect();
    files.sort();
    files
}

/// Loads every document under `dir`. Unreadable files are logged and skipped.
pub fn load_json_documents<P: AsRef<Path>>(dir: P) -> Result<Vec<RawDocument>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(malformed(dir, "not a directory"));
    }
    let mut docs = Vec::new();
    for file in json_files(dir) {
        match load_json_document(&file) {
            Ok(mut batch) => docs.append(&mut batch),
            Err(e) => tracing::warn!(file = %file.display(), error = %e, "skipping document file"),
        }
    }
    tracing::info!(dir = %dir.display(), documents = docs.len(), "loaded documents");
    Ok(docs)
}

/// Loads a pipe-separated `id|title|text|date` collection.
///
/// Fields are separated by `|` and records may span lines, so the whole file
/// is split on `|` and consumed four fields at a time after the header. The
/// date becomes the single table-of-contents entry.
pub fn load_csv_documents<P: AsRef<Path>>(path: P) -> Result<Vec<ExternalDocument>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let fields: Vec<&str> = text.split('|').map(str::trim).collect();
    if fields.len() < 4 {
        return Err(malformed(path, "missing header"));
    }

    let mut docs = Vec::new();
    for record in fields[4..].chunks_exact(4) {
        let [id, title, content, date] = record else { continue };
        if id.is_empty() {
            continue;
        }
        let mut raw = RawDocument::new(*title, *content);
        if !date.is_empty() {
            raw.toc = vec![date.to_string()];
        }
        docs.push(ExternalDocument { external_id: id.to_string(), raw });
    }
    tracing::info!(file = %path.display(), documents = docs.len(), "loaded csv collection");
    Ok(docs)
}

/// Loads pipe-separated `id|title|description` queries, one per line after
/// the header. Lines with fewer than three fields are skipped.
pub fn load_csv_queries<P: AsRef<Path>>(path: P) -> Result<Vec<EvalQuery>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let mut queries = Vec::new();
    for (n, line) in reader.lines().enumerate().skip(1) {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split('|').map(str::trim).collect();
        if parts.len() < 3 {
            tracing::warn!(file = %path.display(), line = n + 1, "skipping query line");
            continue;
        }
        queries.push(EvalQuery {
            id: parts[0].to_string(),
            title: parts[1].to_string(),
            description: parts[2].to_string(),
        });
    }
    Ok(queries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn json_directory_with_objects_arrays_and_lines() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("a.json"),
            r#"{"title": ["Geralt"], "toc": [], "h1": [], "h2": [], "h3": [], "content": ["Witcher."]}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("b.json"),
            r#"[{"title": "Ciri", "content": "Elder blood."}, {"title": "Yennefer", "content": "Sorceress."}]"#,
        )
        .unwrap();
        fs::write(dir.path().join("c.jsonl"), "{\"title\": \"Roach\"}\n\n{\"title\": \"Dandelion\"}\n").unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let docs = load_json_documents(dir.path()).unwrap();
        let titles: Vec<&str> = docs.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["Geralt", "Ciri", "Yennefer", "Roach", "Dandelion"]);
        assert_eq!(docs[0].content, "Witcher.");
    }

    #[test]
    fn csv_records_may_span_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docs.csv");
        fs::write(
            &path,
            "id|title|text|date|\n1|Geralt|Line one\nline two|1990-01-01|\n2|Ciri|Elder blood||\n",
        )
        .unwrap();
        let docs = load_csv_documents(&path).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].external_id, "1");
        assert_eq!(docs[0].raw.content, "Line one\nline two");
        assert_eq!(docs[0].raw.toc, vec!["1990-01-01".to_string()]);
        assert!(docs[1].raw.toc.is_empty());
    }

    #[test]
    fn csv_queries_skip_header_and_short_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queries.csv");
        fs::write(&path, "id|title|description\n10|witcher|monster hunters\nbad line\n11|ciri|the princess\n").unwrap();
        let queries = load_csv_queries(&path).unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[1], EvalQuery { id: "11".into(), title: "ciri".into(), description: "the princess".into() });
    }
}
