use crate::DocId;
use serde::{Deserialize, Deserializer, Serialize};

/// A source document as stored in the document cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub title: String,
    #[serde(default)]
    pub toc: Vec<String>,
    #[serde(default)]
    pub h1: Vec<String>,
    #[serde(default)]
    pub h2: Vec<String>,
    #[serde(default)]
    pub h3: Vec<String>,
    pub content: String,
    /// Detected language tag, `None` when unknown or detection is disabled.
    #[serde(default)]
    pub lang: Option<String>,
}

impl Document {
    pub fn from_raw(id: DocId, raw: RawDocument) -> Self {
        Self {
            id,
            title: raw.title,
            toc: raw.toc,
            h1: raw.h1,
            h2: raw.h2,
            h3: raw.h3,
            content: raw.content,
            lang: None,
        }
    }
}

/// Document fields before an id has been assigned.
///
/// This is the shape written by the crawler. `title` and `content` accept
/// either a plain string or an array of strings (joined with spaces).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    #[serde(deserialize_with = "string_or_list")]
    pub title: String,
    #[serde(default)]
    pub toc: Vec<String>,
    #[serde(default)]
    pub h1: Vec<String>,
    #[serde(default)]
    pub h2: Vec<String>,
    #[serde(default)]
    pub h3: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub content: String,
}

impl RawDocument {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self { title: title.into(), content: content.into(), ..Self::default() }
    }
}

fn string_or_list<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrList {
        One(String),
        Many(Vec<String>),
    }

    Ok(match StringOrList::deserialize(deserializer)? {
        StringOrList::One(s) => s,
        StringOrList::Many(parts) => parts.join(" "),
    })
}

/// A document with every textual field replaced by its normalized tokens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenizedDocument {
    pub id: DocId,
    pub title: Vec<String>,
    pub toc: Vec<String>,
    pub h1: Vec<String>,
    pub h2: Vec<String>,
    pub h3: Vec<String>,
    pub content: Vec<String>,
    #[serde(default)]
    pub lang: Option<String>,
}

impl TokenizedDocument {
    /// Tokens of every field except the title, in the order the statistics
    /// builder concatenates them.
    pub fn non_title_tokens(&self) -> impl Iterator<Item = &String> {
        self.content
            .iter()
            .chain(&self.toc)
            .chain(&self.h1)
            .chain(&self.h2)
            .chain(&self.h3)
    }
}

/// Outcome of a single lookup inside a batch get.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    Found(&'a Document),
    NotFound(DocId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_document_accepts_crawler_arrays() {
        let raw: RawDocument = serde_json::from_str(
            r#"{"title": ["Geralt of Rivia"], "toc": ["1 Life"], "h1": [], "h2": ["Life"], "h3": [], "content": ["Geralt is a witcher."]}"#,
        )
        .unwrap();
        assert_eq!(raw.title, "Geralt of Rivia");
        assert_eq!(raw.content, "Geralt is a witcher.");
        assert_eq!(raw.h2, vec!["Life".to_string()]);
    }

    #[test]
    fn raw_document_accepts_plain_strings_and_missing_lists() {
        let raw: RawDocument =
            serde_json::from_str(r#"{"title": "Kaer Morhen", "content": "A keep."}"#).unwrap();
        assert_eq!(raw.title, "Kaer Morhen");
        assert!(raw.toc.is_empty());
    }
}
