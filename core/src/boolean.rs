//! Boolean queries.
//!
//! Infix `AND` / `OR` / `NOT` expressions with parentheses are compiled to
//! postfix with a shunting-yard pass and evaluated over sorted document-id
//! lists. Only the uppercase words are operators; `and` is an ordinary term.

use crate::error::QueryError;
use crate::index::SearchIndex;
use crate::positional::{self, PositionMap};
use crate::ranker::FieldType;
use crate::tfidf::{FieldSet, PostingTable};
use crate::tokenizer::Tokenizer;
use crate::DocId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoolToken {
    Term(String),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

impl BoolToken {
    fn precedence(&self) -> u8 {
        match self {
            BoolToken::Not => 3,
            BoolToken::And => 2,
            BoolToken::Or => 1,
            _ => 0,
        }
    }

    fn lex(word: &str) -> Self {
        match word {
            "AND" => BoolToken::And,
            "OR" => BoolToken::Or,
            "NOT" => BoolToken::Not,
            "(" => BoolToken::LParen,
            ")" => BoolToken::RParen,
            other => BoolToken::Term(other.to_string()),
        }
    }
}

impl fmt::Display for BoolToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoolToken::Term(t) => f.write_str(t),
            BoolToken::And => f.write_str("AND"),
            BoolToken::Or => f.write_str("OR"),
            BoolToken::Not => f.write_str("NOT"),
            BoolToken::LParen => f.write_str("("),
            BoolToken::RParen => f.write_str(")"),
        }
    }
}

/// What the previous input token was, for implicit-OR and operator checks.
#[derive(Clone, Copy, PartialEq)]
enum Prev {
    Start,
    Operand,
    Binary,
    Open,
}

fn push_operator(op: BoolToken, ops: &mut Vec<BoolToken>, output: &mut Vec<BoolToken>) {
    while let Some(top) = ops.last() {
        if *top == BoolToken::LParen || top.precedence() < op.precedence() {
            break;
        }
        output.extend(ops.pop());
    }
    ops.push(op);
}

/// Compiles an infix query to postfix. Terms are passed through `normalize`.
pub fn compile<F>(query: &str, normalize: F) -> Result<Vec<BoolToken>, QueryError>
where
    F: Fn(&str) -> String,
{
    let spaced = query.replace('(', " ( ").replace(')', " ) ");
    let mut output = Vec::new();
    let mut ops: Vec<BoolToken> = Vec::new();
    let mut prev = Prev::Start;

    for (index, word) in spaced.split_whitespace().enumerate() {
        let token = BoolToken::lex(word);
        match token {
            BoolToken::LParen => {
                if prev == Prev::Operand {
                    push_operator(BoolToken::Or, &mut ops, &mut output);
                }
                ops.push(BoolToken::LParen);
                prev = Prev::Open;
            }
            BoolToken::RParen => {
                loop {
                    match ops.pop() {
                        Some(BoolToken::LParen) => break,
                        Some(op) => output.push(op),
                        None => return Err(QueryError::UnbalancedParentheses),
                    }
                }
                prev = Prev::Operand;
            }
            BoolToken::And | BoolToken::Or => {
                if matches!(prev, Prev::Start | Prev::Binary) {
                    return Err(QueryError::ConsecutiveOperators { operator: word.to_string(), index });
                }
                push_operator(token, &mut ops, &mut output);
                prev = Prev::Binary;
            }
            BoolToken::Not => {
                if prev == Prev::Operand {
                    push_operator(BoolToken::Or, &mut ops, &mut output);
                }
                if ops.last() == Some(&BoolToken::Not) {
                    ops.pop();
                } else {
                    ops.push(BoolToken::Not);
                }
                prev = Prev::Open;
            }
            BoolToken::Term(raw) => {
                if prev == Prev::Operand {
                    push_operator(BoolToken::Or, &mut ops, &mut output);
                }
                output.push(BoolToken::Term(normalize(&raw)));
                prev = Prev::Operand;
            }
        }
    }

    if prev == Prev::Start {
        return Err(QueryError::Empty);
    }
    while let Some(op) = ops.pop() {
        if op == BoolToken::LParen {
            return Err(QueryError::UnbalancedParentheses);
        }
        output.push(op);
    }
    check_arity(&output)?;
    Ok(output)
}

fn check_arity(postfix: &[BoolToken]) -> Result<(), QueryError> {
    let mut depth = 0usize;
    for token in postfix {
        depth = match token {
            BoolToken::Term(_) => depth + 1,
            BoolToken::Not if depth >= 1 => depth,
            BoolToken::And | BoolToken::Or if depth >= 2 => depth - 1,
            _ => return Err(QueryError::MissingOperand),
        };
    }
    if depth == 1 {
        Ok(())
    } else {
        Err(QueryError::MissingOperand)
    }
}

/// Like [`compile`], but a malformed query is logged and yields no tokens.
pub fn parse_bool_query<F>(query: &str, normalize: F) -> Vec<BoolToken>
where
    F: Fn(&str) -> String,
{
    match compile(query, normalize) {
        Ok(postfix) => postfix,
        Err(e) => {
            tracing::warn!(query, error = %e, "rejecting boolean query");
            Vec::new()
        }
    }
}

pub fn intersect(a: &[DocId], b: &[DocId]) -> Vec<DocId> {
    let (mut i, mut j) = (0, 0);
    let mut out = Vec::new();
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

pub fn union(a: &[DocId], b: &[DocId]) -> Vec<DocId> {
    let (mut i, mut j) = (0, 0);
    let mut out = Vec::with_capacity(a.len() + b.len());
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

/// Elements of `all` not in `remove`; both sorted.
pub fn difference(all: &[DocId], remove: &[DocId]) -> Vec<DocId> {
    all.iter().copied().filter(|id| remove.binary_search(id).is_err()).collect()
}

/// Unranked boolean matches in ascending id order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BooleanResults {
    pub doc_ids: Vec<DocId>,
    /// Positions of every query term found in the index, limited to `doc_ids`.
    pub positions: PositionMap,
}

/// Normalizes one boolean query term the way titles and headings are.
pub fn normalize_term(tokenizer: &dyn Tokenizer, word: &str) -> String {
    tokenizer
        .tokenize(word, false)
        .tokens
        .into_iter()
        .next()
        .unwrap_or_else(|| word.to_lowercase())
}

/// Borrowed view of the statistics a boolean query reads.
#[derive(Debug, Clone, Copy)]
pub struct Matcher<'a> {
    pub index: &'a PostingTable,
    pub title_index: &'a PostingTable,
    pub positions: &'a PositionMap,
    /// Every live document, ascending; `NOT` complements against it.
    pub doc_ids: &'a [DocId],
}

impl Matcher<'_> {
    fn term_doc_ids(&self, term: &str, field: FieldType) -> Vec<DocId> {
        let ids = |table: &PostingTable| table.get(term).map(|e| e.doc_ids()).unwrap_or_default();
        match field {
            FieldType::Title => ids(self.title_index),
            FieldType::Content => ids(self.index),
            FieldType::All => union(&ids(self.index), &ids(self.title_index)),
        }
    }

    /// Evaluates a postfix query. A malformed sequence yields no results.
    pub fn evaluate(&self, postfix: &[BoolToken], field: FieldType) -> BooleanResults {
        let mut stack: Vec<Vec<DocId>> = Vec::new();
        let mut terms: Vec<String> = Vec::new();

        for token in postfix {
            match token {
                BoolToken::Term(term) => {
                    let ids = self.term_doc_ids(term, field);
                    if !ids.is_empty() && !terms.contains(term) {
                        terms.push(term.clone());
                    }
                    stack.push(ids);
                }
                BoolToken::And | BoolToken::Or => {
                    let (Some(b), Some(a)) = (stack.pop(), stack.pop()) else {
                        tracing::warn!(operator = %token, "boolean operator is missing an operand");
                        return BooleanResults::default();
                    };
                    stack.push(if *token == BoolToken::And { intersect(&a, &b) } else { union(&a, &b) });
                }
                BoolToken::Not => {
                    let Some(a) = stack.pop() else {
                        tracing::warn!("NOT is missing an operand");
                        return BooleanResults::default();
                    };
                    stack.push(difference(self.doc_ids, &a));
                }
                BoolToken::LParen | BoolToken::RParen => {
                    tracing::warn!("parenthesis in postfix query");
                    return BooleanResults::default();
                }
            }
        }

        let doc_ids = stack.pop().unwrap_or_default();
        let positions = positional::restrict(self.positions, &terms, &doc_ids);
        BooleanResults { doc_ids, positions }
    }
}

/// Compiles `query` with terms normalized by `tokenizer`; malformed queries
/// are logged and compile to nothing.
pub(crate) fn compile_lenient(tokenizer: &dyn Tokenizer, query: &str) -> Vec<BoolToken> {
    let postfix = parse_bool_query(query, |w| normalize_term(tokenizer, w));
    tracing::debug!(query, postfix = %display_postfix(&postfix), "compiled boolean query");
    postfix
}

impl SearchIndex {
    pub fn parse_bool_query(&self, query: &str) -> Vec<BoolToken> {
        compile_lenient(self.tokenizer(), query)
    }

    pub fn evaluate(&self, postfix: &[BoolToken], field: FieldType) -> BooleanResults {
        let doc_ids = self.doc_ids();
        let matcher = Matcher {
            index: self.postings(FieldSet::NonTitle),
            title_index: self.postings(FieldSet::Title),
            positions: self.positions(),
            doc_ids: &doc_ids,
        };
        matcher.evaluate(postfix, field)
    }

    pub fn search_boolean(&self, query: &str, field: FieldType) -> BooleanResults {
        let postfix = self.parse_bool_query(query);
        if postfix.is_empty() {
            return BooleanResults::default();
        }
        self.evaluate(&postfix, field)
    }
}

fn display_postfix(postfix: &[BoolToken]) -> String {
    postfix.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
}
