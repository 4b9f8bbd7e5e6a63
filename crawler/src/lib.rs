//! Fetches wiki pages and extracts the fields the index stores.

pub mod robots;

use docseek_core::RawDocument;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use reqwest::{header, Client};
use robots::Robots;
use scraper::{ElementRef, Html, Selector};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Bodies larger than this are rejected.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

pub const DEFAULT_USER_AGENT: &str = "docseek-crawler/0.1";

lazy_static! {
    static ref SEL_TITLE_MAIN: Selector = selector("span.mw-page-title-main");
    static ref SEL_TITLE: Selector = selector("title");
    static ref SEL_TOC: Selector = selector("#content #toc");
    static ref SEL_H1: Selector = selector("#content h1");
    static ref SEL_H2: Selector = selector("#content h2");
    static ref SEL_H3: Selector = selector("#content h3");
    static ref SEL_CONTENT: Selector = selector("#content");
    static ref SEL_BODY: Selector = selector("body");
    static ref SEL_LISTING: Selector = selector("div.mw-allpages-body a[href]");
    static ref SEL_LISTING_NAV: Selector = selector("div.mw-allpages-nav a[href]");
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url {0}")]
    InvalidUrl(String),

    #[error("{url} is unavailable: {reason}")]
    Unavailable { url: String, reason: String },

    #[error("{0} is disallowed by robots.txt")]
    Disallowed(String),
}

fn unavailable(url: &Url, reason: impl ToString) -> FetchError {
    FetchError::Unavailable { url: url.to_string(), reason: reason.to_string() }
}

pub fn build_client(user_agent: &str, timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(timeout)
        .build()
}

/// Parses `s`, assuming `https://` when no scheme is given.
pub fn parse_url(s: &str) -> Result<Url, FetchError> {
    Url::parse(s)
        .or_else(|_| Url::parse(&format!("https://{s}")))
        .map_err(|_| FetchError::InvalidUrl(s.to_string()))
}

/// Downloads an HTML page.
pub async fn fetch_html(client: &Client, url: &Url) -> Result<String, FetchError> {
    let resp = client.get(url.clone()).send().await.map_err(|e| unavailable(url, e))?;
    if !resp.status().is_success() {
        return Err(unavailable(url, format!("status {}", resp.status())));
    }
    if let Some(ct) = resp.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        if !ct.starts_with("text/html") {
            return Err(unavailable(url, format!("content type {ct}")));
        }
    }
    let bytes = resp.bytes().await.map_err(|e| unavailable(url, e))?;
    if bytes.len() > MAX_BODY_BYTES {
        return Err(unavailable(url, format!("body of {} bytes", bytes.len())));
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Downloads and parses one page.
pub async fn fetch(client: &Client, url: &Url) -> Result<RawDocument, FetchError> {
    let html = fetch_html(client, url).await?;
    let doc = parse_page(&html);
    tracing::debug!(%url, title = %doc.title, "fetched page");
    Ok(doc)
}

/// Visible text of an element with whitespace collapsed, skipping scripts.
fn element_text(el: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    for node in el.descendants() {
        let Some(text) = node.value().as_text() else { continue };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map_or(false, |e| matches!(e.name(), "script" | "style" | "noscript"))
        });
        if hidden {
            continue;
        }
        parts.extend(text.split_whitespace());
    }
    parts.join(" ")
}

fn all_text(html: &Html, sel: &Selector) -> Vec<String> {
    html.select(sel).map(element_text).filter(|t| !t.is_empty()).collect()
}

fn first_text(html: &Html, sels: &[&Selector]) -> String {
    sels.iter()
        .find_map(|sel| html.select(sel).map(element_text).find(|t| !t.is_empty()))
        .unwrap_or_default()
}

/// Extracts title, table of contents, headings and body text of a wiki page.
pub fn parse_page(html: &str) -> RawDocument {
    let html = Html::parse_document(html);
    RawDocument {
        title: first_text(&html, &[&*SEL_TITLE_MAIN, &*SEL_TITLE]),
        toc: all_text(&html, &SEL_TOC),
        h1: all_text(&html, &SEL_H1),
        h2: all_text(&html, &SEL_H2),
        h3: all_text(&html, &SEL_H3),
        content: first_text(&html, &[&*SEL_CONTENT, &*SEL_BODY]),
    }
}

/// Links found on a wiki "all pages" listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    pub pages: Vec<Url>,
    /// Further listing pages.
    pub next: Vec<Url>,
}

pub fn parse_listing(html: &str, base: &Url) -> Listing {
    let html = Html::parse_document(html);
    let links = |sel: &Selector| -> Vec<Url> {
        html.select(sel)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| base.join(href).ok())
            .filter(|u| u.scheme().starts_with("http"))
            .collect()
    };
    Listing { pages: links(&*SEL_LISTING), next: links(&*SEL_LISTING_NAV) }
}

/// Output file name for a page: the SHA-1 of its URL.
pub fn file_name(url: &Url) -> String {
    let mut hasher = Sha1::new();
    hasher.update(normalize(url).as_bytes());
    format!("{:x}.json", hasher.finalize())
}

/// URL without its fragment.
pub fn normalize(url: &Url) -> String {
    let mut u = url.clone();
    u.set_fragment(None);
    u.to_string()
}

/// HTTP client plus a per-host robots.txt cache.
pub struct Crawler {
    client: Client,
    robots: RwLock<HashMap<String, Robots>>,
    respect_robots: bool,
}

impl Crawler {
    pub fn new(client: Client, respect_robots: bool) -> Self {
        Self { client, robots: RwLock::new(HashMap::new()), respect_robots }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn robots_for(&self, url: &Url) -> Option<Robots> {
        let host = url.host_str()?.to_string();
        let cached = { self.robots.read().get(&host).cloned() };
        if cached.is_some() {
            return cached;
        }
        let robots_url = format!("{}://{}/robots.txt", url.scheme(), host);
        let txt = match self.client.get(&robots_url).send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
            _ => String::new(),
        };
        let parsed = Robots::parse(&txt);
        self.robots.write().insert(host, parsed.clone());
        Some(parsed)
    }

    /// Checks robots.txt and waits out its crawl delay before fetching.
    async fn polite(&self, url: &Url) -> Result<(), FetchError> {
        if !self.respect_robots {
            return Ok(());
        }
        let Some(robots) = self.robots_for(url).await else {
            return Err(FetchError::InvalidUrl(url.to_string()));
        };
        if !robots.allows_path(url.path()) {
            return Err(FetchError::Disallowed(url.to_string()));
        }
        if let Some(ms) = robots.crawl_delay_ms {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        Ok(())
    }

    pub async fn fetch(&self, url: &Url) -> Result<RawDocument, FetchError> {
        self.polite(url).await?;
        fetch(&self.client, url).await
    }

    pub async fn fetch_listing(&self, url: &Url) -> Result<Listing, FetchError> {
        self.polite(url).await?;
        let html = fetch_html(&self.client, url).await?;
        Ok(parse_listing(&html, url))
    }
}
