use anyhow::{anyhow, Result};
use clap::Parser;
use docseek_crawler::{build_client, file_name, normalize, parse_url, Crawler, DEFAULT_USER_AGENT};
use std::collections::{HashSet, VecDeque};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "docseek-crawler")]
#[command(about = "Download wiki pages as JSON documents for the indexer")]
struct Cli {
    /// Page URLs to download
    urls: Vec<String>,
    /// File with one URL per line
    #[arg(long)]
    seeds: Option<PathBuf>,
    /// "All pages" listing to walk; every listed page is downloaded
    #[arg(long)]
    all_pages: Option<String>,
    /// Output directory, one JSON file per page
    #[arg(long, default_value = "./data")]
    output: PathBuf,
    /// Maximum number of pages to download
    #[arg(long, default_value_t = 10_000)]
    max_docs: usize,
    #[arg(long, default_value_t = 8)]
    concurrency: usize,
    /// Request timeout seconds
    #[arg(long, default_value_t = 12)]
    timeout_secs: u64,
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    user_agent: String,
    /// Ignore robots.txt
    #[arg(long, default_value_t = false)]
    no_robots: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();

    let client = build_client(&args.user_agent, Duration::from_secs(args.timeout_secs))?;
    let crawler = Arc::new(Crawler::new(client, !args.no_robots));

    let mut urls: Vec<Url> = Vec::new();
    for s in &args.urls {
        urls.push(parse_url(s)?);
    }
    if let Some(seeds) = &args.seeds {
        for line in BufReader::new(File::open(seeds)?).lines() {
            let s = line?.trim().to_string();
            if s.is_empty() || s.starts_with('#') {
                continue;
            }
            match parse_url(&s) {
                Ok(u) => urls.push(u),
                Err(e) => tracing::warn!(error = %e, "skipping seed"),
            }
        }
    }
    if let Some(listing) = &args.all_pages {
        let found = walk_listing(&crawler, parse_url(listing)?, args.max_docs).await;
        urls.extend(found);
    }

    let mut seen = HashSet::new();
    urls.retain(|u| seen.insert(normalize(u)));
    urls.truncate(args.max_docs);
    if urls.is_empty() {
        return Err(anyhow!("no urls to crawl"));
    }
    fs::create_dir_all(&args.output)?;
    tracing::info!(urls = urls.len(), concurrency = args.concurrency, output = %args.output.display(), "crawl started");

    let mut pending: VecDeque<Url> = urls.into();
    let mut tasks = JoinSet::new();
    let (mut written, mut failed) = (0usize, 0usize);
    loop {
        while tasks.len() < args.concurrency.max(1) {
            let Some(url) = pending.pop_front() else { break };
            let crawler = crawler.clone();
            tasks.spawn(async move {
                let res = crawler.fetch(&url).await;
                (url, res)
            });
        }
        let Some(joined) = tasks.join_next().await else { break };
        let (url, res) = joined?;
        match res {
            Ok(doc) => {
                let path = args.output.join(file_name(&url));
                let mut out = BufWriter::new(File::create(&path)?);
                serde_json::to_writer_pretty(&mut out, &doc)?;
                out.flush()?;
                written += 1;
                tracing::info!(%url, file = %path.display(), title = %doc.title, "saved page");
            }
            Err(e) => {
                failed += 1;
                tracing::warn!(error = %e, "page skipped");
            }
        }
    }

    tracing::info!(written, failed, output = %args.output.display(), "crawl finished");
    Ok(())
}

/// Follows listing navigation links breadth-first and gathers page links.
async fn walk_listing(crawler: &Crawler, start: Url, max_docs: usize) -> Vec<Url> {
    let mut pages = Vec::new();
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([start]);
    while let Some(listing_url) = queue.pop_front() {
        if pages.len() >= max_docs || !visited.insert(normalize(&listing_url)) {
            continue;
        }
        match crawler.fetch_listing(&listing_url).await {
            Ok(listing) => {
                tracing::info!(url = %listing_url, pages = listing.pages.len(), "listing page");
                pages.extend(listing.pages);
                queue.extend(listing.next);
            }
            Err(e) => tracing::warn!(error = %e, "listing page skipped"),
        }
    }
    pages
}
