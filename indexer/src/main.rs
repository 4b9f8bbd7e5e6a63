use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use docseek_core::config::{EngineConfig, IndexLayout};
use docseek_core::eval::{index_collection, trec_run};
use docseek_core::loader::{load_csv_documents, load_csv_queries, load_json_document, load_json_documents};
use docseek_core::persist::{load_index, load_or_create, save_index};
use docseek_core::{
    BooleanResults, DiskIndex, DocId, Document, FieldType, Lookup, PositionMap, RankedResults, RawDocument, SearchIndex,
    SearchMode, Snippet,
};
use docseek_crawler::{build_client, fetch, parse_url, DEFAULT_USER_AGENT};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "docseek-indexer")]
#[command(about = "Build, query and maintain a TF-IDF document index", long_about = None)]
struct Cli {
    /// Engine configuration file (defaults to $DOCSEEK_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Index location, overriding the configuration
    #[arg(long, global = true)]
    index: Option<PathBuf>,
    /// Use the file-based layout, overriding the configuration
    #[arg(long, global = true, default_value_t = false)]
    file_based: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a new index from a directory of JSON documents or a CSV collection
    Build {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Ranked free-text search
    Search {
        query: String,
        #[arg(short, long)]
        k: Option<usize>,
        #[arg(long, default_value_t = FieldType::All)]
        field: FieldType,
        /// Terms must be adjacent
        #[arg(long, conflicts_with = "proximity")]
        phrase: bool,
        /// Terms must lie within N tokens of each other
        #[arg(long)]
        proximity: Option<usize>,
        #[arg(long)]
        snippets: bool,
    },
    /// Boolean search with AND, OR, NOT and parentheses
    Boolean {
        query: String,
        #[arg(long, default_value_t = FieldType::All)]
        field: FieldType,
        #[arg(long)]
        snippets: bool,
    },
    /// Print stored documents
    Get { ids: Vec<DocId> },
    /// Add documents from crawler JSON files
    Add {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Download a page and add it
    AddUrl { url: String },
    /// Replace a document with the contents of a JSON file
    Update { id: DocId, file: PathBuf },
    Remove {
        #[arg(required = true)]
        ids: Vec<DocId>,
    },
    /// Document and vocabulary counts
    Stats,
    /// Write a TREC run file for a CSV collection and query set
    Eval {
        #[arg(long)]
        docs: PathBuf,
        #[arg(long)]
        queries: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(short, long, default_value_t = 100)]
        k: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let mut config = EngineConfig::load(cli.config.as_deref())?;
    if let Some(path) = cli.index {
        config.index_path = path;
    }
    if cli.file_based {
        config.layout = IndexLayout::FileBased;
    }

    match cli.command {
        Commands::Build { input, output } => {
            if let Some(output) = output {
                config.index_path = output;
            }
            build_index(&config, &input)
        }
        Commands::Search { query, k, field, phrase, proximity, snippets } => {
            let reader = Reader::open(&config)?;
            let mode = match (phrase, proximity) {
                (true, _) => SearchMode::Phrase,
                (false, Some(n)) => SearchMode::Proximity(n),
                (false, None) => SearchMode::Plain,
            };
            let start = std::time::Instant::now();
            let results = reader.ranked(&query, k.unwrap_or(config.default_k), field, mode)?;
            println!("{} hits in {:.3}s", results.len(), start.elapsed().as_secs_f32());
            let hits: Vec<(DocId, Option<f32>)> = results.iter().map(|(id, score)| (id, Some(score))).collect();
            print_hits(&reader, &hits, &results.positions, snippets.then_some(config.snippet_window))
        }
        Commands::Boolean { query, field, snippets } => {
            let reader = Reader::open(&config)?;
            let results = reader.boolean(&query, field)?;
            println!("{} hits", results.doc_ids.len());
            let hits: Vec<(DocId, Option<f32>)> = results.doc_ids.iter().map(|&id| (id, None)).collect();
            print_hits(&reader, &hits, &results.positions, snippets.then_some(config.snippet_window))
        }
        Commands::Get { ids } => {
            let reader = Reader::open(&config)?;
            for (id, doc) in reader.lookup(&ids)? {
                match doc {
                    Some(doc) => println!("{}", serde_json::to_string_pretty(&doc)?),
                    None => eprintln!("document {id} not found"),
                }
            }
            Ok(())
        }
        Commands::Add { files } => {
            let mut raws = Vec::new();
            for file in &files {
                raws.extend(load_json_document(file)?);
            }
            let mut index = load_or_create(&config)?;
            let ids = index.add_documents(raws);
            save_index(&config, &index)?;
            println!("added {ids:?}");
            Ok(())
        }
        Commands::AddUrl { url } => {
            let url = parse_url(&url)?;
            let client = build_client(DEFAULT_USER_AGENT, Duration::from_secs(12))?;
            let raw = fetch(&client, &url).await?;
            let mut index = load_or_create(&config)?;
            let id = index.add_document(raw);
            save_index(&config, &index)?;
            println!("added {id} from {url}");
            Ok(())
        }
        Commands::Update { id, file } => {
            let raw = single_document(&file)?;
            let mut index = load_index(&config)?;
            index.update_document(id, raw)?;
            save_index(&config, &index)?;
            println!("updated {id}");
            Ok(())
        }
        Commands::Remove { ids } => {
            let mut index = load_index(&config)?;
            let removed = index.remove_documents(&ids);
            if !removed.is_empty() {
                save_index(&config, &index)?;
            }
            println!("removed {removed:?}");
            Ok(())
        }
        Commands::Stats => {
            let index = load_index(&config)?;
            let stats = index.stats();
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Commands::Eval { docs, queries, output, k } => run_eval(&config, &docs, &queries, &output, k),
    }
}

fn load_input(input: &Path) -> Result<Vec<RawDocument>> {
    if input.is_dir() {
        return Ok(load_json_documents(input)?);
    }
    match input.extension().and_then(|s| s.to_str()) {
        Some("csv") => Ok(load_csv_documents(input)?.into_iter().map(|d| d.raw).collect()),
        Some("json" | "jsonl") => Ok(load_json_document(input)?),
        _ => Err(anyhow!("unsupported input {}", input.display())),
    }
}

fn build_index(config: &EngineConfig, input: &Path) -> Result<()> {
    let raws = load_input(input)?;
    if raws.is_empty() {
        bail!("no documents found in {}", input.display());
    }
    let mut index = SearchIndex::from_config(config);
    index.add_documents(raws);
    save_index(config, &index)?;
    tracing::info!(output = %config.index_path.display(), documents = index.len(), "index build complete");
    Ok(())
}

fn single_document(file: &Path) -> Result<RawDocument> {
    let mut docs = load_json_document(file)?;
    if docs.len() != 1 {
        bail!("{} holds {} documents, expected one", file.display(), docs.len());
    }
    Ok(docs.remove(0))
}

fn run_eval(config: &EngineConfig, docs: &Path, queries: &Path, output: &Path, k: usize) -> Result<()> {
    let collection = load_csv_documents(docs)?;
    let queries = load_csv_queries(queries)?;
    let mut index = SearchIndex::from_config(config);
    let external_ids = index_collection(&mut index, collection);
    let lines = trec_run(&index, &queries, &external_ids, k)?;
    let mut text = lines.join("\n");
    text.push('\n');
    fs::write(output, text).with_context(|| format!("writing {}", output.display()))?;
    tracing::info!(queries = queries.len(), lines = lines.len(), output = %output.display(), "run written");
    Ok(())
}

/// Read side of the configured index. The file-based layout is searched in
/// place; the single-file layout is loaded whole.
enum Reader {
    Memory(SearchIndex),
    Disk(DiskIndex),
}

impl Reader {
    fn open(config: &EngineConfig) -> Result<Self> {
        Ok(match config.layout {
            IndexLayout::FileBased => Reader::Disk(DiskIndex::open(config)?),
            IndexLayout::SingleFile => Reader::Memory(load_index(config)?),
        })
    }

    fn ranked(&self, query: &str, k: usize, field: FieldType, mode: SearchMode) -> Result<RankedResults> {
        Ok(match self {
            Reader::Memory(index) => index.search_ranked(query, k, field, mode)?,
            Reader::Disk(disk) => disk.search_ranked(query, k, field, mode)?,
        })
    }

    fn boolean(&self, query: &str, field: FieldType) -> Result<BooleanResults> {
        Ok(match self {
            Reader::Memory(index) => index.search_boolean(query, field),
            Reader::Disk(disk) => disk.search_boolean(query, field)?,
        })
    }

    fn lookup(&self, ids: &[DocId]) -> Result<Vec<(DocId, Option<Document>)>> {
        Ok(match self {
            Reader::Memory(index) => index
                .get_many(ids)
                .into_iter()
                .map(|lookup| match lookup {
                    Lookup::Found(doc) => (doc.id, Some(doc.clone())),
                    Lookup::NotFound(id) => (id, None),
                })
                .collect(),
            Reader::Disk(disk) => disk.get_many(ids)?,
        })
    }

    fn snippets(&self, ids: &[DocId], positions: &PositionMap, window: usize) -> Result<BTreeMap<DocId, Snippet>> {
        Ok(match self {
            Reader::Memory(index) => ids
                .iter()
                .filter_map(|&id| index.snippet(id, positions, window).map(|s| (id, s)))
                .collect(),
            Reader::Disk(disk) => disk.snippets(ids, positions, window)?,
        })
    }
}

fn print_hits(reader: &Reader, hits: &[(DocId, Option<f32>)], positions: &PositionMap, window: Option<usize>) -> Result<()> {
    let ids: Vec<DocId> = hits.iter().map(|(id, _)| *id).collect();
    let docs: BTreeMap<DocId, Document> = reader
        .lookup(&ids)?
        .into_iter()
        .filter_map(|(id, doc)| doc.map(|d| (id, d)))
        .collect();
    let snippets = match window {
        Some(window) => reader.snippets(&ids, positions, window)?,
        None => BTreeMap::new(),
    };

    for (rank, (id, score)) in hits.iter().enumerate() {
        let Some(doc) = docs.get(id) else { continue };
        let lang = doc.lang.as_deref().unwrap_or("?");
        match score {
            Some(score) => println!("{:>3}. [{id}] {} ({score:.4}, {lang})", rank + 1, doc.title),
            None => println!("{:>3}. [{id}] {} ({lang})", rank + 1, doc.title),
        }
        if let Some(snippet) = snippets.get(id) {
            println!("     ...{}...", snippet.marked("[", "]"));
        }
    }
    Ok(())
}
