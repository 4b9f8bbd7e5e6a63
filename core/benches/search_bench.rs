use criterion::{criterion_group, criterion_main, Criterion};
use docseek_core::{FieldType, RawDocument, SearchIndex, SearchMode};

const WORDS: &[&str] = &[
    "witcher", "sword", "silver", "steel", "monster", "contract", "coin", "horse", "keep", "mountain",
    "sorceress", "portal", "elder", "blood", "wolf", "school", "potion", "sign", "mutation", "trial",
];

fn corpus(n: usize) -> Vec<RawDocument> {
    (0..n)
        .map(|i| {
            let content: Vec<&str> = (0..120).map(|j| WORDS[(i * 7 + j * 13 + j / 5) % WORDS.len()]).collect();
            RawDocument::new(format!("{} {}", WORDS[i % WORDS.len()], WORDS[(i / 3) % WORDS.len()]), content.join(" "))
        })
        .collect()
}

fn bench_search(c: &mut Criterion) {
    let mut index = SearchIndex::new();
    index.add_documents(corpus(500));

    c.bench_function("ranked_all", |b| {
        b.iter(|| index.search_ranked("silver sword monster", 10, FieldType::All, SearchMode::Plain))
    });
    c.bench_function("ranked_proximity", |b| {
        b.iter(|| index.search_ranked("silver sword", 10, FieldType::Content, SearchMode::Proximity(3)))
    });
    c.bench_function("boolean", |b| {
        b.iter(|| index.search_boolean("(wolf OR bear) AND NOT potion", FieldType::All))
    });
}

fn bench_rebuild(c: &mut Criterion) {
    let mut index = SearchIndex::new();
    index.add_documents(corpus(200));
    c.bench_function("rebuild_200", |b| b.iter(|| index.rebuild()));
}

criterion_group!(benches, bench_search, bench_rebuild);
criterion_main!(benches);
