use criterion::{Criterion, criterion_group, criterion_main};
use embed_index::embeddings::chunking::{ChunkingConfig, chunk_document};
use embed_index::index::{Index, IndexEntry, Metric};
use embed_index::sources::Document;
use std::hint::black_box;

fn sample_text() -> String {
    (0..2_000)
        .map(|i| format!("Sentence {} describes part of a long reference manual.", i))
        .collect::<Vec<_>>()
        .join(" ")
}

fn sample_index(entries: usize, dimension: usize) -> Index {
    let mut index = Index::new(Metric::Cosine);
    let document = Document::new("bench", "x");
    let chunks = (0..entries).map(|i| {
        let chunk = embed_index::embeddings::Chunk {
            text: format!("entry {}", i),
            source: document.source.clone(),
            chunk_index: i,
            metadata: document.metadata.clone(),
        };
        let vector = (0..dimension)
            .map(|d| ((i * 31 + d * 7) % 97) as f32 / 97.0)
            .collect();
        IndexEntry::from_chunk(chunk, vector)
    });
    index
        .append(chunks.collect())
        .expect("vectors share a dimension");
    index
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let document = Document::new("bench", sample_text());
    let config = ChunkingConfig::default();
    c.bench_function("chunking", |b| {
        b.iter(|| chunk_document(black_box(&document), black_box(&config)))
    });

    let index = sample_index(5_000, 384);
    let query: Vec<f32> = (0..384).map(|d| (d % 13) as f32 / 13.0).collect();
    c.bench_function("search", |b| {
        b.iter(|| index.search(black_box(&query), black_box(10)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
