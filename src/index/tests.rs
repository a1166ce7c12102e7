use super::*;

fn entry(source: &str, chunk_index: usize, vector: Vec<f32>) -> IndexEntry {
    IndexEntry::from_chunk(
        Chunk {
            text: format!("{source}#{chunk_index}"),
            source: source.to_string(),
            chunk_index,
            metadata: BTreeMap::new(),
        },
        vector,
    )
}

fn texts(results: &[SearchResult]) -> Vec<&str> {
    results.iter().map(|r| r.entry.text.as_str()).collect()
}

#[test]
fn metric_parsing_and_display() {
    assert_eq!("cosine".parse::<Metric>().expect("parses"), Metric::Cosine);
    assert_eq!(" Euclidean ".parse::<Metric>().expect("parses"), Metric::Euclidean);
    assert_eq!("l2".parse::<Metric>().expect("parses"), Metric::Euclidean);
    assert!(matches!(
        "manhattan".parse::<Metric>(),
        Err(ConfigError::UnknownMetric(_))
    ));
    assert_eq!(Metric::Cosine.to_string(), "cosine");
    assert_eq!(Metric::Euclidean.to_string(), "euclidean");
}

#[test]
fn cosine_distance() {
    let metric = Metric::Cosine;
    assert!(metric.distance(&[1.0, 0.0], &[2.0, 0.0]).abs() < 1e-6);
    assert!((metric.distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
    assert!((metric.distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
    assert!((metric.distance(&[0.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
}

#[test]
fn euclidean_distance() {
    let metric = Metric::Euclidean;
    assert!((metric.distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-6);
    assert!(metric.distance(&[1.5, -2.0], &[1.5, -2.0]).abs() < 1e-6);
    assert!((metric.score(0.0) - 1.0).abs() < 1e-6);
}

#[test]
fn append_sets_dimension_and_keeps_order() {
    let mut index = Index::new(Metric::Cosine);
    assert_eq!(index.dimension(), None);

    let added = index
        .append(vec![entry("a", 0, vec![1.0, 0.0]), entry("a", 1, vec![0.0, 1.0])])
        .expect("append succeeds");
    assert_eq!(added, 2);
    index
        .append(vec![entry("b", 0, vec![1.0, 1.0])])
        .expect("append succeeds");

    assert_eq!(index.dimension(), Some(2));
    assert_eq!(index.len(), 3);
    let order: Vec<&str> = index.entries().iter().map(|e| e.text.as_str()).collect();
    assert_eq!(order, vec!["a#0", "a#1", "b#0"]);
    assert_eq!(index.sources(), vec!["a", "b"]);
}

#[test]
fn append_is_all_or_nothing() {
    let mut index = Index::new(Metric::Cosine);
    index
        .append(vec![entry("a", 0, vec![1.0, 0.0, 0.0])])
        .expect("append succeeds");

    let result = index.append(vec![
        entry("b", 0, vec![1.0, 0.0, 0.0]),
        entry("b", 1, vec![1.0, 0.0]),
    ]);

    assert!(matches!(
        result,
        Err(IndexError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    ));
    assert_eq!(index.len(), 1);
}

#[test]
fn append_rejects_mismatched_dimension() {
    let mut index = Index::new(Metric::Cosine);
    index
        .append(vec![entry("a", 0, vec![0.5; 1024])])
        .expect("append succeeds");

    let result = index.append(vec![entry("b", 0, vec![0.5; 768])]);
    assert!(matches!(
        result,
        Err(IndexError::DimensionMismatch {
            expected: 1024,
            actual: 768
        })
    ));
    assert!(index.check_dimension(1024).is_ok());
}

#[test]
fn append_nothing_is_a_no_op() {
    let mut index = Index::new(Metric::Euclidean);
    assert_eq!(index.append(Vec::new()).expect("append succeeds"), 0);
    assert_eq!(index.dimension(), None);
}

#[test]
fn search_orders_by_distance() {
    let mut index = Index::new(Metric::Euclidean);
    index
        .append(vec![
            entry("far", 0, vec![10.0, 0.0]),
            entry("near", 0, vec![1.0, 0.0]),
            entry("mid", 0, vec![5.0, 0.0]),
        ])
        .expect("append succeeds");

    let results = index.search(&[0.0, 0.0], 2).expect("search succeeds");

    assert_eq!(texts(&results), vec!["near#0", "mid#0"]);
    assert!((results[0].distance - 1.0).abs() < 1e-6);
    assert!(results[0].similarity_score > results[1].similarity_score);
}

#[test]
fn search_ties_keep_insertion_order() {
    let mut index = Index::new(Metric::Cosine);
    index
        .append(vec![
            entry("first", 0, vec![1.0, 0.0]),
            entry("other", 0, vec![0.0, 1.0]),
            entry("second", 0, vec![2.0, 0.0]),
            entry("third", 0, vec![3.0, 0.0]),
        ])
        .expect("append succeeds");

    let results = index.search(&[1.0, 0.0], 3).expect("search succeeds");
    assert_eq!(texts(&results), vec!["first#0", "second#0", "third#0"]);
}

#[test]
fn search_returns_everything_when_k_exceeds_len() {
    let mut index = Index::new(Metric::Cosine);
    index
        .append(vec![entry("a", 0, vec![1.0]), entry("b", 0, vec![-1.0])])
        .expect("append succeeds");

    let results = index.search(&[1.0], 10).expect("search succeeds");
    assert_eq!(results.len(), 2);
}

#[test]
fn search_argument_errors() {
    let mut index = Index::new(Metric::Cosine);
    assert!(
        index
            .search(&[1.0, 2.0], 1)
            .expect("empty index searches")
            .is_empty()
    );

    index
        .append(vec![entry("a", 0, vec![1.0, 2.0])])
        .expect("append succeeds");

    assert!(matches!(
        index.search(&[1.0, 2.0], 0),
        Err(IndexError::InvalidArgument(_))
    ));
    assert!(matches!(
        index.search(&[1.0, 2.0, 3.0], 1),
        Err(IndexError::DimensionMismatch {
            expected: 2,
            actual: 3
        })
    ));
}

#[test]
fn entries_get_unique_ids() {
    let a = entry("a", 0, vec![1.0]);
    let b = entry("a", 0, vec![1.0]);
    assert_ne!(a.id, b.id);
}
