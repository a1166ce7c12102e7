use super::estimate_token_count as estimate_token_count_impl;
use super::*;

fn sample_text(len: usize) -> String {
    "abcdefghijklmnopqrstuvwxyz".chars().cycle().take(len).collect()
}

fn create_test_document(content: &str) -> Document {
    let mut metadata = BTreeMap::new();
    metadata.insert("source".to_string(), "https://example.com/guide".to_string());
    metadata.insert("title".to_string(), "Guide".to_string());
    Document {
        source: "https://example.com/guide".to_string(),
        content: content.to_string(),
        metadata,
        fetch_failure: None,
    }
}

#[test]
fn estimate_token_count() {
    assert_eq!(estimate_token_count_impl("hello world"), 2);
    assert_eq!(estimate_token_count_impl("This is a test."), 5);
    assert_eq!(estimate_token_count_impl(""), 0);
}

#[test]
fn empty_text_produces_no_chunks() {
    let chunks = split("", 10, 0).expect("valid config");
    assert!(chunks.is_empty());
}

#[test]
fn splits_2500_chars_into_three_chunks() {
    let text = sample_text(2500);
    let chunks = split(&text, 1000, 0).expect("valid config");

    let lengths: Vec<usize> = chunks.iter().map(|c| c.chars().count()).collect();
    assert_eq!(lengths, vec![1000, 1000, 500]);
}

#[test]
fn zero_overlap_reconstructs_text() {
    for (len, max_size) in [(1, 1), (7, 3), (99, 10), (100, 10), (1234, 1000)] {
        let text = sample_text(len);
        let chunks = split(&text, max_size, 0).expect("valid config");
        assert_eq!(chunks.concat(), text, "len={len} max_size={max_size}");
    }
}

#[test]
fn chunks_never_exceed_max_size() {
    let text = sample_text(537);
    for (max_size, overlap) in [(1, 0), (10, 0), (10, 3), (64, 63), (600, 50)] {
        let chunks = split(&text, max_size, overlap).expect("valid config");
        assert!(!chunks.is_empty());
        assert!(
            chunks.iter().all(|c| c.chars().count() <= max_size),
            "max_size={max_size} overlap={overlap}"
        );
    }
}

#[test]
fn overlap_repeats_tail_as_head() {
    let text = "0123456789abcdef";
    let chunks = split(text, 6, 2).expect("valid config");

    assert_eq!(chunks, vec!["012345", "456789", "89abcd", "cdef"]);
    for pair in chunks.windows(2) {
        let tail: String = pair[0].chars().skip(4).collect();
        assert!(pair[1].starts_with(&tail));
    }
}

#[test]
fn overlap_stops_once_end_is_reached() {
    // The second window already ends the text, so no fully-overlapped third chunk
    let chunks = split("abcdefgh", 5, 2).expect("valid config");
    assert_eq!(chunks, vec!["abcde", "defgh"]);
}

#[test]
fn short_text_is_single_chunk() {
    let chunks = split("tiny", 1000, 100).expect("valid config");
    assert_eq!(chunks, vec!["tiny"]);
}

#[test]
fn multibyte_characters_count_as_one() {
    let text = "héllo wörld ✓✓✓";
    let chunks = split(text, 4, 0).expect("valid config");

    assert!(chunks.iter().all(|c| c.chars().count() <= 4));
    assert_eq!(chunks.concat(), text);
    assert_eq!(chunks[0], "héll");
}

#[test]
fn split_is_deterministic() {
    let text = sample_text(3001);
    let first = split(&text, 333, 33).expect("valid config");
    let second = split(&text, 333, 33).expect("valid config");
    assert_eq!(first, second);
}

#[test]
fn invalid_configurations_are_rejected() {
    assert!(matches!(
        split("text", 0, 0),
        Err(ConfigError::InvalidMaxChunkSize(0))
    ));
    assert!(matches!(
        split("text", 10, 10),
        Err(ConfigError::InvalidOverlapSize {
            overlap: 10,
            max_size: 10
        })
    ));
    assert!(ChunkingConfig::new(10, 9).is_ok());
}

#[test]
fn chunk_document_copies_metadata_and_indexes() {
    let document = create_test_document(&sample_text(25));
    let config = ChunkingConfig::new(10, 0).expect("valid config");

    let chunks = chunk_document(&document, &config).expect("valid config");

    assert_eq!(chunks.len(), 3);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index, i);
        assert_eq!(chunk.source, document.source);
        assert_eq!(chunk.metadata, document.metadata);
    }
    assert_eq!(chunks[2].text.len(), 5);
}

#[test]
fn chunk_empty_document() {
    let document = create_test_document("");
    let chunks = chunk_document(&document, &ChunkingConfig::default()).expect("valid config");
    assert!(chunks.is_empty());
}

#[test]
fn unvalidated_config_is_rejected_not_panicking() {
    let document = create_test_document("abcdefgh");

    for (max_size, overlap) in [(4, 4), (4, 9), (0, 0)] {
        let config = ChunkingConfig { max_size, overlap };
        assert!(
            chunk_document(&document, &config).is_err(),
            "max_size={max_size} overlap={overlap}"
        );
        assert!(split_with_config("abcdefgh", &config).is_err());
        assert_eq!(config.stride(), max_size.saturating_sub(overlap));
    }
    assert!(matches!(
        chunk_document(&document, &ChunkingConfig { max_size: 4, overlap: 4 }),
        Err(ConfigError::InvalidOverlapSize {
            overlap: 4,
            max_size: 4
        })
    ));
}
