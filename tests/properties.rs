// Property tests for chunk boundary handling
//
// Inputs are generated CSV documents with quoted fields that embed
// delimiters, quotes, CR and LF, joined with LF or CRLF terminators.

use chunkcsv::core::{find_record_boundary, ScanState};
use chunkcsv::{
    BoundarySplitter, ChunkParser, ChunkPipeline, Dialect, ParseStrategy, ParsedChunk,
    PipelineConfig, Tokenizer,
};
use proptest::prelude::*;
use proptest::sample::Index;
use std::io::Cursor;

/// (raw field text, logical value)
fn field() -> impl Strategy<Value = (String, String)> {
    prop_oneof![
        "[a-z0-9 ]{0,6}".prop_map(|s| (s.clone(), s)),
        "[a-z,\n\r\"]{0,6}".prop_map(|s| (format!("\"{}\"", s.replace('"', "\"\"")), s)),
    ]
}

fn record() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(field(), 1..5)
}

/// Document text plus the logical rows it encodes. Every record is
/// terminated when `terminate_last` is true.
fn document(terminate_last: bool) -> impl Strategy<Value = (String, Vec<Vec<String>>)> {
    prop::collection::vec((record(), any::<bool>()), 0..12).prop_map(move |records| {
        let mut text = String::new();
        let mut rows = Vec::new();
        let count = records.len();
        for (i, (fields, crlf)) in records.into_iter().enumerate() {
            let raw: Vec<&str> = fields.iter().map(|(r, _)| r.as_str()).collect();
            text.push_str(&raw.join(","));
            if terminate_last || i + 1 < count {
                text.push_str(if crlf { "\r\n" } else { "\n" });
            }
            rows.push(fields.into_iter().map(|(_, v)| v).collect());
        }
        (text, rows)
    })
}

fn cuts(len: usize, picks: &[Index]) -> Vec<usize> {
    let mut cuts: Vec<usize> = picks.iter().map(|i| i.index(len + 1)).collect();
    cuts.sort_unstable();
    cuts.dedup();
    cuts
}

fn pieces<'a>(input: &'a [u8], cuts: &[usize]) -> Vec<&'a [u8]> {
    let mut out = Vec::new();
    let mut start = 0;
    for &cut in cuts {
        out.push(&input[start..cut]);
        start = cut;
    }
    out.push(&input[start..]);
    out
}

fn whole(text: &str) -> Vec<Vec<String>> {
    let rows = Tokenizer::new(Dialect::standard(), 64).tokenize(text);
    ParsedChunk::new(text.to_string(), rows, b'"').to_strings()
}

fn chunked(parser: &ChunkParser, chunks: &[&[u8]]) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut leftover = Vec::new();
    for chunk in chunks {
        let batch = parser.parse(chunk, &leftover).unwrap();
        rows.extend(batch.chunk.to_strings());
        leftover = batch.leftover;
    }
    if !leftover.is_empty() {
        rows.extend(parser.finalize(leftover).unwrap().to_strings());
    }
    rows
}

fn parser(strategy: ParseStrategy) -> ChunkParser {
    ChunkParser::new(&PipelineConfig::default().with_strategy(strategy)).unwrap()
}

proptest! {
    #[test]
    fn prop_complete_part_never_ends_inside_quotes(
        leftover in prop::collection::vec(prop::sample::select(b"ab,\"\n\r".to_vec()), 0..32),
        chunk in prop::collection::vec(prop::sample::select(b"ab,\"\n\r".to_vec()), 0..64),
    ) {
        let splitter = BoundarySplitter::new(Dialect::standard());
        let out = splitter.split(&leftover, &chunk);

        let quotes = out.complete.iter().filter(|&&b| b == b'"').count();
        prop_assert_eq!(quotes % 2, 0);
        if !out.complete.is_empty() {
            prop_assert_eq!(out.complete.last(), Some(&b'\n'));
        }

        let mut rejoined = out.complete.clone();
        rejoined.extend_from_slice(&out.leftover);
        let mut combined = leftover.clone();
        combined.extend_from_slice(&chunk);
        prop_assert_eq!(rejoined, combined);
    }

    #[test]
    fn prop_boundary_is_rightmost_unquoted_newline((text, _) in document(true)) {
        // A fully terminated document is complete as a whole
        let boundary = find_record_boundary(text.as_bytes(), &Dialect::standard());
        if text.is_empty() {
            prop_assert_eq!(boundary, None);
        } else {
            prop_assert_eq!(boundary, Some(text.len()));
        }
    }

    #[test]
    fn prop_resumed_split_matches_full_split(
        (text, _) in document(false),
        picks in prop::collection::vec(any::<Index>(), 0..8),
    ) {
        let splitter = BoundarySplitter::new(Dialect::standard());
        let cuts = cuts(text.len(), &picks);
        let mut state = ScanState::default();
        let mut resumed = Vec::new();
        let mut full = Vec::new();
        for piece in pieces(text.as_bytes(), &cuts) {
            resumed.extend_from_slice(piece);
            full.extend_from_slice(piece);
            let a = splitter.split_resume(resumed, &mut state);
            let b = splitter.split_owned(full);
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(state.scanned, a.leftover.len());
            resumed = a.leftover;
            full = b.leftover;
        }
    }

    #[test]
    fn prop_tokenizer_recovers_records((text, rows) in document(true)) {
        prop_assert_eq!(whole(&text), rows);
    }

    #[test]
    fn prop_split_anywhere_matches_whole(
        (text, _) in document(false),
        picks in prop::collection::vec(any::<Index>(), 0..6),
    ) {
        let expected = whole(&text);
        let cuts = cuts(text.len(), &picks);
        let chunks = pieces(text.as_bytes(), &cuts);
        for strategy in [ParseStrategy::SplitThenTokenize, ParseStrategy::LeftoverCombine] {
            prop_assert_eq!(chunked(&parser(strategy), &chunks), expected.clone(), "{:?} cuts {:?}", strategy, cuts);
        }
    }

    #[test]
    fn prop_leftover_composes(
        (text, _) in document(false),
        picks in prop::collection::vec(any::<Index>(), 2..3),
    ) {
        let cuts = cuts(text.len(), &picks);
        let bytes = text.as_bytes();
        let (first, rest) = bytes.split_at(cuts[0]);
        let (chunk, next) = rest.split_at(cuts[cuts.len() - 1] - cuts[0]);

        for strategy in [ParseStrategy::SplitThenTokenize, ParseStrategy::LeftoverCombine] {
            let p = parser(strategy);
            // Step by step, starting from `first` as the carried leftover
            let a = p.parse(chunk, first).unwrap();
            let b = p.parse(next, &a.leftover).unwrap();
            let mut stepped = a.chunk.to_strings();
            stepped.extend(b.chunk.to_strings());

            // One call over the concatenation
            let once = p.parse(bytes, &[]).unwrap();
            prop_assert_eq!(&b.leftover, &once.leftover);
            prop_assert_eq!(stepped, once.chunk.to_strings());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_pipeline_matches_whole(
        (text, _) in document(false),
        chunk_size in 1usize..24,
        max_concurrency in 1usize..4,
    ) {
        let expected = whole(&text);
        let pipeline = ChunkPipeline::new(
            PipelineConfig::default()
                .with_chunk_size(chunk_size)
                .with_max_concurrency(max_concurrency)
                .with_workers(2),
        )
        .unwrap();
        let (results, summary) = pipeline.collect(Cursor::new(text.clone().into_bytes())).unwrap();
        let rows: Vec<Vec<String>> = results
            .iter()
            .filter_map(|r| r.parsed())
            .flat_map(|p| p.to_strings())
            .collect();
        prop_assert_eq!(rows, expected);
        prop_assert!(summary.peak_in_flight <= max_concurrency);
        let sequences: Vec<u64> = results.iter().map(|r| r.sequence).collect();
        prop_assert_eq!(sequences, (0..results.len() as u64).collect::<Vec<_>>());
    }
}
