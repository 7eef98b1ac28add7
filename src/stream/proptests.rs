//! Property-based tests for the stream decoder
//!
//! Chunking of the transport must never change the decoded event sequence.

use super::*;
use crate::turn::SimilarityScores;
use proptest::prelude::*;

fn arb_text() -> impl Strategy<Value = String> {
    // Include multi-byte characters and embedded newlines
    "[a-zA-Z0-9 .,!?é✓\n]{0,40}"
}

fn arb_context_turn() -> impl Strategy<Value = ContextTurn> {
    ((1u32..500), arb_text(), arb_text()).prop_map(|(id, user, assistant)| ContextTurn {
        id: id.to_string(),
        user,
        assistant,
    })
}

fn arb_metadata() -> impl Strategy<Value = Metadata> {
    proptest::collection::vec((arb_context_turn(), 0u8..=100), 0..4).prop_map(|turns| {
        let similarity_scores: SimilarityScores = turns
            .iter()
            .map(|(turn, pct)| (turn.id.clone(), f64::from(*pct) / 100.0))
            .collect();
        Metadata {
            context_turns: turns.into_iter().map(|(turn, _)| turn).collect(),
            similarity_scores,
        }
    })
}

fn arb_event() -> impl Strategy<Value = StreamEvent> {
    prop_oneof![
        arb_metadata().prop_map(StreamEvent::Metadata),
        arb_text().prop_map(StreamEvent::chunk),
        (1u32..10_000).prop_map(|id| StreamEvent::done(id.to_string())),
    ]
}

fn encode_all(events: &[StreamEvent]) -> Vec<u8> {
    events.iter().map(StreamEvent::encode).collect::<String>().into_bytes()
}

fn decode_in_chunks(bytes: &[u8], sizes: &[usize]) -> Vec<StreamEvent> {
    let mut decoder = StreamDecoder::new();
    let mut events = Vec::new();
    let mut rest = bytes;
    let mut sizes = sizes.iter().cycle();
    while !rest.is_empty() {
        let size = sizes.next().copied().unwrap_or(rest.len()).clamp(1, rest.len());
        let (head, tail) = rest.split_at(size);
        events.extend(decoder.feed(head));
        rest = tail;
    }
    assert_eq!(decoder.finish(), 0);
    events
}

#[test]
fn single_event_at_every_split_point() {
    let events = vec![
        StreamEvent::Metadata(Metadata {
            context_turns: vec![ContextTurn {
                id: "1".to_string(),
                user: "a".to_string(),
                assistant: "b ✓".to_string(),
            }],
            similarity_scores: [("1".to_string(), 0.65)].into_iter().collect(),
        }),
        StreamEvent::chunk("héllo\nthere"),
        StreamEvent::done("42"),
    ];

    for event in events {
        let wire = event.encode().into_bytes();
        let mut whole = StreamDecoder::new();
        let expected = whole.feed(&wire);
        assert_eq!(expected, vec![event.clone()]);

        for split in 0..=wire.len() {
            let mut decoder = StreamDecoder::new();
            let mut got = decoder.feed(&wire[..split]);
            got.extend(decoder.feed(&wire[split..]));
            assert_eq!(got, expected, "split at byte {split}");
            assert_eq!(decoder.decode_errors(), 0);
        }
    }
}

proptest! {
    #[test]
    fn chunking_does_not_change_events(
        events in proptest::collection::vec(arb_event(), 0..8),
        sizes in proptest::collection::vec(1usize..64, 1..16),
    ) {
        let bytes = encode_all(&events);
        prop_assert_eq!(decode_in_chunks(&bytes, &sizes), events);
    }

    #[test]
    fn corrupt_line_only_drops_itself(
        before in arb_event(),
        after in arb_event(),
        garbage in "\\{[a-z:, ]{0,20}",
    ) {
        let mut bytes = before.encode().into_bytes();
        bytes.extend_from_slice(format!("data: {garbage}\n").as_bytes());
        bytes.extend_from_slice(after.encode().as_bytes());

        let mut decoder = StreamDecoder::new();
        let got = decoder.feed(&bytes);
        prop_assert_eq!(got, vec![before, after]);
        prop_assert_eq!(decoder.decode_errors(), 1);
    }
}
