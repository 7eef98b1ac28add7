//! Streamed reply decoding
//!
//! The backend answers a message with newline-delimited `data:` lines, each
//! carrying one JSON event. Fragments arrive with arbitrary chunking.

mod decoder;
mod event;

#[cfg(test)]
mod proptests;

pub use decoder::{DecodeError, StreamDecoder, EVENT_PREFIX};
pub use event::{ContextTurn, Metadata, StreamEvent};

use futures::stream::{self, Stream, StreamExt};
use std::collections::VecDeque;

/// Decode a fragment stream lazily into typed events
///
/// Transport errors pass through and end the sequence. Decode errors on
/// single lines are absorbed by the decoder.
pub fn decode_stream<S, B, E>(fragments: S) -> impl Stream<Item = Result<StreamEvent, E>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    let state = DecodeState {
        fragments,
        decoder: StreamDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }
            match state.fragments.next().await {
                Some(Ok(bytes)) => state.pending.extend(state.decoder.feed(bytes.as_ref())),
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.decoder.finish();
                    state.finished = true;
                }
            }
        }
    })
}

struct DecodeState<S> {
    fragments: S,
    decoder: StreamDecoder,
    pending: VecDeque<StreamEvent>,
    finished: bool,
}
