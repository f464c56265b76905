//! Server-Sent Events framing.
//!
//! [`SseLineDecoder`] is the synchronous half: it buffers raw bytes, splits
//! off complete lines and classifies `data:` payloads. [`sse_json_stream`]
//! drives it over an async byte stream and parses each payload as JSON.
//!
//! Bytes are buffered before UTF-8 decoding so a multibyte character split
//! across two network chunks survives intact.

use std::collections::VecDeque;

use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::ChatError;

/// Sentinel payload that ends a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

const DATA_PREFIX: &str = "data:";
const LOG_PREVIEW_CHARS: usize = 120;

/// One classified `data:` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseData {
    Payload(String),
    Done,
}

/// Incremental line splitter for an SSE body.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: Vec<u8>,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return the data payloads of every line it completed.
    /// The trailing incomplete line stays buffered.
    ///
    /// Only the new bytes are scanned: everything already buffered is known
    /// to hold no newline. Consumed lines are drained once per call.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseData> {
        let scan_from = self.buffer.len();
        self.buffer.extend_from_slice(chunk);

        let mut out = Vec::new();
        let mut line_start = 0;
        for (offset, &byte) in self.buffer[scan_from..].iter().enumerate() {
            if byte == b'\n' {
                let end = scan_from + offset;
                if let Some(data) = classify_line(&self.buffer[line_start..end]) {
                    out.push(data);
                }
                line_start = end + 1;
            }
        }
        self.buffer.drain(..line_start);
        out
    }

    /// Flush a final line that was never newline-terminated.
    pub fn finish(&mut self) -> Option<SseData> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        classify_line(&line)
    }

    /// Bytes held back waiting for a newline.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Classify one line (without its `\n`). Non-data lines yield `None`.
fn classify_line(raw: &[u8]) -> Option<SseData> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches('\r');
    let payload = line.strip_prefix(DATA_PREFIX)?;
    let payload = payload.strip_prefix(' ').unwrap_or(payload);
    if payload.trim() == DONE_SENTINEL {
        Some(SseData::Done)
    } else {
        Some(SseData::Payload(payload.to_string()))
    }
}

fn preview(payload: &str) -> String {
    payload.chars().take(LOG_PREVIEW_CHARS).collect()
}

struct SseState<S> {
    body: std::pin::Pin<Box<S>>,
    decoder: SseLineDecoder,
    pending: VecDeque<SseData>,
    finished: bool,
}

/// Turn a byte stream into a lazy stream of parsed JSON events.
///
/// - `data: [DONE]` ends the stream without yielding.
/// - A payload that is not valid JSON for `T` is logged and skipped.
/// - A transport error is yielded once, then the stream ends.
/// - End of input ends the stream after flushing any final unterminated line.
///
/// The body is owned by the returned stream, so it is dropped on every exit
/// path including the consumer dropping the stream early.
pub fn sse_json_stream<S, B, E, T>(body: S) -> impl Stream<Item = Result<T, ChatError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<ChatError>,
    T: DeserializeOwned,
{
    let state = SseState {
        body: Box::pin(body),
        decoder: SseLineDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures_util::stream::unfold(state, |mut st| async move {
        loop {
            while let Some(item) = st.pending.pop_front() {
                match item {
                    SseData::Done => return None,
                    SseData::Payload(payload) => match serde_json::from_str::<T>(&payload) {
                        Ok(event) => return Some((Ok(event), st)),
                        Err(e) => {
                            warn!(error = %e, payload = %preview(&payload), "skipping malformed SSE event");
                        }
                    },
                }
            }

            if st.finished {
                return None;
            }

            match st.body.next().await {
                Some(Ok(chunk)) => {
                    let decoded = st.decoder.push(chunk.as_ref());
                    st.pending.extend(decoded);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e.into()), st));
                }
                None => {
                    st.finished = true;
                    st.pending.extend(st.decoder.finish());
                }
            }
        }
    })
}
