//! Newline-delimited JSON deframing for Ollama's streaming endpoints.

use std::collections::VecDeque;

use futures::{stream, Stream, StreamExt};
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::error::{EngineError, Result};

/// Splits a byte stream into complete lines.
///
/// Bytes are buffered until a `\n` arrives, so a multi-byte character cut
/// across two network reads is decoded intact.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buf: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every line completed by them (blank lines skipped).
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(line) = decode_line(&line) {
                lines.push(line);
            }
        }
        lines
    }

    /// The unterminated tail, if any, once the input has ended.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        decode_line(&rest)
    }
}

fn decode_line(bytes: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(bytes);
    let line = line.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

struct DecodeState<S> {
    inner: std::pin::Pin<Box<S>>,
    decoder: NdjsonDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

/// Parse each line of `bytes` as a `T`. Reads from `bytes` only when the
/// consumer polls and no parsed line is pending.
pub fn decode_stream<S, B, T>(bytes: S) -> impl Stream<Item = Result<T>> + Send
where
    S: Stream<Item = Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    T: DeserializeOwned + Send + 'static,
{
    let state = DecodeState { inner: Box::pin(bytes), decoder: NdjsonDecoder::new(), pending: VecDeque::new(), finished: false };
    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(line) = st.pending.pop_front() {
                trace!(line = %line, "ndjson line");
                let item = serde_json::from_str::<T>(&line)
                    .map_err(|e| EngineError::InvalidResponse(format!("{e}: {line}")));
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(chunk)) => {
                    let lines = st.decoder.push(chunk.as_ref());
                    st.pending.extend(lines);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.finished = true;
                    if let Some(rest) = st.decoder.finish() {
                        st.pending.push_back(rest);
                    }
                }
            }
        }
    })
}
