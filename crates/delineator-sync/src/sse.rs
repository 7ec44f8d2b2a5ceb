//! Server-sent events transport.
//!
//! [`SseTransport`] opens a long-lived `GET` against the upstream stream
//! endpoint and turns the chunked response body into whole event payloads
//! with [`SseDecoder`].

use std::collections::VecDeque;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};

use delineator_core::config::UpstreamConfig;

use crate::error::SyncError;
use crate::transport::{MessageStream, StreamTransport};

/// Incremental `text/event-stream` decoder.
///
/// Feed it raw body chunks in arrival order; it yields the `data` of every
/// completed event. Multiple `data:` lines of one event are joined with
/// `\n`. Comment lines and fields other than `data` are ignored. Both `\n`
/// and `\r\n` line endings are accepted, and chunks may split lines (or
/// UTF-8 sequences) anywhere.
///
/// A pending line or event larger than the configured limit is an error;
/// the decoder is reset so the caller can drop the stream and reconnect.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    scanned: usize,
    data: Vec<String>,
    data_len: usize,
    max_bytes: usize,
}

impl SseDecoder {
    /// Create an empty decoder that accepts lines and events of up to
    /// `max_bytes`.
    pub const fn new(max_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            data: Vec::new(),
            data_len: 0,
            max_bytes,
        }
    }

    /// Consume a chunk and return the events it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<String>, SyncError> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = self
            .buffer
            .get(self.scanned..)
            .and_then(|rest| rest.iter().position(|b| *b == b'\n'))
        {
            let end = self.scanned.saturating_add(offset);
            let raw = self.buffer.get(start..end).unwrap_or_default();
            let line = String::from_utf8_lossy(raw).into_owned();
            start = end.saturating_add(1);
            self.scanned = start;
            if let Some(event) = self.line(line.trim_end_matches('\r'))? {
                events.push(event);
            }
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        if self.buffer.len() > self.max_bytes {
            let pending = self.buffer.len();
            self.reset();
            return Err(SyncError::Stream(format!(
                "stream line exceeds {} bytes ({pending} pending without a newline)",
                self.max_bytes
            )));
        }
        Ok(events)
    }

    fn line(&mut self, line: &str) -> Result<Option<String>, SyncError> {
        if line.is_empty() {
            if self.data.is_empty() {
                return Ok(None);
            }
            let event = self.data.join("\n");
            self.data.clear();
            self.data_len = 0;
            return Ok(Some(event));
        }
        if line.starts_with(':') {
            return Ok(None);
        }
        let (field, value) = line
            .split_once(':')
            .map_or((line, ""), |(f, v)| (f, v.strip_prefix(' ').unwrap_or(v)));
        if field == "data" {
            self.data_len = self.data_len.saturating_add(value.len());
            if self.data_len > self.max_bytes {
                self.reset();
                return Err(SyncError::Stream(format!(
                    "stream event exceeds {} bytes",
                    self.max_bytes
                )));
            }
            self.data.push(value.to_owned());
        }
        Ok(None)
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
        self.data.clear();
        self.data_len = 0;
    }
}

/// Event stream transport over HTTP.
#[derive(Debug, Clone)]
pub struct SseTransport {
    client: reqwest::Client,
    url: String,
    max_event_bytes: usize,
}

impl SseTransport {
    /// Build a transport for the configured stream endpoint.
    ///
    /// Only the connect phase is bounded by the request timeout; an open
    /// stream may stay silent indefinitely (see the idle watchdog).
    pub fn new(config: &UpstreamConfig) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| SyncError::Client(e.to_string()))?;
        Ok(Self {
            client,
            url: config.stream_url(),
            max_event_bytes: config.max_event_bytes,
        })
    }

    /// The stream URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl StreamTransport for SseTransport {
    async fn connect(&self) -> Result<MessageStream, SyncError> {
        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| SyncError::Request {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(SyncError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(url = %self.url, "event stream opened");

        let body = response.bytes_stream().boxed();
        let state = (body, SseDecoder::new(self.max_event_bytes), VecDeque::new());
        let events = futures::stream::unfold(state, |(mut body, mut decoder, mut ready)| async move {
            loop {
                if let Some(event) = ready.pop_front() {
                    return Some((Ok(event), (body, decoder, ready)));
                }
                match body.next().await {
                    Some(Ok(chunk)) => match decoder.feed(&chunk) {
                        Ok(events) => ready.extend(events),
                        Err(e) => return Some((Err(e), (body, decoder, ready))),
                    },
                    Some(Err(e)) => {
                        return Some((Err(SyncError::Stream(e.to_string())), (body, decoder, ready)));
                    }
                    None => return None,
                }
            }
        });
        Ok(events.boxed())
    }
}
