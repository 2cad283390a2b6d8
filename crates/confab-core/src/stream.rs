//! Incremental output streaming
//!
//! The backend reports the full accumulated message on every poll. This
//! module computes the minimal terminal-safe delta between consecutive
//! snapshots and hands it to a pluggable sink. Deltas are computed over
//! raw bytes, so a retroactive correction that lands inside a multi-byte
//! UTF-8 sequence erases exactly the stale bytes and no more.

use std::io::{self, Write};

/// One reconciliation step: erase that many trailing bytes of the
/// previously rendered output, then append these bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamDelta {
    /// Number of trailing bytes of the previous snapshot to erase
    pub erase: usize,

    /// Bytes to append after erasing
    pub append: Vec<u8>,
}

impl StreamDelta {
    /// True when the delta neither erases nor appends anything
    pub fn is_empty(&self) -> bool {
        self.erase == 0 && self.append.is_empty()
    }

    /// Appended bytes as text, when they happen to form complete UTF-8
    pub fn append_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.append).ok()
    }
}

/// Length of the longest common byte prefix of two sequences
fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Computes the delta that rewrites `previous` into `current`.
///
/// Both inputs are full snapshots of the accumulated message and must be
/// complete valid UTF-8; [`ChatBackend::get_message`] returning owned
/// strings makes that hold structurally. The appended bytes of a single
/// delta may still end mid-character when the divergence point splits a
/// sequence; concatenating consecutive deltas restores well-formed text,
/// and terminal sinks write raw bytes so rendering stays correct.
///
/// [`ChatBackend::get_message`]: crate::backend::ChatBackend::get_message
pub fn reconcile(previous: &[u8], current: &[u8]) -> StreamDelta {
    let p = common_prefix_len(previous, current);
    StreamDelta {
        erase: previous.len() - p,
        append: current[p..].to_vec(),
    }
}

/// Snapshot holder for one generate call.
///
/// Created when the call starts, discarded when it ends; never persisted
/// on the session.
#[derive(Debug, Default)]
pub struct StreamState {
    last: Vec<u8>,
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diffs `message` against the stored snapshot and replaces it
    pub fn advance(&mut self, message: &str) -> StreamDelta {
        let delta = reconcile(&self.last, message.as_bytes());
        self.last.clear();
        self.last.extend_from_slice(message.as_bytes());
        delta
    }
}

/// Receives reconciliation deltas during a generate call.
///
/// Sinks hold no cadence state; the poll interval is a parameter of
/// [`ChatSession::generate`](crate::session::ChatSession::generate).
pub trait StreamSink: Send {
    /// Render one delta
    fn on_delta(&mut self, delta: &StreamDelta) -> io::Result<()>;

    /// Called exactly once, after the final delta
    fn on_end(&mut self) -> io::Result<()>;
}

/// Terminal sink: one backspace-blank-backspace per erased byte, then
/// the appended bytes verbatim, flushed per delta.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl StdoutSink {
    pub fn new() -> Self {
        Self
    }
}

impl StreamSink for StdoutSink {
    fn on_delta(&mut self, delta: &StreamDelta) -> io::Result<()> {
        let mut out = io::stdout().lock();
        for _ in 0..delta.erase {
            out.write_all(b"\x08 \x08")?;
        }
        out.write_all(&delta.append)?;
        out.flush()
    }

    fn on_end(&mut self) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(b"\n")?;
        out.flush()
    }
}
