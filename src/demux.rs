//! Stream demultiplexing.
//!
//! The camera endpoint emits one unbounded byte stream interleaving JPEG
//! frames (`FF D8 .. FF D9`) with gyroscope samples encoded as small JSON
//! objects (`{" .. "}`). There is no length prefix, escaping, or pairing
//! identifier on the wire: pairing is positional. A record pairs a complete
//! JPEG span with the first complete orientation span found at or after that
//! JPEG span's start.
//!
//! Marker bytes inside the binary JPEG payload can coincide with the
//! orientation-span markers and misparse a sample. The wire format offers no
//! way to rule this out, so the demuxer accepts the risk rather than guessing;
//! a misparsed span is dropped like any other unparseable sample and
//! extraction continues with the next pair.
//!
//! Incomplete spans are never an error: extraction stalls with the unconsumed
//! tail intact until more bytes arrive. The only failure `ingest` can report
//! is the pending buffer outgrowing its bound, which is fatal for the stream
//! session.

use crate::orientation;
use crate::FrameRecord;

/// JPEG start-of-image marker.
pub const JPEG_START: [u8; 2] = [0xFF, 0xD8];
/// JPEG end-of-image marker.
pub const JPEG_END: [u8; 2] = [0xFF, 0xD9];
/// Orientation span opener: the two bytes of `{"`.
pub const AXES_START: [u8; 2] = [0x7B, 0x22];
/// Orientation span closer: the two bytes of `"}`.
pub const AXES_END: [u8; 2] = [0x22, 0x7D];

/// Default bound on the unconsumed tail of the pending buffer.
pub const DEFAULT_MAX_PENDING_BYTES: usize = 10 * 1024 * 1024;

/// The pending buffer outgrew its bound: spans stopped closing and the
/// unconsumed tail kept accumulating. The stream session must be torn down
/// and restarted by the network collaborator.
#[derive(Clone, Copy, Debug)]
pub struct PendingOverflow {
    pub pending_bytes: usize,
    pub limit: usize,
}

impl std::fmt::Display for PendingOverflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "pending stream buffer overflow: {} bytes unconsumed (limit {})",
            self.pending_bytes, self.limit
        )
    }
}

impl std::error::Error for PendingOverflow {}

/// Append-only byte buffer plus a "consumed up to" offset.
///
/// Bytes before the offset are never re-read; `compact` drops them so the
/// buffer holds only the unconsumed tail between demux passes.
#[derive(Debug, Default)]
struct ByteCursor {
    buf: Vec<u8>,
    consumed: usize,
}

impl ByteCursor {
    fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn unconsumed(&self) -> &[u8] {
        &self.buf[self.consumed..]
    }

    fn pending_len(&self) -> usize {
        self.buf.len() - self.consumed
    }

    fn advance(&mut self, n: usize) {
        self.consumed += n;
    }

    fn compact(&mut self) {
        if self.consumed > 0 {
            self.buf.drain(..self.consumed);
            self.consumed = 0;
        }
    }
}

/// Scans the accumulated stream for paired JPEG/orientation spans.
pub struct FrameDemuxer {
    cursor: ByteCursor,
    max_pending: usize,
    next_sequence: u64,
    dropped_samples: u64,
}

impl FrameDemuxer {
    pub fn new() -> Self {
        Self::with_max_pending(DEFAULT_MAX_PENDING_BYTES)
    }

    pub fn with_max_pending(max_pending: usize) -> Self {
        Self {
            cursor: ByteCursor::default(),
            max_pending,
            next_sequence: 0,
            dropped_samples: 0,
        }
    }

    /// Appends newly received bytes and returns a lazy, finite iterator over
    /// the complete records they unlock. Records are emitted in arrival order
    /// and each record's bytes are consumed exactly once.
    pub fn ingest(&mut self, new_bytes: &[u8]) -> Result<Records<'_>, PendingOverflow> {
        self.cursor.extend(new_bytes);
        if self.cursor.pending_len() > self.max_pending {
            return Err(PendingOverflow {
                pending_bytes: self.cursor.pending_len(),
                limit: self.max_pending,
            });
        }
        Ok(Records { demuxer: self })
    }

    /// Unconsumed bytes currently buffered.
    pub fn pending_bytes(&self) -> usize {
        self.cursor.pending_len()
    }

    /// Orientation spans dropped because they did not parse.
    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples
    }

    fn extract_next(&mut self) -> Option<FrameRecord> {
        loop {
            let (image_bytes, parsed, consumed_to) = {
                let buf = self.cursor.unconsumed();
                let jpeg_start = find_marker(buf, JPEG_START)?;
                let jpeg_end =
                    jpeg_start + 2 + find_marker(&buf[jpeg_start + 2..], JPEG_END)? + 2;
                // Pairing rule: the nearest orientation span at or after the
                // JPEG span's start belongs to this frame.
                let axes_start = jpeg_start + find_marker(&buf[jpeg_start..], AXES_START)?;
                let axes_end =
                    axes_start + 2 + find_marker(&buf[axes_start + 2..], AXES_END)? + 2;
                (
                    buf[jpeg_start..jpeg_end].to_vec(),
                    orientation::parse_sample(&buf[axes_start..axes_end]),
                    jpeg_end.max(axes_end),
                )
            };

            self.cursor.advance(consumed_to);
            self.cursor.compact();

            match parsed {
                Ok(sample) => {
                    let sequence = self.next_sequence;
                    self.next_sequence += 1;
                    return Some(FrameRecord {
                        image_bytes,
                        orientation: sample,
                        sequence,
                    });
                }
                Err(err) => {
                    self.dropped_samples += 1;
                    log::debug!("dropping unparseable orientation span: {}", err);
                }
            }
        }
    }
}

impl Default for FrameDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy per-call record sequence returned by [`FrameDemuxer::ingest`].
/// Finite: ends when no further complete pair exists in the buffer.
pub struct Records<'a> {
    demuxer: &'a mut FrameDemuxer,
}

impl Iterator for Records<'_> {
    type Item = FrameRecord;

    fn next(&mut self) -> Option<FrameRecord> {
        self.demuxer.extract_next()
    }
}

fn find_marker(buf: &[u8], marker: [u8; 2]) -> Option<usize> {
    buf.windows(2).position(|w| w == marker)
}
