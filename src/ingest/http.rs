//! HTTP and synthetic byte-stream backends.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage};
use rand::Rng;
use std::io::Read;
use std::time::Duration;
use url::Url;

pub const DEFAULT_CHUNK_BYTES: usize = 8 * 1024;

const STUB_FRAME_WIDTH: u32 = 32;
const STUB_FRAME_HEIGHT: u32 = 24;

const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// A connected source of raw stream bytes.
pub struct ByteStreamSource {
    backend: Backend,
}

enum Backend {
    Http(HttpByteStream),
    Stub(StubByteStream),
}

impl ByteStreamSource {
    /// Connects to the endpoint. Supported schemes: `http(s)://` for a live
    /// camera stream, `stub://` for the synthetic generator.
    pub fn connect(endpoint_url: &str) -> Result<Self> {
        let url = Url::parse(endpoint_url).context("parse stream url")?;
        let backend = match url.scheme() {
            "http" | "https" => Backend::Http(HttpByteStream::connect(endpoint_url)?),
            "stub" => Backend::Stub(StubByteStream::new()),
            other => {
                return Err(anyhow!(
                    "unsupported stream scheme '{}'; expected http(s) or stub",
                    other
                ))
            }
        };
        Ok(Self { backend })
    }

    /// Reads the next chunk of raw stream bytes into `buf`. Returns the
    /// number of bytes read; 0 means the stream ended.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        match &mut self.backend {
            Backend::Http(stream) => stream.read_chunk(buf),
            Backend::Stub(stream) => stream.read_chunk(buf),
        }
    }
}

struct HttpByteStream {
    reader: Box<dyn Read + Send + Sync>,
}

impl HttpByteStream {
    fn connect(url: &str) -> Result<Self> {
        let agent = ureq::AgentBuilder::new().timeout_read(READ_TIMEOUT).build();
        let response = agent.get(url).call().context("connect to camera stream")?;
        Ok(Self {
            reader: response.into_reader(),
        })
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.reader.read(buf).context("read stream chunk")
    }
}

/// Synthesizes the camera wire format: a JPEG span immediately followed by a
/// gyroscope JSON span, repeated forever. The yaw value wanders so rotation
/// behavior is visible downstream.
struct StubByteStream {
    pending: Vec<u8>,
    frame_count: u64,
    yaw: f64,
}

impl StubByteStream {
    fn new() -> Self {
        Self {
            pending: Vec::with_capacity(16 * 1024),
            frame_count: 0,
            yaw: -130.0,
        }
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.pending.is_empty() {
            self.synthesize_pair()?;
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    fn synthesize_pair(&mut self) -> Result<()> {
        self.frame_count += 1;
        let frame_count = self.frame_count;

        let image = RgbImage::from_fn(STUB_FRAME_WIDTH, STUB_FRAME_HEIGHT, |x, y| {
            let shade = (x + y + frame_count as u32) % 256;
            image::Rgb([shade as u8, (shade / 2) as u8, (255 - shade) as u8])
        });
        let mut encoder = JpegEncoder::new_with_quality(&mut self.pending, 75);
        encoder
            .encode(
                image.as_raw(),
                STUB_FRAME_WIDTH,
                STUB_FRAME_HEIGHT,
                ExtendedColorType::Rgb8,
            )
            .context("encode synthetic jpeg")?;

        // Wander slowly with some sensor noise.
        let mut rng = rand::thread_rng();
        self.yaw += 1.5 + rng.gen_range(-0.5..0.5);
        if self.yaw > 180.0 {
            self.yaw -= 360.0;
        }
        let roll = -101.0 + rng.gen_range(-1.0..1.0);
        let pitch = 42.0 + rng.gen_range(-1.0..1.0);

        // String-encoded values, matching current firmware: the closing `"}`
        // doubles as the span terminator on the wire.
        let span = format!(
            r#"{{"r":"{:.1}","p":"{:.1}","y":"{:.1}"}}"#,
            roll, pitch, self.yaw
        );
        self.pending.extend_from_slice(span.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demux::FrameDemuxer;

    #[test]
    fn rejects_unknown_scheme() {
        assert!(ByteStreamSource::connect("rtsp://camera/stream").is_err());
        assert!(ByteStreamSource::connect("not a url").is_err());
    }

    #[test]
    fn stub_stream_demuxes_into_records() {
        let mut source = ByteStreamSource::connect("stub://camera").unwrap();
        let mut demuxer = FrameDemuxer::new();
        let mut chunk = vec![0u8; DEFAULT_CHUNK_BYTES];
        let mut records = Vec::new();

        while records.len() < 3 {
            let n = source.read_chunk(&mut chunk).unwrap();
            records.extend(demuxer.ingest(&chunk[..n]).unwrap());
        }

        for record in &records {
            assert!(record.image_bytes.starts_with(&[0xFF, 0xD8]));
            assert!(record.image_bytes.ends_with(&[0xFF, 0xD9]));
            assert!((-180.0..=180.0).contains(&record.orientation.yaw));
        }
    }
}
