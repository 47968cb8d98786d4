//! Orientation sample decoding.
//!
//! The wire encodes a gyroscope reading as a small JSON object with keys
//! `r`, `p`, `y` (roll/pitch/yaw, degrees). Early firmware revisions sent the
//! values as JSON numbers, later ones as numeric strings; both are still on
//! the wire and both must decode without a schema version flag.
//!
//! Failures are returned as a typed [`ParseFailure`] and never escape into
//! caller control flow: the caller drops the sample and keeps demuxing.

use serde::Deserialize;
use serde_json::Value;

use crate::OrientationSample;

/// Why an orientation span failed to decode. One dropped sample must not
/// affect parsing of the rest of the stream.
#[derive(Clone, Debug, PartialEq)]
pub enum ParseFailure {
    InvalidUtf8,
    InvalidJson(String),
    MissingField(&'static str),
    NonNumeric(&'static str),
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseFailure::InvalidUtf8 => write!(f, "orientation span is not valid UTF-8"),
            ParseFailure::InvalidJson(err) => {
                write!(f, "orientation span is not a JSON object: {}", err)
            }
            ParseFailure::MissingField(field) => {
                write!(f, "orientation span is missing field '{}'", field)
            }
            ParseFailure::NonNumeric(field) => {
                write!(f, "orientation field '{}' is not numeric", field)
            }
        }
    }
}

impl std::error::Error for ParseFailure {}

#[derive(Debug, Deserialize)]
struct WireSample {
    r: Option<Value>,
    p: Option<Value>,
    y: Option<Value>,
}

/// Decodes one demuxed orientation span into a typed sample.
pub fn parse_sample(raw: &[u8]) -> Result<OrientationSample, ParseFailure> {
    let text = std::str::from_utf8(raw).map_err(|_| ParseFailure::InvalidUtf8)?;
    let wire: WireSample =
        serde_json::from_str(text).map_err(|err| ParseFailure::InvalidJson(err.to_string()))?;

    Ok(OrientationSample {
        roll: numeric_field(wire.r, "r")?,
        pitch: numeric_field(wire.p, "p")?,
        yaw: numeric_field(wire.y, "y")?,
    })
}

fn numeric_field(value: Option<Value>, field: &'static str) -> Result<f64, ParseFailure> {
    match value {
        None => Err(ParseFailure::MissingField(field)),
        Some(Value::Number(num)) => num.as_f64().ok_or(ParseFailure::NonNumeric(field)),
        Some(Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| ParseFailure::NonNumeric(field)),
        Some(_) => Err(ParseFailure::NonNumeric(field)),
    }
}
