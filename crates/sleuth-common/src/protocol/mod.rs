//! Frame envelopes and their wire marshaling.
//!
//! A request frame carries a [`RequestEnvelope`], a response frame a
//! [`ResponseEnvelope`]; both are JSON-encoded, gzip-compressed, and prefixed
//! with the group identifier and a 4-byte kind tag. The HTTP side of each
//! envelope uses the `http` crate's value objects, so the conversion helpers
//! here translate between `http::HeaderMap` and the wire's
//! string-to-list-of-strings header map.

pub mod request;
pub mod response;

use std::collections::HashMap;

use http::header::{HeaderMap, HeaderName, HeaderValue};

pub use request::{marshal_request, unmarshal_request, RequestEnvelope};
pub use response::{marshal_response, unmarshal_response, ResponseEnvelope};

/// Kind tag for response frames.
pub const RECV: &str = "RECV";
/// Kind tag for request frames.
pub const REPL: &str = "REPL";

/// Byte length of a frame's kind tag.
pub const KIND_LEN: usize = 4;

/// The reply coordinates extracted from an inbound request frame: the group
/// the exchange belongs to, the correlation handle, and the fabric address
/// of the node awaiting the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub group: String,
    pub handle: String,
    pub node: String,
}

/// Builds a wire frame: group prefix, kind tag, compressed body.
pub(crate) fn frame(group: &str, kind: &str, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(group.len() + kind.len() + body.len());
    out.extend_from_slice(group.as_bytes());
    out.extend_from_slice(kind.as_bytes());
    out.extend_from_slice(body);
    out
}

/// Converts an `http::HeaderMap` to the wire header representation.
pub fn wire_headers(headers: &HeaderMap) -> HashMap<String, Vec<String>> {
    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in headers.iter() {
        out.entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    out
}

/// Converts wire headers back to an `http::HeaderMap`.
pub fn http_headers(
    wire: &HashMap<String, Vec<String>>,
) -> std::result::Result<HeaderMap, http::Error> {
    let mut out = HeaderMap::new();
    for (name, values) in wire {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        for value in values {
            out.append(name.clone(), HeaderValue::from_str(value)?);
        }
    }
    Ok(out)
}
