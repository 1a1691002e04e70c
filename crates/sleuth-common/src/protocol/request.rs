//! Request envelope marshaling.

use std::collections::HashMap;

use http::{Method, Request, Uri};
use serde::{Deserialize, Serialize};

use crate::error::{codes, Error, Result};
use crate::zip::{unzip, zip};

use super::{frame, http_headers, wire_headers, Destination, REPL};

/// The JSON body of a request frame.
///
/// The URL is recorded with scheme and host erased: both are routing
/// metadata consumed before marshaling, not payload. `receiver` is the
/// fabric address the responder must whisper the response back to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub body: Vec<u8>,
    pub handle: String,
    pub header: HashMap<String, Vec<String>>,
    pub method: String,
    pub receiver: String,
    pub url: String,
}

/// Marshals an outbound HTTP request into a `REPL` frame.
pub fn marshal_request(
    group: &str,
    receiver: &str,
    handle: &str,
    request: Request<Vec<u8>>,
) -> Result<Vec<u8>> {
    let (parts, body) = request.into_parts();
    let envelope = RequestEnvelope {
        body,
        handle: handle.to_string(),
        header: wire_headers(&parts.headers),
        method: parts.method.as_str().to_string(),
        receiver: receiver.to_string(),
        url: parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string()),
    };
    let marshaled = serde_json::to_vec(&envelope)
        .map_err(|err| Error::new(codes::ERR_REQ_MARSHAL, err.to_string()))?;
    let zipped =
        zip(&marshaled).map_err(|err| Error::new(codes::ERR_REQ_MARSHAL, err.to_string()))?;
    Ok(frame(group, REPL, &zipped))
}

/// Unmarshals the body of an inbound `REPL` frame back into an HTTP request
/// plus the [`Destination`] its response must be whispered to.
pub fn unmarshal_request(
    group: &str,
    payload: &[u8],
) -> Result<(Destination, Request<Vec<u8>>)> {
    let unzipped = unzip(payload).map_err(|err| err.escalate(codes::ERR_REQ_UNMARSHAL))?;
    let envelope: RequestEnvelope = serde_json::from_slice(&unzipped)
        .map_err(|err| Error::new(codes::ERR_REQ_UNMARSHAL_JSON, err.to_string()))?;

    let method = envelope
        .method
        .parse::<Method>()
        .map_err(|err| Error::new(codes::ERR_REQ_UNMARSHAL_HTTP, err.to_string()))?;
    let uri = envelope
        .url
        .parse::<Uri>()
        .map_err(|err| Error::new(codes::ERR_REQ_UNMARSHAL_HTTP, err.to_string()))?;
    let headers = http_headers(&envelope.header)
        .map_err(|err| Error::new(codes::ERR_REQ_UNMARSHAL_HTTP, err.to_string()))?;

    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .body(envelope.body)
        .map_err(|err| Error::new(codes::ERR_REQ_UNMARSHAL_HTTP, err.to_string()))?;
    *request.headers_mut() = headers;

    let destination = Destination {
        group: group.to_string(),
        handle: envelope.handle,
        node: envelope.receiver,
    };
    Ok((destination, request))
}
