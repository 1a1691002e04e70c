//! Response envelope marshaling.

use std::collections::HashMap;
use std::io;

use http::{Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{codes, Error, Result};
use crate::zip::{unzip, zip};

use super::{frame, http_headers, RECV};

/// The JSON body of a response frame. `handle` echoes the request's
/// correlation handle so the originator can route the response to the
/// caller awaiting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub body: Vec<u8>,
    pub code: u16,
    pub handle: String,
    pub header: HashMap<String, Vec<String>>,
}

/// Marshals a response envelope into a `RECV` frame.
pub fn marshal_response(group: &str, response: &ResponseEnvelope) -> io::Result<Vec<u8>> {
    let marshaled = serde_json::to_vec(response)?;
    let zipped = zip(&marshaled)?;
    Ok(frame(group, RECV, &zipped))
}

/// Unmarshals the body of an inbound `RECV` frame into the correlation
/// handle and the reconstructed HTTP response.
pub fn unmarshal_response(payload: &[u8]) -> Result<(String, Response<Vec<u8>>)> {
    let unzipped = unzip(payload).map_err(|err| err.escalate(codes::ERR_RES_UNMARSHAL))?;
    let envelope: ResponseEnvelope = serde_json::from_slice(&unzipped)
        .map_err(|err| Error::new(codes::ERR_RES_UNMARSHAL_JSON, err.to_string()))?;

    let status = StatusCode::from_u16(envelope.code)
        .map_err(|err| Error::new(codes::ERR_RES_UNMARSHAL_JSON, err.to_string()))?;
    let headers = http_headers(&envelope.header)
        .map_err(|err| Error::new(codes::ERR_RES_UNMARSHAL_JSON, err.to_string()))?;

    let mut response = Response::builder()
        .status(status)
        .body(envelope.body)
        .map_err(|err| Error::new(codes::ERR_RES_UNMARSHAL_JSON, err.to_string()))?;
    *response.headers_mut() = headers;

    Ok((envelope.handle, response))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROUP: &str = "SLEUTH-vT";

    #[test]
    fn test_response_round_trip() {
        let mut header = HashMap::new();
        header.insert(
            "content-type".to_string(),
            vec!["text/plain; charset=utf-8".to_string()],
        );
        let envelope = ResponseEnvelope {
            body: b"foo bar baz".to_vec(),
            code: 200,
            handle: "1f".to_string(),
            header,
        };

        let payload = marshal_response(GROUP, &envelope).unwrap();
        assert!(payload.starts_with(format!("{GROUP}{RECV}").as_bytes()));

        let body = &payload[GROUP.len() + RECV.len()..];
        let (handle, response) = unmarshal_response(body).unwrap();
        assert_eq!(handle, "1f");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/plain; charset=utf-8"
        );
        assert_eq!(response.body(), b"foo bar baz");
    }

    #[test]
    fn test_unmarshal_bad_json() {
        let payload = zip(b"{bad json}").unwrap();
        let err = unmarshal_response(&payload).unwrap_err();
        assert_eq!(err.codes, vec![codes::ERR_RES_UNMARSHAL_JSON]);
    }

    #[test]
    fn test_unmarshal_not_gzip() {
        let err = unmarshal_response(b"").unwrap_err();
        assert_eq!(err.codes, vec![codes::ERR_UNZIP, codes::ERR_RES_UNMARSHAL]);
    }

    #[test]
    fn test_unmarshal_bad_status() {
        let envelope = ResponseEnvelope {
            body: Vec::new(),
            code: 0,
            handle: "1".to_string(),
            header: HashMap::new(),
        };
        let payload = zip(&serde_json::to_vec(&envelope).unwrap()).unwrap();
        let err = unmarshal_response(&payload).unwrap_err();
        assert_eq!(err.codes, vec![codes::ERR_RES_UNMARSHAL_JSON]);
    }
}
