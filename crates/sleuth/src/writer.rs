//! The response writer: adapts handler output to framed whispers.

use std::sync::Arc;

use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use http::StatusCode;

use sleuth_common::protocol::{marshal_response, Destination, ResponseEnvelope};
use sleuth_common::{codes, Error, Result};
use sleuth_fabric::Whisperer;

/// Writes a handler's response back to the originating peer.
///
/// Headers accumulate in memory; each call to [`write`](Self::write) frames
/// the status, headers, and payload into a complete response frame and
/// whispers it to the destination node.
pub struct ResponseWriter {
    whisperer: Arc<dyn Whisperer>,
    group: String,
    node: String,
    handle: String,
    status: Option<StatusCode>,
    headers: HeaderMap,
}

impl ResponseWriter {
    pub(crate) fn new(whisperer: Arc<dyn Whisperer>, destination: Destination) -> Self {
        Self {
            whisperer,
            group: destination.group,
            node: destination.node,
            handle: destination.handle,
            status: None,
            headers: HeaderMap::new(),
        }
    }

    /// The headers that will be sent with the response.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Records the response status. Without an explicit call, the first
    /// `write` sets 200 OK.
    pub fn write_header(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// Frames and sends `data` as a response. Sets the status to 200 if
    /// none was recorded and derives a `Content-Type` from the payload if
    /// none was set. Failures are reported as `ERR_RES_WHISPER` (930).
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        let status = *self.status.get_or_insert(StatusCode::OK);
        if !self.headers.contains_key(CONTENT_TYPE) {
            if let Ok(value) = HeaderValue::from_str(detect_content_type(data)) {
                self.headers.insert(CONTENT_TYPE, value);
            }
        }

        let envelope = ResponseEnvelope {
            body: data.to_vec(),
            code: status.as_u16(),
            handle: self.handle.clone(),
            header: sleuth_common::protocol::wire_headers(&self.headers),
        };
        let payload = marshal_response(&self.group, &envelope)
            .map_err(|err| Error::new(codes::ERR_RES_WHISPER, err.to_string()))?;
        self.whisperer
            .whisper(&self.node, payload)
            .await
            .map_err(|err| Error::new(codes::ERR_RES_WHISPER, err.to_string()))?;
        Ok(data.len())
    }
}

/// Sniffs a `Content-Type` from the first bytes of a payload.
fn detect_content_type(data: &[u8]) -> &'static str {
    const MAGICS: [(&[u8], &str); 6] = [
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"%PDF-", "application/pdf"),
        (b"\x1f\x8b", "application/x-gzip"),
    ];

    let head = &data[..data.len().min(512)];
    for (magic, content_type) in MAGICS {
        if head.starts_with(magic) {
            return content_type;
        }
    }
    if let Ok(text) = std::str::from_utf8(head) {
        let lowered = text.trim_start().to_ascii_lowercase();
        if lowered.starts_with("<!doctype html") || lowered.starts_with("<html") {
            return "text/html; charset=utf-8";
        }
        return "text/plain; charset=utf-8";
    }
    "application/octet-stream"
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sleuth_common::protocol::{unmarshal_response, RECV};
    use sleuth_fabric::FabricError;
    use std::sync::Mutex;

    const GROUP: &str = "SLEUTH-vT";

    /// Captures whispered payloads.
    #[derive(Default)]
    struct GoodWhisperer {
        sent: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl Whisperer for GoodWhisperer {
        async fn whisper(&self, node: &str, payload: Vec<u8>) -> sleuth_fabric::Result<()> {
            self.sent.lock().unwrap().push((node.to_string(), payload));
            Ok(())
        }
    }

    /// Fails every whisper.
    struct BadWhisperer;

    #[async_trait]
    impl Whisperer for BadWhisperer {
        async fn whisper(&self, _node: &str, _payload: Vec<u8>) -> sleuth_fabric::Result<()> {
            Err(FabricError::UnknownPeer("qux".to_string()))
        }
    }

    fn destination(handle: &str) -> Destination {
        Destination {
            group: GROUP.to_string(),
            handle: handle.to_string(),
            node: "qux".to_string(),
        }
    }

    #[tokio::test]
    async fn test_write_frames_and_whispers() {
        let whisperer = Arc::new(GoodWhisperer::default());
        let whisper_handle: Arc<dyn Whisperer> = Arc::clone(&whisperer) as Arc<dyn Whisperer>;
        let mut writer = ResponseWriter::new(whisper_handle, destination("2"));

        let written = writer.write(b"foo bar baz").await.unwrap();
        assert_eq!(written, 11);

        let sent = whisperer.sent.lock().unwrap();
        let (node, payload) = &sent[0];
        assert_eq!(node, "qux");
        assert!(payload.starts_with(format!("{GROUP}{RECV}").as_bytes()));

        let (handle, response) =
            unmarshal_response(&payload[GROUP.len() + RECV.len()..]).unwrap();
        assert_eq!(handle, "2");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(response.body(), b"foo bar baz");
    }

    #[tokio::test]
    async fn test_write_bad_whisperer() {
        let whisper_handle: Arc<dyn Whisperer> = Arc::new(BadWhisperer);
        let mut writer = ResponseWriter::new(whisper_handle, destination("3"));
        let err = writer.write(b"foo bar baz").await.unwrap_err();
        assert_eq!(err.codes, vec![codes::ERR_RES_WHISPER]);
    }

    #[tokio::test]
    async fn test_explicit_status_and_content_type_kept() {
        let whisperer = Arc::new(GoodWhisperer::default());
        let whisper_handle: Arc<dyn Whisperer> = Arc::clone(&whisperer) as Arc<dyn Whisperer>;
        let mut writer = ResponseWriter::new(whisper_handle, destination("4"));

        writer.write_header(StatusCode::NOT_FOUND);
        writer
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        writer.write(b"{}").await.unwrap();

        let sent = whisperer.sent.lock().unwrap();
        let (_, payload) = &sent[0];
        let (_, response) = unmarshal_response(&payload[GROUP.len() + RECV.len()..]).unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_detect_content_type() {
        assert_eq!(detect_content_type(b"plain text"), "text/plain; charset=utf-8");
        assert_eq!(
            detect_content_type(b"<!DOCTYPE html><html></html>"),
            "text/html; charset=utf-8"
        );
        assert_eq!(detect_content_type(b"\x89PNG\r\n\x1a\nrest"), "image/png");
        assert_eq!(detect_content_type(&[0xff, 0xfe, 0x00, 0x80]), "application/octet-stream");
    }
}
