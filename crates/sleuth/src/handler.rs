//! The user-supplied request handler.

use async_trait::async_trait;
use http::Request;

use crate::writer::ResponseWriter;

/// Answers requests addressed to the service this member announces.
///
/// The dispatcher invokes the handler inline for each inbound request, so a
/// handler that blocks stalls that client's event processing. Every
/// [`ResponseWriter::write`](crate::ResponseWriter::write) emits a complete
/// response frame; handlers should write their body exactly once, since the
/// originator delivers only the first frame to arrive for a given call.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve(&self, request: Request<Vec<u8>>, writer: &mut ResponseWriter);
}
