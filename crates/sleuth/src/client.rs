//! The sleuth client: directory maintenance, frame dispatch, and calls.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::{Request, Response};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use sleuth_common::protocol::{
    marshal_request, unmarshal_request, unmarshal_response, KIND_LEN, RECV, REPL,
};
use sleuth_common::{codes, Error, Result};
use sleuth_fabric::{EventKind, Fabric, FabricEvent, Whisperer};

use crate::config::Config;
use crate::handler::Handler;
use crate::notifier::Notifier;
use crate::pending::PendingCalls;
use crate::registry::Registry;
use crate::writer::ResponseWriter;

/// URL scheme for outbound calls. The host component of a call URL is the
/// logical service name, not a network location.
pub const SCHEME: &str = "sleuth";

const HEADER_GROUP: &str = "group";
const HEADER_NODE: &str = "node";
const HEADER_TYPE: &str = "type";
const HEADER_VERSION: &str = "version";

/// State shared between the public client surface, the dispatcher task, and
/// the per-call timer tasks.
struct ClientCore {
    group: String,
    fabric: Arc<dyn Fabric>,
    whisperer: Arc<dyn Whisperer>,
    registry: Registry,
    pending: PendingCalls,
    notifier: Arc<Notifier>,
    handler: Option<Arc<dyn Handler>>,
    timeout_ms: AtomicU64,
    handles: AtomicU64,
    closed: AtomicBool,
}

impl ClientCore {
    /// The dispatcher: consumes fabric events sequentially for the life of
    /// the client. Enter and exit events maintain the directory; whispers
    /// carry frames. Inbound failures are logged, never propagated.
    async fn run(core: Arc<Self>, mut events: UnboundedReceiver<FabricEvent>) {
        while let Some(event) = events.recv().await {
            match event.kind {
                EventKind::Enter => {
                    let group = event.header(HEADER_GROUP).unwrap_or("");
                    let node = event.header(HEADER_NODE).unwrap_or("");
                    let service = event.header(HEADER_TYPE).unwrap_or("");
                    let version = event.header(HEADER_VERSION).unwrap_or("");
                    if let Err(err) =
                        core.registry
                            .add_peer(group, &event.name, node, service, version)
                    {
                        warn!(code = codes::WARN_ADD, %err, "add peer failed");
                    }
                }
                EventKind::Exit | EventKind::Leave => core.registry.remove_peer(&event.name),
                EventKind::Whisper => {
                    if let Err(err) = core.dispatch(&event.message).await {
                        let err = err.escalate(codes::ERR_DISPATCH);
                        error!(%err, "frame dispatch failed");
                    }
                }
            }
        }
    }

    /// Routes one inbound frame. The frame must carry this client's group
    /// as its literal prefix, then a 4-byte kind tag selecting the response
    /// (`RECV`) or request (`REPL`) path.
    async fn dispatch(&self, message: &[u8]) -> Result<()> {
        let group_len = self.group.len();
        let header_len = group_len + KIND_LEN;
        if message.len() < header_len || &message[..group_len] != self.group.as_bytes() {
            return Err(Error::new(codes::ERR_DISPATCH_HEADER, "bad dispatch header"));
        }
        let kind = &message[group_len..header_len];
        let payload = &message[header_len..];
        if kind == RECV.as_bytes() {
            self.receive(payload)
        } else if kind == REPL.as_bytes() {
            self.reply(payload).await
        } else {
            Err(Error::new(
                codes::ERR_DISPATCH_ACTION,
                format!("bad dispatch action: {}", String::from_utf8_lossy(kind)),
            ))
        }
    }

    /// Response path: unmarshal and hand off to the caller awaiting the
    /// frame's handle.
    fn receive(&self, payload: &[u8]) -> Result<()> {
        let (handle, response) =
            unmarshal_response(payload).map_err(|err| err.escalate(codes::ERR_RECV))?;
        self.pending.deliver(&handle, response)
    }

    /// Request path: unmarshal and invoke the handler with a writer bound
    /// to the originating node.
    async fn reply(&self, payload: &[u8]) -> Result<()> {
        let (destination, request) =
            unmarshal_request(&self.group, payload).map_err(|err| err.escalate(codes::ERR_REPL))?;
        let Some(handler) = self.handler.clone() else {
            debug!("request received in client-only mode, dropped");
            return Ok(());
        };
        let mut writer = ResponseWriter::new(Arc::clone(&self.whisperer), destination);
        handler.serve(request, &mut writer).await;
        Ok(())
    }

    /// Starts the timer that guarantees the call for `handle` unblocks.
    fn arm_timeout(self: &Arc<Self>, handle: String) {
        let core = Arc::clone(self);
        let timeout = Duration::from_millis(core.timeout_ms.load(Ordering::Relaxed));
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            core.pending.expire(&handle);
        });
    }
}

/// A member of a sleuth group.
///
/// A client discovers every other member of its group automatically and can
/// call any announced service by name with [`call`](Self::call). A client
/// constructed with a handler additionally answers requests for the one
/// service it announces.
pub struct Client {
    core: Arc<ClientCore>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client {
    /// Joins the group described by `config` over the given fabric node.
    ///
    /// Supplying a handler announces `config.service` to the group; the
    /// handler then answers requests addressed to that service. Without a
    /// handler the member is client-only and invisible to service lookup.
    pub async fn connect<F>(
        fabric: F,
        config: Config,
        handler: Option<Arc<dyn Handler>>,
    ) -> Result<Self>
    where
        F: Fabric + 'static,
    {
        let _ = config.validated_log_level();
        let server = handler.is_some();
        if server && config.service.is_empty() {
            return Err(Error::new(
                codes::ERR_SERVICE,
                "service name not defined in config",
            ));
        }
        if !server {
            info!("no handler supplied, client-only mode");
        }
        if config.interface.is_empty() {
            warn!(
                code = codes::WARN_INTERFACE,
                "interface not configured, using fabric default"
            );
        }

        let fabric = Arc::new(fabric);
        let whisperer: Arc<dyn Whisperer> = fabric.clone();
        let fabric: Arc<dyn Fabric> = fabric;

        if let Err(err) = configure_node(fabric.as_ref(), &config, server).await {
            return Err(err.escalate(codes::ERR_CREATE).escalate(codes::ERR_NEW));
        }
        let events = fabric.take_events().ok_or_else(|| {
            Error::new(codes::ERR_INITIALIZE, "fabric event stream unavailable")
                .escalate(codes::ERR_CREATE)
                .escalate(codes::ERR_NEW)
        })?;

        let notifier = Arc::new(Notifier::new());
        let core = Arc::new(ClientCore {
            group: config.group.clone(),
            registry: Registry::new(config.group.clone(), Arc::clone(&notifier)),
            pending: PendingCalls::new(),
            notifier,
            handler,
            timeout_ms: AtomicU64::new(config.timeout_ms),
            handles: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            whisperer,
            fabric,
        });
        let dispatcher = tokio::spawn(ClientCore::run(Arc::clone(&core), events));
        Ok(Self {
            core,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// Sends a request to a service and returns its response.
    ///
    /// The request URL must use the `sleuth` scheme with the service name
    /// as its host, e.g. `sleuth://echo/status`. Instances of the service
    /// are selected round-robin. The call resolves with the response, or
    /// with `ERR_TIMEOUT` (920) once the per-call timeout elapses.
    pub async fn call(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        if self.core.closed.load(Ordering::Acquire) {
            return Err(
                Error::new(codes::ERR_CLOSED, "client is closed").escalate(codes::ERR_REQUEST)
            );
        }
        let scheme = request.uri().scheme_str().unwrap_or("");
        if scheme != SCHEME {
            return Err(Error::new(
                codes::ERR_SCHEME,
                format!("unsupported scheme: {scheme:?}"),
            ));
        }
        let service = request.uri().host().unwrap_or("").to_string();
        let Some(pool) = self.core.registry.lookup(&service) else {
            return Err(Error::new(
                codes::ERR_UNKNOWN_SERVICE,
                format!("{service} is an unknown service"),
            ));
        };

        let handle = format!("{:x}", self.core.handles.fetch_add(1, Ordering::Relaxed));
        let method = request.method().clone();
        let uri = request.uri().clone();
        let receiver = self.core.fabric.uuid();
        let payload = marshal_request(&self.core.group, &receiver, &handle, request)?;

        let Some(peer) = pool.next() else {
            return Err(Error::new(
                codes::ERR_UNKNOWN_SERVICE,
                format!("{service} has no live instances"),
            ));
        };

        let (slot, delivery) = oneshot::channel();
        self.core.pending.register(handle.clone(), slot);
        self.core.arm_timeout(handle.clone());

        debug!(service = %service, peer = %peer.name, url = %uri, handle = %handle, "call");
        if let Err(err) = self.core.fabric.whisper(&peer.node, payload).await {
            self.core.pending.expire(&handle);
            return Err(Error::new(codes::ERR_REQ_WHISPER, err.to_string()));
        }

        match delivery.await {
            Ok(Some(response)) => Ok(response),
            Ok(None) => Err(Error::new(
                codes::ERR_TIMEOUT,
                format!("{method} {{{service}}}{uri} timed out"),
            )),
            Err(_) => Err(Error::new(
                codes::ERR_CLOSED,
                "client closed while awaiting response",
            )),
        }
    }

    /// Blocks until every listed service has at least one live instance.
    ///
    /// Returns immediately when they are all already present. There is no
    /// timeout: the future resolves only when the requirement holds, or
    /// with an error if the client is closed at call time.
    pub async fn wait_for(&self, services: &[&str]) -> Result<()> {
        if self.core.closed.load(Ordering::Acquire) {
            return Err(
                Error::new(codes::ERR_CLOSED, "client is closed").escalate(codes::ERR_WAIT)
            );
        }
        let mut wanted: Vec<String> = Vec::with_capacity(services.len());
        for &service in services {
            if wanted.iter().any(|seen| seen == service) {
                warn!(service, "duplicate service in wait list");
            } else {
                wanted.push(service.to_string());
            }
        }
        if self.core.registry.has_all(&wanted) {
            return Ok(());
        }

        info!(services = ?wanted, "waiting for services");
        let mut signals = self.core.notifier.waiter().await;
        self.core.notifier.activate();
        // A peer may have arrived between the fast check and arming; every
        // iteration re-checks before blocking on the next signal.
        while !self.core.registry.has_all(&wanted) {
            if signals.recv().await.is_none() {
                break;
            }
        }
        self.core.notifier.deactivate();
        Ok(())
    }

    /// Leaves the group and stops the fabric node.
    ///
    /// Outstanding calls are woken with an error. The first close reports
    /// any fabric leave failure as `ERR_LEAVE` (931); any later close fails
    /// with `ERR_CLOSED` (935).
    pub async fn close(&self) -> Result<()> {
        if self.core.closed.swap(true, Ordering::AcqRel) {
            return Err(Error::new(codes::ERR_CLOSED, "client is already closed"));
        }
        info!(name = %self.core.fabric.name(), group = %self.core.group, "leaving group");
        let left = self.core.fabric.leave(&self.core.group).await;
        if let Err(err) = self.core.fabric.stop().await {
            warn!(code = codes::WARN_CLOSE, %err, "fabric stop failed");
        }
        if let Some(task) = self.dispatcher.lock().unwrap().take() {
            task.abort();
        }
        self.core.pending.clear();
        left.map_err(|err| Error::new(codes::ERR_LEAVE, err.to_string()))
    }

    /// Short name of this member on the fabric.
    pub fn name(&self) -> String {
        self.core.fabric.name()
    }

    /// Fabric address peers use to whisper to this member.
    pub fn uuid(&self) -> String {
        self.core.fabric.uuid()
    }

    /// Adjusts the per-call timeout.
    pub fn set_timeout(&self, timeout: Duration) {
        self.core
            .timeout_ms
            .store(timeout.as_millis() as u64, Ordering::Relaxed);
    }

    /// The current per-call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.core.timeout_ms.load(Ordering::Relaxed))
    }
}

/// Configures, starts, and joins a fabric node. Members that announce a
/// service attach the announce headers before starting.
async fn configure_node(fabric: &dyn Fabric, config: &Config, server: bool) -> Result<()> {
    fabric
        .set_port(config.port)
        .await
        .map_err(|err| Error::new(codes::ERR_PORT, err.to_string()))?;
    if !config.interface.is_empty() {
        fabric
            .set_interface(&config.interface)
            .await
            .map_err(|err| Error::new(codes::ERR_INTERFACE, err.to_string()))?;
    }
    if server {
        let uuid = fabric.uuid();
        let version = if config.version.is_empty() {
            "unknown"
        } else {
            config.version.as_str()
        };
        let headers: [(&str, &str, u16); 4] = [
            (HEADER_GROUP, config.group.as_str(), codes::ERR_GROUP_HEADER),
            (HEADER_NODE, uuid.as_str(), codes::ERR_NODE_HEADER),
            (HEADER_TYPE, config.service.as_str(), codes::ERR_SERVICE_HEADER),
            (HEADER_VERSION, version, codes::ERR_VERSION_HEADER),
        ];
        for (key, value, code) in headers {
            fabric
                .set_header(key, value)
                .await
                .map_err(|err| Error::new(code, err.to_string()))?;
        }
    }
    fabric
        .start()
        .await
        .map_err(|err| Error::new(codes::ERR_START, err.to_string()))?;
    if let Err(err) = fabric.join(&config.group).await {
        let _ = fabric.stop().await;
        return Err(Error::new(codes::ERR_JOIN, err.to_string()));
    }
    let role = if server {
        config.service.as_str()
    } else {
        "client-only"
    };
    info!(
        group = %config.group,
        port = config.port,
        role,
        name = %fabric.name(),
        "sleuth node listening"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sleuth_common::protocol::{marshal_response, ResponseEnvelope};
    use sleuth_fabric::memory::MemoryHub;
    use std::collections::HashMap;

    const GROUP: &str = "SLEUTH-vT";

    fn test_client(handler: Option<Arc<dyn Handler>>) -> Client {
        let fabric = Arc::new(MemoryHub::new().node());
        let whisperer: Arc<dyn Whisperer> = fabric.clone();
        let fabric: Arc<dyn Fabric> = fabric;
        let notifier = Arc::new(Notifier::new());
        let core = Arc::new(ClientCore {
            group: GROUP.to_string(),
            registry: Registry::new(GROUP.to_string(), Arc::clone(&notifier)),
            pending: PendingCalls::new(),
            notifier,
            handler,
            timeout_ms: AtomicU64::new(500),
            handles: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            whisperer,
            fabric,
        });
        Client {
            core,
            dispatcher: Mutex::new(None),
        }
    }

    #[tokio::test]
    async fn test_dispatch_empty_payload() {
        let client = test_client(None);
        let err = client.core.dispatch(&[]).await.unwrap_err();
        assert_eq!(err.codes, vec![codes::ERR_DISPATCH_HEADER]);
    }

    #[tokio::test]
    async fn test_dispatch_foreign_group() {
        let client = test_client(None);
        let err = client
            .core
            .dispatch(b"OTHER-GROUPRECV")
            .await
            .unwrap_err();
        assert_eq!(err.codes, vec![codes::ERR_DISPATCH_HEADER]);
    }

    #[tokio::test]
    async fn test_dispatch_bad_action() {
        let client = test_client(None);
        let message = format!("{GROUP}FAIL");
        let err = client.core.dispatch(message.as_bytes()).await.unwrap_err();
        assert_eq!(err.codes, vec![codes::ERR_DISPATCH_ACTION]);
        // The rejected frame left no trace behind.
        assert!(client.core.registry.lookup("FAIL").is_none());
        assert_eq!(client.core.pending.len(), 0);
    }

    #[tokio::test]
    async fn test_receive_bad_payload() {
        let client = test_client(None);
        let err = client.core.receive(b"").unwrap_err();
        assert_eq!(
            err.codes,
            vec![codes::ERR_UNZIP, codes::ERR_RES_UNMARSHAL, codes::ERR_RECV]
        );
    }

    #[tokio::test]
    async fn test_receive_unknown_handle() {
        let client = test_client(None);
        let envelope = ResponseEnvelope {
            body: Vec::new(),
            code: 200,
            handle: "1".to_string(),
            header: HashMap::new(),
        };
        let payload = marshal_response(GROUP, &envelope).unwrap();
        let err = client
            .core
            .receive(&payload[GROUP.len() + KIND_LEN..])
            .unwrap_err();
        assert_eq!(err.codes, vec![codes::ERR_RECV]);
    }

    #[tokio::test]
    async fn test_reply_bad_payload() {
        let client = test_client(None);
        let err = client.core.reply(b"").await.unwrap_err();
        assert_eq!(
            err.codes,
            vec![codes::ERR_UNZIP, codes::ERR_REQ_UNMARSHAL, codes::ERR_REPL]
        );
    }

    #[tokio::test]
    async fn test_call_on_closed_client() {
        let client = test_client(None);
        client.core.closed.store(true, Ordering::Release);
        let request = Request::builder()
            .method("POST")
            .uri("sleuth://foo/bar")
            .body(Vec::new())
            .unwrap();
        let err = client.call(request).await.unwrap_err();
        assert_eq!(err.codes, vec![codes::ERR_CLOSED, codes::ERR_REQUEST]);
    }

    #[tokio::test]
    async fn test_call_unknown_scheme() {
        let client = test_client(None);
        let request = Request::builder()
            .method("POST")
            .uri("foo://bar/baz")
            .body(Vec::new())
            .unwrap();
        let err = client.call(request).await.unwrap_err();
        assert_eq!(err.codes, vec![codes::ERR_SCHEME]);
    }

    #[tokio::test]
    async fn test_call_unknown_service() {
        let client = test_client(None);
        let request = Request::builder()
            .method("POST")
            .uri("sleuth://foo/bar")
            .body(Vec::new())
            .unwrap();
        let err = client.call(request).await.unwrap_err();
        assert_eq!(err.codes, vec![codes::ERR_UNKNOWN_SERVICE]);
    }

    #[tokio::test]
    async fn test_wait_for_on_closed_client() {
        let client = test_client(None);
        client.core.closed.store(true, Ordering::Release);
        let err = client.wait_for(&["foo"]).await.unwrap_err();
        assert_eq!(err.codes, vec![codes::ERR_CLOSED, codes::ERR_WAIT]);
    }

    #[tokio::test]
    async fn test_handle_assignment_is_monotone_hex() {
        let client = test_client(None);
        let first = client.core.handles.fetch_add(1, Ordering::Relaxed);
        let second = client.core.handles.fetch_add(1, Ordering::Relaxed);
        assert!(second > first);
        assert_eq!(format!("{:x}", 26), "1a");
    }
}
