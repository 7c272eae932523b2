//! The coordinator: owns the HTTP listener, resolves each request to a
//! script location, bounds concurrency through the dispatcher, and shapes
//! unhandled failures into a generic error response.
//!
//! The server accepts connections on a single loop and serves each one on a
//! spawned task; per-request work runs under the dispatcher's concurrency
//! cap.

use crate::dispatcher::Dispatcher;
use crate::minion::{BoaMinion, Minion, MinionInstructions, WorkOrder};
use crate::resolver::ScriptRoute;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderName, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use overlord_common::{OverlordError, ResponsePayload, Result};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Notify};

/// Injected factory for execution units; replaceable without subclassing so
/// tests can substitute a stub minion. A factory error is a scheduling/setup
/// failure and travels the dispatcher's failure path.
pub type MinionFactory =
    Arc<dyn Fn(MinionInstructions) -> Result<Arc<dyn Minion>> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct OverlordOptions {
    /// The port to run the server on. Port 0 binds an ephemeral port.
    pub port: u16,
    /// Maximum time allowed for a single minion to handle a request.
    pub timeout: Duration,
    /// The maximum number of minions to run in parallel. `None` is
    /// unbounded; each received request spawns a new minion, and requests
    /// beyond the pool size wait for a spot.
    pub pool_size: Option<usize>,
    /// How request paths resolve to script locations.
    pub route: ScriptRoute,
}

impl OverlordOptions {
    pub fn new(route: ScriptRoute) -> Self {
        Self {
            port: 8080,
            timeout: Duration::from_millis(10_000),
            pool_size: None,
            route,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_pool_size(mut self, pool_size: Option<usize>) -> Self {
        self.pool_size = pool_size;
        self
    }
}

struct ServerState {
    route: ScriptRoute,
    timeout: Duration,
    dispatcher: Dispatcher,
    minion_factory: MinionFactory,
}

pub struct Overlord {
    options: OverlordOptions,
    minion_factory: MinionFactory,
    shutdown: Notify,
    local_addr: OnceLock<SocketAddr>,
}

impl Overlord {
    pub fn new(options: OverlordOptions) -> Self {
        Self {
            options,
            minion_factory: Arc::new(|instructions| {
                Ok(Arc::new(BoaMinion::new(instructions)) as Arc<dyn Minion>)
            }),
            shutdown: Notify::new(),
            local_addr: OnceLock::new(),
        }
    }

    /// Replaces the default `BoaMinion` factory.
    pub fn with_minion_factory(mut self, factory: MinionFactory) -> Self {
        self.minion_factory = factory;
        self
    }

    /// The bound address, available once `start()` has bound the listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Binds the listener and drives the accept loop until [`stop`] is
    /// called. One lifecycle per instance; start-after-stop sequencing is
    /// not supported.
    ///
    /// [`stop`]: Overlord::stop
    pub async fn start(&self) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.options.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| OverlordError::Transport(format!("Failed to bind to {addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| OverlordError::Transport(format!("Failed to get local address: {e}")))?;
        let _ = self.local_addr.set(local_addr);

        let state = Arc::new(ServerState {
            route: self.options.route.clone(),
            timeout: self.options.timeout,
            dispatcher: Dispatcher::new(self.options.pool_size.unwrap_or(usize::MAX)),
            minion_factory: self.minion_factory.clone(),
        });

        tracing::info!("Started Overlord server at port {}", local_addr.port());

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _) = accepted.map_err(|e| {
                        OverlordError::Transport(format!("Failed to accept connection: {e}"))
                    })?;
                    let io = TokioIo::new(stream);
                    let state = state.clone();

                    tokio::task::spawn(async move {
                        let service = service_fn(move |req| {
                            let state = state.clone();
                            async move { handle_request(state, req).await }
                        });

                        if let Err(err) = http1::Builder::new()
                            .serve_connection(io, service)
                            .await
                        {
                            tracing::error!("Error serving connection: {err}");
                        }
                    });
                }
                _ = self.shutdown.notified() => {
                    tracing::info!("Overlord server shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Closes the listener; any in-flight `start()` call settles.
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }
}

async fn handle_request(
    state: Arc<ServerState>,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, OverlordError> {
    let (parts, body) = req.into_parts();
    let location = state.route.resolve(parts.uri.path());

    tracing::info!("Received a request for URL: {location:?}");

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::error!("Failed to read request body: {e}");
            return Ok(payload_to_http(ResponsePayload::unhandled()));
        }
    };

    let order = WorkOrder {
        location,
        parts,
        body,
    };

    // The response slot is shared between the mission and its failure
    // handler; whichever fires first answers the client, the other finds the
    // slot empty.
    let (tx, rx) = oneshot::channel::<ResponsePayload>();
    let slot = Arc::new(Mutex::new(Some(tx)));

    let mission_slot = slot.clone();
    let minion_factory = state.minion_factory.clone();
    let instructions = MinionInstructions {
        timeout: state.timeout,
    };

    let mission = Box::pin(async move {
        let minion = minion_factory(instructions)?;
        let payload = minion.do_work(order).await?;
        if let Some(tx) = mission_slot.lock().unwrap().take() {
            let _ = tx.send(payload);
        }
        Ok(())
    });

    let failure_slot = slot;
    state.dispatcher.submit(
        mission,
        Box::new(move |_err| {
            if let Some(tx) = failure_slot.lock().unwrap().take() {
                let _ = tx.send(ResponsePayload::unhandled());
            }
        }),
    );

    // A dropped slot still answers the client; there is never a hang past
    // the minion timeout plus scheduling delay.
    let payload = match rx.await {
        Ok(payload) => payload,
        Err(_) => ResponsePayload::unhandled(),
    };

    Ok(payload_to_http(payload))
}

/// Writes a `ResponsePayload` back as an HTTP response. String bodies go out
/// verbatim, anything else is serialized as JSON. The optional status text
/// travels in an `x-status-text` header since HTTP/1.1 reason phrases are
/// not configurable here.
fn payload_to_http(payload: ResponsePayload) -> Response<Full<Bytes>> {
    let body = match &payload.body {
        Value::Null => Bytes::new(),
        Value::String(s) => Bytes::from(s.clone()),
        other => Bytes::from(serde_json::to_vec(other).unwrap_or_default()),
    };

    let mut builder = Response::builder().status(
        StatusCode::from_u16(payload.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    );

    for (name, value) in &payload.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            builder = builder.header(name, value);
        }
    }

    if let Some(status_text) = &payload.status_text {
        if let Ok(value) = HeaderValue::try_from(status_text.as_str()) {
            builder = builder.header("x-status-text", value);
        }
    }

    builder.body(Full::new(body)).unwrap_or_else(|e| {
        tracing::error!("Failed to build HTTP response: {e}");
        Response::new(Full::new(Bytes::new()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_to_http_string_body() {
        let response = payload_to_http(ResponsePayload::wrap(json!("<p>hi</p>")));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/html"
        );
    }

    #[test]
    fn test_payload_to_http_unhandled_sets_status_text() {
        let response = payload_to_http(ResponsePayload::unhandled());
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get("x-status-text").unwrap(),
            "Ouch! That went unhandled."
        );
    }

    #[test]
    fn test_payload_to_http_invalid_status_falls_back_to_500() {
        let response = payload_to_http(ResponsePayload::empty(99));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_options_defaults() {
        let options = OverlordOptions::new(ScriptRoute::root_path("./scripts"));
        assert_eq!(options.port, 8080);
        assert_eq!(options.timeout, Duration::from_millis(10_000));
        assert!(options.pool_size.is_none());
    }
}
