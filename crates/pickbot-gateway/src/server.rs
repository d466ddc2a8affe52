//! [`HttpServer`] – accept loop shared by the controller and actuation APIs.
//!
//! Each accepted connection is served on its own task: one request is read
//! within the read timeout, dispatched to the [`Router`] inside an
//! `http_request` span, and answered with `Connection: close`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use pickbot_types::RobotError;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, info_span, warn};

use crate::http::{self, HttpError, Request, Response};

/// Maps a parsed request to a response.
pub trait Router: Send + Sync + 'static {
    fn handle(&self, request: &Request) -> Response;
}

/// A named HTTP listener for one [`Router`].
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use pickbot_gateway::{HttpServer, IngressRouter};
/// use pickbot_runtime::InputBuffer;
///
/// # async fn run() {
/// let router = IngressRouter::new(Arc::new(InputBuffer::default()));
/// HttpServer::new("controller", router)
///     .with_port(8000)
///     .run(std::future::pending())
///     .await
///     .expect("controller API failed");
/// # }
/// ```
pub struct HttpServer<R> {
    name: &'static str,
    router: Arc<R>,
    port: u16,
    read_timeout: Duration,
}

impl<R: Router> HttpServer<R> {
    /// A server for `router` on port 0 until [`with_port`][Self::with_port].
    pub fn new(name: &'static str, router: R) -> Self {
        Self {
            name,
            router: Arc::new(router),
            port: 0,
            read_timeout: http::READ_TIMEOUT,
        }
    }

    /// Override the listening port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Override how long a peer may take to send its request.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind `0.0.0.0:<port>` and serve until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`RobotError::Network`] if the listener cannot bind.
    pub async fn run<F>(self, shutdown: F) -> Result<(), RobotError>
    where
        F: Future<Output = ()>,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RobotError::Network(format!("{} bind error on {addr}: {e}", self.name)))?;
        info!(service = self.name, port = self.port, "listening");
        serve(listener, self.name, self.router, self.read_timeout, shutdown).await;
        Ok(())
    }
}

/// Serve connections from an already bound `listener` until `shutdown`
/// resolves.  In-flight connections finish on their own tasks; a peer that
/// has not delivered its request within `read_timeout` gets a `408`.
pub async fn serve<R, F>(
    listener: TcpListener,
    name: &'static str,
    router: Arc<R>,
    read_timeout: Duration,
    shutdown: F,
) where
    R: Router,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(service = name, "stopped accepting connections");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let router = Arc::clone(&router);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, name, router.as_ref(), read_timeout).await {
                            debug!(service = name, %peer, error = %e, "connection error");
                        }
                    });
                }
                Err(e) => warn!(service = name, error = %e, "accept error"),
            }
        }
    }
}

async fn handle_connection<R: Router>(
    mut stream: TcpStream,
    name: &'static str,
    router: &R,
    read_timeout: Duration,
) -> Result<(), HttpError> {
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);

    let response = match http::read_request_within(&mut reader, read_timeout).await {
        Ok(Some(request)) => dispatch(name, router, &request),
        Ok(None) => return Ok(()),
        Err(e) => match e.response() {
            Some(response) => {
                debug!(service = name, error = %e, status = response.status, "request rejected");
                response
            }
            None => return Err(e),
        },
    };

    http::write_response(&mut write_half, &response).await?;
    Ok(())
}

/// Run `router` for one request inside an `http_request` span.
fn dispatch<R: Router>(name: &'static str, router: &R, request: &Request) -> Response {
    let span = info_span!(
        "http_request",
        service = name,
        method = %request.method,
        path = %request.path,
        status = tracing::field::Empty,
    );
    let _entered = span.enter();
    let response = router.handle(request);
    span.record("status", response.status);
    debug!(status = response.status, "request served");
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;
    use tracing::span::{Attributes, Id};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    struct Echo;

    impl Router for Echo {
        fn handle(&self, request: &Request) -> Response {
            Response::json(200, &serde_json::json!({ "path": request.path, "body": request.text() }))
        }
    }

    async fn roundtrip(addr: SocketAddr, raw: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw).await.unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).await.unwrap();
        out
    }

    #[test]
    fn with_port_overrides_default() {
        let server = HttpServer::new("echo", Echo).with_port(9999);
        assert_eq!(server.port(), 9999);
    }

    #[tokio::test]
    async fn serves_requests_until_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(serve(
            listener,
            "echo",
            Arc::new(Echo),
            http::READ_TIMEOUT,
            async {
                let _ = stop_rx.await;
            },
        ));

        let reply = roundtrip(addr, b"POST /x HTTP/1.1\r\nContent-Length: 2\r\n\r\nhi").await;
        assert!(reply.starts_with("HTTP/1.1 200 OK"));
        let (_, body) = reply.split_once("\r\n\r\n").unwrap();
        let body: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(body, serde_json::json!({"path": "/x", "body": "hi"}));

        let reply = roundtrip(addr, b"nonsense\r\n").await;
        assert!(reply.starts_with("HTTP/1.1 400"));

        stop_tx.send(()).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn stalled_clients_get_request_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(serve(
            listener,
            "echo",
            Arc::new(Echo),
            Duration::from_millis(100),
            async {
                let _ = stop_rx.await;
            },
        ));

        // Partial header section, then a body shorter than announced.
        for raw in [
            &b"GET /health HTTP/1.1\r\nHost: a\r\n"[..],
            &b"POST /x HTTP/1.1\r\nContent-Length: 50\r\n\r\nshort"[..],
        ] {
            let reply = tokio::time::timeout(Duration::from_secs(2), roundtrip(addr, raw))
                .await
                .expect("server must answer a stalled client");
            assert!(reply.starts_with("HTTP/1.1 408 Request Timeout"), "{reply}");
        }

        stop_tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn chunked_requests_get_length_required() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(serve(
            listener,
            "echo",
            Arc::new(Echo),
            http::READ_TIMEOUT,
            async {
                let _ = stop_rx.await;
            },
        ));

        let raw = b"POST /inputs HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\n";
        let reply = roundtrip(addr, raw).await;
        assert!(reply.starts_with("HTTP/1.1 411 Length Required"), "{reply}");

        stop_tx.send(()).unwrap();
        task.await.unwrap();
    }

    struct SpanNames(Arc<Mutex<Vec<&'static str>>>);

    impl<S: tracing::Subscriber> Layer<S> for SpanNames {
        fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
            self.0.lock().unwrap().push(attrs.metadata().name());
        }
    }

    #[test]
    fn dispatch_runs_router_inside_request_span() {
        let names = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(SpanNames(Arc::clone(&names)));
        let response = tracing::subscriber::with_default(subscriber, || {
            dispatch("echo", &Echo, &Request::new("GET", "/span"))
        });
        assert_eq!(response.status, 200);
        assert_eq!(*names.lock().unwrap(), vec!["http_request"]);
    }
}
