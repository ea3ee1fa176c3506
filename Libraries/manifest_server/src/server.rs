use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::IntoResponse,
    routing::get,
    Router,
};
use bytes::Bytes;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::{debug, error, info, instrument, warn};

use crate::ServerError;

pub const MANIFEST_PATH: &str = "/manifest.mpd";
pub const MANIFEST_CONTENT_TYPE: &str = "application/dash+xml";

/// How long the server waits for the next connection before shutting down.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle to a running manifest server.
///
/// Dropping the handle leaves the server running until it idles out.
#[derive(Debug)]
pub struct ManifestServer {
    addr: SocketAddr,
    url: String,
    handle: JoinHandle<()>,
}

impl ManifestServer {
    /// `http://127.0.0.1:<port>/manifest.mpd`
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// True once the accept loop has returned and the socket is closed.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the server to idle out.
    pub async fn wait(self) {
        if let Err(e) = self.handle.await {
            error!("Manifest server task failed: {}", e);
        }
    }
}

/// Publishes `manifest` at [`MANIFEST_PATH`] on an ephemeral loopback port.
///
/// Returns as soon as the socket is bound. The accept loop runs on its own
/// task and stops after [`IDLE_TIMEOUT`] without a new connection.
pub async fn start_server(manifest: impl Into<Bytes>) -> Result<ManifestServer, ServerError> {
    start_server_with_timeout(manifest, IDLE_TIMEOUT).await
}

/// [`start_server`] with a custom idle timeout.
pub async fn start_server_with_timeout(
    manifest: impl Into<Bytes>,
    idle_timeout: Duration,
) -> Result<ManifestServer, ServerError> {
    let bind_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: bind_addr,
            source,
        })?;
    let addr = listener.local_addr().map_err(ServerError::LocalAddr)?;
    let url = format!("http://{}{}", addr, MANIFEST_PATH);

    let manifest = manifest.into();
    info!("Serving {} byte manifest at {}", manifest.len(), url);

    let app = create_router(manifest);
    let handle = tokio::spawn(run_accept_loop(listener, app, idle_timeout));

    Ok(ManifestServer { addr, url, handle })
}

fn create_router(manifest: Bytes) -> Router {
    Router::new()
        // HEAD is answered by the same handler with the body stripped.
        .route(MANIFEST_PATH, get(serve_manifest))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true)),
        )
        .with_state(manifest)
}

async fn serve_manifest(State(manifest): State<Bytes>) -> impl IntoResponse {
    (
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static(MANIFEST_CONTENT_TYPE),
            ),
            (header::CONTENT_LENGTH, HeaderValue::from(manifest.len())),
        ],
        manifest,
    )
}

#[instrument(skip_all, fields(addr = ?listener.local_addr().ok()))]
async fn run_accept_loop(listener: TcpListener, app: Router, idle_timeout: Duration) {
    loop {
        match timeout(idle_timeout, listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                debug!("Accepted connection from {}", peer);
                let service = TowerToHyperService::new(app.clone().into_service());
                tokio::spawn(async move {
                    if let Err(e) = http1::Builder::new()
                        .keep_alive(false)
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        debug!("Connection from {} ended with an error: {}", peer, e);
                    }
                });
            }
            Ok(Err(e)) => {
                warn!("Failed to accept connection: {}", e);
            }
            Err(_) => {
                info!("No connection within {:?}, shutting down", idle_timeout);
                break;
            }
        }
    }
}
