//! The TCP listener and the response-wide CORS headers.

use std::io;
use std::net::SocketAddr;

use axum::Router;
use axum::http::{HeaderValue, header};
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tower_http::set_header::SetResponseHeaderLayer;

use opsgate_cluster::WorkerId;
use opsgate_core::Config;

const ALLOWED_METHODS: &str = "POST, GET, OPTIONS, DELETE, PUT";
const ALLOWED_HEADERS: &str =
    "Content-Type, Authorization, Content-Length, X-Requested-With, X-Api-Call, Consumer-Key, User-Name";

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("binding port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Permissive CORS headers on every response, including errors and static
/// assets. Added outside the application pipeline so no response path can
/// miss them.
pub fn with_cors(router: Router) -> Router {
    router
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
}

/// Bind the worker's listening socket with the configured backlog.
///
/// When several workers serve the same port, `SO_REUSEPORT` lets the kernel
/// spread accepted connections across them.
fn bind(port: u16, backlog: i32, reuse_port: bool) -> io::Result<std::net::TcpListener> {
    let addr: SocketAddr = SocketAddr::from(([0, 0, 0, 0], port));
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(reuse_port)?;
    let _ = reuse_port;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

/// Serve the application on the configured port until the connection loop
/// ends. Connections get no idle timeout; slow clients are never dropped by
/// the server itself.
pub async fn serve(
    app: Router,
    cfg: &Config,
    worker: WorkerId,
    reuse_port: bool,
) -> Result<(), ServeError> {
    let std_listener =
        bind(cfg.port, cfg.listen_backlog, reuse_port).map_err(|source| ServeError::Bind {
            port: cfg.port,
            source,
        })?;
    let listener = tokio::net::TcpListener::from_std(std_listener)?;

    tracing::info!(worker = worker.index(), port = cfg.port, "worker listening");
    axum::serve(listener, with_cors(app)).await?;
    Ok(())
}
