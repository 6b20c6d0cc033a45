//! Development server implementation.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::{
    body::{Body, Bytes},
    extract::{Request, State, WebSocketUpgrade},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::services::ServeDir;

use kiln_core::config::ServerConfig;
use kiln_core::ReloadBus;

use crate::websocket::{
    forward_reloads, inject_script, livereload_client_script, LIVERELOAD_PATH,
    LIVERELOAD_SCRIPT_PATH,
};

/// Largest HTML body the injection middleware will buffer.
const MAX_INJECT_BYTES: usize = 16 * 1024 * 1024;

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Directory served at `/`
    pub root: PathBuf,

    /// Port to listen on
    pub port: u16,

    /// Host to bind to
    pub host: String,

    /// Open browser on start
    pub open: bool,
}

impl DevServerConfig {
    pub fn from_config(root: &Path, server: &ServerConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            port: server.port,
            host: server.host.clone(),
            open: server.open,
        }
    }
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self::from_config(Path::new("app"), &ServerConfig::default())
    }
}

/// Errors that can occur with the server or watcher.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid listen address {0}")]
    InvalidAddress(String),

    #[error("Failed to bind to {0}: {1}")]
    Bind(SocketAddr, String),

    #[error("Server error: {0}")]
    Serve(String),

    #[error("File watch error: {0}")]
    Watch(String),
}

#[derive(Clone)]
struct ServerState {
    reload: ReloadBus,
}

/// Static file server with live reload.
pub struct DevServer {
    config: DevServerConfig,
    reload: ReloadBus,
}

impl DevServer {
    pub fn new(config: DevServerConfig, reload: ReloadBus) -> Self {
        Self { config, reload }
    }

    pub fn address(&self) -> Result<SocketAddr, ServerError> {
        let raw = format!("{}:{}", self.config.host, self.config.port);
        raw.parse().map_err(|_| ServerError::InvalidAddress(raw))
    }

    /// Routes: live reload endpoints, then static files from the root.
    pub fn router(&self) -> Router {
        let state = ServerState {
            reload: self.reload.clone(),
        };

        Router::new()
            .route(LIVERELOAD_PATH, get(ws_handler))
            .route(LIVERELOAD_SCRIPT_PATH, get(script_handler))
            .fallback_service(ServeDir::new(&self.config.root))
            .layer(middleware::from_fn(inject_livereload))
            .with_state(state)
    }

    /// Serve until Ctrl-C.
    pub async fn start(self) -> Result<(), ServerError> {
        let addr = self.address()?;
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(addr, e.to_string()))?;

        let url = format!("http://{addr}");
        tracing::info!(root = %self.config.root.display(), "Serving at {}", url);

        if self.config.open {
            if let Err(e) = open::that(&url) {
                tracing::warn!(error = %e, "Could not open browser");
            }
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Shutting down dev server");
            })
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| forward_reloads(socket, state.reload))
}

async fn script_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        livereload_client_script(),
    )
}

/// Add the live reload script tag to full HTML responses.
async fn inject_livereload(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/html"));
    if response.status() != StatusCode::OK || !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes: Bytes = match axum::body::to_bytes(body, MAX_INJECT_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to buffer HTML response");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = inject_script(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use tower::ServiceExt;

    fn server(root: &Path) -> DevServer {
        let config = DevServerConfig {
            root: root.to_path_buf(),
            open: false,
            ..DevServerConfig::default()
        };
        DevServer::new(config, ReloadBus::new())
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Option<String>, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, content_type, String::from_utf8_lossy(&body).into_owned())
    }

    #[test]
    fn defaults_to_local_port_3000() {
        let server = DevServer::new(DevServerConfig::default(), ReloadBus::new());
        assert_eq!(server.address().unwrap().to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn rejects_bad_host() {
        let config = DevServerConfig {
            host: "not a host".to_string(),
            ..DevServerConfig::default()
        };
        let server = DevServer::new(config, ReloadBus::new());
        assert!(matches!(server.address(), Err(ServerError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn serves_pages_with_livereload() {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join("index.html"),
            "<html><body><h1>Home</h1></body></html>",
        )
        .unwrap();

        let (status, _, body) = get(server(temp.path()).router(), "/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            r#"<html><body><h1>Home</h1><script src="/__livereload.js"></script></body></html>"#
        );
    }

    #[tokio::test]
    async fn leaves_other_assets_alone() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("css")).unwrap();
        fs::write(temp.path().join("css/style.min.css"), "a{color:red}").unwrap();

        let (status, content_type, body) =
            get(server(temp.path()).router(), "/css/style.min.css").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("text/css"));
        assert_eq!(body, "a{color:red}");
    }

    #[tokio::test]
    async fn serves_client_script() {
        let temp = tempdir().unwrap();

        let (status, content_type, body) =
            get(server(temp.path()).router(), LIVERELOAD_SCRIPT_PATH).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/javascript"));
        assert!(body.contains("WebSocket"));
    }

    #[tokio::test]
    async fn missing_files_are_not_found() {
        let temp = tempdir().unwrap();
        let (status, _, _) = get(server(temp.path()).router(), "/nope.html").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
