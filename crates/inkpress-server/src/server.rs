//! Development server implementation.

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Directory to serve (the build output)
    pub root: PathBuf,

    /// Port to listen on
    pub port: u16,

    /// Host to bind to
    pub host: String,

    /// Open browser on start
    pub open: bool,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("dist"),
            port: 8080,
            host: "127.0.0.1".to_string(),
            open: false,
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {0}: {1}")]
    BindError(String, String),

    #[error("File watch error: {0}")]
    WatchError(String),

    #[error("Server error: {0}")]
    ServeError(String),
}

/// Development server.
pub struct DevServer {
    config: DevServerConfig,
}

impl DevServer {
    /// Create a new development server.
    pub fn new(config: DevServerConfig) -> Self {
        Self { config }
    }

    /// Router serving the output directory, with `index.html` for directories.
    pub fn router(&self) -> Router {
        Router::new()
            .fallback_service(ServeDir::new(&self.config.root).append_index_html_on_directories(true))
    }

    /// Bind the listening socket.
    pub async fn bind(self) -> Result<BoundServer, ServerError> {
        let target = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|e| ServerError::BindError(target.clone(), e.to_string()))?;
        let addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(target, e.to_string()))?;

        Ok(BoundServer {
            listener,
            addr,
            app: self.router(),
            open: self.config.open,
        })
    }
}

/// A server with its socket bound, ready to serve.
pub struct BoundServer {
    listener: TcpListener,
    addr: SocketAddr,
    app: Router,
    open: bool,
}

impl BoundServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve requests until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let url = format!("http://{}", self.addr);
        tracing::info!("Serving at {}", url);

        if self.open {
            if let Err(e) = open::that(&url) {
                tracing::warn!("Could not open browser: {}", e);
            }
        }

        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::ServeError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn creates_server_with_default_config() {
        let server = DevServer::new(DevServerConfig::default());
        assert_eq!(server.config.port, 8080);
        assert_eq!(server.config.host, "127.0.0.1");
    }

    #[tokio::test]
    async fn serves_output_directory() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("about")).unwrap();
        fs::write(temp.path().join("a.html"), "<h1>A</h1>").unwrap();
        fs::write(temp.path().join("about/index.html"), "<h1>About</h1>").unwrap();

        let bound = DevServer::new(DevServerConfig {
            root: temp.path().to_path_buf(),
            port: 0,
            ..Default::default()
        })
        .bind()
        .await
        .unwrap();
        let addr = bound.local_addr();

        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(bound.serve(async {
            let _ = stopped.await;
        }));

        let page = get(addr, "/a.html").await;
        assert!(page.starts_with("HTTP/1.1 200"));
        assert!(page.contains("<h1>A</h1>"));

        let index = get(addr, "/about/").await;
        assert!(index.contains("<h1>About</h1>"));

        let missing = get(addr, "/nope.html").await;
        assert!(missing.starts_with("HTTP/1.1 404"));

        stop.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn reports_bind_failures() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let result = DevServer::new(DevServerConfig {
            port,
            ..Default::default()
        })
        .bind()
        .await;

        assert!(matches!(result, Err(ServerError::BindError(..))));
    }
}
