//! Web server setup and startup.
//!
//! [`WebServer`] composes the Axum router for an [`Agent`], registers all
//! routes under the configured API prefix, and runs the HTTP listener until
//! its shutdown future resolves.

use std::future::Future;

use axum::Router;
use axum::routing::{delete, get, post};
use clawdlocal_agent::Agent;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};

use crate::api;
use crate::state::AppState;

/// The ClawdLocal web server.
#[derive(Debug, Clone)]
pub struct WebServer {
    agent: Agent,
}

impl WebServer {
    pub fn new(agent: Agent) -> Self {
        Self { agent }
    }

    /// Return the `host:port` string this server will bind to.
    pub fn addr(&self) -> String {
        let web = &self.agent.config().web;
        format!("{}:{}", web.host, web.port)
    }

    /// Build the Axum router with all routes registered.
    pub fn router(&self) -> Router {
        let web = &self.agent.config().web;

        let api_routes = Router::new()
            .route("/agent", get(api::agent_info))
            .route("/events", post(api::post_event))
            .route("/messages", post(api::post_message))
            // Memory.
            .route(
                "/memory/short",
                get(api::list_short_term).post(api::store_short_term),
            )
            .route("/memory/short/{key}", delete(api::delete_short_term))
            .route(
                "/memory/long",
                get(api::list_long_term).post(api::store_long_term),
            )
            .route("/memory/long/{key}", delete(api::delete_long_term))
            .route("/memory/stats", get(api::memory_stats))
            .route("/memory/search", get(api::search_memory))
            // Tools.
            .route("/tools", get(api::list_tools))
            .route("/tools/{name}/execute", post(api::execute_tool));

        let prefix = web.api_prefix.trim_end_matches('/');
        let mut router = Router::new().route("/health", get(api::health));
        router = if prefix.is_empty() {
            router.merge(api_routes)
        } else {
            router.nest(prefix, api_routes)
        };

        if web.static_dir.is_dir() {
            tracing::debug!(dir = %web.static_dir.display(), "serving static files");
            router = router
                .nest_service("/static", ServeDir::new(&web.static_dir))
                .route_service("/", ServeFile::new(web.static_dir.join("index.html")));
        }

        router
            .layer(CorsLayer::permissive())
            .with_state(AppState::new(self.agent.clone()))
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn serve<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr()).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        tracing::info!(addr = %listener.local_addr()?, "starting web server");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        tracing::info!("web server stopped");
        Ok(())
    }
}
