//! HTTP server implementation.

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use std::future::Future;
use std::net::SocketAddr;
use tracing::{error, info};

use super::service::{configure, AppState};
use crate::error::Result;

/// HTTP server for the shortening API and redirects.
pub struct TinyUrlServer {
    /// Address to bind to
    addr: SocketAddr,
    /// State shared by every worker
    state: web::Data<AppState>,
}

impl TinyUrlServer {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self {
            addr,
            state: web::Data::new(state),
        }
    }

    /// Start the server and run until `signal` resolves.
    ///
    /// In-flight requests are allowed to finish before this returns.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + 'static,
    {
        let state = self.state.clone();

        info!(addr = %self.addr, "Starting HTTP server");

        let server = HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .wrap(cors())
                .configure(configure)
        })
        .disable_signals()
        .bind(self.addr)
        .map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP server");
            e
        })?
        .run();

        let handle = server.handle();
        actix_web::rt::spawn(async move {
            signal.await;
            info!("Stopping HTTP server");
            handle.stop(true).await;
        });

        server.await?;
        Ok(())
    }
}

/// Browsers may call the API from any origin.
fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(vec!["POST", "GET", "OPTIONS", "PUT", "DELETE"])
        .allow_any_header()
        .max_age(3600)
}
