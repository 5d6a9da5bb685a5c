pub mod auth;
pub mod config;
pub mod err;
pub mod export;
pub mod io;
pub mod ledger;
pub mod models;
pub mod notify;
pub mod payments;
pub mod pdf;
pub mod receipt;
pub mod roster;
pub mod state;
pub mod stats;
pub mod store;
pub mod students;

use std::sync::Arc;

use axum::handler::Handler;
use axum::middleware;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Serialize;

use crate::config::Config;
use crate::err::Success;
use crate::state::AppState;

pub use crate::err::Error;

pub type Payload<T> = Result<Json<Success<T>>, Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Json(Success::of(value)))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/verify", post(auth::verify))
        .route("/api/students", get(students::list).post(students::add))
        .route("/api/students/export", get(students::export))
        .route("/api/students/stats", get(students::stats))
        .route("/api/students/search", get(students::search))
        .route(
            "/api/students/:id",
            get(students::get)
                .put(students::update)
                .delete(students::delete),
        )
        .route("/api/payments", post(payments::create))
        .route("/api/payments/download/:receipt_id", get(payments::download))
        .route("/api/payments/receipt/:receipt_id", get(payments::download))
        .route("/api/payments/view/:receipt_id", get(payments::view))
        .route("/api/payments/send-receipt", post(payments::send_receipt))
        .route("/api/payments/list", get(payments::list))
        .route("/api/payments/stats", get(payments::stats))
        .fallback(err::handler404.into_service())
        .layer(middleware::from_fn(err::method_mismatch))
        .layer(Extension(state))
}

pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = config.addr;
    let state = AppState::new(config).await?;
    let app = router(state);

    log::info!("Starting institute admin server on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                log::warn!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    log::info!("Shutdown signal received");
}
