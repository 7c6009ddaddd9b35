//! HTTP server: routing, startup warm-up and graceful shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use runtime::warm::warm_model_cache;
use runtime::{Dispatcher, SpeechPipeline, TtsMetrics};
use tts_core::{ServerConfig, TtsError, TtsResult};

use crate::service::{self, AppState};

/// The speech synthesis HTTP server.
pub struct TtsServer {
    config: ServerConfig,
    dispatcher: Dispatcher,
    prometheus: Option<PrometheusHandle>,
    start_time: Instant,
}

impl TtsServer {
    /// Create a server backed by the built-in mock voices.
    pub fn new_mock(config: ServerConfig) -> TtsResult<Self> {
        let pipeline = Arc::new(SpeechPipeline::new_mock(&config)?);
        Ok(Self::with_pipeline(config, pipeline))
    }

    /// Create a server around an existing pipeline.
    pub fn with_pipeline(config: ServerConfig, pipeline: Arc<SpeechPipeline>) -> Self {
        let prometheus = if config.metrics_enabled {
            TtsMetrics::install_prometheus()
                .inspect_err(|e| warn!(error = %e, "Metrics disabled"))
                .ok()
        } else {
            None
        };
        let dispatcher = Dispatcher::new(pipeline, config.max_workers);
        Self {
            config,
            dispatcher,
            prometheus,
            start_time: Instant::now(),
        }
    }

    /// The dispatcher requests are submitted to.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Build the router.
    pub fn router(&self) -> Router {
        let state = Arc::new(AppState {
            dispatcher: self.dispatcher.clone(),
            defaults: self.config.defaults.clone(),
            prometheus: self.prometheus.clone(),
            start_time: self.start_time,
        });

        Router::new()
            .route("/tts", post(service::synthesize).options(service::preflight))
            .route("/audio/{filename}", get(service::get_audio))
            .route("/health", get(service::health))
            .route("/voices", get(service::voices))
            .route("/metrics", get(service::metrics))
            .fallback(service::not_found)
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .layer(middleware::map_response(service::cors))
            .with_state(state)
    }

    /// Load the configured preload voices on the blocking pool.
    ///
    /// Returns how many are ready. Failures are logged and left to load on
    /// first use.
    pub async fn warm_up(&self) -> usize {
        if self.config.preload.is_empty() {
            return 0;
        }
        let engine = self.dispatcher.pipeline().engine().clone();
        let keys = self.config.preload.clone();
        match tokio::task::spawn_blocking(move || warm_model_cache(&engine, &keys)).await {
            Ok(ready) => ready,
            Err(e) => {
                warn!(error = %e, "Warm-up task failed");
                0
            }
        }
    }

    /// Warm up, bind the configured address and serve until SIGINT/SIGTERM.
    pub async fn run(self) -> TtsResult<()> {
        self.warm_up().await;

        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| TtsError::config(format!("cannot bind {addr}: {e}")))?;

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on `listener` until `shutdown` resolves, then drain in-flight
    /// requests for at most `shutdown_timeout_secs`.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> TtsResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let addr = listener.local_addr()?;
        let app = self.router();

        let mut handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_rx.changed().await.ok();
                })
                .await
        });

        info!(
            addr = %addr,
            workers = self.dispatcher.max_workers(),
            output_dir = %self.dispatcher.pipeline().store().root().display(),
            "Speech server started"
        );

        tokio::select! {
            _ = shutdown => {
                info!("Shutdown signal received, draining requests...");
            }
            res = &mut handle => {
                self.dispatcher.close();
                return match res {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e.into()),
                    Err(e) => Err(TtsError::internal(format!("server task failed: {e}"))),
                };
            }
        }

        let _ = shutdown_tx.send(true);

        let timeout = Duration::from_secs(self.config.shutdown_timeout_secs);
        let drained = tokio::time::timeout(timeout, &mut handle).await;
        let result = match drained {
            Ok(Ok(Ok(()))) => {
                info!("Server stopped gracefully");
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(e.into()),
            Ok(Err(e)) => Err(TtsError::internal(format!("server task failed: {e}"))),
            Err(_) => {
                warn!("Shutdown timeout, forcing exit");
                handle.abort();
                Ok(())
            }
        };
        self.dispatcher.close();
        result
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
