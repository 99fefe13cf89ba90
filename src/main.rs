use std::{
    convert::Infallible,
    env,
    pin::Pin,
    task::{Context, Poll},
    time::{Duration, Instant},
};

use axum::{http::Request, response::Response as AxumResponse};
use srt_relay::{config::RelayConfig, handlers, state::AppState, supervisor::Supervisor};
use tower::{Service, layer::Layer};
use tower_http::cors::CorsLayer;

const SHUTDOWN_MARGIN: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_tracing();

    let config = RelayConfig::from_env();
    tracing::debug!(
        ffmpeg = %config.tools.ffmpeg,
        gst = %config.tools.gst_launch,
        os = %config.os,
        auto_install = config.auto_install,
        default_backend = %config.default_backend,
        "relay configuration loaded"
    );

    let supervisor = Supervisor::from_config(&config);
    let state = AppState {
        supervisor: supervisor.clone(),
        default_backend: config.default_backend,
    };

    let cors = CorsLayer::permissive();
    let request_logger = RequestLoggerLayer::default();

    let app = handlers::router(state).layer(cors).layer(request_logger);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, "srt relay listening");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let stopped = supervisor
        .shutdown(config.stop_grace + SHUTDOWN_MARGIN)
        .await;
    tracing::info!(stopped, "srt relay shut down");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

fn setup_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }

    let env_filter = env::var("RUST_LOG")
        .unwrap_or_else(|_| "srt_relay=debug,axum=info,tower_http=info".to_string());

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter.clone())
        .with_target(false)
        .with_level(true)
        .compact()
        .try_init();

    if init_result.is_ok() {
        tracing::debug!(current_filter = %env_filter, "tracing initialized");
    }
}

#[derive(Clone, Default)]
struct RequestLoggerLayer;

impl<S> Layer<S> for RequestLoggerLayer {
    type Service = RequestLogger<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLogger { inner }
    }
}

#[derive(Clone)]
struct RequestLogger<S> {
    inner: S,
}

impl<S, Body> Service<Request<Body>> for RequestLogger<S>
where
    S: Service<Request<Body>, Response = AxumResponse, Error = Infallible> + Send + 'static,
    S::Future: Send + 'static,
    Body: Send + 'static,
{
    type Response = AxumResponse;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let method = request.method().as_str().to_owned();
        let target = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_owned())
            .unwrap_or_else(|| request.uri().path().to_owned());
        let started = Instant::now();
        let fut = self.inner.call(request);

        Box::pin(async move {
            let response = fut.await?;
            let status = response.status().as_u16();
            let elapsed_ms = started.elapsed().as_millis() as u64;
            tracing::debug!(elapsed_ms, "{} {} {}", status, method, target);
            Ok(response)
        })
    }
}
