//! Headless host for the background worker.
//!
//! Reads `Request` messages as newline-delimited JSON from stdin and writes
//! `Response` and `Event` messages to stdout. Settings persist in a JSON file.
//!
//! Environment:
//! - `TRMNL_ENV`: `production` (default) or `development`
//! - `TRMNL_BASE_URL`: overrides the host picked by `TRMNL_ENV`
//! - `TRMNL_STATE`: settings file, default `trmnl-state.json`
//! - `RUST_LOG`: log filter, default `info`
//!
//! All tracing output goes to stderr so that stdout remains a clean protocol channel.

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{Mutex, broadcast::error::RecvError};
use trmnl_tab::service::{Background, Request};
use trmnl_tab::{Environment, FetchEngine, JsonFileStore, TokioScheduler, TrmnlClient, TrmnlError};
use url::Url;

const DEFAULT_STATE_FILE: &str = "trmnl-state.json";

#[tokio::main]
async fn main() -> Result<(), TrmnlError> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let environment = Environment::from_env();
    let mut builder = TrmnlClient::builder().environment(environment);
    if let Ok(base) = std::env::var("TRMNL_BASE_URL") {
        builder = builder.base_url(Url::parse(&base)?);
    }
    let client = builder.build()?;

    let state = std::env::var("TRMNL_STATE").unwrap_or_else(|_| DEFAULT_STATE_FILE.to_string());
    let store = JsonFileStore::open(&state).await?;
    tracing::info!(%environment, state = %state, "trmnl-host starting");

    let (scheduler, alarms) = TokioScheduler::new();
    let engine = FetchEngine::new(client, Arc::new(store), Arc::new(scheduler));
    let background = Background::new(engine);
    background.on_installed().await?;

    let (handle, client) = background.serve(alarms);
    let stdout = Arc::new(Mutex::new(BufWriter::new(tokio::io::stdout())));

    let mut events = client.subscribe();
    let event_out = Arc::clone(&stdout);
    let forwarder = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let Ok(json) = serde_json::to_string(&event) else {
                        continue;
                    };
                    let mut w = event_out.lock().await;
                    if write_line(&mut w, &json).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "event forwarder lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let req: Request = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed request");
                continue;
            }
        };
        let resp = client.request(req).await?;
        let json = serde_json::to_string(&resp)?;
        let mut w = stdout.lock().await;
        write_line(&mut w, &json).await?;
    }

    forwarder.abort();
    handle.stop().await;
    tracing::info!("trmnl-host shut down cleanly");
    Ok(())
}

async fn write_line(
    w: &mut BufWriter<tokio::io::Stdout>,
    line: &str,
) -> Result<(), std::io::Error> {
    w.write_all(line.as_bytes()).await?;
    w.write_all(b"\n").await?;
    w.flush().await
}
