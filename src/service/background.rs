use serde_json::Value;
use std::sync::Arc;
use tokio::{
    select,
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::core::client::{DEFAULT_REFRESH_RATE, REFRESH_ALARM, RETRY_ALARM};
use crate::core::{FetchOutcome, TrmnlError};
use crate::devices::{Device, DeviceDirectory};
use crate::engine::FetchEngine;
use crate::schedule::Alarm;
use crate::service::messages::{
    Ack, CurrentImage, DeviceList, Event, Request, Response, StatusLines,
};
use crate::status::StatusInfo;
use crate::store::{self, SettingsPatch, keys};

const REQUEST_CAPACITY: usize = 64;

type Envelope = (Request, oneshot::Sender<Response>);

/// The extension's background worker: routes alarms and client requests to the engine.
#[derive(Clone)]
pub struct Background {
    engine: Arc<FetchEngine>,
    devices: DeviceDirectory,
}

impl Background {
    pub fn new(engine: FetchEngine) -> Self {
        let devices = DeviceDirectory::new(engine.client());
        Self {
            engine: Arc::new(engine),
            devices,
        }
    }

    pub fn engine(&self) -> &Arc<FetchEngine> {
        &self.engine
    }

    /// First-run / upgrade hook.
    ///
    /// Fills defaults for missing settings, clears retry state, programs the
    /// refresh alarm and, when a key is already configured, fetches.
    pub async fn on_installed(&self) -> Result<(), TrmnlError> {
        info!("display extension installed");
        let raw = self.engine.store().get(keys::ALL).await?;
        let falsy = |k: &str| match raw.get(k) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(Value::Number(n)) => n.as_f64() == Some(0.0),
            Some(_) => false,
        };

        let mut patch = SettingsPatch::new();
        if falsy(keys::API_KEY) {
            patch = patch.api_key("");
        }
        if falsy(keys::REFRESH_RATE) {
            patch = patch.refresh_rate(DEFAULT_REFRESH_RATE);
        }
        if falsy(keys::LAST_FETCH) {
            patch = patch.last_fetch(0);
        }
        if falsy(keys::NEXT_FETCH) {
            patch = patch.next_fetch(0);
        }
        store::apply(&**self.engine.store(), patch.reset_retry()).await?;

        let settings = self.engine.settings().await?;
        if settings.current_image.is_some() {
            debug!("found stored image data");
        }

        self.engine.setup_refresh_alarm(settings.refresh_rate);

        if settings.has_api_key() {
            self.engine.fetch_image(false).await?;
        }
        Ok(())
    }

    /// Dispatch a fired alarm. Unknown alarm names are ignored.
    pub async fn on_alarm(&self, alarm: &Alarm) -> Result<Option<FetchOutcome>, TrmnlError> {
        match alarm.name.as_str() {
            REFRESH_ALARM => self.engine.fetch_image(false).await.map(Some),
            RETRY_ALARM => {
                info!("retry alarm triggered");
                self.engine.fetch_image(false).await.map(Some)
            }
            other => {
                debug!(alarm = other, "ignoring unknown alarm");
                Ok(None)
            }
        }
    }

    /// Store a new device key, clear backoff memory and fetch with the normal gating.
    ///
    /// # Errors
    ///
    /// Returns a `TrmnlError` only when the store fails.
    pub async fn save_api_key(&self, api_key: &str) -> Result<FetchOutcome, TrmnlError> {
        store::apply(
            &**self.engine.store(),
            SettingsPatch::new().api_key(api_key).reset_retry(),
        )
        .await?;
        info!("API key saved");
        self.engine.fetch_image(false).await
    }

    /// Switch to `device`: adopt its key, forget backoff and last fetch, and force a fetch.
    pub async fn select_device(&self, device: &Device) -> Result<FetchOutcome, TrmnlError> {
        store::apply(
            &**self.engine.store(),
            SettingsPatch::new()
                .api_key(device.api_key.clone())
                .device_id(Some(device.id))
                .reset_retry()
                .last_fetch(0),
        )
        .await?;
        info!(device = %device.friendly_id, "device selected");
        self.engine.fetch_image(true).await
    }

    pub async fn force_refresh(&self) -> Result<FetchOutcome, TrmnlError> {
        self.engine.fetch_image(true).await
    }

    pub async fn current_image(&self) -> Result<CurrentImage, TrmnlError> {
        Ok(self.engine.settings().await?.into())
    }

    pub async fn status(&self) -> Result<StatusInfo, TrmnlError> {
        let settings = self.engine.settings().await?;
        Ok(StatusInfo::from_settings(&settings, self.engine.now_ms()))
    }

    /// Answer one client request. Failures are folded into the response.
    pub async fn handle(&self, req: Request) -> Response {
        match req {
            Request::SaveApiKey { api_key } => {
                let api_key = api_key.trim();
                if api_key.is_empty() {
                    return Response::Ack(Ack::error("API key cannot be empty"));
                }
                match self.save_api_key(api_key).await {
                    Ok(_) => Response::Ack(Ack::ok()),
                    Err(e) => {
                        error!(error = %e, "error saving API key");
                        Response::Ack(Ack::error(e.to_string()))
                    }
                }
            }
            Request::GetCurrentImage => match self.current_image().await {
                Ok(snapshot) => Response::CurrentImage(snapshot),
                Err(e) => {
                    error!(error = %e, "error reading current image");
                    Response::CurrentImage(CurrentImage {
                        current_image: None,
                        last_fetch: 0,
                        next_fetch: 0,
                        refresh_rate: DEFAULT_REFRESH_RATE,
                    })
                }
            },
            Request::ForceRefresh => Response::Ack(outcome_ack(self.force_refresh().await)),
            Request::ListDevices { account_key } => {
                match self.devices.list(account_key.trim()).await {
                    Ok(devices) => Response::Devices(DeviceList {
                        success: true,
                        devices,
                        error: None,
                    }),
                    Err(e) => Response::Devices(DeviceList {
                        success: false,
                        devices: Vec::new(),
                        error: Some(e.to_string()),
                    }),
                }
            }
            Request::SelectDevice { device } => {
                Response::Ack(outcome_ack(self.select_device(&device).await))
            }
            Request::GetStatus => match self.status().await {
                Ok(info) => Response::Status(StatusLines { lines: info.lines() }),
                Err(e) => {
                    error!(error = %e, "error reading status");
                    Response::Status(StatusLines { lines: Vec::new() })
                }
            },
        }
    }

    /// Run the worker loop on a background task.
    ///
    /// Alarms and requests are handled one at a time, in arrival order.
    pub fn serve(self, alarms: mpsc::UnboundedReceiver<Alarm>) -> (ServiceHandle, ServiceClient) {
        let (tx, rx) = mpsc::channel::<Envelope>(REQUEST_CAPACITY);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let client = ServiceClient {
            tx,
            engine: Arc::clone(&self.engine),
        };

        let join = tokio::spawn(self.run(alarms, rx, stop_rx));

        (
            ServiceHandle {
                join,
                stop_tx: Some(stop_tx),
            },
            client,
        )
    }

    async fn run(
        self,
        mut alarms: mpsc::UnboundedReceiver<Alarm>,
        mut requests: mpsc::Receiver<Envelope>,
        mut stop_rx: oneshot::Receiver<()>,
    ) {
        let mut alarms_open = true;
        loop {
            select! {
                maybe = alarms.recv(), if alarms_open => match maybe {
                    Some(alarm) => {
                        if let Err(e) = self.on_alarm(&alarm).await {
                            error!(alarm = %alarm.name, error = %e, "alarm handling failed");
                        }
                    }
                    None => alarms_open = false,
                },
                maybe = requests.recv() => match maybe {
                    Some((req, reply)) => {
                        let resp = self.handle(req).await;
                        if reply.send(resp).is_err() {
                            debug!("requester went away before the response");
                        }
                    }
                    None => break,
                },
                _ = &mut stop_rx => break,
            }
        }
        info!("background service stopped");
    }
}

fn outcome_ack(res: Result<FetchOutcome, TrmnlError>) -> Ack {
    match res {
        Ok(outcome) if outcome.is_success() => Ack::ok(),
        Ok(_) => Ack::failed(),
        Err(e) => {
            warn!(error = %e, "refresh failed");
            Ack::error(e.to_string())
        }
    }
}

/// A handle for the running worker task.
pub struct ServiceHandle {
    join: JoinHandle<()>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl ServiceHandle {
    /// Politely ask the worker to stop and wait for it to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.join.await;
    }

    /// Immediately abort the worker task.
    pub fn abort(self) {
        self.join.abort();
    }
}

/// Sends requests to a running [`Background`] and subscribes to its events.
#[derive(Clone)]
pub struct ServiceClient {
    tx: mpsc::Sender<Envelope>,
    engine: Arc<FetchEngine>,
}

impl ServiceClient {
    /// Send `req` and wait for the worker's response.
    ///
    /// # Errors
    ///
    /// Returns [`TrmnlError::ServiceClosed`] if the worker has stopped.
    pub async fn request(&self, req: Request) -> Result<Response, TrmnlError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((req, reply_tx))
            .await
            .map_err(|_| TrmnlError::ServiceClosed)?;
        reply_rx.await.map_err(|_| TrmnlError::ServiceClosed)
    }

    /// Receive [`Event`]s published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.engine.subscribe()
    }
}
