//! Telemetry reporting
//!
//! The reporter opens one long-lived channel per session, sends a
//! [`TelemetryFrame`] every reporting interval and applies configuration
//! overrides pushed by the server. Telemetry is best-effort: a failed
//! connect, send or receive stops reporting and nothing else.
//!
//! Frames and inbound messages travel as JSON text.

use crate::{
    config::ConfigOverride,
    types::{SessionId, TelemetryFrame},
    Error, Result,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Messages the telemetry server may push
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Merge into the active configuration
    Config(ConfigOverride),
    /// Keep-alive
    Ping,
}

/// A duplex text channel to the telemetry server
#[async_trait]
pub trait TelemetryChannel: Send {
    async fn send(&mut self, payload: String) -> Result<()>;

    /// Next inbound payload; `Ok(None)` once the server closed the channel.
    /// Must be cancel-safe.
    async fn recv(&mut self) -> Result<Option<String>>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens telemetry channels
#[async_trait]
pub trait TelemetryConnector: Send + Sync {
    async fn connect(&self, session_id: SessionId) -> Result<Box<dyn TelemetryChannel>>;
}

// ============================================================================
// In-memory channel
// ============================================================================

/// Client end of an in-process channel pair
pub struct MemoryChannel {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<String>,
    closed: bool,
}

#[async_trait]
impl TelemetryChannel for MemoryChannel {
    async fn send(&mut self, payload: String) -> Result<()> {
        if self.closed {
            return Err(Error::telemetry("channel closed"));
        }
        self.outbound
            .send(payload)
            .map_err(|_| Error::telemetry("server went away"))
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        if self.closed {
            return Ok(None);
        }
        Ok(self.inbound.recv().await)
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.inbound.close();
        Ok(())
    }
}

/// Server end of an in-process channel pair
pub struct MemoryServer {
    frames: mpsc::UnboundedReceiver<String>,
    push: Option<mpsc::UnboundedSender<String>>,
}

impl MemoryServer {
    /// Next frame sent by the client; `None` once the client is gone
    pub async fn next_frame(&mut self) -> Option<TelemetryFrame> {
        loop {
            let payload = self.frames.recv().await?;
            match serde_json::from_str(&payload) {
                Ok(frame) => return Some(frame),
                Err(e) => warn!(error = %e, "Unparseable frame"),
            }
        }
    }

    /// Frame already queued, without waiting
    pub fn try_next_frame(&mut self) -> Option<TelemetryFrame> {
        let payload = self.frames.try_recv().ok()?;
        serde_json::from_str(&payload).ok()
    }

    pub fn push(&self, message: &InboundMessage) -> Result<()> {
        self.push_raw(serde_json::to_string(message)?)
    }

    pub fn push_raw(&self, payload: impl Into<String>) -> Result<()> {
        self.push
            .as_ref()
            .ok_or_else(|| Error::telemetry("server closed"))?
            .send(payload.into())
            .map_err(|_| Error::telemetry("client went away"))
    }

    /// Close the server side; the client sees end-of-stream
    pub fn close(&mut self) {
        self.push = None;
    }
}

/// Hands out the client end of one in-process channel pair
pub struct MemoryConnector {
    channel: Mutex<Option<MemoryChannel>>,
}

impl MemoryConnector {
    pub fn pair() -> (Self, MemoryServer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let connector = Self {
            channel: Mutex::new(Some(MemoryChannel {
                outbound: out_tx,
                inbound: in_rx,
                closed: false,
            })),
        };
        let server = MemoryServer {
            frames: out_rx,
            push: Some(in_tx),
        };
        (connector, server)
    }
}

#[async_trait]
impl TelemetryConnector for MemoryConnector {
    async fn connect(&self, _session_id: SessionId) -> Result<Box<dyn TelemetryChannel>> {
        let channel = self
            .channel
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::telemetry("in-memory channel already taken"))?;
        Ok(Box::new(channel))
    }
}

// ============================================================================
// HTTP beacon channel
// ============================================================================

/// Posts each frame to an HTTP endpoint. A non-empty response body is read
/// as an inbound message.
pub struct BeaconConnector {
    endpoint: Url,
    client: reqwest::Client,
}

impl BeaconConnector {
    pub fn new(endpoint: Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { endpoint, client })
    }
}

#[async_trait]
impl TelemetryConnector for BeaconConnector {
    async fn connect(&self, session_id: SessionId) -> Result<Box<dyn TelemetryChannel>> {
        let mut endpoint = self.endpoint.clone();
        endpoint
            .query_pairs_mut()
            .append_pair("session", &session_id.to_string());
        debug!(endpoint = %endpoint, "Beacon channel ready");
        Ok(Box::new(BeaconChannel {
            endpoint,
            client: self.client.clone(),
            inbox: VecDeque::new(),
            closed: false,
        }))
    }
}

struct BeaconChannel {
    endpoint: Url,
    client: reqwest::Client,
    inbox: VecDeque<String>,
    closed: bool,
}

#[async_trait]
impl TelemetryChannel for BeaconChannel {
    async fn send(&mut self, payload: String) -> Result<()> {
        if self.closed {
            return Err(Error::telemetry("channel closed"));
        }
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        if !body.trim().is_empty() {
            self.inbox.push_back(body);
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        if self.closed {
            return Ok(None);
        }
        match self.inbox.pop_front() {
            Some(payload) => Ok(Some(payload)),
            // Replies only arrive with a send
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

// ============================================================================
// Reporter
// ============================================================================

/// Why the reporter stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterExit {
    /// Session teardown
    Shutdown,
    /// Could not open the channel; telemetry disabled
    ConnectFailed,
    /// The server closed the channel
    ChannelClosed,
    /// Send or receive failed
    ChannelError,
    /// The controller no longer accepts overrides
    ControllerGone,
}

/// Periodic frame sender and override intake
pub struct TelemetryReporter {
    connector: Arc<dyn TelemetryConnector>,
    session_id: SessionId,
    interval: Duration,
    frames: watch::Receiver<Option<TelemetryFrame>>,
    overrides: mpsc::UnboundedSender<ConfigOverride>,
    shutdown: watch::Receiver<bool>,
}

impl TelemetryReporter {
    pub fn new(
        connector: Arc<dyn TelemetryConnector>,
        session_id: SessionId,
        interval: Duration,
        frames: watch::Receiver<Option<TelemetryFrame>>,
        overrides: mpsc::UnboundedSender<ConfigOverride>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            connector,
            session_id,
            interval,
            frames,
            overrides,
            shutdown,
        }
    }

    /// Run until teardown or channel loss
    #[instrument(skip(self), fields(session = %self.session_id))]
    pub async fn run(mut self) -> ReporterExit {
        let mut channel = match self.connector.connect(self.session_id).await {
            Ok(channel) => channel,
            Err(e) => {
                warn!(error = %e, "Telemetry unavailable, reporting disabled");
                return ReporterExit::ConnectFailed;
            }
        };
        info!(interval_ms = self.interval.as_millis() as u64, "Telemetry channel open");

        let mut ticker = Self::ticker(self.interval);

        let exit = loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break ReporterExit::Shutdown;
                    }
                }
                _ = ticker.tick() => {
                    let frame = self.frames.borrow().clone();
                    let Some(frame) = frame else {
                        continue;
                    };
                    let payload = match serde_json::to_string(&frame) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!(error = %e, "Frame serialization failed");
                            continue;
                        }
                    };
                    if let Err(e) = channel.send(payload).await {
                        warn!(error = %e, "Telemetry send failed, reporting stopped");
                        break ReporterExit::ChannelError;
                    }
                    debug!(variant = %frame.variant, buffer = frame.buffer_level, "Telemetry frame sent");
                }
                inbound = channel.recv() => {
                    match inbound {
                        Ok(Some(payload)) => {
                            if let Some(exit) = self.handle_inbound(&payload, &mut ticker) {
                                break exit;
                            }
                        }
                        Ok(None) => {
                            info!("Telemetry channel closed by server");
                            break ReporterExit::ChannelClosed;
                        }
                        Err(e) => {
                            warn!(error = %e, "Telemetry receive failed, reporting stopped");
                            break ReporterExit::ChannelError;
                        }
                    }
                }
            }
        };

        if let Err(e) = channel.close().await {
            debug!(error = %e, "Telemetry close failed");
        }
        info!(?exit, "Telemetry reporter stopped");
        exit
    }

    fn handle_inbound(&mut self, payload: &str, ticker: &mut tokio::time::Interval) -> Option<ReporterExit> {
        let message: InboundMessage = match serde_json::from_str(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed telemetry message");
                return None;
            }
        };

        match message {
            InboundMessage::Ping => {
                debug!("Telemetry ping");
                None
            }
            InboundMessage::Config(patch) => {
                if let Some(ms) = patch.telemetry_interval_ms.filter(|ms| *ms > 0) {
                    let interval = Duration::from_millis(ms);
                    if interval != self.interval {
                        info!(interval_ms = ms, "Telemetry interval changed");
                        self.interval = interval;
                        *ticker = Self::ticker(interval);
                    }
                }
                if self.overrides.send(patch).is_err() {
                    return Some(ReporterExit::ControllerGone);
                }
                None
            }
        }
    }

    fn ticker(period: Duration) -> tokio::time::Interval {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }
}
