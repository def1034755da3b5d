//! WebSocket stream sessions.
//!
//! `TungsteniteConnector` opens one WebSocket per session and forwards text
//! frames until the peer closes, a read fails, the idle watchdog fires or the
//! owner cancels. Reconnection is the owner's decision; [`BackoffPolicy`]
//! computes the delays between attempts.

use crate::error::WsError;
use crate::heartbeat::IdleWatchdog;
use crate::message::DEFAULT_HEARTBEAT;
use crate::subscription::StreamTarget;
use crate::transport::{StreamConnector, TransportEvent, EVENT_CHANNEL_CAPACITY};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Connection configuration.
///
/// The endpoint comes from the [`StreamTarget`] passed to each `open`.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// A session with no frame for this long is failed (0 = disabled).
    pub idle_timeout_ms: u64,
    /// Heartbeat sentinel text.
    pub heartbeat: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 10_000,
            heartbeat: DEFAULT_HEARTBEAT.to_string(),
        }
    }
}

/// Exponential reconnect backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Base delay for exponential backoff.
    pub base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    pub max_delay_ms: u64,
    /// Maximum reconnection attempts (0 = infinite).
    pub max_attempts: u32,
    /// Upper bound of the random jitter added to each delay.
    pub jitter_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            max_attempts: 0, // Infinite
            jitter_ms: 1000,
        }
    }
}

impl BackoffPolicy {
    /// Check if attempt number `attempt` (1-based) may still be made.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts == 0 || attempt <= self.max_attempts
    }

    /// Delay before attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay(attempt) + rand_jitter(self.jitter_ms))
    }

    /// Delay without jitter: `base * 2^(attempt-1)`, capped at `max_delay_ms`.
    pub fn base_delay(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(10);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        delay.min(self.max_delay_ms)
    }
}

/// Generate random jitter in `[0, max_ms)`.
fn rand_jitter(max_ms: u64) -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    if max_ms == 0 {
        return 0;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    u64::from(nanos) % max_ms
}

/// WebSocket connector backed by tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    config: ConnectionConfig,
}

impl TungsteniteConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

impl StreamConnector for TungsteniteConnector {
    fn open(
        &self,
        target: &StreamTarget,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<TransportEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(run_session(
            target.url(),
            self.config.clone(),
            tx,
            cancel,
        ));
        rx
    }
}

async fn run_session(
    url: String,
    config: ConnectionConfig,
    tx: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
) {
    info!(%url, "Connecting to stream");

    let connect = connect_async_tls_with_config(url.as_str(), None, true, None);
    let ws_stream = tokio::select! {
        () = cancel.cancelled() => {
            debug!(%url, "Stream connect cancelled");
            return;
        }
        res = connect => match res {
            Ok((ws_stream, _response)) => ws_stream,
            Err(e) => {
                warn!(%url, error = %e, "Stream connect failed");
                let err = WsError::ConnectionFailed(e.to_string());
                let _ = tx.send(TransportEvent::Error(err.to_string())).await;
                return;
            }
        }
    };
    let (mut write, mut read) = ws_stream.split();

    if tx.send(TransportEvent::Opened).await.is_err() {
        return;
    }
    info!(%url, "Stream connected");

    let mut watchdog = IdleWatchdog::new(config.idle_timeout_ms);
    watchdog.reset();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(%url, "Stream session cancelled, closing");
                if let Err(e) = write.send(Message::Close(None)).await {
                    debug!(?e, "Failed to send Close frame");
                }
                return;
            }

            msg = read.next() => {
                let event = match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.trim() == config.heartbeat {
                            watchdog.record_heartbeat();
                        } else {
                            watchdog.record_frame();
                        }
                        TransportEvent::Frame(text)
                    }
                    Some(Ok(Message::Binary(data))) => {
                        watchdog.record_frame();
                        match String::from_utf8(data) {
                            Ok(text) => TransportEvent::Frame(text),
                            Err(_) => {
                                debug!("Ignoring non-UTF-8 binary frame");
                                continue;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        watchdog.record_frame();
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            let err = WsError::from(e);
                            let _ = tx.send(TransportEvent::Error(err.to_string())).await;
                            return;
                        }
                        continue;
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {
                        watchdog.record_frame();
                        continue;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (f.code.into(), f.reason.to_string()))
                            .unwrap_or((1000, "Normal close".to_string()));
                        warn!(code, %reason, "Stream closed by server");
                        let err = WsError::ConnectionClosed { code, reason };
                        let _ = tx.send(TransportEvent::Closed(Some(err.to_string()))).await;
                        return;
                    }
                    Some(Err(e)) => {
                        warn!(?e, "Stream read error");
                        let err = WsError::from(e);
                        let _ = tx.send(TransportEvent::Error(err.to_string())).await;
                        return;
                    }
                    None => {
                        warn!("Stream ended");
                        let _ = tx.send(TransportEvent::Closed(None)).await;
                        return;
                    }
                };

                if tx.send(event).await.is_err() {
                    debug!("Stream event receiver dropped");
                    return;
                }
            }

            () = watchdog.wait_for_check() => {
                if watchdog.is_idle() {
                    let stats = watchdog.stats();
                    warn!(
                        idle_ms = stats.time_since_last_frame_ms,
                        frames = stats.frames,
                        last_frame_at = %stats.last_frame_at,
                        "Stream idle timeout"
                    );
                    let err = WsError::IdleTimeout { idle_ms: stats.time_since_last_frame_ms };
                    let _ = tx.send(TransportEvent::Error(err.to_string())).await;
                    return;
                }
            }
        }
    }
}
