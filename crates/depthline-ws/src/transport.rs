//! Stream transport abstraction.
//!
//! A connector opens one stream session per call and reports everything that
//! happens on it as [`TransportEvent`]s. The session ends with exactly one of
//! `Error` or `Closed`, or silently when its cancellation token fires.

use crate::subscription::StreamTarget;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity of a session's event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Event reported by a stream session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The transport is open.
    Opened,
    /// A text frame, unclassified.
    Frame(String),
    /// Open or read failure. Terminal.
    Error(String),
    /// Closed by the peer. Terminal.
    Closed(Option<String>),
}

impl TransportEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Closed(_))
    }
}

/// Opens stream sessions.
///
/// Implementations spawn the session on the current tokio runtime and stop it
/// when `cancel` fires, without reporting a terminal event in that case.
pub trait StreamConnector: Send + Sync {
    fn open(&self, target: &StreamTarget, cancel: CancellationToken)
        -> mpsc::Receiver<TransportEvent>;
}

/// Arc wrapper for StreamConnector trait objects.
pub type DynStreamConnector = Arc<dyn StreamConnector>;

/// One step of a scripted mock session.
#[derive(Debug, Clone)]
pub enum MockStep {
    Open,
    Frame(String),
    Error(String),
    Close,
    Delay(Duration),
}

#[derive(Debug)]
enum MockSession {
    Script(Vec<MockStep>),
    Channel(mpsc::Receiver<TransportEvent>),
}

/// Mock connector for testing.
///
/// Each `open` consumes the next queued session. With nothing queued the
/// session fails immediately. A script that ends without a terminal step
/// stays open until cancelled.
#[derive(Debug, Default)]
pub struct MockConnector {
    sessions: Mutex<VecDeque<MockSession>>,
    opened: Mutex<Vec<(StreamTarget, CancellationToken)>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a scripted session.
    pub fn push_script(&self, steps: Vec<MockStep>) {
        self.sessions.lock().push_back(MockSession::Script(steps));
    }

    /// Queue a session driven by the returned sender.
    pub fn push_channel(&self) -> mpsc::Sender<TransportEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        self.sessions.lock().push_back(MockSession::Channel(rx));
        tx
    }

    /// Number of sessions opened so far.
    pub fn open_count(&self) -> usize {
        self.opened.lock().len()
    }

    /// Targets of all opened sessions, in order.
    pub fn targets(&self) -> Vec<StreamTarget> {
        self.opened.lock().iter().map(|(t, _)| t.clone()).collect()
    }

    /// Whether the n-th opened session has been cancelled by its owner.
    pub fn is_cancelled(&self, index: usize) -> Option<bool> {
        self.opened.lock().get(index).map(|(_, c)| c.is_cancelled())
    }
}

impl StreamConnector for MockConnector {
    fn open(
        &self,
        target: &StreamTarget,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<TransportEvent> {
        self.opened.lock().push((target.clone(), cancel.clone()));
        let session = self.sessions.lock().pop_front().unwrap_or_else(|| {
            MockSession::Script(vec![MockStep::Error("no scripted session".to_string())])
        });

        match session {
            MockSession::Channel(rx) => rx,
            MockSession::Script(steps) => {
                let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
                tokio::spawn(run_script(steps, tx, cancel));
                rx
            }
        }
    }
}

async fn run_script(
    steps: Vec<MockStep>,
    tx: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
) {
    for step in steps {
        if cancel.is_cancelled() {
            return;
        }
        let event = match step {
            MockStep::Delay(d) => {
                tokio::select! {
                    () = tokio::time::sleep(d) => continue,
                    () = cancel.cancelled() => return,
                }
            }
            MockStep::Open => TransportEvent::Opened,
            MockStep::Frame(text) => TransportEvent::Frame(text),
            MockStep::Error(e) => TransportEvent::Error(e),
            MockStep::Close => TransportEvent::Closed(None),
        };
        let terminal = event.is_terminal();
        if tx.send(event).await.is_err() || terminal {
            return;
        }
    }
    cancel.cancelled().await;
}
