//! Outward event delivery for chat turns.
//!
//! Every turn owns one [`EventSink`]. Sends are bounded by a per-attempt
//! timeout and an attempt budget; events that cannot be delivered, or that are
//! sent after cancellation, are handed to the [`DeadLetterQueue`]. The channel
//! is closed exactly once, by whichever code path first claims the terminal
//! guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ChatConfig;
use crate::error::WayfarerError;
use crate::models::StreamEvent;

/// Why an event was diverted instead of delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterReason {
    Cancelled,
    TimedOut { attempts: u32 },
    ConsumerGone,
    AfterTerminal,
}

impl std::fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::TimedOut { attempts } => write!(f, "timed out after {attempts} attempts"),
            Self::ConsumerGone => write!(f, "consumer gone"),
            Self::AfterTerminal => write!(f, "sent after terminal event"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub event: StreamEvent,
    pub reason: DeadLetterReason,
}

/// Bounded queue of undeliverable events, drained by
/// [`spawn_dead_letter_logger`].
#[derive(Clone)]
pub struct DeadLetterQueue {
    tx: mpsc::Sender<DeadLetter>,
}

impl DeadLetterQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<DeadLetter>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Never blocks. A full or closed queue is logged at `error!`.
    pub fn push(&self, letter: DeadLetter) {
        if let Err(e) = self.tx.try_send(letter) {
            let letter = match e {
                mpsc::error::TrySendError::Full(letter) => letter,
                mpsc::error::TrySendError::Closed(letter) => letter,
            };
            error!(
                event_id = %letter.event.event_id,
                event_type = %letter.event.event_type,
                reason = %letter.reason,
                "Dead-letter queue unavailable, event lost"
            );
        }
    }
}

/// Logs every dead-lettered event until `shutdown` fires, then drains what is
/// left.
pub fn spawn_dead_letter_logger(
    mut rx: mpsc::Receiver<DeadLetter>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                letter = rx.recv() => match letter {
                    Some(letter) => log_dead_letter(&letter),
                    None => return,
                },
            }
        }

        rx.close();
        while let Some(letter) = rx.recv().await {
            log_dead_letter(&letter);
        }
        info!("Dead-letter logger stopped");
    })
}

fn log_dead_letter(letter: &DeadLetter) {
    warn!(
        event_id = %letter.event.event_id,
        event_type = %letter.event.event_type,
        reason = %letter.reason,
        "Undelivered stream event"
    );
}

/// Opens per-turn sinks with the configured delivery budget.
#[derive(Clone)]
pub struct EventDelivery {
    capacity: usize,
    send_timeout: Duration,
    max_attempts: u32,
    dead_letters: DeadLetterQueue,
}

impl EventDelivery {
    pub fn new(config: &ChatConfig, dead_letters: DeadLetterQueue) -> Self {
        Self {
            capacity: config.event_channel_capacity.max(1),
            send_timeout: Duration::from_millis(config.send_timeout_ms),
            max_attempts: config.send_max_attempts.max(1),
            dead_letters,
        }
    }

    pub fn open(&self, cancel: CancellationToken) -> (EventSink, mpsc::Receiver<StreamEvent>) {
        EventSink::new(
            self.capacity,
            self.send_timeout,
            self.max_attempts,
            self.dead_letters.clone(),
            cancel,
        )
    }
}

struct SinkInner {
    tx: Mutex<Option<mpsc::Sender<StreamEvent>>>,
    terminal: AtomicBool,
    closed: AtomicBool,
    cancel: CancellationToken,
    dead_letters: DeadLetterQueue,
    send_timeout: Duration,
    max_attempts: u32,
}

/// Producer half of one turn's event stream. Cheap to clone; all clones share
/// the terminal and close guards.
#[derive(Clone)]
pub struct EventSink {
    inner: Arc<SinkInner>,
}

impl EventSink {
    pub fn new(
        capacity: usize,
        send_timeout: Duration,
        max_attempts: u32,
        dead_letters: DeadLetterQueue,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sink = Self {
            inner: Arc::new(SinkInner {
                tx: Mutex::new(Some(tx)),
                terminal: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                cancel,
                dead_letters,
                send_timeout,
                max_attempts: max_attempts.max(1),
            }),
        };
        (sink, rx)
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.terminal.load(Ordering::Acquire)
    }

    /// Sends a non-terminal event. Returns whether the consumer accepted it.
    pub async fn send(&self, event: StreamEvent) -> bool {
        if self.is_finished() {
            self.dead_letter(event, DeadLetterReason::AfterTerminal);
            return false;
        }
        self.deliver(event).await
    }

    /// Claims the terminal guard, sends `events` in order and closes the
    /// channel. Only the first caller across all clones gets through; later
    /// callers return `false` without sending anything.
    pub async fn finish(&self, events: impl IntoIterator<Item = StreamEvent>) -> bool {
        if self
            .inner
            .terminal
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Turn already finished, dropping terminal events");
            return false;
        }

        for event in events {
            self.deliver(event).await;
        }
        self.close();
        true
    }

    /// Finishes the turn with a single error event.
    pub async fn fail(&self, error: &WayfarerError) -> bool {
        self.finish([StreamEvent::error(error.to_string())]).await
    }

    /// Drops the shared sender. Idempotent; returns whether this call closed it.
    pub fn close(&self) -> bool {
        if self
            .inner
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.inner
            .tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        true
    }

    fn sender(&self) -> Option<mpsc::Sender<StreamEvent>> {
        self.inner
            .tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn deliver(&self, event: StreamEvent) -> bool {
        let Some(tx) = self.sender() else {
            self.dead_letter(event, DeadLetterReason::ConsumerGone);
            return false;
        };

        let attempts = self.inner.max_attempts;
        for attempt in 1..=attempts {
            if self.is_cancelled() {
                self.dead_letter(event, DeadLetterReason::Cancelled);
                return false;
            }

            tokio::select! {
                biased;
                _ = self.inner.cancel.cancelled() => {
                    self.dead_letter(event, DeadLetterReason::Cancelled);
                    return false;
                }
                reserved = tokio::time::timeout(self.inner.send_timeout, tx.reserve()) => {
                    match reserved {
                        Ok(Ok(permit)) => {
                            permit.send(event);
                            return true;
                        }
                        Ok(Err(_)) => {
                            self.dead_letter(event, DeadLetterReason::ConsumerGone);
                            return false;
                        }
                        Err(_) => {
                            debug!(attempt, attempts, event_type = %event.event_type, "Event send timed out");
                        }
                    }
                }
            }
        }

        self.dead_letter(event, DeadLetterReason::TimedOut { attempts });
        false
    }

    fn dead_letter(&self, event: StreamEvent, reason: DeadLetterReason) {
        self.inner.dead_letters.push(DeadLetter { event, reason });
    }
}
