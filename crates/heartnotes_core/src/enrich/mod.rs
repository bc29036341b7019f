//! Best-effort comment enrichment with current weather.
//!
//! # Responsibility
//! - Run a caller-supplied weather lookup off the caller's thread.
//! - Allow at most one lookup in flight per slot.
//! - Turn lookup results into comment text.
//!
//! # Invariants
//! - The store is never touched here; callers append the text themselves.
//! - A request while another is in flight is a silent no-op.
//! - `cancel()` is safe at any time, including after completion.

pub mod weather;

pub use weather::summarize_open_weather;

use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Text appended when a lookup produced nothing.
pub const WEATHER_UNAVAILABLE: &str = "Weather NA.";

/// Source of a one-line current-conditions summary.
pub trait WeatherSource: Send + Sync + 'static {
    /// Returns `None` when conditions could not be determined.
    fn current_conditions(&self) -> Option<String>;
}

/// Final state observed through an `EnrichmentHandle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentOutcome {
    Ready(String),
    /// The source ran but produced nothing.
    Unavailable,
    Cancelled,
    /// The caller's bounded wait elapsed first.
    TimedOut,
}

/// Owns the at-most-one-in-flight rule for one source.
pub struct EnrichmentSlot<S: WeatherSource> {
    source: Arc<S>,
    in_flight: Arc<AtomicBool>,
}

impl<S: WeatherSource> EnrichmentSlot<S> {
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Starts a lookup, or returns `None` when one is already running.
    pub fn request(&self) -> Option<EnrichmentHandle> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("event=weather_request module=enrich status=skipped reason=in_flight");
            return None;
        }

        let (sender, receiver) = mpsc::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let source = Arc::clone(&self.source);
        let in_flight = Arc::clone(&self.in_flight);
        let spawned = thread::Builder::new()
            .name("heartnotes-weather".to_string())
            .spawn(move || {
                let result = source.current_conditions();
                in_flight.store(false, Ordering::Release);
                let _ = sender.send(result);
            });

        if let Err(err) = spawned {
            self.in_flight.store(false, Ordering::Release);
            info!("event=weather_request module=enrich status=error error={err}");
            return None;
        }

        info!("event=weather_request module=enrich status=start");
        Some(EnrichmentHandle {
            receiver,
            cancelled,
            settled: None,
        })
    }
}

/// Cancels one lookup without holding its handle.
#[derive(Debug, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Caller-side handle to one lookup.
pub struct EnrichmentHandle {
    receiver: Receiver<Option<String>>,
    cancelled: Arc<AtomicBool>,
    settled: Option<Option<String>>,
}

impl EnrichmentHandle {
    /// Discards the result. Safe to call repeatedly or after completion.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Token that cancels this lookup from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        CancelToken(Arc::clone(&self.cancelled))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns true once the lookup produced its result.
    pub fn is_finished(&mut self) -> bool {
        if self.settled.is_none() {
            if let Ok(result) = self.receiver.try_recv() {
                self.settled = Some(result);
            }
        }
        self.settled.is_some()
    }

    /// Waits at most `timeout` for the lookup.
    pub fn wait(&mut self, timeout: Duration) -> EnrichmentOutcome {
        if self.is_cancelled() {
            return EnrichmentOutcome::Cancelled;
        }
        if self.settled.is_none() {
            match self.receiver.recv_timeout(timeout) {
                Ok(result) => self.settled = Some(result),
                Err(RecvTimeoutError::Timeout) => return EnrichmentOutcome::TimedOut,
                Err(RecvTimeoutError::Disconnected) => self.settled = Some(None),
            }
        }
        if self.is_cancelled() {
            return EnrichmentOutcome::Cancelled;
        }
        match self.settled.clone().flatten() {
            Some(text) => EnrichmentOutcome::Ready(text),
            None => EnrichmentOutcome::Unavailable,
        }
    }
}

/// Appends an outcome to a comment the way the edit screen does.
///
/// Cancelled and timed-out lookups leave the comment unchanged.
pub fn append_conditions(comment: &str, outcome: &EnrichmentOutcome) -> String {
    match outcome {
        EnrichmentOutcome::Ready(text) => format!("{comment}{text}"),
        EnrichmentOutcome::Unavailable => format!("{comment}{WEATHER_UNAVAILABLE}"),
        EnrichmentOutcome::Cancelled | EnrichmentOutcome::TimedOut => comment.to_string(),
    }
}
