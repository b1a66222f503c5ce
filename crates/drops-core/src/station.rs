//! Registered stations.
//!
//! A station owns its metric store and its table of in-flight runs, each
//! behind its own lock so telemetry writes never contend with RPC traffic.
//! The run table is closed once the station is unregistered; a `RUN` that
//! looked the station up just before that point is refused rather than
//! parked in a table nobody will sweep.

use crate::metric::{MetricError, MetricStore};
use crate::peer::PeerHandle;
use drops_protocol::MetricPoint;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, trace};

/// An RPC forwarded to a station and not yet answered.
#[derive(Debug, Clone)]
pub struct PendingRun {
    /// Correlation token.
    pub nonce: String,
    /// Function that was invoked.
    pub function: String,
    /// Station the run was routed to.
    pub station: String,
    /// Connection awaiting the `DONE`/`ERR`.
    pub requester: PeerHandle,
}

/// Why a run could not be reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RunRejected {
    /// The nonce already identifies an in-flight run.
    #[error("nonce in use")]
    NonceInUse,
    /// The station has been unregistered.
    #[error("station closed")]
    Closed,
}

/// A registered device.
#[derive(Debug)]
pub struct Station {
    name: String,
    kind: String,
    owner: PeerHandle,
    metrics: Mutex<MetricStore>,
    /// `None` once the station is closed.
    pending: Mutex<Option<HashMap<String, PendingRun>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Station {
    /// Create a station with empty metrics and no pending runs.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        owner: PeerHandle,
        max_metric_points: usize,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            owner,
            metrics: Mutex::new(MetricStore::new(max_metric_points)),
            pending: Mutex::new(Some(HashMap::new())),
        }
    }

    /// Station name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Station type.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Connection that registered the station.
    #[must_use]
    pub fn owner(&self) -> &PeerHandle {
        &self.owner
    }

    /// Record a telemetry point.
    pub fn record_metric(&self, metric: &str, value: f64, timestamp: u64) {
        lock(&self.metrics).record(metric, value, timestamp);
        trace!(station = %self.name, metric = %metric, value, "Recorded metric");
    }

    /// Names of metrics with at least one point.
    #[must_use]
    pub fn metric_names(&self) -> Vec<String> {
        lock(&self.metrics).names()
    }

    /// Points recorded for `metric`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::UnknownMetric`] if nothing was recorded.
    pub fn metric_series(&self, metric: &str) -> Result<Vec<MetricPoint>, MetricError> {
        lock(&self.metrics).series(metric)
    }

    /// Insert a pending run unless its nonce is already in flight.
    ///
    /// # Errors
    ///
    /// Returns [`RunRejected::NonceInUse`] on a collision and
    /// [`RunRejected::Closed`] after [`Station::close_runs`]. The table is
    /// left untouched in both cases.
    pub fn reserve_run(&self, run: PendingRun) -> Result<(), RunRejected> {
        let mut pending = lock(&self.pending);
        let table = pending.as_mut().ok_or(RunRejected::Closed)?;
        match table.entry(run.nonce.clone()) {
            Entry::Occupied(_) => Err(RunRejected::NonceInUse),
            Entry::Vacant(slot) => {
                debug!(station = %self.name, nonce = %run.nonce, "Reserved pending run");
                slot.insert(run);
                Ok(())
            }
        }
    }

    /// Remove and return the pending run for `nonce`.
    pub fn take_run(&self, nonce: &str) -> Option<PendingRun> {
        lock(&self.pending).as_mut()?.remove(nonce)
    }

    /// Close the run table and return every run still pending.
    ///
    /// Later reservations fail with [`RunRejected::Closed`]. Closing twice
    /// returns nothing the second time.
    pub fn close_runs(&self) -> Vec<PendingRun> {
        lock(&self.pending)
            .take()
            .map(|table| table.into_values().collect())
            .unwrap_or_default()
    }

    /// Number of runs awaiting completion.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).as_ref().map_or(0, HashMap::len)
    }
}
