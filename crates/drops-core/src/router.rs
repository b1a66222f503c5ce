//! RPC routing between clients and stations.
//!
//! A `RUN` reserves its nonce in the target station's pending-run table and is
//! forwarded to the station. The station's `DONE` or `ERR` consumes that entry
//! and is forwarded back to whichever connection issued the `RUN`.

use crate::peer::{DeliveryError, PeerHandle};
use crate::registry::Registry;
use crate::station::{PendingRun, RunRejected};
use drops_protocol::Forward;
use drops_transport::ConnectionId;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Router errors.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Target station is not registered.
    #[error("Unknown station: {0}")]
    UnknownStation(String),

    /// The nonce already identifies an in-flight run on this station.
    #[error("Nonce {nonce} already in use on station {station}")]
    NonceInUse {
        /// Target station.
        station: String,
        /// Colliding nonce.
        nonce: String,
    },

    /// Only a registered station may complete a run.
    #[error("Connection is not a registered station")]
    NotRegistered,

    /// No pending run matches the nonce.
    #[error("Unknown nonce {nonce} on station {station}")]
    UnknownNonce {
        /// Completing station.
        station: String,
        /// Unmatched nonce.
        nonce: String,
    },

    /// The `RUN` could not be handed to the station.
    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
}

/// How a station finished a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `DONE`, with an optional result token.
    Done(Option<String>),
    /// `ERR`.
    Failed,
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Answer every pending run with `ERR` when its station disconnects.
    pub fail_pending_on_disconnect: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            fail_pending_on_disconnect: true,
        }
    }
}

/// Correlates `RUN` requests with station completions.
#[derive(Debug)]
pub struct Router {
    registry: Arc<Registry>,
    config: RouterConfig,
}

impl Router {
    /// Create a router with custom configuration.
    #[must_use]
    pub fn with_config(registry: Arc<Registry>, config: RouterConfig) -> Self {
        Self { registry, config }
    }

    /// Forward `RUN <function> <nonce> [param]` to `station`.
    ///
    /// On success the run is pending and its completion will be delivered to
    /// `requester` later.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::UnknownStation`] if the station is not
    /// registered or is being torn down, [`RouterError::NonceInUse`], or
    /// [`RouterError::Delivery`] if the station's connection cannot take the
    /// line; in that case the nonce is released again.
    pub async fn run(
        &self,
        station: &str,
        function: &str,
        nonce: &str,
        param: Option<String>,
        requester: &PeerHandle,
    ) -> Result<(), RouterError> {
        let target = self
            .registry
            .lookup(station)
            .map_err(|_| RouterError::UnknownStation(station.to_string()))?;

        let reserved = target.reserve_run(PendingRun {
            nonce: nonce.to_string(),
            function: function.to_string(),
            station: station.to_string(),
            requester: requester.clone(),
        });
        match reserved {
            Ok(()) => {}
            Err(RunRejected::NonceInUse) => {
                return Err(RouterError::NonceInUse {
                    station: station.to_string(),
                    nonce: nonce.to_string(),
                });
            }
            Err(RunRejected::Closed) => {
                debug!(station = %station, nonce = %nonce, "Station closed before RUN was reserved");
                return Err(RouterError::UnknownStation(station.to_string()));
            }
        }

        let forward = Forward::Run {
            function: function.to_string(),
            nonce: nonce.to_string(),
            param,
        };

        if let Err(e) = target.owner().deliver(&forward).await {
            target.take_run(nonce);
            warn!(station = %station, nonce = %nonce, error = %e, "Failed to forward RUN");
            return Err(e.into());
        }

        debug!(
            station = %station,
            function = %function,
            nonce = %nonce,
            requester = %requester.id(),
            "Forwarded RUN"
        );
        Ok(())
    }

    /// Complete the pending run `nonce` on the calling station.
    ///
    /// The run is consumed before anything is written, so a nonce completes at
    /// most once. Forwarding to the requester is best effort: a requester that
    /// has gone away is logged and the call still succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::NotRegistered`] if `station` is `None`,
    /// [`RouterError::UnknownStation`] if it has vanished, and
    /// [`RouterError::UnknownNonce`] if no such run is pending.
    pub async fn complete(
        &self,
        station: Option<&str>,
        function: &str,
        nonce: &str,
        outcome: Outcome,
    ) -> Result<(), RouterError> {
        let station = station.ok_or(RouterError::NotRegistered)?;
        let caller = self
            .registry
            .lookup(station)
            .map_err(|_| RouterError::UnknownStation(station.to_string()))?;

        let run = caller
            .take_run(nonce)
            .ok_or_else(|| RouterError::UnknownNonce {
                station: station.to_string(),
                nonce: nonce.to_string(),
            })?;

        let forward = match outcome {
            Outcome::Done(result) => Forward::Done {
                station: run.station.clone(),
                function: function.to_string(),
                nonce: run.nonce.clone(),
                result,
            },
            Outcome::Failed => Forward::Failed {
                station: run.station.clone(),
                function: function.to_string(),
                nonce: run.nonce.clone(),
            },
        };

        match run.requester.deliver(&forward).await {
            Ok(()) => debug!(
                station = %station,
                nonce = %nonce,
                requester = %run.requester.id(),
                "Forwarded completion"
            ),
            Err(e) => warn!(
                station = %station,
                nonce = %nonce,
                error = %e,
                "Dropped completion, requester unreachable"
            ),
        }

        Ok(())
    }

    /// Unregister `station` after its connection `owner` closed.
    ///
    /// The station's run table is closed after removal, so a concurrent `RUN`
    /// either lands before the close and is swept here, or is refused.
    /// Returns the number of pending runs answered with `ERR`.
    pub async fn station_disconnected(&self, station: &str, owner: &ConnectionId) -> usize {
        let Some(removed) = self.registry.unregister(station, owner) else {
            return 0;
        };

        let runs = removed.close_runs();
        if !self.config.fail_pending_on_disconnect {
            if !runs.is_empty() {
                warn!(station = %station, orphaned = runs.len(), "Station closed with unanswered runs");
            }
            return 0;
        }

        let failed = runs.len();
        for run in runs {
            let forward = Forward::Failed {
                station: run.station.clone(),
                function: run.function.clone(),
                nonce: run.nonce.clone(),
            };
            if let Err(e) = run.requester.deliver(&forward).await {
                warn!(station = %station, nonce = %run.nonce, error = %e, "Failed to notify requester");
            }
        }

        if failed > 0 {
            info!(station = %station, failed, "Failed pending runs of closed station");
        }
        failed
    }

    /// The registry this router resolves stations from.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}
