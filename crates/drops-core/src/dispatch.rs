//! Command dispatch.
//!
//! The [`Dispatcher`] is shared by every connection. It takes one parsed
//! [`Command`] together with the sending connection's [`Session`] and returns
//! the reply line for that connection. Any failure becomes a
//! [`DispatchError`], which maps to `ERR` or `ERR UNRECOGNIZED CMD` on the
//! wire and carries the detail for local logging.

use crate::metric::MetricError;
use crate::registry::{Registry, RegistryError};
use crate::router::{Outcome, Router, RouterConfig, RouterError};
use crate::session::{Session, SessionError};
use drops_protocol::{Command, ProtocolError, Response};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Failure of a single command. Never terminates the session.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The line did not parse.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Registry failure.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Metric lookup failure.
    #[error(transparent)]
    Metric(#[from] MetricError),

    /// RPC routing failure.
    #[error(transparent)]
    Router(#[from] RouterError),

    /// Invalid session transition.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Station-only command from an unregistered connection.
    #[error("{0} requires a registered station")]
    NotRegistered(&'static str),
}

/// Error taxonomy used for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Wrong arity or unparsable value.
    Validation,
    /// Unknown station, metric or nonce.
    Lookup,
    /// Duplicate registration, nonce in use or missing registration.
    State,
    /// Unrecognized command token.
    Protocol,
    /// A forwarded line could not be delivered.
    Delivery,
}

impl ErrorKind {
    /// Lowercase label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Lookup => "lookup",
            Self::State => "state",
            Self::Protocol => "protocol",
            Self::Delivery => "delivery",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DispatchError {
    /// Classify the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Protocol(e) if e.is_unrecognized() => ErrorKind::Protocol,
            Self::Protocol(_) => ErrorKind::Validation,
            Self::Registry(RegistryError::AlreadyRegistered(_)) => ErrorKind::State,
            Self::Registry(RegistryError::UnknownStation(_)) => ErrorKind::Lookup,
            Self::Metric(_) => ErrorKind::Lookup,
            Self::Router(RouterError::UnknownStation(_) | RouterError::UnknownNonce { .. }) => {
                ErrorKind::Lookup
            }
            Self::Router(RouterError::NonceInUse { .. } | RouterError::NotRegistered) => {
                ErrorKind::State
            }
            Self::Router(RouterError::Delivery(_)) => ErrorKind::Delivery,
            Self::Session(_) | Self::NotRegistered(_) => ErrorKind::State,
        }
    }

    /// The reply written back to the sender.
    #[must_use]
    pub fn response(&self) -> Response {
        match self.kind() {
            ErrorKind::Protocol => Response::Unrecognized,
            _ => Response::Error,
        }
    }
}

/// Maps commands onto the registry and router.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    router: Router,
}

impl Dispatcher {
    /// Create a dispatcher over `registry`.
    #[must_use]
    pub fn new(registry: Arc<Registry>, router_config: RouterConfig) -> Self {
        let router = Router::with_config(Arc::clone(&registry), router_config);
        Self { registry, router }
    }

    /// Shared registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Parse and dispatch one line.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`]; parse failures surface as
    /// [`DispatchError::Protocol`].
    pub async fn dispatch_line(
        &self,
        session: &mut Session,
        line: &str,
    ) -> Result<Response, DispatchError> {
        let command = Command::parse(line)?;
        self.dispatch(session, command).await
    }

    /// Execute `command` on behalf of `session`.
    ///
    /// # Errors
    ///
    /// Returns the first failure the command hits. The session is left
    /// usable in every case.
    pub async fn dispatch(
        &self,
        session: &mut Session,
        command: Command,
    ) -> Result<Response, DispatchError> {
        if command.requires_registration() && session.station_name().is_none() {
            return Err(DispatchError::NotRegistered(command.name()));
        }

        debug!(connection = %session.id(), command = command.name(), "Dispatching command");

        match command {
            Command::Register { name, kind } => {
                session.ensure_can_register()?;
                self.registry.register(&name, &kind, session.peer().clone())?;
                session.mark_registered(name)?;
                Ok(Response::Ack)
            }

            Command::List => Ok(Response::List(self.registry.list())),

            Command::Metric { name, value } => {
                let station = session
                    .station_name()
                    .ok_or(DispatchError::NotRegistered("METRIC"))?;
                self.registry.record_metric(station, &name, value)?;
                Ok(Response::Ack)
            }

            Command::Metrics { station, metric } => {
                let target = self.registry.lookup(&station)?;
                match metric {
                    None => Ok(Response::MetricNames {
                        names: target.metric_names(),
                        station,
                    }),
                    Some(metric) => {
                        let points = target.metric_series(&metric)?;
                        Ok(Response::MetricSeries {
                            station,
                            metric,
                            points,
                        })
                    }
                }
            }

            Command::Run {
                station,
                function,
                nonce,
                param,
            } => {
                self.router
                    .run(&station, &function, &nonce, param, session.peer())
                    .await?;
                Ok(Response::Ack)
            }

            Command::Done {
                function,
                nonce,
                result,
            } => {
                self.router
                    .complete(session.station_name(), &function, &nonce, Outcome::Done(result))
                    .await?;
                Ok(Response::Ack)
            }

            Command::Fail { function, nonce } => {
                self.router
                    .complete(session.station_name(), &function, &nonce, Outcome::Failed)
                    .await?;
                Ok(Response::Ack)
            }
        }
    }

    /// Close `session`, unregistering its station if it had one.
    ///
    /// Returns the number of pending runs failed by the disconnect.
    pub async fn disconnect(&self, session: &mut Session) -> usize {
        let id = session.id().clone();
        match session.close() {
            Some(station) => self.router.station_disconnected(&station, &id).await,
            None => 0,
        }
    }
}
