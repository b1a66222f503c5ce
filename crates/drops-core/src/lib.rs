//! # drops-core
//!
//! Core state and routing for the drops station relay.
//!
//! This crate provides the building blocks behind every connection:
//!
//! - **MetricStore** - Bounded per-metric time series for one station
//! - **Station** - Identity, owning peer, metrics and in-flight runs
//! - **Registry** - Name to station map with register/unregister lifecycle
//! - **Router** - `RUN`/`DONE`/`ERR` correlation and forwarding
//! - **Dispatcher** - Maps a parsed command to the operations above
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Session   │────▶│ Dispatcher  │────▶│   Router    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │                   │
//!                            ▼                   ▼
//!                     ┌─────────────┐     ┌─────────────┐
//!                     │  Registry   │────▶│   Station   │
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Locking
//!
//! The registry map and each station's metric and pending-run locks are
//! independent. A registry guard is always released before a station lock is
//! taken, and no lock is held across an `.await`.

pub mod clock;
pub mod dispatch;
pub mod metric;
pub mod peer;
pub mod registry;
pub mod router;
pub mod session;
pub mod station;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatch::{DispatchError, Dispatcher, ErrorKind};
pub use metric::{MetricError, MetricStore};
pub use peer::{DeliveryError, PeerHandle};
pub use registry::{Registry, RegistryConfig, RegistryError, RegistryStats};
pub use router::{Outcome, Router, RouterConfig, RouterError};
pub use session::{Session, SessionError, SessionState};
pub use station::{PendingRun, RunRejected, Station};
