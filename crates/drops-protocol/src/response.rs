//! Outbound lines: synchronous replies and forwarded RPC traffic.

use std::fmt;

/// A station as reported by `LIST`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationEntry {
    /// Station name.
    pub name: String,
    /// Station type.
    pub kind: String,
}

impl StationEntry {
    /// Create a new entry.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
        }
    }
}

/// One recorded telemetry sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricPoint {
    /// Unix epoch seconds.
    pub timestamp: u64,
    /// Reported value.
    pub value: f64,
}

impl MetricPoint {
    /// Create a new point.
    #[must_use]
    pub fn new(timestamp: u64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

impl fmt::Display for MetricPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:.2}", self.timestamp, self.value)
    }
}

/// The single-line reply written back on the connection that sent a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// `ACK`
    Ack,

    /// `LIST <name>:<type> ...`
    List(Vec<StationEntry>),

    /// `METRICS <station> <metric> ...`
    MetricNames {
        /// Station inspected.
        station: String,
        /// Names of metrics with at least one point.
        names: Vec<String>,
    },

    /// `METRICS <station> <metric> <ts>:<value> ...`
    MetricSeries {
        /// Station inspected.
        station: String,
        /// Metric listed.
        metric: String,
        /// Points, oldest first.
        points: Vec<MetricPoint>,
    },

    /// `ERR` - any handler failure. Carries no reason on the wire.
    Error,

    /// `ERR UNRECOGNIZED CMD`
    Unrecognized,
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ack => f.write_str("ACK"),
            Self::List(stations) => {
                f.write_str("LIST")?;
                for station in stations {
                    write!(f, " {}:{}", station.name, station.kind)?;
                }
                Ok(())
            }
            Self::MetricNames { station, names } => {
                write!(f, "METRICS {station}")?;
                for name in names {
                    write!(f, " {name}")?;
                }
                Ok(())
            }
            Self::MetricSeries {
                station,
                metric,
                points,
            } => {
                write!(f, "METRICS {station} {metric}")?;
                for point in points {
                    write!(f, " {point}")?;
                }
                Ok(())
            }
            Self::Error => f.write_str("ERR"),
            Self::Unrecognized => f.write_str("ERR UNRECOGNIZED CMD"),
        }
    }
}

/// A line the server writes to a connection other than the one whose command
/// caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Forward {
    /// `RUN <function> <nonce> [<param>]`, server to station.
    Run {
        /// Function name.
        function: String,
        /// Correlation token.
        nonce: String,
        /// Optional parameter, omitted when absent.
        param: Option<String>,
    },

    /// `DONE <station> <function> <nonce> [<result>]`, server to requester.
    Done {
        /// Station that ran the function.
        station: String,
        /// Function name.
        function: String,
        /// Correlation token.
        nonce: String,
        /// Optional result, omitted when absent.
        result: Option<String>,
    },

    /// `ERR <station> <function> <nonce>`, server to requester.
    Failed {
        /// Station that ran the function.
        station: String,
        /// Function name.
        function: String,
        /// Correlation token.
        nonce: String,
    },
}

impl fmt::Display for Forward {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run {
                function,
                nonce,
                param,
            } => {
                write!(f, "RUN {function} {nonce}")?;
                if let Some(param) = param {
                    write!(f, " {param}")?;
                }
                Ok(())
            }
            Self::Done {
                station,
                function,
                nonce,
                result,
            } => {
                write!(f, "DONE {station} {function} {nonce}")?;
                if let Some(result) = result {
                    write!(f, " {result}")?;
                }
                Ok(())
            }
            Self::Failed {
                station,
                function,
                nonce,
            } => write!(f, "ERR {station} {function} {nonce}"),
        }
    }
}
