//! Inbound commands.
//!
//! Every line a station or client sends is parsed into a [`Command`]. The set
//! of commands is closed; anything else is [`ProtocolError::Unrecognized`].

use crate::codec::{tokenize, ProtocolError};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// A parsed protocol command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `REGISTER <name> <type>` - claim a station name for this connection.
    Register {
        /// Station name.
        name: String,
        /// Opaque station classification.
        kind: String,
    },

    /// `LIST` - enumerate registered stations.
    List,

    /// `METRIC <name> <float>` - record a telemetry point.
    Metric {
        /// Metric name.
        name: String,
        /// Reported value.
        value: f64,
    },

    /// `METRICS <name> [<metric>]` - list metric names or one series.
    Metrics {
        /// Station to inspect.
        station: String,
        /// Metric whose points to list.
        metric: Option<String>,
    },

    /// `RUN <station> <function> <nonce> [<param>]` - invoke a station function.
    Run {
        /// Target station.
        station: String,
        /// Function name.
        function: String,
        /// Caller-chosen correlation token.
        nonce: String,
        /// Optional single-token parameter.
        param: Option<String>,
    },

    /// `DONE <function> <nonce> [<result>]` - station reports success.
    Done {
        /// Function name.
        function: String,
        /// Correlation token from the forwarded `RUN`.
        nonce: String,
        /// Optional single-token result.
        result: Option<String>,
    },

    /// `ERR <function> <nonce>` - station reports failure.
    Fail {
        /// Function name.
        function: String,
        /// Correlation token from the forwarded `RUN`.
        nonce: String,
    },
}

fn check_arity(
    command: &'static str,
    args: &[&str],
    allowed: RangeInclusive<usize>,
) -> Result<(), ProtocolError> {
    if allowed.contains(&args.len()) {
        Ok(())
    } else {
        Err(ProtocolError::BadArity {
            command,
            got: args.len(),
        })
    }
}

fn optional(args: &[&str], index: usize) -> Option<String> {
    args.get(index).map(|s| (*s).to_string())
}

impl Command {
    /// Parse a decoded line.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Unrecognized`] for an unknown leading token,
    /// [`ProtocolError::BadArity`] for a wrong argument count and
    /// [`ProtocolError::InvalidValue`] for an unparsable metric value.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let (head, args) = tokenize(line);

        let command = match head {
            "REGISTER" => {
                check_arity("REGISTER", &args, 2..=2)?;
                Self::Register {
                    name: args[0].to_string(),
                    kind: args[1].to_string(),
                }
            }
            "LIST" => {
                check_arity("LIST", &args, 0..=0)?;
                Self::List
            }
            "METRIC" => {
                check_arity("METRIC", &args, 2..=2)?;
                let value = args[1]
                    .parse::<f64>()
                    .map_err(|source| ProtocolError::InvalidValue {
                        value: args[1].to_string(),
                        source,
                    })?;
                Self::Metric {
                    name: args[0].to_string(),
                    value,
                }
            }
            "METRICS" => {
                check_arity("METRICS", &args, 1..=2)?;
                Self::Metrics {
                    station: args[0].to_string(),
                    metric: optional(&args, 1),
                }
            }
            "RUN" => {
                check_arity("RUN", &args, 3..=4)?;
                Self::Run {
                    station: args[0].to_string(),
                    function: args[1].to_string(),
                    nonce: args[2].to_string(),
                    param: optional(&args, 3),
                }
            }
            "DONE" => {
                check_arity("DONE", &args, 2..=3)?;
                Self::Done {
                    function: args[0].to_string(),
                    nonce: args[1].to_string(),
                    result: optional(&args, 2),
                }
            }
            "ERR" => {
                check_arity("ERR", &args, 2..=2)?;
                Self::Fail {
                    function: args[0].to_string(),
                    nonce: args[1].to_string(),
                }
            }
            other => return Err(ProtocolError::Unrecognized(other.to_string())),
        };

        Ok(command)
    }

    /// The command literal as it appears on the wire.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Register { .. } => "REGISTER",
            Self::List => "LIST",
            Self::Metric { .. } => "METRIC",
            Self::Metrics { .. } => "METRICS",
            Self::Run { .. } => "RUN",
            Self::Done { .. } => "DONE",
            Self::Fail { .. } => "ERR",
        }
    }

    /// Whether the sending connection must already be a registered station.
    #[must_use]
    pub fn requires_registration(&self) -> bool {
        matches!(
            self,
            Self::Metric { .. } | Self::Done { .. } | Self::Fail { .. }
        )
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register { name, kind } => write!(f, "REGISTER {name} {kind}"),
            Self::List => f.write_str("LIST"),
            Self::Metric { name, value } => write!(f, "METRIC {name} {value}"),
            Self::Metrics { station, metric } => {
                write!(f, "METRICS {station}")?;
                if let Some(metric) = metric {
                    write!(f, " {metric}")?;
                }
                Ok(())
            }
            Self::Run {
                station,
                function,
                nonce,
                param,
            } => {
                write!(f, "RUN {station} {function} {nonce}")?;
                if let Some(param) = param {
                    write!(f, " {param}")?;
                }
                Ok(())
            }
            Self::Done {
                function,
                nonce,
                result,
            } => {
                write!(f, "DONE {function} {nonce}")?;
                if let Some(result) = result {
                    write!(f, " {result}")?;
                }
                Ok(())
            }
            Self::Fail { function, nonce } => write!(f, "ERR {function} {nonce}"),
        }
    }
}
