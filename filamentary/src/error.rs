// SPDX-License-Identifier: AGPL-3.0-only

//! Typed errors for filamentary configuration and runtime operations.
//!
//! Replaces `Result<_, String>` in public APIs with a proper enum so callers
//! can pattern-match on failure modes (bad cutoff, mixed periodicity,
//! degenerate filament, timestep underflow) rather than parsing opaque
//! strings. Fatal configuration errors surface at construction; recoverable
//! dynamic conditions (filament removal, step rejection) are statuses, not
//! errors, and never appear here.

use std::fmt;

/// Errors arising from configuration, filament surgery, integration, or
/// persisted-state I/O.
#[derive(Debug)]
pub enum FilamentaryError {
    /// Short-range cutoff is not below half the smallest domain period.
    InvalidCutoff {
        /// Requested cutoff radius.
        rcut: f64,
        /// Smallest finite domain period.
        period: f64,
    },

    /// A long-range grid dimension is odd or zero.
    InvalidGridSize {
        /// Axis index (0 = x, 1 = y, 2 = z).
        axis: usize,
        /// Offending size.
        size: usize,
    },

    /// Domain mixes periodic and open directions, which the Ewald splitting
    /// does not support.
    MixedPeriodicity,

    /// A scalar parameter is out of its admissible range.
    InvalidParameter {
        /// Parameter name as it appears in [`crate::ParamsBiotSavart`].
        name: &'static str,
        /// Offending value.
        value: f64,
    },

    /// Scheme/option combination rejected at solver construction
    /// (e.g. LIA-only dynamics with a non-local fast term).
    IncompatibleScheme(&'static str),

    /// A filament dropped below the minimum node count of its
    /// discretization method.
    DegenerateFilament {
        /// Node count after the mutation.
        nodes: usize,
        /// Minimum required by the method.
        required: usize,
    },

    /// Periodic band solve failed (near-singular collocation matrix).
    SplineSolve,

    /// Adaptive timestep fell below the configured minimum before the end
    /// of the time span.
    TimestepUnderflow {
        /// Timestep at failure.
        dt: f64,
        /// Configured minimum.
        dtmin: f64,
    },

    /// Persisted-state I/O failed.
    Io(std::io::Error),

    /// Persisted-state (de)serialization failed.
    Serialization(serde_json::Error),
}

impl fmt::Display for FilamentaryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCutoff { rcut, period } => {
                write!(f, "short-range cutoff {rcut} must be < half the smallest period ({period} / 2)")
            }
            Self::InvalidGridSize { axis, size } => {
                write!(f, "long-range grid size along axis {axis} must be even and positive, got {size}")
            }
            Self::MixedPeriodicity => {
                write!(f, "domain periods must be all finite or all infinite")
            }
            Self::InvalidParameter { name, value } => {
                write!(f, "parameter `{name}` out of range: {value}")
            }
            Self::IncompatibleScheme(reason) => {
                write!(f, "incompatible scheme configuration: {reason}")
            }
            Self::DegenerateFilament { nodes, required } => {
                write!(f, "filament degenerate: {nodes} nodes, method requires {required}")
            }
            Self::SplineSolve => write!(f, "periodic spline collocation solve failed"),
            Self::TimestepUnderflow { dt, dtmin } => {
                write!(f, "timestep {dt} fell below minimum {dtmin} before end of time span")
            }
            Self::Io(e) => write!(f, "snapshot I/O failed: {e}"),
            Self::Serialization(e) => write!(f, "snapshot serialization failed: {e}"),
        }
    }
}

impl std::error::Error for FilamentaryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FilamentaryError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for FilamentaryError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e)
    }
}
