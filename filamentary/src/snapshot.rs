// SPDX-License-Identifier: AGPL-3.0-only

//! Persisted simulation state.
//!
//! A [`Snapshot`] is a self-describing JSON container with the per-step
//! record (each filament's nodes and offset), the per-node fields aligned
//! with the node arrays (velocity, streamfunction, tangents), and the
//! global scalars (time, step, statistics). The reader reconstructs
//! filaments from the node arrays with a discretization method supplied at
//! read time. f64 values round-trip bitwise (shortest-round-trip float
//! formatting).

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::FilamentaryError;
use crate::filament::{DiscretizationMethod, Filament};
use crate::timestepping::{SolverState, SolverStats};
use crate::Vec3;

/// Format tag stored in every snapshot.
pub const FORMAT: &str = "filamentary-snapshot/1";

/// One filament: node array plus periodic offset.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SnapshotFilament {
    /// Visible node positions.
    pub nodes: Vec<[f64; 3]>,
    /// Periodic offset Δ.
    pub offset: [f64; 3],
}

/// Complete persisted state of one step.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    /// Self-description tag ([`FORMAT`]).
    pub format: String,
    /// Simulation time.
    pub time: f64,
    /// Step counter.
    pub step: usize,
    /// Cumulative solver statistics.
    pub stats: SolverStats,
    /// Filament geometry.
    pub filaments: Vec<SnapshotFilament>,
    /// Line velocities, aligned with the node arrays.
    pub velocities: Vec<Vec<[f64; 3]>>,
    /// Streamfunction values, aligned with the node arrays.
    pub streamfunctions: Vec<Vec<[f64; 3]>>,
    /// Unit tangents, aligned with the node arrays.
    pub tangents: Vec<Vec<[f64; 3]>>,
}

fn pack(v: &Vec3) -> [f64; 3] {
    [v.x, v.y, v.z]
}

fn pack_field(field: &[Vec<Vec3>]) -> Vec<Vec<[f64; 3]>> {
    field
        .iter()
        .map(|nodes| nodes.iter().map(pack).collect())
        .collect()
}

impl Snapshot {
    /// Capture the current solver state.
    #[must_use]
    pub fn from_state(state: &SolverState) -> Self {
        Self {
            format: FORMAT.to_string(),
            time: state.time,
            step: state.step,
            stats: state.stats,
            filaments: state
                .filaments
                .iter()
                .map(|f| SnapshotFilament {
                    nodes: f.nodes().iter().map(pack).collect(),
                    offset: pack(&f.offset()),
                })
                .collect(),
            velocities: pack_field(&state.velocities),
            streamfunctions: pack_field(&state.streamfunctions),
            tangents: pack_field(&state.tangents),
        }
    }

    /// Write as JSON.
    ///
    /// # Errors
    /// I/O or serialization failures, wrapped in [`FilamentaryError`].
    pub fn write(&self, path: &Path) -> Result<(), FilamentaryError> {
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Read a snapshot back.
    ///
    /// # Errors
    /// I/O or deserialization failures, plus
    /// [`FilamentaryError::InvalidParameter`] on a format-tag mismatch.
    pub fn read(path: &Path) -> Result<Self, FilamentaryError> {
        let file = File::open(path)?;
        let snapshot: Self = serde_json::from_reader(BufReader::new(file))?;
        if snapshot.format != FORMAT {
            return Err(FilamentaryError::InvalidParameter {
                name: "snapshot_format",
                value: f64::NAN,
            });
        }
        Ok(snapshot)
    }

    /// Rebuild filaments from the stored node arrays with the given
    /// discretization method.
    ///
    /// # Errors
    /// Propagates construction failures (degenerate node counts).
    pub fn rebuild_filaments(
        &self,
        method: DiscretizationMethod,
    ) -> Result<Vec<Filament>, FilamentaryError> {
        self.filaments
            .iter()
            .map(|sf| {
                let nodes = sf.nodes.iter().map(|p| Vec3::new(p[0], p[1], p[2])).collect();
                Filament::new(
                    nodes,
                    method,
                    Vec3::new(sf.offset[0], sf.offset[1], sf.offset[2]),
                )
            })
            .collect()
    }
}
