//! Checkpoint journals.
//!
//! A journal is a plain JSON document holding everything a rank needs to
//! recreate its bodies: one record per body, grouped by population. Body
//! identity is stored as its textual key, so journals written by one run
//! layout remain readable when rank counts change; restored bodies keep
//! their original keys.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use dem_types::{BodyKey, PopulationId, RankId};

use crate::error::ExchangeError;
use crate::record::BodyRecord;

/// One body in a journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    /// Textual body key, e.g. `"r0/p1/42"`.
    pub identifier: String,
    /// Scale, center, velocity, angular velocity, orientation axis:
    /// thirteen scalars in that order.
    pub params: Vec<f64>,
}

impl JournalRecord {
    /// Encode a wire record.
    #[must_use]
    pub fn from_record(record: &BodyRecord) -> Self {
        let mut params = Vec::with_capacity(13);
        params.push(record.scale);
        params.extend_from_slice(&record.center);
        params.extend_from_slice(&record.velocity);
        params.extend_from_slice(&record.angular_velocity);
        params.extend_from_slice(&record.orientation);
        Self {
            identifier: record.key.to_string(),
            params,
        }
    }

    /// Decode back into a wire record.
    ///
    /// # Errors
    ///
    /// Fails on a malformed identifier or a wrong parameter count.
    pub fn to_record(&self) -> Result<BodyRecord, ExchangeError> {
        let key: BodyKey = self.identifier.parse().map_err(|_| {
            ExchangeError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("bad body identifier {:?}", self.identifier),
            ))
        })?;
        if self.params.len() != 13 {
            return Err(ExchangeError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "body {} carries {} parameters, expected 13",
                    self.identifier,
                    self.params.len()
                ),
            )));
        }
        let p = &self.params;
        Ok(BodyRecord {
            key,
            scale: p[0],
            center: [p[1], p[2], p[3]],
            velocity: [p[4], p[5], p[6]],
            angular_velocity: [p[7], p[8], p[9]],
            orientation: [p[10], p[11], p[12]],
        })
    }
}

/// All bodies of one population on one rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationJournal {
    /// The population these bodies belong to.
    pub population: PopulationId,
    /// One entry per authoritative body. Slaves are never journaled.
    pub bodies: Vec<JournalRecord>,
}

/// One rank's full checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankJournal {
    /// The rank that wrote this journal.
    pub rank: RankId,
    /// Step counter at checkpoint time.
    pub step: u64,
    /// Simulated time at checkpoint (s).
    pub time: f64,
    /// Per-population body records.
    pub populations: Vec<PopulationJournal>,
}

impl RankJournal {
    /// Serialize to a writer as pretty JSON.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), ExchangeError> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserialize from a reader.
    pub fn read_from<R: Read>(reader: R) -> Result<Self, ExchangeError> {
        Ok(serde_json::from_reader(reader)?)
    }
}
