//! Spectral reading model and point list codec
//!
//! Points are persisted as a single delimited column: `pos:amp,pos:amp,...`.
//! A token without a position (`amp`) takes its index as position.

use crate::metadata::{MetadataRecord, FIELD_DATABASE_ID, FIELD_FORMAT};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Format tag used when a producer does not set one
pub const DEFAULT_FORMAT: &str = "NIR";

/// One (position, amplitude) sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub position: f64,
    pub amplitude: f64,
}

impl Point {
    pub fn new(position: f64, amplitude: f64) -> Self {
        Self { position, amplitude }
    }
}

/// One physical measurement plus its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Surrogate key; assigned by the store on insert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Caller-supplied identifier (not necessarily numeric)
    pub external_id: String,
    /// Classification tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default = "default_format")]
    pub format: String,
    pub points: Vec<Point>,
    #[serde(default)]
    pub metadata: MetadataRecord,
}

fn default_format() -> String {
    DEFAULT_FORMAT.to_string()
}

impl Reading {
    pub fn new(external_id: impl Into<String>, points: Vec<Point>) -> Self {
        Self {
            id: None,
            external_id: external_id.into(),
            tag: None,
            format: default_format(),
            points,
            metadata: MetadataRecord::new(),
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_metadata(mut self, metadata: MetadataRecord) -> Self {
        self.metadata = metadata;
        self
    }

    /// Check the producer contract: identity set and at least one point
    pub fn check(&self) -> Result<(), String> {
        if self.external_id.trim().is_empty() {
            return Err("external id is empty".to_string());
        }
        if self.format.trim().is_empty() {
            return Err(format!("reading {} has an empty format", self.external_id));
        }
        if self.points.is_empty() {
            return Err(format!("reading {} has no points", self.external_id));
        }
        Ok(())
    }

    /// Encoded point list as stored in the `points` column
    pub fn encoded_points(&self) -> String {
        encode_points(&self.points)
    }

    /// Mirror the row-level identity into the metadata record
    pub(crate) fn attach_indicators(&mut self) {
        let format = self.format.clone();
        self.metadata.set(FIELD_FORMAT, format);
        if let Some(id) = self.id {
            self.metadata.set(FIELD_DATABASE_ID, id as f64);
        }
    }
}

/// Encode points as `pos:amp,pos:amp,...`
pub fn encode_points(points: &[Point]) -> String {
    points
        .iter()
        .map(|p| format!("{}:{}", p.position, p.amplitude))
        .collect::<Vec<_>>()
        .join(",")
}

/// Decode a stored point list, preserving stored order
///
/// Malformed tokens are skipped with a warning.
pub fn decode_points(encoded: &str) -> Vec<Point> {
    let mut points = Vec::new();

    for (index, token) in encoded.split(',').enumerate() {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        let parsed = match token.split_once(':') {
            Some((pos, amp)) => pos
                .trim()
                .parse::<f64>()
                .and_then(|pos| amp.trim().parse::<f64>().map(|amp| Point::new(pos, amp))),
            None => token.parse::<f64>().map(|amp| Point::new(index as f64, amp)),
        };

        match parsed {
            Ok(point) => points.push(point),
            Err(e) => warn!(token, index, "Skipping malformed point: {}", e),
        }
    }

    points
}
