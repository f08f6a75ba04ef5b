//! Structured reading filter
//!
//! The only query language the store accepts. A filter is immutable per
//! query; [`Filter::validate`] produces the normalised copy the translator
//! works from.

use crate::{Error, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Legacy "no bound" sentinel accepted by [`FieldRange::from_raw`]
pub const NO_BOUND: f64 = -1.0;

/// Numeric range constraint on one metadata field (inclusive bounds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRange {
    pub field: String,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl FieldRange {
    pub fn new(field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            field: field.into(),
            min,
            max,
        }
    }

    /// Build from raw bounds where [`NO_BOUND`] means unbounded
    pub fn from_raw(field: impl Into<String>, min: f64, max: f64) -> Self {
        let bound = |v: f64| if v == NO_BOUND { None } else { Some(v) };
        Self::new(field, bound(min), bound(max))
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// Regular-expression match on one metadata field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMatch {
    pub field: String,
    pub pattern: String,
}

impl FieldMatch {
    pub fn new(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            pattern: pattern.into(),
        }
    }
}

/// Result ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Value of the insert timestamp field
    InsertTimestamp,
    ExternalId,
    /// Surrogate key (insertion order)
    #[default]
    DatabaseId,
}

/// Predicate bundle selecting readings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
    pub ranges: Vec<FieldRange>,
    pub external_id_regex: Option<String>,
    pub tag_regex: Option<String>,
    pub format_regex: Option<String>,
    pub instrument_regex: Option<String>,
    pub field_regexes: Vec<FieldMatch>,
    pub inserted_after: Option<NaiveDateTime>,
    pub inserted_before: Option<NaiveDateTime>,
    /// Fields that must be present (any value)
    pub required_fields: Vec<String>,
    pub only_dummies: bool,
    pub exclude_dummies: bool,
    pub sort: SortKey,
    /// Descending order when set
    pub latest: bool,
    /// Maximum rows; zero or negative means unlimited
    pub limit: i64,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_range(mut self, range: FieldRange) -> Self {
        self.ranges.push(range);
        self
    }

    pub fn with_external_id_regex(mut self, pattern: impl Into<String>) -> Self {
        self.external_id_regex = Some(pattern.into());
        self
    }

    pub fn with_tag_regex(mut self, pattern: impl Into<String>) -> Self {
        self.tag_regex = Some(pattern.into());
        self
    }

    pub fn with_format_regex(mut self, pattern: impl Into<String>) -> Self {
        self.format_regex = Some(pattern.into());
        self
    }

    pub fn with_instrument_regex(mut self, pattern: impl Into<String>) -> Self {
        self.instrument_regex = Some(pattern.into());
        self
    }

    pub fn with_field_regex(mut self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.field_regexes.push(FieldMatch::new(field, pattern));
        self
    }

    pub fn inserted_between(
        mut self,
        after: Option<NaiveDateTime>,
        before: Option<NaiveDateTime>,
    ) -> Self {
        self.inserted_after = after;
        self.inserted_before = before;
        self
    }

    pub fn with_required_field(mut self, field: impl Into<String>) -> Self {
        self.required_fields.push(field.into());
        self
    }

    pub fn only_dummies(mut self, value: bool) -> Self {
        self.only_dummies = value;
        self
    }

    pub fn exclude_dummies(mut self, value: bool) -> Self {
        self.exclude_dummies = value;
        self
    }

    pub fn sorted_by(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }

    pub fn latest(mut self, latest: bool) -> Self {
        self.latest = latest;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Positive row cap, if any
    pub fn effective_limit(&self) -> Option<u64> {
        (self.limit > 0).then_some(self.limit as u64)
    }

    /// Check mutually exclusive flags and normalise unset constraints away
    pub fn validate(&self) -> Result<Filter> {
        if self.only_dummies && self.exclude_dummies {
            return Err(Error::Validation(
                "only_dummies and exclude_dummies are mutually exclusive".to_string(),
            ));
        }

        if let (Some(after), Some(before)) = (self.inserted_after, self.inserted_before) {
            if after > before {
                return Err(Error::Validation(format!(
                    "inserted_after ({}) is later than inserted_before ({})",
                    after, before
                )));
            }
        }

        for range in &self.ranges {
            if range.field.trim().is_empty() {
                return Err(Error::Validation("range without field name".to_string()));
            }
            if range.min.iter().chain(range.max.iter()).any(|b| !b.is_finite()) {
                return Err(Error::Validation(format!(
                    "range on {} has a non-finite bound",
                    range.field
                )));
            }
        }
        for field_match in &self.field_regexes {
            if field_match.field.trim().is_empty() {
                return Err(Error::Validation("regex without field name".to_string()));
            }
        }

        let mut normalized = self.clone();
        // The sentinel also arrives through deserialized filters
        for range in &mut normalized.ranges {
            range.min = range.min.filter(|b| *b != NO_BOUND);
            range.max = range.max.filter(|b| *b != NO_BOUND);
        }
        normalized.ranges.retain(|r| !r.is_unbounded());
        normalized.field_regexes.retain(|m| !m.pattern.is_empty());
        normalized.required_fields.retain(|f| !f.trim().is_empty());
        normalized.external_id_regex = non_empty(&self.external_id_regex);
        normalized.tag_regex = non_empty(&self.tag_regex);
        normalized.format_regex = non_empty(&self.format_regex);
        normalized.instrument_regex = non_empty(&self.instrument_regex);
        if normalized.limit < 0 {
            normalized.limit = 0;
        }

        Ok(normalized)
    }
}

fn non_empty(pattern: &Option<String>) -> Option<String> {
    pattern.as_ref().filter(|p| !p.is_empty()).cloned()
}
