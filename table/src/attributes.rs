//! Typed per-column metadata
//!
//! Every column of an [`AttributeTable`](crate::AttributeTable) carries a
//! [`ColumnAttributes`] record. The record is a fixed struct rather than an open
//! string-keyed map, so a misspelled key is a compile error for Rust callers.
//! UI-style callers that address metadata by name go through [`AttributeKey`]
//! and [`AttributeValue`], which map onto the same fields and validate every write.

use crate::error::{Result, TableError};
use crate::transform::Norm;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

pub const DEFAULT_LOWER_BOUND: f64 = 0.05;
pub const DEFAULT_UPPER_BOUND: f64 = 99.5;
pub const DEFAULT_DIFF_LOWER_BOUND: f64 = 0.05;
pub const DEFAULT_DIFF_UPPER_BOUND: f64 = 99.0;

/// Kind of data held in a column
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum FieldType {
    /// Measured concentration of one isotope/element
    Analyte,
    /// Quotient of two analytes, named `"<numerator> / <denominator>"`
    Ratio,
    /// Map pixel coordinate (`Xc`, `Yc`)
    Coordinate,
    /// Field derived by a user calculation
    Computed,
    /// Principal component score
    Pca,
    /// Cluster id stored as a column
    Cluster,
    /// Anything else (mask, polygon id, ...)
    Special,
}

impl FieldType {
    /// Infer the field type from a column name
    ///
    /// Coordinates are named exactly `Xc`/`Yc`, ratios match `"<elem> / <elem>"`,
    /// everything else is treated as an analyte.
    #[must_use]
    pub fn infer(name: &str) -> Self {
        if name == "Xc" || name == "Yc" {
            FieldType::Coordinate
        } else if crate::ratio::RatioSpec::parse(name).is_ok() {
            FieldType::Ratio
        } else {
            FieldType::Analyte
        }
    }

    /// Field types that take part in conditioning
    #[must_use]
    pub fn is_conditioned(&self) -> bool {
        matches!(self, FieldType::Analyte | FieldType::Ratio)
    }
}

/// Policy for mapping non-positive measurements to usable values
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum NegativeMethod {
    /// Replace every value <= 0 with NaN
    #[default]
    Ignore,
    /// Replace negatives with the smallest positive value (zeros are kept)
    MinimumPositive,
    /// Affine remap sending `min - 1e-4` to 0 while keeping the maximum
    GradualShift,
    /// Yeo-Johnson power transform with a fitted shape parameter
    YeoJohnson,
}

impl NegativeMethod {
    /// Parse a policy name, failing with `UnknownPolicy`
    pub fn parse(name: &str) -> Result<Self> {
        Self::from_str(name.trim()).map_err(|_| TableError::UnknownPolicy(name.to_string()))
    }
}

/// Outlier clipping criterion
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum OutlierMethod {
    /// Pass-through
    None,
    /// Clip to the `[lower_bound, upper_bound]` percentiles
    Quantile,
    /// Percentile clip informed by gaps between sorted log values
    #[default]
    QuantileAndDistance,
    /// Chauvenet's criterion
    Chauvenet,
    /// Declared for compatibility with saved settings; selecting it is an error
    LogInflection,
}

impl OutlierMethod {
    /// Parse a method name, failing with `UnknownPolicy`
    pub fn parse(name: &str) -> Result<Self> {
        Self::from_str(name.trim()).map_err(|_| TableError::UnknownPolicy(name.to_string()))
    }
}

/// Metadata kept for every column of the table
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ColumnAttributes {
    pub data_type: FieldType,
    /// Whether the column is selected for analysis
    #[serde(rename = "use")]
    pub used: bool,
    pub units: Option<String>,
    pub norm: Norm,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub diff_lower_bound: f64,
    pub diff_upper_bound: f64,
    pub negative_method: NegativeMethod,
    pub outlier_method: OutlierMethod,
    /// Per-cluster outlier pipeline when true, flat percentile clip otherwise
    pub auto_scale: bool,
    pub label: String,
    pub plot_min: f64,
    pub plot_max: f64,
}

impl ColumnAttributes {
    /// Default metadata for a freshly added column
    #[must_use]
    pub fn default_for(data_type: FieldType) -> Self {
        let coordinate = data_type == FieldType::Coordinate;
        Self {
            data_type,
            used: false,
            units: None,
            norm: Norm::Linear,
            lower_bound: DEFAULT_LOWER_BOUND,
            upper_bound: DEFAULT_UPPER_BOUND,
            diff_lower_bound: DEFAULT_DIFF_LOWER_BOUND,
            diff_upper_bound: DEFAULT_DIFF_UPPER_BOUND,
            negative_method: NegativeMethod::default(),
            outlier_method: if coordinate {
                OutlierMethod::None
            } else {
                OutlierMethod::default()
            },
            auto_scale: !coordinate,
            label: String::new(),
            plot_min: f64::NAN,
            plot_max: f64::NAN,
        }
    }

    /// Check the bound invariants
    pub fn validate(&self, column: &str) -> Result<()> {
        check_bounds(column, self.lower_bound, self.upper_bound)?;
        check_bounds(column, self.diff_lower_bound, self.diff_upper_bound)
    }

    /// Read one attribute by key
    #[must_use]
    pub fn get(&self, key: AttributeKey) -> AttributeValue {
        match key {
            AttributeKey::DataType => AttributeValue::from(self.data_type.to_string()),
            AttributeKey::Use => AttributeValue::Bool(self.used),
            AttributeKey::Units => self
                .units
                .clone()
                .map_or(AttributeValue::Missing, AttributeValue::Text),
            AttributeKey::Norm => AttributeValue::from(self.norm.to_string()),
            AttributeKey::LowerBound => AttributeValue::Number(self.lower_bound),
            AttributeKey::UpperBound => AttributeValue::Number(self.upper_bound),
            AttributeKey::DiffLowerBound => AttributeValue::Number(self.diff_lower_bound),
            AttributeKey::DiffUpperBound => AttributeValue::Number(self.diff_upper_bound),
            AttributeKey::NegativeMethod => AttributeValue::from(self.negative_method.to_string()),
            AttributeKey::OutlierMethod => AttributeValue::from(self.outlier_method.to_string()),
            AttributeKey::AutoScale => AttributeValue::Bool(self.auto_scale),
            AttributeKey::Label => AttributeValue::Text(self.label.clone()),
            AttributeKey::PlotMin => AttributeValue::Number(self.plot_min),
            AttributeKey::PlotMax => AttributeValue::Number(self.plot_max),
        }
    }

    /// Write one attribute by key
    ///
    /// The record is only modified when the value has the right shape. Bound
    /// invariants are checked separately with [`ColumnAttributes::validate`] so
    /// that a caller can stage several writes before validating.
    pub fn set(&mut self, key: AttributeKey, value: &AttributeValue) -> Result<()> {
        let invalid = || TableError::InvalidAttributeValue {
            key: key.to_string(),
            value: value.to_string(),
        };

        match key {
            AttributeKey::DataType => {
                let text = value.as_text().ok_or_else(invalid)?;
                self.data_type = FieldType::from_str(text).map_err(|_| invalid())?;
            }
            AttributeKey::Use => self.used = value.as_bool().ok_or_else(invalid)?,
            AttributeKey::Units => {
                self.units = match value {
                    AttributeValue::Missing => None,
                    AttributeValue::Text(t) => Some(t.clone()),
                    _ => return Err(invalid()),
                }
            }
            AttributeKey::Norm => {
                let text = value.as_text().ok_or_else(invalid)?;
                self.norm = Norm::from_str(text).map_err(|_| invalid())?;
            }
            AttributeKey::LowerBound => self.lower_bound = value.as_number().ok_or_else(invalid)?,
            AttributeKey::UpperBound => self.upper_bound = value.as_number().ok_or_else(invalid)?,
            AttributeKey::DiffLowerBound => {
                self.diff_lower_bound = value.as_number().ok_or_else(invalid)?
            }
            AttributeKey::DiffUpperBound => {
                self.diff_upper_bound = value.as_number().ok_or_else(invalid)?
            }
            AttributeKey::NegativeMethod => {
                let text = value.as_text().ok_or_else(invalid)?;
                self.negative_method = NegativeMethod::parse(text)?;
            }
            AttributeKey::OutlierMethod => {
                let text = value.as_text().ok_or_else(invalid)?;
                self.outlier_method = OutlierMethod::parse(text)?;
            }
            AttributeKey::AutoScale => self.auto_scale = value.as_bool().ok_or_else(invalid)?,
            AttributeKey::Label => self.label = value.as_text().ok_or_else(invalid)?.to_string(),
            AttributeKey::PlotMin => self.plot_min = value.as_number().ok_or_else(invalid)?,
            AttributeKey::PlotMax => self.plot_max = value.as_number().ok_or_else(invalid)?,
        }
        Ok(())
    }
}

fn check_bounds(column: &str, lower: f64, upper: f64) -> Result<()> {
    let in_range = |v: f64| (0.0..=100.0).contains(&v);
    if in_range(lower) && in_range(upper) && lower < upper {
        Ok(())
    } else {
        Err(TableError::InvalidBounds {
            column: column.to_string(),
            lower,
            upper,
        })
    }
}

/// Name of a metadata field, as used by string-addressed callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum AttributeKey {
    DataType,
    Use,
    Units,
    Norm,
    LowerBound,
    UpperBound,
    DiffLowerBound,
    DiffUpperBound,
    NegativeMethod,
    OutlierMethod,
    AutoScale,
    Label,
    PlotMin,
    PlotMax,
}

impl AttributeKey {
    /// Parse a key name, failing with `UnknownAttribute`
    pub fn parse(name: &str) -> Result<Self> {
        Self::from_str(name).map_err(|_| TableError::UnknownAttribute(name.to_string()))
    }
}

/// Loosely typed attribute value
///
/// Enum-valued attributes travel as their canonical names (`"Analyte"`,
/// `"minimum_positive"`, ...).
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Missing,
}

impl AttributeValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(t) => Some(t.as_str()),
            _ => None,
        }
    }

    /// Equality used by attribute matching
    ///
    /// Text comparison ignores ASCII case so `"analyte"` matches `Analyte`.
    #[must_use]
    pub fn matches(&self, other: &AttributeValue) -> bool {
        match (self, other) {
            (AttributeValue::Text(a), AttributeValue::Text(b)) => a.eq_ignore_ascii_case(b),
            (a, b) => a == b,
        }
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Number(n) => write!(f, "{n}"),
            AttributeValue::Text(t) => write!(f, "{t}"),
            AttributeValue::Missing => write!(f, "<missing>"),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<FieldType> for AttributeValue {
    fn from(value: FieldType) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<NegativeMethod> for AttributeValue {
    fn from(value: NegativeMethod) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<OutlierMethod> for AttributeValue {
    fn from(value: OutlierMethod) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<Norm> for AttributeValue {
    fn from(value: Norm) -> Self {
        AttributeValue::Text(value.to_string())
    }
}
