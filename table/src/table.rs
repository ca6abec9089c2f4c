use crate::attributes::{
    AttributeKey, AttributeValue, ColumnAttributes, FieldType, NegativeMethod, OutlierMethod,
};
use crate::error::{Result, TableError};
use crate::label::{RoundDirection, axis_label, round_outward};
use crate::ratio::RatioSpec;
use crate::transform::Norm;
use itertools::{Itertools, MinMaxResult};
use polars::prelude::{Column, DataFrame, DataType, NamedFrom, Series};
use rustc_hash::FxHashMap;
use tracing::debug;

/// Significant digits kept when rounding plot bounds outward
pub const PLOT_BOUND_DIGITS: i32 = 2;

/// Rectangular map dataset: N rows (pixels) by M named numeric columns,
/// plus one [`ColumnAttributes`] record per column.
///
/// Values live in a Polars `DataFrame` of `Float64` columns; missing values are
/// stored as NaN rather than null so every column always has exactly N entries.
/// Cloning the table is cheap because Polars shares column buffers until a
/// column is replaced.
#[derive(Debug, Clone)]
pub struct AttributeTable {
    data_frame: DataFrame,
    attributes: FxHashMap<String, ColumnAttributes>,
}

impl Default for AttributeTable {
    fn default() -> Self {
        Self {
            data_frame: DataFrame::empty(),
            attributes: FxHashMap::default(),
        }
    }
}

impl AttributeTable {
    /// Build a table from named columns, inferring each column's data type from its name
    ///
    /// # Errors
    /// - `ShapeMismatch` if the columns do not all have the same length
    /// - `DuplicateColumn` if a name appears twice
    pub fn from_columns(columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        let n_rows = columns.first().map_or(0, |(_, v)| v.len());
        let mut seen = rustc_hash::FxHashSet::default();
        for (name, values) in &columns {
            if values.len() != n_rows {
                return Err(TableError::ShapeMismatch {
                    expected: n_rows,
                    actual: values.len(),
                });
            }
            if !seen.insert(name.as_str()) {
                return Err(TableError::DuplicateColumn(name.clone()));
            }
        }

        let mut attributes = FxHashMap::default();
        let mut frame_columns: Vec<Column> = Vec::with_capacity(columns.len());
        for (name, values) in columns {
            attributes.insert(name.clone(), ColumnAttributes::default_for(FieldType::infer(&name)));
            frame_columns.push(Column::new(name.as_str().into(), values));
        }

        let mut table = Self {
            data_frame: DataFrame::new(frame_columns)?,
            attributes,
        };
        table.refresh_all_plot_metadata()?;
        debug!(
            "Built attribute table: {} rows x {} columns",
            table.n_rows(),
            table.n_columns()
        );
        Ok(table)
    }

    /// Build a table from an existing DataFrame
    ///
    /// Every column must be numeric (integers and booleans are widened to
    /// `Float64`); nulls become NaN.
    pub fn from_data_frame(data_frame: &DataFrame) -> Result<Self> {
        let mut columns = Vec::with_capacity(data_frame.width());
        for column in data_frame.get_columns() {
            let name = column.name().to_string();
            if !is_numeric_dtype(column.dtype()) {
                return Err(TableError::NonNumericColumn {
                    column: name,
                    dtype: column.dtype().to_string(),
                });
            }
            let values = column_to_f64(column)?;
            columns.push((name, values));
        }
        Self::from_columns(columns)
    }

    // ==================== SHAPE ====================

    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.data_frame.height()
    }

    #[must_use]
    pub fn n_columns(&self) -> usize {
        self.data_frame.width()
    }

    /// Column names in table order
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        self.data_frame
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.attributes.contains_key(column)
    }

    /// Borrow the underlying DataFrame
    #[must_use]
    pub fn data_frame(&self) -> &DataFrame {
        &self.data_frame
    }

    // ==================== VALUES ====================

    /// Copy a column out as `f64` values (NaN for missing)
    pub fn values(&self, column: &str) -> Result<Vec<f64>> {
        let col = self
            .data_frame
            .column(column)
            .map_err(|_| TableError::UnknownColumn(column.to_string()))?;
        column_to_f64(col)
    }

    /// Replace a column's values, keeping its metadata
    ///
    /// # Errors
    /// `UnknownColumn` if absent, `ShapeMismatch` if `values.len() != n_rows`
    pub fn set_values(&mut self, column: &str, values: Vec<f64>) -> Result<()> {
        self.ensure_column(column)?;
        if values.len() != self.n_rows() {
            return Err(TableError::ShapeMismatch {
                expected: self.n_rows(),
                actual: values.len(),
            });
        }
        self.data_frame
            .replace(column, Series::new(column.into(), values))?;
        Ok(())
    }

    /// Numerator / denominator of two existing columns
    pub fn compute_ratio(&self, spec: &RatioSpec) -> Result<Vec<f64>> {
        let numerator = self.values(&spec.numerator)?;
        let denominator = self.values(&spec.denominator)?;
        Ok(RatioSpec::compute(&numerator, &denominator))
    }

    /// Coordinates plus one (optionally normalised) column, ready for plotting
    ///
    /// Returns a DataFrame with `X`, `Y` and `array` columns. A `Ratio` field that
    /// is not stored in the table is computed from its numerator and
    /// denominator. The norm is a display transform only; the table is untouched.
    pub fn map_data(&self, field: &str, field_type: FieldType, norm: Norm) -> Result<DataFrame> {
        if !self.contains("Xc") || !self.contains("Yc") {
            return Err(TableError::MissingCoordinates);
        }

        let values = if self.contains(field) {
            self.values(field)?
        } else if field_type == FieldType::Ratio {
            self.compute_ratio(&RatioSpec::parse(field)?)?
        } else {
            return Err(TableError::UnknownColumn(field.to_string()));
        };

        let map = DataFrame::new(vec![
            Column::new("X".into(), self.values("Xc")?),
            Column::new("Y".into(), self.values("Yc")?),
            Column::new("array".into(), norm.apply(&values)),
        ])?;
        Ok(map)
    }

    // ==================== COLUMN MANAGEMENT ====================

    /// Add a column and initialise its metadata
    ///
    /// With a mask, `values` holds one entry per `true` in the mask and every
    /// masked-out row is set to NaN.
    ///
    /// # Errors
    /// - `DuplicateColumn` if the name is taken
    /// - `ShapeMismatch` if the mask length differs from the row count, or
    ///   `values` does not match the number of selected rows
    pub fn add_column(
        &mut self,
        name: &str,
        values: Vec<f64>,
        data_type: FieldType,
        mask: Option<&[bool]>,
    ) -> Result<()> {
        if self.contains(name) {
            return Err(TableError::DuplicateColumn(name.to_string()));
        }

        // An empty table takes its row count from the first column
        let n_rows = if self.n_columns() == 0 {
            mask.map_or(values.len(), <[bool]>::len)
        } else {
            self.n_rows()
        };

        let full = match mask {
            Some(mask) => {
                if mask.len() != n_rows {
                    return Err(TableError::ShapeMismatch {
                        expected: n_rows,
                        actual: mask.len(),
                    });
                }
                let selected = mask.iter().filter(|&&m| m).count();
                if values.len() != selected {
                    return Err(TableError::ShapeMismatch {
                        expected: selected,
                        actual: values.len(),
                    });
                }
                let mut source = values.into_iter();
                mask.iter()
                    .map(|&keep| {
                        if keep {
                            source.next().unwrap_or(f64::NAN)
                        } else {
                            f64::NAN
                        }
                    })
                    .collect()
            }
            None => {
                if values.len() != n_rows {
                    return Err(TableError::ShapeMismatch {
                        expected: n_rows,
                        actual: values.len(),
                    });
                }
                values
            }
        };

        self.data_frame
            .with_column(Series::new(name.into(), full))?;
        self.attributes
            .insert(name.to_string(), ColumnAttributes::default_for(data_type));
        self.refresh_plot_metadata(name)?;
        debug!("Added column '{}' ({})", name, data_type);
        Ok(())
    }

    /// Remove a column and its metadata
    pub fn delete_column(&mut self, name: &str) -> Result<()> {
        self.ensure_column(name)?;
        self.data_frame.drop_in_place(name)?;
        self.attributes.remove(name);
        Ok(())
    }

    /// Rename a column; data and metadata move together and the label is rebuilt
    pub fn rename_column(&mut self, old: &str, new: &str) -> Result<()> {
        self.ensure_column(old)?;
        if self.contains(new) {
            return Err(TableError::DuplicateColumn(new.to_string()));
        }
        self.data_frame.rename(old, new.into())?;
        if let Some(attrs) = self.attributes.remove(old) {
            self.attributes.insert(new.to_string(), attrs);
        }
        self.refresh_plot_metadata(new)
    }

    // ==================== METADATA ====================

    pub fn attributes(&self, column: &str) -> Result<&ColumnAttributes> {
        self.attributes
            .get(column)
            .ok_or_else(|| TableError::UnknownColumn(column.to_string()))
    }

    /// Modify a column's metadata through a closure, validating before commit
    ///
    /// The record is left unchanged if the closure breaks a bound invariant.
    pub fn update_attributes<F>(&mut self, column: &str, update: F) -> Result<()>
    where
        F: FnOnce(&mut ColumnAttributes),
    {
        let mut staged = self.attributes(column)?.clone();
        update(&mut staged);
        staged.validate(column)?;
        self.attributes.insert(column.to_string(), staged);
        Ok(())
    }

    pub fn set_used(&mut self, column: &str, used: bool) -> Result<()> {
        self.update_attributes(column, |a| a.used = used)
    }

    /// Set the outlier percentile bounds
    pub fn set_bounds(&mut self, column: &str, lower: f64, upper: f64) -> Result<()> {
        self.update_attributes(column, |a| {
            a.lower_bound = lower;
            a.upper_bound = upper;
        })
    }

    /// Set the percentile bounds applied to sorted-value gaps
    pub fn set_diff_bounds(&mut self, column: &str, lower: f64, upper: f64) -> Result<()> {
        self.update_attributes(column, |a| {
            a.diff_lower_bound = lower;
            a.diff_upper_bound = upper;
        })
    }

    pub fn set_negative_method(&mut self, column: &str, method: NegativeMethod) -> Result<()> {
        self.update_attributes(column, |a| a.negative_method = method)
    }

    pub fn set_outlier_method(&mut self, column: &str, method: OutlierMethod) -> Result<()> {
        self.update_attributes(column, |a| a.outlier_method = method)
    }

    pub fn set_auto_scale(&mut self, column: &str, auto_scale: bool) -> Result<()> {
        self.update_attributes(column, |a| a.auto_scale = auto_scale)
    }

    pub fn set_norm(&mut self, column: &str, norm: Norm) -> Result<()> {
        self.update_attributes(column, |a| a.norm = norm)
    }

    /// Set the units and rebuild the label so it carries them
    pub fn set_units(&mut self, column: &str, units: Option<&str>) -> Result<()> {
        self.update_attributes(column, |a| a.units = units.map(str::to_string))?;
        self.refresh_plot_metadata(column)
    }

    pub fn get_attribute(&self, column: &str, key: AttributeKey) -> Result<AttributeValue> {
        Ok(self.attributes(column)?.get(key))
    }

    /// Set one attribute on one or many columns
    ///
    /// Every column is validated before any is written, so a failure leaves
    /// the table unchanged.
    pub fn set_attribute<S: AsRef<str>>(
        &mut self,
        columns: &[S],
        key: AttributeKey,
        value: impl Into<AttributeValue>,
    ) -> Result<()> {
        let value = value.into();
        let mut staged = Vec::with_capacity(columns.len());
        for column in columns {
            let column = column.as_ref();
            let mut attrs = self.attributes(column)?.clone();
            attrs.set(key, &value)?;
            attrs.validate(column)?;
            staged.push((column.to_string(), attrs));
        }
        for (column, attrs) in staged {
            self.attributes.insert(column, attrs);
        }
        Ok(())
    }

    /// Columns whose attribute `key` equals `value`, in table order
    #[must_use]
    pub fn match_attribute(&self, key: AttributeKey, value: impl Into<AttributeValue>) -> Vec<String> {
        self.match_attributes(&[(key, value.into())])
    }

    /// Columns satisfying every `(key, value)` criterion, in table order
    #[must_use]
    pub fn match_attributes(&self, criteria: &[(AttributeKey, AttributeValue)]) -> Vec<String> {
        self.columns()
            .into_iter()
            .filter(|column| {
                self.attributes.get(column).is_some_and(|attrs| {
                    criteria
                        .iter()
                        .all(|(key, value)| attrs.get(*key).matches(value))
                })
            })
            .collect()
    }

    /// Recompute a column's label and outward-rounded plot bounds
    ///
    /// Coordinates keep their exact extent so the whole map stays in view.
    pub fn refresh_plot_metadata(&mut self, column: &str) -> Result<()> {
        let values = self.values(column)?;
        let attrs = self
            .attributes
            .get_mut(column)
            .ok_or_else(|| TableError::UnknownColumn(column.to_string()))?;

        attrs.label = axis_label(column, attrs.data_type, attrs.units.as_deref());
        let (min, max) = finite_range(&values).unwrap_or((f64::NAN, f64::NAN));
        if attrs.data_type == FieldType::Coordinate {
            attrs.plot_min = min;
            attrs.plot_max = max;
        } else {
            attrs.plot_min = round_outward(min, PLOT_BOUND_DIGITS, RoundDirection::Down);
            attrs.plot_max = round_outward(max, PLOT_BOUND_DIGITS, RoundDirection::Up);
        }
        Ok(())
    }

    pub fn refresh_all_plot_metadata(&mut self) -> Result<()> {
        for column in self.columns() {
            self.refresh_plot_metadata(&column)?;
        }
        Ok(())
    }

    fn ensure_column(&self, column: &str) -> Result<()> {
        if self.contains(column) {
            Ok(())
        } else {
            Err(TableError::UnknownColumn(column.to_string()))
        }
    }
}

/// Smallest and largest finite value
#[must_use]
pub fn finite_range(values: &[f64]) -> Option<(f64, f64)> {
    match values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .minmax_by(f64::total_cmp)
    {
        MinMaxResult::NoElements => None,
        MinMaxResult::OneElement(v) => Some((v, v)),
        MinMaxResult::MinMax(lo, hi) => Some((lo, hi)),
    }
}

/// Column types `from_data_frame` accepts
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::Int16
            | DataType::Int8
            | DataType::UInt64
            | DataType::UInt32
            | DataType::UInt16
            | DataType::UInt8
            | DataType::Boolean
    )
}

fn column_to_f64(column: &Column) -> Result<Vec<f64>> {
    let casted = column.cast(&DataType::Float64)?;
    let values = casted
        .as_materialized_series()
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    Ok(values)
}
