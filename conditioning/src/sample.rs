use crate::cluster::{ClusterAssignment, compute_clusters};
use crate::config::ConditioningConfig;
use crate::error::{PrepError, Result};
use crate::prep::{ClipParams, clip_outliers, handle_negatives, quantile_clip};
use lame_table::{
    AttributeKey, AttributeTable, AttributeValue, ColumnAttributes, FieldType, Norm, RatioSpec,
    TableError,
};
use polars::prelude::DataFrame;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Which columns a [`Sample::prep_data`] call recomputes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepScope {
    /// Rebuild the processed table from raw and condition every used analyte and ratio
    All,
    /// Recondition one column from its raw values; other columns keep their
    /// processed values
    Field(String),
}

/// A column that could not be conditioned
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnFailure {
    pub column: String,
    pub error: String,
}

/// Outcome of a [`Sample::prep_data`] call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PrepReport {
    /// Columns conditioned and written back
    pub processed: Vec<String>,
    /// Columns that could not be conditioned; their processed values are the
    /// ones they had before the failing step (raw values after a full recompute)
    pub failures: Vec<ColumnFailure>,
    /// Derived ratio columns recomputed from processed values
    pub ratios: Vec<String>,
    pub elapsed_ms: u128,
}

impl PrepReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, column: &str, err: &PrepError) {
        warn!("Conditioning '{}' failed: {}", column, err);
        self.failures.push(ColumnFailure {
            column: column.to_string(),
            error: err.to_string(),
        });
    }
}

/// One map dataset: the raw table, its conditioned copy and the cluster labels
/// that make conditioning local
///
/// A `Sample` is a single-writer object; callers that share it between threads
/// must serialize access themselves.
#[derive(Debug, Clone)]
pub struct Sample {
    sample_id: String,
    raw: AttributeTable,
    processed: AttributeTable,
    clusters: Option<ClusterAssignment>,
    clusters_stale: bool,
    derived_ratios: Vec<RatioSpec>,
    config: ConditioningConfig,
}

impl Sample {
    pub fn new(
        sample_id: impl Into<String>,
        raw: AttributeTable,
        config: ConditioningConfig,
    ) -> Result<Self> {
        config.validate()?;
        let sample_id = sample_id.into();
        debug!(
            "Sample '{}': {} rows x {} columns",
            sample_id,
            raw.n_rows(),
            raw.n_columns()
        );
        Ok(Self {
            sample_id,
            processed: raw.clone(),
            raw,
            clusters: None,
            clusters_stale: false,
            derived_ratios: Vec::new(),
            config,
        })
    }

    pub fn sample_id(&self) -> &str {
        &self.sample_id
    }

    pub fn raw(&self) -> &AttributeTable {
        &self.raw
    }

    pub fn processed(&self) -> &AttributeTable {
        &self.processed
    }

    pub fn config(&self) -> &ConditioningConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ConditioningConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn clusters(&self) -> Option<&ClusterAssignment> {
        self.clusters.as_ref()
    }

    /// True once the predictor selection changed after the labels were computed
    ///
    /// Stale labels are still used by [`Sample::prep_data`]; call
    /// [`Sample::compute_clusters`] to refresh them.
    pub fn clusters_stale(&self) -> bool {
        self.clusters_stale
    }

    /// Compute cluster labels from the raw table
    pub fn compute_clusters(&mut self) -> Result<&ClusterAssignment> {
        let assignment = compute_clusters(&self.raw, &self.config)?;
        self.clusters_stale = false;
        Ok(self.clusters.insert(assignment))
    }

    /// Condition the processed table
    ///
    /// Each column is conditioned independently and written back in one step, so
    /// a failing column is reported in [`PrepReport::failures`] and left as it
    /// was while the remaining columns are still processed. The raw table is only
    /// read.
    ///
    /// # Errors
    /// - `NotInitialized` if cluster labels have not been computed
    /// - `UnknownColumn` (through `Table`) for a `Field` scope naming an absent column
    pub fn prep_data(&mut self, scope: &PrepScope) -> Result<PrepReport> {
        let start = Instant::now();
        let Some(clusters) = self.clusters.as_ref() else {
            return Err(PrepError::NotInitialized(format!(
                "cluster labels for sample '{}'; call compute_clusters first",
                self.sample_id
            )));
        };
        if self.clusters_stale {
            warn!(
                "Sample '{}': conditioning with stale cluster labels",
                self.sample_id
            );
        }

        let mut report = PrepReport::default();
        let (eligible, ratios) = match scope {
            PrepScope::All => {
                let eligible = eligible_columns(&self.raw);
                let stashed = self.stash_derived_attributes();
                self.processed = self.raw.clone();
                for column in &eligible {
                    self.processed
                        .set_negative_method(column, self.config.negative_method)?;
                }
                for (spec, attrs) in &stashed {
                    let name = spec.name();
                    if let Err(err) = restore_ratio(&mut self.processed, spec, attrs.as_ref()) {
                        report.fail(&name, &err);
                    }
                }
                (eligible, self.derived_ratios.clone())
            }
            PrepScope::Field(field) => {
                if !self.processed.contains(field) {
                    return Err(TableError::UnknownColumn(field.clone()).into());
                }
                let mut eligible = Vec::new();
                if self.raw.contains(field) {
                    if self.processed.attributes(field)?.data_type.is_conditioned() {
                        eligible.push(field.clone());
                    } else {
                        self.processed.set_values(field, self.raw.values(field)?)?;
                    }
                }
                let ratios = self
                    .derived_ratios
                    .iter()
                    .filter(|r| {
                        &r.numerator == field || &r.denominator == field || &r.name() == field
                    })
                    .cloned()
                    .collect();
                (eligible, ratios)
            }
        };

        for column in &eligible {
            let result = self
                .raw
                .values(column)
                .map_err(PrepError::from)
                .and_then(|values| {
                    condition_column(&mut self.processed, column, values, clusters, &self.config)
                });
            match result {
                Ok(()) => report.processed.push(column.clone()),
                Err(err) => report.fail(column, &err),
            }
        }

        for spec in &ratios {
            let name = spec.name();
            let result = self
                .processed
                .compute_ratio(spec)
                .and_then(|values| self.processed.set_values(&name, values));
            match result {
                Ok(()) => report.ratios.push(name),
                Err(err) => report.fail(&name, &err.into()),
            }
        }

        self.processed.refresh_all_plot_metadata()?;
        report.elapsed_ms = start.elapsed().as_millis();
        info!(
            "Sample '{}': conditioned {} columns, {} ratios, {} failures in {} ms",
            self.sample_id,
            report.processed.len(),
            report.ratios.len(),
            report.failures.len(),
            report.elapsed_ms
        );
        Ok(report)
    }

    /// Coordinates plus one processed column for plotting
    pub fn get_map_data(&self, field: &str, field_type: FieldType, norm: Norm) -> Result<DataFrame> {
        Ok(self.processed.map_data(field, field_type, norm)?)
    }

    pub fn get_attribute(&self, column: &str, key: AttributeKey) -> Result<AttributeValue> {
        Ok(self.processed.get_attribute(column, key)?)
    }

    /// Set an attribute on both tables
    ///
    /// Changing `use` marks existing cluster labels stale; they are not recomputed.
    pub fn set_attribute<S: AsRef<str>>(
        &mut self,
        columns: &[S],
        key: AttributeKey,
        value: impl Into<AttributeValue>,
    ) -> Result<()> {
        let value = value.into();
        self.processed.set_attribute(columns, key, value.clone())?;
        let in_raw: Vec<&str> = columns
            .iter()
            .map(|c| c.as_ref())
            .filter(|c| self.raw.contains(c))
            .collect();
        self.raw.set_attribute(&in_raw, key, value)?;

        if key == AttributeKey::Use && self.clusters.is_some() {
            self.mark_clusters_stale();
        }
        Ok(())
    }

    pub fn match_attribute(&self, key: AttributeKey, value: impl Into<AttributeValue>) -> Vec<String> {
        self.processed.match_attribute(key, value)
    }

    pub fn match_attributes(&self, criteria: &[(AttributeKey, AttributeValue)]) -> Vec<String> {
        self.processed.match_attributes(criteria)
    }

    /// Add a column to both tables so it survives a full recompute
    pub fn add_column(
        &mut self,
        name: &str,
        values: Vec<f64>,
        data_type: FieldType,
        mask: Option<&[bool]>,
    ) -> Result<()> {
        if self.processed.contains(name) {
            return Err(TableError::DuplicateColumn(name.to_string()).into());
        }
        self.raw.add_column(name, values.clone(), data_type, mask)?;
        if let Err(err) = self.processed.add_column(name, values, data_type, mask) {
            self.raw.delete_column(name)?;
            return Err(err.into());
        }
        Ok(())
    }

    /// Remove a column from both tables
    pub fn delete_column(&mut self, name: &str) -> Result<()> {
        if !self.processed.contains(name) && !self.raw.contains(name) {
            return Err(TableError::UnknownColumn(name.to_string()).into());
        }
        if self.processed.contains(name) {
            self.processed.delete_column(name)?;
        }
        if self.raw.contains(name) {
            self.raw.delete_column(name)?;
        }
        self.derived_ratios.retain(|r| r.name() != name);
        let was_predictor = self
            .clusters
            .as_ref()
            .is_some_and(|c| c.predictors.iter().any(|p| p == name));
        if was_predictor {
            self.mark_clusters_stale();
        }
        Ok(())
    }

    /// Register a ratio of two columns, computed from processed values
    ///
    /// The ratio is kept up to date by later [`Sample::prep_data`] calls.
    /// Returns the new column name, `"<numerator> / <denominator>"`.
    ///
    /// # Errors
    /// - `InvalidRatioSpec` (through `Table`) if the name would not parse back
    /// - `DuplicateColumn` if the ratio already exists
    pub fn add_ratio(&mut self, numerator: &str, denominator: &str) -> Result<String> {
        let spec = RatioSpec::parse(&RatioSpec::new(numerator, denominator).name())?;
        let name = spec.name();
        if self.processed.contains(&name) {
            return Err(TableError::DuplicateColumn(name).into());
        }
        let values = self.processed.compute_ratio(&spec)?;
        self.processed
            .add_column(&name, values, FieldType::Ratio, None)?;
        self.derived_ratios.push(spec);
        Ok(name)
    }

    /// Ratio columns added with [`Sample::add_ratio`]
    pub fn derived_ratios(&self) -> &[RatioSpec] {
        &self.derived_ratios
    }

    fn mark_clusters_stale(&mut self) {
        if !self.clusters_stale {
            info!(
                "Sample '{}': predictor selection changed, cluster labels are now stale",
                self.sample_id
            );
        }
        self.clusters_stale = true;
    }

    fn stash_derived_attributes(&self) -> Vec<(RatioSpec, Option<ColumnAttributes>)> {
        self.derived_ratios
            .iter()
            .map(|spec| {
                let attrs = self.processed.attributes(&spec.name()).ok().cloned();
                (spec.clone(), attrs)
            })
            .collect()
    }
}

/// Used analyte and ratio columns, in table order
fn eligible_columns(table: &AttributeTable) -> Vec<String> {
    table
        .columns()
        .into_iter()
        .filter(|c| {
            table
                .attributes(c)
                .is_ok_and(|a| a.used && a.data_type.is_conditioned())
        })
        .collect()
}

/// Re-create a derived ratio column after the processed table was rebuilt
fn restore_ratio(
    table: &mut AttributeTable,
    spec: &RatioSpec,
    attrs: Option<&ColumnAttributes>,
) -> Result<()> {
    let name = spec.name();
    let values = table.compute_ratio(spec)?;
    table.add_column(&name, values, FieldType::Ratio, None)?;
    if let Some(attrs) = attrs {
        table.update_attributes(&name, |a| *a = attrs.clone())?;
    }
    Ok(())
}

/// Negative handling then outlier clipping of `values` (the raw column),
/// written to `column` of `table` only on success
///
/// With `auto_scale` the column is processed cluster by cluster and rows
/// without a label are left untouched; otherwise the whole column gets
/// negative handling and a flat percentile clip.
fn condition_column(
    table: &mut AttributeTable,
    column: &str,
    values: Vec<f64>,
    clusters: &ClusterAssignment,
    config: &ConditioningConfig,
) -> Result<()> {
    let attrs = table.attributes(column)?.clone();

    let conditioned = if attrs.auto_scale {
        if clusters.n_rows() != values.len() {
            return Err(TableError::ShapeMismatch {
                expected: values.len(),
                actual: clusters.n_rows(),
            }
            .into());
        }
        let params = ClipParams::from_attributes(&attrs, config);
        let mut out = values.clone();
        for cluster in 0..clusters.k {
            let rows = clusters.rows_in(cluster);
            if rows.is_empty() {
                continue;
            }
            let subset: Vec<f64> = rows.iter().map(|&r| values[r]).collect();
            let shifted = handle_negatives(&subset, attrs.negative_method)?;
            let clipped = clip_outliers(&shifted, attrs.outlier_method, &params)?;
            for (&r, v) in rows.iter().zip(clipped) {
                out[r] = v;
            }
        }
        out
    } else {
        let shifted = handle_negatives(&values, attrs.negative_method)?;
        quantile_clip(&shifted, attrs.lower_bound, attrs.upper_bound)?
    };

    table.set_values(column, conditioned)?;
    debug!(
        "Conditioned '{}' ({}, {}, auto_scale = {})",
        column, attrs.negative_method, attrs.outlier_method, attrs.auto_scale
    );
    Ok(())
}
