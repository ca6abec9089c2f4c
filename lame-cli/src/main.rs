use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use lame_conditioning::{ConditioningConfig, PrepReport, PrepScope, Sample};
use lame_table::{
    AttributeKey, AttributeTable, FieldType, NegativeMethod, OutlierMethod, is_numeric_dtype,
};
use polars::prelude::*;
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// LaME prep - conditioning for laser-ablation map data
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "lame-prep")]
#[command(about = "Cluster-aware negative handling and outlier clipping for map CSV files", long_about = None)]
struct Cli {
    /// Path(s) to input CSV file(s) or directory containing CSV files
    #[arg(value_name = "INPUT_FILES", required = true)]
    input: Vec<PathBuf>,

    /// Output directory for processed CSV files
    /// If not specified, output files are saved alongside input files with a "_processed" suffix
    #[arg(short, long, value_name = "OUTPUT_DIR")]
    output: Option<PathBuf>,

    /// JSON file with conditioning settings; command-line flags override it
    #[arg(long, value_name = "CONFIG_JSON")]
    config: Option<PathBuf>,

    /// Negative handling applied to every used analyte and ratio
    #[arg(short = 'n', long, value_enum)]
    negative_method: Option<NegativeMethodArg>,

    /// Outlier method for every used analyte and ratio
    #[arg(short = 'm', long, value_enum)]
    outlier_method: Option<OutlierMethodArg>,

    /// Largest cluster count tried by the elbow sweep
    #[arg(long)]
    max_clusters: Option<usize>,

    /// Seed for k-means
    #[arg(long)]
    seed: Option<u64>,

    /// Lower clipping percentile for every used column
    #[arg(long)]
    lower_bound: Option<f64>,

    /// Upper clipping percentile for every used column
    #[arg(long)]
    upper_bound: Option<f64>,

    /// Analytes to use (comma-separated, e.g., "Si29,Ca44,Sr88")
    /// If not specified, every analyte column is used
    #[arg(short, long = "use", value_delimiter = ',', value_name = "COLUMNS")]
    use_columns: Option<Vec<String>>,

    /// Save a JSON report (single file) or a directory of reports (multiple files)
    #[arg(long, value_name = "REPORT_PATH")]
    report: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum NegativeMethodArg {
    /// Non-positive values become missing
    Ignore,
    /// Negatives take the smallest positive value
    MinimumPositive,
    /// Shift the whole column so its minimum is just above zero
    GradualShift,
    /// Yeo-Johnson power transform
    YeoJohnson,
}

impl From<NegativeMethodArg> for NegativeMethod {
    fn from(method: NegativeMethodArg) -> Self {
        match method {
            NegativeMethodArg::Ignore => NegativeMethod::Ignore,
            NegativeMethodArg::MinimumPositive => NegativeMethod::MinimumPositive,
            NegativeMethodArg::GradualShift => NegativeMethod::GradualShift,
            NegativeMethodArg::YeoJohnson => NegativeMethod::YeoJohnson,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OutlierMethodArg {
    /// No clipping
    None,
    /// Clamp to the bound percentiles
    Quantile,
    /// Percentile clip informed by gaps between sorted log values
    QuantileAndDistance,
    /// Chauvenet's criterion
    Chauvenet,
    /// Not implemented; every column reports a failure
    LogInflection,
}

impl From<OutlierMethodArg> for OutlierMethod {
    fn from(method: OutlierMethodArg) -> Self {
        match method {
            OutlierMethodArg::None => OutlierMethod::None,
            OutlierMethodArg::Quantile => OutlierMethod::Quantile,
            OutlierMethodArg::QuantileAndDistance => OutlierMethod::QuantileAndDistance,
            OutlierMethodArg::Chauvenet => OutlierMethod::Chauvenet,
            OutlierMethodArg::LogInflection => OutlierMethod::LogInflection,
        }
    }
}

/// Column-level overrides applied before clustering
#[derive(Debug, Clone, Default)]
struct ColumnOverrides {
    use_columns: Option<Vec<String>>,
    outlier_method: Option<OutlierMethod>,
    lower_bound: Option<f64>,
    upper_bound: Option<f64>,
}

/// Result of processing a single file
#[derive(Debug, Serialize)]
struct FileResult {
    filename: String,
    input_path: PathBuf,
    output_path: Option<PathBuf>,
    n_rows: usize,
    n_columns: usize,
    skipped_columns: Vec<String>,
    k: Option<usize>,
    n_unlabelled: usize,
    prep: Option<PrepReport>,
    processing_time_ms: u128,
    error: Option<String>,
}

impl FileResult {
    /// A file fails if it could not be read or written, or if any column failed
    fn failed(&self) -> bool {
        self.error.is_some() || self.prep.as_ref().is_some_and(|p| !p.is_success())
    }
}

/// Internal processing result
struct InternalResult {
    n_rows: usize,
    n_columns: usize,
    skipped_columns: Vec<String>,
    k: usize,
    n_unlabelled: usize,
    prep: PrepReport,
}

/// Collect all CSV files from input paths (handles files and directories)
fn collect_input_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let is_csv = |path: &Path| {
        path.extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
    };

    let mut files = Vec::new();
    for input in inputs {
        if input.is_file() {
            if is_csv(input.as_path()) {
                files.push(input.clone());
            } else {
                warn!("Skipping non-CSV input: {}", input.display());
            }
        } else if input.is_dir() {
            // Recursively find CSV files in directory
            for entry in walkdir::WalkDir::new(input) {
                let entry = entry?;
                let path = entry.path();
                if path.is_file() && is_csv(path) {
                    files.push(path.to_path_buf());
                }
            }
        } else {
            return Err(anyhow::anyhow!("Path does not exist: {}", input.display()));
        }
    }

    files.sort();
    Ok(files)
}

/// Read a CSV file, keeping only numeric columns
fn read_map_csv(path: &Path) -> Result<(DataFrame, Vec<String>)> {
    let data_frame = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let mut skipped = Vec::new();
    let numeric: Vec<Column> = data_frame
        .get_columns()
        .iter()
        .filter(|column| {
            let keep = is_numeric_dtype(column.dtype());
            if !keep {
                warn!(
                    "Skipping non-numeric column '{}' ({}) in {}",
                    column.name(),
                    column.dtype(),
                    path.display()
                );
                skipped.push(column.name().to_string());
            }
            keep
        })
        .cloned()
        .collect();

    Ok((DataFrame::new(numeric)?, skipped))
}

fn write_map_csv(table: &AttributeTable, path: &Path) -> Result<()> {
    let mut data_frame = table.data_frame().clone();
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut data_frame)?;
    Ok(())
}

/// Select columns and apply overrides to a freshly loaded sample
fn apply_overrides(sample: &mut Sample, overrides: &ColumnOverrides) -> Result<()> {
    let analytes = sample.match_attribute(AttributeKey::DataType, FieldType::Analyte);
    let used: Vec<String> = match &overrides.use_columns {
        Some(requested) => {
            for column in requested {
                if !analytes.contains(column) {
                    warn!("Requested column '{}' is not an analyte in this file", column);
                }
            }
            requested
                .iter()
                .filter(|c| analytes.contains(c))
                .cloned()
                .collect()
        }
        None => analytes,
    };
    if used.is_empty() {
        return Err(anyhow::anyhow!("No analyte columns selected"));
    }
    debug!("Using {} analytes: {:?}", used.len(), used);
    sample.set_attribute(used.as_slice(), AttributeKey::Use, true)?;

    if let Some(method) = overrides.outlier_method {
        sample.set_attribute(used.as_slice(), AttributeKey::OutlierMethod, method)?;
    }
    // Upper first so raising the lower bound never crosses the old upper bound
    if let Some(upper) = overrides.upper_bound {
        sample.set_attribute(used.as_slice(), AttributeKey::UpperBound, upper)?;
    }
    if let Some(lower) = overrides.lower_bound {
        sample.set_attribute(used.as_slice(), AttributeKey::LowerBound, lower)?;
    }
    Ok(())
}

/// Process a single CSV file
fn process_single_file(
    input_path: &Path,
    output_dir: Option<&Path>,
    config: &ConditioningConfig,
    overrides: &ColumnOverrides,
) -> FileResult {
    let start_time = Instant::now();
    let filename = input_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();

    let output_filename = input_path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| format!("{}_processed.csv", s))
        .unwrap_or_else(|| "processed.csv".to_string());
    let output_path = match output_dir {
        Some(dir) => dir.join(output_filename),
        None => input_path.with_file_name(output_filename),
    };

    match process_file_internal(input_path, &output_path, config, overrides) {
        Ok(result) => FileResult {
            filename,
            input_path: input_path.to_path_buf(),
            output_path: Some(output_path),
            n_rows: result.n_rows,
            n_columns: result.n_columns,
            skipped_columns: result.skipped_columns,
            k: Some(result.k),
            n_unlabelled: result.n_unlabelled,
            prep: Some(result.prep),
            processing_time_ms: start_time.elapsed().as_millis(),
            error: None,
        },
        Err(e) => FileResult {
            filename,
            input_path: input_path.to_path_buf(),
            output_path: None,
            n_rows: 0,
            n_columns: 0,
            skipped_columns: Vec::new(),
            k: None,
            n_unlabelled: 0,
            prep: None,
            processing_time_ms: start_time.elapsed().as_millis(),
            error: Some(format!("{e:#}")),
        },
    }
}

/// Internal function to process a single file (called from process_single_file)
fn process_file_internal(
    input_path: &Path,
    output_path: &Path,
    config: &ConditioningConfig,
    overrides: &ColumnOverrides,
) -> Result<InternalResult> {
    let (data_frame, skipped_columns) = read_map_csv(input_path)?;
    let raw = AttributeTable::from_data_frame(&data_frame)?;
    info!(
        "Loaded {}: {} rows x {} columns",
        input_path.display(),
        raw.n_rows(),
        raw.n_columns()
    );

    let sample_id = input_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("sample");
    let mut sample = Sample::new(sample_id, raw, config.clone())?;
    apply_overrides(&mut sample, overrides)?;

    let clusters = sample.compute_clusters()?;
    let (k, n_unlabelled) = (clusters.k, clusters.n_invalid());
    let prep = sample.prep_data(&PrepScope::All)?;

    write_map_csv(sample.processed(), output_path)?;
    info!("Wrote {}", output_path.display());

    Ok(InternalResult {
        n_rows: sample.processed().n_rows(),
        n_columns: sample.processed().n_columns(),
        skipped_columns,
        k,
        n_unlabelled,
        prep,
    })
}

/// Settings file first, then command-line overrides
fn build_config(args: &Cli) -> Result<ConditioningConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid settings in {}", path.display()))?
        }
        None => ConditioningConfig::default(),
    };
    if let Some(method) = args.negative_method {
        config.negative_method = method.into();
    }
    if let Some(max_clusters) = args.max_clusters {
        config.max_clusters = max_clusters;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    config.validate()?;
    Ok(config)
}

fn write_reports(report_path: &Path, results: &[FileResult], total_time: f64) -> Result<()> {
    if results.len() == 1 {
        std::fs::write(report_path, serde_json::to_string_pretty(&results[0])?)?;
    } else if report_path.is_dir() || report_path.extension().is_none() {
        // Directory: save individual reports
        std::fs::create_dir_all(report_path)?;
        for result in results {
            let path = report_path.join(format!("{}.json", result.filename));
            std::fs::write(&path, serde_json::to_string_pretty(result)?)?;
        }
    } else {
        let combined_report = serde_json::json!({
            "total_files": results.len(),
            "failed": results.iter().filter(|r| r.failed()).count(),
            "total_time_seconds": total_time,
            "results": results,
        });
        std::fs::write(report_path, serde_json::to_string_pretty(&combined_report)?)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing subscriber with environment filter
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    println!("LaME prep - map data conditioning");
    println!("=================================\n");

    let start_time = Instant::now();
    let config = build_config(&args)?;
    let overrides = ColumnOverrides {
        use_columns: args.use_columns.clone(),
        outlier_method: args.outlier_method.map(Into::into),
        lower_bound: args.lower_bound,
        upper_bound: args.upper_bound,
    };

    let input_files = collect_input_files(&args.input)?;
    if input_files.is_empty() {
        eprintln!("Error: No CSV files found");
        std::process::exit(1);
    }
    println!("Found {} file(s) to process\n", input_files.len());

    if let Some(ref output_dir) = args.output {
        std::fs::create_dir_all(output_dir)?;
    }

    let progress = ProgressBar::new(input_files.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    // Process files in parallel
    let results: Vec<FileResult> = input_files
        .par_iter()
        .map(|input_path| {
            let result =
                process_single_file(input_path, args.output.as_deref(), &config, &overrides);
            progress.set_message(result.filename.clone());
            progress.inc(1);
            result
        })
        .collect();
    progress.finish_and_clear();

    let total_time = start_time.elapsed().as_secs_f64();
    let failed: Vec<&FileResult> = results.iter().filter(|r| r.failed()).collect();

    println!("Processing complete");
    println!("   Processed: {} file(s)", results.len());
    println!("   Successful: {}", results.len() - failed.len());
    if !failed.is_empty() {
        println!("   Failed: {}", failed.len());
    }
    println!("   Total time: {:.2}s\n", total_time);

    if args.verbose {
        println!("Results:");
        for result in results.iter().filter(|r| r.error.is_none()) {
            println!(
                "   {}: {} rows, k = {}, {} columns conditioned",
                result.filename,
                result.n_rows,
                result.k.unwrap_or(1),
                result.prep.as_ref().map_or(0, |p| p.processed.len())
            );
        }
        println!();
    }

    if !failed.is_empty() {
        eprintln!("Errors:");
        for result in &failed {
            if let Some(error) = &result.error {
                eprintln!("   {}: {}", result.filename, error);
            }
            for failure in result.prep.iter().flat_map(|p| &p.failures) {
                eprintln!("   {} [{}]: {}", result.filename, failure.column, failure.error);
            }
        }
        eprintln!();
    }

    if let Some(ref report_path) = args.report {
        write_reports(report_path, &results, total_time)?;
        info!("Saved report to {}", report_path.display());
    }

    // Exit with error code if any files failed
    if !failed.is_empty() {
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_csv(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lame_prep_{}_{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_read_map_csv_skips_text_columns() {
        let dir = temp_dir("read");
        let path = write_csv(
            &dir,
            "map.csv",
            "Xc,Yc,Mineral,Si29\n0,0,qz,10.5\n1,0,qz,11.0\n2,0,cal,-1.0\n",
        );
        let (data_frame, skipped) = read_map_csv(&path).unwrap();
        assert_eq!(skipped, vec!["Mineral"]);
        assert_eq!(data_frame.width(), 3);
        assert_eq!(data_frame.height(), 3);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_collect_input_files_walks_directories() {
        let dir = temp_dir("collect");
        write_csv(&dir, "a.csv", "Si29\n1\n");
        write_csv(&dir, "b.CSV", "Si29\n1\n");
        write_csv(&dir, "notes.txt", "hello");
        let files = collect_input_files(&[dir.clone()]).unwrap();
        assert_eq!(files.len(), 2);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_process_file_writes_output() {
        let dir = temp_dir("process");
        let mut body = String::from("Xc,Yc,Si29,Ca44\n");
        for i in 0..40 {
            let si = if i == 7 { 9000.0 } else { 100.0 + f64::from(i % 6) };
            body.push_str(&format!("{},{},{},{}\n", i % 8, i / 8, si, 20.0 + f64::from(i % 3)));
        }
        let input = write_csv(&dir, "map.csv", &body);

        let result = process_single_file(
            &input,
            None,
            &ConditioningConfig::default(),
            &ColumnOverrides::default(),
        );
        assert!(result.error.is_none(), "{:?}", result.error);
        assert!(!result.failed());
        assert_eq!(result.n_rows, 40);
        assert_eq!(result.prep.as_ref().unwrap().processed, vec!["Si29", "Ca44"]);

        let output = dir.join("map_processed.csv");
        assert_eq!(result.output_path.as_deref(), Some(output.as_path()));
        let (written, _) = read_map_csv(&output).unwrap();
        assert_eq!(written.height(), 40);
        assert_eq!(written.width(), 4);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_unknown_use_columns_are_an_error() {
        let dir = temp_dir("use");
        let input = write_csv(&dir, "map.csv", "Xc,Yc,Si29\n0,0,1\n1,0,2\n");
        let overrides = ColumnOverrides {
            use_columns: Some(vec!["Mg24".to_string()]),
            ..Default::default()
        };
        let result =
            process_single_file(&input, None, &ConditioningConfig::default(), &overrides);
        assert!(result.failed());
        assert!(result.error.unwrap().contains("No analyte columns"));
        std::fs::remove_dir_all(dir).ok();
    }
}
