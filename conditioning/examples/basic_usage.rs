use lame_conditioning::{ConditioningConfigBuilder, PrepScope, Result, Sample};
use lame_table::{AttributeKey, AttributeTable};

/// Example conditioning a small synthetic map
fn main() -> Result<()> {
    println!("=== LaME conditioning example ===\n");

    // 1. Build a raw table
    let raw = create_synthetic_map()?;
    println!("Loaded map:");
    println!("  Pixels: {}", raw.n_rows());
    println!("  Columns: {:?}\n", raw.columns());

    // 2. Configure and select the analytes to use
    let config = ConditioningConfigBuilder::default()
        .max_clusters(6_usize)
        .seed(7_u64)
        .build()
        .map_err(|e| lame_conditioning::PrepError::ConfigError(e.to_string()))?;
    let mut sample = Sample::new("synthetic", raw, config)?;
    sample.set_attribute(&["Si29", "Ca44", "Sr88"], AttributeKey::Use, true)?;

    // 3. Cluster the pixels
    println!("Step 1: Clustering pixels...");
    let clusters = sample.compute_clusters()?;
    println!("  k = {} ({} unlabelled pixels)", clusters.k, clusters.n_invalid());
    for (i, inertia) in clusters.inertia.iter().enumerate() {
        println!("    k = {:>2}: inertia {:.3}", i + 1, inertia);
    }

    // 4. Add a ratio and condition everything
    println!("\nStep 2: Conditioning...");
    let ratio = sample.add_ratio("Sr88", "Ca44")?;
    let report = sample.prep_data(&PrepScope::All)?;
    println!("  Conditioned: {:?}", report.processed);
    println!("  Ratios: {:?}", report.ratios);
    println!("  Failures: {}", report.failures.len());

    // 5. Compare ranges
    println!("\n=== Ranges (raw -> processed) ===");
    for column in ["Si29", "Ca44", "Sr88"] {
        let raw = sample.raw().attributes(column)?;
        let processed = sample.processed().attributes(column)?;
        println!(
            "  {:<6} [{:.2}, {:.2}] -> [{:.2}, {:.2}]",
            column, raw.plot_min, raw.plot_max, processed.plot_min, processed.plot_max
        );
    }
    let ratio_attrs = sample.processed().attributes(&ratio)?;
    println!(
        "  {:<6} [{:.4}, {:.4}]",
        ratio_attrs.label, ratio_attrs.plot_min, ratio_attrs.plot_max
    );

    println!("\n=== Report ===");
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => println!("  could not serialize report: {e}"),
    }

    Ok(())
}

/// Two mineral domains with calibration noise and a couple of spikes
fn create_synthetic_map() -> Result<AttributeTable> {
    let side = 40;
    let n = side * side;
    let mut xc = Vec::with_capacity(n);
    let mut yc = Vec::with_capacity(n);
    let mut si = Vec::with_capacity(n);
    let mut ca = Vec::with_capacity(n);
    let mut sr = Vec::with_capacity(n);

    for i in 0..n {
        let (x, y) = ((i % side) as f64, (i / side) as f64);
        let wobble = ((i * 7919) % 97) as f64 / 97.0;
        let in_vein = (x - y).abs() < 6.0;
        xc.push(x);
        yc.push(y);
        si.push(if in_vein { 300.0 } else { 4000.0 } * (0.9 + 0.2 * wobble));
        ca.push(if in_vein { 2500.0 } else { 80.0 } * (0.9 + 0.2 * wobble));
        // Calibration noise near the detection limit
        sr.push(if i % 53 == 0 { -0.4 } else { 2.0 + 3.0 * wobble });
    }
    sr[100] = 5000.0;
    sr[900] = 8000.0;

    Ok(AttributeTable::from_columns(vec![
        ("Xc".to_string(), xc),
        ("Yc".to_string(), yc),
        ("Si29".to_string(), si),
        ("Ca44".to_string(), ca),
        ("Sr88".to_string(), sr),
    ])?)
}
