use crate::attributes::FieldType;
use crate::ratio::RatioSpec;
use once_cell::sync::Lazy;
use regex::Regex;

// Analyte names come out of instrument software as `Si29`, `29Si` or with a
// trailing unit/suffix such as `Si29_ppm`.
static SYMBOL_MASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<sym>[A-Z][a-z]?)(?P<mass>\d{1,3})(?:[_ ].*)?$")
        .expect("symbol-mass pattern is a valid regex")
});
static MASS_SYMBOL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<mass>\d{1,3})(?P<sym>[A-Z][a-z]?)(?:[_ ].*)?$")
        .expect("mass-symbol pattern is a valid regex")
});

/// Element symbol and isotope mass parsed from an analyte name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Isotope {
    pub symbol: String,
    pub mass: u16,
}

impl Isotope {
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let caps = SYMBOL_MASS
            .captures(name)
            .or_else(|| MASS_SYMBOL.captures(name))?;
        Some(Self {
            symbol: caps["sym"].to_string(),
            mass: caps["mass"].parse().ok()?,
        })
    }

    /// `²⁹Si` style label
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}{}", superscript(self.mass), self.symbol)
    }
}

fn superscript(n: u16) -> String {
    n.to_string()
        .chars()
        .map(|c| match c {
            '0' => '⁰',
            '1' => '¹',
            '2' => '²',
            '3' => '³',
            '4' => '⁴',
            '5' => '⁵',
            '6' => '⁶',
            '7' => '⁷',
            '8' => '⁸',
            '9' => '⁹',
            other => other,
        })
        .collect()
}

fn analyte_label(name: &str) -> String {
    Isotope::parse(name).map_or_else(|| name.to_string(), |iso| iso.label())
}

/// Human-readable axis label for a column
#[must_use]
pub fn axis_label(name: &str, data_type: FieldType, units: Option<&str>) -> String {
    let base = match data_type {
        FieldType::Coordinate => match name {
            "Xc" => "X".to_string(),
            "Yc" => "Y".to_string(),
            other => other.to_string(),
        },
        FieldType::Analyte => analyte_label(name),
        FieldType::Ratio => match RatioSpec::parse(name) {
            Ok(spec) => format!(
                "{} / {}",
                analyte_label(&spec.numerator),
                analyte_label(&spec.denominator)
            ),
            Err(_) => name.to_string(),
        },
        _ => name.to_string(),
    };

    match units {
        Some(u) if !u.is_empty() => format!("{base} ({u})"),
        _ => base,
    }
}

/// Direction used by [`round_outward`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundDirection {
    Down,
    Up,
}

/// Round to `sig_digits` significant digits, away from the data
///
/// Minimums are rounded down and maximums up so the rounded range always
/// contains the data. Zero and non-finite values are returned unchanged.
#[must_use]
pub fn round_outward(value: f64, sig_digits: i32, direction: RoundDirection) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let magnitude = value.abs().log10().floor() as i32;
    let factor = 10f64.powi(magnitude - sig_digits + 1);

    let mut scaled = value / factor;
    let nearest = scaled.round();
    if (scaled - nearest).abs() < 1e-9 {
        scaled = nearest;
    }

    let rounded = match direction {
        RoundDirection::Down => scaled.floor(),
        RoundDirection::Up => scaled.ceil(),
    };
    rounded * factor
}
