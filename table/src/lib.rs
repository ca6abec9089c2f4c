//! Attribute table for laser-ablation geochemical map data
//!
//! A map is stored as N rows (pixels) by M named numeric columns in a Polars
//! `DataFrame`, with a typed [`ColumnAttributes`] record per column describing
//! what the column holds and how it should be conditioned and displayed.
//!
//! ```rust
//! use lame_table::{AttributeKey, AttributeTable, FieldType};
//!
//! let mut table = AttributeTable::from_columns(vec![
//!     ("Xc".to_string(), vec![0.0, 1.0, 2.0]),
//!     ("Yc".to_string(), vec![0.0, 0.0, 0.0]),
//!     ("Si29".to_string(), vec![120.0, 98.0, 143.0]),
//! ])?;
//! table.set_attribute(&["Si29"], AttributeKey::Use, true)?;
//!
//! let used = table.match_attributes(&[
//!     (AttributeKey::DataType, FieldType::Analyte.into()),
//!     (AttributeKey::Use, true.into()),
//! ]);
//! assert_eq!(used, vec!["Si29".to_string()]);
//! # Ok::<(), lame_table::TableError>(())
//! ```

pub use attributes::{
    AttributeKey, AttributeValue, ColumnAttributes, FieldType, NegativeMethod, OutlierMethod,
};
pub use error::{Result, TableError};
pub use label::{Isotope, RoundDirection, axis_label, round_outward};
pub use ratio::RatioSpec;
pub use table::{AttributeTable, finite_range, is_numeric_dtype};
pub use transform::{Norm, Transformable};

pub mod attributes;
pub mod error;
pub mod label;
pub mod ratio;
pub mod table;
pub mod transform;
