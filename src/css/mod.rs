//! CSS to KFX style conversion.
//!
//! The pipeline runs in four stages:
//!
//! 1. [`Stylesheet::parse`] turns CSS text into simple rules, one per
//!    selector, plus warnings for constructs that cannot be expressed.
//! 2. [`convert_rule`] maps each rule's declarations to KFX style properties.
//! 3. [`convert_stylesheet`] merges rules that derive the same style name.
//!    Later rules win per property. This is plain override-on-merge, not CSS
//!    specificity.
//! 4. [`MarginTree`] collapses vertical margins once content layout is known
//!    and rewrites content styles into deduplicated variants.
//!
//! Problems found along the way are reported as warnings and never abort
//! a conversion.

mod convert;
mod margins;
mod parser;
mod selector;
mod style;
mod values;

pub use convert::{
    ConversionResult, StylesheetConversion, convert_declaration, convert_rule, convert_stylesheet,
};
pub use margins::{
    ContainerFlags, ContainerKind, ContentKind, MarginTree, Margins, NodeId, collapse_values,
};
pub use parser::{CssRule, FontFace, Stylesheet};
pub use selector::{PseudoElement, Selector};
pub use style::{StyleDef, StyleRegistry};
pub use values::{CssValue, color_value, dimension, dimension_value, parse_color};
pub(crate) use values::{font_style, font_weight};

use thiserror::Error;

/// Why a single declaration could not be converted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("unsupported property: {0}")]
    UnsupportedProperty(String),

    #[error("unsupported unit '{unit}' for {property}")]
    UnsupportedUnit { property: String, unit: String },

    #[error("unsupported value '{value}' for {property}")]
    InvalidValue { property: String, value: String },

    #[error("invalid shorthand value: {0}")]
    InvalidShorthand(String),
}

impl ConversionError {
    pub(crate) fn invalid(property: &str, value: &CssValue) -> Self {
        ConversionError::InvalidValue {
            property: property.to_string(),
            value: value.raw.clone(),
        }
    }
}
