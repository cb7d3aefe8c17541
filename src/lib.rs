//! # fb2kfx
//!
//! Building blocks for converting FictionBook (FB2) documents to Amazon's
//! KFX format.
//!
//! ## Features
//!
//! - Ion binary encoding of fragment payloads against the `YJ_symbols` table
//! - `CONT`/`ENTY` container packing and unpacking
//! - CSS subset to KFX style conversion with margin collapsing
//! - Anchor, external link and image resource fragments
//!
//! ## Quick Start
//!
//! ```
//! use fb2kfx::kfx::{Fragment, PackOptions, Prolog, StructBuilder, pack, sym, unpack};
//! use fb2kfx::kfx::capabilities::default_capabilities;
//!
//! let style = StructBuilder::new()
//!     .symbol(sym::STYLE_NAME, "body")
//!     .symbol(sym::FONT_WEIGHT, sym::WEIGHT_BOLD)
//!     .build();
//! let fragments = vec![Fragment::new(sym::STYLE, "body", style)];
//!
//! let prolog = Prolog::for_fragments(&fragments);
//! let options = PackOptions::new().container_id("CR!EXAMPLE");
//! let bytes = pack(&fragments, &prolog, &default_capabilities(), &options).unwrap();
//!
//! let unpacked = unpack(&bytes).unwrap();
//! assert!(unpacked.fragment(sym::STYLE, "body").is_some());
//! ```
//!
//! ## Styles
//!
//! ```
//! use fb2kfx::css::{Stylesheet, StyleRegistry, convert_stylesheet};
//!
//! let sheet = Stylesheet::parse("p { margin: 1em 0; font-weight: bold }");
//! let converted = convert_stylesheet(&sheet);
//! let registry: StyleRegistry = converted.styles.into_iter().collect();
//! assert!(registry.get("p").is_some());
//! ```

pub mod css;
pub mod error;
pub mod format;
pub mod kfx;

pub use error::{Error, Result};
pub use format::OutputFormat;
