//! KFX document model and container codec.
//!
//! KFX is Amazon's Kindle format: a `CONT` container holding `ENTY`
//! records, each an Ion binary value that refers to a document-wide symbol
//! table.
//!
//! ## Module structure
//!
//! - `ion` - Ion binary reader and writer
//! - `symbols` - shared `YJ_symbols` catalog and document local symbols
//! - `fragment` - fragment values and the fragment list
//! - `prolog` - document prolog and per-entity payload encoding
//! - `anchors` - anchor fragments and external link ids
//! - `resources` - image and font resource fragments
//! - `capabilities` - format capabilities and header fragments
//! - `container` - `CONT`/`ENTY` packing and unpacking

pub mod anchors;
pub mod capabilities;
pub mod container;
pub mod fragment;
pub mod ion;
pub mod prolog;
pub mod resources;
pub mod symbols;

pub use anchors::{ExternalLinkRegistry, build_anchor_fragments};
pub use container::{PackOptions, Unpacked, pack, unpack};
pub use fragment::{Decimal, Fragment, FragmentList, StructBuilder, Value};
pub use prolog::Prolog;
pub use symbols::{LocalTable, SharedTable, sym};
