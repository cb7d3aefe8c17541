//! Bookkeeping fragments: format capabilities, content features, the
//! container description and auxiliary data.

use crate::kfx::fragment::{Fragment, StructBuilder, Value};
use crate::kfx::symbols::sym;

/// One format capability entry (`{$492: key, version: n}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatFeature {
    pub key: String,
    pub version: i64,
}

impl FormatFeature {
    pub fn new(key: impl Into<String>, version: i64) -> Self {
        Self {
            key: key.into(),
            version,
        }
    }
}

/// Features every generated book declares.
pub fn default_features() -> Vec<FormatFeature> {
    vec![FormatFeature::new("kfxgen.textBlock", 1)]
}

/// Capabilities value stored in the container header.
///
/// A zero version is omitted from its entry.
pub fn capabilities_value(features: &[FormatFeature]) -> Value {
    Value::List(
        features
            .iter()
            .map(|f| {
                let entry = StructBuilder::new().string(sym::FEATURE_KEY, f.key.as_str());
                if f.version != 0 {
                    entry.int("version", f.version).build()
                } else {
                    entry.build()
                }
            })
            .collect(),
    )
}

pub fn default_capabilities() -> Value {
    capabilities_value(&default_features())
}

fn feature(key: &str, namespace: &str, major: i64) -> Value {
    StructBuilder::new()
        .string(sym::FEATURE_KEY, key)
        .string(sym::NAMESPACE, namespace)
        .structure(
            sym::VERSION_INFO,
            StructBuilder::new().structure(
                "version",
                StructBuilder::new()
                    .int(sym::MAJOR_VERSION, major)
                    .int(sym::MINOR_VERSION, 0),
            ),
        )
        .build()
}

/// `$585` content features for reflowable text.
pub fn content_features_fragment(reflow_section_size: i64) -> Fragment {
    const YJ_CONVERSION: &str = "com.amazon.yjconversion";
    let features = vec![
        feature("reflow-style", YJ_CONVERSION, 1),
        feature("reflow-section-size", YJ_CONVERSION, reflow_section_size),
        feature("reflow-language-expansion", YJ_CONVERSION, 1),
        feature("CanonicalFormat", "SDK.Marker", 1),
    ];
    Fragment::singleton(
        sym::CONTENT_FEATURES,
        StructBuilder::new().list(sym::FEATURES, features),
    )
}

/// `$270` container description.
///
/// The container stores this information in its header instead of an
/// entity; the fragment exists for inspection tools. `contains` lists the
/// `(type, id)` of every stored fragment.
pub fn container_fragment(
    container_id: &str,
    chunk_size: i64,
    application_version: &str,
    package_version: &str,
    contains: &[Fragment],
) -> Fragment {
    let mut container = StructBuilder::new()
        .string(sym::CONTAINER_ID, container_id)
        .int(sym::CHUNK_SIZE, chunk_size)
        .int(sym::COMPRESSION_TYPE, 0)
        .int(sym::DRM_SCHEME, 0)
        .string(sym::MAJOR_VERSION, application_version)
        .string(sym::MINOR_VERSION, package_version)
        .string(sym::FORMAT, "KFX main");

    let entities: Vec<Value> = contains
        .iter()
        .filter(|f| !is_header_fragment(&f.ftype))
        .map(|f| Value::symbol_list([f.ftype.as_str(), f.fid.as_str()]))
        .collect();
    if !entities.is_empty() {
        container = container.list(sym::CONTAINS, entities);
    }
    Fragment::singleton(sym::CONTAINER, container)
}

/// Fragment types kept in the container header rather than as entities.
pub fn is_header_fragment(ftype: &str) -> bool {
    ftype == sym::CONTAINER || ftype == sym::FORMAT_CAPABILITIES
}

/// `$597` auxiliary data marking `target` as a target section.
///
/// The fragment id gets an `-ad` suffix since fragment ids must be unique
/// across types; the target itself is stored under `$598`.
pub fn auxiliary_data_fragment(target: &str, metadata: Vec<(String, Value)>) -> Fragment {
    let fid = format!("{target}-ad");
    let mut entries = vec![
        StructBuilder::new()
            .string(sym::FEATURE_KEY, "IS_TARGET_SECTION")
            .set(sym::VALUE, Value::Bool(true))
            .build(),
    ];
    entries.extend(metadata.into_iter().map(|(key, value)| {
        StructBuilder::new()
            .string(sym::FEATURE_KEY, key)
            .set(sym::VALUE, value)
            .build()
    }));
    Fragment::new(
        sym::AUXILIARY_DATA,
        fid.as_str(),
        StructBuilder::new()
            .list(sym::METADATA, entries)
            .string(sym::KFX_ID, fid.as_str()),
    )
}
