//! Named KFX styles and the registry that owns them.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};

use super::margins::Margins;
use super::values::dimension_value;
use crate::kfx::fragment::{Decimal, Fragment, Value};
use crate::kfx::symbols::sym;

/// A named set of KFX style properties.
///
/// Properties are keyed by symbol name and kept sorted so the emitted
/// style struct is byte-stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleDef {
    pub name: String,
    pub properties: BTreeMap<String, Value>,
}

impl StyleDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Set a property, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.properties.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.properties.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Union of properties; `other` wins per key.
    pub fn merge(&mut self, other: StyleDef) {
        self.properties.extend(other.properties);
    }

    /// Vertical margins that take part in collapsing.
    pub fn margins(&self) -> Margins {
        Margins {
            top: self.get(sym::MARGIN_TOP).and_then(ratio),
            bottom: self.get(sym::MARGIN_BOTTOM).and_then(ratio),
        }
    }

    /// `$157` fragment with the style name under `$173`.
    pub fn to_fragment(&self) -> Fragment {
        let mut fields = self.properties.clone();
        fields.insert(sym::STYLE_NAME.to_string(), Value::symbol(self.name.as_str()));
        Fragment::new(sym::STYLE, self.name.as_str(), Value::Struct(fields))
    }
}

/// Value of a ratio-unit dimension. Zero counts as no margin.
fn ratio(value: &Value) -> Option<f64> {
    if value.get(sym::UNIT).and_then(Value::as_symbol) != Some(sym::UNIT_RATIO) {
        return None;
    }
    let v = value.get(sym::VALUE).and_then(Value::as_decimal)?.to_f64();
    (v != 0.0).then_some(v)
}

/// Owns every style of a book.
///
/// Styles are looked up by name. Margin variants are deduplicated on
/// their full property set, so two nodes that end up with the same
/// properties share one style.
#[derive(Debug, Default)]
pub struct StyleRegistry {
    styles: Vec<StyleDef>,
    by_name: HashMap<String, usize>,
    /// Property fingerprint to candidate indices
    by_fingerprint: HashMap<u64, Vec<usize>>,
}

impl StyleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a style, merging into an existing one of the same name.
    pub fn register(&mut self, style: StyleDef) {
        let index = match self.by_name.get(&style.name) {
            Some(&index) => {
                self.styles[index].merge(style);
                index
            }
            None => {
                let index = self.styles.len();
                self.by_name.insert(style.name.clone(), index);
                self.styles.push(style);
                index
            }
        };
        let fingerprint = fingerprint(&self.styles[index].properties);
        self.by_fingerprint.entry(fingerprint).or_default().push(index);
    }

    pub fn get(&self, name: &str) -> Option<&StyleDef> {
        self.by_name.get(name).map(|&index| &self.styles[index])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    /// Styles in registration order.
    pub fn iter(&self) -> std::slice::Iter<'_, StyleDef> {
        self.styles.iter()
    }

    /// Name of a style equal to `base` except for its vertical margins.
    ///
    /// Reuses any registered style with exactly the resulting properties
    /// (including `base` itself); otherwise registers a new variant named
    /// `<base>-m<n>`. Returns `None` when `base` is unknown.
    pub fn variant(&mut self, base: &str, margins: Margins) -> Option<String> {
        let mut properties = self.get(base)?.properties.clone();
        set_margin(&mut properties, sym::MARGIN_TOP, margins.top);
        set_margin(&mut properties, sym::MARGIN_BOTTOM, margins.bottom);

        let fingerprint = fingerprint(&properties);
        if let Some(existing) = self.find_identical(fingerprint, &properties) {
            return Some(existing);
        }

        let name = (1..)
            .map(|n| format!("{base}-m{n}"))
            .find(|name| !self.contains(name))?;
        self.register(StyleDef {
            name: name.clone(),
            properties,
        });
        Some(name)
    }

    fn find_identical(
        &self,
        fingerprint: u64,
        properties: &BTreeMap<String, Value>,
    ) -> Option<String> {
        self.by_fingerprint
            .get(&fingerprint)?
            .iter()
            .map(|&index| &self.styles[index])
            .find(|style| &style.properties == properties)
            .map(|style| style.name.clone())
    }

    /// One `$157` fragment per style, in registration order.
    pub fn to_fragments(&self) -> Vec<Fragment> {
        self.styles.iter().map(StyleDef::to_fragment).collect()
    }
}

impl FromIterator<StyleDef> for StyleRegistry {
    fn from_iter<I: IntoIterator<Item = StyleDef>>(iter: I) -> Self {
        let mut registry = StyleRegistry::new();
        for style in iter {
            registry.register(style);
        }
        registry
    }
}

/// Margins in other units never collapse and are kept as declared.
fn set_margin(properties: &mut BTreeMap<String, Value>, key: &str, value: Option<f64>) {
    let declared_unit = properties
        .get(key)
        .and_then(|v| v.get(sym::UNIT))
        .and_then(Value::as_symbol);
    if declared_unit.is_some_and(|unit| unit != sym::UNIT_RATIO) {
        return;
    }
    match value.filter(|v| *v != 0.0).and_then(Decimal::from_f64) {
        Some(decimal) => {
            properties.insert(key.to_string(), dimension_value(decimal, sym::UNIT_RATIO));
        }
        None => {
            properties.remove(key);
        }
    }
}

fn fingerprint(properties: &BTreeMap<String, Value>) -> u64 {
    let mut hasher = DefaultHasher::new();
    for (key, value) in properties {
        key.hash(&mut hasher);
        hash_value(value, &mut hasher);
    }
    hasher.finish()
}

fn hash_value<H: Hasher>(value: &Value, hasher: &mut H) {
    std::mem::discriminant(value).hash(hasher);
    match value {
        Value::Null => {}
        Value::Bool(b) => b.hash(hasher),
        Value::Int(n) => n.hash(hasher),
        Value::Decimal(d) => d.hash(hasher),
        Value::String(s) | Value::Symbol(s) => s.hash(hasher),
        Value::Blob(bytes) => bytes.hash(hasher),
        Value::List(items) => {
            items.len().hash(hasher);
            for item in items {
                hash_value(item, hasher);
            }
        }
        Value::Struct(fields) => {
            fields.len().hash(hasher);
            for (key, field) in fields {
                key.hash(hasher);
                hash_value(field, hasher);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn margin(v: f64) -> Value {
        dimension_value(Decimal::from_f64(v).unwrap(), sym::UNIT_RATIO)
    }

    fn paragraph() -> StyleDef {
        let mut style = StyleDef::new("p");
        style.set(sym::TEXT_INDENT, dimension_value(Decimal::from_int(1), sym::UNIT_EM));
        style.set(sym::MARGIN_TOP, margin(0.5));
        style.set(sym::MARGIN_BOTTOM, margin(0.5));
        style
    }

    #[test]
    fn test_register_merges_by_name() {
        let mut registry = StyleRegistry::new();
        registry.register(paragraph());
        let mut override_style = StyleDef::new("p");
        override_style.set(sym::TEXT_ALIGNMENT, Value::symbol(sym::JUSTIFY));
        override_style.set(sym::MARGIN_TOP, margin(1.0));
        registry.register(override_style);

        assert_eq!(registry.len(), 1);
        let p = registry.get("p").unwrap();
        assert_eq!(p.properties.len(), 4);
        assert_eq!(p.margins(), Margins { top: Some(1.0), bottom: Some(0.5) });
    }

    #[test]
    fn test_variants_are_deduplicated() {
        let mut registry: StyleRegistry = [paragraph()].into_iter().collect();

        let unchanged = registry.variant("p", Margins { top: Some(0.5), bottom: Some(0.5) });
        assert_eq!(unchanged.as_deref(), Some("p"));

        let first = registry.variant("p", Margins { top: None, bottom: Some(0.5) }).unwrap();
        let again = registry.variant("p", Margins { top: Some(0.0), bottom: Some(0.5) }).unwrap();
        assert_eq!(first, "p-m1");
        assert_eq!(first, again);
        assert!(registry.get(&first).unwrap().get(sym::MARGIN_TOP).is_none());

        let second = registry.variant("p", Margins { top: Some(1.25), bottom: None }).unwrap();
        assert_eq!(second, "p-m2");
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.variant("missing", Margins::default()), None);
    }

    #[test]
    fn test_variant_name_avoids_existing_styles() {
        let mut registry = StyleRegistry::new();
        registry.register(paragraph());
        let mut taken = StyleDef::new("p-m1");
        taken.set(sym::FONT_SIZE, dimension_value(Decimal::from_int(2), sym::UNIT_EM));
        registry.register(taken);

        let name = registry.variant("p", Margins::default()).unwrap();
        assert_eq!(name, "p-m2");
    }

    #[test]
    fn test_margins_only_count_ratio_units() {
        let mut style = StyleDef::new("h1");
        style.set(sym::MARGIN_TOP, dimension_value(Decimal::from_int(2), sym::UNIT_EM));
        style.set(sym::MARGIN_BOTTOM, margin(0.0));
        assert_eq!(style.margins(), Margins::default());
    }

    #[test]
    fn test_variant_keeps_other_units() {
        let mut style = StyleDef::new("h1");
        style.set(sym::MARGIN_TOP, dimension_value(Decimal::from_int(2), sym::UNIT_EM));
        style.set(sym::MARGIN_BOTTOM, margin(1.0));
        let mut registry: StyleRegistry = [style].into_iter().collect();

        let name = registry.variant("h1", Margins { top: None, bottom: None }).unwrap();
        let variant = registry.get(&name).unwrap();
        assert!(variant.get(sym::MARGIN_TOP).is_some());
        assert!(variant.get(sym::MARGIN_BOTTOM).is_none());
    }

    #[test]
    fn test_to_fragments() {
        let registry: StyleRegistry = [paragraph()].into_iter().collect();
        let fragments = registry.to_fragments();
        assert_eq!(fragments.len(), 1);
        let fragment = &fragments[0];
        assert_eq!(fragment.ftype, sym::STYLE);
        assert_eq!(fragment.fid, "p");
        assert_eq!(
            fragment.value.get(sym::STYLE_NAME).and_then(Value::as_symbol),
            Some("p")
        );
        assert!(fragment.value.get(sym::TEXT_INDENT).is_some());
    }
}
