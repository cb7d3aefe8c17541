//! KFX symbol definitions and symbol table management.
//!
//! Every KFX document imports the `YJ_symbols` shared table (version 10).
//! Its symbols have no real text; they are written `$N`, where `N` is the
//! symbol's numeric ID. The shared table is therefore built from numbers
//! alone, and `"$411"` resolves to 411 without a lookup table. Document
//! specific names (fragment ids, style names) are appended after it as the
//! local region.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::kfx::fragment::{Fragment, Value};

/// Ion 1.0 system symbols, IDs 1..=9.
pub const SYSTEM_SYMBOLS: [&str; 9] = [
    "$ion",
    "$ion_1_0",
    "$ion_symbol_table",
    "name",
    "version",
    "imports",
    "symbols",
    "max_id",
    "$ion_shared_symbol_table",
];

/// Highest system symbol ID.
pub const SYSTEM_MAX_ID: u32 = SYSTEM_SYMBOLS.len() as u32;

/// Name of the KFX shared symbol table.
pub const YJ_SYMBOLS_NAME: &str = "YJ_symbols";

/// Shared table version used by current Kindle tooling.
pub const YJ_SYMBOLS_VERSION: i64 = 10;

/// Highest symbol ID defined by `YJ_symbols` version 10.
pub const YJ_MAX_ID: u32 = 851;

/// Symbol IDs the system table assigns to its own structural fields.
pub mod system {
    pub const ION_SYMBOL_TABLE: u32 = 3;
    pub const NAME: u32 = 4;
    pub const VERSION: u32 = 5;
    pub const IMPORTS: u32 = 6;
    pub const SYMBOLS: u32 = 7;
    pub const MAX_ID: u32 = 8;
}

/// Names of the `YJ_symbols` entries this crate emits.
pub mod sym {
    // Style properties
    pub const FONT_FAMILY: &str = "$11";
    pub const FONT_STYLE: &str = "$12";
    pub const FONT_WEIGHT: &str = "$13";
    pub const FONT_STRETCH: &str = "$15";
    pub const FONT_SIZE: &str = "$16";
    pub const TEXT_COLOR: &str = "$19";
    pub const BACKGROUND_COLOR: &str = "$21";
    pub const UNDERLINE: &str = "$23";
    pub const STRIKETHROUGH: &str = "$27";
    pub const LETTER_SPACING: &str = "$32";
    pub const WORD_SPACING: &str = "$33";
    pub const TEXT_ALIGNMENT: &str = "$34";
    pub const TEXT_INDENT: &str = "$36";
    pub const TEXT_TRANSFORM: &str = "$41";
    pub const LINE_HEIGHT: &str = "$42";
    pub const MARGIN_TOP: &str = "$47";
    pub const MARGIN_LEFT: &str = "$48";
    pub const MARGIN_BOTTOM: &str = "$49";
    pub const MARGIN_RIGHT: &str = "$50";
    pub const PADDING_TOP: &str = "$52";
    pub const PADDING_LEFT: &str = "$53";
    pub const PADDING_BOTTOM: &str = "$54";
    pub const PADDING_RIGHT: &str = "$55";
    pub const WIDTH: &str = "$56";
    pub const HEIGHT: &str = "$57";
    pub const FLOAT: &str = "$140";
    pub const BREAK_BEFORE: &str = "$133";
    pub const BREAK_AFTER: &str = "$134";
    pub const BREAK_INSIDE: &str = "$135";

    // Dimension struct fields and units
    pub const UNIT: &str = "$306";
    pub const VALUE: &str = "$307";
    pub const UNIT_EM: &str = "$308";
    pub const UNIT_RATIO: &str = "$310";
    pub const UNIT_PERCENT: &str = "$314";
    pub const UNIT_CM: &str = "$315";
    pub const UNIT_MM: &str = "$316";
    pub const UNIT_IN: &str = "$317";
    pub const UNIT_PT: &str = "$318";
    pub const UNIT_PX: &str = "$319";
    pub const UNIT_REM: &str = "$505";

    // Keyword values
    pub const TOP: &str = "$58";
    pub const LEFT: &str = "$59";
    pub const BOTTOM: &str = "$60";
    pub const RIGHT: &str = "$61";
    pub const CENTER: &str = "$320";
    pub const JUSTIFY: &str = "$321";
    pub const SOLID: &str = "$328";
    pub const NONE: &str = "$349";
    pub const NORMAL: &str = "$350";
    pub const ALWAYS: &str = "$352";
    pub const AVOID: &str = "$353";
    pub const WEIGHT_THIN: &str = "$355";
    pub const WEIGHT_ULTRA_LIGHT: &str = "$356";
    pub const WEIGHT_ULTRA_BOLD: &str = "$358";
    pub const WEIGHT_HEAVY: &str = "$359";
    pub const WEIGHT_BOLD: &str = "$361";
    pub const WEIGHT_SEMIBOLD: &str = "$362";
    pub const WEIGHT_LIGHT: &str = "$363";
    pub const WEIGHT_MEDIUM: &str = "$364";
    pub const UPPERCASE: &str = "$372";
    pub const LOWERCASE: &str = "$373";
    pub const TITLECASE: &str = "$374";
    pub const ITALIC: &str = "$382";
    pub const AUTO: &str = "$383";
    pub const OBLIQUE: &str = "$381";
    pub const START: &str = "$680";
    pub const END: &str = "$681";

    // Fragment types and fields
    pub const ID: &str = "$155";
    pub const STYLE: &str = "$157";
    pub const FORMAT: &str = "$161";
    pub const MIME: &str = "$162";
    pub const EXTERNAL_RESOURCE: &str = "$164";
    pub const LOCATION: &str = "$165";
    pub const FONT: &str = "$262";
    pub const STYLE_NAME: &str = "$173";
    pub const RESOURCE_NAME: &str = "$175";
    pub const ANCHOR_NAME: &str = "$180";
    pub const CONTAINS: &str = "$181";
    pub const POSITION: &str = "$183";
    pub const URI: &str = "$186";
    pub const METADATA: &str = "$258";
    pub const SECTION: &str = "$260";
    pub const ANCHOR: &str = "$266";
    pub const CONTAINER: &str = "$270";
    pub const FORMAT_PNG: &str = "$284";
    pub const FORMAT_JPG: &str = "$285";
    pub const FORMAT_GIF: &str = "$286";
    pub const NULL: &str = "$348";
    pub const CONTAINER_ID: &str = "$409";
    pub const COMPRESSION_TYPE: &str = "$410";
    pub const DRM_SCHEME: &str = "$411";
    pub const CHUNK_SIZE: &str = "$412";
    pub const INDEX_TABLE_OFFSET: &str = "$413";
    pub const INDEX_TABLE_LENGTH: &str = "$414";
    pub const DOC_SYMBOL_OFFSET: &str = "$415";
    pub const DOC_SYMBOL_LENGTH: &str = "$416";
    pub const RAW_MEDIA: &str = "$417";
    pub const RAW_FONT: &str = "$418";
    pub const WIDTH_PX: &str = "$422";
    pub const HEIGHT_PX: &str = "$423";
    pub const FEATURE_KEY: &str = "$492";
    pub const CONTENT_FEATURES: &str = "$585";
    pub const NAMESPACE: &str = "$586";
    pub const MAJOR_VERSION: &str = "$587";
    pub const MINOR_VERSION: &str = "$588";
    pub const VERSION_INFO: &str = "$589";
    pub const FEATURES: &str = "$590";
    pub const FORMAT_CAPABILITIES: &str = "$593";
    pub const FORMAT_CAPABILITIES_OFFSET: &str = "$594";
    pub const FORMAT_CAPABILITIES_LENGTH: &str = "$595";
    pub const AUXILIARY_DATA: &str = "$597";
    pub const KFX_ID: &str = "$598";
}

/// Fragment types whose payloads are stored as raw bytes.
pub const RAW_FRAGMENT_TYPES: [&str; 2] = [sym::RAW_MEDIA, sym::RAW_FONT];

/// Readable names for the shared symbols this crate emits, for dumps.
const SYMBOL_NAMES: &[(&str, &str)] = &[
    (sym::FONT_FAMILY, "font_family"),
    (sym::FONT_STYLE, "font_style"),
    (sym::FONT_WEIGHT, "font_weight"),
    (sym::FONT_SIZE, "font_size"),
    (sym::TEXT_COLOR, "text_color"),
    (sym::BACKGROUND_COLOR, "fill_color"),
    (sym::UNDERLINE, "underline"),
    (sym::STRIKETHROUGH, "strikethrough"),
    (sym::LETTER_SPACING, "letterspacing"),
    (sym::WORD_SPACING, "wordspacing"),
    (sym::TEXT_ALIGNMENT, "text_alignment"),
    (sym::TEXT_INDENT, "text_indent"),
    (sym::TEXT_TRANSFORM, "text_transform"),
    (sym::LINE_HEIGHT, "line_height"),
    (sym::MARGIN_TOP, "margin_top"),
    (sym::MARGIN_LEFT, "margin_left"),
    (sym::MARGIN_BOTTOM, "margin_bottom"),
    (sym::MARGIN_RIGHT, "margin_right"),
    (sym::PADDING_TOP, "padding_top"),
    (sym::PADDING_LEFT, "padding_left"),
    (sym::PADDING_BOTTOM, "padding_bottom"),
    (sym::PADDING_RIGHT, "padding_right"),
    (sym::WIDTH, "width"),
    (sym::HEIGHT, "height"),
    (sym::BREAK_BEFORE, "break_before"),
    (sym::BREAK_AFTER, "break_after"),
    (sym::BREAK_INSIDE, "break_inside"),
    (sym::FLOAT, "float"),
    (sym::UNIT, "unit"),
    (sym::VALUE, "value"),
    (sym::UNIT_EM, "em"),
    (sym::UNIT_RATIO, "lh"),
    (sym::UNIT_PERCENT, "percent"),
    (sym::UNIT_CM, "cm"),
    (sym::UNIT_MM, "mm"),
    (sym::UNIT_IN, "in"),
    (sym::UNIT_PT, "pt"),
    (sym::UNIT_PX, "px"),
    (sym::UNIT_REM, "rem"),
    (sym::ID, "id"),
    (sym::STYLE, "style"),
    (sym::FORMAT, "format"),
    (sym::MIME, "mime"),
    (sym::EXTERNAL_RESOURCE, "external_resource"),
    (sym::LOCATION, "location"),
    (sym::STYLE_NAME, "style_name"),
    (sym::RESOURCE_NAME, "resource_name"),
    (sym::ANCHOR_NAME, "anchor_name"),
    (sym::CONTAINS, "contains"),
    (sym::POSITION, "position"),
    (sym::URI, "uri"),
    (sym::METADATA, "metadata"),
    (sym::SECTION, "section"),
    (sym::ANCHOR, "anchor"),
    (sym::CONTAINER, "container"),
    (sym::CONTAINER_ID, "container_id"),
    (sym::RAW_MEDIA, "bcRawMedia"),
    (sym::RAW_FONT, "bcRawFont"),
    (sym::FONT, "font"),
    (sym::FONT_STRETCH, "font_stretch"),
    (sym::WIDTH_PX, "resource_width"),
    (sym::HEIGHT_PX, "resource_height"),
    (sym::CONTENT_FEATURES, "content_features"),
    (sym::FORMAT_CAPABILITIES, "format_capabilities"),
    (sym::AUXILIARY_DATA, "auxiliary_data"),
];

/// Readable name of a shared symbol such as `"$157"`, when known.
pub fn describe(symbol: &str) -> Option<&'static str> {
    SYMBOL_NAMES
        .iter()
        .find(|(text, _)| *text == symbol)
        .map(|(_, name)| *name)
}

/// Parse a `$N` symbol text into its numeric ID.
#[inline]
pub fn numeric_symbol(name: &str) -> Option<u32> {
    let digits = name.strip_prefix('$')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// An imported, externally fixed symbol table.
///
/// The table is defined by its size alone: the entry at index `N` has text
/// `"$<10+N>"` and occupies ID `10+N`, directly after the system symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedTable {
    name: String,
    version: i64,
    max_id: u32,
}

impl SharedTable {
    /// The `YJ_symbols` table ending at `max_id` (ID space, system symbols included).
    pub fn yj(max_id: u32) -> Self {
        Self {
            name: YJ_SYMBOLS_NAME.to_string(),
            version: YJ_SYMBOLS_VERSION,
            max_id: max_id.max(SYSTEM_MAX_ID),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    /// Highest ID occupied by this table.
    pub fn max_id(&self) -> u32 {
        self.max_id
    }

    /// Number of symbols the table contributes.
    pub fn len(&self) -> usize {
        (self.max_id - SYSTEM_MAX_ID) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text of the entry at `index` (0-based), if within the table.
    pub fn symbol(&self, index: usize) -> Option<String> {
        (index < self.len()).then(|| format!("${}", SYSTEM_MAX_ID as usize + 1 + index))
    }

    /// Iterate over all entries as `(id, text)`.
    pub fn iter(&self) -> impl Iterator<Item = (u32, String)> + '_ {
        (SYSTEM_MAX_ID + 1..=self.max_id).map(|id| (id, format!("${id}")))
    }

    fn contains_id(&self, id: u32) -> bool {
        id > SYSTEM_MAX_ID && id <= self.max_id
    }
}

impl Default for SharedTable {
    fn default() -> Self {
        SharedTable::yj(YJ_MAX_ID)
    }
}

/// Build the shared table whose IDs end at `max_id`.
pub fn build_shared_table(max_id: u32) -> SharedTable {
    SharedTable::yj(max_id)
}

/// Normalize a foreign document's declared `YJ_symbols` size.
///
/// Writers disagree on whether the import's `max_id` counts the nine Ion
/// system symbols. Three spellings of the canonical table occur in
/// practice:
///
/// - 851: the highest ID, system symbols included;
/// - 842: the number of shared symbols, system symbols excluded;
/// - 860: the highest ID with the system prefix counted twice.
///
/// All three map to [`YJ_MAX_ID`]. Any other size is rejected.
pub fn normalize_max_id(declared: i64) -> Result<u32> {
    const EXCLUDING_SYSTEM: i64 = (YJ_MAX_ID - SYSTEM_MAX_ID) as i64;
    const DOUBLE_COUNTED: i64 = (YJ_MAX_ID + SYSTEM_MAX_ID) as i64;

    match declared {
        d if d == YJ_MAX_ID as i64 => Ok(YJ_MAX_ID),
        EXCLUDING_SYSTEM => Ok(YJ_MAX_ID),
        DOUBLE_COUNTED => Ok(YJ_MAX_ID),
        other => Err(Error::InvalidSymbolTable(other)),
    }
}

/// Document symbol table: system symbols, one shared import, local symbols.
#[derive(Debug, Clone)]
pub struct LocalTable {
    shared: SharedTable,
    local_symbols: Vec<String>,
    symbol_map: HashMap<String, u32>,
}

impl LocalTable {
    /// Build a table appending each of `names` once, in order.
    ///
    /// Names that already resolve (system symbols, `$N` shared texts) and
    /// duplicates are skipped.
    pub fn build<I, S>(names: I, shared: SharedTable) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self {
            shared,
            local_symbols: Vec::new(),
            symbol_map: HashMap::new(),
        };
        for name in names {
            table.intern(name.as_ref());
        }
        table
    }

    /// Build a table from every symbol name the fragments reference (ids,
    /// types, struct keys and symbol values), in first-use order.
    pub fn from_fragments(fragments: &[Fragment], shared: SharedTable) -> Self {
        let mut names = Vec::new();
        for fragment in fragments {
            names.push(fragment.fid.as_str());
            names.push(fragment.ftype.as_str());
            collect_names(&fragment.value, &mut names);
        }
        Self::build(names, shared)
    }

    /// Rebuild a table exactly as a document declared it.
    ///
    /// Every declared symbol occupies the next ID even if its text repeats
    /// an earlier one; lookups by name return the first occurrence.
    pub fn from_declared(symbols: Vec<String>, shared: SharedTable) -> Self {
        let first = shared.max_id() + 1;
        let mut symbol_map = HashMap::with_capacity(symbols.len());
        for (i, name) in symbols.iter().enumerate() {
            symbol_map.entry(name.clone()).or_insert(first + i as u32);
        }
        Self {
            shared,
            local_symbols: symbols,
            symbol_map,
        }
    }

    fn intern(&mut self, name: &str) -> u32 {
        if let Some(id) = self.find_by_name(name) {
            return id;
        }
        let id = self.first_local_id() + self.local_symbols.len() as u32;
        self.local_symbols.push(name.to_string());
        self.symbol_map.insert(name.to_string(), id);
        id
    }

    pub fn shared(&self) -> &SharedTable {
        &self.shared
    }

    /// Local symbols in ID order.
    pub fn local_symbols(&self) -> &[String] {
        &self.local_symbols
    }

    /// ID of the first local symbol.
    pub fn first_local_id(&self) -> u32 {
        self.shared.max_id() + 1
    }

    /// Highest assigned ID.
    pub fn max_id(&self) -> u32 {
        self.shared.max_id() + self.local_symbols.len() as u32
    }

    pub fn find_by_name(&self, name: &str) -> Option<u32> {
        if let Some(pos) = SYSTEM_SYMBOLS.iter().position(|&s| s == name) {
            return Some(pos as u32 + 1);
        }
        if let Some(&id) = self.symbol_map.get(name) {
            return Some(id);
        }
        numeric_symbol(name).filter(|&id| id >= 1 && id <= self.shared.max_id())
    }

    pub fn find_by_id(&self, id: u32) -> Option<&str> {
        match id {
            0 => None,
            id if id <= SYSTEM_MAX_ID => Some(SYSTEM_SYMBOLS[id as usize - 1]),
            _ if self.shared.contains_id(id) => None,
            _ => self
                .local_symbols
                .get((id - self.first_local_id()) as usize)
                .map(String::as_str),
        }
    }

    /// Resolve a name, failing with [`Error::UnknownSymbol`].
    pub fn resolve(&self, name: &str) -> Result<u32> {
        self.find_by_name(name)
            .ok_or_else(|| Error::UnknownSymbol(name.to_string()))
    }

    /// Text for an ID; shared symbols render as `$N`.
    pub fn text(&self, id: u32) -> Result<String> {
        if self.shared.contains_id(id) {
            return Ok(format!("${id}"));
        }
        self.find_by_id(id)
            .map(str::to_string)
            .ok_or(Error::UnknownSymbolId(id))
    }
}

fn collect_names<'a>(value: &'a Value, names: &mut Vec<&'a str>) {
    match value {
        Value::Symbol(name) => names.push(name),
        Value::List(items) => items.iter().for_each(|item| collect_names(item, names)),
        Value::Struct(fields) => {
            for (key, item) in fields {
                names.push(key);
                collect_names(item, names);
            }
        }
        Value::Null
        | Value::Bool(_)
        | Value::Int(_)
        | Value::Decimal(_)
        | Value::String(_)
        | Value::Blob(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kfx::fragment::StructBuilder;

    #[test]
    fn test_shared_table_self_describing() {
        let shared = build_shared_table(YJ_MAX_ID);
        assert_eq!(shared.len(), 842);
        assert_eq!(shared.symbol(0).as_deref(), Some("$10"));
        assert_eq!(shared.symbol(841).as_deref(), Some("$851"));
        assert_eq!(shared.symbol(842), None);

        let table = LocalTable::build(Vec::<String>::new(), shared.clone());
        for (id, text) in shared.iter() {
            assert_eq!(numeric_symbol(&text), Some(id));
            assert_eq!(table.find_by_name(&text), Some(id));
            assert_eq!(table.text(id).unwrap(), text);
        }
    }

    #[test]
    fn test_local_symbols_appended_in_order() {
        let table =
            LocalTable::build(["c0", "s1", "c0", "$260", "name", "s2"], SharedTable::default());
        assert_eq!(table.local_symbols(), &["c0", "s1", "s2"]);
        assert_eq!(table.find_by_name("c0"), Some(852));
        assert_eq!(table.find_by_name("s2"), Some(854));
        assert_eq!(table.find_by_id(853), Some("s1"));
        assert_eq!(table.find_by_name("$260"), Some(260));
        assert_eq!(table.find_by_name("name"), Some(system::NAME));
        assert_eq!(table.max_id(), 854);
    }

    #[test]
    fn test_unknown_symbol_is_error() {
        let table = LocalTable::build(["known"], SharedTable::default());
        assert!(matches!(
            table.resolve("missing"),
            Err(Error::UnknownSymbol(ref s)) if s == "missing"
        ));
        // Past the shared range, "$N" is just a name like any other
        assert!(table.resolve("$900").is_err());
        assert!(matches!(table.text(999), Err(Error::UnknownSymbolId(999))));
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(sym::STYLE), Some("style"));
        assert_eq!(describe("$310"), Some("lh"));
        assert_eq!(describe("$999"), None);
    }

    #[test]
    fn test_normalize_max_id() {
        assert_eq!(normalize_max_id(851).unwrap(), 851);
        assert_eq!(normalize_max_id(842).unwrap(), 851);
        assert_eq!(normalize_max_id(860).unwrap(), 851);
        assert!(matches!(
            normalize_max_id(700),
            Err(Error::InvalidSymbolTable(700))
        ));
        assert!(normalize_max_id(0).is_err());
    }

    #[test]
    fn test_from_fragments_collects_first_use_order() {
        let fragments = vec![
            Fragment::new(
                sym::ANCHOR,
                "note1",
                StructBuilder::new()
                    .symbol(sym::ANCHOR_NAME, "note1")
                    .string(sym::URI, "x")
                    .build(),
            ),
            Fragment::new(
                sym::STYLE,
                "para",
                StructBuilder::new().symbol(sym::STYLE_NAME, "para").build(),
            ),
        ];
        let table = LocalTable::from_fragments(&fragments, SharedTable::default());
        assert_eq!(table.local_symbols(), &["note1", "para"]);
    }

    #[test]
    fn test_from_declared_keeps_positions() {
        let table = LocalTable::from_declared(
            vec!["a".into(), "a".into(), "b".into()],
            SharedTable::default(),
        );
        assert_eq!(table.find_by_name("a"), Some(852));
        assert_eq!(table.find_by_name("b"), Some(854));
        assert_eq!(table.find_by_id(853), Some("a"));
    }

    #[test]
    fn test_numeric_symbol() {
        assert_eq!(numeric_symbol("$411"), Some(411));
        assert_eq!(numeric_symbol("$"), None);
        assert_eq!(numeric_symbol("$ion"), None);
        assert_eq!(numeric_symbol("411"), None);
    }
}
