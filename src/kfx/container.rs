//! KFX container packing and unpacking.
//!
//! Container layout:
//! - Header: CONT magic + version + header_len + ci_offset + ci_len (18 bytes)
//! - Entity index table (indexed by $413/$414), 24 bytes per entity
//! - Document symbols Ion (indexed by $415/$416)
//! - Format capabilities Ion (indexed by $594/$595)
//! - Container info Ion (indexed by the fixed header)
//! - kfxgen info text
//! - Entity payloads, each ENTY-wrapped (offsets relative to header_len)
//!
//! All integers are little-endian.

use std::sync::atomic::{AtomicU64, Ordering};

use memchr::memmem;

use crate::error::{Error, Result};
use crate::kfx::capabilities::is_header_fragment;
use crate::kfx::fragment::{Fragment, StructBuilder, Value};
use crate::kfx::ion::{ION_MAGIC, IonParser};
use crate::kfx::prolog::{
    Prolog, marshal_annotated_payload, marshal_payload, unmarshal_annotated_with_prolog,
    unmarshal_with_prolog,
};
use crate::kfx::symbols::{LocalTable, RAW_FRAGMENT_TYPES, SharedTable, sym, system};

const CONTAINER_MAGIC: &[u8; 4] = b"CONT";
const ENTITY_MAGIC: &[u8; 4] = b"ENTY";
const CONTAINER_VERSION: u16 = 2;
const ENTITY_VERSION: u16 = 1;
const HEADER_SIZE: usize = 18;
const ENTITY_HEADER_SIZE: usize = 10;
const INDEX_ROW_SIZE: usize = 24;

/// Index id used by singleton fragments (`$348`).
const SINGLETON_ID: u32 = 348;

pub const DEFAULT_CHUNK_SIZE: i64 = 4096;

/// Settings for [`pack`].
#[derive(Debug, Clone)]
pub struct PackOptions {
    /// Container id; a fresh one is generated when unset
    pub container_id: Option<String>,
    pub application_version: String,
    pub package_version: String,
    pub chunk_size: i64,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            container_id: None,
            application_version: env!("CARGO_PKG_NAME").to_string(),
            package_version: format!("{}-{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl PackOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn container_id(mut self, id: impl Into<String>) -> Self {
        self.container_id = Some(id.into());
        self
    }

    pub fn application_version(mut self, version: impl Into<String>) -> Self {
        self.application_version = version.into();
        self
    }

    pub fn package_version(mut self, version: impl Into<String>) -> Self {
        self.package_version = version.into();
        self
    }

    pub fn chunk_size(mut self, size: i64) -> Self {
        self.chunk_size = size;
        self
    }
}

/// Generate a container id: `CR!` followed by 28 uppercase base-36 characters.
pub fn generate_container_id() -> String {
    static CALLS: AtomicU64 = AtomicU64::new(0);

    let nanos = {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0)
    };
    let mut state = nanos ^ ((CALLS.fetch_add(1, Ordering::Relaxed) as u128) << 64);

    const CHARS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut id = String::from("CR!");
    for _ in 0..28 {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        id.push(CHARS[((state >> 64) % 36) as usize] as char);
    }
    id
}

struct Entity {
    id: u32,
    type_id: u32,
    data: Vec<u8>,
}

/// Entity info stored in every ENTY header: no compression, no DRM.
fn entity_info(prolog: &Prolog) -> Result<Vec<u8>> {
    let info = StructBuilder::new()
        .int(sym::COMPRESSION_TYPE, 0)
        .int(sym::DRM_SCHEME, 0)
        .build();
    marshal_payload(&info, prolog)
}

fn wrap_entity(info: &[u8], payload: &[u8]) -> Vec<u8> {
    let header_len = ENTITY_HEADER_SIZE + info.len();
    let mut data = Vec::with_capacity(header_len + payload.len());
    data.extend_from_slice(ENTITY_MAGIC);
    data.extend_from_slice(&ENTITY_VERSION.to_le_bytes());
    data.extend_from_slice(&(header_len as u32).to_le_bytes());
    data.extend_from_slice(info);
    data.extend_from_slice(payload);
    data
}

fn encode_entity(fragment: &Fragment, prolog: &Prolog, info: &[u8]) -> Result<Entity> {
    let table = prolog.table();
    let type_id = table.resolve(&fragment.ftype)?;
    let id = if fragment.is_singleton() {
        SINGLETON_ID
    } else {
        match table.resolve(&fragment.fid)? {
            SINGLETON_ID => {
                return Err(Error::ReservedFragmentId {
                    ftype: fragment.ftype.clone(),
                    fid: fragment.fid.clone(),
                });
            }
            id => id,
        }
    };

    let payload = if fragment.is_raw() {
        fragment
            .as_raw()
            .ok_or_else(|| Error::RawFragmentNotBlob {
                ftype: fragment.ftype.clone(),
                fid: fragment.fid.clone(),
            })?
            .to_vec()
    } else {
        marshal_payload(&fragment.value, prolog)?
    };

    Ok(Entity {
        id,
        type_id,
        data: wrap_entity(info, &payload),
    })
}

/// Serialize fragments into a KFX container.
///
/// Every fragment id and type must be in the prolog's symbol table.
/// Entities are ordered by `(type, id)` so the output does not depend on the
/// order of `fragments`. `$270` and `$593` fragments are header data and
/// are not stored as entities.
pub fn pack(
    fragments: &[Fragment],
    prolog: &Prolog,
    capabilities: &Value,
    options: &PackOptions,
) -> Result<Vec<u8>> {
    let container_id = options
        .container_id
        .clone()
        .unwrap_or_else(generate_container_id);
    let info = entity_info(prolog)?;

    let mut entities = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        if is_header_fragment(&fragment.ftype) {
            tracing::debug!(ftype = %fragment.ftype, "not storing header fragment as entity");
            continue;
        }
        entities.push(encode_entity(fragment, prolog, &info)?);
    }
    entities.sort_by_key(|e| (e.type_id, e.id));
    for pair in entities.windows(2) {
        if (pair[0].type_id, pair[0].id) == (pair[1].type_id, pair[1].id) {
            let table = prolog.table();
            return Err(Error::DuplicateFragment {
                ftype: table.text(pair[0].type_id)?,
                fid: table.text(pair[0].id)?,
            });
        }
    }

    let mut index = Vec::with_capacity(entities.len() * INDEX_ROW_SIZE);
    let mut entity_data = Vec::new();
    for entity in &entities {
        index.extend_from_slice(&entity.id.to_le_bytes());
        index.extend_from_slice(&entity.type_id.to_le_bytes());
        index.extend_from_slice(&(entity_data.len() as u64).to_le_bytes());
        index.extend_from_slice(&(entity.data.len() as u64).to_le_bytes());
        entity_data.extend_from_slice(&entity.data);
    }

    let doc_symbols = prolog.doc_symbols();
    let format_caps =
        marshal_annotated_payload(capabilities, &[sym::FORMAT_CAPABILITIES], prolog)?;

    let index_offset = HEADER_SIZE;
    let doc_symbols_offset = index_offset + index.len();
    let format_caps_offset = doc_symbols_offset + doc_symbols.len();
    let container_info_offset = format_caps_offset + format_caps.len();

    let container_info = StructBuilder::new()
        .string(sym::CONTAINER_ID, container_id.as_str())
        .int(sym::COMPRESSION_TYPE, 0)
        .int(sym::DRM_SCHEME, 0)
        .int(sym::CHUNK_SIZE, options.chunk_size)
        .int(sym::INDEX_TABLE_OFFSET, index_offset as i64)
        .int(sym::INDEX_TABLE_LENGTH, index.len() as i64)
        .int(sym::DOC_SYMBOL_OFFSET, doc_symbols_offset as i64)
        .int(sym::DOC_SYMBOL_LENGTH, doc_symbols.len() as i64)
        .int(sym::FORMAT_CAPABILITIES_OFFSET, format_caps_offset as i64)
        .int(sym::FORMAT_CAPABILITIES_LENGTH, format_caps.len() as i64)
        .build();
    let container_info = marshal_payload(&container_info, prolog)?;

    let payload_sha1 = sha1_smol::Sha1::from(&entity_data).hexdigest();
    let kfxgen_info = kfxgen_info(&[
        ("kfxgen_package_version", options.package_version.as_str()),
        ("kfxgen_application_version", options.application_version.as_str()),
        ("kfxgen_payload_sha1", payload_sha1.as_str()),
        ("kfxgen_acr", container_id.as_str()),
    ]);

    let header_len = container_info_offset + container_info.len() + kfxgen_info.len();

    let mut output = Vec::with_capacity(header_len + entity_data.len());
    output.extend_from_slice(CONTAINER_MAGIC);
    output.extend_from_slice(&CONTAINER_VERSION.to_le_bytes());
    output.extend_from_slice(&(header_len as u32).to_le_bytes());
    output.extend_from_slice(&(container_info_offset as u32).to_le_bytes());
    output.extend_from_slice(&(container_info.len() as u32).to_le_bytes());
    output.extend_from_slice(&index);
    output.extend_from_slice(doc_symbols);
    output.extend_from_slice(&format_caps);
    output.extend_from_slice(&container_info);
    output.extend_from_slice(kfxgen_info.as_bytes());
    output.extend_from_slice(&entity_data);

    tracing::debug!(
        container_id = %container_id,
        entities = entities.len(),
        header_len,
        total = output.len(),
        "packed container"
    );
    Ok(output)
}

/// kfxgen info block: `[{key:k,value:v},...]`, unquoted.
fn kfxgen_info(entries: &[(&str, &str)]) -> String {
    let body: Vec<String> = entries
        .iter()
        .map(|(key, value)| format!("{{key:{key},value:{value}}}"))
        .collect();
    format!("[{}]", body.join(","))
}

fn parse_kfxgen_info(text: &str) -> Vec<(String, String)> {
    text.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split('}')
        .filter_map(|entry| {
            let entry = entry.trim_start_matches([',', '{']).trim();
            let rest = entry.strip_prefix("key:")?;
            let (key, value) = rest.split_once(",value:")?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// A named byte range of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub name: &'static str,
    pub offset: usize,
    pub length: usize,
}

/// Decoded container, for inspection and tests.
#[derive(Debug, Clone)]
pub struct Unpacked {
    pub container_id: String,
    pub version: u16,
    pub header_len: usize,
    pub chunk_size: i64,
    pub sections: Vec<Section>,
    /// Fragments in index order
    pub fragments: Vec<Fragment>,
    /// Local symbols declared by the document
    pub symbols: Vec<String>,
    pub capabilities: Value,
    /// kfxgen key/value pairs
    pub metadata: Vec<(String, String)>,
}

impl Unpacked {
    pub fn fragment(&self, ftype: &str, fid: &str) -> Option<&Fragment> {
        self.fragments
            .iter()
            .find(|f| f.ftype == ftype && f.fid == fid)
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn section(&self, name: &str) -> Option<Section> {
        self.sections.iter().copied().find(|s| s.name == name)
    }
}

// --- Bounds-checked readers ---

fn read_u16_le(data: &[u8], offset: usize) -> Result<u16> {
    data.get(offset..offset + 2)
        .and_then(|b| b.try_into().ok())
        .map(u16::from_le_bytes)
        .ok_or_else(|| Error::malformed(offset, "truncated u16"))
}

fn read_u32_le(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| Error::malformed(offset, "truncated u32"))
}

fn read_u64_le(data: &[u8], offset: usize) -> Result<u64> {
    data.get(offset..offset + 8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or_else(|| Error::malformed(offset, "truncated u64"))
}

/// `data[offset..offset + length]`, or an error naming `what`.
fn checked_range<'a>(data: &'a [u8], offset: usize, length: usize, what: &str) -> Result<&'a [u8]> {
    offset
        .checked_add(length)
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| {
            Error::malformed(
                offset,
                format!("{what} ({length} bytes) exceeds {} available bytes", data.len()),
            )
        })
}

fn int_field(info: &Value, key: &str) -> Option<usize> {
    info.get(key)
        .and_then(Value::as_int)
        .and_then(|n| usize::try_from(n).ok())
}

/// BVM-prefixed blocks in the header region as `(offset, length)`, each
/// running up to the next marker.
fn find_ion_blocks(header: &[u8], start: usize) -> Vec<(usize, usize)> {
    let finder = memmem::Finder::new(&ION_MAGIC);
    let starts: Vec<usize> = finder
        .find_iter(header.get(start..).unwrap_or(&[]))
        .map(|pos| start + pos)
        .collect();
    starts
        .iter()
        .enumerate()
        .map(|(i, &offset)| {
            let end = starts.get(i + 1).copied().unwrap_or(header.len());
            (offset, end - offset)
        })
        .collect()
}

/// Locate a header section from its container info fields, or failing
/// that, by searching for a BVM block whose first value carries
/// `annotation`.
fn locate_section(
    data: &[u8],
    header_len: usize,
    info: &Value,
    (offset_key, length_key): (&str, &str),
    blocks: &[(usize, usize)],
    annotation: u32,
    what: &str,
) -> Result<Option<(usize, usize)>> {
    if let (Some(offset), Some(length)) =
        (int_field(info, offset_key), int_field(info, length_key))
    {
        let block = checked_range(&data[..header_len], offset, length, what)?;
        if !block.starts_with(&ION_MAGIC) {
            return Err(Error::malformed(offset, format!("{what} has no Ion version marker")));
        }
        return Ok(Some((offset, length)));
    }

    for &(offset, length) in blocks {
        let block = &data[offset..offset + length];
        if block.get(4).is_some_and(|b| b >> 4 == 0xE)
            && IonParser::new(block)
                .parse()
                .is_ok_and(|v| v.annotations().first() == Some(&annotation))
        {
            tracing::debug!(what, offset, "located section by marker search");
            return Ok(Some((offset, length)));
        }
    }
    Ok(None)
}

/// Parse a KFX container produced by [`pack`] (or a compatible writer).
pub fn unpack(data: &[u8]) -> Result<Unpacked> {
    if data.len() < HEADER_SIZE {
        return Err(Error::malformed(0, "data shorter than container header"));
    }
    if &data[..4] != CONTAINER_MAGIC {
        return Err(Error::malformed(0, "missing CONT signature"));
    }
    let version = read_u16_le(data, 4)?;
    if version != CONTAINER_VERSION {
        return Err(Error::malformed(4, format!("unsupported container version {version}")));
    }
    let header_len = read_u32_le(data, 6)? as usize;
    let ci_offset = read_u32_le(data, 10)? as usize;
    let ci_length = read_u32_le(data, 14)? as usize;

    if header_len < HEADER_SIZE || header_len > data.len() {
        return Err(Error::malformed(
            6,
            format!("header length {header_len} outside 18..={}", data.len()),
        ));
    }
    let header = &data[..header_len];

    // Container info only uses shared symbols
    let bare = Prolog::from_table(LocalTable::build(Vec::<String>::new(), SharedTable::default()));
    let ci_bytes = checked_range(header, ci_offset, ci_length, "container info")?;
    let info = unmarshal_with_prolog(ci_bytes, &bare)?;

    let mut sections = vec![Section {
        name: "container_info",
        offset: ci_offset,
        length: ci_length,
    }];

    let blocks = find_ion_blocks(header, HEADER_SIZE);

    let doc_symbols = locate_section(
        data,
        header_len,
        &info,
        (sym::DOC_SYMBOL_OFFSET, sym::DOC_SYMBOL_LENGTH),
        &blocks,
        system::ION_SYMBOL_TABLE,
        "document symbols",
    )?
    .ok_or_else(|| Error::malformed(HEADER_SIZE, "no document symbols"))?;
    sections.push(Section {
        name: "doc_symbols",
        offset: doc_symbols.0,
        length: doc_symbols.1,
    });
    let prolog = Prolog::from_doc_symbols(&data[doc_symbols.0..doc_symbols.0 + doc_symbols.1])?;
    let table = prolog.table();

    let format_caps_id = table.resolve(sym::FORMAT_CAPABILITIES)?;
    let capabilities = match locate_section(
        data,
        header_len,
        &info,
        (sym::FORMAT_CAPABILITIES_OFFSET, sym::FORMAT_CAPABILITIES_LENGTH),
        &blocks,
        format_caps_id,
        "format capabilities",
    )? {
        Some((offset, length)) => {
            sections.push(Section {
                name: "format_capabilities",
                offset,
                length,
            });
            unmarshal_annotated_with_prolog(&data[offset..offset + length], &prolog)?.1
        }
        None => Value::Null,
    };

    let (index_offset, index_length) = match (
        int_field(&info, sym::INDEX_TABLE_OFFSET),
        int_field(&info, sym::INDEX_TABLE_LENGTH),
    ) {
        (Some(offset), Some(length)) => (offset, length),
        _ => return Err(Error::malformed(ci_offset, "container info has no index table")),
    };
    let index = checked_range(header, index_offset, index_length, "index table")?;
    if index.len() % INDEX_ROW_SIZE != 0 {
        return Err(Error::malformed(
            index_offset,
            format!(
                "index table length {} is not a multiple of {INDEX_ROW_SIZE}",
                index.len()
            ),
        ));
    }
    sections.push(Section {
        name: "index",
        offset: index_offset,
        length: index_length,
    });

    let ci_end = ci_offset + ci_length;
    let metadata = std::str::from_utf8(&header[ci_end..])
        .map(parse_kfxgen_info)
        .unwrap_or_default();
    if !metadata.is_empty() {
        sections.push(Section {
            name: "kfxgen_info",
            offset: ci_end,
            length: header_len - ci_end,
        });
    }
    sections.push(Section {
        name: "entities",
        offset: header_len,
        length: data.len() - header_len,
    });
    sections.sort_by_key(|s| s.offset);

    let mut fragments = Vec::with_capacity(index.len() / INDEX_ROW_SIZE);
    for row in 0..index.len() / INDEX_ROW_SIZE {
        let base = row * INDEX_ROW_SIZE;
        let id = read_u32_le(index, base)?;
        let type_id = read_u32_le(index, base + 4)?;
        let offset = read_u64_le(index, base + 8)?;
        let size = read_u64_le(index, base + 16)?;

        let start = usize::try_from(offset)
            .ok()
            .and_then(|o| o.checked_add(header_len))
            .ok_or_else(|| Error::malformed(index_offset + base + 8, "entity offset overflow"))?;
        let size = usize::try_from(size)
            .map_err(|_| Error::malformed(index_offset + base + 16, "entity size overflow"))?;
        let entity = checked_range(data, start, size, "entity")?;

        let payload = entity_payload(entity, start)?;
        let ftype = table.text(type_id)?;
        let fid = if id == SINGLETON_ID {
            ftype.clone()
        } else {
            table.text(id)?
        };

        let fragment = if RAW_FRAGMENT_TYPES.contains(&ftype.as_str()) {
            Fragment::raw(ftype, fid, payload.to_vec())
        } else {
            let value = unmarshal_with_prolog(payload, &prolog)?;
            Fragment::new(ftype, fid, value)
        };
        fragments.push(fragment);
    }

    let container_id = info
        .get(sym::CONTAINER_ID)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let chunk_size = info
        .get(sym::CHUNK_SIZE)
        .and_then(Value::as_int)
        .unwrap_or(DEFAULT_CHUNK_SIZE);

    tracing::debug!(
        container_id = %container_id,
        entities = fragments.len(),
        symbols = table.local_symbols().len(),
        "unpacked container"
    );

    Ok(Unpacked {
        container_id,
        version,
        header_len,
        chunk_size,
        sections,
        fragments,
        symbols: table.local_symbols().to_vec(),
        capabilities,
        metadata,
    })
}

/// Validate an ENTY header and return the payload after it.
fn entity_payload(entity: &[u8], offset: usize) -> Result<&[u8]> {
    if entity.len() < ENTITY_HEADER_SIZE {
        return Err(Error::malformed(offset, "entity shorter than its header"));
    }
    if &entity[..4] != ENTITY_MAGIC {
        return Err(Error::malformed(offset, "missing ENTY signature"));
    }
    let version = read_u16_le(entity, 4)?;
    if version != ENTITY_VERSION {
        return Err(Error::malformed(
            offset + 4,
            format!("unsupported entity version {version}"),
        ));
    }
    let header_len = read_u32_le(entity, 6)? as usize;
    if header_len < ENTITY_HEADER_SIZE || header_len > entity.len() {
        return Err(Error::malformed(
            offset + 6,
            format!("entity header length {header_len} outside 10..={}", entity.len()),
        ));
    }
    Ok(&entity[header_len..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kfx::capabilities::default_capabilities;

    fn sample_fragments() -> Vec<Fragment> {
        vec![
            Fragment::new(
                sym::ANCHOR,
                "note1",
                StructBuilder::new()
                    .symbol(sym::ANCHOR_NAME, "note1")
                    .structure(sym::POSITION, StructBuilder::new().int(sym::ID, 1042)),
            ),
            Fragment::new(
                sym::STYLE,
                "s1J",
                StructBuilder::new()
                    .symbol(sym::STYLE_NAME, "s1J")
                    .symbol(sym::FONT_WEIGHT, sym::WEIGHT_BOLD),
            ),
            Fragment::raw(sym::RAW_MEDIA, "resource/rsrc1", vec![0xFF, 0xD8, 0xFF, 0xD9]),
        ]
    }

    fn pack_sample() -> (Vec<Fragment>, Vec<u8>) {
        let fragments = sample_fragments();
        let prolog = Prolog::for_fragments(&fragments);
        let options = PackOptions::new().container_id("CR!TEST");
        let bytes = pack(&fragments, &prolog, &default_capabilities(), &options).unwrap();
        (fragments, bytes)
    }

    #[test]
    fn test_container_id_format() {
        let id = generate_container_id();
        assert!(id.starts_with("CR!"));
        assert_eq!(id.len(), 31);
        assert!(
            id[3..]
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()),
            "Container ID should only contain uppercase alphanumeric: {id}"
        );
        assert_ne!(generate_container_id(), generate_container_id());
    }

    #[test]
    fn test_header_layout() {
        let (_, bytes) = pack_sample();
        assert_eq!(&bytes[..4], b"CONT");
        assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), 2);
        let header_len = read_u32_le(&bytes, 6).unwrap() as usize;
        assert!(header_len <= bytes.len());
        assert_eq!(&bytes[header_len..header_len + 4], b"ENTY");
        // First index row starts right after the fixed header
        assert_eq!(read_u64_le(&bytes, HEADER_SIZE + 8).unwrap(), 0);
    }

    #[test]
    fn test_round_trip() {
        let (fragments, bytes) = pack_sample();
        let unpacked = unpack(&bytes).unwrap();

        assert_eq!(unpacked.container_id, "CR!TEST");
        assert_eq!(unpacked.version, 2);
        assert_eq!(unpacked.fragments.len(), fragments.len());
        for fragment in &fragments {
            let decoded = unpacked.fragment(&fragment.ftype, &fragment.fid).unwrap();
            assert_eq!(decoded, fragment);
        }
        assert_eq!(unpacked.capabilities, default_capabilities());
        assert_eq!(unpacked.metadata("kfxgen_acr"), Some("CR!TEST"));
        assert_eq!(
            unpacked.metadata("kfxgen_payload_sha1").map(str::len),
            Some(40)
        );
        assert!(unpacked.symbols.contains(&"note1".to_string()));
    }

    #[test]
    fn test_entities_sorted_by_type_then_id() {
        let (_, bytes) = pack_sample();
        let unpacked = unpack(&bytes).unwrap();
        let types: Vec<&str> = unpacked.fragments.iter().map(|f| f.ftype.as_str()).collect();
        assert_eq!(types, [sym::STYLE, sym::ANCHOR, sym::RAW_MEDIA]);
    }

    #[test]
    fn test_singleton_uses_null_id() {
        let fragments = vec![Fragment::singleton(
            sym::CONTENT_FEATURES,
            StructBuilder::new().list(sym::FEATURES, vec![]),
        )];
        let prolog = Prolog::for_fragments(&fragments);
        let options = PackOptions::new().container_id("CR!S");
        let bytes = pack(&fragments, &prolog, &Value::List(vec![]), &options).unwrap();
        assert_eq!(read_u32_le(&bytes, HEADER_SIZE).unwrap(), SINGLETON_ID);

        let unpacked = unpack(&bytes).unwrap();
        assert!(unpacked.fragments[0].is_singleton());
        assert_eq!(unpacked.fragments[0].fid, sym::CONTENT_FEATURES);
    }

    #[test]
    fn test_header_fragments_not_stored() {
        let mut fragments = sample_fragments();
        fragments.push(Fragment::singleton(sym::FORMAT_CAPABILITIES, default_capabilities()));
        let prolog = Prolog::for_fragments(&fragments);
        let options = PackOptions::new().container_id("CR!H");
        let bytes = pack(&fragments, &prolog, &default_capabilities(), &options).unwrap();
        assert_eq!(unpack(&bytes).unwrap().fragments.len(), 3);
    }

    #[test]
    fn test_unknown_symbol_aborts() {
        let fragments = sample_fragments();
        let prolog = Prolog::for_fragments(&fragments[..1]);
        let err = pack(&fragments, &prolog, &Value::Null, &PackOptions::new()).unwrap_err();
        assert!(matches!(err, Error::UnknownSymbol(_)));
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut fragments = sample_fragments();
        fragments.push(fragments[0].clone());
        let prolog = Prolog::for_fragments(&fragments);
        let err = pack(&fragments, &prolog, &Value::Null, &PackOptions::new()).unwrap_err();
        assert!(matches!(err, Error::DuplicateFragment { ref fid, .. } if fid == "note1"));
    }

    #[test]
    fn test_reserved_id_rejected() {
        let fragments = vec![Fragment::new(
            sym::STYLE,
            sym::NULL,
            StructBuilder::new().symbol(sym::STYLE_NAME, "x"),
        )];
        let prolog = Prolog::for_fragments(&fragments);
        let err = pack(&fragments, &prolog, &Value::Null, &PackOptions::new()).unwrap_err();
        assert!(matches!(err, Error::ReservedFragmentId { ref fid, .. } if fid == sym::NULL));
    }

    #[test]
    fn test_missing_index_table_rejected() {
        let (_, mut bytes) = pack_sample();
        let ci_offset = read_u32_le(&bytes, 10).unwrap() as usize;
        let ci_length = read_u32_le(&bytes, 14).unwrap() as usize;

        // Rewrite container info in place without $413/$414
        let bare =
            Prolog::from_table(LocalTable::build(Vec::<String>::new(), SharedTable::default()));
        let info = unmarshal_with_prolog(&bytes[ci_offset..ci_offset + ci_length], &bare).unwrap();
        let mut fields = info.as_struct().unwrap().clone();
        fields.remove(sym::INDEX_TABLE_OFFSET);
        fields.remove(sym::INDEX_TABLE_LENGTH);
        let stripped = marshal_payload(&Value::Struct(fields), &bare).unwrap();
        assert!(stripped.len() < ci_length);
        bytes[ci_offset..ci_offset + stripped.len()].copy_from_slice(&stripped);
        bytes[14..18].copy_from_slice(&(stripped.len() as u32).to_le_bytes());

        let err = unpack(&bytes).unwrap_err();
        assert!(
            matches!(err, Error::MalformedContainer { offset, .. } if offset == ci_offset),
            "{err}"
        );
    }

    #[test]
    fn test_raw_fragment_must_be_blob() {
        let fragments = vec![Fragment::new(sym::RAW_MEDIA, "img", Value::Int(1))];
        let prolog = Prolog::for_fragments(&fragments);
        let err = pack(&fragments, &prolog, &Value::Null, &PackOptions::new()).unwrap_err();
        assert!(matches!(err, Error::RawFragmentNotBlob { .. }));
    }

    #[test]
    fn test_rejects_bad_signature_and_version() {
        let (_, mut bytes) = pack_sample();
        bytes[4] = 3;
        assert!(matches!(
            unpack(&bytes),
            Err(Error::MalformedContainer { offset: 4, .. })
        ));
        bytes[0] = b'X';
        assert!(matches!(
            unpack(&bytes),
            Err(Error::MalformedContainer { offset: 0, .. })
        ));
        assert!(unpack(b"CONT").is_err());
    }

    #[test]
    fn test_rejects_bad_entity_header() {
        let (_, mut bytes) = pack_sample();
        let header_len = read_u32_le(&bytes, 6).unwrap() as usize;
        bytes[header_len] = b'X';
        let err = unpack(&bytes).unwrap_err();
        assert!(err.to_string().contains("ENTY"));
    }

    #[test]
    fn test_kfxgen_info_format() {
        let text = kfxgen_info(&[("kfxgen_acr", "CR!A"), ("kfxgen_package_version", "1")]);
        assert_eq!(text, "[{key:kfxgen_acr,value:CR!A},{key:kfxgen_package_version,value:1}]");
        assert_eq!(
            parse_kfxgen_info(&text),
            [
                ("kfxgen_acr".to_string(), "CR!A".to_string()),
                ("kfxgen_package_version".to_string(), "1".to_string())
            ]
        );
    }

    #[test]
    fn test_locates_sections_without_offsets() {
        let prolog = Prolog::for_fragments(&[]);
        let caps =
            marshal_annotated_payload(&default_capabilities(), &[sym::FORMAT_CAPABILITIES], &prolog)
                .unwrap();
        let mut header = vec![0u8; HEADER_SIZE];
        header.extend_from_slice(prolog.doc_symbols());
        header.extend_from_slice(&caps);
        let blocks = find_ion_blocks(&header, HEADER_SIZE);
        assert_eq!(blocks[0], (HEADER_SIZE, prolog.doc_symbols().len()));

        let found = locate_section(
            &header,
            header.len(),
            &Value::Null,
            (sym::FORMAT_CAPABILITIES_OFFSET, sym::FORMAT_CAPABILITIES_LENGTH),
            &blocks,
            593,
            "format capabilities",
        )
        .unwrap();
        assert_eq!(found, Some((HEADER_SIZE + prolog.doc_symbols().len(), caps.len())));
    }
}
