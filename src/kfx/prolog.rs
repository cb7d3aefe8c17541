//! Document prolog and per-entity payload encoding.
//!
//! Every entity payload in a KFX container is an Ion stream that, on its
//! own, only carries the version marker: the local symbol table is stored
//! once in the container header as the document symbols. To encode an
//! entity we therefore write `BVM + symbol table + value` with a regular
//! Ion writer, check that the prefix is exactly the document prolog, and
//! keep `BVM + value`. Decoding splices the prolog back in front.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::kfx::fragment::{Fragment, Value};
use crate::kfx::ion::{ION_MAGIC, IonParser, IonValue, IonWriter};
use crate::kfx::symbols::{
    LocalTable, SharedTable, YJ_SYMBOLS_NAME, normalize_max_id, system,
};

/// Encoded document prolog plus the symbol table it declares.
#[derive(Debug, Clone)]
pub struct Prolog {
    bytes: Vec<u8>,
    table: LocalTable,
}

impl Prolog {
    /// Encode the local symbol table importing `shared`.
    pub fn build(local_symbols: &[String], shared: &SharedTable) -> Self {
        Self::from_table(LocalTable::from_declared(
            local_symbols.to_vec(),
            shared.clone(),
        ))
    }

    /// Prolog declaring every symbol name used by `fragments`.
    ///
    /// Fragments are visited in `(type, id)` order, so the local symbol IDs
    /// do not depend on the order of the slice.
    pub fn for_fragments(fragments: &[Fragment]) -> Self {
        let mut sorted = fragments.to_vec();
        sorted.sort_by(|a, b| (&a.ftype, &a.fid).cmp(&(&b.ftype, &b.fid)));
        Self::from_table(LocalTable::from_fragments(&sorted, SharedTable::default()))
    }

    pub fn from_table(table: LocalTable) -> Self {
        let mut writer = IonWriter::new();
        writer.write_bvm();
        writer.write_value(&symbol_table_value(&table));
        Self {
            bytes: writer.into_bytes(),
            table,
        }
    }

    /// Decode a document symbols blob (as stored in a container header).
    ///
    /// A missing or foreign import falls back to an empty shared region;
    /// a `YJ_symbols` import with an unrecognized size is an error.
    pub fn from_doc_symbols(data: &[u8]) -> Result<Self> {
        let values = IonParser::new(data).parse_all()?;
        let lst = values
            .iter()
            .find(|v| v.annotations().first() == Some(&system::ION_SYMBOL_TABLE))
            .ok_or_else(|| Error::ion(0, "document symbols contain no symbol table"))?
            .unwrap_annotated();

        let mut shared = SharedTable::yj(0);
        if let Some(imports) = lst.get(system::IMPORTS).and_then(IonValue::as_list) {
            for import in imports {
                let name = import.get(system::NAME).and_then(IonValue::as_string);
                if name != Some(YJ_SYMBOLS_NAME) {
                    tracing::debug!(?name, "ignoring unknown shared table import");
                    continue;
                }
                let declared = import
                    .get(system::MAX_ID)
                    .and_then(IonValue::as_int)
                    .ok_or(Error::InvalidSymbolTable(0))?;
                shared = SharedTable::yj(normalize_max_id(declared)?);
            }
        }

        let symbols = lst
            .get(system::SYMBOLS)
            .and_then(IonValue::as_list)
            .unwrap_or(&[])
            .iter()
            .map(|s| s.as_string().unwrap_or_default().to_string())
            .collect();

        Ok(Self::from_table(LocalTable::from_declared(symbols, shared)))
    }

    /// `BVM + annotated symbol table struct`.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The blob stored as the container's document symbols.
    pub fn doc_symbols(&self) -> &[u8] {
        &self.bytes
    }

    pub fn table(&self) -> &LocalTable {
        &self.table
    }
}

fn symbol_table_value(table: &LocalTable) -> IonValue {
    let shared = table.shared();
    let import = IonValue::Struct(vec![
        (system::NAME, IonValue::String(shared.name().to_string())),
        (system::VERSION, IonValue::Int(shared.version())),
        (system::MAX_ID, IonValue::Int(shared.max_id() as i64)),
    ]);
    let symbols = table
        .local_symbols()
        .iter()
        .map(|s| IonValue::String(s.clone()))
        .collect();
    IonValue::Annotated(
        vec![system::ION_SYMBOL_TABLE],
        Box::new(IonValue::Struct(vec![
            (system::IMPORTS, IonValue::List(vec![import])),
            (system::SYMBOLS, IonValue::List(symbols)),
        ])),
    )
}

/// Encode `value` as an entity payload: `BVM + value`.
pub fn marshal_payload(value: &Value, prolog: &Prolog) -> Result<Vec<u8>> {
    marshal_annotated_payload(value, &[], prolog)
}

/// Encode `value` wrapped in `annotations` as an entity payload.
pub fn marshal_annotated_payload(
    value: &Value,
    annotations: &[&str],
    prolog: &Prolog,
) -> Result<Vec<u8>> {
    let table = prolog.table();
    let ion = to_ion(value, table)?;
    let ids = annotations
        .iter()
        .map(|a| table.resolve(a))
        .collect::<Result<Vec<_>>>()?;

    let mut writer = IonWriter::new();
    writer.write_bvm();
    writer.write_value(&symbol_table_value(table));
    writer.write_annotated(&ids, &ion);
    let full = writer.into_bytes();

    let rest = full
        .strip_prefix(prolog.bytes())
        .ok_or(Error::PrologMismatch)?;
    let mut out = Vec::with_capacity(ION_MAGIC.len() + rest.len());
    out.extend_from_slice(&ION_MAGIC);
    out.extend_from_slice(rest);
    Ok(out)
}

/// Decode an entity payload, discarding any annotations.
pub fn unmarshal_with_prolog(bytes: &[u8], prolog: &Prolog) -> Result<Value> {
    unmarshal_annotated_with_prolog(bytes, prolog).map(|(_, value)| value)
}

/// Decode an entity payload into its annotation names and value.
pub fn unmarshal_annotated_with_prolog(
    bytes: &[u8],
    prolog: &Prolog,
) -> Result<(Vec<String>, Value)> {
    let body = bytes
        .strip_prefix(&ION_MAGIC[..])
        .ok_or(Error::MissingVersionMarker)?;

    let mut spliced = Vec::with_capacity(prolog.bytes().len() + body.len());
    spliced.extend_from_slice(prolog.bytes());
    spliced.extend_from_slice(body);

    let table = prolog.table();
    let value = IonParser::new(&spliced)
        .parse_all()?
        .into_iter()
        .find(|v| v.annotations().first() != Some(&system::ION_SYMBOL_TABLE))
        .ok_or_else(|| Error::ion(prolog.bytes().len(), "payload contains no value"))?;

    let annotations = value
        .annotations()
        .iter()
        .map(|&id| table.text(id))
        .collect::<Result<Vec<_>>>()?;
    Ok((annotations, from_ion(value.unwrap_annotated(), table)?))
}

/// Map symbol names to IDs.
pub fn to_ion(value: &Value, table: &LocalTable) -> Result<IonValue> {
    Ok(match value {
        Value::Null => IonValue::Null,
        Value::Bool(b) => IonValue::Bool(*b),
        Value::Int(n) => IonValue::Int(*n),
        Value::Decimal(d) => IonValue::Decimal(*d),
        Value::String(s) => IonValue::String(s.clone()),
        Value::Symbol(name) => IonValue::Symbol(table.resolve(name)?),
        Value::Blob(bytes) => IonValue::Blob(bytes.clone()),
        Value::List(items) => IonValue::List(
            items
                .iter()
                .map(|item| to_ion(item, table))
                .collect::<Result<_>>()?,
        ),
        Value::Struct(fields) => IonValue::Struct(
            fields
                .iter()
                .map(|(key, item)| Ok((table.resolve(key)?, to_ion(item, table)?)))
                .collect::<Result<_>>()?,
        ),
    })
}

/// Map symbol IDs back to names.
///
/// Annotations below the top level have no place in [`Value`] and are
/// dropped.
pub fn from_ion(value: &IonValue, table: &LocalTable) -> Result<Value> {
    Ok(match value {
        IonValue::Null => Value::Null,
        IonValue::Bool(b) => Value::Bool(*b),
        IonValue::Int(n) => Value::Int(*n),
        IonValue::Decimal(d) => Value::Decimal(*d),
        IonValue::String(s) => Value::String(s.clone()),
        IonValue::Symbol(id) => Value::Symbol(table.text(*id)?),
        IonValue::Blob(bytes) => Value::Blob(bytes.clone()),
        IonValue::List(items) => Value::List(
            items
                .iter()
                .map(|item| from_ion(item, table))
                .collect::<Result<_>>()?,
        ),
        IonValue::Struct(fields) => {
            let mut map = BTreeMap::new();
            for (key, item) in fields {
                map.insert(table.text(*key)?, from_ion(item, table)?);
            }
            Value::Struct(map)
        }
        IonValue::Annotated(_, inner) => {
            tracing::debug!("dropping nested annotation");
            from_ion(inner, table)?
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kfx::fragment::{Decimal, StructBuilder};
    use crate::kfx::symbols::sym;

    fn prolog(names: &[&str]) -> Prolog {
        let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        Prolog::build(&names, &SharedTable::default())
    }

    #[test]
    fn test_prolog_layout() {
        let p = prolog(&["c0"]);
        assert_eq!(&p.bytes()[..4], &ION_MAGIC);
        // $ion_symbol_table annotation wrapper follows the version marker
        assert_eq!(p.bytes()[4] >> 4, 0xE);
        assert_eq!(p.doc_symbols(), p.bytes());
        assert_eq!(p.table().find_by_name("c0"), Some(852));
    }

    #[test]
    fn test_marshal_strips_prolog() {
        let p = prolog(&["c0"]);
        let payload = marshal_payload(&Value::Int(5), &p).unwrap();
        assert_eq!(payload, [0xe0, 0x01, 0x00, 0xea, 0x21, 0x05]);

        let sym_payload = marshal_payload(&Value::symbol("c0"), &p).unwrap();
        // 852 = 0x0354
        assert_eq!(&sym_payload[4..], &[0x72, 0x03, 0x54]);
    }

    #[test]
    fn test_round_trip_struct() {
        let p = prolog(&["note1", "para"]);
        let value = StructBuilder::new()
            .symbol(sym::ANCHOR_NAME, "note1")
            .structure(sym::POSITION, StructBuilder::new().int(sym::ID, 1042))
            .string(sym::URI, "https://example.com/ü")
            .decimal(sym::LINE_HEIGHT, Decimal::new(15, -1))
            .boolean("para", false)
            .list(sym::FEATURES, vec![Value::Null, Value::Blob(vec![1, 2, 3])])
            .build();

        let bytes = marshal_payload(&value, &p).unwrap();
        assert_eq!(unmarshal_with_prolog(&bytes, &p).unwrap(), value);
    }

    #[test]
    fn test_annotated_round_trip() {
        let p = prolog(&[]);
        let value = Value::List(vec![Value::Int(1)]);
        let bytes = marshal_annotated_payload(&value, &[sym::FORMAT_CAPABILITIES], &p).unwrap();
        let (annotations, decoded) = unmarshal_annotated_with_prolog(&bytes, &p).unwrap();
        assert_eq!(annotations, ["$593"]);
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_unknown_symbol_is_fatal() {
        let p = prolog(&["known"]);
        let err = marshal_payload(&Value::symbol("unknown"), &p).unwrap_err();
        assert!(matches!(err, Error::UnknownSymbol(ref s) if s == "unknown"));
    }

    #[test]
    fn test_missing_bvm() {
        let p = prolog(&[]);
        let err = unmarshal_with_prolog(&[0x21, 0x05], &p).unwrap_err();
        assert!(matches!(err, Error::MissingVersionMarker));
    }

    #[test]
    fn test_doc_symbols_round_trip() {
        let p = prolog(&["a", "b"]);
        let decoded = Prolog::from_doc_symbols(p.doc_symbols()).unwrap();
        assert_eq!(decoded.table().local_symbols(), &["a", "b"]);
        assert_eq!(decoded.table().shared().max_id(), 851);
        assert_eq!(decoded.bytes(), p.bytes());
    }

    #[test]
    fn test_doc_symbols_normalizes_max_id() {
        let mut writer = IonWriter::new();
        writer.write_bvm();
        let import = IonValue::Struct(vec![
            (system::NAME, IonValue::String("YJ_symbols".into())),
            (system::VERSION, IonValue::Int(10)),
            (system::MAX_ID, IonValue::Int(842)),
        ]);
        writer.write_annotated(
            &[system::ION_SYMBOL_TABLE],
            &IonValue::Struct(vec![
                (system::IMPORTS, IonValue::List(vec![import])),
                (system::SYMBOLS, IonValue::List(vec![IonValue::String("x".into())])),
            ]),
        );
        let decoded = Prolog::from_doc_symbols(&writer.into_bytes()).unwrap();
        assert_eq!(decoded.table().find_by_name("x"), Some(852));
    }
}
