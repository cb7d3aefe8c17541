//! Amazon Ion binary encoding, reduced to what KFX fragments use.
//!
//! Ion is Amazon's data serialization format used in KFX ebooks. This module
//! reads and writes the binary subset that fragment payloads need: nulls,
//! booleans, integers, decimals, symbols, strings, blobs, lists, structs and
//! annotation wrappers. Floats, timestamps, clobs and s-expressions are
//! rejected on read and never produced.
//!
//! Symbols are raw numeric IDs here; [`crate::kfx::prolog`] maps them to and
//! from names through the document symbol table.
//!
//! Reference: <https://amazon-ion.github.io/ion-docs/docs/binary.html>

use std::fmt;

use crate::error::{Error, Result};

/// Ion binary version marker (BVM)
pub const ION_MAGIC: [u8; 4] = [0xe0, 0x01, 0x00, 0xea];

/// Ion type codes (high nibble of the type descriptor)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum IonType {
    Null = 0,
    Bool = 1,
    PosInt = 2,
    NegInt = 3,
    Float = 4,
    Decimal = 5,
    Timestamp = 6,
    Symbol = 7,
    String = 8,
    Clob = 9,
    Blob = 10,
    List = 11,
    Sexp = 12,
    Struct = 13,
    Annotation = 14,
}

impl IonType {
    fn from_nibble(n: u8) -> Option<Self> {
        match n {
            0 => Some(IonType::Null),
            1 => Some(IonType::Bool),
            2 => Some(IonType::PosInt),
            3 => Some(IonType::NegInt),
            4 => Some(IonType::Float),
            5 => Some(IonType::Decimal),
            6 => Some(IonType::Timestamp),
            7 => Some(IonType::Symbol),
            8 => Some(IonType::String),
            9 => Some(IonType::Clob),
            10 => Some(IonType::Blob),
            11 => Some(IonType::List),
            12 => Some(IonType::Sexp),
            13 => Some(IonType::Struct),
            14 => Some(IonType::Annotation),
            _ => None, // Reserved (15)
        }
    }
}

/// Exact decimal: `coefficient * 10^exponent`.
///
/// KFX stores every fractional style quantity as an Ion decimal, so the
/// representation is kept exact instead of going through `f64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Decimal {
    pub coefficient: i64,
    pub exponent: i32,
}

impl Decimal {
    pub const ZERO: Decimal = Decimal::new(0, 0);

    pub const fn new(coefficient: i64, exponent: i32) -> Self {
        Self {
            coefficient,
            exponent,
        }
    }

    /// Integer-valued decimal.
    pub const fn from_int(n: i64) -> Self {
        Self::new(n, 0)
    }

    /// Shortest decimal that round-trips to `v`, with trailing zeros removed.
    ///
    /// Returns `None` for NaN, infinities and magnitudes whose digits do not
    /// fit in an `i64` coefficient.
    pub fn from_f64(v: f64) -> Option<Self> {
        if !v.is_finite() {
            return None;
        }
        if v == 0.0 {
            return Some(Decimal::ZERO);
        }
        // Display for f64 prints the shortest round-trip digits and never
        // switches to exponent notation.
        let text = format!("{}", v.abs());
        let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), ""));
        let digits = format!("{int_part}{frac_part}");
        let magnitude: i64 = digits.trim_start_matches('0').parse().ok()?;
        let exponent = -(i32::try_from(frac_part.len()).ok()?);
        let coefficient = if v < 0.0 { -magnitude } else { magnitude };
        Some(Decimal::new(coefficient, exponent).normalized())
    }

    /// Strip trailing zeros from the coefficient.
    pub fn normalized(self) -> Self {
        if self.coefficient == 0 {
            return Decimal::ZERO;
        }
        let mut d = self;
        while d.coefficient % 10 == 0 {
            d.coefficient /= 10;
            d.exponent += 1;
        }
        d
    }

    pub fn to_f64(self) -> f64 {
        let c = self.coefficient as f64;
        if self.exponent >= 0 {
            c * 10f64.powi(self.exponent)
        } else {
            c / 10f64.powi(-self.exponent)
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.coefficient < 0 { "-" } else { "" };
        let digits = self.coefficient.unsigned_abs().to_string();
        if self.exponent >= 0 {
            let zeros = "0".repeat(self.exponent as usize);
            return write!(f, "{sign}{digits}{zeros}");
        }
        let frac_len = self.exponent.unsigned_abs() as usize;
        if digits.len() > frac_len {
            let (int_part, frac_part) = digits.split_at(digits.len() - frac_len);
            write!(f, "{sign}{int_part}.{frac_part}")
        } else {
            let pad = "0".repeat(frac_len - digits.len());
            write!(f, "{sign}0.{pad}{digits}")
        }
    }
}

/// Parsed Ion value.
///
/// Symbols are stored as raw u32 IDs. Structs use a Vec for fields (O(n)
/// lookup), which suits the small structs typical in KFX data.
#[derive(Debug, Clone, PartialEq)]
pub enum IonValue {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(Decimal),
    /// Symbol ID (resolve via the document symbol table)
    Symbol(u32),
    String(String),
    Blob(Vec<u8>),
    List(Vec<IonValue>),
    /// Struct fields as (symbol_id, value) pairs in encoding order
    Struct(Vec<(u32, IonValue)>),
    /// Annotated value: (annotation symbol IDs, inner value)
    Annotated(Vec<u32>, Box<IonValue>),
}

impl IonValue {
    #[inline]
    pub fn as_string(&self) -> Option<&str> {
        match self {
            IonValue::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            IonValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_symbol(&self) -> Option<u32> {
        match self {
            IonValue::Symbol(id) => Some(*id),
            _ => None,
        }
    }

    #[inline]
    pub fn as_list(&self) -> Option<&[IonValue]> {
        match self {
            IonValue::List(items) => Some(items),
            _ => None,
        }
    }

    #[inline]
    pub fn as_struct(&self) -> Option<&[(u32, IonValue)]> {
        match self {
            IonValue::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// Get field from struct by symbol ID.
    #[inline]
    pub fn get(&self, symbol_id: u32) -> Option<&IonValue> {
        self.as_struct()?
            .iter()
            .find(|(k, _)| *k == symbol_id)
            .map(|(_, v)| v)
    }

    /// Unwrap annotated value to get inner value.
    pub fn unwrap_annotated(&self) -> &IonValue {
        match self {
            IonValue::Annotated(_, inner) => inner.unwrap_annotated(),
            other => other,
        }
    }

    /// Annotations on this value, outermost first.
    pub fn annotations(&self) -> &[u32] {
        match self {
            IonValue::Annotated(ids, _) => ids,
            _ => &[],
        }
    }
}

// --- Reader ---

/// Ion binary parser.
pub struct IonParser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> IonParser<'a> {
    #[inline]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Parse a single value from data starting with the BVM marker.
    pub fn parse(&mut self) -> Result<IonValue> {
        self.expect_bvm()?;
        self.next_value()?
            .ok_or_else(|| Error::ion(self.pos, "no value after version marker"))
    }

    /// Parse every top-level value of a BVM-prefixed stream.
    ///
    /// Top-level NOP pads are skipped; symbol table directives are returned
    /// like any other annotated value so the caller can decide what to do
    /// with them.
    pub fn parse_all(&mut self) -> Result<Vec<IonValue>> {
        self.expect_bvm()?;
        let mut values = Vec::new();
        while let Some(value) = self.next_value()? {
            values.push(value);
        }
        Ok(values)
    }

    /// Current byte offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn expect_bvm(&mut self) -> Result<()> {
        if self.data.len() < self.pos + 4 || self.data[self.pos..self.pos + 4] != ION_MAGIC {
            return Err(Error::MissingVersionMarker);
        }
        self.pos += 4;
        Ok(())
    }

    /// Next top-level value, skipping NOP pads. `None` at end of data.
    fn next_value(&mut self) -> Result<Option<IonValue>> {
        while self.pos < self.data.len() {
            if let Some(value) = self.parse_value()? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Parse a single value. Returns `None` for a NOP pad.
    fn parse_value(&mut self) -> Result<Option<IonValue>> {
        let start = self.pos;
        let type_byte = self.read_byte()?;
        let type_code = type_byte >> 4;
        let length_code = type_byte & 0x0f;

        let ion_type = IonType::from_nibble(type_code)
            .ok_or_else(|| Error::ion(start, format!("reserved type code {type_code}")))?;

        // Null is encoded as length_code 15 for any type
        if length_code == 15 {
            return Ok(Some(IonValue::Null));
        }

        if ion_type == IonType::Bool {
            return match length_code {
                0 => Ok(Some(IonValue::Bool(false))),
                1 => Ok(Some(IonValue::Bool(true))),
                _ => Err(Error::ion(start, "invalid bool representation")),
            };
        }

        // Struct with length code 1 is the sorted-field form with a VarUInt length.
        let length = if length_code == 14 || (ion_type == IonType::Struct && length_code == 1) {
            self.read_varuint()? as usize
        } else {
            length_code as usize
        };
        let end = self
            .pos
            .checked_add(length)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| Error::ion(start, "value length exceeds data"))?;

        let value = match ion_type {
            IonType::Null => {
                // Type 0 with length > 0 is a NOP pad, skip the bytes
                self.pos = end;
                return Ok(None);
            }

            IonType::Bool => return Err(Error::ion(start, "invalid bool representation")),

            IonType::PosInt => {
                let value = self.read_uint(length)?;
                let n = i64::try_from(value)
                    .map_err(|_| Error::ion(start, "positive integer too large for i64"))?;
                IonValue::Int(n)
            }

            IonType::NegInt => {
                let value = self.read_uint(length)?;
                if value == 0 {
                    return Err(Error::ion(start, "negative zero integer"));
                }
                // i64::MIN has magnitude 2^63, which fits in u64 but not as positive i64.
                let n = 0i64
                    .checked_sub_unsigned(value)
                    .ok_or_else(|| Error::ion(start, "negative integer too large for i64"))?;
                IonValue::Int(n)
            }

            IonType::Decimal => {
                if length == 0 {
                    IonValue::Decimal(Decimal::ZERO)
                } else {
                    let exponent = self.read_varint()?;
                    let exponent = i32::try_from(exponent)
                        .map_err(|_| Error::ion(start, "decimal exponent out of range"))?;
                    let remaining = end
                        .checked_sub(self.pos)
                        .ok_or_else(|| Error::ion(start, "decimal exponent overruns value"))?;
                    let coefficient = self.read_int(remaining)?;
                    IonValue::Decimal(Decimal::new(coefficient, exponent))
                }
            }

            IonType::Symbol => {
                let symbol_id = self.read_uint(length)?;
                let id = u32::try_from(symbol_id)
                    .map_err(|_| Error::ion(start, "symbol ID too large"))?;
                IonValue::Symbol(id)
            }

            IonType::String => {
                let bytes = self.read_bytes(length)?;
                let s = std::str::from_utf8(bytes)
                    .map_err(|e| Error::ion(start, format!("invalid UTF-8 in string: {e}")))?;
                IonValue::String(s.to_string())
            }

            IonType::Blob => IonValue::Blob(self.read_bytes(length)?.to_vec()),

            IonType::List => {
                let mut items = Vec::new();
                while self.pos < end {
                    if let Some(item) = self.parse_value()? {
                        items.push(item);
                    }
                }
                IonValue::List(items)
            }

            IonType::Struct => {
                let mut fields = Vec::new();
                while self.pos < end {
                    let field_name = self.read_varuint()?;
                    if let Some(value) = self.parse_value()? {
                        fields.push((field_name, value));
                    }
                }
                IonValue::Struct(fields)
            }

            IonType::Annotation => {
                let ann_len = self.read_varuint()? as usize;
                let ann_end = self.pos + ann_len;
                if ann_len == 0 || ann_end > end {
                    return Err(Error::ion(start, "invalid annotation length"));
                }

                let mut annotations = Vec::new();
                while self.pos < ann_end {
                    annotations.push(self.read_varuint()?);
                }

                let inner = self
                    .parse_value()?
                    .ok_or_else(|| Error::ion(start, "annotation wraps a NOP pad"))?;
                IonValue::Annotated(annotations, Box::new(inner))
            }

            IonType::Float | IonType::Timestamp | IonType::Clob | IonType::Sexp => {
                return Err(Error::ion(
                    start,
                    format!("unsupported Ion type {ion_type:?}"),
                ));
            }
        };

        if self.pos != end {
            return Err(Error::ion(start, "value length mismatch"));
        }
        Ok(Some(value))
    }

    #[inline]
    fn read_byte(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or_else(|| Error::ion(self.pos, "unexpected end of data"))?;
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let bytes = self
            .data
            .get(self.pos..self.pos + len)
            .ok_or_else(|| Error::ion(self.pos, "unexpected end of data"))?;
        self.pos += len;
        Ok(bytes)
    }

    /// Read a VarUInt (7 bits per byte, MSB set on last byte).
    #[inline]
    fn read_varuint(&mut self) -> Result<u32> {
        let start = self.pos;
        let mut result: u64 = 0;
        loop {
            let byte = self.read_byte()?;
            result = (result << 7) | (byte & 0x7f) as u64;
            if result > u32::MAX as u64 {
                return Err(Error::ion(start, "VarUInt overflow"));
            }
            if byte & 0x80 != 0 {
                return Ok(result as u32);
            }
        }
    }

    /// Read a VarInt (sign in bit 6 of the first byte, MSB set on last byte).
    fn read_varint(&mut self) -> Result<i64> {
        let start = self.pos;
        let first = self.read_byte()?;
        let negative = first & 0x40 != 0;
        let mut magnitude = (first & 0x3f) as i64;
        let mut byte = first;
        while byte & 0x80 == 0 {
            byte = self.read_byte()?;
            magnitude = magnitude
                .checked_mul(128)
                .map(|m| m | (byte & 0x7f) as i64)
                .ok_or_else(|| Error::ion(start, "VarInt overflow"))?;
        }
        Ok(if negative { -magnitude } else { magnitude })
    }

    /// Read unsigned integer (big-endian, up to 8 bytes).
    #[inline]
    fn read_uint(&mut self, len: usize) -> Result<u64> {
        if len > 8 {
            return Err(Error::ion(self.pos, "integer too large (> 8 bytes)"));
        }
        let bytes = self.read_bytes(len)?;
        Ok(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
    }

    /// Read a signed-magnitude Int occupying `len` bytes.
    fn read_int(&mut self, len: usize) -> Result<i64> {
        if len == 0 {
            return Ok(0);
        }
        let start = self.pos;
        let bytes = self.read_bytes(len)?;
        let negative = bytes[0] & 0x80 != 0;
        let mut magnitude: u64 = (bytes[0] & 0x7f) as u64;
        for &b in &bytes[1..] {
            magnitude = magnitude
                .checked_mul(256)
                .map(|m| m | b as u64)
                .ok_or_else(|| Error::ion(start, "decimal coefficient too large"))?;
        }
        let value = if negative {
            0i64.checked_sub_unsigned(magnitude)
        } else {
            i64::try_from(magnitude).ok()
        };
        value.ok_or_else(|| Error::ion(start, "decimal coefficient too large"))
    }
}

// --- Writer ---

/// Ion binary writer.
///
/// Values are appended to an internal buffer; call [`IonWriter::write_bvm`]
/// first for a standalone datagram.
#[derive(Debug, Default)]
pub struct IonWriter {
    buf: Vec<u8>,
}

impl IonWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bvm(&mut self) {
        self.buf.extend_from_slice(&ION_MAGIC);
    }

    pub fn write_value(&mut self, value: &IonValue) {
        encode_value(value, &mut self.buf);
    }

    /// Write `value` wrapped in the given annotations.
    pub fn write_annotated(&mut self, annotations: &[u32], value: &IonValue) {
        if annotations.is_empty() {
            self.write_value(value);
        } else {
            let wrapped = IonValue::Annotated(annotations.to_vec(), Box::new(value.clone()));
            self.write_value(&wrapped);
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

fn encode_value(value: &IonValue, out: &mut Vec<u8>) {
    match value {
        IonValue::Null => out.push(0x0f),
        IonValue::Bool(b) => out.push(0x10 | *b as u8),
        IonValue::Int(n) => {
            let type_code = if *n < 0 { IonType::NegInt } else { IonType::PosInt };
            let magnitude = uint_bytes(n.unsigned_abs());
            write_header(out, type_code, magnitude.len());
            out.extend_from_slice(&magnitude);
        }
        IonValue::Decimal(d) => {
            if *d == Decimal::ZERO {
                out.push((IonType::Decimal as u8) << 4);
                return;
            }
            let mut content = Vec::new();
            encode_varint(d.exponent as i64, &mut content);
            content.extend_from_slice(&int_bytes(d.coefficient));
            write_header(out, IonType::Decimal, content.len());
            out.extend_from_slice(&content);
        }
        IonValue::Symbol(id) => {
            let bytes = uint_bytes(*id as u64);
            write_header(out, IonType::Symbol, bytes.len());
            out.extend_from_slice(&bytes);
        }
        IonValue::String(s) => {
            write_header(out, IonType::String, s.len());
            out.extend_from_slice(s.as_bytes());
        }
        IonValue::Blob(bytes) => {
            write_header(out, IonType::Blob, bytes.len());
            out.extend_from_slice(bytes);
        }
        IonValue::List(items) => {
            let mut content = Vec::new();
            for item in items {
                encode_value(item, &mut content);
            }
            write_header(out, IonType::List, content.len());
            out.extend_from_slice(&content);
        }
        IonValue::Struct(fields) => {
            let mut content = Vec::new();
            for (field, item) in fields {
                encode_varuint(*field as u64, &mut content);
                encode_value(item, &mut content);
            }
            write_header(out, IonType::Struct, content.len());
            out.extend_from_slice(&content);
        }
        IonValue::Annotated(annotations, inner) => {
            let mut ids = Vec::new();
            for id in annotations {
                encode_varuint(*id as u64, &mut ids);
            }
            let mut content = Vec::new();
            encode_varuint(ids.len() as u64, &mut content);
            content.extend_from_slice(&ids);
            encode_value(inner, &mut content);
            write_header(out, IonType::Annotation, content.len());
            out.extend_from_slice(&content);
        }
    }
}

/// Type descriptor byte plus VarUInt length when it does not fit the nibble.
fn write_header(out: &mut Vec<u8>, ion_type: IonType, len: usize) {
    let type_nibble = (ion_type as u8) << 4;
    if len < 14 {
        out.push(type_nibble | len as u8);
    } else {
        out.push(type_nibble | 14);
        encode_varuint(len as u64, out);
    }
}

/// Append a VarUInt (7 bits per byte, MSB set on last byte).
pub fn encode_varuint(value: u64, out: &mut Vec<u8>) {
    let mut groups = Vec::with_capacity(10);
    let mut v = value;
    loop {
        groups.push((v & 0x7f) as u8);
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    groups[0] |= 0x80;
    out.extend(groups.iter().rev());
}

/// Append a VarInt; the first byte carries the sign in bit 6.
fn encode_varint(value: i64, out: &mut Vec<u8>) {
    let mut groups = Vec::with_capacity(10);
    let mut v = value.unsigned_abs();
    loop {
        groups.push((v & 0x7f) as u8);
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    groups.reverse();
    if groups[0] & 0x40 != 0 {
        groups.insert(0, 0);
    }
    if value < 0 {
        groups[0] |= 0x40;
    }
    if let Some(last) = groups.last_mut() {
        *last |= 0x80;
    }
    out.extend_from_slice(&groups);
}

/// Minimal big-endian magnitude bytes (empty for zero).
fn uint_bytes(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    bytes[skip..].to_vec()
}

/// Signed-magnitude Int bytes (empty for zero).
fn int_bytes(value: i64) -> Vec<u8> {
    let mut bytes = uint_bytes(value.unsigned_abs());
    if bytes.is_empty() {
        return bytes;
    }
    if bytes[0] & 0x80 != 0 {
        bytes.insert(0, 0);
    }
    if value < 0 {
        bytes[0] |= 0x80;
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &IonValue) -> Vec<u8> {
        let mut writer = IonWriter::new();
        writer.write_bvm();
        writer.write_value(value);
        writer.into_bytes()
    }

    fn parse(data: &[u8]) -> IonValue {
        IonParser::new(data).parse().unwrap()
    }

    #[test]
    fn test_parse_bool() {
        let data = [0xe0, 0x01, 0x00, 0xea, 0x11]; // true
        assert_eq!(parse(&data), IonValue::Bool(true));

        let data = [0xe0, 0x01, 0x00, 0xea, 0x10]; // false
        assert_eq!(parse(&data), IonValue::Bool(false));
    }

    #[test]
    fn test_parse_int() {
        let data = [0xe0, 0x01, 0x00, 0xea, 0x21, 0x2a]; // int 42
        assert_eq!(parse(&data).as_int(), Some(42));
    }

    #[test]
    fn test_parse_negative_int() {
        // -42: type 3 (NegInt), length 1, magnitude 42
        let data = [0xe0, 0x01, 0x00, 0xea, 0x31, 0x2a];
        assert_eq!(parse(&data).as_int(), Some(-42));
    }

    #[test]
    fn test_parse_large_negative_int() {
        // -2^63 (i64::MIN): magnitude is 0x8000000000000000
        let data = [
            0xe0, 0x01, 0x00, 0xea, // BVM
            0x38, // NegInt, length 8
            0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        assert_eq!(parse(&data).as_int(), Some(i64::MIN));
        assert_eq!(encode(&IonValue::Int(i64::MIN)), data);
    }

    #[test]
    fn test_parse_struct() {
        // struct { 10: "a", 20: 1 }
        let data = [
            0xe0, 0x01, 0x00, 0xea, // BVM
            0xd6,       // struct, length 6
            0x8a,       // field 10 (VarUInt: 10 | 0x80)
            0x81, b'a', // string "a"
            0x94,       // field 20 (VarUInt: 20 | 0x80)
            0x21, 0x01, // int 1
        ];
        let value = parse(&data);
        assert_eq!(value.get(10).and_then(|v| v.as_string()), Some("a"));
        assert_eq!(value.get(20).and_then(|v| v.as_int()), Some(1));
        assert_eq!(encode(&value), data);
    }

    #[test]
    fn test_nop_pad_skipped() {
        // Struct content: field1(1) + nop(4) + field2(1) + int(2) = 8 bytes
        let data = [
            0xe0, 0x01, 0x00, 0xea, // BVM
            0xd8,                   // struct, length 8
            0x81,                   // field 1
            0x03, 0xAA, 0xBB, 0xCC, // NOP pad (type 0, len 3, 3 garbage bytes)
            0x82,                   // field 2
            0x21, 0x2a,             // int 42
        ];
        let value = parse(&data);
        assert_eq!(value, IonValue::Struct(vec![(2, IonValue::Int(42))]));
    }

    #[test]
    fn test_decimal_encoding() {
        // 1.5 = 15 * 10^-1: exponent VarInt 0xC1, coefficient 0x0F
        let value = IonValue::Decimal(Decimal::new(15, -1));
        let bytes = encode(&value);
        assert_eq!(&bytes[4..], &[0x52, 0xc1, 0x0f]);
        assert_eq!(parse(&bytes), value);

        // -0.25 = -25 * 10^-2: coefficient sign bit set
        let value = IonValue::Decimal(Decimal::new(-25, -2));
        let bytes = encode(&value);
        assert_eq!(&bytes[4..], &[0x52, 0xc2, 0x99]);
        assert_eq!(parse(&bytes), value);

        // 0d0 has an empty representation
        assert_eq!(&encode(&IonValue::Decimal(Decimal::ZERO))[4..], &[0x50]);
    }

    #[test]
    fn test_decimal_extreme_coefficients() {
        // -2^63 needs a padding byte so the sign bit stays clear of the magnitude
        let value = IonValue::Decimal(Decimal::new(i64::MIN, 0));
        let bytes = encode(&value);
        assert_eq!(&bytes[4..], &[0x5a, 0x80, 0x80, 0x80, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(parse(&bytes), value);

        let value = IonValue::Decimal(Decimal::new(i64::MAX, -3));
        assert_eq!(parse(&encode(&value)), value);

        // Positive 2^63 does not fit
        let mut data = ION_MAGIC.to_vec();
        data.extend_from_slice(&[0x5a, 0x80, 0x00, 0x80, 0, 0, 0, 0, 0, 0, 0]);
        assert!(IonParser::new(&data).parse().is_err());
    }

    #[test]
    fn test_decimal_wide_exponent() {
        // Exponent magnitude 100 needs a second VarInt byte
        let value = IonValue::Decimal(Decimal::new(128, -100));
        let bytes = encode(&value);
        assert_eq!(parse(&bytes), value);
    }

    #[test]
    fn test_decimal_from_f64() {
        assert_eq!(Decimal::from_f64(1.5), Some(Decimal::new(15, -1)));
        assert_eq!(Decimal::from_f64(100.0), Some(Decimal::new(1, 2)));
        assert_eq!(Decimal::from_f64(-0.125), Some(Decimal::new(-125, -3)));
        assert_eq!(Decimal::from_f64(0.0), Some(Decimal::ZERO));
        assert_eq!(Decimal::from_f64(f64::NAN), None);
        assert_eq!(Decimal::new(15, -1).to_f64(), 1.5);
        assert_eq!(Decimal::new(-125, -3).to_string(), "-0.125");
        assert_eq!(Decimal::new(3, 2).to_string(), "300");
    }

    #[test]
    fn test_long_string_uses_varuint_length() {
        let text = "x".repeat(200);
        let bytes = encode(&IonValue::String(text.clone()));
        // 200 = 0b1_1001000 -> VarUInt 0x01 0xC8
        assert_eq!(&bytes[4..7], &[0x8e, 0x01, 0xc8]);
        assert_eq!(parse(&bytes).as_string(), Some(text.as_str()));
    }

    #[test]
    fn test_annotation_roundtrip() {
        let value = IonValue::Annotated(
            vec![3],
            Box::new(IonValue::Struct(vec![(
                7,
                IonValue::List(vec![IonValue::String("sym".into())]),
            )])),
        );
        let bytes = encode(&value);
        let parsed = parse(&bytes);
        assert_eq!(parsed.annotations(), &[3]);
        assert_eq!(parsed, value);
    }

    #[test]
    fn test_parse_all_stream() {
        let mut writer = IonWriter::new();
        writer.write_bvm();
        writer.write_value(&IonValue::Int(1));
        writer.write_value(&IonValue::Symbol(411));
        let values = IonParser::new(&writer.into_bytes()).parse_all().unwrap();
        assert_eq!(values, vec![IonValue::Int(1), IonValue::Symbol(411)]);
    }

    #[test]
    fn test_missing_bvm() {
        let data = [0x21, 0x2a];
        assert!(matches!(
            IonParser::new(&data).parse(),
            Err(Error::MissingVersionMarker)
        ));
    }

    #[test]
    fn test_truncated_value_is_error() {
        // String of declared length 5 with only 2 bytes present
        let data = [0xe0, 0x01, 0x00, 0xea, 0x85, b'h', b'i'];
        assert!(matches!(
            IonParser::new(&data).parse(),
            Err(Error::Ion { offset: 4, .. })
        ));
    }

    #[test]
    fn test_float_rejected() {
        let data = [0xe0, 0x01, 0x00, 0xea, 0x40];
        assert!(IonParser::new(&data).parse().is_err());
    }

    #[test]
    fn test_varuint_encoding() {
        let mut out = Vec::new();
        encode_varuint(0, &mut out);
        encode_varuint(127, &mut out);
        encode_varuint(128, &mut out);
        assert_eq!(out, vec![0x80, 0xff, 0x01, 0x80]);
    }
}
