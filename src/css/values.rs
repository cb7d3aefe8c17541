//! CSS value parsing and keyword tables.

use cssparser::{ParseError, Parser, ParserInput, Token};

use super::ConversionError;
use crate::kfx::fragment::{Decimal, StructBuilder, Value};
use crate::kfx::symbols::sym;

/// One declaration value.
///
/// A single dimension, percentage or number sets `number` (and `unit`); a
/// single identifier, string or hash sets `keyword`. Anything else, such
/// as functions or several tokens, keeps the raw text as its keyword.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CssValue {
    pub raw: String,
    pub number: f64,
    /// Lowercased unit, `"%"` for percentages, empty for plain numbers
    pub unit: String,
    /// Lowercased identifier or unquoted string
    pub keyword: String,
}

impl CssValue {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let mut value = CssValue {
            raw: raw.to_string(),
            ..Default::default()
        };
        if raw.is_empty() {
            return value;
        }

        let mut input = ParserInput::new(raw);
        let mut parser = Parser::new(&mut input);
        let first = parser.next().cloned();
        let single = parser.is_exhausted();

        match first {
            Ok(Token::Dimension { value: v, unit, .. }) if single => {
                let unit = unit.to_ascii_lowercase();
                value.number = leading_number(raw, unit.len()).unwrap_or(v as f64);
                value.unit = unit;
            }
            Ok(Token::Percentage { unit_value, .. }) if single => {
                value.number = leading_number(raw, 1).unwrap_or(unit_value as f64 * 100.0);
                value.unit = "%".to_string();
            }
            Ok(Token::Number { value: v, .. }) if single => {
                value.number = raw.parse().unwrap_or(v as f64);
            }
            Ok(Token::Ident(ident)) if single => value.keyword = ident.to_ascii_lowercase(),
            Ok(Token::QuotedString(s)) if single => value.keyword = s.to_string(),
            Ok(Token::Hash(h) | Token::IDHash(h)) if single => value.keyword = format!("#{h}"),
            _ => value.keyword = raw.to_string(),
        }
        value
    }

    /// Whether the value is a plain number, dimension or percentage.
    pub fn is_numeric(&self) -> bool {
        self.keyword.is_empty() && !self.raw.is_empty()
    }

    pub fn is_keyword(&self) -> bool {
        !self.keyword.is_empty()
    }
}

/// Parse the number in front of a `suffix_len`-byte unit.
///
/// Token values are `f32`; reparsing the source text keeps values such as
/// `0.1` exact.
fn leading_number(raw: &str, suffix_len: usize) -> Option<f64> {
    raw.get(..raw.len().checked_sub(suffix_len)?)?.parse().ok()
}

/// `{$307: value, $306: unit}`
pub fn dimension_value(value: Decimal, unit: &str) -> Value {
    StructBuilder::new()
        .decimal(sym::VALUE, value)
        .symbol(sym::UNIT, unit)
        .build()
}

/// Convert a numeric value to a KFX dimension.
///
/// Percentages and unitless numbers both map to the ratio unit; a
/// percentage is divided by 100 on the way.
pub fn dimension(property: &str, value: &CssValue) -> Result<Value, ConversionError> {
    if !value.is_numeric() {
        return Err(ConversionError::invalid(property, value));
    }
    let number = Decimal::from_f64(value.number)
        .ok_or_else(|| ConversionError::invalid(property, value))?;

    let (number, unit) = match value.unit.as_str() {
        "%" => (
            Decimal::new(number.coefficient, number.exponent - 2).normalized(),
            sym::UNIT_RATIO,
        ),
        "" | "lh" => (number, sym::UNIT_RATIO),
        "em" | "ex" => (number, sym::UNIT_EM),
        "rem" => (number, sym::UNIT_REM),
        "px" => (number, sym::UNIT_PX),
        "pt" => (number, sym::UNIT_PT),
        "cm" => (number, sym::UNIT_CM),
        "mm" => (number, sym::UNIT_MM),
        "in" => (number, sym::UNIT_IN),
        other => {
            return Err(ConversionError::UnsupportedUnit {
                property: property.to_string(),
                unit: other.to_string(),
            });
        }
    };
    Ok(dimension_value(number, unit))
}

/// Packed opaque ARGB.
pub fn color_value(r: u8, g: u8, b: u8) -> i64 {
    (0xFF << 24) | ((r as i64) << 16) | ((g as i64) << 8) | b as i64
}

/// Parse `#rgb`, `#rrggbb`, `rgb()`, `rgba()` or a named color.
///
/// Alpha is ignored.
pub fn parse_color(value: &CssValue) -> Option<(u8, u8, u8)> {
    let mut input = ParserInput::new(&value.raw);
    let mut parser = Parser::new(&mut input);

    if let Ok(name) = parser.try_parse(|i| i.expect_ident_cloned()) {
        return named_color(&name.to_ascii_lowercase());
    }

    if let Ok(hash) = parser.try_parse(|i| -> Result<_, ParseError<'_, ()>> {
        match i.next()? {
            Token::IDHash(h) | Token::Hash(h) => Ok(h.clone()),
            _ => Err(i.new_custom_error(())),
        }
    }) {
        return parse_hex_color(&hash);
    }

    parser.try_parse(parse_rgb_function).ok()
}

fn parse_hex_color(hex: &str) -> Option<(u8, u8, u8)> {
    match hex.len() {
        3 => {
            let r = u8::from_str_radix(&hex[0..1], 16).ok()? * 17;
            let g = u8::from_str_radix(&hex[1..2], 16).ok()? * 17;
            let b = u8::from_str_radix(&hex[2..3], 16).ok()? * 17;
            Some((r, g, b))
        }
        6 => {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            Some((r, g, b))
        }
        _ => None,
    }
}

fn parse_rgb_function<'i>(input: &mut Parser<'i, '_>) -> Result<(u8, u8, u8), ParseError<'i, ()>> {
    let name = input.expect_function()?.clone();
    if !name.eq_ignore_ascii_case("rgb") && !name.eq_ignore_ascii_case("rgba") {
        return Err(input.new_custom_error(()));
    }
    input.parse_nested_block(|input| {
        let r = parse_color_component(input)?;
        input.expect_comma()?;
        let g = parse_color_component(input)?;
        input.expect_comma()?;
        let b = parse_color_component(input)?;
        // Alpha, if any
        while input.next().is_ok() {}
        Ok((r, g, b))
    })
}

fn parse_color_component<'i>(input: &mut Parser<'i, '_>) -> Result<u8, ParseError<'i, ()>> {
    let location = input.current_source_location();
    match input.next()? {
        Token::Number { value, .. } => Ok(value.round().clamp(0.0, 255.0) as u8),
        Token::Percentage { unit_value, .. } => {
            Ok((unit_value * 255.0).round().clamp(0.0, 255.0) as u8)
        }
        _ => Err(location.new_custom_error(())),
    }
}

fn named_color(name: &str) -> Option<(u8, u8, u8)> {
    let rgb = match name {
        "black" => (0, 0, 0),
        "white" => (255, 255, 255),
        "red" => (255, 0, 0),
        "green" => (0, 128, 0),
        "blue" => (0, 0, 255),
        "gray" | "grey" => (128, 128, 128),
        "silver" => (192, 192, 192),
        "maroon" => (128, 0, 0),
        "navy" => (0, 0, 128),
        "teal" => (0, 128, 128),
        "olive" => (128, 128, 0),
        "purple" => (128, 0, 128),
        "fuchsia" | "magenta" => (255, 0, 255),
        "aqua" | "cyan" => (0, 255, 255),
        "lime" => (0, 255, 0),
        "yellow" => (255, 255, 0),
        "orange" => (255, 165, 0),
        "brown" => (165, 42, 42),
        "pink" => (255, 192, 203),
        _ => return None,
    };
    Some(rgb)
}

pub(crate) fn font_weight(value: &CssValue) -> Option<&'static str> {
    match value.keyword.as_str() {
        "normal" => return Some(sym::NORMAL),
        "bold" | "bolder" => return Some(sym::WEIGHT_BOLD),
        "lighter" => return Some(sym::WEIGHT_LIGHT),
        "" => {}
        _ => return None,
    }
    if !value.unit.is_empty() || !(1.0..=1000.0).contains(&value.number) {
        return None;
    }
    let weight = match ((value.number / 100.0).round() as i64).clamp(1, 9) {
        1 => sym::WEIGHT_THIN,
        2 => sym::WEIGHT_ULTRA_LIGHT,
        3 => sym::WEIGHT_LIGHT,
        4 => sym::NORMAL,
        5 => sym::WEIGHT_MEDIUM,
        6 => sym::WEIGHT_SEMIBOLD,
        7 => sym::WEIGHT_BOLD,
        8 => sym::WEIGHT_ULTRA_BOLD,
        _ => sym::WEIGHT_HEAVY,
    };
    Some(weight)
}

pub(crate) fn font_style(value: &CssValue) -> Option<&'static str> {
    match value.keyword.as_str() {
        "normal" => Some(sym::NORMAL),
        "italic" => Some(sym::ITALIC),
        "oblique" => Some(sym::OBLIQUE),
        _ => None,
    }
}

pub(crate) fn text_align(value: &CssValue) -> Option<&'static str> {
    match value.keyword.as_str() {
        "left" => Some(sym::LEFT),
        "right" => Some(sym::RIGHT),
        "center" => Some(sym::CENTER),
        "justify" => Some(sym::JUSTIFY),
        "start" => Some(sym::START),
        "end" => Some(sym::END),
        _ => None,
    }
}

pub(crate) fn text_transform(value: &CssValue) -> Option<&'static str> {
    match value.keyword.as_str() {
        "none" => Some(sym::NONE),
        "uppercase" => Some(sym::UPPERCASE),
        "lowercase" => Some(sym::LOWERCASE),
        "capitalize" => Some(sym::TITLECASE),
        _ => None,
    }
}

pub(crate) fn float(value: &CssValue) -> Option<&'static str> {
    match value.keyword.as_str() {
        "left" => Some(sym::LEFT),
        "right" => Some(sym::RIGHT),
        "none" => Some(sym::NONE),
        _ => None,
    }
}

/// `page` and `avoid-page` are the level-3 spellings of `always`/`avoid`.
pub(crate) fn page_break(value: &CssValue) -> Option<&'static str> {
    match value.keyword.as_str() {
        "always" | "page" | "left" | "right" => Some(sym::ALWAYS),
        "avoid" | "avoid-page" => Some(sym::AVOID),
        "auto" => Some(sym::AUTO),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct TextDecoration {
    pub underline: bool,
    pub line_through: bool,
    pub none: bool,
}

pub(crate) fn text_decoration(value: &CssValue) -> TextDecoration {
    let raw = value.raw.to_ascii_lowercase();
    TextDecoration {
        underline: raw.split_whitespace().any(|w| w == "underline"),
        line_through: raw.split_whitespace().any(|w| w == "line-through"),
        none: raw == "none",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dim(raw: &str) -> (f64, String) {
        let value = dimension("margin-top", &CssValue::parse(raw)).unwrap();
        let number = value.get(sym::VALUE).and_then(|v| v.as_decimal()).unwrap();
        let unit = value.get(sym::UNIT).and_then(|v| v.as_symbol()).unwrap();
        (number.to_f64(), unit.to_string())
    }

    #[test]
    fn test_parse_tokens() {
        let v = CssValue::parse(" 1.5EM ");
        assert_eq!((v.number, v.unit.as_str(), v.raw.as_str()), (1.5, "em", "1.5EM"));
        assert!(v.is_numeric());

        let v = CssValue::parse("150%");
        assert_eq!((v.number, v.unit.as_str()), (150.0, "%"));

        let v = CssValue::parse("0.1");
        assert_eq!((v.number, v.unit.as_str()), (0.1, ""));

        assert_eq!(CssValue::parse("Bold").keyword, "bold");
        assert_eq!(CssValue::parse("'Times New Roman'").keyword, "Times New Roman");
        assert_eq!(CssValue::parse("#fff").keyword, "#fff");

        let v = CssValue::parse("1em 2em");
        assert_eq!(v.keyword, "1em 2em");
        assert!(!v.is_numeric());
        assert_eq!(CssValue::parse("rgb(1, 2, 3)").keyword, "rgb(1, 2, 3)");
    }

    #[test]
    fn test_percent_is_ratio() {
        assert_eq!(dim("150%"), (1.5, sym::UNIT_RATIO.to_string()));
        assert_eq!(dim("33.3%"), (0.333, sym::UNIT_RATIO.to_string()));
        assert_eq!(dim("1.2"), (1.2, sym::UNIT_RATIO.to_string()));
        assert_eq!(dim("0"), (0.0, sym::UNIT_RATIO.to_string()));
    }

    #[test]
    fn test_units() {
        assert_eq!(dim("2em").1, sym::UNIT_EM);
        assert_eq!(dim("2ex").1, sym::UNIT_EM);
        assert_eq!(dim("1rem").1, sym::UNIT_REM);
        assert_eq!(dim("12pt").1, sym::UNIT_PT);
        assert_eq!(dim("-3px"), (-3.0, sym::UNIT_PX.to_string()));

        let err = dimension("width", &CssValue::parse("10vw")).unwrap_err();
        assert_eq!(
            err,
            ConversionError::UnsupportedUnit {
                property: "width".into(),
                unit: "vw".into()
            }
        );
        assert!(matches!(
            dimension("width", &CssValue::parse("auto")),
            Err(ConversionError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_colors() {
        let red = color_value(255, 0, 0);
        assert_eq!(red, 0xFFFF0000);
        for raw in ["red", "#f00", "#FF0000", "rgb(255, 0, 0)", "rgba(255,0,0,0.5)", "RED"] {
            let (r, g, b) = parse_color(&CssValue::parse(raw)).unwrap();
            assert_eq!(color_value(r, g, b), red, "{raw}");
        }
        assert_eq!(parse_color(&CssValue::parse("rgb(100%, 0%, 50%)")), Some((255, 0, 128)));
        assert_eq!(parse_color(&CssValue::parse("chartreuse")), None);
        assert_eq!(parse_color(&CssValue::parse("#12345")), None);
        assert_eq!(parse_color(&CssValue::parse("hsl(0, 100%, 50%)")), None);
    }

    #[test]
    fn test_keyword_tables() {
        let w = |raw: &str| font_weight(&CssValue::parse(raw));
        assert_eq!(w("bold"), Some(sym::WEIGHT_BOLD));
        assert_eq!(w("bolder"), Some(sym::WEIGHT_BOLD));
        assert_eq!(w("400"), Some(sym::NORMAL));
        assert_eq!(w("600"), Some(sym::WEIGHT_SEMIBOLD));
        assert_eq!(w("650"), Some(sym::WEIGHT_BOLD));
        assert_eq!(w("900"), Some(sym::WEIGHT_HEAVY));
        assert_eq!(w("heavy"), None);
        assert_eq!(w("12px"), None);

        assert_eq!(font_style(&CssValue::parse("oblique")), Some(sym::OBLIQUE));
        assert_eq!(text_align(&CssValue::parse("Justify")), Some(sym::JUSTIFY));
        assert_eq!(text_transform(&CssValue::parse("capitalize")), Some(sym::TITLECASE));
        assert_eq!(page_break(&CssValue::parse("avoid-page")), Some(sym::AVOID));
        assert_eq!(float(&CssValue::parse("inline-start")), None);

        let deco = text_decoration(&CssValue::parse("underline line-through"));
        assert!(deco.underline && deco.line_through && !deco.none);
        assert!(text_decoration(&CssValue::parse("none")).none);
    }
}
