//! Declaration to KFX property conversion.

use std::collections::HashMap;

use super::ConversionError;
use super::parser::{CssRule, Stylesheet};
use super::style::StyleDef;
use super::values::{self, CssValue};
use crate::kfx::fragment::Value;
use crate::kfx::symbols::sym;

/// How a CSS value becomes a KFX value.
#[derive(Clone, Copy)]
enum Transform {
    /// Keyword table lookup
    Keyword(fn(&CssValue) -> Option<&'static str>),
    /// Length or ratio; `auto` is allowed when set
    Dimension { auto: bool },
    Color,
    FontFamily,
}

struct PropertyRule {
    css: &'static str,
    kfx: &'static str,
    transform: Transform,
}

const fn rule(css: &'static str, kfx: &'static str, transform: Transform) -> PropertyRule {
    PropertyRule {
        css,
        kfx,
        transform,
    }
}

const LENGTH: Transform = Transform::Dimension { auto: false };
const LENGTH_OR_AUTO: Transform = Transform::Dimension { auto: true };

static PROPERTIES: &[PropertyRule] = &[
    rule("font-weight", sym::FONT_WEIGHT, Transform::Keyword(values::font_weight)),
    rule("font-style", sym::FONT_STYLE, Transform::Keyword(values::font_style)),
    rule("font-size", sym::FONT_SIZE, LENGTH),
    rule("font-family", sym::FONT_FAMILY, Transform::FontFamily),
    rule("text-align", sym::TEXT_ALIGNMENT, Transform::Keyword(values::text_align)),
    rule("text-indent", sym::TEXT_INDENT, LENGTH),
    rule("text-transform", sym::TEXT_TRANSFORM, Transform::Keyword(values::text_transform)),
    rule("line-height", sym::LINE_HEIGHT, LENGTH),
    rule("letter-spacing", sym::LETTER_SPACING, LENGTH),
    rule("word-spacing", sym::WORD_SPACING, LENGTH),
    rule("margin-top", sym::MARGIN_TOP, LENGTH_OR_AUTO),
    rule("margin-bottom", sym::MARGIN_BOTTOM, LENGTH_OR_AUTO),
    rule("margin-left", sym::MARGIN_LEFT, LENGTH_OR_AUTO),
    rule("margin-right", sym::MARGIN_RIGHT, LENGTH_OR_AUTO),
    rule("padding-top", sym::PADDING_TOP, LENGTH),
    rule("padding-bottom", sym::PADDING_BOTTOM, LENGTH),
    rule("padding-left", sym::PADDING_LEFT, LENGTH),
    rule("padding-right", sym::PADDING_RIGHT, LENGTH),
    rule("width", sym::WIDTH, LENGTH_OR_AUTO),
    rule("height", sym::HEIGHT, LENGTH_OR_AUTO),
    rule("color", sym::TEXT_COLOR, Transform::Color),
    rule("background-color", sym::BACKGROUND_COLOR, Transform::Color),
    rule("float", sym::FLOAT, Transform::Keyword(values::float)),
    rule("page-break-before", sym::BREAK_BEFORE, Transform::Keyword(values::page_break)),
    rule("page-break-after", sym::BREAK_AFTER, Transform::Keyword(values::page_break)),
    rule("page-break-inside", sym::BREAK_INSIDE, Transform::Keyword(values::page_break)),
    rule("break-before", sym::BREAK_BEFORE, Transform::Keyword(values::page_break)),
    rule("break-after", sym::BREAK_AFTER, Transform::Keyword(values::page_break)),
    rule("break-inside", sym::BREAK_INSIDE, Transform::Keyword(values::page_break)),
];

/// Style produced from one rule.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub style: StyleDef,
    pub warnings: Vec<String>,
}

/// Styles from a whole stylesheet, merged by name in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct StylesheetConversion {
    pub styles: Vec<StyleDef>,
    pub warnings: Vec<String>,
}

/// Convert one declaration to KFX properties.
///
/// Shorthands produce several properties. Unknown properties fail with
/// [`ConversionError::UnsupportedProperty`].
pub fn convert_declaration(
    name: &str,
    value: &CssValue,
) -> Result<Vec<(&'static str, Value)>, ConversionError> {
    match name {
        "margin" => {
            return expand_box(
                value,
                [sym::MARGIN_TOP, sym::MARGIN_RIGHT, sym::MARGIN_BOTTOM, sym::MARGIN_LEFT],
                true,
            );
        }
        "padding" => {
            return expand_box(
                value,
                [sym::PADDING_TOP, sym::PADDING_RIGHT, sym::PADDING_BOTTOM, sym::PADDING_LEFT],
                false,
            );
        }
        "text-decoration" | "text-decoration-line" => return text_decoration(name, value),
        _ => {}
    }

    let rule = PROPERTIES
        .iter()
        .find(|rule| rule.css == name)
        .ok_or_else(|| ConversionError::UnsupportedProperty(name.to_string()))?;

    let converted = match rule.transform {
        Transform::Keyword(lookup) => {
            let symbol = lookup(value).ok_or_else(|| ConversionError::invalid(name, value))?;
            Value::symbol(symbol)
        }
        Transform::Dimension { auto } => length(name, value, auto)?,
        Transform::Color => {
            let (r, g, b) =
                values::parse_color(value).ok_or_else(|| ConversionError::invalid(name, value))?;
            Value::Int(values::color_value(r, g, b))
        }
        Transform::FontFamily => {
            let families = font_family(value).ok_or_else(|| ConversionError::invalid(name, value))?;
            Value::String(families)
        }
    };
    Ok(vec![(rule.kfx, converted)])
}

fn length(property: &str, value: &CssValue, auto: bool) -> Result<Value, ConversionError> {
    if auto && value.keyword == "auto" {
        return Ok(Value::symbol(sym::AUTO));
    }
    values::dimension(property, value)
}

/// Expand a 1 to 4 value box shorthand into top, right, bottom, left.
fn expand_box(
    value: &CssValue,
    sides: [&'static str; 4],
    auto: bool,
) -> Result<Vec<(&'static str, Value)>, ConversionError> {
    let parts: Vec<CssValue> = value.raw.split_whitespace().map(CssValue::parse).collect();
    let [top, right, bottom, left] = match parts.as_slice() {
        [all] => [all, all, all, all],
        [vertical, horizontal] => [vertical, horizontal, vertical, horizontal],
        [top, horizontal, bottom] => [top, horizontal, bottom, horizontal],
        [top, right, bottom, left] => [top, right, bottom, left],
        _ => return Err(ConversionError::InvalidShorthand(value.raw.clone())),
    };

    let mut out = Vec::with_capacity(4);
    for (side, part) in sides.into_iter().zip([top, right, bottom, left]) {
        out.push((side, length(side_name(side), part, auto)?));
    }
    Ok(out)
}

fn side_name(side: &str) -> &'static str {
    match side {
        sym::MARGIN_TOP => "margin-top",
        sym::MARGIN_RIGHT => "margin-right",
        sym::MARGIN_BOTTOM => "margin-bottom",
        sym::MARGIN_LEFT => "margin-left",
        sym::PADDING_TOP => "padding-top",
        sym::PADDING_RIGHT => "padding-right",
        sym::PADDING_BOTTOM => "padding-bottom",
        _ => "padding-left",
    }
}

fn text_decoration(
    name: &str,
    value: &CssValue,
) -> Result<Vec<(&'static str, Value)>, ConversionError> {
    let decoration = values::text_decoration(value);
    if decoration.none {
        return Ok(vec![
            (sym::UNDERLINE, Value::symbol(sym::NONE)),
            (sym::STRIKETHROUGH, Value::symbol(sym::NONE)),
        ]);
    }
    let mut out = Vec::new();
    if decoration.underline {
        out.push((sym::UNDERLINE, Value::symbol(sym::SOLID)));
    }
    if decoration.line_through {
        out.push((sym::STRIKETHROUGH, Value::symbol(sym::SOLID)));
    }
    if out.is_empty() {
        return Err(ConversionError::invalid(name, value));
    }
    Ok(out)
}

/// Family list with quotes removed, e.g. `"Georgia",serif`.
fn font_family(value: &CssValue) -> Option<String> {
    let families: Vec<&str> = value
        .raw
        .split(',')
        .map(|family| family.trim().trim_matches(['"', '\'']).trim())
        .filter(|family| !family.is_empty())
        .collect();
    (!families.is_empty()).then(|| families.join(","))
}

/// Convert one rule into a style named after its selector.
///
/// Unknown properties are logged and dropped. Values that cannot be
/// converted become warnings.
pub fn convert_rule(rule: &CssRule) -> ConversionResult {
    let mut style = StyleDef::new(rule.selector.style_name());
    let mut warnings = Vec::new();

    for (name, value) in &rule.declarations {
        match convert_declaration(name, value) {
            Ok(properties) => {
                for (key, converted) in properties {
                    style.set(key, converted);
                }
            }
            Err(ConversionError::UnsupportedProperty(property)) => {
                tracing::warn!(%property, selector = %rule.selector, "unsupported CSS property");
            }
            Err(err) => warnings.push(format!("{}: {err}", rule.selector)),
        }
    }

    ConversionResult { style, warnings }
}

/// Convert every rule and merge styles that share a name.
///
/// Merging is a key union where the later rule wins per property. This is
/// not CSS specificity: `p.note` and `.note` both name the style `note`
/// and simply override each other in source order. Rules that produce no
/// properties are dropped.
pub fn convert_stylesheet(sheet: &Stylesheet) -> StylesheetConversion {
    let mut out = StylesheetConversion::default();
    let mut by_name: HashMap<String, usize> = HashMap::new();

    for rule in &sheet.rules {
        let result = convert_rule(rule);
        for warning in &result.warnings {
            tracing::warn!("{warning}");
        }
        out.warnings.extend(result.warnings);

        if result.style.is_empty() {
            continue;
        }
        match by_name.get(&result.style.name) {
            Some(&index) => out.styles[index].merge(result.style),
            None => {
                by_name.insert(result.style.name.clone(), out.styles.len());
                out.styles.push(result.style);
            }
        }
    }

    for warning in &sheet.warnings {
        tracing::warn!("{warning}");
    }
    out.warnings.extend(sheet.warnings.iter().cloned());
    out
}
