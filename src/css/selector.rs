//! Simple CSS selectors and the style names derived from them.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PseudoElement {
    Before,
    After,
}

impl PseudoElement {
    fn suffix(self) -> &'static str {
        match self {
            PseudoElement::Before => "--before",
            PseudoElement::After => "--after",
        }
    }
}

/// A selector the converter can name.
///
/// Supported forms are `el`, `.cls`, `el.cls`, descendant chains such as
/// `div p.note`, and a trailing `::before`/`::after` (or the legacy
/// single-colon spelling).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub raw: String,
    /// Lowercased element name
    pub element: Option<String>,
    pub class: Option<String>,
    pub pseudo: Option<PseudoElement>,
    pub ancestor: Option<Box<Selector>>,
}

impl Selector {
    /// Parse one selector from a comma-separated group.
    ///
    /// The error is a human readable warning naming what is unsupported.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("empty selector".to_string());
        }
        if raw.contains(['>', '+', '~']) {
            return Err(format!("unsupported combinator selector: {raw}"));
        }
        if raw.contains('[') {
            return Err(format!("unsupported attribute selector: {raw}"));
        }

        if let Some((ancestor, last)) = raw.rsplit_once(char::is_whitespace) {
            let ancestor = Selector::parse(ancestor)?;
            let mut selector = Selector::parse_compound(last.trim(), raw)?;
            selector.ancestor = Some(Box::new(ancestor));
            selector.raw = raw.to_string();
            return Ok(selector);
        }

        Selector::parse_compound(raw, raw)
    }

    fn parse_compound(part: &str, raw: &str) -> Result<Self, String> {
        let (base, pseudo) = match part.split_once(':') {
            None => (part, None),
            Some((base, rest)) => {
                let (name, is_element) = match rest.strip_prefix(':') {
                    Some(name) => (name, true),
                    None => (rest, false),
                };
                let pseudo = match name.to_ascii_lowercase().as_str() {
                    "before" => PseudoElement::Before,
                    "after" => PseudoElement::After,
                    _ if is_element => return Err(format!("unsupported pseudo-element: {raw}")),
                    _ => return Err(format!("unsupported pseudo-class: {raw}")),
                };
                (base, Some(pseudo))
            }
        };

        if base.contains('#') {
            return Err(format!("unsupported id selector: {raw}"));
        }
        if base.contains('*') {
            return Err(format!("unsupported universal selector: {raw}"));
        }

        let (element, class) = match base.split_once('.') {
            Some((element, class)) => (element, Some(class)),
            None => (base, None),
        };
        if class.is_some_and(|c| c.contains('.')) {
            return Err(format!("unsupported compound class selector: {raw}"));
        }

        let element = (!element.is_empty()).then(|| element.to_ascii_lowercase());
        let class = class.filter(|c| !c.is_empty()).map(str::to_string);
        if element.is_none() && class.is_none() {
            return Err(format!("unsupported selector: {raw}"));
        }

        Ok(Selector {
            raw: raw.to_string(),
            element,
            class,
            pseudo,
            ancestor: None,
        })
    }

    /// Name of the KFX style this selector produces.
    ///
    /// Class beats element, ancestors are joined with `--`, and a pseudo
    /// element appends `--before` or `--after`.
    pub fn style_name(&self) -> String {
        let base = self
            .class
            .as_deref()
            .or(self.element.as_deref())
            .unwrap_or(self.raw.as_str());

        let mut name = match &self.ancestor {
            Some(ancestor) => format!("{}--{base}", ancestor.style_name()),
            None => base.to_string(),
        };
        if let Some(pseudo) = self.pseudo {
            name.push_str(pseudo.suffix());
        }
        name
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
