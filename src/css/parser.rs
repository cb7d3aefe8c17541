//! Stylesheet parsing.

use cssparser::{
    AtRuleParser, CowRcStr, DeclarationParser, ParseError, Parser, ParserInput, ParserState,
    QualifiedRuleParser, RuleBodyItemParser, RuleBodyParser, StyleSheetParser,
};

use super::selector::Selector;
use super::values::CssValue;

/// A parsed stylesheet restricted to what KFX styles can express.
#[derive(Debug, Default, Clone)]
pub struct Stylesheet {
    pub rules: Vec<CssRule>,
    pub font_faces: Vec<FontFace>,
    /// Unsupported selectors, one message each
    pub warnings: Vec<String>,
}

/// One selector with its declarations in source order.
///
/// A comma-separated group yields one rule per selector.
#[derive(Debug, Clone)]
pub struct CssRule {
    pub selector: Selector,
    /// Lowercased property name and value, `!important` stripped
    pub declarations: Vec<(String, CssValue)>,
}

impl CssRule {
    /// Last value declared for `property`.
    pub fn get(&self, property: &str) -> Option<&CssValue> {
        self.declarations
            .iter()
            .rev()
            .find(|(name, _)| name == property)
            .map(|(_, value)| value)
    }
}

/// An `@font-face` block, collected as written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FontFace {
    pub family: String,
    pub src: String,
    pub style: Option<String>,
    pub weight: Option<String>,
}

impl Stylesheet {
    /// Parse CSS text leniently; malformed rules are skipped.
    pub fn parse(css: &str) -> Self {
        let mut input = ParserInput::new(css);
        let mut parser = Parser::new(&mut input);
        let mut sheet = Stylesheet::default();

        let mut rule_parser = TopLevelRuleParser { sheet: &mut sheet };
        for result in StyleSheetParser::new(&mut parser, &mut rule_parser) {
            let _ = result;
        }

        sheet
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Distinct style names in first-seen order.
    pub fn style_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for rule in &self.rules {
            let name = rule.selector.style_name();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

struct TopLevelRuleParser<'a> {
    sheet: &'a mut Stylesheet,
}

struct FontFacePrelude;

impl<'i> AtRuleParser<'i> for TopLevelRuleParser<'_> {
    type Prelude = FontFacePrelude;
    type AtRule = ();
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        if name.eq_ignore_ascii_case("font-face") {
            Ok(FontFacePrelude)
        } else {
            tracing::debug!(rule = %name, "skipping at-rule");
            Err(input.new_custom_error(()))
        }
    }

    fn parse_block<'t>(
        &mut self,
        _prelude: Self::Prelude,
        _start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::AtRule, ParseError<'i, Self::Error>> {
        let declarations = parse_declarations(input);
        let value = |key: &str| {
            declarations
                .iter()
                .rev()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value)
        };

        let family = value("font-family").map(|v| unquote(&v.raw));
        let src = value("src").map(|v| v.raw.clone());
        match (family, src) {
            (Some(family), Some(src)) => self.sheet.font_faces.push(FontFace {
                family,
                src,
                style: value("font-style").map(|v| v.raw.to_ascii_lowercase()),
                weight: value("font-weight").map(|v| v.raw.to_ascii_lowercase()),
            }),
            _ => tracing::debug!("skipping @font-face without family or src"),
        }
        Ok(())
    }
}

impl<'i> QualifiedRuleParser<'i> for TopLevelRuleParser<'_> {
    type Prelude = Vec<Selector>;
    type QualifiedRule = ();
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        let start = input.position();
        while input.next().is_ok() {}
        let text = input.slice_from(start);

        let mut selectors = Vec::new();
        for part in text.split(',') {
            match Selector::parse(part) {
                Ok(selector) => selectors.push(selector),
                Err(warning) => self.sheet.warnings.push(warning),
            }
        }
        if selectors.is_empty() {
            return Err(input.new_custom_error(()));
        }
        Ok(selectors)
    }

    fn parse_block<'t>(
        &mut self,
        prelude: Self::Prelude,
        _start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::QualifiedRule, ParseError<'i, Self::Error>> {
        let declarations = parse_declarations(input);
        for selector in prelude {
            self.sheet.rules.push(CssRule {
                selector,
                declarations: declarations.clone(),
            });
        }
        Ok(())
    }
}

fn parse_declarations(input: &mut Parser<'_, '_>) -> Vec<(String, CssValue)> {
    let mut declarations = Vec::new();
    let mut parser = DeclarationListParser {
        declarations: &mut declarations,
    };
    for result in RuleBodyParser::new(input, &mut parser) {
        let _ = result;
    }
    declarations
}

struct DeclarationListParser<'a> {
    declarations: &'a mut Vec<(String, CssValue)>,
}

impl<'i> AtRuleParser<'i> for DeclarationListParser<'_> {
    type Prelude = ();
    type AtRule = ();
    type Error = ();
}

impl<'i> QualifiedRuleParser<'i> for DeclarationListParser<'_> {
    type Prelude = ();
    type QualifiedRule = ();
    type Error = ();
}

impl<'i> DeclarationParser<'i> for DeclarationListParser<'_> {
    type Declaration = ();
    type Error = ();

    fn parse_value<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
        _start: &ParserState,
    ) -> Result<Self::Declaration, ParseError<'i, Self::Error>> {
        let start = input.position();
        let mut end = start;
        let mut important = false;
        loop {
            if input.try_parse(cssparser::parse_important).is_ok() {
                important = true;
                continue;
            }
            if input.next().is_err() {
                break;
            }
            if !important {
                end = input.position();
            }
        }

        let raw = input.slice(start..end);
        if raw.trim().is_empty() {
            return Err(input.new_custom_error(()));
        }
        self.declarations
            .push((name.to_ascii_lowercase(), CssValue::parse(raw)));
        Ok(())
    }
}

impl<'i> RuleBodyItemParser<'i, (), ()> for DeclarationListParser<'_> {
    fn parse_declarations(&self) -> bool {
        true
    }
    fn parse_qualified(&self) -> bool {
        false
    }
}

fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    raw.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(raw)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_and_groups() {
        let sheet = Stylesheet::parse(
            "p { margin: 1em 0; text-indent: 2em }\n\
             h1, .title { font-weight: bold !important; }",
        );
        assert_eq!(sheet.rules.len(), 3);
        assert!(sheet.warnings.is_empty());

        let p = &sheet.rules[0];
        assert_eq!(p.selector.style_name(), "p");
        assert_eq!(p.declarations.len(), 2);
        assert_eq!(p.get("margin").unwrap().raw, "1em 0");
        assert_eq!(p.get("text-indent").unwrap().unit, "em");

        let title = &sheet.rules[2];
        assert_eq!(title.selector.style_name(), "title");
        assert_eq!(title.get("font-weight").unwrap().keyword, "bold");
        assert_eq!(sheet.style_names(), ["p", "h1", "title"]);
    }

    #[test]
    fn test_unsupported_selectors_warn() {
        let sheet = Stylesheet::parse("div > p, p.ok { color: red } a:hover { color: blue }");
        assert_eq!(sheet.rules.len(), 1);
        assert_eq!(sheet.rules[0].selector.style_name(), "ok");
        assert_eq!(
            sheet.warnings,
            [
                "unsupported combinator selector: div > p",
                "unsupported pseudo-class: a:hover"
            ]
        );
    }

    #[test]
    fn test_at_rules() {
        let sheet = Stylesheet::parse(
            "@charset \"utf-8\";\n\
             @media amzn-kf8 { p { color: red } }\n\
             @font-face { font-family: \"Serif Body\"; \
             src: url(fonts/body.ttf); font-style: Italic }\n\
             @font-face { font-family: Missing }\n\
             em { font-style: italic }",
        );
        assert_eq!(sheet.rules.len(), 1);
        assert_eq!(sheet.rules[0].selector.style_name(), "em");
        assert_eq!(
            sheet.font_faces,
            [FontFace {
                family: "Serif Body".into(),
                src: "url(fonts/body.ttf)".into(),
                style: Some("italic".into()),
                weight: None,
            }]
        );
    }

    #[test]
    fn test_lenient_parsing() {
        let sheet = Stylesheet::parse("p { color: ; margin-top: 1em; ;; bogus } .x { COLOR: Red }");
        assert_eq!(sheet.rules.len(), 2);
        assert_eq!(sheet.rules[0].declarations.len(), 1);
        let (name, value) = &sheet.rules[1].declarations[0];
        assert_eq!(name, "color");
        assert_eq!(value.keyword, "red");
    }
}
