//! kfx-dump - inspect KFX containers, raw Ion payloads and stylesheets

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use fb2kfx::css::{StyleRegistry, Stylesheet, convert_stylesheet};
use fb2kfx::kfx::ion::{ION_MAGIC, IonParser};
use fb2kfx::kfx::symbols::describe;
use fb2kfx::kfx::{Fragment, Unpacked, Value, unpack};

#[derive(Parser, Debug)]
#[command(name = "kfx-dump")]
#[command(version, about = "Dump KFX containers, raw Ion files and CSS style conversion")]
#[command(after_help = "EXAMPLES:
    kfx-dump book.kfx              Print header and every fragment
    kfx-dump -s book.kfx           Fragment counts by type
    kfx-dump -r --json book.kfx    JSON with readable symbol names
    kfx-dump --css styles.css      Show converted KFX styles")]
struct Args {
    /// File to dump
    file: String,

    /// Annotate shared symbols with readable names
    #[arg(short, long)]
    resolve: bool,

    /// Show statistics (fragment counts by type)
    #[arg(short, long)]
    stat: bool,

    /// Emit JSON instead of text
    #[arg(long)]
    json: bool,

    /// Treat the input as a CSS stylesheet and show the converted styles
    #[arg(long)]
    css: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), String> {
    let data = fs::read(&args.file).map_err(|e| format!("{}: {e}", args.file))?;

    if args.css {
        let css = String::from_utf8_lossy(&data);
        return dump_css(&css, args);
    }

    if data.starts_with(b"CONT") {
        let unpacked = unpack(&data).map_err(|e| e.to_string())?;
        if args.stat {
            dump_stats(&unpacked, args)
        } else {
            dump_container(&unpacked, args)
        }
    } else if data.starts_with(&ION_MAGIC) {
        if args.stat || args.json {
            return Err("--stat and --json need a KFX container".to_string());
        }
        let values = IonParser::new(&data).parse_all().map_err(|e| e.to_string())?;
        for value in values {
            println!("{value:?}");
        }
        Ok(())
    } else {
        let head: Vec<String> = data.iter().take(16).map(|b| format!("{b:02X}")).collect();
        Err(format!("unknown file format, first bytes: {}", head.join(" ")))
    }
}

#[derive(Serialize)]
struct ContainerReport {
    container_id: String,
    version: u16,
    header_len: usize,
    chunk_size: i64,
    sections: Vec<SectionReport>,
    metadata: BTreeMap<String, String>,
    local_symbols: usize,
    capabilities: serde_json::Value,
    fragments: Vec<FragmentReport>,
}

#[derive(Serialize)]
struct SectionReport {
    name: &'static str,
    offset: usize,
    length: usize,
}

#[derive(Serialize)]
struct FragmentReport {
    ftype: String,
    fid: String,
    value: serde_json::Value,
}

fn dump_container(unpacked: &Unpacked, args: &Args) -> Result<(), String> {
    if args.json {
        let report = ContainerReport {
            container_id: unpacked.container_id.clone(),
            version: unpacked.version,
            header_len: unpacked.header_len,
            chunk_size: unpacked.chunk_size,
            sections: unpacked
                .sections
                .iter()
                .map(|s| SectionReport {
                    name: s.name,
                    offset: s.offset,
                    length: s.length,
                })
                .collect(),
            metadata: unpacked.metadata.iter().cloned().collect(),
            local_symbols: unpacked.symbols.len(),
            capabilities: to_json(&unpacked.capabilities, args.resolve),
            fragments: unpacked
                .fragments
                .iter()
                .map(|f| FragmentReport {
                    ftype: symbol_label(&f.ftype, args.resolve),
                    fid: f.fid.clone(),
                    value: to_json(&f.value, args.resolve),
                })
                .collect(),
        };
        return print_json(&report);
    }

    println!("Container id: {}", unpacked.container_id);
    println!("Version: {}", unpacked.version);
    println!("Header length: {}", unpacked.header_len);
    println!("Chunk size: {}", unpacked.chunk_size);
    for section in &unpacked.sections {
        println!(
            "  {:<22} offset={:<8} length={}",
            section.name, section.offset, section.length
        );
    }
    for (key, value) in &unpacked.metadata {
        println!("  {key} = {value}");
    }
    println!("Local symbols: {}", unpacked.symbols.len());
    println!("Capabilities: {}", render(&unpacked.capabilities, args.resolve));
    println!();

    for fragment in &unpacked.fragments {
        println!("{}", render_fragment(fragment, args.resolve));
    }
    Ok(())
}

fn dump_stats(unpacked: &Unpacked, args: &Args) -> Result<(), String> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for fragment in &unpacked.fragments {
        *counts
            .entry(symbol_label(&fragment.ftype, args.resolve))
            .or_default() += 1;
    }

    if args.json {
        return print_json(&counts);
    }

    println!("Fragments: {}", unpacked.fragments.len());
    for (ftype, count) in &counts {
        println!("  {ftype:<28} {count}");
    }
    Ok(())
}

#[derive(Serialize)]
struct CssReport {
    styles: BTreeMap<String, serde_json::Value>,
    font_faces: Vec<String>,
    warnings: Vec<String>,
}

fn dump_css(css: &str, args: &Args) -> Result<(), String> {
    let sheet = Stylesheet::parse(css);
    let converted = convert_stylesheet(&sheet);
    let registry: StyleRegistry = converted.styles.into_iter().collect();
    let fragments = registry.to_fragments();

    if args.json {
        let report = CssReport {
            styles: fragments
                .iter()
                .map(|f| (f.fid.clone(), to_json(&f.value, args.resolve)))
                .collect(),
            font_faces: sheet.font_faces.iter().map(|f| f.family.clone()).collect(),
            warnings: converted.warnings,
        };
        return print_json(&report);
    }

    for fragment in &fragments {
        println!("{}", render_fragment(fragment, args.resolve));
    }
    for face in &sheet.font_faces {
        println!("@font-face {} -> {}", face.family, face.src);
    }
    if !converted.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &converted.warnings {
            println!("  {warning}");
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

fn symbol_label(symbol: &str, resolve: bool) -> String {
    match describe(symbol) {
        Some(name) if resolve => format!("{symbol}({name})"),
        _ => symbol.to_string(),
    }
}

fn render_fragment(fragment: &Fragment, resolve: bool) -> String {
    let ftype = symbol_label(&fragment.ftype, resolve);
    if fragment.is_singleton() {
        format!("{ftype} = {}", render(&fragment.value, resolve))
    } else {
        format!("{ftype} {} = {}", fragment.fid, render(&fragment.value, resolve))
    }
}

/// Ion-text-like rendering of a fragment value.
fn render(value: &Value, resolve: bool) -> String {
    let mut out = String::new();
    write_value(&mut out, value, resolve);
    out
}

fn write_value(out: &mut String, value: &Value, resolve: bool) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => {
            let _ = write!(out, "{b}");
        }
        Value::Int(n) => {
            let _ = write!(out, "{n}");
        }
        Value::Decimal(d) => {
            let _ = write!(out, "{d}");
        }
        Value::String(s) => {
            let _ = write!(out, "{s:?}");
        }
        Value::Symbol(s) => out.push_str(&symbol_label(s, resolve)),
        Value::Blob(bytes) => {
            let _ = write!(out, "{{{{{} bytes}}}}", bytes.len());
        }
        Value::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, item, resolve);
            }
            out.push(']');
        }
        Value::Struct(fields) => {
            out.push('{');
            for (i, (key, field)) in fields.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&symbol_label(key, resolve));
                out.push_str(": ");
                write_value(out, field, resolve);
            }
            out.push('}');
        }
    }
}

fn to_json(value: &Value, resolve: bool) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(n) => Json::from(*n),
        Value::Decimal(d) => serde_json::Number::from_f64(d.to_f64())
            .map(Json::Number)
            .unwrap_or_else(|| Json::String(d.to_string())),
        Value::String(s) => Json::String(s.clone()),
        Value::Symbol(s) => Json::String(symbol_label(s, resolve)),
        Value::Blob(bytes) => Json::String(format!("<{} bytes>", bytes.len())),
        Value::List(items) => Json::Array(items.iter().map(|v| to_json(v, resolve)).collect()),
        Value::Struct(fields) => Json::Object(
            fields
                .iter()
                .map(|(k, v)| (symbol_label(k, resolve), to_json(v, resolve)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fb2kfx::kfx::{Decimal, StructBuilder, sym};

    fn margin() -> Value {
        StructBuilder::new()
            .decimal(sym::VALUE, Decimal::new(15, -1))
            .symbol(sym::UNIT, sym::UNIT_RATIO)
            .build()
    }

    #[test]
    fn test_symbol_labels() {
        assert_eq!(symbol_label(sym::STYLE, false), "$157");
        assert_eq!(symbol_label(sym::STYLE, true), "$157(style)");
        assert_eq!(symbol_label("chapter1", true), "chapter1");
    }

    #[test]
    fn test_render_fragment() {
        let fragment =
            Fragment::new(sym::STYLE, "h1", StructBuilder::new().set(sym::MARGIN_TOP, margin()));
        assert_eq!(
            render_fragment(&fragment, false),
            "$157 h1 = {$47: {$306: $310, $307: 1.5}}"
        );
        let list = Value::List(vec![
            Value::Null,
            Value::Blob(vec![1, 2]),
            Value::String("a\"b".into()),
        ]);
        assert_eq!(render(&list, false), r#"[null, {{2 bytes}}, "a\"b"]"#);
    }

    #[test]
    fn test_json_resolves_keys() {
        let json = to_json(&margin(), true);
        assert_eq!(json["$307(value)"], serde_json::json!(1.5));
        assert_eq!(json["$306(unit)"], serde_json::json!("$310(lh)"));
    }
}
