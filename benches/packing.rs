//! Benchmarks for container packing and the style pipeline.
//!
//! Run with: cargo bench

use std::collections::HashMap;

use criterion::{Criterion, criterion_group, criterion_main};

use fb2kfx::css::{
    ContainerKind, ContentKind, MarginTree, StyleRegistry, Stylesheet, convert_stylesheet,
};
use fb2kfx::kfx::capabilities::default_capabilities;
use fb2kfx::kfx::resources::{Image, build_image_resource_fragments};
use fb2kfx::kfx::{
    Fragment, PackOptions, Prolog, StructBuilder, build_anchor_fragments, pack, sym, unpack,
};

const CSS: &str = "
body { font-family: \"Georgia\", serif; line-height: 1.2 }
p { margin: 0.5em 0; text-indent: 1.5em; text-align: justify }
h1, h2 { font-weight: bold; margin-top: 150%; margin-bottom: 50%; page-break-before: always }
.epigraph { margin: 1em 2em; font-style: italic }
.epigraph p { text-align: right }
.stanza { margin-bottom: 1lh }
.verse { margin: 0 0 0.3lh 0 }
.note { font-size: 80%; color: #444 }
";

/// A book-sized set of fragments: styles, anchors and a few images.
fn sample_fragments() -> Vec<Fragment> {
    let sheet = Stylesheet::parse(CSS);
    let registry: StyleRegistry = convert_stylesheet(&sheet).styles.into_iter().collect();
    let mut fragments = registry.to_fragments();

    let positions: HashMap<String, i64> = (0..500).map(|i| (format!("n{i}"), 1000 + i)).collect();
    let ids: Vec<String> = positions.keys().cloned().collect();
    fragments.extend(build_anchor_fragments(&positions, ids.iter().map(String::as_str)));

    let images: HashMap<String, Image> = (0..20)
        .map(|i| {
            let image = Image {
                mime_type: "image/jpeg".to_string(),
                data: vec![i as u8; 16 * 1024],
                width: 600,
                height: 800,
            };
            (format!("img{i}"), image)
        })
        .collect();
    fragments.extend(build_image_resource_fragments(&images).into_fragments());

    for i in 0..200 {
        let text = StructBuilder::new()
            .string(sym::ID, format!("paragraph {i} of the benchmark book"))
            .build();
        fragments.push(Fragment::new(sym::SECTION, format!("c{i}"), text));
    }
    fragments
}

fn bench_pack(c: &mut Criterion) {
    let fragments = sample_fragments();
    let prolog = Prolog::for_fragments(&fragments);
    let capabilities = default_capabilities();
    let options = PackOptions::new().container_id("CR!BENCH");

    c.bench_function("pack", |b| {
        b.iter(|| pack(&fragments, &prolog, &capabilities, &options).unwrap());
    });
}

fn bench_unpack(c: &mut Criterion) {
    let fragments = sample_fragments();
    let prolog = Prolog::for_fragments(&fragments);
    let options = PackOptions::new().container_id("CR!BENCH");
    let bytes = pack(&fragments, &prolog, &default_capabilities(), &options).unwrap();

    c.bench_function("unpack", |b| {
        b.iter(|| unpack(&bytes).unwrap());
    });
}

fn bench_convert_stylesheet(c: &mut Criterion) {
    c.bench_function("convert_stylesheet", |b| {
        b.iter(|| convert_stylesheet(&Stylesheet::parse(CSS)));
    });
}

fn bench_margin_collapse(c: &mut Criterion) {
    let sheet = Stylesheet::parse(CSS);
    let styles = convert_stylesheet(&sheet).styles;
    let registry: StyleRegistry = styles.into_iter().collect();
    let p = registry.get("p").cloned().unwrap();
    let verse = registry.get("verse").cloned().unwrap();
    let h1 = registry.get("h1").cloned().unwrap();

    c.bench_function("margin_collapse", |b| {
        b.iter(|| {
            let mut registry: StyleRegistry = registry.iter().cloned().collect();
            let mut tree = MarginTree::new();
            for _ in 0..50 {
                tree.open_virtual(ContainerKind::Section, Default::default(), Default::default());
                tree.push_content(Some(&h1), ContentKind::Text);
                for _ in 0..10 {
                    tree.push_content(Some(&p), ContentKind::Text);
                }
                tree.open_virtual(
                    ContainerKind::Stanza,
                    ContainerKind::Stanza.default_flags(),
                    Default::default(),
                );
                for _ in 0..4 {
                    tree.push_content(Some(&verse), ContentKind::Text);
                }
                tree.close_container();
                tree.close_container();
            }
            tree.collapse();
            tree.apply(&mut registry);
        });
    });
}

criterion_group!(
    benches,
    // Container
    bench_pack,
    bench_unpack,
    // Styles
    bench_convert_stylesheet,
    bench_margin_collapse,
);
criterion_main!(benches);
