//! Image and font resources for KFX.
//!
//! Each image becomes a pair of fragments: a `$164` external resource
//! describing it and a `$417` raw media fragment holding its bytes.
//! Names are derived from a 1-based index over the sorted image ids, so the
//! same image set always yields the same names.
//!
//! Embedded fonts follow the same scheme with a `$262` font declaration and
//! a `$418` raw font fragment, numbered after the images.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::css::{self, CssValue, FontFace};
use crate::kfx::fragment::{Fragment, StructBuilder};
use crate::kfx::symbols::sym;

/// A processed image supplied by the document model.
#[derive(Debug, Clone, Default)]
pub struct Image {
    pub mime_type: String,
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// What an image id was turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub resource_name: String,
    pub location: String,
    pub width: u32,
    pub height: u32,
}

/// Output of [`build_image_resource_fragments`].
#[derive(Debug, Default)]
pub struct ImageResources {
    /// `$164` external resource fragments, in index order
    pub external: Vec<Fragment>,
    /// `$417` raw media fragments, in index order
    pub raw: Vec<Fragment>,
    /// Source image id to resource
    pub by_id: HashMap<String, ResourceInfo>,
}

impl ImageResources {
    /// All fragments, descriptors first.
    pub fn into_fragments(self) -> Vec<Fragment> {
        let mut out = self.external;
        out.extend(self.raw);
        out
    }
}

/// Uppercase base-36; `"0"` for non-positive input.
pub fn base36(n: i64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if n <= 0 {
        return "0".to_string();
    }
    let mut n = n as u64;
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    out.into_iter().map(char::from).collect()
}

pub fn resource_location(index: i64) -> String {
    format!("resource/rsrc{}", base36(index))
}

pub fn resource_name(index: i64) -> String {
    format!("e{}", base36(index))
}

/// Format symbol for a MIME type; only JPEG, PNG and GIF are supported.
pub fn format_for_mime(mime_type: &str) -> Option<&'static str> {
    match mime_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some(sym::FORMAT_JPG),
        "image/png" => Some(sym::FORMAT_PNG),
        "image/gif" => Some(sym::FORMAT_GIF),
        _ => None,
    }
}

pub fn mime_for_format(format: &str) -> Option<&'static str> {
    match format {
        sym::FORMAT_JPG => Some("image/jpeg"),
        sym::FORMAT_PNG => Some("image/png"),
        sym::FORMAT_GIF => Some("image/gif"),
        _ => None,
    }
}

/// Pixel dimensions read from PNG, GIF or JPEG headers.
pub fn image_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        let width = u32::from_be_bytes(data.get(16..20)?.try_into().ok()?);
        let height = u32::from_be_bytes(data.get(20..24)?.try_into().ok()?);
        return Some((width, height));
    }

    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        let width = u16::from_le_bytes(data.get(6..8)?.try_into().ok()?);
        let height = u16::from_le_bytes(data.get(8..10)?.try_into().ok()?);
        return Some((width as u32, height as u32));
    }

    if data.starts_with(&[0xFF, 0xD8]) {
        let mut pos = 2;
        while pos + 4 <= data.len() {
            if data[pos] != 0xFF {
                pos += 1;
                continue;
            }
            let marker = data[pos + 1];
            match marker {
                // Fill bytes
                0xFF => {
                    pos += 1;
                    continue;
                }
                // Standalone markers carry no length
                0x01 | 0xD0..=0xD7 => {
                    pos += 2;
                    continue;
                }
                0xD9 | 0xDA => break,
                _ => {}
            }
            // SOF0..SOF15 except DHT, JPG and DAC
            if matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC) {
                let height = u16::from_be_bytes(data.get(pos + 5..pos + 7)?.try_into().ok()?);
                let width = u16::from_be_bytes(data.get(pos + 7..pos + 9)?.try_into().ok()?);
                return Some((width as u32, height as u32));
            }
            let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            pos += 2 + len;
        }
    }

    None
}

/// Build resource fragments for every usable image.
///
/// Images with no data or an unsupported MIME type are skipped and do not
/// consume an index. Zero dimensions are filled in from the image header
/// when it can be read.
pub fn build_image_resource_fragments(images: &HashMap<String, Image>) -> ImageResources {
    let sorted: BTreeMap<&str, &Image> = images.iter().map(|(k, v)| (k.as_str(), v)).collect();
    let mut out = ImageResources::default();
    let mut index = 0i64;

    for (id, image) in sorted {
        if image.data.is_empty() {
            tracing::debug!(id, "skipping image without data");
            continue;
        }
        let Some(format) = format_for_mime(&image.mime_type) else {
            tracing::debug!(id, mime = %image.mime_type, "skipping unsupported image type");
            continue;
        };

        let (mut width, mut height) = (image.width, image.height);
        if width == 0 || height == 0 {
            if let Some((w, h)) = image_dimensions(&image.data) {
                width = w;
                height = h;
            }
        }

        index += 1;
        let location = resource_location(index);
        let name = resource_name(index);

        out.external.push(Fragment::new(
            sym::EXTERNAL_RESOURCE,
            name.as_str(),
            StructBuilder::new()
                .symbol(sym::FORMAT, format)
                .string(sym::MIME, mime_for_format(format).unwrap_or_default())
                .string(sym::LOCATION, location.as_str())
                .string(sym::RESOURCE_NAME, name.as_str())
                .int(sym::WIDTH_PX, width as i64)
                .int(sym::HEIGHT_PX, height as i64),
        ));
        out.raw.push(Fragment::raw(
            sym::RAW_MEDIA,
            location.as_str(),
            image.data.clone(),
        ));
        out.by_id.insert(
            id.to_string(),
            ResourceInfo {
                resource_name: name,
                location,
                width,
                height,
            },
        );
    }

    out
}

/// An embedded font file, looked up by the URL in its `@font-face` src.
#[derive(Debug, Clone, Default)]
pub struct FontFile {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Output of [`build_font_resource_fragments`].
#[derive(Debug, Default)]
pub struct FontResources {
    /// `$262` font declarations
    pub fonts: Vec<Fragment>,
    /// `$418` raw font fragments
    pub raw: Vec<Fragment>,
}

impl FontResources {
    pub fn into_fragments(self) -> Vec<Fragment> {
        let mut out = self.fonts;
        out.extend(self.raw);
        out
    }
}

/// KFX name of an embedded font family: `"Serif Pro"` becomes `nav-Serif Pro`.
pub fn kfx_font_family(family: &str) -> Option<String> {
    let family = family.trim().trim_matches(['"', '\'']).trim();
    (!family.is_empty()).then(|| format!("nav-{family}"))
}

/// URL inside the first `url(...)` of a `src` descriptor.
pub fn font_url(src: &str) -> Option<&str> {
    let start = src.to_ascii_lowercase().find("url(")? + 4;
    let end = start + src[start..].find(')')?;
    let url = src[start..end].trim().trim_matches(['"', '\'']);
    (!url.is_empty()).then_some(url)
}

pub fn is_font_mime(mime_type: &str) -> bool {
    let mime = mime_type.trim().to_ascii_lowercase();
    mime.starts_with("font/")
        || mime.starts_with("application/font-")
        || mime.starts_with("application/x-font-")
        || mime == "application/vnd.ms-fontobject"
}

/// Build font fragments for every `@font-face` rule with usable data.
///
/// `first_index` is the first free resource index, one past the last image.
/// Faces whose src has no URL, whose file is missing or empty, or whose
/// MIME type is not a font are skipped. A URL shared by several faces is
/// stored once.
pub fn build_font_resource_fragments(
    faces: &[FontFace],
    files: &HashMap<String, FontFile>,
    first_index: i64,
) -> FontResources {
    let mut out = FontResources::default();
    let mut seen = HashSet::new();
    let mut index = first_index.max(1);

    for face in faces {
        let Some(family) = kfx_font_family(&face.family) else {
            continue;
        };
        let Some(url) = font_url(&face.src) else {
            tracing::debug!(family = %face.family, src = %face.src, "font src without url");
            continue;
        };
        let Some(file) = files.get(url).filter(|f| !f.data.is_empty()) else {
            tracing::warn!(family = %face.family, url, "font file not found");
            continue;
        };
        if !is_font_mime(&file.mime_type) {
            tracing::debug!(url, mime = %file.mime_type, "skipping non-font resource");
            continue;
        }
        if !seen.insert(url) {
            continue;
        }

        let weight = face
            .weight
            .as_deref()
            .and_then(|w| css::font_weight(&CssValue::parse(w)))
            .unwrap_or(sym::NORMAL);
        let style = face
            .style
            .as_deref()
            .and_then(|s| css::font_style(&CssValue::parse(s)))
            .unwrap_or(sym::NORMAL);

        let location = resource_location(index);
        out.fonts.push(Fragment::new(
            sym::FONT,
            resource_name(index),
            StructBuilder::new()
                .string(sym::FONT_FAMILY, family)
                .symbol(sym::FONT_STYLE, style)
                .symbol(sym::FONT_WEIGHT, weight)
                .symbol(sym::FONT_STRETCH, sym::NORMAL)
                .string(sym::LOCATION, location.as_str()),
        ));
        out.raw.push(Fragment::raw(sym::RAW_FONT, location, file.data.clone()));
        index += 1;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kfx::fragment::Value;

    const PNG_1X2: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13, b'I', b'H', b'D', b'R', 0, 0,
        0, 1, 0, 0, 0, 2, 8, 6, 0, 0, 0,
    ];

    fn image(mime: &str, data: &[u8]) -> Image {
        Image {
            mime_type: mime.to_string(),
            data: data.to_vec(),
            width: 10,
            height: 20,
        }
    }

    #[test]
    fn test_base36() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(-5), "0");
        assert_eq!(base36(10), "A");
        assert_eq!(base36(35), "Z");
        assert_eq!(base36(36), "10");
        assert_eq!(base36(55), "1J");
        assert_eq!(resource_location(1), "resource/rsrc1");
        assert_eq!(resource_name(46), "e1A");
    }

    #[test]
    fn test_skips_and_indexes() {
        let mut images = HashMap::new();
        images.insert("b".to_string(), image("image/png", PNG_1X2));
        images.insert("a".to_string(), image("image/jpeg", &[0xFF, 0xD8, 0xFF]));
        images.insert("c".to_string(), image("image/svg+xml", b"<svg/>"));
        images.insert("d".to_string(), image("image/gif", b""));

        let res = build_image_resource_fragments(&images);
        assert_eq!(res.external.len(), 2);
        assert_eq!(res.raw.len(), 2);
        assert_eq!(res.by_id["a"].resource_name, "e1");
        assert_eq!(res.by_id["b"].resource_name, "e2");
        assert_eq!(res.by_id["b"].location, "resource/rsrc2");
        assert!(!res.by_id.contains_key("c"));

        let ext = &res.external[1];
        assert_eq!(ext.ftype, sym::EXTERNAL_RESOURCE);
        assert_eq!(ext.fid, "e2");
        assert_eq!(ext.value.get(sym::FORMAT).and_then(|v| v.as_symbol()), Some(sym::FORMAT_PNG));
        assert_eq!(ext.value.get(sym::WIDTH_PX).and_then(|v| v.as_int()), Some(10));

        let raw = &res.raw[1];
        assert!(raw.is_raw());
        assert_eq!(raw.fid, "resource/rsrc2");
        assert_eq!(raw.as_raw(), Some(PNG_1X2));
    }

    #[test]
    fn test_naming_independent_of_insertion_order() {
        let ids = ["cover", "img1", "img2", "img10"];
        let mut forward = HashMap::new();
        for id in ids {
            forward.insert(id.to_string(), image("image/jpeg", b"\xFF\xD8"));
        }
        let mut backward = HashMap::new();
        for id in ids.iter().rev() {
            backward.insert(id.to_string(), image("image/jpeg", b"\xFF\xD8"));
        }
        assert_eq!(
            build_image_resource_fragments(&forward).by_id,
            build_image_resource_fragments(&backward).by_id
        );
    }

    #[test]
    fn test_dimensions_filled_from_header() {
        let mut images = HashMap::new();
        images.insert(
            "p".to_string(),
            Image {
                mime_type: "image/png".into(),
                data: PNG_1X2.to_vec(),
                ..Default::default()
            },
        );
        let res = build_image_resource_fragments(&images);
        assert_eq!((res.by_id["p"].width, res.by_id["p"].height), (1, 2));
    }

    #[test]
    fn test_image_dimensions() {
        assert_eq!(image_dimensions(PNG_1X2), Some((1, 2)));
        assert_eq!(image_dimensions(b"GIF89a\x03\x00\x04\x00"), Some((3, 4)));

        // APP0 segment then SOF0 with 8-bit precision, height 0x0020, width 0x0010
        let jpeg = [
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00, 0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00,
            0x20, 0x00, 0x10, 0x01,
        ];
        assert_eq!(image_dimensions(&jpeg), Some((16, 32)));
        assert_eq!(image_dimensions(b"not an image"), None);
    }

    #[test]
    fn test_mime_mapping() {
        assert_eq!(format_for_mime(" IMAGE/JPG "), Some(sym::FORMAT_JPG));
        assert_eq!(format_for_mime("image/webp"), None);
        assert_eq!(mime_for_format(sym::FORMAT_GIF), Some("image/gif"));
    }

    fn font_face(family: &str, src: &str, style: Option<&str>, weight: Option<&str>) -> FontFace {
        FontFace {
            family: family.into(),
            src: src.into(),
            style: style.map(Into::into),
            weight: weight.map(Into::into),
        }
    }

    #[test]
    fn test_font_helpers() {
        assert_eq!(kfx_font_family("\"Serif Pro\"").as_deref(), Some("nav-Serif Pro"));
        assert_eq!(kfx_font_family(" '' "), None);
        assert_eq!(font_url("url(\"fonts/a.ttf\") format(\"truetype\")"), Some("fonts/a.ttf"));
        assert_eq!(font_url("URL(b.otf)"), Some("b.otf"));
        assert_eq!(font_url("local(Arial)"), None);
        assert!(is_font_mime("font/otf"));
        assert!(is_font_mime("application/x-font-ttf"));
        assert!(!is_font_mime("image/png"));
    }

    #[test]
    fn test_font_fragments() {
        let faces = [
            font_face("Body", "url(fonts/body.ttf)", None, None),
            font_face("Body", "url(fonts/body-bi.ttf)", Some("italic"), Some("700")),
            font_face("Dropcap", "url(fonts/body.ttf)", None, None),
            font_face("Missing", "url(fonts/none.ttf)", None, None),
            font_face("Picture", "url(img.png)", None, None),
        ];
        let file = |mime: &str, data: &[u8]| FontFile {
            mime_type: mime.into(),
            data: data.to_vec(),
        };
        let files = HashMap::from([
            ("fonts/body.ttf".to_string(), file("font/ttf", &[1, 2])),
            ("fonts/body-bi.ttf".to_string(), file("font/ttf", &[3])),
            ("img.png".to_string(), file("image/png", &[4])),
        ]);

        let res = build_font_resource_fragments(&faces, &files, 3);
        assert_eq!(res.fonts.len(), 2);
        assert_eq!(res.raw.len(), 2);

        let regular = &res.fonts[0];
        assert_eq!(regular.ftype, sym::FONT);
        assert_eq!(regular.fid, "e3");
        let field = |f: &Fragment, key: &str| f.value.get(key).cloned();
        assert_eq!(field(regular, sym::FONT_FAMILY), Some(Value::String("nav-Body".into())));
        assert_eq!(field(regular, sym::FONT_WEIGHT), Some(Value::symbol(sym::NORMAL)));
        assert_eq!(
            regular.value.get(sym::LOCATION).and_then(|v| v.as_str()),
            Some("resource/rsrc3")
        );

        let bold_italic = &res.fonts[1];
        assert_eq!(field(bold_italic, sym::FONT_STYLE), Some(Value::symbol(sym::ITALIC)));
        assert_eq!(field(bold_italic, sym::FONT_WEIGHT), Some(Value::symbol(sym::WEIGHT_BOLD)));

        assert!(res.raw.iter().all(Fragment::is_raw));
        assert_eq!(res.raw[1].fid, "resource/rsrc4");
        assert_eq!(res.raw[1].as_raw(), Some(&[3u8][..]));
    }
}
