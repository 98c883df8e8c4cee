//! Per-page raster discovery: the candidates the image selector ranks.
//!
//! For every page the content stream is decoded into [`Operator`]s. Each
//! `PaintImage` is resolved through the page resources (inherited from parent
//! page-tree nodes when the page has none of its own), decoded to RGB, and
//! sized on the page with the nearest preceding transform.
//!
//! ## Failure policy
//!
//! Nothing in here returns an error. One bad image is skipped with a warning;
//! a page whose content cannot be decoded contributes no candidates; a file
//! lopdf cannot open contributes none at all. A record without an image is a
//! normal outcome downstream.

use super::content::{decode_operators, scaled_size, transform_before, Operator};
use super::encode::encode_thumbnail;
use crate::config::CandidatePolicy;
use crate::error::{ImageIssue, PipelineError};
use image::{DynamicImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Thumbnails (JPEG data-URIs) per 1-based page number, in paint order.
pub type PageCandidates = BTreeMap<u32, Vec<String>>;

/// A raster found on a page, before thumbnailing.
#[derive(Debug, Clone)]
pub struct PageImageCandidate {
    /// `"<num> <gen> R"` for indirect objects, otherwise the resource name.
    pub source_object_id: String,
    pub pixel_width: u32,
    pub pixel_height: u32,
    /// Packed RGB, `pixel_width * pixel_height * 3` bytes.
    pub pixels: Vec<u8>,
    pub scaled_width: f32,
    pub scaled_height: f32,
    /// 1-based page number.
    pub page: u32,
}

impl PageImageCandidate {
    pub fn scaled_area(&self) -> f32 {
        self.scaled_width * self.scaled_height
    }

    fn to_image(&self) -> Option<DynamicImage> {
        RgbImage::from_raw(self.pixel_width, self.pixel_height, self.pixels.clone()).map(DynamicImage::ImageRgb8)
    }
}

/// Find every candidate on every page of a PDF and thumbnail them.
///
/// Runs in `spawn_blocking`: content decoding and JPEG encoding are CPU-bound.
pub async fn extract_document_candidates(
    bytes: std::sync::Arc<Vec<u8>>,
    policy: CandidatePolicy,
    thumbnail_edge: u32,
) -> Result<PageCandidates, PipelineError> {
    tokio::task::spawn_blocking(move || {
        let doc = match Document::load_mem(&bytes) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Image discovery skipped, document not parseable: {e}");
                return PageCandidates::new();
            }
        };
        let mut out = PageCandidates::new();
        for (page, page_id) in doc.get_pages() {
            let candidates = apply_policy(extract_candidate_images(&doc, page_id, page), policy);
            let thumbs: Vec<String> = candidates
                .iter()
                .filter_map(|c| thumbnail(c, thumbnail_edge))
                .collect();
            debug!("Page {page}: {} image candidates", thumbs.len());
            out.insert(page, thumbs);
        }
        info!(
            "Found {} image candidates across {} pages",
            out.values().map(Vec::len).sum::<usize>(),
            out.len()
        );
        out
    })
    .await
    .map_err(|e| PipelineError::Internal(format!("Image discovery task panicked: {e}")))
}

fn thumbnail(candidate: &PageImageCandidate, edge: u32) -> Option<String> {
    let encoded = candidate
        .to_image()
        .ok_or_else(|| "pixel buffer does not match dimensions".to_string())
        .and_then(|img| encode_thumbnail(&img, edge).map_err(|e| e.to_string()));
    match encoded {
        Ok(uri) => Some(uri),
        Err(detail) => {
            let issue = ImageIssue::Resolution {
                page: candidate.page,
                object: candidate.source_object_id.clone(),
                detail,
            };
            warn!("{issue}");
            None
        }
    }
}

/// Keep all candidates, or just the one with the largest on-page area.
pub fn apply_policy(mut candidates: Vec<PageImageCandidate>, policy: CandidatePolicy) -> Vec<PageImageCandidate> {
    match policy {
        CandidatePolicy::AllCandidates => candidates,
        CandidatePolicy::LargestOnly => {
            // First strictly largest wins; zero-area paints never qualify.
            let mut largest: Option<(usize, f32)> = None;
            for (i, c) in candidates.iter().enumerate() {
                let area = c.scaled_area();
                if area > largest.map_or(0.0, |(_, best)| best) {
                    largest = Some((i, area));
                }
            }
            match largest {
                Some((i, _)) => vec![candidates.swap_remove(i)],
                None => Vec::new(),
            }
        }
    }
}

/// Every raster painted on one page. Never fails; see the module docs.
pub fn extract_candidate_images(doc: &Document, page_id: ObjectId, page: u32) -> Vec<PageImageCandidate> {
    let ops = match doc
        .get_page_content(page_id)
        .and_then(|content| decode_operators(&content))
    {
        Ok(ops) => ops,
        Err(e) => {
            warn!("Page {page}: content stream unreadable, no image candidates: {e}");
            return Vec::new();
        }
    };
    let xobjects = page_xobjects(doc, page_id);

    let mut out = Vec::new();
    for (index, op) in ops.iter().enumerate() {
        let Operator::PaintImage(name) = op else {
            continue;
        };
        let Some(xobjects) = xobjects else {
            warn!("{}", ImageIssue::Resolution {
                page,
                object: name.clone(),
                detail: "page has no XObject resources".into(),
            });
            continue;
        };
        match resolve_raster(doc, xobjects, name) {
            Ok(Some((source_object_id, img))) => {
                let (scaled_width, scaled_height) =
                    scaled_size(img.width(), img.height(), &transform_before(&ops, index));
                out.push(PageImageCandidate {
                    source_object_id,
                    pixel_width: img.width(),
                    pixel_height: img.height(),
                    pixels: img.into_raw(),
                    scaled_width,
                    scaled_height,
                    page,
                });
            }
            // A form or other non-image XObject.
            Ok(None) => {}
            Err(detail) => warn!("{}", ImageIssue::Resolution {
                page,
                object: name.clone(),
                detail,
            }),
        }
    }
    out
}

// ── Object resolution ────────────────────────────────────────────────────

fn deref<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn dict_entry<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    dict.get(key).ok().and_then(|o| deref(doc, o))
}

/// The `/XObject` dictionary for a page, walking `/Parent` for inherited
/// resources.
fn page_xobjects(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    // The depth guard protects against cyclic Parent chains.
    for _ in 0..32 {
        if let Some(resources) = dict_entry(doc, node, b"Resources").and_then(|o| o.as_dict().ok()) {
            if let Some(xobjects) = dict_entry(doc, resources, b"XObject").and_then(|o| o.as_dict().ok()) {
                return Some(xobjects);
            }
        }
        node = dict_entry(doc, node, b"Parent")?.as_dict().ok()?;
    }
    None
}

/// Resolve `/name` to a decoded RGB raster. `Ok(None)` for non-image XObjects.
fn resolve_raster(doc: &Document, xobjects: &Dictionary, name: &str) -> Result<Option<(String, RgbImage)>, String> {
    let entry = xobjects
        .get(name.as_bytes())
        .map_err(|_| "not in the page's XObject resources".to_string())?;
    let source = match entry {
        Object::Reference((num, gen)) => format!("{num} {gen} R"),
        _ => name.to_string(),
    };
    let stream = deref(doc, entry)
        .and_then(|o| o.as_stream().ok())
        .ok_or_else(|| "XObject is not a stream".to_string())?;

    let subtype = dict_entry(doc, &stream.dict, b"Subtype").and_then(|o| o.as_name().ok());
    if subtype != Some(b"Image".as_slice()) {
        return Ok(None);
    }
    decode_raster(doc, stream).map(|img| Some((source, img)))
}

fn dimension(doc: &Document, dict: &Dictionary, key: &[u8]) -> Result<u32, String> {
    let label = String::from_utf8_lossy(key);
    let value = dict_entry(doc, dict, key)
        .ok_or_else(|| format!("missing /{label}"))?
        .as_i64()
        .map_err(|_| format!("/{label} is not an integer"))?;
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| format!("/{label} out of range: {value}"))
}

fn filters(doc: &Document, dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict_entry(doc, dict, b"Filter") {
        Some(Object::Name(n)) => vec![n.clone()],
        Some(Object::Array(items)) => items
            .iter()
            .filter_map(|o| deref(doc, o).and_then(|o| o.as_name().ok()).map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

/// Colour components per sample for the supported colour spaces.
fn components(doc: &Document, dict: &Dictionary) -> Result<usize, String> {
    let Some(space) = dict_entry(doc, dict, b"ColorSpace") else {
        return Err("missing /ColorSpace".into());
    };
    let (family, params) = match space {
        Object::Name(n) => (n.as_slice(), None),
        Object::Array(items) => {
            let family = items
                .first()
                .and_then(|o| deref(doc, o))
                .and_then(|o| o.as_name().ok())
                .ok_or_else(|| "empty colour space array".to_string())?;
            (family, items.get(1).and_then(|o| deref(doc, o)))
        }
        _ => return Err("unreadable /ColorSpace".into()),
    };
    match family {
        b"DeviceRGB" | b"CalRGB" => Ok(3),
        b"DeviceGray" | b"CalGray" => Ok(1),
        b"DeviceCMYK" => Ok(4),
        b"ICCBased" => params
            .and_then(|o| o.as_stream().ok())
            .and_then(|s| dict_entry(doc, &s.dict, b"N"))
            .and_then(|n| n.as_i64().ok())
            .filter(|n| matches!(*n, 1 | 3 | 4))
            .map(|n| n as usize)
            .ok_or_else(|| "ICCBased profile without a usable /N".to_string()),
        other => Err(format!("unsupported colour space {}", String::from_utf8_lossy(other))),
    }
}

/// Largest raster decoded for thumbnailing, in pixels (10k x 10k).
const MAX_RASTER_PIXELS: u64 = 100_000_000;

fn decode_raster(doc: &Document, stream: &Stream) -> Result<RgbImage, String> {
    let dict = &stream.dict;
    let width = dimension(doc, dict, b"Width")?;
    let height = dimension(doc, dict, b"Height")?;
    if u64::from(width) * u64::from(height) > MAX_RASTER_PIXELS {
        return Err(format!("{width}x{height} exceeds the {MAX_RASTER_PIXELS} pixel limit"));
    }
    let filters = filters(doc, dict);

    if filters.iter().any(|f| f == b"DCTDecode") {
        let img = image::load_from_memory(&stream.content).map_err(|e| format!("JPEG decode: {e}"))?;
        return Ok(img.to_rgb8());
    }

    let samples = match filters.as_slice() {
        [] => stream.content.clone(),
        [f] if f == b"FlateDecode" => stream
            .decompressed_content()
            .map_err(|e| format!("Flate decode: {e}"))?,
        _ => {
            let names: Vec<_> = filters.iter().map(|f| String::from_utf8_lossy(f).into_owned()).collect();
            return Err(format!("unsupported filter chain {names:?}"));
        }
    };

    let bits = dict_entry(doc, dict, b"BitsPerComponent")
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(8);
    if bits != 8 {
        return Err(format!("{bits} bits per component not supported"));
    }
    let channels = components(doc, dict)?;
    let (w, h) = (width as usize, height as usize);
    let needed = w
        .checked_mul(h)
        .and_then(|n| n.checked_mul(channels))
        .ok_or_else(|| "dimensions overflow".to_string())?;
    if samples.len() < needed {
        return Err(format!("sample data too short: {} of {needed} bytes", samples.len()));
    }

    let rgb: Vec<u8> = match channels {
        3 => samples[..needed].to_vec(),
        1 => samples[..needed].iter().flat_map(|&g| [g, g, g]).collect(),
        _ => samples[..needed]
            .chunks_exact(4)
            .flat_map(|p| {
                let k = 255 - p[3] as u16;
                let ch = |c: u8| ((255 - c as u16) * k / 255) as u8;
                [ch(p[0]), ch(p[1]), ch(p[2])]
            })
            .collect(),
    };
    RgbImage::from_raw(width, height, rgb).ok_or_else(|| "pixel buffer does not match dimensions".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn candidate(id: &str, w: f32, h: f32) -> PageImageCandidate {
        PageImageCandidate {
            source_object_id: id.into(),
            pixel_width: 1,
            pixel_height: 1,
            pixels: vec![0, 0, 0],
            scaled_width: w,
            scaled_height: h,
            page: 1,
        }
    }

    #[test]
    fn largest_only_keeps_biggest_scaled_area() {
        let all = vec![candidate("a", 10.0, 10.0), candidate("b", 40.0, 5.0), candidate("c", 30.0, 30.0)];
        let kept = apply_policy(all.clone(), CandidatePolicy::LargestOnly);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].source_object_id, "c");
        assert_eq!(apply_policy(all, CandidatePolicy::AllCandidates).len(), 3);
        assert!(apply_policy(vec![], CandidatePolicy::LargestOnly).is_empty());
    }

    #[test]
    fn largest_only_tie_keeps_first_and_skips_zero_area() {
        let tied = vec![candidate("a", 20.0, 10.0), candidate("b", 10.0, 20.0)];
        assert_eq!(apply_policy(tied, CandidatePolicy::LargestOnly)[0].source_object_id, "a");

        let flat = vec![candidate("a", 0.0, 10.0), candidate("b", 30.0, 0.0)];
        assert!(apply_policy(flat, CandidatePolicy::LargestOnly).is_empty());
    }

    #[test]
    fn cmyk_and_gray_convert_to_rgb() {
        let doc = Document::with_version("1.5");
        let gray = Stream::new(
            lopdf::dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 2,
                "Height" => 1,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0, 255],
        );
        let img = decode_raster(&doc, &gray).unwrap();
        assert_eq!(img.as_raw(), &vec![0, 0, 0, 255, 255, 255]);

        let cmyk = Stream::new(
            lopdf::dictionary! {
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
                "ColorSpace" => "DeviceCMYK",
            },
            vec![0, 255, 255, 0],
        );
        let img = decode_raster(&doc, &cmyk).unwrap();
        assert_eq!(img.as_raw(), &vec![255, 0, 0]);

        let missing = Stream::new(lopdf::dictionary! { "Subtype" => "Image", "Height" => 1 }, vec![]);
        assert!(decode_raster(&doc, &missing).unwrap_err().contains("Width"));
    }

    #[test]
    fn short_sample_data_is_rejected() {
        let doc = Document::with_version("1.5");
        let stream = Stream::new(
            lopdf::dictionary! {
                "Subtype" => "Image",
                "Width" => 4,
                "Height" => 4,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            vec![1, 2, 3],
        );
        assert!(decode_raster(&doc, &stream).unwrap_err().contains("too short"));
    }

    #[test]
    fn oversized_dimensions_are_rejected_before_decoding() {
        let doc = Document::with_version("1.5");
        let stream = Stream::new(
            lopdf::dictionary! {
                "Subtype" => "Image",
                "Width" => 2_147_483_648_i64,
                "Height" => 2_147_483_648_i64,
                "ColorSpace" => "DeviceCMYK",
                "BitsPerComponent" => 8,
            },
            vec![0, 0, 0, 0],
        );
        assert!(decode_raster(&doc, &stream).unwrap_err().contains("pixel limit"));
    }
}
