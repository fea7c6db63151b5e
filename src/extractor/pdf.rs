//! PDF image extraction.
//!
//! Only image XObjects reachable from page resources are extracted, including
//! those nested in form XObjects; inline images and vector content are
//! ignored. Flate layers are inflated first. JPEG and JPEG 2000 data is then
//! written as-is, and 8-bit pixel data is rewrapped as PNG without touching the
//! samples (CMYK is converted to RGB).

use std::borrow::Cow;
use std::collections::HashSet;
use std::fs;
use std::io::{self, Read};
use std::path::Path;

use flate2::read::ZlibDecoder;
use image::ColorType;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::{Error, Result};
use crate::extractor::ArchiveReader;

/// Limit on `/Parent` hops when looking for inherited resources.
const MAX_INHERITANCE_DEPTH: usize = 32;

/// Limit on form XObjects nested inside each other.
const MAX_FORM_DEPTH: usize = 8;

/// Reader for PDF documents.
pub struct PdfReader;

impl ArchiveReader for PdfReader {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn unpack(&self, archive_path: &Path, scratch: &Path) -> Result<()> {
        let document = Document::load(archive_path).map_err(|e| Error::corrupt(archive_path, e))?;

        for (page_number, page_id) in document.get_pages() {
            let Some(xobjects) = page_xobjects(&document, page_id) else {
                continue;
            };

            let mut seen: HashSet<ObjectId> = HashSet::new();
            let mut images = Vec::new();
            collect_image_streams(&document, xobjects, 0, &mut seen, &mut images);

            for (index, stream) in images.into_iter().enumerate() {
                let stem = format!("page_{:04}_img_{:02}", page_number, index + 1);
                if !write_image(&document, stream, scratch, &stem)? {
                    log::debug!(
                        "Skipped image {} on page {} of '{}'",
                        index + 1,
                        page_number,
                        archive_path.display()
                    );
                }
            }
        }

        Ok(())
    }
}

/// Finds the `/XObject` dictionary of a page, honouring inherited `/Resources`.
fn page_xobjects(document: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = document.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_INHERITANCE_DEPTH {
        if let Ok(resources) = node.get(b"Resources") {
            return resource_xobjects(document, resources);
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = document.get_dictionary(parent).ok()?;
    }
    None
}

/// The `/XObject` dictionary of a `/Resources` entry.
fn resource_xobjects<'a>(document: &'a Document, resources: &'a Object) -> Option<&'a Dictionary> {
    let (_, resources) = document.dereference(resources).ok()?;
    let xobjects = resources.as_dict().ok()?.get(b"XObject").ok()?;
    let (_, xobjects) = document.dereference(xobjects).ok()?;
    xobjects.as_dict().ok()
}

/// Gathers image streams in resource order, descending into form XObjects.
/// Objects referenced more than once are visited once.
fn collect_image_streams<'a>(
    document: &'a Document,
    xobjects: &'a Dictionary,
    depth: usize,
    seen: &mut HashSet<ObjectId>,
    images: &mut Vec<&'a Stream>,
) {
    for (_, object) in xobjects.iter() {
        if let Object::Reference(id) = object {
            if !seen.insert(*id) {
                continue;
            }
        }
        let Ok((_, resolved)) = document.dereference(object) else {
            continue;
        };
        let Ok(stream) = resolved.as_stream() else {
            continue;
        };

        match subtype(&stream.dict) {
            Some(b"Image") => images.push(stream),
            Some(b"Form") if depth < MAX_FORM_DEPTH => {
                let nested = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|resources| resource_xobjects(document, resources));
                if let Some(nested) = nested {
                    collect_image_streams(document, nested, depth + 1, seen, images);
                }
            }
            _ => {}
        }
    }
}

fn subtype(dict: &Dictionary) -> Option<&[u8]> {
    match dict.get(b"Subtype") {
        Ok(Object::Name(name)) => Some(name.as_slice()),
        _ => None,
    }
}

fn filters(dict: &Dictionary) -> Vec<&[u8]> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.as_slice()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Object::Name(name) => Some(name.as_slice()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// True when `/DecodeParms` asks for a PNG or TIFF predictor.
fn uses_predictor(document: &Document, dict: &Dictionary) -> bool {
    let Ok(params) = dict.get(b"DecodeParms") else {
        return false;
    };
    let predictor_of = |object: &Object| {
        document
            .dereference(object)
            .ok()
            .and_then(|(_, object)| object.as_dict().ok())
            .and_then(|params| params.get(b"Predictor").and_then(Object::as_i64).ok())
            .unwrap_or(1)
    };
    match params {
        Object::Array(items) => items.iter().any(|item| predictor_of(item) > 1),
        other => predictor_of(other) > 1,
    }
}

fn inflate(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut inflated = Vec::new();
    ZlibDecoder::new(data).read_to_end(&mut inflated)?;
    Ok(inflated)
}

/// Writes one image stream. Returns `false` if the encoding is not supported.
fn write_image(document: &Document, stream: &Stream, scratch: &Path, stem: &str) -> Result<bool> {
    let dict = &stream.dict;
    let filters = filters(dict);

    let mut data = Cow::Borrowed(stream.content.as_slice());
    let mut remaining = filters.as_slice();
    while let [b"FlateDecode", rest @ ..] = remaining {
        if uses_predictor(document, dict) {
            return Ok(false);
        }
        data = match inflate(&data) {
            Ok(inflated) => Cow::Owned(inflated),
            Err(e) => {
                log::debug!("Could not inflate image stream: {}", e);
                return Ok(false);
            }
        };
        remaining = rest;
    }

    match remaining {
        [b"DCTDecode"] => {
            fs::write(scratch.join(format!("{}.jpg", stem)), &data)?;
            return Ok(true);
        }
        [b"JPXDecode"] => {
            fs::write(scratch.join(format!("{}.jp2", stem)), &data)?;
            return Ok(true);
        }
        [] => {}
        _ => return Ok(false),
    }

    let bits = dict.get(b"BitsPerComponent").and_then(Object::as_i64).unwrap_or(8);
    let width = dict.get(b"Width").and_then(Object::as_i64).unwrap_or(0);
    let height = dict.get(b"Height").and_then(Object::as_i64).unwrap_or(0);
    if bits != 8 || width <= 0 || height <= 0 {
        return Ok(false);
    }
    let Some(components) = color_components(document, dict) else {
        return Ok(false);
    };

    let (width, height) = (width as u32, height as u32);
    let expected = width as usize * height as usize * components;
    if data.len() < expected {
        return Ok(false);
    }
    let samples = &data[..expected];

    let destination = scratch.join(format!("{}.png", stem));
    let saved = match components {
        1 => image::save_buffer(&destination, samples, width, height, ColorType::L8),
        3 => image::save_buffer(&destination, samples, width, height, ColorType::Rgb8),
        _ => image::save_buffer(&destination, &cmyk_to_rgb(samples), width, height, ColorType::Rgb8),
    };
    saved.map_err(|e| Error::Io(io::Error::other(e)))?;
    Ok(true)
}

/// Number of colour components for the supported colour spaces.
fn color_components(document: &Document, dict: &Dictionary) -> Option<usize> {
    let (_, space) = document.dereference(dict.get(b"ColorSpace").ok()?).ok()?;
    match space {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" => Some(1),
            b"DeviceRGB" => Some(3),
            b"DeviceCMYK" => Some(4),
            _ => None,
        },
        Object::Array(items) => {
            let family = match items.first()? {
                Object::Name(name) => name.as_slice(),
                _ => return None,
            };
            if family != b"ICCBased" {
                return None;
            }
            let (_, profile) = document.dereference(items.get(1)?).ok()?;
            let n = profile.as_stream().ok()?.dict.get(b"N").ok()?.as_i64().ok()?;
            matches!(n, 1 | 3 | 4).then_some(n as usize)
        }
        _ => None,
    }
}

fn cmyk_to_rgb(samples: &[u8]) -> Vec<u8> {
    samples
        .chunks_exact(4)
        .flat_map(|px| {
            let k = 255 - px[3] as u16;
            [px[0], px[1], px[2]].map(|c| ((255 - c as u16) * k / 255) as u8)
        })
        .collect()
}
