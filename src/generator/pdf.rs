//! PDF generation, one page per image.
//!
//! Every page's MediaBox equals the image's pixel size (1px = 1pt) and the
//! image fills it. JPEG files are embedded byte for byte as `DCTDecode`
//! streams. Everything else is decoded once and embedded as an 8-bit
//! `FlateDecode` pixel stream; transparency is flattened onto white because
//! PDF image XObjects have no alpha channel of their own.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use byteorder::{BigEndian, ByteOrder};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use image::DynamicImage;
use lopdf::{Document, Object, ObjectId, Stream, StringFormat, dictionary};
use tokio::task::spawn_blocking;

use crate::error::{Error, Result};
use crate::generator::Generator;

/// An image XObject ready to be placed on a page.
struct PageImage {
    width: u32,
    height: u32,
    stream: Stream,
}

/// Size and component count read from a JPEG frame header.
#[derive(Debug, PartialEq, Eq)]
struct JpegFrame {
    width: u32,
    height: u32,
    components: u8,
}

/// Scans JPEG markers up to the first start-of-frame segment.
fn jpeg_frame(bytes: &[u8]) -> Option<JpegFrame> {
    if !bytes.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];
        match marker {
            0xFF => {
                pos += 1;
                continue;
            }
            0x01 | 0xD0..=0xD9 => {
                pos += 2;
                continue;
            }
            _ => {}
        }
        let length = BigEndian::read_u16(&bytes[pos + 2..]) as usize;
        // SOF0..SOF15, minus DHT, JPG and DAC
        if (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC) {
            let header = bytes.get(pos + 4..pos + 10)?;
            let frame = JpegFrame {
                height: BigEndian::read_u16(&header[1..3]) as u32,
                width: BigEndian::read_u16(&header[3..5]) as u32,
                components: header[5],
            };
            return (frame.width > 0 && frame.height > 0).then_some(frame);
        }
        pos += 2 + length;
    }
    None
}

fn jpeg_image(bytes: Vec<u8>, frame: JpegFrame) -> Option<PageImage> {
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => frame.width as i64,
        "Height" => frame.height as i64,
        "BitsPerComponent" => 8,
        "Filter" => "DCTDecode",
    };
    match frame.components {
        1 => dict.set("ColorSpace", "DeviceGray"),
        3 => dict.set("ColorSpace", "DeviceRGB"),
        4 => {
            // Adobe CMYK JPEGs store inverted samples
            dict.set("ColorSpace", "DeviceCMYK");
            dict.set(
                "Decode",
                [1, 0, 1, 0, 1, 0, 1, 0]
                    .into_iter()
                    .map(Object::Integer)
                    .collect::<Vec<_>>(),
            );
        }
        _ => return None,
    }
    Some(PageImage {
        width: frame.width,
        height: frame.height,
        stream: Stream::new(dict, bytes),
    })
}

fn flatten_onto_white(color: u8, alpha: u8) -> u8 {
    ((color as u16 * alpha as u16 + 255 * (255 - alpha as u16)) / 255) as u8
}

fn pixel_image(decoded: DynamicImage) -> Result<PageImage> {
    let (width, height) = (decoded.width(), decoded.height());
    let color = decoded.color();

    let (color_space, samples): (&str, Vec<u8>) = if color.has_color() {
        let samples = if color.has_alpha() {
            decoded
                .to_rgba8()
                .pixels()
                .flat_map(|p| [0, 1, 2].map(|c| flatten_onto_white(p.0[c], p.0[3])))
                .collect()
        } else {
            decoded.to_rgb8().into_raw()
        };
        ("DeviceRGB", samples)
    } else {
        let samples = if color.has_alpha() {
            decoded
                .to_luma_alpha8()
                .pixels()
                .map(|p| flatten_onto_white(p.0[0], p.0[1]))
                .collect()
        } else {
            decoded.to_luma8().into_raw()
        };
        ("DeviceGray", samples)
    };

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&samples)?;
    let compressed = encoder.finish()?;

    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => color_space,
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };
    Ok(PageImage {
        width,
        height,
        stream: Stream::new(dict, compressed),
    })
}

fn page_image(image_path: &Path, bytes: Vec<u8>) -> Result<PageImage> {
    if let Some(frame) = jpeg_frame(&bytes) {
        if let Some(image) = jpeg_image(bytes.clone(), frame) {
            return Ok(image);
        }
    }
    let decoded = image::load_from_memory(&bytes).map_err(|e| Error::corrupt(image_path, e))?;
    pixel_image(decoded)
}

/// Encodes a text string for the document information dictionary.
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        Object::string_literal(text)
    } else {
        let mut utf16 = vec![0xFE, 0xFF];
        utf16.extend(text.encode_utf16().flat_map(u16::to_be_bytes));
        Object::String(utf16, StringFormat::Hexadecimal)
    }
}

/// A generator for image-per-page PDF documents.
pub struct Pdf {
    output_path: PathBuf,
    title: String,
    document: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

#[async_trait]
impl Generator for Pdf {
    fn new(output_path: &Path, title: &str) -> Result<Self> {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        Ok(Pdf {
            output_path: output_path.to_path_buf(),
            title: title.to_string(),
            document,
            pages_id,
            kids: Vec::new(),
        })
    }

    async fn add_page(&mut self, image_path: &Path) -> Result<&mut Self> {
        let bytes = tokio::fs::read(image_path).await?;
        let path = image_path.to_path_buf();
        let image = spawn_blocking(move || page_image(&path, bytes))
            .await
            .map_err(|e| Error::AsyncTaskError(e.to_string()))??;

        let (width, height) = (image.width as i64, image.height as i64);
        let image_id = self.document.add_object(image.stream);
        let content = format!("q {} 0 0 {} 0 0 cm /Im0 Do Q", width, height);
        let content_id = self
            .document
            .add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = self.document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
            "Contents" => content_id,
        });
        self.kids.push(page_id.into());
        Ok(self)
    }

    async fn save(mut self) -> Result<()> {
        let count = self.kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => std::mem::take(&mut self.kids),
            "Count" => count,
        };
        self.document
            .objects
            .insert(self.pages_id, Object::Dictionary(pages));
        let catalog_id = self.document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        let info_id = self.document.add_object(dictionary! {
            "Title" => text_string(&self.title),
            "Producer" => Object::string_literal("hako"),
        });
        self.document.trailer.set("Root", catalog_id);
        self.document.trailer.set("Info", info_id);

        let mut document = self.document;
        let output_path = self.output_path;
        spawn_blocking(move || {
            document
                .save(&output_path)
                .map(|_| ())
                .map_err(|e| Error::Io(io::Error::other(e.to_string())))
        })
        .await
        .map_err(|e| Error::AsyncTaskError(e.to_string()))??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::ArchiveReader;
    use crate::extractor::pdf::PdfReader;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn reads_frame_header_after_app_segments() {
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00];
        jpeg.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08, 0x02, 0x58, 0x01, 0x90, 0x03]);
        assert_eq!(
            jpeg_frame(&jpeg),
            Some(JpegFrame {
                width: 400,
                height: 600,
                components: 3
            })
        );
        assert_eq!(jpeg_frame(b"\x89PNG"), None);
    }

    #[test]
    fn transparency_becomes_white() {
        assert_eq!(flatten_onto_white(0, 0), 255);
        assert_eq!(flatten_onto_white(10, 255), 10);
    }

    #[tokio::test]
    async fn pages_match_images_and_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let jpeg_path = dir.path().join("01.jpg");
        RgbImage::from_pixel(3, 2, Rgb([200, 10, 10]))
            .save(&jpeg_path)
            .unwrap();
        let png_path = dir.path().join("02.png");
        let mut png = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 255, 255]));
        png.put_pixel(1, 0, Rgba([0, 0, 0, 0]));
        png.save(&png_path).unwrap();
        let output = dir.path().join("book.pdf");

        let mut pdf = Pdf::new(&output, "Book ü")?;
        pdf.add_page(&jpeg_path).await?;
        pdf.add_page(&png_path).await?;
        pdf.save().await?;

        let document = Document::load(&output).unwrap();
        let pages = document.get_pages();
        assert_eq!(pages.len(), 2);
        let first = document.get_dictionary(pages[&1]).unwrap();
        let media_box = first.get(b"MediaBox").unwrap().as_array().unwrap();
        assert_eq!(media_box[2].as_i64().unwrap(), 3);
        assert_eq!(media_box[3].as_i64().unwrap(), 2);

        let scratch = dir.path().join("scratch");
        std::fs::create_dir_all(&scratch)?;
        PdfReader.unpack(&output, &scratch)?;
        assert_eq!(
            std::fs::read(scratch.join("page_0001_img_01.jpg"))?,
            std::fs::read(&jpeg_path)?
        );
        let flattened = image::open(scratch.join("page_0002_img_01.png"))
            .unwrap()
            .to_rgb8();
        assert_eq!(flattened.get_pixel(0, 0), &Rgb([0, 0, 255]));
        assert_eq!(flattened.get_pixel(1, 0), &Rgb([255, 255, 255]));
        Ok(())
    }
}
