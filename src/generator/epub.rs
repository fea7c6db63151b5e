use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};
use crate::generator::{EntryNamer, Generator, escape_xml};
use crate::path_utils::path_to_string_lossy;
use crate::types::epub_media_type;
use async_trait::async_trait;
use chrono::Utc;
use memmap2::MmapOptions;
use tokio::task::spawn_blocking;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const CONTAINER_XML: &str = include_str!("../../templates/epub/container.xml");
const PAGE_XHTML: &str = include_str!("../../templates/epub/page.xhtml");
const CONTENT_OPF: &str = include_str!("../../templates/epub/content.opf");
const TOC_NCX: &str = include_str!("../../templates/epub/toc.ncx");

/// Generates the XHTML page that shows one image.
///
/// # Arguments
///
/// * `image_href` - Image location relative to the page, already URI-escaped
/// * `page_title` - Raw (unescaped) page title
fn generate_xhtml(image_href: &str, page_title: &str) -> String {
    let title = escape_xml(page_title);
    fill_template(
        PAGE_XHTML,
        &[
            ("title", title.as_str()),
            ("src", escape_xml(image_href).as_str()),
            ("alt", title.as_str()),
        ],
    )
}

/// Replaces `%name%` placeholders in one pass, so substituted text is never
/// scanned again. Unknown `%...%` runs are copied unchanged.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut filled = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('%') {
        filled.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let value = after.find('%').and_then(|end| {
            let key = &after[..end];
            values
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value, end))
        });
        match value {
            Some((value, end)) => {
                filled.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                filled.push('%');
                rest = after;
            }
        }
    }
    filled.push_str(rest);
    filled
}

/// Percent-encodes a relative path for use as a manifest `href`.
fn href_escape(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => {
                escaped.push(byte as char)
            }
            _ => escaped.push_str(&format!("%{:02X}", byte)),
        }
    }
    escaped
}

struct ManifestPage {
    image_href: String,
    media_type: &'static str,
    page_name: String,
}

/// A generator for image-only EPUB 2 books.
///
/// The package is assembled by hand: `mimetype` (stored, first), the OCF
/// container, one image plus one XHTML page per added image, and finally the
/// OPF package and an NCX with an empty navigation map.
pub struct Epub {
    zip: Option<ZipWriter<File>>,
    title: String,
    pages: Vec<ManifestPage>,
    names: EntryNamer,
}

impl Epub {
    fn zip_mut(&mut self) -> Result<&mut ZipWriter<File>> {
        self.zip
            .as_mut()
            .ok_or_else(|| Error::Io(std::io::Error::other("EPUB writer already finished")))
    }

    fn deflated() -> SimpleFileOptions {
        SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
    }

    fn identifier(&self) -> String {
        let slug: String = self
            .title
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect();
        format!("urn:hako:{}", slug)
    }

    fn package_document(&self) -> String {
        let manifest = self
            .pages
            .iter()
            .enumerate()
            .map(|(i, page)| {
                format!(
                    "    <item id=\"img_{i}\" href=\"{}\" media-type=\"{}\"/>\n    <item id=\"page_{i}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>",
                    escape_xml(&page.image_href),
                    page.media_type,
                    page.page_name,
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let spine = (0..self.pages.len())
            .map(|i| format!("    <itemref idref=\"page_{}\"/>", i))
            .collect::<Vec<_>>()
            .join("\n");

        fill_template(
            CONTENT_OPF,
            &[
                ("title", escape_xml(&self.title).as_str()),
                ("identifier", escape_xml(&self.identifier()).as_str()),
                ("date", Utc::now().format("%Y-%m-%d").to_string().as_str()),
                ("manifest", manifest.as_str()),
                ("spine", spine.as_str()),
            ],
        )
    }

    fn navigation(&self) -> String {
        fill_template(
            TOC_NCX,
            &[
                ("identifier", escape_xml(&self.identifier()).as_str()),
                ("title", escape_xml(&self.title).as_str()),
            ],
        )
    }
}

#[async_trait]
impl Generator for Epub {
    fn new(output_path: &Path, title: &str) -> Result<Self> {
        let file = File::create(output_path)?;
        let mut zip = ZipWriter::new(file);

        // must be the first entry, uncompressed, for OCF readers to sniff it
        zip.start_file(
            "mimetype",
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored),
        )?;
        zip.write_all(b"application/epub+zip")?;

        zip.start_file("META-INF/container.xml", Self::deflated())?;
        zip.write_all(CONTAINER_XML.as_bytes())?;

        Ok(Epub {
            zip: Some(zip),
            title: title.to_string(),
            pages: Vec::new(),
            names: EntryNamer::new(),
        })
    }

    async fn add_page(&mut self, image_path: &Path) -> Result<&mut Self> {
        let file = tokio::fs::File::open(image_path).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to open image file '{}': {}",
                    path_to_string_lossy(image_path),
                    e
                ),
            ))
        })?;
        let is_empty = file.metadata().await?.len() == 0;
        let file_std = file.into_std().await;

        let index = self.pages.len();
        let image_name = self.names.name_for(image_path);
        let image_href = href_escape(&format!("images/{}", image_name));
        let page_name = format!("page_{:04}.xhtml", index);
        let xhtml = generate_xhtml(&image_href, &image_name);

        let zip = self.zip_mut()?;
        zip.start_file(format!("OEBPS/images/{}", image_name), Self::deflated())?;
        if !is_empty {
            let mmap = spawn_blocking(move || unsafe { MmapOptions::new().map(&file_std) })
                .await
                .map_err(|e| Error::AsyncTaskError(e.to_string()))??;
            zip.write_all(&mmap[..])?;
        }
        zip.start_file(format!("OEBPS/{}", page_name), Self::deflated())?;
        zip.write_all(xhtml.as_bytes())?;

        self.pages.push(ManifestPage {
            image_href,
            media_type: epub_media_type(image_path),
            page_name,
        });
        Ok(self)
    }

    async fn save(mut self) -> Result<()> {
        let package = self.package_document();
        let navigation = self.navigation();
        let mut zip = self
            .zip
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("EPUB writer already finished")))?;

        spawn_blocking(move || -> Result<()> {
            zip.start_file("OEBPS/content.opf", Self::deflated())?;
            zip.write_all(package.as_bytes())?;
            zip.start_file("OEBPS/toc.ncx", Self::deflated())?;
            zip.write_all(navigation.as_bytes())?;
            zip.finish()?;
            Ok(())
        })
        .await
        .map_err(|e| Error::AsyncTaskError(e.to_string()))??;

        Ok(())
    }
}
