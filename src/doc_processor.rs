use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use image::{DynamicImage, GenericImageView, ImageFormat};
use quick_xml::events::Event;

use crate::error::ChatError;
use crate::table::Table;

/// Upload types the session accepts. Anything else is rejected before any
/// decoding happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Txt,
    Pdf,
    Docx,
    Csv,
    Xlsx,
    Jpeg,
    Png,
}

impl FileKind {
    pub const ACCEPTED: &'static [&'static str] =
        &["txt", "pdf", "docx", "xlsx", "csv", "jpg", "jpeg", "png"];

    pub fn from_extension(ext: &str) -> Result<Self, ChatError> {
        match ext.to_lowercase().as_str() {
            "txt" => Ok(FileKind::Txt),
            "pdf" => Ok(FileKind::Pdf),
            "docx" => Ok(FileKind::Docx),
            "csv" => Ok(FileKind::Csv),
            "xlsx" => Ok(FileKind::Xlsx),
            "jpg" | "jpeg" => Ok(FileKind::Jpeg),
            "png" => Ok(FileKind::Png),
            other => Err(ChatError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Classify by the text after the last `.` of a file name.
    pub fn from_name(name: &str) -> Result<Self, ChatError> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        Self::from_extension(ext)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Txt => "txt",
            FileKind::Pdf => "pdf",
            FileKind::Docx => "docx",
            FileKind::Csv => "csv",
            FileKind::Xlsx => "xlsx",
            FileKind::Jpeg => "jpg",
            FileKind::Png => "png",
        }
    }
}

/// Raw upload as received. Never modified after construction.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub name: String,
    pub kind: FileKind,
    pub bytes: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, ChatError> {
        let name = name.into();
        let kind = FileKind::from_name(&name)?;
        Ok(Self { name, kind, bytes })
    }

    /// Read a file from disk, refusing unsupported extensions and anything
    /// larger than `max_bytes` before loading it.
    pub fn read(path: &Path, max_bytes: u64) -> Result<Self, ChatError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        let kind = FileKind::from_name(&name)?;

        let size = fs::metadata(path)
            .map_err(|e| ChatError::extraction(&name, e.to_string()))?
            .len();
        if size > max_bytes {
            return Err(ChatError::extraction(
                &name,
                format!("file is {} bytes, limit is {}", size, max_bytes),
            ));
        }

        let bytes = fs::read(path).map_err(|e| ChatError::extraction(&name, e.to_string()))?;
        Ok(Self { name, kind, bytes })
    }
}

/// Decoded content of an upload.
#[derive(Debug, Clone)]
pub enum ExtractedContent {
    Text(String),
    Table(Table),
    Image(DynamicImage),
}

impl ExtractedContent {
    /// Document text, or an empty string for tables and images.
    pub fn text(&self) -> &str {
        match self {
            ExtractedContent::Text(text) => text,
            ExtractedContent::Table(_) | ExtractedContent::Image(_) => "",
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            ExtractedContent::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            ExtractedContent::Text(_) => "text",
            ExtractedContent::Table(_) => "table",
            ExtractedContent::Image(_) => "image",
        }
    }

    /// Short human-readable rendering shown right after upload.
    pub fn preview(&self, max_chars: usize) -> String {
        match self {
            ExtractedContent::Text(text) => {
                let head: String = text.chars().take(max_chars).collect();
                format!("{}...", head)
            }
            ExtractedContent::Table(table) => {
                let (rows, cols) = table.shape();
                format!("{} rows x {} columns\n{}", rows, cols, table.preview(5))
            }
            ExtractedContent::Image(img) => {
                let (w, h) = img.dimensions();
                format!("{}x{} image ({:?})", w, h, img.color())
            }
        }
    }
}

/// Decode an upload into text, a table or an image.
pub fn extract(doc: &UploadedDocument) -> Result<ExtractedContent, ChatError> {
    let fail = |reason: String| ChatError::extraction(&doc.name, reason);

    match doc.kind {
        FileKind::Txt => String::from_utf8(doc.bytes.clone())
            .map(ExtractedContent::Text)
            .map_err(|e| fail(e.to_string())),
        FileKind::Pdf => {
            // pdf-extract panics on some malformed files instead of erroring
            let pages = std::panic::catch_unwind(|| {
                pdf_extract::extract_text_from_mem_by_pages(&doc.bytes)
            })
            .map_err(|_| fail("PDF parse error: malformed document".into()))?
            .map_err(|e| fail(format!("PDF parse error: {}", e)))?;
            Ok(ExtractedContent::Text(join_pages(pages)))
        }
        FileKind::Docx => extract_docx(&doc.bytes)
            .map(ExtractedContent::Text)
            .map_err(fail),
        FileKind::Csv => Table::from_csv(&doc.bytes)
            .map(ExtractedContent::Table)
            .map_err(fail),
        FileKind::Xlsx => Table::from_xlsx(&doc.bytes)
            .map(ExtractedContent::Table)
            .map_err(fail),
        FileKind::Jpeg | FileKind::Png => {
            let format = if doc.kind == FileKind::Png {
                ImageFormat::Png
            } else {
                ImageFormat::Jpeg
            };
            image::load_from_memory_with_format(&doc.bytes, format)
                .map(ExtractedContent::Image)
                .map_err(|e| fail(e.to_string()))
        }
    }
}

/// Concatenate page texts in order. Pages without text add nothing.
fn join_pages(pages: Vec<String>) -> String {
    pages
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .concat()
}

/// Paragraph texts of `word/document.xml`, one per line.
fn extract_docx(bytes: &[u8]) -> Result<String, String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| e.to_string())?
        .read_to_string(&mut xml)
        .map_err(|e| e.to_string())?;
    docx_paragraphs(&xml).map(|paragraphs| paragraphs.join("\n"))
}

fn docx_paragraphs(xml: &str) -> Result<Vec<String>, String> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut paragraphs: Vec<String> = Vec::new();
    // Indices into `paragraphs` of every `w:p` still open. Text boxes nest
    // whole paragraphs inside a run of the outer one.
    let mut open: Vec<usize> = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:p" => {
                    open.push(paragraphs.len());
                    paragraphs.push(String::new());
                }
                b"w:t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:p" => paragraphs.push(String::new()),
                b"w:tab" => push_to(&mut paragraphs, &open, "\t"),
                b"w:br" | b"w:cr" => push_to(&mut paragraphs, &open, "\n"),
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"w:p" => {
                    open.pop();
                }
                b"w:t" => in_text = false,
                _ => {}
            },
            Event::Text(t) if in_text => {
                let text = std::str::from_utf8(&t).map_err(|e| e.to_string())?;
                push_to(&mut paragraphs, &open, text);
            }
            Event::GeneralRef(r) if in_text => {
                if let Some(ch) = r.resolve_char_ref().map_err(|e| e.to_string())? {
                    push_to(&mut paragraphs, &open, ch.encode_utf8(&mut [0; 4]));
                } else {
                    let name = r.decode().map_err(|e| e.to_string())?;
                    if let Some(resolved) = quick_xml::escape::resolve_predefined_entity(&name) {
                        push_to(&mut paragraphs, &open, resolved);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs)
}

/// Append to the innermost open paragraph. Text outside any paragraph is
/// dropped.
fn push_to(paragraphs: &mut [String], open: &[usize], text: &str) {
    if let Some(&idx) = open.last() {
        paragraphs[idx].push_str(text);
    }
}
