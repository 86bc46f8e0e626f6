//! Text extraction from source files.
//!
//! The pipeline never looks at file bytes itself: an [`Extractor`] turns a
//! path into an [`ExtractedDocument`]. [`DefaultExtractor`] covers the formats
//! that can be read without external tools:
//!
//! | Type | Handling |
//! |------|----------|
//! | PDF | `pdf-extract` |
//! | `.docx` | `word/document.xml`, one paragraph per line, then each table |
//! | `.xlsx` | shared strings + worksheets, one row per line, cells joined by `" \| "` |
//! | `.txt`, `.md` | read as UTF-8 |
//!
//! Word tables and Excel sheets are also kept as rows of cells under the
//! `tables` metadata key.
//!
//! Images need OCR and legacy `.doc`/`.xls` need binary parsers; both are
//! rejected with [`RagError::UnsupportedInput`].

use std::io::{Cursor, Read};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{json, Map, Value};

use crate::error::{RagError, Result};
use crate::models::{ExtractedDocument, FileType};

/// Maximum worksheets read from one workbook.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells read per worksheet.
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

/// Turns a file into normalized text.
pub trait Extractor: Send + Sync {
    fn extract(&self, path: &Path, file_type: FileType) -> Result<ExtractedDocument>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultExtractor;

impl Extractor for DefaultExtractor {
    fn extract(&self, path: &Path, file_type: FileType) -> Result<ExtractedDocument> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let (text, mut metadata) = match (file_type, ext.as_str()) {
            (FileType::Image, _) => {
                return Err(RagError::unsupported(
                    "Image files require OCR, which is not available",
                ))
            }
            (FileType::Word, "doc") | (FileType::Excel, "xls") => {
                return Err(RagError::unsupported(format!(
                    "Legacy .{} files are not supported; convert to .{}x",
                    ext, ext
                )))
            }
            (FileType::Text, _) => {
                let text = std::fs::read_to_string(path)?;
                (text, Map::new())
            }
            (FileType::Pdf, _) => extract_pdf(&std::fs::read(path)?)?,
            (FileType::Word, _) => extract_docx(&std::fs::read(path)?)?,
            (FileType::Excel, _) => extract_xlsx(&std::fs::read(path)?)?,
        };

        metadata.insert("file_path".into(), json!(path.display().to_string()));
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            metadata.insert("file_name".into(), json!(name));
        }
        metadata.insert("file_type".into(), json!(file_type.as_str()));

        Ok(ExtractedDocument {
            text,
            file_type,
            metadata,
        })
    }
}

fn ooxml_err(e: impl std::fmt::Display) -> RagError {
    RagError::unsupported(format!("OOXML extraction failed: {}", e))
}

fn extract_pdf(bytes: &[u8]) -> Result<(String, Map<String, Value>)> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| RagError::unsupported(format!("PDF extraction failed: {}", e)))?;
    let mut metadata = Map::new();
    // pdf-extract separates pages with form feeds.
    let pages = text.matches('\u{c}').count().max(1);
    metadata.insert("total_pages".into(), json!(pages));
    Ok((text, metadata))
}

fn read_entry(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>> {
    let entry = archive.by_name(name).map_err(ooxml_err)?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(ooxml_err)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ooxml_err(format!("{} exceeds size limit", name)));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<(String, Map<String, Value>)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(ooxml_err)?;
    let xml = read_entry(&mut archive, "word/document.xml")?;
    let body = docx_body(&xml)?;

    let mut text = body.paragraphs.join("\n");
    let mut tables = Vec::with_capacity(body.tables.len());
    for (i, rows) in body.tables.iter().enumerate() {
        let mut table_text = format!("\n--- Table {} ---\n", i + 1);
        for row in rows {
            table_text.push_str(&row.join(" | "));
            table_text.push('\n');
        }
        text.push_str(&table_text);
        tables.push(json!({ "index": i, "data": rows, "text": table_text }));
    }

    let mut metadata = Map::new();
    metadata.insert("total_paragraphs".into(), json!(body.paragraphs.len()));
    metadata.insert("total_tables".into(), json!(tables.len()));
    metadata.insert("tables".into(), Value::Array(tables));
    Ok((text, metadata))
}

#[derive(Debug, Default)]
struct DocxBody {
    /// Paragraphs outside any table.
    paragraphs: Vec<String>,
    /// Top-level tables as rows of cell text.
    tables: Vec<Vec<Vec<String>>>,
}

/// Walk `<w:body>` in document order. Tabs and breaks inside a paragraph
/// are kept as `\t` and `\n`. A cell's paragraphs are joined with `\n`;
/// nested tables fold into the enclosing cell.
fn docx_body(xml: &[u8]) -> Result<DocxBody> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut body = DocxBody::default();
    let mut current = String::new();
    let mut in_text = false;
    let mut depth = 0usize;
    let mut table: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell: Vec<String> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(ooxml_err)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"tbl" => depth += 1,
                _ => {}
            },
            Event::Text(t) if in_text => {
                current.push_str(&t.unescape().map_err(ooxml_err)?);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" if depth > 0 => cell.push(std::mem::take(&mut current)),
                b"p" => body.paragraphs.push(std::mem::take(&mut current)),
                b"tc" if depth == 1 => row.push(std::mem::take(&mut cell).join("\n")),
                b"tr" if depth == 1 => table.push(std::mem::take(&mut row)),
                b"tbl" => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        body.tables.push(std::mem::take(&mut table));
                    }
                }
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" => current.push('\n'),
                b"p" if depth > 0 => cell.push(String::new()),
                b"p" => body.paragraphs.push(String::new()),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(body)
}

fn extract_xlsx(bytes: &[u8]) -> Result<(String, Map<String, Value>)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(ooxml_err)?;

    let shared = if archive.index_for_name("xl/sharedStrings.xml").is_some() {
        shared_strings(&read_entry(&mut archive, "xl/sharedStrings.xml")?)?
    } else {
        Vec::new()
    };

    let mut sheet_files: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(str::to_string)
        .collect();
    sheet_files.sort_by_key(|n| {
        n.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    let mut titles = if archive.index_for_name("xl/workbook.xml").is_some() {
        sheet_titles(&read_entry(&mut archive, "xl/workbook.xml")?)?
    } else {
        Vec::new()
    };
    titles.resize_with(sheet_files.len().max(titles.len()), String::new);

    let mut text = String::new();
    let mut names = Vec::new();
    let mut tables = Vec::new();
    for (i, file) in sheet_files.iter().take(XLSX_MAX_SHEETS).enumerate() {
        let title = if titles[i].is_empty() {
            format!("Sheet{}", i + 1)
        } else {
            titles[i].clone()
        };
        let rows = sheet_rows(&read_entry(&mut archive, file)?, &shared)?;
        text.push_str(&format!("\n--- Sheet: {} ---\n", title));
        for row in &rows {
            text.push_str(&row.join(" | "));
            text.push('\n');
        }
        tables.push(json!({ "sheet": &title, "data": rows }));
        names.push(title);
    }

    let mut metadata = Map::new();
    metadata.insert("total_sheets".into(), json!(names.len()));
    metadata.insert("sheet_names".into(), json!(names));
    metadata.insert("tables".into(), Value::Array(tables));
    Ok((text, metadata))
}

fn shared_strings(xml: &[u8]) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf).map_err(ooxml_err)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_text = true,
            Event::Text(t) if in_text => current.push_str(&t.unescape().map_err(ooxml_err)?),
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// `name` attributes of `<sheet>` elements in workbook order.
fn sheet_titles(xml: &[u8]) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut titles = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(ooxml_err)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let title = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.as_ref() == b"name")
                    .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
                    .unwrap_or_default();
                titles.push(title);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(titles)
}

/// Cell values grouped by `<row>`. Shared-string cells are resolved;
/// numbers and inline strings are taken as written.
fn sheet_rows(xml: &[u8], shared: &[String]) -> Result<Vec<Vec<String>>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut shared_cell = false;
    let mut in_value = false;
    let mut cells_seen = 0usize;

    loop {
        match reader.read_event_into(&mut buf).map_err(ooxml_err)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"c" => {
                    shared_cell = e
                        .attributes()
                        .flatten()
                        .any(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s");
                    cell.clear();
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Event::Text(t) if in_value => cell.push_str(&t.unescape().map_err(ooxml_err)?),
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    let value = if shared_cell {
                        cell.trim()
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| shared.get(i).cloned())
                            .unwrap_or_default()
                    } else {
                        std::mem::take(&mut cell)
                    };
                    row.push(value);
                    cells_seen += 1;
                    if cells_seen >= XLSX_MAX_CELLS_PER_SHEET {
                        break;
                    }
                }
                b"row" => rows.push(std::mem::take(&mut row)),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    if !row.is_empty() {
        rows.push(row);
    }
    Ok(rows)
}
