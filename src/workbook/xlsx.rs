//! OOXML (`.xlsx` / `.xlsm`) backed [`CellDocument`].
//!
//! The package is held in memory part by part. Reads come from a snapshot
//! parsed at open time; writes are recorded as edits and applied on save by
//! streaming the active worksheet, its relationships and `styles.xml`.
//! Every other part (macros, drawings, other sheets) is written back
//! untouched.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::patch::{self, CellPatch, StyleSheet, ValueEdit};
use super::{CellDocument, WorkbookError, WorkbookOpener};
use crate::address::{CellAddress, CellRange};

const REL_TYPE_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
const REL_TYPE_SHARED_STRINGS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";
const REL_TYPE_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";

/// Opens workbooks from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxOpener;

impl WorkbookOpener for XlsxOpener {
    type Document = XlsxDocument;

    fn open(&self, path: &Path) -> Result<XlsxDocument, WorkbookError> {
        XlsxDocument::open(path)
    }
}

#[derive(Debug, Clone, Default)]
struct CellSnapshot {
    style: u32,
    text: String,
}

#[derive(Debug, Clone)]
struct HyperlinkEntry {
    range: CellRange,
    target: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct CellEdit {
    value: Option<ValueEdit>,
    font_color: Option<String>,
    fill_color: Option<String>,
}

#[derive(Debug, Clone)]
struct Relationship {
    id: String,
    ty: String,
    target: String,
}

/// The active worksheet of an xlsx package plus pending edits.
#[derive(Debug, Clone)]
pub struct XlsxDocument {
    parts: Vec<(String, Vec<u8>)>,
    sheet_part: String,
    styles_part: Option<String>,
    cells: BTreeMap<CellAddress, CellSnapshot>,
    hyperlinks: Vec<HyperlinkEntry>,
    edits: BTreeMap<CellAddress, CellEdit>,
    removed_links: BTreeSet<CellAddress>,
}

impl XlsxDocument {
    pub fn open(path: &Path) -> Result<Self, WorkbookError> {
        if !path.exists() {
            return Err(WorkbookError::NotFound(path.to_path_buf()));
        }
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file)?;

        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut bytes)?;
            parts.push((name, bytes));
        }

        debug!("Opened workbook {} ({} parts)", path.display(), parts.len());
        Self::from_parts(parts)
    }

    fn from_parts(parts: Vec<(String, Vec<u8>)>) -> Result<Self, WorkbookError> {
        let lookup: HashMap<&str, &[u8]> = parts
            .iter()
            .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
            .collect();

        let workbook_part = lookup
            .get("_rels/.rels")
            .map(|xml| parse_relationships(xml))
            .transpose()?
            .and_then(|rels| {
                rels.into_iter()
                    .find(|r| r.ty == REL_TYPE_OFFICE_DOCUMENT)
                    .map(|r| resolve_target("", &r.target))
            })
            .unwrap_or_else(|| "xl/workbook.xml".to_string());

        let workbook_xml = lookup
            .get(workbook_part.as_str())
            .ok_or_else(|| WorkbookError::MissingPart(workbook_part.clone()))?;
        let workbook_rels = lookup
            .get(rels_part_for(&workbook_part).as_str())
            .map(|xml| parse_relationships(xml))
            .transpose()?
            .unwrap_or_default();

        let (active_tab, sheet_ids) = parse_workbook_sheets(workbook_xml)?;
        let sheet_rid = sheet_ids
            .get(active_tab)
            .or_else(|| sheet_ids.first())
            .ok_or(WorkbookError::NoWorksheet)?;
        let sheet_part = workbook_rels
            .iter()
            .find(|r| &r.id == sheet_rid)
            .map(|r| resolve_target(&workbook_part, &r.target))
            .ok_or_else(|| WorkbookError::MissingPart(format!("worksheet {sheet_rid}")))?;

        let shared_strings = workbook_rels
            .iter()
            .find(|r| r.ty == REL_TYPE_SHARED_STRINGS)
            .map(|r| resolve_target(&workbook_part, &r.target))
            .and_then(|part| lookup.get(part.as_str()).copied())
            .map(parse_shared_strings)
            .transpose()?
            .unwrap_or_default();

        let styles_part = workbook_rels
            .iter()
            .find(|r| r.ty == REL_TYPE_STYLES)
            .map(|r| resolve_target(&workbook_part, &r.target))
            .filter(|part| lookup.contains_key(part.as_str()));

        let sheet_xml = lookup
            .get(sheet_part.as_str())
            .ok_or_else(|| WorkbookError::MissingPart(sheet_part.clone()))?;
        let sheet_rels = lookup
            .get(rels_part_for(&sheet_part).as_str())
            .map(|xml| parse_relationships(xml))
            .transpose()?
            .unwrap_or_default();

        let cells = parse_sheet_cells(sheet_xml, &shared_strings)?;
        let hyperlinks = parse_sheet_hyperlinks(sheet_xml, &sheet_rels)?;

        debug!(
            "Active worksheet {}: {} cells, {} hyperlinks",
            sheet_part,
            cells.len(),
            hyperlinks.len()
        );

        Ok(Self {
            parts,
            sheet_part,
            styles_part,
            cells,
            hyperlinks,
            edits: BTreeMap::new(),
            removed_links: BTreeSet::new(),
        })
    }

    /// Raw bytes of a package part, as currently held.
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, bytes)| bytes.as_slice())
    }

    /// Package path of the worksheet this document edits.
    pub fn sheet_part(&self) -> &str {
        &self.sheet_part
    }

    fn edit(&mut self, cell: CellAddress) -> &mut CellEdit {
        self.edits.entry(cell).or_default()
    }

    fn render_parts(&self) -> Result<Vec<(String, Vec<u8>)>, WorkbookError> {
        let needs_styles = self
            .edits
            .values()
            .any(|e| e.font_color.is_some() || e.fill_color.is_some());

        let mut styles = match (&self.styles_part, needs_styles) {
            (Some(part), true) => {
                let xml = self
                    .part(part)
                    .ok_or_else(|| WorkbookError::MissingPart(part.clone()))?;
                Some(StyleSheet::parse(xml)?)
            }
            (None, true) => return Err(WorkbookError::MissingPart("xl/styles.xml".to_string())),
            _ => None,
        };

        let mut cell_patches: BTreeMap<CellAddress, CellPatch> = BTreeMap::new();
        for (cell, edit) in &self.edits {
            let style = match styles.as_mut() {
                Some(sheet) if edit.font_color.is_some() || edit.fill_color.is_some() => {
                    let base = self.cells.get(cell).map(|c| c.style).unwrap_or(0);
                    Some(sheet.derive(base, edit.font_color.as_deref(), edit.fill_color.as_deref())?)
                }
                _ => None,
            };
            cell_patches.insert(
                *cell,
                CellPatch {
                    value: edit.value.clone(),
                    style,
                },
            );
        }

        let removed = &self.removed_links;
        let sheet_xml = self
            .part(&self.sheet_part)
            .ok_or_else(|| WorkbookError::MissingPart(self.sheet_part.clone()))?;
        let patched = patch::patch_worksheet(sheet_xml, &cell_patches, |range| {
            removed.iter().any(|cell| range.contains(*cell))
        })?;

        let sheet_rels_part = rels_part_for(&self.sheet_part);
        let dropped_ids: BTreeSet<String> = patched
            .dropped_rel_ids
            .difference(&patched.kept_rel_ids)
            .cloned()
            .collect();

        let mut out = Vec::with_capacity(self.parts.len());
        for (name, bytes) in &self.parts {
            let rendered = if *name == self.sheet_part {
                patched.xml.clone()
            } else if *name == sheet_rels_part && !dropped_ids.is_empty() {
                patch::prune_relationships(bytes, &dropped_ids)?
            } else if Some(name) == self.styles_part.as_ref() && styles.is_some() {
                match styles.as_ref() {
                    Some(sheet) => sheet.render(bytes)?,
                    None => bytes.clone(),
                }
            } else {
                bytes.clone()
            };
            out.push((name.clone(), rendered));
        }
        Ok(out)
    }
}

impl CellDocument for XlsxDocument {
    fn hyperlink(&self, cell: CellAddress) -> Option<String> {
        if self.removed_links.contains(&cell) {
            return None;
        }
        self.hyperlinks
            .iter()
            .find(|link| link.range.contains(cell))
            .and_then(|link| link.target.clone())
    }

    fn display_text(&self, cell: CellAddress) -> String {
        match self.edits.get(&cell).and_then(|e| e.value.as_ref()) {
            Some(ValueEdit::Text(text)) => text.clone(),
            Some(ValueEdit::Clear) => String::new(),
            None => self
                .cells
                .get(&cell)
                .map(|c| c.text.clone())
                .unwrap_or_default(),
        }
    }

    fn is_addressable(&self, cell: CellAddress) -> bool {
        cell.is_on_grid()
    }

    fn set_value(&mut self, cell: CellAddress, value: &str) {
        self.edit(cell).value = Some(ValueEdit::Text(value.to_string()));
    }

    fn clear_value(&mut self, cell: CellAddress) {
        self.edit(cell).value = Some(ValueEdit::Clear);
    }

    fn remove_hyperlink(&mut self, cell: CellAddress) {
        self.removed_links.insert(cell);
    }

    fn set_font_color(&mut self, cell: CellAddress, argb: &str) {
        self.edit(cell).font_color = Some(argb.to_ascii_uppercase());
    }

    fn set_fill_color(&mut self, cell: CellAddress, argb: &str) {
        self.edit(cell).fill_color = Some(argb.to_ascii_uppercase());
    }

    fn save(&self, path: &Path) -> Result<(), WorkbookError> {
        let parts = self.render_parts()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        let mut zip = ZipWriter::new(file);
        // Fixed timestamps keep repeated saves byte-identical.
        let options = FileOptions::<()>::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default());

        for (name, bytes) in &parts {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }
        zip.finish()?;

        debug!("Saved workbook {} ({} edited cells)", path.display(), self.edits.len());
        Ok(())
    }
}

fn rels_part_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship target against the part that owns the relationship.
fn resolve_target(base_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut segments: Vec<&str> = match base_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').filter(|s| !s.is_empty()).collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

pub(super) fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, WorkbookError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// `r:id` style attribute lookup that tolerates any namespace prefix.
pub(super) fn relationship_id(e: &BytesStart<'_>) -> Result<Option<String>, WorkbookError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == b"id" && attr.key.prefix().is_some() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>, WorkbookError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut rels = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"Relationship" => {
                let Some(id) = attr_value(&e, b"Id")? else {
                    continue;
                };
                rels.push(Relationship {
                    id,
                    ty: attr_value(&e, b"Type")?.unwrap_or_default(),
                    target: attr_value(&e, b"Target")?.unwrap_or_default(),
                });
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(rels)
}

/// Returns the active tab index and the relationship ids of all sheets in tab order.
fn parse_workbook_sheets(xml: &[u8]) -> Result<(usize, Vec<String>), WorkbookError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut active_tab = 0usize;
    let mut sheets = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Empty(e) | Event::Start(e) => match e.local_name().as_ref() {
                b"workbookView" => {
                    if let Some(tab) = attr_value(&e, b"activeTab")? {
                        active_tab = tab.parse().unwrap_or(0);
                    }
                }
                b"sheet" => {
                    if let Some(rid) = relationship_id(&e)? {
                        sheets.push(rid);
                    }
                }
                _ => {}
            },
            _ => {}
        }
        buf.clear();
    }
    Ok((active_tab, sheets))
}

fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>, WorkbookError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut items = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut phonetic_depth = 0usize;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => phonetic_depth += 1,
                b"t" if phonetic_depth == 0 => in_text = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => items.push(String::new()),
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => items.push(current.take().unwrap_or_default()),
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"t" => in_text = false,
                _ => {}
            },
            Event::Text(t) if in_text => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&t.unescape()?);
                }
            }
            Event::CData(t) if in_text => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&String::from_utf8_lossy(&t));
                }
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(items)
}

fn parse_sheet_cells(
    xml: &[u8],
    shared_strings: &[String],
) -> Result<BTreeMap<CellAddress, CellSnapshot>, WorkbookError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut cells = BTreeMap::new();

    // (address, style, type, raw <v>, inline text)
    let mut current: Option<(CellAddress, u32, Option<String>, String, String)> = None;
    let mut in_value = false;
    let mut in_inline_text = false;
    let mut in_inline = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                if let Some(address) = cell_ref(&e)? {
                    let style = cell_style(&e)?;
                    cells.insert(address, CellSnapshot { style, text: String::new() });
                }
            }
            Event::Start(e) => match e.local_name().as_ref() {
                b"c" => {
                    let ty = attr_value(&e, b"t")?;
                    let style = cell_style(&e)?;
                    current = cell_ref(&e)?.map(|a| (a, style, ty, String::new(), String::new()));
                }
                b"v" if current.is_some() => in_value = true,
                b"is" if current.is_some() => in_inline = true,
                b"t" if in_inline => in_inline_text = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"c" => {
                    if let Some((address, style, ty, raw, inline)) = current.take() {
                        let text = render_cell_text(ty.as_deref(), &raw, &inline, shared_strings);
                        cells.insert(address, CellSnapshot { style, text });
                    }
                    in_value = false;
                    in_inline = false;
                    in_inline_text = false;
                }
                b"v" => in_value = false,
                b"is" => in_inline = false,
                b"t" => in_inline_text = false,
                _ => {}
            },
            Event::Text(t) => {
                if let Some((_, _, _, raw, inline)) = current.as_mut() {
                    if in_value {
                        raw.push_str(&t.unescape()?);
                    } else if in_inline_text {
                        inline.push_str(&t.unescape()?);
                    }
                }
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(cells)
}

fn cell_ref(e: &BytesStart<'_>) -> Result<Option<CellAddress>, WorkbookError> {
    Ok(attr_value(e, b"r")?.and_then(|r| CellAddress::parse(&r).ok()))
}

fn cell_style(e: &BytesStart<'_>) -> Result<u32, WorkbookError> {
    Ok(attr_value(e, b"s")?
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(0))
}

fn render_cell_text(ty: Option<&str>, raw: &str, inline: &str, shared_strings: &[String]) -> String {
    match ty {
        Some("s") => raw
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|idx| shared_strings.get(idx).cloned())
            .unwrap_or_default(),
        Some("inlineStr") => inline.to_string(),
        Some("b") => match raw.trim() {
            "1" => "TRUE".to_string(),
            "0" => "FALSE".to_string(),
            other => other.to_string(),
        },
        _ => raw.to_string(),
    }
}

fn parse_sheet_hyperlinks(
    xml: &[u8],
    rels: &[Relationship],
) -> Result<Vec<HyperlinkEntry>, WorkbookError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut out = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"hyperlink" => {
                let Some(reference) = attr_value(&e, b"ref")? else {
                    continue;
                };
                let Ok(range) = CellRange::parse(&reference) else {
                    debug!("Skipping hyperlink with unparseable ref '{}'", reference);
                    continue;
                };
                // Links with only a `location` point inside the workbook and
                // have no navigable target.
                let target = relationship_id(&e)?
                    .and_then(|rid| rels.iter().find(|r| r.id == rid))
                    .map(|r| r.target.clone());
                if target.is_none() {
                    debug!("Hyperlink at {} has no external target", range);
                }
                out.push(HyperlinkEntry { range, target });
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
