//! Streaming rewrites of worksheet, relationship and style parts.
//!
//! Nothing here builds a DOM: each part is read event by event and copied to
//! a writer, with patched cells substituted in row/column order. Rows and
//! cells that do not exist yet are inserted at their sorted position.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::xlsx::{attr_value, relationship_id};
use super::WorkbookError;
use crate::address::{CellAddress, CellRange};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum ValueEdit {
    Clear,
    Text(String),
}

/// Replacement for one cell. `value: None` keeps the cell's content and
/// only restyles it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct CellPatch {
    pub value: Option<ValueEdit>,
    pub style: Option<u32>,
}

#[derive(Debug)]
pub(super) struct PatchedSheet {
    pub xml: Vec<u8>,
    /// Relationship ids of hyperlink elements that were removed.
    pub dropped_rel_ids: BTreeSet<String>,
    /// Relationship ids still referenced by surviving hyperlinks.
    pub kept_rel_ids: BTreeSet<String>,
}

fn invalid(msg: &str) -> WorkbookError {
    WorkbookError::Xml(msg.to_string())
}

fn owned_name(e: &BytesStart<'_>) -> Result<String, WorkbookError> {
    Ok(String::from_utf8(e.name().as_ref().to_vec())?)
}

/// Element name for a child of `parent`, reusing the parent's prefix.
fn child_name(parent: &BytesStart<'_>, local: &str) -> String {
    let name = parent.name();
    match name.prefix() {
        Some(prefix) => format!("{}:{local}", String::from_utf8_lossy(prefix.as_ref())),
        None => local.to_string(),
    }
}

/// Copy of `e` with the `set` attributes replaced (or added) and the `drop`
/// attributes removed.
fn with_attrs(
    e: &BytesStart<'_>,
    set: &[(&str, String)],
    drop: &[&str],
) -> Result<BytesStart<'static>, WorkbookError> {
    let mut out = BytesStart::new(owned_name(e)?);
    for attr in e.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        if set.iter().any(|(k, _)| k.as_bytes() == key) || drop.iter().any(|k| k.as_bytes() == key)
        {
            continue;
        }
        out.push_attribute(attr);
    }
    for (k, v) in set {
        out.push_attribute((*k, v.as_str()));
    }
    Ok(out)
}

pub(super) fn patch_worksheet(
    xml: &[u8],
    cells: &BTreeMap<CellAddress, CellPatch>,
    drop_link: impl Fn(&CellRange) -> bool,
) -> Result<PatchedSheet, WorkbookError> {
    let mut row_patches: BTreeMap<u32, Vec<(u32, &CellPatch)>> = BTreeMap::new();
    for (cell, patch) in cells {
        row_patches.entry(cell.row).or_default().push((cell.col, patch));
    }
    let mut remaining_rows: Vec<u32> = row_patches.keys().copied().collect();
    let mut row_idx = 0usize;

    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 256));

    let mut dropped_rel_ids = BTreeSet::new();
    let mut kept_rel_ids = BTreeSet::new();

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"sheetData" => {
                writer.write_event(Event::Start(e.into_owned()))?;
                patch_sheet_data(
                    &mut reader,
                    &mut writer,
                    &row_patches,
                    &mut remaining_rows,
                    &mut row_idx,
                )?;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"sheetData" => {
                let sheet_data = e.into_owned();
                if row_patches.is_empty() {
                    writer.write_event(Event::Empty(sheet_data))?;
                } else {
                    let end = owned_name(&sheet_data)?;
                    writer.write_event(Event::Start(sheet_data))?;
                    for (row, patches) in &row_patches {
                        write_new_row(&mut writer, *row, patches)?;
                    }
                    writer.write_event(Event::End(BytesEnd::new(end)))?;
                }
            }
            Event::Start(e) if e.local_name().as_ref() == b"hyperlinks" => {
                let block = e.into_owned();
                let links = collect_block(&mut reader, b"hyperlinks")?;

                let mut kept = Vec::new();
                for link in links {
                    let Some(Event::Empty(start) | Event::Start(start)) = link.first() else {
                        continue;
                    };
                    let range = attr_value(start, b"ref")?.and_then(|r| CellRange::parse(&r).ok());
                    let rid = relationship_id(start)?;
                    if range.as_ref().is_some_and(&drop_link) {
                        dropped_rel_ids.extend(rid);
                    } else {
                        kept_rel_ids.extend(rid);
                        kept.push(link);
                    }
                }

                // An empty <hyperlinks/> block is not schema-valid.
                if !kept.is_empty() {
                    let end = owned_name(&block)?;
                    writer.write_event(Event::Start(block))?;
                    for link in kept {
                        for ev in link {
                            writer.write_event(ev)?;
                        }
                    }
                    writer.write_event(Event::End(BytesEnd::new(end)))?;
                }
            }
            Event::Eof => break,
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok(PatchedSheet {
        xml: writer.into_inner(),
        dropped_rel_ids,
        kept_rel_ids,
    })
}

/// Read the direct element children of an open `parent` element, consuming
/// its end tag. Whitespace between children is discarded.
fn collect_block<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    parent: &[u8],
) -> Result<Vec<Vec<Event<'static>>>, WorkbookError> {
    let mut buf = Vec::new();
    let mut children = Vec::new();
    let mut current: Vec<Event<'static>> = Vec::new();
    let mut depth = 0usize;

    loop {
        let ev = reader.read_event_into(&mut buf)?.into_owned();
        let closes_parent =
            matches!(&ev, Event::End(e) if depth == 0 && e.local_name().as_ref() == parent);
        if closes_parent {
            break;
        }
        match ev {
            Event::Eof => return Err(invalid("unexpected EOF inside element block")),
            Event::Start(_) => {
                depth += 1;
                current.push(ev);
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                current.push(ev);
                if depth == 0 {
                    children.push(std::mem::take(&mut current));
                }
            }
            Event::Empty(_) if depth == 0 => children.push(vec![ev]),
            Event::Text(_) if depth == 0 => {}
            _ if depth > 0 => current.push(ev),
            _ => {}
        }
        buf.clear();
    }
    Ok(children)
}

fn patch_sheet_data<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    writer: &mut Writer<Vec<u8>>,
    row_patches: &BTreeMap<u32, Vec<(u32, &CellPatch)>>,
    remaining_rows: &mut [u32],
    row_idx: &mut usize,
) -> Result<(), WorkbookError> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"row" => {
                let row_start = e.into_owned();
                let Some(row_num) = parse_row_number(&row_start)? else {
                    writer.write_event(Event::Start(row_start))?;
                    buf.clear();
                    continue;
                };

                insert_rows_before(writer, row_patches, remaining_rows, row_idx, row_num)?;

                match row_patches.get(&row_num) {
                    Some(cells) => {
                        consume_row(remaining_rows, row_idx, row_num);
                        writer.write_event(Event::Start(row_start))?;
                        patch_row(reader, writer, row_num, cells)?;
                    }
                    None => writer.write_event(Event::Start(row_start))?,
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                let row_empty = e.into_owned();
                let Some(row_num) = parse_row_number(&row_empty)? else {
                    writer.write_event(Event::Empty(row_empty))?;
                    buf.clear();
                    continue;
                };

                insert_rows_before(writer, row_patches, remaining_rows, row_idx, row_num)?;

                match row_patches.get(&row_num) {
                    Some(cells) => {
                        consume_row(remaining_rows, row_idx, row_num);
                        let end = owned_name(&row_empty)?;
                        writer.write_event(Event::Start(row_empty))?;
                        for (col, patch) in cells {
                            write_cell_patch(writer, CellAddress::new(row_num, *col), patch, None)?;
                        }
                        writer.write_event(Event::End(BytesEnd::new(end)))?;
                    }
                    None => writer.write_event(Event::Empty(row_empty))?,
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"sheetData" => {
                while *row_idx < remaining_rows.len() {
                    let row = remaining_rows[*row_idx];
                    let cells = row_patches.get(&row).map(Vec::as_slice).unwrap_or_default();
                    write_new_row(writer, row, cells)?;
                    *row_idx += 1;
                }
                writer.write_event(Event::End(e.into_owned()))?;
                break;
            }
            Event::Eof => return Err(invalid("unexpected EOF while patching sheetData")),
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }
    Ok(())
}

fn insert_rows_before(
    writer: &mut Writer<Vec<u8>>,
    row_patches: &BTreeMap<u32, Vec<(u32, &CellPatch)>>,
    remaining_rows: &[u32],
    row_idx: &mut usize,
    row_num: u32,
) -> Result<(), WorkbookError> {
    while *row_idx < remaining_rows.len() && remaining_rows[*row_idx] < row_num {
        let row = remaining_rows[*row_idx];
        let cells = row_patches.get(&row).map(Vec::as_slice).unwrap_or_default();
        write_new_row(writer, row, cells)?;
        *row_idx += 1;
    }
    Ok(())
}

fn consume_row(remaining_rows: &[u32], row_idx: &mut usize, row_num: u32) {
    if *row_idx < remaining_rows.len() && remaining_rows[*row_idx] == row_num {
        *row_idx += 1;
    }
}

fn parse_row_number(e: &BytesStart<'_>) -> Result<Option<u32>, WorkbookError> {
    Ok(attr_value(e, b"r")?.and_then(|r| r.trim().parse::<u32>().ok()))
}

fn parse_cell_ref(e: &BytesStart<'_>) -> Result<Option<CellAddress>, WorkbookError> {
    Ok(attr_value(e, b"r")?.and_then(|r| CellAddress::parse(&r).ok()))
}

fn patch_row<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    patches: &[(u32, &CellPatch)],
) -> Result<(), WorkbookError> {
    let mut buf = Vec::new();
    let mut patch_idx = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"c" => {
                let cell_start = e.into_owned();
                let Some(cell) = parse_cell_ref(&cell_start)?.filter(|c| c.row == row_num) else {
                    writer.write_event(Event::Start(cell_start))?;
                    buf.clear();
                    continue;
                };

                while patch_idx < patches.len() && patches[patch_idx].0 < cell.col {
                    let (col, patch) = patches[patch_idx];
                    write_cell_patch(writer, CellAddress::new(row_num, col), patch, None)?;
                    patch_idx += 1;
                }

                if patch_idx < patches.len() && patches[patch_idx].0 == cell.col {
                    let patch = patches[patch_idx].1;
                    patch_idx += 1;

                    if patch.value.is_none() {
                        // Restyle only; the cell body is copied by this loop.
                        let restyled = restyle(&cell_start, patch.style)?;
                        writer.write_event(Event::Start(restyled))?;
                    } else {
                        skip_to_end(reader, b"c")?;
                        write_cell_patch(writer, cell, patch, Some(&cell_start))?;
                    }
                } else {
                    writer.write_event(Event::Start(cell_start))?;
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                let cell_empty = e.into_owned();
                let Some(cell) = parse_cell_ref(&cell_empty)?.filter(|c| c.row == row_num) else {
                    writer.write_event(Event::Empty(cell_empty))?;
                    buf.clear();
                    continue;
                };

                while patch_idx < patches.len() && patches[patch_idx].0 < cell.col {
                    let (col, patch) = patches[patch_idx];
                    write_cell_patch(writer, CellAddress::new(row_num, col), patch, None)?;
                    patch_idx += 1;
                }

                if patch_idx < patches.len() && patches[patch_idx].0 == cell.col {
                    let patch = patches[patch_idx].1;
                    patch_idx += 1;
                    write_cell_patch(writer, cell, patch, Some(&cell_empty))?;
                } else {
                    writer.write_event(Event::Empty(cell_empty))?;
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"row" => {
                while patch_idx < patches.len() {
                    let (col, patch) = patches[patch_idx];
                    write_cell_patch(writer, CellAddress::new(row_num, col), patch, None)?;
                    patch_idx += 1;
                }
                writer.write_event(Event::End(e.into_owned()))?;
                break;
            }
            Event::Eof => return Err(invalid("unexpected EOF while patching row")),
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }
    Ok(())
}

fn skip_to_end<R: std::io::BufRead>(reader: &mut Reader<R>, local: &[u8]) -> Result<(), WorkbookError> {
    let mut buf = Vec::new();
    let mut depth = 1usize;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(_) => depth += 1,
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if depth == 0 && e.local_name().as_ref() == local {
                    break;
                }
            }
            Event::Eof => return Err(invalid("unexpected EOF while skipping element")),
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

fn restyle(cell: &BytesStart<'_>, style: Option<u32>) -> Result<BytesStart<'static>, WorkbookError> {
    match style {
        Some(s) => with_attrs(cell, &[("s", s.to_string())], &[]),
        None => Ok(cell.clone().into_owned()),
    }
}

fn write_new_row(
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    patches: &[(u32, &CellPatch)],
) -> Result<(), WorkbookError> {
    let mut row = BytesStart::new("row");
    row.push_attribute(("r", row_num.to_string().as_str()));
    writer.write_event(Event::Start(row))?;
    for (col, patch) in patches {
        write_cell_patch(writer, CellAddress::new(row_num, *col), patch, None)?;
    }
    writer.write_event(Event::End(BytesEnd::new("row")))?;
    Ok(())
}

/// Write a complete cell element. Existing attributes other than `s`/`t`
/// survive; a value edit replaces the cell body with an inline string or
/// leaves it empty.
fn write_cell_patch(
    writer: &mut Writer<Vec<u8>>,
    cell: CellAddress,
    patch: &CellPatch,
    existing: Option<&BytesStart<'_>>,
) -> Result<(), WorkbookError> {
    let mut set: Vec<(&str, String)> = Vec::new();
    if let Some(s) = patch.style {
        set.push(("s", s.to_string()));
    }
    let text = match &patch.value {
        Some(ValueEdit::Text(t)) => {
            set.push(("t", "inlineStr".to_string()));
            Some(t.as_str())
        }
        _ => None,
    };
    let drop: &[&str] = if patch.value.is_some() { &["t"] } else { &[] };

    let start = match existing {
        Some(e) => with_attrs(e, &set, drop)?,
        None => {
            let mut c = BytesStart::new("c");
            c.push_attribute(("r", cell.to_string().as_str()));
            for (k, v) in &set {
                c.push_attribute((*k, v.as_str()));
            }
            c
        }
    };

    let Some(text) = text else {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    };

    let end = owned_name(&start)?;
    let is_name = child_name(&start, "is");
    let t_name = child_name(&start, "t");

    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Start(BytesStart::new(is_name.as_str())))?;
    let mut t = BytesStart::new(t_name.as_str());
    if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
        t.push_attribute(("xml:space", "preserve"));
    }
    writer.write_event(Event::Start(t))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(t_name.as_str())))?;
    writer.write_event(Event::End(BytesEnd::new(is_name.as_str())))?;
    writer.write_event(Event::End(BytesEnd::new(end)))?;
    Ok(())
}

/// Drop `Relationship` entries whose id is in `ids`.
pub(super) fn prune_relationships(xml: &[u8], ids: &BTreeSet<String>) -> Result<Vec<u8>, WorkbookError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let id = attr_value(&e, b"Id")?;
                if !id.is_some_and(|id| ids.contains(&id)) {
                    writer.write_event(Event::Empty(e.into_owned()))?;
                }
            }
            Event::Start(e) if e.local_name().as_ref() == b"Relationship" => {
                let id = attr_value(&e, b"Id")?;
                if id.is_some_and(|id| ids.contains(&id)) {
                    skip_to_end(&mut reader, b"Relationship")?;
                } else {
                    writer.write_event(Event::Start(e.into_owned()))?;
                }
            }
            Event::Eof => break,
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }
    Ok(writer.into_inner())
}

type Element = Vec<Event<'static>>;

/// Pending additions to `styles.xml`.
///
/// Derived formats are appended after the existing `fonts`, `fills` and
/// `cellXfs` entries, so existing style indices keep their meaning.
/// Identical requests return the same index.
#[derive(Debug, Default)]
pub(super) struct StyleSheet {
    fonts: Vec<Element>,
    fill_count: usize,
    cell_xfs: Vec<Element>,
    new_fonts: Vec<Element>,
    new_fills: Vec<Element>,
    new_xfs: Vec<Element>,
    font_cache: HashMap<(u32, String), u32>,
    fill_cache: HashMap<String, u32>,
    xf_cache: HashMap<(u32, Option<String>, Option<String>), u32>,
}

impl StyleSheet {
    pub fn parse(xml: &[u8]) -> Result<Self, WorkbookError> {
        Ok(Self {
            fonts: section_children(xml, b"fonts")?,
            fill_count: section_children(xml, b"fills")?.len(),
            cell_xfs: section_children(xml, b"cellXfs")?,
            ..Self::default()
        })
    }

    /// Style index equal to `base_xf` but with the given font and/or solid
    /// fill color (ARGB hex).
    pub fn derive(
        &mut self,
        base_xf: u32,
        font_color: Option<&str>,
        fill_color: Option<&str>,
    ) -> Result<u32, WorkbookError> {
        let key = (base_xf, font_color.map(str::to_string), fill_color.map(str::to_string));
        if let Some(&idx) = self.xf_cache.get(&key) {
            return Ok(idx);
        }

        let base = self.cell_xfs.get(base_xf as usize).cloned().unwrap_or_else(default_xf);
        let Some(Event::Empty(first) | Event::Start(first)) = base.first() else {
            return Err(invalid("cellXfs entry is not an element"));
        };
        let base_font = attr_value(first, b"fontId")?
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0);

        let mut set = Vec::new();
        if let Some(color) = font_color {
            let font_id = self.font_with_color(base_font, color)?;
            set.push(("fontId", font_id.to_string()));
            set.push(("applyFont", "1".to_string()));
        }
        if let Some(color) = fill_color {
            let fill_id = self.solid_fill(color);
            set.push(("fillId", fill_id.to_string()));
            set.push(("applyFill", "1".to_string()));
        }

        let rewritten = with_attrs(first, &set, &[])?;
        let mut xf = base.clone();
        xf[0] = match &base[0] {
            Event::Start(_) => Event::Start(rewritten),
            _ => Event::Empty(rewritten),
        };

        let idx = (self.cell_xfs.len() + self.new_xfs.len()) as u32;
        self.new_xfs.push(xf);
        self.xf_cache.insert(key, idx);
        Ok(idx)
    }

    fn font_with_color(&mut self, base_font: u32, argb: &str) -> Result<u32, WorkbookError> {
        let key = (base_font, argb.to_string());
        if let Some(&idx) = self.font_cache.get(&key) {
            return Ok(idx);
        }

        let base = self
            .fonts
            .get(base_font as usize)
            .cloned()
            .unwrap_or_else(|| vec![Event::Empty(BytesStart::new("font"))]);
        let font = recolor_font(&base, argb)?;

        let idx = (self.fonts.len() + self.new_fonts.len()) as u32;
        self.new_fonts.push(font);
        self.font_cache.insert(key, idx);
        Ok(idx)
    }

    fn solid_fill(&mut self, argb: &str) -> u32 {
        if let Some(&idx) = self.fill_cache.get(argb) {
            return idx;
        }

        let mut pattern = BytesStart::new("patternFill");
        pattern.push_attribute(("patternType", "solid"));
        let mut fg = BytesStart::new("fgColor");
        fg.push_attribute(("rgb", argb));
        let mut bg = BytesStart::new("bgColor");
        bg.push_attribute(("indexed", "64"));

        let fill = vec![
            Event::Start(BytesStart::new("fill")),
            Event::Start(pattern),
            Event::Empty(fg),
            Event::Empty(bg),
            Event::End(BytesEnd::new("patternFill")),
            Event::End(BytesEnd::new("fill")),
        ];

        let idx = (self.fill_count + self.new_fills.len()) as u32;
        self.new_fills.push(fill);
        self.fill_cache.insert(argb.to_string(), idx);
        idx
    }

    fn additions(&self, section: &[u8]) -> Option<(&[Element], usize)> {
        let (added, existing) = match section {
            b"fonts" => (&self.new_fonts, self.fonts.len()),
            b"fills" => (&self.new_fills, self.fill_count),
            b"cellXfs" => (&self.new_xfs, self.cell_xfs.len()),
            _ => return None,
        };
        (!added.is_empty()).then_some((added.as_slice(), existing + added.len()))
    }

    /// Re-emit `original` with the pending additions appended.
    pub fn render(&self, original: &[u8]) -> Result<Vec<u8>, WorkbookError> {
        let mut reader = Reader::from_reader(original);
        reader.config_mut().trim_text(false);
        let mut writer = Writer::new(Vec::with_capacity(original.len() + 512));

        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => match self.additions(e.local_name().as_ref()) {
                    Some((_, count)) => {
                        let start = with_attrs(&e, &[("count", count.to_string())], &[])?;
                        writer.write_event(Event::Start(start))?;
                    }
                    None => writer.write_event(Event::Start(e.into_owned()))?,
                },
                Event::End(e) => {
                    if let Some((added, _)) = self.additions(e.local_name().as_ref()) {
                        write_elements(&mut writer, added)?;
                    }
                    writer.write_event(Event::End(e.into_owned()))?;
                }
                Event::Empty(e) => match self.additions(e.local_name().as_ref()) {
                    Some((added, count)) => {
                        let start = with_attrs(&e, &[("count", count.to_string())], &[])?;
                        let end = owned_name(&start)?;
                        writer.write_event(Event::Start(start))?;
                        write_elements(&mut writer, added)?;
                        writer.write_event(Event::End(BytesEnd::new(end)))?;
                    }
                    None => writer.write_event(Event::Empty(e.into_owned()))?,
                },
                Event::Eof => break,
                ev => writer.write_event(ev.into_owned())?,
            }
            buf.clear();
        }
        Ok(writer.into_inner())
    }
}

fn write_elements(writer: &mut Writer<Vec<u8>>, elements: &[Element]) -> Result<(), WorkbookError> {
    for element in elements {
        for ev in element {
            writer.write_event(ev.clone())?;
        }
    }
    Ok(())
}

fn default_xf() -> Element {
    let mut xf = BytesStart::new("xf");
    for key in ["numFmtId", "fontId", "fillId", "borderId", "xfId"] {
        xf.push_attribute((key, "0"));
    }
    vec![Event::Empty(xf)]
}

/// Children of the first `section` element, e.g. every `<font>` in `<fonts>`.
fn section_children(xml: &[u8], section: &[u8]) -> Result<Vec<Element>, WorkbookError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == section => {
                return collect_block(&mut reader, section);
            }
            Event::Empty(e) if e.local_name().as_ref() == section => return Ok(Vec::new()),
            Event::Eof => return Ok(Vec::new()),
            _ => {}
        }
        buf.clear();
    }
}

/// Copy of a `<font>` element with its color replaced and underline removed.
fn recolor_font(font: &[Event<'static>], argb: &str) -> Result<Element, WorkbookError> {
    let Some(Event::Empty(start) | Event::Start(start)) = font.first() else {
        return Err(invalid("font entry is not an element"));
    };
    let end = owned_name(start)?;
    let mut color = BytesStart::new(child_name(start, "color"));
    color.push_attribute(("rgb", argb));

    let mut out = vec![Event::Start(start.clone())];
    if font.len() > 1 {
        let mut skip_depth = 0usize;
        for ev in &font[1..font.len() - 1] {
            if skip_depth > 0 {
                match ev {
                    Event::Start(_) => skip_depth += 1,
                    Event::End(_) => skip_depth -= 1,
                    _ => {}
                }
                continue;
            }
            match ev {
                Event::Empty(e) if matches!(e.local_name().as_ref(), b"color" | b"u") => {}
                Event::Start(e) if matches!(e.local_name().as_ref(), b"color" | b"u") => {
                    skip_depth = 1;
                }
                other => out.push(other.clone()),
            }
        }
    }
    // Child order inside <font> is unconstrained.
    out.push(Event::Empty(color));
    out.push(Event::End(BytesEnd::new(end)));
    Ok(out)
}
