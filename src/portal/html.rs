//! Section locators and text helpers shared by the page extractors.
//!
//! The portal has no API; everything hangs off element ids and the
//! `tableclass` marker. A missing mandatory region is a `MarkupChanged` error
//! naming the region, never an empty result.

use scraper::{ElementRef, Html, Selector};

use crate::error::PortalError;

/// Build a selector from a static CSS string.
///
/// # Panics
/// Panics on an invalid selector, which is a bug in this crate.
pub fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid static selector '{}': {:?}", css, e))
}

/// All descendant text nodes, each trimmed, empty ones dropped, joined without a separator.
pub fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Only the element's direct text children (not text inside nested tags),
/// trimmed and joined by a single space.
pub fn own_text(element: ElementRef<'_>) -> String {
    element
        .children()
        .filter_map(|child| child.value().as_text())
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// First element matching `css`, or `MarkupChanged` naming `section`.
pub fn require<'a>(
    document: &'a Html,
    css: &str,
    section: &'static str,
) -> Result<ElementRef<'a>, PortalError> {
    document
        .select(&selector(css))
        .next()
        .ok_or_else(|| PortalError::markup_with(section, format!("no element matches '{}'", css)))
}

/// First `table` nested inside `container`.
pub fn require_table<'a>(
    container: ElementRef<'a>,
    section: &'static str,
) -> Result<ElementRef<'a>, PortalError> {
    container
        .select(&selector("table"))
        .next()
        .ok_or_else(|| PortalError::markup_with(section, "container has no nested table"))
}

/// Every `tr` under `table`, nested tables included, in document order.
pub fn rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    table.select(&selector("tr")).collect()
}

/// The `td` cells of a row.
pub fn cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.select(&selector("td")).collect()
}

/// `td` texts of a row.
pub fn cell_texts(row: ElementRef<'_>) -> Vec<String> {
    cells(row).into_iter().map(text_of).collect()
}

/// Fail unless a data row carries at least `min` cells.
pub fn require_cells<'a>(
    row: ElementRef<'a>,
    min: usize,
    section: &'static str,
) -> Result<Vec<ElementRef<'a>>, PortalError> {
    let found = cells(row);
    if found.len() < min {
        return Err(PortalError::markup_with(
            section,
            format!("row has {} cells, expected at least {}", found.len(), min),
        ));
    }
    Ok(found)
}

/// Value of the `<input name=...>` element, if present.
pub fn input_value<'a>(document: &'a Html, name: &str) -> Option<&'a str> {
    let css = format!("input[name=\"{}\"]", name);
    document
        .select(&selector(&css))
        .next()
        .and_then(|input| input.value().attr("value"))
}

/// Integer `colspan` of a cell, 1 when absent or unparsable.
pub fn colspan(cell: ElementRef<'_>) -> u32 {
    cell.value()
        .attr("colspan")
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(1)
}
