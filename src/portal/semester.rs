//! Current-semester descriptor from the dashboard's attendance summary block.
//!
//! Two passes over `div#divAttSummary`:
//! 1. Visible text of the header row and first data row (everything except URLs)
//! 2. A strict pass over the same row that pulls the canonical Attendance and
//!    Marks links out of the `popUp('...')` handlers
//!
//! The strict pass owns the link fields and the six fixed summary columns.
//! When it fails, the visible fields survive and the failure is recorded.

use scraper::{ElementRef, Html};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use super::coerce::coerce_map;
use super::html::{cell_texts, cells, own_text, require, require_cells, selector, text_of};
use super::types::{CurrentSemester, Degradation};
use crate::error::PortalError;

const SUMMARY_SECTION: &str = "div#divAttSummary";

/// Fixed columns of the summary row, in cell order.
const SUMMARY_COLUMNS: [&str; 6] = [
    "Year",
    "Sem.",
    "Academic Year",
    "Status",
    "Class Start Date",
    "Class End Date",
];

const ATTENDANCE_LINK_CELL: usize = 6;
const MARKS_LINK_CELL: usize = 7;

/// Result of the strict link pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryLinks {
    pub fields: Map<String, Value>,
    pub attendance_link: Option<String>,
    pub marks_link: Option<String>,
}

/// Semester descriptor plus the reason links could not be resolved, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct SemesterResolution {
    pub semester: CurrentSemester,
    pub degradation: Option<Degradation>,
}

impl SemesterResolution {
    pub fn is_clean(&self) -> bool {
        self.degradation.is_none()
    }
}

/// Strict pass: first data row of the summary table, six mandatory cells,
/// optional attendance (cell 6) and marks (cell 7) links resolved against `base`.
pub fn extract_summary_links(document: &Html, base: &Url) -> Result<SummaryLinks, PortalError> {
    let container = require(document, SUMMARY_SECTION, "attendance summary section")?;
    let all_rows: Vec<_> = container.select(&selector("table tr")).collect();
    let first_row = all_rows
        .get(1)
        .copied()
        .ok_or_else(|| PortalError::markup_with("attendance summary rows", "no data row"))?;
    let row_cells = require_cells(first_row, SUMMARY_COLUMNS.len(), "attendance summary row")?;

    let mut links = SummaryLinks::default();
    for (column, cell) in SUMMARY_COLUMNS.iter().zip(&row_cells) {
        links
            .fields
            .insert(column.to_string(), Value::String(text_of(*cell)));
    }

    links.attendance_link = match row_cells.get(ATTENDANCE_LINK_CELL) {
        Some(cell) => resolve_popup_link(*cell, base, "attendance")?,
        None => None,
    };
    links.marks_link = match row_cells.get(MARKS_LINK_CELL) {
        Some(cell) => resolve_popup_link(*cell, base, "marks")?,
        None => None,
    };

    Ok(links)
}

/// Build the current-semester descriptor. Never fails: a missing block yields
/// an empty descriptor with a recorded degradation.
pub fn resolve_current_semester(document: &Html, base: &Url) -> SemesterResolution {
    let mut semester = CurrentSemester::default();

    let Some(container) = document.select(&selector(SUMMARY_SECTION)).next() else {
        return degraded(semester, "attendance summary section missing");
    };
    let all_rows: Vec<_> = container.select(&selector("table tr")).collect();
    if all_rows.len() < 2 {
        return degraded(semester, "attendance summary has no data row");
    }

    let headers = cell_texts(all_rows[0]);
    for (i, cell) in cells(all_rows[1]).into_iter().enumerate() {
        let Some(header) = headers.get(i) else {
            continue;
        };
        // The marks column only ever holds a link; it is resolved below.
        if header.to_lowercase().starts_with("marks") {
            continue;
        }
        semester
            .fields
            .insert(header.clone(), Value::String(visible_text(cell)));
    }

    let degradation = match extract_summary_links(document, base) {
        Ok(links) => {
            for (column, value) in links.fields {
                semester.fields.insert(column, value);
            }
            semester.attendance_link = links.attendance_link;
            semester.marks_link = links.marks_link;
            None
        }
        Err(e) => {
            warn!("Semester link extraction failed, keeping visible fields: {}", e);
            Some(Degradation::SemesterLinksUnresolved(
                e.detail().unwrap_or_else(|| e.to_string()),
            ))
        }
    };

    coerce_map(&mut semester.fields);
    SemesterResolution {
        semester,
        degradation,
    }
}

fn degraded(semester: CurrentSemester, reason: &str) -> SemesterResolution {
    warn!("Current semester unavailable: {}", reason);
    SemesterResolution {
        semester,
        degradation: Some(Degradation::SemesterLinksUnresolved(reason.to_string())),
    }
}

/// Direct text of a cell, falling back to its full text. Keeps the generic
/// "view" anchor label out of the value.
fn visible_text(cell: ElementRef<'_>) -> String {
    let direct = own_text(cell);
    if direct.is_empty() {
        text_of(cell)
    } else {
        direct
    }
}

/// Pull the first quoted argument out of `popUp('...')` on the cell's anchor.
fn resolve_popup_link(
    cell: ElementRef<'_>,
    base: &Url,
    which: &str,
) -> Result<Option<String>, PortalError> {
    let Some(onclick) = cell
        .select(&selector("a[onclick]"))
        .next()
        .and_then(|a| a.value().attr("onclick"))
    else {
        debug!("No {} link in the summary row", which);
        return Ok(None);
    };

    let Some(raw) = popup_target(onclick) else {
        debug!("{} anchor has no popUp target: {}", which, onclick);
        return Ok(None);
    };

    let resolved = base.join(raw).map_err(|e| {
        PortalError::markup_with("semester links", format!("bad {} link '{}': {}", which, raw, e))
    })?;
    Ok(Some(resolved.to_string()))
}

fn popup_target(onclick: &str) -> Option<&str> {
    let (_, args) = onclick.split_once("popUp(")?;
    let mut quoted = args.split('\'');
    quoted.next()?;
    quoted.next()
}
