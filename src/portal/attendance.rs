//! Attendance sub-page: subject-wise matrix, totals matrix and the student photo.
//!
//! Both summary tables wrap their data in an inner `table.tableclass`. The
//! subject table has the row label in cell 0 and values from cell 1; the
//! totals table is shifted one column right (label in cell 1, values from
//! cell 2).

use scraper::{ElementRef, Html};
use serde_json::{Map, Value};
use tracing::warn;

use super::coerce::coerce_map;
use super::html::{cell_texts, cells, rows, selector, text_of};
use super::types::AttendanceMatrix;

/// Column layout of one summary table.
#[derive(Debug, Clone, Copy)]
struct TableLayout {
    /// Header cells to skip before subject names start.
    header_skip: usize,
    /// Index of the row-title cell in data rows.
    label_cell: usize,
    /// Data-row cells to skip before values start.
    value_skip: usize,
}

const SUBJECT_LAYOUT: TableLayout = TableLayout {
    header_skip: 1,
    label_cell: 0,
    value_skip: 1,
};

const TOTALS_LAYOUT: TableLayout = TableLayout {
    header_skip: 2,
    label_cell: 1,
    value_skip: 2,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttendancePage {
    pub subjects: AttendanceMatrix,
    pub totals: AttendanceMatrix,
    pub image_url: Option<String>,
    /// False when either summary table (or its inner table) was missing.
    pub tables_found: bool,
}

/// Rewrite open-elective names to the canonical `<X>(OE)-OE` form.
/// `OE-DBMS(OE)` and `OE-DBMS` both become `DBMS(OE)-OE`; other names pass through.
pub fn normalize_subject(name: &str) -> String {
    match name.strip_prefix("OE-") {
        Some(rest) => format!("{}(OE)-OE", rest.replace("(OE)", "").trim()),
        None => name.to_string(),
    }
}

/// Extracurricular subjects are left out of attendance statistics.
pub fn is_excluded_subject(name: &str) -> bool {
    name.to_uppercase().starts_with("ECA")
}

/// Parse the attendance sub-page. Missing tables degrade to empty matrices.
pub fn extract_attendance(html: &str) -> AttendancePage {
    let document = Html::parse_document(html);
    let mut page = AttendancePage {
        image_url: document
            .select(&selector("img"))
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(str::to_string),
        ..AttendancePage::default()
    };

    let subject_table = inner_table(&document, "table#TblDispAttSubSummary");
    let totals_table = inner_table(&document, "table#TblDispAttSummary");
    let (Some(subject_table), Some(totals_table)) = (subject_table, totals_table) else {
        warn!("Attendance summary tables not found, returning empty matrices");
        return page;
    };

    page.tables_found = true;
    page.subjects = parse_matrix(subject_table, SUBJECT_LAYOUT);
    page.totals = parse_matrix(totals_table, TOTALS_LAYOUT);
    page
}

fn inner_table<'a>(document: &'a Html, outer_css: &str) -> Option<ElementRef<'a>> {
    document
        .select(&selector(outer_css))
        .next()?
        .select(&selector("table.tableclass"))
        .next()
}

/// Build row title -> (subject -> value) for one inner table.
///
/// The retained column set is computed once from the header and reused for
/// every row. A short row pairs positionally and truncates to the shorter list.
fn parse_matrix(table: ElementRef<'_>, layout: TableLayout) -> AttendanceMatrix {
    let mut matrix = AttendanceMatrix::default();
    let table_rows = rows(table);
    let Some((header_row, data_rows)) = table_rows.split_first() else {
        return matrix;
    };

    let all_names: Vec<String> = cell_texts(*header_row)
        .into_iter()
        .skip(layout.header_skip)
        .map(|name| normalize_subject(name.trim()))
        .collect();
    let keep: Vec<usize> = all_names
        .iter()
        .enumerate()
        .filter(|(_, name)| !is_excluded_subject(name))
        .map(|(i, _)| i)
        .collect();
    let names: Vec<&String> = keep.iter().map(|&i| &all_names[i]).collect();

    for row in data_rows {
        let row_cells = cells(*row);
        if row_cells.len() <= layout.label_cell {
            continue;
        }
        let title = text_of(row_cells[layout.label_cell]);
        let values: Vec<String> = row_cells
            .iter()
            .skip(layout.value_skip)
            .map(|cell| text_of(*cell))
            .collect();
        let kept_values = keep.iter().filter_map(|&i| values.get(i));

        let mut by_subject = Map::new();
        for (name, value) in names.iter().zip(kept_values) {
            by_subject.insert((*name).clone(), Value::String(value.clone()));
        }
        coerce_map(&mut by_subject);
        matrix.insert_row(title, by_subject);
    }

    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(subject_rows: &str, totals_rows: &str) -> String {
        format!(
            r#"<html><body>
            <img src="/photos/1602.jpg" />
            <table id="TblDispAttSubSummary"><tr><td>
              <table class="tableclass">{}</table>
            </td></tr></table>
            <table id="TblDispAttSummary"><tr><td>
              <table class="tableclass">{}</table>
            </td></tr></table>
            </body></html>"#,
            subject_rows, totals_rows
        )
    }

    #[test]
    fn test_normalize_open_elective() {
        assert_eq!(normalize_subject("OE-DBMS(OE)"), "DBMS(OE)-OE");
        assert_eq!(normalize_subject("OE-DBMS"), "DBMS(OE)-OE");
        assert_eq!(normalize_subject("DS"), "DS");
        assert_eq!(normalize_subject("HVPE-II"), "HVPE-II");
    }

    #[test]
    fn test_is_excluded_subject() {
        assert!(is_excluded_subject("ECA"));
        assert!(is_excluded_subject("eca-nss"));
        assert!(is_excluded_subject("EcA Sports"));
        assert!(!is_excluded_subject("DECA"));
    }

    #[test]
    fn test_subject_matrix_excludes_eca_before_pairing() {
        let html = page(
            "<tr><td>Classes</td><td>DS</td><td>ECA-NSS</td><td>OE-IOT(OE)</td></tr>
             <tr><td>Held Classes</td><td>40</td><td>10</td><td>22</td></tr>
             <tr><td>Presentees</td><td>36</td><td>-</td><td>-</td></tr>",
            "<tr><td>#</td><td>Type</td><td>Theory</td></tr>",
        );
        let result = extract_attendance(&html);
        assert!(result.tables_found);

        let held = result.subjects.row("Held Classes").unwrap();
        assert_eq!(held.len(), 2);
        assert_eq!(held.get("DS"), Some(&json!(40)));
        assert_eq!(held.get("IOT(OE)-OE"), Some(&json!(22)));
        assert!(held.keys().all(|k| !k.to_uppercase().starts_with("ECA")));

        let present = result.subjects.row("Presentees").unwrap();
        assert_eq!(present.get("IOT(OE)-OE"), Some(&json!("-")));
    }

    #[test]
    fn test_short_row_truncates_to_shorter_list() {
        let html = page(
            "<tr><td>Classes</td><td>DS</td><td>CN</td><td>OS</td></tr>
             <tr><td>Extra Classes</td><td>2</td><td>0</td></tr>",
            "<tr><td>#</td><td>Type</td></tr>",
        );
        let result = extract_attendance(&html);
        let extra = result.subjects.row("Extra Classes").unwrap();
        let keys: Vec<_> = extra.keys().cloned().collect();
        assert_eq!(keys, vec!["DS", "CN"]);
        assert_eq!(extra.get("CN"), Some(&json!(0)));
    }

    #[test]
    fn test_totals_use_shifted_columns() {
        let html = page(
            "<tr><td>Classes</td><td>DS</td></tr>",
            "<tr><td>S.No</td><td>Type</td><td>Theory</td><td>ECA</td><td>Lab</td></tr>
             <tr><td>1</td><td>Held Classes</td><td>120</td><td>12</td><td>30</td></tr>
             <tr><td>2</td><td>Percentage</td><td>86.5</td><td>100</td><td>90</td></tr>",
        );
        let result = extract_attendance(&html);
        let titles: Vec<_> = result.totals.titles().collect();
        assert_eq!(titles, vec!["Held Classes", "Percentage"]);

        let pct = result.totals.row("Percentage").unwrap();
        assert_eq!(pct.get("Theory"), Some(&json!(86.5)));
        assert_eq!(pct.get("Lab"), Some(&json!(90)));
        assert!(pct.get("ECA").is_none());
    }

    #[test]
    fn test_missing_tables_degrade_with_image() {
        let html = r#"<html><body><img src="me.png"/>
            <table id="TblDispAttSubSummary"><tr><td>no inner</td></tr></table>
            </body></html>"#;
        let result = extract_attendance(html);
        assert!(!result.tables_found);
        assert!(result.subjects.is_empty());
        assert!(result.totals.is_empty());
        assert_eq!(result.image_url.as_deref(), Some("me.png"));
    }

    #[test]
    fn test_no_image_is_absent() {
        let result = extract_attendance("<html><body></body></html>");
        assert_eq!(result.image_url, None);
    }
}
