//! Marks sub-page: per-subject score components, class totals, SGPA and gender.
//!
//! The data table is the second `table.tableclass` on the page:
//!
//! | row       | content                                                    |
//! |-----------|------------------------------------------------------------|
//! | 1         | main header (`S.No`, `Subject Name`, `Int1`, ..., `ExternalGrades`) |
//! | 2         | sub header (`Max`/`Sec`, `Grade`/`Points`/`Credits`)       |
//! | 3..n-2    | one row per subject                                        |
//! | n-2       | class totals (`Total` label spans two columns)             |
//! | n-1       | percentages, plus an `SGPA` cell                           |
//!
//! The column schema is derived from the main header alone.

use std::collections::BTreeMap;

use scraper::{ElementRef, Html};
use serde_json::Value;
use tracing::debug;

use super::coerce::{coerce_mark_cell, is_blank_or_zero};
use super::html::{cells, colspan, rows, selector, text_of};
use super::types::{
    Component, ComponentFamily, MarksSubject, MarksSummary, MarksTable, TotalMark,
};
use crate::error::PortalError;

const SEQUENCE_HEADER: &str = "S.No";
const SUBJECT_HEADER: &str = "Subject Name";
const GRADES_HEADER: &str = "ExternalGrades";
const PERCENTAGE_LABEL: &str = "Percentage";
const SGPA_PREFIX: &str = "SGPA";
const GENDER_LABEL: &str = "Gender";

/// What a physical column of the marks table holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    SequenceNo,
    SubjectName,
    Grade,
    GradePoints,
    Credits,
    Max,
    Secured,
}

impl ColumnRole {
    fn is_identity(self) -> bool {
        matches!(self, ColumnRole::SequenceNo | ColumnRole::SubjectName)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub header: String,
    pub role: ColumnRole,
}

/// Column -> (main header, role), built once per table.
#[derive(Debug, Clone, PartialEq)]
pub struct MarksSchema {
    pub main_headers: Vec<String>,
    pub columns: Vec<Column>,
}

impl MarksSchema {
    pub fn from_main_headers(main_headers: Vec<String>) -> Self {
        let mut columns = Vec::new();
        for header in &main_headers {
            let roles: &[ColumnRole] = match header.as_str() {
                SEQUENCE_HEADER => &[ColumnRole::SequenceNo],
                SUBJECT_HEADER => &[ColumnRole::SubjectName],
                GRADES_HEADER => &[ColumnRole::Grade, ColumnRole::GradePoints, ColumnRole::Credits],
                _ => &[ColumnRole::Max, ColumnRole::Secured],
            };
            columns.extend(roles.iter().map(|&role| Column {
                header: header.clone(),
                role,
            }));
        }
        Self {
            main_headers,
            columns,
        }
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    fn value_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| !c.role.is_identity())
    }

    fn score_headers(&self) -> impl Iterator<Item = &String> {
        self.main_headers.iter().filter(|h| {
            !matches!(h.as_str(), SEQUENCE_HEADER | SUBJECT_HEADER | GRADES_HEADER)
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarksPage {
    pub table: MarksTable,
    /// `None` when no Gender cell was found.
    pub gender: Option<String>,
}

/// `{max, secured}` accumulated per main header, in first-seen order.
#[derive(Debug, Default)]
struct ScorePairs {
    pairs: Vec<(String, Option<Value>, Option<Value>)>,
}

impl ScorePairs {
    fn set(&mut self, header: &str, role: ColumnRole, value: Value) {
        let idx = match self.pairs.iter().position(|(h, _, _)| h == header) {
            Some(idx) => idx,
            None => {
                self.pairs.push((header.to_string(), None, None));
                self.pairs.len() - 1
            }
        };
        let entry = &mut self.pairs[idx];
        match role {
            ColumnRole::Max => entry.1 = Some(value),
            ColumnRole::Secured => entry.2 = Some(value),
            _ => {}
        }
    }

    fn get(&self, header: &str) -> Option<(Value, Value)> {
        self.pairs
            .iter()
            .find(|(h, _, _)| h == header)
            .map(|(_, max, secured)| (or_zero(max), or_zero(secured)))
    }
}

fn or_zero(value: &Option<Value>) -> Value {
    value.clone().unwrap_or_else(|| Value::from(0))
}

/// Parse the marks sub-page.
pub fn extract_marks(html: &str) -> Result<MarksPage, PortalError> {
    let document = Html::parse_document(html);
    let gender = find_gender(&document);

    let tables: Vec<_> = document.select(&selector("table.tableclass")).collect();
    let table = tables.get(1).copied().ok_or_else(|| {
        PortalError::markup_with(
            "marks table",
            format!("found {} table.tableclass elements, expected at least 2", tables.len()),
        )
    })?;

    let table_rows = rows(table);
    if table_rows.len() < 5 {
        return Err(PortalError::markup_with(
            "marks table rows",
            format!("found {} rows, expected at least 5", table_rows.len()),
        ));
    }

    let main_headers = header_texts(table_rows[1]);
    let schema = MarksSchema::from_main_headers(main_headers);
    debug!(
        "Marks schema: {} main headers, {} sub headers, {} columns",
        schema.main_headers.len(),
        cells(table_rows[2]).len(),
        schema.width()
    );

    let last = table_rows.len() - 1;
    let subjects = table_rows[3..last - 1]
        .iter()
        .filter_map(|row| parse_subject_row(*row, &schema))
        .collect();

    let percentages = parse_percentage_row(table_rows[last], &schema);
    let summary = parse_totals(table_rows[last - 1], &schema, percentages);

    Ok(MarksPage {
        table: MarksTable { subjects, summary },
        gender,
    })
}

fn header_texts(row: ElementRef<'_>) -> Vec<String> {
    cells(row)
        .into_iter()
        .map(|cell| text_of(cell).replace('\n', " "))
        .collect()
}

/// One subject row. Rows whose width differs from the schema are separators
/// and are skipped.
fn parse_subject_row(row: ElementRef<'_>, schema: &MarksSchema) -> Option<MarksSubject> {
    let row_cells = cells(row);
    if row_cells.len() != schema.width() {
        return None;
    }

    let mut subject = MarksSubject::default();
    let mut scores = ScorePairs::default();

    for (column, cell) in schema.columns.iter().zip(&row_cells) {
        let text = text_of(*cell);
        let value = coerce_mark_cell(&text);
        match column.role {
            ColumnRole::SequenceNo => subject.sequence_no = value,
            ColumnRole::SubjectName => subject.name = text,
            ColumnRole::Grade => subject.grade = value,
            ColumnRole::GradePoints => subject.grade_points = value,
            ColumnRole::Credits => subject.credits = value,
            ColumnRole::Max | ColumnRole::Secured => scores.set(&column.header, column.role, value),
        }
    }

    for (label, max, secured) in scores.pairs {
        let Some(family) = ComponentFamily::classify(&label) else {
            continue;
        };
        let max = or_zero(&max);
        let secured = or_zero(&secured);
        if family == ComponentFamily::Sessional && is_blank_or_zero(&max) && is_blank_or_zero(&secured)
        {
            continue;
        }
        subject.components.push(
            family,
            Component {
                name: label,
                max,
                secured,
            },
        );
    }

    Some(subject)
}

/// Percentages keyed by main header, plus the SGPA cell if present.
#[derive(Debug, Default)]
struct Percentages {
    by_header: BTreeMap<String, Value>,
    sgpa: Option<Value>,
}

fn parse_percentage_row(row: ElementRef<'_>, schema: &MarksSchema) -> Percentages {
    let mut result = Percentages::default();
    let mut targets = schema
        .main_headers
        .iter()
        .filter(|h| !matches!(h.as_str(), SEQUENCE_HEADER | SUBJECT_HEADER));

    for cell in cells(row) {
        let text = text_of(cell);
        if text == PERCENTAGE_LABEL {
            continue;
        }
        // The portal's own label stays in the value: "SGPA : 8.12".
        if text.starts_with(SGPA_PREFIX) {
            result.sgpa = Some(Value::String(text));
            continue;
        }
        if let Some(header) = targets.next() {
            result.by_header.insert(header.clone(), coerce_mark_cell(&text));
        }
    }
    result
}

/// Class totals row. Cells spanning two columns are the `Total` label; the
/// remaining cells line up with the non-identity schema columns.
fn parse_totals(row: ElementRef<'_>, schema: &MarksSchema, percentages: Percentages) -> MarksSummary {
    let values = cells(row)
        .into_iter()
        .filter(|cell| colspan(*cell) != 2)
        .map(|cell| coerce_mark_cell(&text_of(cell)));

    let mut totals = ScorePairs::default();
    for (column, value) in schema.value_columns().zip(values) {
        if matches!(column.role, ColumnRole::Max | ColumnRole::Secured) {
            totals.set(&column.header, column.role, value);
        }
    }

    let mut summary = MarksSummary::default();
    for header in schema.score_headers() {
        if ComponentFamily::classify(header).is_none() {
            continue;
        }
        let (max, secured) = totals
            .get(header)
            .unwrap_or_else(|| (Value::from(0), Value::from(0)));
        summary.total_marks.insert(
            header.to_lowercase(),
            TotalMark {
                max,
                secured,
                percentage: percentages.by_header.get(header).cloned(),
            },
        );
    }
    if let Some(sgpa) = percentages.sgpa {
        summary.sgpa = sgpa;
    }
    summary
}

/// Gender sits outside the marks table: a `td` labelled "Gender", then a
/// separator cell, then the value.
fn find_gender(document: &Html) -> Option<String> {
    let td = selector("td");
    let label = document.select(&td).find(|cell| {
        cell.select(&td).next().is_none() && cell.text().any(|t| t.contains(GENDER_LABEL))
    })?;

    let value_cell = label
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .filter(|sibling| sibling.value().name() == "td")
        .nth(1)?;

    let gender = text_of(value_cell)
        .replace(':', "")
        .replace('\u{a0}', "")
        .trim()
        .to_string();
    Some(gender)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn marks_page(body_rows: &str) -> String {
        format!(
            r#"<html><body>
            <table class="tableclass"><tr><td>Name</td><td>:</td><td>R. Teja</td></tr>
              <tr><td>Gender</td><td>:</td><td>:&nbsp;Male</td></tr></table>
            <table class="tableclass">
              <tr><td colspan="12">Marks Details</td></tr>
              <tr><td>S.No</td><td>Subject Name</td><td>Int1</td><td>Quiz1</td>
                  <td>SessionalMarks</td><td>ExternalGrades</td></tr>
              <tr><td>Max</td><td>Sec</td><td>Max</td><td>Sec</td><td>Max</td><td>Sec</td>
                  <td>Grade</td><td>Points</td><td>Credits</td></tr>
              {}
              <tr><td colspan="2">Total</td><td>60</td><td>51</td><td>20</td><td>17</td>
                  <td>0</td><td>0</td><td>-</td><td>-</td><td>7</td></tr>
              <tr><td>Percentage</td><td>85</td><td>85.0</td><td>0</td><td>-</td>
                  <td>SGPA : 8.25</td></tr>
            </table></body></html>"#,
            body_rows
        )
    }

    const SUBJECT_ROWS: &str = r#"
        <tr><td>1</td><td>Data Structures</td><td>30</td><td>26</td><td>10</td><td>9</td>
            <td>0</td><td>0</td><td>A</td><td>9</td><td>4</td></tr>
        <tr><td colspan="11"></td></tr>
        <tr><td>2</td><td>Computer Networks</td><td>30</td><td>25</td><td>10</td><td>8</td>
            <td>-</td><td></td><td>B+</td><td>8</td><td>3</td></tr>"#;

    #[test]
    fn test_schema_from_main_headers() {
        let schema = MarksSchema::from_main_headers(
            ["S.No", "Subject Name", "Int2", "ExternalGrades"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        let roles: Vec<_> = schema.columns.iter().map(|c| c.role).collect();
        assert_eq!(
            roles,
            vec![
                ColumnRole::SequenceNo,
                ColumnRole::SubjectName,
                ColumnRole::Max,
                ColumnRole::Secured,
                ColumnRole::Grade,
                ColumnRole::GradePoints,
                ColumnRole::Credits,
            ]
        );
    }

    #[test]
    fn test_extract_subjects() {
        let page = extract_marks(&marks_page(SUBJECT_ROWS)).unwrap();
        let subjects = &page.table.subjects;
        assert_eq!(subjects.len(), 2, "separator row must be skipped");

        let ds = &subjects[0];
        assert_eq!(ds.sequence_no, json!(1));
        assert_eq!(ds.name, "Data Structures");
        assert_eq!(ds.grade, json!("A"));
        assert_eq!(ds.grade_points, json!(9));
        assert_eq!(ds.credits, json!(4));
        assert_eq!(
            ds.components.internal,
            vec![Component {
                name: "Int1".to_string(),
                max: json!(30),
                secured: json!(26)
            }]
        );
        assert_eq!(ds.components.quiz.len(), 1);
        assert!(ds.components.sessional.is_empty());
        assert!(ds.components.assignment.is_empty());

        let cn = &subjects[1];
        assert!(cn.components.sessional.is_empty(), "'-' and '' are blank");
    }

    #[test]
    fn test_internal_component_classification() {
        let html = marks_page("").replace("<td>Int1</td>", "<td>Int2</td>");
        let row = r#"<tr><td>1</td><td>OS</td><td>20</td><td>18</td><td>10</td><td>7</td>
            <td>40</td><td>35</td><td>A+</td><td>10</td><td>3</td></tr>"#;
        let html = html.replacen("<tr><td colspan=\"2\">Total", &format!("{}<tr><td colspan=\"2\">Total", row), 1);
        let page = extract_marks(&html).unwrap();

        let os = &page.table.subjects[0];
        assert_eq!(
            serde_json::to_value(&os.components.internal).unwrap(),
            json!([{ "name": "Int2", "max": 20, "secured": 18 }])
        );
        assert_eq!(
            serde_json::to_value(&os.components.sessional).unwrap(),
            json!([{ "name": "SessionalMarks", "max": 40, "secured": 35 }])
        );
    }

    #[test]
    fn test_totals_and_percentages() {
        let page = extract_marks(&marks_page(SUBJECT_ROWS)).unwrap();
        let summary = &page.table.summary;

        assert_eq!(summary.sgpa, json!("SGPA : 8.25"));
        let keys: Vec<_> = summary.total_marks.keys().collect();
        assert_eq!(keys, vec!["int1", "quiz1", "sessionalmarks"]);

        let int1 = summary.total_marks.get("int1").unwrap();
        assert_eq!(int1.max, json!(60));
        assert_eq!(int1.secured, json!(51));
        assert_eq!(int1.percentage, Some(json!(85)));

        let quiz1 = summary.total_marks.get("quiz1").unwrap();
        assert_eq!(quiz1.max, json!(20));
        assert_eq!(quiz1.secured, json!(17));
        assert_eq!(quiz1.percentage, Some(json!(85.0)));

        let sessional = summary.total_marks.get("sessionalmarks").unwrap();
        assert_eq!(sessional.max, json!(0));
        assert_eq!(sessional.percentage, Some(json!(0)));
    }

    #[test]
    fn test_gender_strips_colon_and_nbsp() {
        let page = extract_marks(&marks_page(SUBJECT_ROWS)).unwrap();
        assert_eq!(page.gender.as_deref(), Some("Male"));
    }

    #[test]
    fn test_missing_gender_is_none() {
        let html = marks_page(SUBJECT_ROWS).replace("Gender", "Category");
        let page = extract_marks(&html).unwrap();
        assert_eq!(page.gender, None);
    }

    #[test]
    fn test_missing_sgpa_defaults_to_dash() {
        let html = marks_page(SUBJECT_ROWS).replace("SGPA : 8.25", "");
        let page = extract_marks(&html).unwrap();
        assert_eq!(page.table.summary.sgpa, json!("-"));
    }

    #[test]
    fn test_single_table_is_markup_changed() {
        let html = r#"<table class="tableclass"><tr><td>x</td></tr></table>"#;
        let err = extract_marks(html).unwrap_err();
        assert!(matches!(err, PortalError::MarkupChanged { section: "marks table", .. }));
    }

    #[test]
    fn test_sgpa_keeps_cell_text() {
        let html = marks_page(SUBJECT_ROWS).replace("SGPA : 8.25", "SGPA : -");
        let page = extract_marks(&html).unwrap();
        assert_eq!(page.table.summary.sgpa, json!("SGPA : -"));
    }
}
