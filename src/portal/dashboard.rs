use scraper::Html;
use serde_json::{Map, Value};

use super::coerce::coerce_map;
use super::html::{input_value, require, require_table, rows, selector, text_of};
use super::types::{HiddenFormFields, StudentProfile};
use crate::error::PortalError;

/// Literal that only appears on a page rendered for a signed-in session.
pub const AUTHENTICATED_MARKER: &str = "Logout";

pub fn is_authenticated(html: &str) -> bool {
    html.contains(AUTHENTICATED_MARKER)
}

/// Read the label/value pairs of the student info block (`div#divStudentInfo`).
///
/// Each row contributes its first two `th`/`td` cells as label and value;
/// rows with an empty label or value are ignored. Never returns an empty
/// profile: no pairs at all means the block changed shape.
pub fn extract_student_profile(document: &Html) -> Result<StudentProfile, PortalError> {
    let container = require(document, "div#divStudentInfo", "student info section")?;
    let table = require_table(container, "student info table")?;

    let cell_selector = selector("th, td");
    let mut fields = Map::new();
    for row in rows(table) {
        let cols: Vec<_> = row.select(&cell_selector).collect();
        if cols.len() < 2 {
            continue;
        }
        let key = text_of(cols[0]);
        let value = text_of(cols[1]);
        if !key.is_empty() && !value.is_empty() {
            fields.insert(key, Value::String(value));
        }
    }

    if fields.is_empty() {
        return Err(PortalError::markup_with(
            "student info rows",
            "table has no label/value pairs",
        ));
    }

    coerce_map(&mut fields);
    Ok(StudentProfile::from_map(fields))
}

/// Scrape the three ASP.NET state fields needed to post the logout form.
pub fn extract_hidden_fields(document: &Html) -> Result<HiddenFormFields, PortalError> {
    let field = |name: &'static str| {
        input_value(document, name)
            .map(str::to_string)
            .ok_or_else(|| PortalError::markup_with("hidden form fields", name))
    };

    Ok(HiddenFormFields {
        viewstate: field("__VIEWSTATE")?,
        viewstate_generator: field("__VIEWSTATEGENERATOR")?,
        event_validation: field("__EVENTVALIDATION")?,
    })
}
