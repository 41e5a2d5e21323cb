//! Dashboard assembly.
//!
//! ```text
//! Fetching -> ParsingProfile -> FetchingSubpages -> ParsingSubpages -> Assembled
//! ```
//!
//! The dashboard HTML comes from the caller. The attendance and marks
//! sub-pages are fetched concurrently and both must succeed before either is
//! parsed; on any failure nothing is assembled.

use std::time::Instant;

use scraper::Html;
use tracing::{debug, info, warn};
use url::Url;

use super::attendance::extract_attendance;
use super::dashboard::{extract_hidden_fields, extract_student_profile, is_authenticated};
use super::http_client::PageFetcher;
use super::marks::extract_marks;
use super::semester::resolve_current_semester;
use super::types::{Assembly, DashboardSnapshot, Degradation};
use crate::error::PortalError;

/// Placeholder written into the profile when the marks page has no Gender cell.
pub const UNKNOWN_GENDER: &str = "-";

pub struct DashboardOrchestrator<F> {
    fetcher: F,
    base_url: Url,
}

impl<F: PageFetcher> DashboardOrchestrator<F> {
    /// `base_url` resolves the relative sub-page links found on the dashboard.
    pub fn new(fetcher: F, base_url: Url) -> Self {
        Self { fetcher, base_url }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Build a snapshot from an already-fetched dashboard page.
    pub async fn assemble(&self, session_id: &str, html: &str) -> Result<Assembly, PortalError> {
        if !is_authenticated(html) {
            info!("Dashboard for session {} has no logout control, session expired", session_id);
            return Err(PortalError::SessionExpired);
        }

        // `Html` is not `Send`; keep it out of the await points below.
        let (hidden_fields, mut profile, resolution) = {
            let document = Html::parse_document(html);
            let hidden_fields = extract_hidden_fields(&document)?;
            let profile = extract_student_profile(&document)?;
            let resolution = resolve_current_semester(&document, &self.base_url);
            (hidden_fields, profile, resolution)
        };
        debug!("Parsed profile with {} fields", profile.len());

        let mut degradations = Vec::new();
        let semester = resolution.semester;
        if let Some(reason) = resolution.degradation {
            degradations.push(reason);
        }

        let (Some(attendance_url), Some(marks_url)) =
            (semester.attendance_link.clone(), semester.marks_link.clone())
        else {
            let missing = match (&semester.attendance_link, &semester.marks_link) {
                (None, None) => "attendance and marks links",
                (None, Some(_)) => "attendance link",
                _ => "marks link",
            };
            return Err(PortalError::markup_with("semester links", format!("{} missing", missing)));
        };

        let started = Instant::now();
        let (attendance_html, marks_html) = tokio::try_join!(
            self.fetcher.fetch(&attendance_url, session_id),
            self.fetcher.fetch(&marks_url, session_id),
        )?;
        info!("Fetched attendance and marks pages in {:?}", started.elapsed());

        let started = Instant::now();
        let attendance = extract_attendance(&attendance_html);
        let marks = extract_marks(&marks_html)?;
        debug!("Parsed sub-pages in {:?}", started.elapsed());

        if !attendance.tables_found {
            degradations.push(Degradation::AttendanceTablesMissing);
        }
        if attendance.image_url.is_none() {
            degradations.push(Degradation::StudentImageMissing);
        }
        match marks.gender.as_deref() {
            Some(gender) => profile.set_gender(gender),
            None => {
                degradations.push(Degradation::GenderMissing);
                profile.set_gender(UNKNOWN_GENDER);
            }
        }

        if !degradations.is_empty() {
            warn!("Dashboard for session {} assembled with gaps: {:?}", session_id, degradations);
        }

        Ok(Assembly {
            snapshot: DashboardSnapshot {
                profile,
                current_semester: semester,
                subject_attendance: attendance.subjects,
                total_attendance: attendance.totals,
                student_image: attendance.image_url,
                marks: marks.table,
            },
            hidden_fields,
            degradations,
        })
    }
}
