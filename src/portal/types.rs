use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Student details from the dashboard info block.
///
/// Wraps an ordered `Map<String, Value>` because the label set is whatever the
/// portal renders (Name, Roll No, Branch, ...). Values are numeric-coerced.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct StudentProfile {
    fields: Map<String, Value>,
}

impl StudentProfile {
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn get(&self, label: &str) -> Option<&Value> {
        self.fields.get(label)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Gender comes from the marks page, not the profile block.
    pub fn set_gender(&mut self, gender: &str) {
        self.fields
            .insert("Gender".to_string(), Value::String(gender.to_string()));
    }
}

/// Current semester row from the attendance summary block.
///
/// `fields` holds the visible columns; the two links are resolved separately
/// and are the only place URLs may appear.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CurrentSemester {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(
        rename = "Attendance Link",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub attendance_link: Option<String>,
    #[serde(rename = "Marks Link", default, skip_serializing_if = "Option::is_none")]
    pub marks_link: Option<String>,
}

impl CurrentSemester {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }
}

/// Row title -> (subject -> value). Used for both the per-subject table and the
/// totals table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct AttendanceMatrix {
    rows: Map<String, Value>,
}

impl AttendanceMatrix {
    pub fn insert_row(&mut self, title: String, values: Map<String, Value>) {
        self.rows.insert(title, Value::Object(values));
    }

    pub fn row(&self, title: &str) -> Option<&Map<String, Value>> {
        self.rows.get(title)?.as_object()
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One `{name, max, secured}` score component of a subject.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Component {
    pub name: String,
    pub max: Value,
    pub secured: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Components {
    pub assignment: Vec<Component>,
    pub quiz: Vec<Component>,
    pub internal: Vec<Component>,
    pub sessional: Vec<Component>,
}

/// Component family, decided by a case-sensitive prefix of the column label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentFamily {
    Internal,
    Quiz,
    Assignment,
    Sessional,
}

impl ComponentFamily {
    pub fn classify(label: &str) -> Option<Self> {
        if label.starts_with("Int") {
            Some(ComponentFamily::Internal)
        } else if label.starts_with("Quiz") {
            Some(ComponentFamily::Quiz)
        } else if label.starts_with("Asst") {
            Some(ComponentFamily::Assignment)
        } else if label.starts_with("SessionalMarks") {
            Some(ComponentFamily::Sessional)
        } else {
            None
        }
    }
}

impl Components {
    pub fn push(&mut self, family: ComponentFamily, component: Component) {
        match family {
            ComponentFamily::Internal => self.internal.push(component),
            ComponentFamily::Quiz => self.quiz.push(component),
            ComponentFamily::Assignment => self.assignment.push(component),
            ComponentFamily::Sessional => self.sessional.push(component),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarksSubject {
    #[serde(rename = "s_no")]
    pub sequence_no: Value,
    pub name: String,
    pub credits: Value,
    pub components: Components,
    pub grade: Value,
    pub grade_points: Value,
}

impl Default for MarksSubject {
    fn default() -> Self {
        Self {
            sequence_no: Value::from(0),
            name: String::new(),
            credits: Value::from(0),
            components: Components::default(),
            grade: Value::from("-"),
            grade_points: Value::from(0),
        }
    }
}

/// Class totals for one score component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TotalMark {
    pub max: Value,
    pub secured: Value,
    pub percentage: Option<Value>,
}

/// Class totals keyed by the lowercased component label (`int1`,
/// `sessionalmarks`, ...), kept in the portal's column order.
///
/// Serializes as a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TotalMarks(Vec<(String, TotalMark)>);

impl TotalMarks {
    /// Replaces an existing entry in place, otherwise appends.
    pub fn insert(&mut self, key: String, mark: TotalMark) {
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = mark,
            None => self.0.push((key, mark)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&TotalMark> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, mark)| mark)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TotalMark)> {
        self.0.iter().map(|(k, mark)| (k.as_str(), mark))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for TotalMarks {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, mark)| (k, mark)))
    }
}

impl<'de> Deserialize<'de> for TotalMarks {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // `Map` keeps document order with `preserve_order`.
        let raw = Map::<String, Value>::deserialize(deserializer)?;
        let mut marks = TotalMarks::default();
        for (key, value) in raw {
            let mark = TotalMark::deserialize(value).map_err(D::Error::custom)?;
            marks.0.push((key, mark));
        }
        Ok(marks)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarksSummary {
    pub total_marks: TotalMarks,
    /// The portal's cell text as shown, e.g. `"SGPA : 8.12"`, or `"-"`.
    pub sgpa: Value,
}

impl Default for MarksSummary {
    fn default() -> Self {
        Self {
            total_marks: TotalMarks::default(),
            sgpa: Value::from("-"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarksTable {
    pub subjects: Vec<MarksSubject>,
    pub summary: MarksSummary,
}

/// Everything shown on the dashboard for one session. This is what gets cached.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DashboardSnapshot {
    #[serde(rename = "DashBoard")]
    pub profile: StudentProfile,
    #[serde(rename = "Current Sem")]
    pub current_semester: CurrentSemester,
    #[serde(rename = "Subjects Attendance Data")]
    pub subject_attendance: AttendanceMatrix,
    #[serde(rename = "Total Attendance Data")]
    pub total_attendance: AttendanceMatrix,
    #[serde(rename = "Student Image")]
    pub student_image: Option<String>,
    #[serde(rename = "Marks Data")]
    pub marks: MarksTable,
}

/// ASP.NET anti-forgery fields, replayed on logout.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HiddenFormFields {
    pub viewstate: String,
    pub viewstate_generator: String,
    pub event_validation: String,
}

/// A non-fatal gap found while assembling a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Degradation {
    /// Link extraction failed; visible semester fields are still present.
    SemesterLinksUnresolved(String),
    AttendanceTablesMissing,
    StudentImageMissing,
    GenderMissing,
}

/// Output of one successful orchestrator run.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub snapshot: DashboardSnapshot,
    pub hidden_fields: HiddenFormFields,
    pub degradations: Vec<Degradation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_family_prefixes_are_case_sensitive() {
        assert_eq!(ComponentFamily::classify("Int2"), Some(ComponentFamily::Internal));
        assert_eq!(ComponentFamily::classify("Quiz1"), Some(ComponentFamily::Quiz));
        assert_eq!(ComponentFamily::classify("Asst3"), Some(ComponentFamily::Assignment));
        assert_eq!(
            ComponentFamily::classify("SessionalMarks"),
            Some(ComponentFamily::Sessional)
        );
        assert_eq!(ComponentFamily::classify("int2"), None);
        assert_eq!(ComponentFamily::classify("Sessional"), None);
        assert_eq!(ComponentFamily::classify("Lab"), None);
    }

    #[test]
    fn test_current_semester_serializes_links_under_display_names() {
        let mut fields = Map::new();
        fields.insert("Year".to_string(), Value::from(3));
        let sem = CurrentSemester {
            fields,
            attendance_link: Some("https://portal/att.aspx".to_string()),
            marks_link: None,
        };

        let json = serde_json::to_value(&sem).unwrap();
        assert_eq!(json["Year"], 3);
        assert_eq!(json["Attendance Link"], "https://portal/att.aspx");
        assert!(json.get("Marks Link").is_none());

        let back: CurrentSemester = serde_json::from_value(json).unwrap();
        assert_eq!(back, sem);
    }

    #[test]
    fn test_set_gender_overwrites() {
        let mut profile = StudentProfile::default();
        profile.set_gender("-");
        profile.set_gender("Female");
        assert_eq!(profile.len(), 1);
        assert_eq!(profile.get("Gender"), Some(&Value::from("Female")));
    }

    #[test]
    fn test_total_marks_keep_column_order_through_json() {
        let mark = |max: i64| TotalMark {
            max: Value::from(max),
            secured: Value::from(max - 1),
            percentage: None,
        };
        let mut totals = TotalMarks::default();
        totals.insert("sessionalmarks".to_string(), mark(40));
        totals.insert("int1".to_string(), mark(30));
        totals.insert("asst1".to_string(), mark(5));
        totals.insert("int1".to_string(), mark(90));

        let text = serde_json::to_string(&totals).unwrap();
        let back: TotalMarks = serde_json::from_str(&text).unwrap();
        assert_eq!(back.keys().collect::<Vec<_>>(), vec!["sessionalmarks", "int1", "asst1"]);
        assert_eq!(back.get("int1").unwrap().max, Value::from(90));
        assert_eq!(back, totals);
    }
}
