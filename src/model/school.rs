use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{parse_date, parse_time, Collection, Record};
use crate::validation::{ValidationContext, Validator, NAME_MAX, TITLE_MAX};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    /// Zero-based column in a Monday-first week.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn of(date: NaiveDate) -> Weekday {
        use chrono::Datelike;
        Weekday::ALL[date.weekday().num_days_from_monday() as usize]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Weekday::Monday => "monday",
            Weekday::Tuesday => "tuesday",
            Weekday::Wednesday => "wednesday",
            Weekday::Thursday => "thursday",
            Weekday::Friday => "friday",
            Weekday::Saturday => "saturday",
            Weekday::Sunday => "sunday",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSlot {
    pub day: Weekday,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub classroom_id: Option<String>,
}

impl ScheduleSlot {
    /// `(start, end)` in minutes since midnight, if both times parse.
    pub fn minutes(&self) -> Option<(u32, u32)> {
        Some((parse_time(&self.start_time)?, parse_time(&self.end_time)?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classroom {
    pub id: String,
    pub name: String,
    pub capacity: u32,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub equipment: Vec<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

fn default_true() -> bool {
    true
}

impl Record for Classroom {
    const COLLECTION: Collection = Collection::Classrooms;
    const REQUIRED: &'static [&'static str] = &["name", "capacity"];

    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> String {
        self.name.trim().to_string()
    }

    fn validate(&self, _ctx: &ValidationContext, v: &mut Validator) {
        v.required("name", &self.name, NAME_MAX);
        v.range("capacity", self.capacity as f64, 1.0, 200.0);
        v.optional("location", self.location.as_deref(), TITLE_MAX);
        for (i, item) in self.equipment.iter().enumerate() {
            v.required(&format!("equipment[{}]", i), item, NAME_MAX);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassStatus {
    #[default]
    Active,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolClass {
    pub id: String,
    pub name: String,
    pub subject: String,
    #[serde(default)]
    pub level: Option<String>,
    pub teacher_id: String,
    #[serde(default)]
    pub classroom_id: Option<String>,
    #[serde(default)]
    pub academic_year_id: Option<String>,
    #[serde(default = "default_max_students")]
    pub max_students: u32,
    #[serde(default)]
    pub student_ids: Vec<String>,
    #[serde(default)]
    pub schedule: Vec<ScheduleSlot>,
    #[serde(default)]
    pub lesson_price: f64,
    #[serde(default)]
    pub status: ClassStatus,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

fn default_max_students() -> u32 {
    15
}

impl SchoolClass {
    pub fn is_active(&self) -> bool {
        self.status == ClassStatus::Active
    }

    pub fn has_student(&self, student_id: &str) -> bool {
        self.student_ids.iter().any(|s| s == student_id)
    }

    /// Meets in `room_id`, by default or through a slot override.
    pub fn uses_room(&self, room_id: &str) -> bool {
        self.classroom_id.as_deref() == Some(room_id)
            || self
                .schedule
                .iter()
                .any(|s| s.classroom_id.as_deref() == Some(room_id))
    }

    /// Classroom a slot actually uses: its own override, else the class default.
    pub fn slot_classroom<'a>(&'a self, slot: &'a ScheduleSlot) -> Option<&'a str> {
        slot.classroom_id
            .as_deref()
            .or(self.classroom_id.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        needle.is_empty()
            || self.name.to_lowercase().contains(&needle)
            || self.subject.to_lowercase().contains(&needle)
            || self
                .level
                .as_deref()
                .is_some_and(|l| l.to_lowercase().contains(&needle))
    }
}

impl Record for SchoolClass {
    const COLLECTION: Collection = Collection::Classes;
    const REQUIRED: &'static [&'static str] = &["name", "subject", "teacherId"];

    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> String {
        self.name.trim().to_string()
    }

    fn validate(&self, ctx: &ValidationContext, v: &mut Validator) {
        v.required("name", &self.name, NAME_MAX);
        v.required("subject", &self.subject, NAME_MAX);
        v.optional("level", self.level.as_deref(), NAME_MAX);
        v.required("teacherId", &self.teacher_id, 64);
        v.range(
            "maxStudents",
            self.max_students as f64,
            1.0,
            ctx.max_students as f64,
        );
        v.non_negative("lessonPrice", self.lesson_price);

        let mut seen = std::collections::HashSet::new();
        for sid in &self.student_ids {
            if !seen.insert(sid.as_str()) {
                v.push("studentIds", format!("contains duplicate student {}", sid));
                break;
            }
        }
        if self.student_ids.len() > self.max_students as usize {
            v.push(
                "studentIds",
                format!("must contain at most {} students", self.max_students),
            );
        }

        for (i, slot) in self.schedule.iter().enumerate() {
            let start = v.time(&format!("schedule[{}].startTime", i), &slot.start_time);
            let end = v.time(&format!("schedule[{}].endTime", i), &slot.end_time);
            v.time_order(
                &format!("schedule[{}].endTime", i),
                end,
                "startTime",
                start,
            );
        }

        let start = v.optional_date("startDate", self.start_date.as_deref());
        let end = v.optional_date("endDate", self.end_date.as_deref());
        v.date_order("endDate", end, "startDate", start);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicYear {
    pub id: String,
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl AcademicYear {
    pub fn bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((parse_date(&self.start_date)?, parse_date(&self.end_date)?))
    }
}

impl Record for AcademicYear {
    const COLLECTION: Collection = Collection::AcademicYears;
    const REQUIRED: &'static [&'static str] = &["name", "startDate", "endDate"];

    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> String {
        self.name.trim().to_string()
    }

    fn validate(&self, _ctx: &ValidationContext, v: &mut Validator) {
        v.required("name", &self.name, NAME_MAX);
        let start = v.date("startDate", &self.start_date);
        let end = v.date("endDate", &self.end_date);
        v.date_order("endDate", end, "startDate", start);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakKind {
    Holiday,
    #[default]
    Vacation,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeachingBreak {
    pub id: String,
    pub academic_year_id: String,
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub kind: BreakKind,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl TeachingBreak {
    pub fn covers(&self, date: NaiveDate) -> bool {
        match (parse_date(&self.start_date), parse_date(&self.end_date)) {
            (Some(s), Some(e)) => s <= date && date <= e,
            _ => false,
        }
    }
}

impl Record for TeachingBreak {
    const COLLECTION: Collection = Collection::TeachingBreaks;
    const REQUIRED: &'static [&'static str] = &["academicYearId", "name", "startDate", "endDate"];

    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> String {
        self.name.trim().to_string()
    }

    fn validate(&self, _ctx: &ValidationContext, v: &mut Validator) {
        v.required("academicYearId", &self.academic_year_id, 64);
        v.required("name", &self.name, NAME_MAX);
        let start = v.date("startDate", &self.start_date);
        let end = v.date("endDate", &self.end_date);
        v.date_order("endDate", end, "startDate", start);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class_with(students: usize, max: u32) -> SchoolClass {
        SchoolClass {
            id: "c1".into(),
            name: "Algebra".into(),
            subject: "Math".into(),
            level: None,
            teacher_id: "t1".into(),
            classroom_id: Some("r1".into()),
            academic_year_id: None,
            max_students: max,
            student_ids: (0..students).map(|i| format!("s{}", i)).collect(),
            schedule: vec![ScheduleSlot {
                day: Weekday::Monday,
                start_time: "16:00".into(),
                end_time: "17:30".into(),
                classroom_id: None,
            }],
            lesson_price: 20.0,
            status: ClassStatus::Active,
            start_date: None,
            end_date: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn roster_limited_by_max_students_and_config() {
        let ctx = ValidationContext { max_students: 15 };
        let mut v = Validator::new();
        class_with(15, 15).validate(&ctx, &mut v);
        assert!(v.is_empty());

        let mut v = Validator::new();
        class_with(11, 10).validate(&ctx, &mut v);
        assert!(v.has_error("studentIds"));

        let mut v = Validator::new();
        class_with(3, 16).validate(&ctx, &mut v);
        assert!(v.has_error("maxStudents"));
    }

    #[test]
    fn slot_classroom_prefers_override() {
        let mut c = class_with(0, 15);
        assert_eq!(c.slot_classroom(&c.schedule[0].clone()), Some("r1"));
        c.schedule[0].classroom_id = Some("r2".into());
        let slot = c.schedule[0].clone();
        assert_eq!(c.slot_classroom(&slot), Some("r2"));
    }

    #[test]
    fn weekday_of_date() {
        let d = NaiveDate::from_ymd_opt(2026, 9, 7).expect("date");
        assert_eq!(Weekday::of(d), Weekday::Monday);
        assert_eq!(Weekday::of(d + chrono::Duration::days(6)), Weekday::Sunday);
    }
}
