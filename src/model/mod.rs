//! Domain records shared by both storage backends.
//!
//! Records are plain serde structs with string ids and string dates
//! (`YYYY-MM-DD`) / times (`HH:MM`); parsing and ordering checks live in
//! `crate::validation`. On the wire and in storage everything is camelCase.

mod finance;
mod lessons;
mod people;
mod school;

pub use finance::{
    round_cents, ObligationStatus, Payment, PaymentObligation, SalaryCalculation, SalaryStatus,
};
pub use lessons::{
    AttendanceRecord, AttendanceStatus, Grade, GradeKind, Homework, Lesson, LessonStatus,
    Submission, SubmissionStatus,
};
pub use people::{Student, StudentStatus, Teacher, TeacherStatus};
pub use school::{
    AcademicYear, BreakKind, ClassStatus, Classroom, ScheduleSlot, SchoolClass, TeachingBreak,
    Weekday,
};

use chrono::{NaiveDate, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::validation::{ValidationContext, Validator};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Storage collections. The keys double as the demo-mode localStorage keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Students,
    Teachers,
    Classrooms,
    Classes,
    AcademicYears,
    TeachingBreaks,
    Lessons,
    AttendanceRecords,
    Homework,
    Grades,
    PaymentObligations,
    SalaryCalculations,
}

impl Collection {
    pub const ALL: [Collection; 12] = [
        Collection::Students,
        Collection::Teachers,
        Collection::Classrooms,
        Collection::Classes,
        Collection::AcademicYears,
        Collection::TeachingBreaks,
        Collection::Lessons,
        Collection::AttendanceRecords,
        Collection::Homework,
        Collection::Grades,
        Collection::PaymentObligations,
        Collection::SalaryCalculations,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Collection::Students => "students",
            Collection::Teachers => "teachers",
            Collection::Classrooms => "classrooms",
            Collection::Classes => "classes",
            Collection::AcademicYears => "academic-years",
            Collection::TeachingBreaks => "teaching-breaks",
            Collection::Lessons => "lessons",
            Collection::AttendanceRecords => "attendance-records",
            Collection::Homework => "homework",
            Collection::Grades => "grades",
            Collection::PaymentObligations => "payment-obligations",
            Collection::SalaryCalculations => "salary-calculations",
        }
    }

    /// SQLite table holding this collection.
    pub fn table(self) -> &'static str {
        match self {
            Collection::Students => "students",
            Collection::Teachers => "teachers",
            Collection::Classrooms => "classrooms",
            Collection::Classes => "classes",
            Collection::AcademicYears => "academic_years",
            Collection::TeachingBreaks => "teaching_breaks",
            Collection::Lessons => "lessons",
            Collection::AttendanceRecords => "attendance_records",
            Collection::Homework => "homework",
            Collection::Grades => "grades",
            Collection::PaymentObligations => "payment_obligations",
            Collection::SalaryCalculations => "salary_calculations",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Collection::Students => "Students",
            Collection::Teachers => "Teachers",
            Collection::Classrooms => "Classrooms",
            Collection::Classes => "Classes",
            Collection::AcademicYears => "Academic Years",
            Collection::TeachingBreaks => "Teaching Breaks",
            Collection::Lessons => "Lessons",
            Collection::AttendanceRecords => "Attendance",
            Collection::Homework => "Homework",
            Collection::Grades => "Grades",
            Collection::PaymentObligations => "Payment Obligations",
            Collection::SalaryCalculations => "Salaries",
        }
    }

    /// Lower-case singular noun used in `not_found` messages.
    pub fn noun(self) -> &'static str {
        match self {
            Collection::Students => "student",
            Collection::Teachers => "teacher",
            Collection::Classrooms => "classroom",
            Collection::Classes => "class",
            Collection::AcademicYears => "academic year",
            Collection::TeachingBreaks => "teaching break",
            Collection::Lessons => "lesson",
            Collection::AttendanceRecords => "attendance record",
            Collection::Homework => "homework",
            Collection::Grades => "grade",
            Collection::PaymentObligations => "payment obligation",
            Collection::SalaryCalculations => "salary calculation",
        }
    }

    pub fn from_key(key: &str) -> Option<Collection> {
        Collection::ALL.into_iter().find(|c| c.key() == key)
    }
}

/// A persisted domain record.
pub trait Record: Serialize + DeserializeOwned + Clone {
    const COLLECTION: Collection;

    /// Input keys that must be present and non-null when a record is built
    /// from client input.
    const REQUIRED: &'static [&'static str];

    fn id(&self) -> &str;

    /// Human readable label used by breadcrumbs and dropdown options.
    fn label(&self) -> String;

    /// Field-level checks that need nothing but the record itself.
    fn validate(&self, ctx: &ValidationContext, v: &mut Validator);
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Minutes since midnight for an `HH:MM` string.
pub fn parse_time(raw: &str) -> Option<u32> {
    let (h, m) = raw.trim().split_once(':')?;
    if h.len() != 2 || m.len() != 2 {
        return None;
    }
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

pub fn format_time(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

pub(crate) fn full_name(first: &str, last: &str) -> String {
    format!("{} {}", first.trim(), last.trim()).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_parsing_requires_two_digit_fields() {
        assert_eq!(parse_time("08:30"), Some(510));
        assert_eq!(parse_time("23:59"), Some(1439));
        assert_eq!(parse_time("8:30"), None);
        assert_eq!(parse_time("24:00"), None);
        assert_eq!(parse_time("12:60"), None);
        assert_eq!(format_time(510), "08:30");
    }

    #[test]
    fn collection_keys_round_trip() {
        for c in Collection::ALL {
            assert_eq!(Collection::from_key(c.key()), Some(c));
        }
        assert_eq!(Collection::AttendanceRecords.key(), "attendance-records");
        assert_eq!(Collection::from_key("nope"), None);
    }
}
