use serde::{Deserialize, Serialize};

use super::{parse_date, parse_time, Collection, Record};
use crate::validation::{ValidationContext, Validator, TEXT_MAX, TITLE_MAX};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
    Postponed,
}

impl LessonStatus {
    pub const ALL: [LessonStatus; 4] = [
        LessonStatus::Scheduled,
        LessonStatus::Completed,
        LessonStatus::Cancelled,
        LessonStatus::Postponed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LessonStatus::Scheduled => "scheduled",
            LessonStatus::Completed => "completed",
            LessonStatus::Cancelled => "cancelled",
            LessonStatus::Postponed => "postponed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    pub class_id: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub teacher_id: String,
    #[serde(default)]
    pub classroom_id: Option<String>,
    #[serde(default)]
    pub status: LessonStatus,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub generated: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Lesson {
    pub fn minutes(&self) -> Option<(u32, u32)> {
        Some((parse_time(&self.start_time)?, parse_time(&self.end_time)?))
    }

    pub fn duration_minutes(&self) -> u32 {
        self.minutes().map(|(s, e)| e.saturating_sub(s)).unwrap_or(0)
    }
}

impl Record for Lesson {
    const COLLECTION: Collection = Collection::Lessons;
    const REQUIRED: &'static [&'static str] =
        &["classId", "date", "startTime", "endTime", "teacherId"];

    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> String {
        match self.topic.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(topic) => format!("{} {}", self.date, topic),
            None => format!("{} {}", self.date, self.start_time),
        }
    }

    fn validate(&self, _ctx: &ValidationContext, v: &mut Validator) {
        v.required("classId", &self.class_id, 64);
        v.required("teacherId", &self.teacher_id, 64);
        v.date("date", &self.date);
        let start = v.time("startTime", &self.start_time);
        let end = v.time("endTime", &self.end_time);
        v.time_order("endTime", end, "startTime", start);
        v.optional("topic", self.topic.as_deref(), TITLE_MAX);
        v.optional("notes", Some(&self.notes), TEXT_MAX);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub lesson_id: String,
    pub class_id: String,
    pub student_id: String,
    pub date: String,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Record for AttendanceRecord {
    const COLLECTION: Collection = Collection::AttendanceRecords;
    const REQUIRED: &'static [&'static str] =
        &["lessonId", "classId", "studentId", "date", "status"];

    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> String {
        format!("{} {}", self.date, self.student_id)
    }

    fn validate(&self, _ctx: &ValidationContext, v: &mut Validator) {
        v.required("lessonId", &self.lesson_id, 64);
        v.required("studentId", &self.student_id, 64);
        v.date("date", &self.date);
        v.optional("note", self.note.as_deref(), TITLE_MAX * 2);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    #[default]
    Pending,
    Submitted,
    Late,
    Missing,
}

impl SubmissionStatus {
    pub fn is_done(self) -> bool {
        matches!(self, SubmissionStatus::Submitted | SubmissionStatus::Late)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub student_id: String,
    #[serde(default)]
    pub status: SubmissionStatus,
    #[serde(default)]
    pub submitted_on: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Homework {
    pub id: String,
    pub class_id: String,
    #[serde(default)]
    pub lesson_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub assigned_on: String,
    pub due_on: String,
    #[serde(default)]
    pub submissions: Vec<Submission>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Homework {
    pub fn submission_for(&self, student_id: &str) -> Option<&Submission> {
        self.submissions.iter().find(|s| s.student_id == student_id)
    }
}

impl Record for Homework {
    const COLLECTION: Collection = Collection::Homework;
    const REQUIRED: &'static [&'static str] = &["classId", "title", "assignedOn", "dueOn"];

    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> String {
        self.title.trim().to_string()
    }

    fn validate(&self, _ctx: &ValidationContext, v: &mut Validator) {
        v.required("classId", &self.class_id, 64);
        v.required("title", &self.title, TITLE_MAX);
        v.optional("description", Some(&self.description), TEXT_MAX);
        let assigned = v.date("assignedOn", &self.assigned_on);
        let due = v.date("dueOn", &self.due_on);
        v.date_order("dueOn", due, "assignedOn", assigned);
        for (i, s) in self.submissions.iter().enumerate() {
            let submitted =
                v.optional_date(&format!("submissions[{}].submittedOn", i), s.submitted_on.as_deref());
            v.date_order(
                &format!("submissions[{}].submittedOn", i),
                submitted,
                "assignedOn",
                assigned,
            );
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeKind {
    #[default]
    Homework,
    Quiz,
    Test,
    Exam,
    Participation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub id: String,
    pub student_id: String,
    pub class_id: String,
    #[serde(default)]
    pub lesson_id: Option<String>,
    #[serde(default)]
    pub homework_id: Option<String>,
    #[serde(default)]
    pub kind: GradeKind,
    pub value: f64,
    #[serde(default = "default_max_value")]
    pub max_value: f64,
    #[serde(default = "default_weight")]
    pub weight: f64,
    pub date: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

fn default_max_value() -> f64 {
    100.0
}

fn default_weight() -> f64 {
    1.0
}

impl Grade {
    pub fn percent(&self) -> f64 {
        if self.max_value > 0.0 {
            self.value / self.max_value * 100.0
        } else {
            0.0
        }
    }
}

impl Record for Grade {
    const COLLECTION: Collection = Collection::Grades;
    const REQUIRED: &'static [&'static str] = &["studentId", "classId", "value", "date"];

    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> String {
        format!("{} {}/{}", self.date, self.value, self.max_value)
    }

    fn validate(&self, _ctx: &ValidationContext, v: &mut Validator) {
        v.required("studentId", &self.student_id, 64);
        v.required("classId", &self.class_id, 64);
        v.positive("maxValue", self.max_value);
        if self.max_value.is_finite() && self.max_value > 0.0 {
            v.range("value", self.value, 0.0, self.max_value);
        }
        v.positive("weight", self.weight);
        v.date("date", &self.date);
        v.optional("comment", self.comment.as_deref(), TITLE_MAX * 4);
        if parse_date(&self.date).is_some_and(|d| d > super::today()) {
            v.push("date", "must not be in the future");
        }
    }
}
