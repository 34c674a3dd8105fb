//! Read models behind the progress and lesson-status dashboards.
//!
//! Both are computed from full collection scans and served through
//! `crate::cache::RequestCache`; any write invalidates them.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::model::{
    parse_date, round_cents, AttendanceRecord, AttendanceStatus, Grade, Homework, Lesson,
    LessonStatus, PaymentObligation, SchoolClass,
};

pub type ProgressKey = (String, Option<String>);
pub type MetricsKey = (Option<String>, Option<String>, Option<String>);

fn ratio(num: usize, den: usize) -> Option<f64> {
    if den == 0 {
        None
    } else {
        Some((num as f64 / den as f64 * 10_000.0).round() / 10_000.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceStats {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub excused: usize,
    /// `(present + late) / (total - excused)`.
    pub rate: Option<f64>,
}

impl AttendanceStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a AttendanceRecord>) -> Self {
        let mut s = AttendanceStats::default();
        for r in records {
            s.total += 1;
            match r.status {
                AttendanceStatus::Present => s.present += 1,
                AttendanceStatus::Absent => s.absent += 1,
                AttendanceStatus::Late => s.late += 1,
                AttendanceStatus::Excused => s.excused += 1,
            }
        }
        s.rate = ratio(s.present + s.late, s.total - s.excused);
        s
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeStats {
    pub count: usize,
    pub weighted_average: Option<f64>,
}

impl GradeStats {
    pub fn from_grades<'a>(grades: impl IntoIterator<Item = &'a Grade>) -> Self {
        let mut count = 0;
        let mut num = 0.0;
        let mut den = 0.0;
        for g in grades {
            if g.max_value <= 0.0 || g.weight <= 0.0 {
                continue;
            }
            count += 1;
            num += g.percent() * g.weight;
            den += g.weight;
        }
        GradeStats {
            count,
            weighted_average: (den > 0.0).then(|| round_cents(num / den)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeworkStats {
    pub assigned: usize,
    pub completed: usize,
    pub rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProgress {
    pub student_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
    pub attendance: AttendanceStats,
    pub grades: GradeStats,
    pub homework: HomeworkStats,
    pub outstanding_balance: f64,
}

pub struct ProgressInputs<'a> {
    pub classes: &'a [SchoolClass],
    pub attendance: &'a [AttendanceRecord],
    pub grades: &'a [Grade],
    pub homework: &'a [Homework],
    pub obligations: &'a [PaymentObligation],
}

pub fn student_progress(student_id: &str, class_id: Option<&str>, data: &ProgressInputs<'_>) -> StudentProgress {
    let in_scope = |cid: &str| class_id.map_or(true, |c| c == cid);

    let attendance = AttendanceStats::from_records(
        data.attendance
            .iter()
            .filter(|r| r.student_id == student_id && in_scope(&r.class_id)),
    );
    let grades = GradeStats::from_grades(
        data.grades
            .iter()
            .filter(|g| g.student_id == student_id && in_scope(&g.class_id)),
    );

    let enrolled: Vec<&str> = data
        .classes
        .iter()
        .filter(|c| c.has_student(student_id) && in_scope(&c.id))
        .map(|c| c.id.as_str())
        .collect();
    let mut homework = HomeworkStats::default();
    for hw in data.homework.iter().filter(|h| in_scope(&h.class_id)) {
        let submission = hw.submission_for(student_id);
        if submission.is_none() && !enrolled.contains(&hw.class_id.as_str()) {
            continue;
        }
        homework.assigned += 1;
        if submission.is_some_and(|s| s.status.is_done()) {
            homework.completed += 1;
        }
    }
    homework.rate = ratio(homework.completed, homework.assigned);

    let outstanding: f64 = data
        .obligations
        .iter()
        .filter(|o| o.student_id == student_id && o.status.is_open())
        .map(PaymentObligation::remaining)
        .sum();

    StudentProgress {
        student_id: student_id.to_string(),
        class_id: class_id.map(str::to_string),
        attendance,
        grades,
        homework,
        outstanding_balance: round_cents(outstanding),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonStatusMetrics {
    pub total: usize,
    pub by_status: BTreeMap<&'static str, usize>,
    /// `completed / (total - cancelled)`.
    pub completion_rate: Option<f64>,
    /// Scheduled lessons dated today or later.
    pub upcoming: usize,
}

pub fn lesson_status_metrics(
    lessons: &[Lesson],
    class_id: Option<&str>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    today: NaiveDate,
) -> LessonStatusMetrics {
    let mut by_status: BTreeMap<&'static str, usize> =
        LessonStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
    let mut total = 0;
    let mut upcoming = 0;
    for lesson in lessons {
        if class_id.is_some_and(|c| c != lesson.class_id) {
            continue;
        }
        let date = parse_date(&lesson.date);
        if from.is_some_and(|f| date.map_or(true, |d| d < f)) || to.is_some_and(|t| date.map_or(true, |d| d > t)) {
            continue;
        }
        total += 1;
        *by_status.entry(lesson.status.as_str()).or_insert(0) += 1;
        if lesson.status == LessonStatus::Scheduled && date.is_some_and(|d| d >= today) {
            upcoming += 1;
        }
    }
    let completed = by_status.get("completed").copied().unwrap_or(0);
    let cancelled = by_status.get("cancelled").copied().unwrap_or(0);
    LessonStatusMetrics {
        total,
        by_status,
        completion_rate: ratio(completed, total - cancelled),
        upcoming,
    }
}
