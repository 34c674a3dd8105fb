//! Expansion of a class's weekly schedule into dated lessons.
//!
//! # Invariants
//! - Dates inside a teaching break (inclusive) never receive a lesson.
//! - A (date, startTime) already holding a lesson of the class is skipped, so
//!   running generation twice over the same window creates nothing new.

use std::collections::HashSet;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::model::{
    format_date, new_id, now_ts, parse_date, AcademicYear, Lesson, LessonStatus, SchoolClass,
    TeachingBreak, Weekday,
};
use crate::validation::ValidationErrors;

/// Longest window a single request may expand.
pub const MAX_WINDOW_DAYS: i64 = 731;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl Window {
    pub fn is_empty(&self) -> bool {
        self.to < self.from
    }
}

/// Intersection of the requested range, the academic year and the class's
/// own dates.
pub fn resolve_window(
    class: &SchoolClass,
    year: Option<&AcademicYear>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Window, ValidationErrors> {
    let year_bounds = year.and_then(AcademicYear::bounds);
    let class_start = class.start_date.as_deref().and_then(parse_date);
    let class_end = class.end_date.as_deref().and_then(parse_date);

    let start = [from, year_bounds.map(|b| b.0), class_start]
        .into_iter()
        .flatten()
        .max();
    let end = [to, year_bounds.map(|b| b.1), class_end]
        .into_iter()
        .flatten()
        .min();

    let (Some(from), Some(to)) = (start, end) else {
        let field = if start.is_none() { "from" } else { "to" };
        return Err(ValidationErrors::single(
            field,
            "is required when the class has no academic year or dates",
        ));
    };
    let window = Window { from, to };
    if !window.is_empty() && (to - from).num_days() >= MAX_WINDOW_DAYS {
        return Err(ValidationErrors::single(
            "to",
            format!("window must span at most {} days", MAX_WINDOW_DAYS),
        ));
    }
    Ok(window)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationPlan {
    pub from: String,
    pub to: String,
    pub created: usize,
    pub skipped_breaks: usize,
    pub skipped_existing: usize,
    pub lessons: Vec<Lesson>,
}

/// Computes the lessons to create. `breaks` should already be limited to the
/// class's academic year; `existing` may contain lessons of any class.
pub fn plan_lessons(
    class: &SchoolClass,
    window: Window,
    breaks: &[TeachingBreak],
    existing: &[Lesson],
) -> GenerationPlan {
    let taken: HashSet<(&str, &str)> = existing
        .iter()
        .filter(|l| l.class_id == class.id)
        .map(|l| (l.date.trim(), l.start_time.trim()))
        .collect();

    let mut slots: Vec<_> = class.schedule.iter().collect();
    slots.sort_by(|a, b| a.start_time.cmp(&b.start_time));

    let mut plan = GenerationPlan {
        from: format_date(window.from),
        to: format_date(window.to),
        created: 0,
        skipped_breaks: 0,
        skipped_existing: 0,
        lessons: Vec::new(),
    };
    if window.is_empty() || slots.is_empty() {
        return plan;
    }

    let ts = now_ts();
    let mut date = window.from;
    while date <= window.to {
        let weekday = Weekday::of(date);
        let todays: Vec<_> = slots.iter().filter(|s| s.day == weekday).collect();
        if !todays.is_empty() {
            let day = format_date(date);
            if breaks.iter().any(|b| b.covers(date)) {
                plan.skipped_breaks += todays.len();
            } else {
                for slot in todays {
                    if taken.contains(&(day.as_str(), slot.start_time.trim())) {
                        plan.skipped_existing += 1;
                        continue;
                    }
                    plan.lessons.push(Lesson {
                        id: new_id(),
                        class_id: class.id.clone(),
                        date: day.clone(),
                        start_time: slot.start_time.clone(),
                        end_time: slot.end_time.clone(),
                        teacher_id: class.teacher_id.clone(),
                        classroom_id: class.slot_classroom(slot).map(str::to_string),
                        status: LessonStatus::Scheduled,
                        topic: None,
                        notes: String::new(),
                        generated: true,
                        created_at: ts.clone(),
                        updated_at: ts.clone(),
                    });
                }
            }
        }
        date += Duration::days(1);
    }
    plan.created = plan.lessons.len();
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BreakKind, ClassStatus, ScheduleSlot};

    fn d(s: &str) -> NaiveDate {
        parse_date(s).expect("date")
    }

    fn class() -> SchoolClass {
        SchoolClass {
            id: "c1".into(),
            name: "Algebra".into(),
            subject: "Math".into(),
            level: None,
            teacher_id: "t1".into(),
            classroom_id: Some("r1".into()),
            academic_year_id: Some("y1".into()),
            max_students: 15,
            student_ids: vec![],
            schedule: vec![
                ScheduleSlot {
                    day: Weekday::Wednesday,
                    start_time: "17:00".into(),
                    end_time: "18:00".into(),
                    classroom_id: Some("r2".into()),
                },
                ScheduleSlot {
                    day: Weekday::Monday,
                    start_time: "16:00".into(),
                    end_time: "17:00".into(),
                    classroom_id: None,
                },
            ],
            lesson_price: 25.0,
            status: ClassStatus::Active,
            start_date: None,
            end_date: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn year() -> AcademicYear {
        AcademicYear {
            id: "y1".into(),
            name: "2026/27".into(),
            start_date: "2026-09-01".into(),
            end_date: "2027-06-30".into(),
            is_active: true,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn window_intersects_request_year_and_class_dates() {
        let mut c = class();
        c.end_date = Some("2026-12-20".into());
        let w = resolve_window(&c, Some(&year()), Some(d("2026-08-01")), None).expect("window");
        assert_eq!(w, Window { from: d("2026-09-01"), to: d("2026-12-20") });
    }

    #[test]
    fn window_needs_bounds() {
        let mut c = class();
        c.academic_year_id = None;
        let err = resolve_window(&c, None, Some(d("2026-09-01")), None).expect_err("no end");
        assert_eq!(err.fields[0].field, "to");
    }

    #[test]
    fn skips_breaks_and_existing_lessons() {
        let c = class();
        let window = Window { from: d("2026-09-07"), to: d("2026-09-20") };
        let breaks = vec![TeachingBreak {
            id: "b1".into(),
            academic_year_id: "y1".into(),
            name: "Autumn".into(),
            start_date: "2026-09-14".into(),
            end_date: "2026-09-16".into(),
            kind: BreakKind::Holiday,
            created_at: String::new(),
            updated_at: String::new(),
        }];
        let first = plan_lessons(&c, window, &breaks, &[]);
        // Mon 7th, Wed 9th; Mon 14th and Wed 16th fall inside the break.
        let dates: Vec<_> = first.lessons.iter().map(|l| l.date.as_str()).collect();
        assert_eq!(dates, vec!["2026-09-07", "2026-09-09"]);
        assert_eq!(first.skipped_breaks, 2);
        assert_eq!(first.lessons[0].classroom_id.as_deref(), Some("r1"));
        assert_eq!(first.lessons[1].classroom_id.as_deref(), Some("r2"));
        assert!(first.lessons.iter().all(|l| l.generated && l.status == LessonStatus::Scheduled));

        let again = plan_lessons(&c, window, &breaks, &first.lessons);
        assert_eq!(again.created, 0);
        assert_eq!(again.skipped_existing, 2);
    }

    #[test]
    fn empty_window_creates_nothing() {
        let window = Window { from: d("2026-10-10"), to: d("2026-10-01") };
        let plan = plan_lessons(&class(), window, &[], &[]);
        assert_eq!(plan.created, 0);
    }
}
