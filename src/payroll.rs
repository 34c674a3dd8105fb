//! Teacher salary calculation and its draft → approved → paid lifecycle.

use chrono::NaiveDate;

use crate::model::{
    new_id, now_ts, parse_date, round_cents, Lesson, LessonStatus, Record, SalaryCalculation,
    SalaryStatus, Teacher,
};
use crate::validation::{RuleError, Validator};

pub struct SalaryInput<'a> {
    pub period_start: &'a str,
    pub period_end: &'a str,
    pub bonus: f64,
    pub deductions: f64,
}

fn in_period(lesson: &Lesson, start: NaiveDate, end: NaiveDate) -> bool {
    parse_date(&lesson.date).is_some_and(|d| start <= d && d <= end)
}

/// Builds the calculation for completed lessons taught in the period.
/// `existing` is a previous calculation for the same teacher and period; a
/// draft is replaced in place, anything further along is locked.
pub fn calculate(
    teacher: &Teacher,
    lessons: &[Lesson],
    input: &SalaryInput<'_>,
    existing: Option<&SalaryCalculation>,
) -> Result<SalaryCalculation, RuleError> {
    if let Some(prev) = existing {
        if prev.status != SalaryStatus::Draft {
            return Err(RuleError::state(format!(
                "salary for {} is already {}",
                prev.label(),
                status_str(prev.status)
            )));
        }
    }

    let mut v = Validator::new();
    let start = v.date("periodStart", input.period_start);
    let end = v.date("periodEnd", input.period_end);
    v.date_order("periodEnd", end, "periodStart", start);
    v.non_negative("bonus", input.bonus);
    v.non_negative("deductions", input.deductions);
    v.finish()?;
    let (Some(start), Some(end)) = (start, end) else {
        return Err(RuleError::field("periodStart", "is required"));
    };

    let mut taught: Vec<&Lesson> = lessons
        .iter()
        .filter(|l| l.teacher_id == teacher.id && l.status == LessonStatus::Completed)
        .filter(|l| in_period(l, start, end))
        .collect();
    taught.sort_by(|a, b| (&a.date, &a.start_time).cmp(&(&b.date, &b.start_time)));

    let minutes: u32 = taught.iter().map(|l| l.duration_minutes()).sum();
    let total_hours = round_cents(minutes as f64 / 60.0);
    let base_amount = round_cents(minutes as f64 / 60.0 * teacher.hourly_rate);
    let total = round_cents((base_amount + input.bonus - input.deductions).max(0.0));

    let ts = now_ts();
    let (id, created_at) = match existing {
        Some(prev) => (prev.id.clone(), prev.created_at.clone()),
        None => (new_id(), ts.clone()),
    };
    tracing::info!(
        teacher = %teacher.id,
        lessons = taught.len(),
        hours = total_hours,
        total,
        "salary calculated"
    );
    Ok(SalaryCalculation {
        id,
        teacher_id: teacher.id.clone(),
        period_start: input.period_start.trim().to_string(),
        period_end: input.period_end.trim().to_string(),
        lesson_ids: taught.iter().map(|l| l.id.clone()).collect(),
        lesson_count: taught.len() as u32,
        total_hours,
        hourly_rate: teacher.hourly_rate,
        base_amount,
        bonus: round_cents(input.bonus),
        deductions: round_cents(input.deductions),
        total,
        status: SalaryStatus::Draft,
        calculated_at: ts.clone(),
        created_at,
        updated_at: ts,
    })
}

pub fn status_str(status: SalaryStatus) -> &'static str {
    match status {
        SalaryStatus::Draft => "draft",
        SalaryStatus::Approved => "approved",
        SalaryStatus::Paid => "paid",
    }
}

fn transition(salary: &mut SalaryCalculation, from: SalaryStatus, to: SalaryStatus) -> Result<(), RuleError> {
    if salary.status != from {
        return Err(RuleError::state(format!(
            "salary is {}, expected {}",
            status_str(salary.status),
            status_str(from)
        )));
    }
    salary.status = to;
    salary.updated_at = now_ts();
    Ok(())
}

pub fn approve(salary: &mut SalaryCalculation) -> Result<(), RuleError> {
    transition(salary, SalaryStatus::Draft, SalaryStatus::Approved)
}

pub fn mark_paid(salary: &mut SalaryCalculation) -> Result<(), RuleError> {
    transition(salary, SalaryStatus::Approved, SalaryStatus::Paid)
}

pub fn ensure_deletable(salary: &SalaryCalculation) -> Result<(), RuleError> {
    if salary.status != SalaryStatus::Draft {
        return Err(RuleError::state(format!(
            "only draft salaries can be deleted; this one is {}",
            status_str(salary.status)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TeacherStatus;

    fn teacher() -> Teacher {
        Teacher {
            id: "t1".into(),
            first_name: "Ana".into(),
            last_name: "Kovač".into(),
            email: "ana@example.com".into(),
            phone: None,
            subjects: vec!["Math".into()],
            hourly_rate: 20.0,
            status: TeacherStatus::Active,
            hired_on: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn lesson(id: &str, teacher: &str, date: &str, start: &str, end: &str, status: LessonStatus) -> Lesson {
        Lesson {
            id: id.into(),
            class_id: "c1".into(),
            date: date.into(),
            start_time: start.into(),
            end_time: end.into(),
            teacher_id: teacher.into(),
            classroom_id: None,
            status,
            topic: None,
            notes: String::new(),
            generated: false,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn input(bonus: f64, deductions: f64) -> SalaryInput<'static> {
        SalaryInput {
            period_start: "2026-09-01",
            period_end: "2026-09-30",
            bonus,
            deductions,
        }
    }

    #[test]
    fn counts_completed_lessons_in_period() {
        let lessons = vec![
            lesson("a", "t1", "2026-09-07", "16:00", "17:30", LessonStatus::Completed),
            lesson("b", "t1", "2026-09-09", "16:00", "17:00", LessonStatus::Completed),
            lesson("c", "t1", "2026-09-10", "16:00", "17:00", LessonStatus::Cancelled),
            lesson("d", "t2", "2026-09-10", "16:00", "17:00", LessonStatus::Completed),
            lesson("e", "t1", "2026-10-01", "16:00", "17:00", LessonStatus::Completed),
        ];
        let s = calculate(&teacher(), &lessons, &input(10.0, 5.0), None).expect("calc");
        assert_eq!(s.lesson_ids, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(s.total_hours, 2.5);
        assert_eq!(s.base_amount, 50.0);
        assert_eq!(s.total, 55.0);
        assert_eq!(s.status, SalaryStatus::Draft);
    }

    #[test]
    fn total_never_negative() {
        let s = calculate(&teacher(), &[], &input(0.0, 30.0), None).expect("calc");
        assert_eq!(s.total, 0.0);
    }

    #[test]
    fn lifecycle_and_locking() {
        let mut s = calculate(&teacher(), &[], &input(0.0, 0.0), None).expect("calc");
        let again = calculate(&teacher(), &[], &input(5.0, 0.0), Some(&s)).expect("replace draft");
        assert_eq!(again.id(), s.id());

        assert!(mark_paid(&mut s).is_err());
        approve(&mut s).expect("approve");
        assert!(ensure_deletable(&s).is_err());
        assert!(matches!(
            calculate(&teacher(), &[], &input(0.0, 0.0), Some(&s)),
            Err(RuleError::InvalidState(_))
        ));
        mark_paid(&mut s).expect("paid");
        assert_eq!(s.status, SalaryStatus::Paid);
    }
}
