//! Payment obligations: payments, cancellation, overdue marking, monthly
//! billing of a class and per-student balances.

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::model::{
    format_date, new_id, now_ts, parse_date, round_cents, Lesson, LessonStatus, ObligationStatus,
    Payment, PaymentObligation, SchoolClass,
};
use crate::validation::{RuleError, Validator, NAME_MAX};

/// Tolerance for comparing money amounts rounded to cents.
const CENT: f64 = 0.005;

pub fn record_payment(
    obligation: &mut PaymentObligation,
    amount: f64,
    paid_on: &str,
    method: Option<String>,
) -> Result<(), RuleError> {
    match obligation.status {
        ObligationStatus::Cancelled => return Err(RuleError::state("obligation is cancelled")),
        ObligationStatus::Paid => return Err(RuleError::state("obligation is already paid")),
        _ => {}
    }
    let mut v = Validator::new();
    v.positive("amount", amount);
    let remaining = obligation.remaining();
    if amount.is_finite() && amount > remaining + CENT {
        v.push("amount", format!("must not exceed the remaining {:.2}", remaining));
    }
    v.date("paidOn", paid_on);
    v.optional("method", method.as_deref(), NAME_MAX);
    v.finish()?;

    obligation.payments.push(Payment {
        amount: round_cents(amount),
        paid_on: paid_on.trim().to_string(),
        method,
    });
    obligation.paid_amount = round_cents(obligation.paid_amount + amount);
    obligation.status = if obligation.remaining() <= CENT {
        ObligationStatus::Paid
    } else {
        ObligationStatus::Partial
    };
    obligation.updated_at = now_ts();
    Ok(())
}

pub fn cancel(obligation: &mut PaymentObligation) -> Result<(), RuleError> {
    if obligation.status == ObligationStatus::Cancelled {
        return Err(RuleError::state("obligation is already cancelled"));
    }
    if obligation.paid_amount > 0.0 || !obligation.payments.is_empty() {
        return Err(RuleError::state("cannot cancel an obligation with recorded payments"));
    }
    obligation.status = ObligationStatus::Cancelled;
    obligation.updated_at = now_ts();
    Ok(())
}

/// Pending or partially paid, and `dueOn + grace` is before `as_of`.
pub fn is_overdue(obligation: &PaymentObligation, as_of: NaiveDate, grace_days: i64) -> bool {
    if !matches!(
        obligation.status,
        ObligationStatus::Pending | ObligationStatus::Partial | ObligationStatus::Overdue
    ) {
        return false;
    }
    parse_date(&obligation.due_on)
        .and_then(|due| due.checked_add_signed(Duration::try_days(grace_days)?))
        .is_some_and(|deadline| deadline < as_of)
}

/// Marks overdue obligations in place and returns how many changed.
pub fn refresh_overdue(obligations: &mut [PaymentObligation], as_of: NaiveDate, grace_days: i64) -> usize {
    let ts = now_ts();
    let mut changed = 0;
    for o in obligations.iter_mut() {
        if o.status != ObligationStatus::Overdue && is_overdue(o, as_of, grace_days) {
            o.status = ObligationStatus::Overdue;
            o.updated_at = ts.clone();
            changed += 1;
        }
    }
    changed
}

/// First and last day of a `YYYY-MM` month.
pub fn month_bounds(month: &str) -> Option<(NaiveDate, NaiveDate)> {
    let (y, m) = month.trim().split_once('-')?;
    if y.len() != 4 || m.len() != 2 {
        return None;
    }
    let first = NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, 1)?;
    let next = first.checked_add_months(chrono::Months::new(1))?;
    Some((first, next - Duration::days(1)))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingPlan {
    pub month: String,
    pub lesson_count: usize,
    pub amount: f64,
    pub obligations: Vec<PaymentObligation>,
    /// Students already billed for this class and month.
    pub skipped_students: Vec<String>,
}

pub struct BillingRequest<'a> {
    pub month: &'a str,
    pub due_on: Option<&'a str>,
    pub currency: &'a str,
    pub default_due_day: u32,
}

/// One obligation per enrolled student: non-cancelled lessons of the month
/// times the class lesson price.
pub fn plan_class_billing(
    class: &SchoolClass,
    lessons: &[Lesson],
    existing: &[PaymentObligation],
    req: &BillingRequest<'_>,
) -> Result<BillingPlan, RuleError> {
    let (first, last) =
        month_bounds(req.month).ok_or_else(|| RuleError::field("month", "must be a month in YYYY-MM format"))?;
    if class.lesson_price <= 0.0 {
        return Err(RuleError::state("class has no lesson price"));
    }
    let due_on = match req.due_on.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => {
            let due = parse_date(raw).ok_or_else(|| RuleError::field("dueOn", "must be a date in YYYY-MM-DD format"))?;
            if due < first {
                return Err(RuleError::field("dueOn", "must be on or after issuedOn"));
            }
            due
        }
        None => {
            let next = first
                .checked_add_months(chrono::Months::new(1))
                .ok_or_else(|| RuleError::field("month", "is out of range"))?;
            next.with_day(req.default_due_day).unwrap_or(next)
        }
    };

    let lesson_count = lessons
        .iter()
        .filter(|l| l.class_id == class.id && l.status != LessonStatus::Cancelled)
        .filter(|l| parse_date(&l.date).is_some_and(|d| first <= d && d <= last))
        .count();
    if lesson_count == 0 {
        return Err(RuleError::field("month", "has no billable lessons for this class"));
    }
    let amount = round_cents(lesson_count as f64 * class.lesson_price);
    let month = format!("{:04}-{:02}", first.year(), first.month());

    let ts = now_ts();
    let mut plan = BillingPlan {
        month: month.clone(),
        lesson_count,
        amount,
        obligations: Vec::new(),
        skipped_students: Vec::new(),
    };
    for student_id in &class.student_ids {
        let billed = existing.iter().any(|o| {
            o.student_id == *student_id
                && o.class_id.as_deref() == Some(class.id.as_str())
                && o.billing_month.as_deref() == Some(month.as_str())
                && o.status != ObligationStatus::Cancelled
        });
        if billed {
            plan.skipped_students.push(student_id.clone());
            continue;
        }
        plan.obligations.push(PaymentObligation {
            id: new_id(),
            student_id: student_id.clone(),
            class_id: Some(class.id.clone()),
            description: format!("{} {}", class.name.trim(), month),
            amount,
            currency: req.currency.to_string(),
            issued_on: format_date(first),
            due_on: format_date(due_on),
            status: ObligationStatus::Pending,
            paid_amount: 0.0,
            payments: Vec::new(),
            billing_month: Some(month.clone()),
            created_at: ts.clone(),
            updated_at: ts.clone(),
        });
    }
    Ok(plan)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentBalance {
    pub student_id: String,
    pub billed: f64,
    pub paid: f64,
    pub outstanding: f64,
    pub overdue: f64,
    pub open_count: usize,
}

/// Cancelled obligations are ignored entirely.
pub fn student_balance(
    student_id: &str,
    obligations: &[PaymentObligation],
    as_of: NaiveDate,
    grace_days: i64,
) -> StudentBalance {
    let mut b = StudentBalance {
        student_id: student_id.to_string(),
        ..Default::default()
    };
    for o in obligations
        .iter()
        .filter(|o| o.student_id == student_id && o.status != ObligationStatus::Cancelled)
    {
        b.billed += o.amount;
        b.paid += o.paid_amount;
        if o.status.is_open() {
            b.open_count += 1;
            b.outstanding += o.remaining();
            if is_overdue(o, as_of, grace_days) {
                b.overdue += o.remaining();
            }
        }
    }
    b.billed = round_cents(b.billed);
    b.paid = round_cents(b.paid);
    b.outstanding = round_cents(b.outstanding);
    b.overdue = round_cents(b.overdue);
    b
}
