use serde::{Deserialize, Serialize};

use super::{Collection, Record};
use crate::validation::{ValidationContext, Validator, NAME_MAX, TITLE_MAX};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObligationStatus {
    #[default]
    Pending,
    Partial,
    Paid,
    Overdue,
    Cancelled,
}

impl ObligationStatus {
    /// Statuses that still expect money.
    pub fn is_open(self) -> bool {
        matches!(
            self,
            ObligationStatus::Pending | ObligationStatus::Partial | ObligationStatus::Overdue
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub amount: f64,
    pub paid_on: String,
    #[serde(default)]
    pub method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentObligation {
    pub id: String,
    pub student_id: String,
    #[serde(default)]
    pub class_id: Option<String>,
    pub description: String,
    pub amount: f64,
    #[serde(default)]
    pub currency: String,
    pub issued_on: String,
    pub due_on: String,
    #[serde(default)]
    pub status: ObligationStatus,
    #[serde(default)]
    pub paid_amount: f64,
    #[serde(default)]
    pub payments: Vec<Payment>,
    /// `YYYY-MM` billing month for obligations generated from a class.
    #[serde(default)]
    pub billing_month: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl PaymentObligation {
    pub fn remaining(&self) -> f64 {
        round_cents(self.amount - self.paid_amount).max(0.0)
    }
}

impl Record for PaymentObligation {
    const COLLECTION: Collection = Collection::PaymentObligations;
    const REQUIRED: &'static [&'static str] =
        &["studentId", "description", "amount", "issuedOn", "dueOn"];

    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> String {
        self.description.trim().to_string()
    }

    fn validate(&self, _ctx: &ValidationContext, v: &mut Validator) {
        v.required("studentId", &self.student_id, 64);
        v.required("description", &self.description, TITLE_MAX);
        v.positive("amount", self.amount);
        v.required("currency", &self.currency, 8);
        let issued = v.date("issuedOn", &self.issued_on);
        let due = v.date("dueOn", &self.due_on);
        v.date_order("dueOn", due, "issuedOn", issued);
        v.non_negative("paidAmount", self.paid_amount);
        if self.amount.is_finite() && self.paid_amount > self.amount + 0.005 {
            v.push("paidAmount", "must not exceed amount");
        }
        for (i, p) in self.payments.iter().enumerate() {
            v.positive(&format!("payments[{}].amount", i), p.amount);
            v.date(&format!("payments[{}].paidOn", i), &p.paid_on);
            v.optional(&format!("payments[{}].method", i), p.method.as_deref(), NAME_MAX);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalaryStatus {
    #[default]
    Draft,
    Approved,
    Paid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalaryCalculation {
    pub id: String,
    pub teacher_id: String,
    pub period_start: String,
    pub period_end: String,
    #[serde(default)]
    pub lesson_ids: Vec<String>,
    #[serde(default)]
    pub lesson_count: u32,
    #[serde(default)]
    pub total_hours: f64,
    #[serde(default)]
    pub hourly_rate: f64,
    #[serde(default)]
    pub base_amount: f64,
    #[serde(default)]
    pub bonus: f64,
    #[serde(default)]
    pub deductions: f64,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub status: SalaryStatus,
    #[serde(default)]
    pub calculated_at: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Record for SalaryCalculation {
    const COLLECTION: Collection = Collection::SalaryCalculations;
    const REQUIRED: &'static [&'static str] = &["teacherId", "periodStart", "periodEnd"];

    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> String {
        format!("{} to {}", self.period_start, self.period_end)
    }

    fn validate(&self, _ctx: &ValidationContext, v: &mut Validator) {
        v.required("teacherId", &self.teacher_id, 64);
        let start = v.date("periodStart", &self.period_start);
        let end = v.date("periodEnd", &self.period_end);
        v.date_order("periodEnd", end, "periodStart", start);
        v.non_negative("bonus", self.bonus);
        v.non_negative("deductions", self.deductions);
        v.non_negative("hourlyRate", self.hourly_rate);
    }
}

/// Money is kept as f64 on the wire; round to cents at every write.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
