use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    commit, filters, get_optional_f64, get_optional_str, get_required_str, load, respond,
    store_ref,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Lesson, Record, SalaryCalculation, SalaryStatus, Teacher};
use crate::payroll::{approve, calculate, ensure_deletable, mark_paid, SalaryInput};
use crate::store::{list, WriteBatch};
use serde_json::{json, Value};

fn salaries_calculate(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let period_start = get_required_str(params, "periodStart")?;
    let period_end = get_required_str(params, "periodEnd")?;
    let bonus = get_optional_f64(params, "bonus")?.unwrap_or(0.0);
    let deductions = get_optional_f64(params, "deductions")?.unwrap_or(0.0);
    let store = store_ref(state)?;

    let teacher = load::<Teacher>(store, &teacher_id)?;
    let lessons = list::<Lesson>(store)?;
    let existing = list::<SalaryCalculation>(store)?.into_iter().find(|s| {
        s.teacher_id == teacher_id && s.period_start == period_start && s.period_end == period_end
    });
    let salary = calculate(
        &teacher,
        &lessons,
        &SalaryInput {
            period_start: &period_start,
            period_end: &period_end,
            bonus,
            deductions,
        },
        existing.as_ref(),
    )?;

    let mut batch = WriteBatch::new();
    batch.put(&salary)?;
    commit(state, &batch, "salaries.calculate")?;
    Ok(json!({
        "item": salary,
        "teacherName": teacher.label(),
        "replaced": existing.is_some(),
    }))
}

fn salaries_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let f = filters(params);
    let teacher_id = get_optional_str(f, "teacherId")?;
    let status: Option<SalaryStatus> = get_optional_str(f, "status")?
        .map(|s| {
            serde_json::from_value(json!(s))
                .map_err(|_| HandlerErr::bad_params(format!("unknown salary status: {}", s)))
        })
        .transpose()?;
    let mut rows: Vec<SalaryCalculation> = list::<SalaryCalculation>(store_ref(state)?)?
        .into_iter()
        .filter(|s| teacher_id.as_deref().map_or(true, |t| s.teacher_id == t))
        .filter(|s| status.map_or(true, |st| s.status == st))
        .collect();
    rows.sort_by(|a, b| b.period_start.cmp(&a.period_start).then(a.teacher_id.cmp(&b.teacher_id)));
    Ok(json!({ "total": rows.len(), "items": rows }))
}

fn salaries_open(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = store_ref(state)?;
    let id = get_required_str(params, "id")?;
    let salary = load::<SalaryCalculation>(store, &id)?;
    let mut lessons: Vec<Lesson> = list::<Lesson>(store)?
        .into_iter()
        .filter(|l| salary.lesson_ids.contains(&l.id))
        .collect();
    lessons.sort_by(|a, b| (&a.date, &a.start_time).cmp(&(&b.date, &b.start_time)));
    Ok(json!({ "item": salary, "lessons": lessons }))
}

fn salaries_transition(
    state: &mut AppState,
    params: &Value,
    what: &str,
    step: fn(&mut SalaryCalculation) -> Result<(), crate::validation::RuleError>,
) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let mut salary = load::<SalaryCalculation>(store_ref(state)?, &id)?;
    step(&mut salary)?;
    let mut batch = WriteBatch::new();
    batch.put(&salary)?;
    commit(state, &batch, what)?;
    tracing::info!(salary = %id, status = ?salary.status, "salary status changed");
    Ok(json!({ "item": salary }))
}

fn salaries_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let salary = load::<SalaryCalculation>(store_ref(state)?, &id)?;
    ensure_deletable(&salary)?;
    let mut batch = WriteBatch::new();
    batch.delete::<SalaryCalculation>(&id);
    commit(state, &batch, "salaries.delete")?;
    Ok(json!({ "deleted": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "salaries.calculate" => salaries_calculate(state, &req.params),
        "salaries.list" => salaries_list(state, &req.params),
        "salaries.open" => salaries_open(state, &req.params),
        "salaries.approve" => salaries_transition(state, &req.params, "salaries.approve", approve),
        "salaries.markPaid" => salaries_transition(state, &req.params, "salaries.markPaid", mark_paid),
        "salaries.delete" => salaries_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
