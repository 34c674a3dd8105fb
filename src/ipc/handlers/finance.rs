use crate::finance::{
    cancel, is_overdue, plan_class_billing, record_payment, refresh_overdue, student_balance,
    BillingRequest,
};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    commit, exists, field_error, filters, get_flag, get_object, get_optional_date,
    get_optional_f64, get_optional_str, get_required_str, load, new_record, patched, respond,
    store_ref, to_json, validate,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{
    format_date, today, Lesson, ObligationStatus, PaymentObligation, SchoolClass, Student,
};
use crate::store::{list, Store, WriteBatch};
use serde_json::{json, Value};

/// Fields only payment operations may change.
const LEDGER_FIELDS: [&str; 4] = ["amount", "status", "paidAmount", "payments"];

/// Ledger fields a manual create may not preset; `amount` is the charge itself.
const PAYMENT_FIELDS: [&str; 3] = ["status", "paidAmount", "payments"];

fn check_obligation(store: &dyn Store, ob: &PaymentObligation) -> Result<(), HandlerErr> {
    if !exists::<Student>(store, &ob.student_id)? {
        return Err(field_error("studentId", "references an unknown student"));
    }
    if let Some(class_id) = ob.class_id.as_deref().filter(|s| !s.is_empty()) {
        if !exists::<SchoolClass>(store, class_id)? {
            return Err(field_error("classId", "references an unknown class"));
        }
    }
    Ok(())
}

fn obligations_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let f = filters(params);
    let student_id = get_optional_str(f, "studentId")?;
    let class_id = get_optional_str(f, "classId")?;
    let status: Option<ObligationStatus> = get_optional_str(f, "status")?
        .map(|s| {
            serde_json::from_value(json!(s))
                .map_err(|_| HandlerErr::bad_params(format!("unknown obligation status: {}", s)))
        })
        .transpose()?;
    let overdue_as_of = get_optional_date(f, "overdueAsOf")?;
    let grace = state.config.finance.overdue_grace_days;

    let mut rows: Vec<PaymentObligation> = list::<PaymentObligation>(store_ref(state)?)?
        .into_iter()
        .filter(|o| student_id.as_deref().map_or(true, |s| o.student_id == s))
        .filter(|o| class_id.as_deref().map_or(true, |c| o.class_id.as_deref() == Some(c)))
        .filter(|o| status.map_or(true, |s| o.status == s))
        .filter(|o| overdue_as_of.map_or(true, |d| is_overdue(o, d, grace)))
        .collect();
    rows.sort_by(|a, b| (&a.due_on, &a.description).cmp(&(&b.due_on, &b.description)));
    let outstanding: f64 = rows
        .iter()
        .filter(|o| o.status.is_open())
        .map(PaymentObligation::remaining)
        .sum();
    Ok(json!({
        "total": rows.len(),
        "outstanding": crate::model::round_cents(outstanding),
        "items": rows,
    }))
}

fn obligations_open(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let item = load::<PaymentObligation>(store_ref(state)?, &id)?;
    Ok(json!({ "item": item, "remaining": item.remaining() }))
}

fn obligations_create(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let currency = state.config.finance.currency.clone();
    let ob: PaymentObligation = new_record(get_object(params, "input")?, |obj| {
        for f in PAYMENT_FIELDS {
            obj.remove(f);
        }
        obj.entry("currency").or_insert_with(|| json!(currency));
        obj.entry("issuedOn")
            .or_insert_with(|| json!(format_date(today())));
    })?;
    validate(&ob, &state.validation_context())?;
    check_obligation(store_ref(state)?, &ob)?;
    let mut batch = WriteBatch::new();
    batch.put(&ob)?;
    commit(state, &batch, "obligations.create")?;
    Ok(json!({ "item": ob }))
}

fn obligations_update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let patch = get_object(params, "patch")?;
    if let Some(f) = LEDGER_FIELDS.iter().find(|f| patch.contains_key(**f)) {
        return Err(field_error(
            f,
            "is managed by recordPayment, cancel and refreshOverdue",
        ));
    }
    let existing = load::<PaymentObligation>(store_ref(state)?, &id)?;
    if existing.status == ObligationStatus::Cancelled {
        return Err(HandlerErr::invalid_state("obligation is cancelled"));
    }
    let ob = patched(&existing, patch)?;
    validate(&ob, &state.validation_context())?;
    check_obligation(store_ref(state)?, &ob)?;
    let mut batch = WriteBatch::new();
    batch.put(&ob)?;
    commit(state, &batch, "obligations.update")?;
    Ok(json!({ "item": ob }))
}

fn obligations_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let ob = load::<PaymentObligation>(store_ref(state)?, &id)?;
    if !ob.payments.is_empty() {
        return Err(HandlerErr::invalid_state(
            "cannot delete an obligation with recorded payments",
        ));
    }
    let mut batch = WriteBatch::new();
    batch.delete::<PaymentObligation>(&id);
    commit(state, &batch, "obligations.delete")?;
    Ok(json!({ "deleted": id }))
}

fn obligations_record_payment(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let amount = get_optional_f64(params, "amount")?
        .ok_or_else(|| field_error("amount", "is required"))?;
    let paid_on = get_optional_str(params, "paidOn")?.unwrap_or_else(|| format_date(today()));
    let method = get_optional_str(params, "method")?;

    let mut ob = load::<PaymentObligation>(store_ref(state)?, &id)?;
    record_payment(&mut ob, amount, &paid_on, method)?;
    let mut batch = WriteBatch::new();
    batch.put(&ob)?;
    commit(state, &batch, "obligations.recordPayment")?;
    tracing::info!(obligation = %id, amount, status = ?ob.status, "payment recorded");
    Ok(json!({ "item": ob, "remaining": ob.remaining() }))
}

fn obligations_cancel(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let mut ob = load::<PaymentObligation>(store_ref(state)?, &id)?;
    cancel(&mut ob)?;
    let mut batch = WriteBatch::new();
    batch.put(&ob)?;
    commit(state, &batch, "obligations.cancel")?;
    Ok(json!({ "item": ob }))
}

fn obligations_refresh_overdue(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let as_of = get_optional_date(params, "asOf")?.unwrap_or_else(today);
    let grace = state.config.finance.overdue_grace_days;
    let mut all = list::<PaymentObligation>(store_ref(state)?)?;
    let before: Vec<ObligationStatus> = all.iter().map(|o| o.status).collect();
    let changed = refresh_overdue(&mut all, as_of, grace);

    let mut batch = WriteBatch::new();
    let mut ids = Vec::with_capacity(changed);
    for (o, prev) in all.iter().zip(before) {
        if o.status != prev {
            batch.put(o)?;
            ids.push(o.id.clone());
        }
    }
    if !batch.is_empty() {
        commit(state, &batch, "obligations.refreshOverdue")?;
    }
    tracing::info!(as_of = %as_of, changed, "overdue obligations refreshed");
    Ok(json!({ "asOf": format_date(as_of), "updated": changed, "ids": ids }))
}

fn obligations_generate_for_class(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let month = get_required_str(params, "month")?;
    let due_on = get_optional_str(params, "dueOn")?;
    let dry_run = get_flag(params, "dryRun")?;
    let store = store_ref(state)?;

    let class = load::<SchoolClass>(store, &class_id)?;
    let lessons = list::<Lesson>(store)?;
    let existing = list::<PaymentObligation>(store)?;
    let plan = plan_class_billing(
        &class,
        &lessons,
        &existing,
        &BillingRequest {
            month: &month,
            due_on: due_on.as_deref(),
            currency: &state.config.finance.currency,
            default_due_day: state.config.finance.default_due_day,
        },
    )?;

    if !dry_run && !plan.obligations.is_empty() {
        let mut batch = WriteBatch::new();
        for ob in &plan.obligations {
            batch.put(ob)?;
        }
        commit(state, &batch, "obligations.generateForClass")?;
    }
    tracing::info!(
        class = %class_id,
        month = %plan.month,
        created = plan.obligations.len(),
        skipped = plan.skipped_students.len(),
        dry_run,
        "class billed"
    );
    let mut result = to_json(&plan)?;
    result["created"] = json!(plan.obligations.len());
    result["dryRun"] = json!(dry_run);
    Ok(result)
}

fn finance_student_balance(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let as_of = get_optional_date(params, "asOf")?.unwrap_or_else(today);
    let store = store_ref(state)?;
    load::<Student>(store, &student_id)?;
    let obligations = list::<PaymentObligation>(store)?;
    let balance = student_balance(
        &student_id,
        &obligations,
        as_of,
        state.config.finance.overdue_grace_days,
    );
    let mut result = to_json(&balance)?;
    result["currency"] = json!(state.config.finance.currency);
    Ok(result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "obligations.list" => obligations_list(state, &req.params),
        "obligations.open" => obligations_open(state, &req.params),
        "obligations.create" => obligations_create(state, &req.params),
        "obligations.update" => obligations_update(state, &req.params),
        "obligations.delete" => obligations_delete(state, &req.params),
        "obligations.recordPayment" => obligations_record_payment(state, &req.params),
        "obligations.cancel" => obligations_cancel(state, &req.params),
        "obligations.refreshOverdue" => obligations_refresh_overdue(state, &req.params),
        "obligations.generateForClass" => obligations_generate_for_class(state, &req.params),
        "finance.studentBalance" => finance_student_balance(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
