use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    commit, filters, get_object, get_optional_str, get_required_str, load, new_record, patched,
    respond, store_ref, validate,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{
    AttendanceRecord, Grade, Homework, PaymentObligation, SchoolClass, Student, StudentStatus,
};
use crate::store::{list, WriteBatch};
use serde_json::{json, Value};

fn parse_status(raw: &str) -> Result<StudentStatus, HandlerErr> {
    serde_json::from_value(json!(raw))
        .map_err(|_| HandlerErr::bad_params(format!("unknown student status: {}", raw)))
}

fn students_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = store_ref(state)?;
    let f = filters(params);
    let status = get_optional_str(f, "status")?.map(|s| parse_status(&s)).transpose()?;
    let search = get_optional_str(f, "search")?.unwrap_or_default();
    let class = match get_optional_str(f, "classId")? {
        Some(id) => Some(load::<SchoolClass>(store, &id)?),
        None => None,
    };

    let mut rows: Vec<Student> = list::<Student>(store)?
        .into_iter()
        .filter(|s| status.map_or(true, |st| s.status == st))
        .filter(|s| class.as_ref().map_or(true, |c| c.has_student(&s.id)))
        .filter(|s| s.matches_search(&search))
        .collect();
    rows.sort_by(|a, b| {
        (a.last_name.to_lowercase(), a.first_name.to_lowercase())
            .cmp(&(b.last_name.to_lowercase(), b.first_name.to_lowercase()))
    });
    Ok(json!({ "total": rows.len(), "items": rows }))
}

fn students_open(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = store_ref(state)?;
    let id = get_required_str(params, "id")?;
    let student = load::<Student>(store, &id)?;
    let classes: Vec<Value> = list::<SchoolClass>(store)?
        .into_iter()
        .filter(|c| c.has_student(&id))
        .map(|c| json!({ "id": c.id, "name": c.name }))
        .collect();
    Ok(json!({ "item": student, "classes": classes }))
}

fn students_create(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let input = get_object(params, "input")?;
    let student: Student = new_record(input, |_| {})?;
    validate(&student, &state.validation_context())?;
    let mut batch = WriteBatch::new();
    batch.put(&student)?;
    commit(state, &batch, "students.create")?;
    Ok(json!({ "item": student }))
}

fn students_update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let patch = get_object(params, "patch")?;
    let existing = load::<Student>(store_ref(state)?, &id)?;
    let student = patched(&existing, patch)?;
    validate(&student, &state.validation_context())?;
    let mut batch = WriteBatch::new();
    batch.put(&student)?;
    commit(state, &batch, "students.update")?;
    Ok(json!({ "item": student }))
}

/// Refused while the student has payment obligations; otherwise removes them
/// from rosters and drops their attendance, grades and submissions.
fn students_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let store = store_ref(state)?;
    load::<Student>(store, &id)?;

    let owed = list::<PaymentObligation>(store)?
        .iter()
        .filter(|o| o.student_id == id)
        .count();
    if owed > 0 {
        return Err(HandlerErr::in_use(format!(
            "student has {} payment obligation(s)",
            owed
        ))
        .with_details(json!({ "obligations": owed })));
    }

    let mut batch = WriteBatch::new();
    let mut rosters = 0;
    for mut class in list::<SchoolClass>(store)? {
        if class.has_student(&id) {
            class.student_ids.retain(|s| *s != id);
            class.updated_at = crate::model::now_ts();
            batch.put(&class)?;
            rosters += 1;
        }
    }
    let mut attendance = 0;
    for r in list::<AttendanceRecord>(store)?.into_iter().filter(|r| r.student_id == id) {
        batch.delete::<AttendanceRecord>(&r.id);
        attendance += 1;
    }
    let mut grades = 0;
    for g in list::<Grade>(store)?.into_iter().filter(|g| g.student_id == id) {
        batch.delete::<Grade>(&g.id);
        grades += 1;
    }
    for mut hw in list::<Homework>(store)? {
        if hw.submission_for(&id).is_some() {
            hw.submissions.retain(|s| s.student_id != id);
            batch.put(&hw)?;
        }
    }
    batch.delete::<Student>(&id);
    commit(state, &batch, "students.delete")?;
    tracing::info!(student = %id, rosters, attendance, grades, "student deleted");
    Ok(json!({
        "deleted": id,
        "removedFromClasses": rosters,
        "attendanceRemoved": attendance,
        "gradesRemoved": grades,
    }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> Value {
    respond(req, students_list(state, &req.params))
}

fn handle_students_open(state: &mut AppState, req: &Request) -> Value {
    respond(req, students_open(state, &req.params))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> Value {
    respond(req, students_create(state, &req.params))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> Value {
    respond(req, students_update(state, &req.params))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> Value {
    respond(req, students_delete(state, &req.params))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.open" => Some(handle_students_open(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
