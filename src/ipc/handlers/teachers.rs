use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    commit, filters, get_object, get_optional_str, get_required_str, load, new_record, patched,
    respond, store_ref, validate,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Lesson, SalaryCalculation, SchoolClass, Teacher, TeacherStatus};
use crate::store::{list, WriteBatch};
use serde_json::{json, Value};

fn teachers_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = store_ref(state)?;
    let f = filters(params);
    let status: Option<TeacherStatus> = get_optional_str(f, "status")?
        .map(|s| {
            serde_json::from_value(json!(s))
                .map_err(|_| HandlerErr::bad_params(format!("unknown teacher status: {}", s)))
        })
        .transpose()?;
    let subject = get_optional_str(f, "subject")?;
    let search = get_optional_str(f, "search")?.unwrap_or_default();

    let mut rows: Vec<Teacher> = list::<Teacher>(store)?
        .into_iter()
        .filter(|t| status.map_or(true, |st| t.status == st))
        .filter(|t| subject.as_deref().map_or(true, |s| t.teaches(s)))
        .filter(|t| t.matches_search(&search))
        .collect();
    rows.sort_by(|a, b| {
        (a.last_name.to_lowercase(), a.first_name.to_lowercase())
            .cmp(&(b.last_name.to_lowercase(), b.first_name.to_lowercase()))
    });
    Ok(json!({ "total": rows.len(), "items": rows }))
}

fn teachers_open(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = store_ref(state)?;
    let id = get_required_str(params, "id")?;
    let teacher = load::<Teacher>(store, &id)?;
    let classes: Vec<Value> = list::<SchoolClass>(store)?
        .into_iter()
        .filter(|c| c.teacher_id == id)
        .map(|c| json!({ "id": c.id, "name": c.name, "status": c.status }))
        .collect();
    Ok(json!({ "item": teacher, "classes": classes }))
}

fn teachers_create(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let teacher: Teacher = new_record(get_object(params, "input")?, |_| {})?;
    validate(&teacher, &state.validation_context())?;
    let mut batch = WriteBatch::new();
    batch.put(&teacher)?;
    commit(state, &batch, "teachers.create")?;
    Ok(json!({ "item": teacher }))
}

fn teachers_update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let existing = load::<Teacher>(store_ref(state)?, &id)?;
    let teacher = patched(&existing, get_object(params, "patch")?)?;
    validate(&teacher, &state.validation_context())?;
    let mut batch = WriteBatch::new();
    batch.put(&teacher)?;
    commit(state, &batch, "teachers.update")?;
    Ok(json!({ "item": teacher }))
}

fn teachers_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let store = store_ref(state)?;
    load::<Teacher>(store, &id)?;

    let classes = list::<SchoolClass>(store)?
        .into_iter()
        .filter(|c| c.teacher_id == id)
        .count();
    let lessons = list::<Lesson>(store)?
        .into_iter()
        .filter(|l| l.teacher_id == id)
        .count();
    let salaries = list::<SalaryCalculation>(store)?
        .into_iter()
        .filter(|s| s.teacher_id == id)
        .count();
    if classes + lessons + salaries > 0 {
        return Err(HandlerErr::in_use("teacher is referenced by classes, lessons or salaries")
            .with_details(json!({ "classes": classes, "lessons": lessons, "salaries": salaries })));
    }

    let mut batch = WriteBatch::new();
    batch.delete::<Teacher>(&id);
    commit(state, &batch, "teachers.delete")?;
    Ok(json!({ "deleted": id }))
}

fn handle_teachers_list(state: &mut AppState, req: &Request) -> Value {
    respond(req, teachers_list(state, &req.params))
}

fn handle_teachers_open(state: &mut AppState, req: &Request) -> Value {
    respond(req, teachers_open(state, &req.params))
}

fn handle_teachers_create(state: &mut AppState, req: &Request) -> Value {
    respond(req, teachers_create(state, &req.params))
}

fn handle_teachers_update(state: &mut AppState, req: &Request) -> Value {
    respond(req, teachers_update(state, &req.params))
}

fn handle_teachers_delete(state: &mut AppState, req: &Request) -> Value {
    respond(req, teachers_delete(state, &req.params))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "teachers.list" => Some(handle_teachers_list(state, req)),
        "teachers.open" => Some(handle_teachers_open(state, req)),
        "teachers.create" => Some(handle_teachers_create(state, req)),
        "teachers.update" => Some(handle_teachers_update(state, req)),
        "teachers.delete" => Some(handle_teachers_delete(state, req)),
        _ => None,
    }
}
