use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    commit, field_error, filters, get_object, get_optional_bool, get_optional_f64,
    get_required_str, load, new_record, patched, respond, store_ref, validate,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Classroom, Lesson, LessonStatus, SchoolClass};
use crate::store::{list, WriteBatch};
use serde_json::{json, Value};

fn classrooms_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = store_ref(state)?;
    let f = filters(params);
    let active = get_optional_bool(f, "active")?;
    let min_capacity = get_optional_f64(f, "minCapacity")?;

    let mut rows: Vec<Classroom> = list::<Classroom>(store)?
        .into_iter()
        .filter(|r| active.map_or(true, |a| r.active == a))
        .filter(|r| min_capacity.map_or(true, |m| r.capacity as f64 >= m))
        .collect();
    rows.sort_by_key(|r| r.name.to_lowercase());
    Ok(json!({ "total": rows.len(), "items": rows }))
}

fn classrooms_open(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = store_ref(state)?;
    let id = get_required_str(params, "id")?;
    let room = load::<Classroom>(store, &id)?;
    let classes: Vec<Value> = list::<SchoolClass>(store)?
        .into_iter()
        .filter(|c| c.uses_room(&id))
        .map(|c| json!({ "id": c.id, "name": c.name }))
        .collect();
    Ok(json!({ "item": room, "classes": classes }))
}

fn classrooms_create(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let room: Classroom = new_record(get_object(params, "input")?, |_| {})?;
    validate(&room, &state.validation_context())?;
    let mut batch = WriteBatch::new();
    batch.put(&room)?;
    commit(state, &batch, "classrooms.create")?;
    Ok(json!({ "item": room }))
}

fn classrooms_update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let store = store_ref(state)?;
    let existing = load::<Classroom>(store, &id)?;
    let room = patched(&existing, get_object(params, "patch")?)?;
    validate(&room, &state.validation_context())?;
    if room.capacity < existing.capacity {
        let too_big = list::<SchoolClass>(store)?
            .into_iter()
            .find(|c| c.uses_room(&id) && c.student_ids.len() > room.capacity as usize);
        if let Some(c) = too_big {
            return Err(field_error(
                "capacity",
                format!("is smaller than the roster of class {}", c.name),
            ));
        }
    }
    let mut batch = WriteBatch::new();
    batch.put(&room)?;
    commit(state, &batch, "classrooms.update")?;
    Ok(json!({ "item": room }))
}

fn classrooms_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let store = store_ref(state)?;
    load::<Classroom>(store, &id)?;

    let classes = list::<SchoolClass>(store)?
        .into_iter()
        .filter(|c| c.uses_room(&id))
        .count();
    let lessons = list::<Lesson>(store)?
        .into_iter()
        .filter(|l| l.classroom_id.as_deref() == Some(id.as_str()) && l.status == LessonStatus::Scheduled)
        .count();
    if classes + lessons > 0 {
        return Err(HandlerErr::in_use("classroom is used by classes or scheduled lessons")
            .with_details(json!({ "classes": classes, "lessons": lessons })));
    }

    let mut batch = WriteBatch::new();
    batch.delete::<Classroom>(&id);
    commit(state, &batch, "classrooms.delete")?;
    Ok(json!({ "deleted": id }))
}

fn handle_classrooms_list(state: &mut AppState, req: &Request) -> Value {
    respond(req, classrooms_list(state, &req.params))
}

fn handle_classrooms_open(state: &mut AppState, req: &Request) -> Value {
    respond(req, classrooms_open(state, &req.params))
}

fn handle_classrooms_create(state: &mut AppState, req: &Request) -> Value {
    respond(req, classrooms_create(state, &req.params))
}

fn handle_classrooms_update(state: &mut AppState, req: &Request) -> Value {
    respond(req, classrooms_update(state, &req.params))
}

fn handle_classrooms_delete(state: &mut AppState, req: &Request) -> Value {
    respond(req, classrooms_delete(state, &req.params))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "classrooms.list" => Some(handle_classrooms_list(state, req)),
        "classrooms.open" => Some(handle_classrooms_open(state, req)),
        "classrooms.create" => Some(handle_classrooms_create(state, req)),
        "classrooms.update" => Some(handle_classrooms_update(state, req)),
        "classrooms.delete" => Some(handle_classrooms_delete(state, req)),
        _ => None,
    }
}
