use std::collections::HashMap;

use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    commit, exists, filters, get_flag, get_object, get_optional_str, get_required_str, load,
    new_record, patched, respond, store_ref, to_json, validate,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{
    now_ts, AcademicYear, AttendanceRecord, ClassStatus, Classroom, Grade, Homework, Lesson,
    Record, SchoolClass, Student, Teacher,
};
use crate::schedule::{find_slot_conflicts, ScheduleCandidate};
use crate::store::{list, Store, WriteBatch};
use crate::validation::{ValidationContext, Validator};
use serde_json::{json, Value};

/// Field validation, references, classroom capacity and, unless `force`,
/// schedule conflicts with other active classes.
fn check_class(
    store: &dyn Store,
    class: &SchoolClass,
    ctx: &ValidationContext,
    force: bool,
) -> Result<(), HandlerErr> {
    validate(class, ctx)?;

    let mut v = Validator::new();
    if !exists::<Teacher>(store, &class.teacher_id)? {
        v.push("teacherId", "references an unknown teacher");
    }
    if let Some(year_id) = class.academic_year_id.as_deref().filter(|s| !s.is_empty()) {
        if !exists::<AcademicYear>(store, year_id)? {
            v.push("academicYearId", "references an unknown academic year");
        }
    }
    // The roster has to fit every room the class meets in.
    let mut rooms = Vec::new();
    if let Some(room_id) = class.classroom_id.as_deref().filter(|s| !s.is_empty()) {
        match crate::store::find::<Classroom>(store, room_id)? {
            None => v.push("classroomId", "references an unknown classroom"),
            Some(room) => rooms.push(room),
        }
    }
    for (i, slot) in class.schedule.iter().enumerate() {
        if let Some(room_id) = slot.classroom_id.as_deref().filter(|s| !s.is_empty()) {
            match crate::store::find::<Classroom>(store, room_id)? {
                None => v.push(
                    format!("schedule[{}].classroomId", i),
                    "references an unknown classroom",
                ),
                Some(room) => rooms.push(room),
            }
        }
    }
    if let Some(room) = rooms
        .iter()
        .filter(|r| class.student_ids.len() > r.capacity as usize)
        .min_by_key(|r| r.capacity)
    {
        v.push(
            "studentIds",
            format!(
                "must contain at most {} students (capacity of {})",
                room.capacity, room.name
            ),
        );
    }
    for sid in &class.student_ids {
        if !exists::<Student>(store, sid)? {
            v.push("studentIds", format!("references unknown student {}", sid));
        }
    }
    v.finish()?;

    if force || !class.is_active() {
        return Ok(());
    }
    let others = list::<SchoolClass>(store)?;
    let conflicts = find_slot_conflicts(&ScheduleCandidate::from_class(class), &others);
    if !conflicts.is_empty() {
        return Err(HandlerErr::conflict(
            format!("schedule has {} conflict(s)", conflicts.len()),
            to_json(&conflicts)?,
        ));
    }
    Ok(())
}

fn classes_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = store_ref(state)?;
    let f = filters(params);
    let teacher_id = get_optional_str(f, "teacherId")?;
    let classroom_id = get_optional_str(f, "classroomId")?;
    let year_id = get_optional_str(f, "academicYearId")?;
    let student_id = get_optional_str(f, "studentId")?;
    let search = get_optional_str(f, "search")?.unwrap_or_default();
    let status: Option<ClassStatus> = get_optional_str(f, "status")?
        .map(|s| {
            serde_json::from_value(json!(s))
                .map_err(|_| HandlerErr::bad_params(format!("unknown class status: {}", s)))
        })
        .transpose()?;

    let mut rows: Vec<SchoolClass> = list::<SchoolClass>(store)?
        .into_iter()
        .filter(|c| teacher_id.as_deref().map_or(true, |t| c.teacher_id == t))
        .filter(|c| {
            classroom_id.as_deref().map_or(true, |r| {
                c.classroom_id.as_deref() == Some(r)
                    || c.schedule.iter().any(|s| s.classroom_id.as_deref() == Some(r))
            })
        })
        .filter(|c| year_id.as_deref().map_or(true, |y| c.academic_year_id.as_deref() == Some(y)))
        .filter(|c| student_id.as_deref().map_or(true, |s| c.has_student(s)))
        .filter(|c| status.map_or(true, |st| c.status == st))
        .filter(|c| c.matches_search(&search))
        .collect();
    rows.sort_by_key(|c| c.name.to_lowercase());
    Ok(json!({ "total": rows.len(), "items": rows }))
}

fn classes_open(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = store_ref(state)?;
    let id = get_required_str(params, "id")?;
    let class = load::<SchoolClass>(store, &id)?;
    let teacher = crate::store::find::<Teacher>(store, &class.teacher_id)?;
    let students: HashMap<String, Student> = list::<Student>(store)?
        .into_iter()
        .map(|s| (s.id.clone(), s))
        .collect();
    let roster: Vec<Value> = class
        .student_ids
        .iter()
        .map(|sid| {
            json!({
                "id": sid,
                "name": students.get(sid).map(Record::label).unwrap_or_else(|| sid.clone()),
            })
        })
        .collect();
    let lesson_count = list::<Lesson>(store)?
        .iter()
        .filter(|l| l.class_id == id)
        .count();
    Ok(json!({
        "item": class,
        "teacherName": teacher.map(|t| t.label()),
        "roster": roster,
        "lessonCount": lesson_count,
    }))
}

fn classes_create(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let force = get_flag(params, "force")?;
    let class: SchoolClass = new_record(get_object(params, "input")?, |_| {})?;
    check_class(store_ref(state)?, &class, &state.validation_context(), force)?;
    let mut batch = WriteBatch::new();
    batch.put(&class)?;
    commit(state, &batch, "classes.create")?;
    Ok(json!({ "item": class }))
}

fn classes_update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let force = get_flag(params, "force")?;
    let existing = load::<SchoolClass>(store_ref(state)?, &id)?;
    let class = patched(&existing, get_object(params, "patch")?)?;
    check_class(store_ref(state)?, &class, &state.validation_context(), force)?;
    let mut batch = WriteBatch::new();
    batch.put(&class)?;
    commit(state, &batch, "classes.update")?;
    Ok(json!({ "item": class }))
}

/// Removes the class with its lessons, attendance, homework and grades.
fn classes_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let store = store_ref(state)?;
    load::<SchoolClass>(store, &id)?;

    let mut batch = WriteBatch::new();
    let lessons: Vec<Lesson> = list::<Lesson>(store)?
        .into_iter()
        .filter(|l| l.class_id == id)
        .collect();
    for l in &lessons {
        batch.delete::<Lesson>(&l.id);
    }
    let mut attendance = 0;
    for r in list::<AttendanceRecord>(store)? {
        if r.class_id == id || lessons.iter().any(|l| l.id == r.lesson_id) {
            batch.delete::<AttendanceRecord>(&r.id);
            attendance += 1;
        }
    }
    let mut homework = 0;
    for h in list::<Homework>(store)?.into_iter().filter(|h| h.class_id == id) {
        batch.delete::<Homework>(&h.id);
        homework += 1;
    }
    let mut grades = 0;
    for g in list::<Grade>(store)?.into_iter().filter(|g| g.class_id == id) {
        batch.delete::<Grade>(&g.id);
        grades += 1;
    }
    batch.delete::<SchoolClass>(&id);
    commit(state, &batch, "classes.delete")?;
    tracing::info!(class = %id, lessons = lessons.len(), attendance, homework, grades, "class deleted");
    Ok(json!({
        "deleted": id,
        "lessonsRemoved": lessons.len(),
        "attendanceRemoved": attendance,
        "homeworkRemoved": homework,
        "gradesRemoved": grades,
    }))
}

fn classes_enroll(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let student_id = get_required_str(params, "studentId")?;
    let force = get_flag(params, "force")?;
    let store = store_ref(state)?;
    let mut class = load::<SchoolClass>(store, &class_id)?;
    load::<Student>(store, &student_id)?;
    if class.has_student(&student_id) {
        return Ok(json!({ "item": class, "alreadyEnrolled": true }));
    }
    class.student_ids.push(student_id);
    class.updated_at = now_ts();
    check_class(store, &class, &state.validation_context(), force)?;
    let mut batch = WriteBatch::new();
    batch.put(&class)?;
    commit(state, &batch, "classes.enroll")?;
    Ok(json!({ "item": class, "alreadyEnrolled": false }))
}

fn classes_unenroll(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let student_id = get_required_str(params, "studentId")?;
    let mut class = load::<SchoolClass>(store_ref(state)?, &class_id)?;
    if !class.has_student(&student_id) {
        return Err(HandlerErr::invalid_state("student is not enrolled in this class"));
    }
    class.student_ids.retain(|s| *s != student_id);
    class.updated_at = now_ts();
    let mut batch = WriteBatch::new();
    batch.put(&class)?;
    commit(state, &batch, "classes.unenroll")?;
    Ok(json!({ "item": class }))
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> Value {
    respond(req, classes_list(state, &req.params))
}

fn handle_classes_open(state: &mut AppState, req: &Request) -> Value {
    respond(req, classes_open(state, &req.params))
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> Value {
    respond(req, classes_create(state, &req.params))
}

fn handle_classes_update(state: &mut AppState, req: &Request) -> Value {
    respond(req, classes_update(state, &req.params))
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> Value {
    respond(req, classes_delete(state, &req.params))
}

fn handle_classes_enroll(state: &mut AppState, req: &Request) -> Value {
    respond(req, classes_enroll(state, &req.params))
}

fn handle_classes_unenroll(state: &mut AppState, req: &Request) -> Value {
    respond(req, classes_unenroll(state, &req.params))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.open" => Some(handle_classes_open(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.update" => Some(handle_classes_update(state, req)),
        "classes.delete" => Some(handle_classes_delete(state, req)),
        "classes.enroll" => Some(handle_classes_enroll(state, req)),
        "classes.unenroll" => Some(handle_classes_unenroll(state, req)),
        _ => None,
    }
}
