use crate::generate::{plan_lessons, resolve_window};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    commit, exists, field_error, filters, get_flag, get_object, get_optional_date,
    get_optional_str, get_required_str, load, new_record, patched, respond, store_ref, to_json,
    validate,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{
    parse_date, AcademicYear, AttendanceRecord, Classroom, Lesson, LessonStatus, SchoolClass,
    Teacher, TeachingBreak,
};
use crate::schedule::find_lesson_conflicts;
use crate::store::{list, Store, WriteBatch};
use serde_json::{json, Value};

fn check_lesson(store: &dyn Store, lesson: &Lesson, force: bool) -> Result<(), HandlerErr> {
    if !exists::<SchoolClass>(store, &lesson.class_id)? {
        return Err(field_error("classId", "references an unknown class"));
    }
    if !exists::<Teacher>(store, &lesson.teacher_id)? {
        return Err(field_error("teacherId", "references an unknown teacher"));
    }
    if let Some(room) = lesson.classroom_id.as_deref().filter(|s| !s.is_empty()) {
        if !exists::<Classroom>(store, room)? {
            return Err(field_error("classroomId", "references an unknown classroom"));
        }
    }
    if force {
        return Ok(());
    }
    let conflicts = find_lesson_conflicts(lesson, &list::<Lesson>(store)?);
    if !conflicts.is_empty() {
        return Err(HandlerErr::conflict(
            format!("lesson overlaps {} other lesson(s)", conflicts.len()),
            to_json(&conflicts)?,
        ));
    }
    Ok(())
}

fn lessons_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let f = filters(params);
    let class_id = get_optional_str(f, "classId")?;
    let teacher_id = get_optional_str(f, "teacherId")?;
    let status: Option<LessonStatus> = get_optional_str(f, "status")?
        .map(|s| {
            serde_json::from_value(json!(s))
                .map_err(|_| HandlerErr::bad_params(format!("unknown lesson status: {}", s)))
        })
        .transpose()?;
    let from = get_optional_date(f, "from")?;
    let to = get_optional_date(f, "to")?;

    let mut rows: Vec<Lesson> = list::<Lesson>(store_ref(state)?)?
        .into_iter()
        .filter(|l| class_id.as_deref().map_or(true, |c| l.class_id == c))
        .filter(|l| teacher_id.as_deref().map_or(true, |t| l.teacher_id == t))
        .filter(|l| status.map_or(true, |s| l.status == s))
        .filter(|l| {
            let d = parse_date(&l.date);
            from.map_or(true, |f| d.is_some_and(|d| d >= f)) && to.map_or(true, |t| d.is_some_and(|d| d <= t))
        })
        .collect();
    rows.sort_by(|a, b| (&a.date, &a.start_time).cmp(&(&b.date, &b.start_time)));
    Ok(json!({ "total": rows.len(), "items": rows }))
}

fn lessons_open(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = store_ref(state)?;
    let id = get_required_str(params, "id")?;
    let lesson = load::<Lesson>(store, &id)?;
    let attendance: Vec<AttendanceRecord> = list::<AttendanceRecord>(store)?
        .into_iter()
        .filter(|r| r.lesson_id == id)
        .collect();
    Ok(json!({ "item": lesson, "attendance": attendance }))
}

fn lessons_create(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let force = get_flag(params, "force")?;
    let input = get_object(params, "input")?;
    let store = store_ref(state)?;
    let class = match input.get("classId").and_then(|v| v.as_str()) {
        Some(id) => crate::store::find::<SchoolClass>(store, id)?,
        None => None,
    };
    let lesson: Lesson = new_record(input, |obj| {
        if let Some(c) = &class {
            obj.entry("teacherId").or_insert_with(|| json!(c.teacher_id));
            if let Some(room) = &c.classroom_id {
                obj.entry("classroomId").or_insert_with(|| json!(room));
            }
        }
    })?;
    validate(&lesson, &state.validation_context())?;
    check_lesson(store, &lesson, force)?;
    let mut batch = WriteBatch::new();
    batch.put(&lesson)?;
    commit(state, &batch, "lessons.create")?;
    Ok(json!({ "item": lesson }))
}

fn lessons_update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let force = get_flag(params, "force")?;
    let store = store_ref(state)?;
    let existing = load::<Lesson>(store, &id)?;
    let lesson = patched(&existing, get_object(params, "patch")?)?;
    validate(&lesson, &state.validation_context())?;
    check_lesson(store, &lesson, force)?;
    let mut batch = WriteBatch::new();
    batch.put(&lesson)?;
    commit(state, &batch, "lessons.update")?;
    Ok(json!({ "item": lesson }))
}

fn lessons_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let store = store_ref(state)?;
    load::<Lesson>(store, &id)?;
    let mut batch = WriteBatch::new();
    let mut attendance = 0;
    for r in list::<AttendanceRecord>(store)?.into_iter().filter(|r| r.lesson_id == id) {
        batch.delete::<AttendanceRecord>(&r.id);
        attendance += 1;
    }
    batch.delete::<Lesson>(&id);
    commit(state, &batch, "lessons.delete")?;
    Ok(json!({ "deleted": id, "attendanceRemoved": attendance }))
}

fn lessons_generate(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let from = get_optional_date(params, "from")?;
    let to = get_optional_date(params, "to")?;
    let dry_run = get_flag(params, "dryRun")?;
    let store = store_ref(state)?;

    let class = load::<SchoolClass>(store, &class_id)?;
    if !class.is_active() {
        return Err(HandlerErr::invalid_state("class is archived"));
    }
    if class.schedule.is_empty() {
        return Err(HandlerErr::invalid_state("class has no weekly schedule"));
    }
    let year = match class.academic_year_id.as_deref() {
        Some(y) => crate::store::find::<AcademicYear>(store, y)?,
        None => None,
    };
    let window = resolve_window(&class, year.as_ref(), from, to)?;
    let breaks: Vec<TeachingBreak> = match &year {
        Some(y) => list::<TeachingBreak>(store)?
            .into_iter()
            .filter(|b| b.academic_year_id == y.id)
            .collect(),
        None => Vec::new(),
    };
    let existing = list::<Lesson>(store)?;
    let plan = plan_lessons(&class, window, &breaks, &existing);

    if !dry_run && !plan.lessons.is_empty() {
        let mut batch = WriteBatch::new();
        for lesson in &plan.lessons {
            batch.put(lesson)?;
        }
        commit(state, &batch, "lessons.generate")?;
    }
    tracing::info!(
        class = %class_id,
        from = %plan.from,
        to = %plan.to,
        created = plan.created,
        skipped_breaks = plan.skipped_breaks,
        skipped_existing = plan.skipped_existing,
        dry_run,
        "lessons generated"
    );
    let mut result = to_json(&plan)?;
    result["dryRun"] = json!(dry_run);
    Ok(result)
}

fn handle_lessons_list(state: &mut AppState, req: &Request) -> Value {
    respond(req, lessons_list(state, &req.params))
}

fn handle_lessons_open(state: &mut AppState, req: &Request) -> Value {
    respond(req, lessons_open(state, &req.params))
}

fn handle_lessons_create(state: &mut AppState, req: &Request) -> Value {
    respond(req, lessons_create(state, &req.params))
}

fn handle_lessons_update(state: &mut AppState, req: &Request) -> Value {
    respond(req, lessons_update(state, &req.params))
}

fn handle_lessons_delete(state: &mut AppState, req: &Request) -> Value {
    respond(req, lessons_delete(state, &req.params))
}

fn handle_lessons_generate(state: &mut AppState, req: &Request) -> Value {
    respond(req, lessons_generate(state, &req.params))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "lessons.list" => Some(handle_lessons_list(state, req)),
        "lessons.open" => Some(handle_lessons_open(state, req)),
        "lessons.create" => Some(handle_lessons_create(state, req)),
        "lessons.update" => Some(handle_lessons_update(state, req)),
        "lessons.delete" => Some(handle_lessons_delete(state, req)),
        "lessons.generate" => Some(handle_lessons_generate(state, req)),
        _ => None,
    }
}
