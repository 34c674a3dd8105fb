use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    commit, exists, field_error, filters, get_object, get_optional_date, get_optional_str,
    get_required_str, load, new_record, patched, respond, store_ref, validate,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{
    format_date, now_ts, parse_date, today, Grade, GradeKind, Homework, Lesson, SchoolClass,
    Student, Submission, SubmissionStatus,
};
use crate::store::{list, Store, WriteBatch};
use crate::validation::Validator;
use serde_json::{json, Value};

fn check_homework(store: &dyn Store, hw: &Homework) -> Result<(), HandlerErr> {
    let mut v = Validator::new();
    match crate::store::find::<SchoolClass>(store, &hw.class_id)? {
        None => v.push("classId", "references an unknown class"),
        Some(class) => {
            for (i, s) in hw.submissions.iter().enumerate() {
                if !class.has_student(&s.student_id) {
                    v.push(format!("submissions[{}].studentId", i), "is not enrolled in the class");
                }
            }
        }
    }
    if let Some(lesson_id) = hw.lesson_id.as_deref().filter(|s| !s.is_empty()) {
        match crate::store::find::<Lesson>(store, lesson_id)? {
            None => v.push("lessonId", "references an unknown lesson"),
            Some(l) if l.class_id != hw.class_id => v.push("lessonId", "belongs to another class"),
            Some(_) => {}
        }
    }
    Ok(v.finish()?)
}

fn homework_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let f = filters(params);
    let class_id = get_optional_str(f, "classId")?;
    let lesson_id = get_optional_str(f, "lessonId")?;
    let due_from = get_optional_date(f, "dueFrom")?;
    let due_to = get_optional_date(f, "dueTo")?;

    let mut rows: Vec<Homework> = list::<Homework>(store_ref(state)?)?
        .into_iter()
        .filter(|h| class_id.as_deref().map_or(true, |c| h.class_id == c))
        .filter(|h| lesson_id.as_deref().map_or(true, |l| h.lesson_id.as_deref() == Some(l)))
        .filter(|h| {
            let due = parse_date(&h.due_on);
            due_from.map_or(true, |f| due.is_some_and(|d| d >= f))
                && due_to.map_or(true, |t| due.is_some_and(|d| d <= t))
        })
        .collect();
    rows.sort_by(|a, b| (&a.due_on, &a.title).cmp(&(&b.due_on, &b.title)));
    Ok(json!({ "total": rows.len(), "items": rows }))
}

fn homework_open(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let item = load::<Homework>(store_ref(state)?, &id)?;
    Ok(json!({ "item": item }))
}

fn homework_create(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let hw: Homework = new_record(get_object(params, "input")?, |obj| {
        obj.entry("assignedOn")
            .or_insert_with(|| json!(format_date(today())));
    })?;
    validate(&hw, &state.validation_context())?;
    check_homework(store_ref(state)?, &hw)?;
    let mut batch = WriteBatch::new();
    batch.put(&hw)?;
    commit(state, &batch, "homework.create")?;
    Ok(json!({ "item": hw }))
}

fn homework_update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let existing = load::<Homework>(store_ref(state)?, &id)?;
    let hw = patched(&existing, get_object(params, "patch")?)?;
    validate(&hw, &state.validation_context())?;
    check_homework(store_ref(state)?, &hw)?;
    let mut batch = WriteBatch::new();
    batch.put(&hw)?;
    commit(state, &batch, "homework.update")?;
    Ok(json!({ "item": hw }))
}

/// Grades that pointed at the homework keep their value but lose the link.
fn homework_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let store = store_ref(state)?;
    load::<Homework>(store, &id)?;
    let mut batch = WriteBatch::new();
    let ts = now_ts();
    let mut detached = 0;
    for mut g in list::<Grade>(store)? {
        if g.homework_id.as_deref() == Some(id.as_str()) {
            g.homework_id = None;
            g.updated_at = ts.clone();
            batch.put(&g)?;
            detached += 1;
        }
    }
    batch.delete::<Homework>(&id);
    commit(state, &batch, "homework.delete")?;
    Ok(json!({ "deleted": id, "gradesDetached": detached }))
}

fn homework_submit(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let homework_id = get_required_str(params, "homeworkId")?;
    let student_id = get_required_str(params, "studentId")?;
    let status: SubmissionStatus = serde_json::from_value(
        params.get("status").cloned().unwrap_or_else(|| json!("submitted")),
    )
    .map_err(|_| field_error("status", "must be one of pending, submitted, late, missing"))?;
    let submitted_on = get_optional_date(params, "submittedOn")?
        .or_else(|| status.is_done().then(today))
        .map(format_date);

    let store = store_ref(state)?;
    let mut hw = load::<Homework>(store, &homework_id)?;
    let class = load::<SchoolClass>(store, &hw.class_id)?;
    if !class.has_student(&student_id) {
        return Err(field_error("studentId", "is not enrolled in the class"));
    }
    let submission = Submission { student_id, status, submitted_on };
    match hw.submissions.iter_mut().find(|s| s.student_id == submission.student_id) {
        Some(slot) => *slot = submission,
        None => hw.submissions.push(submission),
    }
    hw.updated_at = now_ts();
    validate(&hw, &state.validation_context())?;

    let mut batch = WriteBatch::new();
    batch.put(&hw)?;
    commit(state, &batch, "homework.submit")?;
    Ok(json!({ "item": hw }))
}

fn check_grade(store: &dyn Store, grade: &Grade) -> Result<(), HandlerErr> {
    let mut v = Validator::new();
    if !exists::<Student>(store, &grade.student_id)? {
        v.push("studentId", "references an unknown student");
    }
    if !exists::<SchoolClass>(store, &grade.class_id)? {
        v.push("classId", "references an unknown class");
    }
    if let Some(lesson_id) = grade.lesson_id.as_deref().filter(|s| !s.is_empty()) {
        if !exists::<Lesson>(store, lesson_id)? {
            v.push("lessonId", "references an unknown lesson");
        }
    }
    if let Some(hw_id) = grade.homework_id.as_deref().filter(|s| !s.is_empty()) {
        if !exists::<Homework>(store, hw_id)? {
            v.push("homeworkId", "references an unknown homework");
        }
    }
    Ok(v.finish()?)
}

fn grades_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let f = filters(params);
    let student_id = get_optional_str(f, "studentId")?;
    let class_id = get_optional_str(f, "classId")?;
    let kind: Option<GradeKind> = get_optional_str(f, "kind")?
        .map(|k| {
            serde_json::from_value(json!(k))
                .map_err(|_| HandlerErr::bad_params(format!("unknown grade kind: {}", k)))
        })
        .transpose()?;

    let mut rows: Vec<Grade> = list::<Grade>(store_ref(state)?)?
        .into_iter()
        .filter(|g| student_id.as_deref().map_or(true, |s| g.student_id == s))
        .filter(|g| class_id.as_deref().map_or(true, |c| g.class_id == c))
        .filter(|g| kind.map_or(true, |k| g.kind == k))
        .collect();
    rows.sort_by(|a, b| b.date.cmp(&a.date));
    Ok(json!({ "total": rows.len(), "items": rows }))
}

fn grades_open(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let item = load::<Grade>(store_ref(state)?, &id)?;
    Ok(json!({ "item": item }))
}

fn grades_create(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let grade: Grade = new_record(get_object(params, "input")?, |obj| {
        obj.entry("date").or_insert_with(|| json!(format_date(today())));
    })?;
    validate(&grade, &state.validation_context())?;
    check_grade(store_ref(state)?, &grade)?;
    let mut batch = WriteBatch::new();
    batch.put(&grade)?;
    commit(state, &batch, "grades.create")?;
    Ok(json!({ "item": grade }))
}

fn grades_update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let existing = load::<Grade>(store_ref(state)?, &id)?;
    let grade = patched(&existing, get_object(params, "patch")?)?;
    validate(&grade, &state.validation_context())?;
    check_grade(store_ref(state)?, &grade)?;
    let mut batch = WriteBatch::new();
    batch.put(&grade)?;
    commit(state, &batch, "grades.update")?;
    Ok(json!({ "item": grade }))
}

fn grades_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    load::<Grade>(store_ref(state)?, &id)?;
    let mut batch = WriteBatch::new();
    batch.delete::<Grade>(&id);
    commit(state, &batch, "grades.delete")?;
    Ok(json!({ "deleted": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "homework.list" => homework_list(state, &req.params),
        "homework.open" => homework_open(state, &req.params),
        "homework.create" => homework_create(state, &req.params),
        "homework.update" => homework_update(state, &req.params),
        "homework.delete" => homework_delete(state, &req.params),
        "homework.submit" => homework_submit(state, &req.params),
        "grades.list" => grades_list(state, &req.params),
        "grades.open" => grades_open(state, &req.params),
        "grades.create" => grades_create(state, &req.params),
        "grades.update" => grades_update(state, &req.params),
        "grades.delete" => grades_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
