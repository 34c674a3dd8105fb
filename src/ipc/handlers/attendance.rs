use std::collections::HashMap;

use crate::insights::AttendanceStats;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    commit, decode_fields, field_error, filters, get_optional_date, get_optional_str,
    get_required_str, load, respond, store_ref, to_json, validate,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{new_id, now_ts, parse_date, AttendanceRecord, AttendanceStatus, Lesson, SchoolClass};
use crate::store::{list, Store, WriteBatch};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarkEntry {
    student_id: String,
    status: AttendanceStatus,
    #[serde(default)]
    note: Option<String>,
}

fn parse_status(raw: &Value, field: &str) -> Result<AttendanceStatus, HandlerErr> {
    serde_json::from_value(raw.clone())
        .map_err(|_| field_error(field, "must be one of present, absent, late, excused"))
}

/// Builds or updates the record for (lesson, student), keeping the id of an
/// existing mark.
fn upsert(
    existing: &HashMap<String, AttendanceRecord>,
    lesson: &Lesson,
    entry: MarkEntry,
) -> AttendanceRecord {
    let ts = now_ts();
    match existing.get(&entry.student_id) {
        Some(prev) => AttendanceRecord {
            status: entry.status,
            note: entry.note,
            date: lesson.date.clone(),
            updated_at: ts,
            ..prev.clone()
        },
        None => AttendanceRecord {
            id: new_id(),
            lesson_id: lesson.id.clone(),
            class_id: lesson.class_id.clone(),
            student_id: entry.student_id,
            date: lesson.date.clone(),
            status: entry.status,
            note: entry.note,
            created_at: ts.clone(),
            updated_at: ts,
        },
    }
}

fn marks_for_lesson(store: &dyn Store, lesson_id: &str) -> Result<HashMap<String, AttendanceRecord>, HandlerErr> {
    Ok(list::<AttendanceRecord>(store)?
        .into_iter()
        .filter(|r| r.lesson_id == lesson_id)
        .map(|r| (r.student_id.clone(), r))
        .collect())
}

fn attendance_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let f = filters(params);
    let lesson_id = get_optional_str(f, "lessonId")?;
    let student_id = get_optional_str(f, "studentId")?;
    let class_id = get_optional_str(f, "classId")?;
    let from = get_optional_date(f, "from")?;
    let to = get_optional_date(f, "to")?;

    let mut rows: Vec<AttendanceRecord> = list::<AttendanceRecord>(store_ref(state)?)?
        .into_iter()
        .filter(|r| lesson_id.as_deref().map_or(true, |l| r.lesson_id == l))
        .filter(|r| student_id.as_deref().map_or(true, |s| r.student_id == s))
        .filter(|r| class_id.as_deref().map_or(true, |c| r.class_id == c))
        .filter(|r| {
            let d = parse_date(&r.date);
            from.map_or(true, |f| d.is_some_and(|d| d >= f)) && to.map_or(true, |t| d.is_some_and(|d| d <= t))
        })
        .collect();
    rows.sort_by(|a, b| (&a.date, &a.student_id).cmp(&(&b.date, &b.student_id)));
    Ok(json!({ "total": rows.len(), "items": rows }))
}

fn attendance_open(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let item = load::<AttendanceRecord>(store_ref(state)?, &id)?;
    Ok(json!({ "item": item }))
}

fn attendance_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    load::<AttendanceRecord>(store_ref(state)?, &id)?;
    let mut batch = WriteBatch::new();
    batch.delete::<AttendanceRecord>(&id);
    commit(state, &batch, "attendance.delete")?;
    Ok(json!({ "deleted": id }))
}

fn attendance_mark(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let lesson_id = get_required_str(params, "lessonId")?;
    let student_id = get_required_str(params, "studentId")?;
    let status = parse_status(params.get("status").unwrap_or(&Value::Null), "status")?;
    let note = get_optional_str(params, "note")?;
    let store = store_ref(state)?;

    let lesson = load::<Lesson>(store, &lesson_id)?;
    let class = load::<SchoolClass>(store, &lesson.class_id)?;
    if !class.has_student(&student_id) {
        return Err(field_error("studentId", "is not enrolled in the lesson's class"));
    }
    let existing = marks_for_lesson(store, &lesson_id)?;
    let record = upsert(&existing, &lesson, MarkEntry { student_id, status, note });
    validate(&record, &state.validation_context())?;

    let mut batch = WriteBatch::new();
    batch.put(&record)?;
    commit(state, &batch, "attendance.mark")?;
    Ok(json!({ "item": record }))
}

fn attendance_mark_lesson(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let lesson_id = get_required_str(params, "lessonId")?;
    let entries: Vec<MarkEntry> = match params.get("entries") {
        None | Some(Value::Null) => Vec::new(),
        Some(raw) => decode_fields(raw.clone(), "entries", &[])?,
    };
    let default_status = match params.get("defaultStatus") {
        None | Some(Value::Null) => None,
        Some(raw) => Some(parse_status(raw, "defaultStatus")?),
    };
    let store = store_ref(state)?;
    let lesson = load::<Lesson>(store, &lesson_id)?;
    let class = load::<SchoolClass>(store, &lesson.class_id)?;

    let mut v = crate::validation::Validator::new();
    let mut seen = std::collections::HashSet::new();
    for (i, e) in entries.iter().enumerate() {
        if !class.has_student(&e.student_id) {
            v.push(format!("entries[{}].studentId", i), "is not enrolled in the lesson's class");
        } else if !seen.insert(e.student_id.as_str()) {
            v.push(format!("entries[{}].studentId", i), "is listed more than once");
        }
    }
    v.finish()?;

    let existing = marks_for_lesson(store, &lesson_id)?;
    let listed: Vec<String> = entries.iter().map(|e| e.student_id.clone()).collect();
    let mut all = entries;
    if let Some(status) = default_status {
        all.extend(
            class
                .student_ids
                .iter()
                .filter(|s| !listed.contains(s))
                .map(|s| MarkEntry { student_id: s.clone(), status, note: None }),
        );
    }

    let ctx = state.validation_context();
    let mut batch = WriteBatch::new();
    let mut records = Vec::with_capacity(all.len());
    for entry in all {
        let record = upsert(&existing, &lesson, entry);
        validate(&record, &ctx)?;
        batch.put(&record)?;
        records.push(record);
    }
    if !batch.is_empty() {
        commit(state, &batch, "attendance.markLesson")?;
    }
    Ok(json!({ "lessonId": lesson_id, "marked": records.len(), "items": records }))
}

fn attendance_summary(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_optional_str(params, "studentId")?;
    let class_id = get_optional_str(params, "classId")?;
    let rows = list::<AttendanceRecord>(store_ref(state)?)?;
    let stats = AttendanceStats::from_records(rows.iter().filter(|r| {
        student_id.as_deref().map_or(true, |s| r.student_id == s)
            && class_id.as_deref().map_or(true, |c| r.class_id == c)
    }));
    let mut result = to_json(&stats)?;
    result["studentId"] = json!(student_id);
    result["classId"] = json!(class_id);
    Ok(result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "attendance.list" => attendance_list(state, &req.params),
        "attendance.open" => attendance_open(state, &req.params),
        "attendance.delete" => attendance_delete(state, &req.params),
        "attendance.mark" => attendance_mark(state, &req.params),
        "attendance.markLesson" => attendance_mark_lesson(state, &req.params),
        "attendance.summary" => attendance_summary(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
