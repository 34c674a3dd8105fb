use crate::insights::{lesson_status_metrics, student_progress, ProgressInputs};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    get_optional_date, get_optional_str, get_required_str, load, respond, store_ref, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{
    format_date, today, AttendanceRecord, Grade, Homework, Lesson, PaymentObligation, SchoolClass,
    Student,
};
use crate::store::list;
use serde_json::{json, Value};

fn student_progress_read(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let class_id = get_optional_str(params, "classId")?;
    let store = store_ref(state)?;
    load::<Student>(store, &student_id)?;
    if let Some(c) = &class_id {
        load::<SchoolClass>(store, c)?;
    }

    let key = (student_id.clone(), class_id.clone());
    let (progress, outcome) = state.progress_cache.get_or_load(key, || {
        let classes = list::<SchoolClass>(store)?;
        let attendance = list::<AttendanceRecord>(store)?;
        let grades = list::<Grade>(store)?;
        let homework = list::<Homework>(store)?;
        let obligations = list::<PaymentObligation>(store)?;
        let inputs = ProgressInputs {
            classes: &classes,
            attendance: &attendance,
            grades: &grades,
            homework: &homework,
            obligations: &obligations,
        };
        Ok::<_, HandlerErr>(student_progress(&student_id, class_id.as_deref(), &inputs))
    })?;

    let mut result = to_json(&progress)?;
    result["cache"] = json!(outcome.as_str());
    Ok(result)
}

fn lesson_metrics_read(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = get_optional_str(params, "classId")?;
    let from = get_optional_date(params, "from")?;
    let to = get_optional_date(params, "to")?;
    let store = store_ref(state)?;

    let key = (class_id.clone(), from.map(format_date), to.map(format_date));
    let (metrics, outcome) = state.metrics_cache.get_or_load(key, || {
        let lessons = list::<Lesson>(store)?;
        Ok::<_, HandlerErr>(lesson_status_metrics(&lessons, class_id.as_deref(), from, to, today()))
    })?;

    let mut result = to_json(&metrics)?;
    result["cache"] = json!(outcome.as_str());
    Ok(result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "insights.studentProgress" => student_progress_read(state, &req.params),
        "insights.lessonStatusMetrics" => lesson_metrics_read(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
