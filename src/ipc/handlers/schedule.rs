use std::collections::HashMap;

use chrono::Duration;

use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    decode_fields, get_flag, get_optional_date, get_optional_str, respond, store_ref, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{format_date, parse_date, Lesson, LessonStatus, SchoolClass, Weekday};
use crate::schedule::{find_slot_conflicts, layout_week, GridItem, GridSettings, ScheduleCandidate};
use crate::store::list;
use crate::validation::Validator;
use serde_json::{json, Value};

const DEFAULT_CHANNEL: &str = "default";

fn parse_candidate(params: &Value) -> Result<ScheduleCandidate, HandlerErr> {
    let candidate: ScheduleCandidate =
        decode_fields(params.clone(), "", &["teacherId", "schedule"])?;
    let mut v = Validator::new();
    v.required("teacherId", &candidate.teacher_id, 64);
    for (i, slot) in candidate.schedule.iter().enumerate() {
        let start = v.time(&format!("schedule[{}].startTime", i), &slot.start_time);
        let end = v.time(&format!("schedule[{}].endTime", i), &slot.end_time);
        v.time_order(
            &format!("schedule[{}].endTime", i),
            end,
            &format!("schedule[{}].startTime", i),
            start,
        );
    }
    v.finish()?;
    Ok(candidate)
}

fn conflict_report(candidate: &ScheduleCandidate, classes: &[SchoolClass]) -> Result<Value, HandlerErr> {
    let conflicts = find_slot_conflicts(candidate, classes);
    Ok(json!({
        "hasConflicts": !conflicts.is_empty(),
        "conflicts": to_json(&conflicts)?,
    }))
}

fn schedule_check_conflicts(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let candidate = parse_candidate(params)?;
    let classes = list::<SchoolClass>(store_ref(state)?)?;
    conflict_report(&candidate, &classes)
}

/// Queues a coalesced conflict check. Returns `Some` only for requests
/// rejected up front; accepted ones are answered later through the outbox,
/// either with the report or with `{"superseded": true}`.
pub fn check_conflicts_debounced(state: &mut AppState, req: &Request) -> Option<Value> {
    let prepared = get_optional_str(&req.params, "channel").and_then(|channel| {
        let candidate = parse_candidate(&req.params)?;
        let classes = list::<SchoolClass>(store_ref(state)?)?;
        Ok((channel.unwrap_or_else(|| DEFAULT_CHANNEL.to_string()), candidate, classes))
    });
    let (channel, candidate, classes) = match prepared {
        Ok(p) => p,
        Err(e) => return Some(e.response(&req.id)),
    };

    let run = {
        let outbox = state.outbox.clone();
        let id = req.id.clone();
        let channel = channel.clone();
        move || {
            let response = match conflict_report(&candidate, &classes) {
                Ok(mut report) => {
                    report["channel"] = json!(channel);
                    report["superseded"] = json!(false);
                    ok(&id, report)
                }
                Err(e) => e.response(&id),
            };
            if outbox.send(response).is_err() {
                tracing::debug!(request = %id, "outbox closed before conflict check finished");
            }
        }
    };
    let superseded = {
        let outbox = state.outbox.clone();
        let id = req.id.clone();
        let channel = channel.clone();
        move || {
            let _ = outbox.send(ok(&id, json!({ "superseded": true, "channel": channel })));
        }
    };
    state.conflict_checks.submit(channel, run, superseded);
    None
}

fn monday_of(date: chrono::NaiveDate) -> chrono::NaiveDate {
    date - Duration::days(Weekday::of(date).index() as i64)
}

fn template_items(
    classes: &[SchoolClass],
    class_id: Option<&str>,
    teacher_id: Option<&str>,
    classroom_id: Option<&str>,
) -> Vec<GridItem> {
    let mut items = Vec::new();
    for class in classes.iter().filter(|c| c.is_active()) {
        if class_id.is_some_and(|id| id != class.id) || teacher_id.is_some_and(|t| t != class.teacher_id) {
            continue;
        }
        for (i, slot) in class.schedule.iter().enumerate() {
            let room = class.slot_classroom(slot);
            if classroom_id.is_some_and(|r| Some(r) != room) {
                continue;
            }
            let Some((start, end)) = slot.minutes() else { continue };
            items.push(GridItem {
                id: format!("{}:{}", class.id, i),
                day: slot.day,
                start,
                end,
                data: json!({
                    "classId": class.id,
                    "className": class.name,
                    "subject": class.subject,
                    "teacherId": class.teacher_id,
                    "classroomId": room,
                    "slotIndex": i,
                }),
            });
        }
    }
    items
}

fn schedule_week(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let template = get_flag(params, "template")?;
    let include_cancelled = get_flag(params, "includeCancelled")?;
    let class_id = get_optional_str(params, "classId")?;
    let teacher_id = get_optional_str(params, "teacherId")?;
    let classroom_id = get_optional_str(params, "classroomId")?;
    let week_start = get_optional_date(params, "weekStart")?.map(monday_of);
    let settings = GridSettings::from_config(&state.config.schedule)
        .ok_or_else(|| HandlerErr::invalid_state("schedule grid settings are invalid"))?;
    let store = store_ref(state)?;
    let classes = list::<SchoolClass>(store)?;

    let dates = week_start.map(|monday| {
        let mut out: [String; 7] = Default::default();
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = format_date(monday + Duration::days(i as i64));
        }
        out
    });

    let items = if template {
        template_items(&classes, class_id.as_deref(), teacher_id.as_deref(), classroom_id.as_deref())
    } else {
        let Some(monday) = week_start else {
            return Err(crate::ipc::helpers::field_error("weekStart", "is required"));
        };
        let sunday = monday + Duration::days(6);
        let names: HashMap<&str, &str> = classes.iter().map(|c| (c.id.as_str(), c.name.as_str())).collect();
        list::<Lesson>(store)?
            .into_iter()
            .filter(|l| include_cancelled || l.status != LessonStatus::Cancelled)
            .filter(|l| class_id.as_deref().map_or(true, |c| l.class_id == c))
            .filter(|l| teacher_id.as_deref().map_or(true, |t| l.teacher_id == t))
            .filter(|l| classroom_id.as_deref().map_or(true, |r| l.classroom_id.as_deref() == Some(r)))
            .filter_map(|l| {
                let date = parse_date(&l.date).filter(|d| monday <= *d && *d <= sunday)?;
                let (start, end) = l.minutes()?;
                Some(GridItem {
                    id: l.id.clone(),
                    day: Weekday::of(date),
                    start,
                    end,
                    data: json!({
                        "lessonId": l.id,
                        "classId": l.class_id,
                        "className": names.get(l.class_id.as_str()),
                        "teacherId": l.teacher_id,
                        "classroomId": l.classroom_id,
                        "status": l.status,
                        "topic": l.topic,
                        "date": l.date,
                    }),
                })
            })
            .collect()
    };

    let count = items.len();
    let mut result = to_json(&layout_week(items, &settings, dates))?;
    result["template"] = json!(template);
    result["weekStart"] = json!(week_start.map(format_date));
    result["weekEnd"] = json!(week_start.map(|m| format_date(m + Duration::days(6))));
    result["itemCount"] = json!(count);
    Ok(result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "schedule.checkConflicts" => schedule_check_conflicts(state, &req.params),
        "schedule.week" => schedule_week(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
