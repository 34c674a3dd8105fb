use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    commit, field_error, filters, get_object, get_optional_str, get_required_str, load,
    new_record, patched, respond, store_ref, validate,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{now_ts, AcademicYear, SchoolClass, TeachingBreak};
use crate::store::{list, Store, WriteBatch};
use serde_json::{json, Value};

/// Queues deactivation of every other active year.
fn deactivate_others(store: &dyn Store, keep_id: &str, batch: &mut WriteBatch) -> Result<usize, HandlerErr> {
    let mut n = 0;
    let ts = now_ts();
    for mut year in list::<AcademicYear>(store)? {
        if year.id != keep_id && year.is_active {
            year.is_active = false;
            year.updated_at = ts.clone();
            batch.put(&year)?;
            n += 1;
        }
    }
    Ok(n)
}

fn years_list(state: &AppState, _params: &Value) -> Result<Value, HandlerErr> {
    let mut rows = list::<AcademicYear>(store_ref(state)?)?;
    rows.sort_by(|a, b| a.start_date.cmp(&b.start_date));
    Ok(json!({ "total": rows.len(), "items": rows }))
}

fn years_open(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let store = store_ref(state)?;
    let id = get_required_str(params, "id")?;
    let year = load::<AcademicYear>(store, &id)?;
    let mut breaks: Vec<TeachingBreak> = list::<TeachingBreak>(store)?
        .into_iter()
        .filter(|b| b.academic_year_id == id)
        .collect();
    breaks.sort_by(|a, b| a.start_date.cmp(&b.start_date));
    Ok(json!({ "item": year, "breaks": breaks }))
}

/// Breaks of `year` that fall outside its new bounds.
fn stranded_breaks(store: &dyn Store, year: &AcademicYear) -> Result<Vec<String>, HandlerErr> {
    let Some((start, end)) = year.bounds() else {
        return Ok(Vec::new());
    };
    Ok(list::<TeachingBreak>(store)?
        .into_iter()
        .filter(|b| b.academic_year_id == year.id)
        .filter(|b| {
            !matches!(
                (crate::model::parse_date(&b.start_date), crate::model::parse_date(&b.end_date)),
                (Some(s), Some(e)) if start <= s && e <= end
            )
        })
        .map(|b| b.name)
        .collect())
}

fn years_create(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let year: AcademicYear = new_record(get_object(params, "input")?, |_| {})?;
    validate(&year, &state.validation_context())?;
    let mut batch = WriteBatch::new();
    if year.is_active {
        deactivate_others(store_ref(state)?, &year.id, &mut batch)?;
    }
    batch.put(&year)?;
    commit(state, &batch, "academicYears.create")?;
    Ok(json!({ "item": year }))
}

fn years_update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let store = store_ref(state)?;
    let existing = load::<AcademicYear>(store, &id)?;
    let year = patched(&existing, get_object(params, "patch")?)?;
    validate(&year, &state.validation_context())?;
    let stranded = stranded_breaks(store, &year)?;
    if !stranded.is_empty() {
        return Err(field_error(
            "startDate",
            format!("would leave teaching breaks outside the year: {}", stranded.join(", ")),
        ));
    }
    let mut batch = WriteBatch::new();
    if year.is_active && !existing.is_active {
        deactivate_others(store, &year.id, &mut batch)?;
    }
    batch.put(&year)?;
    commit(state, &batch, "academicYears.update")?;
    Ok(json!({ "item": year }))
}

/// Cascades the year's teaching breaks and detaches classes from it.
fn years_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let store = store_ref(state)?;
    load::<AcademicYear>(store, &id)?;
    let mut batch = WriteBatch::new();
    let mut breaks = 0;
    for b in list::<TeachingBreak>(store)?.into_iter().filter(|b| b.academic_year_id == id) {
        batch.delete::<TeachingBreak>(&b.id);
        breaks += 1;
    }
    let mut detached = 0;
    let ts = now_ts();
    for mut c in list::<SchoolClass>(store)? {
        if c.academic_year_id.as_deref() == Some(id.as_str()) {
            c.academic_year_id = None;
            c.updated_at = ts.clone();
            batch.put(&c)?;
            detached += 1;
        }
    }
    batch.delete::<AcademicYear>(&id);
    commit(state, &batch, "academicYears.delete")?;
    Ok(json!({ "deleted": id, "breaksRemoved": breaks, "classesDetached": detached }))
}

fn check_break(store: &dyn Store, item: &TeachingBreak) -> Result<(), HandlerErr> {
    let year = crate::store::find::<AcademicYear>(store, &item.academic_year_id)?
        .ok_or_else(|| field_error("academicYearId", "references an unknown academic year"))?;
    if let (Some((ys, ye)), Some(s), Some(e)) = (
        year.bounds(),
        crate::model::parse_date(&item.start_date),
        crate::model::parse_date(&item.end_date),
    ) {
        if s < ys || e > ye {
            return Err(field_error(
                if s < ys { "startDate" } else { "endDate" },
                format!("must fall within {} ({} to {})", year.name, year.start_date, year.end_date),
            ));
        }
    }
    Ok(())
}

fn breaks_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let year_id = get_optional_str(filters(params), "academicYearId")?;
    let mut rows: Vec<TeachingBreak> = list::<TeachingBreak>(store_ref(state)?)?
        .into_iter()
        .filter(|b| year_id.as_deref().map_or(true, |y| b.academic_year_id == y))
        .collect();
    rows.sort_by(|a, b| a.start_date.cmp(&b.start_date));
    Ok(json!({ "total": rows.len(), "items": rows }))
}

fn breaks_open(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let item = load::<TeachingBreak>(store_ref(state)?, &id)?;
    Ok(json!({ "item": item }))
}

fn breaks_create(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let item: TeachingBreak = new_record(get_object(params, "input")?, |_| {})?;
    validate(&item, &state.validation_context())?;
    check_break(store_ref(state)?, &item)?;
    let mut batch = WriteBatch::new();
    batch.put(&item)?;
    commit(state, &batch, "teachingBreaks.create")?;
    Ok(json!({ "item": item }))
}

fn breaks_update(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    let existing = load::<TeachingBreak>(store_ref(state)?, &id)?;
    let item = patched(&existing, get_object(params, "patch")?)?;
    validate(&item, &state.validation_context())?;
    check_break(store_ref(state)?, &item)?;
    let mut batch = WriteBatch::new();
    batch.put(&item)?;
    commit(state, &batch, "teachingBreaks.update")?;
    Ok(json!({ "item": item }))
}

fn breaks_delete(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let id = get_required_str(params, "id")?;
    load::<TeachingBreak>(store_ref(state)?, &id)?;
    let mut batch = WriteBatch::new();
    batch.delete::<TeachingBreak>(&id);
    commit(state, &batch, "teachingBreaks.delete")?;
    Ok(json!({ "deleted": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "academicYears.list" => years_list(state, &req.params),
        "academicYears.open" => years_open(state, &req.params),
        "academicYears.create" => years_create(state, &req.params),
        "academicYears.update" => years_update(state, &req.params),
        "academicYears.delete" => years_delete(state, &req.params),
        "teachingBreaks.list" => breaks_list(state, &req.params),
        "teachingBreaks.open" => breaks_open(state, &req.params),
        "teachingBreaks.create" => breaks_create(state, &req.params),
        "teachingBreaks.update" => breaks_update(state, &req.params),
        "teachingBreaks.delete" => breaks_delete(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
