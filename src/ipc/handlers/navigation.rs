use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_flag, get_required_str, respond, store_ref};
use crate::ipc::types::{AppState, Request};
use crate::model::{
    AcademicYear, AttendanceRecord, ClassStatus, Classroom, Collection, Grade, Homework, Lesson,
    PaymentObligation, Record, SalaryCalculation, SchoolClass, Student, StudentStatus, Teacher,
    TeacherStatus, TeachingBreak,
};
use crate::nav::{breadcrumbs, options, LookupEntity};
use crate::store::{find, list, Store, StoreError};
use serde_json::{json, Value};

fn label_of<T: Record>(store: &dyn Store, id: &str) -> Result<Option<String>, StoreError> {
    Ok(find::<T>(store, id)?.map(|r| r.label()))
}

fn display_name(store: &dyn Store, collection: Collection, id: &str) -> Result<Option<String>, StoreError> {
    match collection {
        Collection::Students => label_of::<Student>(store, id),
        Collection::Teachers => label_of::<Teacher>(store, id),
        Collection::Classrooms => label_of::<Classroom>(store, id),
        Collection::Classes => label_of::<SchoolClass>(store, id),
        Collection::AcademicYears => label_of::<AcademicYear>(store, id),
        Collection::TeachingBreaks => label_of::<TeachingBreak>(store, id),
        Collection::Lessons => label_of::<Lesson>(store, id),
        Collection::AttendanceRecords => label_of::<AttendanceRecord>(store, id),
        Collection::Homework => label_of::<Homework>(store, id),
        Collection::Grades => label_of::<Grade>(store, id),
        Collection::PaymentObligations => label_of::<PaymentObligation>(store, id),
        Collection::SalaryCalculations => label_of::<SalaryCalculation>(store, id),
    }
}

fn nav_breadcrumbs(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let path = get_required_str(params, "path")?;
    // Without a workspace ids stay as they are.
    let store = state.store.as_deref();
    let mut failure: Option<StoreError> = None;
    let crumbs = breadcrumbs(&path, |collection, id| {
        let store = store?;
        match display_name(store, collection, id) {
            Ok(name) => name,
            Err(e) => {
                failure.get_or_insert(e);
                None
            }
        }
    });
    if let Some(e) = failure {
        return Err(e.into());
    }
    Ok(json!({ "path": path, "crumbs": crumbs }))
}

fn lookups_options(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let raw = get_required_str(params, "entity")?;
    let entity = LookupEntity::parse(&raw)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown lookup entity: {}", raw)))?;
    let all = get_flag(params, "includeInactive")?;
    let store = store_ref(state)?;
    let items = match entity {
        LookupEntity::Students => options(&list::<Student>(store)?, |s| {
            all || s.status == StudentStatus::Active
        }),
        LookupEntity::Teachers => options(&list::<Teacher>(store)?, |t| {
            all || t.status == TeacherStatus::Active
        }),
        LookupEntity::Classrooms => options(&list::<Classroom>(store)?, |r| all || r.active),
        LookupEntity::Classes => options(&list::<SchoolClass>(store)?, |c| {
            all || c.status == ClassStatus::Active
        }),
        LookupEntity::AcademicYears => options(&list::<AcademicYear>(store)?, |_| true),
    };
    Ok(json!({ "entity": raw, "items": items }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "nav.breadcrumbs" => nav_breadcrumbs(state, &req.params),
        "lookups.options" => lookups_options(state, &req.params),
        _ => return None,
    };
    Some(respond(req, result))
}
