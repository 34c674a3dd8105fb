use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use serde_path_to_error::{Path, Segment};

use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{new_id, now_ts, parse_date, Record};
use crate::store::{self, Store, WriteBatch};
use crate::validation::{ValidationContext, ValidationErrors, Validator};

pub fn respond(req: &Request, result: Result<Value, HandlerErr>) -> Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn store_ref(state: &AppState) -> Result<&dyn Store, HandlerErr> {
    state.store.as_deref().ok_or_else(HandlerErr::no_workspace)
}

/// Commits a batch and drops every cached read model.
pub fn commit(state: &mut AppState, batch: &WriteBatch, what: &str) -> Result<(), HandlerErr> {
    let store = state.store.as_deref_mut().ok_or_else(HandlerErr::no_workspace)?;
    store.commit(batch)?;
    tracing::debug!(ops = batch.len(), what, "storage write");
    state.invalidate_read_models();
    Ok(())
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

pub fn get_optional_bool(params: &Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be a boolean", key))),
    }
}

pub fn get_flag(params: &Value, key: &str) -> Result<bool, HandlerErr> {
    Ok(get_optional_bool(params, key)?.unwrap_or(false))
}

pub fn get_optional_f64(params: &Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a number", key))),
    }
}

pub fn get_optional_date(params: &Value, key: &str) -> Result<Option<NaiveDate>, HandlerErr> {
    match get_optional_str(params, key)? {
        None => Ok(None),
        Some(raw) => parse_date(&raw).map(Some).ok_or_else(|| {
            HandlerErr::from(ValidationErrors::single(key, "must be a date in YYYY-MM-DD format"))
        }),
    }
}

pub fn get_object<'a>(params: &'a Value, key: &str) -> Result<&'a Map<String, Value>, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an object", key)))
}

/// List filters may be sent as `params.filters` or inline in `params`.
pub fn filters(params: &Value) -> &Value {
    match params.get("filters") {
        Some(f @ Value::Object(_)) => f,
        _ => params,
    }
}

pub fn load<T: Record>(store: &dyn Store, id: &str) -> Result<T, HandlerErr> {
    store::find::<T>(store, id)?.ok_or_else(|| HandlerErr::not_found(T::COLLECTION, id))
}

pub fn exists<T: Record>(store: &dyn Store, id: &str) -> Result<bool, HandlerErr> {
    Ok(store.get(T::COLLECTION, id)?.is_some())
}

/// Upper bound on decode attempts while collecting shape errors.
const MAX_DECODE_PASSES: usize = 32;

/// Decodes client input, reporting every shape problem as a field error.
///
/// `required` lists top-level keys that must be present and non-null; they are
/// all reported together. Other failures (unknown enum values, wrong types,
/// missing nested fields) carry their real path, prefixed with `root`. A bad
/// object member is dropped and decoding retried so later members are
/// reported as well.
pub fn decode_fields<T: DeserializeOwned>(
    mut value: Value,
    root: &str,
    required: &[&str],
) -> Result<T, HandlerErr> {
    let mut v = Validator::new();
    if let Value::Object(obj) = &value {
        for key in required {
            if obj.get(*key).map_or(true, Value::is_null) {
                v.push(join_path(root, key), "is required");
            }
        }
    }

    for _ in 0..MAX_DECODE_PASSES {
        let e = match serde_path_to_error::deserialize::<_, T>(&value) {
            Ok(decoded) => {
                v.finish()?;
                return Ok(decoded);
            }
            Err(e) => e,
        };
        let at = render_path(e.path());
        let raw = e.inner().to_string();
        let missing = raw
            .strip_prefix("missing field `")
            .and_then(|r| r.strip_suffix('`'));
        let (field, message) = match missing {
            Some(name) if at.is_empty() => (join_path(root, name), "is required".to_string()),
            Some(name) => (join_path(root, &format!("{}.{}", at, name)), "is required".to_string()),
            None => (join_path(root, &at), shape_message(&raw)),
        };
        if !v.has_error(&field) {
            v.push(field, message);
        }
        if !remove_at(&mut value, e.path()) {
            break;
        }
    }
    Err(v
        .finish()
        .err()
        .unwrap_or_else(|| ValidationErrors::single(join_path(root, ""), "is malformed"))
        .into())
}

fn decode_input<T: Record>(value: Value) -> Result<T, HandlerErr> {
    decode_fields(value, "", T::REQUIRED)
}

fn join_path(root: &str, path: &str) -> String {
    match (root.is_empty(), path.is_empty()) {
        (true, true) => "input".to_string(),
        (true, false) => path.to_string(),
        (false, true) => root.to_string(),
        (false, false) if path.starts_with('[') => format!("{}{}", root, path),
        (false, false) => format!("{}.{}", root, path),
    }
}

fn render_path(path: &Path) -> String {
    let mut out = String::new();
    for segment in path.iter() {
        match segment {
            Segment::Seq { index } => out.push_str(&format!("[{}]", index)),
            Segment::Map { key } => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(key);
            }
            _ => {}
        }
    }
    out
}

fn shape_message(raw: &str) -> String {
    if let Some(rest) = raw.strip_prefix("unknown variant `") {
        if let Some((_, expected)) = rest.split_once("expected one of ") {
            return format!("must be one of {}", expected.replace('`', ""));
        }
        if let Some((_, expected)) = rest.split_once("expected ") {
            return format!("must be {}", expected.replace('`', ""));
        }
    }
    raw.to_string()
}

/// Drops the object member at `path`. Array elements are left in place so
/// later indices keep their meaning.
fn remove_at(value: &mut Value, path: &Path) -> bool {
    let segments: Vec<&Segment> = path.iter().collect();
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };
    let mut cur = value;
    for segment in parents {
        cur = match (segment, cur) {
            (Segment::Map { key }, Value::Object(m)) => match m.get_mut(key.as_str()) {
                Some(next) => next,
                None => return false,
            },
            (Segment::Seq { index }, Value::Array(a)) => match a.get_mut(*index) {
                Some(next) => next,
                None => return false,
            },
            _ => return false,
        };
    }
    match (last, cur) {
        (Segment::Map { key }, Value::Object(m)) => m.remove(key.as_str()).is_some(),
        _ => false,
    }
}

pub fn validate<T: Record>(record: &T, ctx: &ValidationContext) -> Result<(), HandlerErr> {
    let mut v = Validator::new();
    record.validate(ctx, &mut v);
    Ok(v.finish()?)
}

/// Builds a new record from `input`, assigning id and timestamps.
/// `defaults` may fill fields the caller omitted before decoding.
pub fn new_record<T: Record>(
    input: &Map<String, Value>,
    defaults: impl FnOnce(&mut Map<String, Value>),
) -> Result<T, HandlerErr> {
    let mut obj = input.clone();
    defaults(&mut obj);
    let ts = now_ts();
    obj.insert("id".into(), json!(new_id()));
    obj.insert("createdAt".into(), json!(ts));
    obj.insert("updatedAt".into(), json!(ts));
    decode_input(Value::Object(obj))
}

/// JSON merge patch (RFC 7396): nulls remove, objects merge, rest replaces.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(t), Value::Object(p)) => {
            for (k, v) in p {
                if v.is_null() {
                    t.remove(k);
                } else {
                    merge_patch(t.entry(k.clone()).or_insert(Value::Null), v);
                }
            }
        }
        (t, p) => *t = p.clone(),
    }
}

/// Applies `patch` over `existing`; `id` and `createdAt` are immutable.
pub fn patched<T: Record>(existing: &T, patch: &Map<String, Value>) -> Result<T, HandlerErr> {
    let mut body = serde_json::to_value(existing).map_err(crate::store::StoreError::from)?;
    let mut patch = patch.clone();
    patch.remove("id");
    patch.remove("createdAt");
    merge_patch(&mut body, &Value::Object(patch));
    body["updatedAt"] = json!(now_ts());
    decode_input(body)
}

pub fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, HandlerErr> {
    serde_json::to_value(value).map_err(|e| crate::store::StoreError::from(e).into())
}

pub fn field_error(field: &str, message: impl Into<String>) -> HandlerErr {
    ValidationErrors::single(field, message).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_patch_follows_rfc7396() {
        let mut doc = json!({"a": 1, "b": {"c": 2, "d": 3}, "e": [1]});
        merge_patch(&mut doc, &json!({"a": null, "b": {"c": 9}, "e": [2, 3]}));
        assert_eq!(doc, json!({"b": {"c": 9, "d": 3}, "e": [2, 3]}));
    }

    #[test]
    fn missing_field_maps_to_that_field() {
        let input = json!({"name": "Room"});
        let err = new_record::<crate::model::Classroom>(input.as_object().expect("obj"), |_| {})
            .expect_err("capacity missing");
        assert_eq!(err.code, "validation_failed");
        let details = err.details.expect("details");
        assert_eq!(details["fields"][0]["field"], "capacity");
    }

    #[test]
    fn every_missing_required_field_is_reported() {
        let err = new_record::<crate::model::Student>(&Map::new(), |_| {})
            .expect_err("names missing");
        let details = err.details.expect("details");
        assert_eq!(
            details["fields"],
            json!([
                { "field": "firstName", "message": "is required" },
                { "field": "lastName", "message": "is required" }
            ])
        );
    }

    #[test]
    fn nested_shape_errors_keep_their_path() {
        let slots = json!([
            { "day": "monday", "startTime": "09:00", "endTime": "10:00" },
            { "day": "funday", "startTime": "09:00", "endTime": "10:00" }
        ]);
        let err = decode_fields::<Vec<crate::model::ScheduleSlot>>(slots, "schedule", &[])
            .expect_err("bad weekday");
        let details = err.details.expect("details");
        assert_eq!(details["fields"][0]["field"], "schedule[1].day");
        let message = details["fields"][0]["message"].as_str().unwrap_or_default();
        assert!(message.starts_with("must be one of monday"), "{}", message);
    }

    #[test]
    fn bad_member_is_dropped_and_decoding_continues() {
        let input = json!({ "firstName": "Liam", "lastName": 7, "status": "bogus" });
        let err = new_record::<crate::model::Student>(input.as_object().expect("obj"), |_| {})
            .expect_err("two bad members");
        let details = err.details.expect("details");
        let fields: Vec<&str> = details["fields"]
            .as_array()
            .expect("fields")
            .iter()
            .filter_map(|f| f["field"].as_str())
            .collect();
        assert_eq!(fields, vec!["lastName", "status"]);
    }
}
