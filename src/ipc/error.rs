use serde_json::json;

use crate::model::Collection;
use crate::store::StoreError;
use crate::validation::{RuleError, ValidationErrors};

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn no_workspace() -> Self {
        Self::new("no_workspace", "select a workspace first")
    }

    pub fn not_found(collection: Collection, id: &str) -> Self {
        Self::new("not_found", format!("{} not found: {}", collection.noun(), id))
    }

    pub fn in_use(message: impl Into<String>) -> Self {
        Self::new("in_use", message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new("invalid_state", message)
    }

    pub fn conflict(message: impl Into<String>, conflicts: serde_json::Value) -> Self {
        Self::new("conflict", message).with_details(json!({ "conflicts": conflicts }))
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<StoreError> for HandlerErr {
    fn from(e: StoreError) -> Self {
        tracing::error!(error = %e, "storage failure");
        HandlerErr::new("storage_failed", e.to_string())
    }
}

impl From<ValidationErrors> for HandlerErr {
    fn from(e: ValidationErrors) -> Self {
        HandlerErr::new("validation_failed", e.first_message())
            .with_details(json!({ "fields": e.fields }))
    }
}

impl From<RuleError> for HandlerErr {
    fn from(e: RuleError) -> Self {
        match e {
            RuleError::Validation(v) => v.into(),
            RuleError::InvalidState(m) => HandlerErr::invalid_state(m),
        }
    }
}
