//! Point request bodies.
//!
//! JSON is read leniently into a [`PointDraft`] that remembers, per field,
//! whether the value was absent, `null`, malformed or usable. Validation then
//! turns the draft into typed fields and reports every problem at once.

use serde_json::{Map, Value};

use poim_shared::constants::MAX_TITLE_LEN;
use poim_store::{NewPoint, PointChanges};
use poim_shared::UserId;

use crate::error::{FieldErrors, ServerError};

pub const MSG_REQUIRED: &str = "This field is required.";
pub const MSG_NULL: &str = "This field may not be null.";
pub const MSG_BLANK: &str = "This field may not be blank.";
pub const MSG_NOT_STRING: &str = "Not a valid string.";
pub const MSG_NOT_NUMBER: &str = "A valid number is required.";
pub const MSG_NOT_BOOLEAN: &str = "Must be a valid boolean.";

/// One field of a request body as it arrived.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<T> {
    Absent,
    Null,
    Invalid(&'static str),
    Present(T),
}

impl<T> FieldValue<T> {
    fn from_json(value: Option<&Value>, convert: impl FnOnce(&Value) -> Result<T, &'static str>) -> Self {
        match value {
            None => FieldValue::Absent,
            Some(Value::Null) => FieldValue::Null,
            Some(v) => match convert(v) {
                Ok(t) => FieldValue::Present(t),
                Err(msg) => FieldValue::Invalid(msg),
            },
        }
    }

    /// Resolve the field, recording a message when it is unusable.
    ///
    /// `default` is used for an absent field; `None` there means "required".
    fn resolve(self, name: &str, default: Option<T>, errors: &mut FieldErrors) -> Option<T> {
        match self {
            FieldValue::Present(v) => Some(v),
            FieldValue::Absent => {
                if default.is_none() {
                    errors.add(name, MSG_REQUIRED);
                }
                default
            }
            FieldValue::Null => {
                errors.add(name, MSG_NULL);
                None
            }
            FieldValue::Invalid(msg) => {
                errors.add(name, msg);
                None
            }
        }
    }

    /// Like [`resolve`](Self::resolve) but an absent field is simply `None`.
    fn resolve_optional(self, name: &str, errors: &mut FieldErrors) -> Option<T> {
        match self {
            FieldValue::Absent => None,
            other => other.resolve(name, None, errors),
        }
    }
}

/// A point body before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct PointDraft {
    pub title: FieldValue<String>,
    pub latitude: FieldValue<f64>,
    pub longitude: FieldValue<f64>,
    pub unlisted: FieldValue<bool>,
}

/// A complete, validated set of point fields.
#[derive(Debug, Clone, PartialEq)]
pub struct PointFields {
    pub title: String,
    pub latitude: f64,
    pub longitude: f64,
    pub unlisted: bool,
}

impl PointFields {
    pub fn into_new_point(self, owner_id: UserId) -> NewPoint {
        NewPoint {
            owner_id,
            title: self.title,
            latitude: self.latitude,
            longitude: self.longitude,
            unlisted: self.unlisted,
        }
    }

    pub fn into_changes(self) -> PointChanges {
        PointChanges {
            title: Some(self.title),
            latitude: Some(self.latitude),
            longitude: Some(self.longitude),
            unlisted: Some(self.unlisted),
        }
    }
}

impl PointDraft {
    /// Read a draft from a JSON body. Anything but an object is rejected.
    /// Unknown keys (including `id` and `can_edit`) are ignored.
    pub fn from_json(body: &Value) -> Result<Self, ServerError> {
        let Value::Object(map) = body else {
            return Err(ServerError::BadRequest(
                "Expected a JSON object".to_string(),
            ));
        };
        Ok(Self::from_map(map))
    }

    fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            title: FieldValue::from_json(map.get("title"), json_string),
            latitude: FieldValue::from_json(map.get("latitude"), json_number),
            longitude: FieldValue::from_json(map.get("longitude"), json_number),
            unlisted: FieldValue::from_json(map.get("unlisted"), json_bool),
        }
    }

    /// Validate for create or full replace. Every field is required.
    pub fn validate_full(self) -> Result<PointFields, FieldErrors> {
        let mut errors = FieldErrors::new();

        let title = self
            .title
            .resolve("title", None, &mut errors)
            .and_then(|t| check_title(t, &mut errors));
        let latitude = self.latitude.resolve("latitude", None, &mut errors);
        let longitude = self.longitude.resolve("longitude", None, &mut errors);
        let unlisted = self.unlisted.resolve("unlisted", None, &mut errors);

        match (title, latitude, longitude, unlisted) {
            (Some(title), Some(latitude), Some(longitude), Some(unlisted)) if errors.is_empty() => {
                Ok(PointFields {
                    title,
                    latitude,
                    longitude,
                    unlisted,
                })
            }
            _ => Err(errors),
        }
    }

    /// Validate for a partial update: only supplied fields are checked.
    pub fn validate_partial(self) -> Result<PointChanges, FieldErrors> {
        let mut errors = FieldErrors::new();

        let changes = PointChanges {
            title: self
                .title
                .resolve_optional("title", &mut errors)
                .and_then(|t| check_title(t, &mut errors)),
            latitude: self.latitude.resolve_optional("latitude", &mut errors),
            longitude: self.longitude.resolve_optional("longitude", &mut errors),
            unlisted: self.unlisted.resolve_optional("unlisted", &mut errors),
        };

        errors.into_result(changes)
    }
}

/// Trim, then require 1..=100 characters.
fn check_title(title: String, errors: &mut FieldErrors) -> Option<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        errors.add("title", MSG_BLANK);
        return None;
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        errors.add(
            "title",
            format!("Ensure this field has no more than {MAX_TITLE_LEN} characters."),
        );
        return None;
    }
    Some(trimmed.to_string())
}

// ---------------------------------------------------------------------------
// JSON coercions
// ---------------------------------------------------------------------------

fn json_string(v: &Value) -> Result<String, &'static str> {
    match v {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(MSG_NOT_STRING),
    }
}

/// Numbers, or strings holding a number. Must be finite.
fn json_number(v: &Value) -> Result<f64, &'static str> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite()).ok_or(MSG_NOT_NUMBER)
}

fn json_bool(v: &Value) -> Result<bool, &'static str> {
    match v {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Ok(true),
            Some(0) => Ok(false),
            _ => Err(MSG_NOT_BOOLEAN),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(MSG_NOT_BOOLEAN),
        },
        _ => Err(MSG_NOT_BOOLEAN),
    }
}
