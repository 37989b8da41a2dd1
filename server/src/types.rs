//! Request, envelope and response payload types for the Pulse server.
//!
//! Event payloads (`data`) are free-form: they are checked to be a JSON
//! object on ingress and re-emitted verbatim, with no schema imposed.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// A request field failed validation after decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required string field was present but empty.
    #[error("field `{0}` must not be empty")]
    EmptyField(&'static str),
}

/// Body of `POST /api/v1/events/event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddEventRequest {
    pub event_type: String,
    pub user_id: String,
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
}

impl AddEventRequest {
    /// Checks that `eventType` and `userId` are non-empty.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.event_type.is_empty() {
            return Err(ValidationError::EmptyField("eventType"));
        }
        if self.user_id.is_empty() {
            return Err(ValidationError::EmptyField("userId"));
        }
        Ok(())
    }
}

/// JSON object published to the event bus for every accepted event.
///
/// `eventId` and `timestamp` are assigned server-side; the remaining fields
/// are copied from the [`AddEventRequest`]. `data` is `null` when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub event_type: String,
    pub user_id: String,
    pub data: Option<Map<String, Value>>,
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    /// Wraps a request with a fresh event id and the current ingest time.
    pub fn from_request(request: &AddEventRequest) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: request.event_type.clone(),
            user_id: request.user_id.clone(),
            data: request.data.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Key used to pick the bus partition.
    pub fn partition_key(&self) -> &str {
        &self.user_id
    }
}

/// Body of `POST /api/v1/auth/login`.
#[derive(Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    /// Both fields are required and must be non-empty.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.email.is_empty() {
            return Err(ValidationError::EmptyField("email"));
        }
        if self.password.is_empty() {
            return Err(ValidationError::EmptyField("password"));
        }
        Ok(())
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// `data` payload of a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub email: String,
    pub token: String,
}

/// Placeholder aggregate returned by `GET /api/v1/events/stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_events: u64,
    pub login_count: u64,
}

/// `data` payload of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn add_event_request_deserializes_camel_case() {
        let request: AddEventRequest = serde_json::from_value(json!({
            "eventType": "signup",
            "userId": "u42",
            "data": {"plan": "pro"}
        }))
        .unwrap();

        assert_eq!(request.event_type, "signup");
        assert_eq!(request.user_id, "u42");
        assert_eq!(request.data.unwrap()["plan"], "pro");
    }

    #[test]
    fn add_event_request_data_is_optional() {
        let request: AddEventRequest =
            serde_json::from_str(r#"{"eventType":"login","userId":"u1"}"#).unwrap();
        assert!(request.data.is_none());

        let echoed = serde_json::to_value(&request).unwrap();
        assert_eq!(
            echoed,
            json!({"eventType": "login", "userId": "u1", "data": null})
        );
    }

    #[test]
    fn add_event_request_missing_field_names_it() {
        let err = serde_json::from_str::<AddEventRequest>(r#"{"userId":"u1"}"#).unwrap_err();
        assert!(err.to_string().contains("eventType"));
    }

    #[test]
    fn add_event_request_rejects_non_object_data() {
        let result = serde_json::from_str::<AddEventRequest>(
            r#"{"eventType":"login","userId":"u1","data":[1,2,3]}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_empty_fields() {
        let mut request = AddEventRequest {
            event_type: String::new(),
            user_id: "u1".to_string(),
            data: None,
        };
        assert_eq!(
            request.validate(),
            Err(ValidationError::EmptyField("eventType"))
        );

        request.event_type = "login".to_string();
        request.user_id = String::new();
        assert_eq!(request.validate(), Err(ValidationError::EmptyField("userId")));

        request.user_id = "u1".to_string();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn validate_only_rejects_the_empty_string() {
        let request = AddEventRequest {
            event_type: " ".to_string(),
            user_id: "\t".to_string(),
            data: None,
        };
        assert!(request.validate().is_ok());

        let login = LoginRequest {
            email: " ".to_string(),
            password: " ".to_string(),
        };
        assert!(login.validate().is_ok());
    }

    #[test]
    fn envelope_copies_request_and_assigns_id() {
        let request = AddEventRequest {
            event_type: "signup".to_string(),
            user_id: "u42".to_string(),
            data: Some(Map::from_iter([("plan".to_string(), json!("pro"))])),
        };

        let first = EventEnvelope::from_request(&request);
        let second = EventEnvelope::from_request(&request);

        assert_eq!(first.event_type, "signup");
        assert_eq!(first.partition_key(), "u42");
        assert_eq!(first.data, request.data);
        assert_ne!(first.event_id, second.event_id);
    }

    #[test]
    fn envelope_serializes_null_data() {
        let request = AddEventRequest {
            event_type: "login".to_string(),
            user_id: "u1".to_string(),
            data: None,
        };
        let value = serde_json::to_value(EventEnvelope::from_request(&request)).unwrap();

        assert!(value["data"].is_null());
        assert!(value["eventId"].is_string());
        assert!(value["timestamp"].is_string());
        assert_eq!(value["userId"], "u1");
    }

    #[test]
    fn login_request_debug_redacts_password() {
        let request = LoginRequest {
            email: "a@b.com".to_string(),
            password: "hunter2".to_string(),
        };
        let debug_str = format!("{request:?}");
        assert!(debug_str.contains("a@b.com"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn stats_response_uses_camel_case() {
        let value = serde_json::to_value(StatsResponse::default()).unwrap();
        assert_eq!(value, json!({"totalEvents": 0, "loginCount": 0}));
    }
}
