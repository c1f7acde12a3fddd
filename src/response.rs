use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Envelope shared by every JSON endpoint: `{success, data?, error?, message?}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn into_result(self) -> Result<T, String> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (_, _) => Err(self
                .error
                .unwrap_or_else(|| "response carried no data".to_string())),
        }
    }
}

impl ApiResponse<()> {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            message: None,
        }
    }

    pub fn done(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            error: None,
            message: Some(message.into()),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// `201 Created` with the envelope body.
pub fn created<T: Serialize>(data: T, message: &str) -> Response {
    (StatusCode::CREATED, ApiResponse::ok(data).with_message(message)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_omits_error() {
        let json = serde_json::to_value(ApiResponse::ok(vec![1, 2])).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], serde_json::json!([1, 2]));
        assert!(json.get("error").is_none());
    }

    #[test]
    fn failure_envelope_has_no_data() {
        let json = serde_json::to_value(ApiResponse::failure("nope")).unwrap();
        assert_eq!(json, serde_json::json!({"success": false, "error": "nope"}));
    }

    #[test]
    fn into_result_surfaces_error_text() {
        let env: ApiResponse<u32> =
            serde_json::from_str(r#"{"success":false,"error":"Access denied"}"#).unwrap();
        assert_eq!(env.into_result().unwrap_err(), "Access denied");
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Marked {
        id: i64,
    }

    #[test]
    fn envelopes_decode_for_payloads_without_default() {
        let env: ApiResponse<Marked> = serde_json::from_str(
            r#"{"success":true,"data":{"id":7},"message":"Attendance marked successfully"}"#,
        )
        .unwrap();
        assert_eq!(env.into_result().unwrap(), Marked { id: 7 });

        let env: ApiResponse<Marked> =
            serde_json::from_str(r#"{"success":false,"error":"Attendance already marked for today"}"#)
                .unwrap();
        assert!(env.data.is_none());
    }
}
