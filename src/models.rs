//! Response envelopes shared by the API handlers

use serde::Serialize;

/// Generic success response
#[derive(Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub data: Option<T>,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn with_data(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Payload {
        run_id: &'static str,
    }

    #[test]
    fn test_data_is_flattened_into_envelope() {
        let body = SuccessResponse::with_data("Run created", Payload { run_id: "abc" });
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"success": true, "message": "Run created", "run_id": "abc"})
        );
    }
}
