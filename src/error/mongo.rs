use std::fmt;

use serde::{Deserialize, Serialize};

/// Structured error information extracted from MongoDB driver errors.
///
/// Serialized to JSON for display and logging.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub(crate) error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
}

impl ErrorInfo {
    /// Convert error info to compact JSON string (single line).
    pub fn to_json_compact(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Format a MongoDB error as pretty JSON wrapped in an `error` field.
pub fn format_mongodb_error(
    f: &mut fmt::Formatter<'_>,
    error: &mongodb::error::Error,
) -> fmt::Result {
    let info = extract_error_info(error);
    let wrapper = serde_json::json!({ "error": info });

    let json_output = serde_json::to_string_pretty(&wrapper).map_err(|_| fmt::Error)?;
    write!(f, "\n{json_output}")
}

/// Extract structured information from a MongoDB error using the driver API.
pub fn extract_error_info(error: &mongodb::error::Error) -> ErrorInfo {
    use mongodb::error::ErrorKind;

    let mut info = ErrorInfo::default();

    match error.kind.as_ref() {
        ErrorKind::Command(command_error) => {
            info.error_type = Some("mongo.command_error".to_string());
            info.code = Some(command_error.code);
            info.message = Some(command_error.message.clone());
            info.name = cursor_error_name(command_error.code).map(str::to_string);
        }
        ErrorKind::Authentication { message, .. } => {
            info.error_type = Some("mongo.authentication_error".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::InvalidArgument { message, .. } => {
            info.error_type = Some("mongo.invalid_argument".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::ServerSelection { message, .. } => {
            info.error_type = Some("mongo.server_selection_error".to_string());
            info.message = Some(message.clone());
        }
        _ => {
            info.message = Some(error.to_string());
        }
    }

    info
}

/// Human-readable name for server codes a cursor can run into.
pub(crate) fn cursor_error_name(code: i32) -> Option<&'static str> {
    let name = match code {
        13 => "Unauthorized",
        26 => "NamespaceNotFound",
        43 => "CursorNotFound",
        50 => "MaxTimeMSExpired",
        96 => "OperationFailed",
        136 => "CappedPositionLost",
        175 => "QueryPlanKilled",
        237 => "CursorKilled",
        11601 => "Interrupted",
        _ => return None,
    };

    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_error_names() {
        assert_eq!(cursor_error_name(43), Some("CursorNotFound"));
        assert_eq!(cursor_error_name(237), Some("CursorKilled"));
        assert_eq!(cursor_error_name(11601), Some("Interrupted"));
        assert_eq!(cursor_error_name(1), None);
    }

    #[test]
    fn test_error_info_skips_empty_fields() {
        let info = ErrorInfo {
            code: Some(43),
            name: Some("CursorNotFound".to_string()),
            ..Default::default()
        };
        let json = info.to_json_compact().unwrap();
        assert_eq!(json, r#"{"code":43,"name":"CursorNotFound"}"#);
    }
}
