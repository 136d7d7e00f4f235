//! Response conventions shared by every request of a router.

use serde::Deserialize;

use crate::status::Status;

/// Envelope settings.
///
/// Every field has a default, so a partial config file deserializes:
///
/// ```rust
/// let settings: kelp::Settings = serde_json::from_str(r#"{"success_message":"成功"}"#).unwrap();
/// assert_eq!(settings.success().message, "成功");
/// assert_eq!(settings.invalid_param_status, 3);
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Message of the envelope written when a handler returns nothing.
    pub success_message: String,
    /// Body sent when no route matches.
    pub not_found: Status,
    /// `status` of the envelope written when a body fails to bind or validate.
    pub invalid_param_status: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            success_message: "success".to_owned(),
            not_found: Status::not_found(),
            invalid_param_status: 3,
        }
    }
}

impl Settings {
    pub fn success(&self) -> Status {
        Status::success(self.success_message.as_str())
    }

    pub fn invalid_param(&self, err: impl std::fmt::Display) -> Status {
        Status::error(self.invalid_param_status, err)
    }
}
