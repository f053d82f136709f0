use serde::{Deserialize, Serialize};

/// Outcome carried by a completion notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ProcessingComplete,
    ProcessingFailed,
}

/// Notification published once per upload
///
/// Serialized as `{"action": "...", "download_url": "..."}`. The download URL
/// is empty for failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub action: Action,
    pub download_url: String,
}

impl Message {
    pub fn complete(download_url: impl Into<String>) -> Self {
        Self {
            action: Action::ProcessingComplete,
            download_url: download_url.into(),
        }
    }

    pub fn failed() -> Self {
        Self {
            action: Action::ProcessingFailed,
            download_url: String::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.action == Action::ProcessingComplete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_complete_wire_format() {
        let message = Message::complete("/api/v1/download/photo_1700000000.png");

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "action": "processing_complete",
                "download_url": "/api/v1/download/photo_1700000000.png"
            })
        );
    }

    #[test]
    fn test_failed_wire_format() {
        let message = Message::failed();

        assert!(!message.is_complete());
        assert_eq!(
            serde_json::to_string(&message).unwrap(),
            r#"{"action":"processing_failed","download_url":""}"#
        );
    }
}
