use serde::{ Serialize, Deserialize };
use std::collections::BTreeMap;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub message: String,
}

impl ChatRequest {
    /// Field-level validation; returns field name to message for every violation.
    pub fn validate(&self, max_message_chars: usize) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        if self.conversation_id.trim().is_empty() {
            fields.insert("conversationId".to_string(), "conversationId is required".to_string());
        }
        if self.message.trim().is_empty() {
            fields.insert("message".to_string(), "message is required".to_string());
        } else if self.message.chars().count() > max_message_chars {
            fields.insert(
                "message".to_string(),
                format!("message must be <= {} characters", max_message_chars)
            );
        }
        fields
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub conversation_id: String,
    pub reply: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub conversation_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ErrorBody {
    pub timestamp: String,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, String>>,
}
