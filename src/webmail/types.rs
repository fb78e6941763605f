//! Wire types for the webmail JSON endpoints.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Answer of `action=folderlist`.
#[derive(Debug, Clone, Deserialize)]
pub struct FolderList {
    pub folders: Vec<FolderRecord>,
}

/// One folder owned by the account.
#[derive(Debug, Clone, Deserialize)]
pub struct FolderRecord {
    pub name: String,
}

/// Answer of `action=maillist` for one window.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageListing {
    /// Messages in listing order.
    #[serde(default)]
    pub partial_list: Vec<MessageMeta>,
    /// Folder-wide message count at fetch time. Advisory only.
    #[serde(default, alias = "count")]
    pub total: Option<u64>,
}

/// Listing record for one message.
///
/// Only `uid` drives behaviour; everything else is surfaced for display.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageMeta {
    #[serde(deserialize_with = "uid_from_number_or_string")]
    pub uid: u64,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub from_name: Option<String>,
    #[serde(default)]
    pub from_email: Option<String>,
    #[serde(default)]
    pub attachment: Value,
    /// Remaining backend-supplied fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl MessageMeta {
    /// Listing record carrying nothing but a uid.
    pub fn with_uid(uid: u64) -> Self {
        Self {
            uid,
            subject: None,
            from_name: None,
            from_email: None,
            attachment: Value::Null,
            extra: serde_json::Map::new(),
        }
    }

    /// Sender rendered as `Name <email>`, falling back to whichever part exists.
    pub fn sender(&self) -> String {
        match (self.from_name.as_deref(), self.from_email.as_deref()) {
            (Some(name), Some(email)) if !name.is_empty() => format!("{name} <{email}>"),
            (_, Some(email)) => email.to_string(),
            (Some(name), None) => name.to_string(),
            (None, None) => "(unknown sender)".to_string(),
        }
    }

    /// Whether the backend flagged the message as carrying attachments.
    pub fn has_attachment(&self) -> bool {
        match &self.attachment {
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_u64().is_some_and(|n| n > 0),
            Value::String(s) => !s.is_empty() && s != "0" && !s.eq_ignore_ascii_case("false"),
            _ => false,
        }
    }
}

fn uid_from_number_or_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawUid {
        Number(u64),
        Text(String),
    }

    match RawUid::deserialize(deserializer)? {
        RawUid::Number(n) => Ok(n),
        RawUid::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Answer of `action=unseenandcount`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CountsReply {
    Failure { error_info: Value },
    Counts(MailboxCounts),
}

/// Account-wide message totals.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct MailboxCounts {
    pub messages: u64,
    pub unseen: u64,
}

/// Answer of a mutating call (move, deletemessage).
///
/// The mere presence of a `success` key signals success.
#[derive(Debug, Clone)]
pub struct MutationReply(pub Value);

impl MutationReply {
    pub fn succeeded(&self) -> bool {
        self.0.get("success").is_some()
    }
}

impl std::fmt::Display for MutationReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error body returned by the login endpoint on a 400.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginFailure {
    #[serde(default)]
    pub exception: Value,
    #[serde(default)]
    pub error_info: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_parses_uids_and_total() {
        let raw = r#"{
            "partial_list": [
                {"uid": 10, "subject": "Hi", "from_name": "Alice", "from_email": "alice@example.com", "attachment": 1, "seen": true},
                {"uid": "11"}
            ],
            "total": 42
        }"#;
        let listing: MessageListing = serde_json::from_str(raw).unwrap();
        assert_eq!(listing.total, Some(42));
        let uids: Vec<u64> = listing.partial_list.iter().map(|m| m.uid).collect();
        assert_eq!(uids, vec![10, 11]);

        let first = &listing.partial_list[0];
        assert_eq!(first.sender(), "Alice <alice@example.com>");
        assert!(first.has_attachment());
        assert_eq!(first.extra.get("seen"), Some(&Value::Bool(true)));

        let second = &listing.partial_list[1];
        assert!(!second.has_attachment());
        assert_eq!(second.sender(), "(unknown sender)");
    }

    #[test]
    fn listing_without_total_or_list_is_empty() {
        let listing: MessageListing = serde_json::from_str("{}").unwrap();
        assert!(listing.partial_list.is_empty());
        assert_eq!(listing.total, None);
    }

    #[test]
    fn non_numeric_uid_is_rejected() {
        let raw = r#"{"partial_list": [{"uid": "abc"}]}"#;
        assert!(serde_json::from_str::<MessageListing>(raw).is_err());
    }

    #[test]
    fn counts_reply_distinguishes_expired_session() {
        let ok: CountsReply = serde_json::from_str(r#"{"messages": 3, "unseen": 1}"#).unwrap();
        assert!(matches!(
            ok,
            CountsReply::Counts(MailboxCounts { messages: 3, unseen: 1 })
        ));

        let expired: CountsReply =
            serde_json::from_str(r#"{"error_info": "not logged in"}"#).unwrap();
        assert!(matches!(expired, CountsReply::Failure { .. }));
    }

    #[test]
    fn mutation_success_is_key_presence() {
        assert!(MutationReply(serde_json::json!({"success": false})).succeeded());
        assert!(!MutationReply(serde_json::json!({"error": "nope"})).succeeded());
    }
}
