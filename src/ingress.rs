//! Inbound request and payload types.
//!
//! The same shapes arrive as HTTP bodies and as JSON payloads inside bus
//! events. Callers use the string `"undefined"` for "not supplied"; it is
//! translated to `None` here, once, together with empty strings.

use serde::{Deserialize, Deserializer, Serialize};

/// Fields common to every operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    /// Declared author; may be the agent sentinel.
    #[serde(default, deserialize_with = "undefined_as_none", skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Workspace owner; defaults to the effective author.
    #[serde(default, deserialize_with = "undefined_as_none", skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Podcast id.
    #[serde(default, deserialize_with = "undefined_as_none", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Conversation id, `<author>.<suffix>` when sent by the agent.
    #[serde(default, deserialize_with = "undefined_as_none", skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,

    /// `"0"` chains the next stage automatically.
    #[serde(default, deserialize_with = "undefined_as_none", skip_serializing_if = "Option::is_none")]
    pub slow: Option<String>,
}

/// Body of a `create` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    #[serde(flatten)]
    pub context: RequestContext,

    /// Listener requirements; read from the workspace when absent.
    #[serde(default, deserialize_with = "undefined_as_none", skip_serializing_if = "Option::is_none")]
    pub requirements: Option<String>,

    /// Document URLs, sent as one comma-separated string.
    #[serde(
        default,
        deserialize_with = "comma_list",
        serialize_with = "join_commas",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub input_files: Vec<String>,
}

/// Body of an `extend` or `produce` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRequest {
    #[serde(flatten)]
    pub context: RequestContext,
}

/// Deserialize an optional string, mapping `"undefined"` and blank to `None`.
pub fn undefined_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.and_then(defined))
}

/// Deserialize a comma-separated list, dropping blank and `"undefined"` items.
fn comma_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .map(|s| s.split(',').filter_map(|item| defined(item.trim().to_string())).collect())
        .unwrap_or_default())
}

fn join_commas<S>(items: &[String], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&items.join(","))
}

/// `None` for blank and `"undefined"` values; anything else is kept verbatim.
fn defined(value: String) -> Option<String> {
    match value.trim() {
        "" | "undefined" => None,
        _ => Some(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_undefined_becomes_none() {
        let req: CreateRequest = serde_json::from_value(json!({
            "author": "alice",
            "user": "undefined",
            "name": "pod-1",
            "requirements": "",
            "inputFiles": "undefined",
            "slow": "0"
        }))
        .unwrap();

        assert_eq!(req.context.author.as_deref(), Some("alice"));
        assert!(req.context.user.is_none());
        assert!(req.requirements.is_none());
        assert!(req.input_files.is_empty());
        assert_eq!(req.context.slow.as_deref(), Some("0"));
    }

    #[test]
    fn test_input_files_split_and_trimmed() {
        let req: CreateRequest = serde_json::from_value(json!({
            "inputFiles": "https://a/x.pdf, https://b/y.txt,,"
        }))
        .unwrap();
        assert_eq!(req.input_files, vec!["https://a/x.pdf", "https://b/y.txt"]);
    }

    #[test]
    fn test_requirements_are_kept_verbatim() {
        let req: CreateRequest = serde_json::from_value(json!({
            "author": "alice",
            "name": "pod-1",
            "requirements": "  keep it under 5 minutes\n\n- no jargon\n",
            "inputFiles": "a.pdf",
        }))
        .unwrap();
        assert_eq!(
            req.requirements.as_deref(),
            Some("  keep it under 5 minutes\n\n- no jargon\n")
        );

        let req: CreateRequest = serde_json::from_value(json!({
            "author": "alice",
            "name": "pod-1",
            "requirements": " undefined ",
        }))
        .unwrap();
        assert_eq!(req.requirements, None);
    }

    #[test]
    fn test_missing_fields_default() {
        let req: StageRequest = serde_json::from_value(json!({"name": "p"})).unwrap();
        assert_eq!(req.context.name.as_deref(), Some("p"));
        assert!(req.context.conversation_id.is_none());
        assert!(req.context.slow.is_none());
    }

    #[test]
    fn test_null_is_none() {
        let req: StageRequest = serde_json::from_value(json!({"user": null})).unwrap();
        assert!(req.context.user.is_none());
    }

    #[test]
    fn test_serializes_camel_case_without_absent_fields() {
        let req = CreateRequest {
            context: RequestContext {
                conversation_id: Some("abc.1".into()),
                ..Default::default()
            },
            requirements: None,
            input_files: vec!["u1".into(), "u2".into()],
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value, json!({"conversationId": "abc.1", "inputFiles": "u1,u2"}));
    }
}
