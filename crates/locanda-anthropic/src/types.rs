// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messages API wire types and IR translation.

use serde::{Deserialize, Serialize};

use locanda_core::{
    ChatRequest, ChatResponse, ContentBlock, LocandaError, ResponseKind, Role, ToolCall, Usage,
};

/// A request body for `POST /v1/messages`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct WireRequest {
    pub model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub system: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<WireTool>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct WireTool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct WireMessage {
    pub role: &'static str,
    pub content: Vec<WireContentItem>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum WireContentItem {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

/// A full response from the Messages API.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireResponse {
    pub content: Vec<WireResponseBlock>,
    pub stop_reason: Option<String>,
    pub usage: WireUsage,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum WireResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Error body returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorDetail {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

/// Translates an IR request into the wire shape.
pub(crate) fn to_wire_request(
    request: &ChatRequest,
    model: &str,
    max_tokens: u32,
) -> WireRequest {
    let messages = request
        .messages
        .iter()
        .map(|msg| WireMessage {
            role: match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: msg.content.iter().map(to_wire_content).collect(),
        })
        .collect();

    let tools = request
        .tools
        .iter()
        .map(|t| WireTool {
            name: t.name.clone(),
            description: t.description.clone(),
            input_schema: t.parameters.clone(),
        })
        .collect();

    WireRequest {
        model: model.to_string(),
        max_tokens,
        system: request.system.clone(),
        messages,
        tools,
    }
}

fn to_wire_content(block: &ContentBlock) -> WireContentItem {
    match block {
        ContentBlock::Text { text } => WireContentItem::Text { text: text.clone() },
        ContentBlock::ToolCall { tool_call } => WireContentItem::ToolUse {
            id: tool_call.id.clone(),
            name: tool_call.name.clone(),
            input: tool_call.arguments.clone(),
        },
        ContentBlock::ToolResult { tool_result } => WireContentItem::ToolResult {
            tool_use_id: tool_result.tool_call_id.clone(),
            content: tool_result.content.clone(),
            is_error: tool_result.is_error.then_some(true),
        },
    }
}

/// Folds a wire response into the IR. Unknown stop reasons map to text
/// responses so the turn cycle always terminates cleanly.
pub(crate) fn from_wire_response(wire: WireResponse) -> Result<ChatResponse, LocandaError> {
    let stop_reason = wire.stop_reason.unwrap_or_default();
    let kind = if stop_reason == "tool_use" {
        ResponseKind::ToolUse
    } else {
        ResponseKind::Text
    };

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in wire.content {
        match block {
            WireResponseBlock::Text { text: t } => text.push_str(&t),
            WireResponseBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                id,
                name,
                arguments: input,
            }),
        }
    }

    if kind == ResponseKind::ToolUse && tool_calls.is_empty() {
        return Err(LocandaError::provider(
            "stop_reason is tool_use but the response carries no tool calls",
        ));
    }

    Ok(ChatResponse {
        kind,
        text,
        tool_calls,
        usage: Usage {
            input_tokens: wire.usage.input_tokens,
            output_tokens: wire.usage.output_tokens,
        },
        stop_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use locanda_core::{Message, ToolDef, ToolResult};

    #[test]
    fn request_serializes_tool_result_block() {
        let request = ChatRequest {
            system: "sys".into(),
            messages: vec![Message::tool_results(vec![ToolResult {
                tool_call_id: "c1".into(),
                content: "ok".into(),
                is_error: false,
            }])],
            tools: vec![],
        };
        let wire = to_wire_request(&request, "claude-sonnet-4-20250514", 1024);
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"][0]["type"], "tool_result");
        assert_eq!(json["messages"][0]["content"][0]["tool_use_id"], "c1");
        assert!(json["messages"][0]["content"][0].get("is_error").is_none());
        assert!(json.get("tools").is_none());
    }

    #[test]
    fn request_marks_failed_tool_results() {
        let request = ChatRequest {
            system: String::new(),
            messages: vec![Message::tool_results(vec![ToolResult {
                tool_call_id: "c2".into(),
                content: "exploded".into(),
                is_error: true,
            }])],
            tools: vec![],
        };
        let wire = to_wire_request(&request, "m", 10);
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["messages"][0]["content"][0]["is_error"], true);
        assert!(json.get("system").is_none());
    }

    #[test]
    fn request_serializes_tools() {
        let request = ChatRequest {
            system: String::new(),
            messages: vec![],
            tools: vec![ToolDef {
                name: "execute_sql".into(),
                description: "Run SQL".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {"query": {"type": "string"}},
                    "required": ["query"]
                }),
            }],
        };
        let wire = to_wire_request(&request, "m", 10);
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["tools"][0]["name"], "execute_sql");
        assert!(json["tools"][0]["input_schema"]["properties"]["query"].is_object());
    }

    #[test]
    fn response_with_end_turn_is_text() {
        let wire: WireResponse = serde_json::from_value(serde_json::json!({
            "content": [{"type": "text", "text": "hello "}, {"type": "text", "text": "there"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 4, "output_tokens": 2}
        }))
        .unwrap();
        let resp = from_wire_response(wire).unwrap();
        assert_eq!(resp.kind, ResponseKind::Text);
        assert_eq!(resp.text, "hello there");
        assert_eq!(resp.usage.input_tokens, 4);
    }

    #[test]
    fn response_with_tool_use_collects_calls_in_order() {
        let wire: WireResponse = serde_json::from_value(serde_json::json!({
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "a", "name": "read_schema", "input": {}},
                {"type": "tool_use", "id": "b", "name": "execute_sql", "input": {"query": "SELECT 1"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 9, "output_tokens": 7}
        }))
        .unwrap();
        let resp = from_wire_response(wire).unwrap();
        assert_eq!(resp.kind, ResponseKind::ToolUse);
        let ids: Vec<&str> = resp.tool_calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn tool_use_without_calls_is_an_error() {
        let wire: WireResponse = serde_json::from_value(serde_json::json!({
            "content": [],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 1, "output_tokens": 1}
        }))
        .unwrap();
        assert!(from_wire_response(wire).is_err());
    }

    #[test]
    fn unknown_stop_reason_maps_to_text() {
        let wire: WireResponse = serde_json::from_value(serde_json::json!({
            "content": [{"type": "text", "text": "partial"}],
            "stop_reason": "max_tokens",
            "usage": {"input_tokens": 1, "output_tokens": 1}
        }))
        .unwrap();
        let resp = from_wire_response(wire).unwrap();
        assert_eq!(resp.kind, ResponseKind::Text);
        assert_eq!(resp.stop_reason, "max_tokens");
    }
}
