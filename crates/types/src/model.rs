// crates/types/src/model.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the eight supported AI coding-assistant CLIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    ClaudeCode,
    Codex,
    Gemini,
    // kebab-case would split this into "open-code"; the wire name is the slug
    #[serde(rename = "opencode")]
    OpenCode,
    Amp,
    Junie,
    Goose,
    Pi,
}

impl Provider {
    pub const ALL: [Provider; 8] = [
        Provider::ClaudeCode,
        Provider::Codex,
        Provider::Gemini,
        Provider::OpenCode,
        Provider::Amp,
        Provider::Junie,
        Provider::Goose,
        Provider::Pi,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::ClaudeCode => "Claude Code",
            Provider::Codex => "Codex",
            Provider::Gemini => "Gemini CLI",
            Provider::OpenCode => "OpenCode",
            Provider::Amp => "Amp",
            Provider::Junie => "Junie",
            Provider::Goose => "Goose",
            Provider::Pi => "Pi",
        }
    }

    /// Stable identifier used in paths and wire payloads.
    pub fn slug(&self) -> &'static str {
        match self {
            Provider::ClaudeCode => "claude-code",
            Provider::Codex => "codex",
            Provider::Gemini => "gemini",
            Provider::OpenCode => "opencode",
            Provider::Amp => "amp",
            Provider::Junie => "junie",
            Provider::Goose => "goose",
            Provider::Pi => "pi",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.slug() == s)
            .ok_or_else(|| format!("unknown provider: {s}"))
    }
}

/// A piece of message content. Escaping happens at render time, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: String,
    },
    Code {
        code: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
    Markdown {
        markdown: String,
    },
    /// Raw JSON payload kept verbatim for undecodable or unexpected shapes.
    Json {
        json: String,
    },
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn code(code: impl Into<String>, language: Option<String>) -> Self {
        Self::Code {
            code: code.into(),
            language,
        }
    }

    pub fn markdown(markdown: impl Into<String>) -> Self {
        Self::Markdown {
            markdown: markdown.into(),
        }
    }

    pub fn json(json: impl Into<String>) -> Self {
        Self::Json { json: json.into() }
    }

    /// The inner string, regardless of kind.
    pub fn as_text(&self) -> &str {
        match self {
            MessageContent::Text { text } => text,
            MessageContent::Code { code, .. } => code,
            MessageContent::Markdown { markdown } => markdown,
            MessageContent::Json { json } => json,
        }
    }
}

/// Visual weight of an `Info` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InfoStyle {
    #[default]
    Default,
    Error,
}

/// A tool result, either standalone (orphan) or nested under its `ToolUse`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub output: Vec<MessageContent>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ToolResultData {
    pub fn new(output: Vec<MessageContent>) -> Self {
        Self {
            tool_name: None,
            tool_call_id: None,
            output,
            is_error: false,
            timestamp: None,
        }
    }

    pub fn with_tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name = Some(name.into());
        self
    }

    pub fn with_tool_call_id(mut self, id: impl Into<String>) -> Self {
        self.tool_call_id = Some(id.into());
        self
    }

    pub fn with_error(mut self, is_error: bool) -> Self {
        self.is_error = is_error;
        self
    }

    pub fn with_timestamp(mut self, ts: Option<DateTime<Utc>>) -> Self {
        self.timestamp = ts;
        self
    }
}

/// One timeline entry in a parsed session.
///
/// Closed union: every provider maps its records onto exactly these
/// variants. Each variant carries its own timestamp (`None` = unknown;
/// epoch zero is never used as a sentinel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParsedMessage {
    User {
        content: Vec<MessageContent>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
    AssistantText {
        content: Vec<MessageContent>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
    AssistantThinking {
        thinking: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
    ToolUse {
        tool_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
        /// Ordered key/value rendering of the invocation input.
        input: Vec<(String, String)>,
        /// Results merged in by the correlator; each keeps its own timestamp.
        results: Vec<ToolResultData>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
    ToolResult(ToolResultData),
    Info {
        title: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        subtitle: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<MessageContent>,
        #[serde(default)]
        style: InfoStyle,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
}

impl ParsedMessage {
    pub fn user(content: Vec<MessageContent>) -> Self {
        Self::User {
            content,
            timestamp: None,
        }
    }

    pub fn assistant_text(content: Vec<MessageContent>) -> Self {
        Self::AssistantText {
            content,
            timestamp: None,
        }
    }

    pub fn assistant_thinking(thinking: impl Into<String>) -> Self {
        Self::AssistantThinking {
            thinking: thinking.into(),
            timestamp: None,
        }
    }

    pub fn tool_use(tool_name: impl Into<String>, input: Vec<(String, String)>) -> Self {
        Self::ToolUse {
            tool_name: tool_name.into(),
            tool_call_id: None,
            input,
            results: Vec::new(),
            timestamp: None,
        }
    }

    pub fn tool_result(data: ToolResultData) -> Self {
        Self::ToolResult(data)
    }

    pub fn info(title: impl Into<String>) -> Self {
        Self::Info {
            title: title.into(),
            subtitle: None,
            content: None,
            style: InfoStyle::Default,
            timestamp: None,
        }
    }

    pub fn error_info(title: impl Into<String>, content: Option<MessageContent>) -> Self {
        Self::Info {
            title: title.into(),
            subtitle: None,
            content,
            style: InfoStyle::Error,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, ts: Option<DateTime<Utc>>) -> Self {
        match &mut self {
            ParsedMessage::User { timestamp, .. }
            | ParsedMessage::AssistantText { timestamp, .. }
            | ParsedMessage::AssistantThinking { timestamp, .. }
            | ParsedMessage::ToolUse { timestamp, .. }
            | ParsedMessage::Info { timestamp, .. } => *timestamp = ts,
            ParsedMessage::ToolResult(data) => data.timestamp = ts,
        }
        self
    }

    pub fn with_tool_call_id(mut self, id: impl Into<String>) -> Self {
        match &mut self {
            ParsedMessage::ToolUse { tool_call_id, .. } => *tool_call_id = Some(id.into()),
            ParsedMessage::ToolResult(data) => data.tool_call_id = Some(id.into()),
            _ => {}
        }
        self
    }

    pub fn with_subtitle(mut self, text: impl Into<String>) -> Self {
        if let ParsedMessage::Info { subtitle, .. } = &mut self {
            *subtitle = Some(text.into());
        }
        self
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            ParsedMessage::User { timestamp, .. }
            | ParsedMessage::AssistantText { timestamp, .. }
            | ParsedMessage::AssistantThinking { timestamp, .. }
            | ParsedMessage::ToolUse { timestamp, .. }
            | ParsedMessage::Info { timestamp, .. } => *timestamp,
            ParsedMessage::ToolResult(data) => data.timestamp,
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            ParsedMessage::User { .. } => "user",
            ParsedMessage::AssistantText { .. } => "assistant",
            ParsedMessage::AssistantThinking { .. } => "thinking",
            ParsedMessage::ToolUse { .. } => "tool_use",
            ParsedMessage::ToolResult(_) => "tool_result",
            ParsedMessage::Info { .. } => "info",
        }
    }
}

/// Per-model invocation count, ranked by count descending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub model: String,
    pub count: usize,
}

impl ModelUsage {
    /// Rank `(model, count)` pairs by count descending. Ties keep the
    /// first-seen order of the input (stable sort).
    pub fn ranked(first_seen: Vec<(String, usize)>) -> Vec<ModelUsage> {
        let mut usage: Vec<ModelUsage> = first_seen
            .into_iter()
            .map(|(model, count)| ModelUsage { model, count })
            .collect();
        usage.sort_by(|a, b| b.count.cmp(&a.count));
        usage
    }
}

/// Session-level metadata collected during a full parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_count: Option<usize>,
    #[serde(default)]
    pub model_usage: Vec<ModelUsage>,
}

/// Lightweight listing entry produced by a finder scan, without a full parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Provider-scoped identifier; not globally unique.
    pub session_id: String,
    pub title: String,
    pub provider: Provider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Absent when the provider cannot compute it without a full parse.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_count: Option<usize>,
}

/// A fully parsed session: ordered messages plus optional metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
    pub session_id: String,
    pub title: String,
    pub messages: Vec<ParsedMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SessionMetadata>,
}

impl SessionDetail {
    pub fn new(session_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            title: title.into(),
            messages: Vec::new(),
            metadata: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn provider_slug_round_trip() {
        for p in Provider::ALL {
            assert_eq!(p.slug().parse::<Provider>().unwrap(), p);
        }
        assert!("not-a-provider".parse::<Provider>().is_err());
    }

    #[test]
    fn provider_serde_uses_kebab_case() {
        assert_eq!(
            serde_json::to_string(&Provider::ClaudeCode).unwrap(),
            "\"claude-code\""
        );
        assert_eq!(
            serde_json::from_str::<Provider>("\"opencode\"").unwrap(),
            Provider::OpenCode
        );
    }

    #[test]
    fn provider_wire_name_matches_slug_for_every_variant() {
        for p in Provider::ALL {
            let wire = serde_json::to_value(p).unwrap();
            assert_eq!(wire, serde_json::json!(p.slug()));
            assert_eq!(serde_json::from_value::<Provider>(wire).unwrap(), p);
        }
    }

    #[test]
    fn message_builders_set_timestamp_everywhere() {
        let ts = Some(Utc::now());
        let msgs = vec![
            ParsedMessage::user(vec![MessageContent::text("hi")]).with_timestamp(ts),
            ParsedMessage::assistant_text(vec![]).with_timestamp(ts),
            ParsedMessage::assistant_thinking("hm").with_timestamp(ts),
            ParsedMessage::tool_use("Bash", vec![]).with_timestamp(ts),
            ParsedMessage::tool_result(ToolResultData::new(vec![])).with_timestamp(ts),
            ParsedMessage::info("done").with_timestamp(ts),
        ];
        for m in &msgs {
            assert_eq!(m.timestamp(), ts);
        }
    }

    #[test]
    fn serialization_omits_absent_fields() {
        let json = serde_json::to_string(&ParsedMessage::user(vec![])).unwrap();
        assert!(!json.contains("timestamp"));

        let json = serde_json::to_string(&ToolResultData::new(vec![])).unwrap();
        assert!(!json.contains("tool_call_id"));
        assert!(!json.contains("tool_name"));
    }

    #[test]
    fn content_as_text_covers_all_kinds() {
        assert_eq!(MessageContent::text("a").as_text(), "a");
        assert_eq!(MessageContent::code("b", None).as_text(), "b");
        assert_eq!(MessageContent::markdown("c").as_text(), "c");
        assert_eq!(MessageContent::json("{}").as_text(), "{}");
    }

    #[test]
    fn model_usage_ranked_by_count_then_first_seen() {
        let ranked = ModelUsage::ranked(vec![
            ("sonnet".into(), 2),
            ("haiku".into(), 5),
            ("opus".into(), 2),
        ]);
        let order: Vec<&str> = ranked.iter().map(|u| u.model.as_str()).collect();
        assert_eq!(order, vec!["haiku", "sonnet", "opus"]);
    }

    #[test]
    fn parsed_message_json_is_tagged() {
        let msg = ParsedMessage::tool_use("Read", vec![("file".into(), "a.rs".into())])
            .with_tool_call_id("t1");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], "tool_use");
        assert_eq!(json["tool_name"], "Read");
        assert_eq!(json["tool_call_id"], "t1");
    }
}
