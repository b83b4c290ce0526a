// crates/engine/src/providers/mod.rs
//! Per-provider session finders and parsers.
//!
//! Each of the eight providers has its own on-disk storage convention; the
//! adapters here hide that behind two traits and an enum dispatch table.
//! All adapters are read-only and isolate failures at the smallest unit:
//! a missing root is an empty listing, an unreadable candidate is skipped,
//! and a malformed record inside a session becomes a visible message.

pub mod amp;
pub mod claude_code;
pub mod codex;
pub mod gemini;
pub mod goose;
pub mod junie;
pub mod opencode;
pub mod pi;

use crate::classify::is_markdown;
use crate::error::ParseError;
use agent_view_types::{MessageContent, ParsedMessage, Provider, SessionDetail, SessionSummary};
use async_trait::async_trait;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

/// Optional filter narrowing a listing to sessions recorded for one
/// working directory (project).
#[derive(Debug, Clone, Default)]
pub struct ScopeHint {
    pub working_directory: Option<PathBuf>,
}

impl ScopeHint {
    /// No filtering: every session the provider knows about.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn for_directory(dir: impl Into<PathBuf>) -> Self {
        Self {
            working_directory: Some(dir.into()),
        }
    }

    /// Whether a session recorded under `session_dir` falls in scope.
    /// Sessions whose working directory is unknown only match the
    /// unfiltered scope.
    pub fn matches(&self, session_dir: Option<&str>) -> bool {
        match &self.working_directory {
            None => true,
            Some(want) => session_dir
                .map(|dir| Path::new(dir) == want.as_path())
                .unwrap_or(false),
        }
    }
}

/// Where a session lives on disk. `path` is a file or a directory
/// depending on the provider's layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLocation {
    pub provider: Provider,
    pub session_id: String,
    pub path: PathBuf,
}

/// Locates candidate sessions without fully parsing them.
#[async_trait]
pub trait SessionFinder: Send + Sync {
    async fn list_sessions(&self, scope: &ScopeHint) -> Vec<SessionSummary>;
    async fn find_session(&self, session_id: &str) -> Option<SessionLocation>;
}

/// Reads one session's full content into the canonical model.
/// `None` means "session not found" (unreadable root or failed shape
/// check); anything less severe degrades inside the message list.
#[async_trait]
pub trait SessionParser: Send + Sync {
    async fn parse(&self, location: &SessionLocation) -> Option<SessionDetail>;
}

pub trait ProviderAdapter: SessionFinder + SessionParser {}
impl<T: SessionFinder + SessionParser> ProviderAdapter for T {}

/// Enum dispatch table. One static adapter per provider; no class
/// hierarchy, each implementation self-contained.
pub fn provider_adapter(provider: Provider) -> &'static dyn ProviderAdapter {
    match provider {
        Provider::ClaudeCode => &claude_code::ClaudeCode,
        Provider::Codex => &codex::Codex,
        Provider::Gemini => &gemini::Gemini,
        Provider::OpenCode => &opencode::OpenCode,
        Provider::Amp => &amp::Amp,
        Provider::Junie => &junie::Junie,
        Provider::Goose => &goose::Goose,
        Provider::Pi => &pi::Pi,
    }
}

/// Provider storage root: an env override (test seam) or the fixed
/// location under the home directory.
pub(crate) fn provider_root(env_var: &str, relative: &[&str]) -> Option<PathBuf> {
    if let Ok(root) = std::env::var(env_var) {
        if !root.is_empty() {
            return Some(PathBuf::from(root));
        }
    }
    let mut path = dirs::home_dir()?;
    for segment in relative {
        path.push(segment);
    }
    Some(path)
}

/// Fixed-size worker pool for one finder scan: one task per candidate,
/// results collected only after every task finishes. A task yielding
/// `None` (failed shape check, unreadable file) is filtered out.
pub(crate) const SCAN_WORKERS: usize = 4;

pub(crate) async fn scan_candidates<T, Fut>(
    candidates: Vec<T>,
    task: impl Fn(T) -> Fut,
) -> Vec<SessionSummary>
where
    T: Send + 'static,
    Fut: Future<Output = Option<SessionSummary>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(SCAN_WORKERS));
    let mut set = JoinSet::new();
    for candidate in candidates {
        let semaphore = semaphore.clone();
        let fut = task(candidate);
        set.spawn(async move {
            let _permit = semaphore.acquire().await.ok()?;
            fut.await
        });
    }

    let mut summaries = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Some(summary)) => summaries.push(summary),
            Ok(None) => {}
            Err(err) => debug!("session scan task failed: {err}"),
        }
    }
    summaries
}

/// Most recently updated first; sessions with no known update time last.
pub(crate) fn sort_newest_first(summaries: &mut [SessionSummary]) {
    summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}

/// Read a file into trimmed lines, classifying root-level IO failures.
pub(crate) async fn read_lines(path: &Path) -> Result<Vec<String>, ParseError> {
    let file = File::open(path).await.map_err(|e| ParseError::io(path, e))?;
    let mut reader = BufReader::new(file).lines();
    let mut lines = Vec::new();
    while let Some(line) = reader
        .next_line()
        .await
        .map_err(|e| ParseError::io(path, e))?
    {
        lines.push(line);
    }
    Ok(lines)
}

/// Free assistant/user text, classified Markdown vs plain.
pub(crate) fn classified_text(text: &str) -> MessageContent {
    if is_markdown(text) {
        MessageContent::markdown(text)
    } else {
        MessageContent::text(text)
    }
}

/// Visible stand-in for a record that failed to decode. The raw unit is
/// kept verbatim so the user auditing history never sees a silent gap.
pub(crate) fn malformed_record(unit: &str, raw: &str) -> ParsedMessage {
    ParsedMessage::error_info(
        format!("Unreadable {unit}"),
        Some(MessageContent::json(raw.to_string())),
    )
}

/// Best-effort session title: first non-blank line of `text`, capped at
/// 80 chars on a char boundary.
pub(crate) fn title_from_text(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut title: String = line.chars().take(80).collect();
    if line.chars().count() > 80 {
        title.push('…');
    }
    Some(title)
}

/// First non-empty user text in an already-parsed sequence, for providers
/// whose stores carry no explicit title.
pub(crate) fn derive_title(messages: &[ParsedMessage], fallback: &str) -> String {
    messages
        .iter()
        .find_map(|m| match m {
            ParsedMessage::User { content, .. } => content
                .iter()
                .map(|c| c.as_text())
                .find(|t| !t.trim().is_empty())
                .and_then(title_from_text),
            _ => None,
        })
        .unwrap_or_else(|| fallback.to_string())
}

/// Ordered key/value rendering of a tool input object. Non-string values
/// are serialized compactly; everything is bounded by the output budget.
pub(crate) fn input_pairs(input: Option<&serde_json::Value>) -> Vec<(String, String)> {
    let Some(serde_json::Value::Object(map)) = input else {
        return match input {
            Some(v) if !v.is_null() => {
                vec![("input".to_string(), crate::truncate::truncate_output(&v.to_string()))]
            }
            _ => Vec::new(),
        };
    };
    map.iter()
        .map(|(k, v)| {
            let rendered = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), crate::truncate::truncate_output(&rendered))
        })
        .collect()
}

/// Local per-parse accumulator of model ids. Folded into
/// `SessionMetadata.model_usage` at the end of the parse; no shared or
/// static counters anywhere.
#[derive(Debug, Default)]
pub(crate) struct ModelCounter {
    first_seen: Vec<(String, usize)>,
}

impl ModelCounter {
    pub(crate) fn record(&mut self, model: &str) {
        if model.is_empty() {
            return;
        }
        match self.first_seen.iter_mut().find(|(m, _)| m == model) {
            Some((_, count)) => *count += 1,
            None => self.first_seen.push((model.to_string(), 1)),
        }
    }

    pub(crate) fn into_usage(self) -> Vec<agent_view_types::ModelUsage> {
        agent_view_types::ModelUsage::ranked(self.first_seen)
    }
}
