// crates/engine/src/service.rs
//! Cross-provider facade.
//!
//! One task per provider finder; results are merged only after every task
//! has finished. Detail parsing is a single bounded read and stays
//! synchronous.

use crate::error::DiscoveryError;
use crate::providers::{provider_adapter, sort_newest_first, ScopeHint};
use agent_view_types::{Provider, SessionDetail, SessionSummary};
use tokio::task::JoinSet;
use tracing::debug;

pub struct SessionService;

impl SessionService {
    pub fn new() -> Result<Self, DiscoveryError> {
        dirs::home_dir()
            .map(|_| Self)
            .ok_or(DiscoveryError::HomeDirNotFound)
    }

    /// Sessions across all providers, most recently updated first.
    /// A provider whose scan fails contributes nothing; it never aborts
    /// the batch.
    pub async fn list_sessions(&self, scope: &ScopeHint) -> Vec<SessionSummary> {
        let mut set = JoinSet::new();
        for provider in Provider::ALL {
            let scope = scope.clone();
            set.spawn(async move {
                provider_adapter(provider).list_sessions(&scope).await
            });
        }

        let mut summaries = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(batch) => summaries.extend(batch),
                Err(err) => debug!("provider scan task failed: {err}"),
            }
        }
        sort_newest_first(&mut summaries);
        summaries
    }

    /// Full parse of one session. `None` means the session does not
    /// resolve for that provider.
    pub async fn session_detail(
        &self,
        provider: Provider,
        session_id: &str,
    ) -> Option<SessionDetail> {
        let adapter = provider_adapter(provider);
        let location = adapter.find_session(session_id).await?;
        adapter.parse(&location).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    const ALL_ROOT_VARS: [&str; 8] = [
        "AGENT_VIEW_CLAUDE_CODE_ROOT",
        "AGENT_VIEW_CODEX_ROOT",
        "AGENT_VIEW_GEMINI_ROOT",
        "AGENT_VIEW_OPENCODE_ROOT",
        "AGENT_VIEW_AMP_ROOT",
        "AGENT_VIEW_JUNIE_ROOT",
        "AGENT_VIEW_GOOSE_ROOT",
        "AGENT_VIEW_PI_ROOT",
    ];

    fn point_all_roots_at_nothing() {
        for var in ALL_ROOT_VARS {
            std::env::set_var(var, "/nonexistent/agent-view-test");
        }
    }

    fn clear_all_roots() {
        for var in ALL_ROOT_VARS {
            std::env::remove_var(var);
        }
    }

    #[tokio::test]
    #[serial(
        claude_code_root,
        codex_root,
        gemini_root,
        opencode_root,
        amp_root,
        junie_root,
        goose_root,
        pi_root
    )]
    async fn merges_across_providers_and_parses_detail() {
        point_all_roots_at_nothing();

        let goose_root = TempDir::new().unwrap();
        tokio::fs::write(
            goose_root.path().join("g1.jsonl"),
            [
                r#"{"description":"Goose session","working_dir":"/work/proj"}"#,
                r#"{"role":"user","created":1755600000,"content":[{"type":"text","text":"hi goose"}]}"#,
            ]
            .join("\n"),
        )
        .await
        .unwrap();
        std::env::set_var("AGENT_VIEW_GOOSE_ROOT", goose_root.path());

        let pi_root = TempDir::new().unwrap();
        let pi_dir = pi_root.path().join("-work-proj");
        tokio::fs::create_dir_all(&pi_dir).await.unwrap();
        tokio::fs::write(
            pi_dir.join("20260501T120000_p1.jsonl"),
            [
                r#"{"type":"session","id":"p1","timestamp":"2026-05-01T12:00:00Z","cwd":"/work/proj"}"#,
                r#"{"type":"message","message":{"role":"user","content":[{"type":"text","text":"hi pi"}]}}"#,
            ]
            .join("\n"),
        )
        .await
        .unwrap();
        std::env::set_var("AGENT_VIEW_PI_ROOT", pi_root.path());

        let service = SessionService::new().unwrap();
        let all = service.list_sessions(&ScopeHint::any()).await;
        assert_eq!(all.len(), 2);
        let providers: Vec<Provider> = all.iter().map(|s| s.provider).collect();
        assert!(providers.contains(&Provider::Goose));
        assert!(providers.contains(&Provider::Pi));
        // newest first, unknown timestamps last
        assert!(all.windows(2).all(|w| w[0].updated_at >= w[1].updated_at));

        let detail = service
            .session_detail(Provider::Pi, "p1")
            .await
            .expect("pi session resolves");
        assert_eq!(detail.title, "hi pi");
        assert_eq!(detail.messages.len(), 1);

        assert!(service
            .session_detail(Provider::Goose, "missing")
            .await
            .is_none());

        clear_all_roots();
    }

    #[tokio::test]
    #[serial(
        claude_code_root,
        codex_root,
        gemini_root,
        opencode_root,
        amp_root,
        junie_root,
        goose_root,
        pi_root
    )]
    async fn empty_everywhere_is_an_empty_list() {
        point_all_roots_at_nothing();
        let service = SessionService::new().unwrap();
        assert!(service.list_sessions(&ScopeHint::any()).await.is_empty());
        clear_all_roots();
    }
}
