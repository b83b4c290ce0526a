//! Prints every discovered session across all providers.
//!
//! ```sh
//! RUST_LOG=agent_view_engine=debug cargo run --example list_sessions
//! ```

use agent_view_engine::{ScopeHint, SessionService};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let service = SessionService::new()?;
    let sessions = service.list_sessions(&ScopeHint::any()).await;

    println!("{} session(s)", sessions.len());
    for session in &sessions {
        let updated = session
            .updated_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "{:12} {:24} {}  {}",
            session.provider.to_string(),
            session.session_id,
            updated,
            session.title
        );
    }
    Ok(())
}
