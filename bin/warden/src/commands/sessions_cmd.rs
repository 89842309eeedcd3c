use std::path::PathBuf;
use std::sync::Arc;
use warden_storage::SessionArchive;

/// Print recorded sessions, newest first.
pub async fn show(limit: usize, json: bool, state: Option<PathBuf>) -> anyhow::Result<()> {
    let store = Arc::new(super::open_store(state));
    let sessions = SessionArchive::new(store).load_all().await?;
    let shown = &sessions[..sessions.len().min(limit)];

    if json {
        println!("{}", serde_json::to_string_pretty(shown)?);
        return Ok(());
    }

    if shown.is_empty() {
        println!("(No recorded sessions)");
        return Ok(());
    }

    println!("📋 Sessions ({} of {})", shown.len(), sessions.len());
    println!();
    for session in shown {
        let duration = match session.duration {
            Some(secs) => format!("{secs}s"),
            None => "-".to_string(),
        };
        println!(
            "  [{}] {}  started {}  duration {}  screenshots {}  urls {}",
            session.status,
            session.id,
            session.start_time.format("%Y-%m-%d %H:%M:%S"),
            duration,
            session.screenshot_count,
            session.visited_urls.len(),
        );
        println!("      {} ({})", session.tab_title, session.tab_url);
    }

    Ok(())
}
