use std::path::PathBuf;
use warden_core::{HostnamePairRule, UrlPairRule};
use warden_engine::{evaluate, Verdict};
use warden_storage::{keys, KeyValueStore};

/// Evaluate a candidate navigation against the persisted rules and exit
/// non-zero when it would be blocked.
pub async fn check(url: &str, visited: Vec<String>, state: Option<PathBuf>) -> anyhow::Result<()> {
    let store = super::open_store(state);
    let stored = store
        .get(&[keys::HOSTNAME_PAIR_RULES, keys::URL_PAIR_RULES])
        .await?;

    let hostname_rules: Vec<HostnamePairRule> = stored
        .get(keys::HOSTNAME_PAIR_RULES)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();
    let url_pair_rules: Vec<UrlPairRule> = stored
        .get(keys::URL_PAIR_RULES)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

    match evaluate(url, &visited, &hostname_rules, &url_pair_rules) {
        Verdict::Allowed => {
            println!("✅ Allowed: {url}");
            Ok(())
        }
        Verdict::Blocked {
            reason,
            conflicting_url,
        } => {
            println!("⛔ Blocked: {reason}");
            if let Some(conflict) = conflicting_url {
                println!("   conflicting visited URL: {conflict}");
            }
            std::process::exit(1);
        }
    }
}
