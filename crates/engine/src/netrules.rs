use std::collections::HashSet;
use tracing::debug;
use warden_core::{GovernancePolicy, NetRule, Result};

use crate::host::Host;

/// Fixed rule ids, matching the original extension's dynamic-rule slots.
pub const RULE_DISALLOW_CLICKABLE_URLS: u32 = 1000;
pub const RULE_DISALLOW_QUERY_PARAMS: u32 = 1001;

fn clickable_urls_rule() -> NetRule {
    NetRule {
        id: RULE_DISALLOW_CLICKABLE_URLS,
        priority: 1,
        regex_filter: Some("^https?://".to_string()),
        url_filter: None,
    }
}

fn query_params_rule() -> NetRule {
    NetRule {
        id: RULE_DISALLOW_QUERY_PARAMS,
        priority: 1,
        regex_filter: None,
        url_filter: Some("|http*://*?*".to_string()),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleDiff {
    pub add: Vec<NetRule>,
    pub remove: Vec<u32>,
}

impl RuleDiff {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Minimal diff between the desired rule set (from policy flags) and the
/// rules currently installed in the host.
pub fn reconcile(policy: &GovernancePolicy, installed: &HashSet<u32>) -> RuleDiff {
    let mut diff = RuleDiff::default();

    for (enabled, rule) in [
        (policy.disallow_clickable_urls, clickable_urls_rule()),
        (policy.disallow_query_params, query_params_rule()),
    ] {
        if enabled && !installed.contains(&rule.id) {
            diff.add.push(rule);
        } else if !enabled && installed.contains(&rule.id) {
            diff.remove.push(rule.id);
        }
    }

    diff
}

/// Reconcile and apply as one atomic host update. Repeated calls with an
/// unchanged policy issue no update at all.
pub async fn sync(host: &dyn Host, policy: &GovernancePolicy) -> Result<()> {
    let installed: HashSet<u32> = host.installed_net_rules().await?.into_iter().collect();
    let diff = reconcile(policy, &installed);
    if diff.is_empty() {
        debug!("Network rules already match policy");
        return Ok(());
    }
    debug!(add = diff.add.len(), remove = diff.remove.len(), "Updating network rules");
    host.update_net_rules(diff.add, diff.remove).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_only_missing_rules() {
        let policy = GovernancePolicy {
            disallow_clickable_urls: true,
            disallow_query_params: true,
        };
        let installed = HashSet::from([RULE_DISALLOW_CLICKABLE_URLS]);

        let diff = reconcile(&policy, &installed);
        assert_eq!(diff.add.len(), 1);
        assert_eq!(diff.add[0].id, RULE_DISALLOW_QUERY_PARAMS);
        assert!(diff.remove.is_empty());
    }

    #[test]
    fn removes_rules_for_disabled_flags() {
        let policy = GovernancePolicy::default();
        let installed = HashSet::from([RULE_DISALLOW_CLICKABLE_URLS, RULE_DISALLOW_QUERY_PARAMS]);

        let diff = reconcile(&policy, &installed);
        assert!(diff.add.is_empty());
        let mut removed = diff.remove.clone();
        removed.sort_unstable();
        assert_eq!(
            removed,
            vec![RULE_DISALLOW_CLICKABLE_URLS, RULE_DISALLOW_QUERY_PARAMS]
        );
    }

    #[test]
    fn settled_state_yields_empty_diff() {
        let policy = GovernancePolicy {
            disallow_clickable_urls: true,
            disallow_query_params: false,
        };
        let installed = HashSet::from([RULE_DISALLOW_CLICKABLE_URLS]);
        assert!(reconcile(&policy, &installed).is_empty());
    }
}
