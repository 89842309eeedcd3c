use warden_core::types::hostname;
use warden_core::{HostnamePairRule, UrlPairRule};

/// Outcome of a governance check for one candidate navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Blocked {
        reason: String,
        /// The visited URL whose lingering context caused the block, when
        /// one specific URL is to blame.
        conflicting_url: Option<String>,
    },
}

impl Verdict {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Verdict::Blocked { .. })
    }
}

/// `true` if the pattern is the empty wildcard, the hostname itself, or a
/// parent domain of it ("a.bank.com" matches "bank.com").
pub fn matches_hostname(hostname: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return true;
    }
    hostname == pattern || hostname.ends_with(&format!(".{pattern}"))
}

/// Pure block/allow decision for a candidate navigation given the URLs the
/// session has already visited. Rules are checked in fixed precedence,
/// first match wins:
///
/// 1. exclusive-domain guard: ("", D) blocks entering D once the session
///    holds context from outside D. Deliberately directional: it is only
///    checked from the candidate side, unlike the sticky-domain guard.
/// 2. sticky-domain (D, "") and pairwise (D1, D2) hostname exclusion
///    against each visited URL.
/// 3. exact URL-pair exclusion.
pub fn evaluate(
    candidate_url: &str,
    visited_urls: &[String],
    hostname_rules: &[HostnamePairRule],
    url_pair_rules: &[UrlPairRule],
) -> Verdict {
    let Some(candidate_host) = hostname(candidate_url) else {
        return Verdict::Allowed;
    };

    for HostnamePairRule(domain1, domain2) in hostname_rules {
        if domain1.is_empty()
            && matches_hostname(&candidate_host, domain2)
            && visited_urls.iter().any(|url| {
                hostname(url).is_some_and(|h| !matches_hostname(&h, domain2))
            })
        {
            return Verdict::Blocked {
                reason: format!("Use of Agent mode is not allowed in {candidate_host}."),
                conflicting_url: None,
            };
        }
    }

    for visited_url in visited_urls {
        let Some(visited_host) = hostname(visited_url) else {
            continue;
        };
        for HostnamePairRule(domain1, domain2) in hostname_rules {
            if domain2.is_empty() && matches_hostname(&visited_host, domain1) {
                return Verdict::Blocked {
                    reason: format!(
                        "Context from {visited_host} cannot persist in other URLs. \
                         Please start a new chat."
                    ),
                    conflicting_url: Some(visited_url.clone()),
                };
            }

            if !domain1.is_empty() && !domain2.is_empty() {
                let forward = matches_hostname(&visited_host, domain1)
                    && matches_hostname(&candidate_host, domain2);
                let backward = matches_hostname(&visited_host, domain2)
                    && matches_hostname(&candidate_host, domain1);
                if forward || backward {
                    return Verdict::Blocked {
                        reason: format!(
                            "Navigation to {candidate_host} is blocked because context from \
                             {visited_host} persists. Please start a new chat."
                        ),
                        conflicting_url: Some(visited_url.clone()),
                    };
                }
            }
        }
    }

    for visited_url in visited_urls {
        for UrlPairRule(url1, url2) in url_pair_rules {
            let forward = candidate_url == url2 && visited_url == url1;
            let backward = candidate_url == url1 && visited_url == url2;
            if forward || backward {
                let visited_host = hostname(visited_url).unwrap_or_default();
                return Verdict::Blocked {
                    reason: format!(
                        "Navigation to {candidate_host} is blocked because context from \
                         {visited_host} persists. Please start a new chat."
                    ),
                    conflicting_url: Some(visited_url.clone()),
                };
            }
        }
    }

    Verdict::Allowed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(pairs: &[(&str, &str)]) -> Vec<HostnamePairRule> {
        pairs
            .iter()
            .map(|(a, b)| HostnamePairRule(a.to_string(), b.to_string()))
            .collect()
    }

    fn visited(urls: &[&str]) -> Vec<String> {
        urls.iter().map(|u| u.to_string()).collect()
    }

    #[test]
    fn hostname_matching_rules() {
        assert!(matches_hostname("bank.com", ""));
        assert!(matches_hostname("bank.com", "bank.com"));
        assert!(matches_hostname("secure.bank.com", "bank.com"));
        assert!(!matches_hostname("notbank.com", "bank.com"));
        assert!(!matches_hostname("bank.com", "secure.bank.com"));
    }

    #[test]
    fn empty_inputs_allow_everything() {
        let verdict = evaluate("https://anywhere.com", &[], &[], &[]);
        assert_eq!(verdict, Verdict::Allowed);
    }

    #[test]
    fn unparseable_candidate_is_allowed() {
        let verdict = evaluate("not a url", &visited(&["https://a.com"]), &rules(&[("", "")]), &[]);
        assert_eq!(verdict, Verdict::Allowed);
    }

    #[test]
    fn exclusive_domain_guard_blocks_subdomain_entry() {
        let verdict = evaluate(
            "https://secure.bank.com",
            &visited(&["https://a.com"]),
            &rules(&[("", "bank.com")]),
            &[],
        );
        match verdict {
            Verdict::Blocked {
                reason,
                conflicting_url,
            } => {
                assert!(reason.contains("secure.bank.com"));
                assert_eq!(conflicting_url, None);
            }
            Verdict::Allowed => panic!("expected block"),
        }
    }

    #[test]
    fn exclusive_domain_guard_allows_clean_entry() {
        // Every visited URL is already inside the guarded domain.
        let verdict = evaluate(
            "https://bank.com/transfer",
            &visited(&["https://login.bank.com"]),
            &rules(&[("", "bank.com")]),
            &[],
        );
        assert_eq!(verdict, Verdict::Allowed);
    }

    #[test]
    fn exclusive_domain_guard_is_directional() {
        // Guard entry INTO bank.com is blocked once foreign context exists,
        // but leaving bank.com for elsewhere is not mirrored by rule 1.
        let verdict = evaluate(
            "https://elsewhere.com",
            &visited(&["https://bank.com"]),
            &rules(&[("", "bank.com")]),
            &[],
        );
        assert_eq!(verdict, Verdict::Allowed);
    }

    #[test]
    fn sticky_domain_blocks_everything_after_visit() {
        let verdict = evaluate(
            "https://other.com",
            &visited(&["https://secret.com/x"]),
            &rules(&[("secret.com", "")]),
            &[],
        );
        match verdict {
            Verdict::Blocked {
                reason,
                conflicting_url,
            } => {
                assert!(reason.contains("secret.com"));
                assert_eq!(conflicting_url, Some("https://secret.com/x".to_string()));
            }
            Verdict::Allowed => panic!("expected block"),
        }
    }

    #[test]
    fn pairwise_exclusion_is_symmetric() {
        let pair = rules(&[("a.com", "b.com")]);

        let forward = evaluate("https://b.com", &visited(&["https://a.com"]), &pair, &[]);
        assert!(forward.is_blocked());

        let backward = evaluate("https://a.com", &visited(&["https://b.com"]), &pair, &[]);
        assert!(backward.is_blocked());

        let unrelated = evaluate("https://c.com", &visited(&["https://a.com"]), &pair, &[]);
        assert_eq!(unrelated, Verdict::Allowed);
    }

    #[test]
    fn url_pair_rule_requires_exact_match() {
        let pairs = vec![UrlPairRule(
            "https://x.com/1".to_string(),
            "https://y.com/2".to_string(),
        )];

        let hit = evaluate("https://y.com/2", &visited(&["https://x.com/1"]), &[], &pairs);
        match hit {
            Verdict::Blocked {
                conflicting_url, ..
            } => assert_eq!(conflicting_url, Some("https://x.com/1".to_string())),
            Verdict::Allowed => panic!("expected block"),
        }

        let miss = evaluate("https://y.com/3", &visited(&["https://x.com/1"]), &[], &pairs);
        assert_eq!(miss, Verdict::Allowed);
    }

    #[test]
    fn evaluate_is_deterministic() {
        let hostname_rules = rules(&[("", "bank.com"), ("secret.com", "")]);
        let visited = visited(&["https://a.com", "https://secret.com/x"]);
        let first = evaluate("https://bank.com", &visited, &hostname_rules, &[]);
        for _ in 0..10 {
            assert_eq!(
                evaluate("https://bank.com", &visited, &hostname_rules, &[]),
                first
            );
        }
    }

    #[test]
    fn exclusive_guard_takes_precedence_over_sticky() {
        // Both rule 1 and rule 2 would match; rule 1 must win.
        let hostname_rules = rules(&[("", "bank.com"), ("secret.com", "")]);
        let verdict = evaluate(
            "https://bank.com",
            &visited(&["https://secret.com/x"]),
            &hostname_rules,
            &[],
        );
        match verdict {
            Verdict::Blocked {
                reason,
                conflicting_url,
            } => {
                assert!(reason.contains("not allowed"));
                assert_eq!(conflicting_url, None);
            }
            Verdict::Allowed => panic!("expected block"),
        }
    }
}
