//! Branch eligibility and ordering.

use std::cmp::Ordering;

use crate::snapshots::config::BranchRules;

/// Decide whether a raw remote branch name (as printed by `git branch -r`)
/// should be snapshotted. Total and side-effect free.
pub fn is_tracked_branch(raw: &str, rules: &BranchRules) -> bool {
    // Skip ref aliases like "origin/HEAD -> origin/master".
    if raw.contains("->") {
        return false;
    }
    // Skip the <remote>/sandbox/<user>/<topic> branches.
    if raw.contains("/sandbox/") {
        return false;
    }

    [
        &rules.release_marker,
        &rules.deploy_marker,
        &rules.primary,
    ]
    .iter()
    .any(|marker| raw.contains(&format!("/{marker}")))
}

/// Strip the single configured remote prefix: "origin/REL1_19" -> "REL1_19".
pub fn normalize_branch_name<'a>(raw: &'a str, remote: &str) -> &'a str {
    raw.strip_prefix(remote)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(raw)
}

fn trim_leading_zeros(run: &[u8]) -> &[u8] {
    let zeros = run.iter().take_while(|&&b| b == b'0').count();
    if zeros == run.len() {
        &run[run.len() - 1..]
    } else {
        &run[zeros..]
    }
}

/// Lexicographic-natural ordering: runs of digits compare numerically, so
/// REL1_9 sorts before REL1_10. Keeps the branch loop (and its logs) in a
/// stable, human-expected order across runs.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut i, mut j) = (0usize, 0usize);

    while i < a.len() && j < b.len() {
        if a[i].is_ascii_digit() && b[j].is_ascii_digit() {
            let start_a = i;
            while i < a.len() && a[i].is_ascii_digit() {
                i += 1;
            }
            let start_b = j;
            while j < b.len() && b[j].is_ascii_digit() {
                j += 1;
            }
            let run_a = trim_leading_zeros(&a[start_a..i]);
            let run_b = trim_leading_zeros(&b[start_b..j]);
            let ordering = run_a.len().cmp(&run_b.len()).then_with(|| run_a.cmp(run_b));
            if ordering != Ordering::Equal {
                return ordering;
            }
        } else {
            match a[i].cmp(&b[j]) {
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
                other => return other,
            }
        }
    }

    (a.len() - i).cmp(&(b.len() - j))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> BranchRules {
        BranchRules::default()
    }

    #[test]
    fn ref_aliases_are_rejected() {
        assert!(!is_tracked_branch("origin/HEAD -> origin/master", &rules()));
    }

    #[test]
    fn sandbox_branches_are_rejected() {
        assert!(!is_tracked_branch("origin/sandbox/alice/experiment", &rules()));
        // Even when the topic name itself would match a marker.
        assert!(!is_tracked_branch("origin/sandbox/bob/REL1_19-fix", &rules()));
    }

    #[test]
    fn release_deploy_and_primary_branches_are_kept() {
        assert!(is_tracked_branch("origin/master", &rules()));
        assert!(is_tracked_branch("origin/REL1_19", &rules()));
        assert!(is_tracked_branch("origin/wmf/1.42.0-wmf.3", &rules()));
    }

    #[test]
    fn unrelated_topic_branches_are_rejected() {
        assert!(!is_tracked_branch("origin/feature/fancy-parser", &rules()));
        assert!(!is_tracked_branch("origin/bugfix-123", &rules()));
    }

    #[test]
    fn normalization_strips_exactly_the_remote_prefix() {
        assert_eq!(normalize_branch_name("origin/REL1_19", "origin"), "REL1_19");
        assert_eq!(
            normalize_branch_name("origin/wmf/1.42", "origin"),
            "wmf/1.42"
        );
        // A name that does not start with the remote is passed through.
        assert_eq!(normalize_branch_name("originz/x", "origin"), "originz/x");
    }

    #[test]
    fn natural_order_compares_digit_runs_numerically() {
        let mut names = vec![
            "origin/REL1_10".to_string(),
            "origin/REL1_9".to_string(),
            "origin/REL1_19".to_string(),
            "origin/master".to_string(),
        ];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(
            names,
            vec![
                "origin/REL1_9",
                "origin/REL1_10",
                "origin/REL1_19",
                "origin/master",
            ]
        );
    }

    #[test]
    fn natural_order_ignores_leading_zeros_but_stays_total() {
        assert_eq!(natural_cmp("v007", "v7"), Ordering::Equal);
        assert_eq!(natural_cmp("v2", "v10"), Ordering::Less);
        assert_eq!(natural_cmp("a", "ab"), Ordering::Less);
    }
}
