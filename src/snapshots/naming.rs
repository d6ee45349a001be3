//! Archive file naming.
//!
//! The archive name is a pure function of (repository id, branch name,
//! short head id): re-running the synchronizer maps an unchanged head to
//! the same path, which is what makes the exists-check short-circuit work.

/// Replace every character that is unsafe or ambiguous in an archive file
/// name with an underscore. Idempotent.
pub fn sanitize_snippet(input: &str) -> String {
    input
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | '-' | '.' | ' ' => '_',
            other => other,
        })
        .collect()
}

/// First seven characters of a commit id.
pub fn short_commit_id(head: &str) -> &str {
    head.get(..7).unwrap_or(head)
}

pub fn archive_file_name(repo_id: &str, branch: &str, head_commit_id: &str) -> String {
    format!(
        "{repo_id}-snapshot-{}-{}.tar.gz",
        sanitize_snippet(branch),
        sanitize_snippet(short_commit_id(head_commit_id))
    )
}

pub fn latest_alias_name(repo_id: &str) -> String {
    format!("{repo_id}-latest.tar.gz")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_rewrites_separators_and_dots() {
        assert_eq!(sanitize_snippet("wmf/1.42-wmf.1"), "wmf_1_42_wmf_1");
        assert_eq!(sanitize_snippet("REL1_19"), "REL1_19");
        assert_eq!(sanitize_snippet("a b\\c"), "a_b_c");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let once = sanitize_snippet("sandbox/alice/some-topic.v2");
        assert_eq!(sanitize_snippet(&once), once);
    }

    #[test]
    fn archive_name_is_a_pure_function_of_branch_and_short_head() {
        let head = "abc1234def5678abc1234def5678abc1234def56";
        let name = archive_file_name("demo", "REL1_19", head);
        assert_eq!(name, "demo-snapshot-REL1_19-abc1234.tar.gz");
        assert_eq!(archive_file_name("demo", "REL1_19", head), name);
    }

    #[test]
    fn distinct_heads_never_collide() {
        let a = archive_file_name("demo", "master", "abc1234000000000000000000000000000000000");
        let b = archive_file_name("demo", "master", "def5678000000000000000000000000000000000");
        assert_ne!(a, b);
    }

    #[test]
    fn short_head_tolerates_short_input() {
        assert_eq!(short_commit_id("abc"), "abc");
        assert_eq!(short_commit_id("abc1234ffff"), "abc1234");
    }
}
