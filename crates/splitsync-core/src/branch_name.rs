//! Secondary branch naming: `<owner>/<repo>/<number>`.
//!
//! A secondary PR's head branch names the primary PR it mirrors. No escaping
//! is done, so owners or repository names containing `/` cannot be encoded.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::PullRequestRef;

static ENCODED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^/]+)/([^/]+)/([0-9]+)$").expect("encoded branch pattern is valid")
});

/// Branch name for the secondary that mirrors `primary`.
pub fn encode(primary: &PullRequestRef) -> String {
    format!("{}/{}", primary.repo_name, primary.number)
}

/// True when `branch` has the `segment/segment/digits` shape.
pub fn is_encoded(branch: &str) -> bool {
    ENCODED.is_match(branch)
}

/// Decode a secondary branch name back to the primary it mirrors.
///
/// Returns `None` when the shape does not hold or the number overflows.
pub fn decode(branch: &str) -> Option<PullRequestRef> {
    let caps = ENCODED.captures(branch)?;
    let number = caps[3].parse().ok()?;
    Some(PullRequestRef::new(format!("{}/{}", &caps[1], &caps[2]), number))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_uses_owner_repo_number() {
        let pr = PullRequestRef::new("acme/widgets", 42);
        assert_eq!(encode(&pr), "acme/widgets/42");
    }

    #[test]
    fn test_round_trip() {
        for (repo, number) in [
            ("acme/widgets", 42u64),
            ("org/my-repo.rs", 1),
            ("Some_Org/x", 987_654_321),
        ] {
            let pr = PullRequestRef::new(repo, number);
            assert_eq!(decode(&encode(&pr)), Some(pr));
        }
    }

    proptest! {
        #[test]
        fn test_round_trip_any_ref(
            owner in "[A-Za-z0-9_.-]{1,39}",
            repo in "[A-Za-z0-9_.-]{1,100}",
            number in any::<u64>(),
        ) {
            let pr = PullRequestRef::new(format!("{owner}/{repo}"), number);
            let branch = encode(&pr);
            prop_assert!(is_encoded(&branch));
            prop_assert_eq!(decode(&branch), Some(pr));
        }
    }

    #[test]
    fn test_is_encoded_shapes() {
        assert!(is_encoded("acme/widgets/42"));
        assert!(!is_encoded("acme/widgets"));
        assert!(!is_encoded("feature/cache-fix"));
        assert!(!is_encoded("acme/widgets/42/extra"));
        assert!(!is_encoded("acme/widgets/4x"));
        assert!(!is_encoded("acme//42"));
        assert!(!is_encoded("/widgets/42"));
        assert!(!is_encoded("main"));
    }

    #[test]
    fn test_decode_rejects_plain_branches() {
        assert_eq!(decode("main"), None);
        assert_eq!(decode("release/1.0"), None);
        assert_eq!(decode("acme/widgets/99999999999999999999999"), None);
    }
}
