//! Property-based tests for URI normalization.
//!
//! These tests use proptest to generate repository addresses in the forms
//! users actually type and verify that the cache key invariants hold.

#[cfg(test)]
mod proptest_tests {
    use crate::uri::{flatten, normalize};
    use proptest::prelude::*;

    fn host() -> impl Strategy<Value = String> {
        "[a-zA-Z][a-zA-Z0-9-]{0,10}(\\.[a-zA-Z]{2,5}){1,2}"
    }

    fn repo_path() -> impl Strategy<Value = String> {
        prop::collection::vec("[a-zA-Z0-9][a-zA-Z0-9_.-]{0,11}", 1..4).prop_map(|parts| parts.join("/"))
    }

    fn address() -> impl Strategy<Value = String> {
        (host(), repo_path(), 0..5usize, any::<bool>(), any::<bool>()).prop_map(
            |(host, path, form, git_suffix, trailing_slash)| {
                let suffix = if git_suffix { ".git" } else { "" };
                let slash = if trailing_slash { "/" } else { "" };
                match form {
                    0 => format!("https://{}/{}{}{}", host, path, suffix, slash),
                    1 => format!("git@{}:{}{}", host, path, suffix),
                    2 => format!("git://{}/{}{}{}", host, path, suffix, slash),
                    3 => format!("ssh://git@{}/{}{}", host, path, suffix),
                    _ => format!("https://user:pw@{}//{}{}{}", host, path, suffix, slash),
                }
            },
        )
    }

    proptest! {
        /// Property: normalizing a key again never changes it
        #[test]
        fn normalize_is_idempotent(input in address()) {
            if let Ok(once) = normalize(&input) {
                let twice = normalize(once.as_str()).unwrap();
                prop_assert_eq!(once, twice);
            }
        }

        /// Property: flattened keys never contain a path separator
        #[test]
        fn flatten_has_no_separators(input in address()) {
            if let Ok(key) = normalize(&input) {
                let flat = key.flatten();
                prop_assert!(!flat.contains('/'), "{} -> {}", input, flat);
                prop_assert!(!flat.contains('\\'), "{} -> {}", input, flat);
            }
        }

        /// Property: scp-style and https forms of the same remote agree
        #[test]
        fn ssh_and_https_agree(host in host(), path in repo_path()) {
            let ssh = normalize(&format!("git@{}:{}.git", host, path));
            let https = normalize(&format!("https://{}/{}", host.to_uppercase(), path));
            if let (Ok(ssh), Ok(https)) = (ssh, https) {
                prop_assert_eq!(ssh, https);
            }
        }

        /// Property: keys never carry credentials or a trailing `.git`
        #[test]
        fn keys_are_clean(input in address()) {
            if let Ok(key) = normalize(&input) {
                prop_assert!(!key.as_str().contains('@'));
                prop_assert!(!key.as_str().ends_with(".git"));
                prop_assert!(!key.as_str().ends_with('/'));
                prop_assert!(!key.as_str().contains("//"));
            }
        }

        /// Property: flatten is deterministic
        #[test]
        fn flatten_is_deterministic(input in ".*") {
            prop_assert_eq!(flatten(&input), flatten(&input));
        }
    }
}
