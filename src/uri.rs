//! # URI Normalization
//!
//! Every cache entry is keyed by a canonical form of the repository address,
//! so that `git@github.com:user/repo.git`, `https://github.com/user/repo` and
//! `git://GitHub.com/user/repo.git/` all land in the same pod.
//!
//! The normalized key has the shape `host[:port]/path`:
//!
//! - scp-style `user@host:path` and every `scheme://` form except `file://`
//!   are parsed as if they were `https` URLs
//! - credentials, query and fragment are dropped
//! - the host is lowercased, the path keeps its case
//! - repeated `/` are collapsed, trailing `/` and `.git` are stripped
//!
//! Addresses without a scheme (local paths, or keys that are already
//! normalized) only go through the path clean-up, which is what makes
//! [`normalize`] idempotent.

use std::fmt;

use url::Url;

use crate::error::{Error, Result};

/// Canonical cache key for a remote repository.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NormalizedUri(String);

impl NormalizedUri {
    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe directory name for this key.
    pub fn flatten(&self) -> String {
        flatten(&self.0)
    }
}

impl fmt::Display for NormalizedUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedUri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalize a repository address into its cache key.
///
/// Returns [`Error::InvalidArgument`] for empty input, unparseable URLs, and
/// keys that would not name a directory of their own (`.` or `..`).
pub fn normalize(uri: &str) -> Result<NormalizedUri> {
    let uri = uri.trim();
    if uri.is_empty() {
        return Err(invalid(uri, "empty repository address"));
    }

    let key = match rewrite_to_url(uri) {
        Some(url_str) => normalize_url(uri, &url_str)?,
        None => clean_path(uri),
    };

    if key.is_empty() || key == "." || key == ".." {
        return Err(invalid(uri, "address does not name a repository"));
    }

    Ok(NormalizedUri(key))
}

/// Replace path separators in a normalized key with `_`.
///
/// The result never contains `/` or `\`, so it is safe to use as a single
/// directory name.
pub fn flatten(key: &str) -> String {
    key.trim_matches('/').replace(['/', '\\'], "_")
}

/// Rewrite scp-style and non-https schemes into an `https://` URL string.
///
/// Returns `None` when the address has no scheme and is not scp-style.
fn rewrite_to_url(uri: &str) -> Option<String> {
    if let Some((scheme, rest)) = uri.split_once("://") {
        if scheme.eq_ignore_ascii_case("file") {
            return Some(uri.to_string());
        }
        return Some(format!("https://{}", rest));
    }

    // user@host:path
    let (user_host, path) = uri.split_once(':')?;
    if user_host.contains('/') {
        return None;
    }
    let (_, host) = user_host.rsplit_once('@')?;
    Some(format!("https://{}/{}", host, path))
}

fn normalize_url(original: &str, url_str: &str) -> Result<String> {
    let url = Url::parse(url_str).map_err(|e| invalid(original, &e.to_string()))?;

    let mut authority = url.host_str().unwrap_or_default().to_lowercase();
    if let Some(port) = url.port() {
        authority.push_str(&format!(":{}", port));
    }

    let path = clean_path(url.path());
    Ok(match (authority.is_empty(), path.is_empty()) {
        (true, _) => path,
        (false, true) => authority,
        (false, false) => format!("{}/{}", authority, path),
    })
}

/// Collapse repeated separators and strip surrounding `/` and trailing `.git`.
fn clean_path(path: &str) -> String {
    let mut cleaned = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    while let Some(stripped) = cleaned.strip_suffix(".git") {
        cleaned = stripped.trim_end_matches('/').to_string();
    }
    cleaned
}

fn invalid(uri: &str, reason: &str) -> Error {
    Error::InvalidArgument {
        message: format!("cannot normalize '{}': {}", uri, reason),
    }
}
