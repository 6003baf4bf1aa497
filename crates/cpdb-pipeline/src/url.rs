//! Canonicalisation of discovered profile URLs.
//!
//! [`UrlNormalizer::normalize`] is pure: it only looks at the input string
//! and the configured profile host, so the same raw URL always produces the
//! same canonical URL or the same rejection.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]*)://").expect("valid regex"));

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z]+://)?([^/?#\s:@]+)(?::\d+)?(/[^?#\s]*)?(?:\?[^#\s]*)?(?:#\S*)?$")
        .expect("valid regex")
});

/// Profile identifiers: 3-100 characters, starting alphanumeric.
static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9_%\-]{2,99}$").expect("valid regex"));

/// Locale markers appended to profile paths, e.g. `nl`, `en-us`, `pt_BR`.
static LOCALE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}(?:[-_][a-z]{2})?$").expect("valid regex"));

const PROFILE_PATH_PREFIX: &str = "in";

/// A validated profile URL of the form `https://<profile-host>/in/<slug>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalUrl(String);

impl CanonicalUrl {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlRejection {
    #[error("URL is empty")]
    Empty,
    #[error("URL could not be parsed: {0}")]
    Unparsable(String),
    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),
    #[error("host '{found}' is not the profile host '{expected}'")]
    WrongHost { found: String, expected: String },
    #[error("path '{0}' is not a profile path")]
    NotAProfilePath(String),
    #[error("'{0}' is not a valid profile identifier")]
    InvalidIdentifier(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlNormalizer {
    profile_host: String,
}

impl UrlNormalizer {
    /// `profile_host` is the bare registrable host, e.g. `linkedin.com`.
    #[must_use]
    pub fn new(profile_host: impl Into<String>) -> Self {
        let host: String = profile_host.into();
        let host = host.trim().to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
        Self { profile_host: host }
    }

    #[must_use]
    pub fn profile_host(&self) -> &str {
        &self.profile_host
    }

    /// Maps a raw URL to its canonical profile URL.
    ///
    /// Query strings, fragments, trailing slashes, `www.` and regional
    /// subdomains are dropped, as is a single locale segment after the
    /// profile identifier (`/in/someone/nl`). The scheme is always `https`.
    ///
    /// # Errors
    ///
    /// Returns a [`UrlRejection`] describing why the input is not a profile URL.
    pub fn normalize(&self, raw: &str) -> Result<CanonicalUrl, UrlRejection> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(UrlRejection::Empty);
        }

        if let Some(caps) = SCHEME_RE.captures(raw) {
            let scheme = caps[1].to_ascii_lowercase();
            if scheme != "http" && scheme != "https" {
                return Err(UrlRejection::UnsupportedScheme(scheme));
            }
        }

        let caps = URL_RE
            .captures(raw)
            .ok_or_else(|| UrlRejection::Unparsable(raw.to_string()))?;

        let host = caps[1].to_ascii_lowercase();
        if !self.is_profile_host(&host) {
            return Err(UrlRejection::WrongHost {
                found: host,
                expected: self.profile_host.clone(),
            });
        }

        let path = caps.get(2).map_or("", |m| m.as_str());
        let slug = Self::profile_slug(path)?;

        Ok(CanonicalUrl(format!(
            "https://{}/{PROFILE_PATH_PREFIX}/{slug}",
            self.profile_host
        )))
    }

    /// Like [`normalize`](Self::normalize), but also accepts the shorthand
    /// found in imported candidate lists: a bare identifier (`andyliang`), a
    /// host-less path (`/in/andyliang`), and either of those or a full URL
    /// prefixed with `@`.
    ///
    /// # Errors
    ///
    /// Returns a [`UrlRejection`] when the expanded input is still not a
    /// profile URL.
    pub fn normalize_supplied(&self, raw: &str) -> Result<CanonicalUrl, UrlRejection> {
        let raw = raw.trim();
        let raw = raw.strip_prefix('@').unwrap_or(raw).trim_start();

        if raw.starts_with('/') {
            return self.normalize(&format!("{}{raw}", self.profile_host));
        }
        if !raw.is_empty() && !raw.contains(['/', '.', ':']) {
            return self.normalize(&format!(
                "{}/{PROFILE_PATH_PREFIX}/{raw}",
                self.profile_host
            ));
        }
        self.normalize(raw)
    }

    // Accepts the bare host, `www.`, and two-letter regional subdomains.
    fn is_profile_host(&self, host: &str) -> bool {
        if host == self.profile_host {
            return true;
        }
        host.strip_suffix(&self.profile_host)
            .and_then(|prefix| prefix.strip_suffix('.'))
            .is_some_and(|sub| {
                sub == "www" || (sub.len() == 2 && sub.bytes().all(|b| b.is_ascii_lowercase()))
            })
    }

    fn profile_slug(path: &str) -> Result<String, UrlRejection> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let (prefix, slug, rest) = match segments.as_slice() {
            [prefix, slug, rest @ ..] => (*prefix, *slug, rest),
            _ => return Err(UrlRejection::NotAProfilePath(path.to_string())),
        };

        if !prefix.eq_ignore_ascii_case(PROFILE_PATH_PREFIX) {
            return Err(UrlRejection::NotAProfilePath(path.to_string()));
        }

        match rest {
            [] => {}
            [locale] if LOCALE_RE.is_match(&locale.to_ascii_lowercase()) => {}
            _ => return Err(UrlRejection::NotAProfilePath(path.to_string())),
        }

        let slug = slug.to_ascii_lowercase();
        if !SLUG_RE.is_match(&slug) {
            return Err(UrlRejection::InvalidIdentifier(slug));
        }
        Ok(slug)
    }
}

#[cfg(test)]
#[path = "url_test.rs"]
mod tests;
