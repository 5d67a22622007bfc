use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::RwLock;

use sha2::{Digest, Sha256};

use super::patterns::{default_pattern_names, patterns_for, RedactionPattern};

/// Removes sensitive data from log text while preserving correlation
/// between identical values.
///
/// The same sensitive value always maps to the same placeholder, so
/// downstream reasoning can still tell that "the same IP address appears in
/// multiple errors" without seeing the value itself:
///
/// ```text
/// "Connection from 192.168.1.1 failed"    -> "Connection from [IPV4:a3f2] failed"
/// "Connection from 192.168.1.1 succeeded" -> "Connection from [IPV4:a3f2] succeeded"
/// ```
///
/// The memo table holds the original values in memory for the life of the
/// redactor; call [`Redactor::reset`] when correlations should not persist
/// into a new context.
pub struct Redactor {
    enabled: bool,
    patterns: Vec<&'static RedactionPattern>,
    memo: RwLock<HashMap<String, String>>,
}

impl Redactor {
    /// Creates a redactor over the named built-in patterns, applied in the
    /// given order. An empty or all-unknown list selects the default set.
    /// When `enabled` is false, [`Redactor::redact`] is the identity.
    pub fn new<S: AsRef<str>>(enabled: bool, pattern_names: &[S]) -> Self {
        let mut patterns = patterns_for(pattern_names);
        if patterns.is_empty() {
            patterns = patterns_for(default_pattern_names());
        }
        Self {
            enabled,
            patterns,
            memo: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Replaces every enabled-pattern match with its placeholder.
    pub fn redact<'t>(&self, text: &'t str) -> Cow<'t, str> {
        self.redact_and_count(text).0
    }

    /// Like [`Redactor::redact`], also returning the number of replacements.
    pub fn redact_and_count<'t>(&self, text: &'t str) -> (Cow<'t, str>, usize) {
        if !self.enabled || self.patterns.is_empty() {
            return (Cow::Borrowed(text), 0);
        }

        let mut count = 0;
        let mut result: Cow<'t, str> = Cow::Borrowed(text);

        for pattern in &self.patterns {
            let replaced = match pattern.regex.replace_all(result.as_ref(), |caps: &regex::Captures| {
                count += 1;
                self.placeholder(&caps[0], pattern.tag)
            }) {
                Cow::Owned(s) => Some(s),
                Cow::Borrowed(_) => None,
            };
            if let Some(s) = replaced {
                result = Cow::Owned(s);
            }
        }

        (result, count)
    }

    /// Clears the value-to-placeholder memo table.
    pub fn reset(&self) {
        self.memo.write().expect("redactor memo lock").clear();
    }

    /// Returns a copy of the memo table: original value to placeholder.
    pub fn unique_values(&self) -> HashMap<String, String> {
        self.memo.read().expect("redactor memo lock").clone()
    }

    fn placeholder(&self, value: &str, tag: &str) -> String {
        if let Some(existing) = self.memo.read().expect("redactor memo lock").get(value) {
            return existing.clone();
        }

        let placeholder = format!("[{}:{}]", tag, hash_value(value));
        self.memo
            .write()
            .expect("redactor memo lock")
            .entry(value.to_string())
            .or_insert_with(|| placeholder.clone());
        placeholder
    }
}

/// First 4 hex characters of the SHA-256 of the exact matched bytes.
fn hash_value(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    format!("{:02x}{:02x}", digest[0], digest[1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use std::sync::LazyLock;

    static PLACEHOLDER_SHAPE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[IPV4:[0-9a-f]{4}\]").unwrap());

    #[test]
    fn identical_values_share_a_placeholder() {
        let redactor = Redactor::new(true, &["ipv4"]);
        let a = redactor.redact("Connected from 10.0.0.1");
        let b = redactor.redact("Disconnected from 10.0.0.1");

        let pa = PLACEHOLDER_SHAPE.find(&a).unwrap().as_str().to_string();
        let pb = PLACEHOLDER_SHAPE.find(&b).unwrap().as_str().to_string();
        assert_eq!(pa, pb);
        assert!(!a.contains("10.0.0.1"));
    }

    #[test]
    fn distinct_values_get_distinct_placeholders() {
        let redactor = Redactor::new(true, &["ipv4"]);
        let text = redactor.redact("from 10.0.0.1 to 10.0.0.2");
        let found: Vec<&str> = PLACEHOLDER_SHAPE
            .find_iter(&text)
            .map(|m| m.as_str())
            .collect();
        assert_eq!(found.len(), 2);
        assert_ne!(found[0], found[1]);
    }

    #[test]
    fn count_tallies_every_replacement() {
        let redactor = Redactor::new(true, &["ipv4", "email"]);
        let (text, count) =
            redactor.redact_and_count("10.0.0.1 emailed root@example.com and 10.0.0.1");
        assert_eq!(count, 3);
        assert!(text.contains("[EMAIL:"));
    }

    #[test]
    fn disabled_redactor_is_identity() {
        let redactor = Redactor::new(false, &["ipv4"]);
        let (text, count) = redactor.redact_and_count("from 10.0.0.1");
        assert!(matches!(text, Cow::Borrowed(_)));
        assert_eq!(count, 0);
        assert!(redactor.unique_values().is_empty());
    }

    #[test]
    fn reset_clears_the_memo() {
        let redactor = Redactor::new(true, &["ipv4"]);
        redactor.redact("10.0.0.1");
        assert_eq!(redactor.unique_values().len(), 1);
        redactor.reset();
        assert!(redactor.unique_values().is_empty());
    }

    #[test]
    fn api_keys_are_tagged_secret() {
        let redactor = Redactor::new(true, &["api_key"]);
        let text = redactor.redact("login with api_key=supersecret99 now");
        assert!(text.contains("[SECRET:"));
        assert!(!text.contains("supersecret99"));
    }

    #[test]
    fn unknown_pattern_names_fall_back_to_defaults() {
        let redactor = Redactor::new(true, &["nope"]);
        let text = redactor.redact("mail admin@example.com");
        assert!(text.contains("[EMAIL:"));
    }

    #[test]
    fn placeholders_survive_later_patterns() {
        // ipv4 runs before uuid; the [IPV4:xxxx] placeholder must not be
        // re-matched by anything downstream.
        let redactor = Redactor::new(
            true,
            &[
                "ipv4",
                "ipv6",
                "email",
                "api_key",
                "aws_key",
                "jwt",
                "private_key",
                "mac_address",
                "credit_card",
                "uuid",
            ],
        );
        let (text, count) = redactor.redact_and_count("peer 10.0.0.1");
        assert_eq!(count, 1);
        assert!(PLACEHOLDER_SHAPE.is_match(&text));
    }
}
