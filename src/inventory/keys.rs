//! Zirkel keys: the join key between extracted records and inventory rows.
//!
//! Two shapes exist in the sheet:
//!
//! * `ZM<providerCode><originalKey>` - composed client-side when the provider
//!   document carries its own site key.
//! * `ZM<providerCode>-<n>` - synthesised sequentially when it does not.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

const PREFIX: &str = "ZM";

/// A unique inventory key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZirkelKey(String);

impl ZirkelKey {
    /// Wrap an existing key as read from the sheet.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// `ZM<providerCode><originalKey>`.
    pub fn compose(provider_code: &str, original_key: &str) -> Self {
        Self(format!("{PREFIX}{}{}", provider_code.trim(), original_key.trim()))
    }

    /// `ZM<providerCode>-<n>`.
    pub fn sequential(provider_code: &str, n: u64) -> Self {
        Self(format!("{PREFIX}{}-{n}", provider_code.trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ZirkelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

static SEQUENTIAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ZM(.+)-(\d+)$").expect("valid regex"));

/// The numeric suffix of `key` when it is a sequential key for `provider_code`.
pub fn sequence_number(key: &str, provider_code: &str) -> Option<u64> {
    let caps = SEQUENTIAL.captures(key.trim())?;
    if caps.get(1)?.as_str() != provider_code.trim() {
        return None;
    }
    caps.get(2)?.as_str().parse().ok()
}

/// Next free sequential key for `provider_code` given every key in use.
///
/// `None` when the highest suffix in use is already `u64::MAX`.
pub fn next_sequential<'a>(
    provider_code: &str,
    existing: impl IntoIterator<Item = &'a str>,
) -> Option<ZirkelKey> {
    let highest = existing
        .into_iter()
        .filter_map(|k| sequence_number(k, provider_code))
        .max()
        .unwrap_or(0);
    highest
        .checked_add(1)
        .map(|n| ZirkelKey::sequential(provider_code, n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_and_sequential_shapes() {
        assert_eq!(ZirkelKey::compose("PN", "017").as_str(), "ZMPN017");
        assert_eq!(ZirkelKey::sequential("PN", 6).as_str(), "ZMPN-6");
    }

    #[test]
    fn sequence_number_matches_only_own_provider() {
        assert_eq!(sequence_number("ZMPN-12", "PN"), Some(12));
        assert_eq!(sequence_number("ZMPNX-12", "PN"), None);
        assert_eq!(sequence_number("ZMPN017", "PN"), None);
        assert_eq!(sequence_number("ZMAB-3", "PN"), None);
    }

    #[test]
    fn next_sequential_uses_highest_not_count() {
        let keys = ["ZMPN-1", "ZMPN-7", "ZMAB-40", "ZMPN-3", "ZMPN017"];
        assert_eq!(next_sequential("PN", keys).unwrap().as_str(), "ZMPN-8");
        assert_eq!(next_sequential("QQ", keys).unwrap().as_str(), "ZMQQ-1");
    }

    #[test]
    fn next_sequential_stops_at_largest_suffix() {
        let keys = ["ZMPN-3", "ZMPN-18446744073709551615"];
        assert_eq!(next_sequential("PN", keys), None);
        assert_eq!(next_sequential("AB", keys).unwrap().as_str(), "ZMAB-1");
    }
}
