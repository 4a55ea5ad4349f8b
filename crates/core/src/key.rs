//! Cache key codec.
//!
//! A cache key is `prefix + hash`, optionally followed by `#tag`. Lookups only
//! know the hash, so backends resolve them by prefix and then run the result
//! through [`CacheKeyCodec::match_hash`] before trusting it.

/// Separator between the hash portion and the tag portion of a key.
pub const TAG_SEPARATOR: char = '#';

/// Builds and parses cache keys for one configured prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeyCodec {
    prefix: String,
}

impl CacheKeyCodec {
    /// Create a codec for the given prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The configured prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build the key for `hash`, appending `#tag` when a non-empty tag is given.
    #[must_use]
    pub fn build_key(&self, hash: &str, tag: Option<&str>) -> String {
        match tag {
            Some(tag) if !tag.is_empty() => {
                format!("{}{hash}{TAG_SEPARATOR}{tag}", self.prefix)
            }
            _ => format!("{}{hash}", self.prefix),
        }
    }

    /// Check a resolved key against the requested hash.
    ///
    /// Returns `None` when the hash portion is not exactly `prefix + hash`
    /// (a prefix-match on a longer hash is a miss), otherwise `Some(tag)`.
    #[must_use]
    pub fn match_hash(&self, resolved: &str, hash: &str) -> Option<Option<String>> {
        let (hash_part, tag) = split_key(resolved);
        let wanted = self.build_key(hash, None);
        (hash_part == wanted).then(|| tag.map(str::to_owned))
    }
}

/// Split a key into its hash portion and tag on the last `#`.
///
/// An empty tag (key ending in `#`) is reported as no tag.
#[must_use]
pub fn split_key(key: &str) -> (&str, Option<&str>) {
    match key.rsplit_once(TAG_SEPARATOR) {
        Some((hash_part, tag)) if !tag.is_empty() => (hash_part, Some(tag)),
        Some((hash_part, _)) => (hash_part, None),
        None => (key, None),
    }
}
