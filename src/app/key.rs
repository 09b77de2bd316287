use sha2::{Digest, Sha256};
use std::fmt;

/// Identifies a cached credential for one invocation context: the passthrough
/// arguments plus every environment variable carrying the provider prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Hashes the sorted `NAME=value` prefixed environment entries followed by
    /// the arguments in their given order, NUL separated.
    pub fn derive<E, K, V>(args: &[String], environ: E, prefix: &str) -> Self
    where
        E: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut parts: Vec<String> = environ
            .into_iter()
            .filter(|(name, _)| name.as_ref().starts_with(prefix))
            .map(|(name, value)| format!("{}={}", name.as_ref(), value.as_ref()))
            .collect();
        parts.sort();
        parts.extend(args.iter().cloned());

        let digest = Sha256::digest(parts.join("\0").as_bytes());
        CacheKey(format!("{:x}", digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
