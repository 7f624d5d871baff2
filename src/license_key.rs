//! License key generation.
//!
//! Admin-created licenses that do not carry a key get a human-readable one in
//! the format `PREFIX-XXXX-XXXX-XXXX-XXXX`. Keys are opaque everywhere else:
//! lookups compare them byte for byte and never check their shape.

use std::future::Future;

use rand::Rng;

use crate::config::LicenseConfig;
use crate::errors::{LicenseError, LicenseResult};

/// Character set for license key generation.
/// Excludes ambiguous characters: 0, O, I, L, 1
const LICENSE_KEY_CHARSET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

/// How many random keys to try before giving up on finding a free one.
const MAX_KEY_ATTEMPTS: usize = 10;

/// Shape of generated keys.
#[derive(Debug, Clone)]
pub struct LicenseKeyConfig {
    pub prefix: String,
    pub segments: u8,
    pub segment_length: u8,
}

impl Default for LicenseKeyConfig {
    fn default() -> Self {
        Self {
            prefix: "SUFUSS".to_string(),
            segments: 4,
            segment_length: 4,
        }
    }
}

impl From<&LicenseConfig> for LicenseKeyConfig {
    fn from(config: &LicenseConfig) -> Self {
        Self {
            prefix: config.key_prefix.clone(),
            segments: config.key_segments,
            segment_length: config.key_segment_length,
        }
    }
}

fn generate_segment(length: u8) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..LICENSE_KEY_CHARSET.len());
            LICENSE_KEY_CHARSET[idx] as char
        })
        .collect()
}

/// Generate a license key with the given configuration.
pub fn generate_license_key(config: &LicenseKeyConfig) -> String {
    let segments: Vec<String> = (0..config.segments)
        .map(|_| generate_segment(config.segment_length))
        .collect();

    format!("{}-{}", config.prefix, segments.join("-"))
}

/// Generate a key that `is_taken` reports as free.
///
/// Collisions are astronomically unlikely with the default shape, but a short
/// custom shape can exhaust the attempts, which is reported as a conflict.
pub async fn generate_unique_license_key<F, Fut>(
    config: &LicenseKeyConfig,
    mut is_taken: F,
) -> LicenseResult<String>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = LicenseResult<bool>>,
{
    for _ in 0..MAX_KEY_ATTEMPTS {
        let key = generate_license_key(config);
        if !is_taken(key.clone()).await? {
            return Ok(key);
        }
    }

    Err(LicenseError::Conflict(format!(
        "could not generate an unused license key after {MAX_KEY_ATTEMPTS} attempts"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_key_has_correct_format() {
        let config = LicenseKeyConfig::default();
        let key = generate_license_key(&config);

        let parts: Vec<&str> = key.split('-').collect();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0], "SUFUSS");
        for segment in &parts[1..] {
            assert_eq!(segment.len(), 4);
            assert!(segment.bytes().all(|b| LICENSE_KEY_CHARSET.contains(&b)));
        }
    }

    #[test]
    fn generate_key_with_custom_config() {
        let config = LicenseKeyConfig {
            prefix: "LAB".to_string(),
            segments: 2,
            segment_length: 6,
        };
        let key = generate_license_key(&config);
        assert!(key.starts_with("LAB-"));
        assert_eq!(key.len(), "LAB".len() + 2 * (1 + 6));
    }

    #[tokio::test]
    async fn unique_key_skips_taken_candidates() {
        let config = LicenseKeyConfig::default();
        let mut calls = 0;
        let key = generate_unique_license_key(&config, |_| {
            calls += 1;
            let taken = calls < 3;
            async move { Ok(taken) }
        })
        .await
        .unwrap();

        assert!(key.starts_with("SUFUSS-"));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn unique_key_gives_up_eventually() {
        let config = LicenseKeyConfig::default();
        let result = generate_unique_license_key(&config, |_| async { Ok(true) }).await;
        assert!(matches!(result, Err(LicenseError::Conflict(_))));
    }
}
