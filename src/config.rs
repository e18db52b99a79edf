use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

use crate::core::identifier::{CreateIdentifierRequest, DidMethod, KeyCodec, KeyType};
use crate::core::metadata::Environment;

pub const SELF_ISSUED_V2: &str = "https://self-issued.me/v2";
pub const SELF_ISSUED_V2_OPENID_VC: &str = "https://self-issued.me/v2/openid-vc";

/// Engine configuration.
///
/// Every field has a default, so an empty JSON object is a valid configuration.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Base of the provider APIs. Derived from the environment when absent,
    /// e.g. `https://api-pilot.ebsi.eu/`.
    pub well_known_base: Option<BaseUrl>,
    pub environment: Environment,
    /// Credential issuer used for the attestation bootstrap when the caller
    /// does not name one.
    pub mock_issuer: Option<Url>,
    pub attestation: AttestationConfig,
    pub discovery: RetryConfig,
    /// Seconds subtracted from the proof `created` timestamp to tolerate clock skew.
    pub created_backdate_secs: u64,
    pub restricted_providers: Vec<RestrictedProvider>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AttestationConfig {
    /// Per-attempt wait for the attestation credential.
    pub timeout_secs: u64,
    pub retry: RetryConfig,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

/// A relying party that only accepts a subset of DID methods.
#[derive(Deserialize, Debug, Clone)]
pub struct RestrictedProvider {
    /// Matched, case-insensitively, as a substring of `client_id` or `redirect_uri`.
    pub domain_pattern: String,
    /// DID prefixes accepted by the provider, e.g. `did:key:`.
    pub allowed_methods: Vec<String>,
    /// Identifier to create when the agent holds none of the allowed methods.
    pub create: CreateIdentifierRequest,
}

impl RestrictedProvider {
    pub fn ebsi() -> Self {
        Self {
            domain_pattern: ".ebsi.eu".into(),
            allowed_methods: vec!["did:key:".into(), "did:ebsi:".into()],
            create: CreateIdentifierRequest {
                method: DidMethod::Key,
                key_type: KeyType::Secp256r1,
                codec: Some(KeyCodec::JwkJcsPub),
            },
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        value
            .to_lowercase()
            .contains(&self.domain_pattern.to_lowercase())
    }

    pub fn allows(&self, did: &str) -> bool {
        let did = did.to_lowercase();
        self.allowed_methods
            .iter()
            .any(|prefix| did.starts_with(&prefix.to_lowercase()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            well_known_base: None,
            environment: Environment::default(),
            mock_issuer: None,
            attestation: AttestationConfig::default(),
            discovery: RetryConfig::default(),
            created_backdate_secs: 120,
            restricted_providers: vec![RestrictedProvider::ebsi()],
        }
    }
}

impl Default for AttestationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 500,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("unable to parse engine configuration")
    }

    pub fn attestation_timeout(&self) -> Duration {
        Duration::from_secs(self.attestation.timeout_secs)
    }

    pub fn created_backdate(&self) -> Duration {
        Duration::from_secs(self.created_backdate_secs)
    }

    pub fn well_known_base(&self) -> Result<Url> {
        match &self.well_known_base {
            Some(base) => Ok((**base).clone()),
            None => self.environment.api_base(),
        }
    }

    /// The issuer asked for an attestation when none is given explicitly.
    pub fn default_attestation_issuer(&self) -> Result<Url> {
        match &self.mock_issuer {
            Some(url) => Ok(url.clone()),
            None => self
                .environment
                .mock_issuer()
                .context("no credential issuer configured for the attestation bootstrap"),
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// A url that is always a base (can be safely join()'ed with further path elements without
/// mangling).
#[derive(Deserialize, Debug, Clone, Hash, PartialEq, Eq)]
#[serde(try_from = "String")]
pub struct BaseUrl(Url);

impl std::ops::Deref for BaseUrl {
    type Target = Url;

    fn deref(&self) -> &Url {
        &self.0
    }
}

impl TryFrom<String> for BaseUrl {
    type Error = url::ParseError;

    fn try_from(mut url: String) -> Result<Self, Self::Error> {
        // Make URL a base.
        if !url.ends_with('/') {
            url += "/"
        }
        url.parse().map(Self)
    }
}
