//! Daemon settings resolved once at startup.
//!
//! Every input `name` is looked up as:
//! 1. `INPUT_<NAME>`, the variable a CI action runner sets for an action input
//! 2. `<NAME>` with `-` replaced by `_` (e.g. `MAX_AGE`, `S3_BUCKET`)
//! 3. input-specific fallbacks such as `AWS_ACCESS_KEY_ID`
//!
//! Blank values count as unset.

use crate::budget::RetentionPolicy;
use crate::paths::Paths;
use crate::{DEFAULT_CACHE_PREFIX, DEFAULT_S3_ENDPOINT, DEFAULT_S3_PREFIX, Error, Result};
use secrecy::SecretString;
use std::fmt;
use std::str::FromStr;

/// Which storage backend the daemon talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    /// The CI runner's hosted cache service; falls back to the filesystem
    /// when its credentials are absent
    #[default]
    HostedCache,
    /// An S3-compatible object store
    ObjectStore,
    /// Plain files in a local directory
    Filesystem,
}

impl ProviderKind {
    /// Canonical input value for this provider.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HostedCache => "github",
            Self::ObjectStore => "s3",
            Self::Filesystem => "filesystem",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" | "gha" | "actions" | "hosted" => Ok(Self::HostedCache),
            "s3" => Ok(Self::ObjectStore),
            "filesystem" | "fs" | "local" => Ok(Self::Filesystem),
            other => Err(Error::configuration_with_help(
                format!("Unknown provider '{other}'"),
                "Supported providers: github, s3, filesystem",
            )),
        }
    }
}

/// Credentials for the hosted cache service.
#[derive(Debug, Clone)]
pub struct HostedCacheSettings {
    /// Base URL of the cache service
    pub service_url: String,
    /// Bearer token issued to the runner
    pub runtime_token: SecretString,
}

/// Connection settings for an S3-compatible object store.
#[derive(Debug, Clone)]
pub struct ObjectStoreSettings {
    /// Access key id
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: SecretString,
    /// Session token for temporary credentials
    pub session_token: Option<SecretString>,
    /// Bucket holding the artifacts
    pub bucket: String,
    /// Signing region
    pub region: String,
    /// Endpoint URL
    pub endpoint: String,
    /// Key prefix every artifact is stored under
    pub prefix: String,
}

/// Everything the daemon needs to know, resolved once per process.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Selected backend
    pub provider: ProviderKind,
    /// Prefix prepended to every cache key
    pub cache_prefix: String,
    /// Eviction budgets applied at shutdown
    pub retention: RetentionPolicy,
    /// Hosted cache credentials, when the runner provides them
    pub hosted: Option<HostedCacheSettings>,
    /// Object store settings, present only when that provider is selected
    pub object_store: Option<ObjectStoreSettings>,
    /// Well-known file locations
    pub paths: Paths,
}

impl Settings {
    /// Resolve settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an unknown provider, unparsable
    /// retention budgets or missing object store credentials.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve settings through `lookup` instead of the process environment.
    ///
    /// # Errors
    ///
    /// See [`Settings::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let inputs = Inputs { lookup: &lookup };

        let provider = inputs
            .get("provider", &[])
            .map(|raw| raw.parse::<ProviderKind>())
            .transpose()?
            .unwrap_or_default();

        let cache_prefix = inputs
            .get("cache-prefix", &[])
            .unwrap_or_else(|| DEFAULT_CACHE_PREFIX.to_string());

        let retention = RetentionPolicy::parse(
            inputs.get("max-age", &[]).as_deref(),
            inputs.get("max-files", &[]).as_deref(),
            inputs.get("max-size", &[]).as_deref(),
        )?;

        let hosted = match (
            inputs.raw("ACTIONS_RESULTS_URL"),
            inputs.raw("ACTIONS_RUNTIME_TOKEN"),
        ) {
            (Some(service_url), Some(runtime_token)) => Some(HostedCacheSettings {
                service_url,
                runtime_token: SecretString::from(runtime_token),
            }),
            _ => None,
        };

        let object_store = if provider == ProviderKind::ObjectStore {
            Some(object_store_settings(&inputs)?)
        } else {
            None
        };

        Ok(Self {
            provider,
            cache_prefix,
            retention,
            hosted,
            object_store,
            paths: Paths::from_lookup(&lookup),
        })
    }
}

fn object_store_settings(inputs: &Inputs<'_>) -> Result<ObjectStoreSettings> {
    let required = |name: &str, fallbacks: &[&str]| {
        inputs.get(name, fallbacks).ok_or_else(|| {
            Error::configuration_with_help(
                format!("S3 provider requires {name}"),
                format!(
                    "Set the {name} input or the {} environment variable",
                    std::iter::once(env_name(name))
                        .chain(fallbacks.iter().map(|f| (*f).to_string()))
                        .collect::<Vec<_>>()
                        .join(" / ")
                ),
            )
        })
    };

    Ok(ObjectStoreSettings {
        access_key_id: required("s3-access-key-id", &["AWS_ACCESS_KEY_ID"])?,
        secret_access_key: required("s3-secret-access-key", &["AWS_SECRET_ACCESS_KEY"])?.into(),
        session_token: inputs
            .get("s3-session-token", &["AWS_SESSION_TOKEN"])
            .map(SecretString::from),
        bucket: required("s3-bucket", &[])?,
        region: required("s3-region", &["AWS_REGION", "AWS_DEFAULT_REGION"])?,
        endpoint: inputs
            .get("s3-endpoint", &["AWS_ENDPOINT_URL_S3", "AWS_ENDPOINT_URL"])
            .unwrap_or_else(|| DEFAULT_S3_ENDPOINT.to_string()),
        prefix: inputs
            .get("s3-prefix", &[])
            .unwrap_or_else(|| DEFAULT_S3_PREFIX.to_string()),
    })
}

fn env_name(input: &str) -> String {
    input.to_ascii_uppercase().replace('-', "_")
}

struct Inputs<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Inputs<'_> {
    fn raw(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn get(&self, name: &str, fallbacks: &[&str]) -> Option<String> {
        let action_input = format!("INPUT_{}", name.replace(' ', "_").to_ascii_uppercase());
        std::iter::once(action_input)
            .chain(std::iter::once(env_name(name)))
            .chain(fallbacks.iter().map(|f| (*f).to_string()))
            .find_map(|var| self.raw(&var))
    }
}
