//! Provider credentials injected into spawned tool server processes.

use std::collections::BTreeMap;

/// Host environment variables forwarded by `EnvCredentialSource`.
pub const PROVIDER_ENV_VARS: &[&str] = &[
    "OPENAI_API_KEY",
    "OPENAI_BASE_URL",
    "ANTHROPIC_API_KEY",
    "GEMINI_API_KEY",
    "GOOGLE_API_KEY",
    "DEEPSEEK_API_KEY",
    "OPENROUTER_API_KEY",
    "GROQ_API_KEY",
    "MISTRAL_API_KEY",
];

/// Supplies environment variables carrying provider API keys.
///
/// The returned overlay is applied before the server's own `env`, so explicit
/// config always wins.
pub trait CredentialSource: Send + Sync {
    fn credential_env(&self) -> BTreeMap<String, String>;
}

/// Injects nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

impl CredentialSource for NoCredentials {
    fn credential_env(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// Forwards provider variables from a fixed set of key/value pairs.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialSource {
    vars: BTreeMap<String, String>,
}

impl EnvCredentialSource {
    /// Capture the provider variables currently set in the host environment.
    pub fn from_host() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Capture provider variables through an arbitrary lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let vars = PROVIDER_ENV_VARS
            .iter()
            .filter_map(|key| {
                lookup(key)
                    .filter(|v| !v.is_empty())
                    .map(|v| ((*key).to_string(), v))
            })
            .collect();
        Self { vars }
    }
}

impl CredentialSource for EnvCredentialSource {
    fn credential_env(&self) -> BTreeMap<String, String> {
        self.vars.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_lookup_keeps_known_non_empty_vars() {
        let source = EnvCredentialSource::from_lookup(|key| match key {
            "OPENAI_API_KEY" => Some("sk-test".to_string()),
            "GROQ_API_KEY" => Some(String::new()),
            _ => None,
        });

        let env = source.credential_env();
        assert_eq!(env.len(), 1);
        assert_eq!(env.get("OPENAI_API_KEY").map(String::as_str), Some("sk-test"));
    }

    #[test]
    fn test_no_credentials() {
        assert!(NoCredentials.credential_env().is_empty());
    }
}
