use std::ffi::OsString;

/// Read-only view of environment variables used during lookup.
pub trait EnvProvider: Send + Sync {
    fn get(&self, key: &str) -> Option<OsString>;

    /// UTF-8 value of `key`; unset and non-UTF-8 both yield `None`.
    fn get_str(&self, key: &str) -> Option<String> {
        self.get(key)?.into_string().ok()
    }
}

/// The current process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl EnvProvider for SystemEnv {
    fn get(&self, key: &str) -> Option<OsString> {
        std::env::var_os(key)
    }
}

/// Fixed variable set, built up fluently in tests.
#[cfg(test)]
#[derive(Default)]
pub struct MockEnv(std::collections::HashMap<String, OsString>);

#[cfg(test)]
impl MockEnv {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
impl EnvProvider for MockEnv {
    fn get(&self, key: &str) -> Option<OsString> {
        self.0.get(key).cloned()
    }
}
