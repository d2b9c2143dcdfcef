//! Credentials looked up by access key

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::EyeError;

/// User and password for a backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl Access {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.password.is_empty()
    }
}

pub trait AccessFinder: Send + Sync {
    fn find_access(&self, key: &str) -> Result<Access, EyeError>;
}

/// Access data from configuration, overridable from the environment with
/// `EYE_ACCESS_<KEY>_USER` and `EYE_ACCESS_<KEY>_PASSWORD`
#[derive(Debug, Clone, Default)]
pub struct StaticAccess {
    entries: HashMap<String, Access>,
}

impl StaticAccess {
    pub fn new(entries: HashMap<String, Access>) -> Self {
        Self { entries }
    }

    pub fn with(mut self, key: impl Into<String>, access: Access) -> Self {
        self.entries.insert(key.into(), access);
        self
    }

    /// Apply environment overrides for the given keys
    pub fn with_env_overrides<'a>(mut self, keys: impl IntoIterator<Item = &'a str>) -> Self {
        for key in keys {
            let prefix = format!("EYE_ACCESS_{}", env_key(key));
            let user = std::env::var(format!("{}_USER", prefix)).ok();
            let password = std::env::var(format!("{}_PASSWORD", prefix)).ok();
            if user.is_none() && password.is_none() {
                continue;
            }
            let entry = self.entries.entry(key.to_string()).or_default();
            if let Some(user) = user {
                entry.user = user;
            }
            if let Some(password) = password {
                entry.password = password;
            }
            tracing::debug!(access_key = %key, "Access overridden from environment");
        }
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }
}

impl AccessFinder for StaticAccess {
    fn find_access(&self, key: &str) -> Result<Access, EyeError> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| EyeError::Config(format!("No access data found for '{}'", key)))
    }
}

fn env_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_access() {
        let finder = StaticAccess::default().with("db", Access::new("app", "secret"));
        assert_eq!(finder.find_access("db").unwrap().user, "app");
        assert!(matches!(
            finder.find_access("other"),
            Err(EyeError::Config(_))
        ));
    }

    #[test]
    fn test_env_key() {
        assert_eq!(env_key("orders-db"), "ORDERS_DB");
        assert_eq!(env_key("web.1"), "WEB_1");
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("EYE_ACCESS_ENVTEST_KEY_USER", "from-env");
        let finder = StaticAccess::default()
            .with("envtest-key", Access::new("cfg", "pw"))
            .with_env_overrides(["envtest-key"]);
        std::env::remove_var("EYE_ACCESS_ENVTEST_KEY_USER");

        let access = finder.find_access("envtest-key").unwrap();
        assert_eq!(access.user, "from-env");
        assert_eq!(access.password, "pw");
    }
}
