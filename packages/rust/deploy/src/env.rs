//! Deployment-related environment variables.

use tracing::warn;

use crate::strategy::BuildStrategy;

pub const DEPLOYMENT_MODE: &str = "DEPLOYMENT_MODE";
pub const MAX_RETRIES: &str = "MAX_RETRIES";
pub const VERBOSE: &str = "VERBOSE";

/// Flags forwarded from the caller's environment to every build attempt.
pub const FORWARDED_FLAGS: [&str; 3] = ["SKIP_OG_GENERATION", "SKIP_TYPE_CHECK", "SKIP_LINT"];

/// Snapshot of the deployment environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeployEnv {
    pub deployment_mode: Option<String>,
    pub forwarded: Vec<(String, String)>,
    pub max_retries: Option<u32>,
    pub verbose: bool,
}

impl DeployEnv {
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut env = Self::default();
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            match key {
                DEPLOYMENT_MODE if !value.is_empty() => {
                    env.deployment_mode = Some(value.to_string());
                }
                MAX_RETRIES => match value.parse::<u32>() {
                    Ok(n) => env.max_retries = Some(n),
                    Err(_) => warn!(value = %value, "ignoring invalid MAX_RETRIES"),
                },
                VERBOSE => env.verbose = is_truthy(value),
                k if FORWARDED_FLAGS.contains(&k) => {
                    env.forwarded.push((k.to_string(), value.to_string()));
                }
                _ => {}
            }
        }
        env.forwarded.sort();
        env
    }

    /// The strategy named by `DEPLOYMENT_MODE`, when it names one.
    pub fn initial_strategy(&self) -> Option<BuildStrategy> {
        self.deployment_mode.as_deref()?.parse().ok()
    }
}

pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_known_variables() {
        let env = DeployEnv::from_vars([
            ("DEPLOYMENT_MODE", "emergency"),
            ("MAX_RETRIES", "3"),
            ("VERBOSE", "true"),
            ("SKIP_LINT", "true"),
            ("SKIP_OG_GENERATION", "false"),
            ("PATH", "/usr/bin"),
        ]);
        assert_eq!(env.initial_strategy(), Some(BuildStrategy::Emergency));
        assert_eq!(env.max_retries, Some(3));
        assert!(env.verbose);
        assert_eq!(
            env.forwarded,
            vec![
                ("SKIP_LINT".to_string(), "true".to_string()),
                ("SKIP_OG_GENERATION".to_string(), "false".to_string()),
            ]
        );
    }

    #[test]
    fn informational_mode_and_bad_values() {
        let env = DeployEnv::from_vars([
            ("DEPLOYMENT_MODE", "production"),
            ("MAX_RETRIES", "lots"),
            ("VERBOSE", "0"),
        ]);
        assert_eq!(env.deployment_mode.as_deref(), Some("production"));
        assert_eq!(env.initial_strategy(), None);
        assert_eq!(env.max_retries, None);
        assert!(!env.verbose);
    }

    #[test]
    fn empty_environment() {
        let env = DeployEnv::from_vars(Vec::<(String, String)>::new());
        assert_eq!(env, DeployEnv::default());
    }
}
