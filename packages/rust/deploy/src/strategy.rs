//! Build strategies, tried in a fixed order from most to least capable.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use coinpress_shared::{BuildConfig, CoinpressError};

/// A named configuration for one invocation of the external build tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStrategy {
    Fast,
    Minimal,
    Emergency,
    Basic,
}

impl BuildStrategy {
    /// Fallback order. A failed strategy advances to the next entry.
    pub const ORDER: [BuildStrategy; 4] = [
        BuildStrategy::Fast,
        BuildStrategy::Minimal,
        BuildStrategy::Emergency,
        BuildStrategy::Basic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Minimal => "minimal",
            Self::Emergency => "emergency",
            Self::Basic => "basic",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Fast => "full build with every optimization enabled",
            Self::Minimal => "skip OG image generation and type checking",
            Self::Emergency => "also skip linting and telemetry",
            Self::Basic => "clear the build cache and skip everything optional",
        }
    }

    /// The strategy tried after this one, if any.
    pub fn next(self) -> Option<Self> {
        let idx = self.position();
        Self::ORDER.get(idx + 1).copied()
    }

    /// This strategy followed by every later one.
    pub fn chain_from(self) -> &'static [BuildStrategy] {
        &Self::ORDER[self.position()..]
    }

    fn position(self) -> usize {
        Self::ORDER
            .iter()
            .position(|s| *s == self)
            .unwrap_or(Self::ORDER.len() - 1)
    }

    /// Concrete parameters for this strategy under `build`.
    pub fn spec(self, build: &BuildConfig) -> StrategySpec {
        let (timeout_secs, memory_mib) = match self {
            Self::Fast => (600, 4096),
            Self::Minimal => (480, 3072),
            Self::Emergency => (360, 2048),
            Self::Basic => (300, 1536),
        };

        let mut env: Vec<(String, String)> = Vec::new();
        if self != Self::Fast {
            env.push(("SKIP_OG_GENERATION".into(), "true".into()));
            env.push(("SKIP_TYPE_CHECK".into(), "true".into()));
        }
        if matches!(self, Self::Emergency | Self::Basic) {
            env.push(("SKIP_LINT".into(), "true".into()));
            env.push(("NEXT_TELEMETRY_DISABLED".into(), "1".into()));
        }

        let pre_commands = match self {
            Self::Basic => vec![format!("rm -rf {}", shell_quote(&build.cache_dir))],
            _ => Vec::new(),
        };

        StrategySpec {
            strategy: self,
            timeout: Duration::from_secs(timeout_secs),
            memory_mib,
            env,
            pre_commands,
        }
    }
}

impl fmt::Display for BuildStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildStrategy {
    type Err = CoinpressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ORDER
            .iter()
            .copied()
            .find(|strategy| strategy.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                CoinpressError::validation(format!(
                    "unknown build strategy '{wanted}' (expected one of: fast, minimal, emergency, basic)"
                ))
            })
    }
}

/// Resolved parameters of one strategy.
#[derive(Debug, Clone)]
pub struct StrategySpec {
    pub strategy: BuildStrategy,
    pub timeout: Duration,
    /// V8 old-space ceiling in MiB.
    pub memory_mib: u32,
    /// Environment overrides applied on top of the inherited environment.
    pub env: Vec<(String, String)>,
    /// Shell commands run before the build, in order.
    pub pre_commands: Vec<String>,
}

impl StrategySpec {
    pub fn node_options(&self) -> String {
        format!("--max-old-space-size={}", self.memory_mib)
    }
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
