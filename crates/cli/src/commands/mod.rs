pub mod bulk;
pub mod envs;
pub mod history;
pub mod rename;
pub mod rollback;
pub mod store;

use anyhow::Result;
use relabel_engine::{DatabasePoolConfig, EnvironmentConfig, MatchPredicate, StoreSession};

use crate::config::Settings;

/// What every command receives: the parsed file and the requested environment
pub struct CommandContext {
    pub settings: Settings,
    pub env: Option<String>,
}

impl CommandContext {
    pub fn environment(&self) -> Result<EnvironmentConfig> {
        Ok(self.settings.resolve(self.env.as_deref())?)
    }

    /// Connect to the target and log stores of the selected environment
    pub async fn open_session(&self) -> Result<StoreSession> {
        let env = self.environment()?;
        tracing::debug!(env = %env.name, "Connecting to stores");
        Ok(StoreSession::connect(&env, &DatabasePoolConfig::default()).await?)
    }
}

/// Resolve `--key` / `--old-name` into a predicate; the key wins
pub fn predicate_from_flags(key: Option<&str>, old_name: Option<&str>) -> Result<MatchPredicate> {
    MatchPredicate::resolve(key, old_name)
        .ok_or_else(|| anyhow::anyhow!("Pass --key or --old-name to choose the rows to change"))
}
