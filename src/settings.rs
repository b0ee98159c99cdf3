use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Server {
    pub listen: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Postgres {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Rewards {
    /// Transfers strictly above this amount count toward the transaction milestone.
    pub min_amount_for_referral: Decimal,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Security {
    pub bcrypt_cost: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Events {
    pub queue_size: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub postgres: Postgres,
    pub rewards: Rewards,
    pub security: Security,
    pub events: Events,
}

impl Settings {
    /// Loads `path` (extension optional) and overlays `REFSYS__SECTION__KEY`
    /// environment variables.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config = Self::defaults()?
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("REFSYS").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.listen", "0.0.0.0:8000")?
            .set_default("postgres.url", "postgres://localhost:5432/refsys")?
            .set_default("postgres.max_connections", 5)?
            .set_default("rewards.min_amount_for_referral", "200")?
            .set_default("security.bcrypt_cost", bcrypt::DEFAULT_COST)?
            .set_default("events.queue_size", 512)
    }
}
