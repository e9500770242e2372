use figment::{
    providers::{Env, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Settings for a single invocation, read once at startup. Everything past
/// startup takes the parsed struct by reference; no module reads the
/// environment after this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the control plane.
    pub sch_url: String,

    /// API credential id. The same credential pair authenticates both the
    /// control plane and direct per-engine calls.
    pub cred_id: String,

    /// API credential token paired with `cred_id`.
    pub cred_token: String,

    /// Jobs carrying this label get the Oracle CDC lag lookup for their
    /// active runs.
    pub cdc_job_label: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sch_url: "https://cloud.streamsets.com".to_string(),
            cred_id: String::new(),
            cred_token: String::new(),
            cdc_job_label: "oracle-cdc".to_string(),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("could not parse configuration from environment; {0}")]
    Parse(String),

    #[error("CRED_ID and CRED_TOKEN must be set in the environment")]
    MissingCredentials,
}

impl Config {
    /// Defaults first, environment last, so each field can be overridden by
    /// its uppercase environment variable (CRED_ID, CRED_TOKEN, SCH_URL,
    /// CDC_JOB_LABEL).
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Env::raw().only(&["sch_url", "cred_id", "cred_token", "cdc_job_label"]))
            .extract()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        if config.cred_id.is_empty() || config.cred_token.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }

        Ok(config)
    }
}
