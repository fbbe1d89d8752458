//! Runtime configuration resolved from flags, environment and defaults

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use docsync_core::monitor::UserId;
use docsync_core::util::normalize_text_option;
use docsync_core::SyncSettings;

use crate::error::CliError;

const STORE_PATH_VAR: &str = "DOCSYNC_STORE_PATH";
const REMOTE_URL_VAR: &str = "DOCSYNC_REMOTE_URL";
const TOKEN_VAR: &str = "DOCSYNC_TOKEN";
const USER_ID_VAR: &str = "DOCSYNC_USER_ID";
const OFFLINE_VAR: &str = "DOCSYNC_OFFLINE";

/// Values given on the command line; they win over the environment
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub store_path: Option<PathBuf>,
    pub remote_url: Option<String>,
    pub user: Option<String>,
    pub offline: bool,
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub store_path: PathBuf,
    pub remote_url: Option<String>,
    pub token: Option<String>,
    pub user: Option<UserId>,
    pub offline: bool,
    pub settings: SyncSettings,
}

impl CliConfig {
    pub fn from_env(overrides: CliOverrides) -> Result<Self, CliError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::resolve(overrides, |name| values.get(name).cloned())
    }

    pub fn resolve(
        overrides: CliOverrides,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, CliError> {
        let settings = SyncSettings::from_lookup(&lookup).map_err(docsync_core::Error::from)?;

        let store_path = match overrides
            .store_path
            .or_else(|| normalize_text_option(lookup(STORE_PATH_VAR)).map(PathBuf::from))
        {
            Some(path) => path,
            None => default_store_path()?,
        };

        let remote_url =
            normalize_text_option(overrides.remote_url).or_else(|| normalize_text_option(lookup(REMOTE_URL_VAR)));
        let user = normalize_text_option(overrides.user)
            .or_else(|| normalize_text_option(lookup(USER_ID_VAR)))
            .map(UserId::new);
        let offline = overrides.offline || parse_flag(lookup(OFFLINE_VAR).as_deref())?;

        Ok(Self {
            store_path,
            remote_url,
            token: normalize_text_option(lookup(TOKEN_VAR)),
            user,
            offline,
            settings,
        })
    }

    /// Remote sync needs both an endpoint and an account
    pub const fn sync_enabled(&self) -> bool {
        self.remote_url.is_some() && self.user.is_some()
    }
}

pub fn default_store_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("docsync").join("documents.json"))
        .ok_or_else(|| CliError::Config("failed to resolve data directory".to_string()))
}

fn parse_flag(value: Option<&str>) -> Result<bool, CliError> {
    let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(false);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(CliError::Config(format!("{OFFLINE_VAR}: expected a boolean, got {other}"))),
    }
}
