use clap::Parser;
use std::path::PathBuf;
use thiserror::Error;

/// Caches the ExecCredential printed by a cloud CLI (by default
/// `aws eks get-token`) so kubectl can reuse it until it is about to expire.
///
/// Everything after the options is passed to the CLI unchanged, e.g.
/// `eks-token-cache eks get-token --cluster-name my-cluster`.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Program that prints the ExecCredential
    #[clap(long, env = "EKS_TOKEN_CACHE_COMMAND", default_value = "aws")]
    pub command: String,

    /// Arguments for the program that re-authenticate after a failed fetch
    #[clap(
        long = "login-arg",
        env = "EKS_TOKEN_CACHE_LOGIN_ARGS",
        value_delimiter = ' ',
        default_values = ["sso", "login"],
        allow_hyphen_values = true
    )]
    pub login_args: Vec<String>,

    /// Environment variables starting with this prefix select the cache entry
    #[clap(long, env = "EKS_TOKEN_CACHE_ENV_PREFIX", default_value = "AWS_")]
    pub env_prefix: String,

    /// Directory holding cached credentials [default: $HOME/.aws]
    #[clap(long, env = "EKS_TOKEN_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Seconds before expiry at which a cached credential is no longer used
    #[clap(long, env = "EKS_TOKEN_CACHE_REFRESH_MARGIN", default_value_t = 30)]
    pub refresh_margin: u32,

    /// Ignore any cached credential and fetch a new one
    #[clap(long)]
    pub refresh: bool,

    /// Arguments passed to the program to fetch the credential
    #[clap(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Unable to determine the home directory. Please set HOME or pass --cache-dir.")]
    NoHomeDirectory,
}

/// Resolved configuration for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub command: String,
    pub login_args: Vec<String>,
    pub env_prefix: String,
    pub cache_dir: PathBuf,
    pub refresh_margin: chrono::Duration,
    pub refresh: bool,
}

impl CliArgs {
    /// Splits the parsed arguments into [`Settings`] and the passthrough
    /// arguments.
    pub fn into_settings(self) -> Result<(Settings, Vec<String>), SettingsError> {
        let cache_dir = match self.cache_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .ok_or(SettingsError::NoHomeDirectory)?
                .join(".aws"),
        };

        let settings = Settings {
            command: self.command,
            login_args: self.login_args,
            env_prefix: self.env_prefix,
            cache_dir,
            refresh_margin: chrono::Duration::seconds(i64::from(self.refresh_margin)),
            refresh: self.refresh,
        };
        Ok((settings, self.args))
    }
}
