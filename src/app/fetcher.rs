use crate::app::runner::{CommandError, CommandRunner};
use log::{info, warn};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Re-authentication with `{command}` failed: {source}")]
    Login {
        command: String,
        source: CommandError,
    },

    #[error("Fetching credentials failed again after re-authenticating: {source}")]
    Retry { source: CommandError },
}

/// Obtains a fresh credential from the external CLI, re-authenticating at
/// most once.
pub struct Fetcher<'a, R> {
    runner: &'a R,
    program: &'a str,
    login_args: &'a [String],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Initial,
    AfterLogin,
}

impl<'a, R: CommandRunner> Fetcher<'a, R> {
    pub fn new(runner: &'a R, program: &'a str, login_args: &'a [String]) -> Self {
        Self {
            runner,
            program,
            login_args,
        }
    }

    /// fetch → (on failure) login → fetch. The second fetch is final either
    /// way, and login never runs twice.
    pub async fn fetch(&self, args: &[String]) -> Result<Vec<u8>, FetchError> {
        let mut attempt = Attempt::Initial;
        loop {
            match (attempt, self.runner.capture(self.program, args).await) {
                (_, Ok(payload)) => return Ok(payload),
                (Attempt::Initial, Err(source)) => {
                    warn!("{source}");
                    self.login().await?;
                    attempt = Attempt::AfterLogin;
                }
                (Attempt::AfterLogin, Err(source)) => return Err(FetchError::Retry { source }),
            }
        }
    }

    async fn login(&self) -> Result<(), FetchError> {
        let command = self.login_command();
        info!("Re-authenticating with `{command}`");
        self.runner
            .interactive(self.program, self.login_args)
            .await
            .map_err(|source| FetchError::Login { command, source })
    }

    fn login_command(&self) -> String {
        std::iter::once(self.program)
            .chain(self.login_args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
