use crate::app::cache::CacheStore;
use crate::app::cli::{CliArgs, Settings};
use crate::app::credential::ExecCredential;
use crate::app::fetcher::Fetcher;
use crate::app::key::CacheKey;
use crate::app::runner::{CommandRunner, ProcessRunner};
use anyhow::Result;
use clap::Parser;
use log::{debug, warn};
use tokio::io::{AsyncWrite, AsyncWriteExt};

pub async fn run() -> Result<()> {
    let (settings, args) = CliArgs::parse().into_settings()?;
    let environ = std::env::vars_os().map(|(name, value)| {
        (
            name.to_string_lossy().into_owned(),
            value.to_string_lossy().into_owned(),
        )
    });
    run_with(
        &settings,
        &args,
        environ,
        &ProcessRunner,
        &mut tokio::io::stdout(),
    )
    .await
}

/// Writes a credential for `args` to `out`, from the cache when it is still
/// fresh, otherwise from the external command (caching the result).
pub async fn run_with<E, R, W>(
    settings: &Settings,
    args: &[String],
    environ: E,
    runner: &R,
    out: &mut W,
) -> Result<()>
where
    E: IntoIterator<Item = (String, String)>,
    R: CommandRunner,
    W: AsyncWrite + Unpin,
{
    let key = CacheKey::derive(args, environ, &settings.env_prefix);
    let store = CacheStore::new(&settings.cache_dir, settings.refresh_margin);
    debug!("Cache key {key} in {}", store.dir().display());

    if settings.refresh {
        debug!("Skipping cache read, refresh requested");
    } else {
        match store.read(&key).await {
            Ok(cached) => return emit(out, &cached).await,
            Err(err) => warn!("{err}"),
        }
    }

    let fetcher = Fetcher::new(runner, &settings.command, &settings.login_args);
    let payload = fetcher.fetch(args).await?;
    emit(out, &payload).await?;

    match ExecCredential::from_slice(&payload).and_then(|credential| credential.expires_at()) {
        Ok(_) => store.write(&key, &payload).await?,
        Err(err) => warn!("Not caching output of `{}`: {err}", settings.command),
    }
    Ok(())
}

async fn emit<W: AsyncWrite + Unpin>(out: &mut W, payload: &[u8]) -> Result<()> {
    out.write_all(payload).await?;
    out.flush().await?;
    Ok(())
}
