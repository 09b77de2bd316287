use crate::app::credential::{CredentialError, ExecCredential};
use crate::app::key::CacheKey;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use log::debug;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

const CACHE_FILE_PREFIX: &str = "eks-iam-cache-";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("No cached credential at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read cached credential {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cached credential {} is unusable: {source}", path.display())]
    Invalid {
        path: PathBuf,
        source: CredentialError,
    },

    #[error("Cached credential is expiring/expired: {expiration}")]
    Expired { expiration: String },

    #[error("Failed to write cached credential {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// On-disk cache of raw `ExecCredential` payloads, one file per [`CacheKey`].
pub struct CacheStore {
    dir: PathBuf,
    margin: Duration,
}

impl CacheStore {
    /// `margin` is how far ahead of expiry a credential stops being served.
    pub fn new(dir: impl Into<PathBuf>, margin: Duration) -> Self {
        Self {
            dir: dir.into(),
            margin,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{CACHE_FILE_PREFIX}{key}.json"))
    }

    pub async fn read(&self, key: &CacheKey) -> Result<Vec<u8>, CacheError> {
        self.read_at(key, Utc::now()).await
    }

    /// Returns the cached payload unchanged if it expires no earlier than
    /// `now + margin`. Stale files are left in place.
    pub async fn read_at(&self, key: &CacheKey, now: DateTime<Utc>) -> Result<Vec<u8>, CacheError> {
        let path = self.path_for(key);
        let payload = match tokio::fs::read(&path).await {
            Ok(payload) => payload,
            Err(source) if source.kind() == ErrorKind::NotFound => {
                return Err(CacheError::NotFound { path })
            }
            Err(source) => return Err(CacheError::Read { path, source }),
        };

        let expires_at = ExecCredential::from_slice(&payload)
            .and_then(|credential| credential.expires_at())
            .map_err(|source| CacheError::Invalid {
                path: path.clone(),
                source,
            })?;

        if expires_at.with_timezone(&Utc) < now + self.margin {
            return Err(CacheError::Expired {
                expiration: expiration_string(expires_at),
            });
        }

        debug!("Cache hit at {} (expires {})", path.display(), expires_at);
        Ok(payload)
    }

    /// Persists `payload` for `key`, owner read/write only, replacing any
    /// previous file.
    pub async fn write(&self, key: &CacheKey, payload: &[u8]) -> Result<(), CacheError> {
        let path = self.path_for(key);
        self.write_file(&path, payload)
            .await
            .map_err(|source| CacheError::Write {
                path: path.clone(),
                source,
            })?;
        debug!("Cached credential at {}", path.display());
        Ok(())
    }

    async fn write_file(&self, path: &Path, payload: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(path).await?;
        file.write_all(payload).await?;
        file.flush().await?;

        // `mode` only applies when the file is created.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        Ok(())
    }
}

fn expiration_string(expires_at: DateTime<FixedOffset>) -> String {
    expires_at.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true)
}

#[cfg(test)]
mod test {
    use super::*;
    use anyhow::Result;
    use chrono::SecondsFormat;

    fn key() -> CacheKey {
        CacheKey::derive(
            &["eks".to_string(), "get-token".to_string()],
            [("AWS_PROFILE", "dev")],
            "AWS_",
        )
    }

    fn payload(expires_at: DateTime<Utc>) -> Vec<u8> {
        format!(
            r#"{{"kind":"ExecCredential","apiVersion":"client.authentication.k8s.io/v1beta1","spec":{{}},"status":{{"expirationTimestamp":"{}","token":"k8s-aws-v1.token"}}}}"#,
            expires_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
        .into_bytes()
    }

    fn store(dir: &Path) -> CacheStore {
        CacheStore::new(dir, Duration::seconds(30))
    }

    #[test]
    fn test_path_is_named_after_key() {
        let store = CacheStore::new("/home/someone/.aws", Duration::seconds(30));
        let key = key();
        assert_eq!(
            store.path_for(&key),
            PathBuf::from(format!("/home/someone/.aws/eks-iam-cache-{key}.json"))
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_write_then_read_returns_identical_bytes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store(dir.path());
        let now = Utc::now();
        let written = payload(now + Duration::minutes(15));

        store.write(&key(), &written).await?;
        let read = store.read_at(&key(), now).await?;

        assert_eq!(read, written);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_file_is_not_found() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let result = store(dir.path()).read(&key()).await;
        assert!(matches!(result, Err(CacheError::NotFound { .. })));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_credential_inside_margin_is_expired() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store(dir.path());
        let now = Utc::now();

        store
            .write(&key(), &payload(now + Duration::seconds(29)))
            .await?;
        let result = store.read_at(&key(), now).await;
        assert!(matches!(result, Err(CacheError::Expired { .. })));

        // Stale entries are not removed.
        assert!(store.path_for(&key()).exists());
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_credential_in_the_past_is_expired() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store(dir.path());
        let now = Utc::now();

        store
            .write(&key(), &payload(now - Duration::hours(1)))
            .await?;
        let result = store.read_at(&key(), now).await;
        assert!(matches!(result, Err(CacheError::Expired { .. })));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_credential_just_past_margin_is_served() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store(dir.path());
        let now = Utc::now();

        store
            .write(&key(), &payload(now + Duration::seconds(32)))
            .await?;
        assert!(store.read_at(&key(), now).await.is_ok());
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_garbage_file_is_invalid() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store(dir.path());

        store.write(&key(), b"not json").await?;
        let result = store.read(&key()).await;
        assert!(matches!(
            result,
            Err(CacheError::Invalid {
                source: CredentialError::Parse { .. },
                ..
            })
        ));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_write_overwrites_and_creates_missing_dir() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = store(&dir.path().join("nested").join(".aws"));
        let now = Utc::now();

        store.write(&key(), b"old contents that are longer").await?;
        let fresh = payload(now + Duration::minutes(10));
        store.write(&key(), &fresh).await?;

        assert_eq!(tokio::fs::read(store.path_for(&key())).await?, fresh);
        Ok(())
    }

    #[cfg(unix)]
    #[test_log::test(tokio::test)]
    async fn test_cache_file_is_owner_only() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let store = store(dir.path());
        store
            .write(&key(), &payload(Utc::now() + Duration::minutes(10)))
            .await?;

        let mode = std::fs::metadata(store.path_for(&key()))?.permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        Ok(())
    }
}
