use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use super::error::AuthError;
use super::session::AuthenticatedSession;

/// Storage abstraction for the current authenticated session.
///
/// Implementations must be safe to call from several tasks at once.
pub trait SessionStore: Send + Sync {
    fn get(&self) -> Result<Option<AuthenticatedSession>, AuthError>;
    fn save(&self, session: &AuthenticatedSession) -> Result<(), AuthError>;
    fn clear(&self) -> Result<(), AuthError>;
}

/// Session store that keeps the session in process memory only.
///
/// A restart triggers a new login. This is the authenticator's default.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    session: Mutex<Option<AuthenticatedSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self) -> Result<Option<AuthenticatedSession>, AuthError> {
        Ok(lock(&self.session)?.clone())
    }

    fn save(&self, session: &AuthenticatedSession) -> Result<(), AuthError> {
        *lock(&self.session)? = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        *lock(&self.session)? = None;
        Ok(())
    }
}

/// File-backed session store with read-through caching.
///
/// The first successful read is cached; later reads never touch the disk
/// again until [`SessionStore::save`] or [`SessionStore::clear`] replaces the
/// cache. The file is a flat JSON object readable only by its owner.
///
/// # Example
/// ```no_run
/// use cardata::auth::{FileSessionStore, SessionStore};
///
/// let store = FileSessionStore::new("/tmp/cardata-session.json");
/// let cached = store.get()?;
/// # Ok::<(), cardata::auth::AuthError>(())
/// ```
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    cached: Mutex<Option<AuthenticatedSession>>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: Mutex::new(None),
        }
    }

    pub fn new_default() -> Self {
        Self::new(default_session_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self) -> Result<Option<AuthenticatedSession>, AuthError> {
        let mut cached = lock(&self.cached)?;
        if let Some(session) = cached.as_ref() {
            return Ok(Some(session.clone()));
        }
        let raw = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(AuthError::Io(err.to_string())),
        };
        let session: AuthenticatedSession = serde_json::from_str(&raw)?;
        *cached = Some(session.clone());
        Ok(Some(session))
    }

    fn save(&self, session: &AuthenticatedSession) -> Result<(), AuthError> {
        let mut cached = lock(&self.cached)?;
        let serialized = serde_json::to_vec(session)?;
        atomic_write(&self.path, &serialized)?;
        *cached = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        let mut cached = lock(&self.cached)?;
        *cached = None;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AuthError::Io(err.to_string())),
        }
    }
}

/// `~/.cardata/session.json`, falling back to the working directory.
pub fn default_session_path() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".cardata"))
        .unwrap_or_else(|| PathBuf::from(".cardata"))
        .join("session.json")
}

fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>, AuthError> {
    mutex
        .lock()
        .map_err(|_| AuthError::Io("session store lock poisoned".to_string()))
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path.file_name().ok_or_else(|| {
        AuthError::Configuration(format!("Session path {} has no file name", path.display()))
    })?;

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let temp_path = path.with_file_name(format!(
        ".{}.tmp-{}-{nonce}",
        file_name.to_string_lossy(),
        std::process::id()
    ));

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let write_result = (|| -> std::io::Result<()> {
        let mut temp_file = options.open(&temp_path)?;
        temp_file.write_all(data)?;
        temp_file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }

    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }

    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

    Ok(())
}
