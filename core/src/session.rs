//! Explicit, owned session state shared by the client, the alert feed and
//! the front end.
//!
//! Persistence is a collaborator behind [`SessionStore`]; nothing here is a
//! process-wide global.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::RwLock;

use serde::Deserialize;
use serde::Serialize;
use soc_protocol::Role;
use soc_protocol::TimeRange;
use soc_protocol::User;
use tokio::sync::watch;

use crate::search_spec::MAX_RESULT_SIZE;
use crate::search_spec::MIN_RESULT_SIZE;

const SESSION_FILE: &str = "session.json";

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Everything the console remembers between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Session {
    pub user: Option<User>,
    pub selected_index: String,
    pub max_results: u32,
    pub rows_per_page: u32,
    pub time_range: TimeRange,
    pub allowed_indices: Vec<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            user: None,
            selected_index: "wazuh-alerts-*".to_string(),
            max_results: 100,
            rows_per_page: 10,
            time_range: TimeRange::TwentyFourHours,
            allowed_indices: vec!["wazuh-alerts-*".to_string(), "wazuh-archives-*".to_string()],
        }
    }
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.user
            .as_ref()
            .is_some_and(|user| !user.access_token.is_empty())
    }
}

pub trait SessionStore: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<Session>, SessionStoreError>;
    fn save(&self, session: &Session) -> Result<(), SessionStoreError>;
    fn clear(&self) -> Result<(), SessionStoreError>;
}

/// JSON file under the console home directory.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Store `session.json` inside `dir`, creating the directory if needed.
    pub fn in_dir(dir: &Path) -> Result<Self, SessionStoreError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(SESSION_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write via a `.tmp` sibling so a crash never leaves a torn file.
    fn atomic_write(&self, data: &[u8]) -> Result<(), SessionStoreError> {
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<Session>, SessionStoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        let json = serde_json::to_string_pretty(session)?;
        self.atomic_write(json.as_bytes())
    }

    fn clear(&self) -> Result<(), SessionStoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    saved: Mutex<Option<Session>>,
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<Session>, SessionStoreError> {
        Ok(self
            .saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        *self.saved.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionStoreError> {
        *self.saved.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Cheap-to-clone handle on the live session.
///
/// Every setter persists through the store. Persistence failures are logged
/// and never fail the in-memory update.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    session: RwLock<Session>,
    store: Arc<dyn SessionStore>,
    auth_required: watch::Sender<bool>,
}

impl SessionContext {
    /// Restore the last saved session from `store`, or start fresh.
    pub fn load(store: Arc<dyn SessionStore>) -> Self {
        let session = match store.load() {
            Ok(Some(session)) => session,
            Ok(None) => Session::default(),
            Err(err) => {
                tracing::warn!("discarding unreadable saved session: {err}");
                Session::default()
            }
        };
        let (auth_required, _) = watch::channel(false);
        Self {
            inner: Arc::new(SessionInner {
                session: RwLock::new(session),
                store,
                auth_required,
            }),
        }
    }

    pub fn in_memory() -> Self {
        Self::load(Arc::new(MemorySessionStore::default()))
    }

    pub fn snapshot(&self) -> Session {
        self.read().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.read().user.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.read()
            .user
            .as_ref()
            .map(|user| user.access_token.clone())
            .filter(|token| !token.is_empty())
    }

    /// Role of the signed-in user. Anonymous sessions get the most
    /// restricted role.
    pub fn role(&self) -> Role {
        self.read()
            .user
            .as_ref()
            .map(|user| user.role)
            .unwrap_or(Role::Analyst)
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_authenticated()
    }

    pub fn sign_in(&self, user: User) {
        tracing::info!("signed in as {} ({})", user.username, user.role);
        self.update(|s| s.user = Some(user));
        self.inner.auth_required.send_replace(false);
    }

    /// Forget the user but keep preferences.
    pub fn sign_out(&self) {
        self.update(|s| s.user = None);
    }

    /// The backend rejected our credentials. Drops the user, persists the
    /// credential-less session and raises the auth-required signal.
    pub fn invalidate(&self) {
        tracing::warn!("session invalidated; re-authentication required");
        self.update(|s| s.user = None);
        self.inner.auth_required.send_replace(true);
    }

    /// Back to defaults, removing anything persisted.
    pub fn reset(&self) {
        *self.write() = Session::default();
        if let Err(err) = self.inner.store.clear() {
            tracing::warn!("failed to clear saved session: {err}");
        }
    }

    pub fn set_selected_index(&self, index: impl Into<String>) {
        let index = index.into();
        self.update(|s| s.selected_index = index);
    }

    pub fn set_max_results(&self, count: u32) {
        self.update(|s| s.max_results = count.clamp(MIN_RESULT_SIZE, MAX_RESULT_SIZE));
    }

    pub fn set_rows_per_page(&self, count: u32) {
        self.update(|s| s.rows_per_page = count.max(1));
    }

    pub fn set_time_range(&self, range: TimeRange) {
        self.update(|s| s.time_range = range);
    }

    pub fn set_allowed_indices(&self, indices: Vec<String>) {
        self.update(|s| s.allowed_indices = indices);
    }

    /// Fires `true` whenever the session is invalidated by a 401.
    pub fn subscribe_auth_required(&self) -> watch::Receiver<bool> {
        self.inner.auth_required.subscribe()
    }

    fn update(&self, f: impl FnOnce(&mut Session)) {
        let snapshot = {
            let mut guard = self.write();
            f(&mut guard);
            guard.clone()
        };
        if let Err(err) = self.inner.store.save(&snapshot) {
            tracing::warn!("failed to persist session: {err}");
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Session> {
        self.inner
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Session> {
        self.inner
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self.read();
        f.debug_struct("SessionContext")
            .field("user", &session.user.as_ref().map(|u| &u.username))
            .field("selected_index", &session.selected_index)
            .finish_non_exhaustive()
    }
}
