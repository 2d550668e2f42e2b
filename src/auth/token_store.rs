use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Storage key (and file stem) for the access credential.
const ACCESS_TOKEN_KEY: &str = "auth_access_token";

/// Storage key (and file stem) for the refresh credential.
const REFRESH_TOKEN_KEY: &str = "auth_refresh_token";

/// Safety buffer subtracted from expiry when checking liveness.
/// 60s forces a pre-emptive refresh before true expiry, absorbing clock
/// drift and request latency.
pub const EXPIRY_SKEW_SECONDS: i64 = 60;

/// A single stored credential. Immutable once created; the pair is always
/// replaced wholesale, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    /// Absolute expiry, epoch milliseconds.
    pub expires_at: i64,
}

impl StoredToken {
    /// Liveness at an explicit instant (epoch milliseconds).
    pub fn is_live_at(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at - EXPIRY_SKEW_SECONDS * 1000
    }

    pub fn is_live(&self) -> bool {
        self.is_live_at(Utc::now().timestamp_millis())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: StoredToken,
    pub refresh: StoredToken,
}

/// Holds the access/refresh credential pair and persists it across restarts.
///
/// The pair is all-or-nothing: a half-present pair on disk is treated as
/// absent. Storage failures degrade to an absent pair instead of raising -
/// losing persisted credentials only forces re-authentication.
pub struct TokenStore {
    dir: Option<PathBuf>,
    pair: Mutex<Option<TokenPair>>,
}

impl TokenStore {
    /// Open a store backed by JSON files under `dir`, loading any pair a
    /// previous run persisted there.
    pub fn open(dir: PathBuf) -> Self {
        let pair = load_pair(&dir);
        Self {
            dir: Some(dir),
            pair: Mutex::new(pair),
        }
    }

    /// A store with no durable backing. Used by tests and ephemeral sessions.
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            pair: Mutex::new(None),
        }
    }

    /// Atomically replace the pair, computing absolute expiries from the
    /// current time. Expiry inputs are seconds.
    pub fn save(
        &self,
        access_token: &str,
        access_expires_in: i64,
        refresh_token: &str,
        refresh_expires_in: i64,
    ) {
        let now = Utc::now().timestamp_millis();
        let pair = TokenPair {
            access: StoredToken {
                token: access_token.to_string(),
                expires_at: now + access_expires_in * 1000,
            },
            refresh: StoredToken {
                token: refresh_token.to_string(),
                expires_at: now + refresh_expires_in * 1000,
            },
        };
        if let Some(dir) = &self.dir {
            persist(dir, &pair);
        }
        *self.lock_pair() = Some(pair);
    }

    /// Remove the pair from memory and disk. Idempotent.
    pub fn clear(&self) {
        *self.lock_pair() = None;
        if let Some(dir) = &self.dir {
            for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
                let path = entry_path(dir, key);
                if path.exists() {
                    if let Err(e) = fs::remove_file(&path) {
                        warn!(key, error = %e, "Failed to remove stored token");
                    }
                }
            }
        }
    }

    /// Snapshot of the access credential, if a full pair is present.
    pub fn access(&self) -> Option<StoredToken> {
        self.lock_pair().as_ref().map(|p| p.access.clone())
    }

    /// Snapshot of the refresh credential, if a full pair is present.
    pub fn refresh(&self) -> Option<StoredToken> {
        self.lock_pair().as_ref().map(|p| p.refresh.clone())
    }

    pub fn is_access_live(&self) -> bool {
        self.is_access_live_at(Utc::now().timestamp_millis())
    }

    pub fn is_access_live_at(&self, now_ms: i64) -> bool {
        self.lock_pair()
            .as_ref()
            .is_some_and(|p| p.access.is_live_at(now_ms))
    }

    pub fn is_refresh_live(&self) -> bool {
        self.is_refresh_live_at(Utc::now().timestamp_millis())
    }

    pub fn is_refresh_live_at(&self, now_ms: i64) -> bool {
        self.lock_pair()
            .as_ref()
            .is_some_and(|p| p.refresh.is_live_at(now_ms))
    }

    /// The access token value, if it is currently live.
    pub fn live_access_value(&self) -> Option<String> {
        let now = Utc::now().timestamp_millis();
        self.lock_pair()
            .as_ref()
            .filter(|p| p.access.is_live_at(now))
            .map(|p| p.access.token.clone())
    }

    fn lock_pair(&self) -> std::sync::MutexGuard<'_, Option<TokenPair>> {
        self.pair.lock().expect("token pair lock poisoned")
    }
}

fn entry_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.json", key))
}

fn load_pair(dir: &Path) -> Option<TokenPair> {
    let access = load_entry(dir, ACCESS_TOKEN_KEY)?;
    let refresh = load_entry(dir, REFRESH_TOKEN_KEY)?;
    Some(TokenPair { access, refresh })
}

fn load_entry(dir: &Path, key: &str) -> Option<StoredToken> {
    let path = entry_path(dir, key);
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(key, error = %e, "Failed to read stored token");
            }
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(token) => Some(token),
        Err(e) => {
            warn!(key, error = %e, "Discarding unreadable token entry");
            None
        }
    }
}

fn persist(dir: &Path, pair: &TokenPair) {
    if let Err(e) = fs::create_dir_all(dir) {
        warn!(error = %e, "Failed to create token storage directory");
        return;
    }
    write_entry(dir, ACCESS_TOKEN_KEY, &pair.access);
    write_entry(dir, REFRESH_TOKEN_KEY, &pair.refresh);
}

fn write_entry(dir: &Path, key: &str, token: &StoredToken) {
    let contents = match serde_json::to_string_pretty(token) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(key, error = %e, "Failed to serialize token");
            return;
        }
    };
    if let Err(e) = fs::write(entry_path(dir, key), contents) {
        warn!(key, error = %e, "Failed to persist token");
    }
}
