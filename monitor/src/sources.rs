//! Collaborator boundaries: where the raw log and player identities come from
//!
//! The monitor never talks to a transport or an identity service directly; it
//! takes both as constructor-injected trait objects so tests can substitute
//! fakes and deployments can pick their transport (local file, FTP mirror,
//! whatever keeps a copy of the server log current). Both traits are
//! deliberately tiny: one fallible call each.

use log::debug;
use std::error::Error;
use std::fs;
use std::path::PathBuf;

/// Provides the current full content of the server log
///
/// The source is not assumed to support range reads, so every fetch returns
/// the whole text; the monitor remembers how many lines it has already
/// processed. Failures are the implementation's concern to describe — the
/// monitor treats any error as "no new data this cycle."
pub trait LogSource {
    fn fetch_full_text(&mut self) -> Result<String, Box<dyn Error>>;
}

/// A public identity for a Steam id, as far as anyone downstream cares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub display_name: String,
    pub profile_url: Option<String>,
}

/// Resolves a Steam id to a display identity
///
/// The registry calls this at most once per distinct id for the lifetime of
/// the process, except after a failure: failed resolutions are not cached,
/// so the next appearance of the same id retries.
pub trait IdentityResolver {
    fn resolve(&mut self, steam_id: u64) -> Result<ResolvedIdentity, Box<dyn Error>>;
}

/// Reads the server log from a local path
///
/// Covers the common deployment where the monitor runs on the server host
/// (or something syncs the log file over). Reads the whole file each time;
/// Valheim logs stay small enough that this is not worth optimizing.
pub struct FileLogSource {
    path: PathBuf,
}

impl FileLogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LogSource for FileLogSource {
    fn fetch_full_text(&mut self) -> Result<String, Box<dyn Error>> {
        let text = fs::read_to_string(&self.path)?;
        debug!("Read {} bytes from {}", text.len(), self.path.display());
        Ok(text)
    }
}

/// Identity resolver for running without Steam Web API credentials
///
/// Derives a stable display name from the id and links the public community
/// profile page. Never fails, so every id counts as resolved on first sight.
pub struct OfflineResolver;

impl IdentityResolver for OfflineResolver {
    fn resolve(&mut self, steam_id: u64) -> Result<ResolvedIdentity, Box<dyn Error>> {
        Ok(ResolvedIdentity {
            display_name: format!("Player {}", steam_id),
            profile_url: Some(format!("https://steamcommunity.com/profiles/{}", steam_id)),
        })
    }
}
