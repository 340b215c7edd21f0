//! Server-wide ban list, looked up by IP address or device id

use crate::error::ServerError;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub reason: String,
}

impl BanEntry {
    fn matches(&self, device_id: Option<&str>, ip: Option<&str>) -> bool {
        let same = |stored: &Option<String>, wanted: Option<&str>| match (stored, wanted) {
            (Some(stored), Some(wanted)) => !wanted.is_empty() && stored == wanted,
            _ => false,
        };

        same(&self.ip, ip) || same(&self.device_id, device_id)
    }
}

/// Ban records, optionally mirrored to a JSON file after every change
///
/// Changes are applied in memory under the lock and written out after it is
/// released. Inside a tokio runtime the write runs on the blocking pool, so
/// the caller's task never waits on the disk.
#[derive(Debug, Default)]
pub struct BanManager {
    entries: RwLock<Vec<BanEntry>>,
    path: Option<PathBuf>,
    /// Bumped under the entries lock on every change
    generation: AtomicU64,
    /// Generation currently on disk; held for the length of a write
    written: Arc<Mutex<u64>>,
}

/// Copy of the list taken at one generation
#[derive(Debug)]
struct Snapshot {
    generation: u64,
    entries: Vec<BanEntry>,
}

/// Writes a snapshot unless a newer one already reached the disk
fn write_snapshot(path: &Path, written: &Mutex<u64>, snapshot: Snapshot) -> Result<(), ServerError> {
    let mut on_disk = written.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if *on_disk >= snapshot.generation {
        return Ok(());
    }

    let json = serde_json::to_string_pretty(&snapshot.entries)?;
    std::fs::write(path, json)?;
    *on_disk = snapshot.generation;
    Ok(())
}

fn is_ip(identifier: &str) -> bool {
    identifier.parse::<IpAddr>().is_ok()
}

impl BanManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the list from `path`, starting empty if the file does not exist
    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let entries = if path.exists() {
            let json = std::fs::read_to_string(path)?;
            serde_json::from_str(&json)?
        } else {
            Vec::new()
        };

        info!("Loaded {} ban entries from {}", entries.len(), path.display());

        Ok(Self {
            entries: RwLock::new(entries),
            path: Some(path.to_path_buf()),
            ..Self::default()
        })
    }

    /// Must be called with the write guard held so generations follow the
    /// order of the changes
    fn snapshot(&self, entries: &[BanEntry]) -> Option<Snapshot> {
        self.path.as_ref()?;
        Some(Snapshot {
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
            entries: entries.to_vec(),
        })
    }

    fn persist(&self, snapshot: Option<Snapshot>) {
        let (Some(snapshot), Some(path)) = (snapshot, self.path.clone()) else {
            return;
        };
        let written = Arc::clone(&self.written);

        let save = move || {
            if let Err(e) = write_snapshot(&path, &written, snapshot) {
                error!("Failed to write ban list to {}: {}", path.display(), e);
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(save);
            }
            Err(_) => save(),
        }
    }

    /// Writes the current list and waits for it to reach the disk
    pub async fn flush(&self) -> Result<(), ServerError> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let snapshot = {
            let entries = self.read();
            Snapshot {
                generation: self.generation.load(Ordering::SeqCst),
                entries: entries.clone(),
            }
        };
        let written = Arc::clone(&self.written);

        tokio::task::spawn_blocking(move || write_snapshot(&path, &written, snapshot))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<BanEntry>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<BanEntry>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Bans a connected client by both its address and device id.
    /// Returns false if either identifier was already banned.
    pub fn ban_client(&self, name: &str, ip: IpAddr, device_id: &str, reason: &str) -> bool {
        let ip = ip.to_string();
        let device_id = (!device_id.is_empty()).then(|| device_id.to_string());

        let snapshot = {
            let mut entries = self.write();
            if entries
                .iter()
                .any(|entry| entry.matches(device_id.as_deref(), Some(ip.as_str())))
            {
                return false;
            }

            entries.push(BanEntry {
                name: Some(name.to_string()),
                ip: Some(ip),
                device_id,
                reason: reason.to_string(),
            });
            self.snapshot(&entries)
        };
        self.persist(snapshot);
        true
    }

    /// Bans an identifier, read as an IP address if it parses as one and as a
    /// device id otherwise. Returns false if it was already banned.
    pub fn ban(&self, identifier: &str, reason: &str) -> bool {
        if identifier.is_empty() {
            return false;
        }

        let (ip, device_id) = if is_ip(identifier) {
            (Some(identifier.to_string()), None)
        } else {
            (None, Some(identifier.to_string()))
        };

        let snapshot = {
            let mut entries = self.write();
            if find(&entries, identifier).is_some() {
                return false;
            }

            entries.push(BanEntry {
                name: None,
                ip,
                device_id,
                reason: reason.to_string(),
            });
            self.snapshot(&entries)
        };
        self.persist(snapshot);
        true
    }

    /// Removes every entry for the identifier; true if any existed
    pub fn unban(&self, identifier: &str) -> bool {
        let snapshot = {
            let mut entries = self.write();
            let before = entries.len();

            if is_ip(identifier) {
                entries.retain(|entry| entry.ip.as_deref() != Some(identifier));
            } else {
                entries.retain(|entry| entry.device_id.as_deref() != Some(identifier));
            }

            if entries.len() == before {
                return false;
            }
            self.snapshot(&entries)
        };
        self.persist(snapshot);
        true
    }

    pub fn is_banned(&self, device_id: &str, ip: IpAddr) -> bool {
        self.find_ban(device_id, ip).is_some()
    }

    /// Entry matching the device id first, then the address
    pub fn find_ban(&self, device_id: &str, ip: IpAddr) -> Option<BanEntry> {
        let entries = self.read();
        let ip = ip.to_string();

        entries
            .iter()
            .find(|entry| entry.matches(Some(device_id), None))
            .or_else(|| entries.iter().find(|entry| entry.matches(None, Some(ip.as_str()))))
            .cloned()
    }

    pub fn get(&self, identifier: &str) -> Option<BanEntry> {
        find(&self.read(), identifier).cloned()
    }

    pub fn entries(&self) -> Vec<BanEntry> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

fn find<'a>(entries: &'a [BanEntry], identifier: &str) -> Option<&'a BanEntry> {
    if is_ip(identifier) {
        entries.iter().find(|entry| entry.matches(None, Some(identifier)))
    } else {
        entries
            .iter()
            .find(|entry| entry.matches(Some(identifier), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICE: &str = "0123456789abcdef0123456789abcdef";

    fn test_ip() -> IpAddr {
        "10.0.0.1".parse().unwrap()
    }

    #[test]
    fn test_ban_is_idempotent() {
        let bans = BanManager::new();

        assert!(bans.ban("10.0.0.1", "spam"));
        assert!(!bans.ban("10.0.0.1", "spam again"));
        assert_eq!(bans.len(), 1);

        assert!(bans.ban(DEVICE, ""));
        assert!(!bans.ban(DEVICE, ""));
        assert_eq!(bans.len(), 2);
    }

    #[test]
    fn test_identifier_kind() {
        let bans = BanManager::new();
        bans.ban("10.0.0.1", "");
        bans.ban(DEVICE, "");

        let by_ip = bans.get("10.0.0.1").unwrap();
        assert_eq!(by_ip.ip.as_deref(), Some("10.0.0.1"));
        assert!(by_ip.device_id.is_none());

        let by_device = bans.get(DEVICE).unwrap();
        assert_eq!(by_device.device_id.as_deref(), Some(DEVICE));
        assert!(by_device.ip.is_none());
    }

    #[test]
    fn test_is_banned_by_ip_or_device() {
        let bans = BanManager::new();
        bans.ban_client("Red", test_ip(), DEVICE, "cheating");

        assert!(bans.is_banned(DEVICE, "10.9.9.9".parse().unwrap()));
        assert!(bans.is_banned("", test_ip()));
        assert!(!bans.is_banned("", "10.9.9.9".parse().unwrap()));
        assert_eq!(bans.find_ban(DEVICE, test_ip()).unwrap().reason, "cheating");
    }

    #[test]
    fn test_empty_device_id_never_matches() {
        let bans = BanManager::new();
        bans.ban_client("Red", test_ip(), "", "");

        assert!(!bans.is_banned("", "10.9.9.9".parse().unwrap()));
    }

    #[test]
    fn test_ban_client_is_idempotent() {
        let bans = BanManager::new();
        assert!(bans.ban_client("Red", test_ip(), DEVICE, ""));
        assert!(!bans.ban_client("Red", test_ip(), DEVICE, ""));
        assert_eq!(bans.len(), 1);
    }

    #[test]
    fn test_unban_reports_existence() {
        let bans = BanManager::new();
        bans.ban("10.0.0.1", "");

        assert!(bans.unban("10.0.0.1"));
        assert!(!bans.unban("10.0.0.1"));
        assert!(bans.is_empty());
    }

    #[test]
    fn test_persistence() {
        let path = std::env::temp_dir().join(format!("bans-{}.json", std::process::id()));
        let _ = std::fs::remove_file(&path);

        {
            let bans = BanManager::load(&path).unwrap();
            assert!(bans.is_empty());
            bans.ban(DEVICE, "alt account");
        }

        let reloaded = BanManager::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get(DEVICE).unwrap().reason, "alt account");

        let _ = std::fs::remove_file(&path);
    }

    fn temp_ban_file(tag: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("bans-{}-{}.json", tag, std::process::id()));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn test_changes_reach_disk_from_runtime() {
        let path = temp_ban_file("runtime");
        let bans = BanManager::load(&path).unwrap();

        assert!(bans.ban(DEVICE, "alt account"));
        assert!(bans.ban("10.0.0.9", "spam"));

        let mut on_disk = 0;
        for _ in 0..100 {
            on_disk = BanManager::load(&path).map(|loaded| loaded.len()).unwrap_or(0);
            if on_disk == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(on_disk, 2);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_flush_writes_latest_list() {
        let path = temp_ban_file("flush");
        let bans = BanManager::load(&path).unwrap();

        bans.ban(DEVICE, "alt account");
        bans.ban("10.0.0.9", "spam");
        assert!(bans.unban(DEVICE));
        bans.flush().await.unwrap();

        let reloaded = BanManager::load(&path).unwrap();
        assert_eq!(reloaded.entries(), bans.entries());
        assert!(reloaded.get(DEVICE).is_none());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_flush_without_file_is_noop() {
        let bans = BanManager::new();
        bans.ban(DEVICE, "");
        assert!(bans.flush().await.is_ok());
    }
}
