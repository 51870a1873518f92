//! Cross-process file locking built on a canonical-path registry.
//!
//! [`locking_file`] hands out one [`LockingFile`] per filesystem entity:
//! lookups through any alias of a path (relative, symlinked, redundant
//! components) resolve to the same instance, which is what lets the
//! in-process gate and the OS lock compose correctly. The registry holds
//! its values weakly so unused entries can be dropped, but any instance
//! that currently holds an OS lock is pinned in a process-wide set and
//! survives until its final `unlock`.

mod gate;
mod locking;

use std::collections::HashMap;
use std::env;
use std::fs;
use std::hash::Hash;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Weak};

use parking_lot::Mutex;

pub use locking::{LockError, LockMode, LockingFile};

/// A path that has been fully canonicalised: absolute, symlinks resolved,
/// no redundant components. One instance exists per entity while any
/// reference to it is alive.
#[derive(Debug)]
pub struct CanonicalPath(PathBuf);

impl CanonicalPath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for CanonicalPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// A map whose values are held weakly; dead entries are purged on every
/// access and lookups atomically get-or-compute.
struct WeakValueMap<K, V> {
    entries: Mutex<HashMap<K, Weak<V>>>,
}

impl<K: Eq + Hash, V> WeakValueMap<K, V> {
    fn new() -> Self {
        WeakValueMap { entries: Mutex::new(HashMap::new()) }
    }

    fn get(&self, key: &K) -> Option<Arc<V>> {
        let mut entries = self.entries.lock();
        entries.retain(|_, value| value.strong_count() > 0);
        entries.get(key).and_then(Weak::upgrade)
    }

    fn get_or_insert_with(&self, key: K, make: impl FnOnce() -> Arc<V>) -> Arc<V> {
        let mut entries = self.entries.lock();
        entries.retain(|_, value| value.strong_count() > 0);
        if let Some(found) = entries.get(&key).and_then(Weak::upgrade) {
            return found;
        }
        let value = make();
        entries.insert(key, Arc::downgrade(&value));
        value
    }

    /// Register an additional key for an existing value.
    fn insert_alias(&self, key: K, value: &Arc<V>) {
        self.entries.lock().insert(key, Arc::downgrade(value));
    }
}

/// Map of paths to canonical files.
static CANON_FILES: LazyLock<WeakValueMap<PathBuf, CanonicalPath>> =
    LazyLock::new(WeakValueMap::new);

/// Map of canonical paths to locking files.
static CANON_LOCKS: LazyLock<WeakValueMap<PathBuf, LockingFile>> =
    LazyLock::new(WeakValueMap::new);

/// Set of locked files, held strongly to keep them out of the weak maps'
/// reclamation while an OS lock is outstanding.
static PINNED: LazyLock<Mutex<HashMap<PathBuf, Arc<LockingFile>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

pub(crate) fn pin(lock: &Arc<LockingFile>) {
    PINNED.lock().insert(lock.path().to_path_buf(), Arc::clone(lock));
}

pub(crate) fn unpin(lock: &LockingFile) {
    PINNED.lock().remove(lock.path());
}

fn absolute(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(env::current_dir()?.join(path))
    }
}

/// Resolve a path that may not exist yet: an existing path canonicalises
/// directly; otherwise the parent directories are created and
/// canonicalised, and the file name re-appended.
fn resolve(path: &Path) -> io::Result<PathBuf> {
    let path = absolute(path)?;
    if path.exists() {
        return fs::canonicalize(&path);
    }
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("cannot resolve a file system root: {}", path.display()),
        )
    })?;
    if !parent.exists() {
        fs::create_dir_all(parent)?;
    }
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path has no file name: {}", path.display()),
        )
    })?;
    Ok(fs::canonicalize(parent)?.join(name))
}

/// Get a really canonical file: the result is canonical and a singleton
/// within the process, via any alias of the path.
pub fn canonical_file(path: impl AsRef<Path>) -> io::Result<Arc<CanonicalPath>> {
    let given = absolute(path.as_ref())?;
    if let Some(found) = CANON_FILES.get(&given) {
        return Ok(found);
    }

    let canon = resolve(&given)?;
    let entry = {
        let key = canon.clone();
        CANON_FILES.get_or_insert_with(key, || Arc::new(CanonicalPath(canon.clone())))
    };
    if entry.as_path() != given {
        // short-circuit future lookups through this alias
        CANON_FILES.insert_alias(given, &entry);
    }
    Ok(entry)
}

/// Get the file that acts as a lock on `path` against other threads and
/// other processes.
///
/// For a directory the lock file is `<dir>/.lock`; for a regular file it
/// is the sibling with `.lock` appended to the name. One [`LockingFile`]
/// exists per filesystem entity, whichever alias it is looked up by.
pub fn locking_file(path: impl AsRef<Path>) -> io::Result<Arc<LockingFile>> {
    let real = resolve(path.as_ref())?;
    Ok(CANON_LOCKS.get_or_insert_with(real.clone(), || Arc::new(LockingFile::new(real.clone()))))
}

/// Convert a specification that may be a plain path or a `file:` URI into
/// an absolute path.
pub fn to_path(path_or_uri: &str) -> io::Result<PathBuf> {
    let path = path_or_uri.strip_prefix("file://").unwrap_or(path_or_uri);
    absolute(Path::new(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_file_is_a_singleton() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("file.txt");
        fs::write(&target, b"x").unwrap();

        let direct = canonical_file(&target).unwrap();
        let via_alias = canonical_file(dir.path().join("sub/../file.txt")).unwrap();
        assert!(Arc::ptr_eq(&direct, &via_alias));
    }

    #[test]
    fn canonical_file_survives_while_referenced() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("kept.txt");
        fs::write(&target, b"x").unwrap();

        let first = canonical_file(&target).unwrap();
        let again = canonical_file(&target).unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        // after all references go, a fresh instance may be created
        let old = Arc::as_ptr(&first);
        drop(first);
        drop(again);
        let fresh = canonical_file(&target).unwrap();
        assert_eq!(fresh.as_path(), fs::canonicalize(&target).unwrap());
        let _ = old;
    }

    #[test]
    fn locking_file_resolves_aliases_to_one_instance() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("data.bin");

        let direct = locking_file(&target).unwrap();
        let via_alias = locking_file(dir.path().join(".").join("data.bin")).unwrap();
        assert!(Arc::ptr_eq(&direct, &via_alias));
        let canon = fs::canonicalize(dir.path()).unwrap();
        assert_eq!(direct.path(), canon.join("data.bin.lock"));
    }

    #[test]
    fn locking_file_creates_missing_parents() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b/c.txt");
        let lock = locking_file(&target).unwrap();
        assert!(dir.path().join("a/b").is_dir());
        let canon = fs::canonicalize(dir.path().join("a/b")).unwrap();
        assert_eq!(lock.protected_path(), canon.join("c.txt"));
    }

    #[test]
    fn to_path_accepts_uri_and_plain() {
        assert_eq!(to_path("file:///tmp/x").unwrap(), PathBuf::from("/tmp/x"));
        assert_eq!(to_path("/tmp/x").unwrap(), PathBuf::from("/tmp/x"));
    }
}
