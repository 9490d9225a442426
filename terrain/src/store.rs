//! Persistent tier byte stores.

use crate::TerrainError;
use dashmap::DashMap;
use log::debug;
use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use terrain_rgb::TileKey;

/// Durable key to bytes storage backing a [`TileCache`](crate::TileCache).
///
/// Implementations must make `put` atomic with respect to `get`: a
/// reader sees either the previous value or the new one, never a
/// partial write.
pub trait TileStore: Send + Sync {
    fn get(&self, key: TileKey) -> Result<Option<Vec<u8>>, TerrainError>;
    fn put(&self, key: TileKey, bytes: &[u8]) -> Result<(), TerrainError>;
    fn exists(&self, key: TileKey) -> bool;
    fn delete(&self, key: TileKey) -> Result<(), TerrainError>;

    /// Removes every entry, leaving an empty, usable store.
    fn clear(&self) -> Result<(), TerrainError>;

    /// Returns the number of bytes held by all entries.
    fn total_bytes(&self) -> u64;
}

/// One file per tile under `root/{z}/{x}/{y}.elev`.
///
/// Writes go to a uniquely named temp file in the tile's directory and
/// are renamed into place, so any number of stores, in any number of
/// processes, may share a root.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    const EXTENSION: &'static str = "elev";

    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, TerrainError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, TileKey { zoom, x, y }: TileKey) -> PathBuf {
        let mut path = self.root.join(zoom.to_string()).join(x.to_string());
        path.push(format!("{y}.{}", Self::EXTENSION));
        path
    }
}

impl TileStore for FileStore {
    fn get(&self, key: TileKey) -> Result<Option<Vec<u8>>, TerrainError> {
        match fs::read(self.path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: TileKey, bytes: &[u8]) -> Result<(), TerrainError> {
        let path = self.path(key);
        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent)?;
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(bytes)?;
        // A failed persist drops, and so removes, the temp file.
        tmp.persist(&path).map_err(|e| e.error)?;
        debug!("stored {key} at {path:?}");
        Ok(())
    }

    fn exists(&self, key: TileKey) -> bool {
        self.path(key).is_file()
    }

    fn delete(&self, key: TileKey) -> Result<(), TerrainError> {
        match fs::remove_file(self.path(key)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn clear(&self) -> Result<(), TerrainError> {
        match fs::remove_dir_all(&self.root) {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
            _ => (),
        }
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    fn total_bytes(&self) -> u64 {
        dir_size(&self.root)
    }
}

fn dir_size(dir: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .map(|entry| match entry.metadata() {
            Ok(meta) if meta.is_dir() => dir_size(&entry.path()),
            Ok(meta) => meta.len(),
            Err(_) => 0,
        })
        .sum()
}

/// In-memory store, useful for embedders without a writable disk and
/// for tests.
#[derive(Debug, Default)]
pub struct MemStore {
    entries: DashMap<TileKey, Vec<u8>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TileStore for MemStore {
    fn get(&self, key: TileKey) -> Result<Option<Vec<u8>>, TerrainError> {
        Ok(self.entries.get(&key).map(|bytes| bytes.clone()))
    }

    fn put(&self, key: TileKey, bytes: &[u8]) -> Result<(), TerrainError> {
        self.entries.insert(key, bytes.to_vec());
        Ok(())
    }

    fn exists(&self, key: TileKey) -> bool {
        self.entries.contains_key(&key)
    }

    fn delete(&self, key: TileKey) -> Result<(), TerrainError> {
        self.entries.remove(&key);
        Ok(())
    }

    fn clear(&self) -> Result<(), TerrainError> {
        self.entries.clear();
        Ok(())
    }

    fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|entry| entry.len() as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::{FileStore, MemStore, TileStore};
    use terrain_rgb::TileKey;

    const KEY: TileKey = TileKey {
        zoom: 14,
        x: 2650,
        y: 5710,
    };

    fn exercise(store: &dyn TileStore) {
        assert!(!store.exists(KEY));
        assert_eq!(store.get(KEY).unwrap(), None);
        assert_eq!(store.total_bytes(), 0);

        store.put(KEY, &[1, 2, 3]).unwrap();
        assert!(store.exists(KEY));
        assert_eq!(store.get(KEY).unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(store.total_bytes(), 3);

        store.put(KEY, &[4, 5]).unwrap();
        assert_eq!(store.get(KEY).unwrap(), Some(vec![4, 5]));
        assert_eq!(store.total_bytes(), 2);

        store.delete(KEY).unwrap();
        assert!(!store.exists(KEY));
        // Deleting twice is fine.
        store.delete(KEY).unwrap();

        store.put(KEY, &[1]).unwrap();
        store.clear().unwrap();
        assert!(!store.exists(KEY));
        store.put(KEY, &[9]).unwrap();
        assert_eq!(store.get(KEY).unwrap(), Some(vec![9]));
    }

    #[test]
    fn test_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("tiles")).unwrap();
        exercise(&store);
        assert_eq!(
            store.path(KEY),
            dir.path().join("tiles").join("14").join("2650").join("5710.elev")
        );
    }

    #[test]
    fn test_file_store_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.put(KEY, &[0; 64]).unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path().join("14").join("2650"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("5710.elev")]);
    }

    #[test]
    fn test_file_stores_share_a_root() {
        let dir = tempfile::tempdir().unwrap();
        let stores: Vec<_> = (0..4).map(|_| FileStore::open(dir.path()).unwrap()).collect();
        std::thread::scope(|s| {
            for (i, store) in stores.iter().enumerate() {
                s.spawn(move || {
                    for _ in 0..50 {
                        store.put(KEY, &[i as u8; 256]).unwrap();
                    }
                });
            }
        });
        let bytes = stores[0].get(KEY).unwrap().unwrap();
        assert_eq!(bytes.len(), 256);
        assert!(bytes.iter().all(|b| *b == bytes[0]));
        let names: Vec<_> = std::fs::read_dir(dir.path().join("14").join("2650"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("5710.elev")]);
    }

    #[test]
    fn test_mem_store() {
        let store = MemStore::new();
        exercise(&store);
        assert_eq!(store.len(), 1);
    }
}
