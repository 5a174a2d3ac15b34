use std::future::Future;
use std::path::{Component, Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::domain::errors::StorageError;

/// Storage behind the `/files/*` routes. Names are the raw route suffix, implementations decide
/// how (and whether) they map onto real paths.
pub trait FileStore: Send + Sync {
    /// Size in bytes of the named entry.
    fn stat(&self, name: &str) -> impl Future<Output = Result<u64, StorageError>> + Send;

    fn read_all(&self, name: &str) -> impl Future<Output = Result<Vec<u8>, StorageError>> + Send;

    /// Truncating create. Only returns once the bytes reached stable storage.
    fn create_and_write(
        &self,
        name: &str,
        contents: &[u8],
    ) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// [FileStore] rooted at a single directory of the local filesystem.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Joins `name` onto the root, refusing anything but one plain path component so a request
    /// can never escape the root (`..`, absolute paths, nested separators).
    pub fn resolve(&self, name: &str) -> Result<PathBuf, StorageError> {
        let invalid = || StorageError::InvalidName(name.to_owned());

        if name.is_empty() || name.contains(['/', '\\', '\0']) {
            return Err(invalid());
        }

        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(file)), None) => Ok(self.root.join(file)),
            _ => Err(invalid()),
        }
    }
}

impl FileStore for DirectoryStore {
    async fn stat(&self, name: &str) -> Result<u64, StorageError> {
        let path = self.resolve(name)?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(StorageError::from_stat)?;

        if !metadata.is_file() {
            return Err(StorageError::NotFound);
        }
        Ok(metadata.len())
    }

    async fn read_all(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(name)?;
        fs::read(&path).await.map_err(StorageError::from_stat)
    }

    async fn create_and_write(&self, name: &str, contents: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(name)?;
        let mut file = File::create(&path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Fresh empty directory under the system temp dir, removed again on drop.
    pub(crate) struct TempRoot(PathBuf);

    impl TempRoot {
        pub(crate) fn new() -> Self {
            let dir =
                std::env::temp_dir().join(format!("garcon-test-{:016x}", fastrand::u64(..)));
            std::fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }

        pub(crate) fn path(&self) -> &Path {
            &self.0
        }

        pub(crate) fn store(&self) -> DirectoryStore {
            DirectoryStore::new(self.path())
        }
    }

    impl Drop for TempRoot {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn success_temp_root_removed_on_drop() {
        let root = TempRoot::new();
        let path = root.path().to_path_buf();
        std::fs::write(path.join("a.txt"), b"x").unwrap();
        assert!(path.is_dir());

        drop(root);
        assert!(!path.exists());
    }

    #[test]
    fn success_resolve_plain_name() {
        let store = DirectoryStore::new("/srv/files");
        assert_eq!(
            store.resolve("a.txt").unwrap(),
            PathBuf::from("/srv/files/a.txt")
        );
        assert_eq!(
            store.resolve("..hidden").unwrap(),
            PathBuf::from("/srv/files/..hidden")
        );
    }

    #[test]
    fn failure_resolve_traversal() {
        let store = DirectoryStore::new("/srv/files");
        for name in ["", ".", "..", "../etc/passwd", "/etc/passwd", "a/b", "a\\..\\b", "./a"] {
            match store.resolve(name) {
                Err(StorageError::InvalidName(n)) => assert_eq!(n, name),
                other => panic!("{name:?} resolved to {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn success_write_then_read() {
        let root = TempRoot::new();
        let store = root.store();

        store.create_and_write("a.txt", b"hello").await.unwrap();
        assert_eq!(store.stat("a.txt").await.unwrap(), 5);
        assert_eq!(store.read_all("a.txt").await.unwrap(), b"hello");

        // truncates
        store.create_and_write("a.txt", b"hi").await.unwrap();
        assert_eq!(store.read_all("a.txt").await.unwrap(), b"hi");
    }

    #[tokio::test]
    async fn failure_stat_missing() {
        let root = TempRoot::new();
        let store = root.store();
        assert!(matches!(
            store.stat("missing.txt").await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn failure_stat_directory() {
        let root = TempRoot::new();
        std::fs::create_dir(root.path().join("sub")).unwrap();
        let store = root.store();
        assert!(matches!(store.stat("sub").await, Err(StorageError::NotFound)));
    }

    #[tokio::test]
    async fn failure_create_in_missing_root() {
        let root = TempRoot::new();
        let store = DirectoryStore::new(root.path().join("does-not-exist"));
        assert!(matches!(
            store.create_and_write("a.txt", b"x").await,
            Err(StorageError::Io(_))
        ));
    }
}
