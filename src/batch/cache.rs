use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, params};

use crate::util::{ensure_directory, now_utc_string};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub doc_id: String,
    pub page_id: u32,
}

impl CacheKey {
    pub fn new(doc_id: &str, page_id: u32) -> Self {
        Self {
            doc_id: doc_id.to_string(),
            page_id,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.doc_id, self.page_id)
    }
}

/// Write-once store of page transcriptions keyed by (doc_id, page_id).
pub trait TranscriptionCache {
    fn exists(&self, key: &CacheKey) -> Result<bool>;

    fn read(&self, key: &CacheKey) -> Result<String>;

    /// Fails if the key already holds a value.
    fn write(&self, key: &CacheKey, text: &str) -> Result<()>;

    /// Page ids cached for one document, ascending.
    fn list_pages(&self, doc_id: &str) -> Result<Vec<u32>>;
}

/// One text file per page: `<interim>/<doc_id>/ocr_text/page_<page_id>.txt`.
pub struct FileTranscriptionCache {
    root: PathBuf,
    page_file: Regex,
}

impl FileTranscriptionCache {
    pub fn new(root: &Path) -> Result<Self> {
        Ok(Self {
            root: root.to_path_buf(),
            page_file: Regex::new(r"^page_(\d+)\.txt$")
                .context("failed to compile cache filename regex")?,
        })
    }

    fn doc_dir(&self, doc_id: &str) -> PathBuf {
        self.root.join(doc_id).join("ocr_text")
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.doc_dir(&key.doc_id)
            .join(format!("page_{}.txt", key.page_id))
    }
}

impl TranscriptionCache for FileTranscriptionCache {
    fn exists(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.path_for(key).is_file())
    }

    fn read(&self, key: &CacheKey) -> Result<String> {
        let path = self.path_for(key);
        fs::read_to_string(&path)
            .with_context(|| format!("failed to read cached transcription {}", path.display()))
    }

    fn write(&self, key: &CacheKey, text: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            bail!("cache entry {} already exists at {}", key, path.display());
        }
        if let Some(parent) = path.parent() {
            ensure_directory(parent)?;
        }

        // Rename into place so an interrupted write never leaves a partial entry behind.
        let staging = path.with_extension("txt.partial");
        fs::write(&staging, text)
            .with_context(|| format!("failed to write {}", staging.display()))?;
        fs::rename(&staging, &path).with_context(|| {
            format!("failed to move {} to {}", staging.display(), path.display())
        })?;
        Ok(())
    }

    fn list_pages(&self, doc_id: &str) -> Result<Vec<u32>> {
        let dir = self.doc_dir(doc_id);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut pages = Vec::new();
        let entries =
            fs::read_dir(&dir).with_context(|| format!("failed to read {}", dir.display()))?;
        for entry in entries {
            let entry =
                entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(page_id) = self
                .page_file
                .captures(name)
                .and_then(|captures| captures.get(1))
                .and_then(|m| m.as_str().parse::<u32>().ok())
            {
                pages.push(page_id);
            }
        }
        pages.sort_unstable();
        Ok(pages)
    }
}

/// Single SQLite table; the primary key enforces write-once.
pub struct SqliteTranscriptionCache {
    connection: Connection,
}

impl SqliteTranscriptionCache {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            ensure_directory(parent)?;
        }
        let connection =
            Connection::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        Self::with_connection(connection)
    }

    pub fn with_connection(connection: Connection) -> Result<Self> {
        connection
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS transcriptions (
                    doc_id TEXT NOT NULL,
                    page_id INTEGER NOT NULL,
                    text TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    PRIMARY KEY (doc_id, page_id)
                );
                "#,
            )
            .context("failed to create transcriptions table")?;
        Ok(Self { connection })
    }
}

impl TranscriptionCache for SqliteTranscriptionCache {
    fn exists(&self, key: &CacheKey) -> Result<bool> {
        let found: Option<i64> = self
            .connection
            .query_row(
                "SELECT 1 FROM transcriptions WHERE doc_id = ?1 AND page_id = ?2",
                params![key.doc_id, key.page_id],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to look up cache entry {key}"))?;
        Ok(found.is_some())
    }

    fn read(&self, key: &CacheKey) -> Result<String> {
        self.connection
            .query_row(
                "SELECT text FROM transcriptions WHERE doc_id = ?1 AND page_id = ?2",
                params![key.doc_id, key.page_id],
                |row| row.get(0),
            )
            .with_context(|| format!("failed to read cache entry {key}"))
    }

    fn write(&self, key: &CacheKey, text: &str) -> Result<()> {
        self.connection
            .execute(
                "INSERT INTO transcriptions (doc_id, page_id, text, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![key.doc_id, key.page_id, text, now_utc_string()],
            )
            .with_context(|| format!("failed to write cache entry {key}"))?;
        Ok(())
    }

    fn list_pages(&self, doc_id: &str) -> Result<Vec<u32>> {
        let mut statement = self
            .connection
            .prepare("SELECT page_id FROM transcriptions WHERE doc_id = ?1 ORDER BY page_id")
            .context("failed to prepare cache listing")?;
        let pages = statement
            .query_map(params![doc_id], |row| row.get::<_, u32>(0))?
            .collect::<rusqlite::Result<Vec<u32>>>()
            .with_context(|| format!("failed to list cached pages for {doc_id}"))?;
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise_write_once(cache: &dyn TranscriptionCache) {
        let key = CacheKey::new("1704", 3);
        assert!(!cache.exists(&key).unwrap());

        cache.write(&key, "Rec'd of Mr Hale\n12 6 8").unwrap();
        assert!(cache.exists(&key).unwrap());
        assert_eq!(cache.read(&key).unwrap(), "Rec'd of Mr Hale\n12 6 8");

        assert!(cache.write(&key, "something else").is_err());
        assert_eq!(cache.read(&key).unwrap(), "Rec'd of Mr Hale\n12 6 8");
    }

    fn exercise_listing(cache: &dyn TranscriptionCache) {
        cache.write(&CacheKey::new("1712", 10), "ten").unwrap();
        cache.write(&CacheKey::new("1712", 2), "two").unwrap();
        cache.write(&CacheKey::new("1713", 1), "other doc").unwrap();

        assert_eq!(cache.list_pages("1712").unwrap(), vec![2, 10]);
        assert!(cache.list_pages("1800").unwrap().is_empty());
    }

    #[test]
    fn file_cache_is_write_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileTranscriptionCache::new(dir.path()).unwrap();
        exercise_write_once(&cache);

        let path = cache.path_for(&CacheKey::new("1704", 3));
        assert!(path.ends_with("1704/ocr_text/page_3.txt"));
        assert!(!path.with_extension("txt.partial").exists());
    }

    #[test]
    fn file_cache_lists_pages_and_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileTranscriptionCache::new(dir.path()).unwrap();
        exercise_listing(&cache);

        fs::write(dir.path().join("1712/ocr_text/notes.md"), "x").unwrap();
        assert_eq!(cache.list_pages("1712").unwrap(), vec![2, 10]);
    }

    #[test]
    fn file_cache_keeps_empty_transcriptions() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileTranscriptionCache::new(dir.path()).unwrap();
        let key = CacheKey::new("1704", 1);
        cache.write(&key, "").unwrap();
        assert!(cache.exists(&key).unwrap());
        assert_eq!(cache.read(&key).unwrap(), "");
    }

    #[test]
    fn sqlite_cache_is_write_once() {
        let cache = SqliteTranscriptionCache::with_connection(Connection::open_in_memory().unwrap())
            .unwrap();
        exercise_write_once(&cache);
    }

    #[test]
    fn sqlite_cache_lists_pages() {
        let cache = SqliteTranscriptionCache::with_connection(Connection::open_in_memory().unwrap())
            .unwrap();
        exercise_listing(&cache);
    }

    #[test]
    fn sqlite_cache_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("interim").join("transcriptions.sqlite");
        {
            let cache = SqliteTranscriptionCache::open(&path).unwrap();
            cache.write(&CacheKey::new("1704", 1), "page one").unwrap();
        }
        let cache = SqliteTranscriptionCache::open(&path).unwrap();
        assert_eq!(cache.read(&CacheKey::new("1704", 1)).unwrap(), "page one");
    }
}
