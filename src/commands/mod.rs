pub mod inventory;
pub mod run;
pub mod status;

use anyhow::Result;

use crate::batch::cache::{
    FileTranscriptionCache, SqliteTranscriptionCache, TranscriptionCache,
};
use crate::cli::CacheBackend;
use crate::config::DataLayout;

pub(crate) fn open_cache(
    backend: CacheBackend,
    layout: &DataLayout,
) -> Result<Box<dyn TranscriptionCache>> {
    let cache: Box<dyn TranscriptionCache> = match backend {
        CacheBackend::Files => Box::new(FileTranscriptionCache::new(&layout.interim_dir())?),
        CacheBackend::Sqlite => {
            Box::new(SqliteTranscriptionCache::open(&layout.sqlite_cache_path())?)
        }
    };
    Ok(cache)
}
