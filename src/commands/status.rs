use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::inventory::INVENTORY_MANIFEST_NAME;
use super::open_cache;
use super::run::RUN_MANIFEST_PREFIX;
use crate::batch::discovery::{DocumentSource, RawDirSource};
use crate::cli::{CacheBackend, StatusArgs};
use crate::config::DataLayout;
use crate::model::{DocumentInventoryManifest, RunManifest};
use crate::util::read_json;

pub fn run(args: StatusArgs) -> Result<()> {
    let layout = DataLayout::new(&args.data_root);
    let manifest_dir = layout.manifest_dir();
    let inventory_path = manifest_dir.join(INVENTORY_MANIFEST_NAME);

    info!(data_root = %layout.root().display(), "status requested");

    match latest_run_manifest(&manifest_dir)? {
        Some(path) => {
            let manifest: RunManifest = read_json(&path)?;
            info!(
                run_id = %manifest.run_id,
                status = %manifest.status,
                started_at = %manifest.started_at,
                updated_at = %manifest.updated_at,
                cache_backend = %manifest.cache_backend,
                documents = manifest.counts.documents,
                pages = manifest.counts.pages,
                rows = manifest.counts.rows,
                cache_hits = manifest.counts.cache_hits,
                transcriptions = manifest.counts.transcriptions,
                classifier_fallbacks = manifest.counts.classifier_fallbacks,
                extractor_fallbacks = manifest.counts.extractor_fallbacks,
                failure_reason = %manifest.failure_reason.unwrap_or_default(),
                "loaded latest run manifest"
            );
        }
        None => warn!(dir = %manifest_dir.display(), "no run manifest found"),
    }

    let doc_ids = if inventory_path.exists() {
        let inventory: DocumentInventoryManifest = read_json(&inventory_path)?;
        info!(
            generated_at = %inventory.generated_at,
            document_count = inventory.document_count,
            "loaded inventory manifest"
        );
        inventory
            .documents
            .into_iter()
            .map(|entry| entry.doc_id)
            .collect()
    } else if layout.raw_dir().is_dir() {
        warn!(
            path = %inventory_path.display(),
            "inventory manifest missing, scanning raw directory"
        );
        RawDirSource::new(&layout.raw_dir()).list_doc_ids()?
    } else {
        warn!(path = %layout.raw_dir().display(), "raw directory missing");
        Vec::new()
    };

    // Opening the SQLite backend would create an empty database.
    if args.cache_backend == CacheBackend::Sqlite && !layout.sqlite_cache_path().exists() {
        warn!(path = %layout.sqlite_cache_path().display(), "transcription cache missing");
        return Ok(());
    }

    let cache = open_cache(args.cache_backend, &layout)?;
    let mut cached_total = 0;
    for doc_id in &doc_ids {
        let pages = cache.list_pages(doc_id)?;
        cached_total += pages.len();
        info!(
            doc_id = %doc_id,
            cached_pages = pages.len(),
            last_page = pages.last().copied().unwrap_or_default(),
            "cache status"
        );
    }
    info!(
        backend = args.cache_backend.as_str(),
        documents = doc_ids.len(),
        cached_pages = cached_total,
        "transcription cache status"
    );

    Ok(())
}

/// Run manifests carry a compact UTC timestamp, so the greatest name is the newest.
fn latest_run_manifest(manifest_dir: &Path) -> Result<Option<PathBuf>> {
    if !manifest_dir.is_dir() {
        return Ok(None);
    }

    let mut latest: Option<PathBuf> = None;
    for entry in fs::read_dir(manifest_dir)
        .with_context(|| format!("failed to read {}", manifest_dir.display()))?
    {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", manifest_dir.display()))?;
        let path = entry.path();
        let is_run_manifest = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(RUN_MANIFEST_PREFIX) && name.ends_with(".json"));
        if is_run_manifest && latest.as_ref().is_none_or(|current| path > *current) {
            latest = Some(path);
        }
    }

    Ok(latest)
}
