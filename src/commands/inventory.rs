use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::batch::discovery::discover_pdfs;
use crate::cli::InventoryArgs;
use crate::config::DataLayout;
use crate::model::{DocumentEntry, DocumentInventoryManifest};
use crate::util::{now_utc_string, sha256_file, write_json_pretty};

pub const INVENTORY_MANIFEST_NAME: &str = "document_inventory.json";

pub fn run(args: InventoryArgs) -> Result<()> {
    let layout = DataLayout::new(&args.data_root);
    let manifest = build_manifest(&layout.raw_dir())?;

    if args.dry_run {
        info!(
            document_count = manifest.document_count,
            source = %manifest.source_directory,
            "inventory dry-run complete"
        );
        return Ok(());
    }

    let manifest_path = args
        .manifest_path
        .unwrap_or_else(|| layout.manifest_dir().join(INVENTORY_MANIFEST_NAME));

    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote inventory manifest");
    info!(document_count = manifest.document_count, "inventory completed");

    Ok(())
}

/// One entry per `<doc_id>.pdf`, ordered by doc id.
pub fn build_manifest(raw_dir: &Path) -> Result<DocumentInventoryManifest> {
    let pdf_paths = discover_pdfs(raw_dir)?;
    if pdf_paths.is_empty() {
        bail!("no PDFs found in {}", raw_dir.display());
    }

    let mut documents = Vec::with_capacity(pdf_paths.len());
    for path in pdf_paths {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToOwned::to_owned)
            .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))?;
        let doc_id = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(ToOwned::to_owned)
            .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))?;
        let size_bytes = fs::metadata(&path)
            .with_context(|| format!("failed to stat {}", path.display()))?
            .len();

        documents.push(DocumentEntry {
            doc_id,
            filename,
            size_bytes,
            sha256: sha256_file(&path)?,
        });
    }

    documents.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));

    Ok(DocumentInventoryManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        source_directory: raw_dir.display().to_string(),
        document_count: documents.len(),
        documents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_lists_documents_with_hashes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("1712.pdf"), b"abc").unwrap();
        fs::write(dir.path().join("1704.pdf"), b"").unwrap();
        fs::write(dir.path().join("readme.txt"), b"ignored").unwrap();

        let manifest = build_manifest(dir.path()).unwrap();

        assert_eq!(manifest.document_count, 2);
        assert_eq!(manifest.documents[0].doc_id, "1704");
        assert_eq!(manifest.documents[1].filename, "1712.pdf");
        assert_eq!(manifest.documents[1].size_bytes, 3);
        assert_eq!(
            manifest.documents[1].sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn empty_raw_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(build_manifest(dir.path()).is_err());
    }

    #[test]
    fn run_writes_default_manifest_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("raw")).unwrap();
        fs::write(dir.path().join("raw").join("1704.pdf"), b"%PDF").unwrap();

        run(InventoryArgs {
            data_root: dir.path().to_path_buf(),
            manifest_path: None,
            dry_run: false,
        })
        .unwrap();

        let written: DocumentInventoryManifest = crate::util::read_json(
            &dir.path().join("manifests").join(INVENTORY_MANIFEST_NAME),
        )
        .unwrap();
        assert_eq!(written.document_count, 1);
    }
}
