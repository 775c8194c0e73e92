use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::debug;

/// Lists the documents a run should process.
pub trait DocumentSource {
    fn list_doc_ids(&self) -> Result<Vec<String>>;
}

/// Every `<raw_dir>/<doc_id>.pdf`, ordered by doc id.
pub struct RawDirSource {
    raw_dir: PathBuf,
    only: Vec<String>,
}

impl RawDirSource {
    pub fn new(raw_dir: &Path) -> Self {
        Self {
            raw_dir: raw_dir.to_path_buf(),
            only: Vec::new(),
        }
    }

    /// Restricts discovery to the named documents; an empty list keeps everything.
    pub fn with_filter(mut self, doc_ids: &[String]) -> Self {
        self.only = doc_ids.to_vec();
        self
    }

    pub fn pdf_path(&self, doc_id: &str) -> PathBuf {
        self.raw_dir.join(format!("{doc_id}.pdf"))
    }
}

impl DocumentSource for RawDirSource {
    fn list_doc_ids(&self) -> Result<Vec<String>> {
        let mut doc_ids = Vec::new();
        for path in discover_pdfs(&self.raw_dir)? {
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                debug!(path = %path.display(), "skipping non UTF-8 filename");
                continue;
            };
            if self.only.is_empty() || self.only.iter().any(|wanted| wanted == stem) {
                doc_ids.push(stem.to_string());
            }
        }
        doc_ids.sort();

        for wanted in &self.only {
            if !doc_ids.contains(wanted) {
                bail!("requested document {} not found in {}", wanted, self.raw_dir.display());
            }
        }

        Ok(doc_ids)
    }
}

/// Regular files with a `.pdf` extension (any case), sorted by path.
pub fn discover_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pdfs = Vec::new();

    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            pdfs.push(path);
        }
    }

    pdfs.sort();
    Ok(pdfs)
}
