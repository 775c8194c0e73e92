use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use regex::Regex;
use tracing::{debug, info};

use crate::util::ensure_directory;

/// Turns one source document into per-page images.
pub trait PageRenderer {
    /// Ordered `page_id -> image path`, page ids starting at 1.
    fn render(&self, doc_id: &str) -> Result<BTreeMap<u32, PathBuf>>;
}

/// Renders `<raw_dir>/<doc_id>.pdf` to `<interim_dir>/<doc_id>/page-<n>.png` with `pdftoppm`.
pub struct PdftoppmRenderer {
    raw_dir: PathBuf,
    interim_dir: PathBuf,
    resolution: u32,
    page_image: Regex,
}

impl PdftoppmRenderer {
    pub fn new(raw_dir: &Path, interim_dir: &Path, resolution: u32) -> Result<Self> {
        Ok(Self {
            raw_dir: raw_dir.to_path_buf(),
            interim_dir: interim_dir.to_path_buf(),
            resolution,
            page_image: page_image_pattern()?,
        })
    }

    fn output_dir(&self, doc_id: &str) -> PathBuf {
        self.interim_dir.join(doc_id)
    }
}

impl PageRenderer for PdftoppmRenderer {
    fn render(&self, doc_id: &str) -> Result<BTreeMap<u32, PathBuf>> {
        let pdf_path = self.raw_dir.join(format!("{doc_id}.pdf"));
        if !pdf_path.is_file() {
            bail!("PDF not found at {}", pdf_path.display());
        }

        let out_dir = self.output_dir(doc_id);
        ensure_directory(&out_dir)?;
        // Leftover images from an earlier render may use a different zero padding.
        for stale in collect_page_images(&out_dir, &self.page_image)?.into_values() {
            fs::remove_file(&stale)
                .with_context(|| format!("failed to remove stale image {}", stale.display()))?;
        }

        let output = Command::new("pdftoppm")
            .arg("-r")
            .arg(self.resolution.to_string())
            .arg("-png")
            .arg(&pdf_path)
            .arg(out_dir.join("page"))
            .output()
            .with_context(|| format!("failed to execute pdftoppm for {}", pdf_path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "pdftoppm returned non-zero exit status for {}: {}",
                pdf_path.display(),
                stderr.trim()
            );
        }

        let pages = collect_page_images(&out_dir, &self.page_image)?;
        if pages.is_empty() {
            bail!("pdftoppm produced no page images for {}", pdf_path.display());
        }

        info!(doc_id, pages = pages.len(), dpi = self.resolution, "rendered pages");
        Ok(pages)
    }
}

fn page_image_pattern() -> Result<Regex> {
    Regex::new(r"^page-(\d+)\.png$").context("failed to compile page image regex")
}

/// `pdftoppm` pads page numbers to the width of the page count, so parse rather than format.
fn collect_page_images(dir: &Path, pattern: &Regex) -> Result<BTreeMap<u32, PathBuf>> {
    let mut pages = BTreeMap::new();

    let entries = fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(page_id) = pattern
            .captures(name)
            .and_then(|captures| captures.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
        else {
            continue;
        };
        if page_id == 0 {
            debug!(file = name, "ignoring page image numbered zero");
            continue;
        }
        pages.insert(page_id, entry.path());
    }

    Ok(pages)
}

/// First non-empty line of `<program> <args>` output, if the program runs at all.
pub fn command_version_optional(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let source = if stdout.trim().is_empty() {
        stderr.trim()
    } else {
        stdout.trim()
    };

    source
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
}
