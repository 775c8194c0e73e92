use serde::{Deserialize, Serialize};

use crate::ledger::pipeline::PageProvenance;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub doc_id: String,
    pub filename: String,
    pub size_bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInventoryManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub source_directory: String,
    pub document_count: usize,
    pub documents: Vec<DocumentEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolVersions {
    pub ledger_extract: String,
    pub pdftoppm: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPaths {
    pub data_root: String,
    pub raw_dir: String,
    pub interim_dir: String,
    pub output_path: String,
    pub page_provenance_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunModels {
    pub classifier: String,
    pub extractor: String,
    pub transcription: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunCounts {
    pub documents: usize,
    pub pages: usize,
    pub cache_hits: usize,
    pub transcriptions: usize,
    pub classifier_fallbacks: usize,
    pub extractor_fallbacks: usize,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub failure_reason: Option<String>,
    pub command: String,
    pub cache_backend: String,
    pub rule_weight: f64,
    pub typical_max_pounds: Option<i64>,
    pub render_resolution: u32,
    pub tool_versions: ToolVersions,
    pub models: RunModels,
    pub paths: RunPaths,
    pub counts: RunCounts,
    pub notes: Vec<String>,
}

/// Written alongside the run manifest; one entry per processed page.
#[derive(Debug, Clone, Serialize)]
pub struct PageProvenanceManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub entries: Vec<PageProvenance>,
}
