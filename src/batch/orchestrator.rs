use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::info;

use super::cache::{CacheKey, TranscriptionCache};
use super::discovery::DocumentSource;
use super::export::TabularExporter;
use super::render::PageRenderer;
use super::transcribe::PageTranscriber;
use crate::ledger::pipeline::{DocumentPipeline, PageProvenance};
use crate::ledger::schema::{LedgerRow, PageMetadata};

/// Page texts for one document after the cache has been consulted.
#[derive(Debug, Clone, Default)]
pub struct CachedPages {
    pub texts: BTreeMap<u32, String>,
    pub cache_hits: usize,
    pub transcribed: usize,
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub documents: usize,
    pub pages: usize,
    pub cache_hits: usize,
    pub transcriptions: usize,
    pub classifier_fallbacks: usize,
    pub extractor_fallbacks: usize,
    pub rows: usize,
    pub export_path: PathBuf,
    pub provenance: Vec<PageProvenance>,
}

pub struct BatchOrchestrator<'a> {
    source: &'a dyn DocumentSource,
    renderer: &'a dyn PageRenderer,
    transcriber: &'a dyn PageTranscriber,
    cache: &'a dyn TranscriptionCache,
    pipeline: DocumentPipeline<'a>,
    exporter: &'a dyn TabularExporter,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(
        source: &'a dyn DocumentSource,
        renderer: &'a dyn PageRenderer,
        transcriber: &'a dyn PageTranscriber,
        cache: &'a dyn TranscriptionCache,
        pipeline: DocumentPipeline<'a>,
        exporter: &'a dyn TabularExporter,
    ) -> Self {
        Self {
            source,
            renderer,
            transcriber,
            cache,
            pipeline,
            exporter,
        }
    }

    /// Renders the document, then reads each page from the cache or transcribes and stores it.
    ///
    /// A transcription is written to the cache as soon as it returns, so an aborted run keeps
    /// every page finished so far. A failed transcription stores nothing for that page.
    pub fn transcribe_document_cached(&self, doc_id: &str) -> Result<CachedPages> {
        let images = self
            .renderer
            .render(doc_id)
            .with_context(|| format!("failed to render pages for {doc_id}"))?;

        let mut pages = CachedPages::default();
        for (page_id, image_path) in images {
            let key = CacheKey::new(doc_id, page_id);

            let text = if self.cache.exists(&key)? {
                pages.cache_hits += 1;
                self.cache.read(&key)?
            } else {
                info!(doc_id, page_id, image = %image_path.display(), "transcribing page");
                let text = self
                    .transcriber
                    .transcribe(&image_path)
                    .with_context(|| format!("failed to transcribe {doc_id} page {page_id}"))?;
                self.cache.write(&key, &text)?;
                pages.transcribed += 1;
                text
            };

            pages.texts.insert(page_id, text);
        }

        Ok(pages)
    }

    pub fn run(&self) -> Result<BatchReport> {
        let doc_ids = self.source.list_doc_ids()?;
        if doc_ids.is_empty() {
            bail!("no documents found to process");
        }

        let mut all_pages: Vec<PageMetadata> = Vec::new();
        let mut all_rows: Vec<LedgerRow> = Vec::new();
        let mut provenance: Vec<PageProvenance> = Vec::new();
        let mut cache_hits = 0;
        let mut transcriptions = 0;

        for doc_id in &doc_ids {
            info!(doc_id = %doc_id, "processing document");

            let cached = self.transcribe_document_cached(doc_id)?;
            cache_hits += cached.cache_hits;
            transcriptions += cached.transcribed;

            let texts: BTreeMap<u32, &str> = cached
                .texts
                .iter()
                .map(|(page_id, text)| (*page_id, text.as_str()))
                .collect();
            let run = self.pipeline.process_document_traced(doc_id, &texts);

            all_pages.extend(run.pages);
            all_rows.extend(run.rows);
            provenance.extend(run.provenance);
        }

        let export_path = self.exporter.export(&all_pages, &all_rows)?;

        let report = BatchReport {
            documents: doc_ids.len(),
            pages: all_pages.len(),
            cache_hits,
            transcriptions,
            classifier_fallbacks: provenance
                .iter()
                .filter(|entry| entry.classification.is_fallback())
                .count(),
            extractor_fallbacks: provenance
                .iter()
                .filter(|entry| entry.extraction.is_fallback())
                .count(),
            rows: all_rows.len(),
            export_path,
            provenance,
        };

        info!(
            documents = report.documents,
            pages = report.pages,
            rows = report.rows,
            cache_hits = report.cache_hits,
            transcriptions = report.transcriptions,
            classifier_fallbacks = report.classifier_fallbacks,
            extractor_fallbacks = report.extractor_fallbacks,
            "batch completed"
        );

        Ok(report)
    }
}
