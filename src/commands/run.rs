use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use super::open_cache;
use crate::batch::discovery::RawDirSource;
use crate::batch::export::XlsxExporter;
use crate::batch::orchestrator::{BatchOrchestrator, BatchReport};
use crate::batch::render::{PdftoppmRenderer, command_version_optional};
use crate::batch::transcribe::VisionTranscriber;
use crate::cli::RunArgs;
use crate::config::{DataLayout, LedgerConfig};
use crate::ledger::classifier::PageClassifier;
use crate::ledger::extractor::RowExtractor;
use crate::ledger::pipeline::DocumentPipeline;
use crate::ledger::prompt::PromptTemplates;
use crate::ledger::service::OpenAiClient;
use crate::model::{
    PageProvenanceManifest, RunCounts, RunManifest, RunModels, RunPaths, ToolVersions,
};
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

pub const RUN_MANIFEST_PREFIX: &str = "run_";

pub fn run(args: RunArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let layout = DataLayout::new(&args.data_root);
    let manifest_dir = layout.manifest_dir();
    ensure_directory(&manifest_dir)?;

    let run_manifest_path = args.run_manifest_path.clone().unwrap_or_else(|| {
        manifest_dir.join(format!(
            "{RUN_MANIFEST_PREFIX}{}.json",
            utc_compact_string(started_ts)
        ))
    });
    let page_provenance_path = manifest_dir.join(format!(
        "page_provenance_{}.json",
        utc_compact_string(started_ts)
    ));
    let output_path = layout.processed_dir().join(&args.output_name);

    let mut config = LedgerConfig::load(args.config.as_deref())?;
    if let Some(resolution) = args.resolution {
        config.render_resolution = resolution;
        config.validate()?;
    }
    let templates = PromptTemplates::load(args.prompts_dir.as_deref())?;
    let client = OpenAiClient::new(&config.resolve_service())?;

    info!(
        data_root = %layout.root().display(),
        run_id = %run_id,
        cache_backend = args.cache_backend.as_str(),
        "starting run"
    );

    let source = RawDirSource::new(&layout.raw_dir()).with_filter(&args.doc_ids);
    let renderer = PdftoppmRenderer::new(
        &layout.raw_dir(),
        &layout.interim_dir(),
        config.render_resolution,
    )?;
    let transcriber = VisionTranscriber::new(&client, &config.transcription_model);
    let cache = open_cache(args.cache_backend, &layout)?;
    let pipeline = DocumentPipeline::new(
        PageClassifier::new(&client, &templates.classifier, &config.classifier_model),
        RowExtractor::new(
            &client,
            &templates.extraction,
            &config.extractor_model,
            config.scoring(),
        ),
    );
    let exporter = XlsxExporter::new(&output_path);

    let orchestrator = BatchOrchestrator::new(
        &source,
        &renderer,
        &transcriber,
        cache.as_ref(),
        pipeline,
        &exporter,
    );

    let mut manifest = RunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        status: "running".to_string(),
        started_at,
        updated_at: now_utc_string(),
        failure_reason: None,
        command: render_run_command(&args),
        cache_backend: args.cache_backend.as_str().to_string(),
        rule_weight: config.rule_weight,
        typical_max_pounds: config.typical_max_pounds,
        render_resolution: config.render_resolution,
        tool_versions: ToolVersions {
            ledger_extract: env!("CARGO_PKG_VERSION").to_string(),
            pdftoppm: command_version_optional("pdftoppm", &["-v"]),
        },
        models: RunModels {
            classifier: config.classifier_model.clone(),
            extractor: config.extractor_model.clone(),
            transcription: config.transcription_model.clone(),
        },
        paths: RunPaths {
            data_root: layout.root().display().to_string(),
            raw_dir: layout.raw_dir().display().to_string(),
            interim_dir: layout.interim_dir().display().to_string(),
            output_path: output_path.display().to_string(),
            page_provenance_path: page_provenance_path.display().to_string(),
        },
        counts: RunCounts::default(),
        notes: Vec::new(),
    };

    let report = match orchestrator.run() {
        Ok(report) => report,
        Err(err) => {
            manifest.status = "failed".to_string();
            manifest.updated_at = now_utc_string();
            manifest.failure_reason = Some(format!("{err:#}"));
            manifest.notes.push(
                "Cached transcriptions written before the failure are kept; rerun to resume."
                    .to_string(),
            );
            write_json_pretty(&run_manifest_path, &manifest)?;
            warn!(path = %run_manifest_path.display(), "wrote failed run manifest");
            return Err(err);
        }
    };

    write_page_provenance(&page_provenance_path, &run_id, &report)?;

    manifest.status = "completed".to_string();
    manifest.updated_at = now_utc_string();
    manifest.counts = counts_from(&report);
    manifest.notes = run_notes(&report);
    write_json_pretty(&run_manifest_path, &manifest)?;

    info!(path = %run_manifest_path.display(), "wrote run manifest");
    info!(
        output = %report.export_path.display(),
        rows = report.rows,
        "run completed"
    );

    Ok(())
}

fn write_page_provenance(path: &Path, run_id: &str, report: &BatchReport) -> Result<()> {
    let manifest = PageProvenanceManifest {
        manifest_version: 1,
        run_id: run_id.to_string(),
        generated_at: now_utc_string(),
        entries: report.provenance.clone(),
    };
    write_json_pretty(path, &manifest)?;
    info!(
        path = %path.display(),
        entries = manifest.entries.len(),
        "wrote page provenance manifest"
    );
    Ok(())
}

fn counts_from(report: &BatchReport) -> RunCounts {
    RunCounts {
        documents: report.documents,
        pages: report.pages,
        cache_hits: report.cache_hits,
        transcriptions: report.transcriptions,
        classifier_fallbacks: report.classifier_fallbacks,
        extractor_fallbacks: report.extractor_fallbacks,
        rows: report.rows,
    }
}

fn run_notes(report: &BatchReport) -> Vec<String> {
    let mut notes = vec![format!("Workbook written to {}.", report.export_path.display())];
    let degraded = report.classifier_fallbacks + report.extractor_fallbacks;
    if degraded > 0 {
        notes.push(format!(
            "{degraded} stage results came from local fallbacks; see the page provenance manifest."
        ));
    }
    notes
}

fn render_run_command(args: &RunArgs) -> String {
    let mut command = vec![
        "ledger-extract".to_string(),
        "run".to_string(),
        "--data-root".to_string(),
        args.data_root.display().to_string(),
        "--cache-backend".to_string(),
        args.cache_backend.as_str().to_string(),
        "--output-name".to_string(),
        args.output_name.clone(),
    ];

    let optional_paths: [(&str, &Option<PathBuf>); 3] = [
        ("--config", &args.config),
        ("--prompts-dir", &args.prompts_dir),
        ("--run-manifest-path", &args.run_manifest_path),
    ];
    for (flag, path) in optional_paths {
        if let Some(path) = path {
            command.push(flag.to_string());
            command.push(path.display().to_string());
        }
    }
    if let Some(resolution) = args.resolution {
        command.push("--resolution".to_string());
        command.push(resolution.to_string());
    }
    for doc_id in &args.doc_ids {
        command.push("--doc-id".to_string());
        command.push(doc_id.clone());
    }

    command.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::CacheBackend;
    use crate::ledger::Source;
    use crate::ledger::pipeline::PageProvenance;
    use crate::ledger::schema::PageType;

    fn args() -> RunArgs {
        RunArgs {
            data_root: PathBuf::from("data"),
            config: None,
            prompts_dir: Some(PathBuf::from("prompts")),
            cache_backend: CacheBackend::Sqlite,
            output_name: "all_years_rows.xlsx".to_string(),
            run_manifest_path: None,
            resolution: Some(200),
            doc_ids: vec!["1704".to_string()],
        }
    }

    fn report(fallbacks: usize) -> BatchReport {
        BatchReport {
            documents: 1,
            pages: 1,
            cache_hits: 0,
            transcriptions: 1,
            classifier_fallbacks: fallbacks,
            extractor_fallbacks: 0,
            rows: 1,
            export_path: PathBuf::from("data/processed/all_years_rows.xlsx"),
            provenance: vec![PageProvenance {
                doc_id: "1704".to_string(),
                page_id: 1,
                page_type: PageType::SectionalList,
                classification: Source::Fallback {
                    reason: "service returned empty content".to_string(),
                },
                extraction: Source::Service,
                row_count: 1,
            }],
        }
    }

    #[test]
    fn command_line_is_reconstructed() {
        assert_eq!(
            render_run_command(&args()),
            "ledger-extract run --data-root data --cache-backend sqlite \
             --output-name all_years_rows.xlsx --prompts-dir prompts --resolution 200 \
             --doc-id 1704"
        );
    }

    #[test]
    fn notes_mention_fallbacks_only_when_present() {
        assert_eq!(run_notes(&report(0)).len(), 1);
        assert_eq!(run_notes(&report(2)).len(), 2);
    }

    #[test]
    fn provenance_manifest_serializes_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page_provenance.json");
        write_page_provenance(&path, "run-20240101T000000Z", &report(1)).unwrap();

        let value: serde_json::Value = crate::util::read_json(&path).unwrap();
        let entry = &value["entries"][0];
        assert_eq!(entry["page_type"], "Sectional_List");
        assert_eq!(entry["classification"]["source"], "fallback");
        assert_eq!(entry["classification"]["reason"], "service returned empty content");
        assert_eq!(entry["extraction"]["source"], "service");
    }
}
