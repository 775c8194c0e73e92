use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "ledger-extract",
    version,
    about = "Transcribe scanned ledgers and extract scored rows into a workbook"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Hash every PDF under <data-root>/raw into an inventory manifest.
    Inventory(InventoryArgs),
    /// Render, transcribe (cached), classify, extract and export all documents.
    Run(RunArgs),
    /// Report cached pages per document and the latest run.
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InventoryArgs {
    #[arg(long, default_value = "data")]
    pub data_root: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CacheBackend {
    Files,
    Sqlite,
}

impl CacheBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Files => "files",
            Self::Sqlite => "sqlite",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long, default_value = "data")]
    pub data_root: PathBuf,

    /// JSON file with LedgerConfig fields; missing fields keep their defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory holding classifier_prompt.txt and extraction_prompt.txt.
    #[arg(long)]
    pub prompts_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = CacheBackend::Files)]
    pub cache_backend: CacheBackend,

    #[arg(long, default_value = "all_years_rows.xlsx")]
    pub output_name: String,

    #[arg(long)]
    pub run_manifest_path: Option<PathBuf>,

    /// Render DPI; overrides the config file.
    #[arg(long)]
    pub resolution: Option<u32>,

    #[arg(long = "doc-id")]
    pub doc_ids: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = "data")]
    pub data_root: PathBuf,

    #[arg(long, value_enum, default_value_t = CacheBackend::Files)]
    pub cache_backend: CacheBackend,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults() {
        let cli = Cli::try_parse_from(["ledger-extract", "run"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.data_root, PathBuf::from("data"));
        assert_eq!(args.cache_backend, CacheBackend::Files);
        assert_eq!(args.output_name, "all_years_rows.xlsx");
        assert!(args.doc_ids.is_empty());
        assert_eq!(args.resolution, None);
    }

    #[test]
    fn run_accepts_repeated_doc_ids_and_sqlite_backend() {
        let cli = Cli::try_parse_from([
            "ledger-extract",
            "run",
            "--cache-backend",
            "sqlite",
            "--doc-id",
            "1704",
            "--doc-id",
            "1712",
            "--resolution",
            "200",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.cache_backend, CacheBackend::Sqlite);
        assert_eq!(args.doc_ids, vec!["1704", "1712"]);
        assert_eq!(args.resolution, Some(200));
    }

    #[test]
    fn unknown_cache_backend_rejected() {
        let parsed =
            Cli::try_parse_from(["ledger-extract", "status", "--cache-backend", "redis"]);
        assert!(parsed.is_err());
    }
}
