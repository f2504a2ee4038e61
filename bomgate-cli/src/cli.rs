//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use uuid::Uuid;

/// bomgate -- BOM ingestion with ordered downstream events.
///
/// Use `bomgate <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "bomgate", version, about, long_about = None)]
pub struct Cli {
    /// Path to the bomgate.toml configuration file.
    #[arg(short, long, default_value = "bomgate.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest one or more BOM documents into a project.
    Ingest(IngestArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- ingest ----

/// Ingest BOM documents in order against an in-memory project store.
///
/// Each file is a separate upload; later files are reconciled against the
/// graph committed by earlier ones.
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Target project UUID (a random one is used when omitted).
    #[arg(short, long)]
    pub project: Option<Uuid>,

    /// Declared content type of the documents.
    #[arg(long, default_value = "application/vnd.cyclonedx+json")]
    pub content_type: String,

    /// Component merge policy override (overwrite, non_null).
    #[arg(long)]
    pub merge_policy: Option<String>,

    /// BOM documents to upload, in order.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

// ---- config ----

/// Manage bomgate configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, ingest, dispatch, store).
        #[arg(long)]
        section: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn parse_ingest_with_defaults() {
        let cli = Cli::try_parse_from(["bomgate", "ingest", "bom.json"]).expect("should parse");
        match cli.command {
            Commands::Ingest(args) => {
                assert!(args.project.is_none());
                assert_eq!(args.content_type, "application/vnd.cyclonedx+json");
                assert!(args.merge_policy.is_none());
                assert_eq!(args.files, vec![PathBuf::from("bom.json")]);
            }
            _ => panic!("expected Ingest command"),
        }
    }

    #[test]
    fn parse_ingest_multiple_files_and_project() {
        let project = "8f14e45f-ceea-467a-9575-d3e9ba0a7c51";
        let cli = Cli::try_parse_from([
            "bomgate", "ingest", "--project", project, "first.json", "second.json",
        ])
        .expect("should parse");
        match cli.command {
            Commands::Ingest(args) => {
                assert_eq!(args.project, Some(Uuid::parse_str(project).unwrap()));
                assert_eq!(args.files.len(), 2);
            }
            _ => panic!("expected Ingest command"),
        }
    }

    #[test]
    fn parse_ingest_rejects_invalid_uuid() {
        let result = Cli::try_parse_from(["bomgate", "ingest", "--project", "nope", "a.json"]);
        assert!(result.is_err(), "invalid uuid should fail");
    }

    #[test]
    fn parse_ingest_requires_files() {
        let result = Cli::try_parse_from(["bomgate", "ingest"]);
        assert!(result.is_err(), "at least one file is required");
    }

    #[test]
    fn parse_ingest_content_type_and_policy() {
        let cli = Cli::try_parse_from([
            "bomgate",
            "ingest",
            "--content-type",
            "application/spdx+json",
            "--merge-policy",
            "non_null",
            "a.json",
        ])
        .expect("should parse");
        match cli.command {
            Commands::Ingest(args) => {
                assert_eq!(args.content_type, "application/spdx+json");
                assert_eq!(args.merge_policy.as_deref(), Some("non_null"));
            }
            _ => panic!("expected Ingest command"),
        }
    }

    #[test]
    fn parse_config_validate() {
        let cli = Cli::try_parse_from(["bomgate", "config", "validate"]).expect("should parse");
        match cli.command {
            Commands::Config(args) => assert!(matches!(args.action, ConfigAction::Validate)),
            _ => panic!("expected Config command"),
        }
    }

    #[test]
    fn parse_config_show_section() {
        let cli = Cli::try_parse_from(["bomgate", "config", "show", "--section", "ingest"])
            .expect("should parse");
        match cli.command {
            Commands::Config(args) => match args.action {
                ConfigAction::Show { section } => assert_eq!(section.as_deref(), Some("ingest")),
                _ => panic!("expected Show action"),
            },
            _ => panic!("expected Config command"),
        }
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::try_parse_from([
            "bomgate",
            "-c",
            "/etc/bomgate.toml",
            "config",
            "validate",
            "--log-level",
            "debug",
            "--output",
            "json",
        ])
        .expect("should parse");
        assert_eq!(cli.config, PathBuf::from("/etc/bomgate.toml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.output, OutputFormat::Json));
    }

    #[test]
    fn missing_command_fails() {
        assert!(Cli::try_parse_from(["bomgate"]).is_err());
    }

    #[test]
    fn command_structure() {
        let cmd = Cli::command();
        assert_eq!(cmd.get_name(), "bomgate");
        let subcommands: Vec<_> = cmd.get_subcommands().map(|s| s.get_name()).collect();
        assert!(subcommands.contains(&"ingest"));
        assert!(subcommands.contains(&"config"));
    }
}
