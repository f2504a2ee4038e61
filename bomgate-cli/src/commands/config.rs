//! `bomgate config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use bomgate_core::config::BomgateConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Section names accepted by `config show --section`.
const SECTIONS: [&str; 4] = ["general", "ingest", "dispatch", "store"];

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, section, writer).await,
    }
}

/// Load and validate the configuration file, reporting any errors.
///
/// Unlike other commands, a missing file is an error here.
async fn execute_validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let report = match BomgateConfig::load(config_path).await {
        Ok(_) => ConfigValidationReport {
            source: config_path.display().to_string(),
            valid: true,
            errors: Vec::new(),
        },
        Err(e) => ConfigValidationReport {
            source: config_path.display().to_string(),
            valid: false,
            errors: vec![e.to_string()],
        },
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }
    Ok(())
}

/// Display the effective configuration (file + env overrides + defaults).
async fn execute_show(
    config_path: &Path,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let config = super::load_config(config_path).await?;
    let report = build_config_report(config_path.display().to_string(), &config, section)?;
    writer.render(&report)
}

fn build_config_report(
    source: String,
    config: &BomgateConfig,
    section: Option<String>,
) -> Result<ConfigReport, CliError> {
    let rendered = match section.as_deref() {
        None => toml::to_string_pretty(config),
        Some("general") => toml::to_string_pretty(&config.general),
        Some("ingest") => toml::to_string_pretty(&config.ingest),
        Some("dispatch") => toml::to_string_pretty(&config.dispatch),
        Some("store") => toml::to_string_pretty(&config.store),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {other} (expected: {})",
                SECTIONS.join(", ")
            )));
        }
    };

    Ok(ConfigReport {
        source,
        section,
        config_toml: rendered.unwrap_or_else(|e| format!("(serialization error: {e})")),
    })
}

/// Configuration display report.
///
/// `config_toml` is only used for text rendering.
#[derive(Serialize)]
pub struct ConfigReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        match &self.section {
            Some(section) => writeln!(
                w,
                "Configuration {} (source: {})",
                format!("[{section}]").bold(),
                self.source
            )?,
            None => writeln!(w, "Configuration (source: {})", self.source.bold())?,
        }
        writeln!(w)?;
        write!(w, "{}", self.config_toml)
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    /// Empty when valid
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;
        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(report: &impl Render) -> String {
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn full_config_report_contains_all_sections() {
        let report =
            build_config_report("bomgate.toml".to_owned(), &BomgateConfig::default(), None)
                .unwrap();
        for section in SECTIONS {
            assert!(
                report.config_toml.contains(&format!("[{section}]")),
                "missing [{section}]"
            );
        }
        assert!(render(&report).contains("bomgate.toml"));
    }

    #[test]
    fn single_section_report() {
        let report = build_config_report(
            "bomgate.toml".to_owned(),
            &BomgateConfig::default(),
            Some("ingest".to_owned()),
        )
        .unwrap();
        assert!(report.config_toml.contains("merge_policy"));
        assert!(!report.config_toml.contains("log_level"));
        assert!(render(&report).contains("[ingest]"));
    }

    #[test]
    fn unknown_section_is_rejected() {
        let result = build_config_report(
            "bomgate.toml".to_owned(),
            &BomgateConfig::default(),
            Some("ebpf".to_owned()),
        );
        match result {
            Err(CliError::Command(msg)) => assert!(msg.contains("unknown section: ebpf")),
            _ => panic!("expected command error"),
        }
    }

    #[test]
    fn config_report_json_skips_toml_body() {
        let report = ConfigReport {
            source: "bomgate.toml".to_owned(),
            section: Some("store".to_owned()),
            config_toml: "commit_max_retries = 3".to_owned(),
        };
        let parsed: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&report).unwrap()).unwrap();
        assert_eq!(parsed["section"].as_str(), Some("store"));
        assert!(parsed.get("config_toml").is_none());
    }

    #[test]
    fn validation_report_lists_errors() {
        let report = ConfigValidationReport {
            source: "bad.toml".to_owned(),
            valid: false,
            errors: vec!["ingest.workers: must be 1-256".to_owned()],
        };
        let output = render(&report);
        assert!(output.contains("INVALID"));
        assert!(output.contains("ingest.workers"));
    }

    #[test]
    fn validation_report_valid() {
        let report = ConfigValidationReport {
            source: "bomgate.toml".to_owned(),
            valid: true,
            errors: Vec::new(),
        };
        let output = render(&report);
        assert!(output.contains("VALID"));
        assert!(!output.contains("Error:"));
    }
}
