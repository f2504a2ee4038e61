//! `bomgate ingest` command handler
//!
//! Runs the ingestion service against an in-memory store and the in-process
//! channel bus. Bus records are consumed by the console sink, which logs one
//! line per event.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use bomgate_core::pipeline::Pipeline;
use bomgate_ingest::bus::SinkStats;
use bomgate_ingest::{
    BusConsumer, ChannelPublisher, ConsoleSink, IngestConfig, IngestOutcome, IngestServiceBuilder,
    MemoryStore, MergePolicy, ProjectStore, UploadRequest,
};

use crate::cli::IngestArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `ingest` command.
pub async fn execute(
    args: IngestArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = super::load_config(config_path).await?;
    let mut ingest_config = IngestConfig::from_core(&config);
    if let Some(policy) = &args.merge_policy {
        ingest_config.merge_policy = MergePolicy::from_str_loose(policy).ok_or_else(|| {
            CliError::Command(format!(
                "invalid merge policy: {policy} (expected: overwrite, non_null)"
            ))
        })?;
    }

    let project = args.project.unwrap_or_else(Uuid::new_v4);
    let store = Arc::new(MemoryStore::new());
    let (publisher, bus) = ChannelPublisher::new(ingest_config.queue_capacity * 16);
    let sink = tokio::spawn(ConsoleSink::run(BusConsumer::new(bus)));

    let mut service = IngestServiceBuilder::new()
        .config(ingest_config)
        .store(Arc::clone(&store))
        .publisher(Arc::new(publisher))
        .build()?;
    service.start().await?;

    info!(project = %project, files = args.files.len(), "ingesting documents");

    let mut uploads = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let document = tokio::fs::read(path).await?;
        let request = UploadRequest::new(project, args.content_type.clone(), document);
        let pending = service.handle().submit(request).await?;

        // 커밋 전이면 Ctrl-C로 업로드를 취소
        let cancel = pending.cancellation_token();
        let wait = pending.wait();
        tokio::pin!(wait);
        let outcome = tokio::select! {
            outcome = &mut wait => outcome?,
            _ = tokio::signal::ctrl_c() => {
                warn!(file = %path.display(), "interrupted, cancelling upload");
                cancel.cancel();
                wait.await?
            }
        };
        uploads.push(UploadReport::new(path, &outcome));
    }

    service.stop().await?;
    let final_graph = store.load(project).await?;
    // 마지막 발행자 참조가 사라져야 버스가 닫힘
    drop(service);
    let bus_stats = sink
        .await
        .map_err(|e| CliError::Command(format!("console sink task failed: {e}")))?;

    let report = IngestReport {
        project,
        components: final_graph.as_ref().map_or(0, |g| g.component_count()),
        edges: final_graph.as_ref().map_or(0, |g| g.edges.len()),
        uploads,
        bus: BusReport::from(bus_stats),
    };
    writer.render(&report)?;

    let failed = report.uploads.iter().filter(|u| !u.processed).count();
    if failed > 0 {
        return Err(CliError::Ingest(format!(
            "{failed} of {} upload(s) failed",
            report.uploads.len()
        )));
    }
    Ok(())
}

/// Result of a single upload.
#[derive(Debug, Serialize)]
pub struct UploadReport {
    pub file: PathBuf,
    pub processed: bool,
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bom_format: Option<String>,
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub events: Vec<String>,
}

impl UploadReport {
    fn new(file: &Path, outcome: &IngestOutcome) -> Self {
        let events = outcome
            .events()
            .iter()
            .map(|t| t.as_str().to_owned())
            .collect();
        match outcome {
            IngestOutcome::Processed(s) => Self {
                file: file.to_path_buf(),
                processed: true,
                trace_id: s.trace_id.clone(),
                bom_format: Some(s.bom_format.clone()),
                created: s.created,
                updated: s.updated,
                removed: s.removed,
                failure_kind: None,
                error: None,
                events,
            },
            IngestOutcome::Failed(f) => Self {
                file: file.to_path_buf(),
                processed: false,
                trace_id: f.trace_id.clone(),
                bom_format: None,
                created: 0,
                updated: 0,
                removed: 0,
                failure_kind: Some(f.kind.as_str().to_owned()),
                error: Some(f.message.clone()),
                events,
            },
        }
    }
}

/// What the console sink saw on the bus.
#[derive(Debug, Serialize)]
pub struct BusReport {
    pub events: u64,
    pub poison: u64,
}

impl From<SinkStats> for BusReport {
    fn from(stats: SinkStats) -> Self {
        Self {
            events: stats.events,
            poison: stats.poison,
        }
    }
}

/// Summary of an `ingest` run.
#[derive(Debug, Serialize)]
pub struct IngestReport {
    pub project: Uuid,
    /// Components in the final committed graph
    pub components: usize,
    pub edges: usize,
    pub uploads: Vec<UploadReport>,
    pub bus: BusReport,
}

impl Render for IngestReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Project: {}", self.project.to_string().bold())?;
        for upload in &self.uploads {
            writeln!(w)?;
            let status = if upload.processed {
                "PROCESSED".green().bold()
            } else {
                "FAILED".red().bold()
            };
            writeln!(w, "{} {}", status, upload.file.display())?;
            writeln!(w, "  trace_id: {}", upload.trace_id)?;
            if let Some(format) = &upload.bom_format {
                writeln!(w, "  format:   {format}")?;
            }
            if upload.processed {
                writeln!(
                    w,
                    "  changes:  {} created, {} updated, {} removed",
                    upload.created, upload.updated, upload.removed
                )?;
            }
            if let (Some(kind), Some(error)) = (&upload.failure_kind, &upload.error) {
                writeln!(w, "  failure:  {} ({})", error.red(), kind)?;
            }
            writeln!(w, "  events:   {}", upload.events.join(" -> "))?;
        }
        writeln!(w)?;
        writeln!(
            w,
            "Final graph: {} component(s), {} edge(s)",
            self.components, self.edges
        )?;
        writeln!(
            w,
            "Bus: {} event(s), {} poison message(s)",
            self.bus.events, self.bus.poison
        )?;
        Ok(())
    }
}
