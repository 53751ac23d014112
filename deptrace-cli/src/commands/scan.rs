//! `deptrace scan` command handler

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use deptrace_core::config::DeptraceConfig;
use deptrace_core::types::Severity;
use deptrace_engine::{
    DepGraph, EngineConfig, File, Node, RiskSummary, TaskArg, TaskResult, TaskRunner,
};

use crate::cli::ScanArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render, human_bytes};

/// Execute the `scan` command.
///
/// The report is rendered even when the task ends with a fatal error,
/// so partial context (name, elapsed) is always visible.
pub async fn execute(
    args: ScanArgs,
    config: &DeptraceConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    if args.origin.trim().is_empty() {
        return Err(CliError::Command("origin must not be empty".to_owned()));
    }

    let runner = TaskRunner::builder()
        .config(EngineConfig::from_core(&config.scan))
        .build()?;

    let mut arg = TaskArg::new(args.origin.clone())
        .with_analyzers(args.analyzers)
        .with_callback(Arc::new(|file: &File, graph: &DepGraph| {
            debug!(file = %file, root = %graph.root_node(), "fragment built");
        }));
    if let Some(name) = args.name {
        arg = arg.with_name(name);
    }
    let vuln_only = args.vuln_only || config.scan.vuln_only;
    if let Some(secs) = args.timeout {
        arg = arg.with_timeout(Duration::from_secs(secs));
    }

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling scan");
                cancel.cancel();
            }
        })
    };

    info!(origin = %args.origin, analyzers = ?runner.analyzers().list(), vuln_only, "starting scan");
    let mut result = runner.run_task(&cancel, arg).await;
    interrupt.abort();

    let report = ScanReport::from_result(&result, vuln_only);
    writer.render(&report)?;

    match result.error.take() {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Serialisable scan report.
#[derive(Debug, Serialize)]
pub struct ScanReport {
    pub task_id: String,
    pub name: String,
    pub origin: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub files: usize,
    pub fragments: usize,
    pub size: u64,
    pub elapsed_ms: u64,
    pub analyzer_faults: usize,
    pub extraction_failures: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub summary: RiskSummary,
    /// `components` holds only vulnerable entries.
    pub vuln_only: bool,
    pub components: Vec<ComponentEntry>,
}

/// One component of the unified graph.
#[derive(Debug, Serialize)]
pub struct ComponentEntry {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub vendor: String,
    pub language: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub direct: bool,
    pub develop: bool,
    /// Most severe attached vulnerability level (1 = critical, 5 = safe).
    pub risk: u8,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub vulnerabilities: Vec<String>,
}

impl ComponentEntry {
    fn from_node(node: &Node) -> Self {
        let risk = node
            .vulnerabilities
            .iter()
            .map(|v| v.severity.level_id())
            .min()
            .unwrap_or(Severity::SAFE_LEVEL);
        Self {
            name: node.name.clone(),
            version: node.version.clone(),
            vendor: node.vendor.clone(),
            language: node.language.to_string(),
            licenses: node.licenses.clone(),
            path: node.path.clone(),
            direct: node.direct,
            develop: node.develop,
            risk,
            vulnerabilities: node.vulnerabilities.iter().map(|v| v.id.clone()).collect(),
        }
    }
}

impl ScanReport {
    /// Build the report from a finished task.
    ///
    /// The summary always covers the whole graph; `vuln_only` narrows
    /// the component list to vulnerable entries.
    pub fn from_result(result: &TaskResult, vuln_only: bool) -> Self {
        let graph = result.graph();
        Self {
            task_id: result.task_id.to_string(),
            name: result.name.clone(),
            origin: result.origin.clone(),
            start: DateTime::<Utc>::from(result.start),
            end: DateTime::<Utc>::from(result.end),
            files: result.file_count,
            fragments: result.deps.len(),
            size: result.size,
            elapsed_ms: u64::try_from(result.elapsed().as_millis()).unwrap_or(u64::MAX),
            analyzer_faults: result.analyzer_faults,
            extraction_failures: result.extraction_failures,
            error: result.error.as_ref().map(ToString::to_string),
            summary: graph.risk_summary(),
            vuln_only,
            components: component_entries(&graph, vuln_only),
        }
    }
}

fn component_entries(graph: &DepGraph, vuln_only: bool) -> Vec<ComponentEntry> {
    let entries = |graph: &DepGraph| -> Vec<ComponentEntry> {
        graph
            .components()
            .into_iter()
            .map(ComponentEntry::from_node)
            .collect()
    };
    if vuln_only {
        entries(&graph.retain_vulnerable())
    } else {
        entries(graph)
    }
}

impl Render for ScanReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Name: {}", self.name.bold())?;
        writeln!(w, "Files: {}", self.files)?;
        writeln!(w, "Size: {}", human_bytes(self.size))?;
        writeln!(w, "Elapsed: {:.3}s", self.elapsed_ms as f64 / 1000.0)?;
        if self.analyzer_faults > 0 {
            writeln!(
                w,
                "Analyzer faults: {}",
                self.analyzer_faults.to_string().yellow()
            )?;
        }
        if self.extraction_failures > 0 {
            writeln!(
                w,
                "Skipped containers: {}",
                self.extraction_failures.to_string().yellow()
            )?;
        }
        writeln!(w)?;

        match &self.error {
            Some(error) => writeln!(w, "{} {}", "Failed:".red().bold(), error)?,
            None => writeln!(w, "{}", "Complete!".green().bold())?,
        }
        writeln!(w, "{}", self.summary)?;
        Ok(())
    }
}
