use crate::agent::AgentReport;
use crate::coordinator::CoordinatorReport;
use crate::report::format_bytes;
use colored::Colorize;
use std::fmt::Write;

/// Terminal reporter with colored output
pub struct TerminalReporter {
    /// List every skipped file under its reason
    show_files: bool,
}

impl TerminalReporter {
    pub fn new() -> Self {
        Self { show_files: true }
    }

    pub fn with_files(mut self, show: bool) -> Self {
        self.show_files = show;
        self
    }

    pub fn report_agent(&self, report: &AgentReport) {
        print!("{}", self.render_agent(report));
    }

    pub fn report_coordinator(&self, report: &CoordinatorReport) {
        print!("{}", self.render_coordinator(report));
    }

    pub fn render_agent(&self, report: &AgentReport) -> String {
        let mut out = String::new();
        let counts = &report.results.counts;

        let mode = if report.is_dry_run() { " (dry run)" } else { "" };
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", format!("Agent {}{}", report.agent, mode).cyan().bold());
        let _ = writeln!(out, "{}", "─".repeat(60).dimmed());

        let _ = writeln!(out, "Total files scanned: {}", counts.scanned);
        let _ = writeln!(out, "Entry points: {}", counts.entry_points);
        let _ = writeln!(out, "Candidates: {}", counts.candidates);
        if report.is_dry_run() {
            let _ = writeln!(out, "{}", format!("Files that would be moved: {}", counts.moved).yellow());
        } else {
            let _ = writeln!(out, "{}", format!("Files moved: {}", counts.moved).green());
        }
        let _ = writeln!(out, "{}: {}", size_label(report.is_dry_run()), format_bytes(counts.bytes_moved));
        let _ = writeln!(out, "Files skipped: {}", counts.skipped);
        let _ = writeln!(out, "Conflicts: {}", counts.conflicts);
        let _ = writeln!(out, "Warnings: {}", counts.warnings);

        let cleared = if report.is_dry_run() {
            &report.results.cleared
        } else {
            &report.results.moved
        };
        if self.show_files && !cleared.is_empty() {
            let _ = writeln!(out);
            let heading = if report.is_dry_run() { "Would move:" } else { "Moved:" };
            let _ = writeln!(out, "{}", heading.bold());
            for file in cleared {
                let _ = writeln!(out, "  {} {}", "→".dimmed(), file);
            }
        }

        let groups = report.skipped_by_reason();
        if !groups.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}", "Skipped by reason:".bold());
            for (reason, files) in &groups {
                let _ = writeln!(out, "  {} ({})", reason.yellow(), files.len());
                if self.show_files {
                    for skipped in files {
                        match &skipped.detail {
                            Some(detail) => {
                                let _ = writeln!(out, "    {} {}", skipped.file, format!("[{}]", detail).dimmed());
                            }
                            None => {
                                let _ = writeln!(out, "    {}", skipped.file);
                            }
                        }
                    }
                }
            }
        }

        if !report.results.warnings.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}", "Warnings:".yellow().bold());
            for warning in &report.results.warnings {
                let _ = writeln!(out, "  {} {}", "⚠".yellow(), warning);
            }
        }

        if let Some(session) = &report.session {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}", format!("Rollback: deadsweep rollback {}", session).dimmed());
        }
        let _ = writeln!(
            out,
            "{}",
            format!("Completed in {:.2}s", report.results.duration_ms as f64 / 1000.0).dimmed()
        );

        out
    }

    pub fn render_coordinator(&self, report: &CoordinatorReport) -> String {
        let mut out = String::new();
        let totals = &report.totals;
        let dry_run = report.mode.is_dry_run();

        let _ = writeln!(out);
        let _ = writeln!(out, "{}", "Multi-agent cleanup".cyan().bold());
        let _ = writeln!(out, "{}", "─".repeat(60).dimmed());

        for run in &report.agents {
            let status = if run.success { "✓".green() } else { "✗".red() };
            let detail = match (&run.report, &run.error) {
                (_, Some(error)) => error.red().to_string(),
                (Some(agent), None) => format!(
                    "{} scanned, {} {}",
                    agent.results.counts.scanned,
                    agent.results.counts.moved,
                    if dry_run { "would move" } else { "moved" }
                ),
                (None, None) => String::new(),
            };
            let _ = writeln!(
                out,
                "  {} {:<12} {} {}",
                status,
                run.agent,
                format!("{:.2}s", run.duration_ms as f64 / 1000.0).dimmed(),
                detail
            );
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "Total files scanned: {}", totals.scanned);
        let _ = writeln!(out, "Entry points: {}", totals.entry_points);
        let _ = writeln!(out, "Candidates: {}", totals.candidates);
        if dry_run {
            let _ = writeln!(out, "{}", format!("Files that would be moved: {}", totals.moved).yellow());
        } else {
            let _ = writeln!(out, "{}", format!("Files moved: {}", totals.moved).green());
        }
        let _ = writeln!(out, "{}: {}", size_label(dry_run), format_bytes(totals.bytes_moved));
        let _ = writeln!(out, "Files skipped: {}", totals.skipped);
        let _ = writeln!(out, "Conflicts: {}", totals.conflicts);
        let _ = writeln!(out, "Warnings: {}", totals.warnings);

        for warning in &report.warnings {
            let _ = writeln!(out, "  {} {}", "⚠".yellow(), warning);
        }

        if let Some(script) = &report.rollback_script {
            let _ = writeln!(out);
            let _ = writeln!(out, "{} Rollback script: {}", "→".dimmed(), script.display());
        }

        let failed = report.failed_agents();
        if !failed.is_empty() {
            let _ = writeln!(out, "{}", format!("Failed agents: {}", failed.join(", ")).red().bold());
        }

        out
    }
}

fn size_label(dry_run: bool) -> &'static str {
    if dry_run {
        "Size that would be recovered"
    } else {
        "Size recovered"
    }
}

impl Default for TerminalReporter {
    fn default() -> Self {
        Self::new()
    }
}
