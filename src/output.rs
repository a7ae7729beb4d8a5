//! CLI output formatting for builds and the sync watcher.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! ⠋ Rendering blog/post.html            (spinner, walk phase)
//! ! unsupported: dev/null-link (broken symbolic link)
//! ✓ Walked 12 entries: 4 rendered, 7 copied, 1 blacklisted
//! Manifest: patched images/favicon/site.webmanifest (2 fields)
//! Attributions: wrote attributions.html (3 entries)
//! Sitemap: wrote sitemap.xml (5 urls)
//! Built to: build/
//! ```
//!
//! ## Sync
//!
//! ```text
//! Synchronized: src/css/site.css
//! Ignoring change at: /abs/build/css/site.css
//!     File was moved or renamed in the output directory. ...
//! ```
//!
//! # Architecture
//!
//! Every report has a `format_*` function returning lines (pure, no I/O,
//! unit tested) and a `print_*` wrapper writing to stdout. Spinners live in
//! [`BuildProgress`], which consumes [`BuildEvent`]s on the printer thread.

use crate::finalize::{Finalizer, StepOutcome, StepStatus};
use crate::pipeline::{BuildEvent, BuildReport, Phase};
use crate::sync::{RejectReason, SyncOutcome, SyncReport};
use crate::walk::{WalkEvent, WalkSummary};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

// ============================================================================
// Shared helpers
// ============================================================================

/// `path` relative to `base` when below it, otherwise as given.
fn relative_display(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

// ============================================================================
// Build: walk
// ============================================================================

/// One line per visited entry.
pub fn format_walk_event(event: &WalkEvent) -> String {
    match event {
        WalkEvent::Rendered { path } => format!("Rendering {path}"),
        WalkEvent::Copied { path } => format!("Copying {path}"),
        WalkEvent::Blacklisted { path } => format!("Skipping {path} (blacklisted)"),
        WalkEvent::Unsupported { path, reason } => format!("! unsupported: {path} ({reason})"),
    }
}

pub fn format_walk_summary(summary: &WalkSummary) -> String {
    let entries = summary.rendered + summary.copied + summary.blacklisted + summary.unsupported;
    let mut line = format!(
        "Walked {}: {} rendered, {} copied, {} blacklisted",
        plural(entries, "entry", "entries"),
        summary.rendered,
        summary.copied,
        summary.blacklisted,
    );
    if summary.unsupported > 0 {
        line.push_str(&format!(", {} unsupported", summary.unsupported));
    }
    line
}

// ============================================================================
// Build: finalizers
// ============================================================================

/// One line for a finished finalizer step.
pub fn format_step(step: Finalizer, result: &Result<StepStatus, String>, output_root: &Path) -> String {
    match result {
        Ok(StepStatus::Written { path, items }) => {
            let (verb, unit) = match step {
                Finalizer::Manifest => ("patched", ("field", "fields")),
                Finalizer::Attributions => ("wrote", ("entry", "entries")),
                Finalizer::Sitemap => ("wrote", ("url", "urls")),
            };
            format!(
                "{step}: {verb} {} ({})",
                relative_display(path, output_root),
                plural(*items, unit.0, unit.1)
            )
        }
        Ok(StepStatus::Skipped { reason }) => format!("{step}: skipped, {reason}"),
        Err(error) => format!("{step}: FAILED: {error}"),
    }
}

/// Lines for every finalizer outcome of a finished build.
pub fn format_finalize_report(steps: &[StepOutcome], output_root: &Path) -> Vec<String> {
    steps
        .iter()
        .map(|outcome| {
            let result = match &outcome.result {
                Ok(status) => Ok(status.clone()),
                Err(e) => Err(e.to_string()),
            };
            format_step(outcome.step, &result, output_root)
        })
        .collect()
}

/// Closing lines of a build: failure count and output location.
pub fn format_build_summary(report: &BuildReport, cwd: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    let failed = report.failed_steps().count();
    if failed > 0 {
        lines.push(format!(
            "{} failed, see above",
            plural(failed, "finalizer", "finalizers")
        ));
    }
    lines.push(format!(
        "Built to: {}/",
        relative_display(&report.output_dir, cwd)
    ));
    lines
}

pub fn print_build_summary(report: &BuildReport, cwd: &Path) {
    for line in format_build_summary(report, cwd) {
        println!("{}", line);
    }
}

// ============================================================================
// Build: progress
// ============================================================================

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏✓")
        .template("{spinner:.green} {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Drives one spinner per build phase from [`BuildEvent`]s.
///
/// Warnings and finalizer lines are printed above the spinner so they stay
/// visible after it finishes.
pub struct BuildProgress {
    output_root: std::path::PathBuf,
    current: Option<ProgressBar>,
    walk: WalkSummary,
}

impl BuildProgress {
    pub fn new(output_root: &Path) -> Self {
        Self {
            output_root: output_root.to_path_buf(),
            current: None,
            walk: WalkSummary::default(),
        }
    }

    pub fn handle(&mut self, event: &BuildEvent) {
        match event {
            BuildEvent::PhaseStarted(Phase::Walk) => {
                self.current = Some(spinner("Walking source tree"));
            }
            BuildEvent::PhaseStarted(Phase::Finalize) => {
                self.current = Some(spinner("Finalizing"));
            }
            BuildEvent::Entry(entry) => {
                match entry {
                    WalkEvent::Rendered { .. } => self.walk.rendered += 1,
                    WalkEvent::Copied { .. } => self.walk.copied += 1,
                    WalkEvent::Blacklisted { .. } => self.walk.blacklisted += 1,
                    WalkEvent::Unsupported { .. } => self.walk.unsupported += 1,
                }
                let line = format_walk_event(entry);
                match (&self.current, entry) {
                    (Some(pb), WalkEvent::Unsupported { .. }) => pb.println(line),
                    (Some(pb), _) => pb.set_message(line),
                    (None, _) => println!("{}", line),
                }
            }
            BuildEvent::StepFinished { step, result } => {
                let line = format_step(*step, result, &self.output_root);
                match &self.current {
                    Some(pb) => pb.println(line),
                    None => println!("{}", line),
                }
            }
            BuildEvent::PhaseFinished(phase) => {
                let message = match phase {
                    Phase::Walk => format_walk_summary(&self.walk),
                    Phase::Finalize => "Finalized".to_string(),
                };
                match self.current.take() {
                    Some(pb) => pb.finish_with_message(message),
                    None => println!("{}", message),
                }
            }
        }
    }

    /// Clear a spinner left running by an aborted build.
    pub fn abandon(&mut self) {
        if let Some(pb) = self.current.take() {
            pb.abandon();
        }
    }
}

// ============================================================================
// Sync
// ============================================================================

/// Lines for one watcher report; empty for ignored and debounced events.
///
/// Synchronized paths are shown relative to the parent of `result_root`,
/// so they read as `src/css/site.css`.
pub fn format_sync_report(report: &SyncReport, result_root: &Path) -> Vec<String> {
    let outcome = match report {
        SyncReport::Outcome(outcome) => outcome,
        SyncReport::Failed { path, error } => {
            return vec![
                format!("Failed to synchronize: {}", path.display()),
                format!("    {error}"),
            ];
        }
    };
    let rejected = |path: &Path, why: &str| {
        vec![
            format!("Ignoring change at: {}", path.display()),
            format!("    {why}"),
        ]
    };
    match outcome {
        SyncOutcome::Ignored | SyncOutcome::Debounced => Vec::new(),
        SyncOutcome::Synchronized { paired, .. } => {
            let base = result_root.parent().unwrap_or(result_root);
            vec![format!("Synchronized: {}", relative_display(paired, base))]
        }
        SyncOutcome::Rejected(RejectReason::Moved { from, .. }) => rejected(
            from.as_path(),
            "File was moved or renamed in the output directory. Make the change in your source directory and rebuild the site.",
        ),
        SyncOutcome::Rejected(RejectReason::OutsideRoot(path)) => rejected(
            path.as_path(),
            "Change reported outside the watched directory. The watcher may be set up incorrectly.",
        ),
        SyncOutcome::Rejected(RejectReason::Generated(path)) => rejected(
            path.as_path(),
            "File is generated by the build. Edit its template or source and rebuild the site.",
        ),
        SyncOutcome::Rejected(RejectReason::Unpaired { path, .. }) => rejected(
            path.as_path(),
            "Paired file does not exist in the source directory. Create it there and rebuild the site.",
        ),
    }
}

pub fn print_sync_report(report: &SyncReport, result_root: &Path) {
    for line in format_sync_report(report, result_root) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn walk_events_name_the_entry() {
        assert_eq!(
            format_walk_event(&WalkEvent::Rendered {
                path: "blog/post.html".into()
            }),
            "Rendering blog/post.html"
        );
        assert_eq!(
            format_walk_event(&WalkEvent::Unsupported {
                path: "dev/fifo".into(),
                reason: "not a regular file".into()
            }),
            "! unsupported: dev/fifo (not a regular file)"
        );
    }

    #[test]
    fn walk_summary_omits_zero_unsupported() {
        let summary = WalkSummary {
            directories: 2,
            rendered: 3,
            copied: 1,
            blacklisted: 0,
            unsupported: 0,
        };
        assert_eq!(
            format_walk_summary(&summary),
            "Walked 4 entries: 3 rendered, 1 copied, 0 blacklisted"
        );

        let summary = WalkSummary {
            unsupported: 1,
            ..Default::default()
        };
        assert_eq!(
            format_walk_summary(&summary),
            "Walked 1 entry: 0 rendered, 0 copied, 0 blacklisted, 1 unsupported"
        );
    }

    #[test]
    fn step_lines() {
        let out = Path::new("/site/build");
        let written = Ok(StepStatus::Written {
            path: PathBuf::from("/site/build/sitemap.xml"),
            items: 3,
        });
        assert_eq!(
            format_step(Finalizer::Sitemap, &written, out),
            "Sitemap: wrote sitemap.xml (3 urls)"
        );

        let skipped = Ok(StepStatus::Skipped {
            reason: "no images/favicon/site.webmanifest in output".into(),
        });
        assert_eq!(
            format_step(Finalizer::Manifest, &skipped, out),
            "Manifest: skipped, no images/favicon/site.webmanifest in output"
        );

        let failed = Err("template not found".to_string());
        assert_eq!(
            format_step(Finalizer::Manifest, &failed, out),
            "Manifest: FAILED: template not found"
        );
    }

    #[test]
    fn synchronized_path_is_relative_to_source_parent() {
        let report = SyncReport::Outcome(SyncOutcome::Synchronized {
            source: PathBuf::from("/site/build/css/site.css"),
            paired: PathBuf::from("/site/src/css/site.css"),
        });
        assert_eq!(
            format_sync_report(&report, Path::new("/site/src")),
            vec!["Synchronized: src/css/site.css"]
        );
    }

    #[test]
    fn quiet_outcomes_print_nothing() {
        let root = Path::new("/site/src");
        assert!(format_sync_report(&SyncReport::Outcome(SyncOutcome::Ignored), root).is_empty());
        assert!(format_sync_report(&SyncReport::Outcome(SyncOutcome::Debounced), root).is_empty());
    }

    #[test]
    fn rejections_name_the_path() {
        let report = SyncReport::Outcome(SyncOutcome::Rejected(RejectReason::Moved {
            from: PathBuf::from("/site/build/a.css"),
            to: PathBuf::from("/site/build/b.css"),
        }));
        let lines = format_sync_report(&report, Path::new("/site/src"));
        assert_eq!(lines[0], "Ignoring change at: /site/build/a.css");
        assert!(lines[1].contains("moved or renamed"));
    }

    #[test]
    fn failures_carry_the_error() {
        let report = SyncReport::Failed {
            path: PathBuf::from("/site/build/a.css"),
            error: "permission denied".into(),
        };
        let lines = format_sync_report(&report, Path::new("/site/src"));
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("permission denied"));
    }
}
