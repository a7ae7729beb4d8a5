//! Build orchestration: clean → walk → finalize.
//!
//! ```text
//! 1. Clean      delete and recreate the output directory
//! 2. Walk       mirror the source tree, rendering pages and copying files
//! 3. Finalize   manifest patch, attributions page, sitemap
//! ```
//!
//! Any walk failure aborts the run, leaving a freshly cleaned (possibly
//! partially filled) output directory and never a mix of old and new
//! files. Finalizer failures are collected into the [`BuildReport`] instead.
//!
//! Progress is reported as [`BuildEvent`]s over an optional channel, the
//! same way the CLI feeds its printer thread.

use crate::attribution::AttributionEntry;
use crate::config::{ConfigError, SiteConfig};
use crate::context::ContextDefaults;
use crate::finalize::{Finalizer, Finalizers, StepOutcome, StepStatus};
use crate::render::PageRenderer;
use crate::walk::{TreeWalker, WalkError, WalkEvent, WalkSummary};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Source directory does not exist or is not a directory: {0}")]
    SourceMissing(PathBuf),
    #[error("Refusing to clean {output}: it contains {contains}")]
    UnsafeOutput { output: PathBuf, contains: PathBuf },
    #[error("Failed to clean {path}: {source}")]
    Clean {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Walk(#[from] WalkError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Walk,
    Finalize,
}

/// Progress notifications emitted during a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    PhaseStarted(Phase),
    Entry(WalkEvent),
    StepFinished {
        step: Finalizer,
        result: Result<StepStatus, String>,
    },
    PhaseFinished(Phase),
}

/// Fully resolved inputs of a build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub name: String,
    pub name_short: String,
    /// Without trailing slash.
    pub root_url: String,
    pub source_dir: PathBuf,
    pub template_dir: PathBuf,
    pub output_dir: PathBuf,
    pub blacklist: Vec<String>,
    pub social_links: BTreeMap<String, String>,
    pub overrides: BTreeMap<String, serde_json::Value>,
    pub attributions: Vec<AttributionEntry>,
}

impl BuildOptions {
    /// Resolve options from a loaded config. Fails if an attribution file
    /// is missing, before anything touches the output directory.
    pub fn from_config(config: &SiteConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            name: config.site.name.clone(),
            name_short: config.site.name_short.clone(),
            root_url: config.root_url().to_string(),
            source_dir: std::path::absolute(&config.build.source_directory)?,
            template_dir: std::path::absolute(&config.build.template_directory)?,
            output_dir: std::path::absolute(&config.build.output_directory)?,
            blacklist: config.build.blacklist.clone(),
            social_links: config.social_media.clone(),
            overrides: config.overrides.clone(),
            attributions: config.attribution_entries()?,
        })
    }
}

#[derive(Debug)]
pub struct BuildReport {
    pub output_dir: PathBuf,
    pub walk: WalkSummary,
    pub steps: Vec<StepOutcome>,
}

impl BuildReport {
    pub fn failed_steps(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| !s.is_ok())
    }
}

pub struct SiteBuilder {
    options: BuildOptions,
    context: ContextDefaults,
}

impl SiteBuilder {
    pub fn new(options: BuildOptions) -> Self {
        let context = ContextDefaults {
            root_url: options.root_url.clone(),
            social_links: options.social_links.clone(),
            overrides: options.overrides.clone(),
        };
        Self { options, context }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Clean the output directory, then build into it.
    pub fn run(&self, events: Option<&Sender<BuildEvent>>) -> Result<BuildReport, BuildError> {
        self.clean()?;
        self.build(events)
    }

    /// Delete the output directory if present and recreate it empty.
    ///
    /// Refuses when the output directory holds the source or template
    /// directory.
    pub fn clean(&self) -> Result<(), BuildError> {
        let output = &self.options.output_dir;
        for input in [&self.options.source_dir, &self.options.template_dir] {
            if input.starts_with(output) {
                return Err(BuildError::UnsafeOutput {
                    output: output.clone(),
                    contains: input.clone(),
                });
            }
        }
        let clean_err = |source| BuildError::Clean {
            path: output.clone(),
            source,
        };
        if output.exists() {
            fs::remove_dir_all(output).map_err(clean_err)?;
        }
        fs::create_dir_all(output).map_err(clean_err)
    }

    /// Walk the source tree into the output directory and run the finalizers.
    pub fn build(&self, events: Option<&Sender<BuildEvent>>) -> Result<BuildReport, BuildError> {
        let opts = &self.options;
        if !opts.source_dir.is_dir() {
            return Err(BuildError::SourceMissing(opts.source_dir.clone()));
        }
        let emit = |event: BuildEvent| {
            if let Some(tx) = events {
                let _ = tx.send(event);
            }
        };

        let renderer = PageRenderer::new(&opts.template_dir, &opts.source_dir);

        emit(BuildEvent::PhaseStarted(Phase::Walk));
        let walker = TreeWalker {
            source_root: &opts.source_dir,
            output_root: &opts.output_dir,
            blacklist: &opts.blacklist,
            renderer: &renderer,
            context: &self.context,
        };
        let walk = walker.process_tree(&opts.source_dir, &mut |e| emit(BuildEvent::Entry(e)))?;
        emit(BuildEvent::PhaseFinished(Phase::Walk));

        emit(BuildEvent::PhaseStarted(Phase::Finalize));
        let finalizers = Finalizers {
            source_root: &opts.source_dir,
            output_root: &opts.output_dir,
            renderer: &renderer,
            context: &self.context,
            site_name: &opts.name,
            site_name_short: &opts.name_short,
            attributions: &opts.attributions,
        };
        let steps = finalizers.run(&mut |outcome| {
            emit(BuildEvent::StepFinished {
                step: outcome.step,
                result: match &outcome.result {
                    Ok(status) => Ok(status.clone()),
                    Err(e) => Err(e.to_string()),
                },
            })
        });
        emit(BuildEvent::PhaseFinished(Phase::Finalize));

        Ok(BuildReport {
            output_dir: opts.output_dir.clone(),
            walk,
            steps,
        })
    }
}

/// Entry page of a built site, if a build has produced one.
pub fn built_index(output_dir: &Path) -> Option<PathBuf> {
    let index = output_dir.join("index.html");
    index.is_file().then_some(index)
}
