//! Bundle assembly.
//!
//! Turns one builder lambda directory into a deployable zip. The work is an
//! explicit, ordered list of fallible [`Step`]s; the first failure aborts the
//! bundle and the build, so a half-built bundle is never archived.
//!
//! ```text
//! .serverless_nextjs/default-lambda/      build/__NEXT_PAGE_LAMBDA_0/
//! ├── index.js             ── copy ──▶    ├── index.js          (removed)
//! ├── manifest.json                       ├── build-info.ts     (generated)
//! └── .next/serverless/...                ├── launcher.ts       (copied)
//!                                         ├── bridge.ts         (copied)
//!                                         └── ...
//!                          ── compile ──▶ index.js (single compiled entry point)
//!                          ── remove sources, archive ──▶ build/__NEXT_PAGE_LAMBDA_0.zip
//! ```
//!
//! Progress is reported through an optional channel of [`BundleEvent`]s, the
//! same way the CLI reports every other stage.

use crate::archive::{self, ArchiveError};
use crate::build_info::{BUILD_INFO_FILE, BuildInfo};
use crate::config::{AdapterConfig, ENTRY_PLACEHOLDER, OUT_DIR_PLACEHOLDER};
use crate::exec::{CommandLine, ExecError};
use crate::routes::LambdaKind;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Lambda output not found: {0}")]
    MissingLambdaOutput(PathBuf),
    #[error("Bundle source not found: {0}")]
    MissingSource(PathBuf),
    #[error("{step} failed: {source}")]
    Archive {
        step: Step,
        source: ArchiveError,
    },
    #[error("Cannot render build info for {path}: {source}")]
    BuildInfo {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Bundler failed: {0}")]
    Exec(#[from] ExecError),
}

/// Entry point generated by the builder; replaced by the compiled launcher.
pub const FRAMEWORK_ENTRY: &str = "index.js";
/// File names of the launcher and bridge inside the bundle.
pub const LAUNCHER_FILE: &str = "launcher.ts";
pub const BRIDGE_FILE: &str = "bridge.ts";

/// One stage of bundle assembly, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    CopyLambdaOutput,
    WriteBuildInfo,
    InstallEntryPoint,
    Compile,
    RemoveSources,
    Archive,
}

impl Step {
    pub const ORDER: [Step; 6] = [
        Step::CopyLambdaOutput,
        Step::WriteBuildInfo,
        Step::InstallEntryPoint,
        Step::Compile,
        Step::RemoveSources,
        Step::Archive,
    ];
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::CopyLambdaOutput => "copy lambda output",
            Step::WriteBuildInfo => "write build info",
            Step::InstallEntryPoint => "install entry point",
            Step::Compile => "compile",
            Step::RemoveSources => "remove sources",
            Step::Archive => "archive",
        };
        f.write_str(name)
    }
}

/// Progress events sent while a bundle is assembled.
#[derive(Debug, Clone, PartialEq)]
pub enum BundleEvent {
    Started {
        lambda: LambdaKind,
        dir: PathBuf,
    },
    StepDone {
        lambda: LambdaKind,
        step: Step,
        detail: String,
    },
    Archived {
        lambda: LambdaKind,
        archive: PathBuf,
        files: Vec<String>,
    },
}

/// Everything a bundle needs, resolved against the project directory.
#[derive(Debug, Clone)]
pub struct BundlePlan {
    pub kind: LambdaKind,
    pub build_info: BuildInfo,
    /// Builder lambda directory to copy from.
    pub lambda_output: PathBuf,
    /// Bundle directory, `<build_dir>/<LAMBDA_ID>`.
    pub bundle_dir: PathBuf,
    /// Archive path, `<build_dir>/<LAMBDA_ID>.zip`.
    pub archive: PathBuf,
    pub launcher: PathBuf,
    pub bridge: PathBuf,
    pub bundler_command: Vec<String>,
    pub compression_level: u32,
    /// Working directory for the bundler.
    pub project: PathBuf,
}

impl BundlePlan {
    pub fn new(
        kind: LambdaKind,
        build_info: BuildInfo,
        project: &Path,
        config: &AdapterConfig,
    ) -> Self {
        let build_dir = project.join(&config.paths.build_dir);
        Self {
            kind,
            build_info,
            lambda_output: project
                .join(&config.paths.builder_output)
                .join(kind.builder_dir()),
            bundle_dir: build_dir.join(kind.id()),
            archive: build_dir.join(format!("{}.zip", kind.id())),
            launcher: project.join(&config.paths.launcher),
            bridge: project.join(&config.paths.bridge),
            bundler_command: config.bundler.command.clone(),
            compression_level: config.archive.compression_level,
            project: project.to_path_buf(),
        }
    }
}

/// Result of a completed bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleReport {
    pub lambda: LambdaKind,
    pub archive: PathBuf,
    pub files: Vec<String>,
}

/// Run every step of `plan` in order, stopping at the first failure.
pub fn bundle(
    plan: &BundlePlan,
    progress: Option<Sender<BundleEvent>>,
) -> Result<BundleReport, BundleError> {
    let send = |event: BundleEvent| {
        if let Some(tx) = &progress {
            // A dropped receiver only loses progress output.
            let _ = tx.send(event);
        }
    };

    tracing::info!(lambda = %plan.kind, dir = %plan.bundle_dir.display(), "assembling bundle");
    send(BundleEvent::Started {
        lambda: plan.kind,
        dir: plan.bundle_dir.clone(),
    });

    let mut files = Vec::new();
    for step in Step::ORDER {
        let detail = match step {
            Step::CopyLambdaOutput => copy_lambda_output(plan)?,
            Step::WriteBuildInfo => write_build_info(plan)?,
            Step::InstallEntryPoint => install_entry_point(plan)?,
            Step::Compile => compile(plan)?,
            Step::RemoveSources => remove_sources(plan)?,
            Step::Archive => {
                files = archive_bundle(plan)?;
                format!("{} files", files.len())
            }
        };
        tracing::debug!(lambda = %plan.kind, %step, %detail, "step done");
        send(BundleEvent::StepDone {
            lambda: plan.kind,
            step,
            detail,
        });
    }

    send(BundleEvent::Archived {
        lambda: plan.kind,
        archive: plan.archive.clone(),
        files: files.clone(),
    });
    Ok(BundleReport {
        lambda: plan.kind,
        archive: plan.archive.clone(),
        files,
    })
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> BundleError + '_ {
    move |source| BundleError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn copy_lambda_output(plan: &BundlePlan) -> Result<String, BundleError> {
    if !plan.lambda_output.is_dir() {
        return Err(BundleError::MissingLambdaOutput(plan.lambda_output.clone()));
    }
    let copied = archive::copy_dir(&plan.lambda_output, &plan.bundle_dir).map_err(|source| {
        BundleError::Archive {
            step: Step::CopyLambdaOutput,
            source,
        }
    })?;
    Ok(format!("{copied} files"))
}

fn write_build_info(plan: &BundlePlan) -> Result<String, BundleError> {
    let path = plan.bundle_dir.join(BUILD_INFO_FILE);
    let module = plan
        .build_info
        .render_module()
        .map_err(|source| BundleError::BuildInfo {
            path: path.clone(),
            source,
        })?;
    fs::write(&path, module).map_err(io_err(&path))?;
    Ok(format!("{} pages", plan.build_info.pages.len()))
}

fn install_entry_point(plan: &BundlePlan) -> Result<String, BundleError> {
    for (src, name) in [(&plan.launcher, LAUNCHER_FILE), (&plan.bridge, BRIDGE_FILE)] {
        if !src.is_file() {
            return Err(BundleError::MissingSource(src.clone()));
        }
        let dst = plan.bundle_dir.join(name);
        fs::copy(src, &dst).map_err(io_err(&dst))?;
    }
    let framework_entry = plan.bundle_dir.join(FRAMEWORK_ENTRY);
    fs::remove_file(&framework_entry).map_err(io_err(&framework_entry))?;
    Ok(format!("{LAUNCHER_FILE}, {BRIDGE_FILE}"))
}

fn compile(plan: &BundlePlan) -> Result<String, BundleError> {
    let vars = HashMap::from([
        (
            ENTRY_PLACEHOLDER,
            plan.bundle_dir.join(LAUNCHER_FILE).display().to_string(),
        ),
        (
            OUT_DIR_PLACEHOLDER,
            format!("{}/", plan.bundle_dir.display()),
        ),
    ]);
    let command = CommandLine::new(&plan.bundler_command, &plan.project).substitute(&vars);
    let output = command.run()?;
    if !output.stdout.trim().is_empty() {
        tracing::debug!(lambda = %plan.kind, stdout = %output.stdout.trim(), "bundler output");
    }
    Ok(command.to_string())
}

fn remove_sources(plan: &BundlePlan) -> Result<String, BundleError> {
    for name in [LAUNCHER_FILE, BRIDGE_FILE, BUILD_INFO_FILE] {
        let path = plan.bundle_dir.join(name);
        fs::remove_file(&path).map_err(io_err(&path))?;
    }
    Ok(format!("{LAUNCHER_FILE}, {BRIDGE_FILE}, {BUILD_INFO_FILE}"))
}

fn archive_bundle(plan: &BundlePlan) -> Result<Vec<String>, BundleError> {
    let wrap = |source| BundleError::Archive {
        step: Step::Archive,
        source,
    };
    let files = archive::list_files(&plan.bundle_dir).map_err(wrap)?;
    archive::write_zip(
        &plan.bundle_dir,
        &files,
        &plan.archive,
        plan.compression_level,
    )
    .map_err(wrap)?;
    Ok(files)
}
