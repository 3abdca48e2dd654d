// Copyright Covenant Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A verification session: the harnesses of a test binary, and how to run them.
//!
//! ```ignore
//! #[test]
//! fn verify() {
//!     let report = Session::from_env()?.harness(check_pop).harness(use_pop).run()?;
//!     assert!(report.all_passed());
//! }
//! ```

use crate::args::{LogFormat, OutputFormat, ValidateArgs, VerifyArgs};
use crate::dispatcher::Plan;
use crate::globals;
use crate::report;
use crate::runner::{HarnessRun, Registered, Runner, not_run};
use crate::scan::SourceIndex;
use crate::util;
use anyhow::{Context, Result, bail};
use clap::Parser;
use covenant::backend;
use covenant::internal::ContractDef;
use covenant_metadata::{
    CheckStatus, ContractedFunction, CovenantMetadata, GlobalFinding, HarnessAttributes, HarnessKind,
    HarnessMetadata, HarnessResult, Property, PropertyClass, VerificationReport, VerificationStatus,
    target_matches,
};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::{debug, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};
use tracing_tree::HierarchicalLayer;

/// Environment variable used to control this session log tracing.
pub const LOG_ENV_VAR: &str = "COVENANT_LOG";
/// Environment variable holding extra verification flags for [`Session::from_env`].
pub const ARGS_ENV_VAR: &str = "COVENANT_ARGS";

static LOGGER: Once = Once::new();

/// Initialize the logger using the `COVENANT_LOG` environment variable.
fn init_logger(format: LogFormat) {
    LOGGER.call_once(|| {
        let filter = EnvFilter::from_env(LOG_ENV_VAR);
        match format {
            LogFormat::Json => json_logs(filter),
            LogFormat::Hier => hier_logs(filter),
        }
    });
}

/// Configure global logger to use a json logger.
fn json_logs(filter: EnvFilter) {
    use tracing_subscriber::fmt::layer;
    let subscriber = Registry::default().with(filter).with(layer().json());
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        debug!("a global subscriber is already installed");
    }
}

/// Configure global logger to use a hierarchical view.
fn hier_logs(filter: EnvFilter) {
    let use_colors = console::colors_enabled();
    let subscriber = Registry::default().with(filter);
    let subscriber = subscriber.with(
        HierarchicalLayer::default()
            .with_writer(std::io::stderr)
            .with_indent_lines(true)
            .with_ansi(use_colors)
            .with_targets(true)
            .with_verbose_exit(true)
            .with_indent_amount(4),
    );
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        debug!("a global subscriber is already installed");
    }
}

pub struct Session {
    args: VerifyArgs,
    harnesses: Vec<fn()>,
}

impl Session {
    pub fn new(args: VerifyArgs) -> Self {
        Session { args, harnesses: Vec::new() }
    }

    /// A session configured by the flags in `COVENANT_ARGS`.
    pub fn from_env() -> Result<Self> {
        let extra = env::var(ARGS_ENV_VAR).unwrap_or_default();
        let args = VerifyArgs::try_parse_from(std::iter::once("covenant").chain(extra.split_whitespace()))
            .with_context(|| format!("Failed to parse `{ARGS_ENV_VAR}`"))?;
        args.validate().with_context(|| format!("Invalid options in `{ARGS_ENV_VAR}`"))?;
        Ok(Session::new(args))
    }

    pub fn args(&self) -> &VerifyArgs {
        &self.args
    }

    /// Register a harness: a function annotated with `#[covenant::proof]` or
    /// `#[covenant::proof_for_contract]`.
    pub fn harness(mut self, harness: fn()) -> Self {
        self.harnesses.push(harness);
        self
    }

    pub fn harnesses(mut self, harnesses: impl IntoIterator<Item = fn()>) -> Self {
        self.harnesses.extend(harnesses);
        self
    }

    /// Describe, order and verify every registered harness.
    pub fn run(self) -> Result<VerificationReport> {
        self.args.validate().context("Invalid verification options")?;
        init_logger(self.args.log_format);
        let args = &self.args;

        let mut registered = Vec::with_capacity(self.harnesses.len());
        for (position, harness) in self.harnesses.iter().enumerate() {
            let Some(def) = backend::describe(*harness) else {
                bail!("registered function #{position} is not a covenant harness");
            };
            let kind = match def.check {
                Some(target) => HarnessKind::ProofForContract { target_fn: target.to_string() },
                None => HarnessKind::Proof,
            };
            let metadata = HarnessMetadata {
                pretty_name: def.pretty_name(),
                original_file: def.file.to_string(),
                original_line: def.line,
                attributes: HarnessAttributes {
                    kind,
                    verified_stubs: def.stubs.iter().map(|stub| stub.to_string()).collect(),
                },
            };
            if args.is_selected(&metadata.pretty_name, metadata.short_name()) {
                registered.push(Registered { run: *harness, def, metadata, findings: Vec::new() });
            }
        }
        debug!(registered = self.harnesses.len(), selected = registered.len(), "described harnesses");

        let global_findings = self.global_pass(&mut registered)?;

        let metadata: Vec<HarnessMetadata> = registered.iter().map(|r| r.metadata.clone()).collect();
        let plan = if args.selects_harnesses() {
            warn!("harness selection skips dependency ordering");
            if !args.quiet {
                util::warning(
                    "selecting harnesses with `--harness` runs them without checking the contracts they replace",
                );
            }
            Plan::unordered(&metadata)?
        } else {
            Plan::build(&metadata)?
        };

        let mut results: Vec<Option<HarnessRun>> = registered.iter().map(|_| None).collect();
        let mut statuses: Vec<Option<VerificationStatus>> = vec![None; registered.len()];
        for (index, error) in plan.eager_errors() {
            statuses[index] = Some(VerificationStatus::DependencyError);
            let result = not_run(&registered[index].metadata, 0, error.to_string());
            self.print_harness(&result);
            results[index] = Some(HarnessRun { result, contracts: BTreeMap::new() });
        }

        let runner = Runner::new(args)?;
        for (stage, harnesses) in plan.stages().iter().enumerate() {
            if runner.stopped() {
                info!(stage, "stopping after a failure");
                break;
            }
            let mut runnable = Vec::new();
            for &index in harnesses {
                match plan.blocked(index, &statuses) {
                    Some(error) => {
                        statuses[index] = Some(VerificationStatus::DependencyError);
                        let result = not_run(&registered[index].metadata, stage, error.to_string());
                        results[index] = Some(HarnessRun { result, contracts: BTreeMap::new() });
                    }
                    None => runnable.push((index, &registered[index])),
                }
            }
            for (index, run) in runner.run_stage(stage, &runnable) {
                statuses[index] = Some(run.result.status);
                results[index] = Some(run);
            }
            for (index, error) in plan.unsound_group_checks(&statuses) {
                statuses[index] = Some(VerificationStatus::DependencyError);
                if let Some(run) = results[index].as_mut() {
                    run.result.status = VerificationStatus::DependencyError;
                    run.result.dependency_error = Some(error.to_string());
                }
            }
            for &index in harnesses {
                if let Some(run) = &results[index] {
                    self.print_harness(&run.result);
                }
            }
        }

        let (harnesses, contracts): (Vec<HarnessResult>, Vec<BTreeMap<String, &'static ContractDef>>) =
            results.into_iter().flatten().map(|run| (run.result, run.contracts)).unzip();
        let functions = report::summarize_functions(&harnesses, &contracts);
        let report = VerificationReport { harnesses, functions, ordering_bypassed: plan.is_bypassed() };
        info!(successes = report.successes(), failures = report.failures(), "verification complete");

        self.print_report(&report)?;
        if let Some(path) = &args.metadata {
            let metadata = self.metadata(&report, &contracts, global_findings);
            let json = serde_json::to_string_pretty(&metadata).context("Failed to serialize the metadata")?;
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write metadata to `{}`", path.display()))?;
        }
        Ok(report)
    }

    /// Run the global reachability pass, and fail the check harnesses of the
    /// offending functions before anything runs. The sources are `--src`, or
    /// else the ones declaring the registered harnesses.
    fn global_pass(&self, registered: &mut [Registered]) -> Result<Vec<GlobalFinding>> {
        let index = match &self.args.src {
            Some(src) => {
                let crate_name = self.args.crate_name.clone().unwrap_or_else(|| util::crate_name(src));
                SourceIndex::from_path(src, &crate_name)
                    .with_context(|| format!("Failed to index the sources under `{}`", src.display()))?
            }
            None => match harness_sources(registered)? {
                Some(index) => index,
                None => return Ok(Vec::new()),
            },
        };
        let findings = globals::analyze(&index);
        for (id, finding) in findings.iter().enumerate() {
            warn!(function = %finding.function, global = %finding.global, kind = ?finding.kind, "global finding");
            if !self.args.quiet {
                util::error(&finding.to_string());
            }
            let property = Property {
                class: PropertyClass::Specification,
                fn_name: Some(finding.function.clone()),
                id: id as u32,
                description: finding.to_string(),
                location: finding.location.clone(),
                status: CheckStatus::Failure,
                failing_path: None,
            };
            for harness in registered.iter_mut() {
                if harness.metadata.check_target().is_some_and(|target| target_matches(&finding.function, target)) {
                    harness.findings.push(property.clone());
                }
            }
        }
        Ok(findings)
    }

    fn print_harness(&self, result: &HarnessResult) {
        if self.args.quiet {
            return;
        }
        if let Some(text) = report::format_harness(result, self.args.output_format) {
            println!("{text}");
        }
    }

    fn print_report(&self, report: &VerificationReport) -> Result<()> {
        if self.args.quiet {
            return Ok(());
        }
        match self.args.output_format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(report).context("Failed to serialize the report")?;
                println!("{json}");
            }
            OutputFormat::Regular => {
                if !report.functions.is_empty() {
                    println!("{}", report::format_functions(report));
                }
                if let Some(summary) = report::format_summary(report) {
                    print!("{summary}");
                }
            }
            OutputFormat::Terse => {
                if let Some(summary) = report::format_summary(report) {
                    print!("{summary}");
                }
            }
        }
        Ok(())
    }

    /// The metadata of what this session verified.
    fn metadata(
        &self,
        report: &VerificationReport,
        contracts: &[BTreeMap<String, &'static ContractDef>],
        global_findings: Vec<GlobalFinding>,
    ) -> CovenantMetadata {
        let mut defs: BTreeMap<&str, &'static ContractDef> = BTreeMap::new();
        for reached in contracts {
            for (name, def) in reached {
                defs.entry(name.as_str()).or_insert(*def);
            }
        }
        let texts = |clauses: &[&str]| clauses.iter().map(|clause| clause.to_string()).collect::<Vec<_>>();
        let contracted_functions = defs
            .into_iter()
            .map(|(name, def)| ContractedFunction {
                pretty_name: name.to_string(),
                original_file: def.file.to_string(),
                original_line: def.line,
                requires: texts(def.requires),
                ensures: texts(def.ensures),
                modifies: texts(def.modifies),
                frees: texts(def.frees),
                harnesses: report
                    .functions
                    .get(name)
                    .map(|summary| summary.checked_by.keys().cloned().collect())
                    .unwrap_or_default(),
            })
            .collect();
        let crate_name = match (&self.args.crate_name, &self.args.src) {
            (Some(name), _) => name.clone(),
            (None, Some(src)) => util::crate_name(src),
            (None, None) => report
                .harnesses
                .first()
                .and_then(|r| r.harness.pretty_name.split("::").next())
                .unwrap_or("crate")
                .to_string(),
        };
        CovenantMetadata {
            crate_name,
            proof_harnesses: report.harnesses.iter().map(|r| r.harness.clone()).collect(),
            contracted_functions,
            global_findings,
        }
    }
}

/// Index the sources of the registered harnesses: the `src` directory of the
/// package for harnesses inside it, or the harness file itself otherwise.
fn harness_sources(registered: &[Registered]) -> Result<Option<SourceIndex>> {
    let Some(manifest) = env::var_os("CARGO_MANIFEST_DIR").map(PathBuf::from).or_else(|| env::current_dir().ok())
    else {
        return Ok(None);
    };
    let src = manifest.join("src").canonicalize().ok();
    let mut roots: Vec<(PathBuf, &str)> = Vec::new();
    for harness in registered {
        let Some(file) = locate(&manifest, harness.def.file) else {
            debug!(file = harness.def.file, "harness source not found");
            continue;
        };
        let root = match &src {
            Some(src) if file.starts_with(src) => src.clone(),
            _ => file,
        };
        let crate_name = harness.def.module.split("::").next().unwrap_or("crate");
        if !roots.iter().any(|(known, _)| *known == root) {
            roots.push((root, crate_name));
        }
    }
    let Some(((first, crate_name), rest)) = roots.split_first() else {
        if !registered.is_empty() {
            warn!(manifest = %manifest.display(), "no harness sources found, skipping the global pass");
        }
        return Ok(None);
    };
    let failed = |root: &Path| format!("Failed to index the sources under `{}`", root.display());
    let mut index = SourceIndex::from_path(first, crate_name).with_context(|| failed(first))?;
    for (root, crate_name) in rest {
        index.add_root(root, crate_name).with_context(|| failed(root))?;
    }
    Ok(Some(index))
}

/// Resolve a `file!()` path. Inside a workspace it is relative to the
/// workspace root rather than to the package.
fn locate(manifest: &Path, file: &str) -> Option<PathBuf> {
    let file = Path::new(file);
    let found = if file.is_absolute() {
        Some(file.to_path_buf())
    } else {
        manifest.ancestors().map(|dir| dir.join(file)).find(|path| path.is_file())
    };
    found.filter(|path| path.is_file()).and_then(|path| path.canonicalize().ok())
}
