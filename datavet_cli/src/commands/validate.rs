use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::{info, warn};

use datavet_adapters::{
    AdapterError, InputFormat, LoadDiagnostics, LoadOptions, csv::load_csv,
    geopackage::{list_layers, load_geopackage, quick_check},
    parquet::{load_parquet, probe_metadata},
    shapefile::{integrity_errors, load_shapefile},
    stage_input,
};
use datavet_core::{
    EngineResult, InputMeta, Issue, Provenance, Report, TemplateMeta, now_iso,
};
use datavet_engine::{Session, normalize::GEOMETRY_ALIAS_CANDIDATES, normalize_geometry, validate};
use datavet_templates::TemplateRegistry;

use crate::output;

/// Relation the adapter registers.
const RAW_RELATION: &str = "v_raw";
/// Relation validation runs against, derived by geometry normalization.
const RELATION: &str = "v";

pub struct ValidateArgs {
    pub input: String,
    pub template: String,
    pub template_version: Option<String>,
    pub templates_dir: Vec<PathBuf>,
    pub format: Option<String>,
    pub layer: Option<String>,
    pub geometry: Option<String>,
    pub delimiter: Option<char>,
    pub report: Option<PathBuf>,
    pub json: bool,
    pub timeout_sec: Option<u64>,
    pub run_id: Option<String>,
}

/// Runs the full pipeline and returns the report's exit code. Dataset
/// problems become report issues; only usage errors propagate as `Err`.
pub async fn execute(args: ValidateArgs) -> Result<i32> {
    let started_at = now_iso();

    let registry = TemplateRegistry::new(args.templates_dir.clone());
    let template = registry
        .load(&args.template, args.template_version.as_deref())
        .with_context(|| format!("loading template '{}'", args.template))?;
    info!(
        template_id = %template.template_id,
        version = %template.version,
        "template loaded"
    );

    let requested_format: Option<InputFormat> = match &args.format {
        Some(name) => Some(name.parse().map_err(|e: String| anyhow!(e))?),
        None => None,
    };
    let delimiter = match args.delimiter {
        Some(c) if c.is_ascii() => Some(c as u8),
        Some(c) => return Err(anyhow!("delimiter must be a single ASCII character, got {c:?}")),
        None => None,
    };

    let input_path = PathBuf::from(&args.input);
    let size_bytes = std::fs::metadata(&input_path).ok().map(|m| m.len());

    let mut result = EngineResult::new();
    let mut adapter_diag = serde_json::Map::new();
    let mut format_label = requested_format.map(|f| f.as_str().to_string());
    let mut layer = args.layer.clone();

    match stage_input(&input_path) {
        Err(err) => result.push(Issue::unpack_error(err.to_string())),
        Ok(staged) => {
            if staged.is_staged() {
                adapter_diag.insert(
                    "unpack".to_string(),
                    serde_json::json!({
                        "staged_file": staged.path().file_name()
                            .map(|n| n.to_string_lossy().into_owned()),
                    }),
                );
            }

            let format = requested_format
                .or_else(|| InputFormat::detect(staged.path()))
                .ok_or_else(|| {
                    anyhow!(
                        "cannot detect the format of '{}'; pass --format",
                        staged.path().display()
                    )
                })?;
            format_label = Some(format.as_str().to_string());

            let session = Session::new();
            let mut needed: Vec<String> =
                template.columns.iter().map(|c| c.name.clone()).collect();
            needed.extend(GEOMETRY_ALIAS_CANDIDATES.iter().map(|a| a.to_string()));
            let options = LoadOptions {
                deadline: args
                    .timeout_sec
                    .map(|s| Instant::now() + Duration::from_secs(s)),
                ..Default::default()
            };

            let loaded = load_input(
                &session,
                staged.path(),
                format,
                &mut layer,
                &needed,
                delimiter,
                &options,
                &mut result,
            )
            .await;

            match loaded {
                Err(err) => result.push(Issue::corrupted_file(format!("open_failed: {err}"))),
                Ok(diag) => {
                    adapter_diag.insert(
                        "load".to_string(),
                        serde_json::to_value(&diag).unwrap_or(Value::Null),
                    );

                    match normalize_geometry(&session, RAW_RELATION, RELATION, args.geometry.as_deref())
                        .await
                    {
                        Ok(outcome) => {
                            adapter_diag.insert(
                                "normalization".to_string(),
                                serde_json::to_value(&outcome).unwrap_or(Value::Null),
                            );
                        }
                        Err(err) => result.push(Issue::corrupted_file(format!(
                            "geometry_normalization_failed: {err}"
                        ))),
                    }

                    if let Ok(rows) = session.count_rows(RELATION).await {
                        result.row_count = Some(rows);
                    }

                    // Value checks only make sense over an intact input.
                    if result.ok {
                        match validate(&session, RELATION, &template).await {
                            Ok(engine_result) => result.merge(engine_result),
                            Err(err) => result.push(Issue::corrupted_file(format!(
                                "validation_failed: {err}"
                            ))),
                        }
                    }
                }
            }

            if let Err(err) = staged.cleanup() {
                warn!(%err, "staging cleanup failed");
            }
        }
    }

    if !adapter_diag.is_empty() {
        result.metrics.adapter = Some(Value::Object(adapter_diag));
    }

    let report = Report::build(
        result,
        TemplateMeta {
            template_id: template.template_id.clone(),
            version: template.version.clone(),
        },
        InputMeta {
            path: args.input.clone(),
            format: format_label,
            layer,
            size_bytes,
        },
        Provenance {
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            git_rev: std::env::var("DATAVET_GIT_REV").ok(),
            run_id: args.run_id,
        },
        Some(started_at),
    );

    if let Some(path) = &args.report {
        report
            .write_json(path)
            .with_context(|| format!("writing report to {}", path.display()))?;
    }
    if args.json {
        println!("{}", report.to_json()?);
    } else {
        output::print_report(&report);
    }
    Ok(report.exit_code())
}

/// Probes the source, then registers it as the raw relation. Probe findings
/// become `CORRUPTED_FILE` issues; a failed registration is returned as the
/// error.
#[allow(clippy::too_many_arguments)]
async fn load_input(
    session: &Session,
    path: &Path,
    format: InputFormat,
    layer: &mut Option<String>,
    needed: &[String],
    delimiter: Option<u8>,
    options: &LoadOptions,
    result: &mut EngineResult,
) -> std::result::Result<LoadDiagnostics, AdapterError> {
    match format {
        InputFormat::Csv => load_csv(session, path, RAW_RELATION, delimiter).await,

        InputFormat::Parquet => {
            // A footer that fails the probe will not register either; skip
            // the second open so the report carries one issue.
            probe_metadata(path)?;
            load_parquet(session, path, RAW_RELATION).await
        }

        InputFormat::Geopackage => {
            let findings = quick_check(path);
            if !findings.is_empty() {
                result.push(Issue::corrupted_file(format!(
                    "quick_check: {}",
                    findings.join("; ")
                )));
            }
            let chosen = match layer.clone() {
                Some(name) => name,
                None => list_layers(path)?.into_iter().next().ok_or_else(|| {
                    AdapterError::Open("geopackage has no feature or attribute layers".to_string())
                })?,
            };
            *layer = Some(chosen.clone());
            load_geopackage(session, path, &chosen, RAW_RELATION, Some(needed), options).await
        }

        InputFormat::Shapefile => {
            let findings = integrity_errors(path);
            if !findings.is_empty() {
                result.push(Issue::corrupted_file(findings.join("; ")));
            }
            load_shapefile(session, path, RAW_RELATION, Some(needed), options).await
        }
    }
}
