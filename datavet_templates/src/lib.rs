//! # Datavet Templates
//!
//! Template discovery and loading.
//!
//! Templates are JSON files resolved from a list of search directories with
//! the following precedence:
//!
//! 1. directories supplied by the caller (CLI `--templates-dir`)
//! 2. `DATAVET_TEMPLATES_DIR` (`:`-separated)
//!
//! Within a directory, a file named `<template_id>.json` wins; otherwise all
//! `*.json` files are scanned for a matching `template_id`. When no explicit
//! version is requested, the highest three-component version is selected.

use std::path::{Path, PathBuf};

use datavet_core::Template;
use thiserror::Error;
use tracing::debug;

/// Environment variable holding extra `:`-separated template directories.
pub const TEMPLATES_DIR_ENV: &str = "DATAVET_TEMPLATES_DIR";

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;

/// Errors raised while resolving or parsing templates.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// No template with the requested id exists in any search directory
    #[error("template '{template_id}' not found in {search_dirs:?}")]
    NotFound {
        template_id: String,
        search_dirs: Vec<PathBuf>,
    },

    /// The id exists but not at the requested version
    #[error("template '{template_id}' version '{version}' not found")]
    VersionNotFound {
        template_id: String,
        version: String,
    },
}

/// Finds and loads templates by id and optional version.
pub struct TemplateRegistry {
    search_dirs: Vec<PathBuf>,
}

impl TemplateRegistry {
    /// Builds a registry from caller-supplied directories plus the
    /// environment fallback.
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        let mut dirs = search_dirs;
        if let Ok(env) = std::env::var(TEMPLATES_DIR_ENV) {
            dirs.extend(
                env.split(':')
                    .filter(|p| !p.trim().is_empty())
                    .map(PathBuf::from),
            );
        }
        Self { search_dirs: dirs }
    }

    /// The directories this registry searches, in precedence order.
    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Loads a template by id. With `version = None` the highest version
    /// among all candidates wins.
    pub fn load(&self, template_id: &str, version: Option<&str>) -> Result<Template> {
        let mut candidates = Vec::new();

        // Direct filename match first, then a full scan.
        for dir in &self.search_dirs {
            let direct = dir.join(format!("{template_id}.json"));
            if direct.is_file()
                && let Some(tpl) = parse_template(&direct)
                && tpl.template_id == template_id
            {
                candidates.push(tpl);
            }
        }
        if candidates.is_empty() {
            for path in self.template_files() {
                if let Some(tpl) = parse_template(&path)
                    && tpl.template_id == template_id
                {
                    candidates.push(tpl);
                }
            }
        }

        if candidates.is_empty() {
            return Err(TemplateError::NotFound {
                template_id: template_id.to_string(),
                search_dirs: self.search_dirs.clone(),
            });
        }

        let tpl = match version {
            Some(v) => candidates
                .into_iter()
                .find(|t| t.version == v)
                .ok_or_else(|| TemplateError::VersionNotFound {
                    template_id: template_id.to_string(),
                    version: v.to_string(),
                })?,
            None => candidates
                .into_iter()
                .max_by_key(|t| t.version_ordinal())
                .expect("candidates is non-empty"),
        };

        debug!(
            template_id = %tpl.template_id,
            version = %tpl.version,
            "template loaded"
        );
        Ok(tpl)
    }

    /// Lists every parseable template across the search directories,
    /// deduplicated on (id, version), first match wins.
    pub fn list(&self) -> Vec<Template> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for path in self.template_files() {
            if let Some(tpl) = parse_template(&path)
                && seen.insert((tpl.template_id.clone(), tpl.version.clone()))
            {
                out.push(tpl);
            }
        }
        out
    }

    fn template_files(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for dir in &self.search_dirs {
            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };
            let mut files: Vec<PathBuf> = entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|e| e == "json"))
                .collect();
            files.sort();
            out.extend(files);
        }
        out
    }
}

fn parse_template(path: &Path) -> Option<Template> {
    let text = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Template>(&text) {
        Ok(tpl) => Some(tpl),
        Err(err) => {
            debug!(path = %path.display(), %err, "skipping unparseable template file");
            None
        }
    }
}
