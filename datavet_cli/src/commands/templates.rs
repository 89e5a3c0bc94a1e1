use std::path::PathBuf;

use anyhow::Result;
use colored::*;

use datavet_templates::TemplateRegistry;

use crate::output;

/// Lists every discoverable template with its version and column count.
pub fn execute(templates_dir: Vec<PathBuf>) -> Result<i32> {
    let registry = TemplateRegistry::new(templates_dir);
    let templates = registry.list();

    if templates.is_empty() {
        output::print_info("no templates found");
        for dir in registry.search_dirs() {
            println!("  searched: {}", dir.display());
        }
        return Ok(0);
    }

    for template in &templates {
        println!(
            "{}  {}  ({} columns)",
            template.template_id.bold(),
            template.version.cyan(),
            template.columns.len()
        );
    }
    Ok(0)
}
