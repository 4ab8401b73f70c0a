//! Reference data commands (show, path, export)

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use coverwise_core::{default_reference_path, DEFAULT_REFERENCE};
use serde::Serialize;

use super::{load_reference, print_json};

#[derive(Serialize)]
struct ReferenceSummary {
    version: String,
    fingerprint: String,
    conditions: usize,
    drugs: usize,
    drug_classes: usize,
    preventive_services: usize,
    classifier_rules: usize,
    override_path: Option<String>,
    override_active: bool,
}

pub fn cmd_reference_show(reference: Option<&Path>, json: bool) -> Result<()> {
    let data = load_reference(reference)?;
    let override_path = default_reference_path();
    let summary = ReferenceSummary {
        version: data.version.clone(),
        fingerprint: data.fingerprint().to_string(),
        conditions: data.conditions.len(),
        drugs: data.drugs.len(),
        drug_classes: data.drug_classes.len(),
        preventive_services: data.preventive_schedule.len(),
        classifier_rules: data.classifier.len(),
        override_active: reference.is_none() && override_path.as_ref().is_some_and(|p| p.exists()),
        override_path: override_path.map(|p| p.display().to_string()),
    };

    if json {
        return print_json(&summary);
    }

    let source = match reference {
        Some(path) => path.display().to_string(),
        None if summary.override_active => summary.override_path.clone().unwrap_or_default(),
        None => "built-in".to_string(),
    };

    println!();
    println!("📚 Reference Data");
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Source:       {}", source);
    println!("   Version:      {}", summary.version);
    println!("   Fingerprint:  {}", summary.fingerprint);
    println!();
    println!("   Conditions:          {}", summary.conditions);
    println!("   Known drugs:         {}", summary.drugs);
    println!("   Drug classes:        {}", summary.drug_classes);
    println!("   Preventive services: {}", summary.preventive_services);
    println!("   Classifier rules:    {}", summary.classifier_rules);
    println!();
    Ok(())
}

pub fn cmd_reference_path() -> Result<()> {
    match default_reference_path() {
        Some(path) => println!("{}", path.display()),
        None => bail!("No local data directory on this platform"),
    }
    Ok(())
}

/// Write the built-in tables to `output` (or the user override path)
pub fn cmd_reference_export(output: Option<&Path>, force: bool) -> Result<()> {
    let path = match output {
        Some(path) => path.to_path_buf(),
        None => default_reference_path().context("No local data directory on this platform")?,
    };

    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let header = format!(
        "# Exported by coverwise {} on {}\n",
        env!("CARGO_PKG_VERSION"),
        Utc::now().format("%Y-%m-%d")
    );
    fs::write(&path, format!("{}{}", header, DEFAULT_REFERENCE))
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("✅ Reference data written to {}", path.display());
    Ok(())
}
