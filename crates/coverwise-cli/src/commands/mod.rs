//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `profile` - Per-member commands (predict, risk)
//! - `plan` - Treatment plan and medication pricing commands
//! - `simulate` - Policy simulation and comparison commands
//! - `reference` - Reference data inspection and export

pub mod plan;
pub mod profile;
pub mod reference;
pub mod simulate;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use coverwise_core::{ComplicationModel, InsurancePolicy, Member, PlanConfig, ReferenceData};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cli::PlanArgs;

// Re-export command functions for main.rs
pub use plan::*;
pub use profile::*;
pub use reference::*;
pub use simulate::*;

/// Load reference data (explicit path, then user override, then built-in)
pub fn load_reference(path: Option<&Path>) -> Result<Arc<ReferenceData>> {
    let reference = ReferenceData::load(path).context("Failed to load reference data")?;
    debug!(
        "Reference data {} ({})",
        reference.version,
        &reference.fingerprint()[..12]
    );
    Ok(Arc::new(reference))
}

/// Read a JSON or TOML document, chosen by file extension
pub fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("toml") => {
            toml::from_str(&content).with_context(|| format!("Invalid TOML in {}", path.display()))
        }
        _ => serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display())),
    }
}

pub fn load_member(path: &Path) -> Result<Member> {
    let member: Member = read_document(path)?;
    member
        .validate()
        .with_context(|| format!("Invalid member profile {}", path.display()))?;
    Ok(member)
}

pub fn load_members(paths: &[PathBuf]) -> Result<Vec<Member>> {
    paths.iter().map(|p| load_member(p)).collect()
}

pub fn load_policies(paths: &[PathBuf]) -> Result<Vec<InsurancePolicy>> {
    paths
        .iter()
        .map(|p| {
            let policy: InsurancePolicy = read_document(p)?;
            policy
                .validate()
                .with_context(|| format!("Invalid policy {}", p.display()))?;
            Ok(policy)
        })
        .collect()
}

/// Plan generator settings from command-line flags
pub fn plan_config(args: &PlanArgs) -> PlanConfig {
    let complication_model = if args.no_complications {
        ComplicationModel::None
    } else if let Some(seed) = args.seed {
        ComplicationModel::Seeded(seed)
    } else if args.sample_complications {
        ComplicationModel::Seeded(0)
    } else {
        ComplicationModel::ExpectedValue
    };

    PlanConfig {
        complication_model,
        strict_classification: args.strict,
        include_preventive: !args.no_preventive,
        ..Default::default()
    }
}

/// Household size: explicit value, else one per member profile
pub fn resolve_family_size(explicit: Option<usize>, member_count: usize) -> Result<usize> {
    match explicit {
        Some(0) => bail!("--family-size must be at least 1"),
        Some(size) => {
            if size < member_count {
                warn!(
                    "Family size {} is smaller than the {} member profiles given",
                    size, member_count
                );
            }
            Ok(size)
        }
        None => Ok(member_count.max(1)),
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Format dollars with thousands separators: 12345.6 -> "$12,345.60"
pub fn money(amount: f64) -> String {
    let negative = amount < 0.0;
    let cents = (amount.abs() * 100.0).round() as u64;
    let dollars = (cents / 100).to_string();

    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (i, ch) in dollars.chars().enumerate() {
        if i > 0 && (dollars.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!(
        "{}${}.{:02}",
        if negative { "-" } else { "" },
        grouped,
        cents % 100
    )
}

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
