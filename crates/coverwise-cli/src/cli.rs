//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Coverwise - Estimate what a year of health care costs under each plan
#[derive(Parser)]
#[command(name = "coverwise")]
#[command(about = "Health insurance cost estimator and plan comparison", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Reference data file (defaults to the user override, then built-in tables)
    #[arg(long, global = true)]
    pub reference: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Household members and how to build their treatment plan
#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    /// Member profile (JSON or TOML); repeat for each household member
    #[arg(short, long = "member", required = true)]
    pub members: Vec<PathBuf>,

    /// Sample complications instead of using expected values
    #[arg(long)]
    pub sample_complications: bool,

    /// Seed for sampled complications (implies --sample-complications)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Leave out expected complications entirely
    #[arg(long, conflicts_with_all = ["sample_complications", "seed"])]
    pub no_complications: bool,

    /// Skip the preventive care schedule
    #[arg(long)]
    pub no_preventive: bool,

    /// Fail on declared services that match no category
    #[arg(long)]
    pub strict: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Predict annual service utilization for a member
    Predict {
        /// Member profile (JSON or TOML)
        #[arg(short, long)]
        member: PathBuf,
    },

    /// Score a member's health risk
    Risk {
        /// Member profile (JSON or TOML)
        #[arg(short, long)]
        member: PathBuf,
    },

    /// Build the annual treatment plan for a household
    Plan {
        #[command(flatten)]
        plan: PlanArgs,
    },

    /// Estimate the cost of one medication
    Medication {
        /// Drug name, optionally with strength (e.g. "Lipitor 20mg")
        name: String,

        /// Dosage string when not part of the name
        #[arg(long)]
        dosage: Option<String>,

        /// Drug class (e.g. statin) when the name alone is ambiguous
        #[arg(long)]
        class: Option<String>,

        /// Dispensed through a specialty pharmacy
        #[arg(long)]
        specialty: bool,
    },

    /// Simulate a year under one policy
    Simulate {
        #[command(flatten)]
        plan: PlanArgs,

        /// Policy file (JSON or TOML)
        #[arg(short, long)]
        policy: PathBuf,

        /// Household size (defaults to the number of members)
        #[arg(long)]
        family_size: Option<usize>,

        /// CSV of price overrides (service,member,price)
        #[arg(long)]
        prices: Option<PathBuf>,

        /// Show the month-by-month ledger
        #[arg(long)]
        monthly: bool,
    },

    /// Compare several policies for the same household
    Compare {
        #[command(flatten)]
        plan: PlanArgs,

        /// Policy file (JSON or TOML); repeat for each policy
        #[arg(short, long = "policy", required = true)]
        policies: Vec<PathBuf>,

        /// Household size (defaults to the number of members)
        #[arg(long)]
        family_size: Option<usize>,

        /// CSV of price overrides (service,member,price)
        #[arg(long)]
        prices: Option<PathBuf>,
    },

    /// Inspect or export reference data
    Reference {
        #[command(subcommand)]
        action: Option<ReferenceAction>,
    },
}

#[derive(Subcommand)]
pub enum ReferenceAction {
    /// Show version, fingerprint, and table sizes
    Show,

    /// Print the user override path
    Path,

    /// Write the built-in reference data to a file for editing
    Export {
        /// Output path (defaults to the user override path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
