//! Coverwise CLI - Health plan cost estimator
//!
//! Usage:
//!   coverwise plan --member me.json                      Build a treatment plan
//!   coverwise simulate --member me.json --policy a.toml  Simulate one policy
//!   coverwise compare --member me.json --policy a.toml --policy b.toml
//!   coverwise medication "Lipitor 20mg"                  Price a medication

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact().with_writer(std::io::stderr))
        .init();

    let reference = cli.reference.as_deref();
    let json = cli.json;

    match cli.command {
        Commands::Predict { member } => commands::cmd_predict(reference, &member, json),
        Commands::Risk { member } => commands::cmd_risk(reference, &member, json),
        Commands::Plan { plan } => commands::cmd_plan(reference, &plan, json),
        Commands::Medication {
            name,
            dosage,
            class,
            specialty,
        } => commands::cmd_medication(
            reference,
            &name,
            dosage.as_deref(),
            class.as_deref(),
            specialty,
            json,
        ),
        Commands::Simulate {
            plan,
            policy,
            family_size,
            prices,
            monthly,
        } => commands::cmd_simulate(
            reference,
            &plan,
            &policy,
            family_size,
            prices.as_deref(),
            monthly,
            json,
        ),
        Commands::Compare {
            plan,
            policies,
            family_size,
            prices,
        } => commands::cmd_compare(
            reference,
            &plan,
            &policies,
            family_size,
            prices.as_deref(),
            json,
        ),
        Commands::Reference { action } => match action {
            None | Some(ReferenceAction::Show) => commands::cmd_reference_show(reference, json),
            Some(ReferenceAction::Path) => commands::cmd_reference_path(),
            Some(ReferenceAction::Export { output, force }) => {
                commands::cmd_reference_export(output.as_deref(), force)
            }
        },
    }
}
