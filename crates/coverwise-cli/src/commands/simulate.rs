//! Policy simulation and comparison commands

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Month;
use coverwise_core::{
    CostSimulationEngine, PolicyComparator, PolicyCostAnalysis, PriceOverrides, PriceSource,
};

use super::{
    build_plan, load_policies, load_reference, money, print_json, resolve_family_size, truncate,
};
use crate::cli::PlanArgs;

fn load_prices(path: Option<&Path>) -> Result<Option<Arc<dyn PriceSource>>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let overrides = PriceOverrides::from_path(path)
        .with_context(|| format!("Failed to load price overrides from {}", path.display()))?;
    tracing::info!("Loaded {} price overrides", overrides.len());
    let prices: Arc<dyn PriceSource> = Arc::new(overrides);
    Ok(Some(prices))
}

fn month_name(month: u32) -> &'static str {
    u8::try_from(month)
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .map(|m| m.name())
        .unwrap_or("?")
}

pub fn cmd_simulate(
    reference: Option<&Path>,
    args: &PlanArgs,
    policy_path: &Path,
    family_size: Option<usize>,
    prices: Option<&Path>,
    monthly: bool,
    json: bool,
) -> Result<()> {
    let reference = load_reference(reference)?;
    let (plan, member_count) = build_plan(reference.clone(), args)?;
    let family_size = resolve_family_size(family_size, member_count)?;
    let policy = load_policies(&[policy_path.to_path_buf()])?
        .pop()
        .context("No policy loaded")?;

    let mut engine = CostSimulationEngine::new(reference);
    if let Some(prices) = load_prices(prices)? {
        engine = engine.with_prices(prices);
    }
    let analysis = engine
        .simulate(&plan, &policy, family_size)
        .with_context(|| format!("Failed to simulate {}", policy.name))?;

    if json {
        return print_json(&analysis);
    }

    print_analysis(&analysis);
    if monthly {
        print_ledger(&analysis);
    }
    println!();
    Ok(())
}

fn print_analysis(analysis: &PolicyCostAnalysis) {
    let a = &analysis.annual;
    let m = &analysis.metrics;

    println!();
    println!(
        "🏥 {} (household of {})",
        analysis.policy_name, analysis.family_size
    );
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Premiums:            {:>14}  ({}/mo)", money(a.premiums), money(m.monthly_premium));
    println!("   Medical out of pocket:    {:>9}", money(a.medical_out_of_pocket));
    println!("   Medication out of pocket: {:>9}", money(a.medication_out_of_pocket));
    println!("   Total cost:          {:>14}", money(a.total_costs));
    println!("   Covered by insurance:{:>14}", money(a.covered_by_insurance));
    println!();

    match m.deductible_met_month {
        Some(month) => println!(
            "   ✅ Deductible ({}) met in {}",
            money(m.applicable_deductible),
            month_name(month)
        ),
        None => println!(
            "   Deductible ({}) not met this year",
            money(m.applicable_deductible)
        ),
    }
    if a.oop_max_reached {
        println!(
            "   ⚠️  Out-of-pocket max ({}) reached",
            money(m.applicable_out_of_pocket_max)
        );
    }
    println!("   Effective premium:   {}", money(m.effective_premium));
    println!("   Risk protection:     {}", m.risk_protection);

    let s = &analysis.scenarios;
    println!();
    println!("   Scenarios:");
    for scenario in [&s.best_case, &s.likely_case, &s.worst_case] {
        println!(
            "   {:<12} {:>14}  {}",
            scenario.label,
            money(scenario.total_cost),
            scenario.description
        );
    }
}

fn print_ledger(analysis: &PolicyCostAnalysis) {
    println!();
    println!("   Month-by-month:");
    for month in &analysis.monthly {
        println!(
            "   {:<10} premium {:>10}  care {:>10}  meds {:>10}  OOP to date {:>11}",
            month_name(month.month),
            money(month.premium),
            money(month.medical_member_cost),
            money(month.medication_member_cost),
            money(month.running.out_of_pocket)
        );
        for charge in &month.services {
            println!(
                "      {:<30} {:>11}  you pay {:>10}",
                truncate(&charge.name, 30),
                money(charge.cost),
                money(charge.member_cost)
            );
        }
    }
}

pub fn cmd_compare(
    reference: Option<&Path>,
    args: &PlanArgs,
    policy_paths: &[PathBuf],
    family_size: Option<usize>,
    prices: Option<&Path>,
    json: bool,
) -> Result<()> {
    let reference = load_reference(reference)?;
    let (plan, member_count) = build_plan(reference.clone(), args)?;
    let family_size = resolve_family_size(family_size, member_count)?;
    let policies = load_policies(policy_paths)?;

    let mut comparator = PolicyComparator::new(reference);
    if let Some(prices) = load_prices(prices)? {
        comparator = comparator.with_prices(prices);
    }
    let comparison = comparator
        .compare(&plan, &policies, family_size)
        .context("Failed to compare policies")?;

    if json {
        return print_json(&comparison);
    }

    println!();
    println!(
        "⚖️  Comparing {} policies for a household of {}",
        policies.len(),
        family_size
    );
    println!("   ─────────────────────────────────────────────────────────────");
    println!(
        "   {:<4} {:<28} {:>12} {:>12} {:>12} {:>12}",
        "#", "Policy", "Best", "Likely", "Worst", "Saves"
    );
    for ranking in &comparison.rankings {
        let Some(analysis) = comparison
            .analyses
            .iter()
            .find(|a| a.policy_id == ranking.policy_id)
        else {
            continue;
        };
        println!(
            "   {:<4} {:<28} {:>12} {:>12} {:>12} {:>12}",
            ranking.rank,
            truncate(&analysis.policy_name, 28),
            money(analysis.scenarios.best_case.total_cost),
            money(analysis.annual.total_costs),
            money(analysis.scenarios.worst_case.total_cost),
            money(ranking.savings_vs_most_expensive)
        );
    }

    let r = &comparison.recommendation;
    println!();
    println!("   🏆 Best value:           {}", r.best_value.policy_name);
    println!("   🌱 Best for healthy year: {}", r.best_for_healthy_year.policy_name);
    println!("   🚑 Best for major event:  {}", r.best_for_major_event.policy_name);
    println!();
    println!("   {}", r.summary);
    println!();
    Ok(())
}
