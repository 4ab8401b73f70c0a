//! Treatment plan and medication pricing commands

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use coverwise_core::models::annual_line_cost;
use coverwise_core::{
    resolve_unit_price, MedicationCostCalculator, MedicationDescriptor, ReferenceData,
    TreatmentItem, TreatmentPlan, TreatmentPlanGenerator,
};

use super::{load_members, load_reference, money, plan_config, print_json, truncate};
use crate::cli::PlanArgs;

/// Generate the household plan described by the command-line flags
///
/// Returns the plan and the number of member profiles loaded.
pub fn build_plan(reference: Arc<ReferenceData>, args: &PlanArgs) -> Result<(TreatmentPlan, usize)> {
    let members = load_members(&args.members)?;
    let generator = TreatmentPlanGenerator::with_config(reference, plan_config(args))
        .context("Failed to build treatment plan generator")?;
    let plan = generator
        .generate_household(&members)
        .context("Failed to generate treatment plan")?;
    Ok((plan, members.len()))
}

pub fn cmd_plan(reference: Option<&Path>, args: &PlanArgs, json: bool) -> Result<()> {
    let reference = load_reference(reference)?;
    let (plan, member_count) = build_plan(reference.clone(), args)?;

    if json {
        return print_json(&plan);
    }

    println!();
    println!(
        "📋 Annual Treatment Plan ({} member{})",
        member_count,
        if member_count == 1 { "" } else { "s" }
    );
    println!("   ─────────────────────────────────────────────────────────────");

    if !plan.condition_severities.is_empty() {
        println!();
        println!("   Conditions:");
        for c in &plan.condition_severities {
            println!(
                "   • {} - {} (score {}){}",
                c.condition,
                c.severity,
                c.score,
                member_suffix(member_count, c.member_index)
            );
        }
    }

    print_items("Treatments", &plan.treatments, &reference, member_count);
    print_items("Preventive care", &plan.preventive_care, &reference, member_count);

    if !plan.medications.is_empty() {
        println!();
        println!("   Medications:");
        for med in &plan.medications {
            println!(
                "   {:<32} {:<20} {:>12}/mo{}",
                truncate(&med.name, 32),
                med.tier.as_str(),
                money(med.monthly_cost),
                member_suffix(member_count, med.member_index)
            );
        }
    }

    if !plan.savings_opportunities.is_empty() {
        println!();
        println!("   💡 Savings opportunities:");
        for s in &plan.savings_opportunities {
            println!(
                "   • {} → {}: save {}/yr",
                s.medication,
                s.alternative,
                money(s.annual_savings)
            );
        }
    }

    for note in &plan.notes {
        println!();
        println!("   Note: {}", note);
    }

    let t = &plan.totals;
    println!();
    println!("   Treatments:   {:>14}", money(t.treatment_cost));
    println!("   Medications:  {:>14}", money(t.medication_cost));
    println!("   Preventive:   {:>14}", money(t.preventive_cost));
    println!("   Total:        {:>14}  ({} visits)", money(t.total_cost), t.total_annual_visits);
    println!("   Emergency risk: {}", plan.emergency_risk_level);
    println!();
    Ok(())
}

fn print_items(title: &str, items: &[TreatmentItem], reference: &ReferenceData, member_count: usize) {
    if items.is_empty() {
        return;
    }
    println!();
    println!("   {}:", title);
    for item in items {
        let unit = resolve_unit_price(item, reference, None);
        println!(
            "   {:<32} {:<18} x{:<4} {:>12}{}",
            truncate(&item.name, 32),
            item.category.as_str(),
            item.frequency(),
            money(annual_line_cost(unit, item.frequency())),
            member_suffix(member_count, item.member_index)
        );
    }
}

fn member_suffix(member_count: usize, member_index: usize) -> String {
    if member_count > 1 {
        format!("  [member {}]", member_index + 1)
    } else {
        String::new()
    }
}

pub fn cmd_medication(
    reference: Option<&Path>,
    name: &str,
    dosage: Option<&str>,
    class: Option<&str>,
    specialty: bool,
    json: bool,
) -> Result<()> {
    let reference = load_reference(reference)?;
    let calculator = MedicationCostCalculator::new(reference);

    let mut descriptor = MedicationDescriptor::new(name)
        .with_dosage(dosage.unwrap_or(name))
        .specialty(specialty);
    if let Some(class) = class {
        descriptor = descriptor.with_class(class);
    }
    let estimate = calculator.estimate(&descriptor);

    if json {
        return print_json(&estimate);
    }

    println!();
    println!("💊 {}", estimate.name);
    println!("   ─────────────────────────────────────────────────────────────");
    println!(
        "   Class:        {}",
        estimate.drug_class.as_deref().unwrap_or("unknown")
    );
    println!("   Tier:         {}", estimate.tier);
    println!("   Retail:       {}/mo", money(estimate.retail_monthly));
    println!("   Mail order:   {}/mo", money(estimate.mail_order_monthly));
    println!("   Annual:       {}", money(estimate.annual_cost));
    if (estimate.dosage_multiplier - 1.0).abs() > f64::EPSILON {
        println!("   Dosage:       x{:.2}", estimate.dosage_multiplier);
    }
    if estimate.requires_prior_auth {
        println!("   ⚠️  Likely requires prior authorization");
    }

    if !estimate.alternatives.is_empty() {
        println!();
        println!("   Alternatives:");
        for alt in &estimate.alternatives {
            println!(
                "   • {:<28} {:>10}/mo  (save {}/mo)",
                alt.name,
                money(alt.monthly_cost),
                money(alt.monthly_savings)
            );
        }
    }
    println!();
    Ok(())
}
