//! Per-member command implementations (predict, risk)

use std::path::Path;

use anyhow::Result;
use coverwise_core::{RiskScorer, UtilizationPredictor};

use super::{load_member, load_reference, print_json};

pub fn cmd_predict(reference: Option<&Path>, member_path: &Path, json: bool) -> Result<()> {
    let reference = load_reference(reference)?;
    let member = load_member(member_path)?;
    let forecast = UtilizationPredictor::new(reference).predict(&member);

    if json {
        return print_json(&forecast);
    }

    println!();
    println!("🩺 Predicted Utilization (age {}, {})", member.age, member.gender);
    println!("   ─────────────────────────────────────────────────────────────");
    for prediction in &forecast.predictions {
        println!(
            "   {:<20} {:>6.1}/yr  {}",
            prediction.service_type.as_str(),
            prediction.annual_frequency,
            prediction.reason
        );
    }
    println!();
    println!("   Total visits:    {:.1}", forecast.total_visits);
    println!("   Emergency risk:  {:.0}%", forecast.emergency_risk * 100.0);
    println!("   Cost category:   {}", forecast.cost_category);

    let c = &forecast.counts;
    println!();
    println!(
        "   PCP {}  Outpatient {}  ER {}  Inpatient {}  Home health {}  Rx fills {}  Dental {}  Equipment {}",
        c.pcp_visits,
        c.outpatient_visits,
        c.er_visits,
        c.inpatient_admits,
        c.home_health_visits,
        c.rx_fills,
        c.dental_visits,
        c.equipment_purchases
    );
    println!();
    Ok(())
}

pub fn cmd_risk(reference: Option<&Path>, member_path: &Path, json: bool) -> Result<()> {
    let reference = load_reference(reference)?;
    let member = load_member(member_path)?;
    let scorer = RiskScorer::new(reference);
    let assessment = scorer.assess(&member);

    if json {
        return print_json(&assessment);
    }

    let icon = match assessment.level {
        coverwise_core::RiskLevel::Low => "🟢",
        coverwise_core::RiskLevel::Moderate => "🟡",
        coverwise_core::RiskLevel::High => "🟠",
        coverwise_core::RiskLevel::Critical => "🔴",
    };

    println!();
    println!(
        "{} Health risk: {} ({}/100)",
        icon, assessment.level, assessment.score
    );
    println!("   ─────────────────────────────────────────────────────────────");
    if assessment.factors.is_empty() {
        println!("   No risk factors found");
    }
    for factor in &assessment.factors {
        println!("   +{:<3} {}", factor.points, factor.name);
    }
    println!();
    println!(
        "   Chronic conditions: {}   Comorbid pairs: {}   Emergency risk: {:.0}%",
        assessment.chronic_condition_count,
        assessment.comorbidity_count,
        scorer.emergency_risk(&member) * 100.0
    );

    if !assessment.recommendations.is_empty() {
        println!();
        println!("   Recommendations:");
        for rec in &assessment.recommendations {
            println!("   • {}", rec);
        }
    }
    println!();
    Ok(())
}
