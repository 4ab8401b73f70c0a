//! Side-by-side policy comparison
//!
//! Simulates every candidate policy against the same plan (in parallel) and
//! picks the cheapest for the likely year, a healthy year, and a major event.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::models::{RiskLevel, TreatmentPlan};
use crate::policy::InsurancePolicy;
use crate::pricing::PriceSource;
use crate::reference::ReferenceData;
use crate::simulation::{CostSimulationEngine, PolicyCostAnalysis, SimulationConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedPolicy {
    pub policy_id: String,
    pub policy_name: String,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Lowest likely-case total
    pub best_value: RecommendedPolicy,
    /// Lowest best-case total
    pub best_for_healthy_year: RecommendedPolicy,
    /// Lowest worst-case total
    pub best_for_major_event: RecommendedPolicy,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRanking {
    pub policy_id: String,
    /// 1 is cheapest
    pub rank: usize,
    pub total_costs: f64,
    pub savings_vs_most_expensive: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyComparison {
    /// One analysis per policy, in input order
    pub analyses: Vec<PolicyCostAnalysis>,
    pub rankings: Vec<PolicyRanking>,
    pub recommendation: Recommendation,
    pub reference_fingerprint: String,
}

pub struct PolicyComparator {
    engine: CostSimulationEngine,
}

impl PolicyComparator {
    pub fn new(reference: Arc<ReferenceData>) -> Self {
        Self {
            engine: CostSimulationEngine::new(reference),
        }
    }

    pub fn with_config(reference: Arc<ReferenceData>, config: SimulationConfig) -> Self {
        Self {
            engine: CostSimulationEngine::with_config(reference, config),
        }
    }

    pub fn with_prices(mut self, prices: Arc<dyn PriceSource>) -> Self {
        self.engine = self.engine.with_prices(prices);
        self
    }

    /// Simulate each policy and recommend among them
    pub fn compare(
        &self,
        plan: &TreatmentPlan,
        policies: &[InsurancePolicy],
        family_size: usize,
    ) -> Result<PolicyComparison> {
        if policies.is_empty() {
            return Err(Error::InvalidData("No policies to compare".into()));
        }
        let mut seen = BTreeSet::new();
        if let Some(dup) = policies.iter().find(|p| !seen.insert(p.id.as_str())) {
            return Err(Error::InvalidData(format!("Duplicate policy id '{}'", dup.id)));
        }

        let analyses = policies
            .par_iter()
            .map(|policy| self.engine.simulate(plan, policy, family_size))
            .collect::<Result<Vec<_>>>()?;

        let rankings = rank(&analyses);
        let recommendation = recommend(&analyses, plan);
        info!(
            "Compared {} policies; best value: {}",
            analyses.len(),
            recommendation.best_value.policy_name
        );

        let reference_fingerprint = analyses
            .first()
            .map(|a| a.reference_fingerprint.clone())
            .unwrap_or_default();

        Ok(PolicyComparison {
            analyses,
            rankings,
            recommendation,
            reference_fingerprint,
        })
    }
}

fn cheapest(analyses: &[PolicyCostAnalysis], total: impl Fn(&PolicyCostAnalysis) -> f64) -> RecommendedPolicy {
    // min_by keeps the first of equal elements, so ties go to input order
    let best = analyses
        .iter()
        .min_by(|a, b| total(a).partial_cmp(&total(b)).unwrap_or(Ordering::Equal));
    match best {
        Some(a) => RecommendedPolicy {
            policy_id: a.policy_id.clone(),
            policy_name: a.policy_name.clone(),
            total_cost: total(a),
        },
        None => RecommendedPolicy {
            policy_id: String::new(),
            policy_name: String::new(),
            total_cost: 0.0,
        },
    }
}

fn most_expensive(analyses: &[PolicyCostAnalysis]) -> Option<&PolicyCostAnalysis> {
    analyses.iter().fold(None, |max: Option<&PolicyCostAnalysis>, a| match max {
        Some(m) if m.annual.total_costs >= a.annual.total_costs => Some(m),
        _ => Some(a),
    })
}

fn rank(analyses: &[PolicyCostAnalysis]) -> Vec<PolicyRanking> {
    let ceiling = most_expensive(analyses).map_or(0.0, |a| a.annual.total_costs);
    let mut order: Vec<&PolicyCostAnalysis> = analyses.iter().collect();
    order.sort_by(|a, b| {
        a.annual
            .total_costs
            .partial_cmp(&b.annual.total_costs)
            .unwrap_or(Ordering::Equal)
    });
    order
        .into_iter()
        .enumerate()
        .map(|(i, a)| PolicyRanking {
            policy_id: a.policy_id.clone(),
            rank: i + 1,
            total_costs: a.annual.total_costs,
            savings_vs_most_expensive: ceiling - a.annual.total_costs,
        })
        .collect()
}

fn recommend(analyses: &[PolicyCostAnalysis], plan: &TreatmentPlan) -> Recommendation {
    let best_value = cheapest(analyses, |a| a.annual.total_costs);
    let best_for_healthy_year = cheapest(analyses, |a| a.scenarios.best_case.total_cost);
    let best_for_major_event = cheapest(analyses, |a| a.scenarios.worst_case.total_cost);

    let mut summary = match most_expensive(analyses) {
        Some(top) if analyses.len() > 1 && top.policy_id != best_value.policy_id => format!(
            "{} is expected to cost ${:.0} for the year, ${:.0} less than {}.",
            best_value.policy_name,
            best_value.total_cost,
            top.annual.total_costs - best_value.total_cost,
            top.policy_name
        ),
        _ if analyses.len() > 1 => format!(
            "All policies are expected to cost about ${:.0} for the year.",
            best_value.total_cost
        ),
        _ => format!(
            "{} is expected to cost ${:.0} for the year.",
            best_value.policy_name, best_value.total_cost
        ),
    };

    if plan.has_chronic_conditions {
        summary.push_str(" Ongoing care for chronic conditions makes the likely case the best guide.");
    }
    if plan.emergency_risk_level >= RiskLevel::High {
        summary.push_str(&format!(
            " Emergency risk is elevated; {} limits the damage of a major event.",
            best_for_major_event.policy_name
        ));
    }

    Recommendation {
        best_value,
        best_for_healthy_year,
        best_for_major_event,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TreatmentCategory, TreatmentItem};

    fn comparator() -> PolicyComparator {
        PolicyComparator::new(Arc::new(ReferenceData::embedded().unwrap()))
    }

    fn plan() -> TreatmentPlan {
        TreatmentPlan {
            treatments: vec![
                TreatmentItem::new("Office visit", TreatmentCategory::OfficeVisit, 4).with_unit_cost(150.0),
                TreatmentItem::new("MRI", TreatmentCategory::Imaging, 1).with_unit_cost(1200.0),
            ],
            member_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_policy_list_rejected() {
        assert!(comparator().compare(&plan(), &[], 1).is_err());
    }

    #[test]
    fn test_cheaper_premium_wins() {
        let policies = vec![
            InsurancePolicy::new("gold", "Gold", 7200.0, 1000.0, 4000.0, 0.2),
            InsurancePolicy::new("silver", "Silver", 4800.0, 1000.0, 4000.0, 0.2),
        ];
        let result = comparator().compare(&plan(), &policies, 1).unwrap();

        assert_eq!(result.analyses[0].policy_id, "gold");
        assert_eq!(result.recommendation.best_value.policy_id, "silver");
        assert_eq!(result.rankings[0].policy_id, "silver");
        assert_eq!(result.rankings[0].rank, 1);
        assert!((result.rankings[0].savings_vs_most_expensive - 2400.0).abs() < 1e-6);
        assert_eq!(result.rankings[1].savings_vs_most_expensive, 0.0);
        assert!(result.recommendation.summary.contains("$2400 less than Gold"));
    }

    #[test]
    fn test_ties_go_to_first_policy() {
        let policies = vec![
            InsurancePolicy::new("a", "Plan A", 4800.0, 1000.0, 4000.0, 0.2),
            InsurancePolicy::new("b", "Plan B", 4800.0, 1000.0, 4000.0, 0.2),
        ];
        let result = comparator().compare(&plan(), &policies, 1).unwrap();
        assert_eq!(result.recommendation.best_value.policy_id, "a");
        assert_eq!(result.recommendation.best_for_major_event.policy_id, "a");
        assert!(result.recommendation.summary.starts_with("All policies"));
    }

    #[test]
    fn test_scenario_recommendations_can_differ() {
        let policies = vec![
            // Cheap premium, high exposure
            InsurancePolicy::new("bronze", "Bronze", 3000.0, 6000.0, 9000.0, 0.4),
            // Expensive premium, low exposure
            InsurancePolicy::new("platinum", "Platinum", 9000.0, 250.0, 1500.0, 0.1),
        ];
        let result = comparator().compare(&plan(), &policies, 1).unwrap();
        assert_eq!(result.recommendation.best_for_healthy_year.policy_id, "bronze");
        assert_eq!(result.recommendation.best_for_major_event.policy_id, "platinum");
    }

    #[test]
    fn test_caveats_added() {
        let mut plan = plan();
        plan.has_chronic_conditions = true;
        plan.emergency_risk_level = RiskLevel::High;
        let policies = vec![InsurancePolicy::new("only", "Only Plan", 4800.0, 1000.0, 4000.0, 0.2)];
        let result = comparator().compare(&plan, &policies, 1).unwrap();
        assert!(result.recommendation.summary.contains("chronic"));
        assert!(result.recommendation.summary.contains("Emergency risk"));
    }

    #[test]
    fn test_duplicate_policy_ids_rejected() {
        let policies = vec![
            InsurancePolicy::new("plan", "Cheap", 3000.0, 1000.0, 4000.0, 0.2),
            InsurancePolicy::new("plan", "Pricey", 9000.0, 1000.0, 4000.0, 0.2),
        ];
        let err = comparator().compare(&plan(), &policies, 1).unwrap_err();
        assert!(err.to_string().contains("Duplicate policy id 'plan'"));
    }

    #[test]
    fn test_invalid_policy_fails_comparison() {
        let mut bad = InsurancePolicy::new("bad", "Bad", 4800.0, 1000.0, 4000.0, 0.2);
        bad.coinsurance = 1.5;
        let policies = vec![InsurancePolicy::new("ok", "Ok", 4800.0, 1000.0, 4000.0, 0.2), bad];
        assert!(comparator().compare(&plan(), &policies, 1).is_err());
    }
}
