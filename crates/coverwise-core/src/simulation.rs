//! Month-by-month cost simulation
//!
//! Runs one treatment plan against one policy for a calendar year. Each
//! month charges the premium, then every service occurrence and medication
//! fill in order, applying deductible, copay/coinsurance, and the
//! out-of-pocket max. Running totals are threaded through an immutable
//! [`SimulationState`] so each step is a pure function of the last.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{capped_unit_cost, DrugTier, TreatmentCategory, TreatmentItem, TreatmentPlan, MAX_UNIT_COST};
use crate::policy::{CategoryRule, CostShare, InsurancePolicy};
use crate::pricing::{resolve_unit_price, PriceSource};
use crate::reference::ReferenceData;

const MONTHS: u32 = 12;

/// Tolerance for "limit reached" comparisons
const EPSILON: f64 = 1e-9;

/// Scenario assumptions
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    /// Share of simulated medication spending kept in the best case
    pub best_case_medication_share: f64,
    /// Share of the out-of-pocket max attributed to medical care in the worst case
    pub worst_case_medical_share: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            best_case_medication_share: 0.30,
            worst_case_medical_share: 0.80,
        }
    }
}

/// Simulation configuration
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub scenarios: ScenarioConfig,
    /// OOP max at or below which protection is high
    pub high_protection_max: f64,
    /// OOP max at or above which protection is low
    pub low_protection_min: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            scenarios: ScenarioConfig::default(),
            high_protection_max: 3000.0,
            low_protection_min: 8000.0,
        }
    }
}

/// Running totals between charges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    /// Amount applied to the (individual or family) deductible
    pub deductible: f64,
    pub out_of_pocket: f64,
    pub premiums_paid: f64,
    /// Amount each member has applied toward their own deductible
    pub member_deductibles: Vec<f64>,
}

impl SimulationState {
    fn new(member_count: usize) -> Self {
        Self {
            deductible: 0.0,
            out_of_pocket: 0.0,
            premiums_paid: 0.0,
            member_deductibles: vec![0.0; member_count],
        }
    }

    fn after_charge(&self, member_index: usize, split: &Split) -> Self {
        let mut next = self.clone();
        next.deductible += split.applied_to_deductible;
        next.out_of_pocket += split.member_cost;
        if let Some(member) = next.member_deductibles.get_mut(member_index) {
            *member += split.applied_to_deductible;
        }
        next
    }

    fn after_premium(&self, premiums_paid: f64) -> Self {
        Self {
            premiums_paid,
            ..self.clone()
        }
    }
}

/// Limits that apply for this household
#[derive(Debug, Clone, Copy)]
struct Limits {
    deductible: f64,
    out_of_pocket_max: f64,
    /// Per-member deductible for embedded family plans
    member_deductible: Option<f64>,
    coinsurance: f64,
}

impl Limits {
    fn remaining_deductible(&self, state: &SimulationState, member_index: usize) -> f64 {
        let family = (self.deductible - state.deductible).max(0.0);
        match self.member_deductible {
            Some(individual) => {
                let applied = state.member_deductibles.get(member_index).copied().unwrap_or(0.0);
                family.min((individual - applied).max(0.0))
            }
            None => family,
        }
    }

    fn oop_room(&self, state: &SimulationState) -> f64 {
        (self.out_of_pocket_max - state.out_of_pocket).max(0.0)
    }
}

/// How one charge divides between member and insurer
#[derive(Debug, Clone, Copy, PartialEq)]
struct Split {
    member_cost: f64,
    applied_to_deductible: f64,
}

impl Split {
    const FREE: Split = Split {
        member_cost: 0.0,
        applied_to_deductible: 0.0,
    };
}

/// One service occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCharge {
    pub name: String,
    pub category: TreatmentCategory,
    pub member_index: usize,
    pub cost: f64,
    pub covered_amount: f64,
    pub member_cost: f64,
    pub applied_to_deductible: f64,
}

/// One monthly medication fill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationCharge {
    pub name: String,
    pub tier: DrugTier,
    pub member_index: usize,
    pub cost: f64,
    pub covered_amount: f64,
    pub member_cost: f64,
    pub applied_to_deductible: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningTotals {
    pub deductible_applied: f64,
    pub deductible_met: bool,
    pub out_of_pocket: f64,
    pub premiums_paid: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyExpense {
    /// 1-12
    pub month: u32,
    pub premium: f64,
    pub services: Vec<ServiceCharge>,
    pub medications: Vec<MedicationCharge>,
    pub medical_member_cost: f64,
    pub medication_member_cost: f64,
    pub running: RunningTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualTotals {
    pub premiums: f64,
    pub medical_out_of_pocket: f64,
    pub medication_out_of_pocket: f64,
    pub total_out_of_pocket: f64,
    /// Premiums plus out-of-pocket
    pub total_costs: f64,
    /// Allowed cost of all care before insurance
    pub gross_cost: f64,
    pub covered_by_insurance: f64,
    pub deductible_met: bool,
    pub oop_max_reached: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub label: String,
    pub premiums: f64,
    pub medical_costs: f64,
    pub medication_costs: f64,
    pub total_cost: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenarios {
    pub best_case: Scenario,
    pub likely_case: Scenario,
    pub worst_case: Scenario,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskProtection {
    High,
    Medium,
    Low,
}

impl RiskProtection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for RiskProtection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyMetrics {
    /// First month (1-12) the deductible was fully met
    pub deductible_met_month: Option<u32>,
    /// Premiums less the tax-advantaged contribution, floored at 0
    pub effective_premium: f64,
    pub risk_protection: RiskProtection,
    pub monthly_premium: f64,
    pub applicable_deductible: f64,
    pub applicable_out_of_pocket_max: f64,
}

/// Full result of simulating one policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyCostAnalysis {
    pub policy_id: String,
    pub policy_name: String,
    pub family_size: usize,
    pub annual: AnnualTotals,
    pub monthly: Vec<MonthlyExpense>,
    pub scenarios: Scenarios,
    pub metrics: KeyMetrics,
    pub reference_version: String,
    pub reference_fingerprint: String,
}

pub struct CostSimulationEngine {
    reference: Arc<ReferenceData>,
    config: SimulationConfig,
    prices: Option<Arc<dyn PriceSource>>,
}

impl CostSimulationEngine {
    pub fn new(reference: Arc<ReferenceData>) -> Self {
        Self::with_config(reference, SimulationConfig::default())
    }

    pub fn with_config(reference: Arc<ReferenceData>, config: SimulationConfig) -> Self {
        Self {
            reference,
            config,
            prices: None,
        }
    }

    /// Use external prices ahead of plan unit costs
    pub fn with_prices(mut self, prices: Arc<dyn PriceSource>) -> Self {
        self.prices = Some(prices);
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Simulate a year of care under one policy
    pub fn simulate(
        &self,
        plan: &TreatmentPlan,
        policy: &InsurancePolicy,
        family_size: usize,
    ) -> Result<PolicyCostAnalysis> {
        if family_size == 0 {
            return Err(Error::InvalidData("Family size must be at least 1".into()));
        }
        policy.validate()?;
        validate_plan(plan)?;

        let limits = Limits {
            deductible: policy.applicable_deductible(family_size),
            out_of_pocket_max: policy.applicable_out_of_pocket_max(family_size),
            member_deductible: (family_size > 1 && policy.deductible.embedded)
                .then_some(policy.deductible.individual),
            coinsurance: policy.coinsurance,
        };
        let monthly_premium = policy.monthly_premium(family_size);

        let services: Vec<&TreatmentItem> = plan.services().collect();
        let prices = self.prices.as_deref();
        let unit_costs: Vec<f64> = services
            .iter()
            .map(|item| {
                capped_unit_cost(resolve_unit_price(item, &self.reference, prices), item.frequency())
            })
            .collect();
        let schedule = occurrence_schedule(&services);

        let member_count = services
            .iter()
            .map(|s| s.member_index)
            .chain(plan.medications.iter().map(|m| m.member_index))
            .max()
            .map_or(family_size, |max| (max + 1).max(family_size));

        let (state, monthly) = (0..MONTHS).fold(
            (SimulationState::new(member_count), Vec::with_capacity(MONTHS as usize)),
            |(state, mut monthly), month| {
                let state = state.after_premium(monthly_premium * (month + 1) as f64);

                let (state, service_charges) = schedule[month as usize].iter().fold(
                    (state, Vec::new()),
                    |(state, mut charges), &index| {
                        let item = services[index];
                        let cost = unit_costs[index];
                        let split = if item.is_preventive {
                            Split::FREE
                        } else {
                            split_charge(&state, &limits, policy.category_rule(item.category), cost, item.member_index)
                        };
                        charges.push(ServiceCharge {
                            name: item.name.clone(),
                            category: item.category,
                            member_index: item.member_index,
                            cost,
                            covered_amount: cost - split.member_cost,
                            member_cost: split.member_cost,
                            applied_to_deductible: split.applied_to_deductible,
                        });
                        (state.after_charge(item.member_index, &split), charges)
                    },
                );

                let (state, medication_charges) = plan.medications.iter().fold(
                    (state, Vec::new()),
                    |(state, mut charges), med| {
                        let cost = med.monthly_cost.clamp(0.0, MAX_UNIT_COST);
                        let split = split_charge(&state, &limits, policy.drug_rule(med.tier), cost, med.member_index);
                        charges.push(MedicationCharge {
                            name: med.name.clone(),
                            tier: med.tier,
                            member_index: med.member_index,
                            cost,
                            covered_amount: cost - split.member_cost,
                            member_cost: split.member_cost,
                            applied_to_deductible: split.applied_to_deductible,
                        });
                        (state.after_charge(med.member_index, &split), charges)
                    },
                );

                monthly.push(MonthlyExpense {
                    month: month + 1,
                    premium: monthly_premium,
                    medical_member_cost: service_charges.iter().map(|c| c.member_cost).sum(),
                    medication_member_cost: medication_charges.iter().map(|c| c.member_cost).sum(),
                    services: service_charges,
                    medications: medication_charges,
                    running: RunningTotals {
                        deductible_applied: state.deductible,
                        deductible_met: state.deductible >= limits.deductible - EPSILON,
                        out_of_pocket: state.out_of_pocket,
                        premiums_paid: state.premiums_paid,
                    },
                });
                (state, monthly)
            },
        );

        let annual = annual_totals(&monthly, &state, &limits);
        let scenarios = self.scenarios(&annual, &limits);
        let metrics = KeyMetrics {
            deductible_met_month: monthly
                .iter()
                .find(|m| m.running.deductible_met)
                .map(|m| m.month),
            effective_premium: (annual.premiums - policy.tax_advantaged_contribution).max(0.0),
            risk_protection: self.risk_protection(limits.out_of_pocket_max),
            monthly_premium,
            applicable_deductible: limits.deductible,
            applicable_out_of_pocket_max: limits.out_of_pocket_max,
        };

        debug!(
            "Policy {}: deductible met {:?}, OOP ${:.2} of ${:.2}",
            policy.id, metrics.deductible_met_month, annual.total_out_of_pocket, limits.out_of_pocket_max
        );
        info!(
            "Simulated {} for household of {}: ${:.2} total",
            policy.name, family_size, annual.total_costs
        );

        Ok(PolicyCostAnalysis {
            policy_id: policy.id.clone(),
            policy_name: policy.name.clone(),
            family_size,
            annual,
            monthly,
            scenarios,
            metrics,
            reference_version: self.reference.version.clone(),
            reference_fingerprint: self.reference.fingerprint().to_string(),
        })
    }

    fn scenarios(&self, annual: &AnnualTotals, limits: &Limits) -> Scenarios {
        let cfg = &self.config.scenarios;
        let best_medication = annual.medication_out_of_pocket * cfg.best_case_medication_share;
        let worst_medical = limits.out_of_pocket_max * cfg.worst_case_medical_share;
        let worst_medication = limits.out_of_pocket_max - worst_medical;

        Scenarios {
            best_case: Scenario {
                label: "best_case".to_string(),
                premiums: annual.premiums,
                medical_costs: 0.0,
                medication_costs: best_medication,
                total_cost: annual.premiums + best_medication,
                description: "Healthy year: no medical claims and reduced medication use".to_string(),
            },
            likely_case: Scenario {
                label: "likely_case".to_string(),
                premiums: annual.premiums,
                medical_costs: annual.medical_out_of_pocket,
                medication_costs: annual.medication_out_of_pocket,
                total_cost: annual.total_costs,
                description: "Predicted care as simulated month by month".to_string(),
            },
            worst_case: Scenario {
                label: "worst_case".to_string(),
                premiums: annual.premiums,
                medical_costs: worst_medical,
                medication_costs: worst_medication,
                total_cost: annual.premiums + limits.out_of_pocket_max,
                description: "Major medical event: out-of-pocket max reached".to_string(),
            },
        }
    }

    fn risk_protection(&self, out_of_pocket_max: f64) -> RiskProtection {
        if out_of_pocket_max <= self.config.high_protection_max {
            RiskProtection::High
        } else if out_of_pocket_max >= self.config.low_protection_min {
            RiskProtection::Low
        } else {
            RiskProtection::Medium
        }
    }
}

/// Split one charge between member and insurer
fn split_charge(
    state: &SimulationState,
    limits: &Limits,
    rule: Option<&CategoryRule>,
    cost: f64,
    member_index: usize,
) -> Split {
    let room = limits.oop_room(state);
    if room <= EPSILON || cost <= 0.0 {
        return Split::FREE;
    }

    let remaining = limits.remaining_deductible(state, member_index);
    let deductible_met = remaining <= EPSILON;

    let (member_cost, applied) = match rule {
        Some(CategoryRule {
            share: CostShare::Copay(copay),
            waive_deductible,
        }) if deductible_met || *waive_deductible => ((*copay).min(cost), 0.0),
        _ => {
            let rate = match rule.map(|r| r.share) {
                Some(CostShare::Coinsurance(rate)) => rate,
                _ => limits.coinsurance,
            };
            let to_deductible = cost.min(remaining);
            (to_deductible + (cost - to_deductible) * rate, to_deductible)
        }
    };

    let member_cost = member_cost.min(room);
    Split {
        member_cost,
        applied_to_deductible: applied.min(member_cost),
    }
}

/// Service indexes per month; an item with frequency f lands in months floor(i*12/f)
fn occurrence_schedule(services: &[&TreatmentItem]) -> Vec<Vec<usize>> {
    let mut schedule = vec![Vec::new(); MONTHS as usize];
    for (index, item) in services.iter().enumerate() {
        let frequency = item.frequency();
        for i in 0..frequency {
            let month = (i * MONTHS / frequency) as usize;
            schedule[month].push(index);
        }
    }
    schedule
}

fn annual_totals(monthly: &[MonthlyExpense], state: &SimulationState, limits: &Limits) -> AnnualTotals {
    let medical: f64 = monthly.iter().map(|m| m.medical_member_cost).sum();
    let medication: f64 = monthly.iter().map(|m| m.medication_member_cost).sum();
    let gross: f64 = monthly
        .iter()
        .map(|m| {
            m.services.iter().map(|s| s.cost).sum::<f64>()
                + m.medications.iter().map(|c| c.cost).sum::<f64>()
        })
        .sum();
    let total_out_of_pocket = medical + medication;

    AnnualTotals {
        premiums: state.premiums_paid,
        medical_out_of_pocket: medical,
        medication_out_of_pocket: medication,
        total_out_of_pocket,
        total_costs: state.premiums_paid + total_out_of_pocket,
        gross_cost: gross,
        covered_by_insurance: gross - total_out_of_pocket,
        deductible_met: state.deductible >= limits.deductible - EPSILON,
        oop_max_reached: state.out_of_pocket >= limits.out_of_pocket_max - EPSILON,
    }
}

fn validate_plan(plan: &TreatmentPlan) -> Result<()> {
    for item in plan.services() {
        if let Some(cost) = item.unit_cost {
            if !cost.is_finite() || cost < 0.0 {
                return Err(Error::InvalidData(format!(
                    "Service '{}' has negative unit cost {}",
                    item.name, cost
                )));
            }
        }
    }
    for med in &plan.medications {
        if !med.monthly_cost.is_finite() || med.monthly_cost < 0.0 {
            return Err(Error::InvalidData(format!(
                "Medication '{}' has negative monthly cost {}",
                med.name, med.monthly_cost
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DrugClassification, MedicationItem};
    use proptest::prelude::*;

    fn engine() -> CostSimulationEngine {
        CostSimulationEngine::new(Arc::new(ReferenceData::embedded().unwrap()))
    }

    fn silver() -> InsurancePolicy {
        InsurancePolicy::new("silver", "Silver PPO", 4800.0, 1500.0, 6000.0, 0.2)
    }

    fn plan_with(items: Vec<TreatmentItem>) -> TreatmentPlan {
        TreatmentPlan {
            treatments: items,
            member_count: 1,
            ..Default::default()
        }
    }

    fn medication(name: &str, tier: DrugTier, monthly_cost: f64) -> MedicationItem {
        MedicationItem {
            name: name.to_string(),
            classification: tier.classification(),
            tier,
            monthly_cost,
            condition: None,
            reason: String::new(),
            alternatives: Vec::new(),
            member_index: 0,
        }
    }

    #[test]
    fn test_office_visits_below_deductible() {
        let plan = plan_with(vec![
            TreatmentItem::new("Office visit", TreatmentCategory::OfficeVisit, 4).with_unit_cost(150.0),
        ]);
        let analysis = engine().simulate(&plan, &silver(), 1).unwrap();

        assert!((analysis.annual.medical_out_of_pocket - 600.0).abs() < 1e-6);
        assert!((analysis.annual.total_out_of_pocket - 600.0).abs() < 1e-6);
        assert!(!analysis.annual.deductible_met);
        assert_eq!(analysis.metrics.deductible_met_month, None);
        assert!((analysis.monthly[11].running.deductible_applied - 600.0).abs() < 1e-6);

        let visit_months: Vec<u32> = analysis
            .monthly
            .iter()
            .filter(|m| !m.services.is_empty())
            .map(|m| m.month)
            .collect();
        assert_eq!(visit_months, vec![1, 4, 7, 10]);
    }

    #[test]
    fn test_premiums_charged_every_month() {
        let analysis = engine().simulate(&TreatmentPlan::default(), &silver(), 1).unwrap();
        assert_eq!(analysis.monthly.len(), 12);
        assert!(analysis.monthly.iter().all(|m| m.premium == 400.0));
        assert_eq!(analysis.annual.premiums, 4800.0);
        assert_eq!(analysis.annual.total_costs, 4800.0);
        assert_eq!(analysis.scenarios.best_case.total_cost, 4800.0);
        assert_eq!(analysis.scenarios.worst_case.total_cost, 10_800.0);
    }

    #[test]
    fn test_coinsurance_after_deductible() {
        let plan = plan_with(vec![
            TreatmentItem::new("Imaging", TreatmentCategory::Imaging, 1).with_unit_cost(2500.0),
        ]);
        let analysis = engine().simulate(&plan, &silver(), 1).unwrap();
        // 1500 deductible + 20% of 1000
        assert!((analysis.annual.medical_out_of_pocket - 1700.0).abs() < 1e-6);
        assert!(analysis.annual.deductible_met);
        assert_eq!(analysis.metrics.deductible_met_month, Some(1));
    }

    #[test]
    fn test_copay_only_after_deductible_unless_waived() {
        let policy = silver().with_category_rule(TreatmentCategory::OfficeVisit, CategoryRule::copay(30.0));
        let plan = plan_with(vec![
            TreatmentItem::new("Office visit", TreatmentCategory::OfficeVisit, 1).with_unit_cost(150.0),
        ]);
        let analysis = engine().simulate(&plan, &policy, 1).unwrap();
        assert!((analysis.annual.medical_out_of_pocket - 150.0).abs() < 1e-6);

        let waived = silver().with_category_rule(
            TreatmentCategory::OfficeVisit,
            CategoryRule::copay(30.0).waiving_deductible(),
        );
        let analysis = engine().simulate(&plan, &waived, 1).unwrap();
        assert!((analysis.annual.medical_out_of_pocket - 30.0).abs() < 1e-6);
        assert_eq!(analysis.monthly[0].services[0].applied_to_deductible, 0.0);
    }

    #[test]
    fn test_preventive_care_is_free() {
        let mut plan = plan_with(Vec::new());
        plan.preventive_care.push(
            TreatmentItem::new("Annual physical", TreatmentCategory::Preventive, 1).with_unit_cost(220.0),
        );
        let analysis = engine().simulate(&plan, &silver(), 1).unwrap();
        assert_eq!(analysis.annual.total_out_of_pocket, 0.0);
        assert_eq!(analysis.monthly[0].services[0].covered_amount, 220.0);
    }

    #[test]
    fn test_out_of_pocket_max_caps_member_cost() {
        let plan = plan_with(vec![
            TreatmentItem::new("Hospital stay", TreatmentCategory::Inpatient, 2).with_unit_cost(40_000.0),
        ]);
        let analysis = engine().simulate(&plan, &silver(), 1).unwrap();
        assert!((analysis.annual.total_out_of_pocket - 6000.0).abs() < 1e-6);
        assert!(analysis.annual.oop_max_reached);
        let second = &analysis.monthly[6].services[0];
        assert_eq!(second.member_cost, 0.0);
        assert_eq!(second.covered_amount, 40_000.0);
    }

    #[test]
    fn test_drug_tier_copay() {
        let policy = silver().with_drug_tier(DrugTier::Generic, CategoryRule::copay(10.0).waiving_deductible());
        let mut plan = plan_with(Vec::new());
        plan.medications.push(medication("Lisinopril", DrugTier::Generic, 6.0));
        plan.medications.push(medication("Lipitor", DrugTier::NonPreferredBrand, 320.0));
        let analysis = engine().simulate(&plan, &policy, 1).unwrap();

        // Generic copay capped at the drug cost
        assert_eq!(analysis.monthly[0].medications[0].member_cost, 6.0);
        // Brand goes to the deductible until it is met
        assert_eq!(analysis.monthly[0].medications[1].applied_to_deductible, 320.0);
        assert_eq!(
            analysis.monthly[0].medications[1].tier.classification(),
            DrugClassification::Brand
        );
    }

    #[test]
    fn test_embedded_family_deductible() {
        let policy = silver();
        let plan = TreatmentPlan {
            treatments: vec![
                TreatmentItem::new("Surgery", TreatmentCategory::Procedure, 1)
                    .with_unit_cost(2000.0)
                    .for_member(0),
                TreatmentItem::new("Surgery", TreatmentCategory::Procedure, 1)
                    .with_unit_cost(2000.0)
                    .for_member(1),
            ],
            member_count: 2,
            ..Default::default()
        };
        let analysis = engine().simulate(&plan, &policy, 2).unwrap();
        let charges = &analysis.monthly[0].services;
        // Each member stops at the 1500 individual deductible, then 20%
        assert!((charges[0].member_cost - 1600.0).abs() < 1e-6);
        assert!((charges[1].member_cost - 1600.0).abs() < 1e-6);
        assert!(analysis.annual.deductible_met);

        let mut aggregate = policy.clone();
        aggregate.deductible.embedded = false;
        let analysis = engine().simulate(&plan, &aggregate, 2).unwrap();
        let charges = &analysis.monthly[0].services;
        assert!((charges[0].member_cost - 2000.0).abs() < 1e-6);
        // 1000 left on the family deductible, then 20% of 1000
        assert!((charges[1].member_cost - 1200.0).abs() < 1e-6);
    }

    #[test]
    fn test_effective_premium_and_protection() {
        let mut policy = silver();
        policy.tax_advantaged_contribution = 1000.0;
        let analysis = engine().simulate(&TreatmentPlan::default(), &policy, 1).unwrap();
        assert_eq!(analysis.metrics.effective_premium, 3800.0);
        assert_eq!(analysis.metrics.risk_protection, RiskProtection::Medium);

        policy.tax_advantaged_contribution = 10_000.0;
        let analysis = engine().simulate(&TreatmentPlan::default(), &policy, 1).unwrap();
        assert_eq!(analysis.metrics.effective_premium, 0.0);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let plan = TreatmentPlan::default();
        assert!(engine().simulate(&plan, &silver(), 0).is_err());

        let bad_plan = plan_with(vec![
            TreatmentItem::new("Visit", TreatmentCategory::OfficeVisit, 1).with_unit_cost(-5.0),
        ]);
        assert!(engine().simulate(&bad_plan, &silver(), 1).is_err());

        let mut bad_policy = silver();
        bad_policy.deductible.individual = 9000.0;
        assert!(engine().simulate(&plan, &bad_policy, 1).is_err());
    }

    #[test]
    fn test_occurrence_schedule() {
        let items = [
            TreatmentItem::new("a", TreatmentCategory::Therapy, 24),
            TreatmentItem::new("b", TreatmentCategory::Other, 0),
        ];
        let refs: Vec<&TreatmentItem> = items.iter().collect();
        let schedule = occurrence_schedule(&refs);
        assert!(schedule.iter().all(|m| m.len() == 2));
    }

    #[test]
    fn test_reference_fingerprint_recorded() {
        let analysis = engine().simulate(&TreatmentPlan::default(), &silver(), 1).unwrap();
        assert_eq!(analysis.reference_fingerprint.len(), 64);
        assert!(!analysis.reference_version.is_empty());
    }

    fn category_strategy() -> impl Strategy<Value = TreatmentCategory> {
        prop::sample::select(TreatmentCategory::all().to_vec())
    }

    fn item_strategy() -> impl Strategy<Value = TreatmentItem> {
        (category_strategy(), 0u32..30, 0.0..5000.0f64, 0usize..3).prop_map(|(category, freq, cost, member)| {
            TreatmentItem::new("Service", category, freq)
                .with_unit_cost(cost)
                .for_member(member)
        })
    }

    fn tier_strategy() -> impl Strategy<Value = DrugTier> {
        prop::sample::select(vec![
            DrugTier::Generic,
            DrugTier::PreferredBrand,
            DrugTier::NonPreferredBrand,
            DrugTier::Specialty,
        ])
    }

    fn medication_strategy() -> impl Strategy<Value = MedicationItem> {
        (tier_strategy(), 0.0..3000.0f64, 0usize..3).prop_map(|(tier, cost, member)| MedicationItem {
            member_index: member,
            ..medication("Drug", tier, cost)
        })
    }

    fn drug_rule_strategy() -> impl Strategy<Value = (DrugTier, CategoryRule)> {
        (tier_strategy(), 0.0..150.0f64, any::<bool>()).prop_map(|(tier, copay, waive)| {
            let rule = CategoryRule::copay(copay);
            (tier, if waive { rule.waiving_deductible() } else { rule })
        })
    }

    proptest! {
        #[test]
        fn prop_ledger_invariants(
            items in proptest::collection::vec(item_strategy(), 0..12),
            medications in proptest::collection::vec(medication_strategy(), 0..4),
            deductible in 0.0..5000.0f64,
            extra_oop in 0.0..8000.0f64,
            coinsurance in 0.0..1.0f64,
            copay in prop::option::of(0.0..100.0f64),
            drug_rule in prop::option::of(drug_rule_strategy()),
            family_size in 1usize..4,
        ) {
            let mut policy = InsurancePolicy::new("p", "Policy", 3600.0, deductible, deductible + extra_oop, coinsurance);
            if let Some(copay) = copay {
                policy = policy.with_category_rule(TreatmentCategory::OfficeVisit, CategoryRule::copay(copay));
            }
            if let Some((tier, rule)) = drug_rule {
                policy = policy.with_drug_tier(tier, rule);
            }
            let mut plan = plan_with(items);
            plan.medications = medications;
            let analysis = engine().simulate(&plan, &policy, family_size).unwrap();
            let deductible_limit = policy.applicable_deductible(family_size);
            let oop_limit = policy.applicable_out_of_pocket_max(family_size);

            let mut last_deductible = 0.0;
            let mut last_oop = 0.0;
            let mut oop_reached = false;
            for month in &analysis.monthly {
                for charge in &month.services {
                    prop_assert!((charge.member_cost + charge.covered_amount - charge.cost).abs() < 1e-6);
                    prop_assert!(charge.member_cost >= 0.0);
                    prop_assert!(charge.applied_to_deductible <= charge.member_cost + 1e-9);
                    if oop_reached {
                        prop_assert_eq!(charge.member_cost, 0.0);
                    }
                }
                prop_assert_eq!(month.medications.len(), plan.medications.len());
                for fill in &month.medications {
                    prop_assert!((fill.member_cost + fill.covered_amount - fill.cost).abs() < 1e-6);
                    prop_assert!(fill.member_cost >= 0.0);
                    prop_assert!(fill.applied_to_deductible <= fill.member_cost + 1e-9);
                    if oop_reached {
                        prop_assert_eq!(fill.member_cost, 0.0);
                    }
                }
                prop_assert!(month.running.deductible_applied >= last_deductible);
                prop_assert!(month.running.deductible_applied <= deductible_limit + 1e-6);
                prop_assert!(month.running.out_of_pocket >= last_oop);
                prop_assert!(month.running.out_of_pocket <= oop_limit + 1e-6);
                last_deductible = month.running.deductible_applied;
                last_oop = month.running.out_of_pocket;
                oop_reached = month.running.out_of_pocket >= oop_limit - 1e-9;
            }

            let monthly_premium = policy.monthly_premium(family_size);
            prop_assert!((analysis.annual.premiums - 12.0 * monthly_premium).abs() < 1e-6);
        }
    }
}
