//! Integration tests for coverwise-core
//!
//! These tests exercise the full member → plan → simulate → compare workflow.

use std::io::Write;
use std::sync::Arc;

use coverwise_core::{
    models::{CustomService, Lifestyle, MAX_UNIT_COST},
    CategoryRule, ComplicationModel, CostSimulationEngine, DrugTier, Gender, InsurancePolicy,
    MedicationCostCalculator, MedicationDescriptor, Member, PlanConfig, PolicyComparator,
    PregnancyRisk, PriceOverrides, ReferenceData, RiskLevel, RiskScorer, TreatmentCategory,
    TreatmentItem, TreatmentPlan, TreatmentPlanGenerator, UtilizationPredictor,
};

const REFERENCE_TOML: &str = include_str!("../../../config/reference.toml");

fn reference() -> Arc<ReferenceData> {
    Arc::new(ReferenceData::embedded().expect("embedded reference data"))
}

/// Three policies spanning the usual metal-tier tradeoffs
fn policies() -> Vec<InsurancePolicy> {
    vec![
        InsurancePolicy::new("bronze", "Bronze HDHP", 3600.0, 6000.0, 8500.0, 0.4),
        InsurancePolicy::new("silver", "Silver PPO", 5400.0, 1500.0, 6000.0, 0.2)
            .with_category_rule(TreatmentCategory::OfficeVisit, CategoryRule::copay(30.0))
            .with_drug_tier(DrugTier::Generic, CategoryRule::copay(10.0).waiving_deductible()),
        InsurancePolicy::new("gold", "Gold HMO", 7800.0, 500.0, 3500.0, 0.1)
            .with_category_rule(TreatmentCategory::OfficeVisit, CategoryRule::copay(20.0).waiving_deductible())
            .with_category_rule(TreatmentCategory::SpecialistVisit, CategoryRule::copay(40.0).waiving_deductible()),
    ]
}

fn diabetic_adult() -> Member {
    Member::new(52, Gender::Male)
        .with_conditions(["Type 2 Diabetes", "hypertension"])
        .with_medications(["Metformin 500mg", "Lisinopril 10mg"])
        .with_bmi(31.0)
}

// =============================================================================
// Workflow Tests
// =============================================================================

#[test]
fn test_member_to_comparison_workflow() {
    let reference = reference();
    let generator = TreatmentPlanGenerator::new(reference.clone()).expect("generator");
    let plan = generator.generate(&diabetic_adult(), 0).expect("plan");

    assert!(plan.has_chronic_conditions);
    assert!(!plan.medications.is_empty());
    assert!(!plan.preventive_care.is_empty());
    assert!(plan.totals.total_cost > 0.0);

    let comparison = PolicyComparator::new(reference.clone())
        .compare(&plan, &policies(), 1)
        .expect("comparison");

    assert_eq!(comparison.analyses.len(), 3);
    let ids: Vec<&str> = comparison.analyses.iter().map(|a| a.policy_id.as_str()).collect();
    assert_eq!(ids, vec!["bronze", "silver", "gold"]);
    assert_eq!(comparison.rankings.len(), 3);
    assert_eq!(comparison.reference_fingerprint, reference.fingerprint());

    for analysis in &comparison.analyses {
        let oop_max = analysis.metrics.applicable_out_of_pocket_max;
        assert!(analysis.annual.total_out_of_pocket <= oop_max + 1e-6);
        assert!(
            (analysis.annual.total_costs - analysis.annual.premiums - analysis.annual.total_out_of_pocket).abs()
                < 1e-6
        );
        assert!(analysis.scenarios.worst_case.total_cost >= analysis.annual.total_costs - 1e-6);
    }
}

#[test]
fn test_simple_office_visit_year() {
    let plan = TreatmentPlan {
        treatments: vec![TreatmentItem::new("Office visit", TreatmentCategory::OfficeVisit, 4).with_unit_cost(150.0)],
        member_count: 1,
        ..Default::default()
    };
    let policy = InsurancePolicy::new("basic", "Basic", 4800.0, 1500.0, 6000.0, 0.2);
    let analysis = CostSimulationEngine::new(reference()).simulate(&plan, &policy, 1).unwrap();

    assert!((analysis.annual.medical_out_of_pocket - 600.0).abs() < 1e-6);
    assert!(!analysis.annual.deductible_met);
    assert!((analysis.monthly.last().unwrap().running.out_of_pocket - 600.0).abs() < 1e-6);
    assert_eq!(analysis.annual.premiums, 4800.0);
}

#[test]
fn test_household_comparison_uses_family_limits() {
    let reference = reference();
    let members = vec![
        diabetic_adult(),
        Member::new(49, Gender::Female).with_pregnancy(PregnancyRisk::Normal),
        Member::new(8, Gender::Male).with_conditions(["asthma"]),
    ];
    let generator = TreatmentPlanGenerator::new(reference.clone()).unwrap();
    let plan = generator.generate_household(&members).unwrap();
    assert_eq!(plan.member_count, 3);
    assert!(plan.services().any(|s| s.member_index == 2));

    let comparison = PolicyComparator::new(reference).compare(&plan, &policies(), 3).unwrap();
    for (analysis, policy) in comparison.analyses.iter().zip(policies()) {
        assert_eq!(analysis.family_size, 3);
        assert_eq!(analysis.metrics.applicable_deductible, policy.deductible.family);
        assert_eq!(analysis.annual.premiums, policy.premium.family);
    }
}

#[test]
fn test_premium_only_difference_picks_cheaper() {
    let plan = TreatmentPlanGenerator::new(reference())
        .unwrap()
        .generate(&diabetic_adult(), 0)
        .unwrap();
    let policies = vec![
        InsurancePolicy::new("pricey", "Pricey", 6000.0, 1500.0, 6000.0, 0.2),
        InsurancePolicy::new("cheap", "Cheap", 4500.0, 1500.0, 6000.0, 0.2),
    ];
    let comparison = PolicyComparator::new(reference()).compare(&plan, &policies, 1).unwrap();
    assert_eq!(comparison.recommendation.best_value.policy_id, "cheap");
    assert_eq!(comparison.recommendation.best_for_healthy_year.policy_id, "cheap");
    assert_eq!(comparison.recommendation.best_for_major_event.policy_id, "cheap");
}

// =============================================================================
// Determinism Tests
// =============================================================================

#[test]
fn test_results_are_byte_identical_across_runs() {
    let run = || {
        let reference = reference();
        let plan = TreatmentPlanGenerator::new(reference.clone())
            .unwrap()
            .generate(&diabetic_adult(), 0)
            .unwrap();
        let comparison = PolicyComparator::new(reference).compare(&plan, &policies(), 1).unwrap();
        (
            serde_json::to_string(&plan).unwrap(),
            serde_json::to_string(&comparison).unwrap(),
        )
    };
    assert_eq!(run(), run());
}

#[test]
fn test_seeded_complications_reproducible() {
    let config = PlanConfig {
        complication_model: ComplicationModel::Seeded(42),
        ..Default::default()
    };
    let generate = || {
        TreatmentPlanGenerator::with_config(reference(), config.clone())
            .unwrap()
            .generate(&diabetic_adult(), 0)
            .unwrap()
    };
    assert_eq!(generate(), generate());
}

// =============================================================================
// Reference Data Tests
// =============================================================================

#[test]
fn test_reference_override_changes_fingerprint() {
    let custom = REFERENCE_TOML.replacen("version = \"2025.1\"", "version = \"2026.test\"", 1);
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(custom.as_bytes()).unwrap();

    let loaded = ReferenceData::load(Some(file.path())).unwrap();
    let embedded = ReferenceData::embedded().unwrap();
    assert_eq!(loaded.version, "2026.test");
    assert_ne!(loaded.fingerprint(), embedded.fingerprint());

    let plan = TreatmentPlan::default();
    let policy = InsurancePolicy::new("p", "Policy", 3600.0, 1000.0, 5000.0, 0.2);
    let analysis = CostSimulationEngine::new(Arc::new(loaded)).simulate(&plan, &policy, 1).unwrap();
    assert_eq!(analysis.reference_version, "2026.test");
}

#[test]
fn test_missing_reference_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    assert!(ReferenceData::load(Some(missing.as_path())).is_err());
}

// =============================================================================
// Component Tests
// =============================================================================

#[test]
fn test_lipitor_alternatives() {
    let calculator = MedicationCostCalculator::new(reference());
    let estimate = calculator.estimate(&MedicationDescriptor::new("Lipitor"));

    assert!(!estimate.alternatives.is_empty());
    assert!(estimate.alternatives.len() <= 3);
    assert!(estimate.alternatives.iter().any(|a| a.name == "Atorvastatin"));
    assert!(estimate
        .alternatives
        .windows(2)
        .all(|w| w[0].monthly_savings >= w[1].monthly_savings));
    assert!(estimate.alternatives.iter().all(|a| a.monthly_savings > 0.0));
}

#[test]
fn test_risk_and_utilization_agree_on_direction() {
    let reference = reference();
    let healthy = Member::new(30, Gender::Female);
    let sick = Member::new(70, Gender::Male)
        .with_conditions(["COPD", "heart disease", "diabetes"])
        .with_lifestyle(Lifestyle {
            smoking: true,
            ..Default::default()
        });

    let scorer = RiskScorer::new(reference.clone());
    let healthy_risk = scorer.assess(&healthy);
    let sick_risk = scorer.assess(&sick);
    assert!(sick_risk.score > healthy_risk.score);
    assert!(sick_risk.level >= RiskLevel::High);
    assert!(sick_risk.score <= 100);

    let predictor = UtilizationPredictor::new(reference);
    let healthy_use = predictor.predict(&healthy);
    let sick_use = predictor.predict(&sick);
    assert!(sick_use.total_visits > healthy_use.total_visits);
    assert!(sick_use.emergency_risk > healthy_use.emergency_risk);
    assert!(sick_use.emergency_risk <= 1.0);
}

#[test]
fn test_price_overrides_flow_into_simulation() {
    let member = Member::new(40, Gender::Female).with_service(CustomService {
        name: "Physical therapy session".to_string(),
        annual_frequency: 10,
        unit_cost: None,
    });
    let plan = TreatmentPlanGenerator::with_config(
        reference(),
        PlanConfig {
            include_preventive: false,
            ..Default::default()
        },
    )
    .unwrap()
    .generate(&member, 0)
    .unwrap();
    assert_eq!(plan.treatments[0].category, TreatmentCategory::Therapy);

    let csv = "service,member,price\nPhysical therapy session,0,90\n";
    let overrides = PriceOverrides::from_csv_reader(csv.as_bytes()).unwrap();
    let policy = InsurancePolicy::new("p", "Policy", 3600.0, 5000.0, 8000.0, 0.2);

    let analysis = CostSimulationEngine::new(reference())
        .with_prices(Arc::new(overrides))
        .simulate(&plan, &policy, 1)
        .unwrap();
    assert!((analysis.annual.gross_cost - 900.0).abs() < 1e-6);
    assert!((analysis.annual.total_out_of_pocket - 900.0).abs() < 1e-6);
}

#[test]
fn test_price_override_keeps_complication_likelihood() {
    let member = Member::new(40, Gender::Female).with_conditions(["asthma"]);
    let plan = TreatmentPlanGenerator::new(reference())
        .unwrap()
        .generate(&member, 0)
        .unwrap();

    let csv = "service,member,price\nEmergency room visit,,3000\n";
    let overrides = PriceOverrides::from_csv_reader(csv.as_bytes()).unwrap();
    let policy = InsurancePolicy::new("p", "Policy", 3600.0, 5000.0, 8000.0, 0.2);
    let analysis = CostSimulationEngine::new(reference())
        .with_prices(Arc::new(overrides))
        .simulate(&plan, &policy, 1)
        .unwrap();

    let er: Vec<_> = analysis
        .monthly
        .iter()
        .flat_map(|m| &m.services)
        .filter(|c| c.category == TreatmentCategory::Emergency)
        .collect();
    assert_eq!(er.len(), 1);
    // 15% exacerbation risk doubled for planning
    assert!((er[0].cost - 3000.0 * 0.30).abs() < 1e-6);
}

#[test]
fn test_unit_cost_caps_applied() {
    let plan = TreatmentPlan {
        treatments: vec![TreatmentItem::new("Transplant", TreatmentCategory::Inpatient, 1).with_unit_cost(900_000.0)],
        member_count: 1,
        ..Default::default()
    };
    let policy = InsurancePolicy::new("p", "Policy", 3600.0, 1000.0, 5000.0, 0.2);
    let analysis = CostSimulationEngine::new(reference()).simulate(&plan, &policy, 1).unwrap();
    assert_eq!(analysis.monthly[0].services[0].cost, MAX_UNIT_COST);
}
