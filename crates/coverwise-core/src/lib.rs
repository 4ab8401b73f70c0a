//! Coverwise Core Library
//!
//! Health plan cost estimation for individuals and households:
//! - Member profiles, treatment plans, and insurance policy models
//! - Versioned reference data (conditions, drug costs, preventive schedule)
//! - Health risk scoring and utilization prediction
//! - Treatment plan generation with medication cost estimates
//! - Month-by-month cost simulation under a policy's cost-sharing rules
//! - Parallel multi-policy comparison and recommendation

pub mod classify;
pub mod compare;
pub mod error;
pub mod medication;
pub mod models;
pub mod policy;
pub mod pricing;
pub mod reference;
pub mod risk;
pub mod simulation;
pub mod treatment;
pub mod utilization;

pub use classify::{classify_or_fallback, KeywordClassifier, ServiceClassifier};
pub use compare::{PolicyComparator, PolicyComparison, PolicyRanking, Recommendation, RecommendedPolicy};
pub use error::{Error, Result};
pub use medication::{CostSource, MedicationCostCalculator, MedicationCostEstimate, MedicationDescriptor};
pub use models::{
    DrugClassification, DrugTier, Gender, Member, MedicationItem, PregnancyRisk, RiskLevel, Severity,
    TreatmentCategory, TreatmentItem, TreatmentPlan,
};
pub use policy::{CategoryRule, CostShare, Deductible, InsurancePolicy, TierAmount};
pub use pricing::{resolve_unit_price, PriceOverrides, PriceSource};
pub use reference::{default_reference_path, ReferenceData, DEFAULT_REFERENCE};
pub use risk::{RiskAssessment, RiskScorer, RiskWeights};
pub use simulation::{
    AnnualTotals, CostSimulationEngine, KeyMetrics, MonthlyExpense, PolicyCostAnalysis, RiskProtection,
    Scenario, SimulationConfig,
};
pub use treatment::{ComplicationModel, PlanConfig, TreatmentPlanGenerator};
pub use utilization::{UtilizationForecast, UtilizationPredictor};
