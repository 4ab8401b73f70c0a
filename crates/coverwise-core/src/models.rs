//! Domain models for Coverwise
//!
//! Member profiles are the engine's input; treatment plans are derived from
//! them and handed to the cost simulation.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Annual frequency ceiling for a single plan line
pub const MAX_ANNUAL_FREQUENCY: u32 = 365;
/// Ceiling for a single service or monthly medication cost
pub const MAX_UNIT_COST: f64 = 50_000.0;
/// Ceiling for the annual cost of a single treatment line
pub const MAX_ANNUAL_LINE_COST: f64 = 200_000.0;

/// Normalize a free-text name into a lookup key ("Type 2 Diabetes" -> "type_2_diabetes")
pub fn normalize_key(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Unit cost after applying the per-unit and per-line caps
pub fn capped_unit_cost(unit_cost: f64, frequency: u32) -> f64 {
    let unit = unit_cost.clamp(0.0, MAX_UNIT_COST);
    if frequency == 0 {
        return unit;
    }
    unit.min(MAX_ANNUAL_LINE_COST / frequency as f64)
}

/// Annual cost of a line (frequency x unit cost) with caps applied
pub fn annual_line_cost(unit_cost: f64, frequency: u32) -> f64 {
    let frequency = frequency.min(MAX_ANNUAL_FREQUENCY);
    capped_unit_cost(unit_cost, frequency) * frequency as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
        }
    }
}

impl std::str::FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "male" | "m" => Ok(Self::Male),
            "female" | "f" => Ok(Self::Female),
            "other" | "x" => Ok(Self::Other),
            _ => Err(format!("Unknown gender: {}", s)),
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Alcohol consumption level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlcoholUse {
    #[default]
    None,
    Moderate,
    Heavy,
}

/// Exercise level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseLevel {
    Sedentary,
    Light,
    #[default]
    Moderate,
    Active,
}

/// Lifestyle flags that feed risk scoring and utilization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Lifestyle {
    pub smoking: bool,
    pub alcohol: AlcoholUse,
    pub exercise: ExerciseLevel,
}

/// Pregnancy risk level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PregnancyRisk {
    Normal,
    High,
}

/// A user-declared service outside the condition tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomService {
    pub name: String,
    pub annual_frequency: u32,
    #[serde(default)]
    pub unit_cost: Option<f64>,
}

/// A household member's health profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub age: u32,
    pub gender: Gender,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub medications: Vec<String>,
    #[serde(default)]
    pub lifestyle: Lifestyle,
    #[serde(default)]
    pub bmi: Option<f64>,
    #[serde(default)]
    pub pregnancy: Option<PregnancyRisk>,
    #[serde(default)]
    pub other_services: Vec<CustomService>,
}

impl Member {
    pub fn new(age: u32, gender: Gender) -> Self {
        Self {
            age,
            gender,
            conditions: Vec::new(),
            medications: Vec::new(),
            lifestyle: Lifestyle::default(),
            bmi: None,
            pregnancy: None,
            other_services: Vec::new(),
        }
    }

    pub fn with_conditions<I, S>(mut self, conditions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conditions = conditions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_medications<I, S>(mut self, medications: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.medications = medications.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_lifestyle(mut self, lifestyle: Lifestyle) -> Self {
        self.lifestyle = lifestyle;
        self
    }

    pub fn with_bmi(mut self, bmi: f64) -> Self {
        self.bmi = Some(bmi);
        self
    }

    pub fn with_pregnancy(mut self, risk: PregnancyRisk) -> Self {
        self.pregnancy = Some(risk);
        self
    }

    pub fn with_service(mut self, service: CustomService) -> Self {
        self.other_services.push(service);
        self
    }

    /// Conditions worth modeling (skips blanks and "none"-style placeholders)
    pub fn active_conditions(&self) -> impl Iterator<Item = &str> {
        self.conditions
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .filter(|c| !matches!(c.to_lowercase().as_str(), "none" | "n/a" | "na" | "no"))
    }

    /// Medications with blank entries removed
    pub fn active_medications(&self) -> impl Iterator<Item = &str> {
        self.medications
            .iter()
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
    }

    /// Reject inputs that would silently miscompute
    pub fn validate(&self) -> Result<()> {
        if let Some(bmi) = self.bmi {
            if !bmi.is_finite() || bmi < 0.0 {
                return Err(Error::InvalidData(format!("BMI must be non-negative, got {}", bmi)));
            }
        }
        for service in &self.other_services {
            if let Some(cost) = service.unit_cost {
                if !cost.is_finite() || cost < 0.0 {
                    return Err(Error::InvalidData(format!(
                        "Service '{}' has negative unit cost {}",
                        service.name, cost
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Service categories used by cost-sharing rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreatmentCategory {
    OfficeVisit,
    SpecialistVisit,
    UrgentCare,
    Emergency,
    Inpatient,
    Diagnostic,
    Imaging,
    Procedure,
    Therapy,
    Preventive,
    Maternity,
    Dental,
    Vision,
    HomeHealth,
    Equipment,
    Other,
}

impl TreatmentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OfficeVisit => "office_visit",
            Self::SpecialistVisit => "specialist_visit",
            Self::UrgentCare => "urgent_care",
            Self::Emergency => "emergency",
            Self::Inpatient => "inpatient",
            Self::Diagnostic => "diagnostic",
            Self::Imaging => "imaging",
            Self::Procedure => "procedure",
            Self::Therapy => "therapy",
            Self::Preventive => "preventive",
            Self::Maternity => "maternity",
            Self::Dental => "dental",
            Self::Vision => "vision",
            Self::HomeHealth => "home_health",
            Self::Equipment => "equipment",
            Self::Other => "other",
        }
    }

    pub fn all() -> &'static [TreatmentCategory] {
        &[
            Self::OfficeVisit,
            Self::SpecialistVisit,
            Self::UrgentCare,
            Self::Emergency,
            Self::Inpatient,
            Self::Diagnostic,
            Self::Imaging,
            Self::Procedure,
            Self::Therapy,
            Self::Preventive,
            Self::Maternity,
            Self::Dental,
            Self::Vision,
            Self::HomeHealth,
            Self::Equipment,
            Self::Other,
        ]
    }

    /// Whether a visit in this category counts toward predicted visit totals
    pub fn is_visit(&self) -> bool {
        !matches!(self, Self::Equipment | Self::Other)
    }
}

impl std::str::FromStr for TreatmentCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let key = normalize_key(s);
        Self::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == key)
            .ok_or_else(|| format!("Unknown treatment category: {}", s))
    }
}

impl std::fmt::Display for TreatmentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Assessed severity of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mild => "mild",
            Self::Moderate => "moderate",
            Self::Severe => "severe",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Overall health risk level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One line of predicted care
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentItem {
    pub name: String,
    pub category: TreatmentCategory,
    pub annual_frequency: u32,
    /// Explicit unit cost; None falls back to the category default
    pub unit_cost: Option<f64>,
    pub is_preventive: bool,
    pub requires_specialist: bool,
    /// Condition that triggered this line, if any
    pub condition: Option<String>,
    pub reason: String,
    pub severity: Option<Severity>,
    /// Household member this line belongs to
    pub member_index: usize,
    /// Likelihood already folded into `unit_cost` for expected-value lines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
}

impl TreatmentItem {
    pub fn new(name: impl Into<String>, category: TreatmentCategory, annual_frequency: u32) -> Self {
        Self {
            name: name.into(),
            category,
            annual_frequency: annual_frequency.min(MAX_ANNUAL_FREQUENCY),
            unit_cost: None,
            is_preventive: category == TreatmentCategory::Preventive,
            requires_specialist: category == TreatmentCategory::SpecialistVisit,
            condition: None,
            reason: String::new(),
            severity: None,
            member_index: 0,
            probability: None,
        }
    }

    pub fn with_unit_cost(mut self, cost: f64) -> Self {
        self.unit_cost = Some(cost);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn preventive(mut self, is_preventive: bool) -> Self {
        self.is_preventive = is_preventive;
        self
    }

    pub fn for_member(mut self, member_index: usize) -> Self {
        self.member_index = member_index;
        self
    }

    /// Frequency with the annual ceiling applied
    pub fn frequency(&self) -> u32 {
        self.annual_frequency.min(MAX_ANNUAL_FREQUENCY)
    }
}

/// How a drug is marketed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrugClassification {
    Generic,
    Brand,
    Specialty,
}

/// Formulary tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrugTier {
    Generic,
    PreferredBrand,
    NonPreferredBrand,
    Specialty,
}

impl DrugTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::PreferredBrand => "preferred_brand",
            Self::NonPreferredBrand => "non_preferred_brand",
            Self::Specialty => "specialty",
        }
    }

    pub fn classification(&self) -> DrugClassification {
        match self {
            Self::Generic => DrugClassification::Generic,
            Self::PreferredBrand | Self::NonPreferredBrand => DrugClassification::Brand,
            Self::Specialty => DrugClassification::Specialty,
        }
    }
}

impl std::fmt::Display for DrugTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlternativeKind {
    /// Generic version of the same drug class
    Generic,
    /// Different drug with a similar therapeutic effect
    Therapeutic,
}

/// A cheaper substitute for a medication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationAlternative {
    pub name: String,
    pub kind: AlternativeKind,
    pub monthly_cost: f64,
    pub monthly_savings: f64,
}

/// One medication in a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationItem {
    pub name: String,
    pub classification: DrugClassification,
    pub tier: DrugTier,
    pub monthly_cost: f64,
    pub condition: Option<String>,
    pub reason: String,
    pub alternatives: Vec<MedicationAlternative>,
    pub member_index: usize,
}

impl MedicationItem {
    pub fn annual_cost(&self) -> f64 {
        self.monthly_cost.clamp(0.0, MAX_UNIT_COST) * 12.0
    }
}

/// Potential savings from switching a medication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsOpportunity {
    pub medication: String,
    pub alternative: String,
    pub monthly_savings: f64,
    pub annual_savings: f64,
    pub member_index: usize,
}

/// Severity assessed for one of a member's conditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionSeverity {
    pub condition: String,
    pub severity: Severity,
    pub score: u32,
    pub member_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlanTotals {
    pub treatment_cost: f64,
    pub medication_cost: f64,
    pub preventive_cost: f64,
    pub total_cost: f64,
    pub total_annual_visits: u32,
}

impl PlanTotals {
    fn add(&mut self, other: &PlanTotals) {
        self.treatment_cost += other.treatment_cost;
        self.medication_cost += other.medication_cost;
        self.preventive_cost += other.preventive_cost;
        self.total_cost += other.total_cost;
        self.total_annual_visits += other.total_annual_visits;
    }
}

/// Predicted care for one member-year (or a combined household-year)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TreatmentPlan {
    pub treatments: Vec<TreatmentItem>,
    pub medications: Vec<MedicationItem>,
    pub preventive_care: Vec<TreatmentItem>,
    pub condition_severities: Vec<ConditionSeverity>,
    pub savings_opportunities: Vec<SavingsOpportunity>,
    pub notes: Vec<String>,
    pub totals: PlanTotals,
    pub has_chronic_conditions: bool,
    pub requires_specialist_care: bool,
    pub emergency_risk_level: RiskLevel,
    pub member_count: usize,
}

impl TreatmentPlan {
    /// All service lines (treatments then preventive care)
    pub fn services(&self) -> impl Iterator<Item = &TreatmentItem> {
        self.treatments.iter().chain(self.preventive_care.iter())
    }

    /// Merge per-member plans into one household plan
    ///
    /// Items keep the member index they were generated with.
    pub fn combine(plans: impl IntoIterator<Item = TreatmentPlan>) -> TreatmentPlan {
        let mut combined = TreatmentPlan::default();
        for plan in plans {
            combined.treatments.extend(plan.treatments);
            combined.medications.extend(plan.medications);
            combined.preventive_care.extend(plan.preventive_care);
            combined.condition_severities.extend(plan.condition_severities);
            combined.savings_opportunities.extend(plan.savings_opportunities);
            combined.notes.extend(plan.notes);
            combined.totals.add(&plan.totals);
            combined.has_chronic_conditions |= plan.has_chronic_conditions;
            combined.requires_specialist_care |= plan.requires_specialist_care;
            combined.emergency_risk_level = combined.emergency_risk_level.max(plan.emergency_risk_level);
            combined.member_count += plan.member_count;
        }
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("  Type 2 Diabetes "), "type_2_diabetes");
        assert_eq!(normalize_key("high-cholesterol"), "high_cholesterol");
        assert_eq!(normalize_key("COPD"), "copd");
    }

    #[test]
    fn test_category_round_trip_names() {
        assert_eq!(
            TreatmentCategory::from_str("Specialist Visit").unwrap(),
            TreatmentCategory::SpecialistVisit
        );
        assert!(TreatmentCategory::from_str("spa day").is_err());
    }

    #[test]
    fn test_line_cost_caps() {
        assert_eq!(annual_line_cost(150.0, 4), 600.0);
        assert_eq!(annual_line_cost(80_000.0, 1), MAX_UNIT_COST);
        assert_eq!(annual_line_cost(50_000.0, 10), MAX_ANNUAL_LINE_COST);
        assert_eq!(annual_line_cost(1.0, 1_000), 365.0);
    }

    #[test]
    fn test_active_conditions_skip_placeholders() {
        let member = Member::new(40, Gender::Female).with_conditions(["Asthma", " ", "None", "n/a"]);
        let active: Vec<_> = member.active_conditions().collect();
        assert_eq!(active, vec!["Asthma"]);
    }

    #[test]
    fn test_member_validation_rejects_negative_cost() {
        let member = Member::new(30, Gender::Male).with_service(CustomService {
            name: "Massage".to_string(),
            annual_frequency: 4,
            unit_cost: Some(-10.0),
        });
        assert!(member.validate().is_err());

        let member = Member::new(30, Gender::Male).with_bmi(-1.0);
        assert!(member.validate().is_err());
    }

    #[test]
    fn test_combine_keeps_member_indexes() {
        let mut a = TreatmentPlan {
            member_count: 1,
            ..Default::default()
        };
        a.treatments
            .push(TreatmentItem::new("Checkup", TreatmentCategory::OfficeVisit, 1));
        a.totals.total_cost = 100.0;
        let mut b = TreatmentPlan {
            member_count: 1,
            emergency_risk_level: RiskLevel::High,
            has_chronic_conditions: true,
            ..Default::default()
        };
        b.treatments.push(
            TreatmentItem::new("Therapy", TreatmentCategory::Therapy, 12).for_member(1),
        );
        b.totals.total_cost = 50.0;

        let combined = TreatmentPlan::combine([a, b]);
        assert_eq!(combined.member_count, 2);
        assert_eq!(combined.treatments.len(), 2);
        assert_eq!(combined.treatments[1].member_index, 1);
        assert_eq!(combined.totals.total_cost, 150.0);
        assert!(combined.has_chronic_conditions);
        assert_eq!(combined.emergency_risk_level, RiskLevel::High);
    }
}
