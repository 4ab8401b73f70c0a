//! Treatment plan generation
//!
//! Builds a concrete annual care plan for one member: condition management
//! at an assessed severity, current and prescribed medications, possible
//! complications, preventive care, pregnancy care, and declared services.

use std::collections::BTreeSet;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classify::{classify_or_fallback, KeywordClassifier, ServiceClassifier};
use crate::error::Result;
use crate::medication::{MedicationCostCalculator, MedicationDescriptor};
use crate::models::{
    annual_line_cost, AlcoholUse, ConditionSeverity, ExerciseLevel, Member,
    MedicationItem, PlanTotals, PregnancyRisk, SavingsOpportunity, Severity, TreatmentItem,
    TreatmentPlan,
};
use crate::reference::{CareBundle, Complication, MedicationTemplate, ReferenceData, TreatmentTemplate};
use crate::risk::{emergency_level, RiskScorer};

/// How possible complications enter a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplicationModel {
    /// Include every complication, cost scaled by its likelihood
    #[default]
    ExpectedValue,
    /// Sample each complication with a seeded RNG
    Seeded(u64),
    /// Leave complications out
    None,
}

/// Condition severity scoring
#[derive(Debug, Clone)]
pub struct SeverityWeights {
    pub senior_age: u32,
    pub senior_points: u32,
    pub middle_age: u32,
    pub middle_age_points: u32,
    /// Points when the member has 3+ conditions
    pub many_conditions_points: u32,
    /// Points when the member has exactly 2 conditions
    pub two_conditions_points: u32,
    pub per_related_condition: u32,
    pub smoking: u32,
    pub heavy_alcohol: u32,
    pub sedentary: u32,
    pub obese: u32,
    pub severely_obese: u32,
    pub moderate_threshold: u32,
    pub severe_threshold: u32,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            senior_age: 65,
            senior_points: 2,
            middle_age: 45,
            middle_age_points: 1,
            many_conditions_points: 2,
            two_conditions_points: 1,
            per_related_condition: 1,
            smoking: 1,
            heavy_alcohol: 1,
            sedentary: 1,
            obese: 1,
            severely_obese: 2,
            moderate_threshold: 2,
            severe_threshold: 5,
        }
    }
}

/// Plan generation configuration
#[derive(Debug, Clone)]
pub struct PlanConfig {
    pub complication_model: ComplicationModel,
    /// Multiplier on complication probabilities (capped at 1)
    pub complication_planning_factor: f64,
    /// Fail on declared services no classifier rule matches
    pub strict_classification: bool,
    pub include_preventive: bool,
    pub severity: SeverityWeights,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            complication_model: ComplicationModel::ExpectedValue,
            complication_planning_factor: 2.0,
            strict_classification: false,
            include_preventive: true,
            severity: SeverityWeights::default(),
        }
    }
}

pub struct TreatmentPlanGenerator {
    reference: Arc<ReferenceData>,
    medications: MedicationCostCalculator,
    risk: RiskScorer,
    classifier: Box<dyn ServiceClassifier>,
    config: PlanConfig,
}

impl TreatmentPlanGenerator {
    pub fn new(reference: Arc<ReferenceData>) -> Result<Self> {
        Self::with_config(reference, PlanConfig::default())
    }

    pub fn with_config(reference: Arc<ReferenceData>, config: PlanConfig) -> Result<Self> {
        let classifier = KeywordClassifier::new(&reference.classifier)?;
        Ok(Self {
            medications: MedicationCostCalculator::new(reference.clone()),
            risk: RiskScorer::new(reference.clone()),
            classifier: Box::new(classifier),
            reference,
            config,
        })
    }

    /// Replace the service classifier
    pub fn with_classifier(mut self, classifier: Box<dyn ServiceClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &PlanConfig {
        &self.config
    }

    /// Assess severity of one of the member's conditions
    pub fn assess_severity(&self, member: &Member, condition: &str) -> (Severity, u32) {
        let w = &self.config.severity;
        let mut score = 0;

        if member.age >= w.senior_age {
            score += w.senior_points;
        } else if member.age >= w.middle_age {
            score += w.middle_age_points;
        }

        match member.active_conditions().count() {
            0 | 1 => {}
            2 => score += w.two_conditions_points,
            _ => score += w.many_conditions_points,
        }

        score += self.risk.related_present(member, condition) as u32 * w.per_related_condition;

        if member.lifestyle.smoking {
            score += w.smoking;
        }
        if member.lifestyle.alcohol == AlcoholUse::Heavy {
            score += w.heavy_alcohol;
        }
        if member.lifestyle.exercise == ExerciseLevel::Sedentary {
            score += w.sedentary;
        }
        if let Some(bmi) = member.bmi {
            if bmi >= 35.0 {
                score += w.severely_obese;
            } else if bmi >= 30.0 {
                score += w.obese;
            }
        }

        let severity = if score >= w.severe_threshold {
            Severity::Severe
        } else if score >= w.moderate_threshold {
            Severity::Moderate
        } else {
            Severity::Mild
        };
        (severity, score)
    }

    /// Generate the annual plan for one household member
    pub fn generate(&self, member: &Member, member_index: usize) -> Result<TreatmentPlan> {
        member.validate()?;

        let mut builder = PlanBuilder::new(member_index);
        let assessment = self.risk.assess(member);
        let emergency_risk = self.risk.emergency_risk(member);
        let mut rng = match self.config.complication_model {
            ComplicationModel::Seeded(seed) => {
                Some(ChaCha20Rng::seed_from_u64(seed.wrapping_add(member_index as u64)))
            }
            _ => None,
        };

        // Declared medications are always priced
        for name in member.active_medications() {
            let descriptor = MedicationDescriptor::new(name).with_dosage(name);
            if let Some(class) = self.medications.class_of(&descriptor) {
                builder.declared_classes.insert(class);
            }
            let estimate = self.medications.estimate(&descriptor);
            builder.declared_names.insert(estimate.normalized_name.clone());
            builder.push_medication(estimate.into_item(None, "Current medication", member_index));
        }

        for condition in member.active_conditions() {
            let found = self.reference.condition(condition);
            let profile = found.profile;
            let label = if found.is_known() {
                profile.display_name.clone()
            } else {
                builder
                    .plan
                    .notes
                    .push(format!("No reference profile for '{}'; estimated with default care", condition));
                condition.to_string()
            };

            let (severity, score) = self.assess_severity(member, condition);
            builder.plan.condition_severities.push(ConditionSeverity {
                condition: label.clone(),
                severity,
                score,
                member_index,
            });

            let bucket = match severity {
                Severity::Mild => &profile.management.mild,
                Severity::Moderate => &profile.management.moderate,
                Severity::Severe => &profile.management.severe,
            };
            let reason = format!("{} {} management", capitalize(severity.as_str()), label);
            self.add_bundle(&mut builder, bucket, &label, &reason, Some(severity));

            for complication in &profile.complications {
                self.add_complication(&mut builder, complication, &label, rng.as_mut());
            }
        }

        if self.config.include_preventive {
            for service in &self.reference.preventive_schedule {
                if service.applies_to(member.age, member.gender) {
                    let item = TreatmentItem::new(&service.name, service.category, service.frequency)
                        .with_unit_cost(service.unit_cost)
                        .with_reason("Recommended preventive care")
                        .preventive(true)
                        .for_member(member_index);
                    builder.plan.preventive_care.push(item);
                }
            }
        }

        if let Some(risk) = member.pregnancy {
            let (bundle, label) = match risk {
                PregnancyRisk::Normal => (&self.reference.pregnancy.normal, "Pregnancy"),
                PregnancyRisk::High => (&self.reference.pregnancy.high, "High-risk pregnancy"),
            };
            self.add_bundle(&mut builder, bundle, label, &format!("{} care", label), None);
            if !self.reference.pregnancy.delivery_note.is_empty() {
                builder.plan.notes.push(self.reference.pregnancy.delivery_note.clone());
            }
        }

        for service in &member.other_services {
            let category = classify_or_fallback(
                self.classifier.as_ref(),
                &service.name,
                self.config.strict_classification,
            )?;
            let mut item = TreatmentItem::new(&service.name, category, service.annual_frequency)
                .with_reason("Member-declared service")
                .for_member(member_index);
            item.unit_cost = service.unit_cost;
            builder.plan.treatments.push(item);
        }

        let mut plan = builder.finish(&self.reference);
        plan.has_chronic_conditions = assessment.chronic_condition_count > 0;
        let needs_specialist = plan.services().any(|s| s.requires_specialist);
        plan.requires_specialist_care = needs_specialist;
        plan.emergency_risk_level = emergency_level(emergency_risk);

        info!(
            "Generated plan for member {}: {} treatments, {} medications, ${:.2} estimated",
            member_index,
            plan.treatments.len() + plan.preventive_care.len(),
            plan.medications.len(),
            plan.totals.total_cost
        );
        Ok(plan)
    }

    /// Generate and combine plans for every household member
    pub fn generate_household(&self, members: &[Member]) -> Result<TreatmentPlan> {
        let plans = members
            .iter()
            .enumerate()
            .map(|(index, member)| self.generate(member, index))
            .collect::<Result<Vec<_>>>()?;
        Ok(TreatmentPlan::combine(plans))
    }

    fn add_bundle(
        &self,
        builder: &mut PlanBuilder,
        bundle: &CareBundle,
        condition: &str,
        reason: &str,
        severity: Option<Severity>,
    ) {
        for template in &bundle.treatments {
            let mut item = treatment_from_template(template, builder.member_index)
                .with_reason(reason);
            item.condition = Some(condition.to_string());
            item.severity = severity;
            builder.plan.treatments.push(item);
        }
        for template in &bundle.medications {
            self.add_prescribed(builder, template, condition, reason);
        }
    }

    fn add_prescribed(
        &self,
        builder: &mut PlanBuilder,
        template: &MedicationTemplate,
        condition: &str,
        reason: &str,
    ) {
        let mut descriptor = MedicationDescriptor::new(&template.name).specialty(template.specialty);
        descriptor.drug_class = template.drug_class.clone();
        descriptor.dosage = template.dosage.clone();

        let estimate = self.medications.estimate(&descriptor);
        if builder.declared_names.contains(&estimate.normalized_name)
            || estimate
                .drug_class
                .as_ref()
                .is_some_and(|c| builder.declared_classes.contains(c))
        {
            debug!("Skipping {}: covered by a current medication", template.name);
            return;
        }
        if builder.prescribed.contains(&estimate.normalized_name) {
            return;
        }
        builder.prescribed.insert(estimate.normalized_name.clone());
        builder.push_medication(estimate.into_item(
            Some(condition.to_string()),
            reason,
            builder.member_index,
        ));
    }

    fn add_complication(
        &self,
        builder: &mut PlanBuilder,
        complication: &Complication,
        condition: &str,
        rng: Option<&mut ChaCha20Rng>,
    ) {
        let probability =
            (complication.probability * self.config.complication_planning_factor).clamp(0.0, 1.0);
        if probability <= 0.0 {
            return;
        }

        let expected = match (self.config.complication_model, rng) {
            (ComplicationModel::None, _) => return,
            (ComplicationModel::Seeded(_), Some(rng)) => {
                if rng.gen::<f64>() >= probability {
                    return;
                }
                false
            }
            _ => true,
        };

        for template in &complication.treatments {
            let mut item = treatment_from_template(template, builder.member_index);
            item.condition = Some(condition.to_string());
            if expected {
                let unit = template
                    .unit_cost
                    .unwrap_or_else(|| self.reference.category_cost(template.category));
                item.unit_cost = Some(unit * probability);
                item.probability = Some(probability);
                item.reason = format!(
                    "Possible {} ({:.0}% annual likelihood)",
                    complication.name.to_lowercase(),
                    probability * 100.0
                );
            } else {
                item.reason = format!("{} (sampled)", complication.name);
            }
            builder.plan.treatments.push(item);
        }
    }
}

/// Accumulates one member's plan
struct PlanBuilder {
    member_index: usize,
    plan: TreatmentPlan,
    declared_names: BTreeSet<String>,
    declared_classes: BTreeSet<String>,
    prescribed: BTreeSet<String>,
}

impl PlanBuilder {
    fn new(member_index: usize) -> Self {
        Self {
            member_index,
            plan: TreatmentPlan {
                member_count: 1,
                ..Default::default()
            },
            declared_names: BTreeSet::new(),
            declared_classes: BTreeSet::new(),
            prescribed: BTreeSet::new(),
        }
    }

    fn push_medication(&mut self, item: MedicationItem) {
        if let Some(best) = item.alternatives.first() {
            self.plan.savings_opportunities.push(SavingsOpportunity {
                medication: item.name.clone(),
                alternative: best.name.clone(),
                monthly_savings: best.monthly_savings,
                annual_savings: best.monthly_savings * 12.0,
                member_index: self.member_index,
            });
        }
        self.plan.medications.push(item);
    }

    fn finish(self, reference: &ReferenceData) -> TreatmentPlan {
        let mut plan = self.plan;
        let line_cost = |item: &TreatmentItem| {
            let unit = item
                .unit_cost
                .unwrap_or_else(|| reference.category_cost(item.category));
            annual_line_cost(unit, item.frequency())
        };

        let treatment_cost: f64 = plan.treatments.iter().map(line_cost).sum();
        let preventive_cost: f64 = plan.preventive_care.iter().map(line_cost).sum();
        let medication_cost: f64 = plan.medications.iter().map(|m| m.annual_cost()).sum();
        let total_annual_visits: u32 = plan
            .services()
            .filter(|s| s.category.is_visit())
            .map(|s| s.frequency())
            .sum();

        plan.totals = PlanTotals {
            treatment_cost,
            medication_cost,
            preventive_cost,
            total_cost: treatment_cost + medication_cost + preventive_cost,
            total_annual_visits,
        };
        plan
    }
}

fn treatment_from_template(template: &TreatmentTemplate, member_index: usize) -> TreatmentItem {
    let mut item = TreatmentItem::new(&template.name, template.category, template.frequency)
        .for_member(member_index);
    item.unit_cost = template.unit_cost;
    item.is_preventive |= template.preventive;
    item.requires_specialist |= template.specialist;
    item
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
