//! Medication cost estimation
//!
//! Prices a single drug from the reference tables: known drug, then
//! drug-class average, then flat defaults. Dosage text scales the monthly
//! cost, and cheaper alternatives are suggested for branded drugs.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{
    normalize_key, AlternativeKind, DrugClassification, DrugTier, MedicationAlternative,
    MedicationItem, MAX_UNIT_COST,
};
use crate::reference::{DrugClassCost, ReferenceData};

/// Maximum alternatives returned per drug
const MAX_ALTERNATIVES: usize = 3;

/// Monthly retail cost above which a non-preferred brand needs prior authorization
const PRIOR_AUTH_THRESHOLD: f64 = 500.0;

/// A medication to price
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MedicationDescriptor {
    pub name: String,
    #[serde(default)]
    pub drug_class: Option<String>,
    #[serde(default)]
    pub specialty: bool,
    #[serde(default)]
    pub dosage: Option<String>,
}

impl MedicationDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_class(mut self, drug_class: impl Into<String>) -> Self {
        self.drug_class = Some(drug_class.into());
        self
    }

    pub fn with_dosage(mut self, dosage: impl Into<String>) -> Self {
        self.dosage = Some(dosage.into());
        self
    }

    pub fn specialty(mut self, specialty: bool) -> Self {
        self.specialty = specialty;
        self
    }
}

/// Where a price came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostSource {
    KnownDrug,
    ClassAverage,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationCostEstimate {
    pub name: String,
    pub normalized_name: String,
    pub drug_class: Option<String>,
    pub classification: DrugClassification,
    pub tier: DrugTier,
    pub retail_monthly: f64,
    pub mail_order_monthly: f64,
    /// Set when dispensed through a specialty pharmacy
    pub specialty_monthly: Option<f64>,
    pub annual_cost: f64,
    pub requires_prior_auth: bool,
    pub dosage_multiplier: f64,
    pub cost_source: CostSource,
    /// Sorted by savings, largest first
    pub alternatives: Vec<MedicationAlternative>,
}

impl MedicationCostEstimate {
    /// Convert into a plan line
    pub fn into_item(self, condition: Option<String>, reason: impl Into<String>, member_index: usize) -> MedicationItem {
        MedicationItem {
            name: self.name,
            classification: self.classification,
            tier: self.tier,
            monthly_cost: self.retail_monthly,
            condition,
            reason: reason.into(),
            alternatives: self.alternatives,
            member_index,
        }
    }
}

pub struct MedicationCostCalculator {
    reference: Arc<ReferenceData>,
    dose_re: Regex,
}

impl MedicationCostCalculator {
    pub fn new(reference: Arc<ReferenceData>) -> Self {
        Self {
            reference,
            dose_re: Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*mg\b").expect("valid regex"),
        }
    }

    /// Estimate monthly and annual cost for one drug
    pub fn estimate(&self, descriptor: &MedicationDescriptor) -> MedicationCostEstimate {
        let key = drug_key(&descriptor.name);
        let defaults = self.reference.medication_defaults;
        let known = self.reference.known_drug(&key);
        let class = self.class_for(descriptor, &key);
        let is_generic = self.reference.is_generic(&key);
        let specialty = descriptor.specialty
            || known.is_some_and(|k| k.specialty)
            || class.is_some_and(|c| c.specialty);

        let (base, cost_source) = if let Some(drug) = known {
            (drug.monthly_cost, CostSource::KnownDrug)
        } else if let Some(class) = class {
            let cost = if specialty {
                class.specialty_cost.unwrap_or(class.brand_cost)
            } else if is_generic {
                class.generic_cost.unwrap_or(class.brand_cost)
            } else {
                class.brand_cost
            };
            (cost, CostSource::ClassAverage)
        } else {
            warn!("Unknown medication '{}', using default pricing", descriptor.name);
            let cost = if specialty {
                defaults.specialty_cost
            } else if is_generic {
                defaults.generic_cost
            } else {
                defaults.brand_cost
            };
            (cost, CostSource::Default)
        };

        let multiplier = self.dosage_multiplier(descriptor.dosage.as_deref());
        let retail = (base * multiplier).clamp(0.0, MAX_UNIT_COST);

        let tier = if specialty {
            DrugTier::Specialty
        } else if is_generic {
            DrugTier::Generic
        } else if retail < defaults.preferred_brand_threshold {
            DrugTier::PreferredBrand
        } else {
            DrugTier::NonPreferredBrand
        };

        let alternatives = self.alternatives(&key, tier, class, retail, multiplier);
        debug!(
            "Priced {} at ${:.2}/month ({:?}, {})",
            descriptor.name,
            retail,
            cost_source,
            tier
        );

        MedicationCostEstimate {
            name: descriptor.name.trim().to_string(),
            normalized_name: key,
            drug_class: class.map(|c| c.name.clone()),
            classification: tier.classification(),
            tier,
            retail_monthly: retail,
            mail_order_monthly: retail * (1.0 - defaults.mail_order_discount),
            specialty_monthly: (tier == DrugTier::Specialty).then_some(retail),
            annual_cost: retail * 12.0,
            requires_prior_auth: tier == DrugTier::Specialty
                || (tier == DrugTier::NonPreferredBrand && retail > PRIOR_AUTH_THRESHOLD),
            dosage_multiplier: multiplier,
            cost_source,
            alternatives,
        }
    }

    /// Drug class named by the descriptor, the known-drug table, or inferred from the name
    pub fn class_of(&self, descriptor: &MedicationDescriptor) -> Option<String> {
        self.class_for(descriptor, &drug_key(&descriptor.name))
            .map(|c| c.name.clone())
    }

    fn class_for(&self, descriptor: &MedicationDescriptor, key: &str) -> Option<&DrugClassCost> {
        descriptor
            .drug_class
            .as_deref()
            .and_then(|c| self.reference.drug_class(c))
            .or_else(|| {
                self.reference
                    .known_drug(key)
                    .and_then(|k| k.drug_class.as_deref())
                    .and_then(|c| self.reference.drug_class(c))
            })
            .or_else(|| self.reference.infer_drug_class(key))
    }

    /// Cost multiplier implied by free-text dosage ("500mg twice daily")
    pub fn dosage_multiplier(&self, dosage: Option<&str>) -> f64 {
        let Some(dosage) = dosage else {
            return 1.0;
        };
        let lower = dosage.to_lowercase();
        let words: Vec<&str> = lower.split(|c: char| !c.is_alphanumeric()).collect();
        let has_word = |w: &str| words.iter().any(|x| *x == w);

        let frequency = if lower.contains("four times") || has_word("qid") {
            4.0
        } else if lower.contains("three times") || has_word("tid") {
            3.0
        } else if lower.contains("twice") || lower.contains("two times") || has_word("bid") {
            2.0
        } else if lower.contains("every other") || lower.contains("as needed") || has_word("prn") {
            0.5
        } else {
            1.0
        };

        let strength = self
            .dose_re
            .captures(&lower)
            .and_then(|c| c[1].parse::<f64>().ok())
            .map(|mg| {
                if mg >= 1000.0 {
                    1.5
                } else if mg >= 500.0 {
                    1.25
                } else {
                    1.0
                }
            })
            .unwrap_or(1.0);

        frequency * strength
    }

    fn alternatives(
        &self,
        key: &str,
        tier: DrugTier,
        class: Option<&DrugClassCost>,
        retail: f64,
        multiplier: f64,
    ) -> Vec<MedicationAlternative> {
        let mut alternatives: Vec<MedicationAlternative> = Vec::new();
        let mut push = |name: &str, kind: AlternativeKind, monthly: f64| {
            let alt_key = normalize_key(name);
            if alt_key == key || alternatives.iter().any(|a| normalize_key(&a.name) == alt_key) {
                return;
            }
            let monthly_cost = monthly * multiplier;
            let savings = retail - monthly_cost;
            if savings > 0.0 {
                alternatives.push(MedicationAlternative {
                    name: name.to_string(),
                    kind,
                    monthly_cost,
                    monthly_savings: savings,
                });
            }
        };

        if tier != DrugTier::Generic {
            if let Some(class) = class {
                if let (Some(cost), Some(name)) = (class.generic_cost, class.generic_name.as_deref()) {
                    push(name, AlternativeKind::Generic, cost);
                }
            }
        }
        for alt in self.reference.alternatives_for(key) {
            push(&alt.name, AlternativeKind::Therapeutic, alt.monthly_cost);
        }

        alternatives.sort_by(|a, b| b.monthly_savings.total_cmp(&a.monthly_savings));
        alternatives.truncate(MAX_ALTERNATIVES);
        alternatives
    }
}

/// Lookup key from the leading alphabetic words ("Lipitor 20mg" -> "lipitor")
fn drug_key(name: &str) -> String {
    let words: Vec<&str> = name
        .split_whitespace()
        .take_while(|w| w.chars().all(|c| c.is_alphabetic() || c == '-'))
        .collect();
    if words.is_empty() {
        normalize_key(name)
    } else {
        normalize_key(&words.join(" "))
    }
}
