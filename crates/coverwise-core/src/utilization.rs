//! Annual healthcare utilization prediction
//!
//! Turns a member profile into predicted service counts from age-band
//! baselines and per-condition risk profiles, plus a MEPS-style summary.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{Member, PregnancyRisk, TreatmentCategory};
use crate::reference::ReferenceData;
use crate::risk::RiskScorer;

/// Utilization tuning
#[derive(Debug, Clone)]
pub struct UtilizationConfig {
    /// Medication-management visits per medication
    pub visits_per_medication: f64,
    /// Counseling visits added for smokers
    pub smoking_counseling_visits: f64,
    pub prenatal_visits: f64,
    /// Prenatal visit multiplier for high-risk pregnancies
    pub high_risk_prenatal_multiplier: f64,
    /// ER visits at an emergency risk of 1.0
    pub max_er_visits: f64,
    pub very_high_visits: f64,
    pub high_visits: f64,
    pub moderate_visits: f64,
}

impl Default for UtilizationConfig {
    fn default() -> Self {
        Self {
            visits_per_medication: 0.5,
            smoking_counseling_visits: 2.0,
            prenatal_visits: 12.0,
            high_risk_prenatal_multiplier: 1.5,
            max_er_visits: 2.0,
            very_high_visits: 50.0,
            high_visits: 30.0,
            moderate_visits: 15.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostCategory {
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl CostCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        }
    }
}

impl std::fmt::Display for CostCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One predicted service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationPrediction {
    pub service_type: TreatmentCategory,
    pub annual_frequency: f64,
    pub reason: String,
    /// What drove the prediction ("age", a condition name, "medications", ...)
    pub based_on: String,
}

/// Whole-number service counts in MEPS categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UtilizationCounts {
    pub pcp_visits: u32,
    pub outpatient_visits: u32,
    pub er_visits: u32,
    pub inpatient_admits: u32,
    pub home_health_visits: u32,
    pub rx_fills: u32,
    pub dental_visits: u32,
    pub equipment_purchases: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationForecast {
    pub predictions: Vec<UtilizationPrediction>,
    /// Annual emergency probability (0-1)
    pub emergency_risk: f64,
    pub cost_category: CostCategory,
    pub total_visits: f64,
    pub counts: UtilizationCounts,
}

pub struct UtilizationPredictor {
    reference: Arc<ReferenceData>,
    risk: RiskScorer,
    config: UtilizationConfig,
}

impl UtilizationPredictor {
    pub fn new(reference: Arc<ReferenceData>) -> Self {
        Self::with_config(reference, UtilizationConfig::default())
    }

    pub fn with_config(reference: Arc<ReferenceData>, config: UtilizationConfig) -> Self {
        Self {
            risk: RiskScorer::new(reference.clone()),
            reference,
            config,
        }
    }

    pub fn predict(&self, member: &Member) -> UtilizationForecast {
        let cfg = &self.config;
        let mut predictions = Vec::new();
        let mut add = |service_type, annual_frequency: f64, reason: String, based_on: &str| {
            if annual_frequency > 0.0 {
                predictions.push(UtilizationPrediction {
                    service_type,
                    annual_frequency,
                    reason,
                    based_on: based_on.to_string(),
                });
            }
        };

        // 1. Age baseline
        let band = self.reference.age_band(member.age);
        add(
            TreatmentCategory::OfficeVisit,
            band.baseline_visits,
            format!("Routine care for age group {}", band.label),
            "age",
        );

        // 2. Conditions
        let group = self.reference.age_group(member.age);
        for condition in member.active_conditions() {
            let found = self.reference.condition(condition);
            if !found.is_known() {
                warn!("Unknown condition '{}', using default profile", condition);
            }
            let profile = found.profile;
            let multiplier = profile.age_multipliers.for_group(group);

            add(
                TreatmentCategory::OfficeVisit,
                profile.primary_care_visits * multiplier,
                format!("Primary care for {}", profile.display_name),
                condition,
            );
            let (specialist_type, specialist_reason) = if profile.mental_health {
                (TreatmentCategory::Therapy, format!("Therapy for {}", profile.display_name))
            } else {
                let who = profile.specialist.as_deref().unwrap_or("Specialist");
                (
                    TreatmentCategory::SpecialistVisit,
                    format!("{} visits for {}", who, profile.display_name),
                )
            };
            add(
                specialist_type,
                profile.specialist_visits * multiplier,
                specialist_reason,
                condition,
            );
            add(
                TreatmentCategory::Diagnostic,
                profile.diagnostic_tests * multiplier,
                format!("Monitoring tests for {}", profile.display_name),
                condition,
            );
        }

        // 3. Medication management
        let medication_count = member.active_medications().count();
        add(
            TreatmentCategory::OfficeVisit,
            medication_count as f64 * cfg.visits_per_medication,
            format!("Medication management for {} prescriptions", medication_count),
            "medications",
        );

        // 4. Lifestyle
        if member.lifestyle.smoking {
            add(
                TreatmentCategory::Preventive,
                cfg.smoking_counseling_visits,
                "Smoking cessation counseling".to_string(),
                "lifestyle",
            );
        }

        // 5. Pregnancy
        if let Some(pregnancy) = member.pregnancy {
            let prenatal = match pregnancy {
                PregnancyRisk::Normal => cfg.prenatal_visits,
                PregnancyRisk::High => cfg.prenatal_visits * cfg.high_risk_prenatal_multiplier,
            };
            add(
                TreatmentCategory::Maternity,
                prenatal,
                "Prenatal care".to_string(),
                "pregnancy",
            );
            add(
                TreatmentCategory::Inpatient,
                1.0,
                "Delivery".to_string(),
                "pregnancy",
            );
        }

        // 6. Emergency visits
        let emergency_risk = self.risk.emergency_risk(member);
        let er_visits = (emergency_risk * cfg.max_er_visits).round();
        add(
            TreatmentCategory::Emergency,
            er_visits,
            format!("Emergency risk {:.0}%", emergency_risk * 100.0),
            "risk",
        );

        let total_visits: f64 = predictions
            .iter()
            .filter(|p| p.service_type.is_visit())
            .map(|p| p.annual_frequency)
            .sum();
        let cost_category = if total_visits > cfg.very_high_visits {
            CostCategory::VeryHigh
        } else if total_visits > cfg.high_visits {
            CostCategory::High
        } else if total_visits > cfg.moderate_visits {
            CostCategory::Moderate
        } else {
            CostCategory::Low
        };

        let counts = summarize(&predictions, medication_count);
        debug!(
            "Predicted {:.1} visits ({}) with emergency risk {:.2}",
            total_visits, cost_category, emergency_risk
        );

        UtilizationForecast {
            predictions,
            emergency_risk,
            cost_category,
            total_visits,
            counts,
        }
    }
}

/// Roll predictions up into MEPS categories
fn summarize(predictions: &[UtilizationPrediction], medication_count: usize) -> UtilizationCounts {
    let mut pcp = 0.0;
    let mut outpatient = 0.0;
    let mut er = 0.0;
    let mut inpatient = 0.0;
    let mut home_health = 0.0;
    let mut dental = 0.0;
    let mut equipment = 0.0;

    for p in predictions {
        let bucket = match p.service_type {
            TreatmentCategory::OfficeVisit | TreatmentCategory::Preventive => &mut pcp,
            TreatmentCategory::Emergency => &mut er,
            TreatmentCategory::Inpatient => &mut inpatient,
            TreatmentCategory::HomeHealth => &mut home_health,
            TreatmentCategory::Dental => &mut dental,
            TreatmentCategory::Equipment => &mut equipment,
            _ => &mut outpatient,
        };
        *bucket += p.annual_frequency;
    }

    let whole = |v: f64| v.max(0.0).round() as u32;
    UtilizationCounts {
        pcp_visits: whole(pcp),
        outpatient_visits: whole(outpatient),
        er_visits: whole(er),
        inpatient_admits: whole(inpatient),
        home_health_visits: whole(home_health),
        rx_fills: medication_count as u32 * 12,
        dental_visits: whole(dental),
        equipment_purchases: whole(equipment),
    }
}
