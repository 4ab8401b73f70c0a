//! Health risk scoring
//!
//! Shared by the utilization predictor and the treatment plan generator.
//! Produces a 0-100 score from weighted factors, a risk level, and
//! level-specific recommendations.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{AlcoholUse, ExerciseLevel, Member, PregnancyRisk, RiskLevel};
use crate::reference::ReferenceData;

/// Risk scoring weights
#[derive(Debug, Clone)]
pub struct RiskWeights {
    /// Points for members under 2
    pub infant: u32,
    /// Points for members 65 and over
    pub senior: u32,
    /// Points for members 75 and over (replaces `senior`)
    pub elderly: u32,
    pub per_chronic_condition: u32,
    pub chronic_condition_cap: u32,
    /// Points per pair of related conditions both present
    pub per_comorbidity: u32,
    /// Points for 3+ medications
    pub several_medications: u32,
    /// Points for 5+ medications (replaces `several_medications`)
    pub polypharmacy: u32,
    pub smoking: u32,
    pub heavy_alcohol: u32,
    pub sedentary: u32,
    /// Points for BMI >= 30
    pub obese: u32,
    /// Points for BMI >= 35 (replaces `obese`)
    pub severely_obese: u32,
    /// Points for BMI < 18.5
    pub underweight: u32,
    pub normal_pregnancy: u32,
    pub high_risk_pregnancy: u32,
    /// Points when any mental-health condition is present
    pub mental_health: u32,

    // Emergency risk contributions (probability units)
    pub smoking_emergency_risk: f64,
    pub heavy_alcohol_emergency_risk: f64,
    pub sedentary_emergency_risk: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            infant: 10,
            senior: 15,
            elderly: 20,
            per_chronic_condition: 10,
            chronic_condition_cap: 30,
            per_comorbidity: 5,
            several_medications: 5,
            polypharmacy: 10,
            smoking: 10,
            heavy_alcohol: 8,
            sedentary: 5,
            obese: 5,
            severely_obese: 10,
            underweight: 5,
            normal_pregnancy: 5,
            high_risk_pregnancy: 15,
            mental_health: 8,
            smoking_emergency_risk: 0.05,
            heavy_alcohol_emergency_risk: 0.05,
            sedentary_emergency_risk: 0.02,
        }
    }
}

/// One contributor to a risk score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// 0-100
    pub score: u32,
    pub level: RiskLevel,
    pub factors: Vec<RiskFactor>,
    pub recommendations: Vec<String>,
    pub chronic_condition_count: usize,
    pub comorbidity_count: usize,
    pub has_mental_health_condition: bool,
}

/// Map a 0-100 score onto a risk level
pub fn level_for_score(score: u32) -> RiskLevel {
    match score {
        0..=19 => RiskLevel::Low,
        20..=39 => RiskLevel::Moderate,
        40..=59 => RiskLevel::High,
        _ => RiskLevel::Critical,
    }
}

/// Map an annual emergency probability onto a risk level
pub fn emergency_level(risk: f64) -> RiskLevel {
    if risk >= 0.30 {
        RiskLevel::Critical
    } else if risk >= 0.15 {
        RiskLevel::High
    } else if risk >= 0.05 {
        RiskLevel::Moderate
    } else {
        RiskLevel::Low
    }
}

pub struct RiskScorer {
    reference: Arc<ReferenceData>,
    weights: RiskWeights,
}

impl RiskScorer {
    pub fn new(reference: Arc<ReferenceData>) -> Self {
        Self::with_weights(reference, RiskWeights::default())
    }

    pub fn with_weights(reference: Arc<ReferenceData>, weights: RiskWeights) -> Self {
        Self { reference, weights }
    }

    /// Score a member's overall health risk
    pub fn assess(&self, member: &Member) -> RiskAssessment {
        let w = &self.weights;
        let mut factors = Vec::new();
        let mut push = |name: &str, points: u32| {
            if points > 0 {
                factors.push(RiskFactor {
                    name: name.to_string(),
                    points,
                });
            }
        };

        if member.age < 2 {
            push("Infant", w.infant);
        } else if member.age >= 75 {
            push("Age 75+", w.elderly);
        } else if member.age >= 65 {
            push("Age 65+", w.senior);
        }

        let keys = self.known_condition_keys(member);
        let chronic_count = member
            .active_conditions()
            .filter(|c| self.reference.condition(c).profile.chronic)
            .count();
        let chronic_points = (chronic_count as u32 * w.per_chronic_condition).min(w.chronic_condition_cap);
        push("Chronic conditions", chronic_points);

        let comorbidities = self.comorbidity_count(&keys);
        push("Comorbidities", comorbidities as u32 * w.per_comorbidity);

        let medication_count = member.active_medications().count();
        if medication_count >= 5 {
            push("Polypharmacy", w.polypharmacy);
        } else if medication_count >= 3 {
            push("Multiple medications", w.several_medications);
        }

        if member.lifestyle.smoking {
            push("Smoking", w.smoking);
        }
        if member.lifestyle.alcohol == AlcoholUse::Heavy {
            push("Heavy alcohol use", w.heavy_alcohol);
        }
        if member.lifestyle.exercise == ExerciseLevel::Sedentary {
            push("Sedentary lifestyle", w.sedentary);
        }

        if let Some(bmi) = member.bmi {
            if bmi >= 35.0 {
                push("BMI 35+", w.severely_obese);
            } else if bmi >= 30.0 {
                push("BMI 30+", w.obese);
            } else if bmi < 18.5 {
                push("Underweight", w.underweight);
            }
        }

        match member.pregnancy {
            Some(PregnancyRisk::High) => push("High-risk pregnancy", w.high_risk_pregnancy),
            Some(PregnancyRisk::Normal) => push("Pregnancy", w.normal_pregnancy),
            None => {}
        }

        let has_mental_health = member
            .active_conditions()
            .any(|c| self.reference.condition(c).profile.mental_health);
        if has_mental_health {
            push("Mental health condition", w.mental_health);
        }

        let score = factors.iter().map(|f| f.points).sum::<u32>().min(100);
        let level = level_for_score(score);
        debug!("Risk score {} ({}) from {} factors", score, level, factors.len());

        RiskAssessment {
            score,
            level,
            recommendations: recommendations(level, member),
            factors,
            chronic_condition_count: chronic_count,
            comorbidity_count: comorbidities,
            has_mental_health_condition: has_mental_health,
        }
    }

    /// Annual probability of an emergency visit (0-1)
    pub fn emergency_risk(&self, member: &Member) -> f64 {
        let group = self.reference.age_group(member.age);
        let mut risk: f64 = member
            .active_conditions()
            .map(|c| {
                let profile = self.reference.condition(c).profile;
                profile.emergency_risk * profile.age_multipliers.for_group(group)
            })
            .sum();

        let w = &self.weights;
        if member.lifestyle.smoking {
            risk += w.smoking_emergency_risk;
        }
        if member.lifestyle.alcohol == AlcoholUse::Heavy {
            risk += w.heavy_alcohol_emergency_risk;
        }
        if member.lifestyle.exercise == ExerciseLevel::Sedentary {
            risk += w.sedentary_emergency_risk;
        }
        risk.clamp(0.0, 1.0)
    }

    /// Number of related conditions the member has alongside `condition`
    pub fn related_present(&self, member: &Member, condition: &str) -> usize {
        let found = self.reference.condition(condition);
        let Some(own_key) = found.key else {
            return 0;
        };
        self.known_condition_keys(member)
            .iter()
            .filter(|k| k.as_str() != own_key)
            .filter(|k| found.profile.related.iter().any(|r| r == *k))
            .count()
    }

    fn known_condition_keys(&self, member: &Member) -> BTreeSet<String> {
        member
            .active_conditions()
            .filter_map(|c| self.reference.condition(c).key.map(str::to_string))
            .collect()
    }

    /// Unordered pairs of present conditions where either lists the other as related
    fn comorbidity_count(&self, keys: &BTreeSet<String>) -> usize {
        let keys: Vec<&String> = keys.iter().collect();
        let mut count = 0;
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                let related = |x: &str, y: &str| {
                    self.reference
                        .conditions
                        .get(x)
                        .is_some_and(|p| p.related.iter().any(|r| r == y))
                };
                if related(a.as_str(), b.as_str()) || related(b.as_str(), a.as_str()) {
                    count += 1;
                }
            }
        }
        count
    }
}

fn recommendations(level: RiskLevel, member: &Member) -> Vec<String> {
    let mut recs: Vec<String> = match level {
        RiskLevel::Low => vec![
            "Keep up with annual preventive care, which most plans cover in full".into(),
            "A lower-premium plan with a higher deductible is likely to cost less overall".into(),
        ],
        RiskLevel::Moderate => vec![
            "Schedule regular check-ins with a primary care provider".into(),
            "Compare copays for office visits and generic drugs across plans".into(),
        ],
        RiskLevel::High => vec![
            "Expect to meet the deductible; favor plans with a lower out-of-pocket max".into(),
            "Confirm your specialists and prescriptions are covered in-network".into(),
        ],
        RiskLevel::Critical => vec![
            "Plan for reaching the out-of-pocket max; prioritize total annual cost over premium".into(),
            "Ask about care coordination or case management programs".into(),
            "Verify prior-authorization rules for specialty drugs and procedures".into(),
        ],
    };

    if member.lifestyle.smoking {
        recs.push("Smoking cessation programs are usually covered as preventive care".into());
    }
    recs
}
