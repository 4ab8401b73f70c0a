//! Insurance policy description
//!
//! Policies arrive already structured (JSON or TOML). Amounts are annual
//! dollars; rates are fractions in [0, 1].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{DrugTier, TreatmentCategory};

/// An amount that differs between individual and family coverage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierAmount {
    pub individual: f64,
    pub family: f64,
}

impl TierAmount {
    pub fn new(individual: f64, family: f64) -> Self {
        Self { individual, family }
    }

    /// Amount that applies to a household of the given size
    pub fn for_family_size(&self, family_size: usize) -> f64 {
        if family_size > 1 {
            self.family
        } else {
            self.individual
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Deductible {
    pub individual: f64,
    pub family: f64,
    /// Each member stops paying toward the deductible once they reach the
    /// individual amount, even if the family total is not met
    #[serde(default)]
    pub embedded: bool,
}

impl Deductible {
    pub fn amounts(&self) -> TierAmount {
        TierAmount::new(self.individual, self.family)
    }
}

/// Member share for a service category or drug tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostShare {
    /// Flat dollar amount per service or fill
    Copay(f64),
    /// Fraction of the allowed cost
    Coinsurance(f64),
}

/// Cost-sharing rule for one category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub share: CostShare,
    /// Copay applies before the deductible is met
    #[serde(default)]
    pub waive_deductible: bool,
}

impl CategoryRule {
    pub fn copay(amount: f64) -> Self {
        Self {
            share: CostShare::Copay(amount),
            waive_deductible: false,
        }
    }

    pub fn coinsurance(rate: f64) -> Self {
        Self {
            share: CostShare::Coinsurance(rate),
            waive_deductible: false,
        }
    }

    pub fn waiving_deductible(mut self) -> Self {
        self.waive_deductible = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    Hmo,
    #[default]
    Ppo,
    Epo,
    Pos,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Network {
    #[serde(default)]
    pub kind: NetworkType,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub out_of_network_covered: bool,
}

/// A health insurance policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsurancePolicy {
    pub id: String,
    pub name: String,
    /// Annual premium
    pub premium: TierAmount,
    /// Annual employer share of the premium
    #[serde(default)]
    pub employer_contribution: f64,
    pub deductible: Deductible,
    pub out_of_pocket_max: TierAmount,
    /// Default coinsurance after the deductible
    pub coinsurance: f64,
    #[serde(default)]
    pub category_rules: BTreeMap<TreatmentCategory, CategoryRule>,
    #[serde(default)]
    pub drug_tiers: BTreeMap<DrugTier, CategoryRule>,
    #[serde(default)]
    pub network: Network,
    /// Annual HSA/HRA contribution declared for this policy
    #[serde(default)]
    pub tax_advantaged_contribution: f64,
}

impl InsurancePolicy {
    /// Create a policy with only the headline numbers set
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        annual_premium: f64,
        deductible: f64,
        out_of_pocket_max: f64,
        coinsurance: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            premium: TierAmount::new(annual_premium, annual_premium * 2.5),
            employer_contribution: 0.0,
            deductible: Deductible {
                individual: deductible,
                family: deductible * 2.0,
                embedded: true,
            },
            out_of_pocket_max: TierAmount::new(out_of_pocket_max, out_of_pocket_max * 2.0),
            coinsurance,
            category_rules: BTreeMap::new(),
            drug_tiers: BTreeMap::new(),
            network: Network::default(),
            tax_advantaged_contribution: 0.0,
        }
    }

    pub fn with_category_rule(mut self, category: TreatmentCategory, rule: CategoryRule) -> Self {
        self.category_rules.insert(category, rule);
        self
    }

    pub fn with_drug_tier(mut self, tier: DrugTier, rule: CategoryRule) -> Self {
        self.drug_tiers.insert(tier, rule);
        self
    }

    /// Annual premium owed by the household after the employer share
    pub fn net_annual_premium(&self, family_size: usize) -> f64 {
        (self.premium.for_family_size(family_size) - self.employer_contribution).max(0.0)
    }

    pub fn monthly_premium(&self, family_size: usize) -> f64 {
        self.net_annual_premium(family_size) / 12.0
    }

    pub fn applicable_deductible(&self, family_size: usize) -> f64 {
        self.deductible.amounts().for_family_size(family_size)
    }

    pub fn applicable_out_of_pocket_max(&self, family_size: usize) -> f64 {
        self.out_of_pocket_max.for_family_size(family_size)
    }

    pub fn category_rule(&self, category: TreatmentCategory) -> Option<&CategoryRule> {
        self.category_rules.get(&category)
    }

    pub fn drug_rule(&self, tier: DrugTier) -> Option<&CategoryRule> {
        self.drug_tiers.get(&tier)
    }

    /// Reject policies the simulation cannot price sensibly
    pub fn validate(&self) -> Result<()> {
        let amounts = [
            ("premium.individual", self.premium.individual),
            ("premium.family", self.premium.family),
            ("employer_contribution", self.employer_contribution),
            ("deductible.individual", self.deductible.individual),
            ("deductible.family", self.deductible.family),
            ("out_of_pocket_max.individual", self.out_of_pocket_max.individual),
            ("out_of_pocket_max.family", self.out_of_pocket_max.family),
            ("tax_advantaged_contribution", self.tax_advantaged_contribution),
        ];
        for (field, value) in amounts {
            if !value.is_finite() || value < 0.0 {
                return Err(self.invalid(format!("{} must be non-negative, got {}", field, value)));
            }
        }

        check_rate(self, "coinsurance", self.coinsurance)?;

        if self.deductible.individual > self.out_of_pocket_max.individual {
            return Err(self.invalid(format!(
                "individual deductible {} exceeds out-of-pocket max {}",
                self.deductible.individual, self.out_of_pocket_max.individual
            )));
        }
        if self.deductible.family > self.out_of_pocket_max.family {
            return Err(self.invalid(format!(
                "family deductible {} exceeds out-of-pocket max {}",
                self.deductible.family, self.out_of_pocket_max.family
            )));
        }
        if self.deductible.family < self.deductible.individual
            || self.out_of_pocket_max.family < self.out_of_pocket_max.individual
        {
            return Err(self.invalid("family limits must not be below individual limits"));
        }

        let rules = self
            .category_rules
            .iter()
            .map(|(c, r)| (c.as_str(), r))
            .chain(self.drug_tiers.iter().map(|(t, r)| (t.as_str(), r)));
        for (name, rule) in rules {
            match rule.share {
                CostShare::Copay(amount) if !amount.is_finite() || amount < 0.0 => {
                    return Err(self.invalid(format!("copay for {} is negative", name)));
                }
                CostShare::Coinsurance(rate) => check_rate(self, name, rate)?,
                _ => {}
            }
        }

        Ok(())
    }

    fn invalid(&self, message: impl std::fmt::Display) -> Error {
        Error::InvalidData(format!("Policy '{}': {}", self.id, message))
    }
}

fn check_rate(policy: &InsurancePolicy, name: &str, rate: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&rate) {
        return Err(policy.invalid(format!("{} rate must be between 0 and 1, got {}", name, rate)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InsurancePolicy {
        InsurancePolicy::new("silver", "Silver PPO", 4800.0, 1500.0, 6000.0, 0.2)
    }

    #[test]
    fn test_valid_policy() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_deductible_above_oop_max_rejected() {
        let mut policy = sample();
        policy.deductible.individual = 7000.0;
        let err = policy.validate().unwrap_err();
        assert!(err.to_string().contains("exceeds out-of-pocket max"));
    }

    #[test]
    fn test_negative_amounts_rejected() {
        let mut policy = sample();
        policy.premium.individual = -1.0;
        assert!(policy.validate().is_err());

        let policy = sample().with_category_rule(TreatmentCategory::OfficeVisit, CategoryRule::copay(-5.0));
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_coinsurance_range() {
        let mut policy = sample();
        policy.coinsurance = 1.5;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_monthly_premium_after_employer_share() {
        let mut policy = sample();
        policy.employer_contribution = 1200.0;
        assert_eq!(policy.monthly_premium(1), 300.0);
        policy.employer_contribution = 10_000.0;
        assert_eq!(policy.monthly_premium(1), 0.0);
    }

    #[test]
    fn test_family_limits() {
        let policy = sample();
        assert_eq!(policy.applicable_deductible(1), 1500.0);
        assert_eq!(policy.applicable_deductible(3), 3000.0);
        assert_eq!(policy.applicable_out_of_pocket_max(2), 12_000.0);
    }

    #[test]
    fn test_deductible_tiers_like_other_limits() {
        let policy = sample();
        assert_eq!(policy.deductible.amounts(), TierAmount::new(1500.0, 3000.0));
        for size in 0..=4 {
            let family_deductible = policy.applicable_deductible(size) == policy.deductible.family;
            let family_oop = policy.applicable_out_of_pocket_max(size) == policy.out_of_pocket_max.family;
            assert_eq!(family_deductible, family_oop, "family size {}", size);
        }
    }

    #[test]
    fn test_policy_from_json() {
        let json = r#"{
            "id": "bronze",
            "name": "Bronze HDHP",
            "premium": {"individual": 3000, "family": 8000},
            "deductible": {"individual": 5000, "family": 10000, "embedded": true},
            "out_of_pocket_max": {"individual": 7000, "family": 14000},
            "coinsurance": 0.3,
            "category_rules": {
                "office_visit": {"share": {"copay": 40}},
                "emergency": {"share": {"coinsurance": 0.4}}
            },
            "drug_tiers": {"generic": {"share": {"copay": 10}, "waive_deductible": true}},
            "tax_advantaged_contribution": 1000
        }"#;
        let policy: InsurancePolicy = serde_json::from_str(json).unwrap();
        assert!(policy.validate().is_ok());
        assert_eq!(
            policy.category_rule(TreatmentCategory::OfficeVisit).unwrap().share,
            CostShare::Copay(40.0)
        );
        assert!(policy.drug_rule(DrugTier::Generic).unwrap().waive_deductible);
        assert_eq!(policy.network.kind, NetworkType::Ppo);
    }
}
