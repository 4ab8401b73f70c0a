//! Reference data tables
//!
//! Static lookup tables for conditions, drugs, preventive care, and service
//! classification. Loaded once and shared across components via `Arc`.
//!
//! ## Resolution
//!
//! Reference data is loaded with a two-layer resolution:
//! 1. An explicit path, or the override in the data dir
//!    (~/.local/share/coverwise/reference.toml)
//! 2. The embedded defaults (compiled into binary)
//!
//! Every analysis records the SHA-256 fingerprint of the text it was built
//! from, so results can be traced back to the exact tables used.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{normalize_key, Gender, TreatmentCategory};

/// Embedded default reference data (compiled into binary)
pub const DEFAULT_REFERENCE: &str = include_str!("../../../config/reference.toml");

/// Fallback cost when a category has no entry in the table
const FALLBACK_CATEGORY_COST: f64 = 150.0;

/// Coarse age grouping used for condition multipliers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeGroup {
    Child,
    Adult,
    Senior,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgeGroups {
    pub child_max: u32,
    pub senior_min: u32,
}

impl Default for AgeGroups {
    fn default() -> Self {
        Self {
            child_max: 17,
            senior_min: 65,
        }
    }
}

/// Age band with its baseline office visits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeBand {
    pub label: String,
    pub min_age: u32,
    /// Inclusive
    pub max_age: u32,
    pub baseline_visits: f64,
}

impl AgeBand {
    pub fn contains(&self, age: u32) -> bool {
        (self.min_age..=self.max_age).contains(&age)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgeMultipliers {
    pub child: f64,
    pub adult: f64,
    pub senior: f64,
}

impl Default for AgeMultipliers {
    fn default() -> Self {
        Self {
            child: 1.0,
            adult: 1.0,
            senior: 1.0,
        }
    }
}

impl AgeMultipliers {
    pub fn for_group(&self, group: AgeGroup) -> f64 {
        match group {
            AgeGroup::Child => self.child,
            AgeGroup::Adult => self.adult,
            AgeGroup::Senior => self.senior,
        }
    }
}

/// Template for a treatment line in a care bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentTemplate {
    pub name: String,
    pub category: TreatmentCategory,
    pub frequency: u32,
    #[serde(default)]
    pub unit_cost: Option<f64>,
    #[serde(default)]
    pub preventive: bool,
    #[serde(default)]
    pub specialist: bool,
}

/// Template for a medication in a care bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationTemplate {
    pub name: String,
    #[serde(default)]
    pub drug_class: Option<String>,
    #[serde(default)]
    pub dosage: Option<String>,
    #[serde(default)]
    pub specialty: bool,
}

/// Treatments and medications prescribed together
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CareBundle {
    pub treatments: Vec<TreatmentTemplate>,
    pub medications: Vec<MedicationTemplate>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagementPlan {
    pub mild: CareBundle,
    pub moderate: CareBundle,
    pub severe: CareBundle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complication {
    pub name: String,
    /// Annual probability in [0, 1]
    pub probability: f64,
    #[serde(default)]
    pub treatments: Vec<TreatmentTemplate>,
}

/// Static risk and care profile for one condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionRiskProfile {
    pub display_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub chronic: bool,
    #[serde(default)]
    pub mental_health: bool,
    pub primary_care_visits: f64,
    #[serde(default)]
    pub specialist_visits: f64,
    #[serde(default)]
    pub specialist: Option<String>,
    #[serde(default)]
    pub diagnostic_tests: f64,
    pub emergency_risk: f64,
    #[serde(default)]
    pub age_multipliers: AgeMultipliers,
    /// Conditions that count as comorbidities when also present
    #[serde(default)]
    pub related: Vec<String>,
    #[serde(default)]
    pub complications: Vec<Complication>,
    #[serde(default)]
    pub management: ManagementPlan,
}

/// Resolved condition: table key plus profile
#[derive(Debug, Clone, Copy)]
pub struct ConditionMatch<'a> {
    /// Table key, or None when the default profile was used
    pub key: Option<&'a str>,
    pub profile: &'a ConditionRiskProfile,
}

impl ConditionMatch<'_> {
    pub fn is_known(&self) -> bool {
        self.key.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownDrug {
    pub monthly_cost: f64,
    #[serde(default)]
    pub drug_class: Option<String>,
    #[serde(default)]
    pub specialty: bool,
}

/// Average costs for a drug class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrugClassCost {
    pub name: String,
    /// Substrings that identify a member of the class
    #[serde(default)]
    pub keywords: Vec<String>,
    /// None when no generic exists for the class
    #[serde(default)]
    pub generic_cost: Option<f64>,
    pub brand_cost: f64,
    #[serde(default)]
    pub specialty_cost: Option<f64>,
    #[serde(default)]
    pub generic_name: Option<String>,
    #[serde(default)]
    pub specialty: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeDrug {
    pub name: String,
    pub monthly_cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MedicationDefaults {
    pub generic_cost: f64,
    pub brand_cost: f64,
    pub specialty_cost: f64,
    pub mail_order_discount: f64,
    /// Brands priced below this are preferred-tier
    pub preferred_brand_threshold: f64,
}

impl Default for MedicationDefaults {
    fn default() -> Self {
        Self {
            generic_cost: 15.0,
            brand_cost: 250.0,
            specialty_cost: 3000.0,
            mail_order_discount: 0.15,
            preferred_brand_threshold: 200.0,
        }
    }
}

/// One entry of the age/gender preventive schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreventiveService {
    pub name: String,
    pub category: TreatmentCategory,
    pub frequency: u32,
    pub unit_cost: f64,
    pub min_age: u32,
    pub max_age: u32,
    #[serde(default)]
    pub gender: Option<Gender>,
}

impl PreventiveService {
    pub fn applies_to(&self, age: u32, gender: Gender) -> bool {
        (self.min_age..=self.max_age).contains(&age) && self.gender.map_or(true, |g| g == gender)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PregnancyBundles {
    pub normal: CareBundle,
    pub high: CareBundle,
    #[serde(default)]
    pub delivery_note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierRule {
    pub pattern: String,
    pub category: TreatmentCategory,
}

/// All reference tables
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceData {
    pub version: String,
    pub age_groups: AgeGroups,
    pub age_bands: Vec<AgeBand>,
    pub category_costs: BTreeMap<TreatmentCategory, f64>,
    pub conditions: BTreeMap<String, ConditionRiskProfile>,
    pub default_condition: ConditionRiskProfile,
    pub medication_defaults: MedicationDefaults,
    pub drug_classes: Vec<DrugClassCost>,
    pub drugs: BTreeMap<String, KnownDrug>,
    pub generic_drugs: Vec<String>,
    pub therapeutic_alternatives: BTreeMap<String, Vec<AlternativeDrug>>,
    pub preventive_schedule: Vec<PreventiveService>,
    pub pregnancy: PregnancyBundles,
    pub classifier: Vec<ClassifierRule>,
    #[serde(skip)]
    fingerprint: String,
}

impl ReferenceData {
    /// Reference data compiled into the binary
    pub fn embedded() -> Result<Self> {
        Self::from_toml_str(DEFAULT_REFERENCE)
    }

    /// Load reference data (explicit path, then data-dir override, then embedded)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            let content = fs::read_to_string(path).map_err(|e| {
                Error::Reference(format!("Failed to read {}: {}", path.display(), e))
            })?;
            debug!("Loaded reference data from {}", path.display());
            return Self::from_toml_str(&content);
        }

        if let Some(default_path) = default_reference_path() {
            if default_path.exists() {
                let content = fs::read_to_string(&default_path).map_err(|e| {
                    Error::Reference(format!("Failed to read {}: {}", default_path.display(), e))
                })?;
                debug!("Loaded reference override from {}", default_path.display());
                return Self::from_toml_str(&content);
            }
        }

        Self::embedded()
    }

    /// Parse and validate reference data from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: RawReference = toml::from_str(content)?;

        let mut category_costs = BTreeMap::new();
        for (name, cost) in raw.category_costs {
            let category: TreatmentCategory = name.parse().map_err(Error::Reference)?;
            category_costs.insert(category, cost);
        }

        let conditions = raw
            .conditions
            .into_iter()
            .map(|(key, profile)| (normalize_key(&key), profile))
            .collect();
        let drugs = raw
            .drugs
            .into_iter()
            .map(|(key, drug)| (normalize_key(&key), drug))
            .collect();
        let therapeutic_alternatives = raw
            .therapeutic_alternatives
            .into_iter()
            .map(|(key, alts)| (normalize_key(&key), alts))
            .collect();

        let data = Self {
            version: raw.version,
            age_groups: raw.age_groups.unwrap_or_default(),
            age_bands: raw.age_bands,
            category_costs,
            conditions,
            default_condition: raw.default_condition,
            medication_defaults: raw.medication_defaults.unwrap_or_default(),
            drug_classes: raw.drug_classes,
            drugs,
            generic_drugs: raw.generic_drugs.iter().map(|d| normalize_key(d)).collect(),
            therapeutic_alternatives,
            preventive_schedule: raw.preventive_schedule,
            pregnancy: raw.pregnancy,
            classifier: raw.classifier,
            fingerprint: hex::encode(Sha256::digest(content.as_bytes())),
        };
        data.validate()?;
        Ok(data)
    }

    /// SHA-256 of the source text
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn age_group(&self, age: u32) -> AgeGroup {
        if age <= self.age_groups.child_max {
            AgeGroup::Child
        } else if age >= self.age_groups.senior_min {
            AgeGroup::Senior
        } else {
            AgeGroup::Adult
        }
    }

    /// Age band containing `age` (the oldest band for ages past the table)
    pub fn age_band(&self, age: u32) -> &AgeBand {
        self.age_bands
            .iter()
            .find(|band| band.contains(age))
            .or_else(|| self.age_bands.last())
            .unwrap_or(&FALLBACK_BAND)
    }

    /// Look up a condition by key or alias, falling back to the default profile
    pub fn condition(&self, name: &str) -> ConditionMatch<'_> {
        let key = normalize_key(name);
        if let Some((k, profile)) = self.conditions.get_key_value(&key) {
            return ConditionMatch {
                key: Some(k.as_str()),
                profile,
            };
        }
        self.conditions
            .iter()
            .find(|(_, profile)| profile.aliases.iter().any(|a| normalize_key(a) == key))
            .map(|(k, profile)| ConditionMatch {
                key: Some(k.as_str()),
                profile,
            })
            .unwrap_or(ConditionMatch {
                key: None,
                profile: &self.default_condition,
            })
    }

    /// Default unit cost for a category
    pub fn category_cost(&self, category: TreatmentCategory) -> f64 {
        self.category_costs
            .get(&category)
            .or_else(|| self.category_costs.get(&TreatmentCategory::Other))
            .copied()
            .unwrap_or(FALLBACK_CATEGORY_COST)
    }

    pub fn known_drug(&self, normalized_name: &str) -> Option<&KnownDrug> {
        self.drugs.get(normalized_name)
    }

    pub fn is_generic(&self, normalized_name: &str) -> bool {
        self.generic_drugs.iter().any(|g| g == normalized_name)
    }

    pub fn drug_class(&self, name: &str) -> Option<&DrugClassCost> {
        let key = normalize_key(name);
        self.drug_classes.iter().find(|c| c.name == key)
    }

    /// First class whose keyword appears in the normalized drug name
    pub fn infer_drug_class(&self, normalized_name: &str) -> Option<&DrugClassCost> {
        self.drug_classes
            .iter()
            .find(|c| c.keywords.iter().any(|k| normalized_name.contains(k.as_str())))
    }

    pub fn alternatives_for(&self, normalized_name: &str) -> &[AlternativeDrug] {
        self.therapeutic_alternatives
            .get(normalized_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Reject tables that would produce nonsense estimates
    pub fn validate(&self) -> Result<()> {
        if self.age_bands.is_empty() {
            return Err(Error::Reference("at least one age band is required".into()));
        }

        let profiles = self
            .conditions
            .iter()
            .map(|(k, p)| (k.as_str(), p))
            .chain(std::iter::once(("default_condition", &self.default_condition)));
        for (key, profile) in profiles {
            if profile.emergency_risk < 0.0 || profile.primary_care_visits < 0.0 {
                return Err(Error::Reference(format!("condition {}: negative risk or visits", key)));
            }
            for complication in &profile.complications {
                if !(0.0..=1.0).contains(&complication.probability) {
                    return Err(Error::Reference(format!(
                        "condition {}: complication '{}' probability {} outside [0, 1]",
                        key, complication.name, complication.probability
                    )));
                }
            }
        }

        if let Some((category, cost)) = self.category_costs.iter().find(|(_, c)| **c < 0.0) {
            return Err(Error::Reference(format!("negative cost {} for {}", cost, category)));
        }
        if let Some((name, _)) = self.drugs.iter().find(|(_, d)| d.monthly_cost < 0.0) {
            return Err(Error::Reference(format!("negative monthly cost for drug {}", name)));
        }
        if !(0.0..1.0).contains(&self.medication_defaults.mail_order_discount) {
            return Err(Error::Reference("mail_order_discount must be in [0, 1)".into()));
        }

        Ok(())
    }
}

static FALLBACK_BAND: AgeBand = AgeBand {
    label: String::new(),
    min_age: 0,
    max_age: u32::MAX,
    baseline_visits: 2.0,
};

/// Default reference override path
pub fn default_reference_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("coverwise").join("reference.toml"))
}

/// Raw reference structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawReference {
    version: String,
    age_groups: Option<AgeGroups>,
    age_bands: Vec<AgeBand>,
    #[serde(default)]
    category_costs: BTreeMap<String, f64>,
    #[serde(default)]
    conditions: BTreeMap<String, ConditionRiskProfile>,
    default_condition: ConditionRiskProfile,
    medication_defaults: Option<MedicationDefaults>,
    #[serde(default)]
    drug_classes: Vec<DrugClassCost>,
    #[serde(default)]
    drugs: BTreeMap<String, KnownDrug>,
    #[serde(default)]
    generic_drugs: Vec<String>,
    #[serde(default)]
    therapeutic_alternatives: BTreeMap<String, Vec<AlternativeDrug>>,
    #[serde(default)]
    preventive_schedule: Vec<PreventiveService>,
    #[serde(default)]
    pregnancy: PregnancyBundles,
    #[serde(default)]
    classifier: Vec<ClassifierRule>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_embedded_reference() {
        let data = ReferenceData::embedded().unwrap();
        assert!(!data.version.is_empty());
        assert!(data.conditions.contains_key("diabetes"));
        assert_eq!(data.category_cost(TreatmentCategory::OfficeVisit), 150.0);
        assert_eq!(data.fingerprint().len(), 64);
    }

    #[test]
    fn test_condition_lookup_by_alias() {
        let data = ReferenceData::embedded().unwrap();
        let found = data.condition("High Blood Pressure");
        assert_eq!(found.key, Some("hypertension"));

        let unknown = data.condition("Mystery syndrome");
        assert!(!unknown.is_known());
        assert_eq!(unknown.profile.display_name, "Other condition");
    }

    #[test]
    fn test_age_groups_and_bands() {
        let data = ReferenceData::embedded().unwrap();
        assert_eq!(data.age_group(10), AgeGroup::Child);
        assert_eq!(data.age_group(40), AgeGroup::Adult);
        assert_eq!(data.age_group(70), AgeGroup::Senior);
        assert_eq!(data.age_band(0).label, "infant");
        assert_eq!(data.age_band(50).label, "middle_age");
        assert_eq!(data.age_band(500).label, "elderly");
    }

    #[test]
    fn test_drug_class_inference() {
        let data = ReferenceData::embedded().unwrap();
        assert_eq!(data.infer_drug_class("simvastatin").unwrap().name, "statin");
        assert_eq!(data.infer_drug_class("duloxetine").unwrap().name, "snri");
        assert!(data.infer_drug_class("unobtainium").is_none());
        assert!(data.is_generic("lisinopril"));
        assert!(!data.is_generic("lipitor"));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = ReferenceData::embedded().unwrap();
        let altered = DEFAULT_REFERENCE.replace("version = \"2025.1\"", "version = \"test\"");
        let b = ReferenceData::from_toml_str(&altered).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(b.version, "test");
    }

    #[test]
    fn test_load_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DEFAULT_REFERENCE.as_bytes()).unwrap();
        let data = ReferenceData::load(Some(file.path())).unwrap();
        assert_eq!(data.fingerprint(), ReferenceData::embedded().unwrap().fingerprint());
    }

    #[test]
    fn test_missing_path_is_an_error() {
        let result = ReferenceData::load(Some(Path::new("/nonexistent/reference.toml")));
        assert!(matches!(result, Err(Error::Reference(_))));
    }

    #[test]
    fn test_malformed_toml_is_a_toml_error() {
        let result = ReferenceData::from_toml_str("version = \"1\"\n[conditions");
        assert!(matches!(result, Err(Error::Toml(_))));
    }

    #[test]
    fn test_invalid_probability_rejected() {
        let bad = DEFAULT_REFERENCE.replace("probability = 0.10", "probability = 1.5");
        assert!(ReferenceData::from_toml_str(&bad).is_err());
    }
}
