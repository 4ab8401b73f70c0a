//! Free-text service classification
//!
//! Maps user-declared service names ("Physical therapy", "MRI - knee") onto
//! [`TreatmentCategory`] so cost-sharing rules can be applied.

use regex::{Regex, RegexBuilder};
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::TreatmentCategory;
use crate::reference::ClassifierRule;

/// Assigns a treatment category to a free-text service name
pub trait ServiceClassifier: Send + Sync {
    /// Category for `name`, or None if no rule matches
    fn classify(&self, name: &str) -> Option<TreatmentCategory>;
}

/// Ordered regex rules; the first match wins
pub struct KeywordClassifier {
    rules: Vec<(Regex, TreatmentCategory)>,
}

impl KeywordClassifier {
    /// Compile rules (case-insensitive)
    pub fn new(rules: &[ClassifierRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                let regex = RegexBuilder::new(&rule.pattern).case_insensitive(true).build()?;
                Ok((regex, rule.category))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl ServiceClassifier for KeywordClassifier {
    fn classify(&self, name: &str) -> Option<TreatmentCategory> {
        self.rules
            .iter()
            .find(|(regex, _)| regex.is_match(name))
            .map(|(_, category)| *category)
    }
}

/// Classify with a fallback policy for unmapped names
///
/// In strict mode an unmapped name is an error; otherwise it maps to
/// [`TreatmentCategory::Other`] and a warning is logged.
pub fn classify_or_fallback(
    classifier: &dyn ServiceClassifier,
    name: &str,
    strict: bool,
) -> Result<TreatmentCategory> {
    match classifier.classify(name) {
        Some(category) => Ok(category),
        None if strict => Err(Error::Unclassified(name.to_string())),
        None => {
            warn!("No category for service '{}', using other", name);
            Ok(TreatmentCategory::Other)
        }
    }
}
