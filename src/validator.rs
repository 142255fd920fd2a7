//! Keyword admission filter for incoming questions.
//!
//! A question is admitted when its lower-cased text contains at least one
//! domain-indicator term as a substring. This is a coarse gate, not a
//! classifier: "heart of the matter" passes and "my stomach aches" does not.

/// Domain-indicator terms: symptoms, conditions, treatments, anatomy, and a
/// few question frames. Matched as lower-case substrings.
pub const MEDICAL_INDICATORS: &[&str] = &[
    "symptom",
    "disease",
    "condition",
    "treatment",
    "medicine",
    "medication",
    "diagnosis",
    "doctor",
    "hospital",
    "pain",
    "fever",
    "infection",
    "medical",
    "health",
    "illness",
    "therapy",
    "surgery",
    "procedure",
    "blood",
    "heart",
    "lung",
    "brain",
    "liver",
    "kidney",
    "cancer",
    "diabetes",
    "hypertension",
    "pneumonia",
    "what is",
    "how to treat",
    "causes of",
    "prevention",
    "cure",
    "relief",
];

#[derive(Debug, Clone)]
pub struct QueryValidator {
    terms: Vec<String>,
}

impl QueryValidator {
    /// Validator over an arbitrary term list. Terms are lower-cased.
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            terms: terms
                .into_iter()
                .map(|t| t.as_ref().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Validator over [`MEDICAL_INDICATORS`].
    pub fn medical() -> Self {
        Self::new(MEDICAL_INDICATORS.iter().copied())
    }

    /// True if `query` contains any indicator term, ignoring case.
    pub fn validate(&self, query: &str) -> bool {
        let query_lower = query.to_lowercase();
        self.terms.iter().any(|term| query_lower.contains(term.as_str()))
    }
}

impl Default for QueryValidator {
    fn default() -> Self {
        Self::medical()
    }
}

/// Checks `query` against [`MEDICAL_INDICATORS`].
pub fn validate_medical_query(query: &str) -> bool {
    QueryValidator::medical().validate(query)
}
