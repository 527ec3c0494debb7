//! Analysis configuration

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Analysis options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Largest accepted `collapse(N)` argument
    pub max_collapse_depth: u32,
    /// Reject clauses the directive does not accept
    pub check_clause_applicability: bool,
    /// Warn when a worksharing trip count is narrowed to 64 bits
    pub narrowing_warnings: bool,
    /// Body scanner descends into nested directives
    pub scan_nested_directives: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            max_collapse_depth: 64,
            check_clause_applicability: true,
            narrowing_warnings: true,
            scan_nested_directives: true,
        }
    }
}

impl AnalysisOptions {
    /// Loads options from a JSON document; missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let options: AnalysisOptions = serde_json::from_str(text)?;
        if options.max_collapse_depth == 0 {
            return Err(crate::Error::InvalidOptions(
                "max_collapse_depth must be at least 1".to_string(),
            ));
        }
        Ok(options)
    }
}
