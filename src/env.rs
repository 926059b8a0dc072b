//! Environment variable substitution for configuration values
//!
//! `${NAME}` references are replaced with the value of the variable `NAME`.
//! Bare `$NAME` and `{NAME}` are left untouched. Expansion runs on values
//! after YAML parsing, so substituted text is never parsed as YAML.

use std::collections::BTreeSet;
use std::env;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::config::ConfigError;

static ENV_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Expand every `${NAME}` in `input`.
///
/// Fails with a single error naming all unset variables, in sorted order.
pub fn substitute_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut expander = EnvExpander::default();
    let expanded = expander.expand(input);
    expander.finish()?;
    Ok(expanded)
}

/// Expands many values, collecting unset variable names across all of them
#[derive(Debug, Default)]
pub struct EnvExpander {
    missing: BTreeSet<String>,
}

impl EnvExpander {
    /// Expand `input`; unset variables become empty and are remembered
    pub fn expand(&mut self, input: &str) -> String {
        let missing = &mut self.missing;
        ENV_REFERENCE
            .replace_all(input, |caps: &Captures<'_>| {
                let name = &caps[1];
                env::var(name).unwrap_or_else(|_| {
                    missing.insert(name.to_string());
                    String::new()
                })
            })
            .into_owned()
    }

    /// Expand `value` in place
    pub fn expand_in_place(&mut self, value: &mut String) {
        if ENV_REFERENCE.is_match(value) {
            *value = self.expand(value);
        }
    }

    /// Report every unset variable seen so far
    pub fn finish(self) -> Result<(), ConfigError> {
        if self.missing.is_empty() {
            return Ok(());
        }
        let names: Vec<_> = self.missing.into_iter().collect();
        Err(ConfigError::ValidationError(format!(
            "Missing environment variables: {}",
            names.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_unchanged() {
        let input = "content: no references here";
        assert_eq!(substitute_env_vars(input).unwrap(), input);
    }

    #[test]
    fn test_repeated_reference() {
        env::set_var("RESTFUSE_TEST_GREETING", "hi");
        let result = substitute_env_vars("${RESTFUSE_TEST_GREETING}/${RESTFUSE_TEST_GREETING}!");
        env::remove_var("RESTFUSE_TEST_GREETING");
        assert_eq!(result.unwrap(), "hi/hi!");
    }

    #[test]
    fn test_missing_variables_are_all_reported() {
        let err = substitute_env_vars("${RESTFUSE_MISSING_B} ${RESTFUSE_MISSING_A}").unwrap_err();
        assert!(err
            .to_string()
            .contains("RESTFUSE_MISSING_A, RESTFUSE_MISSING_B"));
    }

    #[test]
    fn test_expander_collects_across_values() {
        env::set_var("RESTFUSE_TEST_EXPANDER", "set");
        let mut expander = EnvExpander::default();
        let mut first = "${RESTFUSE_TEST_EXPANDER}-${RESTFUSE_MISSING_D}".to_string();
        let mut second = "${RESTFUSE_MISSING_C}".to_string();
        expander.expand_in_place(&mut first);
        expander.expand_in_place(&mut second);
        env::remove_var("RESTFUSE_TEST_EXPANDER");

        assert_eq!(first, "set-");
        assert_eq!(second, "");
        let err = expander.finish().unwrap_err();
        assert!(err
            .to_string()
            .contains("RESTFUSE_MISSING_C, RESTFUSE_MISSING_D"));
    }

    #[test]
    fn test_unbraced_forms_are_ignored() {
        let input = "$RESTFUSE_X and {RESTFUSE_X} and ${1BAD}";
        assert_eq!(substitute_env_vars(input).unwrap(), input);
    }
}
