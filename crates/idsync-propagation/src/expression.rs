//! `${name}` template evaluation
//!
//! Used for derived attributes and resource account links. Placeholders
//! resolve against an identity's expression context; unknown names expand
//! to nothing.

use std::collections::HashMap;

use regex::Regex;

use crate::error::MappingError;

/// Evaluate `expression` against `context`.
///
/// Returns `None` when the template has placeholders and none of them
/// resolved, or when the result is blank.
pub fn evaluate(
    expression: &str,
    context: &HashMap<String, String>,
) -> Result<Option<String>, MappingError> {
    // Dotted keys like ${org.unit} are allowed.
    let re = Regex::new(r"\$\{([\w.]+)\}").map_err(|e| MappingError::Expression {
        expression: expression.to_string(),
        message: e.to_string(),
    })?;
    let mut placeholders = 0usize;
    let mut resolved = 0usize;

    let result = re.replace_all(expression, |caps: &regex::Captures<'_>| {
        placeholders += 1;
        match context.get(&caps[1]) {
            Some(value) => {
                resolved += 1;
                value.clone()
            }
            None => String::new(),
        }
    });

    if result.contains("${") {
        return Err(MappingError::Expression {
            expression: expression.to_string(),
            message: "malformed placeholder".to_string(),
        });
    }

    if (placeholders > 0 && resolved == 0) || result.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(result.into_owned()))
    }
}
