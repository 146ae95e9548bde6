//! `${<step-id>.output}` references inside argument templates.

use std::collections::HashMap;

use regex::{Captures, Regex};
use serde_json::Value;

use toolplan_tools::{ToolError, ToolResult};

const PATTERN: &str = r"\$\{([A-Za-z0-9_-]+)\.output\}";

/// Finds and substitutes step output placeholders.
#[derive(Debug, Clone)]
pub struct Placeholders {
    pattern: Regex,
}

impl Placeholders {
    /// Compiles the placeholder pattern.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Config`] if the pattern fails to compile.
    pub fn new() -> ToolResult<Self> {
        let pattern = Regex::new(PATTERN)
            .map_err(|err| ToolError::config("plan", format!("placeholder pattern: {err}")))?;
        Ok(Self { pattern })
    }

    /// Lists referenced step ids in order of appearance, without duplicates.
    #[must_use]
    pub fn references(&self, template: &Value) -> Vec<String> {
        let mut found = Vec::new();
        visit_strings(template, &mut |text| {
            for captures in self.pattern.captures_iter(text) {
                let id = &captures[1];
                if !found.iter().any(|known: &String| known == id) {
                    found.push(id.to_owned());
                }
            }
        });
        found
    }

    /// Replaces placeholders in every string of `template` with the literal
    /// output of the referenced step.
    ///
    /// Substitution happens inside JSON strings, so the result always
    /// serializes to valid JSON whatever the outputs contain.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Execution`] if a referenced step has no output.
    pub fn substitute(&self, template: &Value, outputs: &HashMap<&str, &str>) -> ToolResult<Value> {
        if let Some(missing) = self
            .references(template)
            .into_iter()
            .find(|id| !outputs.contains_key(id.as_str()))
        {
            return Err(ToolError::execution(format!(
                "placeholder references step `{missing}` which has no output"
            )));
        }
        Ok(self.replace(template, outputs))
    }

    fn replace(&self, value: &Value, outputs: &HashMap<&str, &str>) -> Value {
        match value {
            Value::String(text) => {
                let replaced = self.pattern.replace_all(text, |captures: &Captures<'_>| {
                    outputs.get(&captures[1]).copied().unwrap_or_default().to_owned()
                });
                Value::String(replaced.into_owned())
            }
            Value::Array(items) => {
                Value::Array(items.iter().map(|item| self.replace(item, outputs)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, item)| (key.clone(), self.replace(item, outputs)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

fn visit_strings(value: &Value, visit: &mut impl FnMut(&str)) {
    match value {
        Value::String(text) => visit(text),
        Value::Array(items) => items.iter().for_each(|item| visit_strings(item, visit)),
        Value::Object(map) => map.values().for_each(|item| visit_strings(item, visit)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finds_nested_references_once() {
        let placeholders = Placeholders::new().unwrap();
        let template = json!({
            "ip": "${step1.output}",
            "args": ["-p", "${step2.output}", "${step1.output}"],
            "count": 3
        });
        assert_eq!(placeholders.references(&template), vec!["step1", "step2"]);
    }

    #[test]
    fn ignores_other_dollar_forms() {
        let placeholders = Placeholders::new().unwrap();
        let template = json!({"command": "echo $HOME ${HOME} ${step1.result}"});
        assert!(placeholders.references(&template).is_empty());
    }

    #[test]
    fn substitutes_literal_output() {
        let placeholders = Placeholders::new().unwrap();
        let outputs = HashMap::from([("step1", "93.184.216.34")]);
        let resolved = placeholders
            .substitute(&json!({"ip": "${step1.output}"}), &outputs)
            .unwrap();
        assert_eq!(serde_json::to_string(&resolved).unwrap(), r#"{"ip":"93.184.216.34"}"#);
    }

    #[test]
    fn quotes_and_newlines_stay_valid_json() {
        let placeholders = Placeholders::new().unwrap();
        let outputs = HashMap::from([("a", "say \"hi\"\nbye")]);
        let resolved = placeholders
            .substitute(&json!({"command": "echo ${a.output}!"}), &outputs)
            .unwrap();
        let text = serde_json::to_string(&resolved).unwrap();
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back["command"], "echo say \"hi\"\nbye!");
    }

    #[test]
    fn missing_output_is_an_error() {
        let placeholders = Placeholders::new().unwrap();
        let err = placeholders
            .substitute(&json!({"ip": "${ghost.output}"}), &HashMap::new())
            .expect_err("no such step");
        assert!(matches!(err, ToolError::Execution { .. }));
    }
}
