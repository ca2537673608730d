//! Parameter validation and coercion
//!
//! Gates every run: submitted parameters are checked against the revision's
//! schema and coerced to their declared types. All violations are reported
//! at once so a caller never fixes errors one round trip at a time.
//!
//! Unknown-parameter detection is strict to catch typos; coercion is
//! deliberately permissive for string-only sources like query parameters
//! and environment variables.

use serde::Serialize;
use serde_json::{Map, Number, Value};

use maestro_domain::{ParameterDefinition, ParameterType};

/// Similarity threshold for "did you mean" hints on unknown parameters
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// A single parameter violation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamError {
    pub name: String,
    pub reason: String,
    pub provided: Value,
}

/// Validate a submitted parameter map against the schema.
///
/// Returns the coerced map with defaults applied, or every violation found.
pub fn validate_parameters(
    submitted: &Map<String, Value>,
    schema: &[ParameterDefinition],
) -> Result<Map<String, Value>, Vec<ParamError>> {
    let mut errors = Vec::new();
    let mut ok = Map::new();

    // Unknown parameters
    for (name, value) in submitted {
        if !schema.iter().any(|def| &def.name == name) {
            let mut reason = "not defined in the workflow parameters".to_string();
            if let Some(similar) = find_similar(name, schema) {
                reason.push_str(&format!("; did you mean '{similar}'?"));
            }
            errors.push(ParamError {
                name: name.clone(),
                reason,
                provided: value.clone(),
            });
        }
    }

    // Missing required parameters
    for def in schema {
        if def.required && !submitted.contains_key(&def.name) && def.default.is_none() {
            errors.push(ParamError {
                name: def.name.clone(),
                reason: "required parameter missing".to_string(),
                provided: Value::Null,
            });
        }
    }

    // Type check and coercion
    for def in schema {
        let Some(value) = submitted.get(&def.name) else {
            continue;
        };
        match coerce(value, def.parameter_type) {
            Ok(coerced) => {
                ok.insert(def.name.clone(), coerced);
            }
            Err(observed) => errors.push(ParamError {
                name: def.name.clone(),
                reason: format!("{} expected, got {observed}", def.parameter_type),
                provided: value.clone(),
            }),
        }
    }

    // Defaults for parameters not submitted
    for def in schema {
        if !submitted.contains_key(&def.name) {
            if let Some(default) = &def.default {
                ok.insert(def.name.clone(), default.clone());
            }
        }
    }

    if errors.is_empty() {
        Ok(ok)
    } else {
        Err(errors)
    }
}

/// Coerce a submitted value to the declared type.
///
/// Returns the observed type name on rejection.
fn coerce(value: &Value, ty: ParameterType) -> Result<Value, &'static str> {
    match ty {
        ParameterType::String => match value {
            Value::String(_) => Ok(value.clone()),
            other => Err(observed_type(other)),
        },

        ParameterType::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            // Floats are rejected: silent truncation would lose precision
            Value::Number(_) => Err("float"),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(|n| Value::Number(n.into()))
                .map_err(|_| "non-numeric string"),
            other => Err(observed_type(other)),
        },

        ParameterType::Float => match value {
            Value::Number(n) => {
                let Some(f) = n.as_f64() else {
                    return Err("non-finite number");
                };
                Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or("non-finite number")
            }
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or("non-numeric string"),
            other => Err(observed_type(other)),
        },

        ParameterType::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err("non-boolean string"),
            },
            // 0/1 are ambiguous, so integers are rejected outright
            other => Err(observed_type(other)),
        },
    }
}

fn observed_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Closest schema name to an unknown submitted name, if any is close enough.
fn find_similar<'a>(name: &str, schema: &'a [ParameterDefinition]) -> Option<&'a str> {
    schema
        .iter()
        .map(|def| (def.name.as_str(), strsim::jaro_winkler(name, &def.name)))
        .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(candidate, _)| candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Vec<ParameterDefinition> {
        vec![
            ParameterDefinition {
                name: "userName".to_string(),
                parameter_type: ParameterType::String,
                required: true,
                default: None,
                description: None,
            },
            ParameterDefinition {
                name: "retryCount".to_string(),
                parameter_type: ParameterType::Integer,
                required: true,
                default: None,
                description: None,
            },
            ParameterDefinition {
                name: "enableDebug".to_string(),
                parameter_type: ParameterType::Boolean,
                required: false,
                default: Some(json!(false)),
                description: None,
            },
        ]
    }

    fn submitted(entries: &[(&str, Value)]) -> Map<String, Value> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_happy_path_applies_defaults() {
        let input = submitted(&[("userName", json!("ada")), ("retryCount", json!(3))]);
        let ok = validate_parameters(&input, &schema()).unwrap();

        assert_eq!(ok.get("userName"), Some(&json!("ada")));
        assert_eq!(ok.get("retryCount"), Some(&json!(3)));
        assert_eq!(ok.get("enableDebug"), Some(&json!(false)));
    }

    #[test]
    fn test_reports_all_violations_at_once() {
        let input = submitted(&[
            ("retryCount", json!("not-a-number")),
            ("extraParam", json!("x")),
        ]);
        let errors = validate_parameters(&input, &schema()).unwrap_err();

        assert_eq!(errors.len(), 3);

        let by_name = |name: &str| {
            errors
                .iter()
                .find(|e| e.name == name)
                .unwrap_or_else(|| panic!("no error for {name}"))
        };
        assert!(by_name("userName").reason.contains("required"));
        assert!(by_name("extraParam").reason.contains("not defined"));
        assert!(by_name("retryCount").reason.contains("INTEGER expected"));
        assert_eq!(by_name("retryCount").provided, json!("not-a-number"));
    }

    #[test]
    fn test_unknown_parameter_suggestion() {
        let input = submitted(&[
            ("userName", json!("ada")),
            ("retryCount", json!(1)),
            ("retyCount", json!(2)),
        ]);
        let errors = validate_parameters(&input, &schema()).unwrap_err();

        assert_eq!(errors.len(), 1);
        assert!(errors[0].reason.contains("did you mean 'retryCount'"));
    }

    #[test]
    fn test_integer_coercion() {
        let defs = vec![ParameterDefinition {
            name: "n".to_string(),
            parameter_type: ParameterType::Integer,
            required: true,
            default: None,
            description: None,
        }];

        let ok = validate_parameters(&submitted(&[("n", json!(" 42 "))]), &defs).unwrap();
        assert_eq!(ok.get("n"), Some(&json!(42)));

        for bad in [json!(4.5), json!(true), json!("4.5"), json!("abc")] {
            assert!(validate_parameters(&submitted(&[("n", bad)]), &defs).is_err());
        }
    }

    #[test]
    fn test_float_coercion() {
        let defs = vec![ParameterDefinition {
            name: "f".to_string(),
            parameter_type: ParameterType::Float,
            required: true,
            default: None,
            description: None,
        }];

        assert!(validate_parameters(&submitted(&[("f", json!(3))]), &defs).is_ok());
        assert!(validate_parameters(&submitted(&[("f", json!(3.5))]), &defs).is_ok());
        assert!(validate_parameters(&submitted(&[("f", json!("2.5"))]), &defs).is_ok());
        assert!(validate_parameters(&submitted(&[("f", json!(true))]), &defs).is_err());
        assert!(validate_parameters(&submitted(&[("f", json!("NaN"))]), &defs).is_err());
    }

    #[test]
    fn test_boolean_coercion() {
        let defs = vec![ParameterDefinition {
            name: "b".to_string(),
            parameter_type: ParameterType::Boolean,
            required: true,
            default: None,
            description: None,
        }];

        let ok = validate_parameters(&submitted(&[("b", json!(" TRUE "))]), &defs).unwrap();
        assert_eq!(ok.get("b"), Some(&json!(true)));

        assert!(validate_parameters(&submitted(&[("b", json!(1))]), &defs).is_err());
        assert!(validate_parameters(&submitted(&[("b", json!(0))]), &defs).is_err());
        assert!(validate_parameters(&submitted(&[("b", json!("yes"))]), &defs).is_err());
    }

    #[test]
    fn test_required_with_default_is_satisfied_by_default() {
        let defs = vec![ParameterDefinition {
            name: "mode".to_string(),
            parameter_type: ParameterType::String,
            required: true,
            default: Some(json!("fast")),
            description: None,
        }];

        let ok = validate_parameters(&Map::new(), &defs).unwrap();
        assert_eq!(ok.get("mode"), Some(&json!("fast")));
    }

    #[test]
    fn test_empty_schema_rejects_everything_submitted() {
        let input = submitted(&[("anything", json!(1))]);
        let errors = validate_parameters(&input, &[]).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].reason.contains("not defined"));
    }
}
