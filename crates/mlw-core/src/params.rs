//! Script parameter values and their command line rendering.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, MlwError};

/// Value of a named training script parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Ordered parameter mapping; ordering keeps argument lists reproducible.
pub type ParamMap = BTreeMap<String, ParamValue>;

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(value) => write!(f, "{value}"),
            ParamValue::Int(value) => write!(f, "{value}"),
            ParamValue::Float(value) => write!(f, "{value}"),
            ParamValue::Text(value) => f.write_str(value),
        }
    }
}

impl FromStr for ParamValue {
    type Err = std::convert::Infallible;

    /// Infers the narrowest value type; anything unparsable stays text.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if let Ok(value) = raw.parse::<bool>() {
            return Ok(ParamValue::Bool(value));
        }
        if let Ok(value) = raw.parse::<i64>() {
            return Ok(ParamValue::Int(value));
        }
        if let Ok(value) = raw.parse::<f64>() {
            return Ok(ParamValue::Float(value));
        }
        Ok(ParamValue::Text(raw.to_string()))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

/// Checks that a parameter name can be rendered as a `--name` flag.
pub fn validate_param_name(name: &str) -> Result<(), MlwError> {
    let valid = !name.is_empty()
        && !name.starts_with('-')
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
    if valid {
        Ok(())
    } else {
        Err(MlwError::Validation(
            ErrorInfo::new("params.invalid_name", "parameter names must match [A-Za-z0-9_-]+")
                .with_context("name", name),
        ))
    }
}

/// Rejects NaN and infinite floats, which have no JSON form and would not
/// survive a round trip through `run.json`.
pub fn validate_param_value(name: &str, value: &ParamValue) -> Result<(), MlwError> {
    match value {
        ParamValue::Float(number) if !number.is_finite() => Err(MlwError::Validation(
            ErrorInfo::new("params.non_finite", "parameter values must be finite numbers")
                .with_context("name", name)
                .with_context("value", number.to_string()),
        )),
        _ => Ok(()),
    }
}

/// Checks every name and value of `params`.
pub fn validate_params(params: &ParamMap) -> Result<(), MlwError> {
    for (name, value) in params {
        validate_param_name(name)?;
        validate_param_value(name, value)?;
    }
    Ok(())
}

/// Parses a `name=value` assignment as accepted on the command line.
pub fn parse_assignment(raw: &str) -> Result<(String, ParamValue), MlwError> {
    let Some((name, value)) = raw.split_once('=') else {
        return Err(MlwError::Validation(
            ErrorInfo::new("params.assignment", "expected name=value")
                .with_context("input", raw),
        ));
    };
    let name = name.trim();
    validate_param_name(name)?;
    let value = match value.parse::<ParamValue>() {
        Ok(value) => value,
        Err(never) => match never {},
    };
    validate_param_value(name, &value)?;
    Ok((name.to_string(), value))
}

/// Renders parameters as `--name value` pairs in name order.
pub fn to_args(params: &ParamMap) -> Vec<String> {
    let mut args = Vec::with_capacity(params.len() * 2);
    for (name, value) in params {
        args.push(format!("--{name}"));
        args.push(value.to_string());
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_value_types() {
        assert_eq!("true".parse::<ParamValue>().unwrap(), ParamValue::Bool(true));
        assert_eq!("12".parse::<ParamValue>().unwrap(), ParamValue::Int(12));
        assert_eq!("0.01".parse::<ParamValue>().unwrap(), ParamValue::Float(0.01));
        assert_eq!(
            "diabetes.csv".parse::<ParamValue>().unwrap(),
            ParamValue::Text("diabetes.csv".into())
        );
    }

    #[test]
    fn renders_flags_in_name_order() {
        let mut params = ParamMap::new();
        params.insert("reg_rate".into(), ParamValue::Float(0.1));
        params.insert("data".into(), ParamValue::Text("d.csv".into()));
        assert_eq!(to_args(&params), vec!["--data", "d.csv", "--reg_rate", "0.1"]);
    }

    #[test]
    fn rejects_bad_assignments() {
        assert!(parse_assignment("reg_rate").is_err());
        assert!(parse_assignment("=0.1").is_err());
        assert!(parse_assignment("--x=1").is_err());
        let (name, value) = parse_assignment("reg_rate=0.5").unwrap();
        assert_eq!(name, "reg_rate");
        assert_eq!(value, ParamValue::Float(0.5));
    }

    #[test]
    fn rejects_non_finite_values() {
        for raw in ["reg_rate=nan", "reg_rate=inf", "reg_rate=-infinity"] {
            let err = parse_assignment(raw).unwrap_err();
            assert_eq!(err.info().code, "params.non_finite");
        }
        let mut params = ParamMap::new();
        params.insert("epochs".into(), ParamValue::Int(3));
        assert!(validate_params(&params).is_ok());
        params.insert("reg_rate".into(), ParamValue::Float(f64::NAN));
        assert_eq!(validate_params(&params).unwrap_err().info().code, "params.non_finite");
    }
}
