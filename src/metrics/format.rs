//! Formatowanie wartości metryk do nazw kanałów.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::provider::MetricValue;

#[derive(Debug, Error, PartialEq)]
pub enum FormatError {
    #[error("expected {expected}, got {got}")]
    WrongType {
        expected: &'static str,
        got: &'static str,
    },

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("reference value unavailable")]
    NoReference,
}

/// Sposób renderowania wartości (bez etykiety).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Formatter {
    /// Procent max supply.
    Percentage { decimals: usize },
    Scaled {
        divisor: f64,
        unit: String,
        decimals: usize,
    },
    Currency { decimals: usize },
    /// TH/s, poniżej 1 TH/s w GH/s.
    Hashrate,
    Fixed {
        decimals: usize,
        #[serde(default)]
        suffix: Option<String>,
    },
    HalvingAmount,
    HalvingDate,
    Plain,
    Scientific,
}

const HALVING_AMOUNT: &str = "nextHalvingAmount";
const HALVING_DATE: &str = "nextHalvingDate";

impl Formatter {
    /// `max_supply` potrzebny tylko dla `Percentage`.
    pub fn format(&self, value: &MetricValue, max_supply: Option<f64>) -> Result<String, FormatError> {
        let out = match self {
            Self::Percentage { decimals } => {
                let max = max_supply.filter(|m| *m > 0.0).ok_or(FormatError::NoReference)?;
                format!("{:.*}%", *decimals, number(value)? / max * 100.0)
            }
            Self::Scaled {
                divisor,
                unit,
                decimals,
            } => {
                let d = if *divisor == 0.0 { 1.0 } else { *divisor };
                format!("{:.*} {unit}", *decimals, number(value)? / d)
            }
            Self::Currency { decimals } => format!("{:.*} $", *decimals, number(value)?),
            Self::Hashrate => {
                let ths = number(value)?;
                if ths < 1.0 {
                    format!("{:.2} GH/s", ths * 1000.0)
                } else {
                    format!("{ths:.2} TH/s")
                }
            }
            Self::Fixed { decimals, suffix } => match suffix {
                Some(s) => format!("{:.*}{s}", *decimals, number(value)?),
                None => format!("{:.*}", *decimals, number(value)?),
            },
            Self::HalvingAmount => {
                let amount = json_field(value, HALVING_AMOUNT)?;
                let n = amount.as_f64().ok_or(FormatError::WrongType {
                    expected: "number",
                    got: kind_of_json(amount),
                })?;
                format!("{n:.3}⏬")
            }
            Self::HalvingDate => match json_field(value, HALVING_DATE)? {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                other => {
                    return Err(FormatError::WrongType {
                        expected: "string",
                        got: kind_of_json(other),
                    });
                }
            },
            Self::Plain => match value {
                MetricValue::Number(n) => n.to_string(),
                MetricValue::Text(t) => t.trim().to_string(),
                MetricValue::Json(j) => j.to_string(),
            },
            Self::Scientific => format!("{:.3e}", number(value)?),
        };
        Ok(out)
    }
}

fn number(value: &MetricValue) -> Result<f64, FormatError> {
    match value {
        MetricValue::Number(n) if n.is_finite() => Ok(*n),
        MetricValue::Number(_) => Err(FormatError::WrongType {
            expected: "finite number",
            got: "non-finite number",
        }),
        MetricValue::Text(t) => t.trim().parse().map_err(|_| FormatError::WrongType {
            expected: "number",
            got: "text",
        }),
        MetricValue::Json(_) => Err(FormatError::WrongType {
            expected: "number",
            got: "json",
        }),
    }
}

fn json_field<'a>(value: &'a MetricValue, field: &'static str) -> Result<&'a Value, FormatError> {
    match value {
        MetricValue::Json(j) => j.get(field).ok_or(FormatError::MissingField(field)),
        MetricValue::Number(_) => Err(FormatError::WrongType {
            expected: "json",
            got: "number",
        }),
        MetricValue::Text(_) => Err(FormatError::WrongType {
            expected: "json",
            got: "text",
        }),
    }
}

fn kind_of_json(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn n(v: f64) -> MetricValue {
        MetricValue::Number(v)
    }

    #[test]
    fn supply_and_market_formats() {
        let billions = Formatter::Scaled {
            divisor: 1e9,
            unit: "billion".into(),
            decimals: 4,
        };
        assert_eq!(billions.format(&n(1_234_567_890.0), None).unwrap(), "1.2346 billion");
        assert_eq!(
            Formatter::Percentage { decimals: 2 }
                .format(&n(250.0), Some(1000.0))
                .unwrap(),
            "25.00%"
        );
        assert_eq!(
            Formatter::Percentage { decimals: 2 }.format(&n(1.0), None),
            Err(FormatError::NoReference)
        );
        assert_eq!(Formatter::Currency { decimals: 6 }.format(&n(0.0012), None).unwrap(), "0.001200 $");
        assert_eq!(Formatter::Scientific.format(&n(12340.0), None).unwrap(), "1.234e4");
    }

    #[test]
    fn hashrate_switches_unit_below_one_terahash() {
        assert_eq!(Formatter::Hashrate.format(&n(0.5), None).unwrap(), "500.00 GH/s");
        assert_eq!(Formatter::Hashrate.format(&n(12.3456), None).unwrap(), "12.35 TH/s");
    }

    #[test]
    fn halving_fields() {
        let v = MetricValue::Json(json!({"nextHalvingAmount": 12.5, "nextHalvingDate": "2025-01-01 00:00:00 UTC"}));
        assert_eq!(Formatter::HalvingAmount.format(&v, None).unwrap(), "12.500⏬");
        assert_eq!(Formatter::HalvingDate.format(&v, None).unwrap(), "2025-01-01 00:00:00 UTC");
        assert_eq!(
            Formatter::HalvingAmount.format(&MetricValue::Json(json!({})), None),
            Err(FormatError::MissingField("nextHalvingAmount"))
        );
    }

    #[test]
    fn numeric_formatter_rejects_json() {
        let err = Formatter::Currency { decimals: 2 }
            .format(&MetricValue::Json(json!({"price": 1})), None)
            .unwrap_err();
        assert!(matches!(err, FormatError::WrongType { expected: "number", .. }));
    }

    #[test]
    fn formatter_from_toml_shape() {
        let f: Formatter = serde_json::from_value(json!({"type": "fixed", "decimals": 3})).unwrap();
        assert_eq!(f, Formatter::Fixed { decimals: 3, suffix: None });
    }
}
