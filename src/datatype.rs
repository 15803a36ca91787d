// used to print out readable forms of a data type
use std::fmt;
// used when parsing type tags
use std::str::FromStr;

// numeric literal grammar
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{OptabError, Result};
use crate::function::FunctionCall;

lazy_static! {
    static ref DECIMAL: Regex = Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").unwrap();
    static ref HEXADECIMAL: Regex =
        Regex::new(r"^([+-])?0[xX]([0-9a-fA-F]+\.?[0-9a-fA-F]*|\.[0-9a-fA-F]+)([pP][+-]?\d+)?$").unwrap();
}

const POSITIVE_INFINITY: [&str; 6] = ["Infinity", "INFINITY", "infinity", "+Infinity", "+INFINITY", "+infinity"];
const NEGATIVE_INFINITY: [&str; 3] = ["-Infinity", "-INFINITY", "-infinity"];

// ------------- Result types -------------
/// The scalar a solver computes for a function call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultType {
    String,
    Integer,
    Double,
    IeeeDouble,
}

impl ResultType {
    pub const fn tag(self) -> &'static str {
        match self {
            ResultType::String => "STRING",
            ResultType::Integer => "INTEGER",
            ResultType::Double => "DOUBLE",
            ResultType::IeeeDouble => "IEEEDOUBLE",
        }
    }
    /// The plain data type a captured value of this result type has.
    pub const fn value_type(self) -> DataType {
        match self {
            ResultType::String => DataType::String,
            ResultType::Integer => DataType::Integer,
            ResultType::Double => DataType::Double,
            ResultType::IeeeDouble => DataType::IeeeDouble,
        }
    }
}

// ------------- Data types -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    String,
    Integer,
    Double,
    IeeeDouble,
    Function(ResultType),
}

impl DataType {
    pub const ALL: [DataType; 8] = [
        DataType::String,
        DataType::Integer,
        DataType::Double,
        DataType::IeeeDouble,
        DataType::Function(ResultType::String),
        DataType::Function(ResultType::Integer),
        DataType::Function(ResultType::Double),
        DataType::Function(ResultType::IeeeDouble),
    ];

    pub const fn tag(&self) -> &'static str {
        match self {
            DataType::String => "STRING",
            DataType::Integer => "INTEGER",
            DataType::Double => "DOUBLE",
            DataType::IeeeDouble => "IEEEDOUBLE",
            DataType::Function(ResultType::String) => "STRING_FUNCTION",
            DataType::Function(ResultType::Integer) => "INTEGER_FUNCTION",
            DataType::Function(ResultType::Double) => "DOUBLE_FUNCTION",
            DataType::Function(ResultType::IeeeDouble) => "IEEEDOUBLE_FUNCTION",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self> {
        DataType::ALL
            .iter()
            .find(|data_type| data_type.tag() == tag)
            .copied()
            .ok_or_else(|| OptabError::Schema(format!("Unknown type tag '{tag}'")))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Double | DataType::IeeeDouble)
    }

    /// Whether `value` may be stored in a field of this type. Null fits every type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (DataType::String, Value::String(_)) => true,
            (DataType::Integer, Value::Integer(_)) => true,
            (DataType::Double, Value::Double(_)) => true,
            (DataType::IeeeDouble, Value::IeeeDouble(_)) => true,
            (DataType::Function(result_type), Value::Function(call)) => call.result_type() == *result_type,
            _ => false,
        }
    }

    /// Converts the textual form of a record item into a value of this type.
    pub fn coerce(&self, text: &str) -> Result<Value> {
        match self {
            DataType::String => Ok(Value::String(text.to_owned())),
            DataType::Function(result_type) => FunctionCall::parse(text, *result_type).map(Value::Function),
            DataType::Integer => {
                if POSITIVE_INFINITY.contains(&text) {
                    Ok(Value::Integer(i64::MAX))
                } else if NEGATIVE_INFINITY.contains(&text) {
                    Ok(Value::Integer(i64::MIN))
                } else if DECIMAL.is_match(text) {
                    text.parse::<i64>()
                        .map(Value::Integer)
                        .map_err(|_| self.format_error(text))
                } else {
                    Err(self.format_error(text))
                }
            }
            DataType::Double | DataType::IeeeDouble => {
                let number = if POSITIVE_INFINITY.contains(&text) {
                    f64::INFINITY
                } else if NEGATIVE_INFINITY.contains(&text) {
                    f64::NEG_INFINITY
                } else if text == "NaN" {
                    f64::NAN
                } else if DECIMAL.is_match(text) {
                    text.parse::<f64>().map_err(|_| self.format_error(text))?
                } else if let Some(number) = parse_hex_float(text) {
                    number
                } else {
                    return Err(self.format_error(text));
                };
                Ok(if *self == DataType::Double { Value::Double(number) } else { Value::IeeeDouble(number) })
            }
        }
    }

    fn format_error(&self, text: &str) -> OptabError {
        OptabError::Schema(format!("'{}' is not a valid {} literal", text, self.tag()))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for DataType {
    type Err = OptabError;
    fn from_str(s: &str) -> Result<Self> {
        DataType::from_tag(s)
    }
}

// ------------- Values -------------
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Not yet computed.
    Null,
    String(String),
    Integer(i64),
    Double(f64),
    IeeeDouble(f64),
    Function(FunctionCall),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) | Value::IeeeDouble(d) => Some(*d),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }
    pub fn as_function(&self) -> Option<&FunctionCall> {
        match self {
            Value::Function(call) => Some(call),
            _ => None,
        }
    }

    /// Text that `DataType::coerce` turns back into this value.
    pub fn literal(&self) -> String {
        match self {
            Value::Null => String::from("null"),
            Value::String(s) => s.clone(),
            Value::Integer(i64::MAX) => String::from("Infinity"),
            Value::Integer(i64::MIN) => String::from("-Infinity"),
            Value::Integer(i) => i.to_string(),
            Value::Double(d) => double_literal(*d),
            Value::IeeeDouble(d) => format_hex_float(*d),
            Value::Function(call) => call.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            other => write!(f, "{}", other.literal()),
        }
    }
}

fn double_literal(d: f64) -> String {
    if d.is_nan() {
        String::from("NaN")
    } else if d == f64::INFINITY {
        String::from("Infinity")
    } else if d == f64::NEG_INFINITY {
        String::from("-Infinity")
    } else {
        d.to_string()
    }
}

// ------------- Hexadecimal floating point -------------
/// Canonical hexadecimal form of a double, e.g. `0x1.8p1` for 3.0.
pub fn format_hex_float(value: f64) -> String {
    if value.is_nan() {
        return String::from("NaN");
    }
    if value.is_infinite() {
        return String::from(if value > 0.0 { "Infinity" } else { "-Infinity" });
    }
    let bits = value.to_bits();
    let sign = if bits >> 63 == 1 { "-" } else { "" };
    let exponent = ((bits >> 52) & 0x7ff) as i64;
    let fraction = bits & 0x000f_ffff_ffff_ffff;
    if exponent == 0 && fraction == 0 {
        return format!("{sign}0x0.0p0");
    }
    let digits = format!("{:013x}", fraction);
    let digits = match digits.trim_end_matches('0') {
        "" => "0",
        trimmed => trimmed,
    };
    if exponent == 0 {
        format!("{sign}0x0.{digits}p-1022")
    } else {
        format!("{sign}0x1.{digits}p{}", exponent - 1023)
    }
}

/// Parses a hexadecimal floating point literal such as `0x1.8p1` or `-0x.4P-2`.
pub fn parse_hex_float(text: &str) -> Option<f64> {
    let captures = HEXADECIMAL.captures(text)?;
    let negative = captures.get(1).is_some_and(|m| m.as_str() == "-");
    let digits = captures.get(2)?.as_str();
    let mut scale: i64 = match captures.get(3) {
        Some(m) => m.as_str()[1..].parse().ok()?,
        None => 0,
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    let mut mantissa: u64 = 0;
    let mut sticky = false;
    for (i, c) in whole.chars().chain(fraction.chars()).enumerate() {
        let digit = u64::from(c.to_digit(16)?);
        let fractional = i >= whole.len();
        // keep at most 60 significant bits, remember whether anything was dropped
        if mantissa >> 56 == 0 {
            mantissa = (mantissa << 4) | digit;
            if fractional {
                scale -= 4;
            }
        } else {
            sticky |= digit != 0;
            if !fractional {
                scale += 4;
            }
        }
    }
    if sticky {
        mantissa |= 1;
    }
    let magnitude = scale_by_power_of_two(mantissa as f64, scale);
    Some(if negative { -magnitude } else { magnitude })
}

fn scale_by_power_of_two(mut x: f64, mut exponent: i64) -> f64 {
    while exponent > 1000 {
        x *= 2f64.powi(1000);
        exponent -= 1000;
        if x.is_infinite() {
            return x;
        }
    }
    while exponent < -1000 {
        x *= 2f64.powi(-1000);
        exponent += 1000;
        if x == 0.0 {
            return x;
        }
    }
    x * 2f64.powi(exponent as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_float_canonical_forms() {
        assert_eq!(format_hex_float(3.0), "0x1.8p1");
        assert_eq!(format_hex_float(1.0), "0x1.0p0");
        assert_eq!(format_hex_float(-0.5), "-0x1.0p-1");
        assert_eq!(format_hex_float(0.0), "0x0.0p0");
        assert_eq!(format_hex_float(f64::MIN_POSITIVE / 2.0), "0x0.8p-1022");
    }

    #[test]
    fn hex_float_parses_back_exactly() {
        for x in [3.0, 0.1, -1234.5678e-300, f64::MAX, f64::MIN_POSITIVE, 5e-324, 1.0 / 3.0] {
            let text = format_hex_float(x);
            assert_eq!(parse_hex_float(&text), Some(x), "{text}");
        }
        assert_eq!(parse_hex_float("0X.4P-2"), Some(0.0625));
        assert_eq!(parse_hex_float("0x10"), Some(16.0));
        assert_eq!(parse_hex_float("0x"), None);
        assert_eq!(parse_hex_float("1.5"), None);
    }
}
