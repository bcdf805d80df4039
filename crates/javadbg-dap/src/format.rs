//! Value and type rendering.

use javadbg_vm::{ObjectKind, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    /// Render integral numbers in hexadecimal.
    pub hex: bool,
    /// Keep package prefixes in type names.
    pub qualified_names: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            hex: false,
            qualified_names: true,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("'{text}' is not a valid {type_name} value")]
    InvalidLiteral { text: String, type_name: String },
    #[error("values of type {0} cannot be entered as text")]
    Unsupported(String),
}

/// Converts between debuggee values and the strings shown to the user.
pub trait ValueFormatter: Send + Sync {
    fn type_to_string(&self, type_name: &str, options: &FormatOptions) -> String;

    fn value_to_string(&self, value: &Value, options: &FormatOptions) -> String;

    /// Parses user input for a variable of type `type_name`. Only primitives
    /// and `null` are accepted; strings are created in the debuggee by the
    /// caller.
    fn string_to_value(&self, text: &str, type_name: &str) -> Result<Value, FormatError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleValueFormatter;

impl SimpleValueFormatter {
    fn simple_name(type_name: &str) -> &str {
        // Generic arguments may themselves contain dots; only strip the outer package.
        let head = type_name.split('<').next().unwrap_or(type_name);
        match head.rfind('.') {
            Some(pos) => &type_name[pos + 1..],
            None => type_name,
        }
    }
}

impl ValueFormatter for SimpleValueFormatter {
    fn type_to_string(&self, type_name: &str, options: &FormatOptions) -> String {
        if options.qualified_names {
            type_name.to_string()
        } else {
            Self::simple_name(type_name).to_string()
        }
    }

    fn value_to_string(&self, value: &Value, options: &FormatOptions) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Void => "void".to_string(),
            Value::Boolean(v) => v.to_string(),
            Value::Byte(v) if options.hex => format!("{:#04x}", *v as u8),
            Value::Short(v) if options.hex => format!("{:#06x}", *v as u16),
            Value::Int(v) if options.hex => format!("{:#010x}", *v as u32),
            Value::Long(v) if options.hex => format!("{:#018x}", *v as u64),
            Value::Byte(v) => v.to_string(),
            Value::Short(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Long(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Double(v) => v.to_string(),
            Value::Char(v) => format!("'{v}'"),
            Value::Object(obj) => {
                let type_name = self.type_to_string(&obj.type_name, options);
                match &obj.kind {
                    ObjectKind::String { value } => format!("{value:?} (id={})", obj.id),
                    ObjectKind::Array { length } => {
                        let element = type_name.strip_suffix("[]").unwrap_or(&type_name);
                        format!("{element}[{length}] (id={})", obj.id)
                    }
                    ObjectKind::Plain => format!("{type_name} (id={})", obj.id),
                }
            }
        }
    }

    fn string_to_value(&self, text: &str, type_name: &str) -> Result<Value, FormatError> {
        let text = text.trim();
        let invalid = || FormatError::InvalidLiteral {
            text: text.to_string(),
            type_name: type_name.to_string(),
        };

        match type_name {
            "boolean" => text.parse().map(Value::Boolean).map_err(|_| invalid()),
            "byte" => narrow(text, i8::try_from, Value::Byte).ok_or_else(invalid),
            "short" => narrow(text, i16::try_from, Value::Short).ok_or_else(invalid),
            "int" => narrow(text, i32::try_from, Value::Int).ok_or_else(invalid),
            "long" => parse_integer(text.trim_end_matches(['l', 'L']))
                .map(Value::Long)
                .ok_or_else(invalid),
            "float" => text
                .trim_end_matches(['f', 'F'])
                .parse()
                .map(Value::Float)
                .map_err(|_| invalid()),
            "double" => text
                .trim_end_matches(['d', 'D'])
                .parse()
                .map(Value::Double)
                .map_err(|_| invalid()),
            "char" => {
                let inner = text
                    .strip_prefix('\'')
                    .and_then(|rest| rest.strip_suffix('\''))
                    .unwrap_or(text);
                let mut chars = inner.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Value::Char(c)),
                    _ => Err(invalid()),
                }
            }
            _ if text == "null" => Ok(Value::Null),
            _ => Err(FormatError::Unsupported(type_name.to_string())),
        }
    }
}

fn narrow<T, E>(
    text: &str,
    convert: impl FnOnce(i64) -> Result<T, E>,
    wrap: impl FnOnce(T) -> Value,
) -> Option<Value> {
    parse_integer(text).and_then(|v| convert(v).ok()).map(wrap)
}

fn parse_integer(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if negative { -magnitude } else { magnitude })
}
