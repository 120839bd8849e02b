//! The cross-driver value taxonomy.
//!
//! [`Kind`] is the lingua franca between drivers: every backend maps its
//! native column types to and from these ten logical kinds. The mapping in
//! each direction lives with the driver (`driver::sqlite`, `driver::mysql`,
//! `driver::postgres`); this module only defines the taxonomy itself.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Logical type of a column value, independent of any backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Unknown or untyped; only seen for columns with no observed values.
    Null,
    Text,
    Int,
    Float,
    Decimal,
    Bool,
    Bytes,
    Datetime,
    Date,
    Time,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Null => "null",
            Kind::Text => "text",
            Kind::Int => "int",
            Kind::Float => "float",
            Kind::Decimal => "decimal",
            Kind::Bool => "bool",
            Kind::Bytes => "bytes",
            Kind::Datetime => "datetime",
            Kind::Date => "date",
            Kind::Time => "time",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "null" => Ok(Kind::Null),
            "text" => Ok(Kind::Text),
            "int" => Ok(Kind::Int),
            "float" => Ok(Kind::Float),
            "decimal" => Ok(Kind::Decimal),
            "bool" => Ok(Kind::Bool),
            "bytes" => Ok(Kind::Bytes),
            "datetime" => Ok(Kind::Datetime),
            "date" => Ok(Kind::Date),
            "time" => Ok(Kind::Time),
            other => Err(Error::InvalidOption(format!("unknown kind: {other}"))),
        }
    }
}
