// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! sql_identifier {
    ($name:ident, $label:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn parse(value: &str) -> Result<Self> {
                if !is_safe_identifier(value) {
                    bail!(
                        "invalid {} {value:?} -- use ASCII letters, digits and underscores",
                        $label
                    );
                }
                Ok(Self(value.to_owned()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = anyhow::Error;

            fn try_from(value: String) -> Result<Self> {
                Self::parse(&value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

sql_identifier!(TableName, "table name");
sql_identifier!(ColumnName, "column name");

/// Identifiers are interpolated into SQL, so only plain names pass.
pub fn is_safe_identifier(identifier: &str) -> bool {
    let mut bytes = identifier.bytes();
    match bytes.next() {
        Some(first) if first.is_ascii_alphabetic() || first == b'_' => {}
        _ => return false,
    }
    bytes.all(|byte| byte.is_ascii_alphanumeric() || byte == b'_')
}

#[cfg(test)]
mod tests {
    use super::{ColumnName, TableName, is_safe_identifier};

    #[test]
    fn safe_identifiers() {
        assert!(is_safe_identifier("subject"));
        assert!(is_safe_identifier("_hidden"));
        assert!(is_safe_identifier("surgery_implant2"));
        assert!(!is_safe_identifier(""));
        assert!(!is_safe_identifier("2fast"));
        assert!(!is_safe_identifier("drop table"));
        assert!(!is_safe_identifier("a;b"));
        assert!(!is_safe_identifier("naïve"));
    }

    #[test]
    fn parse_rejects_unsafe_names_with_label() {
        let error = TableName::parse("subject; --").expect_err("unsafe name should fail");
        assert!(error.to_string().contains("invalid table name"));

        let column = ColumnName::parse("subject_id").expect("valid column");
        assert_eq!(column.as_str(), "subject_id");
        assert_eq!(column.to_string(), "subject_id");
    }
}
