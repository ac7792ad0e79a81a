// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use time::macros::format_description;
use time::{Date, PrimitiveDateTime};

use crate::model::Value;
use crate::schema::ColumnAffinity;

pub const DATE_LAYOUT: &str = "YYYY-MM-DD";
pub const DATETIME_LAYOUT: &str = "YYYY-MM-DD HH:MM:SS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    InvalidInt,
    InvalidFloat,
    InvalidNumber,
    InvalidDate,
    InvalidDateTime,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInt => f.write_str("invalid integer value"),
            Self::InvalidFloat => f.write_str("invalid decimal value"),
            Self::InvalidNumber => f.write_str("invalid numeric value"),
            Self::InvalidDate => write!(f, "invalid date value, expected {DATE_LAYOUT}"),
            Self::InvalidDateTime => {
                write!(f, "invalid datetime value, expected {DATETIME_LAYOUT}")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// Coerces one non-blank form cell into the value stored for `affinity`.
pub fn coerce(affinity: ColumnAffinity, input: &str) -> ValidationResult<Value> {
    let trimmed = input.trim();
    match affinity {
        ColumnAffinity::Integer => parse_int(trimmed).map(Value::Integer),
        ColumnAffinity::Real => parse_float(trimmed).map(Value::Real),
        ColumnAffinity::Numeric => match parse_int(trimmed) {
            Ok(value) => Ok(Value::Integer(value)),
            Err(_) => parse_float(trimmed)
                .map(Value::Real)
                .map_err(|_| ValidationError::InvalidNumber),
        },
        ColumnAffinity::Date => parse_date(trimmed).map(|date| Value::Text(format_date(date))),
        ColumnAffinity::DateTime => {
            parse_datetime(trimmed).map(|value| Value::Text(format_datetime(value)))
        }
        ColumnAffinity::Text | ColumnAffinity::Blob => Ok(Value::Text(input.to_owned())),
    }
}

pub fn parse_int(input: &str) -> ValidationResult<i64> {
    input
        .trim()
        .parse::<i64>()
        .map_err(|_| ValidationError::InvalidInt)
}

pub fn parse_float(input: &str) -> ValidationResult<f64> {
    let value = input
        .trim()
        .parse::<f64>()
        .map_err(|_| ValidationError::InvalidFloat)?;
    if !value.is_finite() {
        return Err(ValidationError::InvalidFloat);
    }
    Ok(value)
}

pub fn parse_date(input: &str) -> ValidationResult<Date> {
    Date::parse(input.trim(), &format_description!("[year]-[month]-[day]"))
        .map_err(|_| ValidationError::InvalidDate)
}

pub fn parse_datetime(input: &str) -> ValidationResult<PrimitiveDateTime> {
    let trimmed = input.trim();
    let normalized = trimmed.replacen('T', " ", 1);
    if let Ok(value) = PrimitiveDateTime::parse(
        &normalized,
        &format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    ) {
        return Ok(value);
    }
    if let Ok(value) = PrimitiveDateTime::parse(
        &normalized,
        &format_description!("[year]-[month]-[day] [hour]:[minute]"),
    ) {
        return Ok(value);
    }
    // A bare date means midnight.
    parse_date(trimmed)
        .map(|date| date.midnight())
        .map_err(|_| ValidationError::InvalidDateTime)
}

pub fn format_date(value: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        value.year(),
        u8::from(value.month()),
        value.day()
    )
}

pub fn format_datetime(value: PrimitiveDateTime) -> String {
    format!(
        "{} {:02}:{:02}:{:02}",
        format_date(value.date()),
        value.hour(),
        value.minute(),
        value.second()
    )
}

#[cfg(test)]
mod tests {
    use super::{ValidationError, coerce, parse_date, parse_datetime, parse_float, parse_int};
    use crate::model::Value;
    use crate::schema::ColumnAffinity;

    #[test]
    fn coerce_by_affinity() {
        let cases = [
            (ColumnAffinity::Integer, " 42 ", Value::Integer(42)),
            (ColumnAffinity::Real, "2.5", Value::Real(2.5)),
            (ColumnAffinity::Numeric, "7", Value::Integer(7)),
            (ColumnAffinity::Numeric, "7.25", Value::Real(7.25)),
            (
                ColumnAffinity::Date,
                "2020-01-01",
                Value::Text("2020-01-01".to_owned()),
            ),
            (
                ColumnAffinity::DateTime,
                "2020-01-01T08:30",
                Value::Text("2020-01-01 08:30:00".to_owned()),
            ),
            (ColumnAffinity::Text, " M ", Value::Text(" M ".to_owned())),
        ];
        for (affinity, input, expected) in cases {
            assert_eq!(coerce(affinity, input), Ok(expected), "input={input:?}");
        }
    }

    #[test]
    fn coerce_rejects_bad_input() {
        assert_eq!(
            coerce(ColumnAffinity::Integer, "4.5"),
            Err(ValidationError::InvalidInt)
        );
        assert_eq!(
            coerce(ColumnAffinity::Numeric, "abc"),
            Err(ValidationError::InvalidNumber)
        );
        assert_eq!(
            coerce(ColumnAffinity::Date, "01/02/2020"),
            Err(ValidationError::InvalidDate)
        );
    }

    #[test]
    fn parse_float_rejects_non_finite() {
        assert!(parse_float("inf").is_err());
        assert!(parse_float("NaN").is_err());
        assert_eq!(parse_float("1e3"), Ok(1000.0));
    }

    #[test]
    fn parse_int_allows_negative() {
        assert_eq!(parse_int("-3"), Ok(-3));
        assert!(parse_int("").is_err());
    }

    #[test]
    fn parse_date_rejects_impossible_dates() {
        assert!(parse_date("2021-02-30").is_err());
        assert!(parse_date("2020-02-29").is_ok());
    }

    #[test]
    fn parse_datetime_accepts_bare_date() {
        let value = parse_datetime("2021-06-01").expect("bare date should parse");
        assert_eq!(super::format_datetime(value), "2021-06-01 00:00:00");
    }

    #[test]
    fn error_messages_name_expected_layout() {
        assert!(ValidationError::InvalidDate.to_string().contains("YYYY-MM-DD"));
    }
}
