//! Decoder for caret-delimited search lines.
//!
//! A line carries 15 fixed fields followed by `nb_of_flights` groups of 10
//! leg fields. Decoding is strict: the field count must match the declared
//! number of legs exactly, and every field must parse.

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::model::{FlightLeg, SearchRecord};

pub const DELIMITER: char = '^';
pub const RECORD_FIELDS: usize = 15;
pub const LEG_FIELDS: usize = 10;

const FLIGHT_COUNT_INDEX: usize = RECORD_FIELDS - 1;

/// A line that could not be decoded. Carries the raw line for logging.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to decode line ({reason}): {line}")]
pub struct DecodeFailure {
    pub line: String,
    pub reason: DecodeReason,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeReason {
    #[error("expected at least 15 fields, found {0}")]
    TooFewFields(usize),
    #[error("invalid flight count {0:?}")]
    InvalidFlightCount(String),
    #[error("{declared} flight(s) require {expected} fields, found {found}")]
    FieldCountMismatch {
        declared: usize,
        expected: usize,
        found: usize,
    },
    #[error("invalid {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },
    #[error("payload is not an array of string fields: {0}")]
    InvalidPayload(String),
    #[error("return date {return_date} precedes departure date {departure_date}")]
    ReturnBeforeDeparture {
        departure_date: NaiveDate,
        return_date: NaiveDate,
    },
}

/// Decodes one raw line.
///
/// Returns `Ok(None)` for empty lines (anything splitting into at most one
/// field), which callers skip without logging an error.
pub fn decode(raw_line: &str) -> Result<Option<SearchRecord>, DecodeFailure> {
    let line = raw_line.trim_end_matches(['\r', '\n']);
    let fields: Vec<&str> = line.split(DELIMITER).collect();
    decode_parts(&fields).map_err(|reason| DecodeFailure {
        line: line.to_string(),
        reason,
    })
}

/// Same as [`decode`] for a line that has already been split into fields.
pub fn decode_fields<S: AsRef<str>>(fields: &[S]) -> Result<Option<SearchRecord>, DecodeFailure> {
    let fields: Vec<&str> = fields.iter().map(AsRef::as_ref).collect();
    let separator = DELIMITER.to_string();
    decode_parts(&fields).map_err(|reason| DecodeFailure {
        line: fields.join(separator.as_str()),
        reason,
    })
}

fn decode_parts(fields: &[&str]) -> Result<Option<SearchRecord>, DecodeReason> {
    if fields.len() <= 1 {
        return Ok(None);
    }
    if fields.len() < RECORD_FIELDS {
        return Err(DecodeReason::TooFewFields(fields.len()));
    }

    let raw_count = fields[FLIGHT_COUNT_INDEX].trim();
    let nb_of_flights: usize = raw_count
        .parse()
        .map_err(|_| DecodeReason::InvalidFlightCount(raw_count.to_string()))?;

    let expected = nb_of_flights
        .checked_mul(LEG_FIELDS)
        .and_then(|n| n.checked_add(RECORD_FIELDS));
    if expected != Some(fields.len()) {
        return Err(DecodeReason::FieldCountMismatch {
            declared: nb_of_flights,
            expected: expected.unwrap_or(usize::MAX),
            found: fields.len(),
        });
    }

    let flights = fields[RECORD_FIELDS..]
        .chunks_exact(LEG_FIELDS)
        .map(decode_leg)
        .collect::<Result<Vec<_>, _>>()?;

    let request_dep_date = date("request_dep_date", fields[7])?;
    let request_return_date = match fields[8].trim() {
        "" => None,
        value => Some(date("request_return_date", value)?),
    };
    if let Some(return_date) = request_return_date {
        if return_date < request_dep_date {
            return Err(DecodeReason::ReturnBeforeDeparture {
                departure_date: request_dep_date,
                return_date,
            });
        }
    }

    let currency = text(fields[10]);
    if currency.chars().count() != 3 {
        return Err(DecodeReason::InvalidField {
            field: "currency",
            value: currency,
        });
    }

    Ok(Some(SearchRecord {
        version_nb: text(fields[0]),
        search_id: text(fields[1]),
        search_country: text(fields[2]),
        search_date: date("search_date", fields[3])?,
        search_time: time("search_time", fields[4])?,
        origin_city: text(fields[5]),
        destination_city: text(fields[6]),
        request_dep_date,
        request_return_date,
        passengers_string: text(fields[9]),
        currency,
        price: amount("price", fields[11])?,
        taxes: amount("taxes", fields[12])?,
        fees: amount("fees", fields[13])?,
        nb_of_flights,
        flights,
    }))
}

fn decode_leg(chunk: &[&str]) -> Result<FlightLeg, DecodeReason> {
    let mut cabin = chunk[9].trim().chars();
    let cabin = match (cabin.next(), cabin.next()) {
        (Some(c), None) => c,
        _ => {
            return Err(DecodeReason::InvalidField {
                field: "cabin",
                value: chunk[9].to_string(),
            })
        }
    };

    Ok(FlightLeg {
        dep_airport: text(chunk[0]),
        dep_date: date("dep_date", chunk[1])?,
        dep_time: time("dep_time", chunk[2])?,
        arr_airport: text(chunk[3]),
        arr_date: date("arr_date", chunk[4])?,
        arr_time: time("arr_time", chunk[5])?,
        operating_airline: text(chunk[6]),
        marketing_airline: text(chunk[7]),
        flight_nb: text(chunk[8]),
        cabin,
    })
}

fn text(value: &str) -> String {
    value.trim().to_string()
}

fn invalid(field: &'static str, value: &str) -> DecodeReason {
    DecodeReason::InvalidField {
        field,
        value: value.to_string(),
    }
}

fn date(field: &'static str, value: &str) -> Result<NaiveDate, DecodeReason> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| invalid(field, value))
}

// Times come both with and without seconds.
fn time(field: &'static str, value: &str) -> Result<NaiveTime, DecodeReason> {
    let value_trimmed = value.trim();
    NaiveTime::parse_from_str(value_trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value_trimmed, "%H:%M"))
        .map_err(|_| invalid(field, value))
}

fn amount(field: &'static str, value: &str) -> Result<Decimal, DecodeReason> {
    match Decimal::from_str(value.trim()) {
        Ok(amount) if !amount.is_sign_negative() || amount.is_zero() => Ok(amount),
        _ => Err(invalid(field, value)),
    }
}
