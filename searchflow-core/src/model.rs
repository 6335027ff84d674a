use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};

// ============================================================================
// Decoded search records
// ============================================================================

/// One segment of an itinerary, owned by its search record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightLeg {
    pub dep_airport: String,
    pub dep_date: NaiveDate,
    pub dep_time: NaiveTime,
    pub arr_airport: String,
    pub arr_date: NaiveDate,
    pub arr_time: NaiveTime,
    pub operating_airline: String,
    pub marketing_airline: String,
    pub flight_nb: String,
    pub cabin: char,
}

/// A single flight search event as decoded from one raw line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub version_nb: String,
    pub search_id: String,
    pub search_country: String,
    pub search_date: NaiveDate,
    pub search_time: NaiveTime,
    pub origin_city: String,
    pub destination_city: String,
    pub request_dep_date: NaiveDate,
    /// `None` for one-way searches.
    pub request_return_date: Option<NaiveDate>,
    pub passengers_string: String,
    pub currency: String,
    pub price: Decimal,
    pub taxes: Decimal,
    pub fees: Decimal,
    pub nb_of_flights: usize,
    pub flights: Vec<FlightLeg>,
}

impl SearchRecord {
    pub fn is_one_way(&self) -> bool {
        self.request_return_date.is_none()
    }

    /// Rate period used to convert this search's price.
    pub fn period(&self) -> Period {
        Period::of(self.search_date)
    }

    /// Object key under which the raw record is archived.
    pub fn storage_key(&self) -> String {
        format!("{}.json", self.search_id)
    }
}

// ============================================================================
// Enriched records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub search: SearchRecord,
    /// Signed: a departure before the search date is kept as-is.
    #[serde(serialize_with = "serialize_days")]
    pub advance_purchase: Duration,
    #[serde(
        serialize_with = "serialize_optional_days",
        skip_serializing_if = "Option::is_none"
    )]
    pub stay_duration: Option<Duration>,
    pub price_eur: Decimal,
    pub main_airline: String,
}

/// Renders a whole-day duration as ISO-8601, e.g. `P9D` or `-P3D`.
pub fn iso_days(duration: Duration) -> String {
    let days = duration.num_days();
    if days < 0 {
        format!("-P{}D", days.unsigned_abs())
    } else {
        format!("P{}D", days)
    }
}

fn serialize_days<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&iso_days(*duration))
}

fn serialize_optional_days<S: Serializer>(
    duration: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match duration {
        Some(d) => serializer.serialize_str(&iso_days(*d)),
        None => serializer.serialize_none(),
    }
}

// ============================================================================
// Rate periods
// ============================================================================

/// Year-month granularity key for exchange-rate lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(&format!("{}-01", s.trim()), "%Y-%m-%d").map(Period::of)
    }
}
