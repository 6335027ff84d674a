use std::collections::HashMap;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::model::{EnrichedRecord, FlightLeg, SearchRecord};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnrichError {
    #[error("search {search_id} has no flight legs to pick a main airline from")]
    NoLegs { search_id: String },
    #[error("exchange rate {rate} cannot convert the price of search {search_id}")]
    InvalidRate { search_id: String, rate: Decimal },
}

/// Derives the economic and itinerary fields of a decoded search.
///
/// `rate` is units of the record's currency per 1 EUR.
pub fn enrich(record: &SearchRecord, rate: Decimal) -> Result<EnrichedRecord, EnrichError> {
    let main_airline = main_airline(&record.flights).ok_or_else(|| EnrichError::NoLegs {
        search_id: record.search_id.clone(),
    })?;

    let price_eur = convert_to_eur(record.price, rate).ok_or_else(|| EnrichError::InvalidRate {
        search_id: record.search_id.clone(),
        rate,
    })?;

    let advance_purchase = record.request_dep_date.signed_duration_since(record.search_date);
    let stay_duration = record
        .request_return_date
        .map(|return_date| return_date.signed_duration_since(record.request_dep_date));

    Ok(EnrichedRecord {
        search: record.clone(),
        advance_purchase,
        stay_duration,
        price_eur,
        main_airline: main_airline.to_string(),
    })
}

/// `price / rate` rounded to cents, ties to even. `None` unless `rate > 0`.
pub fn convert_to_eur(price: Decimal, rate: Decimal) -> Option<Decimal> {
    if rate <= Decimal::ZERO {
        return None;
    }
    let mut eur = price
        .checked_div(rate)?
        .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    // Always two places, e.g. `500.00` rather than `500`.
    eur.rescale(2);
    Some(eur)
}

/// Most frequent marketing airline. On a tie the airline that reached the
/// winning count first, walking the legs in order, is kept.
pub fn main_airline(legs: &[FlightLeg]) -> Option<&str> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut leader: Option<(&str, usize)> = None;

    for leg in legs {
        let airline = leg.marketing_airline.as_str();
        let count = counts.entry(airline).or_insert(0);
        *count += 1;
        match leader {
            Some((_, top)) if *count <= top => {}
            _ => leader = Some((airline, *count)),
        }
    }

    leader.map(|(airline, _)| airline)
}
