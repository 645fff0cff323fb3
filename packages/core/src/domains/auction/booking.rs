//! Booking: the consumed event payloads this core reacts to.
//!
//! `Booking` itself is owned by the payment/quoting system (spec.md §1, §3);
//! this core never stores a full Booking row, only the fields a delivery
//! carries through to job creation or cancellation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::{BookingId, CustomerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JourneyType {
    OneWay,
    Outbound,
    Return,
}

impl JourneyType {
    /// Selects the bidding window per spec.md §4.1: only the return leg of a
    /// return journey uses `RETURN_BIDDING_WINDOW_HOURS`; one-way and
    /// outbound legs get the default window.
    pub fn bidding_window_hours(self, settings: &crate::common::Settings) -> i64 {
        match self {
            JourneyType::Return => settings.return_bidding_window_hours,
            JourneyType::OneWay | JourneyType::Outbound => settings.default_bidding_window_hours,
        }
    }
}

/// `BookingPaid { bookingId, customerId, customerPrice, pickupPostcode?,
/// vehicleType, pickupDatetime, journeyType, bookingGroupId? }` (spec.md §6).
/// Idempotent on `bookingId`: a duplicate delivery is detected by
/// `Job::create_for_booking`'s `ON CONFLICT DO NOTHING`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingPaid {
    pub booking_id: BookingId,
    pub customer_id: CustomerId,
    pub customer_price: Decimal,
    pub pickup_postcode: Option<String>,
    pub vehicle_type: String,
    pub pickup_datetime: DateTime<Utc>,
    pub journey_type: JourneyType,
    pub booking_group_id: Option<BookingId>,
}

impl BookingPaid {
    /// First three characters of the pickup postcode, upper-cased, per the
    /// matching rule in spec.md §4.2 rule 4. `None` when no postcode was
    /// supplied or it is shorter than three characters.
    pub fn pickup_postcode_prefix(&self) -> Option<String> {
        let postcode = self.pickup_postcode.as_ref()?;
        let upper = postcode.to_ascii_uppercase();
        if upper.chars().count() < 3 {
            return None;
        }
        Some(upper.chars().take(3).collect())
    }
}

/// `BookingCancelled { bookingId, reason }` (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingCancelled {
    pub booking_id: BookingId,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postcode_prefix_is_upper_cased_first_three_chars() {
        let event = BookingPaid {
            booking_id: BookingId::new(),
            customer_id: CustomerId::new(),
            customer_price: Decimal::ZERO,
            pickup_postcode: Some("sw1a 1aa".to_string()),
            vehicle_type: "saloon".to_string(),
            pickup_datetime: Utc::now(),
            journey_type: JourneyType::OneWay,
            booking_group_id: None,
        };
        assert_eq!(event.pickup_postcode_prefix().as_deref(), Some("SW1"));
    }

    #[test]
    fn missing_postcode_has_no_prefix() {
        let event = BookingPaid {
            booking_id: BookingId::new(),
            customer_id: CustomerId::new(),
            customer_price: Decimal::ZERO,
            pickup_postcode: None,
            vehicle_type: "saloon".to_string(),
            pickup_datetime: Utc::now(),
            journey_type: JourneyType::OneWay,
            booking_group_id: None,
        };
        assert_eq!(event.pickup_postcode_prefix(), None);
    }
}
