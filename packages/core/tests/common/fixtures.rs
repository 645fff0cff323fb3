//! Shared fixtures for lifecycle tests: a default `BookingPaid` event and
//! helpers to seed the consumed `operators`/`operator_documents` tables the
//! Eligibility Filter reads.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use auction_core::common::{BookingId, CustomerId, OperatorId};
use auction_core::domains::auction::booking::{BookingPaid, JourneyType};
use auction_core::domains::auction::eligibility::{
    ApprovalStatus, DocumentType, JobEligibilityContext, OperatorDocument, OperatorProfile,
};

pub const VEHICLE_TYPE: &str = "saloon";
pub const POSTCODE: &str = "SW1A 1AA";

/// A `BookingPaid` event with a given customer price; every other field
/// takes a sensible default (one-way, saloon, pickup in an hour).
pub fn sample_booking_paid(customer_price: Decimal) -> BookingPaid {
    BookingPaid {
        booking_id: BookingId::new(),
        customer_id: CustomerId::new(),
        customer_price,
        pickup_postcode: Some(POSTCODE.to_string()),
        vehicle_type: VEHICLE_TYPE.to_string(),
        pickup_datetime: Utc::now() + Duration::hours(1),
        journey_type: JourneyType::OneWay,
        booking_group_id: None,
    }
}

/// Inserts a fresh, fully-approved, fully-documented operator into the
/// consumed `operators`/`operator_documents` tables and returns its id.
pub async fn insert_approved_operator(db: &PgPool) -> OperatorId {
    let operator_id = OperatorId::new();

    sqlx::query(
        r#"
        INSERT INTO operators (id, approval_status, vehicle_types, service_areas)
        VALUES ($1, 'approved', $2, $3)
        "#,
    )
    .bind(operator_id)
    .bind(vec![VEHICLE_TYPE.to_string()])
    .bind(vec!["SW1".to_string()])
    .execute(db)
    .await
    .expect("failed to insert fixture operator");

    let far_future = Utc::now() + Duration::days(365);
    for doc_type in ["operating_license", "insurance"] {
        sqlx::query(
            r#"
            INSERT INTO operator_documents (id, operator_id, doc_type, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(uuid::Uuid::new_v4())
        .bind(operator_id)
        .bind(doc_type)
        .bind(far_future)
        .execute(db)
        .await
        .expect("failed to insert fixture operator document");
    }

    operator_id
}

/// The in-memory [`OperatorProfile`] matching what [`insert_approved_operator`]
/// wrote, for call sites that need to re-check eligibility without a
/// directory round trip (mirrors the gateway's own re-check).
pub fn approved_operator_profile(operator_id: OperatorId) -> OperatorProfile {
    let far_future = Utc::now() + Duration::days(365);
    OperatorProfile {
        id: operator_id,
        approval_status: ApprovalStatus::Approved,
        service_areas: vec!["SW1".to_string()],
        vehicle_types: vec![VEHICLE_TYPE.to_string()],
        documents: vec![
            OperatorDocument {
                doc_type: DocumentType::OperatingLicense,
                expires_at: Some(far_future),
            },
            OperatorDocument {
                doc_type: DocumentType::Insurance,
                expires_at: Some(far_future),
            },
        ],
    }
}

pub fn job_context() -> JobEligibilityContext {
    JobEligibilityContext {
        required_vehicle_type: VEHICLE_TYPE.to_string(),
        pickup_postcode_prefix: "SW1".to_string(),
    }
}
