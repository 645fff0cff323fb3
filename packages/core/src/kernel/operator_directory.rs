//! Postgres-backed [`BaseOperatorDirectory`].
//!
//! Reads the read-only `operators` / `operator_documents` tables this core
//! consumes but does not own (spec.md §3's `Operator` entity is "consumed",
//! populated by the onboarding/KYC collaborator out of scope here).

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use crate::common::OperatorId;
use crate::domains::auction::eligibility::{
    ApprovalStatus, DocumentType, OperatorDocument, OperatorProfile,
};
use crate::kernel::traits::BaseOperatorDirectory;

pub struct PostgresOperatorDirectory {
    db_pool: PgPool,
}

impl PostgresOperatorDirectory {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[derive(FromRow)]
struct OperatorRow {
    id: OperatorId,
    approval_status: String,
    vehicle_types: Vec<String>,
    service_areas: Vec<String>,
}

#[derive(FromRow)]
struct DocumentRow {
    operator_id: OperatorId,
    doc_type: String,
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn parse_approval_status(raw: &str) -> ApprovalStatus {
    match raw {
        "approved" => ApprovalStatus::Approved,
        "rejected" => ApprovalStatus::Rejected,
        "suspended" => ApprovalStatus::Suspended,
        _ => ApprovalStatus::Pending,
    }
}

fn parse_doc_type(raw: &str) -> DocumentType {
    match raw {
        "operating_license" => DocumentType::OperatingLicense,
        "insurance" => DocumentType::Insurance,
        _ => DocumentType::Other,
    }
}

/// Attaches each row's documents and maps the raw string columns to the
/// typed eligibility enums. Shared by every query shape below so a single
/// row-to-profile mapping stays correct in one place.
async fn hydrate_profiles(
    db_pool: &PgPool,
    operators: Vec<OperatorRow>,
) -> Result<Vec<OperatorProfile>, anyhow::Error> {
    if operators.is_empty() {
        return Ok(Vec::new());
    }

    let operator_ids: Vec<OperatorId> = operators.iter().map(|o| o.id).collect();
    let documents = sqlx::query_as::<_, DocumentRow>(
        "SELECT operator_id, doc_type, expires_at FROM operator_documents WHERE operator_id = ANY($1)",
    )
    .bind(&operator_ids)
    .fetch_all(db_pool)
    .await?;

    let mut docs_by_operator: HashMap<OperatorId, Vec<OperatorDocument>> = HashMap::new();
    for doc in documents {
        docs_by_operator
            .entry(doc.operator_id)
            .or_default()
            .push(OperatorDocument {
                doc_type: parse_doc_type(&doc.doc_type),
                expires_at: doc.expires_at,
            });
    }

    Ok(operators
        .into_iter()
        .map(|row| OperatorProfile {
            id: row.id,
            approval_status: parse_approval_status(&row.approval_status),
            service_areas: row.service_areas,
            vehicle_types: row.vehicle_types,
            documents: docs_by_operator.remove(&row.id).unwrap_or_default(),
        })
        .collect())
}

#[async_trait]
impl BaseOperatorDirectory for PostgresOperatorDirectory {
    async fn candidates_for_vehicle_type(
        &self,
        vehicle_type: &str,
    ) -> Result<Vec<OperatorProfile>, anyhow::Error> {
        let operators = sqlx::query_as::<_, OperatorRow>(
            r#"
            SELECT id, approval_status, vehicle_types, service_areas
            FROM operators
            WHERE approval_status = 'approved' AND $1 = ANY(vehicle_types)
            "#,
        )
        .bind(vehicle_type)
        .fetch_all(&self.db_pool)
        .await?;

        hydrate_profiles(&self.db_pool, operators).await
    }

    async fn find_by_id(
        &self,
        operator_id: OperatorId,
    ) -> Result<Option<OperatorProfile>, anyhow::Error> {
        let operators = sqlx::query_as::<_, OperatorRow>(
            "SELECT id, approval_status, vehicle_types, service_areas FROM operators WHERE id = $1",
        )
        .bind(operator_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(hydrate_profiles(&self.db_pool, operators).await?.pop())
    }
}
