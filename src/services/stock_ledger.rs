use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    DbBackend, EntityTrait, JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    RelationTrait, Set, TransactionError, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        inventory_transaction::{self, TransactionType},
        material::{self, Entity as MaterialEntity},
        recipe,
        recipe_component::{self, Entity as RecipeComponentEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Input for a single stock mutation.
///
/// `quantity` is a positive magnitude for `Restock` and `Deduction` (the
/// ledger applies the sign), and the signed delta itself for `Adjustment`.
#[derive(Debug, Clone)]
pub struct StockAdjustment {
    pub transaction_type: TransactionType,
    pub quantity: Decimal,
    pub reason: String,
    pub notes: Option<String>,
    pub reference_id: Option<Uuid>,
    pub reference_type: Option<String>,
}

impl StockAdjustment {
    pub fn restock(quantity: Decimal, reason: impl Into<String>) -> Self {
        Self {
            transaction_type: TransactionType::Restock,
            quantity,
            reason: reason.into(),
            notes: None,
            reference_id: None,
            reference_type: None,
        }
    }

    pub fn deduction(quantity: Decimal, reason: impl Into<String>) -> Self {
        Self {
            transaction_type: TransactionType::Deduction,
            quantity,
            reason: reason.into(),
            notes: None,
            reference_id: None,
            reference_type: None,
        }
    }

    pub fn adjustment(delta: Decimal, reason: impl Into<String>) -> Self {
        Self {
            transaction_type: TransactionType::Adjustment,
            quantity: delta,
            reason: reason.into(),
            notes: None,
            reference_id: None,
            reference_type: None,
        }
    }
}

/// One material deduction inside a production commit.
#[derive(Debug, Clone)]
pub struct ProductionLine {
    pub material_id: Uuid,
    pub quantity: Decimal,
}

/// The stock ledger: the only writer of `materials.stock_quantity`.
///
/// Every mutation runs in a single database transaction that reads the
/// material row under an exclusive row lock, re-validates non-negativity,
/// persists the new level and appends a write-once
/// [`inventory_transaction::Model`]. Failures mutate nothing.
#[derive(Clone)]
pub struct StockLedgerService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl StockLedgerService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Applies a single stock mutation and returns the ledger record.
    #[instrument(skip(self, adjustment))]
    pub async fn adjust_stock(
        &self,
        tenant_id: Uuid,
        material_id: Uuid,
        adjustment: StockAdjustment,
        created_by: Uuid,
    ) -> Result<inventory_transaction::Model, ServiceError> {
        let delta = signed_delta(&adjustment)?;
        let record = self
            .db
            .transaction::<_, inventory_transaction::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    apply_locked(txn, tenant_id, material_id, delta, &adjustment, created_by).await
                })
            })
            .await
            .map_err(unwrap_transaction_error)?;

        info!(
            %tenant_id,
            %material_id,
            transaction_type = %record.transaction_type,
            quantity_after = %record.quantity_after,
            "stock adjusted"
        );

        self.event_sender
            .send_or_log(Event::StockAdjusted {
                tenant_id,
                material_id,
                transaction_id: record.id,
                transaction_type: record.transaction_type.clone(),
                quantity_before: record.quantity_before,
                quantity_after: record.quantity_after,
            })
            .await;

        Ok(record)
    }

    /// Deducts every line of a production run in one atomic unit.
    ///
    /// Any line that would drive its material negative aborts the whole
    /// commit with `InsufficientStock`; no partial deduction is persisted.
    #[instrument(skip(self, lines))]
    pub async fn commit_production(
        &self,
        tenant_id: Uuid,
        lines: Vec<ProductionLine>,
        production_run_id: Uuid,
        reason: String,
        created_by: Uuid,
    ) -> Result<Vec<inventory_transaction::Model>, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "Production commit requires at least one material line".to_string(),
            ));
        }
        for line in &lines {
            if line.quantity <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "Production line for material {} must deduct a positive quantity",
                    line.material_id
                )));
            }
        }

        let records = self
            .db
            .transaction::<_, Vec<inventory_transaction::Model>, ServiceError>(move |txn| {
                Box::pin(async move {
                    let mut records = Vec::with_capacity(lines.len());
                    for line in &lines {
                        let adjustment = StockAdjustment {
                            transaction_type: TransactionType::Deduction,
                            quantity: line.quantity,
                            reason: reason.clone(),
                            notes: None,
                            reference_id: Some(production_run_id),
                            reference_type: Some("production_run".to_string()),
                        };
                        let record = apply_locked(
                            txn,
                            tenant_id,
                            line.material_id,
                            -line.quantity,
                            &adjustment,
                            created_by,
                        )
                        .await?;
                        records.push(record);
                    }
                    Ok(records)
                })
            })
            .await
            .map_err(unwrap_transaction_error)?;

        info!(
            %tenant_id,
            %production_run_id,
            lines = records.len(),
            "production commit deducted stock"
        );

        for record in &records {
            self.event_sender
                .send_or_log(Event::StockAdjusted {
                    tenant_id,
                    material_id: record.material_id,
                    transaction_id: record.id,
                    transaction_type: record.transaction_type.clone(),
                    quantity_before: record.quantity_before,
                    quantity_after: record.quantity_after,
                })
                .await;
        }

        Ok(records)
    }

    /// Returns the newest-first ledger history for a material.
    #[instrument(skip(self))]
    pub async fn get_transaction_history(
        &self,
        tenant_id: Uuid,
        material_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<inventory_transaction::Model>, u64), ServiceError> {
        let limit = limit.max(1);
        let page = page.max(1) - 1;
        let paginator = inventory_transaction::Entity::find()
            .filter(inventory_transaction::Column::TenantId.eq(tenant_id))
            .filter(inventory_transaction::Column::MaterialId.eq(material_id))
            .order_by_desc(inventory_transaction::Column::CreatedAt)
            .paginate(self.db.as_ref(), limit);

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let records = paginator
            .fetch_page(page)
            .await
            .map_err(ServiceError::db_error)?;

        Ok((records, total))
    }

    /// A material can be deleted only while no active recipe references it.
    #[instrument(skip(self))]
    pub async fn can_be_deleted(
        &self,
        tenant_id: Uuid,
        material_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let active_references = RecipeComponentEntity::find()
            .join(JoinType::InnerJoin, recipe_component::Relation::Recipe.def())
            .filter(recipe_component::Column::MaterialId.eq(material_id))
            .filter(recipe::Column::TenantId.eq(tenant_id))
            .filter(recipe::Column::IsActive.eq(true))
            .count(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        Ok(active_references == 0)
    }
}

fn signed_delta(adjustment: &StockAdjustment) -> Result<Decimal, ServiceError> {
    match adjustment.transaction_type {
        TransactionType::Restock => {
            if adjustment.quantity <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Restock quantity must be positive".to_string(),
                ));
            }
            Ok(adjustment.quantity)
        }
        TransactionType::Deduction => {
            if adjustment.quantity <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Deduction quantity must be positive".to_string(),
                ));
            }
            Ok(-adjustment.quantity)
        }
        TransactionType::Adjustment => {
            if adjustment.quantity == Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Adjustment delta must be non-zero".to_string(),
                ));
            }
            Ok(adjustment.quantity)
        }
    }
}

/// Read-modify-write of one material row plus its ledger record, inside the
/// caller's transaction. The row is locked on backends that support it; on
/// SQLite the single writer serializes instead.
async fn apply_locked(
    txn: &DatabaseTransaction,
    tenant_id: Uuid,
    material_id: Uuid,
    delta: Decimal,
    adjustment: &StockAdjustment,
    created_by: Uuid,
) -> Result<inventory_transaction::Model, ServiceError> {
    let mut query = MaterialEntity::find()
        .filter(material::Column::Id.eq(material_id))
        .filter(material::Column::TenantId.eq(tenant_id));
    if txn.get_database_backend() == DbBackend::Postgres {
        query = query.lock_exclusive();
    }

    let material = query
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Material {} not found", material_id)))?;

    let quantity_before = material.stock_quantity;
    let quantity_after = quantity_before + delta;
    if quantity_after < Decimal::ZERO {
        return Err(ServiceError::InsufficientStock(format!(
            "Material '{}' has {} in stock, cannot apply change of {}",
            material.name, quantity_before, delta
        )));
    }

    let mut active: material::ActiveModel = material.into();
    active.stock_quantity = Set(quantity_after);
    active.update(txn).await.map_err(ServiceError::db_error)?;

    let record = inventory_transaction::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(tenant_id),
        material_id: Set(material_id),
        transaction_type: Set(adjustment.transaction_type.as_str().to_string()),
        quantity_before: Set(quantity_before),
        quantity_change: Set(delta),
        quantity_after: Set(quantity_after),
        reason: Set(adjustment.reason.clone()),
        notes: Set(adjustment.notes.clone()),
        reference_id: Set(adjustment.reference_id),
        reference_type: Set(adjustment.reference_type.clone()),
        created_by: Set(created_by),
        created_at: Set(Utc::now()),
    };

    record.insert(txn).await.map_err(ServiceError::db_error)
}

fn unwrap_transaction_error(err: TransactionError<ServiceError>) -> ServiceError {
    match err {
        TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
        TransactionError::Transaction(service_err) => service_err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base(transaction_type: TransactionType, quantity: Decimal) -> StockAdjustment {
        StockAdjustment {
            transaction_type,
            quantity,
            reason: "test".to_string(),
            notes: None,
            reference_id: None,
            reference_type: None,
        }
    }

    #[test]
    fn restock_and_deduction_apply_their_own_sign() {
        assert_eq!(
            signed_delta(&base(TransactionType::Restock, dec!(5))).unwrap(),
            dec!(5)
        );
        assert_eq!(
            signed_delta(&base(TransactionType::Deduction, dec!(5))).unwrap(),
            dec!(-5)
        );
    }

    #[test]
    fn adjustment_keeps_its_sign() {
        assert_eq!(
            signed_delta(&base(TransactionType::Adjustment, dec!(-2.5))).unwrap(),
            dec!(-2.5)
        );
    }

    #[test]
    fn non_positive_magnitudes_are_rejected() {
        assert!(signed_delta(&base(TransactionType::Restock, dec!(0))).is_err());
        assert!(signed_delta(&base(TransactionType::Deduction, dec!(-1))).is_err());
        assert!(signed_delta(&base(TransactionType::Adjustment, dec!(0))).is_err());
    }
}
