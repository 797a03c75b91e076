use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::material::{self, Entity as MaterialEntity, Lifecycle, Unit},
    errors::ServiceError,
    events::{Event, EventSender},
    services::stock_ledger::{StockAdjustment, StockLedgerService},
};

/// Input payload for creating a material
#[derive(Debug, Clone)]
pub struct CreateMaterialInput {
    pub name: String,
    pub sku: Option<String>,
    pub unit: Unit,
    pub reorder_level: Decimal,
    pub unit_cost: Decimal,
    /// Optional opening stock, booked through the ledger as a restock so
    /// the audit trail starts at the true opening balance.
    pub initial_stock: Option<Decimal>,
}

/// Input payload for updating mutable material fields. Stock is absent on
/// purpose: `stock_quantity` only changes through the ledger.
#[derive(Debug, Clone, Default)]
pub struct UpdateMaterialInput {
    pub name: Option<String>,
    pub sku: Option<String>,
    pub unit: Option<Unit>,
    pub reorder_level: Option<Decimal>,
    pub unit_cost: Option<Decimal>,
}

/// Master data management for materials
#[derive(Clone)]
pub struct MaterialService {
    db: Arc<DatabaseConnection>,
    stock_ledger: Arc<StockLedgerService>,
    event_sender: EventSender,
}

impl MaterialService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        stock_ledger: Arc<StockLedgerService>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            stock_ledger,
            event_sender,
        }
    }

    /// Creates a material, optionally booking its opening stock.
    #[instrument(skip(self, input))]
    pub async fn create_material(
        &self,
        tenant_id: Uuid,
        input: CreateMaterialInput,
        created_by: Uuid,
    ) -> Result<material::Model, ServiceError> {
        if input.name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Material name must not be empty".to_string(),
            ));
        }
        if input.reorder_level < Decimal::ZERO || input.unit_cost < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Reorder level and unit cost must not be negative".to_string(),
            ));
        }
        if let Some(initial) = input.initial_stock {
            if initial < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Initial stock must not be negative".to_string(),
                ));
            }
        }
        if let Some(sku) = &input.sku {
            self.ensure_sku_available(tenant_id, sku, None).await?;
        }

        let now = Utc::now();
        let model = material::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            name: Set(input.name.clone()),
            sku: Set(input.sku.clone()),
            unit: Set(input.unit.as_str().to_string()),
            stock_quantity: Set(Decimal::ZERO),
            reorder_level: Set(input.reorder_level),
            unit_cost: Set(input.unit_cost),
            lifecycle: Set(Lifecycle::Active.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model
            .insert(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        info!(%tenant_id, material_id = %created.id, "material created");

        let created = match input.initial_stock {
            Some(initial) if initial > Decimal::ZERO => {
                self.stock_ledger
                    .adjust_stock(
                        tenant_id,
                        created.id,
                        StockAdjustment::restock(initial, "Opening stock"),
                        created_by,
                    )
                    .await?;
                MaterialEntity::find_by_id(created.id)
                    .one(self.db.as_ref())
                    .await
                    .map_err(ServiceError::db_error)?
                    .ok_or_else(|| {
                        ServiceError::InternalError(format!(
                            "Material {} vanished after opening restock",
                            created.id
                        ))
                    })?
            }
            _ => created,
        };

        Ok(created)
    }

    /// Fetches one material within the tenant scope.
    #[instrument(skip(self))]
    pub async fn get_material(
        &self,
        tenant_id: Uuid,
        material_id: Uuid,
    ) -> Result<material::Model, ServiceError> {
        MaterialEntity::find()
            .filter(material::Column::Id.eq(material_id))
            .filter(material::Column::TenantId.eq(tenant_id))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Material {} not found", material_id)))
    }

    /// Returns paginated materials for a tenant, archived ones excluded
    /// unless requested.
    #[instrument(skip(self))]
    pub async fn list_materials(
        &self,
        tenant_id: Uuid,
        include_archived: bool,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<material::Model>, u64), ServiceError> {
        let limit = limit.max(1);
        let page = page.max(1) - 1;

        let mut query = MaterialEntity::find().filter(material::Column::TenantId.eq(tenant_id));
        if !include_archived {
            query = query.filter(material::Column::Lifecycle.eq(Lifecycle::Active.as_str()));
        }

        let paginator = query
            .order_by_asc(material::Column::Name)
            .paginate(self.db.as_ref(), limit);

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let models = paginator
            .fetch_page(page)
            .await
            .map_err(ServiceError::db_error)?;

        Ok((models, total))
    }

    /// Applies updates to mutable master data fields.
    #[instrument(skip(self, input))]
    pub async fn update_material(
        &self,
        tenant_id: Uuid,
        material_id: Uuid,
        input: UpdateMaterialInput,
    ) -> Result<material::Model, ServiceError> {
        let model = self.get_material(tenant_id, material_id).await?;

        if let Some(sku) = &input.sku {
            if model.sku.as_deref() != Some(sku.as_str()) {
                self.ensure_sku_available(tenant_id, sku, Some(material_id))
                    .await?;
            }
        }
        if let Some(level) = input.reorder_level {
            if level < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Reorder level must not be negative".to_string(),
                ));
            }
        }
        if let Some(cost) = input.unit_cost {
            if cost < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Unit cost must not be negative".to_string(),
                ));
            }
        }

        let mut active: material::ActiveModel = model.into();
        if let Some(name) = input.name {
            if name.trim().is_empty() {
                return Err(ServiceError::ValidationError(
                    "Material name must not be empty".to_string(),
                ));
            }
            active.name = Set(name);
        }
        if let Some(sku) = input.sku {
            active.sku = Set(Some(sku));
        }
        if let Some(unit) = input.unit {
            active.unit = Set(unit.as_str().to_string());
        }
        if let Some(level) = input.reorder_level {
            active.reorder_level = Set(level);
        }
        if let Some(cost) = input.unit_cost {
            active.unit_cost = Set(cost);
        }

        active
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Archives a material. Blocked while any active recipe references it,
    /// mirroring the deletion rule.
    #[instrument(skip(self))]
    pub async fn archive_material(
        &self,
        tenant_id: Uuid,
        material_id: Uuid,
    ) -> Result<material::Model, ServiceError> {
        let model = self.get_material(tenant_id, material_id).await?;
        if model.is_archived() {
            return Ok(model);
        }

        if !self
            .stock_ledger
            .can_be_deleted(tenant_id, material_id)
            .await?
        {
            return Err(ServiceError::InvalidOperation(format!(
                "Material '{}' is referenced by an active recipe",
                model.name
            )));
        }

        let mut active: material::ActiveModel = model.into();
        active.lifecycle = Set(Lifecycle::Archived.as_str().to_string());
        let updated = active
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        self.event_sender
            .send_or_log(Event::MaterialArchived {
                tenant_id,
                material_id,
            })
            .await;

        Ok(updated)
    }

    /// Restores an archived material.
    #[instrument(skip(self))]
    pub async fn restore_material(
        &self,
        tenant_id: Uuid,
        material_id: Uuid,
    ) -> Result<material::Model, ServiceError> {
        let model = self.get_material(tenant_id, material_id).await?;
        if !model.is_archived() {
            return Ok(model);
        }

        let mut active: material::ActiveModel = model.into();
        active.lifecycle = Set(Lifecycle::Active.as_str().to_string());
        let updated = active
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        self.event_sender
            .send_or_log(Event::MaterialRestored {
                tenant_id,
                material_id,
            })
            .await;

        Ok(updated)
    }

    async fn ensure_sku_available(
        &self,
        tenant_id: Uuid,
        sku: &str,
        exclude: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let mut query = MaterialEntity::find()
            .filter(material::Column::TenantId.eq(tenant_id))
            .filter(material::Column::Sku.eq(sku));
        if let Some(id) = exclude {
            query = query.filter(material::Column::Id.ne(id));
        }

        let taken = query
            .count(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;
        if taken > 0 {
            return Err(ServiceError::ValidationError(format!(
                "SKU '{}' is already in use",
                sku
            )));
        }
        Ok(())
    }
}
