use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        material::{self, Entity as MaterialEntity, Lifecycle, Unit},
        product::{self, Entity as ProductEntity},
        recipe::{self, Entity as RecipeEntity},
        recipe_component::{self, Entity as RecipeComponentEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Component line enriched with its material master data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeComponentView {
    pub id: Uuid,
    pub material_id: Uuid,
    pub material_name: String,
    pub unit: String,
    pub quantity_required: Decimal,
    pub waste_percentage: Decimal,
    pub effective_quantity: Decimal,
    pub unit_cost: Decimal,
    pub component_cost: Decimal,
    pub notes: Option<String>,
}

/// Detailed recipe view including its component list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeDetail {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub yield_quantity: Decimal,
    pub yield_unit: String,
    pub is_active: bool,
    pub lifecycle: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub components: Vec<RecipeComponentView>,
    /// Material cost of one produced unit at current unit costs
    pub unit_cost: Decimal,
}

/// Input payload for one component line
#[derive(Debug, Clone)]
pub struct CreateRecipeComponentInput {
    pub material_id: Uuid,
    pub quantity_required: Decimal,
    pub waste_percentage: Decimal,
    pub notes: Option<String>,
}

/// Input payload for creating a recipe
#[derive(Debug, Clone)]
pub struct CreateRecipeInput {
    pub product_id: Uuid,
    pub name: String,
    pub yield_quantity: Decimal,
    pub yield_unit: Unit,
    pub components: Vec<CreateRecipeComponentInput>,
    /// Activate immediately, deactivating any sibling in the same call
    pub activate: bool,
}

/// Service managing recipes (the BOM definitions) and their components
#[derive(Clone)]
pub struct RecipeService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl RecipeService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Creates a recipe with its initial component list.
    #[instrument(skip(self, input))]
    pub async fn create_recipe(
        &self,
        tenant_id: Uuid,
        input: CreateRecipeInput,
    ) -> Result<recipe::Model, ServiceError> {
        if input.name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Recipe name must not be empty".to_string(),
            ));
        }
        if input.yield_quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Yield quantity must be positive".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for component in &input.components {
            validate_component_values(component.quantity_required, component.waste_percentage)?;
            if !seen.insert(component.material_id) {
                return Err(ServiceError::ValidationError(format!(
                    "Material {} appears more than once in the recipe",
                    component.material_id
                )));
            }
        }

        let product = ProductEntity::find()
            .filter(product::Column::Id.eq(input.product_id))
            .filter(product::Column::TenantId.eq(tenant_id))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;
        if !product.is_bom_managed() {
            return Err(ServiceError::ConfigurationError(format!(
                "Product '{}' is not BOM-managed",
                product.name
            )));
        }

        let created = self
            .db
            .transaction::<_, recipe::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let now = Utc::now();
                    let recipe_model = recipe::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        tenant_id: Set(tenant_id),
                        product_id: Set(input.product_id),
                        name: Set(input.name.clone()),
                        yield_quantity: Set(input.yield_quantity),
                        yield_unit: Set(input.yield_unit.as_str().to_string()),
                        is_active: Set(false),
                        lifecycle: Set(Lifecycle::Active.as_str().to_string()),
                        created_at: Set(now),
                        updated_at: Set(now),
                    };
                    let created = recipe_model
                        .insert(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                    for component in &input.components {
                        ensure_material_usable(txn, tenant_id, component.material_id).await?;
                        let component_model = recipe_component::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            recipe_id: Set(created.id),
                            material_id: Set(component.material_id),
                            quantity_required: Set(component.quantity_required),
                            waste_percentage: Set(component.waste_percentage),
                            notes: Set(component.notes.clone()),
                            created_at: Set(now),
                            updated_at: Set(now),
                        };
                        component_model
                            .insert(txn)
                            .await
                            .map_err(ServiceError::db_error)?;
                    }

                    if input.activate {
                        activate_within_txn(txn, tenant_id, &created).await
                    } else {
                        Ok(created)
                    }
                })
            })
            .await
            .map_err(unwrap_transaction_error)?;

        info!(%tenant_id, recipe_id = %created.id, active = created.is_active, "recipe created");

        self.event_sender
            .send_or_log(Event::RecipeCreated {
                tenant_id,
                recipe_id: created.id,
                product_id: created.product_id,
            })
            .await;
        if created.is_active {
            self.event_sender
                .send_or_log(Event::RecipeActivated {
                    tenant_id,
                    recipe_id: created.id,
                    product_id: created.product_id,
                })
                .await;
        }

        Ok(created)
    }

    /// Activates a recipe, deactivating every sibling recipe of the same
    /// product in the same database transaction.
    #[instrument(skip(self))]
    pub async fn activate_recipe(
        &self,
        tenant_id: Uuid,
        recipe_id: Uuid,
    ) -> Result<recipe::Model, ServiceError> {
        let updated = self
            .db
            .transaction::<_, recipe::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let model = find_recipe(txn, tenant_id, recipe_id).await?;
                    if model.lifecycle() == Some(Lifecycle::Archived) {
                        return Err(ServiceError::InvalidOperation(format!(
                            "Recipe '{}' is archived",
                            model.name
                        )));
                    }
                    activate_within_txn(txn, tenant_id, &model).await
                })
            })
            .await
            .map_err(unwrap_transaction_error)?;

        info!(%tenant_id, %recipe_id, product_id = %updated.product_id, "recipe activated");

        self.event_sender
            .send_or_log(Event::RecipeActivated {
                tenant_id,
                recipe_id,
                product_id: updated.product_id,
            })
            .await;

        Ok(updated)
    }

    /// Deactivates a recipe without activating a replacement.
    #[instrument(skip(self))]
    pub async fn deactivate_recipe(
        &self,
        tenant_id: Uuid,
        recipe_id: Uuid,
    ) -> Result<recipe::Model, ServiceError> {
        let model = self.get_recipe_model(tenant_id, recipe_id).await?;
        if !model.is_active {
            return Ok(model);
        }
        let mut active: recipe::ActiveModel = model.into();
        active.is_active = Set(false);
        active
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Archives a recipe; an archived recipe is never active.
    #[instrument(skip(self))]
    pub async fn archive_recipe(
        &self,
        tenant_id: Uuid,
        recipe_id: Uuid,
    ) -> Result<recipe::Model, ServiceError> {
        let model = self.get_recipe_model(tenant_id, recipe_id).await?;
        if model.lifecycle() == Some(Lifecycle::Archived) {
            return Ok(model);
        }
        let mut active: recipe::ActiveModel = model.into();
        active.is_active = Set(false);
        active.lifecycle = Set(Lifecycle::Archived.as_str().to_string());
        active
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Restores an archived recipe in deactivated state.
    #[instrument(skip(self))]
    pub async fn restore_recipe(
        &self,
        tenant_id: Uuid,
        recipe_id: Uuid,
    ) -> Result<recipe::Model, ServiceError> {
        let model = self.get_recipe_model(tenant_id, recipe_id).await?;
        if model.lifecycle() != Some(Lifecycle::Archived) {
            return Ok(model);
        }
        let mut active: recipe::ActiveModel = model.into();
        active.lifecycle = Set(Lifecycle::Active.as_str().to_string());
        active
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Fetches a recipe with enriched component lines.
    #[instrument(skip(self))]
    pub async fn get_recipe(
        &self,
        tenant_id: Uuid,
        recipe_id: Uuid,
    ) -> Result<RecipeDetail, ServiceError> {
        let model = self.get_recipe_model(tenant_id, recipe_id).await?;
        self.map_recipe_to_detail(model).await
    }

    /// Lists recipes of one product, newest first.
    #[instrument(skip(self))]
    pub async fn list_recipes_for_product(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<recipe::Model>, u64), ServiceError> {
        let limit = limit.max(1);
        let page = page.max(1) - 1;
        let paginator = RecipeEntity::find()
            .filter(recipe::Column::TenantId.eq(tenant_id))
            .filter(recipe::Column::ProductId.eq(product_id))
            .order_by_desc(recipe::Column::CreatedAt)
            .paginate(self.db.as_ref(), limit);

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let models = paginator
            .fetch_page(page)
            .await
            .map_err(ServiceError::db_error)?;

        Ok((models, total))
    }

    /// Adds a component line to a recipe.
    #[instrument(skip(self, component))]
    pub async fn add_component(
        &self,
        tenant_id: Uuid,
        recipe_id: Uuid,
        component: CreateRecipeComponentInput,
    ) -> Result<recipe_component::Model, ServiceError> {
        validate_component_values(component.quantity_required, component.waste_percentage)?;
        let _recipe = self.get_recipe_model(tenant_id, recipe_id).await?;

        let duplicate = RecipeComponentEntity::find()
            .filter(recipe_component::Column::RecipeId.eq(recipe_id))
            .filter(recipe_component::Column::MaterialId.eq(component.material_id))
            .count(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;
        if duplicate > 0 {
            return Err(ServiceError::ValidationError(format!(
                "Material {} is already part of the recipe",
                component.material_id
            )));
        }

        let material = MaterialEntity::find()
            .filter(material::Column::Id.eq(component.material_id))
            .filter(material::Column::TenantId.eq(tenant_id))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Material {} not found", component.material_id))
            })?;
        if material.is_archived() {
            return Err(ServiceError::InvalidOperation(format!(
                "Material '{}' is archived",
                material.name
            )));
        }

        let now = Utc::now();
        let model = recipe_component::ActiveModel {
            id: Set(Uuid::new_v4()),
            recipe_id: Set(recipe_id),
            material_id: Set(component.material_id),
            quantity_required: Set(component.quantity_required),
            waste_percentage: Set(component.waste_percentage),
            notes: Set(component.notes),
            created_at: Set(now),
            updated_at: Set(now),
        };

        model
            .insert(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Updates the quantities of one component line.
    #[instrument(skip(self))]
    pub async fn update_component(
        &self,
        tenant_id: Uuid,
        recipe_id: Uuid,
        component_id: Uuid,
        quantity_required: Decimal,
        waste_percentage: Decimal,
    ) -> Result<recipe_component::Model, ServiceError> {
        validate_component_values(quantity_required, waste_percentage)?;
        let _recipe = self.get_recipe_model(tenant_id, recipe_id).await?;

        let component = RecipeComponentEntity::find_by_id(component_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Component {} not found", component_id))
            })?;
        if component.recipe_id != recipe_id {
            return Err(ServiceError::InvalidOperation(
                "Component does not belong to recipe".to_string(),
            ));
        }

        let mut active: recipe_component::ActiveModel = component.into();
        active.quantity_required = Set(quantity_required);
        active.waste_percentage = Set(waste_percentage);
        active
            .update(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Removes a component line from a recipe.
    #[instrument(skip(self))]
    pub async fn remove_component(
        &self,
        tenant_id: Uuid,
        recipe_id: Uuid,
        component_id: Uuid,
    ) -> Result<(), ServiceError> {
        let _recipe = self.get_recipe_model(tenant_id, recipe_id).await?;

        let component = RecipeComponentEntity::find_by_id(component_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        let component = match component {
            Some(component) if component.recipe_id == recipe_id => component,
            Some(_) => {
                return Err(ServiceError::InvalidOperation(
                    "Component does not belong to recipe".to_string(),
                ))
            }
            None => {
                return Err(ServiceError::NotFound(format!(
                    "Component {} not found",
                    component_id
                )))
            }
        };

        let active: recipe_component::ActiveModel = component.into();
        active
            .delete(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        Ok(())
    }

    async fn get_recipe_model(
        &self,
        tenant_id: Uuid,
        recipe_id: Uuid,
    ) -> Result<recipe::Model, ServiceError> {
        RecipeEntity::find()
            .filter(recipe::Column::Id.eq(recipe_id))
            .filter(recipe::Column::TenantId.eq(tenant_id))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Recipe {} not found", recipe_id)))
    }

    async fn map_recipe_to_detail(
        &self,
        model: recipe::Model,
    ) -> Result<RecipeDetail, ServiceError> {
        let lines = RecipeComponentEntity::find()
            .filter(recipe_component::Column::RecipeId.eq(model.id))
            .find_also_related(MaterialEntity)
            .order_by_asc(recipe_component::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        let mut components = Vec::with_capacity(lines.len());
        let mut unit_cost = Decimal::ZERO;
        for (line, material) in lines {
            let material = material.ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "Component {} references missing material {}",
                    line.id, line.material_id
                ))
            })?;
            let effective_quantity = line.effective_quantity();
            let component_cost = line.component_cost(material.unit_cost);
            unit_cost += component_cost;
            components.push(RecipeComponentView {
                id: line.id,
                material_id: material.id,
                material_name: material.name,
                unit: material.unit,
                quantity_required: line.quantity_required,
                waste_percentage: line.waste_percentage,
                effective_quantity,
                unit_cost: material.unit_cost,
                component_cost,
                notes: line.notes,
            });
        }

        Ok(RecipeDetail {
            id: model.id,
            tenant_id: model.tenant_id,
            product_id: model.product_id,
            name: model.name,
            yield_quantity: model.yield_quantity,
            yield_unit: model.yield_unit,
            is_active: model.is_active,
            lifecycle: model.lifecycle,
            created_at: model.created_at,
            updated_at: model.updated_at,
            components,
            unit_cost,
        })
    }
}

fn validate_component_values(
    quantity_required: Decimal,
    waste_percentage: Decimal,
) -> Result<(), ServiceError> {
    if quantity_required <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Component quantity must be positive".to_string(),
        ));
    }
    if waste_percentage < Decimal::ZERO || waste_percentage >= Decimal::ONE_HUNDRED {
        return Err(ServiceError::ValidationError(
            "Waste percentage must be in [0, 100)".to_string(),
        ));
    }
    Ok(())
}

async fn find_recipe(
    txn: &DatabaseTransaction,
    tenant_id: Uuid,
    recipe_id: Uuid,
) -> Result<recipe::Model, ServiceError> {
    RecipeEntity::find()
        .filter(recipe::Column::Id.eq(recipe_id))
        .filter(recipe::Column::TenantId.eq(tenant_id))
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Recipe {} not found", recipe_id)))
}

async fn ensure_material_usable(
    txn: &DatabaseTransaction,
    tenant_id: Uuid,
    material_id: Uuid,
) -> Result<(), ServiceError> {
    let material = MaterialEntity::find()
        .filter(material::Column::Id.eq(material_id))
        .filter(material::Column::TenantId.eq(tenant_id))
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Material {} not found", material_id)))?;
    if material.is_archived() {
        return Err(ServiceError::InvalidOperation(format!(
            "Material '{}' is archived",
            material.name
        )));
    }
    Ok(())
}

/// Flips every sibling recipe of the product off and the given one on.
/// Runs inside the caller's transaction so the one-active-recipe invariant
/// holds at every commit point.
async fn activate_within_txn(
    txn: &DatabaseTransaction,
    tenant_id: Uuid,
    model: &recipe::Model,
) -> Result<recipe::Model, ServiceError> {
    RecipeEntity::update_many()
        .col_expr(recipe::Column::IsActive, Expr::value(false))
        .filter(recipe::Column::TenantId.eq(tenant_id))
        .filter(recipe::Column::ProductId.eq(model.product_id))
        .filter(recipe::Column::IsActive.eq(true))
        .exec(txn)
        .await
        .map_err(ServiceError::db_error)?;

    let mut active: recipe::ActiveModel = model.clone().into();
    active.is_active = Set(true);
    active.update(txn).await.map_err(ServiceError::db_error)
}

fn unwrap_transaction_error(err: TransactionError<ServiceError>) -> ServiceError {
    match err {
        TransactionError::Transaction(service_err) => service_err,
        TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
    }
}
