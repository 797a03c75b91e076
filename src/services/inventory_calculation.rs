use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    entities::{
        material::{self, Entity as MaterialEntity},
        product::{self, Entity as ProductEntity},
        recipe::{self, Entity as RecipeEntity},
        recipe_component::{self, Entity as RecipeComponentEntity},
    },
    errors::ServiceError,
};

/// Per-component availability breakdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentAvailability {
    pub material_id: Uuid,
    pub material_name: String,
    pub unit: String,
    pub quantity_required: Decimal,
    pub waste_percentage: Decimal,
    pub effective_quantity: Decimal,
    pub stock_quantity: Decimal,
    /// Whole units this component alone could support
    pub units_available: i64,
}

/// The component limiting the maximum producible quantity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BottleneckMaterial {
    pub material_id: Uuid,
    pub material_name: String,
}

/// Result of a single-product availability calculation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityResult {
    pub product_id: Uuid,
    pub available_quantity: i64,
    pub can_produce: bool,
    pub bottleneck_material: Option<BottleneckMaterial>,
    pub component_details: Vec<ComponentAvailability>,
    /// Set when the product has no usable recipe; a valid state, not an
    /// error
    pub message: Option<String>,
}

impl AvailabilityResult {
    fn empty(product_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            product_id,
            available_quantity: 0,
            can_produce: false,
            bottleneck_material: None,
            component_details: Vec::new(),
            message: Some(message.into()),
        }
    }
}

/// Result of a feasibility check against a requested quantity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeasibilityResult {
    pub product_id: Uuid,
    pub requested_quantity: i64,
    pub available_quantity: i64,
    pub shortage: i64,
    pub is_feasible: bool,
}

/// One material line of a requirements expansion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialRequirement {
    pub material_id: Uuid,
    pub material_name: String,
    pub unit: String,
    pub quantity_required: Decimal,
    pub waste_percentage: Decimal,
    pub effective_quantity: Decimal,
    pub total_required: Decimal,
    pub unit_cost: Decimal,
    pub total_cost: Decimal,
    pub stock_quantity: Decimal,
    pub sufficient: bool,
}

/// Full material expansion for producing a given quantity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialRequirements {
    pub product_id: Uuid,
    pub quantity: i64,
    pub requirements: Vec<MaterialRequirement>,
    pub total_cost: Decimal,
    pub cost_per_unit: Decimal,
}

/// Per-product entry of a bulk availability run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkAvailabilityEntry {
    pub product_id: Uuid,
    pub availability: Option<AvailabilityResult>,
    pub error: Option<String>,
}

/// A product that a low material would bottleneck
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffectedProduct {
    pub product_id: Uuid,
    pub product_name: String,
}

/// A low/critical material appearing in at least one active recipe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowStockMaterial {
    pub material_id: Uuid,
    pub material_name: String,
    pub sku: Option<String>,
    pub unit: String,
    pub stock_quantity: Decimal,
    pub reorder_level: Decimal,
    pub stock_status: String,
    pub affected_products: Vec<AffectedProduct>,
}

/// Loaded active-recipe context for one product
pub(crate) struct ActiveRecipeLines {
    pub product: product::Model,
    pub recipe: Option<recipe::Model>,
    pub lines: Vec<(recipe_component::Model, material::Model)>,
}

/// Single-product BOM availability, feasibility and cost calculations.
///
/// All reads are best-effort snapshots: concurrent ledger mutations may
/// land between the read and any subsequent commit, which re-validates
/// stock levels itself.
#[derive(Clone)]
pub struct InventoryCalculationService {
    db: Arc<DatabaseConnection>,
}

impl InventoryCalculationService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Computes how many whole units the current stock can produce and
    /// which component is the bottleneck.
    #[instrument(skip(self))]
    pub async fn calculate_available_quantity(
        &self,
        product_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<AvailabilityResult, ServiceError> {
        let context = self.load_active_recipe_lines(tenant_id, product_id).await?;

        if context.recipe.is_none() {
            return Ok(AvailabilityResult::empty(
                product_id,
                "No active recipe for this product",
            ));
        }
        if context.lines.is_empty() {
            return Ok(AvailabilityResult::empty(
                product_id,
                "Active recipe has no components",
            ));
        }

        let mut component_details = Vec::with_capacity(context.lines.len());
        let mut available_quantity = i64::MAX;
        let mut bottleneck: Option<BottleneckMaterial> = None;

        for (line, mat) in &context.lines {
            let effective_quantity = line.effective_quantity();
            let units_available = units_from_stock(mat.stock_quantity, effective_quantity);

            if units_available < available_quantity {
                available_quantity = units_available;
                bottleneck = Some(BottleneckMaterial {
                    material_id: mat.id,
                    material_name: mat.name.clone(),
                });
            }

            component_details.push(ComponentAvailability {
                material_id: mat.id,
                material_name: mat.name.clone(),
                unit: mat.unit.clone(),
                quantity_required: line.quantity_required,
                waste_percentage: line.waste_percentage,
                effective_quantity,
                stock_quantity: mat.stock_quantity,
                units_available,
            });
        }

        Ok(AvailabilityResult {
            product_id,
            available_quantity,
            can_produce: available_quantity > 0,
            bottleneck_material: bottleneck,
            component_details,
            message: None,
        })
    }

    /// Checks whether a requested quantity is currently producible.
    #[instrument(skip(self))]
    pub async fn check_production_feasibility(
        &self,
        product_id: Uuid,
        tenant_id: Uuid,
        requested_quantity: i64,
    ) -> Result<FeasibilityResult, ServiceError> {
        if requested_quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Requested quantity must be positive".to_string(),
            ));
        }

        let availability = self
            .calculate_available_quantity(product_id, tenant_id)
            .await?;
        let shortage = (requested_quantity - availability.available_quantity).max(0);

        Ok(FeasibilityResult {
            product_id,
            requested_quantity,
            available_quantity: availability.available_quantity,
            shortage,
            is_feasible: shortage == 0,
        })
    }

    /// Expands the active recipe into per-material requirements and costs
    /// for producing `quantity` units.
    #[instrument(skip(self))]
    pub async fn get_material_requirements(
        &self,
        product_id: Uuid,
        tenant_id: Uuid,
        quantity: i64,
    ) -> Result<MaterialRequirements, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Quantity must be positive".to_string(),
            ));
        }

        let context = self.load_active_recipe_lines(tenant_id, product_id).await?;
        let lines = match &context.recipe {
            Some(_) => &context.lines,
            None => {
                return Err(ServiceError::ConfigurationError(format!(
                    "Product '{}' has no active recipe",
                    context.product.name
                )))
            }
        };

        let quantity_dec = Decimal::from(quantity);
        let mut requirements = Vec::with_capacity(lines.len());
        let mut total_cost = Decimal::ZERO;

        for (line, mat) in lines {
            let effective_quantity = line.effective_quantity();
            let total_required = quantity_dec * effective_quantity;
            let line_cost = total_required * mat.unit_cost;
            total_cost += line_cost;

            requirements.push(MaterialRequirement {
                material_id: mat.id,
                material_name: mat.name.clone(),
                unit: mat.unit.clone(),
                quantity_required: line.quantity_required,
                waste_percentage: line.waste_percentage,
                effective_quantity,
                total_required,
                unit_cost: mat.unit_cost,
                total_cost: line_cost,
                stock_quantity: mat.stock_quantity,
                sufficient: total_required <= mat.stock_quantity,
            });
        }

        Ok(MaterialRequirements {
            product_id,
            quantity,
            requirements,
            total_cost,
            cost_per_unit: total_cost / quantity_dec,
        })
    }

    /// Runs the single-product calculation independently per product.
    ///
    /// Materials shared across the given products are NOT netted against
    /// each other here; that contention belongs to the multi-product batch
    /// planner. Structural failures are captured per entry so one bad
    /// product does not abort the rest.
    #[instrument(skip(self, product_ids))]
    pub async fn bulk_calculate_availability(
        &self,
        product_ids: Vec<Uuid>,
        tenant_id: Uuid,
    ) -> Result<Vec<BulkAvailabilityEntry>, ServiceError> {
        let mut entries = Vec::with_capacity(product_ids.len());
        for product_id in product_ids {
            match self
                .calculate_available_quantity(product_id, tenant_id)
                .await
            {
                Ok(availability) => entries.push(BulkAvailabilityEntry {
                    product_id,
                    availability: Some(availability),
                    error: None,
                }),
                Err(err) if err.is_client_error() => entries.push(BulkAvailabilityEntry {
                    product_id,
                    availability: None,
                    error: Some(err.to_string()),
                }),
                Err(err) => return Err(err),
            }
        }
        Ok(entries)
    }

    /// Materials at or below their reorder band that appear in at least
    /// one active recipe, with the products each would bottleneck.
    #[instrument(skip(self))]
    pub async fn get_low_stock_materials_in_active_recipes(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<LowStockMaterial>, ServiceError> {
        let materials = MaterialEntity::find()
            .filter(material::Column::TenantId.eq(tenant_id))
            .filter(material::Column::Lifecycle.eq(material::Lifecycle::Active.as_str()))
            .order_by_asc(material::Column::Name)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        let low: Vec<&material::Model> = materials
            .iter()
            .filter(|m| m.stock_status().is_alerting())
            .collect();
        if low.is_empty() {
            return Ok(Vec::new());
        }

        let low_ids: Vec<Uuid> = low.iter().map(|m| m.id).collect();
        let references = RecipeComponentEntity::find()
            .find_also_related(RecipeEntity)
            .filter(recipe_component::Column::MaterialId.is_in(low_ids))
            .filter(recipe::Column::TenantId.eq(tenant_id))
            .filter(recipe::Column::IsActive.eq(true))
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        // material -> products whose active recipe consumes it
        let mut products_by_material: BTreeMap<Uuid, BTreeSet<Uuid>> = BTreeMap::new();
        for (line, rec) in references {
            if let Some(rec) = rec {
                products_by_material
                    .entry(line.material_id)
                    .or_default()
                    .insert(rec.product_id);
            }
        }
        if products_by_material.is_empty() {
            return Ok(Vec::new());
        }

        let product_ids: Vec<Uuid> = products_by_material
            .values()
            .flatten()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let product_names: BTreeMap<Uuid, String> = ProductEntity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();

        let mut results = Vec::new();
        for mat in low {
            let Some(product_ids) = products_by_material.get(&mat.id) else {
                continue;
            };
            let affected_products = product_ids
                .iter()
                .map(|id| AffectedProduct {
                    product_id: *id,
                    product_name: product_names.get(id).cloned().unwrap_or_default(),
                })
                .collect();

            results.push(LowStockMaterial {
                material_id: mat.id,
                material_name: mat.name.clone(),
                sku: mat.sku.clone(),
                unit: mat.unit.clone(),
                stock_quantity: mat.stock_quantity,
                reorder_level: mat.reorder_level,
                stock_status: mat.stock_status().as_str().to_string(),
                affected_products,
            });
        }

        Ok(results)
    }

    /// Loads the product, its active recipe (if any) and the recipe's
    /// component lines joined with their materials.
    pub(crate) async fn load_active_recipe_lines(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
    ) -> Result<ActiveRecipeLines, ServiceError> {
        let product = ProductEntity::find()
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::TenantId.eq(tenant_id))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        if !product.is_bom_managed() {
            return Err(ServiceError::ConfigurationError(format!(
                "Product '{}' is not BOM-managed",
                product.name
            )));
        }

        let recipe = RecipeEntity::find()
            .filter(recipe::Column::TenantId.eq(tenant_id))
            .filter(recipe::Column::ProductId.eq(product_id))
            .filter(recipe::Column::IsActive.eq(true))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        let lines = match &recipe {
            Some(rec) => {
                let rows = RecipeComponentEntity::find()
                    .filter(recipe_component::Column::RecipeId.eq(rec.id))
                    .find_also_related(MaterialEntity)
                    .order_by_asc(recipe_component::Column::CreatedAt)
                    .all(self.db.as_ref())
                    .await
                    .map_err(ServiceError::db_error)?;

                let mut lines = Vec::with_capacity(rows.len());
                for (line, mat) in rows {
                    let mat = mat.ok_or_else(|| {
                        ServiceError::InternalError(format!(
                            "Component {} references missing material {}",
                            line.id, line.material_id
                        ))
                    })?;
                    lines.push((line, mat));
                }
                lines
            }
            None => Vec::new(),
        };

        Ok(ActiveRecipeLines {
            product,
            recipe,
            lines,
        })
    }
}

/// Whole units a stock level supports at the given per-unit consumption.
pub(crate) fn units_from_stock(stock_quantity: Decimal, effective_quantity: Decimal) -> i64 {
    if effective_quantity <= Decimal::ZERO {
        return 0;
    }
    (stock_quantity / effective_quantity)
        .floor()
        .to_i64()
        .unwrap_or(0)
}
