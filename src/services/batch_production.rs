use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::inventory_transaction,
    errors::ServiceError,
    events::{Event, EventSender},
    services::inventory_calculation::{
        BottleneckMaterial, InventoryCalculationService, MaterialRequirement,
    },
    services::stock_ledger::{ProductionLine, StockLedgerService},
};

/// One component the current stock cannot cover
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchShortage {
    pub material_id: Uuid,
    pub material_name: String,
    pub total_required: Decimal,
    pub stock_quantity: Decimal,
    pub shortage: Decimal,
}

/// Requirements expansion for one batch, with shortages called out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequirements {
    pub product_id: Uuid,
    pub quantity: i64,
    pub requirements: Vec<MaterialRequirement>,
    pub shortages: Vec<BatchShortage>,
    pub total_cost: Decimal,
    pub cost_per_unit: Decimal,
    pub can_produce: bool,
}

/// Planning primitive: the largest producible run and useful subdivisions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPlan {
    pub product_id: Uuid,
    pub maximum_producible: i64,
    /// Divisors of the maximum — the run sizes that consume it evenly
    pub suggested_batches: Vec<i64>,
    pub bottleneck_material: Option<BottleneckMaterial>,
    pub recommendation: String,
}

/// One (product, quantity) entry of a multi-product plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionPlanEntry {
    pub product_id: Uuid,
    pub quantity: i64,
}

/// Per-product outcome inside a multi-product plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductBatchResult {
    pub product_id: Uuid,
    pub quantity: i64,
    pub requirements: Option<Vec<MaterialRequirement>>,
    pub error: Option<String>,
}

/// Summed requirement for one material shared across the plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedMaterialRequirement {
    pub material_id: Uuid,
    pub material_name: String,
    pub unit: String,
    pub total_required: Decimal,
    pub stock_quantity: Decimal,
    pub sufficient: bool,
    pub shortage: Decimal,
}

/// Result of planning several products against shared stock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiProductPlan {
    pub total_products: usize,
    pub product_results: Vec<ProductBatchResult>,
    pub aggregated_material_requirements: Vec<AggregatedMaterialRequirement>,
    pub feasible: bool,
}

/// Before/after stock level of one material in a simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialChange {
    pub material_id: Uuid,
    pub material_name: String,
    pub quantity_before: Decimal,
    pub quantity_change: Decimal,
    pub quantity_after: Decimal,
    pub sufficient: bool,
}

/// Dry-run of a production commit; nothing is persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub product_id: Uuid,
    pub quantity: i64,
    pub material_changes: Vec<MaterialChange>,
    pub production_cost: Decimal,
    pub can_commit: bool,
}

/// Outcome of a committed production run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionCommit {
    pub production_run_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i64,
    pub production_cost: Decimal,
    pub transactions: Vec<inventory_transaction::Model>,
}

/// Batch sizing, multi-product planning and production commits.
///
/// Reuses the single-product bottleneck engine per product; the
/// multi-product path then sums requirements per shared material. When a
/// shared material cannot cover every product no allocation between the
/// competing products is attempted — the plan is reported infeasible with
/// the per-material shortfall and the caller decides.
#[derive(Clone)]
pub struct BatchProductionService {
    calculations: Arc<InventoryCalculationService>,
    stock_ledger: Arc<StockLedgerService>,
    event_sender: EventSender,
}

impl BatchProductionService {
    pub fn new(
        calculations: Arc<InventoryCalculationService>,
        stock_ledger: Arc<StockLedgerService>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            calculations,
            stock_ledger,
            event_sender,
        }
    }

    /// Requirements for one batch with explicit shortages.
    #[instrument(skip(self))]
    pub async fn calculate_batch_requirements(
        &self,
        product_id: Uuid,
        tenant_id: Uuid,
        quantity: i64,
    ) -> Result<BatchRequirements, ServiceError> {
        let requirements = self
            .calculations
            .get_material_requirements(product_id, tenant_id, quantity)
            .await?;

        let shortages: Vec<BatchShortage> = requirements
            .requirements
            .iter()
            .filter(|r| !r.sufficient)
            .map(|r| BatchShortage {
                material_id: r.material_id,
                material_name: r.material_name.clone(),
                total_required: r.total_required,
                stock_quantity: r.stock_quantity,
                shortage: r.total_required - r.stock_quantity,
            })
            .collect();

        Ok(BatchRequirements {
            product_id,
            quantity,
            can_produce: shortages.is_empty(),
            shortages,
            total_cost: requirements.total_cost,
            cost_per_unit: requirements.cost_per_unit,
            requirements: requirements.requirements,
        })
    }

    /// The largest batch current stock supports, with useful subdivisions.
    #[instrument(skip(self))]
    pub async fn calculate_optimal_batch_size(
        &self,
        product_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<BatchPlan, ServiceError> {
        let availability = self
            .calculations
            .calculate_available_quantity(product_id, tenant_id)
            .await?;
        if let Some(message) = availability.message {
            return Err(ServiceError::ConfigurationError(message));
        }

        let maximum_producible = availability.available_quantity;
        let recommendation = match (&availability.bottleneck_material, maximum_producible) {
            (Some(bottleneck), 0) => format!(
                "Cannot produce: '{}' is out of stock for this recipe",
                bottleneck.material_name
            ),
            (Some(bottleneck), n) if n < 10 => format!(
                "Stock supports only {} units; restocking '{}' would raise the limit",
                n, bottleneck.material_name
            ),
            (_, n) => format!("Stock supports up to {} units in a single run", n),
        };

        Ok(BatchPlan {
            product_id,
            maximum_producible,
            suggested_batches: divisors(maximum_producible),
            bottleneck_material: availability.bottleneck_material,
            recommendation,
        })
    }

    /// Plans several products against shared stock by summing the
    /// per-material requirements across all entries.
    #[instrument(skip(self, production_plan))]
    pub async fn calculate_multi_product_batch(
        &self,
        production_plan: Vec<ProductionPlanEntry>,
        tenant_id: Uuid,
    ) -> Result<MultiProductPlan, ServiceError> {
        if production_plan.is_empty() {
            return Err(ServiceError::ValidationError(
                "Production plan must contain at least one product".to_string(),
            ));
        }

        let mut product_results = Vec::with_capacity(production_plan.len());
        // material -> (name, unit, summed requirement, stock snapshot)
        let mut aggregated: BTreeMap<Uuid, (String, String, Decimal, Decimal)> = BTreeMap::new();
        let mut failed_entries = 0usize;

        for entry in &production_plan {
            let result = self
                .calculations
                .get_material_requirements(entry.product_id, tenant_id, entry.quantity)
                .await;

            match result {
                Ok(requirements) => {
                    for requirement in &requirements.requirements {
                        let slot = aggregated.entry(requirement.material_id).or_insert_with(|| {
                            (
                                requirement.material_name.clone(),
                                requirement.unit.clone(),
                                Decimal::ZERO,
                                requirement.stock_quantity,
                            )
                        });
                        slot.2 += requirement.total_required;
                    }
                    product_results.push(ProductBatchResult {
                        product_id: entry.product_id,
                        quantity: entry.quantity,
                        requirements: Some(requirements.requirements),
                        error: None,
                    });
                }
                Err(err) if err.is_client_error() => {
                    failed_entries += 1;
                    product_results.push(ProductBatchResult {
                        product_id: entry.product_id,
                        quantity: entry.quantity,
                        requirements: None,
                        error: Some(err.to_string()),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        let aggregated_material_requirements: Vec<AggregatedMaterialRequirement> = aggregated
            .into_iter()
            .map(
                |(material_id, (material_name, unit, total_required, stock_quantity))| {
                    let sufficient = total_required <= stock_quantity;
                    AggregatedMaterialRequirement {
                        material_id,
                        material_name,
                        unit,
                        total_required,
                        stock_quantity,
                        sufficient,
                        shortage: (total_required - stock_quantity).max(Decimal::ZERO),
                    }
                },
            )
            .collect();

        // An entry that failed structurally has unknown requirements, so the
        // plan as a whole cannot be called feasible.
        let feasible = failed_entries == 0
            && aggregated_material_requirements
                .iter()
                .all(|requirement| requirement.sufficient);

        Ok(MultiProductPlan {
            total_products: production_plan.len(),
            product_results,
            aggregated_material_requirements,
            feasible,
        })
    }

    /// Computes the post-production stock picture without persisting it.
    #[instrument(skip(self))]
    pub async fn simulate_production(
        &self,
        product_id: Uuid,
        tenant_id: Uuid,
        quantity: i64,
    ) -> Result<SimulationResult, ServiceError> {
        let requirements = self
            .calculations
            .get_material_requirements(product_id, tenant_id, quantity)
            .await?;

        let material_changes: Vec<MaterialChange> = requirements
            .requirements
            .iter()
            .map(|r| {
                let quantity_after = r.stock_quantity - r.total_required;
                MaterialChange {
                    material_id: r.material_id,
                    material_name: r.material_name.clone(),
                    quantity_before: r.stock_quantity,
                    quantity_change: -r.total_required,
                    quantity_after,
                    sufficient: quantity_after >= Decimal::ZERO,
                }
            })
            .collect();

        let can_commit = material_changes.iter().all(|c| c.sufficient);

        Ok(SimulationResult {
            product_id,
            quantity,
            material_changes,
            production_cost: requirements.total_cost,
            can_commit,
        })
    }

    /// Commits a production run: every component deduction goes through the
    /// ledger in one atomic unit tagged with a generated run id.
    #[instrument(skip(self))]
    pub async fn commit_production(
        &self,
        product_id: Uuid,
        tenant_id: Uuid,
        quantity: i64,
        created_by: Uuid,
    ) -> Result<ProductionCommit, ServiceError> {
        let simulation = self
            .simulate_production(product_id, tenant_id, quantity)
            .await?;
        if !simulation.can_commit {
            let short: Vec<String> = simulation
                .material_changes
                .iter()
                .filter(|c| !c.sufficient)
                .map(|c| c.material_name.clone())
                .collect();
            return Err(ServiceError::InsufficientStock(format!(
                "Cannot produce {} units: insufficient stock of {}",
                quantity,
                short.join(", ")
            )));
        }

        let production_run_id = Uuid::new_v4();
        let lines: Vec<ProductionLine> = simulation
            .material_changes
            .iter()
            .map(|c| ProductionLine {
                material_id: c.material_id,
                quantity: -c.quantity_change,
            })
            .collect();

        let transactions = self
            .stock_ledger
            .commit_production(
                tenant_id,
                lines,
                production_run_id,
                format!("Production run of {} units", quantity),
                created_by,
            )
            .await?;

        info!(
            %tenant_id,
            %product_id,
            %production_run_id,
            quantity,
            "production committed"
        );

        self.event_sender
            .send_or_log(Event::ProductionCommitted {
                tenant_id,
                product_id,
                quantity: Decimal::from(quantity),
                production_run_id,
            })
            .await;

        Ok(ProductionCommit {
            production_run_id,
            product_id,
            quantity,
            production_cost: simulation.production_cost,
            transactions,
        })
    }
}

/// Ascending divisors of `n`; empty for a zero maximum.
fn divisors(n: i64) -> Vec<i64> {
    if n <= 0 {
        return Vec::new();
    }
    let mut result = Vec::new();
    let mut i = 1;
    while i * i <= n {
        if n % i == 0 {
            result.push(i);
            if i != n / i {
                result.push(n / i);
            }
        }
        i += 1;
    }
    result.sort_unstable();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divisors_of_twelve() {
        assert_eq!(divisors(12), vec![1, 2, 3, 4, 6, 12]);
    }

    #[test]
    fn divisors_of_zero_and_primes() {
        assert!(divisors(0).is_empty());
        assert_eq!(divisors(7), vec![1, 7]);
    }
}
