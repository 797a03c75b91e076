#![allow(dead_code)]

use std::sync::Arc;

use batchline_api::{
    config::AppConfig,
    db,
    entities::{
        material::{self, Lifecycle, Unit},
        product::{self, InventoryMode},
        recipe, recipe_component,
    },
    events::{self, Event},
    AppState,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Test harness: application state over a fresh in-memory SQLite database.
///
/// The pool is pinned to a single connection so every query sees the same
/// in-memory database.
pub struct TestApp {
    pub state: AppState,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    // Keeps the event channel open for the lifetime of the test
    _event_rx: mpsc::Receiver<Event>,
}

impl TestApp {
    pub async fn new() -> Self {
        batchline_api::logging::init_tracing("warn", false);

        let mut cfg = AppConfig::new("sqlite::memory:", "test");
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.auto_migrate = true;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");

        let (event_sender, event_rx) = events::channel(256);
        let state = AppState::new(Arc::new(pool), cfg, event_sender);

        Self {
            state,
            tenant_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            _event_rx: event_rx,
        }
    }

    /// Seeds a material directly at the given stock level.
    pub async fn seed_material(
        &self,
        name: &str,
        unit: Unit,
        stock_quantity: Decimal,
        reorder_level: Decimal,
        unit_cost: Decimal,
    ) -> material::Model {
        self.seed_material_for_tenant(
            self.tenant_id,
            name,
            unit,
            stock_quantity,
            reorder_level,
            unit_cost,
        )
        .await
    }

    pub async fn seed_material_for_tenant(
        &self,
        tenant_id: Uuid,
        name: &str,
        unit: Unit,
        stock_quantity: Decimal,
        reorder_level: Decimal,
        unit_cost: Decimal,
    ) -> material::Model {
        let now = Utc::now();
        material::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            name: Set(name.to_string()),
            sku: Set(None),
            unit: Set(unit.as_str().to_string()),
            stock_quantity: Set(stock_quantity),
            reorder_level: Set(reorder_level),
            unit_cost: Set(unit_cost),
            lifecycle: Set(Lifecycle::Active.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("failed to seed material")
    }

    /// Seeds a product, BOM-managed unless stated otherwise.
    pub async fn seed_product(&self, name: &str, inventory_mode: InventoryMode) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(self.tenant_id),
            name: Set(name.to_string()),
            inventory_mode: Set(inventory_mode.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("failed to seed product")
    }

    /// Seeds a recipe with `(material_id, quantity_required, waste_pct)`
    /// component lines.
    pub async fn seed_recipe(
        &self,
        product_id: Uuid,
        name: &str,
        is_active: bool,
        components: &[(Uuid, Decimal, Decimal)],
    ) -> recipe::Model {
        let now = Utc::now();
        let recipe = recipe::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(self.tenant_id),
            product_id: Set(product_id),
            name: Set(name.to_string()),
            yield_quantity: Set(Decimal::ONE),
            yield_unit: Set(Unit::Piece.as_str().to_string()),
            is_active: Set(is_active),
            lifecycle: Set(Lifecycle::Active.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("failed to seed recipe");

        for (index, (material_id, quantity_required, waste_percentage)) in
            components.iter().enumerate()
        {
            // distinct timestamps keep the component ordering deterministic
            let line_time = now + chrono::Duration::milliseconds(index as i64);
            recipe_component::ActiveModel {
                id: Set(Uuid::new_v4()),
                recipe_id: Set(recipe.id),
                material_id: Set(*material_id),
                quantity_required: Set(*quantity_required),
                waste_percentage: Set(*waste_percentage),
                notes: Set(None),
                created_at: Set(line_time),
                updated_at: Set(line_time),
            }
            .insert(self.state.db.as_ref())
            .await
            .expect("failed to seed recipe component");
        }

        recipe
    }
}
