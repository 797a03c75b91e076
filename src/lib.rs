//! Batchline API Library
//!
//! Multi-tenant production planning backend. The core is the
//! Bill-of-Materials engine: availability and bottleneck calculation over a
//! product's active recipe, multi-product batch planning over shared
//! materials, and stock mutation through an immutable audit ledger.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod migrator;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use services::batch_production::BatchProductionService;
use services::inventory_calculation::InventoryCalculationService;
use services::materials::MaterialService;
use services::recipes::RecipeService;
use services::stock_alerts::StockAlertService;
use services::stock_ledger::StockLedgerService;

/// Container of the wired service instances. Construction order follows the
/// dependency chain: the ledger and calculation services are standalone,
/// batch planning reuses the calculation service, and alerting consumes
/// both the ledger history and the batch planner.
#[derive(Clone)]
pub struct AppServices {
    pub materials: Arc<MaterialService>,
    pub recipes: Arc<RecipeService>,
    pub stock_ledger: Arc<StockLedgerService>,
    pub inventory_calculation: Arc<InventoryCalculationService>,
    pub batch_production: Arc<BatchProductionService>,
    pub stock_alerts: Arc<StockAlertService>,
}

impl AppServices {
    pub fn build(
        db: Arc<DatabaseConnection>,
        event_sender: events::EventSender,
        config: &config::AppConfig,
    ) -> Self {
        let stock_ledger = Arc::new(StockLedgerService::new(db.clone(), event_sender.clone()));
        let inventory_calculation = Arc::new(InventoryCalculationService::new(db.clone()));
        let batch_production = Arc::new(BatchProductionService::new(
            inventory_calculation.clone(),
            stock_ledger.clone(),
            event_sender.clone(),
        ));
        let stock_alerts = Arc::new(StockAlertService::new(
            db.clone(),
            batch_production.clone(),
            event_sender.clone(),
            config.alerts.clone(),
        ));
        let materials = Arc::new(MaterialService::new(
            db.clone(),
            stock_ledger.clone(),
            event_sender.clone(),
        ));
        let recipes = Arc::new(RecipeService::new(db, event_sender));

        Self {
            materials,
            recipes,
            stock_ledger,
            inventory_calculation,
            batch_production,
            stock_alerts,
        }
    }
}

/// Application state handed to the (out-of-crate) transport layer.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let services = AppServices::build(db.clone(), event_sender.clone(), &config);
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}
