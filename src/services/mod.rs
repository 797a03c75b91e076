// Stock ledger and master data
pub mod materials;
pub mod recipes;
pub mod stock_ledger;

// BOM calculation and production planning
pub mod batch_production;
pub mod inventory_calculation;

// Downstream alerting
pub mod stock_alerts;
