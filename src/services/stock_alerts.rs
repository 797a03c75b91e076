use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    config::AlertConfig,
    entities::{
        inventory_transaction::{self, Entity as InventoryTransactionEntity, TransactionType},
        material::{self, Entity as MaterialEntity, Lifecycle},
        stock_alert::{self, AlertSeverity, AlertStatus, Entity as StockAlertEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::batch_production::{BatchProductionService, MultiProductPlan, ProductionPlanEntry},
};

/// One currently-alerting material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveAlertEntry {
    pub material_id: Uuid,
    pub material_name: String,
    pub sku: Option<String>,
    pub unit: String,
    pub stock_quantity: Decimal,
    pub reorder_level: Decimal,
    pub severity: String,
}

/// Snapshot of everything alerting right now, grouped by severity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveAlertsSummary {
    pub total: usize,
    pub out_of_stock_count: usize,
    pub critical_count: usize,
    pub low_count: usize,
    pub alerts: Vec<ActiveAlertEntry>,
}

/// Counts of what a scan changed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertScanOutcome {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// A material trending toward stockout within the horizon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictiveAlert {
    pub material_id: Uuid,
    pub material_name: String,
    pub unit: String,
    pub stock_quantity: Decimal,
    pub daily_consumption: Decimal,
    pub days_until_stockout: Decimal,
    pub projected_stockout_at: DateTime<Utc>,
}

/// Suggested purchase for a material trending toward shortage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderRecommendation {
    pub material_id: Uuid,
    pub material_name: String,
    pub unit: String,
    pub stock_quantity: Decimal,
    pub reorder_level: Decimal,
    pub recommended_quantity: Decimal,
    pub estimated_cost: Decimal,
    pub rationale: String,
}

/// Severity classification and alert lifecycle over the material data, plus
/// predictive scans fed by the ledger's deduction history.
#[derive(Clone)]
pub struct StockAlertService {
    db: Arc<DatabaseConnection>,
    batch_production: Arc<BatchProductionService>,
    event_sender: EventSender,
    config: AlertConfig,
}

impl StockAlertService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        batch_production: Arc<BatchProductionService>,
        event_sender: EventSender,
        config: AlertConfig,
    ) -> Self {
        Self {
            db,
            batch_production,
            event_sender,
            config,
        }
    }

    /// Classifies every active material and returns the alerting ones.
    #[instrument(skip(self))]
    pub async fn get_active_alerts(
        &self,
        tenant_id: Uuid,
    ) -> Result<ActiveAlertsSummary, ServiceError> {
        let materials = self.active_materials(tenant_id).await?;

        let mut summary = ActiveAlertsSummary {
            total: 0,
            out_of_stock_count: 0,
            critical_count: 0,
            low_count: 0,
            alerts: Vec::new(),
        };

        for mat in materials {
            let status = mat.stock_status();
            let Some(severity) = AlertSeverity::from_status(status) else {
                continue;
            };
            match severity {
                AlertSeverity::OutOfStock => summary.out_of_stock_count += 1,
                AlertSeverity::Critical => summary.critical_count += 1,
                AlertSeverity::Low => summary.low_count += 1,
            }
            summary.alerts.push(ActiveAlertEntry {
                material_id: mat.id,
                material_name: mat.name,
                sku: mat.sku,
                unit: mat.unit,
                stock_quantity: mat.stock_quantity,
                reorder_level: mat.reorder_level,
                severity: severity.as_str().to_string(),
            });
        }
        summary.total = summary.alerts.len();

        Ok(summary)
    }

    /// Scan entry point invoked per tenant by the external scheduler.
    ///
    /// Re-detection against a still-actionable alert updates it in place;
    /// a condition recurring after the previous alert was resolved or
    /// dismissed opens a new alert row. Recovery never auto-resolves:
    /// status transitions stay user-driven.
    #[instrument(skip(self))]
    pub async fn scan_tenant(&self, tenant_id: Uuid) -> Result<AlertScanOutcome, ServiceError> {
        let materials = self.active_materials(tenant_id).await?;
        let mut outcome = AlertScanOutcome::default();

        for mat in materials {
            let Some(severity) = AlertSeverity::from_status(mat.stock_status()) else {
                continue;
            };

            let existing = StockAlertEntity::find()
                .filter(stock_alert::Column::TenantId.eq(tenant_id))
                .filter(stock_alert::Column::MaterialId.eq(mat.id))
                .filter(
                    stock_alert::Column::Status.is_in([
                        AlertStatus::Pending.as_str(),
                        AlertStatus::Acknowledged.as_str(),
                    ]),
                )
                .order_by_desc(stock_alert::Column::CreatedAt)
                .one(self.db.as_ref())
                .await
                .map_err(ServiceError::db_error)?;

            match existing {
                Some(alert) => {
                    let same_snapshot = alert.severity() == Some(severity)
                        && alert.stock_quantity == mat.stock_quantity
                        && alert.reorder_level == mat.reorder_level;
                    if same_snapshot {
                        outcome.unchanged += 1;
                        continue;
                    }

                    let mut active: stock_alert::ActiveModel = alert.into();
                    active.severity = Set(severity.as_str().to_string());
                    active.stock_quantity = Set(mat.stock_quantity);
                    active.reorder_level = Set(mat.reorder_level);
                    active.message = Set(Some(alert_message(&mat, severity)));
                    active
                        .update(self.db.as_ref())
                        .await
                        .map_err(ServiceError::db_error)?;
                    outcome.updated += 1;
                }
                None => {
                    let now = Utc::now();
                    let model = stock_alert::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        tenant_id: Set(tenant_id),
                        material_id: Set(mat.id),
                        product_id: Set(None),
                        severity: Set(severity.as_str().to_string()),
                        status: Set(AlertStatus::Pending.as_str().to_string()),
                        stock_quantity: Set(mat.stock_quantity),
                        reorder_level: Set(mat.reorder_level),
                        message: Set(Some(alert_message(&mat, severity))),
                        acknowledged_by: Set(None),
                        acknowledged_at: Set(None),
                        resolved_at: Set(None),
                        created_at: Set(now),
                        updated_at: Set(now),
                    };
                    let created = model
                        .insert(self.db.as_ref())
                        .await
                        .map_err(ServiceError::db_error)?;
                    outcome.created += 1;

                    self.event_sender
                        .send_or_log(Event::StockAlertRaised {
                            tenant_id,
                            alert_id: created.id,
                            material_id: mat.id,
                            severity: severity.as_str().to_string(),
                        })
                        .await;
                }
            }
        }

        info!(
            %tenant_id,
            created = outcome.created,
            updated = outcome.updated,
            unchanged = outcome.unchanged,
            "stock alert scan finished"
        );

        Ok(outcome)
    }

    /// Marks a pending alert as seen. Idempotent for already-acknowledged
    /// alerts.
    #[instrument(skip(self))]
    pub async fn acknowledge_alert(
        &self,
        tenant_id: Uuid,
        alert_id: Uuid,
        acting_user: Uuid,
    ) -> Result<stock_alert::Model, ServiceError> {
        let alert = self.get_alert(tenant_id, alert_id).await?;
        match self.alert_status(&alert)? {
            AlertStatus::Acknowledged => Ok(alert),
            AlertStatus::Pending => {
                let now = Utc::now();
                let mut active: stock_alert::ActiveModel = alert.into();
                active.status = Set(AlertStatus::Acknowledged.as_str().to_string());
                active.acknowledged_by = Set(Some(acting_user));
                active.acknowledged_at = Set(Some(now));
                let updated = active
                    .update(self.db.as_ref())
                    .await
                    .map_err(ServiceError::db_error)?;
                self.emit_status_change(tenant_id, &updated).await;
                Ok(updated)
            }
            status => Err(illegal_transition(status, AlertStatus::Acknowledged)),
        }
    }

    /// Closes an alert whose condition was handled. Idempotent for
    /// already-resolved alerts.
    #[instrument(skip(self))]
    pub async fn resolve_alert(
        &self,
        tenant_id: Uuid,
        alert_id: Uuid,
        _acting_user: Uuid,
    ) -> Result<stock_alert::Model, ServiceError> {
        let alert = self.get_alert(tenant_id, alert_id).await?;
        match self.alert_status(&alert)? {
            AlertStatus::Resolved => Ok(alert),
            AlertStatus::Pending | AlertStatus::Acknowledged => {
                let now = Utc::now();
                let mut active: stock_alert::ActiveModel = alert.into();
                active.status = Set(AlertStatus::Resolved.as_str().to_string());
                active.resolved_at = Set(Some(now));
                let updated = active
                    .update(self.db.as_ref())
                    .await
                    .map_err(ServiceError::db_error)?;
                self.emit_status_change(tenant_id, &updated).await;
                Ok(updated)
            }
            status => Err(illegal_transition(status, AlertStatus::Resolved)),
        }
    }

    /// Dismisses an alert that needs no action. Idempotent for
    /// already-dismissed alerts.
    #[instrument(skip(self))]
    pub async fn dismiss_alert(
        &self,
        tenant_id: Uuid,
        alert_id: Uuid,
        _acting_user: Uuid,
    ) -> Result<stock_alert::Model, ServiceError> {
        let alert = self.get_alert(tenant_id, alert_id).await?;
        match self.alert_status(&alert)? {
            AlertStatus::Dismissed => Ok(alert),
            AlertStatus::Pending | AlertStatus::Acknowledged => {
                let mut active: stock_alert::ActiveModel = alert.into();
                active.status = Set(AlertStatus::Dismissed.as_str().to_string());
                let updated = active
                    .update(self.db.as_ref())
                    .await
                    .map_err(ServiceError::db_error)?;
                self.emit_status_change(tenant_id, &updated).await;
                Ok(updated)
            }
            status => Err(illegal_transition(status, AlertStatus::Dismissed)),
        }
    }

    /// Materials projected to stock out within `horizon_days`, based on the
    /// consumption velocity of recent ledger deductions.
    #[instrument(skip(self))]
    pub async fn get_predictive_alerts(
        &self,
        tenant_id: Uuid,
        horizon_days: i64,
    ) -> Result<Vec<PredictiveAlert>, ServiceError> {
        if horizon_days <= 0 {
            return Err(ServiceError::ValidationError(
                "Horizon must be a positive number of days".to_string(),
            ));
        }

        let materials = self.active_materials(tenant_id).await?;
        let velocity = self.daily_consumption_by_material(tenant_id).await?;
        let horizon = Decimal::from(horizon_days);
        let now = Utc::now();

        let mut alerts = Vec::new();
        for mat in materials {
            let Some(daily) = velocity.get(&mat.id).copied() else {
                continue;
            };
            if daily <= Decimal::ZERO {
                continue;
            }

            let days_until_stockout = (mat.stock_quantity / daily).max(Decimal::ZERO);
            if days_until_stockout > horizon {
                continue;
            }

            let seconds = (days_until_stockout * Decimal::from(86_400))
                .to_i64()
                .unwrap_or(0);
            alerts.push(PredictiveAlert {
                material_id: mat.id,
                material_name: mat.name,
                unit: mat.unit,
                stock_quantity: mat.stock_quantity,
                daily_consumption: daily,
                days_until_stockout,
                projected_stockout_at: now + Duration::seconds(seconds),
            });
        }

        alerts.sort_by(|a, b| a.days_until_stockout.cmp(&b.days_until_stockout));
        Ok(alerts)
    }

    /// Purchase suggestions for materials below their reorder buffer or
    /// predicted to stock out within the horizon.
    #[instrument(skip(self))]
    pub async fn get_reorder_recommendations(
        &self,
        tenant_id: Uuid,
        horizon_days: i64,
    ) -> Result<Vec<ReorderRecommendation>, ServiceError> {
        if horizon_days <= 0 {
            return Err(ServiceError::ValidationError(
                "Horizon must be a positive number of days".to_string(),
            ));
        }

        let materials = self.active_materials(tenant_id).await?;
        let velocity = self.daily_consumption_by_material(tenant_id).await?;
        let horizon = Decimal::from(horizon_days);

        let mut recommendations = Vec::new();
        for mat in materials {
            let daily = velocity.get(&mat.id).copied().unwrap_or(Decimal::ZERO);
            let projected_consumption = daily * horizon;
            let below_reorder = mat.stock_quantity < mat.reorder_level;
            let will_stock_out =
                daily > Decimal::ZERO && mat.stock_quantity - projected_consumption < Decimal::ZERO;
            if !below_reorder && !will_stock_out {
                continue;
            }

            // Cover the projected horizon consumption and restore the
            // reorder buffer on top of what is still on hand.
            let recommended_quantity = (mat.reorder_level + projected_consumption
                - mat.stock_quantity)
                .max(Decimal::ZERO)
                .ceil();
            if recommended_quantity <= Decimal::ZERO {
                continue;
            }

            let rationale = if below_reorder {
                format!(
                    "Stock {} is below the reorder level {}",
                    mat.stock_quantity, mat.reorder_level
                )
            } else {
                format!(
                    "Projected to consume {} within {} days against {} on hand",
                    projected_consumption, horizon_days, mat.stock_quantity
                )
            };

            recommendations.push(ReorderRecommendation {
                material_id: mat.id,
                material_name: mat.name,
                unit: mat.unit,
                stock_quantity: mat.stock_quantity,
                reorder_level: mat.reorder_level,
                estimated_cost: recommended_quantity * mat.unit_cost,
                recommended_quantity,
                rationale,
            });
        }

        Ok(recommendations)
    }

    /// Shortage report for a proposed batch of orders; delegates to the
    /// multi-product planner.
    #[instrument(skip(self, production_plan))]
    pub async fn check_stock_sufficiency_for_orders(
        &self,
        tenant_id: Uuid,
        production_plan: Vec<ProductionPlanEntry>,
    ) -> Result<MultiProductPlan, ServiceError> {
        self.batch_production
            .calculate_multi_product_batch(production_plan, tenant_id)
            .await
    }

    async fn active_materials(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<material::Model>, ServiceError> {
        MaterialEntity::find()
            .filter(material::Column::TenantId.eq(tenant_id))
            .filter(material::Column::Lifecycle.eq(Lifecycle::Active.as_str()))
            .order_by_asc(material::Column::Name)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Average units deducted per day over the configured look-back window.
    async fn daily_consumption_by_material(
        &self,
        tenant_id: Uuid,
    ) -> Result<BTreeMap<Uuid, Decimal>, ServiceError> {
        let lookback_days = self.config.consumption_lookback_days.max(1);
        let window_start = Utc::now() - Duration::days(lookback_days);

        let deductions = InventoryTransactionEntity::find()
            .filter(inventory_transaction::Column::TenantId.eq(tenant_id))
            .filter(
                inventory_transaction::Column::TransactionType
                    .eq(TransactionType::Deduction.as_str()),
            )
            .filter(inventory_transaction::Column::CreatedAt.gte(window_start))
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        let mut consumed: BTreeMap<Uuid, Decimal> = BTreeMap::new();
        for record in deductions {
            // deductions carry a negative change; consumption is its magnitude
            *consumed.entry(record.material_id).or_default() += -record.quantity_change;
        }

        let days = Decimal::from(lookback_days);
        Ok(consumed
            .into_iter()
            .map(|(material_id, total)| (material_id, total / days))
            .collect())
    }

    async fn get_alert(
        &self,
        tenant_id: Uuid,
        alert_id: Uuid,
    ) -> Result<stock_alert::Model, ServiceError> {
        StockAlertEntity::find()
            .filter(stock_alert::Column::Id.eq(alert_id))
            .filter(stock_alert::Column::TenantId.eq(tenant_id))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Alert {} not found", alert_id)))
    }

    fn alert_status(&self, alert: &stock_alert::Model) -> Result<AlertStatus, ServiceError> {
        alert.status().ok_or_else(|| {
            ServiceError::InternalError(format!(
                "Alert {} carries unknown status '{}'",
                alert.id, alert.status
            ))
        })
    }

    async fn emit_status_change(&self, tenant_id: Uuid, alert: &stock_alert::Model) {
        self.event_sender
            .send_or_log(Event::StockAlertStatusChanged {
                tenant_id,
                alert_id: alert.id,
                status: alert.status.clone(),
                changed_at: alert.updated_at,
            })
            .await;
    }
}

fn alert_message(mat: &material::Model, severity: AlertSeverity) -> String {
    let label = match severity {
        AlertSeverity::OutOfStock => "out of stock",
        AlertSeverity::Critical => "critically low",
        AlertSeverity::Low => "running low",
    };
    format!(
        "'{}' is {}: {} {} on hand, reorder level {}",
        mat.name, label, mat.stock_quantity, mat.unit, mat.reorder_level
    )
}

fn illegal_transition(from: AlertStatus, to: AlertStatus) -> ServiceError {
    ServiceError::InvalidOperation(format!(
        "Alert cannot move from {} to {}",
        from.as_str(),
        to.as_str()
    ))
}
