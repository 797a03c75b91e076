use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ConnectionTrait, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Alert severity. Mirrors the alerting subset of
/// [`super::material::StockStatus`] — a `Normal` material carries no alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSeverity {
    Low,
    Critical,
    OutOfStock,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Critical => "critical",
            AlertSeverity::OutOfStock => "out_of_stock",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(AlertSeverity::Low),
            "critical" => Some(AlertSeverity::Critical),
            "out_of_stock" => Some(AlertSeverity::OutOfStock),
            _ => None,
        }
    }

    pub fn from_status(status: super::material::StockStatus) -> Option<Self> {
        match status {
            super::material::StockStatus::Normal => None,
            super::material::StockStatus::Low => Some(AlertSeverity::Low),
            super::material::StockStatus::Critical => Some(AlertSeverity::Critical),
            super::material::StockStatus::OutOfStock => Some(AlertSeverity::OutOfStock),
        }
    }
}

/// Alert lifecycle. `Pending → Acknowledged → Resolved`, or
/// `Pending/Acknowledged → Dismissed`. Resolved and Dismissed are terminal
/// per incident; a recurring condition opens a new alert row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertStatus {
    Pending,
    Acknowledged,
    Resolved,
    Dismissed,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Pending => "pending",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Dismissed => "dismissed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AlertStatus::Pending),
            "acknowledged" => Some(AlertStatus::Acknowledged),
            "resolved" => Some(AlertStatus::Resolved),
            "dismissed" => Some(AlertStatus::Dismissed),
            _ => None,
        }
    }

    /// Actionable alerts are the ones a scan may update in place.
    pub fn is_actionable(&self) -> bool {
        matches!(self, AlertStatus::Pending | AlertStatus::Acknowledged)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_alerts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub material_id: Uuid,
    pub product_id: Option<Uuid>,
    pub severity: String,
    pub status: String,
    pub stock_quantity: Decimal,
    pub reorder_level: Decimal,
    pub message: Option<String>,
    pub acknowledged_by: Option<Uuid>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn severity(&self) -> Option<AlertSeverity> {
        AlertSeverity::from_str(&self.severity)
    }

    pub fn status(&self) -> Option<AlertStatus> {
        AlertStatus::from_str(&self.status)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::material::Entity",
        from = "Column::MaterialId",
        to = "super::material::Column::Id"
    )]
    Material,
}

impl Related<super::material::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Material.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now();
        if insert {
            if let ActiveValue::NotSet = self.created_at {
                self.created_at = Set(now);
            }
        }
        self.updated_at = Set(now);
        Ok(self)
    }
}
