use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of stock mutation recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    Restock,
    Deduction,
    Adjustment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Restock => "restock",
            TransactionType::Deduction => "deduction",
            TransactionType::Adjustment => "adjustment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "restock" => Some(TransactionType::Restock),
            "deduction" => Some(TransactionType::Deduction),
            "adjustment" => Some(TransactionType::Adjustment),
            _ => None,
        }
    }
}

/// Immutable audit record of a single stock mutation. Rows are write-once:
/// created inside the same database transaction as the stock update and
/// never modified afterwards, so `quantity_after` values chain across
/// consecutive rows for the same (tenant, material).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub material_id: Uuid,
    pub transaction_type: String,
    pub quantity_before: Decimal,
    pub quantity_change: Decimal,
    pub quantity_after: Decimal,
    pub reason: String,
    pub notes: Option<String>,
    pub reference_id: Option<Uuid>,
    pub reference_type: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Model {
    pub fn transaction_type(&self) -> Option<TransactionType> {
        TransactionType::from_str(&self.transaction_type)
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
    async fn before_save<C: ConnectionTrait>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.created_at {
            active_model.created_at = Set(Utc::now());
        }
        Ok(active_model)
    }
}
