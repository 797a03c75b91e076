use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ConnectionTrait, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unit vocabulary for material quantities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    Gram,
    Kilogram,
    Milliliter,
    Liter,
    Piece,
    Pack,
    Box,
    Bag,
}

/// Broad unit category used for display grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitClass {
    Mass,
    Volume,
    Count,
    Packaging,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Gram => "g",
            Unit::Kilogram => "kg",
            Unit::Milliliter => "ml",
            Unit::Liter => "l",
            Unit::Piece => "piece",
            Unit::Pack => "pack",
            Unit::Box => "box",
            Unit::Bag => "bag",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "g" => Some(Unit::Gram),
            "kg" => Some(Unit::Kilogram),
            "ml" => Some(Unit::Milliliter),
            "l" => Some(Unit::Liter),
            "piece" => Some(Unit::Piece),
            "pack" => Some(Unit::Pack),
            "box" => Some(Unit::Box),
            "bag" => Some(Unit::Bag),
            _ => None,
        }
    }

    pub fn class(&self) -> UnitClass {
        match self {
            Unit::Gram | Unit::Kilogram => UnitClass::Mass,
            Unit::Milliliter | Unit::Liter => UnitClass::Volume,
            Unit::Piece => UnitClass::Count,
            Unit::Pack | Unit::Box | Unit::Bag => UnitClass::Packaging,
        }
    }
}

/// Lifecycle of a material or recipe record. Archived rows are kept for
/// history and can be restored explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle {
    Active,
    Archived,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Active => "active",
            Lifecycle::Archived => "archived",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Lifecycle::Active),
            "archived" => Some(Lifecycle::Archived),
            _ => None,
        }
    }
}

/// Derived stock state of a material relative to its reorder level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockStatus {
    Normal,
    Low,
    Critical,
    OutOfStock,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::Normal => "normal",
            StockStatus::Low => "low",
            StockStatus::Critical => "critical",
            StockStatus::OutOfStock => "out_of_stock",
        }
    }

    /// Classifies a stock level against a reorder level.
    ///
    /// The critical band upper bound is inclusive: a stock level exactly at
    /// half the reorder level is critical, not low.
    pub fn classify(stock_quantity: Decimal, reorder_level: Decimal) -> StockStatus {
        if stock_quantity <= Decimal::ZERO {
            StockStatus::OutOfStock
        } else if stock_quantity >= reorder_level {
            StockStatus::Normal
        } else if stock_quantity <= reorder_level / Decimal::TWO {
            StockStatus::Critical
        } else {
            StockStatus::Low
        }
    }

    /// True for states that should raise or keep an alert open.
    pub fn is_alerting(&self) -> bool {
        !matches!(self, StockStatus::Normal)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "materials")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub unit: String,
    pub stock_quantity: Decimal,
    pub reorder_level: Decimal,
    pub unit_cost: Decimal,
    pub lifecycle: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn unit(&self) -> Option<Unit> {
        Unit::from_str(&self.unit)
    }

    pub fn lifecycle(&self) -> Option<Lifecycle> {
        Lifecycle::from_str(&self.lifecycle)
    }

    pub fn is_archived(&self) -> bool {
        self.lifecycle() == Some(Lifecycle::Archived)
    }

    pub fn stock_status(&self) -> StockStatus {
        StockStatus::classify(self.stock_quantity, self.reorder_level)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::recipe_component::Entity")]
    RecipeComponents,
    #[sea_orm(has_many = "super::inventory_transaction::Entity")]
    InventoryTransactions,
    #[sea_orm(has_many = "super::stock_alert::Entity")]
    StockAlerts,
}

impl Related<super::recipe_component::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RecipeComponents.def()
    }
}

impl Related<super::inventory_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryTransactions.def()
    }
}

impl Related<super::stock_alert::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockAlerts.def()
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
