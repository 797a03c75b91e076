use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ConnectionTrait, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How stock is tracked for a product. Only BOM-managed products are
/// eligible for recipe-based availability calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryMode {
    Bom,
    Simple,
}

impl InventoryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryMode::Bom => "bom",
            InventoryMode::Simple => "simple",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "bom" => Some(InventoryMode::Bom),
            "simple" => Some(InventoryMode::Simple),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub inventory_mode: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn inventory_mode(&self) -> Option<InventoryMode> {
        InventoryMode::from_str(&self.inventory_mode)
    }

    pub fn is_bom_managed(&self) -> bool {
        self.inventory_mode() == Some(InventoryMode::Bom)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::recipe::Entity")]
    Recipes,
}

impl Related<super::recipe::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Recipes.def()
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
