use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ConnectionTrait, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One material line of a recipe. A material appears at most once per
/// recipe (unique index on recipe_id + material_id).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "recipe_components")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub recipe_id: Uuid,
    pub material_id: Uuid,
    pub quantity_required: Decimal,
    pub waste_percentage: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Required quantity inflated by the expected waste:
    /// `quantity_required * (1 + waste_percentage / 100)`.
    pub fn effective_quantity(&self) -> Decimal {
        effective_quantity(self.quantity_required, self.waste_percentage)
    }

    /// Cost of one produced unit's worth of this component at the given
    /// material unit cost.
    pub fn component_cost(&self, unit_cost: Decimal) -> Decimal {
        self.effective_quantity() * unit_cost
    }
}

/// Waste-adjusted quantity for a single produced unit.
pub fn effective_quantity(quantity_required: Decimal, waste_percentage: Decimal) -> Decimal {
    quantity_required * (Decimal::ONE + waste_percentage / Decimal::ONE_HUNDRED)
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::recipe::Entity",
        from = "Column::RecipeId",
        to = "super::recipe::Column::Id"
    )]
    Recipe,
    #[sea_orm(
        belongs_to = "super::material::Entity",
        from = "Column::MaterialId",
        to = "super::material::Column::Id"
    )]
    Material,
}

impl Related<super::recipe::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Recipe.def()
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn effective_quantity_applies_waste() {
        assert_eq!(effective_quantity(dec!(0.3), dec!(5)), dec!(0.315));
        assert_eq!(effective_quantity(dec!(0.1), dec!(0)), dec!(0.1));
        assert_eq!(effective_quantity(dec!(0.2), dec!(10)), dec!(0.22));
    }
}
