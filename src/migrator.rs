use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_materials_table::Migration),
            Box::new(m20240301_000002_create_products_table::Migration),
            Box::new(m20240301_000003_create_recipes_tables::Migration),
            Box::new(m20240301_000004_create_inventory_transactions_table::Migration),
            Box::new(m20240301_000005_create_stock_alerts_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240301_000001_create_materials_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_materials_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Materials::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Materials::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Materials::TenantId).uuid().not_null())
                        .col(ColumnDef::new(Materials::Name).string().not_null())
                        .col(ColumnDef::new(Materials::Sku).string().null())
                        .col(ColumnDef::new(Materials::Unit).string().not_null())
                        .col(
                            ColumnDef::new(Materials::StockQuantity)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Materials::ReorderLevel)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Materials::UnitCost)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Materials::Lifecycle).string().not_null())
                        .col(ColumnDef::new(Materials::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Materials::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_materials_tenant_id")
                        .table(Materials::Table)
                        .col(Materials::TenantId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .unique()
                        .name("idx_materials_tenant_sku")
                        .table(Materials::Table)
                        .col(Materials::TenantId)
                        .col(Materials::Sku)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Materials::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Materials {
        Table,
        Id,
        TenantId,
        Name,
        Sku,
        Unit,
        StockQuantity,
        ReorderLevel,
        UnitCost,
        Lifecycle,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_products_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::TenantId).uuid().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::InventoryMode).string().not_null())
                        .col(ColumnDef::new(Products::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Products::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_tenant_id")
                        .table(Products::Table)
                        .col(Products::TenantId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        TenantId,
        Name,
        InventoryMode,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_recipes_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_recipes_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Recipes::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Recipes::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Recipes::TenantId).uuid().not_null())
                        .col(ColumnDef::new(Recipes::ProductId).uuid().not_null())
                        .col(ColumnDef::new(Recipes::Name).string().not_null())
                        .col(
                            ColumnDef::new(Recipes::YieldQuantity)
                                .decimal()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(Recipes::YieldUnit).string().not_null())
                        .col(
                            ColumnDef::new(Recipes::IsActive)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Recipes::Lifecycle).string().not_null())
                        .col(ColumnDef::new(Recipes::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Recipes::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_recipes_tenant_product")
                        .table(Recipes::Table)
                        .col(Recipes::TenantId)
                        .col(Recipes::ProductId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(RecipeComponents::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RecipeComponents::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(RecipeComponents::RecipeId).uuid().not_null())
                        .col(
                            ColumnDef::new(RecipeComponents::MaterialId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RecipeComponents::QuantityRequired)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RecipeComponents::WastePercentage)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(RecipeComponents::Notes).string().null())
                        .col(
                            ColumnDef::new(RecipeComponents::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RecipeComponents::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // A material may appear at most once per recipe
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .unique()
                        .name("idx_recipe_components_recipe_material")
                        .table(RecipeComponents::Table)
                        .col(RecipeComponents::RecipeId)
                        .col(RecipeComponents::MaterialId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_recipe_components_material_id")
                        .table(RecipeComponents::Table)
                        .col(RecipeComponents::MaterialId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(RecipeComponents::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Recipes::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Recipes {
        Table,
        Id,
        TenantId,
        ProductId,
        Name,
        YieldQuantity,
        YieldUnit,
        IsActive,
        Lifecycle,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum RecipeComponents {
        Table,
        Id,
        RecipeId,
        MaterialId,
        QuantityRequired,
        WastePercentage,
        Notes,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000004_create_inventory_transactions_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_inventory_transactions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryTransactions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::TenantId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::MaterialId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::TransactionType)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::QuantityBefore)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::QuantityChange)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::QuantityAfter)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::Reason)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryTransactions::Notes).string().null())
                        .col(
                            ColumnDef::new(InventoryTransactions::ReferenceId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::ReferenceType)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::CreatedBy)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_transactions_tenant_material")
                        .table(InventoryTransactions::Table)
                        .col(InventoryTransactions::TenantId)
                        .col(InventoryTransactions::MaterialId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_transactions_created_at")
                        .table(InventoryTransactions::Table)
                        .col(InventoryTransactions::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryTransactions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum InventoryTransactions {
        Table,
        Id,
        TenantId,
        MaterialId,
        TransactionType,
        QuantityBefore,
        QuantityChange,
        QuantityAfter,
        Reason,
        Notes,
        ReferenceId,
        ReferenceType,
        CreatedBy,
        CreatedAt,
    }
}

mod m20240301_000005_create_stock_alerts_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_stock_alerts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockAlerts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockAlerts::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockAlerts::TenantId).uuid().not_null())
                        .col(ColumnDef::new(StockAlerts::MaterialId).uuid().not_null())
                        .col(ColumnDef::new(StockAlerts::ProductId).uuid().null())
                        .col(ColumnDef::new(StockAlerts::Severity).string().not_null())
                        .col(ColumnDef::new(StockAlerts::Status).string().not_null())
                        .col(
                            ColumnDef::new(StockAlerts::StockQuantity)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockAlerts::ReorderLevel)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockAlerts::Message).string().null())
                        .col(ColumnDef::new(StockAlerts::AcknowledgedBy).uuid().null())
                        .col(
                            ColumnDef::new(StockAlerts::AcknowledgedAt)
                                .timestamp()
                                .null(),
                        )
                        .col(ColumnDef::new(StockAlerts::ResolvedAt).timestamp().null())
                        .col(ColumnDef::new(StockAlerts::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(StockAlerts::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_alerts_tenant_material")
                        .table(StockAlerts::Table)
                        .col(StockAlerts::TenantId)
                        .col(StockAlerts::MaterialId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_alerts_status")
                        .table(StockAlerts::Table)
                        .col(StockAlerts::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockAlerts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum StockAlerts {
        Table,
        Id,
        TenantId,
        MaterialId,
        ProductId,
        Severity,
        Status,
        StockQuantity,
        ReorderLevel,
        Message,
        AcknowledgedBy,
        AcknowledgedAt,
        ResolvedAt,
        CreatedAt,
        UpdatedAt,
    }
}
