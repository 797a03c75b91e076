//! Batch sizing, multi-product aggregation, simulation and commits.

mod common;

use assert_matches::assert_matches;
use batchline_api::entities::material::Unit;
use batchline_api::entities::product::InventoryMode;
use batchline_api::errors::ServiceError;
use batchline_api::services::batch_production::ProductionPlanEntry;
use common::TestApp;
use rust_decimal_macros::dec;
use uuid::Uuid;

async fn seed_pizza(app: &TestApp) -> Uuid {
    let dough = app
        .seed_material("Dough", Unit::Kilogram, dec!(10), dec!(4), dec!(2))
        .await;
    let sauce = app
        .seed_material("Sauce", Unit::Liter, dec!(5), dec!(2), dec!(1.5))
        .await;
    let cheese = app
        .seed_material("Cheese", Unit::Kilogram, dec!(3.5), dec!(2), dec!(8))
        .await;

    let product = app.seed_product("Margherita", InventoryMode::Bom).await;
    app.seed_recipe(
        product.id,
        "Margherita v1",
        true,
        &[
            (dough.id, dec!(0.3), dec!(5)),
            (sauce.id, dec!(0.1), dec!(0)),
            (cheese.id, dec!(0.2), dec!(10)),
        ],
    )
    .await;

    product.id
}

#[tokio::test]
async fn batch_requirements_flag_shortages() {
    let app = TestApp::new().await;
    let product_id = seed_pizza(&app).await;

    let batch = app
        .state
        .services
        .batch_production
        .calculate_batch_requirements(product_id, app.tenant_id, 20)
        .await
        .unwrap();

    // only cheese falls short at 20 units: 20 x 0.22 = 4.4 against 3.5
    assert!(!batch.can_produce);
    assert_eq!(batch.shortages.len(), 1);
    let shortage = &batch.shortages[0];
    assert_eq!(shortage.material_name, "Cheese");
    assert_eq!(shortage.total_required, dec!(4.400));
    assert_eq!(shortage.shortage, dec!(0.900));

    let coverable = app
        .state
        .services
        .batch_production
        .calculate_batch_requirements(product_id, app.tenant_id, 15)
        .await
        .unwrap();
    assert!(coverable.can_produce);
    assert!(coverable.shortages.is_empty());
}

#[tokio::test]
async fn optimal_batch_size_suggests_divisor_runs() {
    let app = TestApp::new().await;
    let product_id = seed_pizza(&app).await;

    let plan = app
        .state
        .services
        .batch_production
        .calculate_optimal_batch_size(product_id, app.tenant_id)
        .await
        .unwrap();

    assert_eq!(plan.maximum_producible, 15);
    assert_eq!(plan.suggested_batches, vec![1, 3, 5, 15]);
    assert_eq!(plan.bottleneck_material.unwrap().material_name, "Cheese");
    assert!(plan.recommendation.contains("15"));
}

#[tokio::test]
async fn optimal_batch_size_requires_an_active_recipe() {
    let app = TestApp::new().await;
    let product = app.seed_product("Unplanned", InventoryMode::Bom).await;

    let result = app
        .state
        .services
        .batch_production
        .calculate_optimal_batch_size(product.id, app.tenant_id)
        .await;
    assert_matches!(result, Err(ServiceError::ConfigurationError(_)));
}

#[tokio::test]
async fn multi_product_plans_sum_shared_materials() {
    let app = TestApp::new().await;
    let shared = app
        .seed_material("Packaging", Unit::Piece, dec!(100), dec!(20), dec!(0.1))
        .await;

    let product_a = app.seed_product("Product A", InventoryMode::Bom).await;
    app.seed_recipe(product_a.id, "A v1", true, &[(shared.id, dec!(2), dec!(0))])
        .await;
    let product_b = app.seed_product("Product B", InventoryMode::Bom).await;
    app.seed_recipe(product_b.id, "B v1", true, &[(shared.id, dec!(3), dec!(0))])
        .await;

    let plan = app
        .state
        .services
        .batch_production
        .calculate_multi_product_batch(
            vec![
                ProductionPlanEntry {
                    product_id: product_a.id,
                    quantity: 10,
                },
                ProductionPlanEntry {
                    product_id: product_b.id,
                    quantity: 10,
                },
            ],
            app.tenant_id,
        )
        .await
        .unwrap();

    // 10 x 2 + 10 x 3 = 50 of the shared material against 100 in stock
    assert_eq!(plan.total_products, 2);
    assert!(plan.feasible);
    assert_eq!(plan.aggregated_material_requirements.len(), 1);
    let aggregated = &plan.aggregated_material_requirements[0];
    assert_eq!(aggregated.total_required, dec!(50));
    assert!(aggregated.sufficient);
    assert_eq!(aggregated.shortage, dec!(0));

    // tripling product B pushes the aggregate past the stock level
    let infeasible = app
        .state
        .services
        .batch_production
        .calculate_multi_product_batch(
            vec![
                ProductionPlanEntry {
                    product_id: product_a.id,
                    quantity: 10,
                },
                ProductionPlanEntry {
                    product_id: product_b.id,
                    quantity: 30,
                },
            ],
            app.tenant_id,
        )
        .await
        .unwrap();
    assert!(!infeasible.feasible);
    let aggregated = &infeasible.aggregated_material_requirements[0];
    assert_eq!(aggregated.total_required, dec!(110));
    assert_eq!(aggregated.shortage, dec!(10));
}

#[tokio::test]
async fn multi_product_plans_isolate_bad_entries() {
    let app = TestApp::new().await;
    let product_id = seed_pizza(&app).await;

    let plan = app
        .state
        .services
        .batch_production
        .calculate_multi_product_batch(
            vec![
                ProductionPlanEntry {
                    product_id,
                    quantity: 5,
                },
                ProductionPlanEntry {
                    product_id: Uuid::new_v4(),
                    quantity: 5,
                },
            ],
            app.tenant_id,
        )
        .await
        .unwrap();

    assert_eq!(plan.product_results.len(), 2);
    assert!(plan.product_results[0].error.is_none());
    assert!(plan.product_results[1].error.is_some());
    // an entry with unknown requirements keeps the plan from being feasible
    assert!(!plan.feasible);

    let empty = app
        .state
        .services
        .batch_production
        .calculate_multi_product_batch(Vec::new(), app.tenant_id)
        .await;
    assert_matches!(empty, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn simulation_previews_without_persisting() {
    let app = TestApp::new().await;
    let product_id = seed_pizza(&app).await;

    let simulation = app
        .state
        .services
        .batch_production
        .simulate_production(product_id, app.tenant_id, 10)
        .await
        .unwrap();

    assert!(simulation.can_commit);
    assert_eq!(simulation.production_cost, dec!(25.400));
    let cheese = simulation
        .material_changes
        .iter()
        .find(|c| c.material_name == "Cheese")
        .unwrap();
    assert_eq!(cheese.quantity_before, dec!(3.5));
    assert_eq!(cheese.quantity_change, dec!(-2.200));
    assert_eq!(cheese.quantity_after, dec!(1.300));

    // nothing was persisted
    let (materials, _) = app
        .state
        .services
        .materials
        .list_materials(app.tenant_id, false, 1, 10)
        .await
        .unwrap();
    let cheese_row = materials.iter().find(|m| m.name == "Cheese").unwrap();
    assert_eq!(cheese_row.stock_quantity, dec!(3.5));

    let oversize = app
        .state
        .services
        .batch_production
        .simulate_production(product_id, app.tenant_id, 20)
        .await
        .unwrap();
    assert!(!oversize.can_commit);
}

#[tokio::test]
async fn commit_deducts_through_the_ledger() {
    let app = TestApp::new().await;
    let product_id = seed_pizza(&app).await;

    let commit = app
        .state
        .services
        .batch_production
        .commit_production(product_id, app.tenant_id, 10, app.user_id)
        .await
        .unwrap();

    assert_eq!(commit.transactions.len(), 3);
    assert!(commit
        .transactions
        .iter()
        .all(|t| t.reference_id == Some(commit.production_run_id)));

    let (materials, _) = app
        .state
        .services
        .materials
        .list_materials(app.tenant_id, false, 1, 10)
        .await
        .unwrap();
    let cheese = materials.iter().find(|m| m.name == "Cheese").unwrap();
    assert_eq!(cheese.stock_quantity, dec!(1.300));
    let dough = materials.iter().find(|m| m.name == "Dough").unwrap();
    assert_eq!(dough.stock_quantity, dec!(6.850));
}

#[tokio::test]
async fn commit_rejects_infeasible_runs_untouched() {
    let app = TestApp::new().await;
    let product_id = seed_pizza(&app).await;

    let result = app
        .state
        .services
        .batch_production
        .commit_production(product_id, app.tenant_id, 20, app.user_id)
        .await;
    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));

    let (materials, _) = app
        .state
        .services
        .materials
        .list_materials(app.tenant_id, false, 1, 10)
        .await
        .unwrap();
    let cheese = materials.iter().find(|m| m.name == "Cheese").unwrap();
    assert_eq!(cheese.stock_quantity, dec!(3.5));
}
