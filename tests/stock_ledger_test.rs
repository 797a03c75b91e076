//! Ledger invariants: non-negative stock, all-or-nothing mutations, and
//! chained before/after audit records.

mod common;

use assert_matches::assert_matches;
use batchline_api::entities::material::Unit;
use batchline_api::errors::ServiceError;
use batchline_api::services::stock_ledger::{ProductionLine, StockAdjustment};
use common::TestApp;
use rust_decimal_macros::dec;
use uuid::Uuid;

#[tokio::test]
async fn deduction_and_restock_chain_in_the_ledger() {
    let app = TestApp::new().await;
    let ledger = app.state.services.stock_ledger.clone();
    let material = app
        .seed_material("Flour", Unit::Kilogram, dec!(100), dec!(20), dec!(0.8))
        .await;

    let deduction = ledger
        .adjust_stock(
            app.tenant_id,
            material.id,
            StockAdjustment::deduction(dec!(30), "Production draw"),
            app.user_id,
        )
        .await
        .expect("deduction should succeed");

    assert_eq!(deduction.quantity_before, dec!(100));
    assert_eq!(deduction.quantity_change, dec!(-30));
    assert_eq!(deduction.quantity_after, dec!(70));

    let restock = ledger
        .adjust_stock(
            app.tenant_id,
            material.id,
            StockAdjustment::restock(dec!(30), "Supplier delivery"),
            app.user_id,
        )
        .await
        .expect("restock should succeed");

    // equal-and-opposite restock restores the original level
    assert_eq!(restock.quantity_before, deduction.quantity_after);
    assert_eq!(restock.quantity_after, dec!(100));

    let refreshed = app
        .state
        .services
        .materials
        .get_material(app.tenant_id, material.id)
        .await
        .unwrap();
    assert_eq!(refreshed.stock_quantity, dec!(100));

    let (history, total) = ledger
        .get_transaction_history(app.tenant_id, material.id, 1, 10)
        .await
        .unwrap();
    assert_eq!(total, 2);
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn over_deduction_fails_and_mutates_nothing() {
    let app = TestApp::new().await;
    let ledger = app.state.services.stock_ledger.clone();
    let material = app
        .seed_material("Sugar", Unit::Kilogram, dec!(10), dec!(5), dec!(1.2))
        .await;

    let result = ledger
        .adjust_stock(
            app.tenant_id,
            material.id,
            StockAdjustment::deduction(dec!(10.5), "Oversized draw"),
            app.user_id,
        )
        .await;
    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));

    let refreshed = app
        .state
        .services
        .materials
        .get_material(app.tenant_id, material.id)
        .await
        .unwrap();
    assert_eq!(refreshed.stock_quantity, dec!(10));

    let (_, total) = ledger
        .get_transaction_history(app.tenant_id, material.id, 1, 10)
        .await
        .unwrap();
    assert_eq!(total, 0, "failed mutation must not leave a ledger record");
}

#[tokio::test]
async fn adjustment_takes_the_signed_delta() {
    let app = TestApp::new().await;
    let ledger = app.state.services.stock_ledger.clone();
    let material = app
        .seed_material("Yeast", Unit::Gram, dec!(500), dec!(100), dec!(0.05))
        .await;

    let correction = ledger
        .adjust_stock(
            app.tenant_id,
            material.id,
            StockAdjustment::adjustment(dec!(-12.5), "Cycle count correction"),
            app.user_id,
        )
        .await
        .unwrap();
    assert_eq!(correction.quantity_after, dec!(487.5));

    let below_zero = ledger
        .adjust_stock(
            app.tenant_id,
            material.id,
            StockAdjustment::adjustment(dec!(-1000), "Bad count"),
            app.user_id,
        )
        .await;
    assert_matches!(below_zero, Err(ServiceError::InsufficientStock(_)));
}

#[tokio::test]
async fn non_positive_magnitudes_are_rejected() {
    let app = TestApp::new().await;
    let ledger = app.state.services.stock_ledger.clone();
    let material = app
        .seed_material("Salt", Unit::Gram, dec!(100), dec!(10), dec!(0.01))
        .await;

    for adjustment in [
        StockAdjustment::restock(dec!(0), "noop"),
        StockAdjustment::deduction(dec!(-5), "negative"),
        StockAdjustment::adjustment(dec!(0), "noop"),
    ] {
        let result = ledger
            .adjust_stock(app.tenant_id, material.id, adjustment, app.user_id)
            .await;
        assert_matches!(result, Err(ServiceError::ValidationError(_)));
    }
}

#[tokio::test]
async fn mutations_are_tenant_scoped() {
    let app = TestApp::new().await;
    let ledger = app.state.services.stock_ledger.clone();
    let material = app
        .seed_material("Butter", Unit::Kilogram, dec!(50), dec!(10), dec!(6))
        .await;

    let other_tenant = Uuid::new_v4();
    let result = ledger
        .adjust_stock(
            other_tenant,
            material.id,
            StockAdjustment::deduction(dec!(1), "Cross-tenant draw"),
            app.user_id,
        )
        .await;
    assert_matches!(result, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn production_commit_is_all_or_nothing() {
    let app = TestApp::new().await;
    let ledger = app.state.services.stock_ledger.clone();
    let plentiful = app
        .seed_material("Dough", Unit::Kilogram, dec!(100), dec!(10), dec!(1))
        .await;
    let scarce = app
        .seed_material("Cheese", Unit::Kilogram, dec!(2), dec!(5), dec!(8))
        .await;

    let run_id = Uuid::new_v4();
    let result = ledger
        .commit_production(
            app.tenant_id,
            vec![
                ProductionLine {
                    material_id: plentiful.id,
                    quantity: dec!(10),
                },
                ProductionLine {
                    material_id: scarce.id,
                    quantity: dec!(3),
                },
            ],
            run_id,
            "Production run".to_string(),
            app.user_id,
        )
        .await;
    assert_matches!(result, Err(ServiceError::InsufficientStock(_)));

    // the first line must have been rolled back with the second
    let materials = app.state.services.materials.clone();
    let refreshed = materials
        .get_material(app.tenant_id, plentiful.id)
        .await
        .unwrap();
    assert_eq!(refreshed.stock_quantity, dec!(100));
    let (_, total) = ledger
        .get_transaction_history(app.tenant_id, plentiful.id, 1, 10)
        .await
        .unwrap();
    assert_eq!(total, 0);

    // a coverable run commits both lines with the shared reference
    let records = ledger
        .commit_production(
            app.tenant_id,
            vec![
                ProductionLine {
                    material_id: plentiful.id,
                    quantity: dec!(10),
                },
                ProductionLine {
                    material_id: scarce.id,
                    quantity: dec!(1),
                },
            ],
            run_id,
            "Production run".to_string(),
            app.user_id,
        )
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.reference_id == Some(run_id)));
    assert!(records
        .iter()
        .all(|r| r.reference_type.as_deref() == Some("production_run")));
}

#[tokio::test]
async fn can_be_deleted_tracks_active_recipe_references() {
    let app = TestApp::new().await;
    let ledger = app.state.services.stock_ledger.clone();
    let material = app
        .seed_material("Tomato", Unit::Kilogram, dec!(40), dec!(10), dec!(2))
        .await;
    let product = app
        .seed_product(
            "Sauce Jar",
            batchline_api::entities::product::InventoryMode::Bom,
        )
        .await;
    let recipe = app
        .seed_recipe(
            product.id,
            "Sauce v1",
            true,
            &[(material.id, dec!(0.5), dec!(0))],
        )
        .await;

    assert!(!ledger
        .can_be_deleted(app.tenant_id, material.id)
        .await
        .unwrap());

    app.state
        .services
        .recipes
        .deactivate_recipe(app.tenant_id, recipe.id)
        .await
        .unwrap();

    assert!(ledger
        .can_be_deleted(app.tenant_id, material.id)
        .await
        .unwrap());
}
