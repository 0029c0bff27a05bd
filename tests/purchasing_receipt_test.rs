//! Vendor receipt flow: stock intake with journal rows, the loose-name
//! backfill of linked TRADING work-order lines, and trading approval.

mod common;

use assert_matches::assert_matches;
use chrono::Utc;
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use uuid::Uuid;

use common::{seed_item, setup, stock_of, TestCtx};
use gudang_core::entities::item::{self, ItemCategory};
use gudang_core::entities::work_order_line::FulfillmentMethod;
use gudang_core::services::matching::NormalizedNameMatcher;
use gudang_core::services::purchasing::{CreatePurchaseOrderInput, CreatePurchaseOrderLineInput};
use gudang_core::services::{catalog, stock_ledger};
use gudang_core::services::work_orders::{CreateWorkOrderInput, CreateWorkOrderLineInput};
use gudang_core::ServiceError;

fn po_line(name: &str, qty: i32) -> CreatePurchaseOrderLineInput {
    CreatePurchaseOrderLineInput {
        item_name: name.to_string(),
        quantity: qty,
        unit_price: None,
    }
}

/// A started work order with two TRADING lines sourced from vendors.
async fn trading_order(ctx: &TestCtx, number: &str) -> (Uuid, Vec<Uuid>) {
    let (order, lines) = ctx
        .work_orders
        .create_work_order(CreateWorkOrderInput {
            number: number.to_string(),
            customer_name: "UD Sentosa".to_string(),
            deadline: None,
            created_by: ctx.actor,
            lines: vec![
                CreateWorkOrderLineInput {
                    item_id: None,
                    item_name: "Kursi Gaming".to_string(),
                    quantity: 10,
                    method: FulfillmentMethod::Trading,
                },
                CreateWorkOrderLineInput {
                    item_id: None,
                    item_name: "Meja Gaming".to_string(),
                    quantity: 4,
                    method: FulfillmentMethod::Trading,
                },
            ],
        })
        .await
        .expect("create order");
    ctx.work_orders.start_work_order(order.id).await.expect("start");
    (order.id, lines.iter().map(|l| l.id).collect())
}

#[tokio::test]
async fn duplicate_purchase_order_number_is_a_conflict() {
    let ctx = setup().await;
    let input = CreatePurchaseOrderInput {
        number: "PO-001".to_string(),
        vendor_name: "PT Baja Utama".to_string(),
        work_order_number: None,
        created_by: ctx.actor,
        lines: vec![po_line("Plat Besi", 5)],
    };
    ctx.purchasing.create_purchase_order(input.clone()).await.expect("first");
    let err = ctx.purchasing.create_purchase_order(input).await.expect_err("second");
    assert_matches!(err, ServiceError::Conflict(_));
}

#[tokio::test]
async fn receipt_brings_goods_in_and_journals_with_price() {
    let ctx = setup().await;
    let plat = seed_item(&ctx.db, "RM-P", "Plat Besi", ItemCategory::RawMaterial, 8, 0).await;

    let (po, _) = ctx
        .purchasing
        .create_purchase_order(CreatePurchaseOrderInput {
            number: "PO-002".to_string(),
            vendor_name: "PT Baja Utama".to_string(),
            work_order_number: None,
            created_by: ctx.actor,
            lines: vec![
                CreatePurchaseOrderLineInput {
                    item_name: "plat besi".to_string(),
                    quantity: 25,
                    unit_price: Some(dec!(12.50)),
                },
                po_line("Baut 5mm", 200),
            ],
        })
        .await
        .expect("create po");

    let received_at = Utc::now();
    let received = ctx
        .purchasing
        .receive(po.id, received_at, Some("surat-jalan-778"), ctx.actor)
        .await
        .expect("receive");
    assert_eq!(received.status, "RECEIVED");
    assert!(received.received_at.is_some());
    assert_eq!(received.receipt_proof.as_deref(), Some("surat-jalan-778"));

    // The lowercase vendor name still matched the cataloged item.
    assert_eq!(stock_of(&ctx.db, plat.id).await, (33, 0));

    let journal = stock_ledger::journal_for(&*ctx.db, plat.id).await.expect("journal");
    assert_eq!(journal.len(), 1);
    assert_eq!(journal[0].direction, "IN");
    assert_eq!(journal[0].source, "VENDOR_RECEIPT");
    assert_eq!(journal[0].quantity, 25);
    assert_eq!(journal[0].unit_price, Some(dec!(12.50)));
    assert_eq!(journal[0].order_reference.as_deref(), Some("PO-002"));

    // An unknown line gets a catalog entry; unlinked purchases default to
    // raw material.
    let bolts = catalog::resolve_by_name(&*ctx.db, &NormalizedNameMatcher, "Baut 5mm")
        .await
        .expect("query")
        .expect("auto-created");
    assert!(bolts.code.starts_with("AUTO-"));
    assert_eq!(bolts.category, "RAW_MATERIAL");
    assert_eq!(stock_of(&ctx.db, bolts.id).await, (200, 0));
}

#[tokio::test]
async fn receiving_twice_is_rejected() {
    let ctx = setup().await;
    seed_item(&ctx.db, "RM-P", "Plat Besi", ItemCategory::RawMaterial, 0, 0).await;

    let (po, _) = ctx
        .purchasing
        .create_purchase_order(CreatePurchaseOrderInput {
            number: "PO-003".to_string(),
            vendor_name: "PT Baja Utama".to_string(),
            work_order_number: None,
            created_by: ctx.actor,
            lines: vec![po_line("Plat Besi", 5)],
        })
        .await
        .expect("create po");

    ctx.purchasing.receive(po.id, Utc::now(), None, ctx.actor).await.expect("first");
    let err = ctx
        .purchasing
        .receive(po.id, Utc::now(), None, ctx.actor)
        .await
        .expect_err("second");
    assert_matches!(err, ServiceError::InvalidStatus(_));
}

#[tokio::test]
async fn receipt_backfills_linked_trading_lines_by_loose_name() {
    let ctx = setup().await;
    let (order_id, _) = trading_order(&ctx, "SPK-T1").await;

    let (po, _) = ctx
        .purchasing
        .create_purchase_order(CreatePurchaseOrderInput {
            number: "PO-004".to_string(),
            vendor_name: "CV Mebel Nusantara".to_string(),
            work_order_number: Some("SPK-T1".to_string()),
            created_by: ctx.actor,
            lines: vec![
                // Noisy vendor naming still matches "Kursi Gaming".
                po_line("KURSI  gaming RGB", 6),
                // Over-delivery: clamped at the requested 4.
                po_line("meja gaming", 10),
                // No trading line matches this one; intake still happens.
                po_line("Lampu Hias", 3),
            ],
        })
        .await
        .expect("create po");

    ctx.purchasing.receive(po.id, Utc::now(), None, ctx.actor).await.expect("receive");

    let (order, lines) = ctx.work_orders.get_work_order(order_id).await.expect("get");
    let kursi = lines.iter().find(|l| l.item_name == "Kursi Gaming").expect("kursi");
    let meja = lines.iter().find(|l| l.item_name == "Meja Gaming").expect("meja");
    assert_eq!(kursi.ready_qty, 6);
    assert_eq!(meja.ready_qty, 4);
    // Partially sourced: the order does not advance yet.
    assert_eq!(order.status, "IN_PROGRESS");

    // A second delivery completes the first line and the whole order
    // becomes ready.
    let (po2, _) = ctx
        .purchasing
        .create_purchase_order(CreatePurchaseOrderInput {
            number: "PO-005".to_string(),
            vendor_name: "CV Mebel Nusantara".to_string(),
            work_order_number: Some("SPK-T1".to_string()),
            created_by: ctx.actor,
            lines: vec![po_line("Kursi Gaming", 4)],
        })
        .await
        .expect("create po2");
    ctx.purchasing.receive(po2.id, Utc::now(), None, ctx.actor).await.expect("receive 2");

    let (order, lines) = ctx.work_orders.get_work_order(order_id).await.expect("get");
    let kursi = lines.iter().find(|l| l.item_name == "Kursi Gaming").expect("kursi");
    assert_eq!(kursi.ready_qty, 10);
    assert_eq!(order.status, "READY_TO_SHIP");

    // Linked purchases stock sellable goods.
    let cataloged = catalog::resolve_by_name(&*ctx.db, &NormalizedNameMatcher, "Lampu Hias")
        .await
        .expect("query")
        .expect("auto-created");
    assert_eq!(cataloged.category, "FINISHED_GOOD");
}

#[tokio::test]
async fn receipt_against_a_missing_linked_order_fails_whole() {
    let ctx = setup().await;
    let (po, _) = ctx
        .purchasing
        .create_purchase_order(CreatePurchaseOrderInput {
            number: "PO-006".to_string(),
            vendor_name: "CV Mebel Nusantara".to_string(),
            work_order_number: Some("SPK-GHOST".to_string()),
            created_by: ctx.actor,
            lines: vec![po_line("Kursi Gaming", 2)],
        })
        .await
        .expect("create po");

    let err = ctx
        .purchasing
        .receive(po.id, Utc::now(), None, ctx.actor)
        .await
        .expect_err("must fail");
    assert_matches!(err, ServiceError::NotFound(_));

    // Rollback: nothing was stocked and the order is still OPEN.
    let (po, _) = ctx.purchasing.get_purchase_order(po.id).await.expect("get");
    assert_eq!(po.status, "OPEN");
    assert!(catalog::resolve_by_name(&*ctx.db, &NormalizedNameMatcher, "Kursi Gaming")
        .await
        .expect("query")
        .is_none());
}

#[tokio::test]
async fn trading_approval_requires_full_sourcing() {
    let ctx = setup().await;
    let (order_id, line_ids) = trading_order(&ctx, "SPK-T2").await;
    let kursi_line = line_ids[0];

    let err = ctx
        .purchasing
        .approve_trading(&[kursi_line], ctx.actor)
        .await
        .expect_err("nothing sourced");
    assert_matches!(err, ServiceError::InvalidStatus(_));

    let (po, _) = ctx
        .purchasing
        .create_purchase_order(CreatePurchaseOrderInput {
            number: "PO-007".to_string(),
            vendor_name: "CV Mebel Nusantara".to_string(),
            work_order_number: Some("SPK-T2".to_string()),
            created_by: ctx.actor,
            lines: vec![po_line("Kursi Gaming", 10), po_line("Meja Gaming", 4)],
        })
        .await
        .expect("create po");
    ctx.purchasing.receive(po.id, Utc::now(), None, ctx.actor).await.expect("receive");

    let approved = ctx
        .purchasing
        .approve_trading(&[kursi_line], ctx.actor)
        .await
        .expect("approve");
    assert_eq!(approved[0].status, "FULFILLED");
    let item_id = approved[0].item_id.expect("item");

    // 10 in at receipt, 10 out at approval.
    assert_eq!(stock_of(&ctx.db, item_id).await, (0, 0));
    let journal = stock_ledger::journal_for(&*ctx.db, item_id).await.expect("journal");
    let outbound: Vec<_> = journal.iter().filter(|t| t.direction == "OUT").collect();
    assert_eq!(outbound.len(), 1);
    assert_eq!(outbound[0].source, "TRADING");
    assert_eq!(outbound[0].quantity, 10);

    let err = ctx
        .purchasing
        .approve_trading(&[kursi_line], ctx.actor)
        .await
        .expect_err("twice");
    assert_matches!(err, ServiceError::InvalidStatus(_));

    // The other line is untouched by the sibling's approval.
    let (_, lines) = ctx.work_orders.get_work_order(order_id).await.expect("get");
    let meja = lines.iter().find(|l| l.item_name == "Meja Gaming").expect("meja");
    assert_eq!(meja.status, "PENDING");
}

#[tokio::test]
async fn trading_approval_rejects_other_methods() {
    let ctx = setup().await;
    let item = seed_item(&ctx.db, "FG-S", "Sofa Sudut", ItemCategory::FinishedGood, 5, 0).await;
    let (_, lines) = ctx
        .work_orders
        .create_work_order(CreateWorkOrderInput {
            number: "SPK-T3".to_string(),
            customer_name: "UD Sentosa".to_string(),
            deadline: None,
            created_by: ctx.actor,
            lines: vec![CreateWorkOrderLineInput {
                item_id: Some(item.id),
                item_name: "Sofa Sudut".to_string(),
                quantity: 1,
                method: FulfillmentMethod::FromStock,
            }],
        })
        .await
        .expect("create");

    let err = ctx
        .purchasing
        .approve_trading(&[lines[0].id], ctx.actor)
        .await
        .expect_err("wrong method");
    assert_matches!(err, ServiceError::InvalidStatus(_));

    let ghost = Uuid::new_v4();
    let err = ctx.purchasing.approve_trading(&[ghost], ctx.actor).await.expect_err("missing");
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn duplicate_named_items_do_not_multiply_on_receipt() {
    let ctx = setup().await;
    seed_item(&ctx.db, "RM-C", "Cat Duco", ItemCategory::RawMaterial, 10, 0).await;

    let (po, _) = ctx
        .purchasing
        .create_purchase_order(CreatePurchaseOrderInput {
            number: "PO-008".to_string(),
            vendor_name: "Toko Cat Jaya".to_string(),
            work_order_number: None,
            created_by: ctx.actor,
            lines: vec![po_line("cat duco", 5)],
        })
        .await
        .expect("create po");
    ctx.purchasing.receive(po.id, Utc::now(), None, ctx.actor).await.expect("receive");

    let count = item::Entity::find().all(&*ctx.db).await.expect("items").len();
    assert_eq!(count, 1);
}
