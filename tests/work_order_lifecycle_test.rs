//! End-to-end work order lifecycle: reservation at creation, pure-flip
//! start, cancellation with release, terminal fulfillment and the
//! idempotent order-status aggregation.

mod common;

use assert_matches::assert_matches;
use uuid::Uuid;

use common::{seed_item, setup, stock_of, TestCtx};
use gudang_core::entities::item::ItemCategory;
use gudang_core::entities::work_order::WorkOrderStatus;
use gudang_core::entities::work_order_line::FulfillmentMethod;
use gudang_core::services::stock_ledger;
use gudang_core::services::work_orders::{CreateWorkOrderInput, CreateWorkOrderLineInput};
use gudang_core::ServiceError;

fn from_stock_line(item_id: Uuid, name: &str, qty: i32) -> CreateWorkOrderLineInput {
    CreateWorkOrderLineInput {
        item_id: Some(item_id),
        item_name: name.to_string(),
        quantity: qty,
        method: FulfillmentMethod::FromStock,
    }
}

fn order_input(number: &str, lines: Vec<CreateWorkOrderLineInput>, actor: Uuid) -> CreateWorkOrderInput {
    CreateWorkOrderInput {
        number: number.to_string(),
        customer_name: "PT Maju Jaya".to_string(),
        deadline: None,
        created_by: actor,
        lines,
    }
}

async fn two_line_order(ctx: &TestCtx) -> (Uuid, Uuid, Uuid) {
    let item_a = seed_item(&ctx.db, "FG-A", "Meja Rapat", ItemCategory::FinishedGood, 20, 0).await;
    let item_b = seed_item(&ctx.db, "FG-B", "Kursi Putar", ItemCategory::FinishedGood, 10, 0).await;
    let (order, _lines) = ctx
        .work_orders
        .create_work_order(order_input(
            "SPK-100",
            vec![
                from_stock_line(item_a.id, "Meja Rapat", 5),
                from_stock_line(item_b.id, "Kursi Putar", 3),
            ],
            ctx.actor,
        ))
        .await
        .expect("create order");
    (order.id, item_a.id, item_b.id)
}

#[tokio::test]
async fn creation_reserves_from_stock_lines_in_same_transaction() {
    let ctx = setup().await;
    let (order_id, item_a, item_b) = two_line_order(&ctx).await;

    let (order, lines) = ctx.work_orders.get_work_order(order_id).await.expect("get");
    assert_eq!(order.status, "QUEUE");
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|l| l.status == "RESERVED"));

    assert_eq!(stock_of(&ctx.db, item_a).await, (20, 5));
    assert_eq!(stock_of(&ctx.db, item_b).await, (10, 3));
}

#[tokio::test]
async fn duplicate_order_number_is_a_conflict() {
    let ctx = setup().await;
    let item = seed_item(&ctx.db, "FG-C", "Lemari Arsip", ItemCategory::FinishedGood, 9, 0).await;

    let input = order_input("SPK-200", vec![from_stock_line(item.id, "Lemari Arsip", 1)], ctx.actor);
    ctx.work_orders.create_work_order(input.clone()).await.expect("first");
    let err = ctx.work_orders.create_work_order(input).await.expect_err("second");
    assert_matches!(err, ServiceError::Conflict(_));
}

#[tokio::test]
async fn failed_creation_rolls_back_every_reservation() {
    let ctx = setup().await;
    let item_a = seed_item(&ctx.db, "FG-D", "Papan Tulis", ItemCategory::FinishedGood, 20, 0).await;
    let item_b = seed_item(&ctx.db, "FG-E", "Proyektor", ItemCategory::FinishedGood, 2, 0).await;

    let err = ctx
        .work_orders
        .create_work_order(order_input(
            "SPK-300",
            vec![
                from_stock_line(item_a.id, "Papan Tulis", 5),
                from_stock_line(item_b.id, "Proyektor", 3), // exceeds stock
            ],
            ctx.actor,
        ))
        .await
        .expect_err("must fail");
    assert_matches!(err, ServiceError::InsufficientStock(_));

    // The first line's reservation must not survive the rollback.
    assert_eq!(stock_of(&ctx.db, item_a.id).await, (20, 0));
    assert_eq!(stock_of(&ctx.db, item_b.id).await, (2, 0));
}

#[tokio::test]
async fn from_stock_line_requires_a_known_item() {
    let ctx = setup().await;
    let err = ctx
        .work_orders
        .create_work_order(order_input(
            "SPK-310",
            vec![CreateWorkOrderLineInput {
                item_id: None,
                item_name: "Barang Misterius".to_string(),
                quantity: 1,
                method: FulfillmentMethod::FromStock,
            }],
            ctx.actor,
        ))
        .await
        .expect_err("must fail");
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn start_is_a_pure_status_flip() {
    let ctx = setup().await;
    let (order_id, item_a, item_b) = two_line_order(&ctx).await;

    let started = ctx.work_orders.start_work_order(order_id).await.expect("start");
    assert_eq!(started.status, "IN_PROGRESS");
    // No stock side effects: reservation happened at creation.
    assert_eq!(stock_of(&ctx.db, item_a).await, (20, 5));
    assert_eq!(stock_of(&ctx.db, item_b).await, (10, 3));

    let err = ctx.work_orders.start_work_order(order_id).await.expect_err("double start");
    assert_matches!(err, ServiceError::InvalidStatus(_));
}

#[tokio::test]
async fn cancellation_releases_exactly_the_reserved_lines() {
    let ctx = setup().await;
    let (order_id, item_a, item_b) = two_line_order(&ctx).await;

    let cancelled = ctx.work_orders.cancel_work_order(order_id, ctx.actor).await.expect("cancel");
    assert_eq!(cancelled.status, "CANCELLED");

    let (_, lines) = ctx.work_orders.get_work_order(order_id).await.expect("get");
    assert!(lines.iter().all(|l| l.status == "CANCELLED"));

    // reservedStock reduced by 5 + 3; currentStock unchanged throughout.
    assert_eq!(stock_of(&ctx.db, item_a).await, (20, 0));
    assert_eq!(stock_of(&ctx.db, item_b).await, (10, 0));

    let err = ctx.work_orders.cancel_work_order(order_id, ctx.actor).await.expect_err("again");
    assert_matches!(err, ServiceError::InvalidStatus(_));
}

#[tokio::test]
async fn cancellation_releases_ready_but_unfulfilled_lines() {
    let ctx = setup().await;
    let item = seed_item(&ctx.db, "FG-R", "Meja Bundar", ItemCategory::FinishedGood, 10, 0).await;
    let (order, lines) = ctx
        .work_orders
        .create_work_order(order_input(
            "SPK-350",
            vec![from_stock_line(item.id, "Meja Bundar", 5)],
            ctx.actor,
        ))
        .await
        .expect("create");

    // Ready, but nothing fulfilled: the reservation is still live.
    ctx.work_orders.mark_line_ready(lines[0].id).await.expect("ready");
    assert_eq!(stock_of(&ctx.db, item.id).await, (10, 5));

    ctx.work_orders.cancel_work_order(order.id, ctx.actor).await.expect("cancel");

    let (_, lines) = ctx.work_orders.get_work_order(order.id).await.expect("get");
    assert_eq!(lines[0].status, "CANCELLED");
    assert_eq!(stock_of(&ctx.db, item.id).await, (10, 0));
}

#[tokio::test]
async fn cancellation_leaves_fulfilled_lines_untouched() {
    let ctx = setup().await;
    let (order_id, item_a, item_b) = two_line_order(&ctx).await;
    ctx.work_orders.start_work_order(order_id).await.expect("start");

    let (_, lines) = ctx.work_orders.get_work_order(order_id).await.expect("get");
    let line_a = lines.iter().find(|l| l.item_id == Some(item_a)).expect("line a");

    ctx.work_orders.mark_line_ready(line_a.id).await.expect("ready");
    ctx.work_orders
        .approve_from_stock(&[line_a.id], ctx.actor)
        .await
        .expect("approve");
    assert_eq!(stock_of(&ctx.db, item_a).await, (15, 0));

    ctx.work_orders.cancel_work_order(order_id, ctx.actor).await.expect("cancel");

    let (_, lines) = ctx.work_orders.get_work_order(order_id).await.expect("get");
    let line_a = lines.iter().find(|l| l.item_id == Some(item_a)).expect("line a");
    let line_b = lines.iter().find(|l| l.item_id == Some(item_b)).expect("line b");
    // Delivered stock is not clawed back.
    assert_eq!(line_a.status, "FULFILLED");
    assert_eq!(line_b.status, "CANCELLED");
    assert_eq!(stock_of(&ctx.db, item_a).await, (15, 0));
    assert_eq!(stock_of(&ctx.db, item_b).await, (10, 0));
}

#[tokio::test]
async fn approval_fulfills_and_journals_once() {
    let ctx = setup().await;
    let item = seed_item(&ctx.db, "FG-F", "Meja Kasir", ItemCategory::FinishedGood, 100, 0).await;
    let (order, lines) = ctx
        .work_orders
        .create_work_order(order_input(
            "SPK-400",
            vec![from_stock_line(item.id, "Meja Kasir", 30)],
            ctx.actor,
        ))
        .await
        .expect("create");
    ctx.work_orders.start_work_order(order.id).await.expect("start");

    // A line that was never marked ready is not approvable.
    let err = ctx
        .work_orders
        .approve_from_stock(&[lines[0].id], ctx.actor)
        .await
        .expect_err("not ready");
    assert_matches!(err, ServiceError::InvalidStatus(_));
    assert_eq!(stock_of(&ctx.db, item.id).await, (100, 30));

    ctx.work_orders.mark_line_ready(lines[0].id).await.expect("ready");
    let approved = ctx
        .work_orders
        .approve_from_stock(&[lines[0].id], ctx.actor)
        .await
        .expect("approve");
    assert_eq!(approved[0].status, "FULFILLED");
    assert_eq!(approved[0].ready_qty, 30);

    assert_eq!(stock_of(&ctx.db, item.id).await, (70, 0));

    let journal = stock_ledger::journal_for(&*ctx.db, item.id).await.expect("journal");
    assert_eq!(journal.len(), 1);
    assert_eq!(journal[0].direction, "OUT");
    assert_eq!(journal[0].source, "CUSTOMER_ORDER");
    assert_eq!(journal[0].quantity, 30);
    assert_eq!(journal[0].order_reference.as_deref(), Some("SPK-400"));

    let history = stock_ledger::history_for(&*ctx.db, item.id).await.expect("history");
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn aggregation_walks_ready_shipping_partial_done() {
    let ctx = setup().await;
    let (order_id, item_a, item_b) = two_line_order(&ctx).await;
    ctx.work_orders.start_work_order(order_id).await.expect("start");

    let (_, lines) = ctx.work_orders.get_work_order(order_id).await.expect("get");
    let ids: Vec<Uuid> = lines.iter().map(|l| l.id).collect();

    for &id in &ids {
        ctx.work_orders.mark_line_ready(id).await.expect("ready");
    }
    ctx.work_orders.approve_from_stock(&ids, ctx.actor).await.expect("approve both");
    let (order, lines) = ctx.work_orders.get_work_order(order_id).await.expect("get");
    assert_eq!(order.status, "READY_TO_SHIP");

    ctx.work_orders.mark_shipping(order_id).await.expect("shipping");

    let line_a = lines.iter().find(|l| l.item_id == Some(item_a)).expect("a");
    let line_b = lines.iter().find(|l| l.item_id == Some(item_b)).expect("b");

    ctx.work_orders.ship_line(line_a.id, 5, ctx.actor).await.expect("ship a");
    let (order, _) = ctx.work_orders.get_work_order(order_id).await.expect("get");
    assert_eq!(order.status, "PARTIAL");

    ctx.work_orders.ship_line(line_b.id, 3, ctx.actor).await.expect("ship b");
    let (order, _) = ctx.work_orders.get_work_order(order_id).await.expect("get");
    assert_eq!(order.status, "DONE");
}

#[tokio::test]
async fn status_recomputation_is_idempotent() {
    let ctx = setup().await;
    let (order_id, _, _) = two_line_order(&ctx).await;
    ctx.work_orders.start_work_order(order_id).await.expect("start");

    let (_, lines) = ctx.work_orders.get_work_order(order_id).await.expect("get");
    let ids: Vec<Uuid> = lines.iter().map(|l| l.id).collect();
    for &id in &ids {
        ctx.work_orders.mark_line_ready(id).await.expect("ready");
    }
    ctx.work_orders.approve_from_stock(&ids, ctx.actor).await.expect("approve");

    let first = ctx.work_orders.refresh_order_status(order_id).await.expect("refresh");
    assert_eq!(first, WorkOrderStatus::ReadyToShip);
    let (order_after_first, _) = ctx.work_orders.get_work_order(order_id).await.expect("get");

    let second = ctx.work_orders.refresh_order_status(order_id).await.expect("refresh again");
    assert_eq!(second, WorkOrderStatus::ReadyToShip);
    let (order_after_second, _) = ctx.work_orders.get_work_order(order_id).await.expect("get");

    // No intervening line change: same status and no additional write.
    assert_eq!(order_after_first.status, order_after_second.status);
    assert_eq!(order_after_first.updated_at, order_after_second.updated_at);
}

#[tokio::test]
async fn shipping_is_bounded_by_ready_quantity() {
    let ctx = setup().await;
    let (order_id, item_a, _) = two_line_order(&ctx).await;
    ctx.work_orders.start_work_order(order_id).await.expect("start");

    let (_, lines) = ctx.work_orders.get_work_order(order_id).await.expect("get");
    let line_a = lines.iter().find(|l| l.item_id == Some(item_a)).expect("a");

    // Nothing ready yet.
    let err = ctx.work_orders.ship_line(line_a.id, 1, ctx.actor).await.expect_err("not ready");
    assert_matches!(err, ServiceError::ValidationError(_));

    ctx.work_orders.mark_line_ready(line_a.id).await.expect("ready");
    ctx.work_orders.approve_from_stock(&[line_a.id], ctx.actor).await.expect("approve");
    let err = ctx.work_orders.ship_line(line_a.id, 6, ctx.actor).await.expect_err("too much");
    assert_matches!(err, ServiceError::ValidationError(_));
    ctx.work_orders.ship_line(line_a.id, 5, ctx.actor).await.expect("exact");
}

#[tokio::test]
async fn mark_line_ready_flags_reserved_from_stock_lines() {
    let ctx = setup().await;
    let (order_id, item_a, _) = two_line_order(&ctx).await;
    ctx.work_orders.start_work_order(order_id).await.expect("start");

    let (_, lines) = ctx.work_orders.get_work_order(order_id).await.expect("get");
    let line_a = lines.iter().find(|l| l.item_id == Some(item_a)).expect("a");

    let ready = ctx.work_orders.mark_line_ready(line_a.id).await.expect("ready");
    assert_eq!(ready.status, "COMPLETED");
    assert_eq!(ready.ready_qty, 5);

    // Stock untouched until approval.
    assert_eq!(stock_of(&ctx.db, item_a).await, (20, 5));

    let err = ctx.work_orders.mark_line_ready(line_a.id).await.expect_err("twice");
    assert_matches!(err, ServiceError::InvalidStatus(_));
}
