mod common;

use assert_matches::assert_matches;
use fleet_repair::errors::ServiceError;
use fleet_repair::models::{
    LedgerReference, NewPurchaseRequisition, RequestType, RequisitionLine, RequisitionStatus,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use common::{at, TestShop};

fn line(stock_item_id: Option<Uuid>, description: &str, quantity: Decimal) -> RequisitionLine {
    RequisitionLine {
        stock_item_id,
        description: description.to_string(),
        quantity,
        unit_price: dec!(12.50),
        expected_date: None,
    }
}

fn requisition(lines: Vec<RequisitionLine>) -> NewPurchaseRequisition {
    NewPurchaseRequisition {
        request_type: RequestType::Product,
        lines,
        supplier: Some("Fleet Parts Wholesale".to_string()),
        work_order_id: None,
    }
}

#[test]
fn receiving_posts_every_stocked_line_once() {
    let shop = TestShop::new();
    let pads = shop.stock_item("BRK-PAD", dec!(2));
    let discs = shop.stock_item("BRK-DSC", dec!(0));
    let procurement = &shop.services.procurement;

    let draft = procurement
        .create(requisition(vec![
            line(Some(pads.id), "Brake pads", dec!(8)),
            line(Some(discs.id), "Brake discs", dec!(4)),
            line(None, "Workshop rags", dec!(1)),
        ]))
        .unwrap();
    assert_eq!(draft.requisition_number, "PR-2025-00001");
    assert_eq!(draft.total(), dec!(162.50));

    procurement
        .transition(draft.id, RequisitionStatus::PendingApproval)
        .unwrap();
    let approved = procurement.approve(draft.id, "M. Okafor").unwrap();
    assert_eq!(approved.requisition.approver.as_deref(), Some("M. Okafor"));
    assert_eq!(approved.requisition.approved_at, Some(at(2025, 1, 8, 9, 0)));
    procurement
        .transition(draft.id, RequisitionStatus::AwaitingGoods)
        .unwrap();

    let received = procurement
        .transition(draft.id, RequisitionStatus::Received)
        .unwrap();
    let receipts = received.receipts.unwrap();
    assert_eq!(receipts.posted.len(), 2);
    assert!(receipts.is_clean());
    assert!(received.requisition.received_at.is_some());

    let inventory = &shop.services.inventory;
    assert_eq!(inventory.get_stock_item(pads.id).unwrap().quantity_on_hand, dec!(10));
    assert_eq!(inventory.get_stock_item(discs.id).unwrap().quantity_on_hand, dec!(4));
    assert_eq!(
        inventory
            .transactions_for_reference(LedgerReference::Requisition(draft.id))
            .len(),
        2
    );

    let err = procurement
        .transition(draft.id, RequisitionStatus::Received)
        .unwrap_err();
    assert_matches!(err, ServiceError::PreconditionFailed(_));
    assert_eq!(inventory.get_stock_item(pads.id).unwrap().quantity_on_hand, dec!(10));
}

#[test]
fn approval_needs_an_approver() {
    let shop = TestShop::new();
    let procurement = &shop.services.procurement;
    let draft = procurement
        .create(requisition(vec![line(None, "Coolant", dec!(5))]))
        .unwrap();
    procurement
        .transition(draft.id, RequisitionStatus::PendingApproval)
        .unwrap();

    let err = procurement
        .transition(draft.id, RequisitionStatus::Approved)
        .unwrap_err();
    assert_matches!(err, ServiceError::PreconditionFailed(_));
    let err = procurement.approve(draft.id, "   ").unwrap_err();
    assert_matches!(err, ServiceError::PreconditionFailed(_));
    assert_eq!(
        procurement.get(draft.id).unwrap().status,
        RequisitionStatus::PendingApproval
    );
}

#[test]
fn empty_requisitions_cannot_be_submitted() {
    let shop = TestShop::new();
    let procurement = &shop.services.procurement;
    let draft = procurement.create(requisition(vec![])).unwrap();
    let err = procurement
        .transition(draft.id, RequisitionStatus::PendingApproval)
        .unwrap_err();
    assert_matches!(err, ServiceError::PreconditionFailed(_));
}

#[test]
fn returning_to_draft_clears_the_approval() {
    let shop = TestShop::new();
    let procurement = &shop.services.procurement;
    let draft = procurement
        .create(requisition(vec![line(None, "Grease", dec!(2))]))
        .unwrap();
    procurement
        .transition(draft.id, RequisitionStatus::PendingApproval)
        .unwrap();
    let back = procurement
        .transition(draft.id, RequisitionStatus::Draft)
        .unwrap();
    assert_eq!(back.previous_status, RequisitionStatus::PendingApproval);
    assert!(back.requisition.approver.is_none());

    let updated = procurement
        .update_lines(draft.id, vec![line(None, "Grease", dec!(6))])
        .unwrap();
    assert_eq!(updated.lines[0].quantity, dec!(6));
}

#[test]
fn lines_freeze_after_approval() {
    let shop = TestShop::new();
    let procurement = &shop.services.procurement;
    let draft = procurement
        .create(requisition(vec![line(None, "Bolts", dec!(50))]))
        .unwrap();
    procurement
        .transition(draft.id, RequisitionStatus::PendingApproval)
        .unwrap();
    procurement.approve(draft.id, "Stores lead").unwrap();

    let err = procurement
        .update_lines(draft.id, vec![line(None, "Bolts", dec!(500))])
        .unwrap_err();
    assert_matches!(err, ServiceError::PreconditionFailed(_));
}

#[test]
fn missing_stock_items_are_skipped_with_a_warning() {
    let shop = TestShop::new();
    let filters = shop.stock_item("AIR-FLT", dec!(1));
    let ghost = Uuid::new_v4();
    let procurement = &shop.services.procurement;
    let draft = procurement
        .create(requisition(vec![
            line(Some(ghost), "Retired SKU", dec!(3)),
            line(Some(filters.id), "Air filter", dec!(6)),
        ]))
        .unwrap();
    procurement
        .transition(draft.id, RequisitionStatus::PendingApproval)
        .unwrap();
    procurement.approve(draft.id, "Stores lead").unwrap();

    let received = procurement
        .transition(draft.id, RequisitionStatus::Received)
        .unwrap();
    assert_eq!(received.requisition.status, RequisitionStatus::Received);
    let receipts = received.receipts.unwrap();
    assert_eq!(receipts.posted.len(), 1);
    assert_eq!(receipts.warnings.len(), 1);
    assert_eq!(receipts.warnings[0].stock_item_id, Some(ghost));
    assert_eq!(
        shop.services
            .inventory
            .get_stock_item(filters.id)
            .unwrap()
            .quantity_on_hand,
        dec!(7)
    );
}

#[test]
fn cancellation_and_deletion_need_confirmation() {
    let shop = TestShop::new();
    let procurement = &shop.services.procurement;
    let draft = procurement
        .create(requisition(vec![line(None, "Paint", dec!(1))]))
        .unwrap();

    shop.deny_confirmations();
    let err = procurement
        .transition(draft.id, RequisitionStatus::Cancelled)
        .unwrap_err();
    assert_matches!(err, ServiceError::PreconditionFailed(_));
    let err = procurement.delete(draft.id).unwrap_err();
    assert_matches!(err, ServiceError::PreconditionFailed(_));

    shop.confirm.store(true, std::sync::atomic::Ordering::SeqCst);
    procurement
        .transition(draft.id, RequisitionStatus::Cancelled)
        .unwrap();
    let err = procurement
        .transition(draft.id, RequisitionStatus::Draft)
        .unwrap_err();
    assert_matches!(err, ServiceError::PreconditionFailed(_));

    procurement.delete(draft.id).unwrap();
    assert_matches!(procurement.get(draft.id), Err(ServiceError::NotFound(_)));
}

#[test]
fn approved_requisitions_cannot_be_deleted() {
    let shop = TestShop::new();
    let procurement = &shop.services.procurement;
    let draft = procurement
        .create(requisition(vec![line(None, "Tyres", dec!(4))]))
        .unwrap();
    procurement
        .transition(draft.id, RequisitionStatus::PendingApproval)
        .unwrap();
    procurement.approve(draft.id, "Fleet manager").unwrap();

    let err = procurement.delete(draft.id).unwrap_err();
    assert_matches!(err, ServiceError::PreconditionFailed(_));
    assert_eq!(
        procurement.list(Some(RequisitionStatus::Approved)).len(),
        1
    );
}

#[test]
fn invalid_lines_are_rejected() {
    let shop = TestShop::new();
    let err = shop
        .services
        .procurement
        .create(requisition(vec![line(None, "Nothing", dec!(0))]))
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(msg) if msg.contains("lines[0]"));
}
