//! Parts inventory ledger.
//!
//! Every quantity change is an append-only [`StockTransaction`] and the on-hand
//! quantity of an item always equals the sum of its transactions. Each posting
//! carries a [`PostingKey`]; the key index admits at most one transaction per key,
//! so replays and concurrent completions of the same work order are no-ops.
//!
//! Lock order is `postings` → `items` → `journal`. Nothing acquires them in
//! another order.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::collaborators::Clock;
use crate::errors::ServiceError;
use crate::events::{self, Event, EventSender};
use crate::models::{
    LedgerReference, NewStockItem, PostingKey, PostingKind, PurchaseRequisition, StockItem,
    StockStatus, StockTransaction, TransactionType, WorkOrder,
};

/// A batch line that could not be posted. The rest of the batch still posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineWarning {
    pub reference: LedgerReference,
    pub stock_item_id: Option<Uuid>,
    pub part_name: String,
    pub message: String,
}

/// Outcome of a batch posting.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PostingReport {
    pub posted: Vec<StockTransaction>,
    pub duplicates: usize,
    pub warnings: Vec<LineWarning>,
}

impl PostingReport {
    pub fn merge(&mut self, other: PostingReport) {
        self.posted.extend(other.posted);
        self.duplicates += other.duplicates;
        self.warnings.extend(other.warnings);
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PostOutcome {
    Posted(StockTransaction),
    Duplicate,
}

/// One movement to record against a single stock item.
#[derive(Debug, Clone)]
pub struct PostingRequest {
    pub key: PostingKey,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub note: Option<String>,
}

pub struct InventoryLedger {
    items: DashMap<Uuid, StockItem>,
    codes: DashMap<String, Uuid>,
    journal: DashMap<Uuid, Vec<StockTransaction>>,
    postings: DashMap<PostingKey, Uuid>,
    clock: Arc<dyn Clock>,
    actor: String,
    event_sender: Option<EventSender>,
}

impl InventoryLedger {
    pub fn new(clock: Arc<dyn Clock>, actor: &str, event_sender: Option<EventSender>) -> Self {
        Self {
            items: DashMap::new(),
            codes: DashMap::new(),
            journal: DashMap::new(),
            postings: DashMap::new(),
            clock,
            actor: actor.to_string(),
            event_sender,
        }
    }

    /// Registers a stock item. A positive opening quantity is posted as a receipt.
    #[instrument(skip(self, new_item), fields(code = %new_item.code))]
    pub fn register_stock_item(&self, new_item: NewStockItem) -> Result<StockItem, ServiceError> {
        new_item.validate()?;
        if let Some(max) = new_item.maximum_threshold {
            if max < new_item.minimum_threshold {
                return Err(ServiceError::ValidationError(format!(
                    "maximum_threshold: {} is below the minimum threshold {}",
                    max, new_item.minimum_threshold
                )));
            }
        }

        let id = Uuid::new_v4();
        match self.codes.entry(new_item.code.clone()) {
            Entry::Occupied(_) => {
                return Err(ServiceError::ValidationError(format!(
                    "code: stock item code '{}' already exists",
                    new_item.code
                )))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(id);
            }
        }

        let now = self.clock.now();
        let item = StockItem {
            id,
            code: new_item.code,
            name: new_item.name,
            unit: new_item.unit,
            quantity_on_hand: Decimal::ZERO,
            minimum_threshold: new_item.minimum_threshold,
            maximum_threshold: new_item.maximum_threshold,
            status: StockStatus::derive(
                Decimal::ZERO,
                new_item.minimum_threshold,
                new_item.maximum_threshold,
            ),
            is_fungible_used_item: new_item.is_fungible_used_item,
            is_revolving_part: new_item.is_revolving_part,
            updated_at: now,
        };
        self.items.insert(id, item);
        self.journal.insert(id, Vec::new());

        if new_item.opening_quantity > Decimal::ZERO {
            self.post(PostingRequest {
                key: PostingKey {
                    reference: LedgerReference::OpeningBalance(id),
                    stock_item_id: id,
                    kind: PostingKind::Opening,
                },
                quantity: new_item.opening_quantity,
                unit_price: new_item.unit_price,
                note: Some("opening balance".to_string()),
            })?;
        }

        info!(stock_item_id = %id, "Stock item registered");
        self.get_stock_item(id)
    }

    /// Records one movement unless its key was already posted.
    ///
    /// The key check and the write happen under the key's shard lock, so two
    /// callers racing on the same key produce exactly one transaction.
    pub fn post(&self, request: PostingRequest) -> Result<PostOutcome, ServiceError> {
        let PostingRequest {
            key,
            quantity,
            unit_price,
            note,
        } = request;
        let stock_item_id = key.stock_item_id;

        let (transaction, snapshot) = match self.postings.entry(key) {
            Entry::Occupied(_) => {
                metrics::counter!("fleet_repair.ledger.duplicates", 1);
                return Ok(PostOutcome::Duplicate);
            }
            Entry::Vacant(vacant) => {
                let mut item = self
                    .items
                    .get_mut(&stock_item_id)
                    .ok_or_else(|| ServiceError::not_found("stock item", stock_item_id))?;

                let kind = vacant.key().kind.clone();
                let transaction_type = kind.transaction_type();
                let signed = match transaction_type {
                    TransactionType::Withdrawal => -quantity.abs(),
                    TransactionType::Receipt => quantity.abs(),
                };
                let now = self.clock.now();
                let transaction = StockTransaction {
                    id: Uuid::new_v4(),
                    stock_item_id,
                    transaction_type,
                    quantity: signed,
                    occurred_at: now,
                    actor: self.actor.clone(),
                    note,
                    reference: vacant.key().reference,
                    unit_price,
                    posting_kind: kind,
                };

                item.apply_delta(signed, now);
                self.journal
                    .entry(stock_item_id)
                    .or_default()
                    .push(transaction.clone());
                vacant.insert(transaction.id);
                (transaction, item.clone())
            }
        };

        metrics::counter!("fleet_repair.ledger.postings", 1);
        info!(
            stock_item_id = %stock_item_id,
            transaction_id = %transaction.id,
            quantity = %transaction.quantity,
            on_hand = %snapshot.quantity_on_hand,
            reference = %transaction.reference,
            "Stock posted"
        );
        if snapshot.quantity_on_hand < Decimal::ZERO {
            warn!(
                stock_item_id = %stock_item_id,
                on_hand = %snapshot.quantity_on_hand,
                "Stock item went negative"
            );
        }

        events::publish(
            &self.event_sender,
            Event::StockPosted {
                stock_item_id,
                transaction_id: transaction.id,
                quantity: transaction.quantity,
                quantity_on_hand: snapshot.quantity_on_hand,
            },
        );
        if snapshot.needs_reorder() {
            events::publish(
                &self.event_sender,
                Event::LowStock {
                    stock_item_id,
                    quantity_on_hand: snapshot.quantity_on_hand,
                    minimum_threshold: snapshot.minimum_threshold,
                },
            );
        }

        Ok(PostOutcome::Posted(transaction))
    }

    /// Posts one withdrawal per internal stock item consumed by the work order.
    ///
    /// Lines naming the same stock item are summed into a single posting. Items
    /// already withdrawn for this work order are skipped.
    #[instrument(skip(self, work_order), fields(work_order_id = %work_order.id))]
    pub fn post_withdrawals(&self, work_order: &WorkOrder) -> PostingReport {
        let reference = LedgerReference::WorkOrder(work_order.id);
        let mut grouped: Vec<(Uuid, Decimal, Decimal, Vec<&str>)> = Vec::new();

        for line in work_order.parts.iter().filter(|p| p.consumes_internal_stock()) {
            let Some(stock_item_id) = line.stock_item_id else {
                continue;
            };
            match grouped.iter_mut().find(|(id, ..)| *id == stock_item_id) {
                Some((_, quantity, _, names)) => {
                    *quantity += line.quantity;
                    if !names.contains(&line.name.as_str()) {
                        names.push(line.name.as_str());
                    }
                }
                None => grouped.push((
                    stock_item_id,
                    line.quantity,
                    line.unit_price,
                    vec![line.name.as_str()],
                )),
            }
        }

        let mut report = PostingReport::default();
        for (stock_item_id, quantity, unit_price, names) in grouped {
            let part_name = names.join(", ");
            let request = PostingRequest {
                key: PostingKey {
                    reference,
                    stock_item_id,
                    kind: PostingKind::Withdrawal,
                },
                quantity,
                unit_price,
                note: Some(format!("used on {}: {}", work_order.order_number, part_name)),
            };
            self.record(&mut report, request, &part_name);
        }

        if !report.posted.is_empty() {
            info!(
                posted = report.posted.len(),
                duplicates = report.duplicates,
                "Work-order withdrawals posted"
            );
        }
        report
    }

    /// Posts a receipt for every requisition line that names a stock item.
    #[instrument(skip(self, requisition), fields(requisition_id = %requisition.id))]
    pub fn post_receipt(&self, requisition: &PurchaseRequisition) -> PostingReport {
        let reference = LedgerReference::Requisition(requisition.id);
        let mut report = PostingReport::default();

        for (line_index, line) in requisition.lines.iter().enumerate() {
            let Some(stock_item_id) = line.stock_item_id else {
                continue;
            };
            let request = PostingRequest {
                key: PostingKey {
                    reference,
                    stock_item_id,
                    kind: PostingKind::RequisitionReceipt { line: line_index },
                },
                quantity: line.quantity,
                unit_price: line.unit_price,
                note: Some(format!(
                    "received on {}: {}",
                    requisition.requisition_number, line.description
                )),
            };
            self.record(&mut report, request, &line.description);
        }

        info!(
            posted = report.posted.len(),
            duplicates = report.duplicates,
            skipped = report.warnings.len(),
            "Requisition receipt posted"
        );
        report
    }

    /// Posts into `report`, turning a missing stock item into a warning.
    pub(crate) fn record(&self, report: &mut PostingReport, request: PostingRequest, part_name: &str) {
        let reference = request.key.reference;
        let stock_item_id = request.key.stock_item_id;
        match self.post(request) {
            Ok(PostOutcome::Posted(transaction)) => report.posted.push(transaction),
            Ok(PostOutcome::Duplicate) => report.duplicates += 1,
            Err(e) => {
                warn!(
                    stock_item_id = %stock_item_id,
                    part = part_name,
                    reference = %reference,
                    "Skipping ledger line: {}",
                    e
                );
                metrics::counter!("fleet_repair.ledger.skipped_lines", 1);
                report.warnings.push(LineWarning {
                    reference,
                    stock_item_id: Some(stock_item_id),
                    part_name: part_name.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    pub fn get_stock_item(&self, id: Uuid) -> Result<StockItem, ServiceError> {
        self.items
            .get(&id)
            .map(|item| item.clone())
            .ok_or_else(|| ServiceError::not_found("stock item", id))
    }

    pub fn find_by_code(&self, code: &str) -> Option<StockItem> {
        let id = self.codes.get(code).map(|id| *id)?;
        self.items.get(&id).map(|item| item.clone())
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.items.contains_key(&id)
    }

    /// Transactions of one item, oldest first.
    pub fn transactions_for(&self, stock_item_id: Uuid) -> Vec<StockTransaction> {
        self.journal
            .get(&stock_item_id)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// All transactions posted against a document, across items.
    pub fn transactions_for_reference(&self, reference: LedgerReference) -> Vec<StockTransaction> {
        let mut found: Vec<StockTransaction> = self
            .journal
            .iter()
            .flat_map(|entries| {
                entries
                    .iter()
                    .filter(|t| t.reference == reference)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        found.sort_by_key(|t| t.occurred_at);
        found
    }

    pub fn is_posted(&self, key: &PostingKey) -> bool {
        self.postings.contains_key(key)
    }

    /// Checks that on-hand equals the running sum of the item's transactions.
    pub fn verify_balance(&self, stock_item_id: Uuid) -> Result<bool, ServiceError> {
        let item = self.get_stock_item(stock_item_id)?;
        let sum: Decimal = self
            .transactions_for(stock_item_id)
            .iter()
            .map(|t| t.quantity)
            .sum();
        if sum != item.quantity_on_hand {
            warn!(
                stock_item_id = %stock_item_id,
                on_hand = %item.quantity_on_hand,
                journal_sum = %sum,
                "Stock balance does not match journal"
            );
        }
        Ok(sum == item.quantity_on_hand)
    }

    /// Items at or below their minimum threshold, ordered by code.
    pub fn items_needing_reorder(&self) -> Vec<StockItem> {
        let mut items: Vec<StockItem> = self
            .items
            .iter()
            .filter(|item| item.needs_reorder())
            .map(|item| item.clone())
            .collect();
        items.sort_by(|a, b| a.code.cmp(&b.code));
        items
    }
}
