#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use fleet_repair::{
    collaborators::{Collaborators, InMemoryTechnicianDirectory, ManualClock, StaticHolidays},
    config::AppConfig,
    events::{Event, EventSender},
    models::{NewStockItem, NewWorkOrder, PartRequisitionItem, StockItem, WorkOrder},
    services::AppServices,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use uuid::Uuid;

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, 0)
        .unwrap()
}

/// Harness wiring every service to a manual clock and a switchable confirmation gate.
pub struct TestShop {
    pub services: AppServices,
    pub clock: Arc<ManualClock>,
    pub technicians: Arc<InMemoryTechnicianDirectory>,
    pub technician: Uuid,
    pub confirm: Arc<AtomicBool>,
    pub events: Option<mpsc::Receiver<Event>>,
}

impl TestShop {
    /// Shop opened on Wednesday 2025-01-08 at 09:00, no holidays.
    pub fn new() -> Self {
        Self::with_holidays(&[])
    }

    pub fn with_holidays(holidays: &[NaiveDate]) -> Self {
        let clock = Arc::new(ManualClock::new(at(2025, 1, 8, 9, 0)));
        let technician = Uuid::new_v4();
        let technicians = Arc::new(InMemoryTechnicianDirectory::new([technician]));
        let confirm = Arc::new(AtomicBool::new(true));
        let gate = {
            let confirm = confirm.clone();
            move |_label: &str| confirm.load(Ordering::SeqCst)
        };
        let (sender, rx) = EventSender::channel(256);

        let collaborators = Collaborators::new(
            clock.clone(),
            Arc::new(StaticHolidays::new(holidays.iter().copied())),
            technicians.clone(),
            Arc::new(gate),
        );
        let services = AppServices::build(&AppConfig::default(), collaborators, Some(sender));

        Self {
            services,
            clock,
            technicians,
            technician,
            confirm,
            events: Some(rx),
        }
    }

    pub fn deny_confirmations(&self) {
        self.confirm.store(false, Ordering::SeqCst);
    }

    pub fn stock_item(&self, code: &str, opening: Decimal) -> StockItem {
        self.services
            .inventory
            .register_stock_item(NewStockItem {
                code: code.to_string(),
                name: format!("{} part", code),
                unit: "pcs".to_string(),
                opening_quantity: opening,
                unit_price: dec!(15),
                minimum_threshold: dec!(2),
                maximum_threshold: None,
                is_fungible_used_item: false,
                is_revolving_part: false,
            })
            .unwrap()
    }

    pub fn fungible_bin(&self, code: &str) -> StockItem {
        self.services
            .inventory
            .register_stock_item(NewStockItem {
                code: code.to_string(),
                name: format!("{} used bin", code),
                unit: "pcs".to_string(),
                opening_quantity: Decimal::ZERO,
                unit_price: Decimal::ZERO,
                minimum_threshold: Decimal::ZERO,
                maximum_threshold: None,
                is_fungible_used_item: true,
                is_revolving_part: false,
            })
            .unwrap()
    }

    pub fn work_order(&self, parts: Vec<PartRequisitionItem>) -> WorkOrder {
        self.services
            .work_orders
            .create(new_work_order(parts))
            .unwrap()
    }

    /// Creates an order, assigns the harness technician and starts the repair.
    pub fn started_work_order(&self, parts: Vec<PartRequisitionItem>) -> WorkOrder {
        let order = self.work_order(parts);
        self.services
            .work_orders
            .assign_technicians(order.id, self.technician, vec![])
            .unwrap();
        self.services
            .work_orders
            .transition(order.id, fleet_repair::models::WorkOrderStatus::InProgress)
            .unwrap()
            .work_order
    }

    /// Drains every event published so far.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut drained = Vec::new();
        if let Some(rx) = self.events.as_mut() {
            while let Ok(event) = rx.try_recv() {
                drained.push(event);
            }
        }
        drained
    }
}

pub fn new_work_order(parts: Vec<PartRequisitionItem>) -> NewWorkOrder {
    NewWorkOrder {
        vehicle_id: Uuid::new_v4(),
        priority: Default::default(),
        problem_description: "Brakes squeal under load".to_string(),
        category: None,
        parts,
        estimated_start: None,
        estimated_hours: dec!(3),
        estimation_note: None,
        labor_cost: dec!(120),
        labor_taxed: true,
        labor_tax_rate: dec!(0.10),
        parts_tax: dec!(4.50),
    }
}
