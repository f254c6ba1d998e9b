// Scheduling
pub mod calendar;
pub mod estimation;

// Work orders
pub mod categories;
pub mod dispositions;
pub mod numbering;
pub mod work_orders;

// Inventory and purchasing
pub mod inventory;
pub mod procurement;

use std::sync::Arc;

use crate::{
    collaborators::Collaborators,
    config::AppConfig,
    events::EventSender,
    services::{
        categories::CategoryRegistry, dispositions::DispositionResolver,
        estimation::EstimationPlanner, inventory::InventoryLedger, numbering::SequenceAllocator,
        procurement::ProcurementService, work_orders::WorkOrderService,
    },
};

/// Every service of the core, wired to one shared ledger and number allocator.
#[derive(Clone)]
pub struct AppServices {
    pub work_orders: Arc<WorkOrderService>,
    pub procurement: Arc<ProcurementService>,
    pub inventory: Arc<InventoryLedger>,
    pub dispositions: Arc<DispositionResolver>,
    pub categories: Arc<CategoryRegistry>,
    pub numbers: Arc<SequenceAllocator>,
    pub planner: EstimationPlanner,
}

impl AppServices {
    /// Builds the services with a fresh number allocator.
    pub fn build(
        config: &AppConfig,
        collaborators: Collaborators,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self::build_with_numbers(
            config,
            collaborators,
            event_sender,
            Arc::new(SequenceAllocator::new()),
        )
    }

    /// Builds the services around an allocator already seeded with issued numbers.
    pub fn build_with_numbers(
        config: &AppConfig,
        collaborators: Collaborators,
        event_sender: Option<EventSender>,
        numbers: Arc<SequenceAllocator>,
    ) -> Self {
        let Collaborators {
            clock,
            holidays,
            technicians,
            confirmation,
        } = collaborators;

        let planner = EstimationPlanner::new(clock.clone(), holidays);
        let inventory = Arc::new(InventoryLedger::new(
            clock.clone(),
            &config.ledger_actor,
            event_sender.clone(),
        ));
        let dispositions = Arc::new(DispositionResolver::new(
            inventory.clone(),
            clock.clone(),
            event_sender.clone(),
        ));
        let categories = Arc::new(CategoryRegistry::new());

        let work_orders = Arc::new(WorkOrderService::new(
            numbers.clone(),
            &config.work_order_prefix,
            planner.clone(),
            inventory.clone(),
            dispositions.clone(),
            categories.clone(),
            clock.clone(),
            technicians,
            confirmation.clone(),
            event_sender.clone(),
        ));
        let procurement = Arc::new(ProcurementService::new(
            numbers.clone(),
            &config.requisition_prefix,
            inventory.clone(),
            clock,
            confirmation,
            event_sender,
        ));

        Self {
            work_orders,
            procurement,
            inventory,
            dispositions,
            categories,
            numbers,
            planner,
        }
    }
}
