//! Phase graph: the seven phases, their teams, and the exit edges.

use chrono::Duration;
use event_log::EventType;
use serde::{Deserialize, Serialize};

use crate::facts::PhaseData;

/// Lifecycle phase of an order, in graph order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "Order Creation")]
    OrderCreation,
    #[serde(rename = "Order Processing")]
    OrderProcessing,
    #[serde(rename = "Material Planning")]
    MaterialPlanning,
    #[serde(rename = "Production Planning")]
    ProductionPlanning,
    #[serde(rename = "Quality Assurance")]
    QualityAssurance,
    #[serde(rename = "Fulfillment")]
    Fulfillment,
    #[serde(rename = "Post-Delivery")]
    PostDelivery,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::OrderCreation,
        Phase::OrderProcessing,
        Phase::MaterialPlanning,
        Phase::ProductionPlanning,
        Phase::QualityAssurance,
        Phase::Fulfillment,
        Phase::PostDelivery,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrderCreation => "Order Creation",
            Self::OrderProcessing => "Order Processing",
            Self::MaterialPlanning => "Material Planning",
            Self::ProductionPlanning => "Production Planning",
            Self::QualityAssurance => "Quality Assurance",
            Self::Fulfillment => "Fulfillment",
            Self::PostDelivery => "Post-Delivery",
        }
    }

    /// What the phase covers, as shown in dashboards.
    pub const fn description(self) -> &'static str {
        match self {
            Self::OrderCreation => "Customer requirement capture",
            Self::OrderProcessing => "Validation and approval",
            Self::MaterialPlanning => "Procurement requirements",
            Self::ProductionPlanning => "Manufacturing schedule",
            Self::QualityAssurance => "Inspection and testing",
            Self::Fulfillment => "Packaging and shipping",
            Self::PostDelivery => "Returns and warranty",
        }
    }

    /// Position in the graph, 0-based. Never decreases over a lifecycle.
    pub const fn index(self) -> usize {
        match self {
            Self::OrderCreation => 0,
            Self::OrderProcessing => 1,
            Self::MaterialPlanning => 2,
            Self::ProductionPlanning => 3,
            Self::QualityAssurance => 4,
            Self::Fulfillment => 5,
            Self::PostDelivery => 6,
        }
    }

    /// Teams responsible while an order sits in this phase.
    pub const fn teams(self) -> &'static [&'static str] {
        match self {
            Self::OrderCreation => &["sales_team", "customer_service"],
            Self::OrderProcessing => &["order_processing", "inventory_team"],
            Self::MaterialPlanning => &["procurement_team", "mrp_team"],
            Self::ProductionPlanning => &["production_planning", "manufacturing_team"],
            Self::QualityAssurance => &["quality_team", "inspection_team"],
            Self::Fulfillment => &["fulfillment_team", "shipping_team"],
            Self::PostDelivery => &["customer_service", "warranty_team"],
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl PhaseStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicate gating an exit edge, evaluated against the accumulated facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    CustomerRequirementsComplete,
    CreditCheckPassed,
    OrderValidated,
    ApprovalComplete,
    MrpCalculationComplete,
    ProcurementInitiated,
    ManufacturingComplete,
    InitialInspectionDone,
    QualityTestsPassed,
    DocumentationComplete,
    PackagingComplete,
    ShippingConfirmed,
}

impl Precondition {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CustomerRequirementsComplete => "customer_requirements_complete",
            Self::CreditCheckPassed => "credit_check_passed",
            Self::OrderValidated => "order_validated",
            Self::ApprovalComplete => "approval_complete",
            Self::MrpCalculationComplete => "mrp_calculation_complete",
            Self::ProcurementInitiated => "procurement_initiated",
            Self::ManufacturingComplete => "manufacturing_complete",
            Self::InitialInspectionDone => "initial_inspection_done",
            Self::QualityTestsPassed => "quality_tests_passed",
            Self::DocumentationComplete => "documentation_complete",
            Self::PackagingComplete => "packaging_complete",
            Self::ShippingConfirmed => "shipping_confirmed",
        }
    }

    /// Whether the predicate holds for the given facts.
    ///
    /// `ManufacturingComplete` reads the production-scheduled fact and
    /// `PackagingComplete` the order-shipped fact: production and packaging
    /// report no events of their own, so the nearest upstream fact stands in.
    pub fn holds(self, data: &PhaseData) -> bool {
        match self {
            Self::CustomerRequirementsComplete => data.requirements_complete,
            Self::CreditCheckPassed => data.credit_check_passed,
            Self::OrderValidated => data.validation_complete,
            Self::ApprovalComplete => data.approval_complete,
            Self::MrpCalculationComplete => data.mrp_calculation_complete,
            Self::ProcurementInitiated => data.procurement_initiated,
            Self::ManufacturingComplete => data.production_scheduled,
            Self::InitialInspectionDone => data.initial_inspection_done,
            Self::QualityTestsPassed => data.quality_passed,
            Self::DocumentationComplete => data.documentation_complete,
            Self::PackagingComplete => data.order_shipped,
            Self::ShippingConfirmed => data.shipping_confirmed,
        }
    }
}

/// Entry action executed while traversing an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseAction {
    ValidateOrder,
    AssignApprover,
    CalculateMaterialRequirements,
    CheckInventory,
    ScheduleProduction,
    AllocateResources,
    ScheduleQualityTests,
    PrepareTestEquipment,
    PreparePackaging,
    ScheduleShipping,
    TrackDelivery,
    PrepareWarrantyDocs,
}

impl PhaseAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidateOrder => "validate_order",
            Self::AssignApprover => "assign_approver",
            Self::CalculateMaterialRequirements => "calculate_material_requirements",
            Self::CheckInventory => "check_inventory",
            Self::ScheduleProduction => "schedule_production",
            Self::AllocateResources => "allocate_resources",
            Self::ScheduleQualityTests => "schedule_quality_tests",
            Self::PrepareTestEquipment => "prepare_test_equipment",
            Self::PreparePackaging => "prepare_packaging",
            Self::ScheduleShipping => "schedule_shipping",
            Self::TrackDelivery => "track_delivery",
            Self::PrepareWarrantyDocs => "prepare_warranty_docs",
        }
    }
}

/// One exit edge in the phase graph.
#[derive(Debug, Clone, Copy)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
    /// Event type that prompts evaluation of this edge.
    pub trigger: EventType,
    pub preconditions: &'static [Precondition],
    pub actions: &'static [PhaseAction],
    pub estimated_hours: i64,
}

impl PhaseTransition {
    pub fn duration(&self) -> Duration {
        Duration::hours(self.estimated_hours)
    }
}

/// The fixed phase graph: one exit edge per phase, none out of Post-Delivery.
pub const TRANSITIONS: [PhaseTransition; 6] = [
    PhaseTransition {
        from: Phase::OrderCreation,
        to: Phase::OrderProcessing,
        trigger: EventType::InventoryChecked,
        preconditions: &[
            Precondition::CustomerRequirementsComplete,
            Precondition::CreditCheckPassed,
        ],
        actions: &[PhaseAction::ValidateOrder, PhaseAction::AssignApprover],
        estimated_hours: 2,
    },
    PhaseTransition {
        from: Phase::OrderProcessing,
        to: Phase::MaterialPlanning,
        trigger: EventType::PoGenerated,
        preconditions: &[Precondition::OrderValidated, Precondition::ApprovalComplete],
        actions: &[
            PhaseAction::CalculateMaterialRequirements,
            PhaseAction::CheckInventory,
        ],
        estimated_hours: 4,
    },
    PhaseTransition {
        from: Phase::MaterialPlanning,
        to: Phase::ProductionPlanning,
        trigger: EventType::MaterialReceived,
        preconditions: &[
            Precondition::MrpCalculationComplete,
            Precondition::ProcurementInitiated,
        ],
        actions: &[
            PhaseAction::ScheduleProduction,
            PhaseAction::AllocateResources,
        ],
        estimated_hours: 8,
    },
    PhaseTransition {
        from: Phase::ProductionPlanning,
        to: Phase::QualityAssurance,
        trigger: EventType::QualityPassed,
        preconditions: &[
            Precondition::ManufacturingComplete,
            Precondition::InitialInspectionDone,
        ],
        actions: &[
            PhaseAction::ScheduleQualityTests,
            PhaseAction::PrepareTestEquipment,
        ],
        estimated_hours: 24,
    },
    PhaseTransition {
        from: Phase::QualityAssurance,
        to: Phase::Fulfillment,
        trigger: EventType::OrderShipped,
        preconditions: &[
            Precondition::QualityTestsPassed,
            Precondition::DocumentationComplete,
        ],
        actions: &[PhaseAction::PreparePackaging, PhaseAction::ScheduleShipping],
        estimated_hours: 4,
    },
    PhaseTransition {
        from: Phase::Fulfillment,
        to: Phase::PostDelivery,
        trigger: EventType::OrderDelivered,
        preconditions: &[
            Precondition::PackagingComplete,
            Precondition::ShippingConfirmed,
        ],
        actions: &[PhaseAction::TrackDelivery, PhaseAction::PrepareWarrantyDocs],
        estimated_hours: 168,
    },
];

/// The exit edge out of `phase`, if it has one.
pub fn transition_from(phase: Phase) -> Option<&'static PhaseTransition> {
    TRANSITIONS.iter().find(|t| t.from == phase)
}

/// The edge arriving at `phase`, if any.
pub fn transition_to(phase: Phase) -> Option<&'static PhaseTransition> {
    TRANSITIONS.iter().find(|t| t.to == phase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_phase_except_the_last_has_an_exit_edge() {
        for phase in Phase::ALL {
            let edge = transition_from(phase);
            if phase == Phase::PostDelivery {
                assert!(edge.is_none());
            } else {
                let edge = edge.unwrap();
                assert_eq!(edge.from, phase);
                assert_eq!(edge.to.index(), phase.index() + 1);
            }
        }
    }

    #[test]
    fn edges_are_triggered_by_distinct_domain_events() {
        let mut triggers: Vec<EventType> = TRANSITIONS.iter().map(|t| t.trigger).collect();
        triggers.dedup();
        assert_eq!(triggers.len(), 6);
        assert!(triggers.iter().all(|t| !t.is_synthetic()));
    }

    #[test]
    fn phase_serializes_with_display_names() {
        assert_eq!(
            serde_json::to_value(Phase::PostDelivery).unwrap(),
            serde_json::json!("Post-Delivery")
        );
        let parsed: Phase = serde_json::from_str("\"Material Planning\"").unwrap();
        assert_eq!(parsed, Phase::MaterialPlanning);
    }

    #[test]
    fn stand_in_preconditions_read_upstream_facts() {
        let mut data = PhaseData::default();
        assert!(!Precondition::ManufacturingComplete.holds(&data));
        data.production_scheduled = true;
        assert!(Precondition::ManufacturingComplete.holds(&data));

        assert!(!Precondition::PackagingComplete.holds(&data));
        data.order_shipped = true;
        assert!(Precondition::PackagingComplete.holds(&data));
    }

    #[test]
    fn default_true_facts_satisfy_their_preconditions() {
        let data = PhaseData::default();
        assert!(Precondition::CreditCheckPassed.holds(&data));
        assert!(Precondition::ApprovalComplete.holds(&data));
        assert!(Precondition::InitialInspectionDone.holds(&data));
        assert!(Precondition::DocumentationComplete.holds(&data));
        assert!(Precondition::ShippingConfirmed.holds(&data));
        assert!(!Precondition::CustomerRequirementsComplete.holds(&data));
    }
}
