//! Integration tests for the RM allocation service
//!
//! Covers the reserve / draw / lock / release cycle, the batch-lock split
//! rule, and priority-based swapping between orders.

use chrono::{DateTime, TimeZone, Utc};
use manufacturing_core_rs::models::actor::{Actor, Role};
use manufacturing_core_rs::models::allocation::AllocationStatus;
use manufacturing_core_rs::models::masters::{
    BomLine, MaterialType, Product, RawMaterial, WorkCenter,
};
use manufacturing_core_rs::models::mo::Priority;
use manufacturing_core_rs::models::supervisor::ShiftId;
use manufacturing_core_rs::services::{allocation, batch_lifecycle, mo_lifecycle};
use manufacturing_core_rs::services::allocation::AllocationError;
use manufacturing_core_rs::services::mo_lifecycle::NewMo;
use manufacturing_core_rs::{CoreConfig, FactoryState, StockBalance};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 12, 10, 0, 0).unwrap()
}

fn ph() -> Actor {
    Actor::new("U-PH", &[Role::ProductionHead])
}

fn manager() -> Actor {
    Actor::new("U-MGR", &[Role::Manager, Role::ProductionHead])
}

fn supervisor() -> Actor {
    Actor::new("U-SUP", &[Role::Supervisor])
}

fn seed() -> FactoryState {
    let mut state = FactoryState::new();
    state.add_raw_material(RawMaterial::new("RM-A", MaterialType::Coil, "SS304"));
    // 50 g per piece; 1000 pieces at 2 % tolerance = 51.000 kg
    state.add_product(Product::coil("P-SPRING", "RM-A", 50));
    state.set_stock(StockBalance::new("RM-A", 60_000));
    state.add_work_center(WorkCenter::new("WC-COILING", "Coiling", 10));
    state.add_bom_line(BomLine::new("P-SPRING", "WC-COILING", 1));
    state
}

fn new_mo(id: &str, priority: Priority) -> NewMo {
    NewMo {
        mo_id: id.to_string(),
        product_code: "P-SPRING".to_string(),
        quantity: 1000,
        tolerance_cp: 200,
        scrap_cp: 0,
        priority,
        shift: ShiftId::Shift1,
        customer: None,
        rm_required_override_g: None,
    }
}

#[test]
fn test_reserve_does_not_touch_stock() {
    let mut state = seed();
    mo_lifecycle::create_mo(&mut state, new_mo("MO-001", Priority::Medium), &ph(), t0()).unwrap();

    // 51 kg reserved, stock untouched
    let allocations = state.allocations_of_mo("MO-001");
    assert_eq!(allocations.len(), 1);
    assert_eq!(allocations[0].quantity_g(), 51_000);
    assert_eq!(allocations[0].status(), AllocationStatus::Reserved);
    assert_eq!(state.stock("RM-A").unwrap().available_g(), 60_000);
}

#[test]
fn test_reserve_twice_is_idempotent() {
    let mut state = seed();
    mo_lifecycle::create_mo(&mut state, new_mo("MO-001", Priority::Medium), &ph(), t0()).unwrap();

    let outcome = allocation::reserve_for_mo(&mut state, "MO-001", &ph(), t0()).unwrap();
    assert_eq!(outcome.newly_reserved_g, 0);
    assert_eq!(outcome.total_active_g, 51_000);
    assert_eq!(state.allocations_of_mo("MO-001").len(), 1);
}

#[test]
fn test_insufficient_stock_rejects_reservation() {
    let mut state = seed();
    state.set_stock(StockBalance::new("RM-A", 40_000));
    mo_lifecycle::create_mo(&mut state, new_mo("MO-001", Priority::Medium), &ph(), t0()).unwrap();

    // creation tolerated the failure; an explicit reserve reports it
    assert!(state.allocations_of_mo("MO-001").is_empty());
    let error = allocation::reserve_for_mo(&mut state, "MO-001", &ph(), t0()).unwrap_err();
    assert!(matches!(error, AllocationError::InsufficientStock(_)));
}

#[test]
fn test_stock_drawn_once_at_production_start() {
    let mut state = seed();
    mo_lifecycle::create_mo(&mut state, new_mo("MO-001", Priority::Medium), &ph(), t0()).unwrap();
    mo_lifecycle::approve_mo(&mut state, "MO-001", &manager(), t0(), "").unwrap();
    assert_eq!(state.stock("RM-A").unwrap().available_g(), 60_000);

    mo_lifecycle::start_production(&mut state, "MO-001", &ph(), t0(), "").unwrap();
    assert_eq!(state.stock("RM-A").unwrap().available_g(), 9_000);

    // a second draw finds nothing undrawn
    let drawn = allocation::draw_stock_for_mo(&mut state, "MO-001").unwrap();
    assert_eq!(drawn, 0);
    assert_eq!(state.stock("RM-A").unwrap().available_g(), 9_000);
}

#[test]
fn test_lock_for_batch_splits_allocation() {
    let config = CoreConfig::default();
    let mut state = seed();
    mo_lifecycle::create_mo(&mut state, new_mo("MO-001", Priority::Medium), &ph(), t0()).unwrap();
    mo_lifecycle::approve_mo(&mut state, "MO-001", &manager(), t0(), "").unwrap();
    mo_lifecycle::start_production(&mut state, "MO-001", &ph(), t0(), "").unwrap();

    // half the order: 25 kg planned, 25.5 kg with tolerance
    let batch_id =
        batch_lifecycle::create_batch(&mut state, &config, "MO-001", 25_000, &ph(), t0()).unwrap();
    batch_lifecycle::verify_batch(&mut state, &batch_id, &supervisor(), t0()).unwrap();
    let lock = batch_lifecycle::start_batch(&mut state, &config, &batch_id, &supervisor(), t0())
        .unwrap();

    assert_eq!(lock.locked_g, 25_500);
    assert!(lock.is_complete());

    // split conservation: one locked child of 25.5, parent reserved 25.5
    let allocations = state.allocations_of_mo("MO-001");
    let locked: i64 = allocations
        .iter()
        .filter(|allocation| allocation.status() == AllocationStatus::Locked)
        .map(|allocation| allocation.quantity_g())
        .sum();
    let reserved: i64 = allocations
        .iter()
        .filter(|allocation| allocation.status() == AllocationStatus::Reserved)
        .map(|allocation| allocation.quantity_g())
        .sum();
    assert_eq!(locked, 25_500);
    assert_eq!(reserved, 25_500);
    assert_eq!(locked + reserved, 51_000);

    // stock untouched by locking
    assert_eq!(state.stock("RM-A").unwrap().available_g(), 9_000);
}

#[test]
fn test_whole_row_lock_when_need_matches() {
    let config = CoreConfig::default();
    let mut state = seed();
    mo_lifecycle::create_mo(&mut state, new_mo("MO-001", Priority::Medium), &ph(), t0()).unwrap();
    mo_lifecycle::approve_mo(&mut state, "MO-001", &manager(), t0(), "").unwrap();
    mo_lifecycle::start_production(&mut state, "MO-001", &ph(), t0(), "").unwrap();

    for _ in 0..2 {
        let batch_id = batch_lifecycle::create_batch(&mut state, &config, "MO-001", 25_000, &ph(), t0())
            .unwrap();
        batch_lifecycle::verify_batch(&mut state, &batch_id, &supervisor(), t0()).unwrap();
        batch_lifecycle::start_batch(&mut state, &config, &batch_id, &supervisor(), t0()).unwrap();
    }

    // the second lock consumed the remaining reserved row whole
    let allocations = state.allocations_of_mo("MO-001");
    assert!(allocations
        .iter()
        .all(|allocation| allocation.status() == AllocationStatus::Locked));
    let total: i64 = allocations.iter().map(|a| a.quantity_g()).sum();
    assert_eq!(total, 51_000);
}

#[test]
fn test_release_returns_drawn_stock() {
    let mut state = seed();
    mo_lifecycle::create_mo(&mut state, new_mo("MO-001", Priority::Medium), &ph(), t0()).unwrap();
    mo_lifecycle::approve_mo(&mut state, "MO-001", &manager(), t0(), "").unwrap();
    mo_lifecycle::start_production(&mut state, "MO-001", &ph(), t0(), "").unwrap();
    assert_eq!(state.stock("RM-A").unwrap().available_g(), 9_000);

    let released = allocation::release_all_for_mo(
        &mut state,
        "MO-001",
        &[AllocationStatus::Reserved, AllocationStatus::Locked],
        None,
        t0(),
        "test release",
    )
    .unwrap();
    assert_eq!(released.released_g, 51_000);
    assert_eq!(state.stock("RM-A").unwrap().available_g(), 60_000);
}

#[test]
fn test_release_then_reserve_round_trips_before_start() {
    let mut state = seed();
    mo_lifecycle::create_mo(&mut state, new_mo("MO-001", Priority::Medium), &ph(), t0()).unwrap();
    let stock_before = state.stock("RM-A").unwrap().available_g();

    allocation::release_all_for_mo(
        &mut state,
        "MO-001",
        &[AllocationStatus::Reserved],
        None,
        t0(),
        "round trip",
    )
    .unwrap();
    // an undrawn reservation hands nothing back to stock
    assert_eq!(state.stock("RM-A").unwrap().available_g(), stock_before);

    let outcome = allocation::reserve_for_mo(&mut state, "MO-001", &ph(), t0()).unwrap();
    assert_eq!(outcome.total_active_g, 51_000);
    assert_eq!(state.stock("RM-A").unwrap().available_g(), stock_before);
}

#[test]
fn test_auto_swap_moves_material_to_higher_priority() {
    // S2: MO-A low priority holds the only 30 kg, MO-B high priority needs it.
    let mut state = FactoryState::new();
    state.add_raw_material(RawMaterial::new("RM-M", MaterialType::Coil, "SS304"));
    state.add_product(Product::coil("P-M", "RM-M", 30));
    state.set_stock(StockBalance::new("RM-M", 30_000));

    let low = NewMo {
        mo_id: "MO-A".to_string(),
        product_code: "P-M".to_string(),
        quantity: 1000,
        tolerance_cp: 0,
        scrap_cp: 0,
        priority: Priority::Low,
        shift: ShiftId::Shift1,
        customer: None,
        rm_required_override_g: None,
    };
    mo_lifecycle::create_mo(&mut state, low, &ph(), t0()).unwrap();
    assert_eq!(state.allocations_of_mo("MO-A").len(), 1);

    // stock is gone before MO-B arrives
    state.set_stock(StockBalance::new("RM-M", 0));
    let high = NewMo {
        mo_id: "MO-B".to_string(),
        product_code: "P-M".to_string(),
        quantity: 1000,
        tolerance_cp: 0,
        scrap_cp: 0,
        priority: Priority::High,
        shift: ShiftId::Shift1,
        customer: None,
        rm_required_override_g: None,
    };
    mo_lifecycle::create_mo(&mut state, high, &ph(), t0()).unwrap();
    assert!(state.allocations_of_mo("MO-B").is_empty());

    let report = allocation::check_availability(&state, "MO-B").unwrap();
    assert_eq!(report.shortage_g, 30_000);
    assert_eq!(report.swappable_g, 30_000);
    assert!(report.can_swap);

    let history_before = state.allocation_history().len();
    let result = allocation::auto_swap(&mut state, "MO-B", &ph(), t0()).unwrap();
    assert_eq!(result.swapped_count, 1);
    assert_eq!(result.swapped_g, 30_000);
    assert_eq!(result.swapped_from_mos, vec!["MO-A".to_string()]);

    // source row swapped with a pointer, mirror reserved on the target
    let source = state.allocations_of_mo("MO-A");
    assert_eq!(source[0].status(), AllocationStatus::Swapped);
    assert_eq!(source[0].swapped_to_mo(), Some("MO-B"));
    let target = state.allocations_of_mo("MO-B");
    assert_eq!(target.len(), 1);
    assert_eq!(target[0].status(), AllocationStatus::Reserved);
    assert_eq!(target[0].quantity_g(), 30_000);

    // two history rows for the swap
    assert_eq!(state.allocation_history().len() - history_before, 2);
}

#[test]
fn test_auto_swap_rolls_back_when_insufficient() {
    let mut state = FactoryState::new();
    state.add_raw_material(RawMaterial::new("RM-M", MaterialType::Coil, "SS304"));
    state.add_product(Product::coil("P-M", "RM-M", 30));
    state.set_stock(StockBalance::new("RM-M", 10_000));

    let low = NewMo {
        mo_id: "MO-A".to_string(),
        product_code: "P-M".to_string(),
        quantity: 333, // 9.99 kg, less than MO-B needs
        tolerance_cp: 0,
        scrap_cp: 0,
        priority: Priority::Low,
        shift: ShiftId::Shift1,
        customer: None,
        rm_required_override_g: None,
    };
    mo_lifecycle::create_mo(&mut state, low, &ph(), t0()).unwrap();
    state.set_stock(StockBalance::new("RM-M", 0));

    let high = NewMo {
        mo_id: "MO-B".to_string(),
        product_code: "P-M".to_string(),
        quantity: 1000,
        tolerance_cp: 0,
        scrap_cp: 0,
        priority: Priority::Urgent,
        shift: ShiftId::Shift1,
        customer: None,
        rm_required_override_g: None,
    };
    mo_lifecycle::create_mo(&mut state, high, &ph(), t0()).unwrap();

    let error = allocation::auto_swap(&mut state, "MO-B", &ph(), t0()).unwrap_err();
    assert!(matches!(error, AllocationError::InsufficientSwappable { .. }));

    // whole attempt rolled back: the source reservation is untouched
    let source = state.allocations_of_mo("MO-A");
    assert_eq!(source[0].status(), AllocationStatus::Reserved);
    assert!(state.allocations_of_mo("MO-B").is_empty());
}

#[test]
fn test_swap_rejects_equal_or_lower_priority_target() {
    let mut state = FactoryState::new();
    state.add_raw_material(RawMaterial::new("RM-M", MaterialType::Coil, "SS304"));
    state.add_product(Product::coil("P-M", "RM-M", 30));
    state.set_stock(StockBalance::new("RM-M", 60_000));

    for (id, priority) in [("MO-A", Priority::Medium), ("MO-B", Priority::Medium)] {
        let input = NewMo {
            mo_id: id.to_string(),
            product_code: "P-M".to_string(),
            quantity: 1000,
            tolerance_cp: 0,
            scrap_cp: 0,
            priority,
            shift: ShiftId::Shift1,
            customer: None,
            rm_required_override_g: None,
        };
        mo_lifecycle::create_mo(&mut state, input, &ph(), t0()).unwrap();
    }

    let allocation_id = state.allocations_of_mo("MO-A")[0].id();
    let error =
        allocation::swap_allocation(&mut state, allocation_id, "MO-B", &ph(), t0(), "manual")
            .unwrap_err();
    assert!(matches!(
        error,
        AllocationError::SwapTargetLowerOrEqualPriority { .. }
    ));
}

#[test]
fn test_swapped_allocation_cannot_swap_again() {
    let mut state = FactoryState::new();
    state.add_raw_material(RawMaterial::new("RM-M", MaterialType::Coil, "SS304"));
    state.add_product(Product::coil("P-M", "RM-M", 30));
    state.set_stock(StockBalance::new("RM-M", 30_000));

    for (id, priority) in [
        ("MO-A", Priority::Low),
        ("MO-B", Priority::High),
        ("MO-C", Priority::Urgent),
    ] {
        let input = NewMo {
            mo_id: id.to_string(),
            product_code: "P-M".to_string(),
            quantity: 1000,
            tolerance_cp: 0,
            scrap_cp: 0,
            priority,
            shift: ShiftId::Shift1,
            customer: None,
            rm_required_override_g: None,
        };
        mo_lifecycle::create_mo(&mut state, input, &ph(), t0()).unwrap();
        state.set_stock(StockBalance::new("RM-M", 0));
    }

    let allocation_id = state.allocations_of_mo("MO-A")[0].id();
    allocation::swap_allocation(&mut state, allocation_id, "MO-B", &ph(), t0(), "manual").unwrap();

    let error =
        allocation::swap_allocation(&mut state, allocation_id, "MO-C", &ph(), t0(), "again")
            .unwrap_err();
    assert_eq!(error, AllocationError::DuplicateSwap(allocation_id));
}

#[test]
fn test_manual_lock_pins_a_reservation() {
    let mut state = seed();
    mo_lifecycle::create_mo(&mut state, new_mo("MO-001", Priority::Medium), &ph(), t0()).unwrap();
    let allocation_id = state.allocations_of_mo("MO-001")[0].id();

    allocation::lock_allocation(&mut state, allocation_id, &ph(), t0(), "pinned for audit")
        .unwrap();
    let allocation = state.allocation(allocation_id).unwrap();
    assert_eq!(allocation.status(), AllocationStatus::Locked);
    assert!(!allocation.can_be_swapped());
    // locking never touches stock
    assert_eq!(state.stock("RM-A").unwrap().available_g(), 60_000);
}

#[test]
fn test_allocation_history_is_append_only_record_of_actions() {
    let mut state = seed();
    mo_lifecycle::create_mo(&mut state, new_mo("MO-001", Priority::Medium), &ph(), t0()).unwrap();
    let reserved_rows = state
        .allocation_history()
        .iter()
        .filter(|entry| {
            entry.to_mo.as_deref() == Some("MO-001")
        })
        .count();
    assert_eq!(reserved_rows, 1);
}
