//! Integration tests for the batch lifecycle
//!
//! Creation against the remaining-RM budget, verification, the completion
//! arithmetic tolerance, and order-level scrap.

use chrono::{DateTime, TimeZone, Utc};
use manufacturing_core_rs::models::actor::{Actor, Role};
use manufacturing_core_rs::models::masters::{
    BomLine, MaterialType, Product, RawMaterial, WorkCenter,
};
use manufacturing_core_rs::models::mo::{MoStatus, Priority};
use manufacturing_core_rs::models::notification::ActivityKind;
use manufacturing_core_rs::models::supervisor::ShiftId;
use manufacturing_core_rs::services::{batch_lifecycle, mo_lifecycle, process_flow};
use manufacturing_core_rs::services::batch_lifecycle::{BatchError, RemainingRm};
use manufacturing_core_rs::services::mo_lifecycle::NewMo;
use manufacturing_core_rs::{CoreConfig, FactoryState, StockBalance};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 12, 10, 0, 0).unwrap()
}

fn ph() -> Actor {
    Actor::new("U-PH", &[Role::ProductionHead, Role::Manager])
}

fn supervisor() -> Actor {
    Actor::new("U-SUP", &[Role::Supervisor])
}

fn seed_coil() -> FactoryState {
    let mut state = FactoryState::new();
    state.add_raw_material(RawMaterial::new("RM-A", MaterialType::Coil, "SS304"));
    state.add_product(Product::coil("P-SPRING", "RM-A", 50));
    state.set_stock(StockBalance::new("RM-A", 60_000));
    state.add_work_center(WorkCenter::new("WC-COILING", "Coiling", 10));
    state.add_bom_line(BomLine::new("P-SPRING", "WC-COILING", 1));
    state
}

fn seed_sheet() -> FactoryState {
    let mut state = FactoryState::new();
    state.add_raw_material(RawMaterial::new("RM-S", MaterialType::Sheet, "CRCA"));
    // 24 pieces per strip, 800 g of sheet per strip
    state.add_product(Product::sheet("P-CLIP", "RM-S", 24, 800));
    state.set_stock(StockBalance::new("RM-S", 100_000));
    state.add_work_center(WorkCenter::new("WC-STAMPING", "Stamping", 30));
    state.add_bom_line(BomLine::new("P-CLIP", "WC-STAMPING", 1));
    state
}

fn create_order(state: &mut FactoryState, mo_id: &str, product: &str, tolerance_cp: i64) {
    let input = NewMo {
        mo_id: mo_id.to_string(),
        product_code: product.to_string(),
        quantity: 1000,
        tolerance_cp,
        scrap_cp: 0,
        priority: Priority::Medium,
        shift: ShiftId::Shift1,
        customer: None,
        rm_required_override_g: None,
    };
    mo_lifecycle::create_mo(state, input, &ph(), t0()).unwrap();
}

#[test]
fn test_first_batch_flips_mo_to_in_progress() {
    let config = CoreConfig::default();
    let mut state = seed_coil();
    create_order(&mut state, "MO-001", "P-SPRING", 200);
    assert_eq!(state.mo("MO-001").unwrap().status(), MoStatus::OnHold);

    let batch_id =
        batch_lifecycle::create_batch(&mut state, &config, "MO-001", 25_000, &ph(), t0()).unwrap();

    let mo = state.mo("MO-001").unwrap();
    assert_eq!(mo.status(), MoStatus::InProgress);
    let last = mo.status_history().last().unwrap();
    assert_eq!(last.notes, format!("first batch created: {batch_id}"));
}

#[test]
fn test_remaining_rm_at_threshold_forbids_new_batch() {
    // Coil threshold is 0.050 kg and the check is strictly-greater.
    let config = CoreConfig::default();
    let mut state = seed_coil();
    // 0 % tolerance: 50.000 kg required
    create_order(&mut state, "MO-001", "P-SPRING", 0);

    batch_lifecycle::create_batch(&mut state, &config, "MO-001", 49_950, &ph(), t0()).unwrap();
    assert_eq!(
        batch_lifecycle::remaining_rm(&state, "MO-001").unwrap(),
        RemainingRm::CoilGrams(50)
    );

    let error =
        batch_lifecycle::create_batch(&mut state, &config, "MO-001", 10, &ph(), t0()).unwrap_err();
    assert_eq!(
        error,
        BatchError::RemainingRmExhausted { remaining: 50, threshold: 50 }
    );
}

#[test]
fn test_remaining_rm_just_above_threshold_allows_batch() {
    let config = CoreConfig::default();
    let mut state = seed_coil();
    create_order(&mut state, "MO-001", "P-SPRING", 0);

    batch_lifecycle::create_batch(&mut state, &config, "MO-001", 49_949, &ph(), t0()).unwrap();
    assert_eq!(
        batch_lifecycle::remaining_rm(&state, "MO-001").unwrap(),
        RemainingRm::CoilGrams(51)
    );
    batch_lifecycle::create_batch(&mut state, &config, "MO-001", 10, &ph(), t0()).unwrap();
}

#[test]
fn test_sheet_remaining_counts_strips() {
    let config = CoreConfig::default();
    let mut state = seed_sheet();
    // 1000 pieces at 24/strip: 42 strips
    create_order(&mut state, "MO-002", "P-CLIP", 0);
    assert_eq!(
        batch_lifecycle::remaining_rm(&state, "MO-002").unwrap(),
        RemainingRm::SheetStrips(42)
    );

    batch_lifecycle::create_batch(&mut state, &config, "MO-002", 41, &ph(), t0()).unwrap();
    assert_eq!(
        batch_lifecycle::remaining_rm(&state, "MO-002").unwrap(),
        RemainingRm::SheetStrips(1)
    );
    // exactly at the one-strip threshold: forbidden
    let error =
        batch_lifecycle::create_batch(&mut state, &config, "MO-002", 1, &ph(), t0()).unwrap_err();
    assert!(matches!(error, BatchError::RemainingRmExhausted { .. }));
}

#[test]
fn test_verify_requires_supervisor_and_happens_once() {
    let config = CoreConfig::default();
    let mut state = seed_coil();
    create_order(&mut state, "MO-001", "P-SPRING", 200);
    let batch_id =
        batch_lifecycle::create_batch(&mut state, &config, "MO-001", 25_000, &ph(), t0()).unwrap();

    let error = batch_lifecycle::verify_batch(&mut state, &batch_id, &ph(), t0()).unwrap_err();
    assert!(matches!(error, BatchError::SupervisorUnauthorised(_)));

    batch_lifecycle::verify_batch(&mut state, &batch_id, &supervisor(), t0()).unwrap();
    assert!(state.batch(&batch_id).unwrap().is_verified());
    assert!(state
        .activity_log()
        .iter()
        .any(|entry| entry.kind == ActivityKind::BatchVerified));

    let error =
        batch_lifecycle::verify_batch(&mut state, &batch_id, &supervisor(), t0()).unwrap_err();
    assert_eq!(error, BatchError::BatchAlreadyVerified(batch_id));
}

#[test]
fn test_start_requires_verification() {
    let config = CoreConfig::default();
    let mut state = seed_coil();
    create_order(&mut state, "MO-001", "P-SPRING", 200);
    let batch_id =
        batch_lifecycle::create_batch(&mut state, &config, "MO-001", 25_000, &ph(), t0()).unwrap();

    let error =
        batch_lifecycle::start_batch(&mut state, &config, &batch_id, &supervisor(), t0())
            .unwrap_err();
    assert_eq!(error, BatchError::BatchNotVerified(batch_id));
}

#[test]
fn test_unlockable_batch_proceeds_unless_strict() {
    // A failed RM lock on batch start is tolerated by default;
    // the strict flag turns it into an abort. An order created against an
    // empty stock has no reservation to lock.
    let mut state = seed_coil();
    state.set_stock(StockBalance::new("RM-A", 0));
    create_order(&mut state, "MO-002", "P-SPRING", 200);

    let lenient = CoreConfig::default();
    let batch_id =
        batch_lifecycle::create_batch(&mut state, &lenient, "MO-002", 25_000, &ph(), t0())
            .unwrap();
    batch_lifecycle::verify_batch(&mut state, &batch_id, &supervisor(), t0()).unwrap();
    let lock =
        batch_lifecycle::start_batch(&mut state, &lenient, &batch_id, &supervisor(), t0())
            .unwrap();
    assert_eq!(lock.locked_count, 0);
    assert!(!lock.is_complete());

    let strict = CoreConfig {
        strict_batch_lock: true,
        ..CoreConfig::default()
    };
    let second =
        batch_lifecycle::create_batch(&mut state, &strict, "MO-002", 20_000, &ph(), t0()).unwrap();
    batch_lifecycle::verify_batch(&mut state, &second, &supervisor(), t0()).unwrap();
    let error = batch_lifecycle::start_batch(&mut state, &strict, &second, &supervisor(), t0())
        .unwrap_err();
    assert!(matches!(error, BatchError::BatchLockIncomplete { .. }));
}

#[test]
fn test_completion_arithmetic_tolerance_boundary() {
    let config = CoreConfig::default();
    let mut state = seed_coil();
    create_order(&mut state, "MO-001", "P-SPRING", 200);
    mo_lifecycle::approve_mo(&mut state, "MO-001", &ph(), t0(), "").unwrap();
    mo_lifecycle::start_production(&mut state, "MO-001", &ph(), t0(), "").unwrap();
    let execution_id = state.executions_of_mo("MO-001")[0].id();

    let batch_id =
        batch_lifecycle::create_batch(&mut state, &config, "MO-001", 25_000, &ph(), t0()).unwrap();
    batch_lifecycle::verify_batch(&mut state, &batch_id, &supervisor(), t0()).unwrap();
    batch_lifecycle::start_batch(&mut state, &config, &batch_id, &supervisor(), t0()).unwrap();
    process_flow::start_batch_process(&mut state, &batch_id, execution_id, &supervisor(), t0())
        .unwrap();

    // off by 0.011 kg: rejected
    let error = batch_lifecycle::complete_batch_with_split(
        &mut state,
        &config,
        &batch_id,
        execution_id,
        10_000,
        5_000,
        3_000,
        1_989,
        "",
        &supervisor(),
        t0(),
    )
    .unwrap_err();
    assert!(matches!(error, BatchError::QuantityMismatch { .. }));

    // off by exactly 0.010 kg: accepted
    batch_lifecycle::complete_batch_with_split(
        &mut state,
        &config,
        &batch_id,
        execution_id,
        10_000,
        5_000,
        3_000,
        1_990,
        "edge wear",
        &supervisor(),
        t0(),
    )
    .unwrap();
}

#[test]
fn test_scrap_remaining_rm_boundaries() {
    let config = CoreConfig::default();
    let mut state = seed_coil();
    create_order(&mut state, "MO-001", "P-SPRING", 0);
    batch_lifecycle::create_batch(&mut state, &config, "MO-001", 40_000, &ph(), t0()).unwrap();
    // remaining: 50.000 - 40.000 = 10.000 kg

    let error =
        batch_lifecycle::scrap_remaining_rm(&mut state, "MO-001", Some(10_001), &ph(), t0())
            .unwrap_err();
    assert!(matches!(error, BatchError::ScrapExceedsRemaining { .. }));

    let scrapped =
        batch_lifecycle::scrap_remaining_rm(&mut state, "MO-001", Some(4_000), &ph(), t0())
            .unwrap();
    assert_eq!(scrapped, 4_000);
    assert_eq!(state.mo("MO-001").unwrap().scrap_rm_weight_g(), 4_000);
    assert_eq!(
        batch_lifecycle::remaining_rm(&state, "MO-001").unwrap(),
        RemainingRm::CoilGrams(6_000)
    );

    // send everything that is left
    let scrapped =
        batch_lifecycle::scrap_remaining_rm(&mut state, "MO-001", None, &ph(), t0()).unwrap();
    assert_eq!(scrapped, 6_000);

    let error =
        batch_lifecycle::scrap_remaining_rm(&mut state, "MO-001", None, &ph(), t0()).unwrap_err();
    assert_eq!(error, BatchError::NoScrapToSend);
}

#[test]
fn test_cancelled_batch_leaves_progress_to_the_others() {
    let config = CoreConfig::default();
    let mut state = seed_coil();
    create_order(&mut state, "MO-001", "P-SPRING", 200);
    mo_lifecycle::approve_mo(&mut state, "MO-001", &ph(), t0(), "").unwrap();
    mo_lifecycle::start_production(&mut state, "MO-001", &ph(), t0(), "").unwrap();
    let execution_id = state.executions_of_mo("MO-001")[0].id();

    let b1 = batch_lifecycle::create_batch(&mut state, &config, "MO-001", 25_000, &ph(), t0())
        .unwrap();
    batch_lifecycle::verify_batch(&mut state, &b1, &supervisor(), t0()).unwrap();
    batch_lifecycle::start_batch(&mut state, &config, &b1, &supervisor(), t0()).unwrap();
    process_flow::start_batch_process(&mut state, &b1, execution_id, &supervisor(), t0()).unwrap();
    batch_lifecycle::complete_batch_with_split(
        &mut state,
        &config,
        &b1,
        execution_id,
        25_500,
        25_500,
        0,
        0,
        "",
        &supervisor(),
        t0(),
    )
    .unwrap();

    let b2 = batch_lifecycle::create_batch(&mut state, &config, "MO-001", 20_000, &ph(), t0())
        .unwrap();
    assert_eq!(
        state.execution(execution_id).unwrap().progress_percentage(),
        50.0
    );

    // cancelling the open batch restores 1/1 progress
    batch_lifecycle::cancel_batch(&mut state, &b2, &ph(), t0(), "material defect").unwrap();
    assert_eq!(
        state.execution(execution_id).unwrap().progress_percentage(),
        100.0
    );
}
