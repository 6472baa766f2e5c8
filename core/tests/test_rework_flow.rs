//! Integration tests for rework chains and final-inspection rework

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use manufacturing_core_rs::models::actor::{Actor, Role, UserRecord};
use manufacturing_core_rs::models::completion::{FiReworkStatus, ReworkStatus};
use manufacturing_core_rs::models::masters::{
    BomLine, MaterialType, Product, RawMaterial, WorkCenter,
};
use manufacturing_core_rs::models::mo::Priority;
use manufacturing_core_rs::models::notification::NotificationKind;
use manufacturing_core_rs::models::supervisor::{ShiftConfig, ShiftId};
use manufacturing_core_rs::core::cancel::CancelToken;
use manufacturing_core_rs::services::{
    batch_lifecycle, mo_lifecycle, process_flow, rework, scheduler,
};
use manufacturing_core_rs::services::mo_lifecycle::NewMo;
use manufacturing_core_rs::services::rework::ReworkError;
use manufacturing_core_rs::{CoreConfig, FactoryState, StockBalance};

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 12, h, m, 0).unwrap()
}

fn ph() -> Actor {
    Actor::new("U-PH", &[Role::ProductionHead, Role::Manager])
}

fn supervisor() -> Actor {
    Actor::new("U-SUP", &[Role::Supervisor])
}

fn quality() -> Actor {
    Actor::new("U-QC", &[Role::Quality])
}

/// Two-process order with an attendance snapshot so the active supervisor
/// of each work center resolves.
fn seed() -> (FactoryState, CoreConfig) {
    let config = CoreConfig::default();
    let mut state = FactoryState::new();
    state.add_raw_material(RawMaterial::new("RM-A", MaterialType::Coil, "SS304"));
    state.add_product(Product::coil("P-SPRING", "RM-A", 50));
    state.set_stock(StockBalance::new("RM-A", 60_000));
    state.add_work_center(WorkCenter::new("WC-COILING", "Coiling", 10));
    state.add_work_center(WorkCenter::new("WC-TEMPERING", "Tempering", 20));
    state.add_bom_line(BomLine::new("P-SPRING", "WC-COILING", 1));
    state.add_bom_line(BomLine::new("P-SPRING", "WC-TEMPERING", 2));

    for (id, name) in [
        ("U-ACTIVE", "Active Coiling Supervisor"),
        ("U-BACKUP", "Backup Coiling Supervisor"),
        ("U-TEMPER", "Tempering Supervisor"),
        ("U-TEMPER-B", "Tempering Backup"),
        ("U-SUP", "Floor Supervisor"),
    ] {
        state.add_user(UserRecord::new(id, name, &[Role::Supervisor]));
    }
    state.add_user(UserRecord::new("U-PH", "Production Head", &[Role::ProductionHead]));
    state.add_user(UserRecord::new("U-QC", "Quality Inspector", &[Role::Quality]));

    state.upsert_shift_config(
        ShiftConfig::new(
            "WC-COILING",
            ShiftId::Shift1,
            t(9, 0),
            t(17, 0),
            "U-ACTIVE",
            "U-BACKUP",
            t(9, 15),
        )
        .unwrap(),
    );
    state.upsert_shift_config(
        ShiftConfig::new(
            "WC-TEMPERING",
            ShiftId::Shift1,
            t(9, 0),
            t(17, 0),
            "U-TEMPER",
            "U-TEMPER-B",
            t(9, 15),
        )
        .unwrap(),
    );
    state.record_login("U-ACTIVE", at(9, 2));
    state.record_login("U-TEMPER", at(9, 3));
    scheduler::attendance_snapshot(
        &mut state,
        at(9, 20).date_naive(),
        false,
        &CancelToken::new(),
        at(9, 20),
    );
    (state, config)
}

/// Create, approve, start the order and run one batch up to the first
/// process.
fn batch_in_first_process(state: &mut FactoryState, config: &CoreConfig) -> (String, u64, u64) {
    let input = NewMo {
        mo_id: "MO-001".to_string(),
        product_code: "P-SPRING".to_string(),
        quantity: 1000,
        tolerance_cp: 200,
        scrap_cp: 0,
        priority: Priority::Medium,
        shift: ShiftId::Shift1,
        customer: None,
        rm_required_override_g: None,
    };
    mo_lifecycle::create_mo(state, input, &ph(), at(10, 0)).unwrap();
    mo_lifecycle::approve_mo(state, "MO-001", &ph(), at(10, 5), "").unwrap();
    mo_lifecycle::start_production(state, "MO-001", &ph(), at(10, 10), "").unwrap();
    let executions = state.executions_of_mo("MO-001");
    let first = executions[0].id();
    let second = executions[1].id();

    let batch_id =
        batch_lifecycle::create_batch(state, config, "MO-001", 25_000, &ph(), at(10, 15)).unwrap();
    batch_lifecycle::verify_batch(state, &batch_id, &supervisor(), at(10, 20)).unwrap();
    batch_lifecycle::start_batch(state, config, &batch_id, &supervisor(), at(10, 25)).unwrap();
    process_flow::start_batch_process(state, &batch_id, first, &supervisor(), at(10, 30)).unwrap();
    (batch_id, first, second)
}

#[test]
fn test_s5_completion_spawns_rework_assigned_to_active_supervisor() {
    let (mut state, config) = seed();
    let (batch_id, first, _second) = batch_in_first_process(&mut state, &config);

    // 10 kg in: 6 OK, 1 scrap, 3 rework
    let outcome = batch_lifecycle::complete_batch_with_split(
        &mut state,
        &config,
        &batch_id,
        first,
        10_000,
        6_000,
        1_000,
        3_000,
        "burrs on edge",
        &supervisor(),
        at(11, 0),
    )
    .unwrap();

    let rework_id = outcome.rework_id.expect("rework batch chained");
    let rework = state.rework(rework_id).unwrap();
    assert_eq!(rework.quantity_g, 3_000);
    assert_eq!(rework.cycle_number, 1);
    assert_eq!(rework.status, ReworkStatus::Pending);
    // assigned to the process's active supervisor, not the acting user
    assert_eq!(rework.assigned_supervisor.as_deref(), Some("U-ACTIVE"));

    // the OK portion handed over toward tempering
    let handover = state.handovers().next().unwrap();
    assert_eq!(handover.quantity_g, 6_000);
    assert_eq!(handover.to_execution, _second);
}

#[test]
fn test_s5_rework_completes_without_further_cycle() {
    let (mut state, config) = seed();
    let (batch_id, first, _second) = batch_in_first_process(&mut state, &config);
    let outcome = batch_lifecycle::complete_batch_with_split(
        &mut state,
        &config,
        &batch_id,
        first,
        10_000,
        6_000,
        1_000,
        3_000,
        "burrs on edge",
        &supervisor(),
        at(11, 0),
    )
    .unwrap();
    let rework_id = outcome.rework_id.unwrap();

    rework::start_rework(&mut state, rework_id, &supervisor(), at(11, 30)).unwrap();
    // 3 kg in: 2 OK, 1 scrap, nothing left over
    let completion = rework::complete_rework(
        &mut state,
        &config,
        rework_id,
        2_000,
        1_000,
        &supervisor(),
        at(12, 0),
    )
    .unwrap();

    assert!(completion.next_rework_id.is_none());
    assert_eq!(state.rework(rework_id).unwrap().status, ReworkStatus::Completed);

    let record = state.completion(completion.completion_id).unwrap();
    assert_eq!(record.input_g, 3_000);
    assert_eq!(record.ok_g, 2_000);
    assert_eq!(record.rework_g, 0);
    assert_eq!(record.rework_cycle_number, 1);
    assert!(record.parent_completion.is_some());

    // the receiving supervisor heard about the recovered quantity
    assert!(state.notifications().iter().any(|notification| {
        notification.kind == NotificationKind::ReworkCompleted
            && notification.recipient == "U-TEMPER"
    }));
}

#[test]
fn test_rework_chains_deeper_when_material_still_fails() {
    let (mut state, config) = seed();
    let (batch_id, first, _second) = batch_in_first_process(&mut state, &config);
    let outcome = batch_lifecycle::complete_batch_with_split(
        &mut state,
        &config,
        &batch_id,
        first,
        10_000,
        6_000,
        1_000,
        3_000,
        "burrs",
        &supervisor(),
        at(11, 0),
    )
    .unwrap();
    let rework_id = outcome.rework_id.unwrap();

    // only 1 of 3 kg recovered, 0.5 scrapped: 1.5 kg goes around again
    let completion = rework::complete_rework(
        &mut state,
        &config,
        rework_id,
        1_000,
        500,
        &supervisor(),
        at(12, 0),
    )
    .unwrap();
    let chained = completion.next_rework_id.expect("cycle 2 chained");
    let chained_rework = state.rework(chained).unwrap();
    assert_eq!(chained_rework.cycle_number, 2);
    assert_eq!(chained_rework.quantity_g, 1_500);
}

#[test]
fn test_fi_rework_flow() {
    let (mut state, config) = seed();
    let (batch_id, first, _second) = batch_in_first_process(&mut state, &config);
    batch_lifecycle::complete_batch_with_split(
        &mut state,
        &config,
        &batch_id,
        first,
        25_500,
        25_500,
        0,
        0,
        "",
        &supervisor(),
        at(11, 0),
    )
    .unwrap();

    // only quality may raise it
    let error = rework::create_fi_rework(
        &mut state,
        &batch_id,
        "WC-COILING",
        "spring rate out of band",
        2_000,
        &supervisor(),
        at(14, 0),
    )
    .unwrap_err();
    assert!(matches!(error, ReworkError::SupervisorUnauthorised(_)));

    let fi_id = rework::create_fi_rework(
        &mut state,
        &batch_id,
        "WC-COILING",
        "spring rate out of band",
        2_000,
        &quality(),
        at(14, 0),
    )
    .unwrap();

    let fi = state.fi_rework(fi_id).unwrap();
    assert_eq!(fi.assigned_supervisor, "U-ACTIVE");
    assert_eq!(fi.status, FiReworkStatus::Pending);
    assert!(state.notifications().iter().any(|notification| {
        notification.kind == NotificationKind::FiReworkAssigned
            && notification.recipient == "U-ACTIVE"
    }));

    rework::complete_fi_rework(&mut state, fi_id, &supervisor(), at(15, 0)).unwrap();
    assert_eq!(
        state.fi_rework(fi_id).unwrap().status,
        FiReworkStatus::Completed
    );

    // failed re-inspection opens the next cycle
    rework::reinspect(&mut state, fi_id, false, "still out of band", &quality(), at(15, 30))
        .unwrap();
    let fi = state.fi_rework(fi_id).unwrap();
    assert_eq!(fi.status, FiReworkStatus::Pending);
    assert_eq!(fi.rework_cycle_count, 1);

    rework::complete_fi_rework(&mut state, fi_id, &supervisor(), at(16, 0)).unwrap();
    rework::reinspect(&mut state, fi_id, true, "within band", &quality(), at(16, 30)).unwrap();
    let fi = state.fi_rework(fi_id).unwrap();
    assert_eq!(fi.status, FiReworkStatus::Passed);
    assert_eq!(fi.reinspection_passed, Some(true));
}

#[test]
fn test_fi_rework_requires_resolvable_supervisor() {
    let (mut state, config) = seed();
    let (batch_id, _first, _second) = batch_in_first_process(&mut state, &config);

    // a work center with no daily status cannot take the assignment
    state.add_work_center(WorkCenter::new("WC-PLATING", "Plating", 40));
    let error = rework::create_fi_rework(
        &mut state,
        &batch_id,
        "WC-PLATING",
        "flaking",
        500,
        &quality(),
        at(14, 0),
    )
    .unwrap_err();
    assert_eq!(error, ReworkError::NoBackupSupervisor);
}

#[test]
fn test_fi_rework_report_aggregates_by_process() {
    let (mut state, config) = seed();
    let (batch_id, _first, _second) = batch_in_first_process(&mut state, &config);

    for quantity in [500, 700] {
        rework::create_fi_rework(
            &mut state,
            &batch_id,
            "WC-COILING",
            "spring rate",
            quantity,
            &quality(),
            at(14, 0),
        )
        .unwrap();
    }
    rework::create_fi_rework(
        &mut state,
        &batch_id,
        "WC-TEMPERING",
        "hardness",
        300,
        &quality(),
        at(14, 30),
    )
    .unwrap();

    let date = at(14, 0).date_naive();
    let report = rework::fi_rework_report(&state, date, date);
    assert_eq!(report.len(), 2);
    let coiling = report
        .iter()
        .find(|row| row.work_center == "WC-COILING")
        .unwrap();
    assert_eq!(coiling.rework_count, 2);
    assert_eq!(coiling.total_quantity_g, 1_200);
}
