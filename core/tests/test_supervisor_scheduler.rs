//! Integration tests for supervisor scheduling and failover
//!
//! Attendance snapshot, effective-supervisor resolution precedence, manual
//! mid-process override, and the logout cascade.

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use manufacturing_core_rs::core::cancel::CancelToken;
use manufacturing_core_rs::models::actor::{Actor, Role, UserRecord};
use manufacturing_core_rs::models::masters::{
    BomLine, MaterialType, Product, RawMaterial, WorkCenter,
};
use manufacturing_core_rs::models::mo::Priority;
use manufacturing_core_rs::models::notification::NotificationKind;
use manufacturing_core_rs::models::supervisor::{ChangeReason, MoSupervisorOverride, ShiftConfig, ShiftId};
use manufacturing_core_rs::services::{mo_lifecycle, scheduler};
use manufacturing_core_rs::services::mo_lifecycle::NewMo;
use manufacturing_core_rs::services::scheduler::ReassignmentOutcome;
use manufacturing_core_rs::{FactoryState, StockBalance};

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 12, h, m, 0).unwrap()
}

fn manager() -> Actor {
    Actor::new("U-MGR", &[Role::Manager, Role::ProductionHead])
}

fn seed() -> FactoryState {
    let mut state = FactoryState::new();
    state.add_raw_material(RawMaterial::new("RM-A", MaterialType::Coil, "SS304"));
    state.add_product(Product::coil("P-SPRING", "RM-A", 50));
    state.set_stock(StockBalance::new("RM-A", 200_000));
    state.add_work_center(WorkCenter::new("WC-COILING", "Coiling", 10));
    state.add_work_center(WorkCenter::new("WC-TEMPERING", "Tempering", 20));
    state.add_bom_line(BomLine::new("P-SPRING", "WC-COILING", 1));

    for (id, name) in [
        ("U-PRIMARY", "Primary Supervisor"),
        ("U-BACKUP", "Backup Supervisor"),
        ("U-THIRD", "Third Supervisor"),
    ] {
        state.add_user(UserRecord::new(id, name, &[Role::Supervisor]));
    }
    state.add_user(UserRecord::new("U-PH", "Production Head", &[Role::ProductionHead]));
    state.add_user(UserRecord::new("U-MGR", "Manager", &[Role::Manager, Role::ProductionHead]));

    state.upsert_shift_config(
        ShiftConfig::new(
            "WC-COILING",
            ShiftId::Shift1,
            t(9, 0),
            t(17, 0),
            "U-PRIMARY",
            "U-BACKUP",
            t(9, 15),
        )
        .unwrap(),
    );
    state
}

fn approved_order(state: &mut FactoryState, mo_id: &str) -> u64 {
    let input = NewMo {
        mo_id: mo_id.to_string(),
        product_code: "P-SPRING".to_string(),
        quantity: 1000,
        tolerance_cp: 200,
        scrap_cp: 0,
        priority: Priority::Medium,
        shift: ShiftId::Shift1,
        customer: None,
        rm_required_override_g: None,
    };
    mo_lifecycle::create_mo(state, input, &manager(), at(8, 0)).unwrap();
    mo_lifecycle::approve_mo(state, mo_id, &manager(), at(8, 30), "").unwrap();
    state.executions_of_mo(mo_id)[0].id()
}

#[test]
fn test_attendance_marks_primary_present_when_on_time() {
    let mut state = seed();
    state.record_login("U-PRIMARY", at(9, 5));

    let date = at(9, 20).date_naive();
    let summary =
        scheduler::attendance_snapshot(&mut state, date, false, &CancelToken::new(), at(9, 20));
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.created, 1);
    assert_eq!(summary.backup_assigned, 0);

    let status = state.daily_status(date, "WC-COILING", ShiftId::Shift1).unwrap();
    assert!(status.is_present);
    assert_eq!(status.active_supervisor, "U-PRIMARY");
    assert_eq!(status.login_time, Some(t(9, 5)));
    assert_eq!(status.status_color(), "green");
}

#[test]
fn test_attendance_promotes_backup_on_late_login() {
    let mut state = seed();
    state.record_login("U-PRIMARY", at(9, 30));

    let date = at(9, 45).date_naive();
    let summary =
        scheduler::attendance_snapshot(&mut state, date, false, &CancelToken::new(), at(9, 45));
    assert_eq!(summary.backup_assigned, 1);

    let status = state.daily_status(date, "WC-COILING", ShiftId::Shift1).unwrap();
    assert!(!status.is_present);
    assert_eq!(status.active_supervisor, "U-BACKUP");
    assert_eq!(status.login_time, Some(t(9, 30)));
    assert_eq!(status.status_color(), "red");
}

#[test]
fn test_attendance_promotes_backup_when_no_login() {
    let mut state = seed();
    let date = at(9, 20).date_naive();
    scheduler::attendance_snapshot(&mut state, date, false, &CancelToken::new(), at(9, 20));

    let status = state.daily_status(date, "WC-COILING", ShiftId::Shift1).unwrap();
    assert!(!status.is_present);
    assert_eq!(status.active_supervisor, "U-BACKUP");
    assert_eq!(status.login_time, None);
}

#[test]
fn test_attendance_respects_cancellation() {
    let mut state = seed();
    let cancel = CancelToken::new();
    cancel.cancel();
    let summary = scheduler::attendance_snapshot(
        &mut state,
        at(9, 20).date_naive(),
        false,
        &cancel,
        at(9, 20),
    );
    assert!(summary.cancelled);
    assert_eq!(summary.processed, 0);
}

#[test]
fn test_auto_assignment_uses_daily_status() {
    let mut state = seed();
    state.record_login("U-PRIMARY", at(9, 5));
    scheduler::attendance_snapshot(
        &mut state,
        at(9, 20).date_naive(),
        false,
        &CancelToken::new(),
        at(9, 20),
    );

    // approval auto-assigns through the daily status
    let execution_id = approved_order(&mut state, "MO-001");
    let execution = state.execution(execution_id).unwrap();
    assert_eq!(execution.assigned_supervisor(), Some("U-PRIMARY"));

    // and the change log shows the initial assignment
    let changes = state.supervisor_changes();
    assert!(changes.iter().any(|entry| {
        entry.execution_id == execution_id
            && entry.to_supervisor.as_deref() == Some("U-PRIMARY")
            && entry.reason == ChangeReason::InitialAssignment
    }));
}

#[test]
fn test_mo_override_takes_precedence() {
    let mut state = seed();
    state.record_login("U-PRIMARY", at(9, 5));
    scheduler::attendance_snapshot(
        &mut state,
        at(9, 20).date_naive(),
        false,
        &CancelToken::new(),
        at(9, 20),
    );

    state.upsert_mo_override(
        MoSupervisorOverride::new("MO-001", "WC-COILING", ShiftId::Shift1, "U-THIRD", "U-BACKUP")
            .unwrap(),
    );
    let execution_id = approved_order(&mut state, "MO-001");
    assert_eq!(
        state.execution(execution_id).unwrap().assigned_supervisor(),
        Some("U-THIRD")
    );
}

#[test]
fn test_no_supervisor_escalates_to_production_heads() {
    let mut state = seed();
    let input = NewMo {
        mo_id: "MO-NOSUP".to_string(),
        product_code: "P-SPRING".to_string(),
        quantity: 100,
        tolerance_cp: 0,
        scrap_cp: 0,
        priority: Priority::Low,
        shift: ShiftId::Shift1,
        customer: None,
        rm_required_override_g: None,
    };
    // a product whose only BOM process has no shift configuration at all
    state.add_bom_line(BomLine::new("P-SPRING", "WC-TEMPERING", 2));
    mo_lifecycle::create_mo(&mut state, input, &manager(), at(8, 0)).unwrap();
    mo_lifecycle::approve_mo(&mut state, "MO-NOSUP", &manager(), at(8, 30), "").unwrap();

    let tempering = state
        .execution_of_mo_at("MO-NOSUP", "WC-TEMPERING")
        .unwrap();
    assert_eq!(tempering.assigned_supervisor(), None);

    let escalations: Vec<_> = state
        .notifications()
        .iter()
        .filter(|notification| notification.kind == NotificationKind::SupervisorUnavailable)
        .collect();
    // one per production head and manager
    assert_eq!(escalations.len(), 2);
}

#[test]
fn test_manual_override_logs_mid_process_change() {
    let mut state = seed();
    let execution_id = approved_order(&mut state, "MO-001");

    scheduler::assign_supervisor_manually(
        &mut state,
        execution_id,
        "U-THIRD",
        &manager(),
        at(11, 0),
        "primary tied up on another line",
    )
    .unwrap();

    assert_eq!(
        state.execution(execution_id).unwrap().assigned_supervisor(),
        Some("U-THIRD")
    );
    let entry = state
        .supervisor_changes()
        .iter()
        .find(|entry| entry.reason == ChangeReason::MidProcessChange)
        .unwrap();
    assert_eq!(entry.changed_by.as_deref(), Some("U-MGR"));
    assert_eq!(entry.to_supervisor.as_deref(), Some("U-THIRD"));

    // the new supervisor was notified
    assert!(state.notifications().iter().any(|notification| {
        notification.kind == NotificationKind::SupervisorAssigned
            && notification.recipient == "U-THIRD"
    }));
}

#[test]
fn test_s3_logout_cascade() {
    // Supervisor U supervises work in two orders; X has a logged-in
    // backup, Y has no backup at all.
    let mut state = seed();
    state.record_login("U-PRIMARY", at(9, 0));
    state.record_login("U-BACKUP", at(9, 1));

    let execution_x = approved_order(&mut state, "MO-X");
    // assignment fell to the shift config primary
    assert_eq!(
        state.execution(execution_x).unwrap().assigned_supervisor(),
        Some("U-PRIMARY")
    );

    // Y runs only at a work center with no shift configuration at all;
    // assign its supervisor manually.
    state.add_product(Product::coil("P-TEMPER", "RM-A", 50));
    state.add_bom_line(BomLine::new("P-TEMPER", "WC-TEMPERING", 1));
    let input = NewMo {
        mo_id: "MO-Y".to_string(),
        product_code: "P-TEMPER".to_string(),
        quantity: 1000,
        tolerance_cp: 200,
        scrap_cp: 0,
        priority: Priority::Medium,
        shift: ShiftId::Shift1,
        customer: None,
        rm_required_override_g: None,
    };
    mo_lifecycle::create_mo(&mut state, input, &manager(), at(8, 0)).unwrap();
    mo_lifecycle::approve_mo(&mut state, "MO-Y", &manager(), at(8, 30), "").unwrap();
    let execution_y = state
        .execution_of_mo_at("MO-Y", "WC-TEMPERING")
        .unwrap()
        .id();
    scheduler::assign_supervisor_manually(
        &mut state,
        execution_y,
        "U-PRIMARY",
        &manager(),
        at(9, 30),
        "",
    )
    .unwrap();

    let summary = scheduler::logout(&mut state, "U-PRIMARY", at(12, 0));
    assert_eq!(summary.closed_sessions, 1);
    assert_eq!(summary.reassignments.len(), 2);

    // X went to the logged-in backup with an attendance_absence entry
    assert_eq!(
        state.execution(execution_x).unwrap().assigned_supervisor(),
        Some("U-BACKUP")
    );
    assert!(state.supervisor_changes().iter().any(|entry| {
        entry.execution_id == execution_x
            && entry.reason == ChangeReason::AttendanceAbsence
            && entry.to_supervisor.as_deref() == Some("U-BACKUP")
    }));
    assert!(state.notifications().iter().any(|notification| {
        notification.kind == NotificationKind::SupervisorReassignment
            && notification.recipient == "U-BACKUP"
    }));

    // Y was unassigned and escalated
    assert_eq!(state.execution(execution_y).unwrap().assigned_supervisor(), None);
    let outcomes: Vec<&ReassignmentOutcome> = summary
        .reassignments
        .iter()
        .map(|entry| &entry.outcome)
        .collect();
    assert!(outcomes.contains(&&ReassignmentOutcome::ReassignedToBackup));
    assert!(outcomes.contains(&&ReassignmentOutcome::UnassignedNoBackup));
    assert!(state.notifications().iter().any(|notification| {
        notification.kind == NotificationKind::SupervisorUnavailable
    }));
}

#[test]
fn test_second_logout_is_a_noop() {
    let mut state = seed();
    state.record_login("U-PRIMARY", at(9, 0));
    let execution_id = approved_order(&mut state, "MO-001");
    assert_eq!(
        state.execution(execution_id).unwrap().assigned_supervisor(),
        Some("U-PRIMARY")
    );

    let first = scheduler::logout(&mut state, "U-PRIMARY", at(12, 0));
    assert_eq!(first.closed_sessions, 1);

    let second = scheduler::logout(&mut state, "U-PRIMARY", at(12, 5));
    assert_eq!(second.closed_sessions, 0);
    assert!(second.reassignments.is_empty());
}

#[test]
fn test_manual_daily_status_correction() {
    let mut state = seed();
    let date = at(9, 20).date_naive();
    scheduler::attendance_snapshot(&mut state, date, false, &CancelToken::new(), at(9, 20));

    scheduler::update_daily_status_manually(
        &mut state,
        date,
        "WC-COILING",
        ShiftId::Shift1,
        "U-THIRD",
        &manager(),
        at(10, 0),
        "backup called in sick, third covers",
    )
    .unwrap();

    let status = state.daily_status(date, "WC-COILING", ShiftId::Shift1).unwrap();
    assert_eq!(status.active_supervisor, "U-THIRD");
    assert!(status.manually_updated);
    assert_eq!(status.manually_updated_by.as_deref(), Some("U-MGR"));
}

#[test]
fn test_current_shift_window_and_default() {
    let mut state = seed();
    state.upsert_shift_config(
        ShiftConfig::new(
            "WC-COILING",
            ShiftId::Shift2,
            t(17, 0),
            t(23, 0),
            "U-BACKUP",
            "U-THIRD",
            t(17, 15),
        )
        .unwrap(),
    );

    assert_eq!(
        scheduler::current_shift(&state, "WC-COILING", at(10, 0)),
        ShiftId::Shift1
    );
    assert_eq!(
        scheduler::current_shift(&state, "WC-COILING", at(18, 0)),
        ShiftId::Shift2
    );
    // outside every window, and for unconfigured work centers: shift 1
    assert_eq!(
        scheduler::current_shift(&state, "WC-COILING", at(3, 0)),
        ShiftId::Shift1
    );
    assert_eq!(
        scheduler::current_shift(&state, "WC-TEMPERING", at(10, 0)),
        ShiftId::Shift1
    );
}
