//! Property tests for the allocation and completion invariants

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use manufacturing_core_rs::models::actor::{Actor, Role};
use manufacturing_core_rs::models::allocation::AllocationStatus;
use manufacturing_core_rs::models::masters::{
    BomLine, MaterialType, Product, RawMaterial, WorkCenter,
};
use manufacturing_core_rs::models::mo::Priority;
use manufacturing_core_rs::models::supervisor::ShiftId;
use manufacturing_core_rs::services::{allocation, batch_lifecycle, mo_lifecycle, process_flow};
use manufacturing_core_rs::services::mo_lifecycle::NewMo;
use manufacturing_core_rs::{CoreConfig, FactoryState, StockBalance};

fn t0() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 12, 10, 0, 0).unwrap()
}

fn ph() -> Actor {
    Actor::new("U-PH", &[Role::ProductionHead, Role::Manager])
}

fn supervisor() -> Actor {
    Actor::new("U-SUP", &[Role::Supervisor])
}

/// Coil factory with `stock_g` on hand and an order for `quantity` pieces
/// at 10 g per piece, zero tolerance.
fn factory(stock_g: i64, quantity: i64) -> FactoryState {
    let mut state = FactoryState::new();
    state.add_raw_material(RawMaterial::new("RM-A", MaterialType::Coil, "SS304"));
    state.add_product(Product::coil("P-X", "RM-A", 10));
    state.set_stock(StockBalance::new("RM-A", stock_g));
    state.add_work_center(WorkCenter::new("WC-1", "Process One", 1));
    state.add_bom_line(BomLine::new("P-X", "WC-1", 1));

    let input = NewMo {
        mo_id: "MO-P".to_string(),
        product_code: "P-X".to_string(),
        quantity,
        tolerance_cp: 0,
        scrap_cp: 0,
        priority: Priority::Medium,
        shift: ShiftId::Shift1,
        customer: None,
        rm_required_override_g: None,
    };
    mo_lifecycle::create_mo(&mut state, input, &ph(), t0()).unwrap();
    state
}

proptest! {
    /// I1 + I2: across reserve, draw, lock and release, stock never goes
    /// negative and material is conserved (stock + active allocations is
    /// constant once drawn).
    #[test]
    fn prop_stock_conservation_through_lifecycle(
        quantity in 100i64..=2_000,
        extra_stock in 0i64..=20_000,
        batch_pieces in 1i64..=1_000,
    ) {
        let required_g = quantity * 10;
        let initial_stock = required_g + extra_stock;
        let mut state = factory(initial_stock, quantity);
        let config = CoreConfig::default();

        // reservation never moves stock
        prop_assert_eq!(state.stock("RM-A").unwrap().available_g(), initial_stock);

        mo_lifecycle::approve_mo(&mut state, "MO-P", &ph(), t0(), "").unwrap();
        mo_lifecycle::start_production(&mut state, "MO-P", &ph(), t0(), "").unwrap();
        let after_draw = state.stock("RM-A").unwrap().available_g();
        prop_assert_eq!(after_draw, extra_stock);
        prop_assert!(after_draw >= 0);

        // conservation: stock + active allocations == initial
        let active: i64 = state
            .allocations_of_mo("MO-P")
            .iter()
            .filter(|allocation| allocation.is_active())
            .map(|allocation| allocation.quantity_g())
            .sum();
        prop_assert_eq!(after_draw + active, initial_stock);

        // a batch lock (possibly splitting) must conserve the total
        let planned_g = (batch_pieces.min(quantity) * 10).min(required_g - 100).max(1);
        if let Ok(batch_id) =
            batch_lifecycle::create_batch(&mut state, &config, "MO-P", planned_g, &ph(), t0())
        {
            batch_lifecycle::verify_batch(&mut state, &batch_id, &supervisor(), t0()).unwrap();
            batch_lifecycle::start_batch(&mut state, &config, &batch_id, &supervisor(), t0())
                .unwrap();

            let total_after_lock: i64 = state
                .allocations_of_mo("MO-P")
                .iter()
                .filter(|allocation| allocation.is_active())
                .map(|allocation| allocation.quantity_g())
                .sum();
            prop_assert_eq!(total_after_lock, active);
            prop_assert_eq!(state.stock("RM-A").unwrap().available_g(), after_draw);
        }

        // releasing everything returns exactly the drawn quantity
        allocation::release_all_for_mo(
            &mut state,
            "MO-P",
            &[AllocationStatus::Reserved, AllocationStatus::Locked],
            None,
            t0(),
            "property release",
        )
        .unwrap();
        prop_assert_eq!(state.stock("RM-A").unwrap().available_g(), initial_stock);
    }

    /// I4: a split leaves one locked child of exactly the need and the
    /// parent holding the rest.
    #[test]
    fn prop_split_is_exact(
        quantity in 200i64..=2_000,
        need_pieces in 1i64..=100,
    ) {
        prop_assume!(need_pieces < quantity);
        let required_g = quantity * 10;
        let mut state = factory(required_g, quantity);
        let config = CoreConfig::default();

        mo_lifecycle::approve_mo(&mut state, "MO-P", &ph(), t0(), "").unwrap();
        mo_lifecycle::start_production(&mut state, "MO-P", &ph(), t0(), "").unwrap();

        let planned_g = need_pieces * 10;
        let batch_id =
            batch_lifecycle::create_batch(&mut state, &config, "MO-P", planned_g, &ph(), t0())
                .unwrap();
        batch_lifecycle::verify_batch(&mut state, &batch_id, &supervisor(), t0()).unwrap();
        let lock =
            batch_lifecycle::start_batch(&mut state, &config, &batch_id, &supervisor(), t0())
                .unwrap();
        prop_assert_eq!(lock.locked_g, planned_g);

        let locked: i64 = state
            .allocations_of_mo("MO-P")
            .iter()
            .filter(|allocation| allocation.status() == AllocationStatus::Locked)
            .map(|allocation| allocation.quantity_g())
            .sum();
        let reserved: i64 = state
            .allocations_of_mo("MO-P")
            .iter()
            .filter(|allocation| allocation.status() == AllocationStatus::Reserved)
            .map(|allocation| allocation.quantity_g())
            .sum();
        prop_assert_eq!(locked, planned_g);
        prop_assert_eq!(locked + reserved, required_g);
    }

    /// I10: a completion is accepted exactly when the split sums back to
    /// the input within 0.010 kg.
    #[test]
    fn prop_completion_arithmetic(
        ok_g in 0i64..=10_000,
        scrap_g in 0i64..=10_000,
        rework_g in 0i64..=10_000,
        drift in -20i64..=20,
    ) {
        let input_g = ok_g + scrap_g + rework_g + drift;
        prop_assume!(input_g > 0);

        let mut state = factory(200_000, 20_000);
        let config = CoreConfig::default();
        mo_lifecycle::approve_mo(&mut state, "MO-P", &ph(), t0(), "").unwrap();
        mo_lifecycle::start_production(&mut state, "MO-P", &ph(), t0(), "").unwrap();
        let execution_id = state.executions_of_mo("MO-P")[0].id();

        let batch_id =
            batch_lifecycle::create_batch(&mut state, &config, "MO-P", 50_000, &ph(), t0())
                .unwrap();
        batch_lifecycle::verify_batch(&mut state, &batch_id, &supervisor(), t0()).unwrap();
        batch_lifecycle::start_batch(&mut state, &config, &batch_id, &supervisor(), t0()).unwrap();
        process_flow::start_batch_process(&mut state, &batch_id, execution_id, &supervisor(), t0())
            .unwrap();

        let result = batch_lifecycle::complete_batch_with_split(
            &mut state,
            &config,
            &batch_id,
            execution_id,
            input_g,
            ok_g,
            scrap_g,
            rework_g,
            "",
            &supervisor(),
            t0(),
        );
        if drift.abs() <= config.completion_tolerance_g {
            prop_assert!(result.is_ok());
        } else {
            prop_assert!(result.is_err());
        }
    }
}
