//! Quantity conventions and fixed-point arithmetic
//!
//! All mass values are i64 grams. Kilograms at scale 3 map exactly onto
//! grams, so every stock, allocation and completion quantity is integer
//! arithmetic with no rounding drift.
//!
//! Percent-valued knobs (tolerance, scrap) are i64 hundredths of a percent,
//! so 2.00 % is stored as 200.
//!
//! CRITICAL: All mass values are i64 (grams)

/// Mass in grams (kilograms at scale 3).
pub type Grams = i64;

/// Percent at scale 2 (2.00 % == 200).
pub type CentiPercent = i64;

/// Scale divisor for [`CentiPercent`] factors: 100 % == 10 000.
pub const CENTI_PERCENT_SCALE: i64 = 10_000;

/// Convert whole kilograms to grams.
pub const fn kg(kilograms: i64) -> Grams {
    kilograms * 1000
}

/// Multiply `value` by `num / den` with round-half-up on the final division.
///
/// Used for tolerance factors and proportional splits where the intermediate
/// product stays well inside i64 range (quantities are factory-scale grams).
///
/// # Panics
/// Panics if `den` is zero.
pub fn mul_div_round(value: i64, num: i64, den: i64) -> i64 {
    assert!(den != 0, "division by zero in quantity arithmetic");
    let wide = (value as i128) * (num as i128);
    let den = den as i128;
    let half = den / 2;
    let rounded = if wide >= 0 {
        (wide + half) / den
    } else {
        (wide - half) / den
    };
    rounded as i64
}

/// Apply a `(1 + tolerance)` factor to a gram quantity.
///
/// # Example
/// ```
/// use manufacturing_core_rs::core::units::apply_tolerance;
///
/// // 25 kg with a 2.00 % tolerance is 25.5 kg
/// assert_eq!(apply_tolerance(25_000, 200), 25_500);
/// ```
pub fn apply_tolerance(quantity_g: Grams, tolerance_cp: CentiPercent) -> Grams {
    mul_div_round(
        quantity_g,
        CENTI_PERCENT_SCALE + tolerance_cp,
        CENTI_PERCENT_SCALE,
    )
}

/// Render grams as a kilogram string with three decimals (display only).
pub fn format_kg(quantity_g: Grams) -> String {
    let sign = if quantity_g < 0 { "-" } else { "" };
    let abs = quantity_g.unsigned_abs();
    format!("{}{}.{:03}", sign, abs / 1000, abs % 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_tolerance_exact() {
        // 50 kg + 2 % = 51 kg
        assert_eq!(apply_tolerance(50_000, 200), 51_000);
        // zero tolerance is identity
        assert_eq!(apply_tolerance(12_345, 0), 12_345);
    }

    #[test]
    fn test_mul_div_rounds_half_up() {
        assert_eq!(mul_div_round(5, 1, 2), 3);
        assert_eq!(mul_div_round(-5, 1, 2), -3);
        assert_eq!(mul_div_round(4, 1, 2), 2);
    }

    #[test]
    fn test_format_kg() {
        assert_eq!(format_kg(51_000), "51.000");
        assert_eq!(format_kg(25_500), "25.500");
        assert_eq!(format_kg(-50), "-0.050");
    }
}
