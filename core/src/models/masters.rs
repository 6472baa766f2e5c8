//! Master data consumed by the core
//!
//! Products, raw materials, work centers and BOM lines are inputs. The core
//! holds them for referential integrity and for the handful of pure
//! computations they carry (RM requirement, strips per order), but never
//! edits them as part of an orchestration flow.

use serde::{Deserialize, Serialize};

use crate::core::units::{apply_tolerance, CentiPercent, Grams};

/// Raw material identifier (the material code).
pub type MaterialCode = String;

/// Work center identifier. Work center and process are the same thing in
/// supervisor-assignment context.
pub type WorkCenterId = String;

/// How a product consumes raw material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialType {
    /// Wire products drawn from coil stock; batch quantities are grams.
    Coil,
    /// Stamped products cut from sheet strips; batch quantities are strips.
    Sheet,
}

/// Raw material master record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMaterial {
    pub material_code: MaterialCode,
    pub material_type: MaterialType,
    pub grade: String,
    pub description: String,
}

impl RawMaterial {
    /// Create a raw-material master record.
    ///
    /// # Arguments
    /// * `material_code` - Unique material code
    /// * `material_type` - Coil or sheet stock
    /// * `grade` - Material grade designation
    pub fn new(
        material_code: impl Into<MaterialCode>,
        material_type: MaterialType,
        grade: impl Into<String>,
    ) -> Self {
        Self {
            material_code: material_code.into(),
            material_type,
            grade: grade.into(),
            description: String::new(),
        }
    }
}

/// Product master record.
///
/// Coil products carry `grams_per_product`; sheet products carry the strip
/// geometry (`pcs_per_strip`, `grams_per_strip`) used by the strip
/// calculator and the RM requirement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub product_code: String,
    pub material_type: MaterialType,
    /// Raw material this product is made from, if assigned.
    pub material: Option<MaterialCode>,
    /// Coil: net grams of material per finished piece.
    pub grams_per_product: Option<Grams>,
    /// Sheet: whole-sheet length in mm.
    pub sheet_length_mm: Option<i64>,
    /// Sheet: whole-sheet breadth in mm.
    pub sheet_breadth_mm: Option<i64>,
    /// Sheet: finished pieces cut from one strip.
    pub pcs_per_strip: Option<i64>,
    /// Sheet: net grams of material per strip.
    pub grams_per_strip: Option<Grams>,
}

impl Product {
    /// New coil product.
    ///
    /// # Arguments
    /// * `product_code` - Unique product code
    /// * `material` - Raw material the product is drawn from
    /// * `grams_per_product` - Net grams of material per finished piece
    ///
    /// # Example
    /// ```
    /// use manufacturing_core_rs::models::masters::Product;
    ///
    /// // 1000 pieces at 50 g each with a 2.00 % tolerance need 51.000 kg
    /// let product = Product::coil("P-SPRING", "RM-A", 50);
    /// assert_eq!(product.rm_required(1000, 200), Some(51_000));
    /// ```
    pub fn coil(
        product_code: impl Into<String>,
        material: impl Into<MaterialCode>,
        grams_per_product: Grams,
    ) -> Self {
        Self {
            product_code: product_code.into(),
            material_type: MaterialType::Coil,
            material: Some(material.into()),
            grams_per_product: Some(grams_per_product),
            sheet_length_mm: None,
            sheet_breadth_mm: None,
            pcs_per_strip: None,
            grams_per_strip: None,
        }
    }

    /// New sheet product.
    ///
    /// # Arguments
    /// * `product_code` - Unique product code
    /// * `material` - Raw material the strips are cut from
    /// * `pcs_per_strip` - Finished pieces cut from one strip
    /// * `grams_per_strip` - Net grams of material per strip
    pub fn sheet(
        product_code: impl Into<String>,
        material: impl Into<MaterialCode>,
        pcs_per_strip: i64,
        grams_per_strip: Grams,
    ) -> Self {
        Self {
            product_code: product_code.into(),
            material_type: MaterialType::Sheet,
            material: Some(material.into()),
            grams_per_product: None,
            sheet_length_mm: None,
            sheet_breadth_mm: None,
            pcs_per_strip: Some(pcs_per_strip),
            grams_per_strip: Some(grams_per_strip),
        }
    }

    /// Strip calculator: strips needed to produce `pieces` finished pieces.
    ///
    /// Rounds up, partial strips are whole strips on the shop floor.
    /// Falls back to one strip per piece when `pcs_per_strip` is missing
    /// or zero.
    ///
    /// # Example
    /// ```
    /// use manufacturing_core_rs::models::masters::Product;
    ///
    /// let product = Product::sheet("P-CLIP", "RM-S", 24, 800);
    /// assert_eq!(product.strips_required(24), 1);
    /// assert_eq!(product.strips_required(25), 2);
    /// ```
    pub fn strips_required(&self, pieces: i64) -> i64 {
        match self.pcs_per_strip {
            Some(per_strip) if per_strip > 0 => (pieces + per_strip - 1) / per_strip,
            _ => pieces,
        }
    }

    /// Raw material required for an order of `quantity` pieces with the
    /// given tolerance, in grams.
    ///
    /// # Arguments
    /// * `quantity` - Target quantity in finished pieces
    /// * `tolerance_cp` - Tolerance at scale 2 (2.00 % == 200)
    ///
    /// # Returns
    /// The gram requirement, or `None` when the product lacks the mass
    /// data for its material type.
    pub fn rm_required(&self, quantity: i64, tolerance_cp: CentiPercent) -> Option<Grams> {
        let net = match self.material_type {
            MaterialType::Coil => quantity.checked_mul(self.grams_per_product?)?,
            MaterialType::Sheet => self
                .strips_required(quantity)
                .checked_mul(self.grams_per_strip?)?,
        };
        Some(apply_tolerance(net, tolerance_cp))
    }
}

/// Work center (process) master record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkCenter {
    pub id: WorkCenterId,
    pub name: String,
    pub code: i32,
    pub is_active: bool,
}

impl WorkCenter {
    /// Create an active work center.
    ///
    /// # Arguments
    /// * `id` - Work center id
    /// * `name` - Display name
    /// * `code` - Numeric process code
    pub fn new(id: impl Into<WorkCenterId>, name: impl Into<String>, code: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            code,
            is_active: true,
        }
    }
}

/// One BOM line: a process applied to a product, with the material it
/// consumes. Lines are ordered; process executions are created from the
/// deduplicated process sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BomLine {
    pub product_code: String,
    pub work_center: WorkCenterId,
    pub material: Option<MaterialCode>,
    pub sequence: u32,
    pub is_active: bool,
}

impl BomLine {
    /// Create an active BOM line.
    ///
    /// # Arguments
    /// * `product_code` - Product the line belongs to
    /// * `work_center` - Process applied by this line
    /// * `sequence` - Position of the line in the routing
    pub fn new(
        product_code: impl Into<String>,
        work_center: impl Into<WorkCenterId>,
        sequence: u32,
    ) -> Self {
        Self {
            product_code: product_code.into(),
            work_center: work_center.into(),
            material: None,
            sequence,
            is_active: true,
        }
    }
}
