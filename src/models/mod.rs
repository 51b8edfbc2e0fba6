use serde::{Deserialize, Serialize};

/// Which catalog a vehicle (or a filter) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleState {
    New,
    Used,
}

/// Extraction output: one optional field per semantic slot.
///
/// A slot the extractor could not fill stays `None`/empty; an empty
/// `Entities` is a valid value, not an error. Numeric pairs always satisfy
/// `from <= to` (reversed bounds are swapped during extraction).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entities {
    pub brand: Option<String>,
    pub model: Option<String>,
    /// Canonical color names, first-appearance order.
    pub colors: Vec<String>,
    /// One or more canonical body types, OR semantics.
    pub body_types: Vec<String>,
    pub price_from: Option<i64>,
    pub price_to: Option<i64>,
    pub power_from: Option<i64>,
    pub power_to: Option<i64>,
    pub power_exact: Option<i64>,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub mileage_from: Option<i64>,
    pub mileage_to: Option<i64>,
    pub engine_vol_from: Option<f64>,
    pub engine_vol_to: Option<f64>,
    pub engine_vol_exact: Option<f64>,
    pub owners_from: Option<i64>,
    pub owners_to: Option<i64>,
    pub owners_count: Option<i64>,
    pub acceleration_from: Option<f64>,
    pub acceleration_to: Option<f64>,
    pub seats: Option<i64>,
    pub city: Option<String>,
    pub fuel_type: Option<String>,
    pub transmission: Option<String>,
    pub drive_type: Option<String>,
    pub state: Option<VehicleState>,
}

impl Entities {
    pub fn is_empty(&self) -> bool {
        self == &Entities::default()
    }

    /// True if any numeric slot carries a value, including exact/count forms.
    pub fn has_any_numeric(&self) -> bool {
        self.price_from.is_some()
            || self.price_to.is_some()
            || self.power_from.is_some()
            || self.power_to.is_some()
            || self.power_exact.is_some()
            || self.year_from.is_some()
            || self.year_to.is_some()
            || self.mileage_from.is_some()
            || self.mileage_to.is_some()
            || self.engine_vol_from.is_some()
            || self.engine_vol_to.is_some()
            || self.engine_vol_exact.is_some()
            || self.owners_from.is_some()
            || self.owners_to.is_some()
            || self.owners_count.is_some()
            || self.acceleration_from.is_some()
            || self.acceleration_to.is_some()
            || self.seats.is_some()
    }

    /// True if some from/to pair is fully bounded, or an exact/count field
    /// is present. Single-sided ranges do not count.
    pub fn has_strict_range(&self) -> bool {
        (self.price_from.is_some() && self.price_to.is_some())
            || (self.power_from.is_some() && self.power_to.is_some())
            || (self.year_from.is_some() && self.year_to.is_some())
            || (self.mileage_from.is_some() && self.mileage_to.is_some())
            || (self.engine_vol_from.is_some() && self.engine_vol_to.is_some())
            || (self.owners_from.is_some() && self.owners_to.is_some())
            || (self.acceleration_from.is_some() && self.acceleration_to.is_some())
            || self.power_exact.is_some()
            || self.engine_vol_exact.is_some()
            || self.owners_count.is_some()
    }

    /// Fill slots the extractor left empty from caller-supplied hints.
    /// Extracted values always win over hints.
    pub fn merge_hints(&mut self, hints: &Entities) {
        macro_rules! fill {
            ($field:ident) => {
                if self.$field.is_none() {
                    self.$field = hints.$field.clone();
                }
            };
        }
        fill!(brand);
        fill!(model);
        fill!(price_from);
        fill!(price_to);
        fill!(power_from);
        fill!(power_to);
        fill!(power_exact);
        fill!(year_from);
        fill!(year_to);
        fill!(mileage_from);
        fill!(mileage_to);
        fill!(engine_vol_from);
        fill!(engine_vol_to);
        fill!(engine_vol_exact);
        fill!(owners_from);
        fill!(owners_to);
        fill!(owners_count);
        fill!(acceleration_from);
        fill!(acceleration_to);
        fill!(seats);
        fill!(city);
        fill!(fuel_type);
        fill!(transmission);
        fill!(drive_type);
        fill!(state);
        if self.colors.is_empty() {
            self.colors = hints.colors.clone();
        }
        if self.body_types.is_empty() {
            self.body_types = hints.body_types.clone();
        }
    }
}

/// One catalog row, the union of the new/used schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: i64,
    pub title: String,
    pub brand: String,
    pub model: String,
    pub vin: Option<String>,
    pub color: Option<String>,
    pub price: i64,
    pub city: Option<String>,
    pub manufacture_year: i32,
    pub body_type: Option<String>,
    pub gear_box_type: Option<String>,
    pub driving_gear_type: Option<String>,
    pub engine_vol: Option<f64>,
    pub power: Option<i64>,
    pub fuel_type: Option<String>,
    pub dealer_center: Option<String>,
    /// Only populated for the used catalog.
    pub mileage: Option<i64>,
    pub is_used: bool,
}

/// Sortable catalog columns. A closed enum so ORDER BY never sees
/// caller-controlled text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    Price,
    Year,
    Power,
    Mileage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: SortColumn,
    pub direction: SortDirection,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            column: SortColumn::Price,
            direction: SortDirection::Ascending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 10,
        }
    }
}

/// Filter-engine output for one query: the requested page plus the totals
/// needed for pagination, and an explanation for the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub vehicles: Vec<Vehicle>,
    pub total_count: usize,
    pub offset: usize,
    pub limit: usize,
    pub has_more: bool,
    pub explanation: String,
    /// Set when the brand+model filter matched nothing and the engine fell
    /// back to the brand alone.
    pub relaxed_model: bool,
    /// Set when a catalog was unreachable and the result degraded to empty.
    pub degraded: bool,
}

impl SearchResult {
    pub fn empty(explanation: impl Into<String>) -> Self {
        Self {
            vehicles: Vec::new(),
            total_count: 0,
            offset: 0,
            limit: 0,
            has_more: false,
            explanation: explanation.into(),
            relaxed_model: false,
            degraded: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingKind {
    StrictDb,
    SoftDb,
    GenerativeFallback,
}

/// The routing verdict together with the flags that produced it, kept for
/// observability and testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub kind: RoutingKind,
    pub is_command: bool,
    pub is_question_list: bool,
    pub has_strict_range: bool,
    pub has_soft_numeric: bool,
    pub has_any_numeric: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    CarList,
    NoResults,
    LlmAnswerWithCars,
    Comparison,
    Clarification,
    Statistics,
    Error,
}

/// The single structured object handed back to the HTTP layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "type")]
    pub response_type: ResponseType,
    pub message: String,
    pub cars: Vec<Vehicle>,
    pub entities: Entities,
    pub total_count: usize,
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_entities_have_no_numeric_cues() {
        let e = Entities::default();
        assert!(e.is_empty());
        assert!(!e.has_any_numeric());
        assert!(!e.has_strict_range());
    }

    #[test]
    fn single_sided_range_is_not_strict() {
        let e = Entities {
            power_from: Some(160),
            ..Default::default()
        };
        assert!(e.has_any_numeric());
        assert!(!e.has_strict_range());
    }

    #[test]
    fn exact_field_counts_as_strict() {
        let e = Entities {
            owners_count: Some(1),
            ..Default::default()
        };
        assert!(e.has_strict_range());
    }

    #[test]
    fn hints_fill_only_unset_slots() {
        let mut extracted = Entities {
            brand: Some("BMW".to_string()),
            ..Default::default()
        };
        let hints = Entities {
            brand: Some("Audi".to_string()),
            city: Some("Москва".to_string()),
            ..Default::default()
        };
        extracted.merge_hints(&hints);
        assert_eq!(extracted.brand.as_deref(), Some("BMW"));
        assert_eq!(extracted.city.as_deref(), Some("Москва"));
    }
}
