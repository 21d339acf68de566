//! Nutrient-gap fertilizer advice.
//!
//! The reference table maps a crop name to its recommended `(N, P, K)`.
//! Advice is derived by comparing the current soil levels against that
//! recommendation and naming the single most deficient nutrient.

use std::collections::HashMap;
use std::path::Path;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::agronomy::DataLoadError;
use crate::errors::DomainError;

const EMBEDDED_TABLE: &str = include_str!("../../data/fertilizer.csv");

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Nutrient {
    Nitrogen,
    Phosphorus,
    Potassium,
}

impl Nutrient {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Nitrogen => "Nitrogen",
            Self::Phosphorus => "Phosphorus",
            Self::Potassium => "Potassium",
        }
    }

    pub fn fertilizer_type(&self) -> &'static str {
        match self {
            Self::Nitrogen => "Urea or Ammonium Nitrate",
            Self::Phosphorus => "DAP or Superphosphate",
            Self::Potassium => "Potash or MOP",
        }
    }
}

/// Tie-break order when two nutrients share the largest deficiency.
pub const NUTRIENT_PRIORITY: [Nutrient; 3] =
    [Nutrient::Nitrogen, Nutrient::Phosphorus, Nutrient::Potassium];

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NutrientLevels {
    #[serde(rename = "N")]
    pub n: f64,
    #[serde(rename = "P")]
    pub p: f64,
    #[serde(rename = "K")]
    pub k: f64,
}

impl NutrientLevels {
    pub fn new(n: f64, p: f64, k: f64) -> Self {
        Self { n, p, k }
    }

    pub fn get(&self, nutrient: Nutrient) -> f64 {
        match nutrient {
            Nutrient::Nitrogen => self.n,
            Nutrient::Phosphorus => self.p,
            Nutrient::Potassium => self.k,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NutrientDeficiency {
    pub nutrient: Nutrient,
    pub deficiency: f64,
    pub recommendation: String,
    pub fertilizer_type: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FertilizerAdvice {
    Balanced,
    Deficiency(NutrientDeficiency),
}

impl FertilizerAdvice {
    pub const BALANCED_MESSAGE: &'static str = "Soil nutrients are adequate for this crop.";

    pub fn type_label(&self) -> &'static str {
        match self {
            Self::Balanced => "balanced",
            Self::Deficiency(deficiency) => deficiency.nutrient.label(),
        }
    }
}

impl Serialize for FertilizerAdvice {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Balanced => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "balanced")?;
                map.serialize_entry("message", Self::BALANCED_MESSAGE)?;
                map.end()
            }
            Self::Deficiency(deficiency) => {
                let mut map = serializer.serialize_map(Some(4))?;
                map.serialize_entry("type", deficiency.nutrient.label())?;
                map.serialize_entry("deficiency", &deficiency.deficiency)?;
                map.serialize_entry("recommendation", &deficiency.recommendation)?;
                map.serialize_entry("fertilizer_type", &deficiency.fertilizer_type)?;
                map.end()
            }
        }
    }
}

pub trait FertilizerTable: Send + Sync {
    /// Exact, case-sensitive crop name match.
    fn lookup(&self, crop: &str) -> Option<NutrientLevels>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug, Default)]
pub struct ReferenceTable {
    entries: HashMap<String, NutrientLevels>,
}

#[derive(Debug, Deserialize)]
struct ReferenceRow {
    #[serde(rename = "Crop")]
    crop: String,
    #[serde(rename = "N")]
    n: f64,
    #[serde(rename = "P")]
    p: f64,
    #[serde(rename = "K")]
    k: f64,
}

impl ReferenceTable {
    pub fn new(entries: impl IntoIterator<Item = (String, NutrientLevels)>) -> Self {
        Self { entries: entries.into_iter().collect() }
    }

    /// Table shipped with the crate.
    pub fn embedded() -> Result<Self, DataLoadError> {
        Self::from_csv_str(EMBEDDED_TABLE)
    }

    pub fn from_csv_path(path: &Path) -> Result<Self, DataLoadError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| DataLoadError::Read { path: path.to_path_buf(), source })?;
        Self::from_csv_str(&raw)
    }

    pub fn from_csv_str(raw: &str) -> Result<Self, DataLoadError> {
        let mut reader = csv::Reader::from_reader(raw.as_bytes());
        let mut entries = HashMap::new();
        for row in reader.deserialize::<ReferenceRow>() {
            let row = row.map_err(|error| DataLoadError::Parse(error.to_string()))?;
            entries.insert(row.crop, NutrientLevels::new(row.n, row.p, row.k));
        }

        if entries.is_empty() {
            return Err(DataLoadError::Empty("fertilizer reference table"));
        }
        Ok(Self { entries })
    }
}

impl FertilizerTable for ReferenceTable {
    fn lookup(&self, crop: &str) -> Option<NutrientLevels> {
        self.entries.get(crop).copied()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

pub fn recommend(
    table: &dyn FertilizerTable,
    crop: &str,
    current: NutrientLevels,
) -> Result<FertilizerAdvice, DomainError> {
    let recommended = table
        .lookup(crop)
        .ok_or_else(|| DomainError::CropNotInReferenceTable { crop: crop.to_string() })?;

    Ok(nutrient_gap(recommended, current))
}

pub fn nutrient_gap(recommended: NutrientLevels, current: NutrientLevels) -> FertilizerAdvice {
    let mut worst: Option<(Nutrient, f64)> = None;
    for nutrient in NUTRIENT_PRIORITY {
        let deficiency = (recommended.get(nutrient) - current.get(nutrient)).max(0.0);
        if deficiency <= 0.0 {
            continue;
        }
        // strict comparison keeps the earlier nutrient on ties
        if worst.map_or(true, |(_, best)| deficiency > best) {
            worst = Some((nutrient, deficiency));
        }
    }

    let Some((nutrient, deficiency)) = worst else {
        return FertilizerAdvice::Balanced;
    };

    let deficiency = round2(deficiency);
    FertilizerAdvice::Deficiency(NutrientDeficiency {
        nutrient,
        deficiency,
        recommendation: format!("Add {deficiency} units of {} fertilizer.", nutrient.label()),
        fertilizer_type: nutrient.fertilizer_type().to_string(),
    })
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::errors::DomainError;

    use super::{
        nutrient_gap, recommend, FertilizerAdvice, FertilizerTable, Nutrient, NutrientLevels,
        ReferenceTable,
    };

    fn table() -> ReferenceTable {
        ReferenceTable::new([("rice".to_string(), NutrientLevels::new(80.0, 40.0, 40.0))])
    }

    fn deficiency_of(advice: &FertilizerAdvice) -> (Nutrient, f64) {
        match advice {
            FertilizerAdvice::Deficiency(deficiency) => {
                (deficiency.nutrient, deficiency.deficiency)
            }
            FertilizerAdvice::Balanced => panic!("expected a deficiency, got balanced"),
        }
    }

    #[test]
    fn nitrogen_gap_is_reported_with_amount() {
        let advice = recommend(&table(), "rice", NutrientLevels::new(60.0, 40.0, 40.0))
            .expect("rice is in the table");

        assert_eq!(deficiency_of(&advice), (Nutrient::Nitrogen, 20.0));
        assert_eq!(
            serde_json::to_value(&advice).expect("serialize"),
            json!({
                "type": "Nitrogen",
                "deficiency": 20.0,
                "recommendation": "Add 20 units of Nitrogen fertilizer.",
                "fertilizer_type": "Urea or Ammonium Nitrate"
            })
        );
    }

    #[test]
    fn matching_levels_are_balanced() {
        let advice = recommend(&table(), "rice", NutrientLevels::new(80.0, 40.0, 40.0))
            .expect("rice is in the table");
        assert_eq!(advice, FertilizerAdvice::Balanced);
        assert_eq!(serde_json::to_value(&advice).expect("serialize")["type"], "balanced");
    }

    #[test]
    fn surplus_never_counts_as_deficiency() {
        let advice = nutrient_gap(
            NutrientLevels::new(80.0, 40.0, 40.0),
            NutrientLevels::new(200.0, 90.0, 41.0),
        );
        assert_eq!(advice, FertilizerAdvice::Balanced);
    }

    #[test]
    fn ties_follow_nitrogen_then_phosphorus_then_potassium() {
        let n_and_p = nutrient_gap(
            NutrientLevels::new(80.0, 40.0, 40.0),
            NutrientLevels::new(70.0, 30.0, 40.0),
        );
        assert_eq!(deficiency_of(&n_and_p), (Nutrient::Nitrogen, 10.0));

        let p_and_k = nutrient_gap(
            NutrientLevels::new(80.0, 40.0, 40.0),
            NutrientLevels::new(80.0, 35.0, 35.0),
        );
        assert_eq!(deficiency_of(&p_and_k), (Nutrient::Phosphorus, 5.0));
    }

    #[test]
    fn largest_gap_wins_over_priority() {
        let advice = nutrient_gap(
            NutrientLevels::new(80.0, 40.0, 40.0),
            NutrientLevels::new(75.0, 40.0, 10.0),
        );
        assert_eq!(deficiency_of(&advice), (Nutrient::Potassium, 30.0));
    }

    #[test]
    fn deficiency_is_rounded_to_two_decimals() {
        let advice = nutrient_gap(
            NutrientLevels::new(80.0, 0.0, 0.0),
            NutrientLevels::new(12.3456, 0.0, 0.0),
        );
        assert_eq!(deficiency_of(&advice), (Nutrient::Nitrogen, 67.65));
    }

    #[test]
    fn unknown_crop_is_a_domain_error() {
        let error = recommend(&table(), "Tomato", NutrientLevels::new(1.0, 1.0, 1.0))
            .expect_err("tomato is not in the table");
        assert_eq!(error, DomainError::CropNotInReferenceTable { crop: "Tomato".to_string() });
        assert_eq!(error.to_string(), "crop not in reference table");
    }

    #[test]
    fn lookup_is_case_sensitive() {
        assert!(table().lookup("Rice").is_none());
        assert!(table().lookup("rice").is_some());
    }

    #[test]
    fn embedded_table_loads_with_extra_columns() {
        let table = ReferenceTable::embedded().expect("embedded table parses");
        assert_eq!(table.len(), 22);
        assert_eq!(table.lookup("cotton"), Some(NutrientLevels::new(120.0, 40.0, 20.0)));
    }

    #[test]
    fn header_only_csv_is_rejected() {
        assert!(ReferenceTable::from_csv_str("Crop,N,P,K\n").is_err());
    }
}
