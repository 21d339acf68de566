//! Typed soil and field parameters collected over a conversation.
//!
//! Values arrive as loosely shaped JSON (from the slot extractor or from the
//! HTTP body). Keys are matched case-insensitively and stored lowercase; a
//! key that is absent leaves the stored value alone, while an explicit
//! `null` clears it.

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SoilField {
    Nitrogen,
    Phosphorus,
    Potassium,
    Ph,
    Temperature,
    Humidity,
    Rainfall,
}

impl SoilField {
    /// Slot keys as stored (lowercase).
    pub fn key(&self) -> &'static str {
        match self {
            Self::Nitrogen => "n",
            Self::Phosphorus => "p",
            Self::Potassium => "k",
            Self::Ph => "ph",
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Rainfall => "rainfall",
        }
    }

    /// Name shown to users when asking for a missing value.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Nitrogen => "N",
            Self::Phosphorus => "P",
            Self::Potassium => "K",
            Self::Ph => "ph",
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Rainfall => "rainfall",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        match key {
            "n" => Some(Self::Nitrogen),
            "p" => Some(Self::Phosphorus),
            "k" => Some(Self::Potassium),
            "ph" => Some(Self::Ph),
            "temperature" => Some(Self::Temperature),
            "humidity" => Some(Self::Humidity),
            "rainfall" => Some(Self::Rainfall),
            _ => None,
        }
    }
}

/// Fields the crop recommendation flow insists on before it runs the model.
pub const CROP_REQUIRED_FIELDS: [SoilField; 6] = [
    SoilField::Nitrogen,
    SoilField::Phosphorus,
    SoilField::Potassium,
    SoilField::Temperature,
    SoilField::Humidity,
    SoilField::Rainfall,
];

pub const NPK_FIELDS: [SoilField; 3] =
    [SoilField::Nitrogen, SoilField::Phosphorus, SoilField::Potassium];

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SoilData {
    pub n: Option<f64>,
    pub p: Option<f64>,
    pub k: Option<f64>,
    pub ph: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub rainfall: Option<f64>,
    pub location: Option<String>,
    pub crop: Option<String>,
    pub extra: BTreeMap<String, Value>,
}

impl SoilData {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let mut soil = Self::default();
        SlotPatch::from_map(map).apply_to(&mut soil);
        soil
    }

    pub fn get(&self, field: SoilField) -> Option<f64> {
        match field {
            SoilField::Nitrogen => self.n,
            SoilField::Phosphorus => self.p,
            SoilField::Potassium => self.k,
            SoilField::Ph => self.ph,
            SoilField::Temperature => self.temperature,
            SoilField::Humidity => self.humidity,
            SoilField::Rainfall => self.rainfall,
        }
    }

    fn slot_mut(&mut self, field: SoilField) -> &mut Option<f64> {
        match field {
            SoilField::Nitrogen => &mut self.n,
            SoilField::Phosphorus => &mut self.p,
            SoilField::Potassium => &mut self.k,
            SoilField::Ph => &mut self.ph,
            SoilField::Temperature => &mut self.temperature,
            SoilField::Humidity => &mut self.humidity,
            SoilField::Rainfall => &mut self.rainfall,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        let numeric = [
            self.n,
            self.p,
            self.k,
            self.ph,
            self.temperature,
            self.humidity,
            self.rainfall,
        ]
        .iter()
        .filter(|value| value.is_some())
        .count();
        let text = [&self.location, &self.crop].iter().filter(|value| value.is_some()).count();
        numeric + text + self.extra.len()
    }

    /// Fields from `required` that are still unset, in the given order.
    pub fn missing(&self, required: &[SoilField]) -> Vec<SoilField> {
        required.iter().copied().filter(|field| self.get(*field).is_none()).collect()
    }

    pub fn to_json_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for field in [
            SoilField::Nitrogen,
            SoilField::Phosphorus,
            SoilField::Potassium,
            SoilField::Ph,
            SoilField::Temperature,
            SoilField::Humidity,
            SoilField::Rainfall,
        ] {
            if let Some(value) = self.get(field) {
                map.insert(field.key().to_string(), Value::from(value));
            }
        }
        if let Some(location) = &self.location {
            map.insert("location".to_string(), Value::String(location.clone()));
        }
        if let Some(crop) = &self.crop {
            map.insert("crop".to_string(), Value::String(crop.clone()));
        }
        for (key, value) in &self.extra {
            map.insert(key.clone(), value.clone());
        }
        map
    }
}

impl Serialize for SoilData {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let entries = self.to_json_map();
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (key, value) in &entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum SlotUpdate<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T: Clone> SlotUpdate<T> {
    pub fn apply(&self, target: &mut Option<T>) {
        match self {
            Self::Keep => {}
            Self::Clear => *target = None,
            Self::Set(value) => *target = Some(value.clone()),
        }
    }

    pub fn is_keep(&self) -> bool {
        matches!(self, Self::Keep)
    }
}

/// A partial update to [`SoilData`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SlotPatch {
    pub numeric: BTreeMap<&'static str, SlotUpdate<f64>>,
    pub location: SlotUpdate<String>,
    pub crop: SlotUpdate<String>,
    pub extra: BTreeMap<String, SlotUpdate<Value>>,
    /// Keys whose values had an unusable shape and were dropped.
    pub rejected: Vec<String>,
}

impl SlotPatch {
    /// Non-object values produce an empty patch.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self::from_map(map),
            _ => Self::default(),
        }
    }

    pub fn from_map(map: &Map<String, Value>) -> Self {
        let mut patch = Self::default();

        for (raw_key, value) in map {
            let key = raw_key.trim().to_ascii_lowercase();
            if key.is_empty() {
                continue;
            }

            if let Some(field) = SoilField::from_key(&key) {
                match numeric_update(value) {
                    Some(update) => {
                        patch.numeric.insert(field.key(), update);
                    }
                    None => patch.rejected.push(key),
                }
                continue;
            }

            match key.as_str() {
                "location" | "crop" => match text_update(value) {
                    Some(update) if key == "location" => patch.location = update,
                    Some(update) => patch.crop = update,
                    None => patch.rejected.push(key),
                },
                _ => {
                    let update = match value {
                        Value::Null => SlotUpdate::Clear,
                        other => SlotUpdate::Set(other.clone()),
                    };
                    patch.extra.insert(key, update);
                }
            }
        }

        patch
    }

    pub fn is_empty(&self) -> bool {
        self.numeric.values().all(SlotUpdate::is_keep)
            && self.location.is_keep()
            && self.crop.is_keep()
            && self.extra.is_empty()
    }

    /// New location carried by this patch, if it sets one.
    pub fn location(&self) -> Option<&str> {
        match &self.location {
            SlotUpdate::Set(location) => Some(location),
            _ => None,
        }
    }

    pub fn apply_to(&self, soil: &mut SoilData) {
        for (key, update) in &self.numeric {
            if let Some(field) = SoilField::from_key(key) {
                update.apply(soil.slot_mut(field));
            }
        }
        self.location.apply(&mut soil.location);
        self.crop.apply(&mut soil.crop);
        for (key, update) in &self.extra {
            match update {
                SlotUpdate::Keep => {}
                SlotUpdate::Clear => {
                    soil.extra.remove(key);
                }
                SlotUpdate::Set(value) => {
                    soil.extra.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

fn numeric_update(value: &Value) -> Option<SlotUpdate<f64>> {
    match value {
        Value::Null => Some(SlotUpdate::Clear),
        Value::Number(number) => number.as_f64().filter(|v| v.is_finite()).map(SlotUpdate::Set),
        Value::String(text) => {
            text.trim().parse::<f64>().ok().filter(|v| v.is_finite()).map(SlotUpdate::Set)
        }
        _ => None,
    }
}

fn text_update(value: &Value) -> Option<SlotUpdate<String>> {
    match value {
        Value::Null => Some(SlotUpdate::Clear),
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| SlotUpdate::Set(trimmed.to_string()))
        }
        Value::Number(number) => Some(SlotUpdate::Set(number.to_string())),
        _ => None,
    }
}
