pub mod agronomy;
pub mod config;
pub mod domain;
pub mod errors;

pub use agronomy::crop_model::{
    top_predictions, top_recommendations, CentroidCropModel, CropModel, FeatureVector,
    FEATURE_ORDER,
};
pub use agronomy::fertilizer::{
    recommend, FertilizerAdvice, FertilizerTable, Nutrient, NutrientDeficiency, NutrientLevels,
    ReferenceTable, NUTRIENT_PRIORITY,
};
pub use agronomy::DataLoadError;
pub use domain::context::{ChatContext, CropRecommendation, Role, Turn};
pub use domain::intent::Intent;
pub use domain::soil::{SlotPatch, SlotUpdate, SoilData, SoilField};
pub use domain::weather::{WeatherError, WeatherProvider, WeatherReport};
pub use errors::{ApplicationError, DomainError, InterfaceError};
