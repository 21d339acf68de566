use agrivision_core::agronomy::fertilizer::{recommend, FertilizerAdvice, NutrientLevels};
use agrivision_core::config::{AppConfig, LoadOptions};
use agrivision_core::errors::DomainError;

use super::{load_reference_table, CommandResult};

const COMMAND: &str = "fertilizer";

pub fn run(crop: &str, nitrogen: f64, phosphorus: f64, potassium: f64) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(COMMAND, "config_validation", error.to_string(), 2);
        }
    };

    let table = match load_reference_table(&config) {
        Ok(table) => table,
        Err(error) => {
            return CommandResult::failure(COMMAND, "reference_data", error.to_string(), 3);
        }
    };

    let current = NutrientLevels::new(nitrogen, phosphorus, potassium);
    match recommend(&table, crop, current) {
        Ok(advice) => {
            let message = match &advice {
                FertilizerAdvice::Balanced => FertilizerAdvice::BALANCED_MESSAGE.to_string(),
                FertilizerAdvice::Deficiency(deficiency) => deficiency.recommendation.clone(),
            };
            CommandResult::success(COMMAND, message, serde_json::to_value(&advice).ok())
        }
        Err(error @ DomainError::CropNotInReferenceTable { .. }) => {
            CommandResult::failure(COMMAND, "unknown_crop", format!("{error}: `{crop}`"), 4)
        }
        Err(error) => CommandResult::failure(COMMAND, "domain", error.to_string(), 5),
    }
}
