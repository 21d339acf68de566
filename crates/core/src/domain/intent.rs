use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    CropRecommendation,
    FertilizerAdvice,
    WeatherInquiry,
    SoilManagement,
    DiseasePest,
    GeneralHelp,
    Greeting,
}

impl Intent {
    pub const ALL: [Intent; 7] = [
        Intent::CropRecommendation,
        Intent::FertilizerAdvice,
        Intent::WeatherInquiry,
        Intent::SoilManagement,
        Intent::DiseasePest,
        Intent::GeneralHelp,
        Intent::Greeting,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::CropRecommendation => "CROP_RECOMMENDATION",
            Self::FertilizerAdvice => "FERTILIZER_ADVICE",
            Self::WeatherInquiry => "WEATHER_INQUIRY",
            Self::SoilManagement => "SOIL_MANAGEMENT",
            Self::DiseasePest => "DISEASE_PEST",
            Self::GeneralHelp => "GENERAL_HELP",
            Self::Greeting => "GREETING",
        }
    }

    /// Accepts only an exact label after trimming and uppercasing.
    pub fn from_label(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|intent| intent.label() == normalized)
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
