use lingua::{Language, LanguageDetectorBuilder};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// ISO 639-1 language codes supported by the speech service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum LanguageCode {
    #[serde(rename = "en")]
    #[sqlx(rename = "en")]
    English,
    #[serde(rename = "zh")]
    #[sqlx(rename = "zh")]
    Chinese,
    #[serde(rename = "ja")]
    #[sqlx(rename = "ja")]
    Japanese,
    #[serde(rename = "ko")]
    #[sqlx(rename = "ko")]
    Korean,
    #[serde(rename = "de")]
    #[sqlx(rename = "de")]
    German,
    #[serde(rename = "fr")]
    #[sqlx(rename = "fr")]
    French,
    #[serde(rename = "ru")]
    #[sqlx(rename = "ru")]
    Russian,
    #[serde(rename = "pt")]
    #[sqlx(rename = "pt")]
    Portuguese,
    #[serde(rename = "es")]
    #[sqlx(rename = "es")]
    Spanish,
    #[serde(rename = "it")]
    #[sqlx(rename = "it")]
    Italian,
}

const ALL_LANGUAGES: [LanguageCode; 10] = [
    LanguageCode::English,
    LanguageCode::Chinese,
    LanguageCode::Japanese,
    LanguageCode::Korean,
    LanguageCode::German,
    LanguageCode::French,
    LanguageCode::Russian,
    LanguageCode::Portuguese,
    LanguageCode::Spanish,
    LanguageCode::Italian,
];

impl LanguageCode {
    /// Get the ISO 639-1 code as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageCode::English => "en",
            LanguageCode::Chinese => "zh",
            LanguageCode::Japanese => "ja",
            LanguageCode::Korean => "ko",
            LanguageCode::German => "de",
            LanguageCode::French => "fr",
            LanguageCode::Russian => "ru",
            LanguageCode::Portuguese => "pt",
            LanguageCode::Spanish => "es",
            LanguageCode::Italian => "it",
        }
    }

    /// Language name as the speech service expects it in requests
    pub fn service_name(&self) -> &'static str {
        match self {
            LanguageCode::English => "English",
            LanguageCode::Chinese => "Chinese",
            LanguageCode::Japanese => "Japanese",
            LanguageCode::Korean => "Korean",
            LanguageCode::German => "German",
            LanguageCode::French => "French",
            LanguageCode::Russian => "Russian",
            LanguageCode::Portuguese => "Portuguese",
            LanguageCode::Spanish => "Spanish",
            LanguageCode::Italian => "Italian",
        }
    }

    /// Scripts that end sentences without a following space
    pub fn is_cjk(&self) -> bool {
        matches!(
            self,
            LanguageCode::Chinese | LanguageCode::Japanese | LanguageCode::Korean
        )
    }

    /// Convert lingua Language to LanguageCode
    pub fn from_lingua(language: Language) -> Self {
        match language {
            Language::English => LanguageCode::English,
            Language::Chinese => LanguageCode::Chinese,
            Language::Japanese => LanguageCode::Japanese,
            Language::Korean => LanguageCode::Korean,
            Language::German => LanguageCode::German,
            Language::French => LanguageCode::French,
            Language::Russian => LanguageCode::Russian,
            Language::Portuguese => LanguageCode::Portuguese,
            Language::Spanish => LanguageCode::Spanish,
            Language::Italian => LanguageCode::Italian,
        }
    }

    fn to_lingua(self) -> Language {
        match self {
            LanguageCode::English => Language::English,
            LanguageCode::Chinese => Language::Chinese,
            LanguageCode::Japanese => Language::Japanese,
            LanguageCode::Korean => Language::Korean,
            LanguageCode::German => Language::German,
            LanguageCode::French => Language::French,
            LanguageCode::Russian => Language::Russian,
            LanguageCode::Portuguese => Language::Portuguese,
            LanguageCode::Spanish => Language::Spanish,
            LanguageCode::Italian => Language::Italian,
        }
    }
}

impl std::fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LanguageCode {
    type Err = String;

    /// Accepts either the ISO code ("en") or the service name ("English")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ALL_LANGUAGES
            .iter()
            .find(|code| {
                code.as_str().eq_ignore_ascii_case(wanted)
                    || code.service_name().eq_ignore_ascii_case(wanted)
            })
            .copied()
            .ok_or_else(|| format!("unsupported language: {}", wanted))
    }
}

/// Requested language for a job: fixed up front, or detected from the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageSelection {
    Auto,
    Fixed(LanguageCode),
}

impl LanguageSelection {
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageSelection::Auto => "auto",
            LanguageSelection::Fixed(code) => code.as_str(),
        }
    }
}

impl FromStr for LanguageSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            Ok(LanguageSelection::Auto)
        } else {
            s.parse().map(LanguageSelection::Fixed)
        }
    }
}

/// Detect the language of the given text
/// Returns LanguageCode or defaults to English
pub fn detect_language(text: &str) -> LanguageCode {
    let languages: Vec<Language> = ALL_LANGUAGES.iter().map(|code| code.to_lingua()).collect();
    let detector = LanguageDetectorBuilder::from_languages(&languages).build();

    match detector.detect_language_of(text) {
        Some(language) => LanguageCode::from_lingua(language),
        None => {
            tracing::warn!("Could not detect language, falling back to English");
            LanguageCode::English
        }
    }
}
