use serde::Serialize;

/// Resume sections the AI features operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionType {
    Summary,
    Experience,
    Education,
    Certification,
    Project,
    Achievement,
    Language,
}

impl SectionType {
    pub const ALL: [SectionType; 7] = [
        Self::Summary,
        Self::Experience,
        Self::Education,
        Self::Certification,
        Self::Project,
        Self::Achievement,
        Self::Language,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Experience => "experience",
            Self::Education => "education",
            Self::Certification => "certification",
            Self::Project => "project",
            Self::Achievement => "achievement",
            Self::Language => "language",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Es,
    En,
}

impl Language {
    /// Language name as written into prompts.
    pub fn prompt_name(self) -> &'static str {
        match self {
            Self::Es => "Spanish",
            Self::En => "English",
        }
    }
}

/// Trimmed, case-insensitive match against the known section names.
pub fn sanitize_section_type(value: &str) -> Option<SectionType> {
    let normalized = value.trim().to_lowercase();
    SectionType::ALL
        .into_iter()
        .find(|section| section.as_str() == normalized)
}

/// Whitelist-only: exactly `"es"` or `"en"`, anything else falls back to Spanish.
pub fn sanitize_language(value: &str) -> Language {
    match value {
        "en" => Language::En,
        _ => Language::Es,
    }
}
