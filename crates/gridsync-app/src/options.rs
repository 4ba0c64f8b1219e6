// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_MAX_OVERFLOW_CORRECTIONS: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeMode {
    Light,
    Dark,
    #[default]
    System,
}

impl ThemeMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phrase {
    Confirm,
    Cancel,
    ConfirmTitle,
    ActionFailed,
    NavigationFailed,
    ExportProcessing,
    Search,
    NoRows,
    Navigating,
    AllMatchingSelected,
}

impl Phrase {
    const fn fallback(self) -> &'static str {
        match self {
            Self::Confirm => "confirm",
            Self::Cancel => "cancel",
            Self::ConfirmTitle => "are you sure?",
            Self::ActionFailed => "action failed",
            Self::NavigationFailed => "could not load rows",
            Self::ExportProcessing => "export is being prepared",
            Self::Search => "search",
            Self::NoRows => "no rows",
            Self::Navigating => "loading",
            Self::AllMatchingSelected => "all matching rows selected",
        }
    }
}

/// Per-instance phrase table; missing entries fall back to built-in English.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Translations {
    overrides: BTreeMap<Phrase, String>,
}

impl Translations {
    pub fn with(mut self, phrase: Phrase, text: impl Into<String>) -> Self {
        self.overrides.insert(phrase, text.into());
        self
    }

    pub fn get(&self, phrase: Phrase) -> &str {
        self.overrides
            .get(&phrase)
            .map_or(phrase.fallback(), String::as_str)
    }
}

/// Maps icon names from the descriptor to glyphs the shell can draw.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IconSet {
    glyphs: BTreeMap<String, String>,
}

impl IconSet {
    pub fn with(mut self, name: impl Into<String>, glyph: impl Into<String>) -> Self {
        self.glyphs.insert(name.into(), glyph.into());
        self
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.glyphs.get(name).map(String::as_str)
    }
}

/// Everything a grid instance would otherwise read from process-wide state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridOptions {
    pub translations: Translations,
    pub icons: IconSet,
    pub theme: ThemeMode,
    pub max_overflow_corrections: u8,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            translations: Translations::default(),
            icons: IconSet::default(),
            theme: ThemeMode::default(),
            max_overflow_corrections: DEFAULT_MAX_OVERFLOW_CORRECTIONS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GridOptions, IconSet, Phrase, ThemeMode, Translations};

    #[test]
    fn translations_fall_back_to_builtin_text() {
        let translations = Translations::default().with(Phrase::Confirm, "bevestigen");
        assert_eq!(translations.get(Phrase::Confirm), "bevestigen");
        assert_eq!(translations.get(Phrase::Cancel), "cancel");
    }

    #[test]
    fn separate_instances_do_not_share_overrides() {
        let first = GridOptions {
            translations: Translations::default().with(Phrase::Search, "zoeken"),
            ..GridOptions::default()
        };
        let second = GridOptions::default();
        assert_eq!(first.translations.get(Phrase::Search), "zoeken");
        assert_eq!(second.translations.get(Phrase::Search), "search");
    }

    #[test]
    fn icon_set_resolves_known_names_only() {
        let icons = IconSet::default().with("trash", "x");
        assert_eq!(icons.resolve("trash"), Some("x"));
        assert_eq!(icons.resolve("pencil"), None);
    }

    #[test]
    fn theme_mode_parses_known_values() {
        assert_eq!(ThemeMode::parse("dark"), Some(ThemeMode::Dark));
        assert_eq!(ThemeMode::parse("sepia"), None);
    }
}
