//! Speaker catalog for the remote backend.
//!
//! The server reports every speaker it has per language. Only the ones that
//! appear in the character roster matter, split into the advanced and regular
//! voice lists. A CSV availability report is written per list so missing voices
//! are easy to spot.

use crate::error::SynthResult;
use crate::voice::{sanitize_voice_name, KnownSpeakers};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::info;

/// Speakers for one language, as returned by `GET /speakers_list`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LanguageSpeakers {
    #[serde(default)]
    pub speakers: Vec<String>,
}

/// Raw `GET /speakers_list` payload keyed by language code.
pub type SpeakersByLanguage = BTreeMap<String, LanguageSpeakers>;

/// Voice names referenced by the character roster.
#[derive(Debug, Clone, Default)]
pub struct CharacterVoices {
    pub voice_models: Vec<String>,
    pub advanced_voice_models: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RosterRow {
    #[serde(default)]
    voice_model: Option<String>,
    #[serde(default)]
    advanced_voice_model: Option<String>,
}

impl CharacterVoices {
    /// Read a character roster CSV with `voice_model` / `advanced_voice_model` columns.
    /// Other columns are ignored; empty cells are skipped.
    pub fn from_csv(path: &Path) -> SynthResult<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut voices = Self::default();
        for row in reader.deserialize::<RosterRow>() {
            let row = row?;
            if let Some(v) = row.voice_model.filter(|v| !v.trim().is_empty()) {
                voices.voice_models.push(v);
            }
            if let Some(v) = row.advanced_voice_model.filter(|v| !v.trim().is_empty()) {
                voices.advanced_voice_models.push(v);
            }
        }
        Ok(voices)
    }
}

/// Roster voices that the server can actually speak, per language.
#[derive(Debug, Clone, Default)]
pub struct SpeakerCatalog {
    advanced: SpeakersByLanguage,
    regular: SpeakersByLanguage,
}

impl SpeakerCatalog {
    pub fn build(available: &SpeakersByLanguage, roster: &CharacterVoices) -> Self {
        Self {
            advanced: filter_speakers(available, &roster.advanced_voice_models),
            regular: filter_speakers(available, &roster.voice_models),
        }
    }

    /// Known speakers for `language`; empty if the server has none for it.
    pub fn for_language(&self, language: &str) -> KnownSpeakers {
        let pick = |map: &SpeakersByLanguage| {
            map.get(language)
                .map(|l| l.speakers.clone())
                .unwrap_or_default()
        };
        KnownSpeakers::new(pick(&self.advanced), pick(&self.regular))
    }

    /// Write `<dir>/advanced_voice_model_data_log_xtts.csv` and `<dir>/voice_model_data_log_xtts.csv`.
    pub fn write_reports(
        &self,
        available: &SpeakersByLanguage,
        roster: &CharacterVoices,
        dir: &Path,
    ) -> SynthResult<()> {
        std::fs::create_dir_all(dir)?;
        write_availability_report(
            available,
            &roster.advanced_voice_models,
            &dir.join("advanced_voice_model_data_log_xtts.csv"),
        )?;
        write_availability_report(
            available,
            &roster.voice_models,
            &dir.join("voice_model_data_log_xtts.csv"),
        )?;
        info!(dir = %dir.display(), "Speaker availability reports written");
        Ok(())
    }
}

/// Unique sanitized roster names, first occurrence order, blanks dropped.
fn unique_roster(roster: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    roster
        .iter()
        .map(|v| sanitize_voice_name(v))
        .filter(|v| !v.is_empty())
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

fn language_set(speakers: &LanguageSpeakers) -> HashSet<String> {
    speakers.speakers.iter().map(|s| sanitize_voice_name(s)).collect()
}

/// Keep roster voices the server lists, per language. Every server language gets an entry.
pub fn filter_speakers(available: &SpeakersByLanguage, roster: &[String]) -> SpeakersByLanguage {
    let roster = unique_roster(roster);
    available
        .iter()
        .map(|(lang, speakers)| {
            let present = language_set(speakers);
            let kept = roster.iter().filter(|v| present.contains(*v)).cloned().collect();
            (lang.clone(), LanguageSpeakers { speakers: kept })
        })
        .collect()
}

/// CSV with one row per roster voice and an `X` under each language it is available in.
pub fn write_availability_report(
    available: &SpeakersByLanguage,
    roster: &[String],
    path: &Path,
) -> SynthResult<()> {
    let languages: Vec<&String> = available.keys().collect();
    let sets: Vec<HashSet<String>> = available.values().map(language_set).collect();

    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec!["Voice Model".to_string()];
    header.extend(languages.iter().map(|l| l.to_string()));
    writer.write_record(&header)?;

    for voice in unique_roster(roster) {
        let mut row = vec![voice.clone()];
        row.extend(sets.iter().map(|set| {
            if set.contains(&voice) {
                "X".to_string()
            } else {
                String::new()
            }
        }));
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn available() -> SpeakersByLanguage {
        let mut map = SpeakersByLanguage::new();
        map.insert(
            "en".into(),
            LanguageSpeakers { speakers: vec!["malenord".into(), "femaleeventoned".into(), "lydia".into()] },
        );
        map.insert("de".into(), LanguageSpeakers { speakers: vec!["malenord".into()] });
        map
    }

    fn roster() -> CharacterVoices {
        CharacterVoices {
            voice_models: vec!["Male Nord".into(), "MaleNord".into(), "Female Even Toned".into(), "".into()],
            advanced_voice_models: vec!["Lydia".into(), "Serana".into()],
        }
    }

    #[test]
    fn filters_per_language_and_dedups() {
        let filtered = filter_speakers(&available(), &roster().voice_models);
        assert_eq!(filtered["en"].speakers, vec!["malenord", "femaleeventoned"]);
        assert_eq!(filtered["de"].speakers, vec!["malenord"]);
    }

    #[test]
    fn catalog_splits_advanced_and_regular() {
        let catalog = SpeakerCatalog::build(&available(), &roster());
        let en = catalog.for_language("en");
        assert!(en.advanced.contains("lydia"));
        assert!(!en.advanced.contains("serana"));
        assert!(en.regular.contains("femaleeventoned"));
        let fr = catalog.for_language("fr");
        assert!(fr.advanced.is_empty() && fr.regular.is_empty());
    }

    #[test]
    fn report_marks_available_languages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        write_availability_report(&available(), &roster().voice_models, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Voice Model,de,en");
        assert_eq!(lines[1], "malenord,X,X");
        assert_eq!(lines[2], "femaleeventoned,,X");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn reads_roster_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("characters.csv");
        std::fs::write(
            &path,
            "name,voice_model,advanced_voice_model,bio\nLydia,FemaleEvenToned,Lydia,Housecarl\nUlfric,MaleNord,,Jarl\n",
        )
        .unwrap();
        let roster = CharacterVoices::from_csv(&path).unwrap();
        assert_eq!(roster.voice_models, vec!["FemaleEvenToned", "MaleNord"]);
        assert_eq!(roster.advanced_voice_models, vec!["Lydia"]);
    }

    #[test]
    fn parses_server_payload() {
        let json = r#"{"en": {"speakers": ["A", "B"]}, "fr": {"speakers": []}}"#;
        let parsed: SpeakersByLanguage = serde_json::from_str(json).unwrap();
        assert_eq!(parsed["en"].speakers.len(), 2);
        assert!(parsed["fr"].speakers.is_empty());
    }
}
