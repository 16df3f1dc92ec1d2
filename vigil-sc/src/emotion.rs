//! Emotion slots, emotion vectors and the classifier label permutation

use crate::classifier::LabelScore;
use crate::error::AudioError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Number of display slots
pub const EMOTION_SLOTS: usize = 5;

/// Display slot of an emotion, in presentation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionSlot {
    Sad,
    Neutral,
    Angry,
    Happy,
    Other,
}

impl EmotionSlot {
    pub const ALL: [EmotionSlot; EMOTION_SLOTS] = [
        EmotionSlot::Sad,
        EmotionSlot::Neutral,
        EmotionSlot::Angry,
        EmotionSlot::Happy,
        EmotionSlot::Other,
    ];

    pub fn index(self) -> usize {
        match self {
            EmotionSlot::Sad => 0,
            EmotionSlot::Neutral => 1,
            EmotionSlot::Angry => 2,
            EmotionSlot::Happy => 3,
            EmotionSlot::Other => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EmotionSlot::Sad => "sad",
            EmotionSlot::Neutral => "neutral",
            EmotionSlot::Angry => "angry",
            EmotionSlot::Happy => "happy",
            EmotionSlot::Other => "other",
        }
    }
}

impl fmt::Display for EmotionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Five emotion values in slot order, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EmotionVector(pub [f32; EMOTION_SLOTS]);

impl EmotionVector {
    pub fn new(values: [f32; EMOTION_SLOTS]) -> Self {
        Self(values)
    }

    /// Same value in every slot
    pub fn splat(value: f32) -> Self {
        Self([value; EMOTION_SLOTS])
    }

    pub fn get(&self, slot: EmotionSlot) -> f32 {
        self.0[slot.index()]
    }

    pub fn set(&mut self, slot: EmotionSlot, value: f32) {
        self.0[slot.index()] = value;
    }

    pub fn values(&self) -> &[f32; EMOTION_SLOTS] {
        &self.0
    }

    /// Scale to the [0, 100] presentation range, clamped
    pub fn to_percentages(&self) -> [f32; EMOTION_SLOTS] {
        let mut out = [0.0; EMOTION_SLOTS];
        for (dst, &v) in out.iter_mut().zip(self.0.iter()) {
            *dst = if v.is_finite() { (v * 100.0).clamp(0.0, 100.0) } else { 0.0 };
        }
        out
    }
}

/// Label table used when none is configured
pub fn default_label_table() -> BTreeMap<String, EmotionSlot> {
    EmotionSlot::ALL
        .iter()
        .map(|slot| (slot.name().to_string(), *slot))
        .collect()
}

fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Validated mapping from classifier output positions to display slots.
///
/// Built once at startup from the classifier's declared labels and a
/// `label -> slot` table. Every slot is fed by exactly one classifier label;
/// classifier labels absent from the table are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelPermutation {
    labels: Vec<String>,
    slots: Vec<Option<EmotionSlot>>,
}

impl LabelPermutation {
    pub fn new(
        classifier_labels: &[String],
        table: &BTreeMap<String, EmotionSlot>,
    ) -> Result<Self, AudioError> {
        check_table(table)?;

        let labels: Vec<String> = classifier_labels.iter().map(|l| normalize_label(l)).collect();
        for (i, label) in labels.iter().enumerate() {
            if label.is_empty() {
                return Err(AudioError::LabelMapping(format!(
                    "Classifier label at position {} is empty",
                    i
                )));
            }
            if labels[..i].contains(label) {
                return Err(AudioError::LabelMapping(format!(
                    "Classifier declares label '{}' more than once",
                    label
                )));
            }
        }

        let table: BTreeMap<String, EmotionSlot> = table
            .iter()
            .map(|(label, slot)| (normalize_label(label), *slot))
            .collect();

        for label in table.keys() {
            if !labels.contains(label) {
                return Err(AudioError::LabelMapping(format!(
                    "Mapped label '{}' is not declared by the classifier (declared: {:?})",
                    label, labels
                )));
            }
        }

        let slots = labels.iter().map(|label| table.get(label).copied()).collect();

        Ok(Self { labels, slots })
    }

    /// Labels in classifier output order
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn slot_of(&self, label: &str) -> Option<EmotionSlot> {
        let label = normalize_label(label);
        self.labels
            .iter()
            .position(|l| *l == label)
            .and_then(|i| self.slots[i])
    }

    /// Classifier label feeding a slot
    pub fn label_for(&self, slot: EmotionSlot) -> &str {
        self.slots
            .iter()
            .position(|s| *s == Some(slot))
            .map(|i| self.labels[i].as_str())
            // check_table guarantees every slot is fed
            .unwrap_or("")
    }

    /// Remap one classifier output into slot order
    pub fn apply(&self, scores: &[LabelScore]) -> Result<EmotionVector, AudioError> {
        if scores.len() != self.labels.len() {
            return Err(AudioError::ClassifierFailure(format!(
                "Classifier returned {} scores, expected {}",
                scores.len(),
                self.labels.len()
            )));
        }

        let mut vector = EmotionVector::default();
        for ((score, label), slot) in scores.iter().zip(&self.labels).zip(&self.slots) {
            if normalize_label(&score.label) != *label {
                return Err(AudioError::ClassifierFailure(format!(
                    "Classifier output label '{}' does not match declared label '{}'",
                    score.label, label
                )));
            }
            if let Some(slot) = slot {
                let value = if score.score.is_finite() {
                    score.score.clamp(0.0, 1.0)
                } else {
                    0.0
                };
                vector.set(*slot, value);
            }
        }

        Ok(vector)
    }
}

/// Every slot must be claimed by exactly one label
pub(crate) fn check_table(table: &BTreeMap<String, EmotionSlot>) -> Result<(), AudioError> {
    let mut owners: [Option<&str>; EMOTION_SLOTS] = [None; EMOTION_SLOTS];
    for (label, slot) in table {
        if let Some(previous) = owners[slot.index()] {
            return Err(AudioError::LabelMapping(format!(
                "Slot '{}' is claimed by both '{}' and '{}'",
                slot, previous, label
            )));
        }
        owners[slot.index()] = Some(label.as_str());
    }

    let missing: Vec<&str> = EmotionSlot::ALL
        .iter()
        .filter(|slot| owners[slot.index()].is_none())
        .map(|slot| slot.name())
        .collect();
    if !missing.is_empty() {
        return Err(AudioError::LabelMapping(format!(
            "No classifier label mapped to slot(s) {:?}",
            missing
        )));
    }

    let mut seen = Vec::with_capacity(table.len());
    for label in table.keys() {
        let label = normalize_label(label);
        if seen.contains(&label) {
            return Err(AudioError::LabelMapping(format!(
                "Label '{}' appears more than once (labels are case-insensitive)",
                label
            )));
        }
        seen.push(label);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn scores(pairs: &[(&str, f32)]) -> Vec<LabelScore> {
        pairs
            .iter()
            .map(|(label, score)| LabelScore {
                label: label.to_string(),
                score: *score,
            })
            .collect()
    }

    #[test]
    fn test_slot_indices_are_a_bijection() {
        let mut seen = [false; EMOTION_SLOTS];
        for slot in EmotionSlot::ALL {
            assert!(!seen[slot.index()]);
            seen[slot.index()] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_default_model_order_remaps_like_dashboard_bars() {
        // Model output order: neutral, happy, sad, angry, other
        let perm = LabelPermutation::new(
            &labels(&["neutral", "happy", "sad", "angry", "other"]),
            &default_label_table(),
        )
        .unwrap();

        let vector = perm
            .apply(&scores(&[
                ("neutral", 0.1),
                ("happy", 0.2),
                ("sad", 0.3),
                ("angry", 0.15),
                ("other", 0.25),
            ]))
            .unwrap();

        assert_eq!(vector.0, [0.3, 0.1, 0.15, 0.2, 0.25]);
    }

    #[test]
    fn test_round_trip_every_label_one_slot() {
        let declared = labels(&["other", "angry", "happy", "neutral", "sad"]);
        let perm = LabelPermutation::new(&declared, &default_label_table()).unwrap();

        for slot in EmotionSlot::ALL {
            let label = perm.label_for(slot);
            assert_eq!(perm.slot_of(label), Some(slot));
        }
        for label in &declared {
            let slot = perm.slot_of(label).unwrap();
            assert_eq!(perm.label_for(slot), label);
        }
    }

    #[test]
    fn test_each_slot_written_exactly_once() {
        let declared = labels(&["neutral", "happy", "sad", "angry", "other"]);
        let perm = LabelPermutation::new(&declared, &default_label_table()).unwrap();

        // Give each position a unique marker and check each appears once
        let marked: Vec<LabelScore> = declared
            .iter()
            .enumerate()
            .map(|(i, l)| LabelScore {
                label: l.clone(),
                score: (i as f32 + 1.0) / 10.0,
            })
            .collect();
        let vector = perm.apply(&marked).unwrap();

        let mut values: Vec<f32> = vector.0.to_vec();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(values, vec![0.1, 0.2, 0.3, 0.4, 0.5]);
    }

    #[test]
    fn test_custom_table_with_unused_labels() {
        let declared = labels(&["ang", "calm", "fear", "hap", "neu", "sad", "sur"]);
        let mut table = BTreeMap::new();
        table.insert("sad".to_string(), EmotionSlot::Sad);
        table.insert("neu".to_string(), EmotionSlot::Neutral);
        table.insert("ang".to_string(), EmotionSlot::Angry);
        table.insert("hap".to_string(), EmotionSlot::Happy);
        table.insert("sur".to_string(), EmotionSlot::Other);

        let perm = LabelPermutation::new(&declared, &table).unwrap();
        assert_eq!(perm.slot_of("calm"), None);
        assert_eq!(perm.slot_of("fear"), None);
        assert_eq!(perm.slot_of("SUR"), Some(EmotionSlot::Other));
    }

    #[test]
    fn test_slot_claimed_twice_rejected() {
        let mut table = default_label_table();
        table.insert("other".to_string(), EmotionSlot::Sad);
        let result = LabelPermutation::new(
            &labels(&["neutral", "happy", "sad", "angry", "other"]),
            &table,
        );
        assert!(matches!(result, Err(AudioError::LabelMapping(_))));
    }

    #[test]
    fn test_missing_slot_rejected() {
        let mut table = default_label_table();
        table.remove("happy");
        let result = LabelPermutation::new(&labels(&["neutral", "sad", "angry", "other"]), &table);
        assert!(matches!(result, Err(AudioError::LabelMapping(_))));
    }

    #[test]
    fn test_unknown_mapped_label_rejected() {
        let result = LabelPermutation::new(
            &labels(&["neutral", "happy", "sad", "angry", "surprise"]),
            &default_label_table(),
        );
        assert!(matches!(result, Err(AudioError::LabelMapping(_))));
    }

    #[test]
    fn test_duplicate_classifier_label_rejected() {
        let result = LabelPermutation::new(
            &labels(&["neutral", "happy", "sad", "angry", "other", "Sad"]),
            &default_label_table(),
        );
        assert!(matches!(result, Err(AudioError::LabelMapping(_))));
    }

    #[test]
    fn test_apply_rejects_reordered_output() {
        let perm = LabelPermutation::new(
            &labels(&["neutral", "happy", "sad", "angry", "other"]),
            &default_label_table(),
        )
        .unwrap();
        let result = perm.apply(&scores(&[
            ("happy", 0.2),
            ("neutral", 0.1),
            ("sad", 0.3),
            ("angry", 0.15),
            ("other", 0.25),
        ]));
        assert!(matches!(result, Err(AudioError::ClassifierFailure(_))));
    }

    #[test]
    fn test_apply_rejects_wrong_length() {
        let perm = LabelPermutation::new(
            &labels(&["neutral", "happy", "sad", "angry", "other"]),
            &default_label_table(),
        )
        .unwrap();
        let result = perm.apply(&scores(&[("neutral", 1.0)]));
        assert!(matches!(result, Err(AudioError::ClassifierFailure(_))));
    }

    #[test]
    fn test_apply_clamps_and_sanitizes() {
        let perm = LabelPermutation::new(
            &labels(&["neutral", "happy", "sad", "angry", "other"]),
            &default_label_table(),
        )
        .unwrap();
        let vector = perm
            .apply(&scores(&[
                ("neutral", 1.5),
                ("happy", -0.2),
                ("sad", f32::NAN),
                ("angry", 0.5),
                ("other", f32::INFINITY),
            ]))
            .unwrap();
        assert_eq!(vector.get(EmotionSlot::Neutral), 1.0);
        assert_eq!(vector.get(EmotionSlot::Happy), 0.0);
        assert_eq!(vector.get(EmotionSlot::Sad), 0.0);
        assert_eq!(vector.get(EmotionSlot::Other), 0.0);
    }

    #[test]
    fn test_to_percentages_clamped() {
        let vector = EmotionVector::new([0.5, 1.2, -0.1, 0.0, f32::NAN]);
        assert_eq!(vector.to_percentages(), [50.0, 100.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_slot_serde_lowercase() {
        let json = serde_json::to_string(&EmotionSlot::Happy).unwrap();
        assert_eq!(json, "\"happy\"");
        let slot: EmotionSlot = serde_json::from_str("\"other\"").unwrap();
        assert_eq!(slot, EmotionSlot::Other);
    }
}
