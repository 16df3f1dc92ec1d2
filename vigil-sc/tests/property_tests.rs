use proptest::prelude::*;
use std::collections::BTreeMap;
use vigil_sc::*;

fn vector() -> impl Strategy<Value = EmotionVector> {
    prop::array::uniform5(0.0f32..=1.0f32).prop_map(EmotionVector::new)
}

proptest! {
    #[test]
    fn test_smoothing_stays_between_display_and_raw(
        display in vector(),
        raw in vector(),
        alpha in 0.001f32..=1.0f32,
    ) {
        let out = smooth(&display, &raw, alpha);
        for i in 0..EMOTION_SLOTS {
            let lo = display.0[i].min(raw.0[i]) - 1e-6;
            let hi = display.0[i].max(raw.0[i]) + 1e-6;
            prop_assert!(out.0[i] >= lo && out.0[i] <= hi);
        }
    }

    #[test]
    fn test_percentages_always_in_range(values in prop::array::uniform5(-10.0f32..10.0f32)) {
        for bar in EmotionVector::new(values).to_percentages() {
            prop_assert!((0.0..=100.0).contains(&bar));
        }
    }

    #[test]
    fn test_softmax_is_distribution(logits in prop::collection::vec(-50.0f32..50.0f32, 1..16)) {
        let probs = classifier::softmax_with_temperature(&logits, SOFTMAX_TEMPERATURE).unwrap();
        prop_assert_eq!(probs.len(), logits.len());
        let sum: f32 = probs.iter().sum();
        prop_assert!((sum - 1.0).abs() < 1e-4);
        prop_assert!(probs.iter().all(|p| *p >= 0.0 && *p <= 1.0));
    }

    #[test]
    fn test_any_label_order_maps_each_slot_once(
        order in Just((0..EMOTION_SLOTS).collect::<Vec<usize>>()).prop_shuffle(),
        scores in prop::array::uniform5(0.0f32..=1.0f32),
    ) {
        let labels: Vec<String> = order.iter().map(|i| format!("label{}", i)).collect();
        let table: BTreeMap<String, EmotionSlot> = (0..EMOTION_SLOTS)
            .map(|i| (format!("label{}", i), EmotionSlot::ALL[i]))
            .collect();
        let permutation = LabelPermutation::new(&labels, &table).unwrap();

        let label_scores: Vec<LabelScore> = labels
            .iter()
            .zip(scores)
            .map(|(label, score)| LabelScore { label: label.clone(), score })
            .collect();
        let vector = permutation.apply(&label_scores).unwrap();

        for (position, slot_index) in order.iter().enumerate() {
            prop_assert_eq!(vector.0[*slot_index], scores[position]);
        }
    }
}
