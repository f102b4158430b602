use mlw_train::{accuracy, roc_auc};
use proptest::prelude::*;

fn labelled_scores() -> impl Strategy<Value = Vec<(bool, f64)>> {
    prop::collection::vec((any::<bool>(), 0.0f64..1.0), 2..64)
}

proptest! {
    #[test]
    fn auc_is_a_probability(pairs in labelled_scores()) {
        let labels: Vec<f64> = pairs.iter().map(|(l, _)| f64::from(u8::from(*l))).collect();
        let scores: Vec<f64> = pairs.iter().map(|(_, s)| *s).collect();
        let auc = roc_auc(&labels, &scores);
        prop_assert!((0.0..=1.0).contains(&auc));
    }

    #[test]
    fn flipping_scores_mirrors_auc(pairs in labelled_scores()) {
        let labels: Vec<f64> = pairs.iter().map(|(l, _)| f64::from(u8::from(*l))).collect();
        let scores: Vec<f64> = pairs.iter().map(|(_, s)| *s).collect();
        let flipped: Vec<f64> = scores.iter().map(|s| -s).collect();
        let sum = roc_auc(&labels, &scores) + roc_auc(&labels, &flipped);
        prop_assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn perfect_predictions_score_one(labels in prop::collection::vec(any::<bool>(), 1..64)) {
        let labels: Vec<f64> = labels.into_iter().map(|l| f64::from(u8::from(l))).collect();
        prop_assert_eq!(accuracy(&labels, &labels), 1.0);
    }
}
