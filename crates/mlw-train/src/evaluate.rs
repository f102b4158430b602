/// Fraction of predictions equal to their label.
pub fn accuracy(labels: &[f64], predictions: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let correct = labels
        .iter()
        .zip(predictions)
        .filter(|(label, prediction)| label == prediction)
        .count();
    correct as f64 / labels.len() as f64
}

/// Area under the ROC curve via the Mann-Whitney rank statistic; tied
/// scores share their average rank. Returns 0.5 when only one class is
/// present.
pub fn roc_auc(labels: &[f64], scores: &[f64]) -> f64 {
    let mut order: Vec<usize> = (0..scores.len().min(labels.len())).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; order.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // ranks are 1-based
        let average = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = average;
        }
        start = end;
    }

    let positives = order.iter().filter(|&&idx| labels[idx] == 1.0).count() as f64;
    let negatives = order.len() as f64 - positives;
    if positives == 0.0 || negatives == 0.0 {
        return 0.5;
    }
    let positive_rank_sum: f64 = order
        .iter()
        .filter(|&&idx| labels[idx] == 1.0)
        .map(|&idx| ranks[idx])
        .sum();
    (positive_rank_sum - positives * (positives + 1.0) / 2.0) / (positives * negatives)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_and_inverted_rankings() {
        let labels = [0.0, 0.0, 1.0, 1.0];
        assert_eq!(roc_auc(&labels, &[0.1, 0.2, 0.8, 0.9]), 1.0);
        assert_eq!(roc_auc(&labels, &[0.9, 0.8, 0.2, 0.1]), 0.0);
        assert_eq!(roc_auc(&labels, &[0.5, 0.5, 0.5, 0.5]), 0.5);
    }

    #[test]
    fn matches_hand_computed_value() {
        // one discordant pair out of four
        let labels = [0.0, 1.0, 0.0, 1.0];
        assert_eq!(roc_auc(&labels, &[0.1, 0.3, 0.35, 0.8]), 0.75);
        assert_eq!(accuracy(&labels, &[0.0, 1.0, 1.0, 1.0]), 0.75);
    }
}
