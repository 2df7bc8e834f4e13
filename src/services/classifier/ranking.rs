use crate::error::AppError;
use crate::models::classify_types::{RankedPrediction, Ranking};

pub const DEFAULT_TOP_K: usize = 3;

/// Label for a model output position. Positions past the class index get a
/// synthesized name so a stale manifest still yields usable results.
pub fn label_for(index: usize, class_index: &[String]) -> String {
    class_index
        .get(index)
        .cloned()
        .unwrap_or_else(|| format!("Class {}", index))
}

/// Index of the highest probability; ties keep the lowest index.
pub fn top1(probabilities: &[f32]) -> Option<(usize, f32)> {
    let mut iter = probabilities.iter().copied().enumerate();
    let (mut best_index, mut best_prob) = iter.next()?;
    for (i, p) in iter {
        if p > best_prob {
            best_prob = p;
            best_index = i;
        }
    }
    Some((best_index, best_prob))
}

/// Up to `k` (index, probability) pairs, highest first. The sort is stable,
/// so equal probabilities stay in index order.
pub fn top_k(probabilities: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
    indexed.truncate(k);
    indexed
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max_logit = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exp_sum: f32 = logits.iter().map(|&x| (x - max_logit).exp()).sum();
    logits
        .iter()
        .map(|&x| (x - max_logit).exp() / exp_sum)
        .collect()
}

fn ranked(
    index: usize,
    probabilities: &[f32],
    class_index: &[String],
) -> Result<RankedPrediction, AppError> {
    let probability = *probabilities.get(index).ok_or(AppError::Index {
        index,
        len: probabilities.len(),
    })?;
    Ok(RankedPrediction {
        index,
        label: label_for(index, class_index),
        probability,
    })
}

/// Pair a probability vector with the class index and pick top-1 and top-k.
///
/// Outputs holding NaN or infinities are rejected; neither ordering is
/// meaningful over them.
pub fn rank(
    probabilities: &[f32],
    class_index: &[String],
    k: usize,
) -> Result<Ranking, AppError> {
    if let Some(i) = probabilities.iter().position(|p| !p.is_finite()) {
        return Err(AppError::Inference(format!(
            "Model produced a non-finite score at index {}",
            i
        )));
    }
    if probabilities.len() != class_index.len() {
        log::warn!(
            "{}; unmatched positions get synthesized labels",
            AppError::ShapeMismatch {
                expected: class_index.len(),
                actual: probabilities.len(),
            }
        );
    }

    let (best, _) = top1(probabilities)
        .ok_or_else(|| AppError::Inference("Model produced an empty output".to_string()))?;

    let top = ranked(best, probabilities, class_index)?;
    let top_k = top_k(probabilities, k)
        .into_iter()
        .map(|(i, _)| ranked(i, probabilities, class_index))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Ranking { top, top_k })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn top1_finds_maximum_and_keeps_first_on_tie() {
        assert_eq!(top1(&[0.1, 0.7, 0.2]), Some((1, 0.7)));
        assert_eq!(top1(&[0.4, 0.2, 0.4]), Some((0, 0.4)));
        assert_eq!(top1(&[0.25, 0.25, 0.25, 0.25]), Some((0, 0.25)));
        assert_eq!(top1(&[]), None);
    }

    #[test]
    fn top_k_is_stable_and_truncated() {
        let probs = [0.1, 0.3, 0.1, 0.3, 0.2];
        assert_eq!(top_k(&probs, 3), vec![(1, 0.3), (3, 0.3), (4, 0.2)]);
        assert_eq!(top_k(&probs, 5).last(), Some(&(2, 0.1)));
    }

    #[test]
    fn top_k_is_idempotent() {
        let probs = [0.05, 0.5, 0.15, 0.3];
        assert_eq!(top_k(&probs, 3), top_k(&probs, 3));
    }

    #[test]
    fn short_vectors_return_every_entry_without_padding() {
        assert_eq!(top_k(&[0.4, 0.6], 3), vec![(1, 0.6), (0, 0.4)]);

        let ranking = rank(&[1.0], &labels(&["pizza"]), 3).unwrap();
        assert_eq!(ranking.top_k.len(), 1);
        assert_eq!(ranking.top_k[0].label, "pizza");
    }

    #[test]
    fn top1_agrees_with_head_of_top_k() {
        let probs = [0.2, 0.35, 0.35, 0.1];
        let ranking = rank(&probs, &labels(&["a", "b", "c", "d"]), 3).unwrap();
        assert_eq!(ranking.top, ranking.top_k[0]);
        assert_eq!(ranking.top.label, "b");
    }

    #[test]
    fn mismatched_class_index_synthesizes_labels() {
        let probs = [0.05, 0.05, 0.1, 0.2, 0.6];
        let ranking = rank(&probs, &labels(&["pizza", "sushi", "ramen"]), 3).unwrap();

        assert_eq!(ranking.top.index, 4);
        assert_eq!(ranking.top.label, "Class 4");
        assert_eq!(ranking.top_k[1].label, "Class 3");
        assert_eq!(ranking.top_k[2].label, "ramen");
    }

    #[test]
    fn empty_output_is_an_inference_error() {
        assert!(matches!(
            rank(&[], &labels(&["pizza"]), 3),
            Err(AppError::Inference(_))
        ));
    }

    #[test]
    fn non_finite_scores_are_an_inference_error() {
        let names = labels(&["a", "b", "c", "d"]);
        for probs in [
            vec![f32::NAN, 0.9, 0.1, 0.0],
            vec![0.1, f32::NAN, 0.9, 0.3],
            vec![0.1, f32::INFINITY, 0.2, 0.3],
        ] {
            assert!(matches!(rank(&probs, &names, 3), Err(AppError::Inference(_))));
        }
    }

    #[test]
    fn softmax_is_a_distribution_preserving_order() {
        let probs = softmax(&[2.0, 1.0, 0.1, 1000.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(top1(&probs).map(|(i, _)| i), Some(3));
        assert!(probs.iter().all(|p| p.is_finite()));
    }
}
