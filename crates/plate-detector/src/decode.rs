//! Model output decoding
//!
//! Detection models emit `[1, N, 5]` rows of `(x, y, w, h, score)` with the
//! box normalized to `[0, 1]`. Recognition models emit `[1, T, C]` logits
//! over `blank + ALPHABET`, decoded greedily (CTC).

use crate::{BoundingBox, DetectorError};

/// Characters a recognizer can emit; class 0 is the CTC blank
pub const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Detection rows scoring below this are ignored
pub const MIN_BOX_SCORE: f32 = 0.5;

const BOX_ROW: usize = 5;

/// Best box proposal from a detection model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxCandidate {
    /// `[x, y, w, h]` as frame fractions
    pub rect: [f32; 4],
    pub score: f32,
}

impl BoxCandidate {
    /// Convert to pixel coordinates, clipped to the frame
    pub fn to_pixels(&self, frame_width: u32, frame_height: u32) -> BoundingBox {
        let [x, y, w, h] = self.rect.map(|v| v.clamp(0.0, 1.0));
        let (fw, fh) = (frame_width as f32, frame_height as f32);
        BoundingBox::new(
            x * fw,
            y * fh,
            w.min(1.0 - x) * fw,
            h.min(1.0 - y) * fh,
        )
    }
}

/// Recognized characters with their mean confidence
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedText {
    pub text: String,
    pub confidence: f32,
}

/// Strip a leading batch dimension of 1
fn unbatched(shape: &[usize]) -> &[usize] {
    match shape {
        [1, rest @ ..] if rest.len() == 2 => rest,
        other => other,
    }
}

/// Highest scoring box at or above `min_score`
pub fn best_box(shape: &[usize], data: &[f32], min_score: f32) -> Result<Option<BoxCandidate>, DetectorError> {
    let [rows, cols] = unbatched(shape) else {
        return Err(DetectorError::OutputShape(format!("expected [1, N, 5], got {:?}", shape)));
    };
    if *cols != BOX_ROW || data.len() != rows * cols {
        return Err(DetectorError::OutputShape(format!(
            "expected [1, N, 5] with {} values, got {:?} with {}",
            rows * BOX_ROW,
            shape,
            data.len()
        )));
    }

    let best = data
        .chunks_exact(BOX_ROW)
        .filter(|row| row[4].is_finite() && row[4] >= min_score)
        .max_by(|a, b| a[4].total_cmp(&b[4]))
        .map(|row| BoxCandidate {
            rect: [row[0], row[1], row[2], row[3]],
            score: row[4].clamp(0.0, 1.0),
        });

    Ok(best)
}

fn softmax_max(logits: &[f32]) -> (usize, f32) {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut best = (0, f32::NEG_INFINITY);
    let mut sum = 0.0;
    for (i, &v) in logits.iter().enumerate() {
        sum += (v - max).exp();
        if v > best.1 {
            best = (i, v);
        }
    }
    (best.0, (best.1 - max).exp() / sum)
}

/// Greedy CTC decode: argmax per step, collapse repeats, drop blanks.
///
/// Confidence is the mean probability of the emitted characters. Steps with
/// a non-finite logit are skipped.
pub fn ctc_greedy(shape: &[usize], data: &[f32]) -> Result<Option<RecognizedText>, DetectorError> {
    let classes = ALPHABET.len() + 1;
    let [steps, cols] = unbatched(shape) else {
        return Err(DetectorError::OutputShape(format!("expected [1, T, C], got {:?}", shape)));
    };
    if *cols != classes || data.len() != steps * cols {
        return Err(DetectorError::OutputShape(format!(
            "expected {} classes, got {:?} with {} values",
            classes,
            shape,
            data.len()
        )));
    }

    let mut text = String::new();
    let mut probs = Vec::new();
    let mut previous = 0;

    for step in data.chunks_exact(classes) {
        if !step.iter().all(|v| v.is_finite()) {
            continue;
        }
        let (class, prob) = softmax_max(step);
        if class != 0 && class != previous {
            text.push(ALPHABET[class - 1] as char);
            probs.push(prob);
        }
        previous = class;
    }

    if text.is_empty() {
        return Ok(None);
    }

    let confidence = probs.iter().sum::<f32>() / probs.len() as f32;
    Ok(Some(RecognizedText { text, confidence }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_hot(class: usize, strength: f32) -> Vec<f32> {
        let mut row = vec![0.0; ALPHABET.len() + 1];
        row[class] = strength;
        row
    }

    fn class_of(c: char) -> usize {
        ALPHABET.iter().position(|&a| a as char == c).unwrap() + 1
    }

    #[test]
    fn test_best_box_picks_highest_score() {
        let data = [
            0.1, 0.1, 0.2, 0.1, 0.4, // below threshold
            0.2, 0.5, 0.3, 0.1, 0.9, //
            0.6, 0.6, 0.2, 0.1, 0.7,
        ];
        let best = best_box(&[1, 3, 5], &data, MIN_BOX_SCORE).unwrap().unwrap();
        assert_eq!(best.rect, [0.2, 0.5, 0.3, 0.1]);
        assert!((best.score - 0.9).abs() < 1e-6);

        let bbox = best.to_pixels(1000, 500);
        assert!((bbox.x - 200.0).abs() < 1e-3);
        assert!((bbox.y - 250.0).abs() < 1e-3);
        assert!((bbox.width - 300.0).abs() < 1e-3);
    }

    #[test]
    fn test_best_box_none_below_threshold() {
        let data = [0.1, 0.1, 0.2, 0.1, 0.3];
        assert!(best_box(&[1, 1, 5], &data, MIN_BOX_SCORE).unwrap().is_none());
    }

    #[test]
    fn test_best_box_rejects_bad_shape() {
        assert!(best_box(&[1, 2, 4], &[0.0; 8], MIN_BOX_SCORE).is_err());
        assert!(best_box(&[1, 2, 5], &[0.0; 5], MIN_BOX_SCORE).is_err());
    }

    #[test]
    fn test_ctc_collapses_repeats_and_blanks() {
        let steps = [
            one_hot(class_of('A'), 10.0),
            one_hot(class_of('A'), 10.0),
            one_hot(0, 10.0),
            one_hot(class_of('S'), 10.0),
            one_hot(class_of('1'), 10.0),
            one_hot(0, 10.0),
            one_hot(class_of('1'), 10.0),
        ];
        let data: Vec<f32> = steps.concat();
        let text = ctc_greedy(&[1, steps.len(), ALPHABET.len() + 1], &data)
            .unwrap()
            .unwrap();
        assert_eq!(text.text, "AS11");
        assert!(text.confidence > 0.99);
    }

    #[test]
    fn test_ctc_all_blank_is_none() {
        let data: Vec<f32> = [one_hot(0, 5.0), one_hot(0, 5.0)].concat();
        assert!(ctc_greedy(&[1, 2, ALPHABET.len() + 1], &data).unwrap().is_none());
    }

    #[test]
    fn test_ctc_confidence_reflects_uncertainty() {
        // Equal logits: the emitted class has probability 1/C
        let mut row = vec![1.0; ALPHABET.len() + 1];
        row[class_of('Z')] = 1.0 + f32::EPSILON * 4.0;
        let text = ctc_greedy(&[1, 1, ALPHABET.len() + 1], &row).unwrap().unwrap();
        assert!(text.confidence < 0.1);
    }

    #[test]
    fn test_ctc_skips_non_finite_steps() {
        let mut poisoned = one_hot(class_of('B'), 10.0);
        poisoned[3] = f32::NAN;
        let steps = [one_hot(class_of('A'), 10.0), poisoned, one_hot(class_of('C'), 10.0)];
        let data: Vec<f32> = steps.concat();

        let text = ctc_greedy(&[1, steps.len(), ALPHABET.len() + 1], &data)
            .unwrap()
            .unwrap();
        assert_eq!(text.text, "AC");
        assert!(text.confidence.is_finite());

        let only_nan = vec![f32::NAN; ALPHABET.len() + 1];
        assert!(ctc_greedy(&[1, 1, ALPHABET.len() + 1], &only_nan).unwrap().is_none());
    }
}
