//! Raw output tensor → label.
//!
//! The graph is a detector: every candidate row carries four box values and an
//! objectness score ahead of the per-class scores. Only the class scores are
//! read; the whole grid is treated as one classification.

use serde::{Deserialize, Serialize};
use tract_onnx::prelude::{
    tract_ndarray::{s, ArrayView2, Axis, Ix2},
    Tensor,
};

use crate::error::PredictError;
use crate::types::{Prediction, PredictionOutcome};

/// Box (4) + objectness (1) columns that precede the class scores.
pub const BOX_ATTRIBUTES: usize = 5;

/// How candidates and attributes are laid out in the output tensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputLayout {
    /// `[1, N, 5 + C]`: one row per candidate.
    #[default]
    CandidateMajor,
    /// `[1, 5 + C, N]`: one row per attribute.
    AttributeMajor,
}

impl std::fmt::Display for OutputLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputLayout::CandidateMajor => write!(f, "candidate_major"),
            OutputLayout::AttributeMajor => write!(f, "attribute_major"),
        }
    }
}

/// Winning cell of the score block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestScore {
    pub row: usize,
    pub class: usize,
    pub score: f32,
}

/// View the class scores of `output` as `candidates × classes`.
pub fn score_block(output: &Tensor, layout: OutputLayout) -> Result<ArrayView2<'_, f32>, PredictError> {
    let shape = output.shape().to_vec();
    let shape_err = |reason: &str| PredictError::Shape {
        shape: shape.clone(),
        reason: reason.to_string(),
    };

    let view = output
        .to_array_view::<f32>()
        .map_err(|_| shape_err("output is not f32"))?;

    let grid = match view.ndim() {
        2 => view,
        3 if view.shape()[0] == 1 => view.index_axis_move(Axis(0), 0),
        3 => return Err(shape_err("batch dimension must be 1")),
        _ => return Err(shape_err("expected [N, 5 + C] or [1, N, 5 + C]")),
    };
    let grid = grid
        .into_dimensionality::<Ix2>()
        .map_err(|_| shape_err("output is not two-dimensional"))?;

    let scores = match layout {
        OutputLayout::CandidateMajor => {
            if grid.ncols() < BOX_ATTRIBUTES {
                return Err(shape_err("fewer than 5 attribute columns"));
            }
            grid.slice_move(s![.., BOX_ATTRIBUTES..])
        }
        OutputLayout::AttributeMajor => {
            if grid.nrows() < BOX_ATTRIBUTES {
                return Err(shape_err("fewer than 5 attribute rows"));
            }
            grid.slice_move(s![BOX_ATTRIBUTES.., ..]).reversed_axes()
        }
    };

    Ok(scores)
}

/// Row-major scan for the strictly greatest score.
///
/// Every cell is visited. Ties keep the first cell seen and NaN never wins.
pub fn best_score(scores: ArrayView2<'_, f32>) -> Option<BestScore> {
    let mut best: Option<BestScore> = None;

    for (row, candidate) in scores.outer_iter().enumerate() {
        for (class, &score) in candidate.iter().enumerate() {
            let better = match best {
                None => !score.is_nan(),
                Some(current) => score > current.score,
            };
            if better {
                best = Some(BestScore { row, class, score });
            }
        }
    }

    best
}

/// Apply the acceptance threshold to the winning cell.
pub fn decide(
    best: Option<BestScore>,
    threshold: f32,
    labels: &[String],
    negative_label: &str,
) -> Result<Prediction, PredictError> {
    let Some(best) = best else {
        return Ok(Prediction {
            label: negative_label.to_string(),
            outcome: PredictionOutcome::NoMatch,
            confidence: None,
            class_index: None,
            candidate_row: None,
        });
    };

    if best.score > threshold {
        let label = labels.get(best.class).ok_or(PredictError::ClassOutOfRange {
            index: best.class,
            len: labels.len(),
        })?;
        Ok(Prediction {
            label: label.clone(),
            outcome: PredictionOutcome::Match,
            confidence: Some(best.score),
            class_index: Some(best.class),
            candidate_row: Some(best.row),
        })
    } else {
        Ok(Prediction {
            label: negative_label.to_string(),
            outcome: PredictionOutcome::NoMatch,
            confidence: Some(best.score),
            class_index: Some(best.class),
            candidate_row: Some(best.row),
        })
    }
}

pub fn interpret(
    scores: ArrayView2<'_, f32>,
    threshold: f32,
    labels: &[String],
    negative_label: &str,
) -> Result<Prediction, PredictError> {
    decide(best_score(scores), threshold, labels, negative_label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tract_onnx::prelude::tract_ndarray::{arr2, Array3};

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn picks_global_maximum_and_maps_label() {
        let scores = arr2(&[[0.1f32, 0.2, 0.9], [0.05, 0.05, 0.05]]);
        let prediction = interpret(scores.view(), 0.3, &labels(&["A", "B", "C"]), "none").unwrap();

        assert_eq!(prediction.label, "C");
        assert_eq!(prediction.outcome, PredictionOutcome::Match);
        assert_eq!(prediction.class_index, Some(2));
        assert_eq!(prediction.candidate_row, Some(0));
        assert_eq!(prediction.confidence, Some(0.9));
    }

    #[test]
    fn scores_at_or_below_threshold_give_negative_label() {
        let scores = arr2(&[[0.1f32, 0.3, 0.2], [0.3, 0.0, 0.25]]);
        let prediction = interpret(scores.view(), 0.3, &labels(&["A", "B", "C"]), "Bukan Batik").unwrap();

        assert_eq!(prediction.label, "Bukan Batik");
        assert_eq!(prediction.outcome, PredictionOutcome::NoMatch);
        assert_eq!(prediction.confidence, Some(0.3));
    }

    #[test]
    fn low_scores_ignore_label_table_contents() {
        // winning index is past the table, but nothing clears the threshold
        let scores = arr2(&[[0.0f32, 0.0, 0.0, 0.0, 0.0, 0.29]]);
        let prediction = interpret(scores.view(), 0.3, &labels(&["A"]), "none").unwrap();
        assert_eq!(prediction.label, "none");
    }

    #[test]
    fn ties_resolve_to_first_in_row_major_order() {
        let scores = arr2(&[[0.2f32, 0.7, 0.1], [0.7, 0.7, 0.0]]);
        let best = best_score(scores.view()).unwrap();
        assert_eq!((best.row, best.class), (0, 1));
    }

    #[test]
    fn winner_may_come_from_any_row() {
        let scores = arr2(&[[0.1f32, 0.2], [0.3, 0.1], [0.05, 0.95]]);
        let best = best_score(scores.view()).unwrap();
        assert_eq!((best.row, best.class, best.score), (2, 1, 0.95));
    }

    #[test]
    fn nan_never_wins() {
        let scores = arr2(&[[f32::NAN, 0.4], [0.6, f32::NAN]]);
        let best = best_score(scores.view()).unwrap();
        assert_eq!((best.row, best.class), (1, 0));

        let all_nan = arr2(&[[f32::NAN, f32::NAN]]);
        assert!(best_score(all_nan.view()).is_none());
    }

    #[test]
    fn empty_block_is_negative() {
        let scores = tract_onnx::prelude::tract_ndarray::Array2::<f32>::zeros((0, 4));
        let prediction = interpret(scores.view(), 0.3, &labels(&["A"]), "none").unwrap();
        assert_eq!(prediction.outcome, PredictionOutcome::NoMatch);
        assert_eq!(prediction.confidence, None);
    }

    #[test]
    fn winning_class_without_label_is_an_error() {
        let scores = arr2(&[[0.1f32, 0.2, 0.8]]);
        let err = interpret(scores.view(), 0.3, &labels(&["A", "B"]), "none").unwrap_err();
        assert!(matches!(err, PredictError::ClassOutOfRange { index: 2, len: 2 }));
    }

    #[test]
    fn candidate_major_output_drops_box_columns() {
        // 2 candidates, 5 box/objectness columns + 3 classes
        let raw = Array3::from_shape_vec(
            (1, 2, 8),
            vec![
                9.0f32, 9.0, 9.0, 9.0, 0.99, 0.1, 0.2, 0.9, //
                9.0, 9.0, 9.0, 9.0, 0.99, 0.05, 0.05, 0.05,
            ],
        )
        .unwrap();
        let tensor: Tensor = raw.into();

        let scores = score_block(&tensor, OutputLayout::CandidateMajor).unwrap();
        assert_eq!(scores.shape(), &[2, 3]);
        assert_eq!(scores[[0, 2]], 0.9);

        let prediction = interpret(scores, 0.3, &labels(&["A", "B", "C"]), "none").unwrap();
        assert_eq!(prediction.label, "C");
    }

    #[test]
    fn attribute_major_output_is_read_transposed() {
        // 5 + 2 attribute rows, 3 candidates
        let raw = Array3::from_shape_vec(
            (1, 7, 3),
            vec![
                1.0f32, 1.0, 1.0, //
                1.0, 1.0, 1.0, //
                1.0, 1.0, 1.0, //
                1.0, 1.0, 1.0, //
                1.0, 1.0, 1.0, //
                0.1, 0.2, 0.3, // class 0
                0.4, 0.8, 0.0, // class 1
            ],
        )
        .unwrap();
        let tensor: Tensor = raw.into();

        let scores = score_block(&tensor, OutputLayout::AttributeMajor).unwrap();
        assert_eq!(scores.shape(), &[3, 2]);

        let best = best_score(scores).unwrap();
        assert_eq!((best.row, best.class, best.score), (1, 1, 0.8));
    }

    #[test]
    fn unbatched_output_is_accepted() {
        let tensor: Tensor = arr2(&[[0.0f32, 0.0, 0.0, 0.0, 0.0, 0.5]]).into();
        let scores = score_block(&tensor, OutputLayout::CandidateMajor).unwrap();
        assert_eq!(scores.shape(), &[1, 1]);
    }

    #[test]
    fn malformed_outputs_are_shape_errors() {
        let narrow: Tensor = arr2(&[[0.0f32, 0.0, 0.0]]).into();
        assert!(matches!(
            score_block(&narrow, OutputLayout::CandidateMajor),
            Err(PredictError::Shape { .. })
        ));

        let batched: Tensor = Array3::<f32>::zeros((2, 3, 8)).into();
        assert!(matches!(
            score_block(&batched, OutputLayout::CandidateMajor),
            Err(PredictError::Shape { .. })
        ));

        let ints: Tensor = arr2(&[[1i32, 2, 3, 4, 5, 6]]).into();
        assert!(score_block(&ints, OutputLayout::CandidateMajor).is_err());
    }
}
