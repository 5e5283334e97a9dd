use crate::error::{EngineError, Result};
use crate::normalize::categories::canonical_category;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// One point of a category's historical percentile curve.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CurvePoint {
    pub score: f64,
    pub rank: u64,
}

#[derive(Debug, Deserialize)]
struct RankModelData {
    /// Inclusive `[min, max]` valid score range of the exam.
    valid_range: [f64; 2],
    /// Per-category curve points, any order; validated and sorted at load.
    curves: HashMap<String, Vec<CurvePoint>>,
}

/// Score → predicted-rank model over fixed per-category percentile curves.
/// Pure at call time; every integrity problem with the table is a fatal
/// configuration error at load.
#[derive(Debug)]
pub struct RankModel {
    min_score: f64,
    max_score: f64,
    curves: HashMap<String, Vec<CurvePoint>>,
}

impl RankModel {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let data: RankModelData = serde_json::from_str(&raw)?;
        Self::from_data(data)
    }

    /// Reference curves for the 720-mark exam, used when no curve file is
    /// configured. Rough historical percentiles, not official data.
    pub fn builtin() -> Self {
        let open = vec![
            (0.0, 1_900_000),
            (120.0, 1_200_000),
            (200.0, 800_000),
            (300.0, 480_000),
            (400.0, 230_000),
            (450.0, 150_000),
            (500.0, 90_000),
            (550.0, 45_000),
            (600.0, 18_000),
            (650.0, 4_500),
            (680.0, 1_200),
            (700.0, 350),
            (715.0, 30),
            (720.0, 1),
        ];
        // Reserved-category curves sit a little flatter at the low end.
        let shifted = |factor: f64| {
            open.iter()
                .map(|&(score, rank)| CurvePoint {
                    score,
                    rank: ((rank as f64 * factor).round() as u64).max(1),
                })
                .collect::<Vec<_>>()
        };
        let mut curves = HashMap::new();
        curves.insert(
            "open".to_string(),
            open.iter()
                .map(|&(score, rank)| CurvePoint { score, rank })
                .collect(),
        );
        curves.insert("ews".to_string(), shifted(0.97));
        curves.insert("obc-ncl".to_string(), shifted(0.95));
        curves.insert("sc".to_string(), shifted(0.80));
        curves.insert("st".to_string(), shifted(0.70));

        Self::from_data(RankModelData {
            valid_range: [0.0, 720.0],
            curves,
        })
        .expect("builtin curve table is well-formed")
    }

    fn from_data(data: RankModelData) -> Result<Self> {
        let [min_score, max_score] = data.valid_range;
        if !min_score.is_finite() || !max_score.is_finite() || min_score >= max_score {
            return Err(EngineError::Config(format!(
                "invalid score range [{min_score}, {max_score}]"
            )));
        }
        if data.curves.is_empty() {
            return Err(EngineError::Config("curve table has no categories".to_string()));
        }

        let mut curves = HashMap::new();
        for (category, mut points) in data.curves {
            if points.is_empty() {
                return Err(EngineError::Config(format!(
                    "curve for {category:?} has no points"
                )));
            }
            if points.iter().any(|p| !p.score.is_finite()) {
                return Err(EngineError::Config(format!(
                    "curve for {category:?} has a non-finite score"
                )));
            }
            points.sort_by(|a, b| a.score.partial_cmp(&b.score).expect("scores are finite"));
            for pair in points.windows(2) {
                // Strictly increasing scores, non-increasing ranks: a higher
                // score can never predict a worse rank.
                if pair[0].score == pair[1].score {
                    return Err(EngineError::Config(format!(
                        "curve for {category:?} repeats score {}",
                        pair[0].score
                    )));
                }
                if pair[1].rank > pair[0].rank {
                    return Err(EngineError::Config(format!(
                        "curve for {category:?} is not monotone at score {}",
                        pair[1].score
                    )));
                }
            }
            if points.iter().any(|p| p.rank == 0) {
                return Err(EngineError::Config(format!(
                    "curve for {category:?} contains rank 0"
                )));
            }
            curves.insert(category, points);
        }

        Ok(Self {
            min_score,
            max_score,
            curves,
        })
    }

    pub fn categories(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.curves.keys().map(|k| k.as_str()).collect();
        names.sort();
        names
    }

    /// Predict the admission rank for a score in the given category.
    ///
    /// Exact curve points return the tabulated rank; scores between points
    /// interpolate linearly; above the best known score clamps to rank 1 and
    /// below the worst known score clamps to that point's rank rather than
    /// extrapolating.
    pub fn predict_rank(&self, score: f64, category: &str) -> Result<u64> {
        if !score.is_finite() || score < self.min_score || score > self.max_score {
            return Err(EngineError::InvalidInput(format!(
                "score {score} outside valid range [{}, {}]",
                self.min_score, self.max_score
            )));
        }
        let (key, _) = canonical_category(category);
        let curve = self
            .curves
            .get(&key)
            .ok_or_else(|| EngineError::UnknownCategory(category.to_string()))?;

        let first = curve[0];
        let last = curve[curve.len() - 1];
        if score <= first.score {
            return Ok(first.rank);
        }
        if score >= last.score {
            return Ok(if score > last.score { 1 } else { last.rank });
        }

        let upper = curve.partition_point(|p| p.score < score);
        let hi = curve[upper];
        if hi.score == score {
            return Ok(hi.rank);
        }
        let lo = curve[upper - 1];
        let t = (score - lo.score) / (hi.score - lo.score);
        let rank = lo.rank as f64 + t * (hi.rank as f64 - lo.rank as f64);
        Ok((rank.round() as u64).max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> RankModel {
        RankModel::builtin()
    }

    #[test]
    fn exact_curve_point_returns_table_rank() {
        assert_eq!(model().predict_rank(720.0, "open").unwrap(), 1);
        assert_eq!(model().predict_rank(600.0, "open").unwrap(), 18_000);
    }

    #[test]
    fn scores_between_points_interpolate_linearly() {
        // Midway between (600, 18000) and (650, 4500).
        let rank = model().predict_rank(625.0, "open").unwrap();
        assert_eq!(rank, 11_250);
    }

    #[test]
    fn higher_score_never_predicts_worse_rank() {
        let model = model();
        let mut last = u64::MAX;
        for score in (0..=720).step_by(5) {
            let rank = model.predict_rank(score as f64, "open").unwrap();
            assert!(rank <= last, "rank worsened at score {score}");
            last = rank;
        }
    }

    #[test]
    fn below_worst_known_point_clamps_instead_of_extrapolating() {
        let data = RankModelData {
            valid_range: [0.0, 720.0],
            curves: HashMap::from([(
                "open".to_string(),
                vec![
                    CurvePoint { score: 400.0, rank: 100_000 },
                    CurvePoint { score: 720.0, rank: 1 },
                ],
            )]),
        };
        let model = RankModel::from_data(data).unwrap();
        assert_eq!(model.predict_rank(100.0, "open").unwrap(), 100_000);
    }

    #[test]
    fn out_of_range_score_is_invalid_input() {
        assert!(matches!(
            model().predict_rank(721.0, "open"),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            model().predict_rank(-1.0, "open"),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            model().predict_rank(f64::NAN, "open"),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn unknown_category_is_rejected() {
        assert!(matches!(
            model().predict_rank(600.0, "nri"),
            Err(EngineError::UnknownCategory(_))
        ));
    }

    #[test]
    fn category_synonyms_resolve_to_curves() {
        let a = model().predict_rank(600.0, "General").unwrap();
        let b = model().predict_rank(600.0, "open").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn malformed_table_is_a_config_error() {
        let non_monotone = RankModelData {
            valid_range: [0.0, 720.0],
            curves: HashMap::from([(
                "open".to_string(),
                vec![
                    CurvePoint { score: 100.0, rank: 500 },
                    CurvePoint { score: 200.0, rank: 900 },
                ],
            )]),
        };
        assert!(matches!(
            RankModel::from_data(non_monotone),
            Err(EngineError::Config(_))
        ));

        let empty = RankModelData {
            valid_range: [0.0, 720.0],
            curves: HashMap::new(),
        };
        assert!(matches!(
            RankModel::from_data(empty),
            Err(EngineError::Config(_))
        ));
    }
}
