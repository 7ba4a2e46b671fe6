//! Isolation forest.
//!
//! Random axis-aligned splits isolate anomalies in fewer steps than normal
//! samples; the expected path length over the forest is turned into the
//! usual `2^(-E[h]/c(ψ))` anomaly score.

use crate::core::Table;
use crate::engine::generalized::{check_width, AnomalyLearner};
use crate::error::{EngineError, EngineResult, OperatorError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Sub-sample size drawn for each tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaxSamples {
    /// `min(256, n)`.
    #[default]
    Auto,
    Count(usize),
}

impl MaxSamples {
    fn resolve(&self, n: usize) -> usize {
        match self {
            MaxSamples::Auto => n.min(256),
            MaxSamples::Count(c) => (*c).min(n),
        }
    }
}

impl Serialize for MaxSamples {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            MaxSamples::Auto => serializer.serialize_str("auto"),
            MaxSamples::Count(c) => serializer.serialize_u64(*c as u64),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMaxSamples {
    Count(u64),
    Name(String),
}

impl<'de> Deserialize<'de> for MaxSamples {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match RawMaxSamples::deserialize(deserializer)? {
            RawMaxSamples::Count(c) => Ok(MaxSamples::Count(c as usize)),
            RawMaxSamples::Name(s) if s == "auto" => Ok(MaxSamples::Auto),
            RawMaxSamples::Name(s) => Err(D::Error::custom(format!(
                "expected \"auto\" or a sample count, got `{s}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct IsolationForestConfig {
    pub n_estimators: usize,
    pub max_samples: MaxSamples,
    /// Seed for the tree builder; `None` draws one from the OS.
    pub random_state: Option<u64>,
}

impl Default for IsolationForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: MaxSamples::Auto,
            random_state: None,
        }
    }
}

impl IsolationForestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(OperatorError::config("n_estimators", "must be at least 1"));
        }
        if self.max_samples == MaxSamples::Count(0) {
            return Err(OperatorError::config("max_samples", "must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

/// Average path length of an unsuccessful BST search over `n` items.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

impl Tree {
    fn build(data: &Table, sample: Vec<usize>, height_limit: usize, rng: &mut StdRng) -> Self {
        let mut tree = Tree { nodes: Vec::new() };
        tree.grow(data, sample, 0, height_limit, rng);
        tree
    }

    fn grow(
        &mut self,
        data: &Table,
        rows: Vec<usize>,
        depth: usize,
        height_limit: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: rows.len() });
        if depth >= height_limit || rows.len() <= 1 {
            return id;
        }

        let splittable: Vec<(usize, f64, f64)> = (0..data.cols())
            .filter_map(|f| {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                    let v = data.row(r)[f];
                    (lo.min(v), hi.max(v))
                });
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();
        if splittable.is_empty() {
            return id;
        }

        let (feature, lo, hi) = splittable[rng.gen_range(0..splittable.len())];
        let threshold = rng.gen_range(lo..hi);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| data.row(r)[feature] < threshold);

        let left = self.grow(data, left_rows, depth + 1, height_limit, rng);
        let right = self.grow(data, right_rows, depth + 1, height_limit, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    fn path_length(&self, row: &[f64]) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[node] {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] < *threshold { *left } else { *right };
                    depth += 1.0;
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Forest {
    width: usize,
    trees: Vec<Tree>,
    normaliser: f64,
}

/// Isolation forest anomaly model.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    config: IsolationForestConfig,
    forest: Option<Forest>,
}

impl IsolationForest {
    pub fn new(config: IsolationForestConfig) -> Self {
        Self {
            config,
            forest: None,
        }
    }

    /// `2^(-E[h]/c(ψ))` per sample, in `(0, 1]`; larger is more anomalous.
    pub fn anomaly_score(&self, data: &Table) -> EngineResult<Vec<f64>> {
        let forest = self.forest.as_ref().ok_or(EngineError::FitRequired)?;
        check_width(forest.width, data)?;
        Ok(data
            .iter_rows()
            .map(|row| {
                let mean_path = forest.trees.iter().map(|t| t.path_length(row)).sum::<f64>()
                    / forest.trees.len() as f64;
                if forest.normaliser > 0.0 {
                    2f64.powf(-mean_path / forest.normaliser)
                } else {
                    0.5
                }
            })
            .collect())
    }
}

impl AnomalyLearner for IsolationForest {
    fn fit(&mut self, data: &Table) -> EngineResult<()> {
        let n = data.rows();
        if n == 0 {
            return Err(EngineError::EmptyData);
        }
        let mut rng = match self.config.random_state {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let psi = self.config.max_samples.resolve(n).max(1);
        let height_limit = (psi as f64).log2().ceil().max(1.0) as usize;

        let trees = (0..self.config.n_estimators)
            .map(|_| {
                let sample = rand::seq::index::sample(&mut rng, n, psi).into_vec();
                Tree::build(data, sample, height_limit, &mut rng)
            })
            .collect();

        self.forest = Some(Forest {
            width: data.cols(),
            trees,
            normaliser: average_path_length(psi),
        });
        Ok(())
    }

    /// `0.5 - score`: higher is more normal.
    fn decision_function(&self, data: &Table) -> EngineResult<Vec<f64>> {
        Ok(self
            .anomaly_score(data)?
            .into_iter()
            .map(|s| 0.5 - s)
            .collect())
    }

    fn score_samples(&self, data: &Table) -> EngineResult<Vec<f64>> {
        Ok(self
            .anomaly_score(data)?
            .into_iter()
            .map(|s| -s)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cluster() -> Table {
        let rows = (0..200)
            .map(|i| {
                let t = i as f64;
                vec![(t * 0.37).sin(), (t * 0.91).cos()]
            })
            .collect();
        Table::from_rows(rows).unwrap()
    }

    fn seeded() -> IsolationForest {
        IsolationForest::new(IsolationForestConfig {
            random_state: Some(7),
            ..Default::default()
        })
    }

    #[test]
    fn average_path_length_small_cases() {
        assert_relative_eq!(average_path_length(1), 0.0);
        assert_relative_eq!(average_path_length(2), 1.0);
        assert!(average_path_length(256) > 9.0 && average_path_length(256) < 11.0);
    }

    #[test]
    fn distant_point_is_isolated_quickly() {
        let mut forest = seeded();
        forest.fit(&cluster()).unwrap();
        let query = Table::from_rows(vec![vec![0.0, 0.0], vec![8.0, -8.0]]).unwrap();
        let scores = forest.anomaly_score(&query).unwrap();
        assert!(scores[1] > scores[0]);
        assert!(scores[1] > 0.55);

        let decision = forest.decision_function(&query).unwrap();
        assert_relative_eq!(decision[1], 0.5 - scores[1], epsilon = 1e-12);
    }

    #[test]
    fn same_seed_same_forest() {
        let mut a = seeded();
        let mut b = seeded();
        a.fit(&cluster()).unwrap();
        b.fit(&cluster()).unwrap();
        assert_eq!(
            a.anomaly_score(&cluster()).unwrap(),
            b.anomaly_score(&cluster()).unwrap()
        );
    }

    #[test]
    fn max_samples_encoding() {
        let cfg: IsolationForestConfig = serde_json::from_str(r#"{"max_samples": "auto"}"#).unwrap();
        assert_eq!(cfg.max_samples, MaxSamples::Auto);
        let cfg: IsolationForestConfig = serde_json::from_str(r#"{"max_samples": 64}"#).unwrap();
        assert_eq!(cfg.max_samples, MaxSamples::Count(64));
        assert!(serde_json::from_str::<IsolationForestConfig>(r#"{"max_samples": "all"}"#).is_err());
        assert_eq!(serde_json::to_string(&MaxSamples::Auto).unwrap(), "\"auto\"");
    }

    #[test]
    fn zero_estimators_is_rejected() {
        let cfg = IsolationForestConfig {
            n_estimators: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
