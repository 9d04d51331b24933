//! Decision tree
//!
//! A single depth-wise regression tree fit to gradients and hessians,
//! using exact greedy split search over raw feature values. Missing values
//! (NaN) are routed to whichever child yields the larger split gain.
use rayon::prelude::*;
use serde::{Deserialize, Deserializer, Serialize};

use crate::data::Matrix;

/// Parameters controlling the growth of a single tree.
#[derive(Debug, Clone)]
pub struct TreeParams {
    /// Maximum tree depth; depth 0 is a lone root.
    pub max_depth: usize,
    /// Minimum number of samples in each child node.
    pub min_samples_leaf: usize,
    /// L2 regularization added to hessian sums.
    pub lambda: f64,
    /// Step size multiplied into leaf weights.
    pub eta: f64,
}

/// A single node of a [`Tree`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Split feature index; unused on leaves.
    pub feature: usize,
    /// Split value; rows with `value < split_value` go left. NaN on leaves,
    /// which JSON carries as `null`.
    #[serde(deserialize_with = "nan_from_null")]
    pub split_value: f64,
    /// Whether missing values are routed to the right child.
    pub missing_right: bool,
    /// Index of the left child in the node vector.
    pub left_child: usize,
    /// Index of the right child in the node vector.
    pub right_child: usize,
    /// Leaf weight (already scaled by eta).
    pub weight: f64,
    /// Gain achieved by this node's split.
    pub gain: f64,
    /// Hessian sum covered by the node.
    pub cover: f64,
    /// Whether this node is a leaf.
    pub is_leaf: bool,
}

/// A fitted regression tree.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Tree {
    /// Nodes in creation order; index 0 is the root.
    pub nodes: Vec<Node>,
    /// Depth reached while growing.
    pub depth: usize,
}

/// JSON renders a NaN split value as `null`; map it back on the way in.
fn nan_from_null<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

struct SplitCandidate {
    gain: f64,
    feature: usize,
    split_value: f64,
    missing_right: bool,
}

fn score(g: f64, h: f64, lambda: f64) -> f64 {
    g * g / (h + lambda)
}

impl Tree {
    pub fn new() -> Self {
        Tree::default()
    }

    /// Grow the tree on the provided gradients.
    ///
    /// * `data` - Feature matrix.
    /// * `index` - Row indices to grow on.
    /// * `grad` - Per-row gradients, aligned with the full matrix rows.
    /// * `hess` - Per-row hessians; `None` means a constant hessian of one.
    pub fn fit(&mut self, data: &Matrix<f64>, index: Vec<usize>, grad: &[f64], hess: Option<&[f64]>, params: &TreeParams) {
        let hess_at = |i: usize| hess.map_or(1.0, |h| h[i]);

        let gsum: f64 = index.iter().map(|&i| grad[i]).sum();
        let hsum: f64 = index.iter().map(|&i| hess_at(i)).sum();
        self.nodes.push(Node {
            feature: 0,
            split_value: f64::NAN,
            missing_right: false,
            left_child: 0,
            right_child: 0,
            weight: -gsum / (hsum + params.lambda) * params.eta,
            gain: 0.0,
            cover: hsum,
            is_leaf: true,
        });

        let mut stack: Vec<(usize, Vec<usize>, usize)> = vec![(0, index, 0)];
        while let Some((node_idx, rows, depth)) = stack.pop() {
            self.depth = self.depth.max(depth);
            if depth >= params.max_depth || rows.len() < 2 * params.min_samples_leaf {
                continue;
            }

            let best = (0..data.cols)
                .into_par_iter()
                .filter_map(|col| best_split_for_feature(data, col, &rows, grad, hess, params))
                .max_by(|a, b| a.gain.total_cmp(&b.gain));

            let Some(split) = best else { continue };
            if split.gain <= 0.0 {
                continue;
            }

            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows.into_iter().partition(|&i| {
                let v = *data.get(i, split.feature);
                if v.is_nan() {
                    !split.missing_right
                } else {
                    v < split.split_value
                }
            });

            let mut child = |rows: &[usize]| -> usize {
                let g: f64 = rows.iter().map(|&i| grad[i]).sum();
                let h: f64 = rows.iter().map(|&i| hess_at(i)).sum();
                self.nodes.push(Node {
                    feature: 0,
                    split_value: f64::NAN,
                    missing_right: false,
                    left_child: 0,
                    right_child: 0,
                    weight: -g / (h + params.lambda) * params.eta,
                    gain: 0.0,
                    cover: h,
                    is_leaf: true,
                });
                self.nodes.len() - 1
            };
            let left_child = child(&left_rows);
            let right_child = child(&right_rows);

            let node = &mut self.nodes[node_idx];
            node.is_leaf = false;
            node.feature = split.feature;
            node.split_value = split.split_value;
            node.missing_right = split.missing_right;
            node.left_child = left_child;
            node.right_child = right_child;
            node.gain = split.gain;

            stack.push((left_child, left_rows, depth + 1));
            stack.push((right_child, right_rows, depth + 1));
        }
    }

    /// Predict a single row by walking from the root.
    pub fn predict_row(&self, data: &Matrix<f64>, row: usize) -> f64 {
        let mut idx = 0;
        loop {
            let node = &self.nodes[idx];
            if node.is_leaf {
                return node.weight;
            }
            let v = *data.get(row, node.feature);
            idx = if v.is_nan() {
                if node.missing_right {
                    node.right_child
                } else {
                    node.left_child
                }
            } else if v < node.split_value {
                node.left_child
            } else {
                node.right_child
            };
        }
    }

    /// Predict all rows of a matrix.
    pub fn predict(&self, data: &Matrix<f64>, parallel: bool) -> Vec<f64> {
        if parallel {
            (0..data.rows).into_par_iter().map(|row| self.predict_row(data, row)).collect()
        } else {
            (0..data.rows).map(|row| self.predict_row(data, row)).collect()
        }
    }
}

fn best_split_for_feature(
    data: &Matrix<f64>,
    col: usize,
    rows: &[usize],
    grad: &[f64],
    hess: Option<&[f64]>,
    params: &TreeParams,
) -> Option<SplitCandidate> {
    let hess_at = |i: usize| hess.map_or(1.0, |h| h[i]);
    let col_data = data.get_col(col);

    let mut present: Vec<(f64, f64, f64)> = Vec::with_capacity(rows.len());
    let mut g_miss = 0.0;
    let mut h_miss = 0.0;
    let mut n_miss = 0usize;
    for &i in rows {
        let v = col_data[i];
        if v.is_nan() {
            g_miss += grad[i];
            h_miss += hess_at(i);
            n_miss += 1;
        } else {
            present.push((v, grad[i], hess_at(i)));
        }
    }
    if present.len() < 2 {
        return None;
    }
    present.sort_by(|a, b| a.0.total_cmp(&b.0));

    let g_tot: f64 = present.iter().map(|t| t.1).sum::<f64>() + g_miss;
    let h_tot: f64 = present.iter().map(|t| t.2).sum::<f64>() + h_miss;
    let parent_score = score(g_tot, h_tot, params.lambda);

    let mut best: Option<SplitCandidate> = None;
    let mut g_left = 0.0;
    let mut h_left = 0.0;
    for k in 0..present.len() - 1 {
        g_left += present[k].1;
        h_left += present[k].2;
        // Only cut between distinct values.
        if present[k].0 == present[k + 1].0 {
            continue;
        }
        let n_left = k + 1;
        let n_right = present.len() - n_left;
        let g_right = g_tot - g_miss - g_left;
        let h_right = h_tot - h_miss - h_left;

        // Route the missing block to each side in turn and keep the better.
        for missing_right in [false, true] {
            let (gl, hl, nl, gr, hr, nr) = if missing_right {
                (g_left, h_left, n_left, g_right + g_miss, h_right + h_miss, n_right + n_miss)
            } else {
                (g_left + g_miss, h_left + h_miss, n_left + n_miss, g_right, h_right, n_right)
            };
            if nl < params.min_samples_leaf || nr < params.min_samples_leaf {
                continue;
            }
            let gain = score(gl, hl, params.lambda) + score(gr, hr, params.lambda) - parent_score;
            if best.as_ref().map_or(true, |b| gain > b.gain) {
                best = Some(SplitCandidate {
                    gain,
                    feature: col,
                    split_value: (present[k].0 + present[k + 1].0) / 2.0,
                    missing_right,
                });
            }
        }
    }
    best
}
