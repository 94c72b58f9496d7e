//! Random forest fitting: bootstrapped `linfa-trees` CART trees with Gini impurity, grown
//! until pure, then flattened into the serving [`TreeNode`] layout.
//!
//! Each tree draws its bootstrap sample from a `StdRng` seeded with `seed + tree_index`, so
//! the forest is identical whether trees are fit sequentially or on the rayon pool.

use linfa::prelude::*;
use linfa_trees::{DecisionTree as CartTree, SplitQuality, TreeNode as CartNode};
use ndarray::{Array1, Array2, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;

use crate::error::DatasetError;
use crate::pipeline::{DecisionTree, RandomForest, TreeNode};

#[derive(Debug, Clone)]
pub struct ForestParams {
    pub n_trees: usize,
    pub seed: u64,
    pub min_samples_split: usize,
}

impl Default for ForestParams {
    fn default() -> Self { Self { n_trees: 200, seed: 42, min_samples_split: 2 } }
}

#[derive(Debug, Clone)]
pub struct FittedForest {
    pub forest: RandomForest,
    /// Total impurity decrease per feature, normalized to sum to 1.
    pub importances: Vec<f64>,
}

/// Largest value strictly below `x`. linfa sends `x < split` left; serving sends `x <= threshold` left.
fn next_down(x: f64) -> f64 {
    if !x.is_finite() { return x; }
    if x == 0.0 { return -f64::from_bits(1); }
    let bits = x.to_bits();
    f64::from_bits(if x > 0.0 { bits - 1 } else { bits + 1 })
}

/// Pre-order flattening, so children always sit after their parent.
fn flatten(node: &CartNode<f64, usize>, nodes: &mut Vec<TreeNode>, importance: &mut [f64]) -> Result<usize, DatasetError> {
    let idx = nodes.len();
    if let Some(class) = node.prediction() {
        let mut value = [0.0; 2];
        let slot = value.get_mut(class).ok_or_else(|| DatasetError::Fit(format!("leaf predicts unknown class {class}")))?;
        *slot = 1.0;
        nodes.push(TreeNode::Leaf { value });
        return Ok(idx);
    }
    let (feature, split, decrease) = node.split();
    if !split.is_finite() { return Err(DatasetError::Fit(format!("non-finite split on feature {feature}"))); }
    if let Some(v) = importance.get_mut(feature) { *v += decrease.max(0.0); }
    nodes.push(TreeNode::Leaf { value: [1.0, 1.0] });
    let (left, right) = match node.children().as_slice() {
        [Some(l), Some(r)] => (flatten(l, nodes, importance)?, flatten(r, nodes, importance)?),
        _ => return Err(DatasetError::Fit(format!("split node {idx} is missing a child"))),
    };
    nodes[idx] = TreeNode::Split { feature, threshold: next_down(split), left, right };
    Ok(idx)
}

fn fit_tree(x: &Array2<f64>, y: &Array1<usize>, params: &ForestParams, tree: usize) -> Result<(DecisionTree, Vec<f64>), DatasetError> {
    let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(tree as u64));
    let n = x.nrows();
    let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
    let sample = Dataset::new(x.select(Axis(0), &bootstrap), y.select(Axis(0), &bootstrap));
    let cart: CartTree<f64, usize> = CartTree::params()
        .split_quality(SplitQuality::Gini)
        .max_depth(None)
        .min_weight_split(params.min_samples_split.max(2) as f32)
        .fit(&sample)
        .map_err(|e| DatasetError::Fit(e.to_string()))?;

    let root = cart.iter_nodes().next().ok_or_else(|| DatasetError::Fit(format!("tree {tree} is empty")))?;
    let mut nodes = Vec::new();
    let mut importance = vec![0.0; x.ncols()];
    flatten(root, &mut nodes, &mut importance)?;
    let total: f64 = importance.iter().sum();
    if total > 0.0 { for v in importance.iter_mut() { *v /= total; } }
    Ok((DecisionTree { nodes }, importance))
}

/// `x` must be imputed and finite. `y` holds class indices (0 or 1).
pub fn fit_forest(x: &Array2<f64>, y: &Array1<usize>, classes: [i64; 2], params: &ForestParams) -> Result<FittedForest, DatasetError> {
    if x.nrows() == 0 || x.nrows() != y.len() { return Err(DatasetError::Fit(format!("{} rows for {} labels", x.nrows(), y.len()))); }
    if x.iter().any(|v| !v.is_finite()) { return Err(DatasetError::Overflow("training matrix holds non-finite values".into())); }
    let fitted: Vec<(DecisionTree, Vec<f64>)> = (0..params.n_trees.max(1))
        .into_par_iter()
        .map(|t| fit_tree(x, y, params, t))
        .collect::<Result<_, _>>()?;
    let mut importances = vec![0.0; x.ncols()];
    let mut contributing = 0usize;
    for (_, imp) in &fitted {
        if imp.iter().sum::<f64>() <= 0.0 { continue; }
        contributing += 1;
        for (acc, v) in importances.iter_mut().zip(imp) { *acc += v; }
    }
    if contributing > 0 {
        let total: f64 = importances.iter().sum();
        for v in importances.iter_mut() { *v /= total; }
    }
    Ok(FittedForest { forest: RandomForest { classes, trees: fitted.into_iter().map(|(t, _)| t).collect() }, importances })
}
