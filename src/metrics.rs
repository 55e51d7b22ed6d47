use crate::error::{BppError, Result};
use crate::matrix::{BppMatrix, PairProbabilityList};
use crate::plot_file::{read_probability_plot, ProbabilityPlot};
use crate::settings::CompareOptions;
use std::fmt;
use std::path::Path;

/// Similarity metric between two probability profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Metric {
    /// Pearson correlation of per-position marginal pairing probabilities
    #[default]
    Pearson,
    /// Pearson correlation of the listed pair probabilities
    PearsonNotSum,
    /// Root-mean-square deviation of the listed pair probabilities
    Rmsd,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Pearson => "pearson",
            Metric::PearsonNotSum => "pearson-not-sum",
            Metric::Rmsd => "rmsd",
        };
        f.write_str(name)
    }
}

/// How two pair lists are matched up before a raw-probability metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Alignment {
    /// k-th listed pair against k-th listed pair
    #[default]
    Positional,
    /// Same (i, j) against same (i, j); both lists must list the same pairs
    PairIdentity,
}

/// Pearson product-moment correlation of two equal-length series.
pub fn pearson(x: &[f64], y: &[f64]) -> Result<f64> {
    if x.len() != y.len() {
        return Err(BppError::dimension_mismatch("pearson input", x.len(), y.len()));
    }
    if x.len() < 2 {
        return Err(BppError::undefined(
            "pearson",
            format!("needs at least 2 values, got {}", x.len()),
        ));
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut numerator = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        numerator += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let constant_x = is_rounding_noise(var_x, mean_x, n);
    if constant_x || is_rounding_noise(var_y, mean_y, n) {
        let which = if constant_x { "first" } else { "second" };
        return Err(BppError::undefined(
            "pearson",
            format!("{} input has zero variance", which),
        ));
    }

    // sqrt(v * v) == v exactly, so identical inputs give exactly 1.0
    let r = numerator / (var_x * var_y).sqrt();
    if !r.is_finite() {
        return Err(BppError::undefined(
            "pearson",
            format!("correlation is not finite ({})", r),
        ));
    }
    Ok(r.clamp(-1.0, 1.0))
}

// A constant series still leaves deviations of about EPSILON * |mean| after
// the mean is subtracted, so the floor scales with the data.
fn is_rounding_noise(sum_sq_dev: f64, mean: f64, n: f64) -> bool {
    sum_sq_dev <= f64::EPSILON * n * mean * mean
}

/// sqrt(mean((x[k] - y[k])^2))
pub fn root_mean_square_deviation(x: &[f64], y: &[f64]) -> Result<f64> {
    if x.len() != y.len() {
        return Err(BppError::dimension_mismatch("rmsd input", x.len(), y.len()));
    }
    if x.is_empty() {
        return Err(BppError::undefined("rmsd", "both inputs are empty"));
    }
    let sum_sq: f64 = x.iter().zip(y).map(|(a, b)| (a - b).powi(2)).sum();
    Ok((sum_sq / x.len() as f64).sqrt())
}

/// Pearson correlation of the row sums of two matrices.
pub fn pearson_on_marginals(m1: &BppMatrix, m2: &BppMatrix) -> Result<f64> {
    if m1.len() != m2.len() {
        return Err(BppError::dimension_mismatch(
            "matrix dimension",
            m1.len(),
            m2.len(),
        ));
    }
    pearson(m1.row_sums().as_slice(), m2.row_sums().as_slice())
}

/// Pearson correlation of two pair lists, matched by list position.
pub fn pearson_on_raw_probabilities(
    p1: &PairProbabilityList,
    p2: &PairProbabilityList,
) -> Result<f64> {
    let (x, y) = align_probabilities(p1, p2, Alignment::Positional)?;
    pearson(&x, &y)
}

/// RMSD of two pair lists, matched by list position.
pub fn rmsd(p1: &PairProbabilityList, p2: &PairProbabilityList) -> Result<f64> {
    let (x, y) = align_probabilities(p1, p2, Alignment::Positional)?;
    root_mean_square_deviation(&x, &y)
}

/// Pull out the two probability series to compare, checking lengths first.
pub fn align_probabilities(
    p1: &PairProbabilityList,
    p2: &PairProbabilityList,
    alignment: Alignment,
) -> Result<(Vec<f64>, Vec<f64>)> {
    if p1.len() != p2.len() {
        return Err(BppError::dimension_mismatch(
            "pair probability list length",
            p1.len(),
            p2.len(),
        ));
    }

    match alignment {
        Alignment::Positional => Ok((p1.probabilities(), p2.probabilities())),
        Alignment::PairIdentity => {
            let lookup = p2.by_pair();
            let mut x = Vec::with_capacity(p1.len());
            let mut y = Vec::with_capacity(p1.len());
            for entry in p1.iter() {
                match lookup.get(&entry.pair) {
                    Some(p) => {
                        x.push(entry.probability);
                        y.push(*p);
                    }
                    None => {
                        let shared = p1.iter().filter(|e| lookup.contains_key(&e.pair)).count();
                        return Err(BppError::dimension_mismatch(
                            format!(
                                "pair identity (({}, {}) missing from second list; listed vs shared)",
                                entry.pair.i, entry.pair.j
                            ),
                            p1.len(),
                            shared,
                        ));
                    }
                }
            }
            Ok((x, y))
        }
    }
}

/// Apply the selected metric to two parsed plots
pub fn compare_plots(
    a: &ProbabilityPlot,
    b: &ProbabilityPlot,
    options: &CompareOptions,
) -> Result<f64> {
    match options.metric {
        Metric::Pearson => pearson_on_marginals(&a.to_matrix(), &b.to_matrix()),
        Metric::PearsonNotSum => {
            let (x, y) = align_probabilities(&a.to_pairs(), &b.to_pairs(), options.alignment)?;
            pearson(&x, &y)
        }
        Metric::Rmsd => {
            let (x, y) = align_probabilities(&a.to_pairs(), &b.to_pairs(), options.alignment)?;
            root_mean_square_deviation(&x, &y)
        }
    }
}

/// Read two probability plot files and apply the selected metric
pub fn compare_files(path1: &Path, path2: &Path, options: &CompareOptions) -> Result<f64> {
    let a = read_probability_plot(path1, options.delimiter)?;
    let b = read_probability_plot(path2, options.delimiter)?;
    compare_plots(&a, &b, options)
}
