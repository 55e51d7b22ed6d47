//! Compare RNA base-pairing probability (BPP) profiles.
//!
//! Probability plot files are parsed into dense matrices or ordered pair
//! lists, reduced to per-position marginals where needed, and compared with
//! Pearson correlation or RMSD. Plots can also be generated on the fly by an
//! external partition function tool (see [`ensemble::EnsembleGenerator`]).

pub mod ensemble;
pub mod error;
pub mod logger;
pub mod matrix;
pub mod metrics;
pub mod plot_file;
pub mod settings;

pub use ensemble::{EnsembleGenerator, Stage, ToolHandle, ToolSettings};
pub use error::{BppError, Result};
pub use logger::Logger;
pub use matrix::{
    row_sums, BasePair, BppMatrix, PairProbability, PairProbabilityList, ProbabilityVector,
};
pub use metrics::{
    compare_files, compare_plots, pearson_on_marginals, pearson_on_raw_probabilities, rmsd,
    Alignment, Metric,
};
pub use plot_file::{parse_matrix, parse_pairs, read_probability_plot, Delimiter, ProbabilityPlot};
pub use settings::{load_tool_settings, CompareOptions};
