//! Reader and writer for sparse probability plot files.
//!
//! ```text
//! <N>
//! <metadata line, ignored>
//! <i><delim><j><delim><-log10(p)>
//! ```
//!
//! Positions are 1-indexed. Pairs that are not listed have probability 0.

use crate::error::{BppError, Result};
use crate::matrix::{
    is_probability, BasePair, BppMatrix, PairProbability, PairProbabilityList, MAX_DIMENSION,
};
use serde::Deserialize;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Field separator of the data lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    /// Detect from the first data line
    #[default]
    Auto,
    Tab,
    Space,
}

impl Delimiter {
    fn as_char(self) -> Option<char> {
        match self {
            Delimiter::Auto => None,
            Delimiter::Tab => Some('\t'),
            Delimiter::Space => Some(' '),
        }
    }

    fn detect(line: &str) -> Option<Delimiter> {
        if line.contains('\t') {
            Some(Delimiter::Tab)
        } else if line.contains(' ') {
            Some(Delimiter::Space)
        } else {
            None
        }
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Delimiter::Auto => "auto",
            Delimiter::Tab => "tab",
            Delimiter::Space => "space",
        };
        f.write_str(name)
    }
}

/// One data line of a probability plot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotEntry {
    /// 1-based line number in the source file
    pub line: usize,
    pub pair: BasePair,
    pub probability: f64,
}

/// A parsed probability plot file
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityPlot {
    pub length: usize,
    pub header: String,
    pub entries: Vec<PlotEntry>,
}

impl ProbabilityPlot {
    /// Dense matrix; a pair listed twice keeps its later value
    pub fn to_matrix(&self) -> BppMatrix {
        let mut matrix = BppMatrix::zeros(self.length);
        for entry in &self.entries {
            matrix.set(entry.pair.i - 1, entry.pair.j - 1, entry.probability);
        }
        matrix
    }

    pub fn to_pairs(&self) -> PairProbabilityList {
        self.entries
            .iter()
            .map(|e| PairProbability {
                pair: e.pair,
                probability: e.probability,
            })
            .collect()
    }
}

pub fn read_probability_plot(path: &Path, delimiter: Delimiter) -> Result<ProbabilityPlot> {
    let file = File::open(path).map_err(|e| BppError::io(path, "open", e))?;
    parse_probability_plot(BufReader::new(file), path, delimiter)
}

/// Parse a probability plot; `path` is only used to label errors
pub fn parse_probability_plot<R: BufRead>(
    reader: R,
    path: &Path,
    delimiter: Delimiter,
) -> Result<ProbabilityPlot> {
    let mut lines = reader.lines().enumerate().map(|(idx, line)| {
        line.map(|text| (idx + 1, text))
            .map_err(|e| BppError::io(path, "read", e))
    });

    let (_, first) = lines
        .next()
        .transpose()?
        .ok_or_else(|| BppError::data_format(path, 1, "empty file, expected sequence length"))?;
    let length = parse_length(&first).map_err(|detail| BppError::data_format(path, 1, detail))?;

    let (_, header) = lines
        .next()
        .transpose()?
        .ok_or_else(|| BppError::data_format(path, 2, "missing metadata line"))?;

    let mut resolved = delimiter.as_char();
    let mut entries = Vec::new();
    for item in lines {
        let (line_no, line) = item?;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let sep = match resolved {
            Some(sep) => sep,
            None => {
                let sep = Delimiter::detect(line)
                    .and_then(Delimiter::as_char)
                    .ok_or_else(|| {
                        BppError::data_format(path, line_no, "no tab or space separator found")
                    })?;
                resolved = Some(sep);
                sep
            }
        };

        let entry = parse_entry(line, sep, line_no, length)
            .map_err(|detail| BppError::data_format(path, line_no, detail))?;
        entries.push(entry);
    }

    Ok(ProbabilityPlot {
        length,
        header: header.trim_end_matches('\r').to_string(),
        entries,
    })
}

pub fn parse_matrix(path: &Path, delimiter: Delimiter) -> Result<BppMatrix> {
    Ok(read_probability_plot(path, delimiter)?.to_matrix())
}

pub fn parse_pairs(path: &Path, delimiter: Delimiter) -> Result<PairProbabilityList> {
    Ok(read_probability_plot(path, delimiter)?.to_pairs())
}

fn parse_length(line: &str) -> std::result::Result<usize, String> {
    let trimmed = line.trim();
    match trimmed.parse::<usize>() {
        Ok(0) => Err("sequence length must be positive".to_string()),
        Ok(n) if n > MAX_DIMENSION => Err(format!(
            "sequence length {} exceeds the supported maximum of {}",
            n, MAX_DIMENSION
        )),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("invalid sequence length '{}'", trimmed)),
    }
}

fn parse_entry(
    line: &str,
    sep: char,
    line_no: usize,
    length: usize,
) -> std::result::Result<PlotEntry, String> {
    let fields: Vec<&str> = line.split(sep).collect();
    if fields.len() != 3 {
        let name = if sep == '\t' { "tab" } else { "space" };
        return Err(format!(
            "expected 3 {}-separated fields, found {}",
            name,
            fields.len()
        ));
    }

    let i = parse_position(fields[0], length)?;
    let j = parse_position(fields[1], length)?;
    let value: f64 = fields[2]
        .trim()
        .parse()
        .map_err(|_| format!("invalid -log10 probability '{}'", fields[2]))?;

    let probability = 10f64.powf(-value);
    if !is_probability(probability) {
        return Err(format!(
            "-log10 probability {} gives {} which is outside [0, 1]",
            value, probability
        ));
    }

    Ok(PlotEntry {
        line: line_no,
        pair: BasePair { i, j },
        probability,
    })
}

fn parse_position(field: &str, length: usize) -> std::result::Result<usize, String> {
    let pos: usize = field
        .trim()
        .parse()
        .map_err(|_| format!("invalid position '{}'", field))?;
    if pos == 0 || pos > length {
        return Err(format!("position {} outside 1..={}", pos, length));
    }
    Ok(pos)
}

/// Write a plot in the tab-delimited form, keeping every entry in listed order
pub fn write_probability_plot<W: Write>(
    mut writer: W,
    plot: &ProbabilityPlot,
) -> std::io::Result<()> {
    writeln!(writer, "{}", plot.length)?;
    writeln!(writer, "{}", plot.header)?;
    for entry in &plot.entries {
        // 0.0 - x keeps p = 1 from printing as -0.0; p = 0 prints as inf
        let value = 0.0 - entry.probability.log10();
        writeln!(writer, "{}\t{}\t{:?}", entry.pair.i, entry.pair.j, value)?;
    }
    writer.flush()
}

pub fn save_probability_plot(path: &Path, plot: &ProbabilityPlot) -> Result<()> {
    let file = File::create(path).map_err(|e| BppError::io(path, "create", e))?;
    write_probability_plot(std::io::BufWriter::new(file), plot)
        .map_err(|e| BppError::io(path, "write", e))
}
