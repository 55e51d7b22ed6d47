use crate::error::{BppError, Result};
use crate::logger::Logger;
use crate::matrix::BppMatrix;
use crate::plot_file::{read_probability_plot, Delimiter, ProbabilityPlot};
use bio::io::fasta;
use serde::Deserialize;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{NamedTempFile, TempDir};

const PARTITION_OUTPUT: &str = "out.pfs";
const PLOT_OUTPUT: &str = "out.txt";
const STDERR_TAIL_LINES: usize = 5;

/// How the external structure prediction executables are reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolHandle {
    /// Executables on PATH, or inside `bin_dir`
    Native { bin_dir: Option<PathBuf> },
    /// `<runtime> exec <image> <program> ...`
    Container { runtime: String, image: PathBuf },
}

impl ToolHandle {
    fn command(&self, program: &str) -> Command {
        match self {
            ToolHandle::Native { bin_dir: Some(dir) } => Command::new(dir.join(program)),
            ToolHandle::Native { bin_dir: None } => Command::new(program),
            ToolHandle::Container { runtime, image } => {
                let mut command = Command::new(runtime);
                command.arg("exec").arg(image).arg(program);
                command
            }
        }
    }
}

/// Settings for ensemble generation, usually loaded through `settings::load_tool_settings`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// Container runtime used when `image` is set
    pub runtime: String,
    pub image: Option<PathBuf>,
    pub bin_dir: Option<PathBuf>,
    pub partition_program: String,
    pub probability_plot_program: String,
    /// Record name written to the FASTA input
    pub sequence_label: String,
    /// Parent of the per-run working directories (system temp dir if unset)
    pub temp_root: Option<PathBuf>,
    pub delimiter: Delimiter,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            runtime: "singularity".to_string(),
            image: None,
            bin_dir: None,
            partition_program: "partition".to_string(),
            probability_plot_program: "ProbabilityPlot".to_string(),
            sequence_label: "test".to_string(),
            temp_root: None,
            delimiter: Delimiter::Auto,
        }
    }
}

impl ToolSettings {
    /// A container image takes precedence over a native bin directory
    pub fn handle(&self) -> ToolHandle {
        match &self.image {
            Some(image) => ToolHandle::Container {
                runtime: self.runtime.clone(),
                image: image.clone(),
            },
            None => ToolHandle::Native {
                bin_dir: self.bin_dir.clone(),
            },
        }
    }
}

/// Steps of one ensemble run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    WriteInput,
    RunPartition,
    RunProbabilityPlot,
    ParseOutput,
    Cleanup,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::WriteInput => "write-input",
            Stage::RunPartition => "partition",
            Stage::RunProbabilityPlot => "probability-plot",
            Stage::ParseOutput => "parse-output",
            Stage::Cleanup => "cleanup",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Runs the external partition function tool on a sequence and reads back its pairing probabilities
pub struct EnsembleGenerator {
    handle: ToolHandle,
    settings: ToolSettings,
}

impl EnsembleGenerator {
    pub fn new(settings: ToolSettings) -> Self {
        Self {
            handle: settings.handle(),
            settings,
        }
    }

    pub fn handle(&self) -> &ToolHandle {
        &self.handle
    }

    pub fn compute_bpp_matrix(&self, sequence: &str, logger: &Logger) -> Result<BppMatrix> {
        Ok(self.compute_probability_plot(sequence, logger)?.to_matrix())
    }

    /// Fold `sequence` and return the parsed probability plot.
    ///
    /// Every call works in its own temporary directory, so calls may run
    /// concurrently. The directory and the FASTA input are removed on every
    /// exit path.
    pub fn compute_probability_plot(
        &self,
        sequence: &str,
        logger: &Logger,
    ) -> Result<ProbabilityPlot> {
        let sequence = sequence.trim();
        stage(logger, Stage::Init, &format!("{} nt, tool {:?}", sequence.len(), self.handle));

        let result = self.run_stages(sequence, logger);
        match &result {
            Ok(plot) => stage(logger, Stage::Done, &format!("{} pairs listed", plot.entries.len())),
            Err(e) => stage(logger, Stage::Failed, &e.to_string()),
        }
        result
    }

    fn run_stages(&self, sequence: &str, logger: &Logger) -> Result<ProbabilityPlot> {
        validate_sequence(sequence)?;

        let workdir = self.working_dir()?;
        stage(logger, Stage::WriteInput, &workdir.path().display().to_string());
        let input = self.write_input(workdir.path(), sequence)?;

        let partition_path = workdir.path().join(PARTITION_OUTPUT);
        stage(logger, Stage::RunPartition, &self.settings.partition_program);
        self.run_step(
            "partition",
            &self.settings.partition_program,
            &[input.path().as_os_str(), partition_path.as_os_str()],
            &partition_path,
        )?;

        let plot_path = workdir.path().join(PLOT_OUTPUT);
        stage(logger, Stage::RunProbabilityPlot, &self.settings.probability_plot_program);
        self.run_step(
            "probability plot",
            &self.settings.probability_plot_program,
            &[OsStr::new("-t"), partition_path.as_os_str(), plot_path.as_os_str()],
            &plot_path,
        )?;

        stage(logger, Stage::ParseOutput, &plot_path.display().to_string());
        // On error the temporaries are removed on drop and the parse error is kept
        let plot = read_probability_plot(&plot_path, self.settings.delimiter)
            .and_then(|plot| check_length(plot, sequence.len()))?;

        stage(logger, Stage::Cleanup, &workdir.path().display().to_string());
        let input_path = input.path().to_path_buf();
        input
            .close()
            .map_err(|e| BppError::io(input_path, "remove", e))?;
        let dir_path = workdir.path().to_path_buf();
        workdir
            .close()
            .map_err(|e| BppError::io(dir_path, "remove", e))?;

        Ok(plot)
    }

    fn working_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("bpp-compare-");
        match &self.settings.temp_root {
            Some(root) => builder
                .tempdir_in(root)
                .map_err(|e| BppError::io(root, "create working directory in", e)),
            None => builder
                .tempdir()
                .map_err(|e| BppError::io(std::env::temp_dir(), "create working directory in", e)),
        }
    }

    fn write_input(&self, dir: &Path, sequence: &str) -> Result<NamedTempFile> {
        let input = tempfile::Builder::new()
            .prefix("sequence-")
            .suffix(".fasta")
            .tempfile_in(dir)
            .map_err(|e| BppError::io(dir, "create sequence file in", e))?;

        let mut writer = fasta::Writer::new(input.as_file());
        writer
            .write(&self.settings.sequence_label, None, sequence.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| BppError::io(input.path(), "write", e))?;
        drop(writer);

        Ok(input)
    }

    fn run_step(
        &self,
        step: &'static str,
        program: &str,
        args: &[&OsStr],
        output: &Path,
    ) -> Result<()> {
        let mut command = self.handle.command(program);
        command.args(args);

        let out = command
            .output()
            .map_err(|e| BppError::tool(step, format!("could not launch {}: {}", program, e)))?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let mut detail = format!("{} exited with {}", program, out.status);
            let tail = stderr_tail(&stderr);
            if !tail.is_empty() {
                detail.push_str(": ");
                detail.push_str(&tail);
            }
            return Err(BppError::tool(step, detail));
        }

        if !output.is_file() {
            return Err(BppError::tool(
                step,
                format!("{} produced no output file {}", program, output.display()),
            ));
        }
        Ok(())
    }
}

fn stage(logger: &Logger, stage: Stage, detail: &str) {
    // Logging failures never abort a fold.
    let _ = logger.log(&format!("[ensemble:{}] {}", stage, detail));
}

/// Non-empty, IUPAC nucleotide letters only
pub fn validate_sequence(sequence: &str) -> Result<()> {
    if sequence.is_empty() {
        return Err(BppError::InvalidSequence("sequence is empty".to_string()));
    }
    if let Some((idx, c)) = sequence
        .char_indices()
        .find(|(_, c)| !"ACGUTNRYKMSWBDHV".contains(c.to_ascii_uppercase()))
    {
        return Err(BppError::InvalidSequence(format!(
            "character '{}' at position {} is not a nucleotide",
            c,
            idx + 1
        )));
    }
    Ok(())
}

fn check_length(plot: ProbabilityPlot, expected: usize) -> Result<ProbabilityPlot> {
    if plot.length != expected {
        return Err(BppError::tool(
            "probability plot",
            format!(
                "plot declares length {} but the sequence has {} nt",
                plot.length, expected
            ),
        ));
    }
    Ok(plot)
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_sequence() {
        assert!(validate_sequence("ACGUacgu").is_ok());
        assert!(validate_sequence("GGGAAACCCNT").is_ok());
        assert!(matches!(
            validate_sequence("").unwrap_err(),
            BppError::InvalidSequence(_)
        ));
        let err = validate_sequence("ACGX").unwrap_err();
        assert!(err.to_string().contains("position 4"));
    }

    #[test]
    fn test_handle_prefers_container() {
        let mut settings = ToolSettings::default();
        settings.bin_dir = Some(PathBuf::from("/opt/rnastructure/exe"));
        assert_eq!(
            settings.handle(),
            ToolHandle::Native {
                bin_dir: Some(PathBuf::from("/opt/rnastructure/exe"))
            }
        );

        settings.image = Some(PathBuf::from("/images/rnastructure.sif"));
        assert_eq!(
            settings.handle(),
            ToolHandle::Container {
                runtime: "singularity".to_string(),
                image: PathBuf::from("/images/rnastructure.sif"),
            }
        );
    }

    #[test]
    fn test_container_command_line() {
        let handle = ToolHandle::Container {
            runtime: "apptainer".to_string(),
            image: PathBuf::from("rs.sif"),
        };
        let command = handle.command("partition");
        assert_eq!(command.get_program(), "apptainer");
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(args, vec!["exec", "rs.sif", "partition"]);
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr = "a\nb\n\nc\nd\ne\nf\ng\n";
        assert_eq!(stderr_tail(stderr), "c | d | e | f | g");
        assert_eq!(stderr_tail(""), "");
    }

    #[cfg(unix)]
    mod fake_tools {
        use super::super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::tempdir;

        const PLOT: &str = "printf '3\\ni\\tj\\t-log10(Probability)\\n1\\t2\\t1.0\\n2\\t3\\t0.3\\n'";

        fn write_script(dir: &Path, name: &str, body: &str) {
            let path = dir.join(name);
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }

        fn generator(bin_dir: &Path, temp_root: &Path) -> EnsembleGenerator {
            EnsembleGenerator::new(ToolSettings {
                bin_dir: Some(bin_dir.to_path_buf()),
                temp_root: Some(temp_root.to_path_buf()),
                ..ToolSettings::default()
            })
        }

        fn is_empty_dir(dir: &Path) -> bool {
            fs::read_dir(dir).unwrap().next().is_none()
        }

        #[test]
        fn test_successful_run_parses_plot_and_cleans_up() {
            let bin = tempdir().unwrap();
            let scratch = tempdir().unwrap();
            write_script(bin.path(), "partition", "cat \"$1\" > \"$2\"");
            write_script(
                bin.path(),
                "ProbabilityPlot",
                &format!(
                    "[ \"$1\" = \"-t\" ] || exit 3\nhead -n 1 \"$2\" | grep -q '^>test$' || exit 4\n{} > \"$3\"",
                    PLOT
                ),
            );

            let matrix = generator(bin.path(), scratch.path())
                .compute_bpp_matrix("GCA", &Logger::disabled())
                .unwrap();

            assert_eq!(matrix.len(), 3);
            assert!((matrix.get(0, 1) - 0.1).abs() < 1e-9);
            assert!((matrix.get(1, 2) - 10f64.powf(-0.3)).abs() < 1e-9);
            assert!(is_empty_dir(scratch.path()));
        }

        #[test]
        fn test_partition_failure_leaves_no_temporaries() {
            let bin = tempdir().unwrap();
            let scratch = tempdir().unwrap();
            write_script(bin.path(), "partition", "echo 'segfault in partition' >&2\nexit 1");
            write_script(bin.path(), "ProbabilityPlot", "exit 0");

            let err = generator(bin.path(), scratch.path())
                .compute_bpp_matrix("GCA", &Logger::disabled())
                .unwrap_err();

            match err {
                BppError::ToolExecution { step, detail } => {
                    assert_eq!(step, "partition");
                    assert!(detail.contains("segfault in partition"), "{}", detail);
                }
                other => panic!("unexpected error {:?}", other),
            }
            assert!(is_empty_dir(scratch.path()));
        }

        #[test]
        fn test_missing_output_file_is_tool_error() {
            let bin = tempdir().unwrap();
            let scratch = tempdir().unwrap();
            write_script(bin.path(), "partition", "cat \"$1\" > \"$2\"");
            write_script(bin.path(), "ProbabilityPlot", "exit 0");

            let err = generator(bin.path(), scratch.path())
                .compute_probability_plot("GCA", &Logger::disabled())
                .unwrap_err();
            assert!(matches!(
                err,
                BppError::ToolExecution { step: "probability plot", .. }
            ));
            assert!(is_empty_dir(scratch.path()));
        }

        #[test]
        fn test_malformed_plot_is_data_format_error_and_cleans_up() {
            let bin = tempdir().unwrap();
            let scratch = tempdir().unwrap();
            write_script(bin.path(), "partition", "cat \"$1\" > \"$2\"");
            write_script(bin.path(), "ProbabilityPlot", "printf 'three\\nheader\\n' > \"$3\"");

            let err = generator(bin.path(), scratch.path())
                .compute_probability_plot("GCA", &Logger::disabled())
                .unwrap_err();
            assert!(matches!(err, BppError::DataFormat { line: 1, .. }));
            assert!(is_empty_dir(scratch.path()));
        }

        #[test]
        fn test_parse_error_survives_failed_input_removal() {
            let bin = tempdir().unwrap();
            let scratch = tempdir().unwrap();
            write_script(bin.path(), "partition", "cat \"$1\" > \"$2\"\nrm -f \"$1\"");
            write_script(bin.path(), "ProbabilityPlot", "printf 'three\\nheader\\n' > \"$3\"");

            let err = generator(bin.path(), scratch.path())
                .compute_probability_plot("GCA", &Logger::disabled())
                .unwrap_err();
            assert!(matches!(err, BppError::DataFormat { line: 1, .. }), "{:?}", err);
            assert!(is_empty_dir(scratch.path()));
        }

        #[test]
        fn test_length_disagreement_is_rejected() {
            let bin = tempdir().unwrap();
            let scratch = tempdir().unwrap();
            write_script(bin.path(), "partition", "cat \"$1\" > \"$2\"");
            write_script(bin.path(), "ProbabilityPlot", &format!("{} > \"$3\"", PLOT));

            let err = generator(bin.path(), scratch.path())
                .compute_probability_plot("GCAUU", &Logger::disabled())
                .unwrap_err();
            assert!(err.to_string().contains("declares length 3"));
        }

        #[test]
        fn test_missing_executable_is_tool_error() {
            let bin = tempdir().unwrap();
            let scratch = tempdir().unwrap();

            let err = generator(bin.path(), scratch.path())
                .compute_probability_plot("GCA", &Logger::disabled())
                .unwrap_err();
            assert!(err.to_string().contains("could not launch partition"));
            assert!(is_empty_dir(scratch.path()));
        }

        #[test]
        fn test_invalid_sequence_touches_nothing() {
            let bin = tempdir().unwrap();
            let scratch = tempdir().unwrap();

            let err = generator(bin.path(), scratch.path())
                .compute_probability_plot("GC-A", &Logger::disabled())
                .unwrap_err();
            assert!(matches!(err, BppError::InvalidSequence(_)));
            assert!(is_empty_dir(scratch.path()));
        }
    }
}
