use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::Mutex;

/// Timestamped run log, shareable between the worker threads of one run
pub struct Logger {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl Logger {
    pub fn new(file: File) -> Self {
        Self {
            writer: Mutex::new(Box::new(BufWriter::new(file))),
        }
    }

    /// Logger that discards everything (no `--log` given)
    pub fn disabled() -> Self {
        Self {
            writer: Mutex::new(Box::new(io::sink())),
        }
    }

    /// Record detailed log information
    pub fn log(&self, message: &str) -> io::Result<()> {
        let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
        // A poisoned lock only means another thread panicked mid-line.
        let mut writer = match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        writeln!(writer, "[{}] {}", timestamp, message)?;
        writer.flush()
    }
}

/// Format time as "xx h xx m xx.xxx s" format
pub fn format_time_used(elapsed: std::time::Duration) -> String {
    let total_secs = elapsed.as_secs_f64();
    let hours = (total_secs / 3600.0) as u64;
    let minutes = ((total_secs % 3600.0) / 60.0) as u64;
    let seconds = total_secs % 60.0;

    if hours > 0 {
        format!("[Time used] {:02} h {:02} m {:05.3} s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("[Time used] {:02} m {:05.3} s", minutes, seconds)
    } else {
        format!("[Time used] {:05.3} s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek};
    use std::time::Duration;

    #[test]
    fn test_log_lines_are_timestamped() {
        let mut file = tempfile::tempfile().unwrap();
        let logger = Logger::new(file.try_clone().unwrap());
        logger.log("=== first ===").unwrap();
        logger.log("second").unwrap();

        let mut contents = String::new();
        file.rewind().unwrap();
        file.read_to_string(&mut contents).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] === first ==="));
        assert!(lines[1].ends_with("] second"));
    }

    #[test]
    fn test_disabled_logger_accepts_messages() {
        let logger = Logger::disabled();
        assert!(logger.log("ignored").is_ok());
    }

    #[test]
    fn test_format_time_used() {
        assert_eq!(format_time_used(Duration::from_millis(1500)), "[Time used] 1.500 s");
        assert_eq!(
            format_time_used(Duration::from_secs(125)),
            "[Time used] 02 m 5.000 s"
        );
        assert_eq!(
            format_time_used(Duration::from_secs(3725)),
            "[Time used] 01 h 02 m 5.000 s"
        );
    }
}
