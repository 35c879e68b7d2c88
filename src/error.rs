use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutotrimError {
    #[error("Malformed probe output: {0}")]
    MalformedProbeOutput(String),

    #[error("Minimum segment duration must not be negative, got {0}")]
    InvalidMinDuration(f64),

    #[error("Boundary list must contain start/end pairs, got {0} boundaries")]
    OddIntervalList(usize),

    #[error("No usable segments left after refinement")]
    EmptyPlan,

    #[error("Segment {index} ({start:.3}s-{end:.3}s) failed: {reason}")]
    JobFailed {
        index: usize,
        start: f64,
        end: f64,
        reason: String,
    },

    #[error("Refusing to assemble: {}", describe_incomplete(.missing, .failures))]
    IncompleteSegments {
        missing: Vec<usize>,
        failures: Vec<AutotrimError>,
    },

    #[error("Merge failed: {0}")]
    MergeFailed(String),

    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("External tool failed: {0}")]
    Tool(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn describe_incomplete(missing: &[usize], failures: &[AutotrimError]) -> String {
    let mut summary = format!(
        "{} segment(s) missing, {} failed",
        missing.len(),
        failures.len()
    );
    if !missing.is_empty() {
        let indices: Vec<String> = missing.iter().map(|i| i.to_string()).collect();
        summary.push_str(&format!(" (missing: {})", indices.join(", ")));
    }
    if !failures.is_empty() {
        let lines: Vec<String> = failures.iter().map(|f| f.to_string()).collect();
        summary.push_str(&format!(": {}", lines.join("; ")));
    }
    summary
}

pub type Result<T> = std::result::Result<T, AutotrimError>;
