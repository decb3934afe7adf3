use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("{0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unexpected response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    #[error("Cyclic dependency detected: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error("Graph rendering failed: {0}")]
    Render(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnalyzerError {
    /// Process exit code for this failure. Configuration problems are
    /// distinguished from fetch failures so scripts can tell them apart.
    pub fn exit_code(&self) -> i32 {
        match self {
            AnalyzerError::Config(_) => 2,
            _ => 1,
        }
    }
}

impl From<reqwest::Error> for AnalyzerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AnalyzerError::Network(format!("request timed out: {}", e))
        } else {
            AnalyzerError::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(AnalyzerError::Config("bad".into()).exit_code(), 2);
        assert_eq!(AnalyzerError::NotFound("gone".into()).exit_code(), 1);
        assert_eq!(AnalyzerError::Network("down".into()).exit_code(), 1);
    }

    #[test]
    fn test_cycle_message_lists_path() {
        let err = AnalyzerError::CyclicDependency(
            vec!["a".to_string(), "b".to_string(), "a".to_string()]
        );
        assert_eq!(err.to_string(), "Cyclic dependency detected: a -> b -> a");
    }
}
