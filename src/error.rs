use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by each stage of the pipeline.
///
/// Messages keep the `"<Stage> error: <detail>"` shape so they read the same
/// way on the command line regardless of where they were raised.
#[derive(Debug, Error)]
pub enum FootingError {
    #[error("Input error: {0}")]
    Input(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Config error: layer thicknesses sum to {total} m but the domain is {depth} m deep")]
    LayerThickness { total: f64, depth: f64 },

    #[error("Mesher error: {0}")]
    Mesher(String),

    #[error("Parse error: {file}:{line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    #[error("Solver error: {0}")]
    Solver(String),

    #[error("Solver error: unsupported {0}")]
    Unsupported(String),

    #[error("Post Processor error: {0}")]
    PostProcessor(String),

    #[error("IO error: {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FootingError {
    /// Wraps an io error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FootingError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_stage() {
        let err = FootingError::Input("missing geometry".to_owned());
        assert_eq!(err.to_string(), "Input error: missing geometry");

        let err = FootingError::LayerThickness {
            total: 9.0,
            depth: 10.0,
        };
        assert!(err.to_string().contains("sum to 9 m"));

        let err = FootingError::Parse {
            file: "nodes.tcl".to_owned(),
            line: 7,
            message: "expected 5 tokens".to_owned(),
        };
        assert_eq!(err.to_string(), "Parse error: nodes.tcl:7: expected 5 tokens");
    }

    #[test]
    fn io_errors_keep_their_source() {
        use std::error::Error;

        let err = FootingError::io(
            "missing.vtu",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().starts_with("IO error: missing.vtu"));
        assert!(err.source().is_some());
    }
}
