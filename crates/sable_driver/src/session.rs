//! Compilation options.

use std::path::PathBuf;

/// Options for one compilation.
#[derive(Clone, Debug, Default)]
pub struct CompileOptions {
    /// The directory class files are written to. Defaults to the source
    /// file's directory.
    pub out_dir: Option<PathBuf>,

    /// Dump the token stream to stderr before parsing.
    pub emit_tokens: bool,

    /// Dump the AST to stderr after parsing.
    pub emit_ast: bool,

    /// Stage tracing on stderr.
    pub verbose: bool,
}

impl CompileOptions {
    /// Options writing artifacts into the given directory.
    pub fn into_dir(out_dir: PathBuf) -> Self {
        Self {
            out_dir: Some(out_dir),
            ..Default::default()
        }
    }

    /// Enable verbose stage tracing.
    pub fn with_verbose(mut self) -> Self {
        self.verbose = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CompileOptions::default();
        assert!(options.out_dir.is_none());
        assert!(!options.verbose);
        assert!(!options.emit_tokens);
    }

    #[test]
    fn test_builders() {
        let options = CompileOptions::into_dir(PathBuf::from("out")).with_verbose();
        assert_eq!(options.out_dir.as_deref(), Some(std::path::Path::new("out")));
        assert!(options.verbose);
    }
}
