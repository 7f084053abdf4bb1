//! The main compilation pipeline.

use crate::error::{CompileError, CompileResult};
use crate::session::CompileOptions;
use sable_emit::{ClassArtifact, Emitter};
use sable_lexer::{Lexer, SourceMap};
use sable_parser::Parser;
use sable_typeck::TypeChecker;
use std::path::{Path, PathBuf};

/// The compilation driver.
///
/// A single compile either yields the complete artifact set or an error;
/// nothing is written to disk on failure.
pub struct Driver {
    verbose: bool,
}

impl Driver {
    /// Creates a new driver.
    pub fn new() -> Self {
        Self { verbose: false }
    }

    /// Creates a verbose driver that traces each stage to stderr.
    pub fn verbose() -> Self {
        Self { verbose: true }
    }

    fn trace(&self, stage: &str) {
        if self.verbose {
            eprintln!("[driver] {}...", stage);
        }
    }

    /// Runs the pipeline up to emission, returning in-memory artifacts.
    pub fn compile_to_artifacts(
        &self,
        source: &str,
        file_name: &str,
    ) -> CompileResult<Vec<ClassArtifact>> {
        let map = SourceMap::new(file_name, source);

        self.trace("Lexing");
        let tokens = Lexer::new(source)
            .tokenize()
            .map_err(|e| CompileError::Lex(map.render(e.span, &e.to_string())))?;

        self.trace("Parsing");
        let mut program = Parser::new(tokens)
            .parse()
            .map_err(|e| CompileError::Parse(map.render(e.span(), &e.to_string())))?;

        self.trace("Type checking");
        let mut checker = TypeChecker::new();
        checker
            .check(&mut program)
            .map_err(|e| CompileError::Type(map.render(e.span, &e.to_string())))?;
        let types = checker.into_program_types();

        self.trace("Emitting");
        let emitter = Emitter::new(&map, &types);
        let artifacts = emitter
            .emit_program(&program)
            .map_err(|e| CompileError::Emit(map.render(e.span(), &e.to_string())))?;

        Ok(artifacts)
    }

    /// Parses and type checks without emitting.
    pub fn check(&self, source: &str, file_name: &str) -> CompileResult<()> {
        let map = SourceMap::new(file_name, source);

        self.trace("Lexing");
        let tokens = Lexer::new(source)
            .tokenize()
            .map_err(|e| CompileError::Lex(map.render(e.span, &e.to_string())))?;

        self.trace("Parsing");
        let mut program = Parser::new(tokens)
            .parse()
            .map_err(|e| CompileError::Parse(map.render(e.span(), &e.to_string())))?;

        self.trace("Type checking");
        let mut checker = TypeChecker::new();
        checker
            .check(&mut program)
            .map_err(|e| CompileError::Type(map.render(e.span, &e.to_string())))?;
        Ok(())
    }

    /// Compiles source text and writes one `.class` file per artifact into
    /// the output directory. All artifact bytes are held in memory until
    /// emission has fully succeeded, so a failing compile writes nothing.
    pub fn compile(
        &self,
        source: &str,
        file_name: &str,
        out_dir: &Path,
    ) -> CompileResult<Vec<PathBuf>> {
        let artifacts = self.compile_to_artifacts(source, file_name)?;

        std::fs::create_dir_all(out_dir)?;
        let mut written = Vec::new();
        for artifact in &artifacts {
            let path = out_dir.join(artifact.file_name());
            std::fs::write(&path, &artifact.bytes)?;
            if self.verbose {
                eprintln!("[driver] Wrote {}", path.display());
            }
            written.push(path);
        }
        Ok(written)
    }

    /// Compiles a source file, writing artifacts next to it unless the
    /// options name an output directory. Verbosity is the union of the
    /// driver's flag and the options'.
    pub fn compile_file(&self, path: &Path, options: &CompileOptions) -> CompileResult<Vec<PathBuf>> {
        let effective = Driver {
            verbose: self.verbose || options.verbose,
        };

        let source = std::fs::read_to_string(path)?;
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("input.sb");

        if options.emit_tokens || options.emit_ast {
            effective.dump_front_end(&source, file_name, options)?;
        }

        let out_dir = options
            .out_dir
            .clone()
            .or_else(|| path.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        effective.compile(&source, file_name, &out_dir)
    }

    /// Debug dumps of the token stream and AST.
    fn dump_front_end(
        &self,
        source: &str,
        file_name: &str,
        options: &CompileOptions,
    ) -> CompileResult<()> {
        let map = SourceMap::new(file_name, source);
        let tokens = Lexer::new(source)
            .tokenize()
            .map_err(|e| CompileError::Lex(map.render(e.span, &e.to_string())))?;
        if options.emit_tokens {
            for token in tokens.iter().filter(|t| !t.is_trivia()) {
                eprintln!("[tokens] {:?}", token);
            }
        }
        if options.emit_ast {
            let program = Parser::new(tokens)
                .parse()
                .map_err(|e| CompileError::Parse(map.render(e.span(), &e.to_string())))?;
            eprintln!("[ast] {:#?}", program);
        }
        Ok(())
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_simple_function() {
        let driver = Driver::new();
        let artifacts = driver
            .compile_to_artifacts("fun add(x: Int, y: Int): Int { x + y }", "add.sb")
            .unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].file_name(), "add$.class");
    }

    #[test]
    fn test_type_error_carries_location() {
        let driver = Driver::new();
        let err = driver
            .compile_to_artifacts("fun broken(x: Int): Int { undefined_variable + x }", "b.sb")
            .unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("b.sb:1:27:"), "got: {}", message);
        assert!(message.contains("undefined_variable"));
    }

    #[test]
    fn test_lex_error_carries_location() {
        let driver = Driver::new();
        let err = driver
            .compile_to_artifacts("fun f(): Int { \"unterminated }", "s.sb")
            .unwrap_err();
        assert!(matches!(err, CompileError::Lex(_)));
        assert!(err.to_string().contains("s.sb:1:16:"));
    }

    #[test]
    fn test_check_does_not_emit() {
        let driver = Driver::new();
        driver
            .check("fun ok(): Int { 1 }", "ok.sb")
            .expect("check should pass");
    }

    #[test]
    fn test_compile_file_honours_option_verbosity() {
        let dir = std::env::temp_dir().join(format!("sable-driver-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let source_path = dir.join("v.sb");
        std::fs::write(&source_path, "fun v(): Int { 7 }").unwrap();

        // A quiet driver with verbose options must still compile through
        // the option-driven verbosity path.
        let options = CompileOptions::into_dir(dir.clone()).with_verbose();
        let written = Driver::new().compile_file(&source_path, &options).unwrap();
        assert_eq!(written.len(), 1);
        assert!(dir.join("v$.class").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
