//! Compilation driver
//!
//! Runs one unit through parse, import resolution, the lowering passes and
//! ESI generation. Every unit owns its `SourceMap` and import registry, so
//! independent units can be compiled in parallel.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};
use rayon::prelude::*;

use crate::backend::{CodeGen, EsiCodeGen};
use crate::config::CompileOptions;
use crate::feedback::{CompilationReport, CompilationStats, ErrorReport};
use crate::frontend::ast::Program;
use crate::frontend::module::{FsLoader, ImportResolver, SourceLoader};
use crate::frontend::parser;
use crate::middle::optimize::Optimizer;
use crate::utils::{Result, SourceMap};

/// Result of compiling one unit
#[derive(Debug)]
pub struct Unit {
    /// Display name of the entry file
    pub name: String,
    /// Entry file plus every unit it imported
    pub sources: SourceMap,
    pub result: Result<String>,
    pub stats: CompilationStats,
}

impl Unit {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// `file:line:col: kind: message` for a failed unit
    pub fn render_error(&self) -> Option<String> {
        self.result.as_ref().err().map(|e| e.render(&self.sources))
    }

    pub fn report(&self) -> CompilationReport {
        match &self.result {
            Ok(_) => CompilationReport::success(self.name.clone(), self.stats),
            Err(e) => CompilationReport::failure(
                self.name.clone(),
                vec![ErrorReport::from_error(e, &self.sources)],
                self.stats,
            ),
        }
    }
}

/// Compiles units with one set of options
pub struct Compiler {
    options: CompileOptions,
    loader: Arc<dyn SourceLoader>,
}

impl Compiler {
    /// A compiler that reads imports from disk
    pub fn new(options: CompileOptions) -> Self {
        let loader = FsLoader::new(options.library_paths.clone());
        Self::with_loader(options, Arc::new(loader))
    }

    pub fn with_loader(options: CompileOptions, loader: Arc<dyn SourceLoader>) -> Self {
        Self { options, loader }
    }

    /// Compile source text that has no file of its own
    pub fn compile_source(&self, name: &str, text: &str) -> Unit {
        let mut sources = SourceMap::new();
        let file_id = sources.add(name, None, text);
        self.compile_unit(name.to_string(), sources, file_id, None)
    }

    /// Compile the file at `path`; a read failure is reported as the unit's error
    pub fn compile_file(&self, path: &Path) -> Unit {
        let name = path.display().to_string();
        let mut sources = SourceMap::new();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                return Unit {
                    name,
                    sources,
                    result: Err(e.into()),
                    stats: CompilationStats::default(),
                }
            }
        };
        let identity = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let file_id = sources.add(name.clone(), Some(identity.as_path()), text);
        self.compile_unit(name, sources, file_id, Some(identity))
    }

    /// Compile independent files in parallel; one failure does not stop the others
    pub fn compile_batch(&self, paths: &[PathBuf]) -> Vec<Unit> {
        info!("compiling {} units", paths.len());
        paths.par_iter().map(|path| self.compile_file(path)).collect()
    }

    /// Parse and lower a unit without generating markup
    pub fn lower_source(&self, sources: &mut SourceMap, file_id: usize) -> Result<Program> {
        let mut stats = CompilationStats::default();
        let entry = sources.path(file_id).map(Path::to_path_buf);
        self.lower(sources, file_id, entry.as_deref(), &mut stats)
    }

    fn compile_unit(
        &self,
        name: String,
        mut sources: SourceMap,
        file_id: usize,
        entry: Option<PathBuf>,
    ) -> Unit {
        info!("compiling {}", name);
        let started = Instant::now();
        let mut stats = CompilationStats::default();

        let result = self
            .lower(&mut sources, file_id, entry.as_deref(), &mut stats)
            .and_then(|program| EsiCodeGen::from_options(&self.options).generate(&program));

        if let Ok(markup) = &result {
            stats.bytes_emitted = markup.len();
        }
        stats.total_time_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => info!("{}: {} bytes of ESI", name, stats.bytes_emitted),
            Err(e) => debug!("{}: failed with {}", name, e.kind()),
        }

        Unit {
            name,
            sources,
            result,
            stats,
        }
    }

    fn lower(
        &self,
        sources: &mut SourceMap,
        file_id: usize,
        entry: Option<&Path>,
        stats: &mut CompilationStats,
    ) -> Result<Program> {
        let text = sources.text(file_id).to_string();
        let program = parser::parse(&text, file_id)?;

        let mut resolver = ImportResolver::new(self.loader.as_ref(), sources);
        let mut program = resolver.resolve_program(program, entry)?;
        stats.imports = resolver.stats();
        debug!(
            "imports: {} expanded, {} skipped",
            stats.imports.expanded, stats.imports.skipped
        );

        stats.passes = Optimizer::for_options(&self.options).optimize(&mut program)?;
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::module::MemoryLoader;
    use crate::utils::ErrorKind;

    fn compiler(loader: MemoryLoader) -> Compiler {
        Compiler::with_loader(CompileOptions::default(), Arc::new(loader))
    }

    #[test]
    fn test_compile_source_with_imports() {
        let loader = MemoryLoader::new().with("lib/util.js", "function twice(x) { \"inline\"; return x * 2; }");
        let unit = compiler(loader).compile_source(
            "main.js",
            "require('lib/util.js'); require('lib/util.js'); print(twice(21));",
        );
        assert_eq!(unit.result.as_deref(), Ok("42"));
        assert_eq!(unit.stats.imports.expanded, 1);
        assert_eq!(unit.stats.imports.skipped, 1);
        assert_eq!(unit.sources.len(), 2);
        assert_eq!(unit.stats.passes.calls_inlined, 1);
        assert_eq!(unit.stats.bytes_emitted, 2);
        assert!(unit.report().success);
    }

    #[test]
    fn test_error_located_in_imported_unit() {
        let loader = MemoryLoader::new().with("bad.js", "a = 1;\nb = @;");
        let unit = compiler(loader).compile_source("main.js", "require('bad.js');");
        let err = unit.result.as_ref().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LexError);
        assert_eq!(
            unit.render_error().unwrap(),
            "bad.js:2:5: lex error: unrecognized character '@'"
        );
        let report = unit.report();
        assert!(!report.success);
        assert_eq!(report.diagnostics[0].code, "E0001");
    }

    #[test]
    fn test_missing_file_is_unit_error() {
        let unit = Compiler::new(CompileOptions::default()).compile_file(Path::new("/no/such/file.js"));
        assert_eq!(unit.result.unwrap_err().kind(), ErrorKind::Io);
    }

    #[test]
    fn test_lower_source() {
        let mut sources = SourceMap::new();
        let id = sources.add("main.js", None, "for (i of [1..2]) { print(i); }");
        let program = compiler(MemoryLoader::new()).lower_source(&mut sources, id).unwrap();
        assert_eq!(program.body.len(), 2);
    }
}
