//! Import resolution for `require(...)` statements
//!
//! Every `require` is replaced by the statements of the unit it names. The
//! registry of already-imported units is owned by one resolver, which lives
//! for exactly one compilation run.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use log::debug;
use serde::Serialize;

use crate::frontend::ast::{IfBranch, IfChain, Program, RequireStmt, Stmt, TryStmt};
use crate::frontend::parser;
use crate::utils::{Error, Result, SourceMap};

/// Finds and reads imported units
pub trait SourceLoader: Send + Sync {
    /// Canonical identity of `request` as seen from the unit at `from`
    fn resolve(&self, from: Option<&Path>, request: &str) -> Option<PathBuf>;

    /// Read a unit previously returned by `resolve`
    fn read(&self, path: &Path) -> io::Result<String>;
}

/// Looks units up on disk: library paths first, then the requesting file's directory
#[derive(Debug, Clone, Default)]
pub struct FsLoader {
    library_paths: Vec<PathBuf>,
}

impl FsLoader {
    pub fn new(library_paths: Vec<PathBuf>) -> Self {
        Self { library_paths }
    }
}

impl SourceLoader for FsLoader {
    fn resolve(&self, from: Option<&Path>, request: &str) -> Option<PathBuf> {
        let local = from
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        self.library_paths
            .iter()
            .chain(std::iter::once(&local))
            .map(|dir| dir.join(request))
            .find(|candidate| candidate.is_file())
            .and_then(|found| fs::canonicalize(found).ok())
    }

    fn read(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }
}

/// In-memory units keyed by normalized path
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    units: HashMap<PathBuf, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl AsRef<Path>, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, text: impl Into<String>) {
        self.units.insert(normalize(path.as_ref()), text.into());
    }
}

impl SourceLoader for MemoryLoader {
    fn resolve(&self, from: Option<&Path>, request: &str) -> Option<PathBuf> {
        let relative = from.and_then(Path::parent).map(|dir| normalize(&dir.join(request)));
        relative
            .into_iter()
            .chain(std::iter::once(normalize(Path::new(request))))
            .find(|candidate| self.units.contains_key(candidate))
    }

    fn read(&self, path: &Path) -> io::Result<String> {
        self.units
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }
}

/// Lexically resolve `.` and `..`
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Units imported so far in one compilation run
#[derive(Debug, Default)]
pub struct ImportRegistry {
    imported: HashSet<PathBuf>,
    /// Units whose own requires are being expanded right now
    in_progress: Vec<PathBuf>,
}

impl ImportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.imported.contains(path)
    }

    /// Returns false if the unit was already registered
    pub fn register(&mut self, path: &Path) -> bool {
        self.imported.insert(path.to_path_buf())
    }

    fn is_in_progress(&self, path: &Path) -> bool {
        self.in_progress.iter().any(|p| p == path)
    }
}

/// Import counters for the compilation report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub expanded: usize,
    pub skipped: usize,
}

/// Expands `require` statements in place
pub struct ImportResolver<'a> {
    loader: &'a dyn SourceLoader,
    sources: &'a mut SourceMap,
    registry: ImportRegistry,
    stats: ImportStats,
}

impl<'a> ImportResolver<'a> {
    pub fn new(loader: &'a dyn SourceLoader, sources: &'a mut SourceMap) -> Self {
        Self {
            loader,
            sources,
            registry: ImportRegistry::new(),
            stats: ImportStats::default(),
        }
    }

    pub fn stats(&self) -> ImportStats {
        self.stats
    }

    /// Expand every `require` in `program`. `entry` is the identity of the
    /// program itself, so requiring it back is a no-op.
    pub fn resolve_program(&mut self, program: Program, entry: Option<&Path>) -> Result<Program> {
        if let Some(entry) = entry {
            self.registry.register(entry);
            self.registry.in_progress.push(entry.to_path_buf());
        }
        let body = self.expand(program.body, entry);
        if entry.is_some() {
            self.registry.in_progress.pop();
        }
        Ok(Program { body: body? })
    }

    fn expand(&mut self, stmts: Vec<Stmt>, from: Option<&Path>) -> Result<Vec<Stmt>> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            match stmt {
                Stmt::Require(req) => out.extend(self.require(&req, from)?),
                other => out.push(self.expand_nested(other, from)?),
            }
        }
        Ok(out)
    }

    fn expand_nested(&mut self, stmt: Stmt, from: Option<&Path>) -> Result<Stmt> {
        Ok(match stmt {
            Stmt::Block { body, span } => Stmt::Block {
                body: self.expand(body, from)?,
                span,
            },
            Stmt::If(chain) => {
                let mut branches = Vec::with_capacity(chain.branches.len());
                for branch in chain.branches {
                    branches.push(IfBranch {
                        body: self.expand(branch.body, from)?,
                        ..branch
                    });
                }
                let else_body = match chain.else_body {
                    Some(body) => Some(self.expand(body, from)?),
                    None => None,
                };
                Stmt::If(IfChain { branches, else_body, span: chain.span })
            }
            Stmt::Try(t) => {
                let except = match t.except {
                    Some(body) => Some(self.expand(body, from)?),
                    None => None,
                };
                Stmt::Try(TryStmt {
                    attempt: self.expand(t.attempt, from)?,
                    except,
                    span: t.span,
                })
            }
            Stmt::For(mut l) => {
                l.body = self.expand(std::mem::take(&mut l.body), from)?;
                Stmt::For(l)
            }
            Stmt::Function(mut f) => {
                f.body = self.expand(std::mem::take(&mut f.body), from)?;
                Stmt::Function(f)
            }
            other => other,
        })
    }

    fn require(&mut self, req: &RequireStmt, from: Option<&Path>) -> Result<Vec<Stmt>> {
        let path = self
            .loader
            .resolve(from, &req.path)
            .ok_or_else(|| Error::UnresolvedImport {
                path: req.path.clone(),
                span: req.span,
            })?;

        if self.registry.is_in_progress(&path) {
            if req.force {
                return Err(Error::ImportCycle {
                    path: req.path.clone(),
                    span: req.span,
                });
            }
            debug!("require('{}'): already being expanded, skipped", req.path);
            self.stats.skipped += 1;
            return Ok(Vec::new());
        }
        if self.registry.contains(&path) && !req.force {
            debug!("require('{}'): already imported, skipped", req.path);
            self.stats.skipped += 1;
            return Ok(Vec::new());
        }

        let text = self.loader.read(&path).map_err(|err| {
            Error::Io(format!("reading {}: {}", path.display(), err))
        })?;
        self.registry.register(&path);
        let file_id = self.sources.add(path.display().to_string(), Some(path.as_path()), text.as_str());
        let program = parser::parse(&text, file_id)?;
        debug!(
            "require('{}'){}: expanding {}",
            req.path,
            if req.force { " forced" } else { "" },
            path.display()
        );
        self.stats.expanded += 1;

        self.registry.in_progress.push(path.clone());
        let body = self.expand(program.body, Some(&path));
        self.registry.in_progress.pop();
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::FunctionDecl;

    const STR2INT: &str = "function str2int(s) { \"inline\"; return s + 0; }";

    fn resolve(loader: &MemoryLoader, source: &str) -> Result<(Program, ImportStats)> {
        let mut sources = SourceMap::new();
        let entry = PathBuf::from("main.js");
        let file_id = sources.add("main.js", Some(entry.as_path()), source);
        let program = parser::parse(source, file_id)?;
        let mut resolver = ImportResolver::new(loader, &mut sources);
        let program = resolver.resolve_program(program, Some(entry.as_path()))?;
        Ok((program, resolver.stats()))
    }

    fn functions(program: &Program) -> Vec<&FunctionDecl> {
        program
            .body
            .iter()
            .filter_map(|s| match s {
                Stmt::Function(f) => Some(f),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_duplicate_require_is_noop() {
        let loader = MemoryLoader::new().with("moddir/str2int.js", STR2INT);
        let (once, _) = resolve(&loader, "require('./moddir/str2int.js');").unwrap();
        let (twice, stats) = resolve(
            &loader,
            "require('./moddir/str2int.js');\nrequire('./moddir/str2int.js');",
        )
        .unwrap();
        assert_eq!(functions(&once).len(), 1);
        assert_eq!(functions(&twice).len(), 1);
        assert_eq!(stats, ImportStats { expanded: 1, skipped: 1 });
    }

    #[test]
    fn test_forced_require_reimports() {
        let loader = MemoryLoader::new().with("moddir/str2int.js", STR2INT);
        let (program, stats) = resolve(
            &loader,
            "require('./moddir/str2int.js');\n\
             require('./moddir/str2int.js', force=true);\n\
             require('./moddir/str2int.js');",
        )
        .unwrap();
        assert_eq!(functions(&program).len(), 2);
        assert_eq!(stats, ImportStats { expanded: 2, skipped: 1 });
    }

    #[test]
    fn test_diamond_imports_once() {
        let loader = MemoryLoader::new()
            .with("lib/a.js", "require('./common.js'); a = 1;")
            .with("lib/b.js", "require('./common.js'); b = 1;")
            .with("lib/common.js", "c = 1;");
        let (program, stats) =
            resolve(&loader, "require('lib/a.js'); require('lib/b.js');").unwrap();
        assert_eq!(program.body.len(), 3);
        assert_eq!(stats.expanded, 3);
    }

    #[test]
    fn test_cycles() {
        let loader = MemoryLoader::new()
            .with("a.js", "require('./b.js'); a = 1;")
            .with("b.js", "require('./a.js'); b = 1;");
        let (program, _) = resolve(&loader, "require('a.js');").unwrap();
        assert_eq!(program.body.len(), 2);

        let loader = MemoryLoader::new().with("a.js", "require('./a.js', force=true);");
        assert!(matches!(
            resolve(&loader, "require('a.js');"),
            Err(Error::ImportCycle { .. })
        ));
    }

    #[test]
    fn test_unresolved() {
        let err = resolve(&MemoryLoader::new(), "x = 1;\nrequire('missing.js');").unwrap_err();
        assert!(matches!(err, Error::UnresolvedImport { ref path, .. } if path == "missing.js"));
    }

    #[test]
    fn test_nested_require_is_expanded() {
        let loader = MemoryLoader::new().with("lib.js", "x = 1;");
        let (program, _) = resolve(&loader, "if (a) { require('lib.js'); }").unwrap();
        let Stmt::If(chain) = &program.body[0] else { panic!() };
        assert!(matches!(chain.branches[0].body[0], Stmt::Assign { .. }));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("./a/../b/./c.js")), PathBuf::from("b/c.js"));
    }
}
