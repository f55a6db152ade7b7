use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ast::{Module, NodeId};
use crate::error::CompileError;
use crate::lexer::{lex, LexLocation, UnitId};
use crate::parser::parse_module;
use crate::resolver::{resolve, Resolution};
use crate::types::{infer, TypeTable};
use crate::visitor::Visitor;

/// Environment variable naming the standard library directory; the disk
/// loader falls back to it when a module is not found next to the target.
pub const STDLIB_ENV: &str = "ETUDE_STDLIB";

/// Maps a module name to its source text. The driver resolves every
/// import through this seam, so a host can serve unsaved editor buffers
/// instead of files on disk.
pub trait SourceLoader {
    fn load(&self, module_name: &str, base_dir: &Path) -> Result<(PathBuf, String), CompileError>;
}

/// Loads `<base_dir>/<name>.et`, falling back to the standard library.
pub struct DiskLoader;

impl SourceLoader for DiskLoader {
    fn load(&self, module_name: &str, base_dir: &Path) -> Result<(PathBuf, String), CompileError> {
        let mut candidates = vec![base_dir.join(format!("{module_name}.et"))];
        if let Ok(stdlib) = std::env::var(STDLIB_ENV) {
            candidates.push(PathBuf::from(stdlib).join(format!("{module_name}.et")));
        }
        for candidate in candidates {
            if let Ok(content) = fs::read_to_string(&candidate) {
                return Ok((candidate, content));
            }
        }
        Err(CompileError::unlocated(format!("cannot find module '{module_name}'")))
    }
}

#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub path: PathBuf,
    pub module: String,
}

/// One full front-end run for a target module: every transitive import
/// parsed, modules ordered dependencies-first (target last), names
/// resolved, types inferred. The driver owns all of it; tooling output
/// holds locations that stay meaningful for exactly as long as the
/// driver they came from is kept alive.
#[derive(Debug, Default)]
pub struct CompilationDriver {
    target: String,
    base_dir: PathBuf,
    units: Vec<SourceUnit>,
    modules: Vec<Module>,
    resolution: Resolution,
    types: TypeTable,
}

impl CompilationDriver {
    pub fn new(module_name: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        CompilationDriver {
            target: module_name.into(),
            base_dir: base_dir.into(),
            ..CompilationDriver::default()
        }
    }

    /// Parse, order, resolve, and infer. Any failure aborts the whole run
    /// and leaves the driver unusable; callers keep their previous driver
    /// when they need the old tables to survive a failed recompile.
    pub fn prepare_for_tooling(&mut self, loader: &dyn SourceLoader) -> Result<(), CompileError> {
        let mut parsed: HashMap<String, Module> = HashMap::new();
        let mut import_sites: HashMap<String, LexLocation> = HashMap::new();
        let mut pending = vec![self.target.clone()];
        let mut next_id: NodeId = 0;

        while let Some(name) = pending.pop() {
            if parsed.contains_key(&name) {
                continue;
            }
            let (path, content) = match loader.load(&name, &self.base_dir) {
                Ok(loaded) => loaded,
                Err(err) => {
                    // Point at the import that asked for the module; the
                    // target itself has no import site.
                    return Err(match import_sites.get(&name) {
                        Some(site) => CompileError::located(err.message().to_string(), *site),
                        None => err,
                    });
                }
            };
            let unit = UnitId(self.units.len() as u32);
            self.units.push(SourceUnit { path, module: name.clone() });
            let tokens = lex(unit, &content)?;
            let (module, next) = parse_module(name.clone(), unit, &tokens, next_id)?;
            next_id = next;
            for import in &module.imports {
                import_sites
                    .entry(import.name.text.clone())
                    .or_insert(import.name.location);
                pending.push(import.name.text.clone());
            }
            parsed.insert(name, module);
        }

        let mut order = Vec::new();
        let mut marks = HashMap::new();
        topo_visit(&self.target, &parsed, &mut marks, &mut order)?;
        self.modules = order
            .iter()
            .map(|name| parsed.remove(name).expect("ordered module was parsed"))
            .collect();

        self.resolution = resolve(&self.modules);
        self.types = infer(&self.modules, &mut self.resolution)?;
        Ok(())
    }

    /// Drives `v` over the target module (last in dependency order).
    pub fn run_visitor<V: Visitor + ?Sized>(&self, v: &mut V) {
        if let Some(module) = self.modules.last() {
            v.visit_module(module);
        }
    }

    pub fn target_module(&self) -> Option<&Module> {
        self.modules.last()
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn units(&self) -> &[SourceUnit] {
        &self.units
    }

    pub fn unit_path(&self, unit: UnitId) -> &Path {
        &self.units[unit.0 as usize].path
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }
}

#[derive(PartialEq)]
enum Mark {
    InProgress,
    Done,
}

fn topo_visit(
    name: &str,
    parsed: &HashMap<String, Module>,
    marks: &mut HashMap<String, Mark>,
    order: &mut Vec<String>,
) -> Result<(), CompileError> {
    marks.insert(name.to_string(), Mark::InProgress);
    let module = &parsed[name];
    for import in &module.imports {
        let dep = &import.name.text;
        match marks.get(dep) {
            Some(Mark::Done) => continue,
            Some(Mark::InProgress) => {
                return Err(CompileError::located(
                    format!("cyclic import of module '{dep}'"),
                    import.name.location,
                ));
            }
            None => {
                if parsed.contains_key(dep) {
                    topo_visit(dep, parsed, marks, order)?;
                }
            }
        }
    }
    marks.insert(name.to_string(), Mark::Done);
    order.push(name.to_string());
    Ok(())
}
