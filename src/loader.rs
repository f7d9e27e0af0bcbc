use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;
use thiserror::Error;
use tracing::debug;

use crate::errors::CompileResult;
use crate::parser::ast::{Item, Module};
use crate::parser::parse_source;
use crate::semantic::PackageUnit;
use crate::span::{FileId, Span};

// ══════════════════════════════════════════════════════════════
// Source Files
// ══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub text: String,
}

/// Every file read during one compilation, indexed by `FileId`.
#[derive(Debug, Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn add(&mut self, name: impl Into<String>, text: impl Into<String>) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(SourceFile {
            name: name.into(),
            text: text.into(),
        });
        id
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn get(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(id.0 as usize)
    }
}

// ══════════════════════════════════════════════════════════════
// Errors
// ══════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
        /// The `use` that asked for the file; `None` for the entry file.
        span: Option<Span>,
    },
    #[error("import cycle: {}", chain.join(" -> "))]
    Cycle { chain: Vec<String>, span: Span },
}

impl LoadError {
    pub fn span(&self) -> Option<Span> {
        match self {
            LoadError::Io { span, .. } => *span,
            LoadError::Cycle { span, .. } => Some(*span),
        }
    }
}

// ══════════════════════════════════════════════════════════════
// Package Loader
// ══════════════════════════════════════════════════════════════

/// Name the entry file's package is checked under.
pub const ENTRY_PACKAGE: &str = "main";

/// `use name;` refers to `<dir>/name.vs`, where `dir` holds the entry file.
pub fn package_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.vs"))
}

fn uses(module: &Module) -> Vec<(String, Span)> {
    module
        .items
        .iter()
        .filter_map(|item| match item {
            Item::Use(u) => Some((u.package.node.clone(), u.package.span)),
            _ => None,
        })
        .collect()
}

/// Files are pushed while their `use`s load and popped once complete, so
/// packages come out dependencies first with the entry package last.
struct Loader<'s> {
    dir: PathBuf,
    sources: &'s mut SourceMap,
    stack: Vec<String>,
    done: FxHashSet<String>,
    units: Vec<PackageUnit>,
    next_node: u32,
}

impl Loader<'_> {
    fn load(&mut self, name: &str, path: &Path, requested_at: Option<Span>) -> CompileResult<()> {
        let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
            span: requested_at,
        })?;
        debug!(package = name, path = %path.display(), "pushing file");
        self.stack.push(name.to_string());

        let file = self.sources.add(path.display().to_string(), text);
        let text = &self.sources.files()[file.0 as usize].text;
        let (module, next) = parse_source(text, file, self.next_node)?;
        self.next_node = next;

        for (dep, span) in uses(&module) {
            if self.stack.contains(&dep) {
                let mut chain = self.stack.clone();
                chain.push(dep);
                return Err(LoadError::Cycle { chain, span }.into());
            }
            if self.done.contains(&dep) {
                continue;
            }
            let dep_path = package_path(&self.dir, &dep);
            self.load(&dep, &dep_path, Some(span))?;
        }

        self.stack.pop();
        self.done.insert(name.to_string());
        self.units.push(PackageUnit {
            name: name.to_string(),
            module,
        });
        debug!(package = name, "popped file");
        Ok(())
    }
}

/// Load `entry` and every package it uses, transitively.
pub fn load_program(entry: &Path, sources: &mut SourceMap) -> CompileResult<Vec<PackageUnit>> {
    let dir = entry
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut loader = Loader {
        dir,
        sources,
        stack: Vec::new(),
        done: FxHashSet::default(),
        units: Vec::new(),
        next_node: 0,
    };
    loader.load(ENTRY_PACKAGE, entry, None)?;
    Ok(loader.units)
}

/// Read and parse the entry file alone.
pub fn load_entry(entry: &Path, sources: &mut SourceMap) -> CompileResult<Module> {
    let text = fs::read_to_string(entry).map_err(|source| LoadError::Io {
        path: entry.to_path_buf(),
        source,
        span: None,
    })?;
    let file = sources.add(entry.display().to_string(), text);
    let (module, _) = parse_source(&sources.files()[file.0 as usize].text, file, 0)?;
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CompileError;
    use pretty_assertions::assert_eq;

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, text).expect("write source");
        path
    }

    #[test]
    fn package_paths_sit_next_to_the_entry() {
        let path = package_path(Path::new("/project"), "geo");
        assert_eq!(path, PathBuf::from("/project/geo.vs"));
    }

    #[test]
    fn dependencies_come_before_their_users() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "base.vs", "fn one() int { return 1; }");
        write(dir.path(), "mid.vs", "use base; fn two() int { return 2; }");
        let entry = write(dir.path(), "main.vs", "use mid; use base; fn main() {}");
        let mut sources = SourceMap::default();
        let units = load_program(&entry, &mut sources).unwrap();
        let names: Vec<&str> = units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["base", "mid", "main"]);
        assert_eq!(sources.files().len(), 3);
    }

    #[test]
    fn cycles_are_reported_with_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.vs", "use b;");
        write(dir.path(), "b.vs", "use a;");
        let entry = write(dir.path(), "main.vs", "use a; fn main() {}");
        let mut sources = SourceMap::default();
        match load_program(&entry, &mut sources) {
            Err(CompileError::Load(LoadError::Cycle { chain, .. })) => {
                assert_eq!(chain, vec!["main", "a", "b", "a"]);
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn missing_packages_point_at_the_use() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write(dir.path(), "main.vs", "use nowhere; fn main() {}");
        let mut sources = SourceMap::default();
        let err = load_program(&entry, &mut sources).unwrap_err();
        let span = err.span().expect("span of the use");
        assert_eq!(&sources.files()[0].text[span.start..span.end], "nowhere");
    }
}
