pub mod codegen;
pub mod errors;
pub mod lexer;
pub mod loader;
pub mod parser;
pub mod semantic;
pub mod span;

use std::path::Path;

use tracing::info;

use errors::CompileResult;
use loader::SourceMap;
use parser::ast::Module;

/// Parse the entry file alone, without loading the packages it uses.
pub fn parse_file(path: &Path, sources: &mut SourceMap) -> CompileResult<Module> {
    loader::load_entry(path, sources)
}

/// Compile `path` and every package it uses into one C translation unit.
/// Files read along the way are recorded in `sources` for diagnostics.
pub fn compile_file(path: &Path, sources: &mut SourceMap) -> CompileResult<String> {
    let units = loader::load_program(path, sources)?;
    info!(packages = units.len(), "loaded sources");
    let prog = semantic::analyze(units)?;
    Ok(codegen::generate_c(&prog)?)
}

/// Compile a single in-memory source file.
pub fn compile_source(name: &str, text: &str, sources: &mut SourceMap) -> CompileResult<String> {
    let file = sources.add(name, text);
    let (module, _) = parser::parse_source(text, file, 0)?;
    let prog = semantic::analyze(vec![semantic::PackageUnit {
        name: loader::ENTRY_PACKAGE.to_string(),
        module,
    }])?;
    Ok(codegen::generate_c(&prog)?)
}
