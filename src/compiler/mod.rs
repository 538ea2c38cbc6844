use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, error, trace};

use crate::atom::AtomTable;
use crate::checker;
use crate::diagnostics::Status;
use crate::ir::exec::Machine;
use crate::ir::IrModule;
use crate::lexer::Lexer;
use crate::parser::ast::{Module, Program};
use crate::parser::ParseState;
use crate::scopes::Scopes;
use crate::types::Gensym;

/// The compiler driver: module discovery, phase orchestration, and the
/// backend handoff. One `Compiler` is one independent compilation; nothing
/// is shared between instances.
pub struct Compiler {
    pub atoms: AtomTable,
    pub status: Status,
    pub scopes: Scopes,
    pub gensym: Gensym,
    pub program: Program,
    pub no_std_lib: bool,
    zion_paths: Vec<PathBuf>,
    base_type_macros: HashMap<String, String>,
    /// Real path -> module name, for the uniqueness key of §module loading.
    loaded_paths: BTreeMap<PathBuf, String>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        let zion_paths = std::env::var("ZION_PATH")
            .unwrap_or_else(|_| ".".to_string())
            .split(':')
            .filter(|part| !part.is_empty())
            .map(PathBuf::from)
            .collect();

        let no_std_lib = std::env::var("NO_STD_LIB").is_ok();

        let mut base_type_macros = HashMap::new();
        if !no_std_lib {
            // the standard aliases resolve container names to their
            // defining modules
            base_type_macros.insert("vector".to_string(), "vector.vector".to_string());
            base_type_macros.insert("map".to_string(), "map.map".to_string());
        }

        Self {
            atoms: AtomTable::default(),
            status: Status::new(),
            scopes: Scopes::new(),
            gensym: Gensym::default(),
            program: Program::default(),
            no_std_lib,
            zion_paths,
            base_type_macros,
            loaded_paths: BTreeMap::new(),
        }
    }

    /// Map a module name to a source file: `a.b.c` becomes
    /// `<path>/a/b/c.zion` for each entry of the search path. A name that is
    /// already a `.zion` path resolving to a real file short-circuits.
    /// Two distinct real paths matching the same name is an error.
    pub fn resolve_module_filename(&self, module_name: &str) -> Result<PathBuf, String> {
        if module_name.ends_with(".zion") {
            if let Ok(real) = fs::canonicalize(module_name) {
                return Ok(real);
            }
        }

        let relative = format!("{}.zion", module_name.replace('.', "/"));
        let mut found: Vec<PathBuf> = vec![];
        for path in &self.zion_paths {
            let candidate = path.join(&relative);
            if let Ok(real) = fs::canonicalize(&candidate) {
                if !found.contains(&real) {
                    found.push(real);
                }
            }
        }

        match found.len() {
            0 => Err(format!(
                "module '{module_name}' not found in ZION_PATH ({paths})",
                paths = self
                    .zion_paths
                    .iter()
                    .map(|p| p.to_string_lossy().to_string())
                    .collect::<Vec<_>>()
                    .join(":")
            )),
            1 => Ok(found.into_iter().next().unwrap()),
            _ => Err(format!(
                "module '{module_name}' is ambiguous: found {paths}",
                paths = found
                    .iter()
                    .map(|p| p.to_string_lossy().to_string())
                    .collect::<Vec<_>>()
                    .join(" and ")
            )),
        }
    }

    /// Parse the entry module and, recursively, every `link module`
    /// dependency, keyed uniquely by real path, in the order encountered.
    pub fn build_parse_modules(&mut self, entry: &str) -> bool {
        match self.resolve_module_filename(entry) {
            Ok(path) => {
                self.build_parse_file(&path);
            }
            Err(message) => {
                self.status
                    .error(crate::location::Location::builtin(), message);
            }
        }
        self.status.ok()
    }

    fn build_parse_file(&mut self, path: &Path) {
        if self.loaded_paths.contains_key(path) {
            trace!("already loaded {}", path.display());
            return;
        }

        debug!("loading module from {}", path.display());
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(io_error) => {
                self.status.error(
                    crate::location::Location::builtin(),
                    format!("could not read '{}': {io_error}", path.display()),
                );
                return;
            }
        };

        let filename = self.atoms.intern(&path.to_string_lossy());
        let Some(module) = self.parse_one_module(&source, filename) else {
            return;
        };

        self.loaded_paths
            .insert(path.to_path_buf(), module.decl.name.clone());

        let links: Vec<String> = module
            .linked_modules
            .iter()
            .map(|link| link.decl.name.clone())
            .collect();
        self.program.modules.push(module);

        for link in links {
            match self.resolve_module_filename(&link) {
                Ok(link_path) => self.build_parse_file(&link_path),
                Err(message) => {
                    self.status
                        .error(crate::location::Location::builtin(), message);
                }
            }
        }
    }

    fn parse_one_module(&mut self, source: &str, filename: crate::atom::Atom) -> Option<Module> {
        let lexed = match Lexer::new(filename.clone(), source).lex_with_comments() {
            Ok(lexed) => lexed,
            Err(lex_error) => {
                self.status.error(lex_error.location, lex_error.message);
                return None;
            }
        };

        let mut ps =
            ParseState::with_type_macros(lexed.tokens, self.base_type_macros.clone());
        match Module::parse(&mut ps, filename) {
            Ok(module) => Some(module),
            Err(parse_error) => {
                self.status.error(parse_error.location, parse_error.message);
                None
            }
        }
    }

    /// Compile a module given directly as source text; the path taken by the
    /// internal test corpus.
    pub fn compile_source(&mut self, name: &str, source: &str) -> bool {
        let filename = self.atoms.intern(&format!("{name}.zion"));
        if let Some(module) = self.parse_one_module(source, filename) {
            self.program.modules.push(module);
            self.type_check();
        }
        self.status.ok()
    }

    /// Run phases 0 through 3 over the loaded program.
    pub fn type_check(&mut self) {
        checker::type_check_program(
            &self.program,
            &mut self.scopes,
            &mut self.status,
            &mut self.gensym,
            self.no_std_lib,
        );
    }

    /// Resolve, parse, and type-check an entry module.
    pub fn compile(&mut self, entry: &str) -> bool {
        if !self.build_parse_modules(entry) {
            return false;
        }
        self.type_check();
        self.status.ok()
    }

    pub fn ir_modules(&self) -> Vec<IrModule> {
        self.scopes.ir_modules.values().cloned().collect()
    }

    /// Backend handoff: write one `.llir` file per IR module into `dir` and
    /// return the written paths.
    pub fn emit_ir(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut written = vec![];
        for (name, module) in &self.scopes.ir_modules {
            let path = dir.join(format!("{name}.llir"));
            fs::write(&path, module.to_string())?;
            written.push(path);
        }
        Ok(written)
    }

    /// Execute the compiled program in-process. Returns the exit code.
    pub fn run(&mut self, entry: &str) -> Result<i64, String> {
        if !self.compile(entry) {
            return Err("compilation failed".to_string());
        }

        let modules = self.ir_modules();
        let mut machine = Machine::new(&modules);

        let entry_fn = if machine.has_function("main") {
            "main".to_string()
        } else {
            // NO_STD_LIB builds run the user's main directly, after the
            // module initializers
            let Some(module) = self.program.modules.first() else {
                return Err("nothing to run".to_string());
            };
            if machine.has_function("__init_module_vars") {
                machine
                    .call("__init_module_vars", vec![])
                    .map_err(|e| e.to_string())?;
            }
            format!("{}.main", module.decl.name)
        };

        let code = machine.run(&entry_fn).map_err(|e| e.to_string())?;
        print!("{}", machine.output);
        Ok(code)
    }

    /// Link the emitted objects into an executable using the configured C
    /// compiler. The invocation itself is outside the core; failures are
    /// reported verbatim.
    pub fn link_executable(&self, objects: &[PathBuf], output: &str) -> Result<(), String> {
        let cc = std::env::var("LLVM_CLANG_BIN").unwrap_or_else(|_| "cc".to_string());
        let extra = std::env::var("ZION_LINK").unwrap_or_default();

        let mut command = Command::new(&cc);
        command.arg("-o").arg(output);
        for object in objects {
            command.arg(object);
        }
        for flag in extra.split_whitespace() {
            command.arg(flag);
        }

        debug!("linking with {cc}");
        match command.status() {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(format!("{cc} exited with {status}")),
            Err(io_error) => {
                error!("could not invoke '{cc}'");
                Err(format!("could not invoke '{cc}': {io_error}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_compiler() -> Compiler {
        let mut compiler = Compiler::new();
        // tests must not depend on ambient environment
        compiler.no_std_lib = false;
        compiler
    }

    #[test]
    fn test_compile_minimal_module() {
        let mut compiler = fresh_compiler();

        assert!(compiler.compile_source("minimal", "module minimal @0.1.0\n"));
        assert_eq!(1, compiler.program.modules.len());
        assert_eq!("minimal", compiler.program.modules[0].decl.name);

        // an empty module still produces an (empty) IR module
        let ir = compiler.scopes.ir_modules.get("minimal").unwrap();
        assert!(ir.functions.is_empty());
    }

    #[test]
    fn test_compile_arithmetic() {
        let mut compiler = fresh_compiler();

        let ok = compiler.compile_source(
            "arith",
            "module arith\ndef f() int\n\treturn 1 + 2\n",
        );
        assert!(ok, "{:?}", compiler.status.diagnostics());

        let ir = compiler.scopes.ir_modules.get("arith").unwrap();
        let function = ir
            .functions
            .iter()
            .find(|f| f.name == "arith.f")
            .expect("arith.f should have been emitted");

        let calls_plus = function.blocks.iter().any(|block| {
            block.instructions.iter().any(|i| {
                matches!(i, crate::ir::Instruction::Call { callee, .. } if callee == "__plus__")
            })
        });
        assert!(calls_plus);
        assert_eq!(crate::ir::IrType::I64, function.ret);
    }

    #[test]
    fn test_type_error_latches_status() {
        let mut compiler = fresh_compiler();

        let ok = compiler.compile_source(
            "bad",
            "module bad\ndef f() int\n\treturn \"no\"\n",
        );
        assert!(!ok);
    }

    #[test]
    fn test_run_arithmetic_main() {
        let mut compiler = fresh_compiler();
        assert!(compiler.compile_source(
            "app",
            "module app\ndef main() int\n\treturn 40 + 2\n",
        ));

        let modules = compiler.ir_modules();
        let mut machine = Machine::new(&modules);
        assert_eq!(42, machine.run("main").unwrap());
    }
}
