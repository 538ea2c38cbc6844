use zion::compiler::Compiler;
use zion::ir::exec::Machine;
use zion::ir::reader::read_module;

fn run_program(source: &str) -> i64 {
    let mut compiler = Compiler::new();
    compiler.no_std_lib = false;
    assert!(
        compiler.compile_source("pipeline", source),
        "compilation failed: {:?}",
        compiler.status.diagnostics()
    );

    let modules = compiler.ir_modules();
    let mut machine = Machine::new(&modules);
    machine.run("main").expect("program should run")
}

#[test]
fn test_arithmetic_main_end_to_end() {
    let code = run_program(concat!(
        "module app\n",
        "def main() int\n",
        "\treturn 40 + 2\n",
    ));

    assert_eq!(42, code);
}

#[test]
fn test_while_loop_end_to_end() {
    let code = run_program(concat!(
        "module looper\n",
        "def main() int\n",
        "\tvar total int = 0\n",
        "\ti := 0\n",
        "\twhile i < 5\n",
        "\t\ttotal = total + i\n",
        "\t\ti = i + 1\n",
        "\treturn total\n",
    ));

    assert_eq!(10, code);
}

#[test]
fn test_module_var_initialization_end_to_end() {
    let code = run_program(concat!(
        "module counters\n",
        "var base int = 30\n",
        "def main() int\n",
        "\treturn base + 12\n",
    ));

    assert_eq!(42, code);
}

#[test]
fn test_maybe_narrowing_end_to_end() {
    let code = run_program(concat!(
        "module narrow\n",
        "def pick(x int?) int\n",
        "\tif y := x\n",
        "\t\treturn y\n",
        "\treturn 0\n",
        "def main() int\n",
        "\treturn pick(3)\n",
    ));

    assert_eq!(3, code);
}

#[test]
fn test_pattern_dispatch_end_to_end() {
    let code = run_program(concat!(
        "module shapes\n",
        "type shape is Circle(int) or Square(int)\n",
        "def classify(s shape) int\n",
        "\twhen s\n",
        "\t\tis Circle\n",
        "\t\t\treturn 1\n",
        "\t\tis Square\n",
        "\t\t\treturn 2\n",
        "\t\telse\n",
        "\t\t\treturn 3\n",
        "def main() int\n",
        "\treturn classify(Square(7))\n",
    ));

    assert_eq!(2, code);
}

#[test]
fn test_struct_members_end_to_end() {
    let code = run_program(concat!(
        "module points\n",
        "type point has\n",
        "\tvar x int\n",
        "\tvar y int\n",
        "def main() int\n",
        "\tp := point(40, 2)\n",
        "\treturn p.x + p.y\n",
    ));

    assert_eq!(42, code);
}

#[test]
fn test_generic_instantiations_are_memoized() {
    let mut compiler = Compiler::new();
    compiler.no_std_lib = false;
    let ok = compiler.compile_source(
        "generics",
        concat!(
            "module generics\n",
            "def id(x any) any\n",
            "\treturn x\n",
            "def main() int\n",
            "\ta := id(3)\n",
            "\tb := id(4)\n",
            "\tprint(id(\"s\"))\n",
            "\treturn a + b\n",
        ),
    );
    assert!(ok, "{:?}", compiler.status.diagnostics());

    let ir = compiler.scopes.ir_modules.get("generics").unwrap();
    let instantiations: Vec<&str> = ir
        .functions
        .iter()
        .map(|f| f.name.as_str())
        .filter(|name| name.starts_with("generics.id"))
        .collect();

    // one instantiation per distinct argument signature, not per callsite
    assert_eq!(2, instantiations.len(), "got: {instantiations:?}");

    let modules = compiler.ir_modules();
    let mut machine = Machine::new(&modules);
    assert_eq!(7, machine.run("main").unwrap());
    assert_eq!("s\n", machine.output);
}

#[test]
fn test_elaboration_is_deterministic() {
    let source = concat!(
        "module det\n",
        "type pair has\n",
        "\tvar a int\n",
        "\tvar b str\n",
        "def main() int\n",
        "\tp := pair(1, \"one\")\n",
        "\treturn p.a\n",
    );

    let render = |source: &str| {
        let mut compiler = Compiler::new();
        compiler.no_std_lib = false;
        assert!(compiler.compile_source("det", source));
        compiler
            .ir_modules()
            .iter()
            .map(|module| module.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    };

    assert_eq!(render(source), render(source));
}

#[test]
fn test_emitted_ir_survives_the_reader() {
    let mut compiler = Compiler::new();
    compiler.no_std_lib = false;
    assert!(compiler.compile_source(
        "readback",
        concat!(
            "module readback\n",
            "var greeting str = \"hey\"\n",
            "def main() int\n",
            "\tprint(greeting)\n",
            "\treturn 0\n",
        ),
    ));

    for module in compiler.ir_modules() {
        let text = module.to_string();
        let reparsed = read_module(&text)
            .unwrap_or_else(|e| panic!("reader rejected emitted IR: {e}\n{text}"));
        assert_eq!(module, reparsed);
    }
}

#[test]
fn test_release_emitted_for_managed_block_local() {
    let mut compiler = Compiler::new();
    compiler.no_std_lib = false;
    assert!(compiler.compile_source(
        "managed",
        concat!(
            "module managed\n",
            "def shout(s str) str\n",
            "\tcopy := s + \"!\"\n",
            "\treturn \"done\"\n",
        ),
    ));

    let ir = compiler.scopes.ir_modules.get("managed").unwrap();
    let function = ir
        .functions
        .iter()
        .find(|f| f.name == "managed.shout")
        .unwrap();

    let releases = function
        .blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .filter(|i| {
            matches!(i, zion::ir::Instruction::Call { callee, .. } if callee == "__release_var")
        })
        .count();
    assert!(releases > 0, "managed local should be released:\n{function}");
}

#[test]
fn test_type_error_produces_nonzero_diagnostics() {
    let mut compiler = Compiler::new();
    compiler.no_std_lib = false;
    let ok = compiler.compile_source(
        "bad",
        "module bad\ndef f() int\n\treturn \"nope\"\n",
    );

    assert!(!ok);
    assert!(!compiler.status.diagnostics().is_empty());
}
