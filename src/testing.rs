use colored::Colorize;
use log::debug;

use crate::atom::Atom;
use crate::compiler::Compiler;
use crate::lexer::Lexer;
use crate::parser::parse_source;

/// What a corpus entry is expected to do. A source containing an
/// `# expect-error` comment marker is additionally expected to fail type
/// checking; the marker rides in on the lexer's out-of-band comment sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Parses,
    ParseFails,
    Compiles,
}

struct TestCase {
    name: &'static str,
    source: &'static str,
    expect: Expect,
}

fn corpus() -> Vec<TestCase> {
    vec![
        TestCase {
            name: "test_parse_minimal_module",
            source: "module minimal @0.1.0\n",
            expect: Expect::Parses,
        },
        TestCase {
            name: "test_parse_fizz_buzz",
            source: concat!(
                "module fizzbuzz @1.2.3\n",
                "def main(maximum int) int\n",
                "\tvar i int = 1\n",
                "\twhile i <= maximum\n",
                "\t\tif i % 15 == 0\n",
                "\t\t\tprint(\"fizzbuzz\")\n",
                "\t\t\ti = i + 1\n",
                "\t\t\tcontinue\n",
                "\t\tif i % 3 == 0\n",
                "\t\t\tprint(\"fizz\")\n",
                "\t\tif i % 5 == 0\n",
                "\t\t\tprint(\"buzz\")\n",
                "\t\ti = i + 1\n",
            ),
            expect: Expect::Parses,
        },
        TestCase {
            name: "test_parse_unbalanced_decl_fails",
            source: "module m\ndef f(] int\n\tpass\n",
            expect: Expect::ParseFails,
        },
        TestCase {
            name: "test_parse_empty_block_fails",
            source: "module m\ndef f() int\nreturn 1\n",
            expect: Expect::ParseFails,
        },
        TestCase {
            name: "test_compile_minimal_module",
            source: "module minimal\n",
            expect: Expect::Compiles,
        },
        TestCase {
            name: "test_compile_arithmetic",
            source: "module arith\ndef f() int\n\treturn 1 + 2\n",
            expect: Expect::Compiles,
        },
        TestCase {
            name: "test_compile_module_vars",
            source: concat!(
                "module counters\n",
                "var counter int = 3\n",
                "def get() int\n",
                "\treturn counter\n",
            ),
            expect: Expect::Compiles,
        },
        TestCase {
            name: "test_compile_main",
            source: concat!(
                "module app\n",
                "def main() int\n",
                "\tx := 40\n",
                "\treturn x + 2\n",
            ),
            expect: Expect::Compiles,
        },
        TestCase {
            name: "test_compile_generic_identity",
            source: concat!(
                "module generics\n",
                "def id(x any) any\n",
                "\treturn x\n",
                "def main() int\n",
                "\tprint(id(\"s\"))\n",
                "\treturn id(3)\n",
            ),
            expect: Expect::Compiles,
        },
        TestCase {
            name: "test_compile_maybe_narrowing",
            source: concat!(
                "module narrowing\n",
                "def f(x int?) int\n",
                "\tif y := x\n",
                "\t\treturn y\n",
                "\treturn 0\n",
            ),
            expect: Expect::Compiles,
        },
        TestCase {
            name: "test_compile_product_type",
            source: concat!(
                "module points\n",
                "type point has\n",
                "\tvar x int\n",
                "\tvar y int\n",
                "def main() int\n",
                "\tp := point(3, 4)\n",
                "\treturn p.x\n",
            ),
            expect: Expect::Compiles,
        },
        TestCase {
            name: "test_compile_pattern_dispatch",
            source: concat!(
                "module shapes\n",
                "type shape is Circle(float) or Square(float)\n",
                "def area(s shape) float\n",
                "\twhen s\n",
                "\t\tis Circle\n",
                "\t\t\treturn 3.14\n",
                "\t\tis Square\n",
                "\t\t\treturn 1.0\n",
                "\t\telse\n",
                "\t\t\treturn 0.0\n",
            ),
            expect: Expect::Compiles,
        },
        TestCase {
            name: "test_compile_string_concat",
            source: "module strings\ndef greet(name str) str\n\treturn \"hello \" + name\n",
            expect: Expect::Compiles,
        },
        TestCase {
            name: "test_compile_link_extern_function",
            source: concat!(
                "module ffi\n",
                "link def putstr(s str) int\n",
                "def main() int\n",
                "\treturn putstr(\"hi\")\n",
            ),
            expect: Expect::Compiles,
        },
        TestCase {
            name: "test_undefined_symbol_fails",
            source: concat!(
                "module bad # expect-error\n",
                "def f() int\n",
                "\treturn q\n",
            ),
            expect: Expect::Compiles,
        },
        TestCase {
            name: "test_return_type_mismatch_fails",
            source: concat!(
                "module bad # expect-error\n",
                "def f() int\n",
                "\treturn \"nope\"\n",
            ),
            expect: Expect::Compiles,
        },
        TestCase {
            name: "test_conflicting_redefinition_fails",
            source: concat!(
                "module bad # expect-error\n",
                "def f() int\n",
                "\tx := 1\n",
                "\tx := \"two\"\n",
                "\treturn x\n",
            ),
            expect: Expect::Compiles,
        },
        TestCase {
            name: "test_no_matching_overload_fails",
            source: concat!(
                "module bad # expect-error\n",
                "def f() str\n",
                "\treturn \"a\" + 1\n",
            ),
            expect: Expect::Compiles,
        },
        TestCase {
            name: "test_not_all_paths_return_fails",
            source: concat!(
                "module bad # expect-error\n",
                "def f(c bool) int\n",
                "\tif c\n",
                "\t\treturn 1\n",
                "\tpass\n",
            ),
            expect: Expect::Compiles,
        },
    ]
}

/// Does the source carry an `expect-error` comment marker?
fn expects_error(source: &str) -> bool {
    let Ok(lexed) = Lexer::new(Atom::from("test.zion"), source).lex_with_comments() else {
        return false;
    };
    lexed
        .comments
        .iter()
        .any(|comment| comment.text.contains("expect-error"))
}

fn run_case(case: &TestCase) -> Result<(), String> {
    match case.expect {
        Expect::Parses => match parse_source(case.source, Atom::from("test.zion")) {
            Ok(_) => Ok(()),
            Err(e) => Err(format!("expected a clean parse, got: {e}")),
        },
        Expect::ParseFails => match parse_source(case.source, Atom::from("test.zion")) {
            Ok(_) => Err("expected the parse to fail, but it succeeded".to_string()),
            Err(_) => Ok(()),
        },
        Expect::Compiles => {
            let mut compiler = Compiler::new();
            let ok = compiler.compile_source(case.name, case.source);
            let expect_failure = expects_error(case.source);
            match (ok, expect_failure) {
                (true, false) => Ok(()),
                (false, true) => Ok(()),
                (true, true) => {
                    Err("expected a type error, but the module compiled".to_string())
                }
                (false, false) => Err(format!(
                    "expected a clean compile; diagnostics: {}",
                    compiler
                        .status
                        .diagnostics()
                        .iter()
                        .map(|d| format!("{}: {}", d.location, d.message))
                        .collect::<Vec<_>>()
                        .join("; ")
                )),
            }
        }
    }
}

/// Run the internal test corpus, honoring the `T`, `EXCLUDE`, `MAIN_ONLY`,
/// and `ALL_TESTS` environment switches. Returns true iff every selected
/// test passed.
pub fn run_tests(filter: Option<&str>) -> bool {
    let env_filter = std::env::var("T").ok();
    let excludes: Vec<String> = std::env::var("EXCLUDE")
        .unwrap_or_default()
        .split(',')
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect();
    let main_only = std::env::var("MAIN_ONLY").is_ok();
    let all_tests = std::env::var("ALL_TESTS").is_ok();

    let mut passed = 0usize;
    let mut failed = 0usize;
    let mut skipped = 0usize;

    for case in corpus() {
        let mut selected = true;
        if let Some(filter) = filter {
            selected &= case.name.contains(filter);
        }
        if let Some(env_filter) = &env_filter {
            selected &= case.name.contains(env_filter.as_str());
        }
        if main_only {
            selected &= case.name.contains("main");
        }
        if !all_tests && excludes.iter().any(|pattern| case.name.contains(pattern)) {
            selected = false;
        }

        if !selected {
            skipped += 1;
            continue;
        }

        debug!("running {}", case.name);
        match run_case(&case) {
            Ok(()) => {
                println!("{} {}", "PASS".green(), case.name);
                passed += 1;
            }
            Err(reason) => {
                println!("{} {}: {reason}", "FAIL".red(), case.name);
                failed += 1;
            }
        }
    }

    println!("{passed} passed, {failed} failed, {skipped} skipped");
    failed == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corpus_is_green() {
        for case in corpus() {
            if let Err(reason) = run_case(&case) {
                panic!("{name}: {reason}", name = case.name);
            }
        }
    }

    #[test]
    fn test_expect_error_marker_detection() {
        assert!(expects_error("module m # expect-error\n"));
        assert!(!expects_error("module m # all good\n"));
    }
}
