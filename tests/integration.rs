use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use vsc::loader::SourceMap;

/// The C compiler to check generated code with, if one is installed.
fn c_compiler() -> Option<String> {
    let cc = env::var("CC").unwrap_or_else(|_| "cc".to_string());
    let version = Command::new(&cc).arg("--version").output().ok()?;
    version.status.success().then_some(cc)
}

fn write_source(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).expect("failed to write source");
    path
}

/// Compile `main.vs` (plus any `packages`) to C, build it, and run it.
/// Returns `None` when no C compiler is available.
fn run_program(main: &str, packages: &[(&str, &str)]) -> Option<(String, i32)> {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    for (name, text) in packages {
        write_source(dir.path(), &format!("{name}.vs"), text);
    }
    let entry = write_source(dir.path(), "main.vs", main);

    let mut sources = SourceMap::default();
    let c_code = match vsc::compile_file(&entry, &mut sources) {
        Ok(c_code) => c_code,
        Err(err) => panic!("compilation failed: {err}"),
    };

    let Some(cc) = c_compiler() else {
        eprintln!("no C compiler found, skipping native build");
        return None;
    };
    let c_path = dir.path().join("out.c");
    let exe_path = dir.path().join("out");
    fs::write(&c_path, &c_code).expect("failed to write C output");

    let build = Command::new(&cc)
        .args(["-std=c11", "-w", "-o"])
        .arg(&exe_path)
        .arg(&c_path)
        .output()
        .expect("failed to run the C compiler");
    assert!(
        build.status.success(),
        "C build failed:\n{}\n--- generated ---\n{c_code}",
        String::from_utf8_lossy(&build.stderr),
    );

    let run = Command::new(&exe_path)
        .output()
        .expect("failed to execute compiled binary");
    let stdout = String::from_utf8_lossy(&run.stdout).into_owned();
    Some((stdout, run.status.code().unwrap_or(-1)))
}

fn assert_runs(main: &str, expected_stdout: &str, expected_code: i32) {
    assert_runs_with(main, &[], expected_stdout, expected_code);
}

fn assert_runs_with(
    main: &str,
    packages: &[(&str, &str)],
    expected_stdout: &str,
    expected_code: i32,
) {
    let Some((stdout, code)) = run_program(main, packages) else {
        return;
    };
    assert_eq!(stdout, expected_stdout, "stdout mismatch");
    assert_eq!(code, expected_code, "exit code mismatch");
}

#[test]
fn exit_code_comes_from_main() {
    assert_runs(
        "fn add(a int, b int) int { return a + b; }
         fn main() int { return add(1, 2); }",
        "",
        3,
    );
}

#[test]
fn hello() {
    assert_runs(
        r#"fn main() { println("Hello, World!"); }"#,
        "Hello, World!\n",
        0,
    );
}

#[test]
fn struct_string_members_can_be_reassigned() {
    assert_runs(
        r#"type Holder struct { label string }
           fn main() int {
               h := Holder{label: "first"};
               h.label = "second";
               println(h.label);
               return 0;
           }"#,
        "second\n",
        0,
    );
}

#[test]
fn polymorphs_are_instantiated_per_type() {
    assert_runs(
        r#"fn identity<$T>(x $T) $T { return x; }
           fn main() int {
               s := identity("poly");
               println(s);
               return identity(7);
           }"#,
        "poly\n",
        7,
    );
}

#[test]
fn strings_compare_concatenate_and_slice() {
    assert_runs(
        r#"fn main() int {
               a := "ab";
               b := a + "c";
               if b == "abc" { println("eq"); }
               if b != "abd" { println("ne"); }
               println(b[1:3]);
               println(itoa(b.length));
               return 0;
           }"#,
        "eq\nne\nbc\n3\n",
        0,
    );
}

#[test]
fn string_equality_checks_length_and_content() {
    assert_runs(
        r#"fn main() int {
               x := "a";
               y := "b";
               a := x + y;
               b := y + x;
               c := a + "c";
               d := x + "b";
               if a == "ab" { println("lit same"); }
               if a == "ba" { println("lit swapped"); }
               if a == "abc" { println("lit longer"); }
               if a == d { println("same"); }
               if a == b { println("swapped"); }
               if a == c { println("longer"); }
               if c != a { println("differ"); }
               return 0;
           }"#,
        "lit same\nsame\ndiffer\n",
        0,
    );
}

#[test]
fn borrowed_reference_alongside_an_owner_elsewhere() {
    assert_runs(
        "type Foo struct { n int }
         fn make() int { p := new Foo; p.n = 2; return p.n; }
         fn main() int { f := Foo{n: 7}; r &Foo = &f; x := make(); return r.n + x; }",
        "",
        9,
    );
}

#[test]
fn owner_lent_to_a_borrowing_parameter() {
    assert_runs(
        "type Foo struct { n int }
         fn peek(f &Foo) int { return f.n; }
         fn main() int { p := new Foo; p.n = 4; return peek(p); }",
        "",
        4,
    );
}

#[test]
fn loops_over_views_and_static_arrays() {
    assert_runs(
        "fn sum(xs ...int) int {
             total := 0;
             for x in xs { total = total + x; }
             return total;
         }
         fn main() int {
             nums := [1, 2, 3];
             fixed [2]int = [10, 20];
             t := 0;
             for i, v in fixed { t = t + v * (i + 1); }
             return sum(nums...) + sum(4, 5) + t;
         }",
        "",
        65,
    );
}

#[test]
fn while_loops_break_early() {
    assert_runs(
        r#"fn main() int {
               i := 0;
               while i < 100 {
                   word := itoa(i);
                   if i == 4 { break; }
                   i = i + 1;
               }
               return i;
           }"#,
        "",
        4,
    );
}

#[test]
fn methods_read_their_receiver() {
    assert_runs(
        "type P struct { x int }
         impl P { fn getx() int { return self.x; } }
         fn main() int { p := P{x: 9}; return p.getx(); }",
        "",
        9,
    );
}

#[test]
fn enum_values_and_names() {
    assert_runs(
        "type Color enum { Red, Green = 5 }
         fn main() int {
             c := Color.Green;
             println(Color.Red.name);
             return c as int;
         }",
        "Red\n",
        5,
    );
}

#[test]
fn type_descriptors_are_ready_before_main() {
    assert_runs(
        "fn main() { t := #type(int); println(t.name); }",
        "int\n",
        0,
    );
}

#[test]
fn packages_are_loaded_from_the_entry_directory() {
    assert_runs_with(
        "use geo;
         fn main() int { p geo.Point = geo.make(2, 3); return p.x * p.y; }",
        &[(
            "geo",
            "type Point struct { x int; y int }
             fn make(x int, y int) Point { return Point{x: x, y: y}; }",
        )],
        "",
        6,
    );
}

#[test]
fn compile_source_needs_no_files() {
    let mut sources = SourceMap::default();
    let c_code = vsc::compile_source("inline.vs", "fn main() int { return 1; }", &mut sources)
        .expect("inline source compiles");
    assert!(c_code.contains("int main(void)"));
    assert_eq!(sources.files().len(), 1);
}

#[test]
fn cli_reports_errors_with_location() {
    let dir = tempfile::tempdir().unwrap();
    let entry = write_source(dir.path(), "bad.vs", "fn main() {\n    x := y;\n}\n");
    let out = Command::new(env!("CARGO_BIN_EXE_vsc"))
        .arg(&entry)
        .output()
        .expect("failed to run vsc");
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    let header = format!("{}:2: Unknown identifier 'y'", entry.display());
    assert!(stderr.contains(&header), "stderr was:\n{stderr}");
}

#[test]
fn cli_writes_c_to_the_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let entry = write_source(dir.path(), "main.vs", "fn main() {}");
    let out_path = dir.path().join("main.c");
    let out = Command::new(env!("CARGO_BIN_EXE_vsc"))
        .arg("-o")
        .arg(&out_path)
        .arg(&entry)
        .output()
        .expect("failed to run vsc");
    assert!(out.status.success());
    assert!(out.stdout.is_empty());
    let c_code = fs::read_to_string(&out_path).unwrap();
    assert!(c_code.contains("int main(void)"));
}

#[test]
fn cli_prints_the_syntax_tree() {
    let dir = tempfile::tempdir().unwrap();
    let entry = write_source(dir.path(), "main.vs", "fn main() {}");
    let out = Command::new(env!("CARGO_BIN_EXE_vsc"))
        .arg("--ast")
        .arg(&entry)
        .output()
        .expect("failed to run vsc");
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Module"));
}
