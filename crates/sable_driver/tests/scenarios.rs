//! End-to-end compilation scenarios, checked down to the emitted class
//! names, member names and descriptors. Artifact bytes are additionally
//! run through a structural class-file walk (constant pool and attribute
//! consistency), since no JVM is available to execute them here.

use sable_driver::{CompileError, Driver};
use sable_emit::ClassArtifact;

fn compile(source: &str) -> Vec<ClassArtifact> {
    Driver::new()
        .compile_to_artifacts(source, "scenario.sb")
        .expect("compilation should succeed")
}

fn compile_err(source: &str) -> CompileError {
    Driver::new()
        .compile_to_artifacts(source, "scenario.sb")
        .expect_err("compilation should fail")
}

fn contains(bytes: &[u8], needle: &str) -> bool {
    let needle = needle.as_bytes();
    bytes.windows(needle.len()).any(|w| w == needle)
}

fn artifact<'a>(artifacts: &'a [ClassArtifact], name: &str) -> &'a ClassArtifact {
    artifacts
        .iter()
        .find(|a| a.name == name)
        .unwrap_or_else(|| panic!("missing artifact {}", name))
}

#[test]
fn scenario_add_function() {
    let artifacts = compile("fun add(x: Int, y: Int): Int { x + y }");
    let add = artifact(&artifacts, "add$");
    assert!(contains(&add.bytes, "add"));
    assert!(contains(&add.bytes, "(II)I"));
    validate_class_file(&add.bytes);
}

#[test]
fn scenario_factorial() {
    let artifacts = compile(
        "fun factorial(n: Int): Int { if (n <= 1) { 1 } else { n * factorial(n - 1) } }",
    );
    let factorial = artifact(&artifacts, "factorial$");
    assert!(contains(&factorial.bytes, "factorial"));
    assert!(contains(&factorial.bytes, "(I)I"));
    assert!(contains(&factorial.bytes, "StackMapTable"));
    validate_class_file(&factorial.bytes);
}

#[test]
fn scenario_point_class() {
    let artifacts = compile(
        "class Point(x: Int, y: Int) { fun getX(): Int { x } fun getY(): Int { y } }",
    );
    let point = artifact(&artifacts, "Point");
    assert!(contains(&point.bytes, "<init>"));
    assert!(contains(&point.bytes, "(II)V"));
    assert!(contains(&point.bytes, "getX"));
    assert!(contains(&point.bytes, "getY"));
    assert!(contains(&point.bytes, "()I"));
    validate_class_file(&point.bytes);
}

#[test]
fn scenario_math_object() {
    let artifacts = compile(
        "object Math { fun pi(): Double { 3.14159 } fun square(x: Int): Int { x * x } }",
    );
    let math = artifact(&artifacts, "Math");
    assert!(contains(&math.bytes, "INSTANCE"));
    assert!(contains(&math.bytes, "LMath;"));
    assert!(contains(&math.bytes, "<clinit>"));
    assert!(contains(&math.bytes, "pi"));
    assert!(contains(&math.bytes, "()D"));
    assert!(contains(&math.bytes, "square"));
    validate_class_file(&math.bytes);
}

#[test]
fn scenario_int_extension() {
    let artifacts = compile(
        "extension Int { fun isEven(): Boolean { this % 2 == 0 } fun double(): Int { this * 2 } }",
    );
    let carrier = artifact(&artifacts, "Int$Extension");
    assert!(contains(&carrier.bytes, "isEven"));
    assert!(contains(&carrier.bytes, "(I)Z"));
    assert!(contains(&carrier.bytes, "double"));
    assert!(contains(&carrier.bytes, "(I)I"));
    validate_class_file(&carrier.bytes);
}

#[test]
fn scenario_twice_higher_order() {
    let artifacts = compile(
        "fun twice(f: Int => Int, x: Int): Int { f(f(x)) }\
         fun caller(): Int { twice((x: Int) => x * 2, 3) }",
    );
    let twice = artifact(&artifacts, "twice$");
    assert!(contains(
        &twice.bytes,
        "java/util/function/IntUnaryOperator"
    ));
    assert!(contains(&twice.bytes, "applyAsInt"));
    let caller = artifact(&artifacts, "caller$");
    assert!(contains(&caller.bytes, "lambda$0"));
    assert!(contains(&caller.bytes, "java/lang/invoke/LambdaMetafactory"));
    assert!(contains(&caller.bytes, "BootstrapMethods"));
    validate_class_file(&twice.bytes);
    validate_class_file(&caller.bytes);
}

#[test]
fn scenario_undefined_variable_rejected() {
    let err = compile_err("fun broken(x: Int): Int { undefined_variable + x }");
    let message = err.to_string();
    assert!(message.contains("scenario.sb:1:27"), "got: {}", message);
    assert!(message.contains("undefined_variable"));
}

#[test]
fn unterminated_string_is_a_lex_error() {
    let err = compile_err("fun s(): String { \"oops }");
    assert!(matches!(err, CompileError::Lex(_)));
    assert!(err.to_string().contains("unterminated string"));
}

#[test]
fn unterminated_block_comment_is_a_lex_error() {
    let err = compile_err("fun s(): Int { 1 } /* no end");
    assert!(matches!(err, CompileError::Lex(_)));
    assert!(err.to_string().contains("unterminated block comment"));
}

#[test]
fn writes_class_files_atomically() {
    let dir = std::env::temp_dir().join(format!("sable-test-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);

    let driver = Driver::new();
    let written = driver
        .compile("fun one(): Int { 1 } class Unit2(v: Int)", "m.sb", &dir)
        .unwrap();
    assert_eq!(written.len(), 2);
    assert!(dir.join("one$.class").exists());
    assert!(dir.join("Unit2.class").exists());

    // A failing compile must leave the directory untouched.
    let before: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
    let result = driver.compile("fun broken(): Int { nope }", "m.sb", &dir);
    assert!(result.is_err());
    let after: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
    assert_eq!(before.len(), after.len());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn traits_compile_to_interfaces() {
    let artifacts = compile(
        "trait Named { def name(): String }\
         class Dog(n: String) with Named { fun name(): String { n } }",
    );
    let named = artifact(&artifacts, "Named");
    assert!(contains(&named.bytes, "name"));
    assert!(contains(&named.bytes, "()Ljava/lang/String;"));
    let dog = artifact(&artifacts, "Dog");
    assert!(contains(&dog.bytes, "Named"));
    validate_class_file(&named.bytes);
    validate_class_file(&dog.bytes);
}

#[test]
fn structural_member_access_compiles() {
    let artifacts = compile(
        "class Dog(name: String)\
         fun label(x: { name: String }): String { x.name }",
    );
    let label = artifact(&artifacts, "label$");
    // Structural access falls back to reflection.
    assert!(contains(&label.bytes, "getDeclaredField"));
    validate_class_file(&label.bytes);
}

// ========== structural class-file validation ==========

/// Walks the class file structure: magic, version, a well-formed constant
/// pool, and field/method/attribute tables whose lengths are mutually
/// consistent. Catches malformed serialisation without a JVM.
fn validate_class_file(bytes: &[u8]) {
    let mut r = Reader::new(bytes);
    assert_eq!(r.u32(), 0xCAFE_BABE, "magic");
    let _minor = r.u16();
    let major = r.u16();
    assert_eq!(major, 52, "class file version");

    let cp_count = r.u16();
    let mut i = 1;
    while i < cp_count {
        let tag = r.u8();
        match tag {
            1 => {
                let len = r.u16() as usize;
                r.skip(len);
            }
            3 | 4 => r.skip(4),
            5 | 6 => {
                r.skip(8);
                i += 1;
            }
            7 | 8 | 16 => r.skip(2),
            9 | 10 | 11 | 12 | 18 => r.skip(4),
            15 => r.skip(3),
            other => panic!("unknown constant pool tag {}", other),
        }
        i += 1;
    }

    let _access = r.u16();
    let _this = r.u16();
    let _super = r.u16();
    let interfaces = r.u16();
    r.skip(interfaces as usize * 2);

    let fields = r.u16();
    for _ in 0..fields {
        r.skip(6);
        let attrs = r.u16();
        for _ in 0..attrs {
            r.skip(2);
            let len = r.u32() as usize;
            r.skip(len);
        }
    }

    let methods = r.u16();
    for _ in 0..methods {
        r.skip(6);
        let attrs = r.u16();
        for _ in 0..attrs {
            r.skip(2);
            let len = r.u32() as usize;
            r.skip(len);
        }
    }

    let attrs = r.u16();
    for _ in 0..attrs {
        r.skip(2);
        let len = r.u32() as usize;
        r.skip(len);
    }

    assert!(r.at_end(), "trailing bytes after class structure");
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn u8(&mut self) -> u8 {
        let v = self.bytes[self.pos];
        self.pos += 1;
        v
    }

    fn u16(&mut self) -> u16 {
        let v = u16::from_be_bytes([self.bytes[self.pos], self.bytes[self.pos + 1]]);
        self.pos += 2;
        v
    }

    fn u32(&mut self) -> u32 {
        let v = u32::from_be_bytes([
            self.bytes[self.pos],
            self.bytes[self.pos + 1],
            self.bytes[self.pos + 2],
            self.bytes[self.pos + 3],
        ]);
        self.pos += 4;
        v
    }

    fn skip(&mut self, n: usize) {
        assert!(self.pos + n <= self.bytes.len(), "read past end");
        self.pos += n;
    }

    fn at_end(&self) -> bool {
        self.pos == self.bytes.len()
    }
}
