//! A minimal class-file writer for the JVM.
//!
//! Covers what the emitter needs: a deduplicating constant pool, field and
//! method construction, a stack-tracking method assembler with label
//! patching, `LineNumberTable` and `StackMapTable` generation, and the
//! `BootstrapMethods` attribute for invokedynamic call sites. Class files
//! are written at major version 52 (the first long-term version with
//! invokedynamic in wide use).

use std::collections::HashMap;

pub const MAGIC: u32 = 0xCAFE_BABE;
pub const MAJOR_VERSION: u16 = 52;

// Access flags.
pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SUPER: u16 = 0x0020;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_SYNTHETIC: u16 = 0x1000;

// Method handle kinds.
pub const REF_INVOKE_STATIC: u8 = 6;
pub const REF_INVOKE_VIRTUAL: u8 = 5;

/// A constant pool entry.
#[derive(Clone, Debug, PartialEq)]
enum CpEntry {
    Utf8(String),
    Integer(i32),
    Double(u64),
    Class(u16),
    String(u16),
    Fieldref(u16, u16),
    Methodref(u16, u16),
    InterfaceMethodref(u16, u16),
    NameAndType(u16, u16),
    MethodHandle(u8, u16),
    MethodType(u16),
    InvokeDynamic(u16, u16),
    /// Second slot of an 8-byte constant.
    Placeholder,
}

/// A deduplicating constant pool. Indices are 1-based; doubles occupy two
/// slots.
#[derive(Clone, Debug, Default)]
pub struct ConstantPool {
    entries: Vec<CpEntry>,
    cache: HashMap<String, u16>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, key: String, entry: CpEntry) -> u16 {
        if let Some(&index) = self.cache.get(&key) {
            return index;
        }
        let wide = matches!(entry, CpEntry::Double(_));
        self.entries.push(entry);
        let index = self.entries.len() as u16;
        if wide {
            self.entries.push(CpEntry::Placeholder);
        }
        self.cache.insert(key, index);
        index
    }

    pub fn utf8(&mut self, value: &str) -> u16 {
        self.add(format!("u:{}", value), CpEntry::Utf8(value.to_string()))
    }

    pub fn integer(&mut self, value: i32) -> u16 {
        self.add(format!("i:{}", value), CpEntry::Integer(value))
    }

    pub fn double(&mut self, value: f64) -> u16 {
        let bits = value.to_bits();
        self.add(format!("d:{}", bits), CpEntry::Double(bits))
    }

    pub fn class(&mut self, internal_name: &str) -> u16 {
        let name = self.utf8(internal_name);
        self.add(format!("c:{}", internal_name), CpEntry::Class(name))
    }

    pub fn string(&mut self, value: &str) -> u16 {
        let utf8 = self.utf8(value);
        self.add(format!("s:{}", value), CpEntry::String(utf8))
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_idx = self.utf8(name);
        let desc_idx = self.utf8(descriptor);
        self.add(
            format!("nt:{}:{}", name, descriptor),
            CpEntry::NameAndType(name_idx, desc_idx),
        )
    }

    pub fn fieldref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_idx = self.class(class);
        let nt = self.name_and_type(name, descriptor);
        self.add(
            format!("f:{}:{}:{}", class, name, descriptor),
            CpEntry::Fieldref(class_idx, nt),
        )
    }

    pub fn methodref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_idx = self.class(class);
        let nt = self.name_and_type(name, descriptor);
        self.add(
            format!("m:{}:{}:{}", class, name, descriptor),
            CpEntry::Methodref(class_idx, nt),
        )
    }

    pub fn interface_methodref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_idx = self.class(class);
        let nt = self.name_and_type(name, descriptor);
        self.add(
            format!("im:{}:{}:{}", class, name, descriptor),
            CpEntry::InterfaceMethodref(class_idx, nt),
        )
    }

    pub fn method_handle(&mut self, kind: u8, reference: u16) -> u16 {
        self.add(
            format!("mh:{}:{}", kind, reference),
            CpEntry::MethodHandle(kind, reference),
        )
    }

    pub fn method_type(&mut self, descriptor: &str) -> u16 {
        let desc = self.utf8(descriptor);
        self.add(format!("mt:{}", descriptor), CpEntry::MethodType(desc))
    }

    pub fn invoke_dynamic(&mut self, bootstrap: u16, name: &str, descriptor: &str) -> u16 {
        let nt = self.name_and_type(name, descriptor);
        self.add(
            format!("id:{}:{}:{}", bootstrap, name, descriptor),
            CpEntry::InvokeDynamic(bootstrap, nt),
        )
    }

    fn write(&self, out: &mut Vec<u8>) {
        write_u16(out, self.entries.len() as u16 + 1);
        for entry in &self.entries {
            match entry {
                CpEntry::Utf8(s) => {
                    out.push(1);
                    let bytes = s.as_bytes();
                    write_u16(out, bytes.len() as u16);
                    out.extend_from_slice(bytes);
                }
                CpEntry::Integer(v) => {
                    out.push(3);
                    write_u32(out, *v as u32);
                }
                CpEntry::Double(bits) => {
                    out.push(6);
                    out.extend_from_slice(&bits.to_be_bytes());
                }
                CpEntry::Class(name) => {
                    out.push(7);
                    write_u16(out, *name);
                }
                CpEntry::String(utf8) => {
                    out.push(8);
                    write_u16(out, *utf8);
                }
                CpEntry::Fieldref(class, nt) => {
                    out.push(9);
                    write_u16(out, *class);
                    write_u16(out, *nt);
                }
                CpEntry::Methodref(class, nt) => {
                    out.push(10);
                    write_u16(out, *class);
                    write_u16(out, *nt);
                }
                CpEntry::InterfaceMethodref(class, nt) => {
                    out.push(11);
                    write_u16(out, *class);
                    write_u16(out, *nt);
                }
                CpEntry::NameAndType(name, desc) => {
                    out.push(12);
                    write_u16(out, *name);
                    write_u16(out, *desc);
                }
                CpEntry::MethodHandle(kind, reference) => {
                    out.push(15);
                    out.push(*kind);
                    write_u16(out, *reference);
                }
                CpEntry::MethodType(desc) => {
                    out.push(16);
                    write_u16(out, *desc);
                }
                CpEntry::InvokeDynamic(bsm, nt) => {
                    out.push(18);
                    write_u16(out, *bsm);
                    write_u16(out, *nt);
                }
                CpEntry::Placeholder => {}
            }
        }
    }
}

/// A verification type for stack map frames.
#[derive(Clone, Debug, PartialEq)]
pub enum VType {
    Top,
    Integer,
    Double,
    Null,
    UninitializedThis,
    Object(String),
    Uninitialized(u16),
}

impl VType {
    /// The number of local/stack slots this type occupies.
    fn slots(&self) -> u16 {
        match self {
            VType::Double => 2,
            _ => 1,
        }
    }

    fn write(&self, pool: &mut ConstantPool, out: &mut Vec<u8>) {
        match self {
            VType::Top => out.push(0),
            VType::Integer => out.push(1),
            VType::Double => out.push(3),
            VType::Null => out.push(5),
            VType::UninitializedThis => out.push(6),
            VType::Object(name) => {
                out.push(7);
                let idx = pool.class(name);
                write_u16(out, idx);
            }
            VType::Uninitialized(offset) => {
                out.push(8);
                write_u16(out, *offset);
            }
        }
    }
}

/// A symbolic frame: local slots and operand stack.
#[derive(Clone, Debug, PartialEq, Default)]
struct Frame {
    locals: Vec<VType>,
    stack: Vec<VType>,
}

impl Frame {
    fn stack_slots(&self) -> u16 {
        self.stack.iter().map(VType::slots).sum()
    }
}

/// A branch target. Created with [`CodeBuilder::new_label`], bound once
/// with [`CodeBuilder::bind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Clone, Debug, Default)]
struct LabelState {
    pc: Option<u16>,
    /// The frame every jump to this label must agree on.
    frame: Option<Frame>,
}

/// A field in a class file.
#[derive(Clone, Debug)]
struct FieldInfo {
    access: u16,
    name: u16,
    descriptor: u16,
}

/// A method in a class file.
#[derive(Clone, Debug)]
struct MethodInfo {
    access: u16,
    name: u16,
    descriptor: u16,
    code: Option<CodeAttribute>,
}

#[derive(Clone, Debug)]
struct CodeAttribute {
    max_stack: u16,
    max_locals: u16,
    code: Vec<u8>,
    line_numbers: Vec<(u16, u16)>,
    frames: Vec<(u16, Frame)>,
}

/// A bootstrap method entry: the factory handle plus its static arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct BootstrapMethod {
    pub method_handle: u16,
    pub arguments: Vec<u16>,
}

/// An in-memory class file under construction.
#[derive(Debug)]
pub struct ClassFile {
    pub pool: ConstantPool,
    access: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<FieldInfo>,
    methods: Vec<MethodInfo>,
    bootstrap_methods: Vec<BootstrapMethod>,
    source_file: Option<u16>,
}

impl ClassFile {
    pub fn new(access: u16, this_class: &str, super_class: &str) -> Self {
        let mut pool = ConstantPool::new();
        let this_idx = pool.class(this_class);
        let super_idx = pool.class(super_class);
        Self {
            pool,
            access,
            this_class: this_idx,
            super_class: super_idx,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            bootstrap_methods: Vec::new(),
            source_file: None,
        }
    }

    pub fn add_interface(&mut self, internal_name: &str) {
        let idx = self.pool.class(internal_name);
        self.interfaces.push(idx);
    }

    pub fn set_source_file(&mut self, file: &str) {
        let idx = self.pool.utf8(file);
        self.source_file = Some(idx);
    }

    pub fn add_field(&mut self, access: u16, name: &str, descriptor: &str) {
        let name = self.pool.utf8(name);
        let descriptor = self.pool.utf8(descriptor);
        self.fields.push(FieldInfo {
            access,
            name,
            descriptor,
        });
    }

    /// Adds a method with a body.
    pub fn add_method(&mut self, access: u16, name: &str, descriptor: &str, code: CodeBuilder) {
        let name = self.pool.utf8(name);
        let descriptor = self.pool.utf8(descriptor);
        self.methods.push(MethodInfo {
            access,
            name,
            descriptor,
            code: Some(code.finish()),
        });
    }

    /// Adds an abstract method signature.
    pub fn add_abstract_method(&mut self, access: u16, name: &str, descriptor: &str) {
        let name = self.pool.utf8(name);
        let descriptor = self.pool.utf8(descriptor);
        self.methods.push(MethodInfo {
            access,
            name,
            descriptor,
            code: None,
        });
    }

    /// Registers a bootstrap method and returns its index for
    /// invokedynamic constants.
    pub fn add_bootstrap_method(&mut self, method_handle: u16, arguments: Vec<u16>) -> u16 {
        let entry = BootstrapMethod {
            method_handle,
            arguments,
        };
        if let Some(pos) = self.bootstrap_methods.iter().position(|b| *b == entry) {
            return pos as u16;
        }
        self.bootstrap_methods.push(entry);
        (self.bootstrap_methods.len() - 1) as u16
    }

    /// Serialises the class file.
    pub fn to_bytes(mut self) -> Vec<u8> {
        // Intern attribute names before the pool is frozen.
        let code_attr = self.pool.utf8("Code");
        let lnt_attr = self.pool.utf8("LineNumberTable");
        let smt_attr = self.pool.utf8("StackMapTable");
        let bsm_attr = if self.bootstrap_methods.is_empty() {
            0
        } else {
            self.pool.utf8("BootstrapMethods")
        };
        let sf_attr = if self.source_file.is_some() {
            self.pool.utf8("SourceFile")
        } else {
            0
        };

        // Serialise method bodies first: stack map frames intern class
        // names into the pool.
        let mut method_blobs = Vec::new();
        for method in &self.methods {
            let mut blob = Vec::new();
            write_u16(&mut blob, method.access);
            write_u16(&mut blob, method.name);
            write_u16(&mut blob, method.descriptor);
            match &method.code {
                Some(code) => {
                    write_u16(&mut blob, 1);
                    write_code_attribute(
                        &mut blob,
                        &mut self.pool,
                        code,
                        code_attr,
                        lnt_attr,
                        smt_attr,
                    );
                }
                None => write_u16(&mut blob, 0),
            }
            method_blobs.push(blob);
        }

        let mut out = Vec::new();
        write_u32(&mut out, MAGIC);
        write_u16(&mut out, 0);
        write_u16(&mut out, MAJOR_VERSION);
        self.pool.write(&mut out);
        write_u16(&mut out, self.access);
        write_u16(&mut out, self.this_class);
        write_u16(&mut out, self.super_class);

        write_u16(&mut out, self.interfaces.len() as u16);
        for interface in &self.interfaces {
            write_u16(&mut out, *interface);
        }

        write_u16(&mut out, self.fields.len() as u16);
        for field in &self.fields {
            write_u16(&mut out, field.access);
            write_u16(&mut out, field.name);
            write_u16(&mut out, field.descriptor);
            write_u16(&mut out, 0);
        }

        write_u16(&mut out, method_blobs.len() as u16);
        for blob in method_blobs {
            out.extend_from_slice(&blob);
        }

        // Class attributes.
        let mut attr_count = 0u16;
        let mut attrs = Vec::new();
        if let Some(source_file) = self.source_file {
            attr_count += 1;
            write_u16(&mut attrs, sf_attr);
            write_u32(&mut attrs, 2);
            write_u16(&mut attrs, source_file);
        }
        if !self.bootstrap_methods.is_empty() {
            attr_count += 1;
            let mut body = Vec::new();
            write_u16(&mut body, self.bootstrap_methods.len() as u16);
            for bsm in &self.bootstrap_methods {
                write_u16(&mut body, bsm.method_handle);
                write_u16(&mut body, bsm.arguments.len() as u16);
                for arg in &bsm.arguments {
                    write_u16(&mut body, *arg);
                }
            }
            write_u16(&mut attrs, bsm_attr);
            write_u32(&mut attrs, body.len() as u32);
            attrs.extend_from_slice(&body);
        }
        write_u16(&mut out, attr_count);
        out.extend_from_slice(&attrs);

        out
    }
}

fn write_code_attribute(
    out: &mut Vec<u8>,
    pool: &mut ConstantPool,
    code: &CodeAttribute,
    code_attr: u16,
    lnt_attr: u16,
    smt_attr: u16,
) {
    let mut body = Vec::new();
    write_u16(&mut body, code.max_stack);
    write_u16(&mut body, code.max_locals);
    write_u32(&mut body, code.code.len() as u32);
    body.extend_from_slice(&code.code);
    write_u16(&mut body, 0); // exception table

    let mut attr_count = 0u16;
    let mut attrs = Vec::new();

    if !code.line_numbers.is_empty() {
        attr_count += 1;
        write_u16(&mut attrs, lnt_attr);
        write_u32(&mut attrs, 2 + 4 * code.line_numbers.len() as u32);
        write_u16(&mut attrs, code.line_numbers.len() as u16);
        for (pc, line) in &code.line_numbers {
            write_u16(&mut attrs, *pc);
            write_u16(&mut attrs, *line);
        }
    }

    if !code.frames.is_empty() {
        attr_count += 1;
        let mut table = Vec::new();
        write_u16(&mut table, code.frames.len() as u16);
        let mut prev_pc: Option<u16> = None;
        for (pc, frame) in &code.frames {
            let delta = match prev_pc {
                None => *pc,
                Some(prev) => pc - prev - 1,
            };
            prev_pc = Some(*pc);
            // Full frames keep the writer simple and are always valid.
            table.push(255);
            write_u16(&mut table, delta);
            let locals = effective_locals(&frame.locals);
            write_u16(&mut table, locals.len() as u16);
            for vtype in &locals {
                vtype.write(pool, &mut table);
            }
            write_u16(&mut table, frame.stack.len() as u16);
            for vtype in &frame.stack {
                vtype.write(pool, &mut table);
            }
        }
        write_u16(&mut attrs, smt_attr);
        write_u32(&mut attrs, table.len() as u32);
        attrs.extend_from_slice(&table);
    }

    write_u16(&mut body, attr_count);
    body.extend_from_slice(&attrs);

    write_u16(out, code_attr);
    write_u32(out, body.len() as u32);
    out.extend_from_slice(&body);
}

/// Collapses the slot-indexed local array into frame entries: the slot
/// after a double is implicit, and trailing Tops are trimmed.
fn effective_locals(locals: &[VType]) -> Vec<VType> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < locals.len() {
        let vtype = locals[i].clone();
        let wide = vtype == VType::Double;
        out.push(vtype);
        i += if wide { 2 } else { 1 };
    }
    while out.last() == Some(&VType::Top) {
        out.pop();
    }
    out
}

/// Comparison conditions for integer branches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Cond {
    fn if_icmp_opcode(self) -> u8 {
        match self {
            Cond::Eq => 0x9f,
            Cond::Ne => 0xa0,
            Cond::Lt => 0xa1,
            Cond::Ge => 0xa2,
            Cond::Gt => 0xa3,
            Cond::Le => 0xa4,
        }
    }

    fn if_opcode(self) -> u8 {
        match self {
            Cond::Eq => 0x99,
            Cond::Ne => 0x9a,
            Cond::Lt => 0x9b,
            Cond::Ge => 0x9c,
            Cond::Gt => 0x9d,
            Cond::Le => 0x9e,
        }
    }
}

/// A stack-tracking bytecode assembler for one method body.
///
/// Every instruction helper updates a symbolic frame (local and operand
/// verification types); binding a label records the frame for the
/// `StackMapTable`. Branches snapshot the frame they expect at their
/// target, which restores reachability after unconditional control flow.
#[derive(Debug)]
pub struct CodeBuilder {
    code: Vec<u8>,
    frame: Frame,
    max_stack: u16,
    max_locals: u16,
    labels: Vec<LabelState>,
    fixups: Vec<(usize, Label)>,
    line_numbers: Vec<(u16, u16)>,
    reachable: bool,
}

impl CodeBuilder {
    /// Starts a method body. `locals` is the initial local-variable frame:
    /// the receiver (or `UninitializedThis` in a constructor) followed by
    /// the parameters, with wide types followed by an explicit `Top`.
    pub fn new(locals: Vec<VType>) -> Self {
        // Wide types arrive with their explicit Top slot, so the length is
        // the slot count.
        let max_locals = locals.len() as u16;
        Self {
            code: Vec::new(),
            frame: Frame {
                locals,
                stack: Vec::new(),
            },
            max_stack: 0,
            max_locals,
            labels: Vec::new(),
            fixups: Vec::new(),
            line_numbers: Vec::new(),
            reachable: true,
        }
    }

    pub fn pc(&self) -> u16 {
        self.code.len() as u16
    }

    /// Records a source line for the next instruction.
    pub fn line(&mut self, line: u16) {
        if self.line_numbers.last().map(|(_, l)| *l) != Some(line) {
            let pc = self.pc();
            self.line_numbers.push((pc, line));
        }
    }

    /// Reserves a local slot for a value of the given type and returns it.
    /// The slot reads as Top until the first store into it.
    pub fn reserve_local(&mut self, vtype: &VType) -> u16 {
        let slot = self.frame.locals.len() as u16;
        self.frame.locals.push(VType::Top);
        if vtype.slots() == 2 {
            self.frame.locals.push(VType::Top);
        }
        self.max_locals = self.max_locals.max(slot + vtype.slots());
        slot
    }

    fn push(&mut self, vtype: VType) {
        self.frame.stack.push(vtype);
        self.max_stack = self.max_stack.max(self.frame.stack_slots());
    }

    fn pop(&mut self) -> VType {
        self.frame.stack.pop().unwrap_or(VType::Top)
    }

    fn set_local(&mut self, slot: u16, vtype: VType) {
        let slot = slot as usize;
        let wide = vtype == VType::Double;
        while self.frame.locals.len() <= slot + usize::from(wide) {
            self.frame.locals.push(VType::Top);
        }
        self.frame.locals[slot] = vtype;
        if wide {
            self.frame.locals[slot + 1] = VType::Top;
        }
        self.max_locals = self
            .max_locals
            .max(slot as u16 + 1 + u16::from(wide));
    }

    fn local(&self, slot: u16) -> VType {
        self.frame
            .locals
            .get(slot as usize)
            .cloned()
            .unwrap_or(VType::Top)
    }

    /// Overrides the verification type of the value on top of the stack;
    /// used to widen branch results to their unified type so that merge
    /// points agree.
    pub fn retype_top(&mut self, vtype: VType) {
        if let Some(top) = self.frame.stack.last_mut() {
            *top = vtype;
        }
    }

    /// Overrides the verification type of a local slot. A constructor
    /// calls this after its superclass `<init>`, where slot 0 becomes the
    /// class under construction rather than the superclass.
    pub fn retype_local(&mut self, slot: u16, vtype: VType) {
        if let Some(local) = self.frame.locals.get_mut(slot as usize) {
            *local = vtype;
        }
    }

    // ---- labels and branches ----

    pub fn new_label(&mut self) -> Label {
        self.labels.push(LabelState::default());
        Label(self.labels.len() - 1)
    }

    fn record_jump(&mut self, label: Label) {
        let frame = self.frame.clone();
        let state = &mut self.labels[label.0];
        if state.frame.is_none() {
            state.frame = Some(frame);
        }
    }

    /// Binds a label to the current position and records a stack map
    /// frame for it.
    pub fn bind(&mut self, label: Label) {
        let pc = self.pc();
        if !self.reachable {
            if let Some(frame) = self.labels[label.0].frame.clone() {
                self.frame = frame;
            }
            self.reachable = true;
        } else if self.labels[label.0].frame.is_none() {
            self.labels[label.0].frame = Some(self.frame.clone());
        }
        self.labels[label.0].pc = Some(pc);
    }

    fn branch(&mut self, opcode: u8, label: Label) {
        self.code.push(opcode);
        self.fixups.push((self.code.len(), label));
        self.code.extend_from_slice(&[0, 0]);
        self.record_jump(label);
    }

    pub fn if_icmp(&mut self, cond: Cond, label: Label) {
        self.pop();
        self.pop();
        self.branch(cond.if_icmp_opcode(), label);
    }

    pub fn if_cond(&mut self, cond: Cond, label: Label) {
        self.pop();
        self.branch(cond.if_opcode(), label);
    }

    pub fn if_acmp(&mut self, equal: bool, label: Label) {
        self.pop();
        self.pop();
        self.branch(if equal { 0xa5 } else { 0xa6 }, label);
    }

    pub fn goto(&mut self, label: Label) {
        self.branch(0xa7, label);
        self.reachable = false;
    }

    // ---- constants ----

    /// Loads a small integer constant without touching the pool; the
    /// caller guarantees the value fits in 16 bits.
    pub fn iconst(&mut self, value: i32) {
        debug_assert!((-32768..=32767).contains(&value), "use ldc_int instead");
        match value {
            -1 => self.code.push(0x02),
            0..=5 => self.code.push(0x03 + value as u8),
            -128..=127 => {
                self.code.push(0x10);
                self.code.push(value as i8 as u8);
            }
            _ => {
                self.code.push(0x11);
                self.code.extend_from_slice(&(value as i16).to_be_bytes());
            }
        }
        self.push(VType::Integer);
    }

    /// Loads any 32-bit integer constant, through the pool when it does
    /// not fit a short form.
    pub fn ldc_int(&mut self, pool: &mut ConstantPool, value: i32) {
        if (-32768..=32767).contains(&value) {
            self.iconst(value);
            return;
        }
        let index = pool.integer(value);
        self.ldc_index(index);
        self.push(VType::Integer);
    }

    pub fn dconst(&mut self, pool: &mut ConstantPool, value: f64) {
        if value == 0.0 && value.is_sign_positive() {
            self.code.push(0x0e);
        } else if value == 1.0 {
            self.code.push(0x0f);
        } else {
            let index = pool.double(value);
            self.code.push(0x14); // ldc2_w
            self.code.extend_from_slice(&index.to_be_bytes());
        }
        self.push(VType::Double);
    }

    pub fn ldc_string(&mut self, pool: &mut ConstantPool, value: &str) {
        let index = pool.string(value);
        self.ldc_index(index);
        self.push(VType::Object("java/lang/String".to_string()));
    }

    pub fn ldc_class(&mut self, pool: &mut ConstantPool, internal_name: &str) {
        let index = pool.class(internal_name);
        self.ldc_index(index);
        self.push(VType::Object("java/lang/Class".to_string()));
    }

    fn ldc_index(&mut self, index: u16) {
        if index <= 0xff {
            self.code.push(0x12);
            self.code.push(index as u8);
        } else {
            self.code.push(0x13); // ldc_w
            self.code.extend_from_slice(&index.to_be_bytes());
        }
    }

    pub fn aconst_null(&mut self) {
        self.code.push(0x01);
        self.push(VType::Null);
    }

    // ---- locals ----

    pub fn iload(&mut self, slot: u16) {
        self.load_op(0x1a, 0x15, slot);
        self.push(VType::Integer);
    }

    pub fn dload(&mut self, slot: u16) {
        self.load_op(0x26, 0x18, slot);
        self.push(VType::Double);
    }

    pub fn aload(&mut self, slot: u16) {
        let vtype = self.local(slot);
        self.load_op(0x2a, 0x19, slot);
        self.push(vtype);
    }

    pub fn istore(&mut self, slot: u16) {
        self.pop();
        self.store_op(0x3b, 0x36, slot);
        self.set_local(slot, VType::Integer);
    }

    pub fn dstore(&mut self, slot: u16) {
        self.pop();
        self.store_op(0x47, 0x39, slot);
        self.set_local(slot, VType::Double);
    }

    pub fn astore(&mut self, slot: u16) {
        let vtype = self.pop();
        self.store_op(0x4b, 0x3a, slot);
        self.set_local(slot, vtype);
    }

    fn load_op(&mut self, short_base: u8, long_op: u8, slot: u16) {
        if slot <= 3 {
            self.code.push(short_base + slot as u8);
        } else if slot <= 0xff {
            self.code.push(long_op);
            self.code.push(slot as u8);
        } else {
            self.code.push(0xc4); // wide
            self.code.push(long_op);
            self.code.extend_from_slice(&slot.to_be_bytes());
        }
    }

    fn store_op(&mut self, short_base: u8, long_op: u8, slot: u16) {
        if slot <= 3 {
            self.code.push(short_base + slot as u8);
        } else if slot <= 0xff {
            self.code.push(long_op);
            self.code.push(slot as u8);
        } else {
            self.code.push(0xc4);
            self.code.push(long_op);
            self.code.extend_from_slice(&slot.to_be_bytes());
        }
    }

    // ---- arithmetic ----

    pub fn int_arith(&mut self, opcode: u8) {
        self.pop();
        self.pop();
        self.code.push(opcode);
        self.push(VType::Integer);
    }

    pub fn double_arith(&mut self, opcode: u8) {
        self.pop();
        self.pop();
        self.code.push(opcode);
        self.push(VType::Double);
    }

    pub fn ineg(&mut self) {
        self.code.push(0x74);
    }

    pub fn dneg(&mut self) {
        self.code.push(0x77);
    }

    pub fn i2d(&mut self) {
        self.pop();
        self.code.push(0x87);
        self.push(VType::Double);
    }

    pub fn ixor(&mut self) {
        self.pop();
        self.pop();
        self.code.push(0x82);
        self.push(VType::Integer);
    }

    pub fn dcmpl(&mut self) {
        self.pop();
        self.pop();
        self.code.push(0x97);
        self.push(VType::Integer);
    }

    // ---- stack shuffling ----

    pub fn dup(&mut self) {
        let top = self.frame.stack.last().cloned().unwrap_or(VType::Top);
        self.code.push(0x59);
        self.push(top);
    }

    pub fn swap(&mut self) {
        let a = self.pop();
        let b = self.pop();
        self.code.push(0x5f);
        self.push(a);
        self.push(b);
    }

    pub fn pop_value(&mut self) {
        let top = self.pop();
        self.code.push(if top == VType::Double { 0x58 } else { 0x57 });
    }

    // ---- objects, fields, arrays ----

    pub fn new_object(&mut self, pool: &mut ConstantPool, class: &str) {
        let pc = self.pc();
        let index = pool.class(class);
        self.code.push(0xbb);
        self.code.extend_from_slice(&index.to_be_bytes());
        self.push(VType::Uninitialized(pc));
    }

    pub fn checkcast(&mut self, pool: &mut ConstantPool, class: &str) {
        let index = pool.class(class);
        self.pop();
        self.code.push(0xc0);
        self.code.extend_from_slice(&index.to_be_bytes());
        self.push(VType::Object(class.to_string()));
    }

    pub fn anewarray(&mut self, pool: &mut ConstantPool, class: &str) {
        let index = pool.class(class);
        self.pop();
        self.code.push(0xbd);
        self.code.extend_from_slice(&index.to_be_bytes());
        self.push(VType::Object(format!("[L{};", class)));
    }

    pub fn aastore(&mut self) {
        self.pop();
        self.pop();
        self.pop();
        self.code.push(0x53);
    }

    pub fn getstatic(&mut self, pool: &mut ConstantPool, class: &str, name: &str, desc: &str) {
        let index = pool.fieldref(class, name, desc);
        self.code.push(0xb2);
        self.code.extend_from_slice(&index.to_be_bytes());
        self.push(vtype_of_descriptor(desc));
    }

    pub fn putstatic(&mut self, pool: &mut ConstantPool, class: &str, name: &str, desc: &str) {
        let index = pool.fieldref(class, name, desc);
        self.pop();
        self.code.push(0xb3);
        self.code.extend_from_slice(&index.to_be_bytes());
    }

    pub fn getfield(&mut self, pool: &mut ConstantPool, class: &str, name: &str, desc: &str) {
        let index = pool.fieldref(class, name, desc);
        self.pop();
        self.code.push(0xb4);
        self.code.extend_from_slice(&index.to_be_bytes());
        self.push(vtype_of_descriptor(desc));
    }

    pub fn putfield(&mut self, pool: &mut ConstantPool, class: &str, name: &str, desc: &str) {
        let index = pool.fieldref(class, name, desc);
        self.pop();
        self.pop();
        self.code.push(0xb5);
        self.code.extend_from_slice(&index.to_be_bytes());
    }

    // ---- calls ----

    pub fn invokestatic(&mut self, pool: &mut ConstantPool, class: &str, name: &str, desc: &str) {
        let index = pool.methodref(class, name, desc);
        self.apply_descriptor(desc, false);
        self.code.push(0xb8);
        self.code.extend_from_slice(&index.to_be_bytes());
    }

    pub fn invokevirtual(&mut self, pool: &mut ConstantPool, class: &str, name: &str, desc: &str) {
        let index = pool.methodref(class, name, desc);
        self.apply_descriptor(desc, true);
        self.code.push(0xb6);
        self.code.extend_from_slice(&index.to_be_bytes());
    }

    pub fn invokespecial(&mut self, pool: &mut ConstantPool, class: &str, name: &str, desc: &str) {
        let index = pool.methodref(class, name, desc);
        let (params, ret) = parse_descriptor(desc);
        for _ in 0..params.len() {
            self.pop();
        }
        let receiver = self.pop();
        if name == "<init>" {
            self.initialize(receiver, class);
        }
        if let Some(ret) = ret {
            self.push(ret);
        }
        self.code.push(0xb7);
        self.code.extend_from_slice(&index.to_be_bytes());
    }

    pub fn invokeinterface(
        &mut self,
        pool: &mut ConstantPool,
        class: &str,
        name: &str,
        desc: &str,
    ) {
        let index = pool.interface_methodref(class, name, desc);
        let (params, _) = parse_descriptor(desc);
        let count: u16 = 1 + params.iter().map(VType::slots).sum::<u16>();
        self.apply_descriptor(desc, true);
        self.code.push(0xb9);
        self.code.extend_from_slice(&index.to_be_bytes());
        self.code.push(count as u8);
        self.code.push(0);
    }

    pub fn invokedynamic(&mut self, pool: &mut ConstantPool, bsm: u16, name: &str, desc: &str) {
        let index = pool.invoke_dynamic(bsm, name, desc);
        self.apply_descriptor(desc, false);
        self.code.push(0xba);
        self.code.extend_from_slice(&index.to_be_bytes());
        self.code.push(0);
        self.code.push(0);
    }

    fn apply_descriptor(&mut self, desc: &str, has_receiver: bool) {
        let (params, ret) = parse_descriptor(desc);
        for _ in 0..params.len() {
            self.pop();
        }
        if has_receiver {
            self.pop();
        }
        if let Some(ret) = ret {
            self.push(ret);
        }
    }

    /// Replaces an uninitialised reference with the constructed class
    /// throughout the frame after its `<init>` call.
    fn initialize(&mut self, receiver: VType, class: &str) {
        let replacement = VType::Object(class.to_string());
        let matches_receiver = |v: &VType| *v == receiver;
        if matches!(
            receiver,
            VType::Uninitialized(_) | VType::UninitializedThis
        ) {
            for slot in self.frame.locals.iter_mut() {
                if matches_receiver(slot) {
                    *slot = replacement.clone();
                }
            }
            for value in self.frame.stack.iter_mut() {
                if matches_receiver(value) {
                    *value = replacement.clone();
                }
            }
        }
    }

    // ---- returns ----

    pub fn ireturn(&mut self) {
        self.pop();
        self.code.push(0xac);
        self.reachable = false;
    }

    pub fn dreturn(&mut self) {
        self.pop();
        self.code.push(0xaf);
        self.reachable = false;
    }

    pub fn areturn(&mut self) {
        self.pop();
        self.code.push(0xb0);
        self.reachable = false;
    }

    pub fn return_(&mut self) {
        self.code.push(0xb1);
        self.reachable = false;
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable
    }

    // ---- finishing ----

    fn finish(mut self) -> CodeAttribute {
        // Patch branch offsets.
        for (offset, label) in &self.fixups {
            let target = self.labels[label.0]
                .pc
                .expect("every branched-to label must be bound");
            let source = (*offset - 1) as i32;
            let rel = target as i32 - source;
            let bytes = (rel as i16).to_be_bytes();
            self.code[*offset] = bytes[0];
            self.code[*offset + 1] = bytes[1];
        }

        // Collect stack map frames at bound labels, in pc order.
        let mut frames: Vec<(u16, Frame)> = self
            .labels
            .iter()
            .filter_map(|state| match (state.pc, &state.frame) {
                (Some(pc), Some(frame)) => Some((pc, frame.clone())),
                _ => None,
            })
            .collect();
        frames.sort_by_key(|(pc, _)| *pc);
        frames.dedup_by_key(|(pc, _)| *pc);

        CodeAttribute {
            max_stack: self.max_stack,
            max_locals: self.max_locals,
            code: self.code,
            line_numbers: self.line_numbers,
            frames,
        }
    }
}

/// Parses a method descriptor into parameter and return verification
/// types.
pub fn parse_descriptor(desc: &str) -> (Vec<VType>, Option<VType>) {
    let bytes = desc.as_bytes();
    debug_assert_eq!(bytes[0], b'(');
    let mut params = Vec::new();
    let mut i = 1;
    while bytes[i] != b')' {
        let (vtype, next) = parse_field_type(desc, i);
        params.push(vtype);
        i = next;
    }
    i += 1;
    let ret = if bytes[i] == b'V' {
        None
    } else {
        Some(parse_field_type(desc, i).0)
    };
    (params, ret)
}

fn parse_field_type(desc: &str, start: usize) -> (VType, usize) {
    let bytes = desc.as_bytes();
    match bytes[start] {
        b'I' | b'Z' | b'B' | b'C' | b'S' => (VType::Integer, start + 1),
        b'D' => (VType::Double, start + 1),
        b'L' => {
            let end = desc[start..].find(';').expect("malformed descriptor") + start;
            (
                VType::Object(desc[start + 1..end].to_string()),
                end + 1,
            )
        }
        b'[' => {
            let (_, end) = parse_field_type(desc, start + 1);
            (VType::Object(desc[start..end].to_string()), end)
        }
        other => panic!("unsupported descriptor element: {}", other as char),
    }
}

fn vtype_of_descriptor(desc: &str) -> VType {
    parse_field_type(desc, 0).0
}

fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_dedup() {
        let mut pool = ConstantPool::new();
        let a = pool.utf8("hello");
        let b = pool.utf8("hello");
        assert_eq!(a, b);
        let c = pool.class("java/lang/Object");
        let d = pool.class("java/lang/Object");
        assert_eq!(c, d);
    }

    #[test]
    fn test_double_takes_two_slots() {
        let mut pool = ConstantPool::new();
        let a = pool.double(3.14);
        let b = pool.utf8("after");
        assert_eq!(b, a + 2);
    }

    #[test]
    fn test_magic_and_version() {
        let class = ClassFile::new(ACC_PUBLIC | ACC_SUPER, "Test", "java/lang/Object");
        let bytes = class.to_bytes();
        assert_eq!(&bytes[0..4], &[0xca, 0xfe, 0xba, 0xbe]);
        assert_eq!(&bytes[4..8], &[0, 0, 0, MAJOR_VERSION as u8]);
    }

    #[test]
    fn test_simple_method_assembles() {
        let mut class = ClassFile::new(ACC_PUBLIC | ACC_SUPER, "Adder", "java/lang/Object");
        let mut code = CodeBuilder::new(vec![VType::Integer, VType::Integer]);
        code.iload(0);
        code.iload(1);
        code.int_arith(0x60); // iadd
        code.ireturn();
        class.add_method(ACC_PUBLIC | ACC_STATIC, "add", "(II)I", code);
        let bytes = class.to_bytes();
        // iload_0, iload_1, iadd, ireturn
        let needle = [0x1a, 0x1b, 0x60, 0xac];
        assert!(bytes.windows(4).any(|w| w == needle));
    }

    #[test]
    fn test_branch_patching() {
        let mut code = CodeBuilder::new(vec![VType::Integer]);
        let end = code.new_label();
        code.iload(0);
        code.if_cond(Cond::Eq, end); // pc 1..4
        code.iconst(1);
        code.istore(0);
        code.bind(end);
        code.return_();
        let attr = code.finish();
        // The ifeq at pc 1 must jump to the bind point at pc 6.
        assert_eq!(attr.code[1], 0x99);
        let offset = i16::from_be_bytes([attr.code[2], attr.code[3]]);
        assert_eq!(offset, 5);
        assert_eq!(attr.frames.len(), 1);
        assert_eq!(attr.frames[0].0, 6);
    }

    #[test]
    fn test_stack_tracking() {
        let mut code = CodeBuilder::new(vec![]);
        code.iconst(1);
        code.iconst(2);
        code.int_arith(0x60);
        code.ireturn();
        let attr = code.finish();
        assert_eq!(attr.max_stack, 2);
    }

    #[test]
    fn test_descriptor_parsing() {
        let (params, ret) = parse_descriptor("(ILjava/lang/String;D)Ljava/lang/Object;");
        assert_eq!(params.len(), 3);
        assert_eq!(params[0], VType::Integer);
        assert_eq!(params[1], VType::Object("java/lang/String".to_string()));
        assert_eq!(params[2], VType::Double);
        assert_eq!(ret, Some(VType::Object("java/lang/Object".to_string())));

        let (params, ret) = parse_descriptor("()V");
        assert!(params.is_empty());
        assert_eq!(ret, None);
    }

    #[test]
    fn test_effective_locals_collapse_double() {
        let locals = vec![VType::Double, VType::Top, VType::Integer];
        assert_eq!(
            effective_locals(&locals),
            vec![VType::Double, VType::Integer]
        );
    }
}
