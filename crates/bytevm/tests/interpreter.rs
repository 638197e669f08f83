//! End-to-end tests driving whole code objects through `Vm::run_code`.
//!
//! There's no bytecode compiler in this workspace (see `Code`'s module
//! docs), so these build instruction streams by hand instead of compiling
//! source text, then assert on the resulting value/output/exception.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;
use bytevm::value::{HostCallable, Module};
use bytevm::{intern, Arg, Code, CodeFlags, CompareOp, DialectVersion, ExcType, GeneratorResume, Instruction, NoImporter, Opcode, PrintSink, RunOutcome, Value, Vm, VmConfig};

fn ins(opcode: Opcode, arg: Arg) -> Instruction {
    Instruction { opcode, arg }
}

fn code(name: &str, instructions: Vec<Instruction>, varnames: Vec<&str>, dialect: DialectVersion) -> Rc<Code> {
    let line_table = vec![1; instructions.len()];
    Rc::new(Code {
        name: intern(name),
        filename: intern("<test>"),
        first_lineno: 1,
        instructions,
        line_table,
        consts: Vec::new(),
        names: Vec::new(),
        varnames: varnames.into_iter().map(intern).collect(),
        cellvars: Vec::new(),
        freevars: Vec::new(),
        argcount: 0,
        kwonlyargcount: 0,
        nlocals: 0,
        stacksize: 8,
        flags: CodeFlags::default(),
        is_generator: false,
        dialect,
    })
}

/// A print sink that hands its contents back through a shared handle, since
/// `BufferSink` is moved into the `Vm` by value.
#[derive(Clone, Default)]
struct SharedSink(Rc<RefCell<String>>);

impl PrintSink for SharedSink {
    fn write_str(&mut self, s: &str) {
        self.0.borrow_mut().push_str(s);
    }
}

fn new_vm(dialect: DialectVersion) -> Vm {
    Vm::new(VmConfig::new(dialect), Box::new(NoImporter), Box::new(SharedSink::default()))
}

fn run_value(c: Rc<Code>) -> Value {
    let globals = Rc::new(RefCell::new(AHashMap::default()));
    let builtins = Rc::new(AHashMap::default());
    let mut vm = new_vm(c.dialect);
    match vm.run_code(c, globals, builtins, Vec::new()).expect("no host error") {
        Ok(RunOutcome::Value(v)) => v,
        Ok(RunOutcome::Generator(_)) => panic!("expected a plain return, got a generator"),
        Err(exc) => panic!("unexpected guest exception: {exc}"),
    }
}

fn run_expect_raise(c: Rc<Code>) -> ExcType {
    let globals = Rc::new(RefCell::new(AHashMap::default()));
    let builtins = Rc::new(AHashMap::default());
    let mut vm = new_vm(c.dialect);
    let outcome = vm.run_code(c, globals, builtins, Vec::new()).expect("no host error");
    outcome.expect_err("expected a propagating guest exception").exc_type
}

mod arithmetic_and_comparisons {
    use super::*;

    #[test]
    fn loop_accumulates_and_prints() {
        use Opcode::*;
        // i = 0; total = 0
        // while i < 5: total += i; i += 1
        // print total
        let instructions = vec![
            ins(LOAD_CONST, Arg::Const(Value::Int(0))),
            ins(STORE_FAST, Arg::Name(intern("i"))),
            ins(LOAD_CONST, Arg::Const(Value::Int(0))),
            ins(STORE_FAST, Arg::Name(intern("total"))),
            ins(SETUP_LOOP, Arg::Jump(19)),
            ins(LOAD_FAST, Arg::Name(intern("i"))),
            ins(LOAD_CONST, Arg::Const(Value::Int(5))),
            ins(COMPARE_OP, Arg::Compare(CompareOp::Lt)),
            ins(POP_JUMP_IF_FALSE, Arg::Jump(18)),
            ins(LOAD_FAST, Arg::Name(intern("total"))),
            ins(LOAD_FAST, Arg::Name(intern("i"))),
            ins(BINARY_ADD, Arg::None),
            ins(STORE_FAST, Arg::Name(intern("total"))),
            ins(LOAD_FAST, Arg::Name(intern("i"))),
            ins(LOAD_CONST, Arg::Const(Value::Int(1))),
            ins(BINARY_ADD, Arg::None),
            ins(STORE_FAST, Arg::Name(intern("i"))),
            ins(JUMP_ABSOLUTE, Arg::Jump(5)),
            ins(POP_BLOCK, Arg::None),
            ins(LOAD_FAST, Arg::Name(intern("total"))),
            ins(PRINT_ITEM, Arg::None),
            ins(PRINT_NEWLINE, Arg::None),
            ins(LOAD_CONST, Arg::Const(Value::None)),
            ins(RETURN_VALUE, Arg::None),
        ];
        let c = code("<module>", instructions, vec!["i", "total"], DialectVersion::V27);

        let globals = Rc::new(RefCell::new(AHashMap::default()));
        let builtins = Rc::new(AHashMap::default());
        let sink = SharedSink::default();
        let printed = sink.0.clone();
        let mut vm = Vm::new(VmConfig::new(c.dialect), Box::new(NoImporter), Box::new(sink));
        let outcome = vm.run_code(c, globals, builtins, Vec::new()).expect("no host error");
        assert!(matches!(outcome, Ok(RunOutcome::Value(Value::None))));
        assert_eq!(*printed.borrow(), "10\n");
    }

    #[test]
    fn true_division_and_floor_division_agree_with_python() {
        use Opcode::*;
        // (7 / 2 == 3.5) and (7 // 2 == 3)
        let instructions = vec![
            ins(LOAD_CONST, Arg::Const(Value::Int(7))),
            ins(LOAD_CONST, Arg::Const(Value::Int(2))),
            ins(BINARY_TRUE_DIVIDE, Arg::None),
            ins(LOAD_CONST, Arg::Const(Value::Float(3.5))),
            ins(COMPARE_OP, Arg::Compare(CompareOp::Eq)),
            ins(POP_JUMP_IF_FALSE, Arg::Jump(13)),
            ins(LOAD_CONST, Arg::Const(Value::Int(7))),
            ins(LOAD_CONST, Arg::Const(Value::Int(2))),
            ins(BINARY_FLOOR_DIVIDE, Arg::None),
            ins(LOAD_CONST, Arg::Const(Value::Int(3))),
            ins(COMPARE_OP, Arg::Compare(CompareOp::Eq)),
            ins(RETURN_VALUE, Arg::None),
            ins(NOP, Arg::None),
            ins(LOAD_CONST, Arg::Const(Value::Bool(false))),
            ins(RETURN_VALUE, Arg::None),
        ];
        let c = code("<module>", instructions, vec![], DialectVersion::V32);
        assert!(matches!(run_value(c), Value::Bool(true)));
    }

    #[test]
    fn floor_division_by_zero_raises_guest_exception() {
        use Opcode::*;
        let instructions = vec![
            ins(LOAD_CONST, Arg::Const(Value::Int(1))),
            ins(LOAD_CONST, Arg::Const(Value::Int(0))),
            ins(BINARY_FLOOR_DIVIDE, Arg::None),
            ins(RETURN_VALUE, Arg::None),
        ];
        let c = code("<module>", instructions, vec![], DialectVersion::V32);
        assert_eq!(run_expect_raise(c), ExcType::ZeroDivisionError);
    }
}

mod exceptions {
    use super::*;

    #[test]
    fn except_handler_catches_matching_type_and_rebinds_result() {
        use Opcode::*;
        // try:
        //     1 // 0
        // except ZeroDivisionError:
        //     result = "caught"
        // return result
        let instructions = vec![
            ins(SETUP_EXCEPT, Arg::Jump(6)),
            ins(LOAD_CONST, Arg::Const(Value::Int(1))),
            ins(LOAD_CONST, Arg::Const(Value::Int(0))),
            ins(BINARY_FLOOR_DIVIDE, Arg::None),
            ins(POP_BLOCK, Arg::None),
            ins(JUMP_FORWARD, Arg::Jump(18)),
            // handler (index 6): stack holds (tb, value, type)
            ins(DUP_TOP, Arg::None),
            ins(LOAD_CONST, Arg::Const(Value::str("ZeroDivisionError"))),
            ins(COMPARE_OP, Arg::Compare(CompareOp::ExceptionMatch)),
            ins(POP_JUMP_IF_FALSE, Arg::Jump(17)),
            ins(POP_TOP, Arg::None), // type
            ins(POP_TOP, Arg::None), // value
            ins(POP_TOP, Arg::None), // traceback
            ins(POP_BLOCK, Arg::None),
            ins(LOAD_CONST, Arg::Const(Value::str("caught"))),
            ins(STORE_FAST, Arg::Name(intern("result"))),
            ins(JUMP_FORWARD, Arg::Jump(18)),
            ins(END_FINALLY, Arg::None),
            ins(LOAD_FAST, Arg::Name(intern("result"))),
            ins(RETURN_VALUE, Arg::None),
        ];
        let c = code("<module>", instructions, vec!["result"], DialectVersion::V32);
        match run_value(c) {
            Value::Str(s) => assert_eq!(&*s, "caught"),
            other => panic!("expected 'caught', got {other:?}"),
        }
    }

    #[test]
    fn unmatched_type_reraises_past_the_handler() {
        use Opcode::*;
        // try:
        //     1 // 0
        // except TypeError:
        //     pass
        let instructions = vec![
            ins(SETUP_EXCEPT, Arg::Jump(6)),
            ins(LOAD_CONST, Arg::Const(Value::Int(1))),
            ins(LOAD_CONST, Arg::Const(Value::Int(0))),
            ins(BINARY_FLOOR_DIVIDE, Arg::None),
            ins(POP_BLOCK, Arg::None),
            ins(JUMP_FORWARD, Arg::Jump(11)),
            // handler (index 6)
            ins(DUP_TOP, Arg::None),
            ins(LOAD_CONST, Arg::Const(Value::str("TypeError"))),
            ins(COMPARE_OP, Arg::Compare(CompareOp::ExceptionMatch)),
            ins(POP_JUMP_IF_FALSE, Arg::Jump(10)),
            ins(END_FINALLY, Arg::None),
            ins(LOAD_CONST, Arg::Const(Value::None)),
            ins(RETURN_VALUE, Arg::None),
        ];
        let c = code("<module>", instructions, vec![], DialectVersion::V32);
        assert_eq!(run_expect_raise(c), ExcType::ZeroDivisionError);
    }
}

mod finally_blocks {
    use super::*;

    #[test]
    fn return_inside_try_still_runs_finally_before_propagating() {
        use Opcode::*;
        // def f():
        //     try:
        //         return 1
        //     finally:
        //         side = 99
        let instructions = vec![
            ins(SETUP_FINALLY, Arg::Jump(5)),
            ins(LOAD_CONST, Arg::Const(Value::Int(1))),
            ins(RETURN_VALUE, Arg::None),
            ins(POP_BLOCK, Arg::None),
            ins(LOAD_CONST, Arg::Const(Value::None)),
            // finally handler (index 5)
            ins(LOAD_CONST, Arg::Const(Value::Int(99))),
            ins(STORE_FAST, Arg::Name(intern("side"))),
            ins(END_FINALLY, Arg::None),
            ins(LOAD_CONST, Arg::Const(Value::None)),
            ins(RETURN_VALUE, Arg::None),
        ];
        let c = code("<module>", instructions, vec!["side"], DialectVersion::V32);
        assert!(matches!(run_value(c), Value::Int(1)));
    }
}

mod closures {
    use super::*;

    #[test]
    fn store_deref_overwrites_are_visible_through_the_same_cell() {
        use Opcode::*;
        // Models a cell shared between an enclosing scope and a nested
        // closure: writing through STORE_DEREF twice, then reading back,
        // must see the last write.
        let instructions = vec![
            ins(LOAD_CONST, Arg::Const(Value::Int(5))),
            ins(STORE_DEREF, Arg::Slot(0)),
            ins(LOAD_CONST, Arg::Const(Value::Int(10))),
            ins(STORE_DEREF, Arg::Slot(0)),
            ins(LOAD_DEREF, Arg::Slot(0)),
            ins(RETURN_VALUE, Arg::None),
        ];
        let mut c = (*code("<module>", instructions, vec![], DialectVersion::V32)).clone();
        c.cellvars = vec![intern("n")];
        assert!(matches!(run_value(Rc::new(c)), Value::Int(10)));
    }
}

mod generators {
    use super::*;

    #[test]
    fn yields_each_value_then_raises_stop_iteration() {
        use Opcode::*;
        // def gen():
        //     yield 1
        //     yield 2
        let instructions = vec![
            ins(LOAD_CONST, Arg::Const(Value::Int(1))),
            ins(YIELD_VALUE, Arg::None),
            ins(POP_TOP, Arg::None),
            ins(LOAD_CONST, Arg::Const(Value::Int(2))),
            ins(YIELD_VALUE, Arg::None),
            ins(POP_TOP, Arg::None),
            ins(LOAD_CONST, Arg::Const(Value::None)),
            ins(RETURN_VALUE, Arg::None),
        ];
        let mut c = (*code("gen", instructions, vec![], DialectVersion::V32)).clone();
        c.is_generator = true;
        c.flags.generator = true;
        let c = Rc::new(c);

        let globals = Rc::new(RefCell::new(AHashMap::default()));
        let builtins = Rc::new(AHashMap::default());
        let mut vm = new_vm(c.dialect);
        let handle = match vm.run_code(c, globals, builtins, Vec::new()).expect("no host error") {
            Ok(RunOutcome::Generator(h)) => h,
            other => panic!("expected a generator handle, got {other:?}"),
        };

        assert!(matches!(vm.resume_generator(&handle, Value::None).unwrap(), GeneratorResume::Yielded(Value::Int(1))));
        assert!(matches!(vm.resume_generator(&handle, Value::None).unwrap(), GeneratorResume::Yielded(Value::Int(2))));
        assert!(matches!(vm.resume_generator(&handle, Value::None).unwrap(), GeneratorResume::Returned(Value::None)));
        assert!(matches!(vm.resume_generator(&handle, Value::None).unwrap(), GeneratorResume::Raised(ExcType::StopIteration, _)));
    }
}

mod context_managers {
    use super::*;

    fn host_fn(name: &str, f: impl Fn(&[Value], &[(Value, Value)]) -> Result<Value, (ExcType, String)> + 'static) -> Value {
        Value::HostCallable(HostCallable { name: intern(name), f: Rc::new(f) })
    }

    #[test]
    fn with_cleanup_suppresses_exception_when_exit_returns_true() {
        use Opcode::*;
        // A minimal stand-in "context manager": a Module value whose
        // __enter__/__exit__ are host callables. Building a real class
        // instance is out of scope (object-model construction isn't part of
        // this core); Module is the simplest value with an attribute dict
        // `py_getattr` already knows how to read.
        let ctxmgr = Value::Module(Rc::new(Module {
            name: intern("ctx"),
            dict: RefCell::new(vec![
                (intern("__enter__"), host_fn("__enter__", |_a, _k| Ok(Value::None))),
                (intern("__exit__"), host_fn("__exit__", |_a, _k| Ok(Value::Bool(true)))),
            ]),
        }));

        let instructions = vec![
            ins(LOAD_CONST, Arg::Const(ctxmgr)),
            ins(SETUP_WITH, Arg::Jump(6)),
            ins(POP_TOP, Arg::None), // discard __enter__'s result
            ins(LOAD_CONST, Arg::Const(Value::Int(1))),
            ins(LOAD_CONST, Arg::Const(Value::Int(0))),
            ins(BINARY_FLOOR_DIVIDE, Arg::None), // raises ZeroDivisionError
            // handler (index 6)
            ins(WITH_CLEANUP, Arg::None),
            ins(END_FINALLY, Arg::None),
            ins(LOAD_CONST, Arg::Const(Value::str("survived"))),
            ins(RETURN_VALUE, Arg::None),
        ];
        let c = code("<module>", instructions, vec![], DialectVersion::V32);
        match run_value(c) {
            Value::Str(s) => assert_eq!(&*s, "survived"),
            other => panic!("expected the exception to be suppressed, got {other:?}"),
        }
    }
}
