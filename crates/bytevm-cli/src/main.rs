//! Demo harness for `bytevm`.
//!
//! There is no bytecode compiler in this workspace (§6's external-decoder
//! contract puts one on the host side), so this binary hand-builds a small
//! `Code` object instead of reading a source file, then runs it the way an
//! embedder would: construct a `Vm`, call `run_code`, report the result.

use std::process::ExitCode;
use std::rc::Rc;
use std::time::Instant;

use ahash::AHashMap;

use bytevm::{intern, Arg, Code, CodeFlags, CompareOp, DialectVersion, Instruction, Opcode, RunOutcome, StdoutSink, Value, Vm, VmConfig};

fn demo_code() -> Rc<Code> {
    use Opcode::*;

    let ins = |opcode: Opcode, arg: Arg| Instruction { opcode, arg };

    // Equivalent to:
    //   i = 0
    //   total = 0
    //   while i < 5:
    //       total = total + i
    //       i = i + 1
    //   print total
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
    let line_table = vec![1; instructions.len()];

    Rc::new(Code {
        name: intern("<module>"),
        filename: intern("<bytevm-cli demo>"),
        first_lineno: 1,
        instructions,
        line_table,
        consts: Vec::new(),
        names: Vec::new(),
        varnames: vec![intern("i"), intern("total")],
        cellvars: Vec::new(),
        freevars: Vec::new(),
        argcount: 0,
        kwonlyargcount: 0,
        nlocals: 2,
        stacksize: 4,
        flags: CodeFlags::default(),
        is_generator: false,
        dialect: DialectVersion::V27,
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let code = demo_code();
    let globals = Rc::new(std::cell::RefCell::new(AHashMap::default()));
    let builtins = Rc::new(AHashMap::default());
    let config = VmConfig::new(code.dialect);
    let mut vm = Vm::new(config, Box::new(bytevm::NoImporter), Box::new(StdoutSink));

    let started = Instant::now();
    let outcome = vm.run_code(code, globals, builtins, Vec::new());
    let elapsed = started.elapsed();

    match outcome {
        Ok(Ok(RunOutcome::Value(value))) => {
            eprintln!("ran to completion in {elapsed:?}, returned {}", value.py_repr());
            ExitCode::SUCCESS
        }
        Ok(Ok(RunOutcome::Generator(_))) => {
            eprintln!("demo code object unexpectedly produced a generator");
            ExitCode::FAILURE
        }
        Ok(Err(exc)) => {
            eprintln!("guest exception escaped the module frame after {elapsed:?}: {exc}");
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("interpreter error after {elapsed:?}: {err}");
            ExitCode::FAILURE
        }
    }
}
