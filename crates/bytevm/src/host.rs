//! Host collaborators the VM calls out to but does not implement itself.
//!
//! Per §1's explicit non-goals, the module importer and the object model's
//! attribute/arithmetic machinery are external collaborators. This module
//! defines the narrow traits the dispatch loop needs from them, mirroring
//! how the teacher keeps `PrintWriter` as a trait (`io.rs`) rather than
//! hard-coding `println!` into `builtins::print`.

use crate::exception::GuestException;
use crate::frame::Globals;
use crate::intern::Name;
use crate::value::Value;

/// Resolves `IMPORT_NAME`. A real embedding wires this to its module loader;
/// this crate only defines the call shape (§6: "Host importer (consumed):
/// `__import__(name, globals, locals, fromlist, level) -> module-like
/// value`").
pub trait Importer {
    fn import(
        &mut self,
        name: &Name,
        globals: &Globals,
        fromlist: &[Name],
        level: i64,
    ) -> Result<Value, GuestException>;
}

/// An importer that always fails, for embeddings (and tests) that never
/// exercise `IMPORT_NAME`.
pub struct NoImporter;

impl Importer for NoImporter {
    fn import(
        &mut self,
        name: &Name,
        _globals: &Globals,
        _fromlist: &[Name],
        _level: i64,
    ) -> Result<Value, GuestException> {
        Err(GuestException::new(
            crate::exception::ExcType::ImportError,
            format!("no module named '{name}'"),
        ))
    }
}

/// The sink `PRINT_ITEM`/`print` write through, matching the classic
/// "softspace" protocol (§4.5): callers track their own softspace flag.
pub trait PrintSink {
    fn write_str(&mut self, s: &str);
}

/// Writes to process stdout, the default sink a CLI embedding wants.
pub struct StdoutSink;

impl PrintSink for StdoutSink {
    fn write_str(&mut self, s: &str) {
        use std::io::Write;
        print!("{s}");
        let _ = std::io::stdout().flush();
    }
}

/// Collects everything written to it, for tests that assert on output.
#[derive(Default)]
pub struct BufferSink(pub String);

impl PrintSink for BufferSink {
    fn write_str(&mut self, s: &str) {
        self.0.push_str(s);
    }
}
