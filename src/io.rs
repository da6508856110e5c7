//! File loading, ports and the I/O primitives.
//!
//! A [`Port`] owns one buffered file handle. Cloning a port shares the handle; the file is
//! released when the port is closed or when the last clone is dropped, whichever comes
//! first. Output ports flush on close and on drop.
//!
//! I/O primitives use the same calling convention as the rest of the primitive library and
//! are installed into the root environment by [`crate::create_global_env`]. They differ
//! only in how they print (`<IO primitive>`).

use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::rc::Rc;

use crate::Error;
use crate::ast::Value;
use crate::builtinops::{BuiltinOp, unpack_string};
use crate::evaluator::apply;
use crate::scheme::{read, read_all};

fn io_error(context: &str, err: &std::io::Error) -> Error {
    Error::DefaultError(format!("{context}: {err}"))
}

/// Read a whole file and parse every expression in it
pub fn load(path: &str) -> Result<Vec<Value>, Error> {
    log::debug!("loading {path}");
    let source =
        fs::read_to_string(path).map_err(|e| io_error(&format!("Could not read {path}"), &e))?;
    read_all(&source)
}

enum PortState {
    Input(BufReader<File>),
    Output(BufWriter<File>),
    Closed,
}

/// Handle to an open file
#[derive(Clone)]
pub struct Port(Rc<RefCell<PortState>>);

impl Port {
    pub fn open_input(path: &str) -> Result<Port, Error> {
        let file = File::open(path).map_err(|e| io_error(&format!("Could not open {path}"), &e))?;
        log::debug!("opened input port on {path}");
        Ok(Port::new(PortState::Input(BufReader::new(file))))
    }

    pub fn open_output(path: &str) -> Result<Port, Error> {
        let file =
            File::create(path).map_err(|e| io_error(&format!("Could not create {path}"), &e))?;
        log::debug!("opened output port on {path}");
        Ok(Port::new(PortState::Output(BufWriter::new(file))))
    }

    fn new(state: PortState) -> Self {
        Port(Rc::new(RefCell::new(state)))
    }

    pub fn is_open(&self) -> bool {
        !matches!(*self.0.borrow(), PortState::Closed)
    }

    /// Release the file handle, flushing pending output. Closing twice is harmless.
    pub fn close(&self) -> Result<(), Error> {
        let state = std::mem::replace(&mut *self.0.borrow_mut(), PortState::Closed);
        match state {
            PortState::Output(mut writer) => {
                log::debug!("closing output port");
                writer.flush().map_err(|e| io_error("Could not flush port", &e))
            }
            PortState::Input(_) => {
                log::debug!("closing input port");
                Ok(())
            }
            PortState::Closed => Ok(()),
        }
    }

    /// Next line without its terminator, or `None` at end of file
    pub fn read_line(&self) -> Result<Option<String>, Error> {
        match &mut *self.0.borrow_mut() {
            PortState::Input(reader) => read_line_from(reader),
            _ => Err(Error::DefaultError("Port is not open for input".into())),
        }
    }

    pub fn write_line(&self, text: &str) -> Result<(), Error> {
        match &mut *self.0.borrow_mut() {
            PortState::Output(writer) => {
                writeln!(writer, "{text}").map_err(|e| io_error("Could not write to port", &e))
            }
            _ => Err(Error::DefaultError("Port is not open for output".into())),
        }
    }
}

impl PartialEq for Port {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

fn read_line_from(reader: &mut impl BufRead) -> Result<Option<String>, Error> {
    let mut line = String::new();
    let count = reader
        .read_line(&mut line)
        .map_err(|e| io_error("Could not read line", &e))?;
    if count == 0 {
        return Ok(None);
    }
    let trimmed = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(trimmed);
    Ok(Some(line))
}

/// Read a line from the given port, or from standard input when there is none
fn next_line(args: &[Value]) -> Result<String, Error> {
    let line = match args {
        [] => read_line_from(&mut std::io::stdin().lock())?,
        [Value::Port(port)] => port.read_line()?,
        [other] => return Err(Error::type_mismatch("port", other)),
        _ => return Err(Error::num_args(1, args)),
    };
    line.ok_or_else(|| Error::DefaultError("End of input".into()))
}

//
// I/O primitive implementations
//

/// `(apply f a b '(c d))` calls `f` with `a b c d`
fn io_apply(args: &[Value]) -> Result<Value, Error> {
    let Some((func, rest)) = args.split_first() else {
        return Err(Error::num_args(1, args));
    };
    match rest.split_last() {
        Some((Value::List(spread), leading)) => {
            let mut call_args = leading.to_vec();
            call_args.extend_from_slice(spread);
            apply(func, &call_args)
        }
        _ => apply(func, rest),
    }
}

fn io_open_input_file(args: &[Value]) -> Result<Value, Error> {
    match args {
        [path] => Port::open_input(&unpack_string(path)?).map(Value::Port),
        _ => Err(Error::num_args(1, args)),
    }
}

fn io_open_output_file(args: &[Value]) -> Result<Value, Error> {
    match args {
        [path] => Port::open_output(&unpack_string(path)?).map(Value::Port),
        _ => Err(Error::num_args(1, args)),
    }
}

fn io_close_port(args: &[Value]) -> Result<Value, Error> {
    match args {
        [Value::Port(port)] => port.close().map(|()| Value::Bool(true)),
        [_] => Ok(Value::Bool(false)),
        _ => Err(Error::num_args(1, args)),
    }
}

fn io_read(args: &[Value]) -> Result<Value, Error> {
    read(&next_line(args)?)
}

fn io_read_line(args: &[Value]) -> Result<Value, Error> {
    next_line(args).map(Value::String)
}

fn io_write(args: &[Value]) -> Result<Value, Error> {
    match args {
        [value] => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{value}").map_err(|e| io_error("Could not write", &e))?;
            Ok(Value::Bool(true))
        }
        [value, Value::Port(port)] => {
            port.write_line(&value.to_string())?;
            Ok(Value::Bool(true))
        }
        [_, other] => Err(Error::type_mismatch("port", other)),
        _ => Err(Error::num_args(1, args)),
    }
}

fn io_read_contents(args: &[Value]) -> Result<Value, Error> {
    match args {
        [path] => {
            let path = unpack_string(path)?;
            fs::read_to_string(&path)
                .map(Value::String)
                .map_err(|e| io_error(&format!("Could not read {path}"), &e))
        }
        _ => Err(Error::num_args(1, args)),
    }
}

fn io_read_all(args: &[Value]) -> Result<Value, Error> {
    match args {
        [path] => load(&unpack_string(path)?).map(Value::List),
        _ => Err(Error::num_args(1, args)),
    }
}

/// Registry of I/O primitives
#[rustfmt::skip]
static IO_OPS: &[BuiltinOp] = &[
    BuiltinOp { name: "apply", func: io_apply },
    BuiltinOp { name: "open-input-file", func: io_open_input_file },
    BuiltinOp { name: "open-output-file", func: io_open_output_file },
    BuiltinOp { name: "close-input-port", func: io_close_port },
    BuiltinOp { name: "close-output-port", func: io_close_port },
    BuiltinOp { name: "read", func: io_read },
    BuiltinOp { name: "read-line", func: io_read_line },
    BuiltinOp { name: "write", func: io_write },
    BuiltinOp { name: "read-contents", func: io_read_contents },
    BuiltinOp { name: "read-all", func: io_read_all },
];

pub(crate) fn get_io_ops() -> &'static [BuiltinOp] {
    IO_OPS
}
