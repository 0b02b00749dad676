//! Executing archived programs.
//!
//! [`restore`] runs a program in a fresh namespace seeded from `env` and
//! returns the names it leaves bound. Imports resolve against a
//! [`Registry`]; [`restore`] uses [`Registry::standard`].

mod interp;
pub(crate) mod ops;

use std::cell::RefCell;
use std::fmt;
use std::fs;
use std::path::Path;
use std::rc::Weak;

use crate::error::RestoreError;
use crate::expr::{parse_expr, parse_program, Expr, Stmt, UnaryOp};
use crate::object::{Env, Obj};
use crate::registry::Registry;

use interp::Interpreter;

/// A function defined by a `def` statement of a restored program.
pub struct ScriptFunction {
    pub(crate) params: Vec<(String, Option<Obj>)>,
    pub(crate) body: Vec<Stmt>,
    pub(crate) globals: Weak<RefCell<Env>>,
}

impl fmt::Debug for ScriptFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<&str> = self.params.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("ScriptFunction").field("params", &params).finish_non_exhaustive()
    }
}

/// Execute `program` with the standard registry.
///
/// ```
/// use persist::{restore, Env};
///
/// let ns = restore("a = [1, 2]\nb = (a, a)", &Env::new()).unwrap();
/// let b = ns["b"].sequence_items().unwrap();
/// assert!(b[0].is(&b[1]));
/// ```
pub fn restore(program: &str, env: &Env) -> Result<Env, RestoreError> {
    restore_with(&Registry::standard(), program, env)
}

/// Execute `program` against `registry`, starting from a copy of `env`.
///
/// The returned namespace holds every name the program left bound, minus
/// `__builtins__`.
pub fn restore_with(registry: &Registry, program: &str, env: &Env) -> Result<Env, RestoreError> {
    let stmts = parse_program(program)?;
    let interpreter = Interpreter::new(registry, env.clone());
    interpreter.run(&stmts)?;
    let mut namespace = interpreter.into_globals();
    namespace.remove("__builtins__");
    Ok(namespace)
}

/// Execute a saved archive: `<path>/__init__.py` for a package directory, or
/// the file at `path` for a module. `__file__` is bound while it runs so
/// side data is found next to the program.
pub fn load_module(registry: &Registry, path: &Path) -> Result<Env, RestoreError> {
    let file = if path.is_dir() { path.join("__init__.py") } else { path.to_path_buf() };
    let program = fs::read_to_string(&file)?;
    let env = Env::from([("__file__".to_string(), Obj::str(file.display().to_string()))]);
    let mut namespace = restore_with(registry, &program, &env)?;
    namespace.remove("__file__");
    Ok(namespace)
}

fn literal(expr: &Expr) -> Result<Obj, RestoreError> {
    let all = |items: &[Expr]| items.iter().map(literal).collect::<Result<Vec<_>, _>>();
    match expr {
        Expr::None => Ok(Obj::none()),
        Expr::Bool(b) => Ok(Obj::bool(*b)),
        Expr::Int(i) => Ok(Obj::int(*i)),
        Expr::Float(f) => Ok(Obj::float(*f)),
        Expr::Imag(f) => Ok(Obj::complex(0.0, *f)),
        Expr::Str(s) => Ok(Obj::str(s.as_str())),
        Expr::Bytes(b) => Ok(Obj::bytes(b.as_slice())),
        Expr::List(items) => Ok(Obj::list(all(items)?)),
        Expr::Tuple(items) => Ok(Obj::tuple(all(items)?)),
        Expr::Dict(entries) => Ok(Obj::dict(
            entries
                .iter()
                .map(|(k, v)| Ok((literal(k)?, literal(v)?)))
                .collect::<Result<_, RestoreError>>()?,
        )),
        Expr::Unary { op, operand }
            if matches!(**operand, Expr::Int(_) | Expr::Float(_) | Expr::Imag(_)) =>
        {
            ops::unary(*op, &literal(operand)?)
        }
        Expr::Binary { op, left, right } if matches!(**right, Expr::Imag(_)) => {
            let real = match &**left {
                Expr::Int(_) | Expr::Float(_) => literal(left)?,
                Expr::Unary { op: UnaryOp::Neg | UnaryOp::Pos, .. } => literal(left)?,
                _ => return Err(malformed()),
            };
            ops::binary(*op, &real, &literal(right)?)
        }
        _ => Err(malformed()),
    }
}

fn malformed() -> RestoreError {
    RestoreError::Value("malformed node or string".to_string())
}

/// Evaluate a literal: numbers, strings, bytes, `None`, booleans and
/// list/tuple/dict displays of literals. Names and calls are rejected.
pub fn literal_eval(text: &str) -> Result<Obj, RestoreError> {
    literal(&parse_expr(text)?)
}
