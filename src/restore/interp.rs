//! Tree-walking interpreter for archived programs.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::RestoreError;
use crate::expr::{Expr, ImportName, Stmt};
use crate::object::{CallArgs, Env, Function, Obj};
use crate::registry::Registry;

use super::{ops, ScriptFunction};

enum Flow {
    Next,
    Return(Obj),
}

pub(crate) struct Interpreter<'r> {
    registry: &'r Registry,
    globals: Rc<RefCell<Env>>,
}

impl<'r> Interpreter<'r> {
    pub(crate) fn new(registry: &'r Registry, globals: Env) -> Self {
        Self { registry, globals: Rc::new(RefCell::new(globals)) }
    }

    /// Execute a module-level program.
    pub(crate) fn run(&self, program: &[Stmt]) -> Result<(), RestoreError> {
        let builtins = match self.registry.module("builtins") {
            Some(module) => module.handle().clone(),
            None => Obj::module("builtins"),
        };
        self.globals.borrow_mut().entry("__builtins__".to_string()).or_insert(builtins);
        match self.exec_block(program, None)? {
            Flow::Next => Ok(()),
            Flow::Return(_) => Err(RestoreError::ReturnOutsideFunction),
        }
    }

    pub(crate) fn into_globals(self) -> Env {
        match Rc::try_unwrap(self.globals) {
            Ok(cell) => cell.into_inner(),
            Err(shared) => shared.borrow().clone(),
        }
    }

    fn exec_block(
        &self,
        stmts: &[Stmt],
        mut locals: Option<&mut Env>,
    ) -> Result<Flow, RestoreError> {
        for stmt in stmts {
            if let Flow::Return(value) = self.exec(stmt, locals.as_deref_mut())? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Next)
    }

    fn bind(&self, locals: Option<&mut Env>, name: &str, value: Obj) {
        match locals {
            Some(locals) => {
                locals.insert(name.to_string(), value);
            }
            None => {
                self.globals.borrow_mut().insert(name.to_string(), value);
            }
        }
    }

    fn exec(&self, stmt: &Stmt, mut locals: Option<&mut Env>) -> Result<Flow, RestoreError> {
        match stmt {
            Stmt::Import(names) => {
                for ImportName { name, alias } in names {
                    let module = self
                        .registry
                        .module(name)
                        .ok_or_else(|| RestoreError::Import(format!("No module named '{name}'")))?;
                    match alias {
                        Some(alias) => {
                            self.bind(locals.as_deref_mut(), alias, module.handle().clone())
                        }
                        None => {
                            let top = name.split('.').next().unwrap_or(name);
                            let handle = match self.registry.module(top) {
                                Some(m) => m.handle().clone(),
                                None => Obj::module(top),
                            };
                            self.bind(locals.as_deref_mut(), top, handle);
                        }
                    }
                }
            }
            Stmt::FromImport { module, names } => {
                if self.registry.module(module).is_none() {
                    return Err(RestoreError::Import(format!("No module named '{module}'")));
                }
                for ImportName { name, alias } in names {
                    let value = self
                        .registry
                        .lookup(module, name)
                        .cloned()
                        .or_else(|| {
                            let submodule = self.registry.module(&format!("{module}.{name}"))?;
                            Some(submodule.handle().clone())
                        })
                        .ok_or_else(|| {
                            RestoreError::Import(format!(
                                "cannot import name '{name}' from '{module}'"
                            ))
                        })?;
                    self.bind(locals.as_deref_mut(), alias.as_deref().unwrap_or(name), value);
                }
            }
            Stmt::Assign { targets, value } => {
                let value = self.eval(value, locals.as_deref())?;
                for target in targets {
                    self.bind(locals.as_deref_mut(), target, value.clone());
                }
            }
            Stmt::Delete(names) => {
                for name in names {
                    let removed = match locals.as_deref_mut() {
                        Some(locals) => locals.remove(name),
                        None => self.globals.borrow_mut().remove(name),
                    };
                    if removed.is_none() {
                        return Err(RestoreError::Name(name.clone()));
                    }
                }
            }
            Stmt::Try { body, handler, except } => {
                match self.exec_block(body, locals.as_deref_mut()) {
                    Ok(flow) => return Ok(flow),
                    Err(err) if handler.as_deref().map_or(true, |h| err.is_caught_by(h)) => {
                        return self.exec_block(except, locals);
                    }
                    Err(err) => return Err(err),
                }
            }
            Stmt::FunctionDef { name, params, body } => {
                let mut evaluated = Vec::with_capacity(params.len());
                for param in params {
                    let default = match &param.default {
                        Some(expr) => Some(self.eval(expr, locals.as_deref())?),
                        None => None,
                    };
                    evaluated.push((param.name.clone(), default));
                }
                let function = ScriptFunction {
                    params: evaluated,
                    body: body.clone(),
                    globals: Rc::downgrade(&self.globals),
                };
                self.bind(locals, name, Obj::function(Function::script(name.as_str(), function)));
            }
            Stmt::Return(value) => {
                if locals.is_none() {
                    return Err(RestoreError::ReturnOutsideFunction);
                }
                let value = match value {
                    Some(expr) => self.eval(expr, locals.as_deref())?,
                    None => Obj::none(),
                };
                return Ok(Flow::Return(value));
            }
            Stmt::Pass => {}
            Stmt::Expr(expr) => {
                self.eval(expr, locals.as_deref())?;
            }
        }
        Ok(Flow::Next)
    }

    fn lookup(&self, name: &str, locals: Option<&Env>) -> Result<Obj, RestoreError> {
        if let Some(value) = locals.and_then(|l| l.get(name)) {
            return Ok(value.clone());
        }
        if let Some(value) = self.globals.borrow().get(name) {
            return Ok(value.clone());
        }
        self.registry.builtin(name).cloned().ok_or_else(|| RestoreError::Name(name.to_string()))
    }

    fn eval_all(&self, exprs: &[Expr], locals: Option<&Env>) -> Result<Vec<Obj>, RestoreError> {
        exprs.iter().map(|e| self.eval(e, locals)).collect()
    }

    pub(crate) fn eval(&self, expr: &Expr, locals: Option<&Env>) -> Result<Obj, RestoreError> {
        Ok(match expr {
            Expr::Name(name) => self.lookup(&name.id, locals)?,
            Expr::None => Obj::none(),
            Expr::Bool(b) => Obj::bool(*b),
            Expr::Int(i) => Obj::int(*i),
            Expr::Float(f) => Obj::float(*f),
            Expr::Imag(f) => Obj::complex(0.0, *f),
            Expr::Str(s) => Obj::str(s.as_str()),
            Expr::Bytes(b) => Obj::bytes(b.as_slice()),
            Expr::List(items) => Obj::list(self.eval_all(items, locals)?),
            Expr::Tuple(items) => Obj::tuple(self.eval_all(items, locals)?),
            Expr::Dict(entries) => Obj::dict(
                entries
                    .iter()
                    .map(|(k, v)| Ok((self.eval(k, locals)?, self.eval(v, locals)?)))
                    .collect::<Result<_, RestoreError>>()?,
            ),
            Expr::Call { func, args, kwargs } => {
                let callee = self.eval(func, locals)?;
                let args = CallArgs {
                    args: self.eval_all(args, locals)?,
                    kwargs: kwargs
                        .iter()
                        .map(|(k, v)| Ok((k.clone(), self.eval(v, locals)?)))
                        .collect::<Result<_, RestoreError>>()?,
                };
                ops::call(self.registry, &callee, args)?
            }
            Expr::Attribute { value, attr } => {
                ops::attribute(self.registry, &self.eval(value, locals)?, attr)?
            }
            Expr::Subscript { value, index } => {
                ops::subscript(&self.eval(value, locals)?, &self.eval(index, locals)?)?
            }
            Expr::Unary { op, operand } => ops::unary(*op, &self.eval(operand, locals)?)?,
            Expr::Binary { op, left, right } => {
                ops::binary(*op, &self.eval(left, locals)?, &self.eval(right, locals)?)?
            }
        })
    }
}

fn bind_params(name: &str, function: &ScriptFunction, args: CallArgs) -> Result<Env, RestoreError> {
    let params = &function.params;
    if args.args.len() > params.len() {
        return Err(RestoreError::Type(format!(
            "{name}() takes {} positional arguments but {} were given",
            params.len(),
            args.args.len()
        )));
    }
    if let Some((unknown, _)) =
        args.kwargs.iter().find(|(k, _)| !params.iter().any(|(p, _)| p == k))
    {
        return Err(RestoreError::Type(format!(
            "{name}() got an unexpected keyword argument '{unknown}'"
        )));
    }
    let mut locals = Env::new();
    for (i, (param, default)) in params.iter().enumerate() {
        let value = match (args.args.get(i), args.kwarg(param)) {
            (Some(_), Some(_)) => {
                return Err(RestoreError::Type(format!(
                    "{name}() got multiple values for argument '{param}'"
                )))
            }
            (Some(v), None) | (None, Some(v)) => v.clone(),
            (None, None) => default.clone().ok_or_else(|| {
                RestoreError::Type(format!("{name}() missing required argument: '{param}'"))
            })?,
        };
        locals.insert(param.clone(), value);
    }
    Ok(locals)
}

/// Call a function defined by a restored program.
pub(crate) fn call_script(
    registry: &Registry,
    name: &str,
    function: &ScriptFunction,
    args: CallArgs,
) -> Result<Obj, RestoreError> {
    let mut locals = bind_params(name, function, args)?;
    let globals = function.globals.upgrade().unwrap_or_else(|| Rc::new(RefCell::new(Env::new())));
    let interpreter = Interpreter { registry, globals };
    match interpreter.exec_block(&function.body, Some(&mut locals))? {
        Flow::Return(value) => Ok(value),
        Flow::Next => Ok(Obj::none()),
    }
}
