//! Expression and program front end.
//!
//! Representations are expressions in a small Python-compatible subset:
//! literals, names, calls with keyword arguments, attribute access,
//! subscripts, unary minus and the four arithmetic operators. Archived
//! programs add imports, assignments, `del`, `def`, `return` and
//! `try`/`except`.
//!
//! The parse tree records the byte span of every name *reference*. Keyword
//! argument names and attribute names are not references, which is what
//! makes [`ParseTree`](crate::replace::ParseTree) substitution exact.

pub mod lexer;
pub mod parser;
pub mod program;

use std::ops::Range;

pub use parser::parse_expr;
pub use program::parse_program;

/// A reference to a name and where it occurs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRef {
    /// Identifier.
    pub id: String,
    /// Byte span in the parsed text.
    pub span: Range<usize>,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `+x`
    Pos,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

/// Expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Name reference.
    Name(NameRef),
    /// `None`.
    None,
    /// `True` / `False`.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// Imaginary literal.
    Imag(f64),
    /// String literal, adjacent literals concatenated.
    Str(String),
    /// Byte string literal.
    Bytes(Vec<u8>),
    /// `[a, b]`
    List(Vec<Expr>),
    /// `(a, b)`
    Tuple(Vec<Expr>),
    /// `{k: v}`
    Dict(Vec<(Expr, Expr)>),
    /// `f(a, k=v)`
    Call {
        /// Callee.
        func: Box<Expr>,
        /// Positional arguments.
        args: Vec<Expr>,
        /// Keyword arguments.
        kwargs: Vec<(String, Expr)>,
    },
    /// `value.attr`
    Attribute {
        /// Object.
        value: Box<Expr>,
        /// Attribute name.
        attr: String,
    },
    /// `value[index]`
    Subscript {
        /// Container.
        value: Box<Expr>,
        /// Key or index.
        index: Box<Expr>,
    },
    /// `-x`, `+x`
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// `a + b` and friends.
    Binary {
        /// Operator.
        op: BinOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
}

impl Expr {
    /// Every name reference, in source order.
    pub fn names(&self) -> Vec<&NameRef> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                Expr::Name(name) => out.push(name),
                Expr::List(items) | Expr::Tuple(items) => stack.extend(items.iter()),
                Expr::Dict(entries) => {
                    for (k, v) in entries {
                        stack.push(k);
                        stack.push(v);
                    }
                }
                Expr::Call { func, args, kwargs } => {
                    stack.push(func);
                    stack.extend(args.iter());
                    stack.extend(kwargs.iter().map(|(_, v)| v));
                }
                Expr::Attribute { value, .. } => stack.push(value),
                Expr::Subscript { value, index } => {
                    stack.push(value);
                    stack.push(index);
                }
                Expr::Unary { operand, .. } => stack.push(operand),
                Expr::Binary { left, right, .. } => {
                    stack.push(left);
                    stack.push(right);
                }
                Expr::None
                | Expr::Bool(_)
                | Expr::Int(_)
                | Expr::Float(_)
                | Expr::Imag(_)
                | Expr::Str(_)
                | Expr::Bytes(_) => {}
            }
        }
        out.sort_by_key(|name| name.span.start);
        out
    }

    /// Distinct referenced names, in order of first occurrence.
    pub fn free_names(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for name in self.names() {
            if !seen.contains(&name.id.as_str()) {
                seen.push(&name.id);
            }
        }
        seen
    }
}

/// One `name [as alias]` clause of an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportName {
    /// Dotted module path or member name.
    pub name: String,
    /// Binding name if renamed.
    pub alias: Option<String>,
}

/// Function parameter with optional default.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Parameter name.
    pub name: String,
    /// Default value expression, evaluated when the `def` runs.
    pub default: Option<Expr>,
}

/// Program statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `import a.b as c, d`
    Import(Vec<ImportName>),
    /// `from m import a as b, c`
    FromImport {
        /// Module path.
        module: String,
        /// Imported members.
        names: Vec<ImportName>,
    },
    /// `name = value`
    Assign {
        /// Target names; `a = b = v` binds both.
        targets: Vec<String>,
        /// Value.
        value: Expr,
    },
    /// `del a, b`
    Delete(Vec<String>),
    /// `try: ... except [Name]: ...`
    Try {
        /// Protected block.
        body: Vec<Stmt>,
        /// Exception class named by the handler, `None` for a bare `except`.
        handler: Option<String>,
        /// Handler block.
        except: Vec<Stmt>,
    },
    /// `def name(params): body`
    FunctionDef {
        /// Function name.
        name: String,
        /// Parameters.
        params: Vec<Param>,
        /// Body.
        body: Vec<Stmt>,
    },
    /// `return [value]`
    Return(Option<Expr>),
    /// `pass`
    Pass,
    /// Expression evaluated for effect.
    Expr(Expr),
}
