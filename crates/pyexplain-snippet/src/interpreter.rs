//! Tree-walking evaluator.
//!
//! An [`ExecutionContext`] owns one module namespace, the captured standard
//! output and the call stack used to build traceback frames. Contexts are
//! cheap and meant to be created per run.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ast::{BinOp, Expr, FStringPart, FunctionDef, Handler, Stmt, StmtKind, Target};
use crate::builtins::{self, Builtin, Host, Kwargs};
use crate::exception::{ExcKind, Exception, TraceFrame};
use crate::fmt::format_value;
use crate::ops;
use crate::parser::parse_with_depth;
use crate::value::{raise, ExceptionValue, Function, RunResult, Value};

/// Stack the evaluator is expected to run on when no size is given.
pub const DEFAULT_STACK_BYTES: usize = 64 * 1024 * 1024;

/// Stack reserved per level of evaluator recursion, sized for unoptimized
/// builds.
const STACK_PER_LEVEL: usize = 32 * 1024;

const DEFAULT_CALL_DEPTH: usize = 200;

/// Evaluation limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Nested user-function calls allowed before `RecursionError`.
    pub max_call_depth: usize,
    /// Expression nesting the compiler accepts before `RecursionError`.
    pub max_expression_depth: usize,
    /// Nested expression and statement evaluations allowed before
    /// `RecursionError`, across all active calls.
    pub max_eval_depth: usize,
}

impl Limits {
    /// Limits that keep the evaluator inside a stack of `stack_bytes`.
    pub fn for_stack(stack_bytes: usize) -> Self {
        let max_eval_depth = (stack_bytes / STACK_PER_LEVEL).max(16);
        Self {
            max_call_depth: DEFAULT_CALL_DEPTH.min(max_eval_depth / 4),
            max_expression_depth: max_eval_depth / 2,
            max_eval_depth,
        }
    }

    /// The tighter of `self` and `other`, field by field.
    pub fn clamp_to(self, other: Limits) -> Self {
        Self {
            max_call_depth: self.max_call_depth.min(other.max_call_depth),
            max_expression_depth: self.max_expression_depth.min(other.max_expression_depth),
            max_eval_depth: self.max_eval_depth.min(other.max_eval_depth),
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::for_stack(DEFAULT_STACK_BYTES)
    }
}

/// A namespace. Function scopes chain to the scope they were defined in.
pub(crate) struct Scope {
    vars: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<Scope>>,
    def: Option<Rc<FunctionDef>>,
}

impl Scope {
    fn module() -> Rc<Scope> {
        Rc::new(Scope {
            vars: RefCell::new(HashMap::new()),
            parent: None,
            def: None,
        })
    }

    fn function(def: Rc<FunctionDef>, parent: Rc<Scope>) -> Rc<Scope> {
        Rc::new(Scope {
            vars: RefCell::new(HashMap::new()),
            parent: Some(parent),
            def: Some(def),
        })
    }

    fn get(&self, name: &str) -> Option<Value> {
        self.vars.borrow().get(name).cloned()
    }

    fn set(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(name.to_string(), value);
    }

    fn remove(&self, name: &str) -> bool {
        self.vars.borrow_mut().remove(name).is_some()
    }

    fn binds_locally(&self, name: &str) -> bool {
        self.def
            .as_ref()
            .is_some_and(|def| def.locals.contains(name))
    }

    fn clear(&self) {
        self.vars.borrow_mut().clear();
    }
}

struct CallFrame {
    function: Option<String>,
    line: u32,
}

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// One isolated run of snippet code.
pub struct ExecutionContext {
    file_name: String,
    source_lines: Vec<String>,
    globals: Rc<Scope>,
    output: String,
    call_stack: Vec<CallFrame>,
    /// Exceptions currently being handled, for bare `raise`.
    handling: Vec<Exception>,
    limits: Limits,
    depth: usize,
}

impl ExecutionContext {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            source_lines: Vec::new(),
            globals: Scope::module(),
            output: String::new(),
            call_stack: Vec::new(),
            handling: Vec::new(),
            limits: Limits::default(),
            depth: 0,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Everything printed so far.
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    /// Compile and run `code` at module level. Globals survive between
    /// calls on the same context.
    pub fn execute(&mut self, code: &str, limits: &Limits) -> Result<(), Exception> {
        debug!(file = %self.file_name, bytes = code.len(), "executing snippet");
        self.limits = *limits;
        self.source_lines = code.lines().map(str::to_string).collect();
        let max_depth = u32::try_from(limits.max_expression_depth).unwrap_or(u32::MAX);
        let program = parse_with_depth(code, max_depth)
            .map_err(|e| e.into_exception(&self.file_name, code))?;

        self.globals.set("__name__", Value::string("__main__"));
        self.call_stack.clear();
        self.handling.clear();
        self.depth = 0;
        self.call_stack.push(CallFrame {
            function: None,
            line: 1,
        });
        let globals = Rc::clone(&self.globals);
        let result = self.exec_block(&program, &globals);
        self.call_stack.clear();

        match result {
            Ok(_) => Ok(()),
            Err(exc) => {
                debug!(kind = %exc.kind(), frames = exc.frames().len(), "snippet raised");
                Err(exc)
            }
        }
    }

    fn mark(&mut self, line: u32) {
        if let Some(frame) = self.call_stack.last_mut() {
            frame.line = line;
        }
    }

    fn source_line(&self, line: u32) -> Option<String> {
        let text = self.source_lines.get(line.checked_sub(1)? as usize)?;
        Some(text.trim().to_string())
    }

    /// Attach the current call stack unless the exception already has frames.
    fn locate(&self, exc: Exception) -> Exception {
        if exc.has_frames() {
            return exc;
        }
        let frames = self
            .call_stack
            .iter()
            .map(|frame| TraceFrame {
                file_name: self.file_name.clone(),
                line: frame.line,
                function: frame.function.clone(),
                source_line: self.source_line(frame.line),
            })
            .collect();
        exc.with_frames(frames)
    }

    fn exec_block(&mut self, block: &[Stmt], scope: &Rc<Scope>) -> RunResult<Flow> {
        for stmt in block {
            self.mark(stmt.line);
            match self.exec_stmt(stmt, scope) {
                Ok(Flow::Normal) => {}
                Ok(flow) => return Ok(flow),
                Err(exc) => return Err(self.locate(exc)),
            }
        }
        Ok(Flow::Normal)
    }

    /// Enter one level of evaluator recursion. Pair with `self.depth -= 1`.
    fn descend(&mut self) -> RunResult<()> {
        if self.depth >= self.limits.max_eval_depth {
            return raise(ExcKind::RecursionError, "maximum recursion depth exceeded");
        }
        self.depth += 1;
        Ok(())
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &Rc<Scope>) -> RunResult<Flow> {
        self.descend()?;
        let flow = self.exec_stmt_kind(stmt, scope);
        self.depth -= 1;
        flow
    }

    fn exec_stmt_kind(&mut self, stmt: &Stmt, scope: &Rc<Scope>) -> RunResult<Flow> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr, scope)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value, scope)?;
                for target in targets {
                    self.assign(target, value.clone(), scope)?;
                }
            }
            StmtKind::AugAssign { target, op, value } => {
                self.aug_assign(target, *op, value, scope)?;
            }
            StmtKind::FunctionDef(def) => {
                let mut defaults = Vec::new();
                for param in &def.params {
                    if let Some(default) = &param.default {
                        defaults.push(self.eval(default, scope)?);
                    }
                }
                let function = Function {
                    def: Rc::clone(def),
                    defaults,
                    closure: Rc::clone(scope),
                };
                scope.set(&def.name, Value::Function(Rc::new(function)));
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::If { test, body, orelse } => {
                let branch = if self.eval(test, scope)?.truthy() {
                    body
                } else {
                    orelse
                };
                return self.exec_block(branch, scope);
            }
            StmtKind::While { test, body, orelse } => loop {
                self.mark(stmt.line);
                if !self.eval(test, scope)?.truthy() {
                    return self.exec_block(orelse, scope);
                }
                match self.exec_block(body, scope)? {
                    Flow::Break => break,
                    Flow::Return(v) => return Ok(Flow::Return(v)),
                    Flow::Normal | Flow::Continue => {}
                }
            },
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let items = self.eval(iter, scope)?.iter()?;
                let mut broke = false;
                for item in items {
                    self.mark(stmt.line);
                    self.assign(target, item, scope)?;
                    match self.exec_block(body, scope)? {
                        Flow::Break => {
                            broke = true;
                            break;
                        }
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                if !broke {
                    return self.exec_block(orelse, scope);
                }
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
            StmtKind::Del(targets) => {
                for target in targets {
                    self.delete(target, scope)?;
                }
            }
            StmtKind::Import(aliases) => {
                for alias in aliases {
                    let module = builtins::import_module(&alias.name)?;
                    let bound = match &alias.asname {
                        Some(asname) => asname.as_str(),
                        None => alias.name.split('.').next().unwrap_or(alias.name.as_str()),
                    };
                    scope.set(bound, module);
                }
            }
            StmtKind::ImportFrom { module, names } => {
                let Value::Module(m) = builtins::import_module(module)? else {
                    return raise(ExcKind::ImportError, format!("cannot import '{module}'"));
                };
                for alias in names {
                    let value = m.attrs.borrow().get(&alias.name).cloned();
                    match value {
                        Some(v) => scope.set(alias.bound_name(), v),
                        None => {
                            return raise(
                                ExcKind::ImportError,
                                format!(
                                    "cannot import name '{}' from '{}' (unknown location)",
                                    alias.name, m.name
                                ),
                            )
                        }
                    }
                }
            }
            StmtKind::Raise(None) => {
                return match self.handling.last() {
                    Some(exc) => Err(exc.clone()),
                    None => raise(ExcKind::RuntimeError, "No active exception to reraise"),
                };
            }
            StmtKind::Raise(Some(expr)) => {
                let value = self.eval(expr, scope)?;
                return Err(to_raisable(&value)?);
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                let outcome = match self.exec_block(body, scope) {
                    Ok(Flow::Normal) => self.exec_block(orelse, scope),
                    Ok(flow) => Ok(flow),
                    Err(exc) => self.handle(exc, handlers, scope),
                };
                if finalbody.is_empty() {
                    return outcome;
                }
                return match self.exec_block(finalbody, scope)? {
                    Flow::Normal => outcome,
                    flow => Ok(flow),
                };
            }
            StmtKind::Assert { test, msg } => {
                if !self.eval(test, scope)?.truthy() {
                    return Err(match msg {
                        Some(msg) => {
                            let text = self.eval(msg, scope)?.str();
                            Exception::new(ExcKind::AssertionError, text)
                        }
                        None => Exception::bare(ExcKind::AssertionError),
                    });
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn handle(&mut self, exc: Exception, handlers: &[Handler], scope: &Rc<Scope>) -> RunResult<Flow> {
        for handler in handlers {
            let matched = match &handler.kinds {
                None => true,
                Some(expr) => {
                    self.mark(handler.line);
                    let class = self.eval(expr, scope)?;
                    exception_matches(exc.kind(), &class)?
                }
            };
            if !matched {
                continue;
            }
            debug!(kind = %exc.kind(), line = handler.line, "exception handled");
            if let Some(name) = &handler.name {
                let value = ExceptionValue::from_exception(&exc);
                scope.set(name, Value::Exception(Rc::new(value)));
            }
            self.handling.push(exc);
            let result = self.exec_block(&handler.body, scope);
            self.handling.pop();
            if let Some(name) = &handler.name {
                scope.remove(name);
            }
            return result;
        }
        Err(exc)
    }

    fn load_name(&self, name: &str, scope: &Rc<Scope>) -> RunResult<Value> {
        if scope.binds_locally(name) {
            return match scope.get(name) {
                Some(v) => Ok(v),
                None => raise(
                    ExcKind::UnboundLocalError,
                    format!(
                        "cannot access local variable '{name}' where it is not associated with a value"
                    ),
                ),
            };
        }
        let mut current: Option<&Scope> = Some(scope.as_ref());
        while let Some(s) = current {
            if let Some(v) = s.get(name) {
                return Ok(v);
            }
            current = s.parent.as_deref();
        }
        if let Some(builtin) = Builtin::lookup(name) {
            return Ok(Value::Builtin(builtin));
        }
        if let Some(kind) = ExcKind::from_name(name) {
            return Ok(Value::ExcType(kind));
        }
        raise(ExcKind::NameError, format!("name '{name}' is not defined"))
    }

    fn assign(&mut self, target: &Target, value: Value, scope: &Rc<Scope>) -> RunResult<()> {
        match target {
            Target::Name(name) => {
                scope.set(name, value);
                Ok(())
            }
            Target::Subscript { value: container, index } => {
                let container = self.eval(container, scope)?;
                if let Expr::Slice { lower, upper, step } = &**index {
                    let bounds = self.eval_bounds([lower, upper, step], scope)?;
                    let [a, b, c] = &bounds;
                    return ops::set_slice(&container, [a.as_ref(), b.as_ref(), c.as_ref()], &value);
                }
                let index = self.eval(index, scope)?;
                ops::set_item(&container, &index, value)
            }
            Target::Attribute { value: object, attr } => {
                let object = self.eval(object, scope)?;
                builtins::set_attribute(&object, attr, value)
            }
            Target::Tuple(targets) => {
                let items = match value.to_vec() {
                    Ok(items) => items,
                    Err(_) => {
                        return raise(
                            ExcKind::TypeError,
                            format!("cannot unpack non-iterable {} object", value.type_name()),
                        )
                    }
                };
                if items.len() < targets.len() {
                    return raise(
                        ExcKind::ValueError,
                        format!(
                            "not enough values to unpack (expected {}, got {})",
                            targets.len(),
                            items.len()
                        ),
                    );
                }
                if items.len() > targets.len() {
                    return raise(
                        ExcKind::ValueError,
                        format!("too many values to unpack (expected {})", targets.len()),
                    );
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item, scope)?;
                }
                Ok(())
            }
        }
    }

    fn aug_assign(
        &mut self,
        target: &Target,
        op: BinOp,
        value: &Expr,
        scope: &Rc<Scope>,
    ) -> RunResult<()> {
        match target {
            Target::Name(name) => {
                let current = self.load_name(name, scope)?;
                let rhs = self.eval(value, scope)?;
                let updated = in_place(op, current, &rhs)?;
                scope.set(name, updated);
                Ok(())
            }
            Target::Subscript { value: container, index } => {
                let container = self.eval(container, scope)?;
                let index = self.eval(index, scope)?;
                let current = ops::get_item(&container, &index)?;
                let rhs = self.eval(value, scope)?;
                let updated = in_place(op, current, &rhs)?;
                ops::set_item(&container, &index, updated)
            }
            Target::Attribute { value: object, attr } => {
                let object = self.eval(object, scope)?;
                let current = builtins::get_attribute(&object, attr)?;
                let rhs = self.eval(value, scope)?;
                let updated = in_place(op, current, &rhs)?;
                builtins::set_attribute(&object, attr, updated)
            }
            Target::Tuple(_) => raise(
                ExcKind::SyntaxError,
                "'tuple' is an illegal expression for augmented assignment",
            ),
        }
    }

    fn delete(&mut self, target: &Target, scope: &Rc<Scope>) -> RunResult<()> {
        match target {
            Target::Name(name) => {
                if scope.remove(name) {
                    Ok(())
                } else if scope.binds_locally(name) {
                    raise(
                        ExcKind::UnboundLocalError,
                        format!(
                            "cannot access local variable '{name}' where it is not associated with a value"
                        ),
                    )
                } else {
                    raise(ExcKind::NameError, format!("name '{name}' is not defined"))
                }
            }
            Target::Subscript { value: container, index } => {
                let container = self.eval(container, scope)?;
                if let Expr::Slice { lower, upper, step } = &**index {
                    let bounds = self.eval_bounds([lower, upper, step], scope)?;
                    let [a, b, c] = &bounds;
                    return ops::del_slice(&container, [a.as_ref(), b.as_ref(), c.as_ref()]);
                }
                let index = self.eval(index, scope)?;
                ops::del_item(&container, &index)
            }
            Target::Attribute { value: object, attr } => {
                let object = self.eval(object, scope)?;
                raise(
                    ExcKind::AttributeError,
                    format!(
                        "'{}' object has no attribute '{}'",
                        object.type_name(),
                        attr
                    ),
                )
            }
            Target::Tuple(targets) => {
                for target in targets {
                    self.delete(target, scope)?;
                }
                Ok(())
            }
        }
    }

    fn eval_bounds(
        &mut self,
        bounds: [&Option<Box<Expr>>; 3],
        scope: &Rc<Scope>,
    ) -> RunResult<[Option<Value>; 3]> {
        let mut out = [None, None, None];
        for (slot, bound) in out.iter_mut().zip(bounds) {
            if let Some(expr) = bound {
                *slot = Some(self.eval(expr, scope)?);
            }
        }
        Ok(out)
    }

    fn eval(&mut self, expr: &Expr, scope: &Rc<Scope>) -> RunResult<Value> {
        self.descend()?;
        let value = self.eval_expr(expr, scope);
        self.depth -= 1;
        value
    }

    fn eval_expr(&mut self, expr: &Expr, scope: &Rc<Scope>) -> RunResult<Value> {
        match expr {
            Expr::None => Ok(Value::None),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::BigInt(n) => Ok(Value::Long(Rc::new(n.clone()))),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Str(s) => Ok(Value::string(s)),
            Expr::FString(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        FStringPart::Literal(text) => out.push_str(text),
                        FStringPart::Field {
                            expr,
                            conversion,
                            spec,
                        } => {
                            let value = self.eval(expr, scope)?;
                            let value = match conversion {
                                Some('r') | Some('a') => Value::string(&value.repr()),
                                Some('s') => Value::string(&value.str()),
                                _ => value,
                            };
                            out.push_str(&format_value(&value, spec.as_deref().unwrap_or(""))?);
                        }
                    }
                }
                Ok(Value::string(&out))
            }
            Expr::Name(name) => self.load_name(name, scope),
            Expr::List(items) => {
                let values = self.eval_all(items, scope)?;
                Ok(Value::list(values))
            }
            Expr::Tuple(items) => {
                let values = self.eval_all(items, scope)?;
                Ok(Value::tuple(values))
            }
            Expr::Dict(pairs) => {
                let mut dict = crate::value::Dict::default();
                for (k, v) in pairs {
                    let key = self.eval(k, scope)?;
                    key.check_hashable()?;
                    let value = self.eval(v, scope)?;
                    dict.insert(key, value);
                }
                Ok(Value::dict(dict))
            }
            Expr::Subscript { value, index } => {
                let container = self.eval(value, scope)?;
                if let Expr::Slice { lower, upper, step } = &**index {
                    let bounds = self.eval_bounds([lower, upper, step], scope)?;
                    let [a, b, c] = &bounds;
                    return ops::get_slice(&container, a.as_ref(), b.as_ref(), c.as_ref());
                }
                let index = self.eval(index, scope)?;
                ops::get_item(&container, &index)
            }
            Expr::Slice { .. } => raise(ExcKind::SyntaxError, "invalid syntax"),
            Expr::Attribute { value, attr } => {
                let object = self.eval(value, scope)?;
                builtins::get_attribute(&object, attr)
            }
            Expr::Call { func, args, kwargs } => {
                let callee = self.eval(func, scope)?;
                let args = self.eval_all(args, scope)?;
                let mut named: Kwargs = Vec::with_capacity(kwargs.len());
                for (name, expr) in kwargs {
                    named.push((name.clone(), self.eval(expr, scope)?));
                }
                self.call(&callee, args, named)
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, scope)?;
                ops::unary(*op, &value)
            }
            Expr::Binary { op, left, right } => {
                let l = self.eval(left, scope)?;
                let r = self.eval(right, scope)?;
                ops::binary(*op, &l, &r)
            }
            Expr::Compare { left, links } => {
                let mut lhs = self.eval(left, scope)?;
                for (op, rhs) in links {
                    let rhs = self.eval(rhs, scope)?;
                    if !ops::compare(*op, &lhs, &rhs)? {
                        return Ok(Value::Bool(false));
                    }
                    lhs = rhs;
                }
                Ok(Value::Bool(true))
            }
            Expr::And(a, b) => {
                let left = self.eval(a, scope)?;
                if !left.truthy() {
                    return Ok(left);
                }
                self.eval(b, scope)
            }
            Expr::Or(a, b) => {
                let left = self.eval(a, scope)?;
                if left.truthy() {
                    return Ok(left);
                }
                self.eval(b, scope)
            }
            Expr::IfExp { test, body, orelse } => {
                if self.eval(test, scope)?.truthy() {
                    self.eval(body, scope)
                } else {
                    self.eval(orelse, scope)
                }
            }
        }
    }

    fn eval_all(&mut self, exprs: &[Expr], scope: &Rc<Scope>) -> RunResult<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e, scope)).collect()
    }

    fn call(&mut self, callee: &Value, args: Vec<Value>, kwargs: Kwargs) -> RunResult<Value> {
        match callee {
            Value::Function(f) => self.call_function(f, args, kwargs),
            Value::Builtin(b) => builtins::call(*b, args, kwargs, self),
            Value::Method(m) => builtins::call_method(m, args, kwargs, self),
            Value::ExcType(kind) => {
                if !kwargs.is_empty() {
                    return raise(
                        ExcKind::TypeError,
                        format!("{kind}() takes no keyword arguments"),
                    );
                }
                let value = ExceptionValue::from_args(*kind, args);
                Ok(Value::Exception(Rc::new(value)))
            }
            Value::Type(name) => raise(
                ExcKind::TypeError,
                format!("cannot create '{name}' instances"),
            ),
            other => raise(
                ExcKind::TypeError,
                format!("'{}' object is not callable", other.type_name()),
            ),
        }
    }

    fn call_function(
        &mut self,
        function: &Rc<Function>,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> RunResult<Value> {
        if self.call_stack.len() > self.limits.max_call_depth {
            return raise(ExcKind::RecursionError, "maximum recursion depth exceeded");
        }
        let def = &function.def;
        let scope = Scope::function(Rc::clone(def), Rc::clone(&function.closure));
        bind_arguments(def, &function.defaults, args, kwargs, &scope)?;

        self.call_stack.push(CallFrame {
            function: Some(def.name.clone()),
            line: def.line,
        });
        let result = self.exec_block(&def.body, &scope);
        self.call_stack.pop();

        match result? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }
}

impl Host for ExecutionContext {
    fn call_value(&mut self, callee: &Value, args: Vec<Value>) -> RunResult<Value> {
        self.call(callee, args, Vec::new())
    }

    fn write_output(&mut self, text: &str) {
        self.output.push_str(text);
    }
}

impl Drop for ExecutionContext {
    // functions hold their defining scope, which holds the functions
    fn drop(&mut self) {
        self.globals.clear();
    }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

fn quoted_list(names: &[&str]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("'{n}'")).collect();
    match quoted.as_slice() {
        [] => String::new(),
        [one] => one.clone(),
        [a, b] => format!("{a} and {b}"),
        [rest @ .., last] => format!("{}, and {}", rest.join(", "), last),
    }
}

fn bind_arguments(
    def: &FunctionDef,
    defaults: &[Value],
    args: Vec<Value>,
    kwargs: Kwargs,
    scope: &Scope,
) -> RunResult<()> {
    let name = &def.name;
    let total = def.params.len();
    if args.len() > total {
        let required = total - defaults.len();
        let given = args.len();
        let verb = if given == 1 { "was" } else { "were" };
        let message = if required == total {
            format!(
                "{name}() takes {} but {given} {verb} given",
                plural(total, "positional argument")
            )
        } else {
            format!(
                "{name}() takes from {required} to {total} positional arguments but {given} {verb} given"
            )
        };
        return raise(ExcKind::TypeError, message);
    }

    let mut slots: Vec<Option<Value>> = args.into_iter().map(Some).collect();
    slots.resize(total, None);
    for (key, value) in kwargs {
        let Some(idx) = def.params.iter().position(|p| p.name == key) else {
            return raise(
                ExcKind::TypeError,
                format!("{name}() got an unexpected keyword argument '{key}'"),
            );
        };
        if slots[idx].is_some() {
            return raise(
                ExcKind::TypeError,
                format!("{name}() got multiple values for argument '{key}'"),
            );
        }
        slots[idx] = Some(value);
    }

    let first_default = total - defaults.len();
    for (idx, slot) in slots.iter_mut().enumerate() {
        if slot.is_none() && idx >= first_default {
            *slot = Some(defaults[idx - first_default].clone());
        }
    }
    let missing: Vec<&str> = slots
        .iter()
        .zip(&def.params)
        .filter(|(slot, _)| slot.is_none())
        .map(|(_, p)| p.name.as_str())
        .collect();
    if !missing.is_empty() {
        return raise(
            ExcKind::TypeError,
            format!(
                "{name}() missing {}: {}",
                plural(missing.len(), "required positional argument"),
                quoted_list(&missing)
            ),
        );
    }

    for (param, slot) in def.params.iter().zip(slots) {
        if let Some(value) = slot {
            scope.set(&param.name, value);
        }
    }
    Ok(())
}

/// `x op= y`; lists extend in place.
fn in_place(op: BinOp, current: Value, rhs: &Value) -> RunResult<Value> {
    if let (BinOp::Add, Value::List(items)) = (op, &current) {
        let extra = rhs.to_vec()?;
        items.borrow_mut().extend(extra);
        return Ok(current);
    }
    ops::binary(op, &current, rhs)
}

fn to_raisable(value: &Value) -> RunResult<Exception> {
    match value {
        Value::ExcType(kind) => Ok(Exception::bare(*kind)),
        Value::Exception(exc) => Ok(exc.to_exception()),
        _ => raise(
            ExcKind::TypeError,
            "exceptions must derive from BaseException",
        ),
    }
}

fn exception_matches(kind: ExcKind, class: &Value) -> RunResult<bool> {
    match class {
        Value::ExcType(handler) => Ok(kind.is_subclass_of(*handler)),
        Value::Tuple(classes) => {
            for class in classes.iter() {
                if exception_matches(kind, class)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => raise(
            ExcKind::TypeError,
            "catching classes that do not inherit from BaseException is not allowed",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(code: &str) -> (Result<(), Exception>, String) {
        let mut ctx = ExecutionContext::new("demo.py");
        let result = ctx.execute(code, &Limits::default());
        (result, ctx.take_output())
    }

    #[test]
    fn test_prints_and_returns_ok() {
        let (result, out) = run("x = 2\nprint('x =', x * 21)\n");
        assert!(result.is_ok());
        assert_eq!(out, "x = 42\n");
    }

    #[test]
    fn test_frames_point_at_innermost_call() {
        let code = "def inner(d):\n    return d['missing']\n\ndef outer():\n    return inner({})\n\nouter()\n";
        let (result, _) = run(code);
        let exc = result.unwrap_err();
        assert_eq!(exc.kind(), ExcKind::KeyError);
        let frames = exc.frames();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].function, None);
        assert_eq!(frames[0].line, 7);
        assert_eq!(frames[1].function.as_deref(), Some("outer"));
        assert_eq!(frames[2].function.as_deref(), Some("inner"));
        assert_eq!(frames[2].line, 2);
        assert_eq!(frames[2].source_line.as_deref(), Some("return d['missing']"));
    }

    #[test]
    fn test_unbound_local() {
        let code = "count = 0\ndef bump():\n    count += 1\nbump()\n";
        let exc = run(code).0.unwrap_err();
        assert_eq!(exc.kind(), ExcKind::UnboundLocalError);
        assert_eq!(
            exc.message(),
            "cannot access local variable 'count' where it is not associated with a value"
        );
    }

    #[test]
    fn test_try_except_finally_order() {
        let code = "try:\n    1 / 0\nexcept ZeroDivisionError as e:\n    print('caught', e)\nelse:\n    print('no')\nfinally:\n    print('done')\n";
        let (result, out) = run(code);
        assert!(result.is_ok());
        assert_eq!(out, "caught division by zero\ndone\n");
    }

    #[test]
    fn test_bare_raise_keeps_original_frames() {
        let code = "def f():\n    return int('x')\ntry:\n    f()\nexcept ValueError:\n    raise\n";
        let exc = run(code).0.unwrap_err();
        assert_eq!(exc.kind(), ExcKind::ValueError);
        assert_eq!(exc.frames().last().and_then(|f| f.function.as_deref()), Some("f"));
    }

    #[test]
    fn test_recursion_limit() {
        let code = "def down(n):\n    return down(n + 1)\ndown(0)\n";
        let mut ctx = ExecutionContext::new("deep.py");
        let exc = ctx
            .execute(
                code,
                &Limits {
                    max_call_depth: 50,
                    ..Limits::default()
                },
            )
            .unwrap_err();
        assert_eq!(exc.kind(), ExcKind::RecursionError);
        assert_eq!(exc.message(), "maximum recursion depth exceeded");
    }

    #[test]
    fn test_limits_follow_stack_size() {
        let roomy = Limits::for_stack(DEFAULT_STACK_BYTES);
        assert_eq!(roomy, Limits::default());
        assert_eq!(roomy.max_call_depth, 200);
        assert!(roomy.max_expression_depth < roomy.max_eval_depth);

        let tight = Limits::for_stack(1024 * 1024);
        assert!(tight.max_eval_depth < roomy.max_eval_depth);
        assert!(tight.max_call_depth < 200);
        assert_eq!(roomy.clamp_to(tight), tight);
    }

    #[test]
    fn test_deep_expressions_raise_recursion_error() {
        let limits = Limits {
            max_expression_depth: 50,
            ..Limits::default()
        };
        let code = format!("x = {}1\n", "-".repeat(100));
        let exc = ExecutionContext::new("deep.py")
            .execute(&code, &limits)
            .unwrap_err();
        assert_eq!(exc.kind(), ExcKind::RecursionError);
        assert_eq!(
            exc.message(),
            "maximum recursion depth exceeded during compilation"
        );

        let limits = Limits {
            max_eval_depth: 20,
            ..Limits::default()
        };
        let code = format!("x = 1{}\n", " + 1".repeat(30));
        let exc = ExecutionContext::new("deep.py")
            .execute(&code, &limits)
            .unwrap_err();
        assert_eq!(exc.kind(), ExcKind::RecursionError);
        assert_eq!(exc.message(), "maximum recursion depth exceeded");
        assert_eq!(exc.frames().len(), 1);
    }

    #[test]
    fn test_argument_binding_errors() {
        let exc = run("def f(a, b):\n    pass\nf(1)\n").0.unwrap_err();
        assert_eq!(exc.message(), "f() missing 1 required positional argument: 'b'");
        let exc = run("def f(a):\n    pass\nf(1, 2)\n").0.unwrap_err();
        assert_eq!(exc.message(), "f() takes 1 positional argument but 2 were given");
        let exc = run("def f(a, b=1):\n    pass\nf(1, 2, 3)\n").0.unwrap_err();
        assert_eq!(
            exc.message(),
            "f() takes from 1 to 2 positional arguments but 3 were given"
        );
        let exc = run("def f(a):\n    pass\nf(1, z=2)\n").0.unwrap_err();
        assert_eq!(exc.message(), "f() got an unexpected keyword argument 'z'");
        let exc = run("def f(a, b, c):\n    pass\nf()\n").0.unwrap_err();
        assert_eq!(
            exc.message(),
            "f() missing 3 required positional arguments: 'a', 'b', and 'c'"
        );
    }

    #[test]
    fn test_unpacking_errors() {
        let exc = run("a, b, c = [1, 2]\n").0.unwrap_err();
        assert_eq!(exc.message(), "not enough values to unpack (expected 3, got 2)");
        let exc = run("a, b = 5\n").0.unwrap_err();
        assert_eq!(exc.message(), "cannot unpack non-iterable int object");
    }

    #[test]
    fn test_syntax_error_becomes_exception() {
        let exc = run("x = (1, 2\n").0.unwrap_err();
        assert_eq!(exc.kind(), ExcKind::SyntaxError);
        assert!(exc.syntax_location().is_some());
    }

    #[test]
    fn test_globals_persist_between_executions() {
        let mut ctx = ExecutionContext::new("repl.py");
        ctx.execute("total = 40\n", &Limits::default()).unwrap();
        ctx.execute("print(total + 2)\n", &Limits::default()).unwrap();
        assert_eq!(ctx.output(), "42\n");
    }

    #[test]
    fn test_while_condition_error_reports_while_line() {
        let code = "i = 0\nwhile i < 'x':\n    i += 1\n";
        let exc = run(code).0.unwrap_err();
        assert_eq!(exc.kind(), ExcKind::TypeError);
        assert_eq!(exc.frames()[0].line, 2);
    }
}
