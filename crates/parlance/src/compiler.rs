//! The compiler: resolves operators and names through plug-ins, folds
//! constants, eliminates dead conditional branches and assembles the linear
//! program.
//!
//! A [`Compiler`] is configured once (operators, flags, plug-ins, named
//! expression sources) and then compiles any number of expressions. The
//! configuration freezes with the first compilation: expressions share the
//! compiler's core, and reconfiguring afterwards panics.

use std::{
    sync::{Arc, RwLock},
    time::Instant,
};

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::debug;

use crate::{
    ast::Ast,
    config::{CompileFlags, CompilerConfig},
    error::{ErrorKind, ExprError, ExprResult},
    expression::{CompileTimes, Expression},
    parser,
    plugin::{
        BinaryConstFold, CastProposal, CiAutoCast, CiBinary, CiFunction, CiUnary, CompilationOutput, CompilerPlugin,
        FunctionHint, priority,
    },
    program::{InvokeForm, NestedTarget, OpCode, OpKind, Program},
    scope::{CtStore, Scope},
    value::{TypeTag, Value, types},
};

/// Read-only source of named expression strings, e.g. a configuration file.
///
/// Consulted when a nested expression name is not found among the compiled
/// named expressions; the fetched string is compiled and cached.
pub trait ExpressionRepository: Send + Sync {
    /// Returns the expression string stored under `name`.
    fn get(&self, name: &str) -> Option<String>;
}

/// The expression compiler.
pub struct Compiler {
    core: Arc<CompilerCore>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// Creates a compiler with default configuration and no plug-ins.
    /// Usually followed by configuration tweaks and [`Compiler::setup_defaults`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: Arc::new(CompilerCore {
                cfg: Arc::new(CompilerConfig::default()),
                plugins: Vec::new(),
                named: RwLock::new(IndexMap::new()),
                repository: None,
            }),
        }
    }

    /// The current configuration.
    #[must_use]
    pub fn config(&self) -> &CompilerConfig {
        &self.core.cfg
    }

    /// Mutable access to the configuration.
    ///
    /// # Panics
    /// Panics once the first expression has been compiled; configuration is
    /// fixed from then on.
    pub fn config_mut(&mut self) -> &mut CompilerConfig {
        let core = Arc::get_mut(&mut self.core).expect("compiler reconfigured after first compilation");
        Arc::get_mut(&mut core.cfg).expect("compiler reconfigured after first compilation")
    }

    /// Installs the default operators, aliases and built-in plug-ins
    /// selected by the compile flags.
    ///
    /// # Panics
    /// Panics once the first expression has been compiled.
    pub fn setup_defaults(&mut self) {
        self.config_mut().install_defaults();
        self.insert_plugin(Box::new(crate::plugins::strings()), priority::STRINGS);
        self.insert_plugin(Box::new(crate::plugins::date_and_time()), priority::DATE_AND_TIME);
        self.insert_plugin(Box::new(crate::plugins::math()), priority::MATH);
        self.insert_plugin(Box::new(crate::plugins::arithmetics()), priority::ARITHMETICS);
        self.insert_plugin(Box::new(crate::plugins::AutoCast), priority::AUTO_CAST);
        self.insert_plugin(Box::new(crate::plugins::Elvis), priority::ELVIS);
    }

    /// Registers a plug-in at the given priority; higher priorities are
    /// asked first.
    ///
    /// # Panics
    /// Panics once the first expression has been compiled.
    pub fn insert_plugin(&mut self, plugin: Box<dyn CompilerPlugin>, priority: i32) {
        let core = Arc::get_mut(&mut self.core).expect("compiler reconfigured after first compilation");
        let at = core
            .plugins
            .iter()
            .position(|(p, _)| *p < priority)
            .unwrap_or(core.plugins.len());
        core.plugins.insert(at, (priority, plugin));
    }

    /// Attaches a read-only repository of named expression strings.
    ///
    /// # Panics
    /// Panics once the first expression has been compiled.
    pub fn set_repository(&mut self, repository: Box<dyn ExpressionRepository>) {
        let core = Arc::get_mut(&mut self.core).expect("compiler reconfigured after first compilation");
        core.repository = Some(repository);
    }

    /// Compiles an expression string into an evaluable [`Expression`].
    pub fn compile(&self, text: &str) -> ExprResult<Arc<Expression>> {
        CompilerCore::compile_expression(&self.core, text, Expression::ANONYMOUS)
    }

    /// Compiles `text` and stores it under `name` for use as a nested
    /// expression. Returns whether an expression of that name was replaced.
    pub fn add_named(&self, name: &str, text: &str) -> ExprResult<bool> {
        let compiled = CompilerCore::compile_expression(&self.core, text, name)?;
        let replaced = self
            .core
            .named
            .write()
            .expect("named expression registry poisoned")
            .insert(self.core.named_key(name), compiled);
        Ok(replaced.is_some())
    }

    /// Returns the named expression, compiling it from the repository when
    /// it is not in the registry yet.
    pub fn get_named(&self, name: &str) -> ExprResult<Arc<Expression>> {
        CompilerCore::get_named(&self.core, name)
    }

    /// Removes a named expression from the registry. Programs holding a
    /// compile-time-resolved reference keep the target alive.
    pub fn remove_named(&self, name: &str) -> bool {
        self.core
            .named
            .write()
            .expect("named expression registry poisoned")
            .shift_remove(&self.core.named_key(name))
            .is_some()
    }
}

/// The shared, immutable-after-setup core behind a [`Compiler`] and every
/// expression it produced.
pub(crate) struct CompilerCore {
    pub(crate) cfg: Arc<CompilerConfig>,
    /// Plug-ins, highest priority first.
    plugins: Vec<(i32, Box<dyn CompilerPlugin>)>,
    /// Compiled named expressions, keyed per the case-sensitivity flag.
    named: RwLock<IndexMap<String, Arc<Expression>>>,
    repository: Option<Box<dyn ExpressionRepository>>,
}

impl CompilerCore {
    fn named_key(&self, name: &str) -> String {
        if self
            .cfg
            .compile_flags
            .contains(CompileFlags::CASE_SENSITIVE_NAMED_EXPRESSIONS)
        {
            name.to_owned()
        } else {
            name.to_lowercase()
        }
    }

    pub(crate) fn get_named(core: &Arc<Self>, name: &str) -> ExprResult<Arc<Expression>> {
        let key = core.named_key(name);
        if let Some(found) = core
            .named
            .read()
            .expect("named expression registry poisoned")
            .get(&key)
        {
            return Ok(found.clone());
        }
        if let Some(repository) = &core.repository
            && let Some(text) = repository.get(name)
        {
            let compiled = Self::compile_expression(core, &text, name)?;
            core.named
                .write()
                .expect("named expression registry poisoned")
                .insert(key, compiled.clone());
            return Ok(compiled);
        }
        Err(ExprError::new(
            ErrorKind::NamedExpressionNotFound,
            format!("Named expression {name:?} not found."),
        ))
    }

    /// Parses, compiles and normalizes one expression.
    pub(crate) fn compile_expression(core: &Arc<Self>, text: &str, name: &str) -> ExprResult<Arc<Expression>> {
        let decorate = |err: ExprError| {
            let position = err.position().unwrap_or(0);
            err.with_expression_info(text, position)
        };

        let started = Instant::now();
        let mut ast = parser::parse(text, &core.cfg).map_err(decorate)?;
        let parse_time = started.elapsed();

        let assemble_started = Instant::now();
        let store = Arc::new(CtStore::default());
        let mut codegen = CodeGen {
            core,
            scope: Scope::compile_time(store.clone()),
            no_opt: core.cfg.compile_flags.contains(CompileFlags::NO_OPTIMIZATION),
        };
        let mut asm = Assembly { ops: Vec::new() };
        codegen.compile_node(&mut ast, &mut asm).map_err(decorate)?;
        let program = Program { ops: asm.ops };
        let assemble_time = assemble_started.elapsed();

        let normalized = crate::normalizer::normalize(&ast, &core.cfg);
        debug!(
            name,
            ops = program.op_count(),
            ?parse_time,
            ?assemble_time,
            "compiled expression"
        );

        Ok(Arc::new(Expression::new(
            name,
            text,
            normalized,
            program,
            store,
            core.cfg.clone(),
            CompileTimes {
                parse: parse_time,
                assemble: assemble_time,
            },
        )))
    }

    fn wrap_plugin_error(&self, plugin: &dyn CompilerPlugin, err: ExprError) -> ExprError {
        if self
            .cfg
            .compile_flags
            .contains(CompileFlags::PLUGIN_EXCEPTION_FALL_THROUGH)
        {
            err
        } else {
            let name = plugin.name().to_owned();
            err.wrap(
                ErrorKind::ExceptionInPlugin,
                format!("Exception caught in compiler plug-in {name:?}."),
            )
        }
    }

    fn ask_function(&self, scope: &mut Scope, ci: &mut CiFunction<'_>) -> ExprResult<bool> {
        for (_, plugin) in &self.plugins {
            match plugin.try_compile_function(scope, ci) {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(err) => return Err(self.wrap_plugin_error(plugin.as_ref(), err)),
            }
        }
        Ok(false)
    }

    fn ask_unary(&self, scope: &mut Scope, ci: &mut CiUnary<'_>) -> ExprResult<bool> {
        for (_, plugin) in &self.plugins {
            match plugin.try_compile_unary(scope, ci) {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(err) => return Err(self.wrap_plugin_error(plugin.as_ref(), err)),
            }
        }
        Ok(false)
    }

    fn ask_binary(&self, scope: &mut Scope, ci: &mut CiBinary<'_>) -> ExprResult<bool> {
        for (_, plugin) in &self.plugins {
            match plugin.try_compile_binary(scope, ci) {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(err) => return Err(self.wrap_plugin_error(plugin.as_ref(), err)),
            }
        }
        Ok(false)
    }

    fn ask_auto_cast(&self, scope: &mut Scope, ci: &mut CiAutoCast<'_>) -> ExprResult<bool> {
        for (_, plugin) in &self.plugins {
            match plugin.try_compile_auto_cast(scope, ci) {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(err) => return Err(self.wrap_plugin_error(plugin.as_ref(), err)),
            }
        }
        Ok(false)
    }
}

/// The growing program plus span bookkeeping.
struct Assembly {
    ops: Vec<OpCode>,
}

impl Assembly {
    fn len(&self) -> usize {
        self.ops.len()
    }

    fn push(&mut self, kind: OpKind, result_type: TypeTag, position: usize, span_start: usize) {
        self.ops.push(OpCode {
            kind,
            result_type,
            position,
            span_start,
        });
    }

    /// Start indices of the opcode spans of the last `n` subtrees, leftmost
    /// argument first.
    fn arg_starts(&self, n: usize) -> SmallVec<[usize; 4]> {
        let mut starts = SmallVec::<[usize; 4]>::new();
        let mut end = self.ops.len();
        for _ in 0..n {
            let start = self.ops[end - 1].span_start;
            starts.push(start);
            end = start;
        }
        starts.reverse();
        starts
    }

    /// The value type and (for single-constant spans) the constant of the
    /// subtree occupying `start..end`.
    fn span_info(&self, start: usize, end: usize) -> (TypeTag, Option<&Value>) {
        let result_type = self.ops[end - 1].result_type;
        let constant = if end - start == 1 {
            match &self.ops[start].kind {
                OpKind::Constant(value) => Some(value),
                _ => None,
            }
        } else {
            None
        };
        (result_type, constant)
    }

    /// Removes the opcodes `start..end`, shifting later span starts.
    fn remove_span(&mut self, start: usize, end: usize) {
        let removed = end - start;
        self.ops.drain(start..end);
        for op in &mut self.ops[start..] {
            if op.span_start >= start {
                op.span_start -= removed;
            }
        }
    }

    /// Inserts an opcode at `index`, shifting later span starts.
    fn insert(&mut self, index: usize, op: OpCode) {
        self.ops.insert(index, op);
        for following in &mut self.ops[index + 1..] {
            if following.span_start >= index {
                following.span_start += 1;
            }
        }
    }
}

/// Outcome of one binary dispatch round.
enum BinaryOutcome {
    /// A plug-in compiled the node. `output` is `None` when a constant fold
    /// already rewrote the opcodes.
    Compiled {
        output: Option<(CompilationOutput, usize)>,
        rewritten: Option<String>,
    },
    NoMatch,
}

/// One AST-to-program walk.
struct CodeGen<'c> {
    core: &'c Arc<CompilerCore>,
    /// The compile-time scope constants are folded in.
    scope: Scope,
    no_opt: bool,
}

impl CodeGen<'_> {
    fn cfg(&self) -> &CompilerConfig {
        &self.core.cfg
    }

    fn compile_node(&mut self, ast: &mut Ast, asm: &mut Assembly) -> ExprResult<()> {
        match ast {
            Ast::Literal(node) => {
                let span_start = asm.len();
                asm.push(
                    OpKind::Constant(node.value.clone()),
                    node.value.tag(),
                    node.position,
                    span_start,
                );
                Ok(())
            }
            Ast::Identifier(node) => {
                if let Some(canonical) = self.compile_call(&node.parsed_name, true, 0, node.position, asm)? {
                    node.name = canonical;
                }
                Ok(())
            }
            Ast::Function(_) => self.compile_function(ast, asm),
            Ast::Unary(_) => self.compile_unary(ast, asm),
            Ast::Binary(_) => self.compile_binary(ast, asm),
            Ast::Conditional(_) => self.compile_conditional(ast, asm),
        }
    }

    /// Compiles a function node: nested-expression forms are intercepted,
    /// everything else goes through plug-in dispatch.
    fn compile_function(&mut self, ast: &mut Ast, asm: &mut Assembly) -> ExprResult<()> {
        let Ast::Function(node) = ast else { unreachable!() };

        if self.cfg().nested_function.matches(&node.parsed_name) {
            node.name = self.cfg().nested_function.name.clone();
            return self.compile_nested_function(ast, asm);
        }

        for arg in &mut node.args {
            self.compile_node(arg, asm)?;
        }
        if let Some(canonical) = self.compile_call(&node.parsed_name, false, node.args.len(), node.position, asm)? {
            node.name = canonical;
        }
        Ok(())
    }

    /// Shared identifier/function compilation through plug-in dispatch.
    /// Returns the canonical spelling on success.
    fn compile_call(
        &mut self,
        parsed_name: &str,
        is_identifier: bool,
        arg_count: usize,
        position: usize,
        asm: &mut Assembly,
    ) -> ExprResult<Option<String>> {
        let starts = asm.arg_starts(arg_count);
        let span_start = starts.first().copied().unwrap_or(asm.len());
        let (arg_types, const_args) = self.collect_args(asm, &starts);

        let mut ci = CiFunction {
            name: parsed_name,
            is_identifier,
            arg_types: &arg_types,
            const_args: &const_args,
            out: CompilationOutput::default(),
            hints: Vec::new(),
        };
        let compiled = self.core.ask_function(&mut self.scope, &mut ci)?;

        if compiled && ci.out.is_filled() {
            let canonical = if ci.out.callback_name.is_empty() {
                parsed_name.to_owned()
            } else {
                ci.out.callback_name.clone()
            };
            let form = if is_identifier {
                InvokeForm::Identifier
            } else {
                InvokeForm::Function
            };
            self.emit_output(ci.out, form, canonical.clone(), arg_count, position, span_start, asm);
            return Ok(Some(canonical));
        }

        // a plug-in may have recognized the name without compiling it
        if let Some(hint) = ci.hints.into_iter().next() {
            return Err(match hint {
                FunctionHint::ArgumentMismatch { name, signature } => ExprError::new(
                    ErrorKind::FunctionHint,
                    format!("Found function {name:?}. Arguments not applicable. Expected: {signature}."),
                ),
                FunctionHint::MissingParentheses { name } => ExprError::new(
                    ErrorKind::MissingFunctionParentheses,
                    format!("Missing pair of empty parentheses '()' with call to function {name:?}."),
                ),
                FunctionHint::UnexpectedParentheses { name } => ExprError::new(
                    ErrorKind::IdentifierWithFunctionParentheses,
                    format!("Function parentheses '()' not allowed with identifier {name:?}."),
                ),
            }
            .at(position));
        }

        if is_identifier {
            Err(ExprError::new(
                ErrorKind::UnknownIdentifier,
                format!("Unknown identifier {parsed_name:?}."),
            )
            .at(position))
        } else {
            let signature: Vec<&str> = arg_types.iter().map(|t| t.name()).collect();
            Err(ExprError::new(
                ErrorKind::UnknownFunction,
                format!("Unknown function '{parsed_name}({})'.", signature.join(", ")),
            )
            .at(position))
        }
    }

    fn compile_unary(&mut self, ast: &mut Ast, asm: &mut Assembly) -> ExprResult<()> {
        let Ast::Unary(node) = ast else { unreachable!() };
        let symbol = self.cfg().resolve_unary_symbol(&node.parsed_op).to_owned();

        // the nested-expression operator is handled by the compiler itself
        if self
            .cfg()
            .compile_flags
            .contains(CompileFlags::ALLOW_COMPILE_TIME_NESTED_EXPRESSIONS)
            && !self.cfg().nested_operator.is_empty()
            && symbol == self.cfg().nested_operator
        {
            node.op = symbol;
            let name = nested_name_operand(&node.arg, self.cfg())?;
            return self.emit_nested_resolved(&name, node.position, asm);
        }

        self.compile_node(&mut node.arg, asm)?;

        let span_start = asm.arg_starts(1)[0];
        let (operand_type, const_operand) = asm.span_info(span_start, asm.len());
        let const_operand = if self.no_opt { None } else { const_operand.cloned() };

        let mut ci = CiUnary {
            op: &symbol,
            operand_type,
            const_operand: const_operand.as_ref(),
            out: CompilationOutput::default(),
            rewritten_op: None,
        };
        let compiled = self.core.ask_unary(&mut self.scope, &mut ci)?;
        if !compiled || !ci.out.is_filled() {
            return Err(ExprError::unary_op_not_defined(&symbol, operand_type, node.position));
        }

        let rewritten = ci.rewritten_op.take();
        let out = ci.out;
        node.op = rewritten.unwrap_or(symbol);
        self.emit_output(out, InvokeForm::Unary, node.op.clone(), 1, node.position, span_start, asm);
        Ok(())
    }

    fn compile_binary(&mut self, ast: &mut Ast, asm: &mut Assembly) -> ExprResult<()> {
        let Ast::Binary(node) = ast else { unreachable!() };

        let mut symbol = self.cfg().resolve_binary_symbol(&node.parsed_op).to_owned();
        if symbol == "="
            && self
                .cfg()
                .compile_flags
                .contains(CompileFlags::ALIAS_EQUALS_OPERATOR)
        {
            symbol = "==".to_owned();
        }

        self.compile_node(&mut node.lhs, asm)?;
        self.compile_node(&mut node.rhs, asm)?;

        let mut outcome = self.try_compile_binary_once(&symbol, node.position, asm)?;

        if matches!(outcome, BinaryOutcome::NoMatch) {
            // auto-cast and retry exactly once
            if self.try_auto_cast_binary(&symbol, asm)? {
                outcome = self.try_compile_binary_once(&symbol, node.position, asm)?;
            }
        }

        match outcome {
            BinaryOutcome::Compiled { output, rewritten } => {
                node.op = rewritten.unwrap_or(symbol);
                if let Some((out, span_start)) = output {
                    self.emit_output(out, InvokeForm::Binary, node.op.clone(), 2, node.position, span_start, asm);
                }
                Ok(())
            }
            BinaryOutcome::NoMatch => {
                let starts = asm.arg_starts(2);
                let (lhs_type, _) = asm.span_info(starts[0], starts[1]);
                let (rhs_type, _) = asm.span_info(starts[1], asm.len());
                Err(ExprError::binary_op_not_defined(&symbol, lhs_type, rhs_type, node.position))
            }
        }
    }

    /// Runs binary plug-in dispatch once over the two topmost spans.
    fn try_compile_binary_once(&mut self, symbol: &str, position: usize, asm: &mut Assembly) -> ExprResult<BinaryOutcome> {
        let starts = asm.arg_starts(2);
        let (lhs_start, rhs_start) = (starts[0], starts[1]);
        let end = asm.len();
        let (lhs_type, const_lhs) = asm.span_info(lhs_start, rhs_start);
        let (rhs_type, const_rhs) = asm.span_info(rhs_start, end);
        let (const_lhs, const_rhs) = if self.no_opt {
            (None, None)
        } else {
            (const_lhs.cloned(), const_rhs.cloned())
        };

        let mut ci = CiBinary {
            op: symbol,
            lhs_type,
            rhs_type,
            const_lhs: const_lhs.as_ref(),
            const_rhs: const_rhs.as_ref(),
            out: CompilationOutput::default(),
            rewritten_op: None,
            const_fold: None,
        };
        let compiled = self.core.ask_binary(&mut self.scope, &mut ci)?;
        if !compiled {
            return Ok(BinaryOutcome::NoMatch);
        }

        if ci.out.is_filled() {
            return Ok(BinaryOutcome::Compiled {
                output: Some((ci.out, lhs_start)),
                rewritten: ci.rewritten_op,
            });
        }

        // partial-constant elimination
        if !self.no_opt && let Some(fold) = ci.const_fold {
            match fold {
                BinaryConstFold::DiscardConstOperand => {
                    if const_lhs.is_some() {
                        asm.remove_span(lhs_start, rhs_start);
                    } else {
                        asm.remove_span(rhs_start, end);
                    }
                }
                BinaryConstFold::Constant(value) => {
                    asm.ops.truncate(lhs_start);
                    let tag = value.tag();
                    asm.push(OpKind::Constant(value), tag, position, lhs_start);
                }
            }
            return Ok(BinaryOutcome::Compiled {
                output: None,
                rewritten: ci.rewritten_op,
            });
        }

        Ok(BinaryOutcome::NoMatch)
    }

    /// Asks plug-ins for casts over a failed binary pair and applies them.
    fn try_auto_cast_binary(&mut self, symbol: &str, asm: &mut Assembly) -> ExprResult<bool> {
        let starts = asm.arg_starts(2);
        let (lhs_start, rhs_start) = (starts[0], starts[1]);
        let end = asm.len();
        let (lhs_type, const_lhs) = asm.span_info(lhs_start, rhs_start);
        let (rhs_type, const_rhs) = asm.span_info(rhs_start, end);

        let mut ci = CiAutoCast {
            op: symbol,
            lhs_type,
            rhs_type,
            lhs_is_const: const_lhs.is_some(),
            rhs_is_const: const_rhs.is_some(),
            cast_lhs: None,
            cast_rhs: None,
        };
        if !self.core.ask_auto_cast(&mut self.scope, &mut ci)? || !ci.is_filled() {
            return Ok(false);
        }

        // right side first so the left insertion index stays valid
        if let Some(cast) = ci.cast_rhs {
            self.apply_cast(cast, rhs_start, asm.len(), asm)?;
        }
        if let Some(cast) = ci.cast_lhs {
            self.apply_cast(cast, lhs_start, rhs_start, asm)?;
        }
        Ok(true)
    }

    /// Inserts a cast invocation at the end of the operand span `start..end`,
    /// or folds it right away when the operand is a single constant.
    fn apply_cast(&mut self, cast: CastProposal, start: usize, end: usize, asm: &mut Assembly) -> ExprResult<()> {
        if !self.no_opt
            && end - start == 1
            && let OpKind::Constant(value) = &asm.ops[start].kind
        {
            let args = [value.clone()];
            let casted = (cast.callback)(&mut self.scope, &args).map_err(|err| {
                err.wrap(
                    ErrorKind::ExceptionInPlugin,
                    format!("Exception caught in auto-cast callback {:?}.", cast.callback_name),
                )
            })?;
            asm.ops[start].result_type = casted.tag();
            asm.ops[start].kind = OpKind::Constant(casted);
            return Ok(());
        }
        let position = asm.ops[end - 1].position;
        asm.insert(
            end,
            OpCode {
                kind: OpKind::Invoke {
                    callback: cast.callback,
                    name: cast.callback_name,
                    form: InvokeForm::Function,
                    arity: 1,
                    decompile_name: cast.decompile_name,
                },
                result_type: cast.result_type,
                position,
                span_start: start,
            },
        );
        Ok(())
    }

    fn compile_conditional(&mut self, ast: &mut Ast, asm: &mut Assembly) -> ExprResult<()> {
        let Ast::Conditional(node) = ast else { unreachable!() };

        self.compile_node(&mut node.q, asm)?;

        // constant condition: only the surviving branch is compiled
        let q_start = asm.ops[asm.len() - 1].span_start;
        if !self.no_opt {
            let truthy = asm.span_info(q_start, asm.len()).1.map(Value::is_truthy);
            if let Some(truthy) = truthy {
                asm.remove_span(q_start, asm.len());
                return self.compile_node(if truthy { &mut node.t } else { &mut node.f }, asm);
            }
        }

        let jif = asm.len();
        asm.push(OpKind::JumpIfFalse { delta: 0 }, types::BOOLEAN, node.question_position, q_start);

        let t_start = jif + 1;
        self.compile_node(&mut node.t, asm)?;
        let mut jmp = asm.len();
        asm.push(OpKind::Jump { delta: 0 }, asm.ops[jmp - 1].result_type, node.colon_position, t_start);

        self.compile_node(&mut node.f, asm)?;

        // branch types must agree; otherwise ask for an auto-cast once
        let t_type = asm.ops[jmp - 1].result_type;
        let f_type = asm.ops[asm.len() - 1].result_type;
        if t_type != f_type {
            let (_, t_const) = asm.span_info(t_start, jmp);
            let (_, f_const) = asm.span_info(jmp + 1, asm.len());
            let mut ci = CiAutoCast {
                op: ":",
                lhs_type: t_type,
                rhs_type: f_type,
                lhs_is_const: t_const.is_some(),
                rhs_is_const: f_const.is_some(),
                cast_lhs: None,
                cast_rhs: None,
            };
            if self.core.ask_auto_cast(&mut self.scope, &mut ci)? && ci.is_filled() {
                if let Some(cast) = ci.cast_rhs {
                    self.apply_cast(cast, jmp + 1, asm.len(), asm)?;
                }
                if let Some(cast) = ci.cast_lhs {
                    self.apply_cast(cast, t_start, jmp, asm)?;
                    if !matches!(asm.ops[jmp].kind, OpKind::Jump { .. }) {
                        jmp += 1;
                    }
                }
            }
            let t_type = asm.ops[jmp - 1].result_type;
            let f_type = asm.ops[asm.len() - 1].result_type;
            if t_type != f_type {
                return Err(ExprError::new(
                    ErrorKind::IncompatibleTypesInConditional,
                    format!("Incompatible types for conditional expression operator <{t_type}> : <{f_type}>."),
                )
                .at(node.question_position));
            }
        }

        // patch the jumps: JumpIfFalse lands on F's first opcode, Jump on the
        // opcode following F
        let f_start = jmp + 1;
        match &mut asm.ops[jif].kind {
            OpKind::JumpIfFalse { delta } => *delta = f_start - jif,
            _ => unreachable!("jump placeholder moved"),
        }
        let end = asm.len();
        match &mut asm.ops[jmp].kind {
            OpKind::Jump { delta } => *delta = end - jmp,
            _ => unreachable!("jump placeholder moved"),
        }

        // the whole conditional forms one span ending in F's last opcode
        asm.ops[end - 1].span_start = q_start;
        Ok(())
    }

    /// Resolves a nested expression now and emits the subroutine call.
    fn emit_nested_resolved(&mut self, name: &str, position: usize, asm: &mut Assembly) -> ExprResult<()> {
        let target = CompilerCore::get_named(self.core, name).map_err(|err| {
            if err.kind() == ErrorKind::NamedExpressionNotFound {
                ExprError::new(
                    ErrorKind::NestedExpressionNotFoundCT,
                    format!("Compile-time defined nested expression {name:?} not found."),
                )
                .at(position)
            } else {
                err
            }
        })?;
        let result_type = target.result_type();
        let span_start = asm.len();
        asm.push(OpKind::Nested(NestedTarget::Resolved(target)), result_type, position, span_start);
        Ok(())
    }

    /// Compiles the nested-expression function: the one-argument form
    /// resolves at compile time, the two/three-argument form at evaluation
    /// time with the replacement value (or `throw`) covering a miss.
    fn compile_nested_function(&mut self, ast: &mut Ast, asm: &mut Assembly) -> ExprResult<()> {
        let Ast::Function(node) = ast else { unreachable!() };
        let parsed_name = node.parsed_name.clone();
        let mismatch = move |position: usize| {
            ExprError::new(
                ErrorKind::NestedExpressionCallArgumentMismatch,
                format!("Erroneous arguments given with nested expression function {parsed_name:?}."),
            )
            .at(position)
        };

        match node.args.len() {
            1 if self
                .cfg()
                .compile_flags
                .contains(CompileFlags::ALLOW_COMPILE_TIME_NESTED_EXPRESSIONS) =>
            {
                let name = nested_name_operand(&node.args[0], self.cfg())?;
                self.emit_nested_resolved(&name, node.position, asm)
            }
            2 | 3 => {
                let throw_on_miss = if node.args.len() == 3 {
                    match &node.args[2] {
                        Ast::Identifier(ident)
                            if ident.parsed_name.eq_ignore_ascii_case(&self.cfg().nested_throw_keyword) =>
                        {
                            true
                        }
                        other => return Err(mismatch(other.position())),
                    }
                } else {
                    false
                };

                // the name may be an unquoted identifier; compile a literal
                // copy and leave the AST untouched for normalization
                let name_position = node.args[0].position();
                let mut name_node = match &node.args[0] {
                    Ast::Identifier(ident)
                        if self
                            .cfg()
                            .compile_flags
                            .contains(CompileFlags::ALLOW_IDENTIFIERS_FOR_NESTED_EXPRESSIONS) =>
                    {
                        Ast::Literal(crate::ast::Literal {
                            value: Value::string(ident.parsed_name.clone()),
                            position: ident.position,
                            hint: crate::fmt::NumberFormatHint::None,
                        })
                    }
                    other => other.clone(),
                };
                self.compile_node(&mut name_node, asm)?;
                if asm.ops[asm.len() - 1].result_type != types::STRING {
                    return Err(mismatch(name_position));
                }
                let name_start = asm.ops[asm.len() - 1].span_start;

                self.compile_node(&mut node.args[1], asm)?;
                let result_type = asm.ops[asm.len() - 1].result_type;

                asm.push(
                    OpKind::Nested(NestedTarget::Late {
                        result_type,
                        throw_on_miss,
                        registry: Arc::downgrade(self.core),
                    }),
                    result_type,
                    node.position,
                    name_start,
                );
                Ok(())
            }
            _ => Err(mismatch(node.position)),
        }
    }

    /// Emits the winning plug-in output: a folded constant replaces the
    /// argument opcodes, a callback becomes an invocation.
    fn emit_output(
        &mut self,
        out: CompilationOutput,
        form: InvokeForm,
        name: String,
        arity: usize,
        position: usize,
        span_start: usize,
        asm: &mut Assembly,
    ) {
        if let Some(constant) = out.constant {
            debug_assert!(
                asm.ops[span_start..]
                    .iter()
                    .all(|op| matches!(op.kind, OpKind::Constant(_))),
                "plug-in returned a constant for non-constant arguments"
            );
            asm.ops.truncate(span_start);
            let tag = constant.tag();
            asm.push(OpKind::Constant(constant), tag, position, span_start);
            return;
        }
        let callback = out.callback.expect("filled output without callback");
        let result_type = out.result_type.expect("filled output without result type");
        asm.push(
            OpKind::Invoke {
                callback,
                name,
                form,
                arity,
                decompile_name: None,
            },
            result_type,
            position,
            span_start,
        );
    }

    /// Collects argument types and single-constant values for dispatch.
    fn collect_args(&self, asm: &Assembly, starts: &[usize]) -> (SmallVec<[TypeTag; 4]>, SmallVec<[Option<Value>; 4]>) {
        let mut arg_types = SmallVec::new();
        let mut consts = SmallVec::new();
        for (i, &start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(asm.len());
            let (tag, constant) = asm.span_info(start, end);
            arg_types.push(tag);
            consts.push(if self.no_opt { None } else { constant.cloned() });
        }
        (arg_types, consts)
    }
}

/// Extracts the constant name operand of a nested-expression term.
fn nested_name_operand(arg: &Ast, cfg: &CompilerConfig) -> ExprResult<String> {
    match arg {
        Ast::Literal(lit) if lit.value.tag() == types::STRING => Ok(lit.value.unbox_str().to_owned()),
        Ast::Identifier(ident)
            if cfg
                .compile_flags
                .contains(CompileFlags::ALLOW_IDENTIFIERS_FOR_NESTED_EXPRESSIONS) =>
        {
            Ok(ident.parsed_name.clone())
        }
        other => Err(ExprError::new(
            ErrorKind::NamedExpressionNotConstant,
            "Expression name has to be constant, if no expression return type is given.",
        )
        .at(other.position())),
    }
}
