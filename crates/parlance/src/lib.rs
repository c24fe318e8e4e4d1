#![doc = include_str!("../../../README.md")]

mod ast;
mod compiler;
mod config;
mod error;
mod expression;
mod fmt;
mod lexer;
mod normalizer;
mod parser;
mod plugin;
pub mod plugins;
mod program;
mod scope;
mod value;
mod vm;

pub use crate::{
    compiler::{Compiler, ExpressionRepository},
    config::{CompileFlags, CompilerConfig, FunctionName, NormalizeFlags},
    error::{ErrorEntry, ErrorKind, Expectation, ExprError, ExprResult},
    expression::{CompileTimes, Expression},
    fmt::{NumberFormat, NumberFormatHint},
    plugin::{
        BinaryConstFold, Callback, CastProposal, CiAutoCast, CiBinary, CiFunction, CiUnary, CompilationOutput,
        CompilerPlugin, FunctionHint, priority,
    },
    program::Program,
    scope::{CtStore, NamedResource, Scope},
    value::{HostValue, TypeInfo, TypeTag, Value, types},
};
