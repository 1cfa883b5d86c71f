//! The global execution environment.
//!
//! `Globals` ties a [`Runtime`] instance to the environment table and to
//! the pluggable pieces the core consumes but does not implement: a
//! source compiler, a binary chunk undumper, a prototype loader and a
//! resource finder. Default undumper and loader implementations are
//! installed; a compiler, when present, is supplied by a separate
//! component.

use std::sync::Arc;

use bytecode_system::Prototype;
use core_types::{LuaError, Runtime, Table, Value};
use tracing::debug;

use crate::closure::Closure;

/// Converts Lua source text into a prototype.
pub trait Compiler: Send + Sync {
    /// Compile `source` into a prototype. The chunk name is used for
    /// error locations.
    fn compile(
        &self,
        rt: &Runtime,
        source: &[u8],
        chunk_name: &str,
    ) -> Result<Arc<Prototype>, LuaError>;
}

/// Loads a binary chunk into a prototype.
pub trait Undumper: Send + Sync {
    /// Load `bytes` as a binary chunk, or return `None` when the bytes
    /// are not a binary chunk at all (so a caller can fall back to
    /// source compilation).
    fn undump(
        &self,
        rt: &Runtime,
        bytes: &[u8],
        chunk_name: &str,
    ) -> Result<Option<Arc<Prototype>>, LuaError>;
}

/// Converts a prototype into a callable function value bound to an
/// environment.
pub trait Loader: Send + Sync {
    /// Wrap `prototype` into a callable with `env` as its environment.
    fn load(
        &self,
        prototype: Arc<Prototype>,
        chunk_name: &str,
        env: Value,
    ) -> Result<Value, LuaError>;
}

/// Locates the bytes of a named resource for the convenience loading
/// entry points.
pub trait ResourceFinder: Send + Sync {
    /// The resource's bytes, or `None` when it does not exist.
    fn find_resource(&self, name: &str) -> Option<Vec<u8>>;
}

/// The default undumper: the binary chunk loader of `bytecode_system`.
pub struct BinaryUndumper;

impl Undumper for BinaryUndumper {
    fn undump(
        &self,
        rt: &Runtime,
        bytes: &[u8],
        chunk_name: &str,
    ) -> Result<Option<Arc<Prototype>>, LuaError> {
        bytecode_system::undump(rt, bytes, chunk_name)
    }
}

/// The default loader: wraps the prototype in a [`Closure`] with the
/// environment seeded into the first upvalue.
pub struct ClosureLoader;

impl Loader for ClosureLoader {
    fn load(
        &self,
        prototype: Arc<Prototype>,
        _chunk_name: &str,
        env: Value,
    ) -> Result<Value, LuaError> {
        Ok(Value::function(Closure::with_env(prototype, env)))
    }
}

/// Global environment for executing chunks.
///
/// # Examples
///
/// ```
/// use interpreter::Globals;
///
/// let g = Globals::new();
/// // no compiler is installed by default, so text-only loading fails
/// assert!(g.load(b"print('hi')", "chunk", "t").is_err());
/// ```
pub struct Globals {
    /// The runtime instance shared by everything this environment runs.
    pub runtime: Arc<Runtime>,
    /// The globals table.
    pub env: Arc<Table>,
    /// The installed resource finder, if any.
    pub finder: Option<Box<dyn ResourceFinder>>,
    /// The installed compiler, if any.
    pub compiler: Option<Box<dyn Compiler>>,
    /// The installed undumper, if any.
    pub undumper: Option<Box<dyn Undumper>>,
    /// The installed loader, if any.
    pub loader: Option<Box<dyn Loader>>,
}

impl Globals {
    /// A fresh environment with the default undumper and loader.
    pub fn new() -> Globals {
        Globals {
            runtime: Runtime::new(),
            env: Arc::new(Table::new()),
            finder: None,
            compiler: None,
            undumper: Some(Box::new(BinaryUndumper)),
            loader: Some(Box::new(ClosureLoader)),
        }
    }

    /// The globals table as a value.
    pub fn env_value(&self) -> Value {
        Value::Table(Arc::clone(&self.env))
    }

    /// Load a chunk into a prototype.
    ///
    /// `mode` contains `b` to permit binary chunks and `t` to permit
    /// source text; `"bt"` tries binary first and falls back to the
    /// compiler when the signature is absent.
    pub fn load_prototype(
        &self,
        bytes: &[u8],
        chunk_name: &str,
        mode: &str,
    ) -> Result<Arc<Prototype>, LuaError> {
        if mode.contains('b') {
            let undumper = self
                .undumper
                .as_ref()
                .ok_or_else(|| LuaError::runtime("no undumper"))?;
            if let Some(p) = undumper.undump(&self.runtime, bytes, chunk_name)? {
                return Ok(p);
            }
        }
        if mode.contains('t') {
            let compiler = self
                .compiler
                .as_ref()
                .ok_or_else(|| LuaError::runtime("no compiler"))?;
            return compiler.compile(&self.runtime, bytes, chunk_name);
        }
        Err(LuaError::runtime(format!(
            "failed to load chunk {} using mode '{}'",
            chunk_name, mode
        )))
    }

    /// Load a chunk into a callable bound to the globals table.
    pub fn load(&self, bytes: &[u8], chunk_name: &str, mode: &str) -> Result<Value, LuaError> {
        self.load_with_env(bytes, chunk_name, mode, self.env_value())
    }

    /// Load a chunk into a callable bound to a custom environment.
    pub fn load_with_env(
        &self,
        bytes: &[u8],
        chunk_name: &str,
        mode: &str,
        env: Value,
    ) -> Result<Value, LuaError> {
        let proto = self.load_prototype(bytes, chunk_name, mode)?;
        debug!(chunk = chunk_name, "loaded chunk");
        self.load_prototype_value_with_env(proto, chunk_name, env)
    }

    /// Wrap an already-loaded prototype into a callable bound to the
    /// globals table.
    pub fn load_prototype_value(
        &self,
        proto: Arc<Prototype>,
        chunk_name: &str,
    ) -> Result<Value, LuaError> {
        self.load_prototype_value_with_env(proto, chunk_name, self.env_value())
    }

    /// Wrap an already-loaded prototype into a callable bound to `env`.
    pub fn load_prototype_value_with_env(
        &self,
        proto: Arc<Prototype>,
        chunk_name: &str,
        env: Value,
    ) -> Result<Value, LuaError> {
        let loader = self
            .loader
            .as_ref()
            .ok_or_else(|| LuaError::runtime("no loader"))?;
        loader.load(proto, chunk_name, env)
    }

    /// Convenience: find a file through the resource finder and load it
    /// as either binary or text.
    pub fn load_file(&self, filename: &str) -> Result<Value, LuaError> {
        let bytes = self
            .finder
            .as_ref()
            .and_then(|f| f.find_resource(filename))
            .ok_or_else(|| LuaError::runtime(format!("cannot load {}", filename)))?;
        self.load(&bytes, &format!("@{}", filename), "bt")
    }
}

impl Default for Globals {
    fn default() -> Self {
        Globals::new()
    }
}
