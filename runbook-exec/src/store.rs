use std::fmt;
use std::sync::{Arc, RwLock};

use runbook_core::types::RESERVED_BIND_NAMES;
use runbook_core::FuncRegistry;
use serde_json::{Map, Value};

use crate::error::RunError;

/// Root keys the store contributes to the evaluation environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKey {
    Vars,
    Steps,
    Parent,
    Previous,
    Included,
    Nodes,
    Params,
    Current,
}

impl RootKey {
    pub const ALL: [RootKey; 8] = [
        RootKey::Vars,
        RootKey::Steps,
        RootKey::Parent,
        RootKey::Previous,
        RootKey::Included,
        RootKey::Nodes,
        RootKey::Params,
        RootKey::Current,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RootKey::Vars => "vars",
            RootKey::Steps => "steps",
            RootKey::Parent => "parent",
            RootKey::Previous => "previous",
            RootKey::Included => "included",
            RootKey::Nodes => "nodes",
            RootKey::Params => "params",
            RootKey::Current => "current",
        }
    }
}

/// Process-lifetime key/value map shared by an operator and every operator it nests.
#[derive(Clone, Default)]
pub struct KvStore {
    inner: Arc<RwLock<Map<String, Value>>>,
}

impl KvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().ok().and_then(|m| m.get(key).cloned())
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        if let Ok(mut m) = self.inner.write() {
            m.insert(key.into(), value);
        }
    }

    pub fn delete(&self, key: &str) -> Option<Value> {
        self.inner.write().ok().and_then(|mut m| m.remove(key))
    }

    pub fn snapshot(&self) -> Map<String, Value> {
        self.inner.read().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn same_store(&self, other: &KvStore) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for KvStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.snapshot()).finish()
    }
}

/// One recorded step result. Skipped steps record `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub key: Option<String>,
    pub value: Value,
}

/// Scoped memory of one run.
#[derive(Debug, Clone)]
pub struct Store {
    vars: Map<String, Value>,
    steps: Vec<StepRecord>,
    bind_vars: Map<String, Value>,
    parent: Option<Value>,
    included: bool,
    nodes: Option<Value>,
    params: Option<Value>,
    current: Option<Value>,
    use_map: bool,
    kv: KvStore,
    funcs: FuncRegistry,
}

impl Store {
    pub fn new(vars: Map<String, Value>, use_map: bool, kv: KvStore, funcs: FuncRegistry) -> Self {
        Self {
            vars,
            steps: Vec::new(),
            bind_vars: Map::new(),
            parent: None,
            included: false,
            nodes: None,
            params: None,
            current: None,
            use_map,
            kv,
            funcs,
        }
    }

    /// Attach the snapshot an including operator prepared. Its `nodes` and
    /// `params` also become visible at this store's root.
    pub fn set_parent(&mut self, snapshot: Value) {
        self.nodes = snapshot.get(RootKey::Nodes.as_str()).cloned();
        self.params = snapshot.get(RootKey::Params.as_str()).cloned();
        self.parent = Some(snapshot);
    }

    pub fn set_included(&mut self, included: bool) {
        self.included = included;
    }

    pub fn included(&self) -> bool {
        self.included
    }

    pub fn vars(&self) -> &Map<String, Value> {
        &self.vars
    }

    pub fn set_var(&mut self, key: impl Into<String>, value: Value) {
        self.vars.insert(key.into(), value);
    }

    pub fn bind_vars(&self) -> &Map<String, Value> {
        &self.bind_vars
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn kv(&self) -> &KvStore {
        &self.kv
    }

    pub fn funcs(&self) -> &FuncRegistry {
        &self.funcs
    }

    /// Append a result. Records are never reordered or rewritten.
    pub fn record(&mut self, key: Option<String>, value: Value) {
        self.steps.push(StepRecord { key, value });
    }

    pub fn latest(&self) -> Option<&Value> {
        self.steps.last().map(|r| &r.value)
    }

    pub fn bind(&mut self, name: &str, value: Value) -> Result<(), RunError> {
        check_bind_name(name)?;
        self.bind_vars.insert(name.to_string(), value);
        Ok(())
    }

    /// Bind every entry or none of them.
    pub fn bind_all(&mut self, bindings: Map<String, Value>) -> Result<(), RunError> {
        for name in bindings.keys() {
            check_bind_name(name)?;
        }
        self.bind_vars.extend(bindings);
        Ok(())
    }

    pub fn set_current(&mut self, value: Value) {
        self.current = Some(value);
    }

    pub fn take_current(&mut self) -> Option<Value> {
        self.current.take()
    }

    /// Environment for ordinary expansion, including the in-flight `current` result.
    pub fn env(&self) -> Value {
        self.build_env(true)
    }

    /// Environment for pre-record expansion; `current` is never visible.
    pub fn env_before_record(&self) -> Value {
        self.build_env(false)
    }

    fn build_env(&self, with_current: bool) -> Value {
        let mut m = self.bind_vars.clone();
        m.insert(RootKey::Vars.as_str().into(), Value::Object(self.vars.clone()));
        m.insert(RootKey::Steps.as_str().into(), self.steps_value(self.use_map));
        if let Some(parent) = &self.parent {
            m.insert(RootKey::Parent.as_str().into(), parent.clone());
        }
        m.insert(RootKey::Included.as_str().into(), Value::Bool(self.included));
        if let Some(previous) = self.latest() {
            m.insert(RootKey::Previous.as_str().into(), previous.clone());
        }
        if let Some(nodes) = &self.nodes {
            m.insert(RootKey::Nodes.as_str().into(), nodes.clone());
        }
        if let Some(params) = &self.params {
            m.insert(RootKey::Params.as_str().into(), params.clone());
        }
        if with_current {
            if let Some(current) = &self.current {
                m.insert(RootKey::Current.as_str().into(), current.clone());
            }
        }
        Value::Object(m)
    }

    /// Copy of this scope handed to a child as its `parent`.
    pub fn snapshot(&self) -> Map<String, Value> {
        let mut m = self.bind_vars.clone();
        m.insert(RootKey::Vars.as_str().into(), Value::Object(self.vars.clone()));
        m.insert(RootKey::Steps.as_str().into(), self.steps_value(self.use_map));
        if let Some(parent) = &self.parent {
            m.insert(RootKey::Parent.as_str().into(), parent.clone());
        }
        m
    }

    /// Copy merged into an including operator as the include step's result.
    /// Steps are always a list here regardless of how the child declared them.
    pub fn normalized_snapshot(&self) -> Value {
        let mut m = self.bind_vars.clone();
        m.insert(RootKey::Vars.as_str().into(), Value::Object(self.vars.clone()));
        m.insert(RootKey::Steps.as_str().into(), self.steps_value(false));
        Value::Object(m)
    }

    fn steps_value(&self, as_map: bool) -> Value {
        if as_map {
            let mut m = Map::new();
            for (i, r) in self.steps.iter().enumerate() {
                let key = r.key.clone().unwrap_or_else(|| i.to_string());
                m.insert(key, r.value.clone());
            }
            Value::Object(m)
        } else {
            Value::Array(self.steps.iter().map(|r| r.value.clone()).collect())
        }
    }
}

fn check_bind_name(name: &str) -> Result<(), RunError> {
    if RESERVED_BIND_NAMES.contains(&name) {
        return Err(RunError::ReservedName(name.to_string()));
    }
    Ok(())
}
