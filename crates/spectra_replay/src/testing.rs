//! Test doubles for the engine boundary.
//!
//! [`ScriptedHandle`] is an [`EngineObject`] whose shape is declared up
//! front: which methods exist, what they return or raise, and which nested
//! objects hang off it. Every call is recorded in a shared [`CallLog`] so
//! tests can assert on what the adapter actually reached.

use crate::adapter::EngineObject;
use crate::error::CallError;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// A method invocation that reached a scripted object.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    /// Dotted path from the root handle (`""` for the root itself).
    pub path: String,
    pub method: String,
    pub args: Vec<Value>,
}

/// Calls recorded across a handle and all of its children.
#[derive(Clone, Debug, Default)]
pub struct CallLog(Arc<Mutex<Vec<RecordedCall>>>);

impl CallLog {
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.0.lock().clone()
    }

    /// `path.method` strings, in call order.
    pub fn names(&self) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .map(|c| {
                if c.path.is_empty() {
                    c.method.clone()
                } else {
                    format!("{}.{}", c.path, c.method)
                }
            })
            .collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.0.lock().iter().filter(|c| c.method == method).count()
    }

    fn push(&self, call: RecordedCall) {
        self.0.lock().push(call);
    }
}

type Responder = Box<dyn Fn(&[Value]) -> Result<Value, CallError>>;

/// A programmable engine object.
pub struct ScriptedHandle {
    path: String,
    methods: Vec<(String, Responder)>,
    children: Vec<(String, ScriptedHandle)>,
    log: CallLog,
}

impl Default for ScriptedHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedHandle {
    pub fn new() -> Self {
        Self {
            path: String::new(),
            methods: Vec::new(),
            children: Vec::new(),
            log: CallLog::default(),
        }
    }

    /// Expose `method`, answering with `value`.
    pub fn returns(self, method: &str, value: Value) -> Self {
        self.responds(method, move |_| Ok(value.clone()))
    }

    /// Expose `method`, raising with `message`.
    pub fn throws(self, method: &str, message: &str) -> Self {
        let message = message.to_string();
        self.responds(method, move |_| Err(CallError::Threw(message.clone())))
    }

    /// Expose `method` with a custom responder.
    pub fn responds<F>(mut self, method: &str, responder: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, CallError> + 'static,
    {
        self.methods.push((method.to_string(), Box::new(responder)));
        self
    }

    /// Attach a nested object, reachable by name and by enumeration.
    pub fn child(mut self, name: &str, mut child: ScriptedHandle) -> Self {
        let path = if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.path, name)
        };
        child.rebase(path, self.log.clone());
        self.children.push((name.to_string(), child));
        self
    }

    /// The log shared by this handle and its children.
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    fn rebase(&mut self, path: String, log: CallLog) {
        for (name, child) in &mut self.children {
            child.rebase(format!("{path}.{name}"), log.clone());
        }
        self.path = path;
        self.log = log;
    }
}

impl EngineObject for ScriptedHandle {
    fn exposes(&self, method: &str) -> bool {
        self.methods.iter().any(|(name, _)| name == method)
    }

    fn invoke(&self, method: &str, args: &[Value]) -> Result<Value, CallError> {
        let Some((_, responder)) = self.methods.iter().find(|(name, _)| name == method) else {
            return Err(CallError::Missing);
        };
        self.log.push(RecordedCall {
            path: self.path.clone(),
            method: method.to_string(),
            args: args.to_vec(),
        });
        responder(args)
    }

    fn property(&self, name: &str) -> Option<&dyn EngineObject> {
        self.children
            .iter()
            .find(|(child_name, _)| child_name == name)
            .map(|(_, child)| child as &dyn EngineObject)
    }

    fn values(&self) -> Vec<&dyn EngineObject> {
        self.children
            .iter()
            .map(|(_, child)| child as &dyn EngineObject)
            .collect()
    }
}
