//! Typed publish/subscribe registry.
//!
//! Every observable state change of the player goes through an [`EventBus`].
//! Events are registered once with an ordered parameter schema; subscribers
//! declare how many parameters they accept and are checked against the
//! number of required parameters when they subscribe. In validating mode,
//! `publish` checks the arguments against the schema before any subscriber
//! runs.
//!
//! The bus is an explicit instance: clone it to share it, there is no global.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde_json::Value;
use tracing::trace;

use crate::errors::BusError;

/// Primitive type of an event parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamType {
    Number,
    String,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::Number => "number",
            ParamType::String => "string",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ParamType::Number, Value::Number(_))
                | (ParamType::String, Value::String(_))
                | (ParamType::Boolean, Value::Bool(_))
                | (ParamType::Object, Value::Object(_))
                | (ParamType::Array, Value::Array(_))
        )
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamType {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "number" => Ok(ParamType::Number),
            "string" => Ok(ParamType::String),
            "boolean" => Ok(ParamType::Boolean),
            "object" => Ok(ParamType::Object),
            "array" => Ok(ParamType::Array),
            other => Err(BusError::InvalidParamType(other.to_string())),
        }
    }
}

/// One entry of an event's parameter schema.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamDef {
    pub name: String,
    pub ty: ParamType,
    pub optional: bool,
    pub description: Option<String>,
}

impl ParamDef {
    pub fn required(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: false,
            description: None,
        }
    }

    pub fn optional(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            optional: true,
            ..Self::required(name, ty)
        }
    }

    /// Builds a definition from a textual type name (`"number"`, `"string"`, ...).
    pub fn parse(name: impl Into<String>, type_name: &str, optional: bool) -> Result<Self, BusError> {
        let ty = type_name.parse::<ParamType>()?;
        Ok(Self {
            name: name.into(),
            ty,
            optional,
            description: None,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Registered schema of an event.
#[derive(Clone, Debug, PartialEq)]
pub struct EventDefinition {
    pub name: String,
    pub params: Vec<ParamDef>,
    pub description: Option<String>,
    pub registrant: Option<String>,
}

impl EventDefinition {
    /// Number of non-optional parameters.
    pub fn required_count(&self) -> usize {
        self.params.iter().filter(|p| !p.optional).count()
    }

    fn check(&self) -> Result<(), BusError> {
        if self.name.is_empty() {
            return Err(BusError::EmptyEventName);
        }

        let mut seen_optional = false;
        for (i, param) in self.params.iter().enumerate() {
            if param.name.is_empty() {
                return Err(BusError::EmptyParamName {
                    event: self.name.clone(),
                });
            }
            if self.params[..i].iter().any(|p| p.name == param.name) {
                return Err(BusError::DuplicateParam {
                    event: self.name.clone(),
                    param: param.name.clone(),
                });
            }
            if param.optional {
                seen_optional = true;
            } else if seen_optional {
                return Err(BusError::RequiredAfterOptional {
                    event: self.name.clone(),
                    param: param.name.clone(),
                });
            }
        }
        Ok(())
    }

    fn validate_args(&self, args: &[Value]) -> Result<(), BusError> {
        if args.len() > self.params.len() {
            return Err(BusError::TooManyArguments {
                event: self.name.clone(),
                expected: self.params.len(),
                got: args.len(),
            });
        }

        for (i, param) in self.params.iter().enumerate() {
            let valid = match args.get(i) {
                None | Some(Value::Null) => param.optional,
                Some(value) => param.ty.matches(value),
            };
            if !valid {
                return Err(BusError::InvalidArgument {
                    event: self.name.clone(),
                    param: param.name.clone(),
                    expected: param.ty.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Identifies a subscription so it can be removed later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A subscriber callback together with the number of parameters it accepts.
///
/// The arity is what `subscribe` checks against the event's required
/// parameters; arguments are always passed as a slice.
#[derive(Clone)]
pub struct Handler {
    arity: usize,
    callback: Arc<dyn Fn(&[Value]) + Send + Sync>,
}

impl Handler {
    pub fn new<F>(arity: usize, callback: F) -> Self
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        Self {
            arity,
            callback: Arc::new(callback),
        }
    }

    pub fn from_fn0<F>(callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::new(0, move |_| callback())
    }

    pub fn from_fn1<F>(callback: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Self::new(1, move |args| callback(args.first().unwrap_or(&Value::Null)))
    }

    pub fn from_fn2<F>(callback: F) -> Self
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        Self::new(2, move |args| {
            callback(
                args.first().unwrap_or(&Value::Null),
                args.get(1).unwrap_or(&Value::Null),
            )
        })
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    fn call(&self, args: &[Value]) {
        (self.callback)(args)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").field("arity", &self.arity).finish()
    }
}

struct EventEntry {
    definition: Arc<EventDefinition>,
    subscribers: Vec<(SubscriptionId, Handler)>,
    listeners: Vec<Sender<Vec<Value>>>,
}

struct BusInner {
    validating: bool,
    next_id: AtomicU64,
    events: Mutex<HashMap<String, EventEntry>>,
}

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let events = self.events().len();
        f.debug_struct("EventBus")
            .field("validating", &self.inner.validating)
            .field("events", &events)
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(true)
    }
}

impl EventBus {
    /// Creates a bus. With `validating`, every publish is checked against
    /// the event schema before dispatch.
    pub fn new(validating: bool) -> Self {
        Self {
            inner: Arc::new(BusInner {
                validating,
                next_id: AtomicU64::new(1),
                events: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn is_validating(&self) -> bool {
        self.inner.validating
    }

    fn events(&self) -> MutexGuard<'_, HashMap<String, EventEntry>> {
        self.inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(
        &self,
        name: &str,
        params: Vec<ParamDef>,
        description: Option<&str>,
        registrant: Option<&str>,
    ) -> Result<(), BusError> {
        let definition = EventDefinition {
            name: name.to_string(),
            params,
            description: description.map(str::to_string),
            registrant: registrant.map(str::to_string),
        };
        definition.check()?;

        let mut events = self.events();
        if events.contains_key(name) {
            return Err(BusError::AlreadyRegistered(name.to_string()));
        }
        events.insert(
            name.to_string(),
            EventEntry {
                definition: Arc::new(definition),
                subscribers: Vec::new(),
                listeners: Vec::new(),
            },
        );
        trace!(event = name, "Event registered");
        Ok(())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.events().contains_key(name)
    }

    pub fn definition(&self, name: &str) -> Option<Arc<EventDefinition>> {
        self.events().get(name).map(|e| Arc::clone(&e.definition))
    }

    pub fn subscriber_count(&self, name: &str) -> usize {
        self.events()
            .get(name)
            .map_or(0, |e| e.subscribers.len() + e.listeners.len())
    }

    pub fn subscribe(&self, name: &str, handler: Handler) -> Result<SubscriptionId, BusError> {
        let mut events = self.events();
        let entry = events
            .get_mut(name)
            .ok_or_else(|| BusError::NotRegistered(name.to_string()))?;

        let required = entry.definition.required_count();
        if handler.arity() < required {
            return Err(BusError::HandlerArity {
                event: name.to_string(),
                accepted: handler.arity(),
                required,
            });
        }

        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        entry.subscribers.push((id, handler));
        Ok(id)
    }

    /// Returns a channel that receives a copy of every argument list
    /// published on `name`. The channel is dropped from the bus at the
    /// first publish after its receiver is gone.
    pub fn listen(&self, name: &str) -> Result<Receiver<Vec<Value>>, BusError> {
        let mut events = self.events();
        let entry = events
            .get_mut(name)
            .ok_or_else(|| BusError::NotRegistered(name.to_string()))?;

        let (tx, rx) = unbounded::<Vec<Value>>();
        entry.listeners.push(tx);
        trace!(event = name, "Listener added");
        Ok(rx)
    }

    /// Removes one subscription, or all of them (listeners included) when
    /// `id` is `None`.
    ///
    /// Returns whether anything was removed.
    pub fn unsubscribe(&self, name: &str, id: Option<SubscriptionId>) -> Result<bool, BusError> {
        let mut events = self.events();
        let entry = events
            .get_mut(name)
            .ok_or_else(|| BusError::NotRegistered(name.to_string()))?;

        let before = entry.subscribers.len() + entry.listeners.len();
        match id {
            Some(id) => entry.subscribers.retain(|(sid, _)| *sid != id),
            None => {
                entry.subscribers.clear();
                entry.listeners.clear();
            }
        }
        Ok(entry.subscribers.len() + entry.listeners.len() != before)
    }

    /// Sends `args` to every listener of `name`, then invokes every
    /// subscriber in subscription order.
    ///
    /// Returns the number of listeners and handlers reached. Handlers run
    /// outside the bus lock and may publish or subscribe themselves.
    pub fn publish(&self, name: &str, args: &[Value]) -> Result<usize, BusError> {
        let (handlers, listeners): (Vec<Handler>, usize) = {
            let mut events = self.events();
            let entry = events
                .get_mut(name)
                .ok_or_else(|| BusError::NotRegistered(name.to_string()))?;

            if self.inner.validating {
                entry.definition.validate_args(args)?;
            }
            entry.listeners.retain(|tx| tx.send(args.to_vec()).is_ok());
            (
                entry.subscribers.iter().map(|(_, h)| h.clone()).collect(),
                entry.listeners.len(),
            )
        };

        for handler in &handlers {
            handler.call(args);
        }
        Ok(listeners + handlers.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn vol_bus() -> EventBus {
        let bus = EventBus::new(true);
        bus.register(
            "vol",
            vec![ParamDef::required("volume", ParamType::Number)],
            Some("volume changed"),
            Some("test"),
        )
        .unwrap();
        bus
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let bus = vol_bus();
        assert_eq!(
            bus.register("vol", vec![], None, None),
            Err(BusError::AlreadyRegistered("vol".into()))
        );
        assert_eq!(bus.register("", vec![], None, None), Err(BusError::EmptyEventName));
    }

    #[test]
    fn test_register_schema_checks() {
        let bus = EventBus::new(true);
        let err = bus
            .register(
                "bad",
                vec![
                    ParamDef::optional("a", ParamType::Number),
                    ParamDef::required("b", ParamType::String),
                ],
                None,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, BusError::RequiredAfterOptional { .. }));

        let err = bus
            .register(
                "dup",
                vec![
                    ParamDef::required("a", ParamType::Number),
                    ParamDef::optional("a", ParamType::String),
                ],
                None,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, BusError::DuplicateParam { .. }));

        assert_eq!(
            ParamDef::parse("a", "float", false),
            Err(BusError::InvalidParamType("float".into()))
        );
        assert!(!bus.is_registered("bad"));
        assert!(!bus.is_registered("dup"));
    }

    #[test]
    fn test_subscribe_arity_check() {
        let bus = vol_bus();
        let err = bus.subscribe("vol", Handler::from_fn0(|| {})).unwrap_err();
        assert!(matches!(
            err,
            BusError::HandlerArity {
                accepted: 0,
                required: 1,
                ..
            }
        ));
        assert!(bus.subscribe("vol", Handler::from_fn1(|_| {})).is_ok());
        assert!(bus.subscribe("vol", Handler::from_fn2(|_, _| {})).is_ok());
        assert!(matches!(
            bus.subscribe("nope", Handler::from_fn0(|| {})),
            Err(BusError::NotRegistered(_))
        ));
    }

    #[test]
    fn test_vol_scenario() {
        let bus = vol_bus();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);

        assert!(bus.subscribe("vol", Handler::from_fn0(|| {})).is_err());
        bus.subscribe(
            "vol",
            Handler::from_fn1(move |v| sink.lock().unwrap().push(v.clone())),
        )
        .unwrap();

        let err = bus.publish("vol", &[json!("loud")]).unwrap_err();
        assert!(matches!(err, BusError::InvalidArgument { .. }));
        assert!(received.lock().unwrap().is_empty());

        assert_eq!(bus.publish("vol", &[json!(0.5)]), Ok(1));
        assert_eq!(*received.lock().unwrap(), vec![json!(0.5)]);
    }

    #[test]
    fn test_publish_in_subscription_order() {
        let bus = vol_bus();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            bus.subscribe(
                "vol",
                Handler::from_fn1(move |_| order.lock().unwrap().push(tag)),
            )
            .unwrap();
        }

        assert_eq!(bus.publish("vol", &[json!(1)]), Ok(3));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_optional_params() {
        let bus = EventBus::new(true);
        bus.register(
            "index",
            vec![ParamDef::optional("index", ParamType::Number)],
            None,
            None,
        )
        .unwrap();
        bus.subscribe("index", Handler::from_fn0(|| {})).unwrap();

        assert_eq!(bus.publish("index", &[]), Ok(1));
        assert_eq!(bus.publish("index", &[Value::Null]), Ok(1));
        assert_eq!(bus.publish("index", &[json!(3)]), Ok(1));
        assert!(bus.publish("index", &[json!("3")]).is_err());
        assert!(bus.publish("index", &[json!(3), json!(4)]).is_err());
    }

    #[test]
    fn test_non_validating_bus() {
        let bus = EventBus::new(false);
        bus.register(
            "vol",
            vec![ParamDef::required("volume", ParamType::Number)],
            None,
            None,
        )
        .unwrap();
        let rx = bus.listen("vol").unwrap();
        assert_eq!(bus.publish("vol", &[json!("loud")]), Ok(1));
        assert_eq!(rx.try_recv().unwrap(), vec![json!("loud")]);
    }

    #[test]
    fn test_dropped_listener_is_pruned() {
        let bus = vol_bus();
        let kept = bus.listen("vol").unwrap();
        let dropped = bus.listen("vol").unwrap();
        assert_eq!(bus.subscriber_count("vol"), 2);

        drop(dropped);
        assert_eq!(bus.publish("vol", &[json!(0.5)]), Ok(1));
        assert_eq!(bus.subscriber_count("vol"), 1);
        assert_eq!(kept.try_recv().unwrap(), vec![json!(0.5)]);

        assert_eq!(bus.unsubscribe("vol", None), Ok(true));
        assert_eq!(bus.subscriber_count("vol"), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = vol_bus();
        let a = bus.subscribe("vol", Handler::from_fn1(|_| {})).unwrap();
        bus.subscribe("vol", Handler::from_fn1(|_| {})).unwrap();

        assert_eq!(bus.unsubscribe("vol", Some(a)), Ok(true));
        assert_eq!(bus.unsubscribe("vol", Some(a)), Ok(false));
        assert_eq!(bus.subscriber_count("vol"), 1);
        assert_eq!(bus.unsubscribe("vol", None), Ok(true));
        assert_eq!(bus.unsubscribe("vol", None), Ok(false));
        assert!(bus.unsubscribe("other", None).is_err());
    }

    #[test]
    fn test_reentrant_publish() {
        let bus = vol_bus();
        bus.register("echo", vec![], None, None).unwrap();
        let rx = bus.listen("echo").unwrap();

        let inner = bus.clone();
        bus.subscribe(
            "vol",
            Handler::from_fn1(move |_| {
                inner.publish("echo", &[]).unwrap();
            }),
        )
        .unwrap();

        bus.publish("vol", &[json!(0.1)]).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Vec::<Value>::new());
    }
}
