use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Num(f64),
    Text(String),
    Flag(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(v) => write!(f, "{v:.3}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Flag(b) => write!(f, "{b}"),
        }
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Num(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Num(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Self::Num(v as f64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Flag(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    fields: Vec<(&'static str, Value)>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((key, value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn num(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            Value::Num(v) => Some(*v),
            _ => None,
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

pub trait TelemetrySink {
    fn record_event(&self, name: &str, payload: Payload);
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    pub name: String,
    pub payload: Payload,
}

#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<TelemetryEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.borrow().iter().filter(|e| e.name == name).count()
    }

    pub fn last(&self, name: &str) -> Option<TelemetryEvent> {
        self.events
            .borrow()
            .iter()
            .rev()
            .find(|e| e.name == name)
            .cloned()
    }
}

impl TelemetrySink for EventLog {
    fn record_event(&self, name: &str, payload: Payload) {
        self.events.borrow_mut().push(TelemetryEvent {
            name: name.to_string(),
            payload,
        });
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn record_event(&self, name: &str, payload: Payload) {
        log::debug!(target: "telemetry", "{name} {payload}");
    }
}
