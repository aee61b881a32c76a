//! Antescofo values and their OSC representation.
//!
//! Antescofo has integers, floats, strings, booleans, tabs (ordered
//! collections of mixed values) and maps (key/value dictionaries).
//! OSC only carries flat argument lists, so tabs and maps are spread into
//! arguments on the way out and recognised heuristically on the way in.

use rosc::{OscArray, OscType};
use std::fmt;

/// A single Antescofo value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Tab(Tab),
    Map(Map),
}

impl Value {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Convert one OSC argument into a value.
    pub fn from_osc(arg: &OscType) -> Self {
        match arg {
            OscType::Int(i) => Value::Int(i64::from(*i)),
            OscType::Long(i) => Value::Int(*i),
            OscType::Float(f) => Value::Float(f64::from(*f)),
            OscType::Double(f) => Value::Float(*f),
            OscType::String(s) => Value::Str(s.clone()),
            OscType::Char(c) => Value::Str(c.to_string()),
            OscType::Bool(b) => Value::Bool(*b),
            OscType::Blob(bytes) => Value::Tab(bytes.iter().map(|b| Value::Int(i64::from(*b))).collect()),
            OscType::Time(t) => Value::Float(f64::from(t.seconds) + f64::from(t.fractional) / 4_294_967_296.0),
            OscType::Array(arr) => list_from_osc(&arr.content),
            OscType::Color(c) => Value::Tab(
                [c.red, c.green, c.blue, c.alpha]
                    .iter()
                    .map(|v| Value::Int(i64::from(*v)))
                    .collect(),
            ),
            OscType::Midi(m) => Value::Tab(
                [m.port, m.status, m.data1, m.data2]
                    .iter()
                    .map(|v| Value::Int(i64::from(*v)))
                    .collect(),
            ),
            OscType::Nil | OscType::Inf => Value::Nil,
        }
    }

    /// Convert a nested value into a single OSC argument.
    fn to_osc_nested(&self) -> OscType {
        match self {
            Value::Tab(tab) => OscType::Array(OscArray {
                content: tab.iter().map(Value::to_osc_nested).collect(),
            }),
            Value::Map(map) => OscType::Array(OscArray {
                content: map_to_osc(map),
            }),
            scalar => scalar_to_osc(scalar),
        }
    }
}

fn scalar_to_osc(value: &Value) -> OscType {
    match value {
        Value::Nil => OscType::Nil,
        Value::Bool(b) => OscType::Bool(*b),
        Value::Int(i) => match i32::try_from(*i) {
            Ok(small) => OscType::Int(small),
            Err(_) => OscType::Long(*i),
        },
        Value::Float(f) => OscType::Float(*f as f32),
        Value::Str(s) => OscType::String(s.clone()),
        Value::Tab(_) | Value::Map(_) => value.to_osc_nested(),
    }
}

fn map_to_osc(map: &Map) -> Vec<OscType> {
    let mut out = Vec::with_capacity(map.len() * 2);
    for (key, value) in map.iter() {
        out.push(OscType::String(key.to_string()));
        out.push(value.to_osc_nested());
    }
    out
}

/// Spread a value into OSC message arguments.
///
/// A top-level tab becomes one argument per element and a top-level map
/// becomes alternating `key, value` arguments. Anything nested deeper is
/// sent as an OSC array.
pub fn to_osc_args(value: &Value) -> Vec<OscType> {
    match value {
        Value::Tab(tab) => tab.iter().map(Value::to_osc_nested).collect(),
        Value::Map(map) => map_to_osc(map),
        scalar => vec![scalar_to_osc(scalar)],
    }
}

/// Interpret a list of OSC arguments as one value.
///
/// A single scalar argument is read as that scalar. A non-empty,
/// even-length list whose even positions are all strings is read as a
/// map; every other list is read as a tab.
pub fn from_osc_args(args: &[OscType]) -> Value {
    match args {
        [single] => Value::from_osc(single),
        _ => list_from_osc(args),
    }
}

fn list_from_osc(args: &[OscType]) -> Value {
    let looks_like_map = !args.is_empty()
        && args.len() % 2 == 0
        && args.iter().step_by(2).all(|a| matches!(a, OscType::String(_)));

    if looks_like_map {
        let mut map = Map::new();
        for pair in args.chunks_exact(2) {
            if let OscType::String(key) = &pair[0] {
                map.insert(key.clone(), Value::from_osc(&pair[1]));
            }
        }
        Value::Map(map)
    } else {
        Value::Tab(args.iter().map(Value::from_osc).collect())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "<undef>"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => {
                if x.is_finite() && x.fract() == 0.0 {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            Value::Str(s) => write!(f, "{}", s),
            Value::Tab(tab) => write!(f, "{}", tab),
            Value::Map(map) => write!(f, "{}", map),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Tab> for Value {
    fn from(v: Tab) -> Self {
        Value::Tab(v)
    }
}

impl From<Map> for Value {
    fn from(v: Map) -> Self {
        Value::Map(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Tab(v.into_iter().collect())
    }
}

/// An Antescofo tab: an ordered list of mixed values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tab {
    values: Vec<Value>,
}

impl Tab {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Replace the element at `index`, returning the previous value.
    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> Option<Value> {
        self.values
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, value.into()))
    }

    pub fn push(&mut self, value: impl Into<Value>) {
        self.values.push(value.into());
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.values
    }
}

impl<V: Into<Value>> FromIterator<V> for Tab {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Tab {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, "]")
    }
}

/// An Antescofo map. Keys keep their insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Map {
    entries: Vec<(String, Value)>,
}

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace a key. Replacing keeps the key's original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Map {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Map::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl fmt::Display for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", k, v)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tab_accessors() {
        let mut tab: Tab = vec![1, 2, 3].into_iter().collect();
        assert_eq!(tab.len(), 3);
        tab.push("four");
        assert_eq!(tab.get(3), Some(&Value::Str("four".to_string())));
        assert_eq!(tab.set(0, 10), Some(Value::Int(1)));
        assert_eq!(tab.to_string(), "[10, 2, 3, four]");
        assert_eq!(tab.set(99, 0), None);
    }

    #[test]
    fn test_map_keeps_insertion_order() {
        let mut map = Map::new();
        map.insert("b", 2);
        map.insert("a", 1.5);
        assert_eq!(map.insert("b", 3), Some(Value::Int(2)));
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(map.to_string(), "{b: 3, a: 1.5}");
        assert!(map.contains_key("a"));
        assert_eq!(map.remove("a"), Some(Value::Float(1.5)));
        assert!(!map.contains_key("a"));
    }

    #[test]
    fn test_scalars_to_osc() {
        assert_eq!(to_osc_args(&Value::from(42)), vec![OscType::Int(42)]);
        assert_eq!(to_osc_args(&Value::from(1.5)), vec![OscType::Float(1.5)]);
        assert_eq!(
            to_osc_args(&Value::from("x")),
            vec![OscType::String("x".to_string())]
        );
        assert_eq!(
            to_osc_args(&Value::Int(i64::MAX)),
            vec![OscType::Long(i64::MAX)]
        );
    }

    #[test]
    fn test_tab_spreads_and_nests() {
        let inner: Tab = vec![1, 2].into_iter().collect();
        let mut outer = Tab::new();
        outer.push(0);
        outer.push(inner);

        let args = to_osc_args(&Value::Tab(outer));
        assert_eq!(args.len(), 2);
        assert_eq!(args[0], OscType::Int(0));
        match &args[1] {
            OscType::Array(arr) => assert_eq!(arr.content, vec![OscType::Int(1), OscType::Int(2)]),
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_map_spreads_to_pairs() {
        let map: Map = vec![("freq", Value::from(440)), ("amp", Value::from(0.5))]
            .into_iter()
            .collect();
        let args = to_osc_args(&Value::Map(map));
        assert_eq!(
            args,
            vec![
                OscType::String("freq".to_string()),
                OscType::Int(440),
                OscType::String("amp".to_string()),
                OscType::Float(0.5),
            ]
        );
    }

    #[test]
    fn test_from_osc_detects_map() {
        let args = vec![
            OscType::String("a".to_string()),
            OscType::Int(1),
            OscType::String("b".to_string()),
            OscType::Float(2.0),
        ];
        match from_osc_args(&args) {
            Value::Map(map) => {
                assert_eq!(map.get("a"), Some(&Value::Int(1)));
                assert_eq!(map.get("b"), Some(&Value::Float(2.0)));
            }
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn test_from_osc_falls_back_to_tab() {
        // odd length
        let args = vec![OscType::String("a".to_string()), OscType::Int(1), OscType::Int(2)];
        assert!(matches!(from_osc_args(&args), Value::Tab(t) if t.len() == 3));

        // even length but a non-string key position
        let args = vec![OscType::Int(1), OscType::Int(2)];
        assert!(matches!(from_osc_args(&args), Value::Tab(t) if t.len() == 2));

        assert_eq!(from_osc_args(&[]), Value::Tab(Tab::new()));
        assert_eq!(from_osc_args(&[OscType::Int(7)]), Value::Int(7));
    }

    #[test]
    fn test_float_display() {
        assert_eq!(Value::Float(120.0).to_string(), "120.0");
        assert_eq!(Value::Float(0.25).to_string(), "0.25");
        assert_eq!(Value::Int(7).as_f64(), Some(7.0));
        assert_eq!(Value::from("s").as_f64(), None);
    }
}
