//! The generic tree a snapshot parses into.
//!
//! The format has no schema: a block is a list or an object depending on
//! what appears inside it, keys may repeat, and scalars carry no type tags.
//! [`Value`] keeps all of that so the extractor can decide what it needs.

// ─── Scalar ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
  Str(String),
  Int(i64),
  Float(f64),
  Bool(bool),
}

impl Scalar {
  /// Numeric view of the scalar. Strings are parsed leniently; booleans and
  /// anything that is not a finite number have no numeric value.
  pub fn as_f64(&self) -> Option<f64> {
    let n = match self {
      Self::Int(n) => *n as f64,
      Self::Float(f) => *f,
      Self::Str(s) => s.trim().parse::<f64>().ok()?,
      Self::Bool(_) => return None,
    };
    n.is_finite().then_some(n)
  }

  /// Text view of the scalar; numbers and booleans are rendered.
  pub fn to_text(&self) -> String {
    match self {
      Self::Str(s) => s.clone(),
      Self::Int(n) => n.to_string(),
      Self::Float(f) => f.to_string(),
      Self::Bool(true) => "yes".to_string(),
      Self::Bool(false) => "no".to_string(),
    }
  }
}

// ─── Object ──────────────────────────────────────────────────────────────────

/// A block containing at least one `key = value` pair.
///
/// Bare values that appeared in the same block are kept, in order, in
/// `items`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Object {
  pub entries: Vec<(String, Value)>,
  pub items:   Vec<Value>,
}

impl Object {
  /// First value stored under `key`.
  pub fn get(&self, key: &str) -> Option<&Value> {
    self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
  }

  /// Every value stored under `key`, in document order.
  pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Value> {
    self
      .entries
      .iter()
      .filter(move |(k, _)| k == key)
      .map(|(_, v)| v)
  }

  /// First value found under any of `keys`, trying them in order.
  pub fn get_any(&self, keys: &[&str]) -> Option<&Value> {
    keys.iter().find_map(|k| self.get(k))
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
    self.entries.iter().map(|(k, v)| (k.as_str(), v))
  }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() && self.items.is_empty() }
}

// ─── Value ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Scalar(Scalar),
  List(Vec<Value>),
  Object(Object),
}

impl Value {
  pub fn str(s: impl Into<String>) -> Self { Self::Scalar(Scalar::Str(s.into())) }

  pub fn int(n: i64) -> Self { Self::Scalar(Scalar::Int(n)) }

  pub fn float(f: f64) -> Self { Self::Scalar(Scalar::Float(f)) }

  pub fn bool(b: bool) -> Self { Self::Scalar(Scalar::Bool(b)) }

  pub fn as_object(&self) -> Option<&Object> {
    match self {
      Self::Object(o) => Some(o),
      _ => None,
    }
  }

  pub fn as_list(&self) -> Option<&[Value]> {
    match self {
      Self::List(l) => Some(l),
      _ => None,
    }
  }

  pub fn as_scalar(&self) -> Option<&Scalar> {
    match self {
      Self::Scalar(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> { self.as_scalar().and_then(Scalar::as_f64) }

  pub fn as_text(&self) -> Option<String> { self.as_scalar().map(Scalar::to_text) }

  /// Member lookup; `None` for anything but an object.
  pub fn get(&self, key: &str) -> Option<&Value> {
    self.as_object().and_then(|o| o.get(key))
  }

  /// Follow `path` through nested objects, taking the first match at each
  /// level.
  pub fn path(&self, path: &[&str]) -> Option<&Value> {
    path.iter().try_fold(self, |v, key| v.get(key))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn obj(entries: Vec<(&str, Value)>) -> Value {
    Value::Object(Object {
      entries: entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
      items:   Vec::new(),
    })
  }

  #[test]
  fn get_returns_first_of_repeated_keys() {
    let v = obj(vec![("a", Value::int(1)), ("a", Value::int(2))]);
    assert_eq!(v.get("a"), Some(&Value::int(1)));
    let all: Vec<_> = v.as_object().unwrap().get_all("a").collect();
    assert_eq!(all.len(), 2);
  }

  #[test]
  fn path_walks_nested_objects() {
    let v = obj(vec![("outer", obj(vec![("inner", Value::str("x"))]))]);
    assert_eq!(v.path(&["outer", "inner"]), Some(&Value::str("x")));
    assert_eq!(v.path(&["outer", "missing"]), None);
    assert_eq!(v.path(&["outer", "inner", "deeper"]), None);
  }

  #[test]
  fn numeric_coercion() {
    assert_eq!(Value::str("12.5").as_f64(), Some(12.5));
    assert_eq!(Value::int(3).as_f64(), Some(3.0));
    assert_eq!(Value::str("n/a").as_f64(), None);
    assert_eq!(Value::bool(true).as_f64(), None);
    assert_eq!(Value::List(vec![]).as_f64(), None);
  }

  #[test]
  fn non_finite_numbers_have_no_numeric_value() {
    assert_eq!(Value::float(f64::INFINITY).as_f64(), None);
    assert_eq!(Value::float(f64::NAN).as_f64(), None);
    assert_eq!(Value::str("inf").as_f64(), None);
    assert_eq!(Value::str("NaN").as_f64(), None);
  }
}
