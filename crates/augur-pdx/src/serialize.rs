//! Writes a [`Value`] back out in the save grammar.
//!
//! Output reparses to the same tree, with two exceptions inherent to the
//! grammar: an object with no keyed entries reads back as a list, and
//! non-finite floats are written as quoted strings.

use std::fmt::Write as _;

use crate::{
  parse::is_delimiter,
  value::{Object, Scalar, Value},
};

const INDENT: &str = "\t";

/// Serialize a document. A root object is written without enclosing braces.
pub fn to_text(value: &Value) -> String {
  let mut out = String::new();
  match value {
    Value::Object(o) => write_body(&mut out, o, 0),
    other => write_value(&mut out, other, 0),
  }
  out
}

fn write_body(out: &mut String, object: &Object, depth: usize) {
  for (key, value) in &object.entries {
    indent(out, depth);
    write_key(out, key);
    out.push('=');
    write_value(out, value, depth);
    out.push('\n');
  }
  for item in &object.items {
    indent(out, depth);
    write_value(out, item, depth);
    out.push('\n');
  }
}

fn write_value(out: &mut String, value: &Value, depth: usize) {
  match value {
    Value::Scalar(s) => write_scalar(out, s),
    Value::List(items) if items.iter().all(|v| matches!(v, Value::Scalar(_))) => {
      out.push('{');
      for item in items {
        out.push(' ');
        write_value(out, item, depth);
      }
      out.push_str(" }");
    }
    Value::List(items) => {
      out.push_str("{\n");
      for item in items {
        indent(out, depth + 1);
        write_value(out, item, depth + 1);
        out.push('\n');
      }
      indent(out, depth);
      out.push('}');
    }
    Value::Object(o) => {
      out.push_str("{\n");
      write_body(out, o, depth + 1);
      indent(out, depth);
      out.push('}');
    }
  }
}

fn write_scalar(out: &mut String, scalar: &Scalar) {
  match scalar {
    Scalar::Str(s) => write_quoted(out, s),
    Scalar::Int(n) => {
      let _ = write!(out, "{n}");
    }
    Scalar::Float(f) if !f.is_finite() => write_quoted(out, &f.to_string()),
    // Keep the decimal point so integral floats do not read back as ints.
    Scalar::Float(f) if f.fract() == 0.0 => {
      let _ = write!(out, "{f:.1}");
    }
    Scalar::Float(f) => {
      let _ = write!(out, "{f}");
    }
    Scalar::Bool(true) => out.push_str("yes"),
    Scalar::Bool(false) => out.push_str("no"),
  }
}

fn write_key(out: &mut String, key: &str) {
  let bare = !key.is_empty() && !key.bytes().any(|b| b == b'\\' || is_delimiter(b));
  if bare {
    out.push_str(key);
  } else {
    write_quoted(out, key);
  }
}

fn write_quoted(out: &mut String, s: &str) {
  out.push('"');
  for c in s.chars() {
    match c {
      '"' => out.push_str("\\\""),
      '\\' => out.push_str("\\\\"),
      '\n' => out.push_str("\\n"),
      '\t' => out.push_str("\\t"),
      c => out.push(c),
    }
  }
  out.push('"');
}

fn indent(out: &mut String, depth: usize) {
  for _ in 0..depth {
    out.push_str(INDENT);
  }
}

#[cfg(test)]
mod tests {
  use proptest::prelude::*;

  use super::*;
  use crate::parse::parse;

  fn object(entries: Vec<(String, Value)>, items: Vec<Value>) -> Value {
    Value::Object(Object { entries, items })
  }

  #[test]
  fn writes_readable_nested_text() {
    let doc = parse("date=1836.1.1 m={ grain={ price=20 } ids={ 1 2 } }").unwrap();
    let text = to_text(&doc);
    assert_eq!(
      text,
      "date=\"1836.1.1\"\nm={\n\tgrain={\n\t\tprice=20\n\t}\n\tids={ 1 2 }\n}\n"
    );
  }

  #[test]
  fn awkward_keys_are_quoted() {
    let doc = object(
      vec![
        ("".to_string(), Value::int(1)),
        ("two words".to_string(), Value::int(2)),
        ("a=b".to_string(), Value::int(3)),
      ],
      vec![],
    );
    assert_eq!(parse(&to_text(&doc)).unwrap(), doc);
  }

  #[test]
  fn integral_floats_stay_floats() {
    let doc = object(vec![("f".to_string(), Value::float(3.0))], vec![]);
    assert_eq!(to_text(&doc), "f=3.0\n");
    assert_eq!(parse(&to_text(&doc)).unwrap(), doc);
  }

  // ── Round-trip property ───────────────────────────────────────────────

  fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
      "[ -~]{0,12}".prop_map(Value::str),
      any::<i64>().prop_map(Value::int),
      (-1.0e12f64..1.0e12f64).prop_map(Value::float),
      any::<bool>().prop_map(Value::bool),
    ]
  }

  fn key() -> impl Strategy<Value = String> {
    prop_oneof!["[a-z_][a-z0-9_]{0,8}", "[ -~]{0,8}"]
  }

  /// Trees the parser can produce: objects always have at least one entry.
  fn tree() -> impl Strategy<Value = Value> {
    scalar().prop_recursive(4, 48, 6, |inner| {
      prop_oneof![
        prop::collection::vec(inner.clone(), 0..5).prop_map(Value::List),
        (
          prop::collection::vec((key(), inner.clone()), 1..5),
          prop::collection::vec(inner, 0..3),
        )
          .prop_map(|(entries, items)| object(entries, items)),
      ]
    })
  }

  fn document() -> impl Strategy<Value = Value> {
    (
      prop::collection::vec((key(), tree()), 0..6),
      prop::collection::vec(tree(), 0..3),
    )
      .prop_map(|(entries, items)| object(entries, items))
  }

  proptest! {
    #![proptest_config(ProptestConfig { cases: 128, failure_persistence: None, .. ProptestConfig::default() })]

    #[test]
    fn parse_serialize_parse_is_stable(doc in document()) {
      let text = to_text(&doc);
      let reparsed = parse(&text).unwrap();
      prop_assert_eq!(&reparsed, &doc);
      prop_assert_eq!(to_text(&reparsed), text);
    }
  }
}
