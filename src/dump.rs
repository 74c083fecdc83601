//! Format decoded values for display: an indented multi-line dump and a one-line form
//! (`Display for Value`).

use crate::value::Value;
use std::fmt;

fn hex_string(b: &[u8]) -> String {
    b.iter().map(|x| format!("{:02x}", x)).collect::<Vec<_>>().join(" ")
}

fn sorted_entries(m: &std::collections::HashMap<String, Value>) -> Vec<(&String, &Value)> {
    let mut entries: Vec<_> = m.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

/// Raw scalar string; documents fall back to the one-line form.
pub fn format_scalar(v: &Value) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::Bool(x) => format!("{}", x),
        Value::Uint(x) => format!("{}", x),
        Value::Int(x) => format!("{}", x),
        Value::Float(x) => format!("{}", x),
        Value::Text(s) => format!("{:?}", s),
        Value::Bytes(b) => format!("hex({})", hex_string(b)),
        Value::Map(_) | Value::List(_) => v.to_string(),
    }
}

/// Indented dump of `v`, keys sorted, list elements labelled with their index.
pub fn value_to_dump(v: &Value, indent: usize) -> String {
    let pad = "  ".repeat(indent);
    match v {
        Value::Map(m) if m.is_empty() => format!("{}struct {{}}", pad),
        Value::Map(m) => {
            let mut lines: Vec<String> = vec![format!("{}struct {{", pad)];
            for (k, val) in sorted_entries(m) {
                let sub = value_to_dump(val, indent + 1);
                lines.push(format!("{}  {}: {}", pad, k, sub.trim_start()));
            }
            lines.push(format!("{}}}", pad));
            lines.join("\n")
        }
        Value::List(lst) if lst.is_empty() => format!("{}[]", pad),
        Value::List(lst) => {
            let mut lines: Vec<String> = vec![format!("{}[", pad)];
            for (i, item) in lst.iter().enumerate() {
                let sub = value_to_dump(item, indent + 1);
                lines.push(format!("{}  [{}] {}", pad, i, sub.trim_start()));
            }
            lines.push(format!("{}]", pad));
            lines.join("\n")
        }
        scalar => format!("{}{}", pad, format_scalar(scalar)),
    }
}

/// Full dump starting at column zero.
pub fn format_value(v: &Value) -> String {
    value_to_dump(v, 0)
}

/// First line of the dump (tree node summary).
pub fn value_summary_line(v: &Value) -> String {
    let full = value_to_dump(v, 0);
    full.lines().next().map(|s| s.trim().to_string()).unwrap_or_default()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Map(m) => {
                f.write_str("{")?;
                for (i, (k, v)) in sorted_entries(m).into_iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
            Value::List(lst) => {
                f.write_str("[")?;
                for (i, v) in lst.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                f.write_str("]")
            }
            scalar => f.write_str(&format_scalar(scalar)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_line_sorted() {
        let v = Value::map([
            ("b", Value::list([Value::Uint(1), Value::Int(-2)])),
            ("a", Value::Text("hi".into())),
        ]);
        assert_eq!(v.to_string(), "{a: \"hi\", b: [1, -2]}");
        assert_eq!(Value::Bytes(vec![0x0a, 0xff]).to_string(), "hex(0a ff)");
    }

    #[test]
    fn test_dump_tree() {
        let v = Value::map([
            ("n", Value::Uint(2)),
            ("items", Value::list([Value::Uint(7), Value::map([("x", Value::Null)])])),
        ]);
        let expected = "struct {\n  items: [\n    [0] 7\n    [1] struct {\n      x: null\n    }\n  ]\n  n: 2\n}";
        assert_eq!(format_value(&v), expected);
        assert_eq!(value_summary_line(&v), "struct {");
    }
}
