//! Comma-separated record formatting.

const DELIMITER: char = ',';

/// Append one record, terminated by a newline, to `out`.
///
/// Fields containing the delimiter, a quote or a line break are quoted, with
/// embedded quotes doubled.
pub(crate) fn push_record<I, S>(out: &mut String, fields: I)
where
  I: IntoIterator<Item = S>,
  S: AsRef<str>,
{
  for (i, field) in fields.into_iter().enumerate() {
    if i > 0 {
      out.push(DELIMITER);
    }
    push_field(out, field.as_ref());
  }
  out.push('\n');
}

fn push_field(out: &mut String, field: &str) {
  let needs_quotes = field
    .chars()
    .any(|c| c == DELIMITER || c == '"' || c == '\n' || c == '\r');

  if !needs_quotes {
    out.push_str(field);
    return;
  }

  out.push('"');
  for c in field.chars() {
    if c == '"' {
      out.push('"');
    }
    out.push(c);
  }
  out.push('"');
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(fields: &[&str]) -> String {
    let mut out = String::new();
    push_record(&mut out, fields);
    out
  }

  #[test]
  fn test_plain_fields() {
    assert_eq!(record(&["id", "name"]), "id,name\n");
  }

  #[test]
  fn test_quoting() {
    assert_eq!(record(&["a,b", "say \"hi\"", "x"]), "\"a,b\",\"say \"\"hi\"\"\",x\n");
    assert_eq!(record(&["two\nlines"]), "\"two\nlines\"\n");
  }

  #[test]
  fn test_empty_fields() {
    assert_eq!(record(&["", "", ""]), ",,\n");
  }
}
