//! Small helpers over the tree-sitter Python grammar.

use tree_sitter::Node;

pub fn text<'a>(node: Node, src: &'a str) -> &'a str {
    node.utf8_text(src.as_bytes()).unwrap_or("")
}

/// Named children, comments excluded.
pub fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut out = Vec::with_capacity(node.named_child_count());
    for i in 0..node.named_child_count() {
        if let Some(child) = node.named_child(i) {
            if child.kind() != "comment" {
                out.push(child);
            }
        }
    }
    out
}

/// Depth-first, document order.
pub fn descendants_of_kind<'t>(node: Node<'t>, kind: &str) -> Vec<Node<'t>> {
    let mut result = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if current.kind() == kind {
            result.push(current);
        }
        for i in (0..current.child_count()).rev() {
            if let Some(child) = current.child(i) {
                stack.push(child);
            }
        }
    }
    result
}

/// First row (1-based) of an error or missing node.
pub fn first_error_line(node: Node) -> Option<usize> {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if current.is_error() || current.is_missing() {
            return Some(current.start_position().row + 1);
        }
        if !current.has_error() {
            continue;
        }
        for i in (0..current.child_count()).rev() {
            if let Some(child) = current.child(i) {
                stack.push(child);
            }
        }
    }
    None
}

/// Strips `@decorator` wrappers.
pub fn unwrap_definition(node: Node) -> Node {
    if node.kind() == "decorated_definition" {
        if let Some(def) = node.child_by_field_name("definition") {
            return def;
        }
    }
    node
}

/// Strips any number of parentheses around an expression.
pub fn unparen(mut node: Node) -> Node {
    while node.kind() == "parenthesized_expression" {
        match named_children(node).into_iter().next() {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}

pub fn name_of<'a>(node: Node, src: &'a str) -> Option<&'a str> {
    node.child_by_field_name("name").map(|n| text(n, src))
}

/// `x = value` inside an expression statement: (left, right).
pub fn assignment_parts<'t>(stmt: Node<'t>) -> Option<(Node<'t>, Node<'t>)> {
    let assign = if stmt.kind() == "expression_statement" {
        named_children(stmt).into_iter().next()?
    } else {
        stmt
    };
    if assign.kind() != "assignment" && assign.kind() != "augmented_assignment" {
        return None;
    }
    let left = assign.child_by_field_name("left")?;
    let right = assign.child_by_field_name("right")?;
    Some((left, right))
}

/// Final dotted segment: `io.Int` -> `Int`, `Foo` -> `Foo`.
pub fn last_segment<'a>(node: Node, src: &'a str) -> Option<&'a str> {
    match node.kind() {
        "identifier" => Some(text(node, src)),
        "attribute" => node
            .child_by_field_name("attribute")
            .map(|a| text(a, src)),
        _ => None,
    }
}

pub fn call_arguments<'t>(call: Node<'t>) -> Vec<Node<'t>> {
    call.child_by_field_name("arguments")
        .filter(|a| a.kind() == "argument_list")
        .map(named_children)
        .unwrap_or_default()
}

pub fn positional_args<'t>(call: Node<'t>) -> Vec<Node<'t>> {
    call_arguments(call)
        .into_iter()
        .filter(|a| {
            !matches!(
                a.kind(),
                "keyword_argument" | "list_splat" | "dictionary_splat"
            )
        })
        .collect()
}

pub fn keyword_args<'t>(call: Node<'t>, src: &str) -> Vec<(String, Node<'t>)> {
    let mut out = Vec::new();
    for arg in call_arguments(call) {
        if arg.kind() != "keyword_argument" {
            continue;
        }
        if let (Some(name), Some(value)) = (
            arg.child_by_field_name("name"),
            arg.child_by_field_name("value"),
        ) {
            out.push((text(name, src).to_string(), value));
        }
    }
    out
}

pub fn keyword_arg<'t>(call: Node<'t>, src: &str, name: &str) -> Option<Node<'t>> {
    keyword_args(call, src)
        .into_iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v)
}

/// `(key, value)` pairs of a dict literal; `**splat` entries are dropped.
pub fn dict_pairs<'t>(dict: Node<'t>) -> Vec<(Node<'t>, Node<'t>)> {
    let mut out = Vec::new();
    for child in named_children(dict) {
        if child.kind() != "pair" {
            continue;
        }
        if let (Some(k), Some(v)) = (
            child.child_by_field_name("key"),
            child.child_by_field_name("value"),
        ) {
            out.push((k, v));
        }
    }
    out
}

/// Elements of a list, tuple or bare `a, b` expression list.
pub fn sequence_items<'t>(node: Node<'t>) -> Option<Vec<Node<'t>>> {
    let node = unparen(node);
    match node.kind() {
        "list" | "tuple" | "expression_list" => Some(named_children(node)),
        _ => None,
    }
}

/// Literal string value of a plain, concatenated or parenthesized string.
/// f-strings with interpolation and bytes literals yield `None`.
pub fn string_value(node: Node, src: &str) -> Option<String> {
    let node = unparen(node);
    match node.kind() {
        "string" => {
            if named_children(node)
                .iter()
                .any(|c| c.kind() == "interpolation")
            {
                return None;
            }
            decode_literal(text(node, src))
        }
        "concatenated_string" => {
            let mut out = String::new();
            for part in named_children(node) {
                out.push_str(&string_value(part, src)?);
            }
            Some(out)
        }
        _ => None,
    }
}

/// Decodes the source text of one Python string literal.
pub fn decode_literal(raw: &str) -> Option<String> {
    let quote_at = raw.find(&['"', '\''][..])?;
    let prefix = raw[..quote_at].to_ascii_lowercase();
    if prefix.contains('b') {
        return None;
    }
    let body = &raw[quote_at..];
    let delim = if body.starts_with("\"\"\"") || body.starts_with("'''") {
        &body[..3]
    } else {
        &body[..1]
    };
    if body.len() < delim.len() * 2 || !body.ends_with(delim) {
        return None;
    }
    let inner = &body[delim.len()..body.len() - delim.len()];
    if prefix.contains('r') {
        Some(inner.to_string())
    } else {
        Some(unescape(inner))
    }
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match next {
            '\n' => {}
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'x' => push_code_point(&mut out, &mut chars, 2, "\\x"),
            'u' => push_code_point(&mut out, &mut chars, 4, "\\u"),
            'U' => push_code_point(&mut out, &mut chars, 8, "\\U"),
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}

fn push_code_point(
    out: &mut String,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    width: usize,
    escape: &str,
) {
    let mut digits = String::with_capacity(width);
    while digits.len() < width {
        match chars.peek() {
            Some(c) if c.is_ascii_hexdigit() => {
                digits.push(*c);
                chars.next();
            }
            _ => break,
        }
    }
    let decoded = if digits.len() == width {
        u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32)
    } else {
        None
    };
    match decoded {
        Some(ch) => out.push(ch),
        None => {
            out.push_str(escape);
            out.push_str(&digits);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_quotes_and_escapes() {
        assert_eq!(decode_literal(r#""seed""#).as_deref(), Some("seed"));
        assert_eq!(decode_literal(r#"'it\'s'"#).as_deref(), Some("it's"));
        assert_eq!(
            decode_literal("\"\"\"multi\nline\"\"\"").as_deref(),
            Some("multi\nline")
        );
        assert_eq!(decode_literal(r#""a\nb""#).as_deref(), Some("a\nb"));
        assert_eq!(decode_literal(r#""\u4e2d""#).as_deref(), Some("中"));
        assert_eq!(decode_literal(r#"r"C:\path""#).as_deref(), Some(r"C:\path"));
        assert_eq!(decode_literal(r#"b"bytes""#), None);
    }

    #[test]
    fn keeps_unknown_escapes() {
        assert_eq!(decode_literal(r#""\d+""#).as_deref(), Some(r"\d+"));
        assert_eq!(decode_literal(r#""\xZZ""#).as_deref(), Some(r"\xZZ"));
    }
}
