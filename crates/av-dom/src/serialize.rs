use crate::Element;
use crate::Node;
use crate::is_void;

pub(crate) fn write_node(out: &mut String, node: &Node, xml: bool) {
    match node {
        Node::Element(el) => write_element(out, el, xml),
        Node::Text(text) => out.push_str(text),
        Node::Doctype(raw) | Node::Raw(raw) => out.push_str(raw),
    }
}

fn write_element(out: &mut String, el: &Element, xml: bool) {
    out.push('<');
    out.push_str(&el.name);
    for attr in &el.attrs {
        // A rewritten value always gets separated from its neighbour.
        let leading = attr
            .leading
            .as_deref()
            .filter(|leading| !leading.is_empty() || attr.source.is_some())
            .unwrap_or(" ");
        out.push_str(leading);
        out.push_str(attr.name());
        match &attr.source {
            Some(source) => out.push_str(source),
            None => {
                out.push_str("=\"");
                out.push_str(&escape_attribute(attr.value()));
                out.push('"');
            }
        }
    }

    if el.self_closing && el.children.is_empty() {
        out.push_str(el.tag_tail.as_deref().unwrap_or("/>"));
        return;
    }
    match el.tag_tail.as_deref() {
        Some(tail) if !el.self_closing => out.push_str(tail),
        _ => out.push('>'),
    }

    for child in &el.children {
        write_node(out, child, xml);
    }

    let void = !xml && is_void(&el.local_name());
    if el.has_end_tag && !void {
        match &el.end_tag {
            Some(raw) => out.push_str(raw),
            None => {
                out.push_str("</");
                out.push_str(&el.name);
                out.push('>');
            }
        }
    }
}

/// Escapes a value for a double-quoted attribute (valid in HTML and XML).
pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}
