//! Source-preserving document tree.
//!
//! Nodes keep the exact markup they were parsed from wherever nothing has
//! been rewritten, so serializing an untouched tree reproduces its input
//! token stream. Only attributes and text replaced through the setters are
//! re-escaped on output.

mod serialize;

pub use serialize::escape_attribute;

/// Child-index path from the document root to a node.
pub type NodePath = Vec<usize>;

/// Parsed document: an ordered forest of top-level nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Character data exactly as written in the source (entities undecoded).
    Text(String),
    /// `<!DOCTYPE ...>` verbatim.
    Doctype(String),
    /// Comments, processing instructions and CDATA sections, verbatim.
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Tag name with its source casing (`linearGradient`, `DIV`).
    pub name: String,
    pub attrs: Vec<Attribute>,
    pub children: Vec<Node>,
    /// Written as `<name ... />`.
    pub self_closing: bool,
    /// The source carried an explicit end tag for this element.
    pub has_end_tag: bool,
    /// Source text between the last attribute and the end of the start tag
    /// (`>`, ` />`, `\n>`).
    pub tag_tail: Option<String>,
    /// End tag exactly as written (`</P >`).
    pub end_tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    value: String,
    /// Source text following the name (`="a&amp;b"`, `=x`, or empty for a
    /// bare attribute). Cleared once the value is replaced.
    source: Option<String>,
    /// Source text between the previous attribute (or the tag name) and
    /// this attribute's name.
    leading: Option<String>,
}

impl Attribute {
    pub fn parsed(name: impl Into<String>, value: impl Into<String>, source: String) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            source: Some(source),
            leading: None,
        }
    }

    pub fn with_leading(mut self, leading: impl Into<String>) -> Self {
        self.leading = Some(leading.into());
        self
    }

    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            source: None,
            leading: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entity-decoded value.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        let value = value.into();
        if self.source.is_some() && value == self.value {
            return;
        }
        self.value = value;
        self.source = None;
    }

    pub fn is_modified(&self) -> bool {
        self.source.is_none()
    }
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
            self_closing: false,
            has_end_tag: true,
            tag_tail: None,
            end_tag: None,
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// ASCII-lowercased tag name, used for all element matching.
    pub fn local_name(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|attr| attr.name.eq_ignore_ascii_case(name))
            .map(|attr| attr.value.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        match self
            .attrs
            .iter_mut()
            .find(|attr| attr.name.eq_ignore_ascii_case(name))
        {
            Some(attr) => attr.set_value(value),
            None => self.attrs.push(Attribute::new(name, value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) {
        self.attrs
            .retain(|attr| !attr.name.eq_ignore_ascii_case(name));
    }

    /// Concatenated raw text of the direct text children.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            if let Node::Text(text) = child {
                out.push_str(text);
            }
        }
        out
    }

    /// Replaces all children with a single raw text node (nothing for empty).
    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.children.clear();
        if !text.is_empty() {
            self.children.push(Node::Text(text));
        }
        self.expand_self_closing();
    }

    /// Turns `<x/>` into `<x></x>` so the element can take children.
    pub fn expand_self_closing(&mut self) {
        if self.self_closing {
            self.self_closing = false;
            self.has_end_tag = true;
            self.tag_tail = None;
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|child| match child {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }
}

impl Document {
    pub fn new(children: Vec<Node>) -> Self {
        Self { children }
    }

    pub fn doctype(&self) -> Option<&str> {
        self.children.iter().find_map(|node| match node {
            Node::Doctype(raw) => Some(raw.as_str()),
            _ => None,
        })
    }

    /// First top-level element.
    pub fn root_element(&self) -> Option<&Element> {
        self.children.iter().find_map(|node| match node {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn node(&self, path: &[usize]) -> Option<&Node> {
        let (first, rest) = path.split_first()?;
        let mut node = self.children.get(*first)?;
        for index in rest {
            let Node::Element(el) = node else {
                return None;
            };
            node = el.children.get(*index)?;
        }
        Some(node)
    }

    pub fn node_mut(&mut self, path: &[usize]) -> Option<&mut Node> {
        let (first, rest) = path.split_first()?;
        let mut node = self.children.get_mut(*first)?;
        for index in rest {
            let Node::Element(el) = node else {
                return None;
            };
            node = el.children.get_mut(*index)?;
        }
        Some(node)
    }

    pub fn element_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        match self.node_mut(path)? {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    /// Path of the first element (pre-order) with the given local name.
    pub fn find_element(&self, name: &str) -> Option<NodePath> {
        let mut path = Vec::new();
        if find_in(&self.children, name, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    pub fn serialize(&self, xml: bool) -> String {
        let mut out = String::new();
        for node in &self.children {
            serialize::write_node(&mut out, node, xml);
        }
        out
    }
}

fn find_in(nodes: &[Node], name: &str, path: &mut NodePath) -> bool {
    for (index, node) in nodes.iter().enumerate() {
        let Node::Element(el) = node else {
            continue;
        };
        path.push(index);
        if el.is(name) || find_in(&el.children, name, path) {
            return true;
        }
        path.pop();
    }
    false
}

/// HTML void elements: never have content or an end tag.
pub fn is_void(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}
