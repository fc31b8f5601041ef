use av_dom::Element;
use av_dom::Node;
use av_dom::is_void;

use crate::tokenizer::Token;

/// Builds a node forest from tokens.
///
/// End tags close the nearest open element with the same name; elements
/// closed implicitly are marked as having no end tag, and end tags with no
/// open counterpart are kept verbatim so serialization stays faithful.
pub(crate) fn build_tree(tokens: Vec<Token>, xml: bool) -> Vec<Node> {
    let mut top: Vec<Node> = Vec::new();
    let mut stack: Vec<Element> = Vec::new();

    for token in tokens {
        match token {
            Token::Text(text) => push_node(&mut top, &mut stack, Node::Text(text)),
            Token::Doctype(raw) => push_node(&mut top, &mut stack, Node::Doctype(raw)),
            Token::Raw(raw) => push_node(&mut top, &mut stack, Node::Raw(raw)),
            Token::Start {
                name,
                attrs,
                self_closing,
                tail,
            } => {
                let leaf = self_closing || (!xml && is_void(&name.to_ascii_lowercase()));
                let el = Element {
                    name,
                    attrs,
                    children: Vec::new(),
                    self_closing,
                    has_end_tag: !leaf,
                    tag_tail: Some(tail),
                    end_tag: None,
                };

                if leaf {
                    push_node(&mut top, &mut stack, Node::Element(el));
                } else {
                    stack.push(el);
                }
            }
            Token::End { name, raw } => {
                let Some(open_index) = stack.iter().rposition(|el| el.name.eq_ignore_ascii_case(&name))
                else {
                    push_node(&mut top, &mut stack, Node::Raw(raw));
                    continue;
                };

                let mut raw = Some(raw);
                while stack.len() > open_index {
                    let Some(mut node) = stack.pop() else {
                        break;
                    };
                    node.has_end_tag = stack.len() == open_index;
                    if node.has_end_tag {
                        node.end_tag = raw.take();
                    }
                    push_node(&mut top, &mut stack, Node::Element(node));
                }
            }
        }
    }

    while let Some(mut node) = stack.pop() {
        node.has_end_tag = false;
        push_node(&mut top, &mut stack, Node::Element(node));
    }

    top
}

fn push_node(top: &mut Vec<Node>, stack: &mut [Element], node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => top.push(node),
    }
}
