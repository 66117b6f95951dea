//! Minimal element tree used as the raw form of a device document.
//!
//! Attributes, comments and processing instructions are dropped on read;
//! only element names, their text and their children survive.

use crate::{DeviceError, Result};
use quick_xml::events::{BytesDecl, BytesText, Event};
use quick_xml::{Reader, Writer};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub text: String,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            children: Vec::new(),
        }
    }

    pub fn push(&mut self, child: Node) {
        self.children.push(child);
    }

    /// First child element called `name`.
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed text of the first child called `name`. For tags, flags and
    /// numbers.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child_raw_text(name).map(str::trim)
    }

    /// Text of the first child called `name`, whitespace preserved.
    pub fn child_raw_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// Parse a document and return its root element.
    pub fn parse(xml: &str) -> Result<Node> {
        let mut reader = Reader::from_str(xml);

        let mut stack: Vec<Node> = Vec::new();
        let mut root: Option<Node> = None;
        loop {
            let event = reader.read_event().map_err(|e| {
                DeviceError::Xml(format!("at byte {}: {e}", reader.buffer_position()))
            })?;
            match event {
                Event::Start(start) => {
                    stack.push(Node::new(String::from_utf8_lossy(start.name().as_ref())));
                }
                Event::Empty(start) => {
                    let node = Node::new(String::from_utf8_lossy(start.name().as_ref()));
                    attach(&mut stack, &mut root, node)?;
                }
                Event::End(_) => {
                    let mut node = stack
                        .pop()
                        .ok_or_else(|| DeviceError::Xml("unbalanced end tag".into()))?;
                    // indentation between child elements
                    if !node.children.is_empty() && node.text.trim().is_empty() {
                        node.text.clear();
                    }
                    attach(&mut stack, &mut root, node)?;
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(|e| DeviceError::Xml(e.to_string()))?;
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&text);
                    }
                }
                Event::CData(data) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(DeviceError::Xml(format!("unclosed element <{}>", open.name)));
        }
        root.ok_or_else(|| DeviceError::Xml("document has no root element".into()))
    }

    /// Render this node as a complete document with an XML declaration.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(|e| DeviceError::Xml(e.to_string()))?;
        write_node(&mut writer, self).map_err(|e| DeviceError::Xml(e.to_string()))?;
        let mut out = String::from_utf8(writer.into_inner())
            .map_err(|e| DeviceError::Xml(e.to_string()))?;
        out.push('\n');
        Ok(out)
    }
}

fn attach(stack: &mut [Node], root: &mut Option<Node>, node: Node) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        return Ok(());
    }
    if root.is_some() {
        return Err(DeviceError::Xml(format!(
            "unexpected second root element <{}>",
            node.name
        )));
    }
    *root = Some(node);
    Ok(())
}

fn write_node<W: std::io::Write>(writer: &mut Writer<W>, node: &Node) -> quick_xml::Result<()> {
    let element = writer.create_element(node.name.as_str());
    if !node.children.is_empty() {
        element.write_inner_content(|w| {
            for child in &node.children {
                write_node(w, child)?;
            }
            Ok::<(), quick_xml::Error>(())
        })?;
    } else if node.text.is_empty() {
        element.write_empty()?;
    } else {
        element.write_text_content(BytesText::new(&node.text))?;
    }
    Ok(())
}
