//! Markup tree for the document body
//!
//! The body is held as an arena: every node lives in one `Vec` and is
//! addressed by a [`NodeId`] that stays valid for the lifetime of the
//! [`Document`]. Ids are never reused, so a snapshot of ids taken before a
//! mutation can be checked against the live tree afterwards with
//! [`Document::is_live`].
//!
//! Parsing and serialization go through `quick-xml`. Classification helpers
//! work on local names, so `w:p`, `p` and `x:p` all count as paragraphs.

use crate::error::{Error, Result};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::{Deserialize, Serialize};

/// Stable handle to a node in a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An element: qualified name plus attributes in source order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Name without namespace prefix
    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    /// Namespace prefix, if any (`w` for `w:p`)
    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    /// Attribute value looked up by local name
    pub fn attr(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| local_name(key) == local)
            .map(|(_, value)| value.as_str())
    }

    pub fn is(&self, local: &str) -> bool {
        self.local_name() == local
    }
}

/// Content of a single node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element(Element),
    /// Character data, already unescaped
    Text(String),
    CData(String),
    /// Raw comment body
    Comment(String),
    /// Raw processing instruction body
    ProcessingInstruction(String),
    Declaration {
        version: String,
        encoding: Option<String>,
        standalone: Option<String>,
    },
    /// Raw doctype body
    DocType(String),
}

/// Field-marker discriminator carried by `fldChar`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerType {
    Begin,
    Separate,
    End,
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    detached: bool,
}

/// Parsed markup body
#[derive(Debug, Clone, Default)]
pub struct Document {
    nodes: Vec<Node>,
    top: Vec<NodeId>,
}

/// Strip the namespace prefix from a qualified name
pub fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, local)| local).unwrap_or(name)
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn element_from(start: &BytesStart<'_>) -> Result<Element> {
    let mut element = Element::new(lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr?;
        let key = lossy(attr.key.as_ref());
        let value = attr.unescape_value()?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

impl Document {
    /// Parse a markup body
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut doc = Document::default();
        let mut stack: Vec<NodeId> = Vec::new();

        loop {
            let parent = stack.last().copied();
            match reader.read_event()? {
                Event::Start(e) => {
                    let id = doc.push(parent, NodeKind::Element(element_from(&e)?));
                    stack.push(id);
                }
                Event::Empty(e) => {
                    doc.push(parent, NodeKind::Element(element_from(&e)?));
                }
                Event::End(_) => {
                    if stack.pop().is_none() {
                        return Err(Error::Markup("unexpected closing tag".into()));
                    }
                }
                Event::Text(e) => {
                    let text = e.unescape()?.into_owned();
                    if !text.is_empty() {
                        doc.push(parent, NodeKind::Text(text));
                    }
                }
                Event::CData(e) => {
                    doc.push(parent, NodeKind::CData(lossy(&e.into_inner())));
                }
                Event::Comment(e) => {
                    doc.push(parent, NodeKind::Comment(lossy(&e)));
                }
                Event::PI(e) => {
                    doc.push(parent, NodeKind::ProcessingInstruction(lossy(&e)));
                }
                Event::DocType(e) => {
                    doc.push(parent, NodeKind::DocType(lossy(&e)));
                }
                Event::Decl(e) => {
                    let version = lossy(&e.version()?);
                    let encoding = match e.encoding() {
                        Some(enc) => Some(lossy(&enc?)),
                        None => None,
                    };
                    let standalone = match e.standalone() {
                        Some(sa) => Some(lossy(&sa?)),
                        None => None,
                    };
                    doc.push(
                        parent,
                        NodeKind::Declaration {
                            version,
                            encoding,
                            standalone,
                        },
                    );
                }
                Event::Eof => break,
            }
        }

        if let Some(open) = stack.last() {
            let name = doc
                .element(*open)
                .map(|el| el.name.clone())
                .unwrap_or_default();
            return Err(Error::Markup(format!("unclosed element <{}>", name)));
        }

        Ok(doc)
    }

    /// Serialize the live tree back to markup
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        for &id in &self.top {
            self.write_node(&mut writer, id)?;
        }
        String::from_utf8(writer.into_inner())
            .map_err(|e| Error::Markup(format!("serialized markup is not UTF-8: {}", e)))
    }

    fn write_node(&self, writer: &mut Writer<Vec<u8>>, id: NodeId) -> Result<()> {
        let node = &self.nodes[id.0];
        let event = match &node.kind {
            NodeKind::Element(el) => {
                let mut start = BytesStart::new(el.name.as_str());
                for (key, value) in &el.attributes {
                    start.push_attribute((key.as_str(), value.as_str()));
                }
                if node.children.is_empty() {
                    Event::Empty(start)
                } else {
                    emit(writer, Event::Start(start))?;
                    for &child in &node.children {
                        self.write_node(writer, child)?;
                    }
                    Event::End(BytesEnd::new(el.name.as_str()))
                }
            }
            NodeKind::Text(text) => Event::Text(BytesText::new(text)),
            NodeKind::CData(text) => Event::CData(BytesCData::new(text.as_str())),
            NodeKind::Comment(raw) => Event::Comment(BytesText::from_escaped(raw.as_str())),
            NodeKind::ProcessingInstruction(raw) => {
                Event::PI(BytesText::from_escaped(raw.as_str()))
            }
            NodeKind::DocType(raw) => Event::DocType(BytesText::from_escaped(raw.as_str())),
            NodeKind::Declaration {
                version,
                encoding,
                standalone,
            } => Event::Decl(BytesDecl::new(
                version,
                encoding.as_deref(),
                standalone.as_deref(),
            )),
        };
        emit(writer, event)
    }

    fn push(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent,
            children: Vec::new(),
            detached: false,
        });
        match parent {
            Some(p) => self.nodes[p.0].children.push(id),
            None => self.top.push(id),
        }
        id
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Total number of nodes ever allocated, dead ones included
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id.0).map(|n| &n.kind)
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.kind(id) {
            Some(NodeKind::Element(el)) => Some(el),
            _ => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    /// Live children in order; empty for unknown ids
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// True when the node and all of its ancestors are still attached
    pub fn is_live(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(cur) = current {
            match self.nodes.get(cur.0) {
                Some(node) if !node.detached => current = node.parent,
                _ => return false,
            }
        }
        true
    }

    pub fn is_element(&self, id: NodeId, local: &str) -> bool {
        self.element(id).is_some_and(|el| el.is(local))
    }

    /// Live nodes of the whole document in document order
    pub fn iter(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        for &root in &self.top {
            self.collect_preorder(root, &mut out);
        }
        out
    }

    /// `id` and its live descendants in document order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if self.is_live(id) {
            self.collect_preorder(id, &mut out);
        }
        out
    }

    fn collect_preorder(&self, root: NodeId, out: &mut Vec<NodeId>) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
    }

    /// Live elements with the given local name, in document order
    pub fn elements_named(&self, local: &str) -> Vec<NodeId> {
        self.iter()
            .into_iter()
            .filter(|&id| self.is_element(id, local))
            .collect()
    }

    /// Direct element children with the given local name
    pub fn child_elements(&self, id: NodeId, local: &str) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|&c| self.is_element(c, local))
            .collect()
    }

    /// Concatenated text and CDATA of the subtree
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .into_iter()
            .filter_map(|d| match self.kind(d) {
                Some(NodeKind::Text(t)) | Some(NodeKind::CData(t)) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Marker type when `id` is a `fldChar` element
    pub fn marker_type(&self, id: NodeId) -> Option<MarkerType> {
        let el = self.element(id)?;
        if !el.is("fldChar") {
            return None;
        }
        match el.attr("fldCharType")? {
            "begin" => Some(MarkerType::Begin),
            "separate" => Some(MarkerType::Separate),
            "end" => Some(MarkerType::End),
            _ => None,
        }
    }

    /// Qualified name for `local` using the namespace prefix of `context`
    pub fn qualified(&self, context: NodeId, local: &str) -> String {
        match self.element(context).and_then(Element::prefix) {
            Some(prefix) => format!("{}:{}", prefix, local),
            None => local.to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Append an element as the last child of `parent`
    pub fn append_element(&mut self, parent: NodeId, element: Element) -> Result<NodeId> {
        self.ensure_live(parent)?;
        Ok(self.push(Some(parent), NodeKind::Element(element)))
    }

    /// Append a text node as the last child of `parent`
    pub fn append_text(&mut self, parent: NodeId, text: impl Into<String>) -> Result<NodeId> {
        self.ensure_live(parent)?;
        Ok(self.push(Some(parent), NodeKind::Text(text.into())))
    }

    /// Detach a node (and with it its subtree) from the tree
    pub fn remove(&mut self, id: NodeId) -> Result<()> {
        self.ensure_live(id)?;
        match self.nodes[id.0].parent {
            Some(parent) => self.nodes[parent.0].children.retain(|&c| c != id),
            None => self.top.retain(|&c| c != id),
        }
        self.nodes[id.0].detached = true;
        Ok(())
    }

    /// Detach every child of `id`
    pub fn clear_children(&mut self, id: NodeId) -> Result<()> {
        self.ensure_live(id)?;
        let children = std::mem::take(&mut self.nodes[id.0].children);
        for child in children {
            self.nodes[child.0].detached = true;
        }
        Ok(())
    }

    /// Put a new element where `id` stands and detach `id`
    pub fn replace_with_element(&mut self, id: NodeId, element: Element) -> Result<NodeId> {
        self.ensure_live(id)?;
        let parent = self.nodes[id.0].parent;
        let new_id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind: NodeKind::Element(element),
            parent,
            children: Vec::new(),
            detached: false,
        });
        let siblings = match parent {
            Some(p) => &mut self.nodes[p.0].children,
            None => &mut self.top,
        };
        if let Some(slot) = siblings.iter_mut().find(|c| **c == id) {
            *slot = new_id;
        }
        self.nodes[id.0].detached = true;
        Ok(new_id)
    }

    /// Insert a new element as the next sibling of `sibling`
    pub fn insert_after(&mut self, sibling: NodeId, element: Element) -> Result<NodeId> {
        self.ensure_live(sibling)?;
        let parent = self.nodes[sibling.0].parent;
        let new_id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind: NodeKind::Element(element),
            parent,
            children: Vec::new(),
            detached: false,
        });
        let siblings = match parent {
            Some(p) => &mut self.nodes[p.0].children,
            None => &mut self.top,
        };
        let slot = siblings
            .iter()
            .position(|&c| c == sibling)
            .map_or(siblings.len(), |i| i + 1);
        siblings.insert(slot, new_id);
        Ok(new_id)
    }

    /// Move `id` with its subtree to the end of `parent`'s children
    pub fn move_to(&mut self, id: NodeId, parent: NodeId) -> Result<()> {
        self.ensure_live(id)?;
        self.ensure_outside(parent, id)?;
        match self.nodes[id.0].parent {
            Some(old) => self.nodes[old.0].children.retain(|&c| c != id),
            None => self.top.retain(|&c| c != id),
        }
        self.nodes[id.0].parent = Some(parent);
        self.nodes[parent.0].children.push(id);
        Ok(())
    }

    /// Append a deep copy of `id` to `parent`
    pub fn copy_into(&mut self, id: NodeId, parent: NodeId) -> Result<NodeId> {
        self.ensure_live(id)?;
        self.ensure_outside(parent, id)?;
        let kind = self.nodes[id.0].kind.clone();
        let copy = self.push(Some(parent), kind);
        for child in self.nodes[id.0].children.clone() {
            self.copy_into(child, copy)?;
        }
        Ok(copy)
    }

    /// Mutable access to an element's name and attributes
    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match self.nodes.get_mut(id.0).map(|n| &mut n.kind) {
            Some(NodeKind::Element(el)) => Some(el),
            _ => None,
        }
    }

    /// `target` must be live and must not sit inside the subtree of `root`
    fn ensure_outside(&self, target: NodeId, root: NodeId) -> Result<()> {
        self.ensure_live(target)?;
        let mut current = Some(target);
        while let Some(node) = current {
            if node == root {
                return Err(Error::Structure(format!(
                    "node {} lies inside node {}",
                    target, root
                )));
            }
            current = self.nodes[node.0].parent;
        }
        Ok(())
    }

    fn ensure_live(&self, id: NodeId) -> Result<()> {
        if self.is_live(id) {
            Ok(())
        } else {
            Err(Error::Structure(format!(
                "node {} is not part of the document",
                id
            )))
        }
    }
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| Error::Markup(e.to_string()))
}
