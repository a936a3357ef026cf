//! Expansion of the `id`/`ref` sharing scheme used by `xctrace export`.
//!
//! `xctrace` writes every repeated value only once. The first occurrence
//! carries an `id` attribute, and each later occurrence is an empty element
//! with a `ref` attribute naming that id:
//!
//! ```xml
//! <row><sample-time id="1" fmt="00:00.001">1000</sample-time>...</row>
//! <row><sample-time ref="1"/>...</row>
//! ```
//!
//! [`resolve`] turns a parsed row into an owned [`Element`] tree in which
//! every `ref` element has been replaced by the element it points to.
//! Resolved elements are shared through [`Rc`], so a subtree referenced
//! many times is stored once.

use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

/// Attribute marking an element as the definition of a shared value.
pub const ID_ATTR: &str = "id";

/// Attribute marking an element as a pointer to a previously defined value.
pub const REF_ATTR: &str = "ref";

/// Errors that can occur while resolving references.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("reference to unknown id '{0}'")]
    UnknownRef(String),
}

/// A child of an [`Element`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Child {
    Element(Rc<Element>),
    Text(String),
}

/// A resolved XML element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Child>,
}

impl Element {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn children(&self) -> &[Child] {
        &self.children
    }

    /// The text of the element, taken from its first child.
    ///
    /// Returns `None` when the element is empty or starts with an element
    /// child.
    pub fn text(&self) -> Option<&str> {
        match self.children.first() {
            Some(Child::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    /// The first child that is an element, skipping text.
    pub fn first_child_element(&self) -> Option<&Element> {
        self.children.iter().find_map(|child| match child {
            Child::Element(element) => Some(element.as_ref()),
            Child::Text(_) => None,
        })
    }

    /// All descendants named `name`, in document order. The element itself
    /// is not included.
    pub fn find_all(&self, name: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        self.collect_descendants(name, &mut found);
        found
    }

    /// The first descendant named `name`, in document order.
    pub fn find_first(&self, name: &str) -> Option<&Element> {
        for child in &self.children {
            if let Child::Element(element) = child {
                if element.name == name {
                    return Some(element.as_ref());
                }
                if let Some(found) = element.find_first(name) {
                    return Some(found);
                }
            }
        }
        None
    }

    fn collect_descendants<'a>(&'a self, name: &str, found: &mut Vec<&'a Element>) {
        for child in &self.children {
            if let Child::Element(element) = child {
                if element.name == name {
                    found.push(element.as_ref());
                }
                element.collect_descendants(name, found);
            }
        }
    }
}

/// Resolved elements keyed by their `id` attribute.
///
/// One cache is used for a whole document: ids defined in one row may be
/// referenced from any later row.
#[derive(Debug, Default)]
pub struct RefCache {
    entries: HashMap<String, Rc<Element>>,
}

impl RefCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Rc<Element>> {
        self.entries.get(id)
    }

    pub fn insert(&mut self, id: impl Into<String>, element: Rc<Element>) {
        self.entries.insert(id.into(), element);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, id: &str) -> Result<Rc<Element>, ResolveError> {
        self.get(id)
            .cloned()
            .ok_or_else(|| ResolveError::UnknownRef(id.to_string()))
    }
}

/// Resolve `node` and everything below it against `cache`.
///
/// Children carrying `ref` are replaced by the cached element with the
/// matching id; they are never descended into. Every other element child is
/// resolved recursively, and each element carrying `id` is added to the
/// cache once its children are resolved. Ids must be defined before they
/// are referenced in document order.
///
/// Only children are substituted: a `node` that itself carries `ref` is
/// copied as it stands and not cached.
pub fn resolve(
    node: roxmltree::Node<'_, '_>,
    cache: &mut RefCache,
) -> Result<Rc<Element>, ResolveError> {
    resolve_element(node, cache)
}

fn resolve_element(
    node: roxmltree::Node<'_, '_>,
    cache: &mut RefCache,
) -> Result<Rc<Element>, ResolveError> {
    let mut children = Vec::new();
    for child in node.children() {
        if child.is_text() {
            children.push(Child::Text(child.text().unwrap_or_default().to_string()));
        } else if child.is_element() {
            let resolved = match child.attribute(REF_ATTR) {
                Some(id) => cache.lookup(id)?,
                None => resolve_element(child, cache)?,
            };
            children.push(Child::Element(resolved));
        }
    }

    let element = Rc::new(Element {
        name: node.tag_name().name().to_string(),
        attributes: node
            .attributes()
            .map(|attr| (attr.name().to_string(), attr.value().to_string()))
            .collect(),
        children,
    });

    if let (Some(id), None) = (node.attribute(ID_ATTR), node.attribute(REF_ATTR)) {
        cache.insert(id, Rc::clone(&element));
    }

    Ok(element)
}
