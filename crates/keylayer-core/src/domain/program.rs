//! Macros as an arena of action nodes.
//!
//! Composite actions refer to their children by [`NodeId`].  A child must be
//! added before the node that references it and may have only one parent, so
//! every [`Macro`] is a finite tree and the interpreter can walk it without
//! cycle checks.
//!
//! ```text
//! nodes: [0] Delay 10ms
//!        [1] Loop ×3 { body: [0] }
//!        [2] Text "done"
//! roots: [1, 2]
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::action::{Action, NodeId};

/// Errors raised while building or loading a [`Macro`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MacroError {
    /// A node lists a child that does not precede it in the arena.
    #[error("node {parent} references {child}, which is not an earlier node")]
    ForwardReference { parent: NodeId, child: NodeId },

    /// A node is listed as a child (or root) more than once.
    #[error("node {0} has more than one parent")]
    SharedNode(NodeId),

    /// A root id does not exist.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
}

/// An action plus its per-node settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionNode {
    pub action: Action,
    /// Disabled nodes are skipped together with their children.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl ActionNode {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            enabled: true,
            description: None,
        }
    }
}

/// A validated action tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMacro")]
pub struct Macro {
    nodes: Vec<ActionNode>,
    roots: Vec<NodeId>,
}

/// Unvalidated wire shape of [`Macro`].
#[derive(Deserialize)]
struct RawMacro {
    #[serde(default)]
    nodes: Vec<ActionNode>,
    #[serde(default)]
    roots: Vec<NodeId>,
}

impl TryFrom<RawMacro> for Macro {
    type Error = MacroError;

    fn try_from(raw: RawMacro) -> Result<Self, Self::Error> {
        let mut parents = vec![false; raw.nodes.len()];
        for (index, node) in raw.nodes.iter().enumerate() {
            for child in node.action.children() {
                if child.0 >= index {
                    return Err(MacroError::ForwardReference {
                        parent: NodeId(index),
                        child,
                    });
                }
                claim(&mut parents, child)?;
            }
        }
        for &root in &raw.roots {
            if root.0 >= raw.nodes.len() {
                return Err(MacroError::UnknownNode(root));
            }
            claim(&mut parents, root)?;
        }
        Ok(Macro {
            nodes: raw.nodes,
            roots: raw.roots,
        })
    }
}

fn claim(parents: &mut [bool], id: NodeId) -> Result<(), MacroError> {
    if std::mem::replace(&mut parents[id.0], true) {
        return Err(MacroError::SharedNode(id));
    }
    Ok(())
}

impl Macro {
    pub fn new() -> Self {
        Self::default()
    }

    /// A flat macro whose roots are `actions` in order.
    ///
    /// # Panics
    ///
    /// Panics if any action is composite; build trees with [`Macro::add`].
    pub fn sequence(actions: impl IntoIterator<Item = Action>) -> Self {
        let mut m = Macro::new();
        for action in actions {
            assert!(
                action.children().next().is_none(),
                "Macro::sequence takes leaf actions only"
            );
            let id = m.push_node(ActionNode::new(action));
            m.roots.push(id);
        }
        m
    }

    /// Adds a detached node.  Its children must already exist and be unclaimed.
    pub fn add(&mut self, action: Action) -> Result<NodeId, MacroError> {
        self.add_node(ActionNode::new(action))
    }

    /// Like [`Macro::add`] for a node with custom settings.
    pub fn add_node(&mut self, node: ActionNode) -> Result<NodeId, MacroError> {
        let next = NodeId(self.nodes.len());
        let mut claimed = self.claimed();
        for child in node.action.children() {
            if child >= next {
                return Err(MacroError::ForwardReference {
                    parent: next,
                    child,
                });
            }
            claim(&mut claimed, child)?;
        }
        Ok(self.push_node(node))
    }

    /// Adds `action` and appends it to the top-level sequence.
    pub fn append(&mut self, action: Action) -> Result<NodeId, MacroError> {
        let id = self.add(action)?;
        self.roots.push(id);
        Ok(id)
    }

    /// Appends an existing detached node to the top-level sequence.
    pub fn push_root(&mut self, id: NodeId) -> Result<(), MacroError> {
        if id.0 >= self.nodes.len() {
            return Err(MacroError::UnknownNode(id));
        }
        let mut claimed = self.claimed();
        claim(&mut claimed, id)?;
        self.roots.push(id);
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> Option<&ActionNode> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut ActionNode> {
        self.nodes.get_mut(id.0)
    }

    /// Top-level node ids in execution order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Enables or disables a node.  Returns `false` if `id` is unknown.
    pub fn set_enabled(&mut self, id: NodeId, enabled: bool) -> bool {
        match self.nodes.get_mut(id.0) {
            Some(node) => {
                node.enabled = enabled;
                true
            }
            None => false,
        }
    }

    fn push_node(&mut self, node: ActionNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn claimed(&self) -> Vec<bool> {
        let mut claimed = vec![false; self.nodes.len()];
        for id in self
            .nodes
            .iter()
            .flat_map(|n| n.action.children())
            .chain(self.roots.iter().copied())
        {
            claimed[id.0] = true;
        }
        claimed
    }
}
