#![forbid(unsafe_code)]

use std::any::Any;
use std::rc::{Rc, Weak};

use scenefield_core::{
    FieldExt, NamedNode, Node, NodeCore, NodeFilter, NodeListField, NodeRef, Subscription,
    TypeDef,
};
use tracing::warn;

use crate::parts::{self, GroupingPart, NodePart, X3D_CHILD_NODE, X3D_GROUPING_NODE};

/// Groups child nodes.
///
/// Events on `addChildren` append the nodes they carry to `children`
/// (skipping ones already present); events on `removeChildren` remove them.
pub struct Group {
    core: NodeCore,
    node: NodePart,
    grouping: GroupingPart,
    _edits: [Subscription; 2],
}

impl NamedNode for Group {
    const TYPE_NAME: &'static str = "Group";
}

#[derive(Clone, Copy)]
enum Edit {
    Add,
    Remove,
}

fn apply_edits(edits: &Rc<NodeListField>, children: &Rc<NodeListField>, edit: Edit) -> Subscription {
    let source = Rc::downgrade(edits);
    let target = Rc::downgrade(children);
    edits.subscribe(move |_| {
        let (Some(source), Some(target)) = (source.upgrade(), target.upgrade()) else {
            return;
        };
        for node in source.value() {
            let result = match edit {
                Edit::Add if target.contains(&*node) => Ok(()),
                Edit::Add => target.push_back(node),
                Edit::Remove => target.erase(&*node).map(drop),
            };
            if let Err(err) = result {
                warn!(%err, "children edit rejected");
            }
        }
    })
}

impl Group {
    #[must_use]
    pub fn new() -> Rc<Self> {
        let group = Rc::new_cyclic(|this: &Weak<Self>| {
            let owner: Weak<dyn Node> = this.clone();
            let grouping = GroupingPart::new(&owner);
            grouping.children.set_filter(NodeFilter::is_a(X3D_CHILD_NODE));
            let edits = [
                apply_edits(&grouping.add_children, &grouping.children, Edit::Add),
                apply_edits(&grouping.remove_children, &grouping.children, Edit::Remove),
            ];
            Self {
                core: NodeCore::new(),
                node: NodePart::new(&owner),
                grouping,
                _edits: edits,
            }
        });
        parts::init(&group);
        group
    }

    #[must_use]
    pub fn children(&self) -> &Rc<NodeListField> {
        &self.grouping.children
    }

    #[must_use]
    pub fn add_children(&self) -> &Rc<NodeListField> {
        &self.grouping.add_children
    }

    #[must_use]
    pub fn remove_children(&self) -> &Rc<NodeListField> {
        &self.grouping.remove_children
    }

    pub(crate) fn type_def() -> TypeDef {
        TypeDef::new(Self::TYPE_NAME)
            .parent(X3D_GROUPING_NODE)
            .factory(|| -> NodeRef { Self::new() })
    }
}

impl Node for Group {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn part(&self, type_name: &str) -> Option<&dyn Any> {
        match type_name {
            parts::X3D_NODE | X3D_CHILD_NODE => Some(&self.node as &dyn Any),
            X3D_GROUPING_NODE => Some(&self.grouping as &dyn Any),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use scenefield_core::FieldError;

    use super::*;
    use crate::geometry::BoxNode;

    #[test]
    fn children_accept_child_nodes_only() {
        let g = Group::new();
        let inner = Group::new();
        g.children().push_back(inner.clone()).unwrap();
        assert_eq!(g.children().len(), 1);

        let err = g.children().push_back(BoxNode::new()).unwrap_err();
        assert!(matches!(err, FieldError::InvalidNodeType { .. }));
        assert_eq!(g.children().len(), 1);
    }

    #[test]
    fn add_and_remove_children_edit_the_list() {
        let g = Group::new();
        let a: NodeRef = Group::new();
        let b: NodeRef = Group::new();

        g.add_children().set_value(vec![a.clone(), b.clone()]).unwrap();
        assert_eq!(g.children().len(), 2);

        g.add_children().set_value(vec![a.clone()]).unwrap();
        assert_eq!(g.children().len(), 2);

        g.remove_children().set_value(vec![a.clone()]).unwrap();
        assert_eq!(g.children().len(), 1);
        assert!(g.children().contains(&*b));
        assert!(!g.children().contains(&*a));
    }

    #[test]
    fn add_children_is_write_only() {
        let g = Group::new();
        assert!(g.add_children().get_value().is_err());
    }
}
