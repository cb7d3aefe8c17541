//! Vertical margin collapsing over the laid-out block tree.
//!
//! KFX renderers do not collapse adjacent margins the way browsers do, so
//! the converter does it ahead of time. Content is recorded into a
//! [`MarginTree`] while the storyline is laid out, [`MarginTree::collapse`]
//! moves margins between siblings and across container edges, and
//! [`MarginTree::apply`] rewrites each node's style to a variant carrying
//! its final margins.
//!
//! Only margins in the ratio unit (`$310`) take part. Margins declared in
//! any other unit are left exactly as written.

use super::style::{StyleDef, StyleRegistry};
use crate::kfx::symbols::sym;

const EPSILON: f64 = 1e-9;

/// Top and bottom margin in line-height ratio units.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Margins {
    pub top: Option<f64>,
    pub bottom: Option<f64>,
}

impl Margins {
    pub fn new(top: f64, bottom: f64) -> Self {
        Self {
            top: nonzero(top),
            bottom: nonzero(bottom),
        }
    }
}

/// What a container groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// The storyline itself
    #[default]
    Root,
    Section,
    Poem,
    Stanza,
    Cite,
    Epigraph,
    Footnote,
    TitleBlock,
    Annotation,
}

impl ContainerKind {
    /// Collapse behavior this kind of container gets unless told otherwise.
    pub fn default_flags(self) -> ContainerFlags {
        let mut flags = ContainerFlags::default();
        match self {
            ContainerKind::TitleBlock => flags.title_block = true,
            ContainerKind::Stanza => {
                flags.strip_middle_margin_bottom = true;
                flags.transfer_mb_to_last_child = true;
            }
            ContainerKind::Cite | ContainerKind::Epigraph => flags.transfer_mb_to_last_child = true,
            ContainerKind::Annotation => flags.force_transfer_mb_to_last_child = true,
            ContainerKind::Root
            | ContainerKind::Section
            | ContainerKind::Poem
            | ContainerKind::Footnote => {}
        }
        flags
    }
}

/// Per-container switches for the collapse passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ContainerFlags {
    /// First child loses its top margin; bottom margin is never pulled up.
    pub title_block: bool,
    /// Border or padding on top: first child keeps its margin.
    pub prevent_collapse_top: bool,
    /// Border or padding at the bottom: last child keeps its margin.
    pub prevent_collapse_bottom: bool,
    /// All children but the last lose their bottom margin.
    pub strip_middle_margin_bottom: bool,
    /// Push the container's bottom margin into its last child, unless the
    /// container is itself the last child of its parent.
    pub transfer_mb_to_last_child: bool,
    /// Like `transfer_mb_to_last_child`, regardless of position.
    pub force_transfer_mb_to_last_child: bool,
}

impl ContainerFlags {
    /// Add collapse barriers for padding declared by `style`.
    pub fn with_style(mut self, style: &StyleDef) -> Self {
        let has = |key: &str| {
            style
                .get(key)
                .and_then(|v| v.get(sym::VALUE))
                .and_then(|v| v.as_decimal())
                .is_some_and(|d| d.coefficient != 0)
        };
        self.prevent_collapse_top |= has(sym::PADDING_TOP);
        self.prevent_collapse_bottom |= has(sym::PADDING_BOTTOM);
        self
    }
}

/// What a leaf entry holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ContentKind {
    #[default]
    Text,
    Image,
    /// Floated image; never exchanges margins with its siblings
    FloatImage,
    /// Produces no visible box, so its own margins collapse together
    Empty,
}

/// Handle to a node recorded in a [`MarginTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy)]
enum Role {
    Container {
        kind: ContainerKind,
        flags: ContainerFlags,
        /// Backed by a styled wrapper entry in the storyline
        has_wrapper: bool,
    },
    Content(ContentKind),
}

#[derive(Debug, Clone)]
struct Node {
    children: Vec<NodeId>,
    style: Option<String>,
    mt: Option<f64>,
    mb: Option<f64>,
    break_after_avoid: bool,
    role: Role,
}

impl Node {
    fn container(&self) -> Option<(ContainerKind, ContainerFlags, bool)> {
        match self.role {
            Role::Container {
                kind,
                flags,
                has_wrapper,
            } => Some((kind, flags, has_wrapper)),
            Role::Content(_) => None,
        }
    }

    fn is_container(&self) -> bool {
        self.container().is_some()
    }

    fn flags(&self) -> ContainerFlags {
        self.container().map(|(_, flags, _)| flags).unwrap_or_default()
    }

    fn is_float_image(&self) -> bool {
        matches!(self.role, Role::Content(ContentKind::FloatImage))
    }

    fn is_empty(&self) -> bool {
        match self.role {
            Role::Container { .. } => self.children.is_empty(),
            Role::Content(kind) => kind == ContentKind::Empty,
        }
    }
}

/// Block tree recorded during layout.
///
/// Nodes are appended in document order. Containers nest through an
/// internal stack: content goes into the innermost open container.
#[derive(Debug, Clone)]
pub struct MarginTree {
    nodes: Vec<Node>,
    stack: Vec<NodeId>,
}

impl Default for MarginTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MarginTree {
    const ROOT: NodeId = NodeId(0);

    pub fn new() -> Self {
        let root = Node {
            children: Vec::new(),
            style: None,
            mt: None,
            mb: None,
            break_after_avoid: false,
            role: Role::Container {
                kind: ContainerKind::Root,
                flags: ContainerFlags::default(),
                has_wrapper: false,
            },
        };
        Self {
            nodes: vec![root],
            stack: vec![Self::ROOT],
        }
    }

    /// Open a container backed by a styled wrapper entry.
    ///
    /// The wrapper's margins take part in collapsing and padding on the
    /// style blocks collapse through the matching edge.
    pub fn open_container(
        &mut self,
        style: &StyleDef,
        kind: ContainerKind,
        flags: ContainerFlags,
    ) -> NodeId {
        let margins = style.margins();
        let node = Node {
            children: Vec::new(),
            style: Some(style.name.clone()),
            mt: margins.top,
            mb: margins.bottom,
            break_after_avoid: false,
            role: Role::Container {
                kind,
                flags: flags.with_style(style),
                has_wrapper: true,
            },
        };
        let id = self.append(node);
        self.stack.push(id);
        id
    }

    /// Open a grouping that has no entry of its own in the storyline.
    ///
    /// Its margins end up on its children.
    pub fn open_virtual(
        &mut self,
        kind: ContainerKind,
        flags: ContainerFlags,
        margins: Margins,
    ) -> NodeId {
        let node = Node {
            children: Vec::new(),
            style: None,
            mt: margins.top.and_then(nonzero),
            mb: margins.bottom.and_then(nonzero),
            break_after_avoid: false,
            role: Role::Container {
                kind,
                flags,
                has_wrapper: false,
            },
        };
        let id = self.append(node);
        self.stack.push(id);
        id
    }

    /// Close the innermost open container.
    pub fn close_container(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        } else {
            tracing::debug!("close_container without a matching open");
        }
    }

    /// Record a leaf entry in the current container.
    pub fn push_content(&mut self, style: Option<&StyleDef>, kind: ContentKind) -> NodeId {
        let margins = style.map(StyleDef::margins).unwrap_or_default();
        let break_after_avoid = style
            .and_then(|s| s.get(sym::BREAK_AFTER))
            .and_then(|v| v.as_symbol())
            == Some(sym::AVOID);
        self.append(Node {
            children: Vec::new(),
            style: style.map(|s| s.name.clone()),
            mt: margins.top,
            mb: margins.bottom,
            break_after_avoid,
            role: Role::Content(kind),
        })
    }

    fn append(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        let parent = self.stack.last().copied().unwrap_or(Self::ROOT);
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Style currently assigned to a node.
    pub fn style(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(id.0)?.style.as_deref()
    }

    /// Current margins of a node.
    pub fn margins(&self, id: NodeId) -> Margins {
        self.nodes
            .get(id.0)
            .map(|node| Margins {
                top: node.mt,
                bottom: node.mb,
            })
            .unwrap_or_default()
    }

    /// Run every collapse pass over the whole tree.
    pub fn collapse(&mut self) {
        if self.stack.len() > 1 {
            tracing::debug!(open = self.stack.len() - 1, "collapsing with unclosed containers");
        }
        self.collapse_node(Self::ROOT, false, true);
    }

    fn collapse_node(&mut self, id: NodeId, is_last_child: bool, at_end: bool) {
        let children = self.nodes[id.0].children.clone();
        if children.is_empty() {
            return;
        }

        self.collapse_empty(&children);
        self.collapse_siblings(&children);
        self.collapse_first_child(id);

        let last = children.len() - 1;
        for (i, &child) in children.iter().enumerate() {
            self.collapse_node(child, i == last, at_end && i == last);
        }

        self.strip_middle_margin_bottom(id);
        self.collapse_last_child(id, is_last_child, at_end);
        self.collapse_siblings(&children);
    }

    /// Self-collapse nodes that render nothing.
    fn collapse_empty(&mut self, children: &[NodeId]) {
        for &child in children {
            let node = &mut self.nodes[child.0];
            if !node.is_empty() || (node.mt.is_none() && node.mb.is_none()) {
                continue;
            }
            let collapsed = collapse_values(node.mt.unwrap_or(0.0), node.mb.unwrap_or(0.0));
            node.mt = None;
            node.mb = nonzero(collapsed);
            tracing::trace!(node = child.0, "empty self-collapse");
        }
    }

    fn collapse_siblings(&mut self, children: &[NodeId]) {
        for pair in children.windows(2) {
            let (curr, next) = (pair[0], pair[1]);
            let c = &self.nodes[curr.0];
            let n = &self.nodes[next.0];

            if !c.is_container() {
                if c.is_float_image() || n.is_float_image() {
                    continue;
                }
                if c.break_after_avoid && c.mb.is_some() && n.is_container() {
                    self.move_bottom_to_top(curr, next);
                    continue;
                }
                if c.mb.is_some() && n.mt.is_some() {
                    self.move_bottom_to_top(curr, next);
                }
                if self.nodes[curr.0].mb.is_some() && self.nodes[next.0].is_container() {
                    self.move_bottom_to_top(curr, next);
                }
                continue;
            }

            let flags = c.flags();
            if flags.title_block {
                let target = self.title_block_target(next);
                if let Some(target) = target
                    && self.nodes[curr.0].mb.is_some()
                    && self.nodes[target.0].mt.is_some()
                {
                    self.move_bottom_to_top(curr, target);
                }
                continue;
            }

            if flags.transfer_mb_to_last_child {
                if let Some(next_mt) = n.mt {
                    if c.mb.is_some_and(|mb| next_mt >= mb) {
                        self.nodes[curr.0].mb = None;
                    }
                    if let Some(&last) = self.nodes[curr.0].children.last()
                        && self.nodes[last.0].mb.is_some_and(|mb| next_mt >= mb)
                    {
                        self.nodes[last.0].mb = None;
                    }
                }
                continue;
            }

            if c.mb.is_some() {
                self.move_bottom_to_top(curr, next);
            }
        }
    }

    /// First node after a title block whose top margin meets it.
    fn title_block_target(&self, next: NodeId) -> Option<NodeId> {
        let node = &self.nodes[next.0];
        if !node.is_container() || node.mt.is_some() {
            return Some(next);
        }
        let mut target = next;
        while self.nodes[target.0].is_container() {
            target = *self.nodes[target.0].children.first()?;
        }
        Some(target)
    }

    fn collapse_first_child(&mut self, id: NodeId) {
        let container = &self.nodes[id.0];
        let Some((_, flags, has_wrapper)) = container.container() else {
            return;
        };
        let Some(&first) = container.children.first() else {
            return;
        };
        if flags.prevent_collapse_top {
            return;
        }

        if flags.title_block {
            self.nodes[first.0].mt = None;
            return;
        }

        if has_wrapper {
            if let Some(first_mt) = self.nodes[first.0].mt.take() {
                let container = &mut self.nodes[id.0];
                container.mt = Some(collapse_option(container.mt, first_mt));
                tracing::trace!(node = first.0, "first child into wrapper");
            }
            return;
        }

        if let Some(container_mt) = self.nodes[id.0].mt.take() {
            let first = &mut self.nodes[first.0];
            first.mt = Some(collapse_option(first.mt, container_mt));
        }
    }

    fn collapse_last_child(&mut self, id: NodeId, is_last_child: bool, at_end: bool) {
        let container = &self.nodes[id.0];
        let Some((kind, flags, has_wrapper)) = container.container() else {
            return;
        };
        let Some(&last) = container.children.last() else {
            return;
        };
        if flags.prevent_collapse_bottom || flags.title_block {
            return;
        }

        if flags.force_transfer_mb_to_last_child
            || (flags.transfer_mb_to_last_child && !is_last_child)
        {
            self.push_bottom_down(id, last);
            return;
        }
        if kind == ContainerKind::Root {
            return;
        }
        if !has_wrapper && at_end {
            self.push_bottom_down(id, last);
            return;
        }
        if self.nodes[last.0].is_float_image() {
            return;
        }

        if let Some(last_mb) = self.nodes[last.0].mb.take() {
            let container = &mut self.nodes[id.0];
            container.mb = Some(collapse_option(container.mb, last_mb));
            tracing::trace!(node = last.0, "last child into container");
        }
    }

    fn strip_middle_margin_bottom(&mut self, id: NodeId) {
        let container = &self.nodes[id.0];
        if !container.flags().strip_middle_margin_bottom || container.children.len() <= 1 {
            return;
        }
        let middle = container.children[..container.children.len() - 1].to_vec();
        for child in middle {
            self.nodes[child.0].mb = None;
        }
    }

    /// Collapse `from`'s bottom margin into `to`'s top margin.
    fn move_bottom_to_top(&mut self, from: NodeId, to: NodeId) {
        if let Some(mb) = self.nodes[from.0].mb.take() {
            let target = &mut self.nodes[to.0];
            target.mt = Some(collapse_option(target.mt, mb));
            tracing::trace!(from = from.0, to = to.0, "sibling collapse");
        }
    }

    /// Collapse a container's bottom margin into its last child.
    fn push_bottom_down(&mut self, container: NodeId, last: NodeId) {
        if let Some(mb) = self.nodes[container.0].mb.take() {
            let target = &mut self.nodes[last.0];
            target.mb = Some(collapse_option(target.mb, mb));
            tracing::trace!(node = last.0, "container bottom into last child");
        }
    }

    /// Point every styled node at a style carrying its collapsed margins.
    ///
    /// A node whose margins did not change keeps its style. Otherwise the
    /// registry hands back a variant, shared between nodes that end up
    /// with identical properties.
    pub fn apply(&mut self, registry: &mut StyleRegistry) {
        for node in &mut self.nodes {
            let Some(name) = node.style.as_deref() else {
                continue;
            };
            let Some(base) = registry.get(name) else {
                tracing::debug!(style = name, "style not registered, margins left as is");
                continue;
            };
            let declared = base.margins();
            if same(declared.top, node.mt) && same(declared.bottom, node.mb) {
                continue;
            }
            let margins = Margins {
                top: node.mt,
                bottom: node.mb,
            };
            if let Some(variant) = registry.variant(name, margins) {
                node.style = Some(variant);
            }
        }
    }
}

/// Combine two adjoining margins.
///
/// Two positive margins keep the larger, two negative ones the more
/// negative, and mixed signs add up.
pub fn collapse_values(a: f64, b: f64) -> f64 {
    if a >= 0.0 && b >= 0.0 {
        a.max(b)
    } else if a <= 0.0 && b <= 0.0 {
        a.min(b)
    } else {
        a + b
    }
}

fn collapse_option(existing: Option<f64>, incoming: f64) -> f64 {
    match existing {
        Some(existing) => collapse_values(incoming, existing),
        None => incoming,
    }
}

fn nonzero(v: f64) -> Option<f64> {
    (v.abs() > EPSILON).then_some(v)
}

fn same(a: Option<f64>, b: Option<f64>) -> bool {
    match (a.and_then(nonzero), b.and_then(nonzero)) {
        (None, None) => true,
        (Some(a), Some(b)) => (a - b).abs() <= EPSILON,
        _ => false,
    }
}
