#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NodePayload {
    #[default]
    None,
    Schema(String),
    Table {
        schema: String,
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub id: String,
    pub label: String,
    pub children: Vec<TreeNode>,
    pub expanded: bool,
    pub payload: NodePayload,
}

impl TreeNode {
    #[must_use]
    pub fn new(id: impl Into<String>, label: impl Into<String>, payload: NodePayload) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            children: Vec::new(),
            expanded: false,
            payload,
        }
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<TreeNode>) -> Self {
        self.children = children;
        self
    }

    #[must_use]
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// One visible row of the flattened tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleNode<'a> {
    pub node: &'a TreeNode,
    pub depth: usize,
}

/// Expandable tree over a hidden root.
///
/// The flattened list holds the index path of every visible node and is
/// rebuilt after each change to `expanded`, so it always mirrors the
/// current expansion state.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    roots: Vec<TreeNode>,
    flat: Vec<Vec<usize>>,
    cursor: Option<usize>,
    scroll: usize,
    viewport_height: usize,
}

impl Tree {
    #[must_use]
    pub fn new(roots: Vec<TreeNode>) -> Self {
        let mut tree = Self {
            roots,
            ..Self::default()
        };
        tree.rebuild();
        tree
    }

    pub fn set_roots(&mut self, roots: Vec<TreeNode>) {
        self.roots = roots;
        self.cursor = None;
        self.scroll = 0;
        self.rebuild();
    }

    #[must_use]
    pub fn roots(&self) -> &[TreeNode] {
        &self.roots
    }

    #[must_use]
    pub fn visible_len(&self) -> usize {
        self.flat.len()
    }

    #[must_use]
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    #[must_use]
    pub fn scroll(&self) -> usize {
        self.scroll
    }

    pub fn set_viewport_height(&mut self, height: usize) {
        self.viewport_height = height;
        self.ensure_cursor_visible();
    }

    #[must_use]
    pub fn selected(&self) -> Option<&TreeNode> {
        let path = self.flat.get(self.cursor?)?;
        self.node_at(path)
    }

    pub fn move_up(&mut self) {
        if let Some(cursor) = self.cursor {
            self.cursor = Some(cursor.saturating_sub(1));
        }
        self.ensure_cursor_visible();
    }

    pub fn move_down(&mut self) {
        if let Some(cursor) = self.cursor {
            self.cursor = Some((cursor + 1).min(self.flat.len() - 1));
        }
        self.ensure_cursor_visible();
    }

    pub fn expand(&mut self) {
        self.update_selected(|node| node.expanded = true);
    }

    pub fn collapse(&mut self) {
        self.update_selected(|node| node.expanded = false);
    }

    pub fn toggle(&mut self) {
        self.update_selected(|node| node.expanded = !node.expanded);
    }

    /// Rows inside the scroll window, paired with their depth for indentation.
    #[must_use]
    pub fn visible_window(&self, rows: usize) -> Vec<VisibleNode<'_>> {
        self.flat
            .iter()
            .skip(self.scroll)
            .take(rows)
            .filter_map(|path| {
                self.node_at(path).map(|node| VisibleNode {
                    node,
                    depth: path.len() - 1,
                })
            })
            .collect()
    }

    fn update_selected(&mut self, apply: impl FnOnce(&mut TreeNode)) {
        let Some(path) = self.cursor.and_then(|cursor| self.flat.get(cursor)).cloned() else {
            return;
        };
        let Some(node) = self.node_at_mut(&path) else {
            return;
        };
        if !node.has_children() {
            return;
        }
        apply(node);
        self.rebuild();
    }

    fn rebuild(&mut self) {
        fn flatten(nodes: &[TreeNode], prefix: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
            for (index, node) in nodes.iter().enumerate() {
                prefix.push(index);
                out.push(prefix.clone());
                if node.expanded {
                    flatten(&node.children, prefix, out);
                }
                prefix.pop();
            }
        }

        let mut flat = Vec::new();
        flatten(&self.roots, &mut Vec::new(), &mut flat);
        self.flat = flat;

        self.cursor = if self.flat.is_empty() {
            None
        } else {
            Some(self.cursor.unwrap_or(0).min(self.flat.len() - 1))
        };
        self.ensure_cursor_visible();
    }

    fn ensure_cursor_visible(&mut self) {
        let Some(cursor) = self.cursor else {
            self.scroll = 0;
            return;
        };
        let visible = self.viewport_height.max(1);
        if cursor < self.scroll {
            self.scroll = cursor;
        } else if cursor >= self.scroll + visible {
            self.scroll = cursor + 1 - visible;
        }
    }

    fn node_at(&self, path: &[usize]) -> Option<&TreeNode> {
        let (first, rest) = path.split_first()?;
        let mut node = self.roots.get(*first)?;
        for index in rest {
            node = node.children.get(*index)?;
        }
        Some(node)
    }

    fn node_at_mut(&mut self, path: &[usize]) -> Option<&mut TreeNode> {
        let (first, rest) = path.split_first()?;
        let mut node = self.roots.get_mut(*first)?;
        for index in rest {
            node = node.children.get_mut(*index)?;
        }
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::{NodePayload, Tree, TreeNode};

    fn schema(name: &str, tables: usize) -> TreeNode {
        let children = (0..tables)
            .map(|index| {
                TreeNode::new(
                    format!("table:{name}.t{index}"),
                    format!("t{index}"),
                    NodePayload::Table {
                        schema: name.to_string(),
                        name: format!("t{index}"),
                    },
                )
            })
            .collect();
        TreeNode::new(
            format!("schema:{name}"),
            name,
            NodePayload::Schema(name.to_string()),
        )
        .with_children(children)
    }

    #[test]
    fn collapsed_schemas_flatten_to_one_row_each() {
        let tree = Tree::new(vec![schema("a", 3), schema("b", 0), schema("c", 5)]);
        assert_eq!(tree.visible_len(), 3);
        assert_eq!(tree.cursor(), Some(0));
    }

    #[test]
    fn expanding_a_schema_adds_exactly_its_tables() {
        let mut tree = Tree::new(vec![schema("a", 3), schema("b", 0), schema("c", 5)]);
        tree.move_down();
        tree.move_down();
        tree.expand();
        assert_eq!(tree.visible_len(), 8);

        tree.move_up();
        tree.move_up();
        tree.toggle();
        assert_eq!(tree.visible_len(), 11);
    }

    #[test]
    fn expand_is_a_no_op_on_leaves_and_empty_schemas() {
        let mut tree = Tree::new(vec![schema("a", 0)]);
        tree.expand();
        assert!(!tree.roots()[0].expanded);
        assert_eq!(tree.visible_len(), 1);
    }

    #[test]
    fn replacing_roots_resets_cursor_to_first_row() {
        let mut tree = Tree::new(vec![schema("a", 4)]);
        tree.expand();
        for _ in 0..4 {
            tree.move_down();
        }
        assert_eq!(tree.cursor(), Some(4));
        assert!(matches!(
            tree.selected().map(|node| &node.payload),
            Some(NodePayload::Table { .. })
        ));

        tree.set_roots(vec![schema("a", 4)]);
        assert_eq!(tree.cursor(), Some(0));
    }

    #[test]
    fn empty_tree_has_no_cursor_or_selection() {
        let mut tree = Tree::new(Vec::new());
        tree.move_down();
        tree.toggle();
        assert_eq!(tree.cursor(), None);
        assert!(tree.selected().is_none());
    }

    #[test]
    fn visible_window_reports_depth_and_follows_scroll() {
        let mut tree = Tree::new(vec![schema("a", 5)]);
        tree.set_viewport_height(3);
        tree.expand();
        for _ in 0..4 {
            tree.move_down();
        }
        assert_eq!(tree.scroll(), 2);

        let window = tree.visible_window(3);
        let labels = window
            .iter()
            .map(|row| (row.node.label.as_str(), row.depth))
            .collect::<Vec<_>>();
        assert_eq!(labels, vec![("t1", 1), ("t2", 1), ("t3", 1)]);
    }
}
