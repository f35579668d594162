//! Join routing graph.
//!
//! Tables are nodes, joins are undirected edges. The tree answers reachability
//! questions used to validate that a requested set of tables is connected, and
//! produces the traversal order used when emitting FROM clauses.
//!
//! Nodes live in an arena and are addressed by index; traversal keeps an explicit
//! visited set and work stack, so cyclic graphs of any size terminate without
//! growing the call stack.

use std::collections::{HashMap, VecDeque};

use crate::error::{PlanError, PlanResult};
use crate::model::{Join, JoinKind, Table};

/// Index of a node in the tree's arena.
pub type NodeId = usize;

/// One table and the joins touching it.
#[derive(Debug, Clone)]
pub struct JoinTreeNode {
    table: Table,
    /// Indices into the tree's join list.
    edges: Vec<usize>,
}

impl JoinTreeNode {
    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

/// A table added to the FROM chain, with the joins that attach it.
#[derive(Debug, Clone)]
pub struct JoinStep<'a> {
    pub table: &'a Table,
    pub kind: JoinKind,
    pub joins: Vec<&'a Join>,
}

/// FROM-clause ordering produced by [`JoinTree::traversal`].
#[derive(Debug, Clone)]
pub struct JoinTraversal<'a> {
    pub root: &'a Table,
    pub steps: Vec<JoinStep<'a>>,
    /// Self joins on the root table; these belong in the WHERE clause.
    pub root_predicates: Vec<&'a Join>,
}

#[derive(Debug, Clone, Default)]
pub struct JoinTree {
    joins: Vec<Join>,
    nodes: Vec<JoinTreeNode>,
    index: HashMap<Table, NodeId>,
    root: Option<NodeId>,
}

impl JoinTree {
    /// Build the tree from every join of a plan.
    ///
    /// The left-hand table of the first join becomes the root. Tables that take part
    /// in no join are not registered.
    pub fn build(joins: &[Join]) -> JoinTree {
        let mut tree = JoinTree {
            joins: joins.to_vec(),
            ..Default::default()
        };

        for (i, join) in joins.iter().enumerate() {
            let left = tree.intern(join.left_table());
            let right = tree.intern(join.right_table());
            tree.nodes[left].edges.push(i);
            if right != left {
                tree.nodes[right].edges.push(i);
            }
            if tree.root.is_none() {
                tree.root = Some(left);
            }
        }

        tree
    }

    fn intern(&mut self, table: &Table) -> NodeId {
        if let Some(id) = self.index.get(table) {
            return *id;
        }
        let id = self.nodes.len();
        self.nodes.push(JoinTreeNode {
            table: table.clone(),
            edges: Vec::new(),
        });
        self.index.insert(table.clone(), id);
        id
    }

    /// Re-root the tree on `table`, which must be registered.
    pub fn with_root(mut self, table: &Table) -> PlanResult<JoinTree> {
        let id = self.index.get(table).copied().ok_or_else(|| {
            PlanError::IllegalArgument(format!(
                "table '{}' takes part in no join",
                table.qualified_name()
            ))
        })?;
        self.root = Some(id);
        Ok(self)
    }

    pub fn root(&self) -> Option<&JoinTreeNode> {
        self.root.map(|id| &self.nodes[id])
    }

    pub fn node(&self, table: &Table) -> Option<&JoinTreeNode> {
        self.index.get(table).map(|id| &self.nodes[*id])
    }

    pub fn contains(&self, table: &Table) -> bool {
        self.index.contains_key(table)
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.nodes.iter().map(|n| &n.table)
    }

    /// Whether a chain of joins leads from `from` to `to`.
    ///
    /// A registered table reaches itself whenever it has at least one edge (out and
    /// back along the same join). Unregistered tables reach nothing.
    pub fn has_route(&self, from: &Table, to: &Table) -> bool {
        let (Some(&start), Some(&target)) = (self.index.get(from), self.index.get(to)) else {
            return false;
        };

        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![start];
        visited[start] = true;

        while let Some(current) = stack.pop() {
            for &edge in &self.nodes[current].edges {
                let next = self.neighbour(current, edge);
                if next == target {
                    return true;
                }
                if !visited[next] {
                    visited[next] = true;
                    stack.push(next);
                }
            }
        }

        false
    }

    fn neighbour(&self, node: NodeId, edge: usize) -> NodeId {
        let join = &self.joins[edge];
        let left = self.index[join.left_table()];
        if left == node {
            self.index[join.right_table()]
        } else {
            left
        }
    }

    /// Every registered table is reachable from the root.
    pub fn is_connected(&self) -> bool {
        match self.root() {
            Some(root) => self.nodes.iter().all(|n| {
                n.table == root.table || self.has_route(&root.table, &n.table)
            }),
            None => true,
        }
    }

    /// Breadth-first order from the root, for emitting `FROM root JOIN ... ON ...`.
    ///
    /// Each join is attached to whichever of its two tables enters the chain later,
    /// so composite keys and cycle-closing joins end up in that table's ON clause.
    /// Tables not reachable from the root are left out.
    pub fn traversal(&self) -> Option<JoinTraversal<'_>> {
        let root = self.root?;
        let mut position = vec![usize::MAX; self.nodes.len()];
        let mut order = vec![root];
        let mut kinds = vec![JoinKind::Inner];
        position[root] = 0;

        let mut queue = VecDeque::from([root]);
        while let Some(current) = queue.pop_front() {
            for &edge in &self.nodes[current].edges {
                let next = self.neighbour(current, edge);
                if position[next] != usize::MAX {
                    continue;
                }
                let join = &self.joins[edge];
                let kind = if self.index[join.left_table()] == current {
                    join.kind
                } else {
                    join.kind.reversed()
                };
                position[next] = order.len();
                order.push(next);
                kinds.push(kind);
                queue.push_back(next);
            }
        }

        let mut steps: Vec<JoinStep<'_>> = order
            .iter()
            .zip(kinds)
            .skip(1)
            .map(|(&id, kind)| JoinStep {
                table: &self.nodes[id].table,
                kind,
                joins: Vec::new(),
            })
            .collect();

        let mut root_predicates = Vec::new();
        for join in &self.joins {
            let left = position[self.index[join.left_table()]];
            let right = position[self.index[join.right_table()]];
            if left == usize::MAX || right == usize::MAX {
                continue;
            }
            let later = left.max(right);
            if later > 0 {
                steps[later - 1].joins.push(join);
            } else {
                root_predicates.push(join);
            }
        }

        Some(JoinTraversal {
            root: &self.nodes[root].table,
            steps,
            root_predicates,
        })
    }
}
