use std::collections::HashMap;

use crate::jira::IssueRecord;

/// One issue in the rendered forest: the record plus its children in rank
/// order. `expanded` belongs to the UI layer and starts true; toggling it
/// never requires a re-fetch.
#[derive(Debug, Clone)]
pub struct IssueNode {
    pub issue: IssueRecord,
    pub children: Vec<IssueNode>,
    pub expanded: bool,
}

impl IssueNode {
    fn new(issue: IssueRecord) -> Self {
        Self {
            issue,
            children: Vec::new(),
            expanded: true,
        }
    }

    /// Nodes in this subtree, including self.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(IssueNode::count).sum::<usize>()
    }
}

/// Builds a forest from a flat batch of records.
///
/// The input arrives pre-sorted by rank, so both root order and sibling order
/// preserve input order exactly. A `parent` key that does not resolve within
/// the batch makes the record a root. Duplicate keys are last-write-wins: the
/// earlier record drops out entirely. No cycle detection is performed;
/// mutually-parented records attach to each other, become unreachable from
/// the roots, and fall out of the forest.
pub fn build_forest(records: Vec<IssueRecord>) -> Vec<IssueNode> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(records.len());
    let mut nodes: Vec<Option<IssueNode>> = Vec::with_capacity(records.len());

    for (i, record) in records.into_iter().enumerate() {
        index.insert(record.key.clone(), i);
        nodes.push(Some(IssueNode::new(record)));
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut roots: Vec<usize> = Vec::new();

    for i in 0..nodes.len() {
        let record = match &nodes[i] {
            Some(node) => &node.issue,
            None => continue,
        };

        // A later duplicate shadows this slot; only the surviving record
        // attaches anywhere.
        if index.get(&record.key) != Some(&i) {
            nodes[i] = None;
            continue;
        }

        match record.parent.as_ref().and_then(|key| index.get(key)) {
            Some(&parent) => children[parent].push(i),
            None => roots.push(i),
        }
    }

    roots
        .into_iter()
        .filter_map(|i| take_subtree(i, &mut nodes, &children))
        .collect()
}

fn take_subtree(
    i: usize,
    nodes: &mut [Option<IssueNode>],
    children: &[Vec<usize>],
) -> Option<IssueNode> {
    let mut node = nodes[i].take()?;
    node.children = children[i]
        .iter()
        .filter_map(|&child| take_subtree(child, nodes, children))
        .collect();
    Some(node)
}
