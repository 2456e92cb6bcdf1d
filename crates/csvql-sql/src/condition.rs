//! Condition chain
//!
//! A flat, left-to-right sequence alternating predicates and logical
//! connectors: `P (C P)*`. Evaluation groups consecutive AND-joined
//! predicates and ORs the groups together, so AND binds tighter than OR.

use crate::types::{ComparisonOperator, ConditionDescriptor, DataType, LogicalOperator};

/// One comparison against a row field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub column: String,
    pub operator: ComparisonOperator,
    pub value: String,
    pub data_type: Option<DataType>,
}

impl From<&ConditionDescriptor> for Predicate {
    fn from(descriptor: &ConditionDescriptor) -> Self {
        Self {
            column: descriptor.column.clone(),
            operator: descriptor.operator,
            value: descriptor.value.clone(),
            data_type: descriptor.data_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionNode {
    Predicate(Predicate),
    Connector(LogicalOperator),
}

/// Ordered predicate/connector sequence built from a WHERE clause
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionChain {
    nodes: Vec<ConditionNode>,
}

impl ConditionChain {
    /// Build the chain from descriptors in query order.
    ///
    /// A connector is inserted only between two predicates. A descriptor
    /// without a logical operator that is followed by another one is joined
    /// with AND; the last descriptor's operator is ignored.
    pub fn build(descriptors: &[ConditionDescriptor]) -> Self {
        let mut nodes = Vec::with_capacity(descriptors.len() * 2);

        for (i, descriptor) in descriptors.iter().enumerate() {
            if i > 0 {
                let joining = descriptors[i - 1]
                    .logical_operator
                    .unwrap_or(LogicalOperator::And);
                nodes.push(ConditionNode::Connector(joining));
            }
            nodes.push(ConditionNode::Predicate(descriptor.into()));
        }

        Self { nodes }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[ConditionNode] {
        &self.nodes
    }

    pub fn predicate_count(&self) -> usize {
        self.predicates().count()
    }

    pub fn connector_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, ConditionNode::Connector(_)))
            .count()
    }

    pub fn predicates(&self) -> impl Iterator<Item = &Predicate> {
        self.nodes.iter().filter_map(|node| match node {
            ConditionNode::Predicate(p) => Some(p),
            ConditionNode::Connector(_) => None,
        })
    }

    /// Split into AND-groups; a row matches when any group fully matches.
    pub fn groups(&self) -> Vec<Vec<&Predicate>> {
        let mut groups = Vec::new();
        let mut current = Vec::new();

        for node in &self.nodes {
            match node {
                ConditionNode::Predicate(p) => current.push(p),
                ConditionNode::Connector(LogicalOperator::And) => {}
                ConditionNode::Connector(LogicalOperator::Or) => {
                    groups.push(std::mem::take(&mut current));
                }
            }
        }

        if !current.is_empty() {
            groups.push(current);
        }

        groups
    }
}
