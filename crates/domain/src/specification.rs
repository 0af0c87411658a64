//! Specification algebra: recursive AND / OR / NOT trees over arbitrary leaves.
//!
//! The same tree shape serves two purposes:
//!
//! - **Evaluation**: leaves reduce to `bool` ([`Specification::evaluate`]),
//!   which is how automation conditions are checked.
//! - **Translation**: leaves map to some other representation through a
//!   [`SpecificationVisitor`] ([`Specification::fold`]), which is how the
//!   storage adapter turns execution queries into SQL filters.
//!
//! Boundary cases are fixed: an empty `AND` group is `true` (nothing failed)
//! and an empty `OR` group is `false` (nothing succeeded).

use serde::{Deserialize, Serialize};

/// Combinator joining the children of a [`Specification::Group`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupOperator {
    And,
    Or,
}

impl GroupOperator {
    /// Result of the operator over zero operands.
    #[must_use]
    pub fn identity(self) -> bool {
        matches!(self, Self::And)
    }

    /// The child value that decides the whole group without looking further.
    #[must_use]
    pub fn short_circuits_on(self) -> bool {
        matches!(self, Self::Or)
    }

    /// Fold one child's value into the group: `Some` once the group is
    /// decided, `None` while the remaining children still matter.
    ///
    /// Every evaluator walks groups through this step, synchronous or not,
    /// followed by [`identity`](Self::identity) when no child decided.
    #[must_use]
    pub fn settle(self, child: bool) -> Option<bool> {
        (child == self.short_circuits_on()).then_some(child)
    }
}

impl std::fmt::Display for GroupOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::And => f.write_str("and"),
            Self::Or => f.write_str("or"),
        }
    }
}

/// A finite boolean expression tree whose leaves are `L`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specification<L> {
    Leaf(L),
    Group {
        operator: GroupOperator,
        children: Vec<Specification<L>>,
    },
    Not(Box<Specification<L>>),
}

/// Bottom-up translation of a [`Specification`] into another representation.
pub trait SpecificationVisitor<L> {
    type Output;

    fn leaf(&mut self, leaf: &L) -> Self::Output;

    fn group(&mut self, operator: GroupOperator, children: Vec<Self::Output>) -> Self::Output;

    fn negate(&mut self, child: Self::Output) -> Self::Output;
}

impl<L> Specification<L> {
    #[must_use]
    pub fn leaf(leaf: L) -> Self {
        Self::Leaf(leaf)
    }

    #[must_use]
    pub fn all(children: Vec<Self>) -> Self {
        Self::Group {
            operator: GroupOperator::And,
            children,
        }
    }

    #[must_use]
    pub fn any(children: Vec<Self>) -> Self {
        Self::Group {
            operator: GroupOperator::Or,
            children,
        }
    }

    #[must_use]
    pub fn negate(child: Self) -> Self {
        Self::Not(Box::new(child))
    }

    /// Reduce the tree to a boolean, asking `leaf` for each leaf value.
    ///
    /// Groups stop at the first child that decides them, so `leaf` is never
    /// called for siblings after a `false` under `AND` or a `true` under `OR`.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `leaf`.
    pub fn evaluate<E>(&self, leaf: &mut impl FnMut(&L) -> Result<bool, E>) -> Result<bool, E> {
        match self {
            Self::Leaf(value) => leaf(value),
            Self::Group { operator, children } => {
                for child in children {
                    if let Some(decided) = operator.settle(child.evaluate(leaf)?) {
                        return Ok(decided);
                    }
                }
                Ok(operator.identity())
            }
            Self::Not(child) => child.evaluate(leaf).map(|value| !value),
        }
    }

    /// Translate the tree bottom-up through `visitor`.
    pub fn fold<V: SpecificationVisitor<L>>(&self, visitor: &mut V) -> V::Output {
        match self {
            Self::Leaf(value) => visitor.leaf(value),
            Self::Group { operator, children } => {
                let translated = children.iter().map(|child| child.fold(visitor)).collect();
                visitor.group(*operator, translated)
            }
            Self::Not(child) => {
                let translated = child.fold(visitor);
                visitor.negate(translated)
            }
        }
    }

    /// All leaves in depth-first, left-to-right order.
    #[must_use]
    pub fn leaves(&self) -> Vec<&L> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a L>) {
        match self {
            Self::Leaf(value) => out.push(value),
            Self::Group { children, .. } => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
            Self::Not(child) => child.collect_leaves(out),
        }
    }

    /// Number of nodes on the longest root-to-leaf path.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::Group { children, .. } => {
                1 + children.iter().map(Self::depth).max().unwrap_or(0)
            }
            Self::Not(child) => 1 + child.depth(),
        }
    }

    /// Rebuild the same tree shape with every leaf mapped through `f`.
    #[must_use]
    pub fn map<M>(&self, f: &mut impl FnMut(&L) -> M) -> Specification<M> {
        match self {
            Self::Leaf(value) => Specification::Leaf(f(value)),
            Self::Group { operator, children } => Specification::Group {
                operator: *operator,
                children: children.iter().map(|child| child.map(f)).collect(),
            },
            Self::Not(child) => Specification::Not(Box::new(child.map(f))),
        }
    }
}
