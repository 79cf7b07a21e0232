//! Clause tree emitted by translation.
//!
//! The structures here are a typed rendition of the Cypher subset the
//! translator needs. They serialize so the plan can be inspected or shipped
//! to another process, and render to text through [`super::render`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier assigned to a binding (node, relationship or value).
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Var(pub String);

impl Var {
    /// Creates a variable from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Var(name.into())
    }

    /// Variable name.
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Expression reading the variable.
    pub fn expr(&self) -> Expr {
        Expr::Var(self.clone())
    }

    /// Expression reading `self.property`.
    pub fn prop(&self, property: &str) -> Expr {
        Expr::Property(Box::new(self.expr()), property.to_owned())
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Direction selector for relationship patterns.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum EdgeDirection {
    /// `-[]->`.
    Out,
    /// `<-[]-`.
    In,
    /// `-[]-`.
    Both,
}

/// Node part of a pattern.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodePattern {
    /// Bound variable, if any.
    pub var: Option<Var>,
    /// Label constraints.
    pub labels: Vec<String>,
}

impl NodePattern {
    /// Node bound to `var` with `labels`.
    pub fn new(var: &Var, labels: &[String]) -> Self {
        Self {
            var: Some(var.clone()),
            labels: labels.to_vec(),
        }
    }

    /// Node bound to `var` without labels.
    pub fn bound(var: &Var) -> Self {
        Self {
            var: Some(var.clone()),
            labels: Vec::new(),
        }
    }

    /// Anonymous node with `labels`.
    pub fn anonymous(labels: &[String]) -> Self {
        Self {
            var: None,
            labels: labels.to_vec(),
        }
    }
}

/// Relationship part of a pattern.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelPattern {
    /// Bound variable, if any.
    pub var: Option<Var>,
    /// Relationship type.
    pub rel_type: String,
    /// Direction relative to the preceding node.
    pub direction: EdgeDirection,
}

/// A path pattern: a start node followed by relationship hops.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// First node.
    pub start: NodePattern,
    /// Subsequent hops.
    pub steps: Vec<(RelPattern, NodePattern)>,
}

impl Pattern {
    /// Single-node pattern.
    pub fn node(start: NodePattern) -> Self {
        Self {
            start,
            steps: Vec::new(),
        }
    }

    /// Appends a hop.
    pub fn hop(mut self, rel: RelPattern, node: NodePattern) -> Self {
        self.steps.push((rel, node));
        self
    }
}

/// Literal values embedded in the clause tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// `NULL`.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// String.
    String(String),
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// Binary operators.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `=`.
    Eq,
    /// `<>`.
    Neq,
    /// `<`.
    Lt,
    /// `<=`.
    Lte,
    /// `>`.
    Gt,
    /// `>=`.
    Gte,
    /// `IN`.
    In,
    /// `CONTAINS`.
    Contains,
    /// `STARTS WITH`.
    StartsWith,
    /// `ENDS WITH`.
    EndsWith,
    /// `=~`.
    Matches,
    /// `+`.
    Add,
    /// `-`.
    Sub,
    /// `*`.
    Mul,
    /// `/`.
    Div,
}

impl BinaryOp {
    /// Cypher spelling.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Neq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::In => "IN",
            BinaryOp::Contains => "CONTAINS",
            BinaryOp::StartsWith => "STARTS WITH",
            BinaryOp::EndsWith => "ENDS WITH",
            BinaryOp::Matches => "=~",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    /// Arithmetic rather than comparison.
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div
        )
    }
}

/// List predicate functions.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Quantifier {
    /// `any(...)`.
    Any,
    /// `all(...)`.
    All,
    /// `none(...)`.
    None,
    /// `single(...)`.
    Single,
}

/// Entry of a map projection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MapItem {
    /// `.name`.
    Property(String),
    /// `.*`.
    AllProperties,
    /// `key: expr`.
    Entry(String, Expr),
}

/// Expressions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Variable reference.
    Var(Var),
    /// `$name`.
    Param(String),
    /// Literal.
    Literal(Literal),
    /// `expr.name`.
    Property(Box<Expr>, String),
    /// `list[index]`.
    Index {
        /// List expression.
        list: Box<Expr>,
        /// Index expression.
        index: Box<Expr>,
    },
    /// `list[from..to]`.
    Slice {
        /// List expression.
        list: Box<Expr>,
        /// Inclusive lower bound.
        from: Option<Box<Expr>>,
        /// Exclusive upper bound.
        to: Option<Box<Expr>>,
    },
    /// Binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// Conjunction.
    And(Vec<Expr>),
    /// Disjunction.
    Or(Vec<Expr>),
    /// Negation.
    Not(Box<Expr>),
    /// `expr IS NULL`.
    IsNull(Box<Expr>),
    /// `expr IS NOT NULL`.
    IsNotNull(Box<Expr>),
    /// `var:Label`.
    HasLabels(Var, Vec<String>),
    /// Function call.
    Function {
        /// Function name, possibly namespaced.
        name: String,
        /// `DISTINCT` modifier for aggregates.
        distinct: bool,
        /// Arguments.
        args: Vec<Expr>,
    },
    /// `count(*)`.
    CountAll,
    /// `any(v IN list WHERE predicate)` and friends.
    Quantified {
        /// Quantifier.
        quantifier: Quantifier,
        /// Iteration variable.
        var: Var,
        /// Iterated list.
        list: Box<Expr>,
        /// Predicate.
        predicate: Box<Expr>,
    },
    /// `[v IN list WHERE filter | map]`.
    ListComprehension {
        /// Iteration variable.
        var: Var,
        /// Iterated list.
        list: Box<Expr>,
        /// Optional filter.
        filter: Option<Box<Expr>>,
        /// Optional mapping.
        map: Option<Box<Expr>>,
    },
    /// `[pattern WHERE filter | map]`.
    PatternComprehension {
        /// Pattern.
        pattern: Pattern,
        /// Optional filter.
        filter: Option<Box<Expr>>,
        /// Mapping.
        map: Box<Expr>,
    },
    /// `EXISTS { MATCH pattern WHERE filter }`.
    Exists {
        /// Pattern.
        pattern: Pattern,
        /// Optional filter.
        filter: Option<Box<Expr>>,
    },
    /// Map literal.
    Map(Vec<(String, Expr)>),
    /// `var { ... }`.
    MapProjection {
        /// Projected variable.
        var: Var,
        /// Projection entries.
        items: Vec<MapItem>,
    },
    /// List literal.
    List(Vec<Expr>),
    /// `reduce(acc = init, v IN list | expr)`.
    Reduce {
        /// Accumulator.
        acc: Var,
        /// Initial value.
        init: Box<Expr>,
        /// Iteration variable.
        var: Var,
        /// Iterated list.
        list: Box<Expr>,
        /// Step expression.
        expr: Box<Expr>,
    },
    /// `CASE WHEN ... THEN ... ELSE ... END`.
    Case {
        /// Condition and result pairs.
        branches: Vec<(Expr, Expr)>,
        /// `ELSE` result.
        otherwise: Option<Box<Expr>>,
    },
}

impl Expr {
    /// `$name`.
    pub fn param(name: impl Into<String>) -> Self {
        Expr::Param(name.into())
    }

    /// Literal expression.
    pub fn lit(value: impl Into<Literal>) -> Self {
        Expr::Literal(value.into())
    }

    /// `NULL`.
    pub fn null() -> Self {
        Expr::Literal(Literal::Null)
    }

    /// Binary operation.
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// `lhs = rhs`.
    pub fn eq(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Eq, lhs, rhs)
    }

    /// `expr.name`.
    pub fn prop(self, name: &str) -> Self {
        Expr::Property(Box::new(self), name.to_owned())
    }

    /// `NOT (expr)`; double negation collapses.
    pub fn negate(self) -> Self {
        match self {
            Expr::Not(inner) => *inner,
            Expr::Literal(Literal::Bool(b)) => Expr::lit(!b),
            other => Expr::Not(Box::new(other)),
        }
    }

    /// Function call.
    pub fn call(name: &str, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.to_owned(),
            distinct: false,
            args,
        }
    }

    /// Conjunction of the given predicates; `None` when empty.
    pub fn all_of(exprs: impl IntoIterator<Item = Expr>) -> Option<Self> {
        let mut flat = Vec::new();
        for expr in exprs {
            match expr {
                Expr::And(inner) => flat.extend(inner),
                Expr::Literal(Literal::Bool(true)) => {}
                other => flat.push(other),
            }
        }
        if flat.iter().any(|e| matches!(e, Expr::Literal(Literal::Bool(false)))) {
            return Some(Expr::lit(false));
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Expr::And(flat)),
        }
    }

    /// Disjunction of the given predicates; `None` when empty.
    pub fn any_of(exprs: impl IntoIterator<Item = Expr>) -> Option<Self> {
        let mut flat = Vec::new();
        for expr in exprs {
            match expr {
                Expr::Or(inner) => flat.extend(inner),
                Expr::Literal(Literal::Bool(false)) => {}
                other => flat.push(other),
            }
        }
        if flat.iter().any(|e| matches!(e, Expr::Literal(Literal::Bool(true)))) {
            return Some(Expr::lit(true));
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Expr::Or(flat)),
        }
    }
}

/// `target = value` entry of a `SET` clause.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetItem {
    /// Property being written.
    pub target: Expr,
    /// Value expression.
    pub value: Expr,
}

/// `expr AS alias` item of a projection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectionItem {
    /// Projected expression.
    pub expr: Expr,
    /// Alias, omitted when projecting a variable under its own name.
    pub alias: Option<Var>,
}

impl ProjectionItem {
    /// Projects a variable unchanged.
    pub fn var(var: &Var) -> Self {
        Self {
            expr: var.expr(),
            alias: None,
        }
    }

    /// Projects `expr AS alias`.
    pub fn aliased(expr: Expr, alias: &Var) -> Self {
        Self {
            expr,
            alias: Some(alias.clone()),
        }
    }
}

/// Sort key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SortItem {
    /// Sort expression.
    pub expr: Expr,
    /// Descending order.
    pub descending: bool,
}

/// Body shared by `WITH` and `RETURN`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    /// `DISTINCT`.
    pub distinct: bool,
    /// Leading `*`.
    pub star: bool,
    /// Explicit items.
    pub items: Vec<ProjectionItem>,
    /// `ORDER BY`.
    pub order_by: Vec<SortItem>,
    /// `SKIP`.
    pub skip: Option<Expr>,
    /// `LIMIT`.
    pub limit: Option<Expr>,
}

impl Projection {
    /// `*`.
    pub fn star() -> Self {
        Self {
            star: true,
            ..Self::default()
        }
    }

    /// The given items.
    pub fn items(items: Vec<ProjectionItem>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    /// Plain variables.
    pub fn vars<'a>(vars: impl IntoIterator<Item = &'a Var>) -> Self {
        Self::items(vars.into_iter().map(ProjectionItem::var).collect())
    }

    /// Single `expr AS alias`.
    pub fn single(expr: Expr, alias: &Var) -> Self {
        Self::items(vec![ProjectionItem::aliased(expr, alias)])
    }
}

/// `CALL { ... }` subquery; multiple branches are joined with `UNION`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Subquery {
    /// Branches.
    pub branches: Vec<Block>,
}

/// A single clause.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Clause {
    /// `[OPTIONAL] MATCH pattern [WHERE predicate]`.
    Match {
        /// `OPTIONAL MATCH`.
        optional: bool,
        /// Pattern.
        pattern: Pattern,
        /// Predicate.
        #[serde(rename = "where")]
        where_: Option<Expr>,
    },
    /// `CREATE pattern`.
    Create {
        /// Pattern.
        pattern: Pattern,
    },
    /// `MERGE pattern`.
    Merge {
        /// Pattern.
        pattern: Pattern,
    },
    /// `SET ...`.
    Set(Vec<SetItem>),
    /// `[DETACH] DELETE ...`.
    Delete {
        /// `DETACH DELETE`.
        detach: bool,
        /// Deleted entities.
        targets: Vec<Expr>,
    },
    /// `WITH ... [WHERE ...]`.
    With {
        /// Projection body.
        projection: Projection,
        /// Predicate.
        #[serde(rename = "where")]
        where_: Option<Expr>,
    },
    /// `UNWIND expr AS alias`.
    Unwind {
        /// List expression.
        expr: Expr,
        /// Element variable.
        alias: Var,
    },
    /// `CALL { ... }`.
    Call(Subquery),
    /// `CALL apoc.util.validate(condition, message, args)`; fails the query
    /// when `condition` holds.
    Validate {
        /// Failure condition.
        condition: Expr,
        /// Failure message.
        message: String,
        /// Message format arguments.
        args: Vec<Expr>,
    },
    /// `RETURN ...`.
    Return(Projection),
    /// Verbatim Cypher, used for user-declared statements.
    Raw(String),
}

impl Clause {
    /// `WITH *`.
    pub fn with_star() -> Self {
        Clause::With {
            projection: Projection::star(),
            where_: None,
        }
    }

    /// `WITH a, b`.
    pub fn with_vars<'a>(vars: impl IntoIterator<Item = &'a Var>) -> Self {
        Clause::With {
            projection: Projection::vars(vars),
            where_: None,
        }
    }

    /// `WITH * WHERE predicate`.
    pub fn filter(predicate: Expr) -> Self {
        Clause::With {
            projection: Projection::star(),
            where_: Some(predicate),
        }
    }

    /// Fails the query with `message` unless `predicate` holds.
    pub fn assert_that(predicate: Expr, message: impl Into<String>) -> Self {
        Clause::Validate {
            condition: predicate.negate(),
            message: message.into(),
            args: vec![Expr::lit(0_i64)],
        }
    }

    /// `CALL { body }` with a single branch.
    pub fn call(body: Block) -> Self {
        Clause::Call(Subquery {
            branches: vec![body],
        })
    }

    /// Whether the clause writes to the graph.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Clause::Create { .. } | Clause::Merge { .. } | Clause::Set(_) | Clause::Delete { .. }
        )
    }

    fn needs_read_boundary(&self) -> bool {
        matches!(
            self,
            Clause::Match { .. }
                | Clause::Unwind { .. }
                | Clause::Call(_)
                | Clause::Validate { .. }
                | Clause::Raw(_)
        )
    }
}

/// Ordered clause sequence.
///
/// Pushing a reading clause directly after a writing one inserts `WITH *`,
/// which Cypher requires between the two.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Block(Vec<Clause>);

impl Block {
    /// Empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a clause.
    pub fn push(&mut self, clause: Clause) {
        let boundary = self.0.last().map_or(false, Clause::is_write) && clause.needs_read_boundary();
        if boundary {
            self.0.push(Clause::with_star());
        }
        self.0.push(clause);
    }

    /// Appends every clause of `other`.
    pub fn append(&mut self, other: Block) {
        for clause in other.0 {
            self.push(clause);
        }
    }

    /// Clauses in order.
    pub fn clauses(&self) -> &[Clause] {
        &self.0
    }

    /// Number of clauses.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the block holds no clauses.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Extend<Clause> for Block {
    fn extend<T: IntoIterator<Item = Clause>>(&mut self, iter: T) {
        for clause in iter {
            self.push(clause);
        }
    }
}

impl FromIterator<Clause> for Block {
    fn from_iter<T: IntoIterator<Item = Clause>>(iter: T) -> Self {
        let mut block = Block::new();
        block.extend(iter);
        block
    }
}
