//! The SLQ abstract syntax tree.
//!
//! Nodes are tagged variants with owned children; there are no parent links.
//! The tree is rooted at [`Ast`], whose children are the pipeline's
//! [`Node::Segment`]s in order. Traversal for analysis goes through
//! [`crate::slq::Inspector`].

/// Open-ended limit sentinel for `[n:]` row ranges.
pub const LIMIT_UNBOUNDED: i64 = -1;

/// A parsed SLQ query: a pipeline of segments.
#[derive(Debug, Clone, PartialEq)]
pub struct Ast {
    /// Always `Node::Segment` variants, in pipeline order.
    pub segments: Vec<Node>,
}

/// One AST node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A pipeline step: a comma-separated list of elements.
    Segment(Vec<Node>),
    /// `@handle`.
    Handle(String),
    /// `.name` or `.name.name`; whether a part names a table or a column is
    /// decided by the planner from its position in the pipeline.
    Selector(Vec<String>),
    /// `[offset:limit]`. `limit` is [`LIMIT_UNBOUNDED`] for open ranges.
    RowRange { offset: u64, limit: i64 },
    /// `.count` and friends.
    Func(Func),
    /// `selector op literal`, lowered to a WHERE condition.
    Expr {
        lhs: Box<Node>,
        op: CmpOp,
        rhs: Box<Node>,
    },
    /// A literal scalar, only reachable as the right side of an expression.
    Literal(Literal),
}

/// Tags for inspector queries; one per [`Node`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeTag {
    Segment,
    Handle,
    Selector,
    RowRange,
    Func,
    Expr,
    Literal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl Func {
    pub fn from_name(name: &str) -> Option<Func> {
        match name {
            "count" => Some(Func::Count),
            "sum" => Some(Func::Sum),
            "avg" => Some(Func::Avg),
            "min" => Some(Func::Min),
            "max" => Some(Func::Max),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Func::Count => "count",
            Func::Sum => "sum",
            Func::Avg => "avg",
            Func::Min => "min",
            Func::Max => "max",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    /// The operator's SQL spelling.
    pub fn sql(&self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Node {
    pub fn tag(&self) -> NodeTag {
        match self {
            Node::Segment(_) => NodeTag::Segment,
            Node::Handle(_) => NodeTag::Handle,
            Node::Selector(_) => NodeTag::Selector,
            Node::RowRange { .. } => NodeTag::RowRange,
            Node::Func(_) => NodeTag::Func,
            Node::Expr { .. } => NodeTag::Expr,
            Node::Literal(_) => NodeTag::Literal,
        }
    }

    /// Child nodes, in source order. Leaves return empty.
    pub fn children(&self) -> Vec<&Node> {
        match self {
            Node::Segment(elems) => elems.iter().collect(),
            Node::Expr { lhs, rhs, .. } => vec![lhs, rhs],
            _ => Vec::new(),
        }
    }
}
