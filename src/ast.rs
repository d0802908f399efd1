//! AST types produced by the parser (C4) and consumed by the kernel
//! synthesizer (C5). Grounded on the shape of the teacher's `expr.rs`
//! (`TableExpression`, `SelectExpression`) but trimmed to the grammar spec
//! section 4.4 actually accepts — no procedures, loops, or user functions.

use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Column(String),
    /// `COUNT(*)` is the only recognized function call (spec section 4.4).
    CountStar,
    Not(Box<Expr>),
    BinOp(BinOp, Box<Expr>, Box<Expr>),
    Star,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::NotEq | BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderKey {
    pub expr: Expr,
    pub dir: SortDir,
}

/// A selected item: either `*`, `COUNT(*)`, or a single column reference,
/// optionally aliased (spec section 4.4 only recognizes these as a select
/// list item; general expressions in the select list are not accepted).
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Star,
    CountStar,
    Column(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStmt {
    pub select_list: Vec<SelectItem>,
    pub from_table: String,
    pub r#where: Option<Expr>,
    pub order_by: Vec<OrderKey>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStmt {
    pub table: String,
    /// `None` means all columns, in schema order (spec section 4.4).
    pub columns: Option<Vec<String>>,
    pub values: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStmt {
    pub table: String,
    pub assignments: Vec<(String, Expr)>,
    pub r#where: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStmt {
    pub table: String,
    pub r#where: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub type_name: String,
    pub length: Option<u16>,
    pub nullable: bool,
    pub primary_key: bool,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStmt {
    pub table: String,
    pub columns: Vec<ColumnSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndexStmt {
    pub index_name: String,
    pub table: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Select(SelectStmt),
    Insert(InsertStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
    CreateTable(CreateTableStmt),
    CreateIndex(CreateIndexStmt),
}
