//! Recursive-descent parser (C4), built over `lexer::Lexer`. Follows the
//! teacher's naming convention in `parse.rs` (`s_` prefix for statement
//! parsers, `exp_`-style descent for expressions) while implementing the
//! grammar in spec section 4.4 rather than the teacher's full procedural
//! SQL dialect.

use crate::ast::*;
use crate::error::{Error, Result, SourcePos};
use crate::lexer::{Lexer, Token};
use crate::value::Value;

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    tok: Token,
    pos: SourcePos,
}

impl<'a> Parser<'a> {
    pub fn new(src: &'a str) -> Result<Self> {
        let mut lexer = Lexer::new(src);
        let spanned = lexer.next_token()?;
        Ok(Parser { lexer, tok: spanned.token, pos: spanned.pos })
    }

    pub fn parse_statement(src: &str) -> Result<Stmt> {
        let mut p = Parser::new(src)?;
        let stmt = p.statement()?;
        p.expect_opt_semicolon()?;
        p.expect_eof()?;
        Ok(stmt)
    }

    /// Parse a standalone expression, e.g. a `DEFAULT` literal's text.
    pub fn parse_expr(src: &str) -> Result<Expr> {
        let mut p = Parser::new(src)?;
        let e = p.expr()?;
        p.expect_eof()?;
        Ok(e)
    }

    fn bump(&mut self) -> Result<Token> {
        let t = std::mem::replace(&mut self.tok, Token::Eof);
        let spanned = self.lexer.next_token()?;
        self.tok = spanned.token;
        self.pos = spanned.pos;
        Ok(t)
    }

    fn err(&self, msg: impl Into<String>) -> Error {
        Error::Parse { pos: self.pos, msg: msg.into() }
    }

    fn expect(&mut self, want: &Token) -> Result<()> {
        if &self.tok == want {
            self.bump()?;
            Ok(())
        } else {
            Err(self.err(format!("expected {:?}, found {:?}", want, self.tok)))
        }
    }

    fn expect_opt_semicolon(&mut self) -> Result<()> {
        if self.tok == Token::Semicolon {
            self.bump()?;
        }
        Ok(())
    }

    fn expect_eof(&self) -> Result<()> {
        if self.tok == Token::Eof {
            Ok(())
        } else {
            Err(self.err(format!("unexpected trailing token {:?}", self.tok)))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.bump()? {
            Token::Ident(s) => Ok(s),
            other => Err(self.err(format!("expected identifier, found {other:?}"))),
        }
    }

    fn statement(&mut self) -> Result<Stmt> {
        match &self.tok {
            Token::Select => Ok(Stmt::Select(self.select()?)),
            Token::Insert => Ok(Stmt::Insert(self.insert()?)),
            Token::Update => Ok(Stmt::Update(self.update()?)),
            Token::Delete => Ok(Stmt::Delete(self.delete()?)),
            Token::Create => self.create(),
            other => Err(self.err(format!(
                "expected SELECT, INSERT, UPDATE, DELETE or CREATE, found {other:?}"
            ))),
        }
    }

    // ---- SELECT ----

    fn select(&mut self) -> Result<SelectStmt> {
        self.expect(&Token::Select)?;
        let select_list = self.select_list()?;
        self.expect(&Token::From)?;
        let from_table = self.expect_ident()?;
        let r#where = if self.tok == Token::Where {
            self.bump()?;
            Some(self.expr()?)
        } else {
            None
        };
        let order_by = if self.tok == Token::Order {
            self.bump()?;
            self.expect(&Token::By)?;
            self.order_list()?
        } else {
            Vec::new()
        };
        let limit = if self.tok == Token::Limit {
            self.bump()?;
            Some(self.expect_integer()? as usize)
        } else {
            None
        };
        Ok(SelectStmt { select_list, from_table, r#where, order_by, limit })
    }

    fn select_list(&mut self) -> Result<Vec<SelectItem>> {
        if self.tok == Token::Star {
            self.bump()?;
            return Ok(vec![SelectItem::Star]);
        }
        let mut items = vec![self.select_item()?];
        while self.tok == Token::Comma {
            self.bump()?;
            items.push(self.select_item()?);
        }
        Ok(items)
    }

    fn select_item(&mut self) -> Result<SelectItem> {
        if let Token::Ident(name) = self.tok.clone() {
            if name.eq_ignore_ascii_case("count") {
                self.bump()?;
                self.expect(&Token::LParen)?;
                self.expect(&Token::Star)?;
                self.expect(&Token::RParen)?;
                return Ok(SelectItem::CountStar);
            }
            self.bump()?;
            return Ok(SelectItem::Column(name));
        }
        Err(self.err(format!("expected column name or COUNT(*), found {:?}", self.tok)))
    }

    fn order_list(&mut self) -> Result<Vec<OrderKey>> {
        let mut keys = vec![self.order_key()?];
        while self.tok == Token::Comma {
            self.bump()?;
            keys.push(self.order_key()?);
        }
        Ok(keys)
    }

    fn order_key(&mut self) -> Result<OrderKey> {
        let expr = self.expr()?;
        let dir = match self.tok {
            Token::Asc => {
                self.bump()?;
                SortDir::Asc
            }
            Token::Desc => {
                self.bump()?;
                SortDir::Desc
            }
            _ => SortDir::Asc,
        };
        Ok(OrderKey { expr, dir })
    }

    // ---- INSERT ----

    fn insert(&mut self) -> Result<InsertStmt> {
        self.expect(&Token::Insert)?;
        self.expect(&Token::Into)?;
        let table = self.expect_ident()?;
        let columns = if self.tok == Token::LParen {
            self.bump()?;
            let mut cols = vec![self.expect_ident()?];
            while self.tok == Token::Comma {
                self.bump()?;
                cols.push(self.expect_ident()?);
            }
            self.expect(&Token::RParen)?;
            Some(cols)
        } else {
            None
        };
        self.expect(&Token::Values)?;
        self.expect(&Token::LParen)?;
        let mut values = vec![self.expr()?];
        while self.tok == Token::Comma {
            self.bump()?;
            values.push(self.expr()?);
        }
        self.expect(&Token::RParen)?;
        if let Some(cols) = &columns {
            if cols.len() != values.len() {
                return Err(self.err("column list and VALUES list length mismatch"));
            }
        }
        Ok(InsertStmt { table, columns, values })
    }

    // ---- UPDATE ----

    fn update(&mut self) -> Result<UpdateStmt> {
        self.expect(&Token::Update)?;
        let table = self.expect_ident()?;
        self.expect(&Token::Set)?;
        let mut assignments = vec![self.assignment()?];
        while self.tok == Token::Comma {
            self.bump()?;
            assignments.push(self.assignment()?);
        }
        let r#where = if self.tok == Token::Where {
            self.bump()?;
            Some(self.expr()?)
        } else {
            None
        };
        Ok(UpdateStmt { table, assignments, r#where })
    }

    fn assignment(&mut self) -> Result<(String, Expr)> {
        let col = self.expect_ident()?;
        self.expect(&Token::Eq)?;
        let val = self.expr()?;
        Ok((col, val))
    }

    // ---- DELETE ----

    fn delete(&mut self) -> Result<DeleteStmt> {
        self.expect(&Token::Delete)?;
        self.expect(&Token::From)?;
        let table = self.expect_ident()?;
        let r#where = if self.tok == Token::Where {
            self.bump()?;
            Some(self.expr()?)
        } else {
            None
        };
        Ok(DeleteStmt { table, r#where })
    }

    // ---- CREATE ----

    fn create(&mut self) -> Result<Stmt> {
        self.expect(&Token::Create)?;
        match self.tok {
            Token::Table => Ok(Stmt::CreateTable(self.create_table()?)),
            Token::Index => Ok(Stmt::CreateIndex(self.create_index()?)),
            _ => Err(self.err("expected TABLE or INDEX after CREATE")),
        }
    }

    fn create_table(&mut self) -> Result<CreateTableStmt> {
        self.expect(&Token::Table)?;
        let table = self.expect_ident()?;
        self.expect(&Token::LParen)?;
        let mut columns = vec![self.column_spec()?];
        while self.tok == Token::Comma {
            self.bump()?;
            columns.push(self.column_spec()?);
        }
        self.expect(&Token::RParen)?;
        Ok(CreateTableStmt { table, columns })
    }

    fn column_spec(&mut self) -> Result<ColumnSpec> {
        let name = self.expect_ident()?;
        let type_name = self.expect_ident()?;
        let length = if self.tok == Token::LParen {
            self.bump()?;
            let n = self.expect_integer()?;
            self.expect(&Token::RParen)?;
            Some(n as u16)
        } else {
            None
        };
        let mut nullable = true;
        let mut primary_key = false;
        let mut default = None;
        loop {
            match &self.tok {
                Token::Not => {
                    self.bump()?;
                    self.expect(&Token::Null)?;
                    nullable = false;
                }
                Token::Null => {
                    self.bump()?;
                    nullable = true;
                }
                Token::Primary => {
                    self.bump()?;
                    self.expect(&Token::Key)?;
                    primary_key = true;
                    nullable = false;
                }
                Token::Default => {
                    self.bump()?;
                    default = Some(self.literal_expr()?);
                }
                _ => break,
            }
        }
        Ok(ColumnSpec { name, type_name, length, nullable, primary_key, default })
    }

    fn create_index(&mut self) -> Result<CreateIndexStmt> {
        self.expect(&Token::Index)?;
        let index_name = self.expect_ident()?;
        self.expect(&Token::On)?;
        let table = self.expect_ident()?;
        self.expect(&Token::LParen)?;
        let mut columns = vec![self.expect_ident()?];
        while self.tok == Token::Comma {
            self.bump()?;
            columns.push(self.expect_ident()?);
        }
        self.expect(&Token::RParen)?;
        Ok(CreateIndexStmt { index_name, table, columns })
    }

    // ---- expressions ----
    // Precedence, low to high: OR < AND < NOT < comparison < additive <
    // multiplicative (spec section 4.4).

    fn expr(&mut self) -> Result<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;
        while self.tok == Token::Or {
            self.bump()?;
            let right = self.and_expr()?;
            left = Expr::BinOp(BinOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.not_expr()?;
        while self.tok == Token::And {
            self.bump()?;
            let right = self.not_expr()?;
            left = Expr::BinOp(BinOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.tok == Token::Not {
            self.bump()?;
            Ok(Expr::Not(Box::new(self.cmp_expr()?)))
        } else {
            self.cmp_expr()
        }
    }

    fn cmp_expr(&mut self) -> Result<Expr> {
        let left = self.add_expr()?;
        let op = match self.tok {
            Token::Eq => BinOp::Eq,
            Token::NotEq => BinOp::NotEq,
            Token::Lt => BinOp::Lt,
            Token::LtEq => BinOp::LtEq,
            Token::Gt => BinOp::Gt,
            Token::GtEq => BinOp::GtEq,
            _ => return Ok(left),
        };
        self.bump()?;
        let right = self.add_expr()?;
        Ok(Expr::BinOp(op, Box::new(left), Box::new(right)))
    }

    fn add_expr(&mut self) -> Result<Expr> {
        let mut left = self.mul_expr()?;
        loop {
            let op = match self.tok {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.bump()?;
            let right = self.mul_expr()?;
            left = Expr::BinOp(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn mul_expr(&mut self) -> Result<Expr> {
        let mut left = self.atom()?;
        loop {
            let op = match self.tok {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                _ => break,
            };
            self.bump()?;
            let right = self.atom()?;
            left = Expr::BinOp(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn atom(&mut self) -> Result<Expr> {
        match self.tok.clone() {
            Token::LParen => {
                self.bump()?;
                let e = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(e)
            }
            Token::Star => {
                self.bump()?;
                Ok(Expr::Star)
            }
            Token::Minus => {
                self.bump()?;
                match self.literal_expr()? {
                    Expr::Literal(Value::Int32(n)) => Ok(Expr::Literal(Value::Int32(-n))),
                    Expr::Literal(Value::Float64(n)) => Ok(Expr::Literal(Value::Float64(-n))),
                    _ => Err(self.err("unary '-' requires a numeric literal")),
                }
            }
            Token::Ident(name) => {
                self.bump()?;
                if name.eq_ignore_ascii_case("count") && self.tok == Token::LParen {
                    self.bump()?;
                    self.expect(&Token::Star)?;
                    self.expect(&Token::RParen)?;
                    return Ok(Expr::CountStar);
                }
                if self.tok == Token::LParen {
                    return Err(self.err(format!("unknown function '{name}'")));
                }
                Ok(Expr::Column(name))
            }
            Token::Integer(_) | Token::Number(_) | Token::String(_) | Token::True
            | Token::False | Token::Null => self.literal_expr(),
            other => Err(self.err(format!("unexpected token in expression: {other:?}"))),
        }
    }

    fn literal_expr(&mut self) -> Result<Expr> {
        let v = match self.bump()? {
            Token::Integer(n) => Value::Int32(n as i32),
            Token::Number(n) => Value::Float64(n),
            Token::String(s) => Value::Str(s),
            Token::True => Value::Bool(true),
            Token::False => Value::Bool(false),
            Token::Null => Value::Null,
            other => return Err(self.err(format!("expected literal, found {other:?}"))),
        };
        Ok(Expr::Literal(v))
    }

    fn expect_integer(&mut self) -> Result<i64> {
        match self.bump()? {
            Token::Integer(n) => Ok(n),
            other => Err(self.err(format!("expected integer, found {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_b_select_ast() {
        let stmt = Parser::parse_statement("SELECT name, age FROM users WHERE age > 21").unwrap();
        match stmt {
            Stmt::Select(s) => {
                assert_eq!(s.from_table, "users");
                assert_eq!(
                    s.select_list,
                    vec![SelectItem::Column("name".into()), SelectItem::Column("age".into())]
                );
                assert_eq!(
                    s.r#where,
                    Some(Expr::BinOp(
                        BinOp::Gt,
                        Box::new(Expr::Column("age".into())),
                        Box::new(Expr::Literal(Value::Int32(21)))
                    ))
                );
            }
            _ => panic!("expected SELECT"),
        }
    }

    #[test]
    fn count_star_select() {
        let stmt =
            Parser::parse_statement("SELECT COUNT(*) FROM users WHERE age >= 21").unwrap();
        match stmt {
            Stmt::Select(s) => assert_eq!(s.select_list, vec![SelectItem::CountStar]),
            _ => panic!("expected SELECT"),
        }
    }

    #[test]
    fn unknown_function_is_rejected() {
        let err = Parser::parse_statement("SELECT UPPER(name) FROM users").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn update_without_where_parses_as_whole_table() {
        let stmt = Parser::parse_statement("UPDATE t SET x = 1").unwrap();
        match stmt {
            Stmt::Update(u) => assert_eq!(u.r#where, None),
            _ => panic!("expected UPDATE"),
        }
    }

    #[test]
    fn delete_without_where_parses_as_whole_table() {
        let stmt = Parser::parse_statement("DELETE FROM t").unwrap();
        match stmt {
            Stmt::Delete(d) => assert_eq!(d.r#where, None),
            _ => panic!("expected DELETE"),
        }
    }

    #[test]
    fn insert_with_explicit_columns() {
        let stmt =
            Parser::parse_statement("INSERT INTO t (a, b) VALUES (1, 'x')").unwrap();
        match stmt {
            Stmt::Insert(i) => {
                assert_eq!(i.columns, Some(vec!["a".into(), "b".into()]));
                assert_eq!(i.values.len(), 2);
            }
            _ => panic!("expected INSERT"),
        }
    }

    #[test]
    fn create_table_parses_constraints() {
        let stmt = Parser::parse_statement(
            "CREATE TABLE t (uuid VARCHAR(36), id INT PRIMARY KEY, name VARCHAR(10) DEFAULT 'x')",
        )
        .unwrap();
        match stmt {
            Stmt::CreateTable(ct) => {
                assert_eq!(ct.columns[1].primary_key, true);
                assert_eq!(ct.columns[2].default, Some(Expr::Literal(Value::Str("x".into()))));
            }
            _ => panic!("expected CREATE TABLE"),
        }
    }
}
