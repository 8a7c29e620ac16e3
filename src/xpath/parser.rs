//! XPath Parser
//!
//! Recursive descent parser for XPath 1.0 expressions, one method per
//! grammar production. Predicates stay attached to their location steps
//! so the evaluator can count positions per context node.

use crate::error::{Error, Position, Result};

use super::lexer::{Lexer, Token};

/// XPath expression AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Literal(String),
    Variable(String),
    FunctionCall(String, Vec<Expr>),
    /// Unary minus.
    Negate(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Union(Box<Expr>, Box<Expr>),
    Path(LocationPath),
    /// A primary expression filtered by predicates, optionally continued
    /// by a relative location path.
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
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
    Mod,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationPath {
    pub absolute: bool,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

impl Step {
    fn new(axis: Axis, test: NodeTest) -> Step {
        Step {
            axis,
            test,
            predicates: Vec::new(),
        }
    }

    /// The `//` abbreviation: descendant-or-self::node().
    fn descendant_or_self() -> Step {
        Step::new(Axis::DescendantOrSelf, NodeTest::Node)
    }
}

/// The thirteen XPath axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
    SelfAxis,
    Attribute,
    Namespace,
}

impl Axis {
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "child" => Some(Axis::Child),
            "descendant" => Some(Axis::Descendant),
            "descendant-or-self" => Some(Axis::DescendantOrSelf),
            "parent" => Some(Axis::Parent),
            "ancestor" => Some(Axis::Ancestor),
            "ancestor-or-self" => Some(Axis::AncestorOrSelf),
            "following-sibling" => Some(Axis::FollowingSibling),
            "preceding-sibling" => Some(Axis::PrecedingSibling),
            "following" => Some(Axis::Following),
            "preceding" => Some(Axis::Preceding),
            "self" => Some(Axis::SelfAxis),
            "attribute" => Some(Axis::Attribute),
            "namespace" => Some(Axis::Namespace),
            _ => None,
        }
    }

    /// Reverse axes present candidates in reverse document order, so
    /// position() counts from the context node outward.
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Ancestor | Axis::AncestorOrSelf | Axis::Preceding | Axis::PrecedingSibling
        )
    }

    /// The node kind an unadorned `*` matches on this axis.
    pub fn principal_is_attribute(self) -> bool {
        matches!(self, Axis::Attribute | Axis::Namespace)
    }
}

/// Node test in a location step.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    /// Name test; `local: None` is a wildcard (`*` or `prefix:*`).
    Name {
        prefix: Option<String>,
        local: Option<String>,
    },
    Node,
    Text,
    Comment,
    Pi(Option<String>),
}

impl NodeTest {
    pub const ANY: NodeTest = NodeTest::Name {
        prefix: None,
        local: None,
    };
}

/// Parse an XPath expression source into its AST.
pub fn parse(input: &str) -> Result<Expr> {
    let mut parser = Parser::new(input)?;
    let expr = parser.parse_expr()?;
    parser.expect_eof()?;
    Ok(expr)
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    offset: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Result<Self> {
        let mut lexer = Lexer::new(input);
        let (current, offset) = lexer.next_token()?;
        Ok(Parser {
            lexer,
            current,
            offset,
        })
    }

    fn advance(&mut self) -> Result<()> {
        let (token, offset) = self.lexer.next_token()?;
        self.current = token;
        self.offset = offset;
        Ok(())
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::parse(
            Position::new(1, self.offset as u32 + 1, self.offset),
            message,
        )
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        if self.current == token {
            self.advance()
        } else {
            Err(self.error(format!(
                "expected {:?}, found {:?}",
                token, self.current
            )))
        }
    }

    fn expect_eof(&self) -> Result<()> {
        if self.current == Token::Eof {
            Ok(())
        } else {
            Err(self.error(format!("unexpected trailing {:?}", self.current)))
        }
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.current == Token::Or {
            self.advance()?;
            let right = self.parse_and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_equality()?;
        while self.current == Token::And {
            self.advance()?;
            let right = self.parse_equality()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.current {
                Token::Eq => BinaryOp::Eq,
                Token::NotEq => BinaryOp::NotEq,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_relational()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.current {
                Token::Lt => BinaryOp::Lt,
                Token::LtEq => BinaryOp::LtEq,
                Token::Gt => BinaryOp::Gt,
                Token::GtEq => BinaryOp::GtEq,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current {
                Token::Multiply => BinaryOp::Mul,
                Token::Div => BinaryOp::Div,
                Token::Mod => BinaryOp::Mod,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.current == Token::Minus {
            self.advance()?;
            let operand = self.parse_unary()?;
            Ok(Expr::Negate(Box::new(operand)))
        } else {
            self.parse_union()
        }
    }

    fn parse_union(&mut self) -> Result<Expr> {
        let mut left = self.parse_path()?;
        while self.current == Token::Pipe {
            self.advance()?;
            let right = self.parse_path()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.current,
            Token::Dot
                | Token::DoubleDot
                | Token::At
                | Token::Star
                | Token::Name(_)
                | Token::NodeType(_)
                | Token::Axis(_)
        )
    }

    fn parse_path(&mut self) -> Result<Expr> {
        match self.current {
            Token::Slash => {
                self.advance()?;
                let mut steps = Vec::new();
                if self.starts_step() {
                    self.parse_relative_path(&mut steps)?;
                }
                Ok(Expr::Path(LocationPath {
                    absolute: true,
                    steps,
                }))
            }
            Token::DoubleSlash => {
                self.advance()?;
                let mut steps = vec![Step::descendant_or_self()];
                self.parse_relative_path(&mut steps)?;
                Ok(Expr::Path(LocationPath {
                    absolute: true,
                    steps,
                }))
            }
            _ if self.starts_step() => {
                let mut steps = Vec::new();
                self.parse_relative_path(&mut steps)?;
                Ok(Expr::Path(LocationPath {
                    absolute: false,
                    steps,
                }))
            }
            _ => self.parse_filter(),
        }
    }

    fn parse_relative_path(&mut self, steps: &mut Vec<Step>) -> Result<()> {
        steps.push(self.parse_step()?);
        loop {
            match self.current {
                Token::Slash => {
                    self.advance()?;
                    steps.push(self.parse_step()?);
                }
                Token::DoubleSlash => {
                    self.advance()?;
                    steps.push(Step::descendant_or_self());
                    steps.push(self.parse_step()?);
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_step(&mut self) -> Result<Step> {
        // Abbreviated steps take no node test or predicates.
        match self.current {
            Token::Dot => {
                self.advance()?;
                return Ok(Step::new(Axis::SelfAxis, NodeTest::Node));
            }
            Token::DoubleDot => {
                self.advance()?;
                return Ok(Step::new(Axis::Parent, NodeTest::Node));
            }
            _ => {}
        }

        let axis = match &self.current {
            Token::At => {
                self.advance()?;
                Axis::Attribute
            }
            Token::Axis(name) => {
                let axis = Axis::from_name(name)
                    .ok_or_else(|| self.error(format!("unknown axis {:?}", name)))?;
                self.advance()?;
                self.expect(Token::DoubleColon)?;
                axis
            }
            _ => Axis::Child,
        };

        let test = self.parse_node_test()?;
        let mut step = Step::new(axis, test);
        while self.current == Token::LBracket {
            self.advance()?;
            step.predicates.push(self.parse_expr()?);
            self.expect(Token::RBracket)?;
        }
        Ok(step)
    }

    fn parse_node_test(&mut self) -> Result<NodeTest> {
        match self.current.clone() {
            Token::Star => {
                self.advance()?;
                Ok(NodeTest::ANY)
            }
            Token::Name(name) => {
                self.advance()?;
                match name.split_once(':') {
                    Some((prefix, "*")) => Ok(NodeTest::Name {
                        prefix: Some(prefix.to_string()),
                        local: None,
                    }),
                    Some((prefix, local)) => Ok(NodeTest::Name {
                        prefix: Some(prefix.to_string()),
                        local: Some(local.to_string()),
                    }),
                    None => Ok(NodeTest::Name {
                        prefix: None,
                        local: Some(name),
                    }),
                }
            }
            Token::NodeType(name) => {
                self.advance()?;
                self.expect(Token::LParen)?;
                let arg = if let Token::Literal(s) = &self.current {
                    let s = s.clone();
                    self.advance()?;
                    Some(s)
                } else {
                    None
                };
                self.expect(Token::RParen)?;
                match name.as_str() {
                    "processing-instruction" => Ok(NodeTest::Pi(arg)),
                    _ if arg.is_some() => {
                        Err(self.error("only processing-instruction() takes a literal"))
                    }
                    "node" => Ok(NodeTest::Node),
                    "text" => Ok(NodeTest::Text),
                    "comment" => Ok(NodeTest::Comment),
                    other => Err(self.error(format!("unknown node type {:?}", other))),
                }
            }
            other => Err(self.error(format!("expected a node test, found {:?}", other))),
        }
    }

    fn parse_filter(&mut self) -> Result<Expr> {
        let primary = self.parse_primary()?;
        let mut predicates = Vec::new();
        while self.current == Token::LBracket {
            self.advance()?;
            predicates.push(self.parse_expr()?);
            self.expect(Token::RBracket)?;
        }
        let mut steps = Vec::new();
        loop {
            match self.current {
                Token::Slash => {
                    self.advance()?;
                    steps.push(self.parse_step()?);
                }
                Token::DoubleSlash => {
                    self.advance()?;
                    steps.push(Step::descendant_or_self());
                    steps.push(self.parse_step()?);
                }
                _ => break,
            }
        }
        if predicates.is_empty() && steps.is_empty() {
            Ok(primary)
        } else {
            Ok(Expr::Filter {
                primary: Box::new(primary),
                predicates,
                steps,
            })
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.current.clone() {
            Token::Number(n) => {
                self.advance()?;
                Ok(Expr::Number(n))
            }
            Token::Literal(s) => {
                self.advance()?;
                Ok(Expr::Literal(s))
            }
            Token::Dollar => {
                self.advance()?;
                if let Token::Name(name) = self.current.clone() {
                    self.advance()?;
                    Ok(Expr::Variable(name))
                } else {
                    Err(self.error("expected a variable name after $"))
                }
            }
            Token::LParen => {
                self.advance()?;
                let expr = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::FunctionName(name) => {
                self.advance()?;
                self.expect(Token::LParen)?;
                let mut args = Vec::new();
                if self.current != Token::RParen {
                    args.push(self.parse_expr()?);
                    while self.current == Token::Comma {
                        self.advance()?;
                        args.push(self.parse_expr()?);
                    }
                }
                self.expect(Token::RParen)?;
                Ok(Expr::FunctionCall(name, args))
            }
            other => Err(self.error(format!("unexpected {:?}", other))),
        }
    }
}
