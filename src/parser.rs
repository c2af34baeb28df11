use crate::{flatten, lexer::Token};
use anyhow::{bail, Result};
use std::fmt::{Display, Formatter, Result as FmtResult};

pub type Identifier = String;

pub type Block = Vec<Statement>;

pub type Program = Vec<Statement>;

#[derive(Debug, PartialEq, Clone)]
pub enum Statement {
    Let { name: Identifier, value: Expression },
    Return(Expression),
    Expression(Expression),
}

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Statement::Let { name, value } => write!(f, "let {} = {};", name, value),
            Statement::Return(value) => write!(f, "return {};", value),
            Statement::Expression(value) => write!(f, "{}", value),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    Identifier(Identifier),
    Integer(i64),
    Str(String),
    Boolean(bool),
    Prefix(Operator, Box<Expression>),
    Infix(Box<Expression>, Operator, Box<Expression>),
    If {
        condition: Box<Expression>,
        consequence: Block,
        alternative: Option<Block>,
    },
    Function {
        parameters: Vec<Identifier>,
        body: Block,
    },
    Call {
        function: Box<Expression>,
        arguments: Vec<Expression>,
    },
    Array(Vec<Expression>),
    Hash(Vec<(Expression, Expression)>),
    Index(Box<Expression>, Box<Expression>),
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Expression::Identifier(name) => write!(f, "{}", name),
            Expression::Integer(value) => write!(f, "{}", value),
            Expression::Str(value) => write!(f, "{}", value),
            Expression::Boolean(value) => write!(f, "{}", value),
            Expression::Prefix(operator, operand) => write!(f, "({}{})", operator, operand),
            Expression::Infix(left, operator, right) => {
                write!(f, "({} {} {})", left, operator, right)
            }
            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                write!(f, "if ({}) {{ {} }}", condition, flatten(consequence, " "))?;
                if let Some(alternative) = alternative {
                    write!(f, " else {{ {} }}", flatten(alternative, " "))?;
                }
                Ok(())
            }
            Expression::Function { parameters, body } => {
                write!(
                    f,
                    "fn({}) {{ {} }}",
                    parameters.join(", "),
                    flatten(body, " ")
                )
            }
            Expression::Call {
                function,
                arguments,
            } => write!(f, "{}({})", function, flatten(arguments, ", ")),
            Expression::Array(elements) => write!(f, "[{}]", flatten(elements, ", ")),
            Expression::Hash(pairs) => {
                let strs: Vec<String> = pairs
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key, value))
                    .collect();
                write!(f, "{{{}}}", strs.join(", "))
            }
            Expression::Index(left, index) => write!(f, "({}[{}])", left, index),
        }
    }
}

#[derive(Debug, PartialEq, Copy, Clone)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Not,
    Negate,
    LessThan,
    GreaterThan,
    Equal,
    NotEqual,
}

impl Operator {
    pub fn from_token(token: &Token, is_prefix: bool) -> Result<Self> {
        Ok(match token {
            Token::Plus => Self::Add,
            Token::Minus if is_prefix => Self::Negate,
            Token::Minus => Self::Subtract,
            Token::Asterisk => Self::Multiply,
            Token::Slash => Self::Divide,
            Token::Bang => Self::Not,
            Token::LessThan => Self::LessThan,
            Token::GreaterThan => Self::GreaterThan,
            Token::Equal => Self::Equal,
            Token::NotEqual => Self::NotEqual,
            token => bail!("unknown operator token {:?}", token),
        })
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let symbol = match self {
            Operator::Add => "+",
            Operator::Subtract | Operator::Negate => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::Not => "!",
            Operator::LessThan => "<",
            Operator::GreaterThan => ">",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
        };
        write!(f, "{}", symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Equals,
    LessGreater,
    Sum,
    Product,
    Prefix,
    Call,
    Index,
}

fn token_precedence(token: &Token) -> Precedence {
    match token {
        Token::Equal | Token::NotEqual => Precedence::Equals,
        Token::LessThan | Token::GreaterThan => Precedence::LessGreater,
        Token::Plus | Token::Minus => Precedence::Sum,
        Token::Slash | Token::Asterisk => Precedence::Product,
        Token::LeftParentheses => Precedence::Call,
        Token::LeftBracket => Precedence::Index,
        _ => Precedence::Lowest,
    }
}

pub struct Parser<'a> {
    tokens: &'a [Token],
    position: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    pub fn parse(&mut self) -> Result<Program> {
        let mut program = Vec::new();
        while self.position < self.tokens.len() {
            program.push(self.parse_statement()?);
        }
        Ok(program)
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::EndOfFile)
    }

    fn current_is(&self, token: &Token) -> bool {
        self.current() == token
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        if self.current() == &token {
            self.advance();
            Ok(())
        } else {
            bail!("expected {:?}, got {:?}", token, self.current());
        }
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        match self.current() {
            Token::Let => self.parse_let_statement(),
            Token::Return => self.parse_return_statement(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_let_statement(&mut self) -> Result<Statement> {
        self.advance();
        let name = match self.current().clone() {
            Token::Identifier(name) => name,
            token => bail!("expected identifier, got {:?}", token),
        };
        self.advance();
        self.expect(Token::Assign)?;
        let value = self.parse_expression(Precedence::Lowest)?;
        if self.current_is(&Token::Semicolon) {
            self.advance();
        }
        Ok(Statement::Let { name, value })
    }

    fn parse_return_statement(&mut self) -> Result<Statement> {
        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        if self.current_is(&Token::Semicolon) {
            self.advance();
        }
        Ok(Statement::Return(value))
    }

    fn parse_expression_statement(&mut self) -> Result<Statement> {
        let value = self.parse_expression(Precedence::Lowest)?;
        if self.current_is(&Token::Semicolon) {
            self.advance();
        }
        Ok(Statement::Expression(value))
    }

    fn parse_expression(&mut self, precedence: Precedence) -> Result<Expression> {
        let mut left = self.parse_prefix()?;
        while precedence < token_precedence(self.current()) {
            left = self.parse_infix(left)?;
        }
        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expression> {
        match self.current().clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(Expression::Identifier(name))
            }
            Token::Integer(value) => {
                self.advance();
                Ok(Expression::Integer(value))
            }
            Token::Str(value) => {
                self.advance();
                Ok(Expression::Str(value))
            }
            Token::True => {
                self.advance();
                Ok(Expression::Boolean(true))
            }
            Token::False => {
                self.advance();
                Ok(Expression::Boolean(false))
            }
            token @ (Token::Bang | Token::Minus) => {
                let operator = Operator::from_token(&token, true)?;
                self.advance();
                let operand = self.parse_expression(Precedence::Prefix)?;
                Ok(Expression::Prefix(operator, Box::new(operand)))
            }
            Token::LeftParentheses => {
                self.advance();
                let expression = self.parse_expression(Precedence::Lowest)?;
                self.expect(Token::RightParentheses)?;
                Ok(expression)
            }
            Token::If => self.parse_if_expression(),
            Token::Function => self.parse_function_literal(),
            Token::LeftBracket => {
                self.advance();
                let elements = self.parse_expression_list(Token::RightBracket)?;
                Ok(Expression::Array(elements))
            }
            Token::LeftBrace => self.parse_hash_literal(),
            token => bail!("no prefix parse function for {:?}", token),
        }
    }

    fn parse_infix(&mut self, left: Expression) -> Result<Expression> {
        match self.current() {
            Token::LeftParentheses => {
                self.advance();
                let arguments = self.parse_expression_list(Token::RightParentheses)?;
                Ok(Expression::Call {
                    function: Box::new(left),
                    arguments,
                })
            }
            Token::LeftBracket => {
                self.advance();
                let index = self.parse_expression(Precedence::Lowest)?;
                self.expect(Token::RightBracket)?;
                Ok(Expression::Index(Box::new(left), Box::new(index)))
            }
            token => {
                let operator = Operator::from_token(token, false)?;
                let precedence = token_precedence(token);
                self.advance();
                let right = self.parse_expression(precedence)?;
                Ok(Expression::Infix(Box::new(left), operator, Box::new(right)))
            }
        }
    }

    fn parse_if_expression(&mut self) -> Result<Expression> {
        self.advance();
        self.expect(Token::LeftParentheses)?;
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.expect(Token::RightParentheses)?;
        let consequence = self.parse_block()?;
        let alternative = if self.current_is(&Token::Else) {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(Expression::If {
            condition: Box::new(condition),
            consequence,
            alternative,
        })
    }

    fn parse_function_literal(&mut self) -> Result<Expression> {
        self.advance();
        self.expect(Token::LeftParentheses)?;
        let mut parameters = Vec::new();
        while !self.current_is(&Token::RightParentheses) {
            match self.current().clone() {
                Token::Identifier(name) => {
                    parameters.push(name);
                    self.advance();
                    if self.current_is(&Token::Comma) {
                        self.advance();
                    }
                }
                token => bail!("expected parameter name, got {:?}", token),
            }
        }
        self.advance();
        let body = self.parse_block()?;
        Ok(Expression::Function { parameters, body })
    }

    fn parse_block(&mut self) -> Result<Block> {
        self.expect(Token::LeftBrace)?;
        let mut statements = Vec::new();
        while !self.current_is(&Token::RightBrace) {
            if self.position >= self.tokens.len() {
                bail!("unterminated block, expected RightBrace");
            }
            statements.push(self.parse_statement()?);
        }
        self.advance();
        Ok(statements)
    }

    fn parse_expression_list(&mut self, end: Token) -> Result<Vec<Expression>> {
        let mut expressions = Vec::new();
        if self.current_is(&end) {
            self.advance();
            return Ok(expressions);
        }
        expressions.push(self.parse_expression(Precedence::Lowest)?);
        while self.current_is(&Token::Comma) {
            self.advance();
            expressions.push(self.parse_expression(Precedence::Lowest)?);
        }
        self.expect(end)?;
        Ok(expressions)
    }

    fn parse_hash_literal(&mut self) -> Result<Expression> {
        self.advance();
        let mut pairs = Vec::new();
        while !self.current_is(&Token::RightBrace) {
            let key = self.parse_expression(Precedence::Lowest)?;
            self.expect(Token::Colon)?;
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));
            if !self.current_is(&Token::RightBrace) {
                self.expect(Token::Comma)?;
            }
        }
        self.advance();
        Ok(Expression::Hash(pairs))
    }
}
