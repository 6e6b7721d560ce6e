// Parser for the Java expression subset used by conditions and `evaluate`

use crate::error::{DebuggerError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(u16),
    Str(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    UShr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Name(String),
    This,
    Field(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    /// Parsed so the error can name the method; never evaluated
    Call(Option<Box<Expr>>, String, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// "a.b.c" for a chain of plain names
    pub fn qualified_name(&self) -> Option<String> {
        match self {
            Expr::Name(name) => Some(name.clone()),
            Expr::Field(base, name) => base.qualified_name().map(|q| format!("{}.{}", q, name)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64, bool),
    Float(f64, bool),
    Char(u16),
    Str(String),
    Ident(String),
    Punct(&'static str),
    Eof,
}

// Longest first so "<<" wins over "<"
const PUNCTUATION: &[&str] = &[
    ">>>", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "+", "-", "*", "/", "%", "<", ">", "!",
    "~", "&", "^", "|", "?", ":", "(", ")", "[", "]", ".", ",",
];

fn syntax(message: impl Into<String>) -> DebuggerError {
    DebuggerError::invalid_expression(message)
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            let (token, next) = number(&chars, i)?;
            tokens.push(token);
            i = next;
            continue;
        }
        if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }
        if c == '"' {
            let (text, next) = quoted(&chars, i + 1, '"')?;
            tokens.push(Token::Str(text));
            i = next;
            continue;
        }
        if c == '\'' {
            let (text, next) = quoted(&chars, i + 1, '\'')?;
            let mut units = text.encode_utf16();
            match (units.next(), units.next()) {
                (Some(unit), None) => tokens.push(Token::Char(unit)),
                _ => return Err(syntax(format!("invalid character literal '{}'", text))),
            }
            i = next;
            continue;
        }
        let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
        match PUNCTUATION.iter().find(|p| rest.starts_with(**p)) {
            Some(p) => {
                tokens.push(Token::Punct(*p));
                i += p.len();
            }
            None => return Err(syntax(format!("unexpected character '{}'", c))),
        }
    }
    tokens.push(Token::Eof);
    Ok(tokens)
}

fn number(chars: &[char], start: usize) -> Result<(Token, usize)> {
    let mut i = start;
    if chars[i] == '0' && matches!(chars.get(i + 1), Some('x' | 'X')) {
        i += 2;
        let digits_start = i;
        while i < chars.len() && (chars[i].is_ascii_hexdigit() || chars[i] == '_') {
            i += 1;
        }
        let digits: String = chars[digits_start..i].iter().filter(|c| **c != '_').collect();
        let value = u64::from_str_radix(&digits, 16)
            .map_err(|_| syntax(format!("invalid hex literal 0x{}", digits)))?;
        if matches!(chars.get(i), Some('l' | 'L')) {
            return Ok((Token::Int(value as i64, true), i + 1));
        }
        // Hex int literals may use all 32 bits
        let value = u32::try_from(value)
            .map_err(|_| syntax(format!("hex literal 0x{} out of int range", digits)))?;
        return Ok((Token::Int(i64::from(value as i32), false), i));
    }

    let mut is_float = false;
    while i < chars.len() {
        match chars[i] {
            '0'..='9' | '_' => i += 1,
            '.' if !is_float && chars.get(i + 1).map_or(true, |c| !c.is_alphabetic()) => {
                is_float = true;
                i += 1;
            }
            'e' | 'E' => {
                is_float = true;
                i += 1;
                if matches!(chars.get(i), Some('+' | '-')) {
                    i += 1;
                }
            }
            _ => break,
        }
    }
    let text: String = chars[start..i].iter().filter(|c| **c != '_').collect();
    match chars.get(i) {
        Some('l' | 'L') if !is_float => {
            let value = text
                .parse::<i64>()
                .map_err(|_| syntax(format!("invalid long literal {}", text)))?;
            Ok((Token::Int(value, true), i + 1))
        }
        Some(suffix @ ('f' | 'F' | 'd' | 'D')) => {
            let value = text
                .parse::<f64>()
                .map_err(|_| syntax(format!("invalid floating literal {}", text)))?;
            Ok((Token::Float(value, matches!(suffix, 'f' | 'F')), i + 1))
        }
        _ if is_float => {
            let value = text
                .parse::<f64>()
                .map_err(|_| syntax(format!("invalid floating literal {}", text)))?;
            Ok((Token::Float(value, false), i))
        }
        _ => {
            // 2147483648 is only legal as the operand of unary minus
            let value = text
                .parse::<i64>()
                .map_err(|_| syntax(format!("invalid integer literal {}", text)))?;
            Ok((Token::Int(value, false), i))
        }
    }
}

fn quoted(chars: &[char], start: usize, quote: char) -> Result<(String, usize)> {
    let mut text = String::new();
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            c if c == quote => return Ok((text, i + 1)),
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or_else(|| syntax("unterminated escape"))?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    'b' => '\u{8}',
                    'f' => '\u{c}',
                    '0' => '\0',
                    other => *other,
                });
                i += 2;
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    Err(syntax("unterminated literal"))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

pub fn parse(input: &str) -> Result<Expr> {
    let mut parser = Parser {
        tokens: tokenize(input)?,
        pos: 0,
    };
    if parser.peek() == &Token::Eof {
        return Err(syntax("empty expression"));
    }
    let expr = parser.conditional()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(syntax(format!("unexpected {:?} after expression", other))),
    }
}

fn binary_op(token: &Token) -> Option<(BinaryOp, u8)> {
    let Token::Punct(p) = token else {
        return None;
    };
    let op = match *p {
        "||" => (BinaryOp::Or, 1),
        "&&" => (BinaryOp::And, 2),
        "|" => (BinaryOp::BitOr, 3),
        "^" => (BinaryOp::BitXor, 4),
        "&" => (BinaryOp::BitAnd, 5),
        "==" => (BinaryOp::Eq, 6),
        "!=" => (BinaryOp::Ne, 6),
        "<" => (BinaryOp::Lt, 7),
        ">" => (BinaryOp::Gt, 7),
        "<=" => (BinaryOp::Le, 7),
        ">=" => (BinaryOp::Ge, 7),
        "<<" => (BinaryOp::Shl, 8),
        ">>" => (BinaryOp::Shr, 8),
        ">>>" => (BinaryOp::UShr, 8),
        "+" => (BinaryOp::Add, 9),
        "-" => (BinaryOp::Sub, 9),
        "*" => (BinaryOp::Mul, 10),
        "/" => (BinaryOp::Div, 10),
        "%" => (BinaryOp::Rem, 10),
        _ => return None,
    };
    Some(op)
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, punct: &str) -> bool {
        if matches!(self.peek(), Token::Punct(p) if *p == punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: &str) -> Result<()> {
        if self.eat(punct) {
            Ok(())
        } else {
            Err(syntax(format!("expected '{}', found {:?}", punct, self.peek())))
        }
    }

    fn conditional(&mut self) -> Result<Expr> {
        let condition = self.binary(1)?;
        if !self.eat("?") {
            return Ok(condition);
        }
        let then = self.conditional()?;
        self.expect(":")?;
        let otherwise = self.conditional()?;
        Ok(Expr::Conditional(
            Box::new(condition),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    fn binary(&mut self, min_precedence: u8) -> Result<Expr> {
        let mut left = self.unary()?;
        while let Some((op, precedence)) = binary_op(self.peek()) {
            if precedence < min_precedence {
                break;
            }
            self.pos += 1;
            let right = self.binary(precedence + 1)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            Token::Punct("-") => UnaryOp::Neg,
            Token::Punct("+") => UnaryOp::Plus,
            Token::Punct("!") => UnaryOp::Not,
            Token::Punct("~") => UnaryOp::BitNot,
            _ => return self.postfix(),
        };
        self.pos += 1;
        // -2147483648 and -9223372036854775808L
        if op == UnaryOp::Neg {
            if let Token::Int(value, long) = *self.peek() {
                self.pos += 1;
                let literal = negative_literal(value, long)?;
                return self.postfix_on(Expr::Literal(literal));
            }
        }
        Ok(Expr::Unary(op, Box::new(self.unary()?)))
    }

    fn postfix(&mut self) -> Result<Expr> {
        let primary = self.primary()?;
        self.postfix_on(primary)
    }

    fn postfix_on(&mut self, mut expr: Expr) -> Result<Expr> {
        loop {
            if self.eat(".") {
                let name = match self.next() {
                    Token::Ident(name) => name,
                    other => return Err(syntax(format!("expected a name after '.', found {:?}", other))),
                };
                if self.eat("(") {
                    let args = self.arguments()?;
                    expr = Expr::Call(Some(Box::new(expr)), name, args);
                } else {
                    expr = Expr::Field(Box::new(expr), name);
                }
            } else if self.eat("[") {
                let index = self.conditional()?;
                self.expect("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if self.eat(")") {
            return Ok(args);
        }
        loop {
            args.push(self.conditional()?);
            if self.eat(")") {
                return Ok(args);
            }
            self.expect(",")?;
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.next() {
            Token::Int(value, long) => Ok(Expr::Literal(int_literal(value, long)?)),
            Token::Float(value, true) => Ok(Expr::Literal(Literal::Float(value as f32))),
            Token::Float(value, false) => Ok(Expr::Literal(Literal::Double(value))),
            Token::Char(c) => Ok(Expr::Literal(Literal::Char(c))),
            Token::Str(s) => Ok(Expr::Literal(Literal::Str(s))),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Literal::Bool(true))),
                "false" => Ok(Expr::Literal(Literal::Bool(false))),
                "null" => Ok(Expr::Literal(Literal::Null)),
                "this" => Ok(Expr::This),
                "new" | "instanceof" | "super" => {
                    Err(syntax(format!("'{}' is not supported", name)))
                }
                _ => {
                    if self.eat("(") {
                        let args = self.arguments()?;
                        Ok(Expr::Call(None, name, args))
                    } else {
                        Ok(Expr::Name(name))
                    }
                }
            },
            Token::Punct("(") => {
                let inner = self.conditional()?;
                self.expect(")")?;
                Ok(inner)
            }
            Token::Eof => Err(syntax("unexpected end of expression")),
            other => Err(syntax(format!("unexpected {:?}", other))),
        }
    }
}

fn int_literal(value: i64, long: bool) -> Result<Literal> {
    if long {
        return Ok(Literal::Long(value));
    }
    i32::try_from(value)
        .map(Literal::Int)
        .map_err(|_| syntax(format!("integer literal {} out of range", value)))
}

fn negative_literal(value: i64, long: bool) -> Result<Literal> {
    if long {
        return Ok(Literal::Long(value.wrapping_neg()));
    }
    if value == 1 << 31 {
        return Ok(Literal::Int(i32::MIN));
    }
    match int_literal(value, false)? {
        Literal::Int(v) => Ok(Literal::Int(v.wrapping_neg())),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Box<Expr> {
        Box::new(Expr::Name(s.to_string()))
    }

    #[test]
    fn test_precedence() {
        let expr = parse("a + b * 2 == c && !done").unwrap();
        let expected = Expr::Binary(
            BinaryOp::And,
            Box::new(Expr::Binary(
                BinaryOp::Eq,
                Box::new(Expr::Binary(
                    BinaryOp::Add,
                    name("a"),
                    Box::new(Expr::Binary(
                        BinaryOp::Mul,
                        name("b"),
                        Box::new(Expr::Literal(Literal::Int(2))),
                    )),
                )),
                name("c"),
            )),
            Box::new(Expr::Unary(UnaryOp::Not, name("done"))),
        );
        assert_eq!(expr, expected);
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse("10L").unwrap(), Expr::Literal(Literal::Long(10)));
        assert_eq!(parse("1.5f").unwrap(), Expr::Literal(Literal::Float(1.5)));
        assert_eq!(parse("2.0").unwrap(), Expr::Literal(Literal::Double(2.0)));
        assert_eq!(parse("'x'").unwrap(), Expr::Literal(Literal::Char(b'x' as u16)));
        assert_eq!(
            parse(r#""a\"b""#).unwrap(),
            Expr::Literal(Literal::Str("a\"b".into()))
        );
        assert_eq!(parse("-2147483648").unwrap(), Expr::Literal(Literal::Int(i32::MIN)));
        assert_eq!(parse("0xFFFFFFFF").unwrap(), Expr::Literal(Literal::Int(-1)));
        assert!(parse("2147483648").is_err());
    }

    #[test]
    fn test_postfix_chains() {
        let expr = parse("this.items[i + 1].name").unwrap();
        let Expr::Field(base, field) = expr else {
            panic!("expected field access");
        };
        assert_eq!(field, "name");
        assert!(matches!(*base, Expr::Index(_, _)));

        assert_eq!(
            parse("com.example.Main.count").unwrap().qualified_name().as_deref(),
            Some("com.example.Main.count")
        );
    }

    #[test]
    fn test_conditional_is_right_associative() {
        let expr = parse("a ? 1 : b ? 2 : 3").unwrap();
        let Expr::Conditional(_, _, otherwise) = expr else {
            panic!("expected conditional");
        };
        assert!(matches!(*otherwise, Expr::Conditional(_, _, _)));
    }

    #[test]
    fn test_calls_parse() {
        assert!(matches!(
            parse("list.size()").unwrap(),
            Expr::Call(Some(_), ref method, ref args) if method == "size" && args.is_empty()
        ));
    }

    #[test]
    fn test_syntax_errors() {
        for input in ["", "a +", "(a", "a b", "1 ? 2", "'ab'", "\"open", "a # b", "new Foo()"] {
            assert!(
                matches!(parse(input), Err(DebuggerError::InvalidExpression(_))),
                "{:?} should not parse",
                input
            );
        }
    }
}
