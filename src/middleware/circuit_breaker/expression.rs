//! 회로 차단 조건식
//!
//! ```text
//! NetworkErrorRatio() > 0.5
//! ResponseCodeRatio(500, 600, 0, 600) > 0.25 || LatencyAtQuantileMS(50.0) > 100
//! ```

use std::fmt;

use super::metrics::Snapshot;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    #[error("empty expression")]
    Empty,

    #[error("unexpected {found} at position {position}")]
    Unexpected { found: String, position: usize },

    #[error("unknown function {0:?}")]
    UnknownFunction(String),

    #[error("{function} expects {expected} argument(s), got {got}")]
    Arity {
        function: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid argument for {function}: {message}")]
    Argument {
        function: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric {
    NetworkErrorRatio,
    /// `[from, to)` 구간 응답 수 / `[dividend_from, dividend_to)` 구간 응답 수
    ResponseCodeRatio {
        from: u16,
        to: u16,
        dividend_from: u16,
        dividend_to: u16,
    },
    LatencyAtQuantileMs(f64),
}

impl Metric {
    fn value(&self, snapshot: &Snapshot) -> f64 {
        match *self {
            Metric::NetworkErrorRatio => snapshot.network_error_ratio(),
            Metric::ResponseCodeRatio {
                from,
                to,
                dividend_from,
                dividend_to,
            } => snapshot.response_code_ratio(from, to, dividend_from, dividend_to),
            Metric::LatencyAtQuantileMs(q) => snapshot.latency_at_quantile_ms(q),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl CompareOp {
    fn apply(self, left: f64, right: f64) -> bool {
        match self {
            CompareOp::Gt => left > right,
            CompareOp::Ge => left >= right,
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Compare {
        metric: Metric,
        op: CompareOp,
        threshold: f64,
    },
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
}

impl Expression {
    pub fn parse(input: &str) -> Result<Self, ExpressionError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(ExpressionError::Empty);
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.or()?;
        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(parser.unexpected(token.clone())),
        }
    }

    pub fn evaluate(&self, snapshot: &Snapshot) -> bool {
        match self {
            Expression::Compare {
                metric,
                op,
                threshold,
            } => op.apply(metric.value(snapshot), *threshold),
            Expression::And(a, b) => a.evaluate(snapshot) && b.evaluate(snapshot),
            Expression::Or(a, b) => a.evaluate(snapshot) || b.evaluate(snapshot),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    LParen,
    RParen,
    Comma,
    And,
    Or,
    Op(CompareOp),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "identifier {:?}", name),
            Token::Number(n) => write!(f, "number {}", n),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::Comma => f.write_str("','"),
            Token::And => f.write_str("'&&'"),
            Token::Or => f.write_str("'||'"),
            Token::Op(op) => write!(f, "operator {:?}", op),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, ExpressionError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;
        let two = |next: u8| bytes.get(i + 1) == Some(&next);

        let token = match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                i += 1;
                continue;
            }
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b',' => Token::Comma,
            b'&' if two(b'&') => Token::And,
            b'|' if two(b'|') => Token::Or,
            b'>' if two(b'=') => Token::Op(CompareOp::Ge),
            b'<' if two(b'=') => Token::Op(CompareOp::Le),
            b'=' if two(b'=') => Token::Op(CompareOp::Eq),
            b'!' if two(b'=') => Token::Op(CompareOp::Ne),
            b'>' => Token::Op(CompareOp::Gt),
            b'<' => Token::Op(CompareOp::Lt),
            b'0'..=b'9' | b'.' | b'-' => {
                i += 1;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                let text = &input[start..i];
                let number = text.parse().map_err(|_| ExpressionError::Unexpected {
                    found: text.to_string(),
                    position: start,
                })?;
                tokens.push((Token::Number(number), start));
                continue;
            }
            c if c.is_ascii_alphabetic() => {
                while i < bytes.len() && bytes[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                tokens.push((Token::Ident(input[start..i].to_string()), start));
                continue;
            }
            _ => {
                return Err(ExpressionError::Unexpected {
                    found: input[start..].chars().next().map(String::from).unwrap_or_default(),
                    position: start,
                })
            }
        };

        i += match token {
            Token::And | Token::Or => 2,
            Token::Op(CompareOp::Ge | CompareOp::Le | CompareOp::Eq | CompareOp::Ne) => 2,
            _ => 1,
        };
        tokens.push((token, start));
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, p)| *p)
            .unwrap_or_else(|| self.tokens.last().map(|(_, p)| p + 1).unwrap_or(0))
    }

    fn unexpected(&self, found: Token) -> ExpressionError {
        ExpressionError::Unexpected {
            found: found.to_string(),
            position: self.position(),
        }
    }

    fn end_of_input(&self) -> ExpressionError {
        ExpressionError::Unexpected {
            found: "end of expression".to_string(),
            position: self.position(),
        }
    }

    fn next(&mut self) -> Result<Token, ExpressionError> {
        let token = self.peek().cloned().ok_or_else(|| self.end_of_input())?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExpressionError> {
        let token = self.next()?;
        if token != expected {
            self.pos -= 1;
            return Err(self.unexpected(token));
        }
        Ok(())
    }

    fn or(&mut self) -> Result<Expression, ExpressionError> {
        let mut left = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            left = Expression::Or(Box::new(left), Box::new(self.and()?));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expression, ExpressionError> {
        let mut left = self.primary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            left = Expression::And(Box::new(left), Box::new(self.primary()?));
        }
        Ok(left)
    }

    fn primary(&mut self) -> Result<Expression, ExpressionError> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.or()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }

        let metric = self.metric()?;
        let op = match self.next()? {
            Token::Op(op) => op,
            other => {
                self.pos -= 1;
                return Err(self.unexpected(other));
            }
        };
        let threshold = match self.next()? {
            Token::Number(n) => n,
            other => {
                self.pos -= 1;
                return Err(self.unexpected(other));
            }
        };
        Ok(Expression::Compare {
            metric,
            op,
            threshold,
        })
    }

    fn metric(&mut self) -> Result<Metric, ExpressionError> {
        let name = match self.next()? {
            Token::Ident(name) => name,
            other => {
                self.pos -= 1;
                return Err(self.unexpected(other));
            }
        };
        let args = self.arguments()?;

        match name.as_str() {
            "NetworkErrorRatio" => {
                arity("NetworkErrorRatio", 0, &args)?;
                Ok(Metric::NetworkErrorRatio)
            }
            "ResponseCodeRatio" => {
                const NAME: &str = "ResponseCodeRatio";
                arity(NAME, 4, &args)?;
                let code = |v: f64| {
                    if v.fract() == 0.0 && (0.0..=1000.0).contains(&v) {
                        Ok(v as u16)
                    } else {
                        Err(ExpressionError::Argument {
                            function: NAME,
                            message: format!("{} is not a status code", v),
                        })
                    }
                };
                let (from, to) = (code(args[0])?, code(args[1])?);
                let (dividend_from, dividend_to) = (code(args[2])?, code(args[3])?);
                if from >= to || dividend_from >= dividend_to {
                    return Err(ExpressionError::Argument {
                        function: NAME,
                        message: "range start must be lower than range end".to_string(),
                    });
                }
                Ok(Metric::ResponseCodeRatio {
                    from,
                    to,
                    dividend_from,
                    dividend_to,
                })
            }
            "LatencyAtQuantileMS" => {
                arity("LatencyAtQuantileMS", 1, &args)?;
                if !(0.0..=100.0).contains(&args[0]) {
                    return Err(ExpressionError::Argument {
                        function: "LatencyAtQuantileMS",
                        message: format!("quantile {} is outside [0, 100]", args[0]),
                    });
                }
                Ok(Metric::LatencyAtQuantileMs(args[0]))
            }
            _ => Err(ExpressionError::UnknownFunction(name)),
        }
    }

    fn arguments(&mut self) -> Result<Vec<f64>, ExpressionError> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            match self.next()? {
                Token::Number(n) => args.push(n),
                other => {
                    self.pos -= 1;
                    return Err(self.unexpected(other));
                }
            }
            match self.next()? {
                Token::Comma => continue,
                Token::RParen => return Ok(args),
                other => {
                    self.pos -= 1;
                    return Err(self.unexpected(other));
                }
            }
        }
    }
}

fn arity(function: &'static str, expected: usize, args: &[f64]) -> Result<(), ExpressionError> {
    if args.len() != expected {
        return Err(ExpressionError::Arity {
            function,
            expected,
            got: args.len(),
        });
    }
    Ok(())
}
