use crate::symbolic::symbolic_engine::Expr;
/// a module turns a String expression into a symbolic expression
///# Example
/// ```
/// use RustedTranscription::symbolic::symbolic_engine::Expr;
/// let parsed = Expr::parse_expression("x0^2 * exp(-t) + sin(u0)/p1").unwrap();
/// println!(" parsed_expression {}", parsed);
/// ```
//  grammar, lowest precedence first:
//      sum     := product (('+' | '-') product)*
//      product := unary (('*' | '/') unary)*
//      unary   := '-' unary | power
//      power   := atom ('^' unary)?          right associative
//      atom    := number | identifier | identifier '(' sum ')' | '(' sum ')'
#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' => i += 1,
            '+' | '-' | '*' | '/' | '^' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            _ if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // exponent part: 1e-3, 2.5E+4
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        while j < chars.len() && chars[j].is_ascii_digit() {
                            j += 1;
                        }
                        i = j;
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{}'", literal))?;
                tokens.push(Token::Number(value));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            _ => return Err(format!("unexpected character '{}' at position {}", c, i)),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect_rparen(&mut self) -> Result<(), String> {
        match self.next() {
            Some(Token::RParen) => Ok(()),
            other => Err(format!("expected ')', found {:?}", other)),
        }
    }

    fn sum(&mut self) -> Result<Expr, String> {
        let mut lhs = self.product()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.product()?;
            lhs = if op == '+' { lhs + rhs } else { lhs - rhs };
        }
        Ok(lhs)
    }

    fn product(&mut self) -> Result<Expr, String> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = if op == '*' { lhs * rhs } else { lhs / rhs };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, String> {
        if let Some(Token::Op('-')) = self.peek() {
            self.pos += 1;
            return Ok(-self.unary()?);
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr, String> {
        let base = self.atom()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(base.pow(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Number(value)) => Ok(Expr::Const(value)),
            Some(Token::LParen) => {
                let inner = self.sum()?;
                self.expect_rparen()?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.pos += 1;
                    let arg = self.sum()?;
                    self.expect_rparen()?;
                    apply_function(&name, arg)
                } else {
                    Ok(Expr::Var(name))
                }
            }
            other => Err(format!("unexpected token {:?}", other)),
        }
    }
}

fn apply_function(name: &str, arg: Expr) -> Result<Expr, String> {
    match name {
        "exp" => Ok(arg.exp()),
        "ln" | "log" => Ok(arg.ln()),
        "sin" => Ok(arg.sin()),
        "cos" => Ok(arg.cos()),
        "tg" | "tan" => Ok(arg.tg()),
        "arctg" | "atan" => Ok(arg.arctg()),
        "sqrt" => Ok(arg.sqrt()),
        _ => Err(format!("unknown function '{}'", name)),
    }
}

impl Expr {
    /// Parses an infix expression such as `"x0*u0 - 2.5e-1*sin(x1)^2"`.
    pub fn parse_expression(input: &str) -> Result<Expr, String> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err("empty expression".to_string());
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.sum()?;
        if parser.pos != parser.tokens.len() {
            return Err(format!(
                "unexpected trailing input {:?}",
                &parser.tokens[parser.pos..]
            ));
        }
        Ok(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn eval(input: &str, vars: &[&str], values: &[f64]) -> f64 {
        Expr::parse_expression(input)
            .unwrap()
            .eval_expression(vars, values)
            .unwrap()
    }

    #[test]
    fn test_precedence() {
        assert_relative_eq!(eval("1 + 2*3^2", &[], &[]), 19.0);
        assert_relative_eq!(eval("2^3^2", &[], &[]), 512.0);
        assert_relative_eq!(eval("-2^2", &[], &[]), -4.0);
        assert_relative_eq!(eval("(1 + 2)*3", &[], &[]), 9.0);
        assert_relative_eq!(eval("8/4/2", &[], &[]), 1.0);
        assert_relative_eq!(eval("2 - 3 - 4", &[], &[]), -5.0);
    }

    #[test]
    fn test_numbers_and_functions() {
        assert_relative_eq!(eval("2.5e-1 + 1E1", &[], &[]), 10.25);
        let v = eval("exp(x) + ln(y) + sin(x)*cos(y) + tg(x) + arctg(y) + sqrt(y)", &["x", "y"], &[0.3, 2.0]);
        let expected = 0.3f64.exp() + 2.0f64.ln() + 0.3f64.sin() * 2.0f64.cos() + 0.3f64.tan()
            + 2.0f64.atan()
            + 2.0f64.sqrt();
        assert_relative_eq!(v, expected, epsilon = 1e-14);
    }

    #[test]
    fn test_indexed_names() {
        let e = Expr::parse_expression("x0*u_1 - xdot2").unwrap();
        assert_eq!(
            e.all_arguments_are_variables(),
            vec!["u_1".to_string(), "x0".to_string(), "xdot2".to_string()]
        );
    }

    #[test]
    fn test_errors() {
        assert!(Expr::parse_expression("").is_err());
        assert!(Expr::parse_expression("(x + 1").is_err());
        assert!(Expr::parse_expression("x + ").is_err());
        assert!(Expr::parse_expression("foo(x)").is_err());
        assert!(Expr::parse_expression("x $ y").is_err());
        assert!(Expr::parse_expression("x y").is_err());
    }
}
