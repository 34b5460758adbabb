//! Recursive-descent parser producing the sandbox syntax tree.

use super::ScriptError;
use super::lexer::{Part, Token, tokenize};
use super::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Stmt {
    Expr(Expr),
    Echo(Vec<Expr>),
    Return(Option<Expr>),
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        otherwise: Option<Vec<Stmt>>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    For {
        init: Vec<Expr>,
        cond: Vec<Expr>,
        step: Vec<Expr>,
        body: Vec<Stmt>,
    },
    Foreach {
        subject: Expr,
        key: Option<String>,
        value: String,
        body: Vec<Stmt>,
    },
    Throw(Expr),
    Block(Vec<Stmt>),
    Break,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Eq,
    NotEq,
    Identical,
    NotIdentical,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Concat => ".",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::Identical => "===",
            BinOp::NotIdentical => "!==",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Lit(Value),
    Template(Vec<Part>),
    Var(String),
    Const(String),
    Array(Vec<(Option<Expr>, Expr)>),
    /// `$a[i]`, or `$a[]` when `index` is `None` (assignment only).
    Index {
        target: Box<Expr>,
        index: Option<Box<Expr>>,
    },
    Prop {
        target: Box<Expr>,
        name: String,
    },
    Method {
        target: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Static {
        class: String,
        method: String,
        args: Vec<Expr>,
    },
    New {
        class: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Coalesce(Box<Expr>, Box<Expr>),
    Ternary {
        cond: Box<Expr>,
        then: Option<Box<Expr>>,
        otherwise: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        op: Option<BinOp>,
        value: Box<Expr>,
    },
    IncDec {
        target: Box<Expr>,
        delta: i64,
        prefix: bool,
    },
    Print(Box<Expr>),
}

impl Expr {
    fn is_lvalue(&self) -> bool {
        matches!(self, Expr::Var(_) | Expr::Index { .. } | Expr::Prop { .. })
    }
}

const UNSUPPORTED: &[&str] = &[
    "function",
    "class",
    "interface",
    "trait",
    "namespace",
    "use",
    "switch",
    "try",
    "do",
    "goto",
    "declare",
    "include",
    "require",
    "eval",
];

/// Deepest syntax tree the parser builds. Evaluation and drop both recurse
/// over the tree, so this bounds their stack use too.
const MAX_NESTING: usize = 64;

pub(crate) fn parse(source: &str) -> Result<Vec<Stmt>, ScriptError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let mut program = Vec::new();
    while parser.peek().is_some() {
        if let Some(stmt) = parser.statement()? {
            program.push(stmt);
        }
    }
    Ok(program)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    /// Count one more level of nesting. Errors abort the whole parse, so
    /// levels are only given back on success.
    fn enter(&mut self) -> Result<(), ScriptError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ScriptError::parse("Maximum nesting depth exceeded"));
        }
        Ok(())
    }

    fn leave(&mut self, levels: usize) {
        self.depth -= levels;
    }

    fn nested<T>(
        &mut self,
        inner: fn(&mut Self) -> Result<T, ScriptError>,
    ) -> Result<T, ScriptError> {
        self.enter()?;
        let result = inner(self)?;
        self.leave(1);
        Ok(result)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_sym(&self, sym: &str) -> bool {
        matches!(self.peek(), Some(Token::Sym(s)) if *s == sym)
    }

    fn eat_sym(&mut self, sym: &str) -> bool {
        if self.at_sym(sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_sym(&mut self, sym: &str) -> Result<(), ScriptError> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("\"{}\"", sym)))
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Name(n)) if n.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expecting: &str) -> ScriptError {
        match self.peek() {
            Some(token) => ScriptError::parse(format!(
                "syntax error, unexpected {}, expecting {}",
                token.describe(),
                expecting
            )),
            None => ScriptError::parse(format!(
                "syntax error, unexpected end of file, expecting {}",
                expecting
            )),
        }
    }

    /// A statement terminator: `;`, or nothing before `}` or end of input.
    fn end_statement(&mut self) -> Result<(), ScriptError> {
        if self.eat_sym(";") || self.peek().is_none() || self.at_sym("}") {
            Ok(())
        } else {
            Err(self.unexpected("\";\""))
        }
    }

    fn statement(&mut self) -> Result<Option<Stmt>, ScriptError> {
        self.nested(Self::bare_statement)
    }

    fn bare_statement(&mut self) -> Result<Option<Stmt>, ScriptError> {
        if self.eat_sym(";") {
            return Ok(None);
        }
        if self.eat_sym("{") {
            return Ok(Some(Stmt::Block(self.block_rest()?)));
        }

        if let Some(Token::Name(name)) = self.peek() {
            let keyword = name.to_ascii_lowercase();
            let followed_by_call = matches!(self.peek_at(1), Some(Token::Sym("(")));
            if UNSUPPORTED.contains(&keyword.as_str()) && !followed_by_call
                || keyword == "eval"
            {
                return Err(ScriptError::parse(format!(
                    "syntax error, \"{}\" is not supported here",
                    keyword
                )));
            }
            match keyword.as_str() {
                "if" => {
                    self.pos += 1;
                    return self.if_statement().map(Some);
                }
                "while" => {
                    self.pos += 1;
                    let cond = self.paren_expr()?;
                    let body = self.body()?;
                    return Ok(Some(Stmt::While { cond, body }));
                }
                "for" => {
                    self.pos += 1;
                    return self.for_statement().map(Some);
                }
                "foreach" => {
                    self.pos += 1;
                    return self.foreach_statement().map(Some);
                }
                "echo" => {
                    self.pos += 1;
                    let mut exprs = vec![self.expr()?];
                    while self.eat_sym(",") {
                        exprs.push(self.expr()?);
                    }
                    self.end_statement()?;
                    return Ok(Some(Stmt::Echo(exprs)));
                }
                "return" => {
                    self.pos += 1;
                    let value = if self.at_sym(";") || self.peek().is_none() || self.at_sym("}") {
                        None
                    } else {
                        Some(self.expr()?)
                    };
                    self.end_statement()?;
                    return Ok(Some(Stmt::Return(value)));
                }
                "throw" => {
                    self.pos += 1;
                    let value = self.expr()?;
                    self.end_statement()?;
                    return Ok(Some(Stmt::Throw(value)));
                }
                "break" | "continue" => {
                    self.pos += 1;
                    self.end_statement()?;
                    return Ok(Some(if keyword == "break" {
                        Stmt::Break
                    } else {
                        Stmt::Continue
                    }));
                }
                _ => {}
            }
        }

        let expr = self.expr()?;
        self.end_statement()?;
        Ok(Some(Stmt::Expr(expr)))
    }

    fn block_rest(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        let mut stmts = Vec::new();
        loop {
            if self.eat_sym("}") {
                return Ok(stmts);
            }
            if self.peek().is_none() {
                return Err(self.unexpected("\"}\""));
            }
            if let Some(stmt) = self.statement()? {
                stmts.push(stmt);
            }
        }
    }

    fn body(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        if self.eat_sym("{") {
            self.block_rest()
        } else {
            Ok(self.statement()?.into_iter().collect())
        }
    }

    fn paren_expr(&mut self) -> Result<Expr, ScriptError> {
        self.expect_sym("(")?;
        let expr = self.expr()?;
        self.expect_sym(")")?;
        Ok(expr)
    }

    fn if_statement(&mut self) -> Result<Stmt, ScriptError> {
        let mut branches = vec![(self.paren_expr()?, self.body()?)];
        let mut otherwise = None;
        loop {
            if self.eat_keyword("elseif") {
                branches.push((self.paren_expr()?, self.body()?));
            } else if self.at_keyword("else")
                && matches!(self.peek_at(1), Some(Token::Name(n)) if n.eq_ignore_ascii_case("if"))
            {
                self.pos += 2;
                branches.push((self.paren_expr()?, self.body()?));
            } else if self.eat_keyword("else") {
                otherwise = Some(self.body()?);
                break;
            } else {
                break;
            }
        }
        Ok(Stmt::If {
            branches,
            otherwise,
        })
    }

    fn for_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.expect_sym("(")?;
        let init = self.expr_list(";")?;
        self.expect_sym(";")?;
        let cond = self.expr_list(";")?;
        self.expect_sym(";")?;
        let step = self.expr_list(")")?;
        self.expect_sym(")")?;
        let body = self.body()?;
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
        })
    }

    fn expr_list(&mut self, until: &str) -> Result<Vec<Expr>, ScriptError> {
        let mut exprs = Vec::new();
        if self.at_sym(until) {
            return Ok(exprs);
        }
        exprs.push(self.expr()?);
        while self.eat_sym(",") {
            exprs.push(self.expr()?);
        }
        Ok(exprs)
    }

    fn foreach_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.expect_sym("(")?;
        let subject = self.expr()?;
        if !self.eat_keyword("as") {
            return Err(self.unexpected("\"as\""));
        }
        let first = self.var_name()?;
        let (key, value) = if self.eat_sym("=>") {
            (Some(first), self.var_name()?)
        } else {
            (None, first)
        };
        self.expect_sym(")")?;
        let body = self.body()?;
        Ok(Stmt::Foreach {
            subject,
            key,
            value,
            body,
        })
    }

    fn var_name(&mut self) -> Result<String, ScriptError> {
        match self.peek() {
            Some(Token::Var(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected("variable")),
        }
    }

    fn expr(&mut self) -> Result<Expr, ScriptError> {
        self.nested(Self::assignment)
    }

    fn assignment(&mut self) -> Result<Expr, ScriptError> {
        let lhs = self.ternary()?;
        let op = match self.peek() {
            Some(Token::Sym("=")) => None,
            Some(Token::Sym("+=")) => Some(BinOp::Add),
            Some(Token::Sym("-=")) => Some(BinOp::Sub),
            Some(Token::Sym("*=")) => Some(BinOp::Mul),
            Some(Token::Sym("/=")) => Some(BinOp::Div),
            Some(Token::Sym(".=")) => Some(BinOp::Concat),
            _ => return Ok(lhs),
        };
        if !lhs.is_lvalue() {
            return Err(self.unexpected("\";\""));
        }
        self.pos += 1;
        let value = self.expr()?;
        Ok(Expr::Assign {
            target: Box::new(lhs),
            op,
            value: Box::new(value),
        })
    }

    fn ternary(&mut self) -> Result<Expr, ScriptError> {
        let cond = self.coalesce()?;
        if !self.eat_sym("?") {
            return Ok(cond);
        }
        let then = if self.eat_sym(":") {
            None
        } else {
            let then = self.expr()?;
            self.expect_sym(":")?;
            Some(Box::new(then))
        };
        let otherwise = self.expr()?;
        Ok(Expr::Ternary {
            cond: Box::new(cond),
            then,
            otherwise: Box::new(otherwise),
        })
    }

    fn coalesce(&mut self) -> Result<Expr, ScriptError> {
        let lhs = self.or()?;
        if self.eat_sym("??") {
            let rhs = self.nested(Self::coalesce)?;
            return Ok(Expr::Coalesce(Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    // Left-associative chains build a tree as deep as the chain is long, so
    // every link counts as a level.

    fn or(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.and()?;
        let mut links = 0;
        while self.eat_sym("||") || self.eat_keyword("or") {
            self.enter()?;
            links += 1;
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        self.leave(links);
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.equality()?;
        let mut links = 0;
        while self.eat_sym("&&") || self.eat_keyword("and") {
            self.enter()?;
            links += 1;
            let rhs = self.equality()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        self.leave(links);
        Ok(lhs)
    }

    fn binary_level(
        &mut self,
        ops: &[(&str, BinOp)],
        next: fn(&mut Self) -> Result<Expr, ScriptError>,
    ) -> Result<Expr, ScriptError> {
        let mut lhs = next(self)?;
        let mut links = 0;
        'outer: loop {
            for (sym, op) in ops {
                if self.eat_sym(sym) {
                    self.enter()?;
                    links += 1;
                    let rhs = next(self)?;
                    lhs = Expr::Binary {
                        op: *op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    };
                    continue 'outer;
                }
            }
            self.leave(links);
            return Ok(lhs);
        }
    }

    fn equality(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(
            &[
                ("===", BinOp::Identical),
                ("!==", BinOp::NotIdentical),
                ("==", BinOp::Eq),
                ("!=", BinOp::NotEq),
            ],
            Self::comparison,
        )
    }

    fn comparison(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(
            &[
                ("<=", BinOp::Le),
                (">=", BinOp::Ge),
                ("<", BinOp::Lt),
                (">", BinOp::Gt),
            ],
            Self::concat,
        )
    }

    fn concat(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(&[(".", BinOp::Concat)], Self::additive)
    }

    fn additive(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(&[("+", BinOp::Add), ("-", BinOp::Sub)], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(
            &[("*", BinOp::Mul), ("/", BinOp::Div), ("%", BinOp::Mod)],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        let op = if self.eat_sym("!") {
            Some(UnaryOp::Not)
        } else if self.eat_sym("-") {
            Some(UnaryOp::Neg)
        } else if self.eat_sym("+") {
            Some(UnaryOp::Plus)
        } else {
            None
        };
        if let Some(op) = op {
            let expr = self.nested(Self::unary)?;
            return Ok(Expr::Unary {
                op,
                expr: Box::new(expr),
            });
        }

        for (sym, delta) in [("++", 1), ("--", -1)] {
            if self.eat_sym(sym) {
                let target = self.nested(Self::unary)?;
                if !target.is_lvalue() {
                    return Err(self.unexpected("variable"));
                }
                return Ok(Expr::IncDec {
                    target: Box::new(target),
                    delta,
                    prefix: true,
                });
            }
        }

        if self.eat_keyword("print") {
            let expr = self.expr()?;
            return Ok(Expr::Print(Box::new(expr)));
        }

        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.primary()?;
        let mut links = 0;
        loop {
            if self.at_sym("[") || self.at_sym("->") || self.at_sym("++") || self.at_sym("--") {
                self.enter()?;
                links += 1;
            }
            if self.eat_sym("[") {
                let index = if self.at_sym("]") {
                    None
                } else {
                    Some(Box::new(self.expr()?))
                };
                self.expect_sym("]")?;
                expr = Expr::Index {
                    target: Box::new(expr),
                    index,
                };
            } else if self.eat_sym("->") {
                let name = match self.next() {
                    Some(Token::Name(name)) => name,
                    _ => return Err(ScriptError::parse("syntax error, expecting property name")),
                };
                expr = if self.at_sym("(") {
                    let args = self.args()?;
                    Expr::Method {
                        target: Box::new(expr),
                        name,
                        args,
                    }
                } else {
                    Expr::Prop {
                        target: Box::new(expr),
                        name,
                    }
                };
            } else if expr.is_lvalue() && (self.at_sym("++") || self.at_sym("--")) {
                let delta = if self.eat_sym("++") {
                    1
                } else {
                    self.pos += 1;
                    -1
                };
                expr = Expr::IncDec {
                    target: Box::new(expr),
                    delta,
                    prefix: false,
                };
            } else {
                self.leave(links);
                return Ok(expr);
            }
        }
    }

    fn args(&mut self) -> Result<Vec<Expr>, ScriptError> {
        self.expect_sym("(")?;
        let mut args = Vec::new();
        while !self.eat_sym(")") {
            args.push(self.expr()?);
            if !self.eat_sym(",") {
                self.expect_sym(")")?;
                break;
            }
        }
        Ok(args)
    }

    fn array_items(&mut self, close: &str) -> Result<Vec<(Option<Expr>, Expr)>, ScriptError> {
        let mut items = Vec::new();
        while !self.eat_sym(close) {
            let first = self.expr()?;
            let item = if self.eat_sym("=>") {
                (Some(first), self.expr()?)
            } else {
                (None, first)
            };
            items.push(item);
            if !self.eat_sym(",") {
                self.expect_sym(close)?;
                break;
            }
        }
        Ok(items)
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let Some(token) = self.next() else {
            return Err(ScriptError::parse("syntax error, unexpected end of file"));
        };
        match token {
            Token::Int(n) => Ok(Expr::Lit(Value::Int(n))),
            Token::Float(f) => Ok(Expr::Lit(Value::Float(f))),
            Token::Str(s) => Ok(Expr::Lit(Value::Str(s))),
            Token::Template(parts) => Ok(Expr::Template(parts)),
            Token::Var(name) => Ok(Expr::Var(name)),
            Token::Sym("(") => {
                let expr = self.expr()?;
                self.expect_sym(")")?;
                Ok(expr)
            }
            Token::Sym("[") => Ok(Expr::Array(self.array_items("]")?)),
            Token::Name(name) => self.name_expr(name),
            _ => {
                self.pos -= 1;
                Err(self.unexpected("expression"))
            }
        }
    }

    fn name_expr(&mut self, name: String) -> Result<Expr, ScriptError> {
        let lower = name.to_ascii_lowercase();
        match lower.as_str() {
            "true" => return Ok(Expr::Lit(Value::Bool(true))),
            "false" => return Ok(Expr::Lit(Value::Bool(false))),
            "null" => return Ok(Expr::Lit(Value::Null)),
            "array" if self.at_sym("(") => {
                self.pos += 1;
                return Ok(Expr::Array(self.array_items(")")?));
            }
            "new" => {
                let class = match self.next() {
                    Some(Token::Name(class)) => class,
                    _ => return Err(ScriptError::parse("syntax error, expecting class name")),
                };
                let args = if self.at_sym("(") { self.args()? } else { Vec::new() };
                return Ok(Expr::New { class, args });
            }
            _ => {}
        }

        if self.eat_sym("::") {
            let member = match self.next() {
                Some(Token::Name(member)) => member,
                _ => return Err(ScriptError::parse("syntax error, expecting method name")),
            };
            if self.at_sym("(") {
                let args = self.args()?;
                return Ok(Expr::Static {
                    class: name,
                    method: member,
                    args,
                });
            }
            if member.eq_ignore_ascii_case("class") {
                return Ok(Expr::Lit(Value::Str(name.trim_start_matches('\\').to_string())));
            }
            return Err(ScriptError::error(format!(
                "Undefined constant {}::{}",
                name.trim_start_matches('\\'),
                member
            )));
        }

        if self.at_sym("(") {
            let args = self.args()?;
            return Ok(Expr::Call { name, args });
        }

        Ok(Expr::Const(name))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn expr(source: &str) -> Expr {
        match parse(source).unwrap().remove(0) {
            Stmt::Expr(e) => e,
            other => panic!("expected expression, got {other:?}"),
        }
    }

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let Expr::Binary { op, rhs, .. } = expr("1 + 2 * 3") else {
            panic!("expected binary");
        };
        assert_eq!(op, BinOp::Add);
        assert!(matches!(*rhs, Expr::Binary { op: BinOp::Mul, .. }));

        // "a" . 1 + 2 parses as "a" . (1 + 2)
        let Expr::Binary { op, .. } = expr("'a' . 1 + 2") else {
            panic!("expected binary");
        };
        assert_eq!(op, BinOp::Concat);
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let Expr::Assign { target, value, .. } = expr("$a = $b = 3") else {
            panic!("expected assignment");
        };
        assert_eq!(*target, Expr::Var("a".into()));
        assert!(matches!(*value, Expr::Assign { .. }));
    }

    #[test]
    fn test_comparison_is_not_assignment() {
        assert!(matches!(expr("$x == 1"), Expr::Binary { op: BinOp::Eq, .. }));
    }

    #[test]
    fn test_static_and_method_calls() {
        let Expr::Method { target, name, args } = expr(r"\App\Models\User::where('a', 1)->first()")
        else {
            panic!("expected method call");
        };
        assert_eq!(name, "first");
        assert!(args.is_empty());
        assert!(matches!(*target, Expr::Static { ref method, .. } if method == "where"));
    }

    #[test]
    fn test_array_literals() {
        let Expr::Array(items) = expr("['a' => 1, 2, ]") else {
            panic!("expected array");
        };
        assert_eq!(items.len(), 2);
        assert!(items[0].0.is_some());
        assert!(items[1].0.is_none());
        assert!(matches!(expr("array(1, 2)"), Expr::Array(ref items) if items.len() == 2));
    }

    #[test]
    fn test_control_flow() {
        let program = parse(
            "foreach ($items as $k => $v) { echo $k; } if ($a) { 1; } elseif ($b) 2; else { 3; }",
        )
        .unwrap();
        assert!(matches!(program[0], Stmt::Foreach { key: Some(_), .. }));
        let Stmt::If { branches, otherwise } = &program[1] else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert!(otherwise.is_some());
    }

    #[test]
    fn test_for_loop_and_increment() {
        let program = parse("for ($i = 0; $i < 3; $i++) { echo $i; }").unwrap();
        let Stmt::For { init, cond, step, body } = &program[0] else {
            panic!("expected for");
        };
        assert_eq!((init.len(), cond.len(), step.len(), body.len()), (1, 1, 1, 1));
        assert!(matches!(step[0], Expr::IncDec { prefix: false, .. }));
    }

    #[test]
    fn test_missing_semicolon_between_statements() {
        let err = parse("1 2").unwrap_err();
        assert_eq!(err.category, "ParseError");
        assert!(err.message.contains("unexpected integer \"2\""));
    }

    #[test]
    fn test_unsupported_declarations() {
        assert!(parse("function f() {}").is_err());
        assert!(parse("class A {}").is_err());
    }

    #[test]
    fn test_class_constant() {
        assert_eq!(expr(r"\App\Models\User::class"), Expr::Lit(Value::str(r"App\Models\User")));
    }

    #[test]
    fn test_nesting_depth_is_capped() {
        let deep_parens = format!("{}1{}", "(".repeat(1_000), ")".repeat(1_000));
        let long_sum = format!("1{}", "+1".repeat(1_000));
        let long_index = format!("$a{}", "[0]".repeat(1_000));
        let deep_blocks = format!("{}1;{}", "{".repeat(1_000), "}".repeat(1_000));
        let negations = format!("{}true", "!".repeat(1_000));

        for source in [deep_parens, long_sum, long_index, deep_blocks, negations] {
            let err = parse(&source).unwrap_err();
            assert_eq!(err.category, "ParseError");
            assert_eq!(err.message, "Maximum nesting depth exceeded");
        }
    }

    #[test]
    fn test_nesting_within_cap_parses() {
        let parens = format!("{}1{}", "(".repeat(40), ")".repeat(40));
        assert_eq!(expr(&parens), Expr::Lit(Value::Int(1)));

        // Sibling expressions give their levels back.
        let siblings = vec![format!("({})", "1 + 1 + 1"); 200].join(", ");
        assert!(parse(&format!("f({});", siblings)).is_ok());
        let statements = "$x = (1 + 2) * 3;\n".repeat(500);
        assert!(parse(&statements).is_ok());
    }
}
