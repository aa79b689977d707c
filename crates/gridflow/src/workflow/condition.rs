use nom::branch::alt;
use nom::bytes::complete::{tag, take_till};
use nom::character::complete::char;
use nom::combinator::{all_consuming, map, opt};
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded};
use serde_json::Value;

use crate::common::error::{user_error, GridError};
use crate::common::parser::{format_parse_error, p_ident, p_number, ws, NomResult};
use crate::workflow::context::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn check(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering;
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Bool(bool),
    Number(f64),
    Str(String),
}

/// Condition evaluated over the global and local execution contexts before a
/// transition fires. The local context shadows the global one.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Constant(bool),
    /// A bare boolean variable reference.
    Variable(String),
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Compare {
        variable: String,
        op: CompareOp,
        operand: Operand,
    },
}

impl Condition {
    /// Parses expressions such as `done && !failed || count >= 10`.
    pub fn parse(input: &str) -> crate::Result<Condition> {
        match all_consuming(ws(p_or))(input) {
            Ok((_, condition)) => Ok(condition),
            Err(error) => Err(GridError::UserConfiguration(format!(
                "invalid condition '{input}': {}",
                format_parse_error(error)
            ))),
        }
    }

    pub fn evaluate(&self, global: &Context, local: &Context) -> crate::Result<bool> {
        match self {
            Condition::Constant(value) => Ok(*value),
            Condition::Variable(name) => match lookup(global, local, name)? {
                Value::Bool(value) => Ok(*value),
                other => user_error(format!(
                    "variable '{name}' is not a boolean, found {other}"
                )),
            },
            Condition::Not(inner) => Ok(!inner.evaluate(global, local)?),
            Condition::And(left, right) => {
                Ok(left.evaluate(global, local)? && right.evaluate(global, local)?)
            }
            Condition::Or(left, right) => {
                Ok(left.evaluate(global, local)? || right.evaluate(global, local)?)
            }
            Condition::Compare {
                variable,
                op,
                operand,
            } => compare(lookup(global, local, variable)?, variable, *op, operand),
        }
    }
}

fn lookup<'a>(global: &'a Context, local: &'a Context, name: &str) -> crate::Result<&'a Value> {
    local
        .get(name)
        .or_else(|| global.get(name))
        .ok_or_else(|| {
            GridError::UserConfiguration(format!(
                "variable '{name}' is not defined in the execution context"
            ))
        })
}

fn compare(value: &Value, variable: &str, op: CompareOp, operand: &Operand) -> crate::Result<bool> {
    match (value, operand) {
        (Value::Number(number), Operand::Number(expected)) => {
            let Some(actual) = number.as_f64() else {
                return user_error(format!("variable '{variable}' is not a finite number"));
            };
            match actual.partial_cmp(expected) {
                Some(ordering) => Ok(op.check(ordering)),
                None => user_error(format!("variable '{variable}' cannot be ordered")),
            }
        }
        (Value::String(actual), Operand::Str(expected)) => {
            Ok(op.check(actual.as_str().cmp(expected.as_str())))
        }
        (Value::Bool(actual), Operand::Bool(expected)) => match op {
            CompareOp::Eq => Ok(actual == expected),
            CompareOp::Ne => Ok(actual != expected),
            _ => user_error(format!(
                "variable '{variable}' is a boolean and cannot be ordered"
            )),
        },
        (value, operand) => user_error(format!(
            "cannot compare variable '{variable}' ({value}) with {operand:?}"
        )),
    }
}

fn p_or(input: &str) -> NomResult<Condition> {
    let (input, first) = p_and(input)?;
    let (input, rest) = many0(preceded(ws(tag("||")), p_and))(input)?;
    Ok((input, fold_binary(first, rest, Condition::Or)))
}

fn p_and(input: &str) -> NomResult<Condition> {
    let (input, first) = p_unary(input)?;
    let (input, rest) = many0(preceded(ws(tag("&&")), p_unary))(input)?;
    Ok((input, fold_binary(first, rest, Condition::And)))
}

fn fold_binary(
    first: Condition,
    rest: Vec<Condition>,
    combine: fn(Box<Condition>, Box<Condition>) -> Condition,
) -> Condition {
    rest.into_iter()
        .fold(first, |acc, next| combine(Box::new(acc), Box::new(next)))
}

fn p_unary(input: &str) -> NomResult<Condition> {
    alt((
        map(preceded(ws(char('!')), p_unary), |inner| {
            Condition::Not(Box::new(inner))
        }),
        p_primary,
    ))(input)
}

fn p_primary(input: &str) -> NomResult<Condition> {
    alt((
        delimited(ws(char('(')), p_or, ws(char(')'))),
        p_variable_or_comparison,
    ))(input)
}

fn p_variable_or_comparison(input: &str) -> NomResult<Condition> {
    let (input, name) = ws(p_ident)(input)?;
    match name {
        "true" => return Ok((input, Condition::Constant(true))),
        "false" => return Ok((input, Condition::Constant(false))),
        _ => {}
    }
    let (input, comparison) = opt(pair(ws(p_compare_op), ws(p_operand)))(input)?;
    let condition = match comparison {
        Some((op, operand)) => Condition::Compare {
            variable: name.to_string(),
            op,
            operand,
        },
        None => Condition::Variable(name.to_string()),
    };
    Ok((input, condition))
}

fn p_compare_op(input: &str) -> NomResult<CompareOp> {
    alt((
        map(tag("=="), |_| CompareOp::Eq),
        map(tag("!="), |_| CompareOp::Ne),
        map(tag("<="), |_| CompareOp::Le),
        map(tag(">="), |_| CompareOp::Ge),
        map(tag("<"), |_| CompareOp::Lt),
        map(tag(">"), |_| CompareOp::Gt),
    ))(input)
}

fn p_operand(input: &str) -> NomResult<Operand> {
    alt((
        map(tag("true"), |_| Operand::Bool(true)),
        map(tag("false"), |_| Operand::Bool(false)),
        map(
            delimited(char('"'), take_till(|c| c == '"'), char('"')),
            |value: &str| Operand::Str(value.to_string()),
        ),
        map(p_number, Operand::Number),
    ))(input)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::tests::utils::context_of;
    use crate::workflow::condition::{CompareOp, Condition, Operand};
    use crate::workflow::context::Context;
    use crate::Error;

    fn evaluate(input: &str, local: &Context) -> crate::Result<bool> {
        Condition::parse(input).and_then(|c| c.evaluate(&Context::new(), local))
    }

    #[test]
    fn test_parse_comparison() {
        let condition = Condition::parse("count >= 10").unwrap();
        assert_eq!(
            condition,
            Condition::Compare {
                variable: "count".to_string(),
                op: CompareOp::Ge,
                operand: Operand::Number(10.0),
            }
        );
    }

    #[test]
    fn test_parse_precedence() {
        // `&&` binds tighter than `||`
        let condition = Condition::parse("a || b && c").unwrap();
        match condition {
            Condition::Or(left, right) => {
                assert_eq!(*left, Condition::Variable("a".to_string()));
                assert!(matches!(*right, Condition::And(_, _)));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for input in ["", "x >=", "&& y", "x == ,", "(x"] {
            let error = Condition::parse(input).unwrap_err();
            assert!(matches!(error, Error::UserConfiguration(_)), "{input}");
        }
    }

    #[test]
    fn test_evaluate_comparisons() {
        let local = context_of(&[
            ("count", json!(12)),
            ("label", json!("batch-7")),
            ("done", json!(true)),
        ]);
        assert!(evaluate("count >= 10", &local).unwrap());
        assert!(!evaluate("count < 10", &local).unwrap());
        assert!(evaluate("label == \"batch-7\"", &local).unwrap());
        assert!(evaluate("label != \"batch-8\"", &local).unwrap());
        assert!(evaluate("done == true", &local).unwrap());
        assert!(evaluate("done && count > 0", &local).unwrap());
        assert!(evaluate("!done || count > 100 || label < \"c\"", &local).unwrap());
    }

    #[test]
    fn test_local_context_shadows_global() {
        let mut global = Context::new();
        global.insert("x", json!(1));
        let local = context_of(&[("x", json!(5))]);
        let condition = Condition::parse("x == 5").unwrap();
        assert!(condition.evaluate(&global, &local).unwrap());
        // Variables only present globally stay visible
        let condition = Condition::parse("x >= 1").unwrap();
        assert!(condition.evaluate(&global, &Context::new()).unwrap());
    }

    #[test]
    fn test_missing_variable_is_a_user_error() {
        let error = evaluate("ghost == 1", &Context::new()).unwrap_err();
        assert!(matches!(error, Error::UserConfiguration(_)));
    }

    #[test]
    fn test_type_mismatch_is_a_user_error() {
        let local = context_of(&[("flag", json!(true))]);
        let error = evaluate("flag > true", &local).unwrap_err();
        assert!(matches!(error, Error::UserConfiguration(_)));
        let error = evaluate("flag == 3", &local).unwrap_err();
        assert!(matches!(error, Error::UserConfiguration(_)));
    }
}
