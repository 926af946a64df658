use std::str::FromStr;

use pest::iterators::Pairs;
use pest::pratt_parser::PrattParser;
use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;

use ptrack_core::models::TaskCategory;
use ptrack_core::query::{Comparison, Filter, Operator, Query};

#[derive(Parser)]
#[grammar = "filter.pest"]
pub struct FilterParser;

lazy_static::lazy_static! {
    static ref PRATT_PARSER: PrattParser<Rule> = {
        use pest::pratt_parser::{Assoc::*, Op};
        use Rule::*;

        PrattParser::new()
            .op(Op::infix(or, Left))
            .op(Op::infix(and, Left))
            .op(Op::prefix(not))
    };
}

#[derive(Error, Debug)]
pub enum QueryParseError {
    #[error("Pest parsing error: {0}")]
    Pest(#[from] Box<pest::error::Error<Rule>>),
    #[error("Invalid filter expression: {0}")]
    InvalidFilter(String),
    #[error("Unknown rule: {0:?}")]
    UnknownRule(Rule),
    #[error("Invalid category value: {0}")]
    InvalidCategory(String),
    #[error("Invalid priority value: {0}")]
    InvalidPriority(String),
    #[error("Invalid closed value: {0} (expected true or false)")]
    InvalidClosed(String),
}

fn parse_comparison(symbol: Option<&str>) -> Comparison {
    match symbol {
        Some("<") => Comparison::Lt,
        Some("<=") => Comparison::Le,
        Some(">") => Comparison::Gt,
        Some(">=") => Comparison::Ge,
        _ => Comparison::Eq,
    }
}

fn build_filter(pairs: Pairs<Rule>) -> Result<Filter, QueryParseError> {
    let mut key = None;
    let mut comparator = None;
    let mut value = None;
    for pair in pairs {
        match pair.as_rule() {
            Rule::key => key = Some(pair.as_str().to_lowercase()),
            Rule::comparator => comparator = Some(pair.as_str()),
            Rule::quoted | Rule::bare => value = Some(pair.as_str().trim_matches('"')),
            rule => return Err(QueryParseError::UnknownRule(rule)),
        }
    }
    let key = key.ok_or_else(|| QueryParseError::InvalidFilter("missing key".to_string()))?;
    let value = value.ok_or_else(|| QueryParseError::InvalidFilter(format!("missing value for '{}'", key)))?;

    if comparator.is_some() && key != "priority" {
        return Err(QueryParseError::InvalidFilter(format!(
            "Comparison operators only apply to priority, not '{}'",
            key
        )));
    }

    let filter = match key.as_str() {
        "category" => {
            let category = TaskCategory::from_str(value)
                .map_err(|_| QueryParseError::InvalidCategory(value.to_string()))?;
            Filter::Category(category)
        }
        "priority" => {
            let priority = value
                .parse::<i32>()
                .map_err(|_| QueryParseError::InvalidPriority(value.to_string()))?;
            Filter::Priority(parse_comparison(comparator), priority)
        }
        "assignee" => Filter::Assignee(value.to_string()),
        "name" => Filter::Name(value.to_string()),
        "milestone" => Filter::Milestone(value.to_string()),
        "closed" => match value.to_lowercase().as_str() {
            "true" | "yes" => Filter::Closed(true),
            "false" | "no" => Filter::Closed(false),
            _ => return Err(QueryParseError::InvalidClosed(value.to_string())),
        },
        _ => {
            return Err(QueryParseError::InvalidFilter(format!(
                "Unknown filter key: {}",
                key
            )))
        }
    };
    Ok(filter)
}

fn build_ast(pairs: Pairs<Rule>) -> Result<Query, QueryParseError> {
    PRATT_PARSER
        .map_primary(|primary| match primary.as_rule() {
            Rule::filter_expression => Ok(Query::Filter(build_filter(primary.into_inner())?)),
            Rule::expression => build_ast(primary.into_inner()),
            rule => Err(QueryParseError::UnknownRule(rule)),
        })
        .map_prefix(|op, rhs| {
            let op_rule = op.as_rule();
            match op_rule {
                Rule::not => Ok(Query::Not(Box::new(rhs?))),
                _ => Err(QueryParseError::UnknownRule(op_rule)),
            }
        })
        .map_infix(|lhs, op, rhs| {
            let op = match op.as_rule() {
                Rule::and => Operator::And,
                Rule::or => Operator::Or,
                rule => return Err(QueryParseError::UnknownRule(rule)),
            };
            Ok(Query::Binary {
                op,
                left: Box::new(lhs?),
                right: Box::new(rhs?),
            })
        })
        .parse(pairs)
}

/// Parses a filter query. A blank query selects everything and yields `None`.
pub fn parse_query(input: &str) -> Result<Option<Query>, QueryParseError> {
    let mut top = FilterParser::parse(Rule::filter_query, input).map_err(Box::new)?;
    let Some(query) = top.next() else {
        return Ok(None);
    };
    match query.into_inner().find(|p| p.as_rule() == Rule::expression) {
        Some(expression) => build_ast(expression.into_inner()).map(Some),
        None => Ok(None),
    }
}
