//! Data filter compiler (spec §4.1). Compiles a named comparison-expression
//! filter into an in-memory predicate and an equivalent SQL clause.
//!
//! Grounded on `CacheDataFilter.cpp` (predicate evaluation and the
//! AND-term-reordering tie-break) and `SQLDataFilter.cpp` (SQL emission).

use std::collections::HashMap;

use crate::error::{ObsCacheError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl Comparison {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "lt" => Ok(Comparison::Lt),
            "le" => Ok(Comparison::Le),
            "eq" => Ok(Comparison::Eq),
            "ge" => Ok(Comparison::Ge),
            "gt" => Ok(Comparison::Gt),
            other => Err(ObsCacheError::InvalidFilterSyntax(other.to_string())),
        }
    }

    fn apply(self, value: i64, bound: i64) -> bool {
        match self {
            Comparison::Lt => value < bound,
            Comparison::Le => value <= bound,
            Comparison::Eq => value == bound,
            Comparison::Ge => value >= bound,
            Comparison::Gt => value > bound,
        }
    }

    fn sql_op(self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Eq => "=",
            Comparison::Ge => ">=",
            Comparison::Gt => ">",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Join {
    And,
    Or,
}

impl Join {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "AND" => Ok(Join::And),
            "OR" => Ok(Join::Or),
            other => Err(ObsCacheError::InvalidFilterSyntax(other.to_string())),
        }
    }
}

/// One comparison term within a sub-expression, with the join operator that
/// combines it with the running accumulator.
#[derive(Debug, Clone, Copy)]
struct Term {
    value: i64,
    cmp: Comparison,
    join: Join,
}

/// One parsed sub-expression, in request order. A bare value, a single
/// comparison, or an OR pair all stand alone; an AND pair stays grouped.
#[derive(Debug, Clone, Copy)]
enum Group {
    Single(Term),
    And(Term, Term),
}

impl Group {
    fn sql(&self, column: &str) -> String {
        match self {
            Group::Single(t) => format!("({column} {} {})", t.cmp.sql_op(), t.value),
            Group::And(t1, t2) => format!(
                "({column} {} {} AND {column} {} {})",
                t1.cmp.sql_op(),
                t1.value,
                t2.cmp.sql_op(),
                t2.value
            ),
        }
    }
}

/// One named filter's compiled sub-expressions, kept two ways: `terms` has
/// AND-joined pairs moved to the front of the list (mirrors the original's
/// `std::list::push_front` trick) so `valueOK`'s single left-to-right fold
/// starts its accumulator seeded correctly: `true` if the first term is AND,
/// `false` if OR. `groups` keeps the same sub-expressions in request order,
/// unmodified, for SQL emission (the original kept a separate raw-order list
/// for this in `SQLDataFilter.cpp` rather than reusing `valueOK`'s list).
#[derive(Debug, Clone, Default)]
struct CompiledFilter {
    terms: Vec<Term>,
    groups: Vec<Group>,
}

impl CompiledFilter {
    fn push_subexpression(&mut self, text: &str) -> Result<()> {
        let parts: Vec<&str> = text.split_whitespace().collect();
        match parts.len() {
            1 => {
                let value = parse_i64(parts[0])?;
                let term = Term {
                    value,
                    cmp: Comparison::Eq,
                    join: Join::Or,
                };
                self.terms.push(term);
                self.groups.push(Group::Single(term));
            }
            2 => {
                let cmp = Comparison::parse(parts[0])?;
                let value = parse_i64(parts[1])?;
                let term = Term { value, cmp, join: Join::Or };
                self.terms.push(term);
                self.groups.push(Group::Single(term));
            }
            5 => {
                let cmp1 = Comparison::parse(parts[0])?;
                let val1 = parse_i64(parts[1])?;
                let join = Join::parse(parts[2])?;
                let cmp2 = Comparison::parse(parts[3])?;
                let val2 = parse_i64(parts[4])?;
                let term1 = Term { value: val1, cmp: cmp1, join };
                let term2 = Term { value: val2, cmp: cmp2, join };
                if join == Join::And {
                    // Keep AND terms at the front so valueOK's fold works correctly.
                    self.terms.insert(0, term2);
                    self.terms.insert(0, term1);
                    self.groups.push(Group::And(term1, term2));
                } else {
                    self.terms.push(term1);
                    self.terms.push(term2);
                    self.groups.push(Group::Single(term1));
                    self.groups.push(Group::Single(term2));
                }
            }
            _ => return Err(ObsCacheError::InvalidFilterSyntax(text.to_string())),
        }
        Ok(())
    }

    fn value_ok(&self, value: i64) -> bool {
        if self.terms.is_empty() {
            return true;
        }
        let mut result = self.terms[0].join == Join::And;
        for term in &self.terms {
            let flag = term.cmp.apply(value, term.value);
            match term.join {
                Join::And => result &= flag,
                Join::Or => result |= flag,
            }
        }
        result
    }

    /// One parenthesised clause per sub-expression, in request order, joined
    /// with ` OR ` (the outer connective).
    fn sql_clause(&self, column: &str) -> String {
        self.groups.iter().map(|g| g.sql(column)).collect::<Vec<_>>().join(" OR ")
    }
}

fn parse_i64(s: &str) -> Result<i64> {
    s.parse::<i64>()
        .map_err(|_| ObsCacheError::InvalidFilterSyntax(s.to_string()))
}

/// Compiled filter map keyed by parameter name (e.g. `"data_quality"`).
#[derive(Debug, Clone, Default)]
pub struct DataFilter {
    filters: HashMap<String, CompiledFilter>,
}

impl DataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and install a filter for `name`. `value` is a comma-separated
    /// list of sub-expressions (implicit OR), e.g. `"1,3,ge 5 AND lt 9,11"`.
    pub fn set_data_filter(&mut self, name: &str, value: &str) -> Result<()> {
        let mut compiled = CompiledFilter::default();
        for part in value.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(ObsCacheError::InvalidFilterSyntax(value.to_string()));
            }
            compiled.push_subexpression(part)?;
        }
        self.filters.insert(name.to_string(), compiled);
        Ok(())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// A missing filter for `name` is considered satisfying (spec §4.1).
    pub fn value_ok(&self, name: &str, value: i64) -> bool {
        match self.filters.get(name) {
            Some(f) => f.value_ok(value),
            None => true,
        }
    }

    /// SQL WHERE-clause fragment for `name` against `column`, or `None` if no
    /// filter is installed for that name.
    pub fn sql_clause(&self, name: &str, column: &str) -> Option<String> {
        self.filters.get(name).map(|f| f.sql_clause(column))
    }
}
