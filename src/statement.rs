//! CQL statement sniffing using nom.
//!
//! Only what the driver needs to decode a reply: the statement kind, the
//! column family it targets and, for SELECT, the shape of the projection.
//! Everything after the target name is left to the server.
//!
//! ```text
//! SELECT name, age FROM 'users' WHERE KEY = 'k'
//! ─┬────  ────┬────      ──┬──  ───────┬──────
//!  │          │            │           └── ignored
//!  │          │            └── table (optionally quoted)
//!  │          └── projection
//!  └── kind
//! ```

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, tag_no_case, take_while1},
    character::complete::{anychar, char, multispace0, multispace1},
    combinator::{opt, recognize},
    multi::{many0, many_till},
    sequence::{delimited, preceded, tuple},
    IResult,
};

use crate::error::{CqlError, CqlResult};

/// Leading keyword of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Batch,
    Use,
    Create,
    Drop,
    Alter,
    Truncate,
    Other,
}

/// What a SELECT asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// `*`
    All,
    /// `COUNT(...)`
    Count,
    /// Explicit list, kept as written (ranges and FIRST clauses included).
    Columns(Vec<String>),
}

/// Structured view of a CQL statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub kind: StatementKind,
    /// Column family (or keyspace, for USE) the statement targets.
    pub table: Option<String>,
    /// Only set for SELECT.
    pub projection: Option<Projection>,
}

impl Statement {
    /// Parse a bound CQL string.
    ///
    /// SELECT statements must name their column family; other kinds parse
    /// with `table = None` when the target is not recognised.
    pub fn parse(cql: &str) -> CqlResult<Statement> {
        let input = cql.trim_start();
        let kind = leading_kind(input);

        match kind {
            StatementKind::Select => match parse_select(input) {
                Ok((_, (projection, table))) => Ok(Statement {
                    kind,
                    table: Some(table.to_string()),
                    projection: Some(projection_of(&projection)),
                }),
                Err(_) => Err(CqlError::Statement(format!(
                    "cannot find column family in SELECT: {}",
                    cql
                ))),
            },
            _ => {
                let table = match kind {
                    StatementKind::Insert => parse_insert(input).ok(),
                    StatementKind::Update => parse_update(input).ok(),
                    StatementKind::Delete => parse_delete(input).ok(),
                    StatementKind::Truncate => parse_keyword_target("truncate", input).ok(),
                    StatementKind::Use => parse_keyword_target("use", input).ok(),
                    _ => None,
                };
                Ok(Statement {
                    kind,
                    table: table.map(|(_, t)| t.to_string()),
                    projection: None,
                })
            }
        }
    }

    /// True for `SELECT COUNT(...)`.
    pub fn is_count(&self) -> bool {
        matches!(self.projection, Some(Projection::Count))
    }

    /// Number of explicitly projected columns, if the SELECT lists them.
    pub fn projected_count(&self) -> Option<usize> {
        match &self.projection {
            Some(Projection::Columns(cols)) => Some(cols.len()),
            _ => None,
        }
    }
}

fn leading_kind(input: &str) -> StatementKind {
    let word: String = input
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_lowercase();
    match word.as_str() {
        "select" => StatementKind::Select,
        "insert" => StatementKind::Insert,
        "update" => StatementKind::Update,
        "delete" => StatementKind::Delete,
        "begin" | "apply" => StatementKind::Batch,
        "use" => StatementKind::Use,
        "create" => StatementKind::Create,
        "drop" => StatementKind::Drop,
        "alter" => StatementKind::Alter,
        "truncate" => StatementKind::Truncate,
        _ => StatementKind::Other,
    }
}

/// Column family / keyspace name, optionally quoted.
fn parse_name(input: &str) -> IResult<&str, &str> {
    let (input, _) = opt(alt((char('\''), char('"'))))(input)?;
    take_while1(|c: char| c.is_alphanumeric() || c == '_')(input)
}

/// `FROM` surrounded by whitespace.
fn from_keyword(input: &str) -> IResult<&str, ()> {
    let (input, _) = tuple((multispace1, tag_no_case("from"), multispace1))(input)?;
    Ok((input, ()))
}

/// A whole `'...'` literal (`''` escapes a quote) or a single character.
fn scan_piece(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(delimited(
            char('\''),
            many0(alt((tag("''"), is_not("'")))),
            char('\''),
        )),
        recognize(anychar),
    ))(input)
}

/// Everything up to the first `FROM` outside a string literal.
fn until_from(input: &str) -> IResult<&str, String> {
    let (input, (pieces, _)) = many_till(scan_piece, from_keyword)(input)?;
    Ok((input, pieces.concat()))
}

/// SELECT <projection> FROM <name>
fn parse_select(input: &str) -> IResult<&str, (String, &str)> {
    let (input, _) = multispace0(input)?;
    let (input, _) = tag_no_case("select")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, projection) = until_from(input)?;
    let (input, table) = parse_name(input)?;
    Ok((input, (projection, table)))
}

/// INSERT INTO <name>
fn parse_insert(input: &str) -> IResult<&str, &str> {
    let (input, _) = tag_no_case("insert")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, _) = tag_no_case("into")(input)?;
    preceded(multispace1, parse_name)(input)
}

/// UPDATE <name>
fn parse_update(input: &str) -> IResult<&str, &str> {
    let (input, _) = tag_no_case("update")(input)?;
    preceded(multispace1, parse_name)(input)
}

/// DELETE [columns] FROM <name>
fn parse_delete(input: &str) -> IResult<&str, &str> {
    let (input, _) = tag_no_case("delete")(input)?;
    let (input, _) = until_from(input)?;
    parse_name(input)
}

/// <keyword> <name>, for TRUNCATE and USE.
fn parse_keyword_target<'a>(keyword: &'static str, input: &'a str) -> IResult<&'a str, &'a str> {
    let (input, _) = tag_no_case(keyword)(input)?;
    preceded(multispace1, parse_name)(input)
}

fn projection_of(raw: &str) -> Projection {
    let trimmed = raw.trim();
    if trimmed.to_ascii_lowercase().contains("count(") {
        return Projection::Count;
    }
    if trimmed == "*" {
        return Projection::All;
    }
    Projection::Columns(
        trimmed
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_select_star() {
        let stmt = Statement::parse("SELECT * FROM users WHERE KEY='k'").unwrap();
        assert_eq!(stmt.kind, StatementKind::Select);
        assert_eq!(stmt.table.as_deref(), Some("users"));
        assert_eq!(stmt.projection, Some(Projection::All));
    }

    #[test]
    fn test_select_case_insensitive_quoted_name() {
        let stmt = Statement::parse("  select name, age\n from 'Users_2' where KEY = 'a'").unwrap();
        assert_eq!(stmt.table.as_deref(), Some("Users_2"));
        assert_eq!(stmt.projected_count(), Some(2));
        assert_eq!(
            stmt.projection,
            Some(Projection::Columns(vec!["name".into(), "age".into()]))
        );
    }

    #[test]
    fn test_select_count() {
        let stmt = Statement::parse("SELECT COUNT(*) FROM events WHERE KEY='x'").unwrap();
        assert!(stmt.is_count());
        assert_eq!(stmt.table.as_deref(), Some("events"));
    }

    #[test]
    fn test_select_first_from_wins() {
        let stmt = Statement::parse("SELECT 'from' FROM cf WHERE KEY='from x'").unwrap();
        assert_eq!(stmt.table.as_deref(), Some("cf"));
    }

    #[test]
    fn test_from_inside_bound_literal_is_skipped() {
        let cql = crate::bind::bind(
            "SELECT ? FROM users WHERE KEY=?",
            &["a from ghost".into(), "k".into()],
        )
        .unwrap();
        let stmt = Statement::parse(&cql).unwrap();
        assert_eq!(stmt.table.as_deref(), Some("users"));
        assert_eq!(
            stmt.projection,
            Some(Projection::Columns(vec!["'a from ghost'".into()]))
        );

        let stmt = Statement::parse("SELECT 'it''s from x', b FROM cf").unwrap();
        assert_eq!(stmt.table.as_deref(), Some("cf"));
        assert_eq!(stmt.projected_count(), Some(2));

        let stmt = Statement::parse("DELETE ' from ghost' FROM cf WHERE KEY='k'").unwrap();
        assert_eq!(stmt.table.as_deref(), Some("cf"));
    }

    #[test]
    fn test_select_without_from_is_error() {
        let err = Statement::parse("SELECT *").unwrap_err();
        assert!(matches!(err, CqlError::Statement(_)));
    }

    #[test]
    fn test_mutation_targets() {
        let stmt = Statement::parse("INSERT INTO cf (KEY, a) VALUES ('k', 'v')").unwrap();
        assert_eq!(stmt.kind, StatementKind::Insert);
        assert_eq!(stmt.table.as_deref(), Some("cf"));

        let stmt = Statement::parse("UPDATE cf SET a='b' WHERE KEY='k'").unwrap();
        assert_eq!(stmt.table.as_deref(), Some("cf"));

        let stmt = Statement::parse("DELETE a, b FROM cf WHERE KEY='k'").unwrap();
        assert_eq!(stmt.kind, StatementKind::Delete);
        assert_eq!(stmt.table.as_deref(), Some("cf"));

        let stmt = Statement::parse("truncate cf").unwrap();
        assert_eq!(stmt.table.as_deref(), Some("cf"));
    }

    #[test]
    fn test_other_statements_parse_without_target() {
        let stmt = Statement::parse("CREATE KEYSPACE ks WITH strategy_class = SimpleStrategy").unwrap();
        assert_eq!(stmt.kind, StatementKind::Create);
        assert_eq!(stmt.table, None);
        assert_eq!(stmt.projection, None);
    }
}
