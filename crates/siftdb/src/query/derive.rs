use crate::{
    Error,
    error::ErrorClass,
    model::{EntityDescriptor, Registry},
    query::{
        page::{Direction, Sort},
        plan::{QueryHints, QueryPlan, Subject},
        predicate::{CompareOp, ComparePredicate, FieldRef, Operand, Predicate},
    },
};
use convert_case::{Case, Casing};
use thiserror::Error as ThisError;

///
/// DeriveError
///

#[derive(Debug, ThisError)]
#[remain::sorted]
pub enum DeriveError {
    #[error("field token is ambiguous on {entity}: {token}")]
    AmbiguousField { entity: String, token: String },

    #[error("unusable result limit: {token}")]
    BadLimit { token: String },

    #[error("dangling connector: {connector}")]
    DanglingConnector { connector: String },

    #[error("derived method name is empty")]
    Empty,

    #[error("ordering clause is empty")]
    EmptyOrder,

    #[error("derived method name has no 'by' separator")]
    MissingBy,

    #[error("operator '{operator}' has no field in front of it")]
    MissingField { operator: String },

    #[error("{subject} queries do not take an order_by clause")]
    OrderNotAllowed { subject: Subject },

    #[error("unknown field on {entity}: {token}")]
    UnknownField { entity: String, token: String },

    #[error("unknown query subject: {token}")]
    UnknownSubject { token: String },
}

impl DeriveError {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::AmbiguousField { .. } | Self::UnknownField { .. } => ErrorClass::Schema,
            _ => ErrorClass::Parse,
        }
    }
}

///
/// DerivedQuery
///
/// Parse result of a method-name query such as
/// `find_by_username_and_age_greater_than` or
/// `count_by_team_name_order_by_age_desc` (camelCase input is accepted
/// and normalised). Placeholders are positional, in source order;
/// `between` consumes two positions.
///

#[derive(Clone, Debug)]
pub struct DerivedQuery {
    pub subject: Subject,
    pub distinct: bool,
    pub limit: Option<u32>,
    pub predicate: Predicate,
    pub order: Sort,
    pub param_count: usize,
}

impl DerivedQuery {
    /// Parse a derived method name against an entity descriptor.
    /// Parsing is pure: the result depends only on the name and the
    /// registered schema.
    pub fn parse(registry: &Registry, entity: &EntityDescriptor, name: &str) -> Result<Self, Error> {
        Parser::new(registry, entity).parse(name)
    }

    /// Stage this query as an executable plan.
    #[must_use]
    pub fn into_plan(self, entity: &str) -> QueryPlan {
        QueryPlan {
            entity: entity.to_string(),
            subject: self.subject,
            predicate: self.predicate,
            order: self.order,
            page: None,
            limit: self.limit,
            offset: None,
            distinct: self.distinct,
            hints: QueryHints::default(),
        }
    }
}

/// Operator keywords, matched longest-suffix-first against condition
/// tokens. Order in this table is the match order.
const KEYWORDS: &[(&[&str], Keyword)] = &[
    (&["is", "not", "null"], Keyword::IsNotNull),
    (&["greater", "than", "equal"], Keyword::Gte),
    (&["less", "than", "equal"], Keyword::Lte),
    (&["greater", "than"], Keyword::Gt),
    (&["less", "than"], Keyword::Lt),
    (&["starting", "with"], Keyword::StartsWith),
    (&["ending", "with"], Keyword::EndsWith),
    (&["not", "null"], Keyword::IsNotNull),
    (&["is", "null"], Keyword::IsNull),
    (&["not", "in"], Keyword::NotIn),
    (&["between"], Keyword::Between),
    (&["containing"], Keyword::Contains),
    (&["like"], Keyword::Contains),
    (&["null"], Keyword::IsNull),
    (&["false"], Keyword::False),
    (&["true"], Keyword::True),
    (&["in"], Keyword::In),
    (&["not"], Keyword::Ne),
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Keyword {
    Between,
    Contains,
    EndsWith,
    Eq,
    False,
    Gt,
    Gte,
    In,
    IsNotNull,
    IsNull,
    Lt,
    Lte,
    Ne,
    NotIn,
    StartsWith,
    True,
}

struct Parser<'a> {
    registry: &'a Registry,
    entity: &'a EntityDescriptor,
    params: usize,
}

impl<'a> Parser<'a> {
    const fn new(registry: &'a Registry, entity: &'a EntityDescriptor) -> Self {
        Self {
            registry,
            entity,
            params: 0,
        }
    }

    fn parse(mut self, name: &str) -> Result<DerivedQuery, Error> {
        if name.is_empty() {
            return Err(DeriveError::Empty.into());
        }

        // Accept camelCase by normalising to the native snake_case form.
        let normalized = if name.is_case(Case::Snake) {
            name.to_string()
        } else {
            name.from_case(Case::Camel).to_case(Case::Snake)
        };
        let tokens: Vec<&str> = normalized.split('_').filter(|t| !t.is_empty()).collect();

        let Some((&head, rest)) = tokens.split_first() else {
            return Err(DeriveError::Empty.into());
        };
        let subject = match head {
            "find" | "read" | "get" | "query" => Subject::Find,
            "count" => Subject::Count,
            "exists" => Subject::Exists,
            "delete" | "remove" => Subject::Delete,
            _ => {
                return Err(DeriveError::UnknownSubject {
                    token: head.to_string(),
                }
                .into());
            }
        };

        // Modifier scan: distinct and top/first limits; everything else
        // before 'by' is a noise word.
        let mut distinct = false;
        let mut limit = None;
        let mut by_index = None;
        let mut i = 0;
        while i < rest.len() {
            let token = rest[i];
            if token == "by" {
                by_index = Some(i);
                break;
            }
            if token == "distinct" {
                distinct = true;
            } else if token == "top" || token == "first" {
                if let Some(next) = rest.get(i + 1).filter(|t| t.bytes().all(|b| b.is_ascii_digit())) {
                    limit = Some(parse_limit(next)?);
                    i += 1;
                } else {
                    limit = Some(1);
                }
            } else if let Some(digits) = strip_limit_prefix(token) {
                limit = Some(parse_limit(digits)?);
            }
            i += 1;
        }
        let Some(by_index) = by_index else {
            return Err(DeriveError::MissingBy.into());
        };

        let tail = &rest[by_index + 1..];
        let (predicate_tokens, order_tokens) = split_order_clause(tail);

        let predicate = self.parse_predicate(predicate_tokens)?;
        let order = self.parse_order(order_tokens)?;

        if !order.is_empty() && matches!(subject, Subject::Count | Subject::Exists) {
            return Err(DeriveError::OrderNotAllowed { subject }.into());
        }

        Ok(DerivedQuery {
            subject,
            distinct,
            limit,
            predicate,
            order,
            param_count: self.params,
        })
    }

    /// OR binds loosest; AND groups inside each OR segment.
    fn parse_predicate(&mut self, tokens: &[&str]) -> Result<Predicate, Error> {
        if tokens.is_empty() {
            return Ok(Predicate::True);
        }

        let mut or_groups = Vec::new();
        for or_segment in split_on(tokens, "or") {
            let mut and_group = Vec::new();
            for condition in split_on(or_segment, "and") {
                if condition.is_empty() {
                    return Err(DeriveError::DanglingConnector {
                        connector: "and/or".to_string(),
                    }
                    .into());
                }
                and_group.push(self.parse_condition(condition)?);
            }
            or_groups.push(match and_group.len() {
                1 => and_group.remove(0),
                _ => Predicate::And(and_group),
            });
        }

        Ok(match or_groups.len() {
            1 => or_groups.remove(0),
            _ => Predicate::Or(or_groups),
        })
    }

    fn parse_condition(&mut self, mut tokens: &[&str]) -> Result<Predicate, Error> {
        // ignore_case trails the operator keyword when present.
        let mut ignore_case = false;
        if tokens.ends_with(&["ignore", "case"]) {
            ignore_case = true;
            tokens = &tokens[..tokens.len() - 2];
        }
        if tokens.is_empty() {
            return Err(DeriveError::MissingField {
                operator: "ignore_case".to_string(),
            }
            .into());
        }

        let mut keyword = Keyword::Eq;
        for (suffix, kw) in KEYWORDS {
            if tokens.len() > suffix.len() && tokens.ends_with(suffix) {
                keyword = *kw;
                tokens = &tokens[..tokens.len() - suffix.len()];
                break;
            }
            // A keyword with no field tokens in front of it.
            if tokens.len() == suffix.len() && tokens == *suffix {
                return Err(DeriveError::MissingField {
                    operator: suffix.join("_"),
                }
                .into());
            }
        }

        let field = self.resolve_field(tokens)?;

        let compare = |field: FieldRef, op: CompareOp, operand: Operand, ci: bool| {
            let cmp = ComparePredicate::new(field, op, operand);
            Predicate::Compare(if ci { cmp.ignore_case() } else { cmp })
        };

        let predicate = match keyword {
            Keyword::Eq => compare(field, CompareOp::Eq, self.next_param(), ignore_case),
            Keyword::Ne => compare(field, CompareOp::Ne, self.next_param(), ignore_case),
            Keyword::Gt => compare(field, CompareOp::Gt, self.next_param(), ignore_case),
            Keyword::Gte => compare(field, CompareOp::Gte, self.next_param(), ignore_case),
            Keyword::Lt => compare(field, CompareOp::Lt, self.next_param(), ignore_case),
            Keyword::Lte => compare(field, CompareOp::Lte, self.next_param(), ignore_case),
            Keyword::In => compare(field, CompareOp::In, self.next_param(), ignore_case),
            Keyword::NotIn => compare(field, CompareOp::NotIn, self.next_param(), ignore_case),
            Keyword::Contains => compare(field, CompareOp::Contains, self.next_param(), ignore_case),
            Keyword::StartsWith => {
                compare(field, CompareOp::StartsWith, self.next_param(), ignore_case)
            }
            Keyword::EndsWith => compare(field, CompareOp::EndsWith, self.next_param(), ignore_case),
            Keyword::Between => {
                let low = self.next_param();
                let high = self.next_param();
                Predicate::And(vec![
                    Predicate::cmp(field.clone(), CompareOp::Gte, low),
                    Predicate::cmp(field, CompareOp::Lte, high),
                ])
            }
            Keyword::IsNull => Predicate::IsNull { field },
            Keyword::IsNotNull => Predicate::IsNotNull { field },
            Keyword::True => compare(field, CompareOp::Eq, Operand::value(true), false),
            Keyword::False => compare(field, CompareOp::Eq, Operand::value(false), false),
        };

        Ok(predicate)
    }

    fn parse_order(&self, tokens: &[&str]) -> Result<Sort, Error> {
        if tokens.is_empty() {
            return Ok(Sort::none());
        }

        let mut sort = Sort::none();
        let mut acc: Vec<&str> = Vec::new();
        for &token in tokens {
            if token == "asc" || token == "desc" {
                if acc.is_empty() {
                    return Err(DeriveError::EmptyOrder.into());
                }
                let field = self.resolve_field(&acc)?;
                let direction = if token == "asc" {
                    Direction::Asc
                } else {
                    Direction::Desc
                };
                sort = sort.and(field, direction);
                acc.clear();
            } else {
                acc.push(token);
            }
        }
        if !acc.is_empty() {
            let field = self.resolve_field(&acc)?;
            sort = sort.and(field, Direction::Asc);
        }
        if sort.is_empty() {
            return Err(DeriveError::EmptyOrder.into());
        }

        Ok(sort)
    }

    /// Longest-field-first resolution: a declared field wins outright;
    /// otherwise the token list may split once into relation + target
    /// field. More than one viable split is ambiguous.
    fn resolve_field(&self, tokens: &[&str]) -> Result<FieldRef, Error> {
        let raw = tokens.join("_");
        if self.entity.has_field(&raw) {
            return Ok(FieldRef::Field(raw));
        }

        let mut candidates = Vec::new();
        for split in 1..tokens.len() {
            let relation = tokens[..split].join("_");
            let field = tokens[split..].join("_");
            let Ok(rel) = self.entity.relation(&relation) else {
                continue;
            };
            let Ok(target) = self.registry.entity(&rel.target) else {
                continue;
            };
            if target.has_field(&field) {
                candidates.push(FieldRef::Related { relation, field });
            }
        }

        match candidates.len() {
            0 => Err(DeriveError::UnknownField {
                entity: self.entity.name.clone(),
                token: raw,
            }
            .into()),
            1 => Ok(candidates.remove(0)),
            _ => Err(DeriveError::AmbiguousField {
                entity: self.entity.name.clone(),
                token: raw,
            }
            .into()),
        }
    }

    fn next_param(&mut self) -> Operand {
        let operand = Operand::param(self.params);
        self.params += 1;
        operand
    }
}

/// Split `tokens` on a connector token; segments keep their order.
fn split_on<'t>(tokens: &'t [&'t str], connector: &str) -> Vec<&'t [&'t str]> {
    let mut segments = Vec::new();
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        if *token == connector {
            segments.push(&tokens[start..i]);
            start = i + 1;
        }
    }
    segments.push(&tokens[start..]);
    segments
}

/// Split the token tail at the last `order by` marker.
fn split_order_clause<'t>(tokens: &'t [&'t str]) -> (&'t [&'t str], &'t [&'t str]) {
    let mut marker = None;
    for i in 0..tokens.len().saturating_sub(1) {
        if tokens[i] == "order" && tokens[i + 1] == "by" {
            marker = Some(i);
        }
    }

    match marker {
        Some(i) => (&tokens[..i], &tokens[i + 2..]),
        None => (tokens, &[]),
    }
}

/// `top3` / `first2` forms with the count embedded in the token.
fn strip_limit_prefix(token: &str) -> Option<&str> {
    let digits = token
        .strip_prefix("top")
        .or_else(|| token.strip_prefix("first"))?;
    (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())).then_some(digits)
}

fn parse_limit(digits: &str) -> Result<u32, Error> {
    match digits.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(DeriveError::BadLimit {
            token: digits.to_string(),
        }
        .into()),
    }
}
