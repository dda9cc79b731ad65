//! Filter language: conditions on one property, composed into trees.
//!
//! A [`Condition`] names a property and a comparator; conditions and
//! user-supplied predicates compose into a [`FilterExpr`] with `&`, `|`,
//! and `!` (Rust cannot overload the short-circuiting `&&`/`||`, but
//! evaluation still short-circuits).
//!
//! A bare `Condition::new(p)` tests "p is present"; its negation
//! `!Condition::new(p)` is the null test, kept for notational symmetry
//! with the comparator-less leaf.

use std::cmp::Ordering;
use std::ops::{BitAnd, BitOr, Not};
use std::sync::Arc;

use regex::Regex;

use crate::model::{Bytes, PropertyType, PropertyTypeMap, Record};
use crate::{Error, Result};

// ============================================================================
// Condition
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Comparator {
    /// Bare leaf: property is present (non-null).
    NotNull,
    Null,
    Eq(Bytes),
    Lt(Bytes),
    Le(Bytes),
    Gt(Bytes),
    Ge(Bytes),
    Contain(Bytes),
    BeginWith(Bytes),
    EndWith(Bytes),
    Like(Bytes),
    Regex(Bytes),
    Between { lo: Bytes, hi: Bytes, bounds: (bool, bool) },
    In(Vec<Bytes>),
}

/// One leaf filter: a property name, a comparator, and modifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub(crate) prop: String,
    pub(crate) comparator: Comparator,
    pub(crate) negated: bool,
    pub(crate) ignore_case: bool,
}

impl Condition {
    pub fn new(prop: impl Into<String>) -> Self {
        Self {
            prop: prop.into(),
            comparator: Comparator::NotNull,
            negated: false,
            ignore_case: false,
        }
    }

    fn with(mut self, comparator: Comparator) -> Self {
        self.comparator = comparator;
        self
    }

    /// Property is absent from the record.
    pub fn null(self) -> Self {
        self.with(Comparator::Null)
    }

    pub fn eq(self, value: impl Into<Bytes>) -> Self {
        self.with(Comparator::Eq(value.into()))
    }

    pub fn lt(self, value: impl Into<Bytes>) -> Self {
        self.with(Comparator::Lt(value.into()))
    }

    pub fn le(self, value: impl Into<Bytes>) -> Self {
        self.with(Comparator::Le(value.into()))
    }

    pub fn gt(self, value: impl Into<Bytes>) -> Self {
        self.with(Comparator::Gt(value.into()))
    }

    pub fn ge(self, value: impl Into<Bytes>) -> Self {
        self.with(Comparator::Ge(value.into()))
    }

    pub fn contain(self, value: impl Into<Bytes>) -> Self {
        self.with(Comparator::Contain(value.into()))
    }

    pub fn begin_with(self, value: impl Into<Bytes>) -> Self {
        self.with(Comparator::BeginWith(value.into()))
    }

    pub fn end_with(self, value: impl Into<Bytes>) -> Self {
        self.with(Comparator::EndWith(value.into()))
    }

    /// SQL `LIKE` pattern: `%` matches any run, `_` one character.
    pub fn like(self, pattern: impl Into<Bytes>) -> Self {
        self.with(Comparator::Like(pattern.into()))
    }

    pub fn regex(self, pattern: impl Into<Bytes>) -> Self {
        self.with(Comparator::Regex(pattern.into()))
    }

    /// Closed/open range; `bounds` toggles (lower, upper) inclusivity.
    pub fn between(
        self,
        lo: impl Into<Bytes>,
        hi: impl Into<Bytes>,
        bounds: (bool, bool),
    ) -> Self {
        self.with(Comparator::Between { lo: lo.into(), hi: hi.into(), bounds })
    }

    pub fn in_values<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bytes>,
    {
        self.with(Comparator::In(values.into_iter().map(Into::into).collect()))
    }

    /// Case-insensitive text comparison: both sides lowercase first.
    pub fn ignore_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    /// Evaluate against one record. `types` interprets raw property bytes;
    /// a property missing from the record reads as null.
    pub fn execute(&self, record: &Record, types: &PropertyTypeMap) -> Result<bool> {
        let outcome = self.evaluate(record, types)?;
        Ok(outcome != self.negated)
    }

    fn evaluate(&self, record: &Record, types: &PropertyTypeMap) -> Result<bool> {
        let value = record.get(&self.prop);
        match &self.comparator {
            Comparator::Null => return Ok(value.is_none()),
            Comparator::NotNull => return Ok(value.is_some()),
            _ => {}
        }
        let Some(value) = value else {
            // Missing property: every typed comparison is null-ish false.
            return Ok(false);
        };
        let Some(&ty) = types.get(&self.prop) else {
            return Ok(false);
        };

        match &self.comparator {
            Comparator::Null | Comparator::NotNull => unreachable!("handled above"),
            Comparator::Eq(rhs) => Ok(self.compare(value, rhs, ty)? == Ordering::Equal),
            Comparator::Lt(rhs) => Ok(self.compare(value, rhs, ty)? == Ordering::Less),
            Comparator::Le(rhs) => Ok(self.compare(value, rhs, ty)? != Ordering::Greater),
            Comparator::Gt(rhs) => Ok(self.compare(value, rhs, ty)? == Ordering::Greater),
            Comparator::Ge(rhs) => Ok(self.compare(value, rhs, ty)? != Ordering::Less),
            Comparator::Between { lo, hi, bounds } => {
                let lo_ord = self.compare(value, lo, ty)?;
                let hi_ord = self.compare(value, hi, ty)?;
                let above = lo_ord == Ordering::Greater || (bounds.0 && lo_ord == Ordering::Equal);
                let below = hi_ord == Ordering::Less || (bounds.1 && hi_ord == Ordering::Equal);
                Ok(above && below)
            }
            Comparator::In(set) => {
                for rhs in set {
                    if self.compare(value, rhs, ty)? == Ordering::Equal {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Comparator::Contain(rhs) => {
                let (v, p) = self.text_pair(value, rhs, ty)?;
                Ok(v.contains(&p))
            }
            Comparator::BeginWith(rhs) => {
                let (v, p) = self.text_pair(value, rhs, ty)?;
                Ok(v.starts_with(&p))
            }
            Comparator::EndWith(rhs) => {
                let (v, p) = self.text_pair(value, rhs, ty)?;
                Ok(v.ends_with(&p))
            }
            Comparator::Like(rhs) => {
                let (v, p) = self.text_pair_raw(value, rhs, ty)?;
                let re = like_to_regex(&p, self.ignore_case)?;
                Ok(re.is_match(&v))
            }
            Comparator::Regex(rhs) => {
                let (v, p) = self.text_pair_raw(value, rhs, ty)?;
                let pattern = if self.ignore_case { format!("(?i){p}") } else { p };
                let re = Regex::new(&pattern).map_err(|_| Error::InvalidComparator)?;
                Ok(re.is_match(&v))
            }
        }
    }

    /// Typed three-way comparison of two raw values.
    fn compare(&self, lhs: &Bytes, rhs: &Bytes, ty: PropertyType) -> Result<Ordering> {
        let ord = match ty {
            PropertyType::TinyInt => lhs.to_tiny_int()?.cmp(&rhs.to_tiny_int()?),
            PropertyType::UnsignedTinyInt => lhs.to_tiny_int_u()?.cmp(&rhs.to_tiny_int_u()?),
            PropertyType::SmallInt => lhs.to_small_int()?.cmp(&rhs.to_small_int()?),
            PropertyType::UnsignedSmallInt => lhs.to_small_int_u()?.cmp(&rhs.to_small_int_u()?),
            PropertyType::Integer => lhs.to_int()?.cmp(&rhs.to_int()?),
            PropertyType::UnsignedInteger => lhs.to_int_u()?.cmp(&rhs.to_int_u()?),
            PropertyType::BigInt => lhs.to_big_int()?.cmp(&rhs.to_big_int()?),
            PropertyType::UnsignedBigInt => lhs.to_big_int_u()?.cmp(&rhs.to_big_int_u()?),
            PropertyType::Real => lhs
                .to_real()?
                .partial_cmp(&rhs.to_real()?)
                .unwrap_or(Ordering::Equal),
            PropertyType::Text => {
                let (v, p) = self.text_pair(lhs, rhs, ty)?;
                v.cmp(&p)
            }
            PropertyType::Blob => {
                if matches!(self.comparator, Comparator::Eq(_) | Comparator::In(_)) {
                    lhs.as_raw().cmp(rhs.as_raw())
                } else {
                    return Err(Error::InvalidComparator);
                }
            }
        };
        Ok(ord)
    }

    /// Both sides as text, lowercased under `ignore_case`. String
    /// comparators on non-text properties are a caller error.
    fn text_pair(&self, lhs: &Bytes, rhs: &Bytes, ty: PropertyType) -> Result<(String, String)> {
        let (v, p) = self.text_pair_raw(lhs, rhs, ty)?;
        if self.ignore_case {
            Ok((v.to_lowercase(), p.to_lowercase()))
        } else {
            Ok((v, p))
        }
    }

    fn text_pair_raw(
        &self,
        lhs: &Bytes,
        rhs: &Bytes,
        ty: PropertyType,
    ) -> Result<(String, String)> {
        if ty != PropertyType::Text {
            return Err(Error::InvalidComparator);
        }
        let v = lhs.to_text().map_err(|_| Error::InvalidComparator)?;
        let p = rhs.to_text().map_err(|_| Error::InvalidComparator)?;
        Ok((v, p))
    }
}

/// Compile a SQL `LIKE` pattern to an anchored regex.
fn like_to_regex(pattern: &str, ignore_case: bool) -> Result<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    if ignore_case {
        re.push_str("(?i)");
    }
    re.push('^');
    for c in pattern.chars() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|_| Error::InvalidComparator)
}

// ============================================================================
// FilterExpr
// ============================================================================

/// Predicate leaf: an opaque callable over the materialized record.
pub type RecordPredicate = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// A tree of conditions and predicates with short-circuit AND/OR and NOT.
#[derive(Clone)]
pub enum FilterExpr {
    Condition(Condition),
    Predicate(RecordPredicate),
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
    Not(Box<FilterExpr>),
}


impl FilterExpr {
    /// Wrap a callable as a filter leaf.
    pub fn predicate(f: impl Fn(&Record) -> bool + Send + Sync + 'static) -> Self {
        FilterExpr::Predicate(Arc::new(f))
    }

    pub fn execute(&self, record: &Record, types: &PropertyTypeMap) -> Result<bool> {
        match self {
            FilterExpr::Condition(c) => c.execute(record, types),
            FilterExpr::Predicate(f) => Ok(f(record)),
            FilterExpr::And(l, r) => Ok(l.execute(record, types)? && r.execute(record, types)?),
            FilterExpr::Or(l, r) => Ok(l.execute(record, types)? || r.execute(record, types)?),
            FilterExpr::Not(inner) => Ok(!inner.execute(record, types)?),
        }
    }

    /// The single leaf condition, when the whole tree is one positive leaf.
    /// This is the shape index acceleration understands.
    pub(crate) fn as_single_condition(&self) -> Option<&Condition> {
        match self {
            FilterExpr::Condition(c) if !c.negated => Some(c),
            _ => None,
        }
    }
}

impl std::fmt::Debug for FilterExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterExpr::Condition(c) => write!(f, "Condition({:?})", c.prop),
            FilterExpr::Predicate(_) => write!(f, "Predicate(..)"),
            FilterExpr::And(l, r) => write!(f, "And({l:?}, {r:?})"),
            FilterExpr::Or(l, r) => write!(f, "Or({l:?}, {r:?})"),
            FilterExpr::Not(inner) => write!(f, "Not({inner:?})"),
        }
    }
}

impl From<Condition> for FilterExpr {
    fn from(c: Condition) -> Self {
        FilterExpr::Condition(c)
    }
}

// Operator plumbing: `&`, `|`, `!` over conditions and trees in any mix.

impl Not for Condition {
    type Output = Condition;
    fn not(mut self) -> Condition {
        self.negated = !self.negated;
        self
    }
}

impl Not for FilterExpr {
    type Output = FilterExpr;
    fn not(self) -> FilterExpr {
        FilterExpr::Not(Box::new(self))
    }
}

impl<R: Into<FilterExpr>> BitAnd<R> for Condition {
    type Output = FilterExpr;
    fn bitand(self, rhs: R) -> FilterExpr {
        FilterExpr::And(Box::new(self.into()), Box::new(rhs.into()))
    }
}

impl<R: Into<FilterExpr>> BitOr<R> for Condition {
    type Output = FilterExpr;
    fn bitor(self, rhs: R) -> FilterExpr {
        FilterExpr::Or(Box::new(self.into()), Box::new(rhs.into()))
    }
}

impl<R: Into<FilterExpr>> BitAnd<R> for FilterExpr {
    type Output = FilterExpr;
    fn bitand(self, rhs: R) -> FilterExpr {
        FilterExpr::And(Box::new(self), Box::new(rhs.into()))
    }
}

impl<R: Into<FilterExpr>> BitOr<R> for FilterExpr {
    type Output = FilterExpr;
    fn bitor(self, rhs: R) -> FilterExpr {
        FilterExpr::Or(Box::new(self), Box::new(rhs.into()))
    }
}
