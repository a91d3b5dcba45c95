use crate::query::{compare_bson, get_path};
use bson::{Bson, Document as BsonDocument};
use chrono::Datelike;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Field(String),
    Literal(Bson),
    ToUpper(Box<Expr>),
    /// Month (1-12, UTC) of a date.
    Month(Box<Expr>),
    Year(Box<Expr>),
}

impl Expr {
    pub fn field(path: impl Into<String>) -> Self {
        Self::Field(path.into())
    }

    /// Missing paths and type mismatches evaluate to `Null`.
    #[must_use]
    pub fn eval(&self, doc: &BsonDocument) -> Bson {
        match self {
            Self::Field(p) => get_path(doc, p).cloned().unwrap_or(Bson::Null),
            Self::Literal(v) => v.clone(),
            Self::ToUpper(e) => match e.eval(doc) {
                Bson::String(s) => Bson::String(s.to_uppercase()),
                Bson::Null => Bson::String(String::new()),
                other => Bson::String(other.to_string().to_uppercase()),
            },
            Self::Month(e) => date_part(&e.eval(doc), |d| d.month()),
            Self::Year(e) => date_part(&e.eval(doc), |d| d.year().unsigned_abs()),
        }
    }
}

fn date_part(v: &Bson, part: fn(&chrono::DateTime<chrono::Utc>) -> u32) -> Bson {
    let Bson::DateTime(dt) = v else {
        return Bson::Null;
    };
    chrono::DateTime::from_timestamp_millis(dt.timestamp_millis())
        .and_then(|d| i32::try_from(part(&d)).ok())
        .map_or(Bson::Null, Bson::Int32)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Sum(Expr),
    Avg(Expr),
    Min(Expr),
    Max(Expr),
    Push(Expr),
}

impl Accumulator {
    #[must_use]
    pub const fn count() -> Self {
        Self::Sum(Expr::Literal(Bson::Int32(1)))
    }

    pub(crate) fn state(&self) -> AccState {
        match self {
            Self::Sum(_) => AccState::Sum { int: 0, float: 0.0, saw_float: false },
            Self::Avg(_) => AccState::Avg { total: 0.0, n: 0 },
            Self::Min(_) | Self::Max(_) => AccState::Extreme(None),
            Self::Push(_) => AccState::Push(Vec::new()),
        }
    }

    const fn expr(&self) -> &Expr {
        match self {
            Self::Sum(e) | Self::Avg(e) | Self::Min(e) | Self::Max(e) | Self::Push(e) => e,
        }
    }

    pub(crate) fn feed(&self, state: &mut AccState, doc: &BsonDocument) {
        let v = self.expr().eval(doc);
        match (self, state) {
            (Self::Sum(_), AccState::Sum { int, float, saw_float }) => match v {
                Bson::Int32(i) => *int += i64::from(i),
                Bson::Int64(i) => *int += i,
                Bson::Double(f) => {
                    *float += f;
                    *saw_float = true;
                }
                _ => {}
            },
            (Self::Avg(_), AccState::Avg { total, n }) => {
                if let Some(f) = as_f64(&v) {
                    *total += f;
                    *n += 1;
                }
            }
            (Self::Min(_), AccState::Extreme(cur)) => keep_if(cur, v, Ordering::Less),
            (Self::Max(_), AccState::Extreme(cur)) => keep_if(cur, v, Ordering::Greater),
            (Self::Push(_), AccState::Push(items)) => {
                if !matches!(v, Bson::Null) {
                    items.push(v);
                }
            }
            _ => {}
        }
    }
}

fn keep_if(cur: &mut Option<Bson>, v: Bson, wanted: Ordering) {
    if matches!(v, Bson::Null) {
        return;
    }
    if cur.as_ref().is_none_or(|c| compare_bson(&v, c) == wanted) {
        *cur = Some(v);
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(v: &Bson) -> Option<f64> {
    match v {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

pub(crate) enum AccState {
    Sum { int: i64, float: f64, saw_float: bool },
    Avg { total: f64, n: u64 },
    Extreme(Option<Bson>),
    Push(Vec<Bson>),
}

impl AccState {
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn finish(self) -> Bson {
        match self {
            Self::Sum { int, float, saw_float } => {
                if saw_float {
                    Bson::Double(float + int as f64)
                } else {
                    i32::try_from(int).map_or(Bson::Int64(int), Bson::Int32)
                }
            }
            Self::Avg { total, n } => {
                if n == 0 { Bson::Null } else { Bson::Double(total / n as f64) }
            }
            Self::Extreme(v) => v.unwrap_or(Bson::Null),
            Self::Push(items) => Bson::Array(items),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn upper_and_month() {
        let d = doc! { "difficulty": "easy", "at": bson::DateTime::from_millis(1_624_096_800_000) };
        assert_eq!(Expr::ToUpper(Box::new(Expr::field("difficulty"))).eval(&d), Bson::String("EASY".into()));
        assert_eq!(Expr::Month(Box::new(Expr::field("at"))).eval(&d), Bson::Int32(6));
        assert_eq!(Expr::Year(Box::new(Expr::field("at"))).eval(&d), Bson::Int32(2021));
        assert_eq!(Expr::field("missing").eval(&d), Bson::Null);
    }

    #[test]
    fn accumulators() {
        let docs = [doc! { "p": 3 }, doc! { "p": 5.5 }, doc! { "q": 1 }];
        let run = |acc: Accumulator| {
            let mut st = acc.state();
            for d in &docs {
                acc.feed(&mut st, d);
            }
            st.finish()
        };
        assert_eq!(run(Accumulator::count()), Bson::Int32(3));
        assert_eq!(run(Accumulator::Sum(Expr::field("p"))), Bson::Double(8.5));
        assert_eq!(run(Accumulator::Avg(Expr::field("p"))), Bson::Double(4.25));
        assert_eq!(run(Accumulator::Min(Expr::field("p"))), Bson::Int32(3));
        assert_eq!(run(Accumulator::Max(Expr::field("p"))), Bson::Double(5.5));
        assert_eq!(run(Accumulator::Avg(Expr::field("zz"))), Bson::Null);
    }
}
