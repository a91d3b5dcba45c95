//! Translates a query-string mapping into a composed read query.
//!
//! Stages are chainable and lazy: nothing executes until the caller hands the
//! result of [`QueryBuilder::build`] to `find_docs`. A stage that fails to
//! cast a value records the error and `build` reports it.

use crate::document::VERSION_KEY;
use crate::errors::AppError;
use bson::Bson;
use std::collections::BTreeMap;

use super::parse::{InferCaster, ValueCaster, parse_param_key};
use super::types::{
    Filter, FindOptions, MAX_IN_SET, MAX_PROJECTION_FIELDS, MAX_SORT_FIELDS, Projection, SortSpec,
};

/// Keys that shape the query instead of filtering it.
pub const RESERVED_KEYS: [&str; 4] = ["page", "sort", "limit", "fields"];
pub const DEFAULT_SORT: &str = "-createdAt";
pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_LIMIT: usize = 100;

static INFER: InferCaster = InferCaster;

pub struct QueryBuilder<'a> {
    filter: Filter,
    params: Vec<(String, String)>,
    caster: &'a dyn ValueCaster,
    options: FindOptions,
    max_limit: Option<usize>,
    error: Option<AppError>,
}

impl<'a> QueryBuilder<'a> {
    /// Starts from `base` (visibility, parent scope, ...) which caller
    /// filters can only narrow.
    #[must_use]
    pub fn new(base: Filter, params: Vec<(String, String)>) -> Self {
        Self { filter: base, params, caster: &INFER, options: FindOptions::default(), max_limit: None, error: None }
    }

    /// Casts filter values against declared field types.
    #[must_use]
    pub fn with_caster(mut self, caster: &'a dyn ValueCaster) -> Self {
        self.caster = caster;
        self
    }

    /// Optional ceiling on `limit`.
    #[must_use]
    pub const fn max_limit(mut self, max: Option<usize>) -> Self {
        self.max_limit = max;
        self
    }

    /// Last value wins for reserved keys.
    fn param(&self, key: &str) -> Option<&str> {
        self.params.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn filter(mut self) -> Self {
        if self.error.is_some() {
            return self;
        }
        match self.clauses() {
            Ok(clauses) => {
                for c in clauses {
                    self.filter = std::mem::replace(&mut self.filter, Filter::True).and(c);
                }
            }
            Err(e) => self.error = Some(e),
        }
        self
    }

    fn clauses(&self) -> Result<Vec<Filter>, AppError> {
        // group by key so repeated values become one `In` clause
        let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        let mut order: Vec<&str> = Vec::new();
        for (k, v) in &self.params {
            if RESERVED_KEYS.contains(&k.as_str()) {
                continue;
            }
            let entry = grouped.entry(k.as_str()).or_default();
            if entry.is_empty() {
                order.push(k.as_str());
            }
            entry.push(v.as_str());
        }
        order
            .into_iter()
            .map(|key| self.clause(key, grouped.get(key).map(Vec::as_slice).unwrap_or_default()))
            .collect()
    }

    fn clause(&self, key: &str, values: &[&str]) -> Result<Filter, AppError> {
        let (path, op) = parse_param_key(key)?;
        match (op, values) {
            (None, [one]) => Ok(Filter::eq(path.clone(), self.caster.cast(&path, one)?)),
            (None, many) if many.len() > MAX_IN_SET => {
                Err(AppError::BadRequest(format!("Too many values for {path} (max {MAX_IN_SET})")))
            }
            (None, many) => {
                let values = many
                    .iter()
                    .map(|v| self.caster.cast(&path, v))
                    .collect::<Result<Vec<Bson>, _>>()?;
                Ok(Filter::In { path, values })
            }
            (Some(op), many) => {
                // repeated bounds on one field all apply
                let mut f = Filter::True;
                for v in many {
                    let value = self.caster.cast(&path, v)?;
                    f = f.and(Filter::Cmp { path: path.clone(), op, value });
                }
                Ok(f)
            }
        }
    }

    #[must_use]
    pub fn sort(mut self) -> Self {
        let raw = self.param("sort").unwrap_or(DEFAULT_SORT).to_string();
        let specs: Vec<SortSpec> = raw.split(',').filter_map(SortSpec::parse).collect();
        if specs.len() > MAX_SORT_FIELDS {
            let msg = format!("Too many sort fields (max {MAX_SORT_FIELDS})");
            self.error.get_or_insert(AppError::BadRequest(msg));
        }
        self.options.sort = Some(if specs.is_empty() {
            SortSpec::parse(DEFAULT_SORT).into_iter().collect()
        } else {
            specs
        });
        self
    }

    #[must_use]
    pub fn limit_fields(mut self) -> Self {
        let fields: Vec<String> = self
            .param("fields")
            .map(|raw| raw.split(',').map(str::trim).filter(|f| !f.is_empty()).map(String::from).collect())
            .unwrap_or_default();
        if fields.len() > MAX_PROJECTION_FIELDS {
            let msg = format!("Too many fields selected (max {MAX_PROJECTION_FIELDS})");
            self.error.get_or_insert(AppError::BadRequest(msg));
        }
        self.options.projection = Some(if fields.is_empty() {
            Projection::Exclude(vec![VERSION_KEY.to_string()])
        } else if fields.iter().all(|f| f.starts_with('-')) {
            Projection::Exclude(fields.iter().map(|f| f.trim_start_matches('-').to_string()).collect())
        } else {
            Projection::Include(fields.into_iter().filter(|f| !f.starts_with('-')).collect())
        });
        self
    }

    #[must_use]
    pub fn paginate(mut self) -> Self {
        let page = positive(self.param("page")).unwrap_or(DEFAULT_PAGE);
        let mut limit = positive(self.param("limit")).unwrap_or(DEFAULT_LIMIT);
        if let Some(max) = self.max_limit {
            limit = limit.min(max);
        }
        self.options.skip = Some((page - 1).saturating_mul(limit));
        self.options.limit = Some(limit);
        self
    }

    pub fn build(self) -> Result<(Filter, FindOptions), AppError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok((self.filter, self.options)),
        }
    }
}

/// Parses a 1-based count; anything unparsable or below 1 is `None`.
fn positive(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|s| s.trim().parse::<usize>().ok()).filter(|n| *n >= 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{CmpOp, Order};

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn reserved_keys_do_not_filter() {
        let (f, _) = QueryBuilder::new(Filter::True, params(&[("page", "2"), ("sort", "price"), ("difficulty", "easy")]))
            .filter()
            .build()
            .unwrap();
        assert_eq!(f, Filter::eq("difficulty", "easy"));
    }

    #[test]
    fn bracket_operators_become_comparisons() {
        let (f, _) = QueryBuilder::new(Filter::True, params(&[("duration[gte]", "5"), ("price[lt]", "1500")]))
            .filter()
            .build()
            .unwrap();
        assert_eq!(
            f,
            Filter::And(vec![
                Filter::Cmp { path: "duration".into(), op: CmpOp::Gte, value: Bson::Int32(5) },
                Filter::Cmp { path: "price".into(), op: CmpOp::Lt, value: Bson::Int32(1500) },
            ])
        );
    }

    #[test]
    fn base_filter_is_kept() {
        let base = Filter::ne("secretTour", true);
        let (f, _) = QueryBuilder::new(base.clone(), params(&[("secretTour", "true")])).filter().build().unwrap();
        assert_eq!(f, Filter::And(vec![base, Filter::eq("secretTour", true)]));
    }

    #[test]
    fn repeated_plain_values_become_in() {
        let (f, _) = QueryBuilder::new(Filter::True, params(&[("duration", "5"), ("duration", "9")]))
            .filter()
            .build()
            .unwrap();
        assert_eq!(f, Filter::In { path: "duration".into(), values: vec![Bson::Int32(5), Bson::Int32(9)] });
    }

    #[test]
    fn sort_defaults_and_multi_key() {
        let (_, o) = QueryBuilder::new(Filter::True, vec![]).sort().build().unwrap();
        assert_eq!(o.sort.unwrap(), vec![SortSpec { field: "createdAt".into(), order: Order::Desc }]);

        let (_, o) = QueryBuilder::new(Filter::True, params(&[("sort", "-ratingsAverage,price")])).sort().build().unwrap();
        let s = o.sort.unwrap();
        assert_eq!(s[0], SortSpec { field: "ratingsAverage".into(), order: Order::Desc });
        assert_eq!(s[1], SortSpec { field: "price".into(), order: Order::Asc });
    }

    #[test]
    fn fields_default_hides_version_marker() {
        let (_, o) = QueryBuilder::new(Filter::True, vec![]).limit_fields().build().unwrap();
        assert_eq!(o.projection, Some(Projection::Exclude(vec!["__v".into()])));

        let (_, o) = QueryBuilder::new(Filter::True, params(&[("fields", "name,price")])).limit_fields().build().unwrap();
        assert_eq!(o.projection, Some(Projection::Include(vec!["name".into(), "price".into()])));

        let (_, o) = QueryBuilder::new(Filter::True, params(&[("fields", "-summary")])).limit_fields().build().unwrap();
        assert_eq!(o.projection, Some(Projection::Exclude(vec!["summary".into()])));
    }

    #[test]
    fn pagination_window_and_fallbacks() {
        let (_, o) = QueryBuilder::new(Filter::True, params(&[("page", "3"), ("limit", "10")])).paginate().build().unwrap();
        assert_eq!((o.skip, o.limit), (Some(20), Some(10)));

        for bad in ["0", "-4", "abc"] {
            let (_, o) = QueryBuilder::new(Filter::True, params(&[("page", bad)])).paginate().build().unwrap();
            assert_eq!((o.skip, o.limit), (Some(0), Some(100)), "page={bad}");
        }
    }

    #[test]
    fn max_limit_caps_when_configured() {
        let (_, o) = QueryBuilder::new(Filter::True, params(&[("limit", "5000")]))
            .max_limit(Some(1000))
            .paginate()
            .build()
            .unwrap();
        assert_eq!(o.limit, Some(1000));
    }

    #[test]
    fn oversized_requests_are_rejected() {
        let keys: Vec<String> = (0..=MAX_SORT_FIELDS).map(|i| format!("f{i}")).collect();
        let res = QueryBuilder::new(Filter::True, params(&[("sort", &keys.join(","))])).sort().build();
        assert!(matches!(res, Err(AppError::BadRequest(_))));

        let fields: Vec<String> = (0..=MAX_PROJECTION_FIELDS).map(|i| format!("f{i}")).collect();
        let res = QueryBuilder::new(Filter::True, params(&[("fields", &fields.join(","))])).limit_fields().build();
        assert!(matches!(res, Err(AppError::BadRequest(_))));

        let many: Vec<(String, String)> = (0..=MAX_IN_SET).map(|i| ("price".to_string(), i.to_string())).collect();
        let res = QueryBuilder::new(Filter::True, many).filter().build();
        assert!(matches!(res, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn unknown_operator_surfaces_at_build() {
        let res = QueryBuilder::new(Filter::True, params(&[("price[regex]", "x")])).filter().sort().build();
        assert!(matches!(res, Err(AppError::BadRequest(_))));
    }
}
