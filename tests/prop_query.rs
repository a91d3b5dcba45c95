use natours::collection::Collection;
use natours::document::Document;
use natours::query::{self, Filter, QueryBuilder};
use proptest::prelude::*;

fn collection(rows: &[(i64, i64)]) -> Collection {
    let col = Collection::new("rows".into());
    for (a, b) in rows {
        col.insert_document(Document::new(bson::doc! { "a": *a, "b": *b })).unwrap();
    }
    col
}

fn run(col: &Collection, params: Vec<(String, String)>) -> Vec<(i64, i64)> {
    let (filter, opts) =
        QueryBuilder::new(Filter::True, params).filter().sort().limit_fields().paginate().build().unwrap();
    query::find_docs(col, &filter, &opts)
        .iter()
        .map(|d| (d.data.get_i64("a").unwrap(), d.data.get_i64("b").unwrap()))
        .collect()
}

fn p(k: &str, v: impl ToString) -> (String, String) {
    (k.to_string(), v.to_string())
}

proptest! {
    #[test]
    fn prop_bracket_ops_equal_comparisons(
        rows in proptest::collection::vec((-50i64..50, -50i64..50), 0..40),
        n in -60i64..60,
    ) {
        let col = collection(&rows);
        let ops: [(&str, fn(i64, i64) -> bool); 4] =
            [("gte", |x, n| x >= n), ("gt", |x, n| x > n), ("lte", |x, n| x <= n), ("lt", |x, n| x < n)];
        for (op, holds) in ops {
            let got = run(&col, vec![p(&format!("a[{op}]"), n), p("limit", 1000)]);
            let expected = rows.iter().filter(|(a, _)| holds(*a, n)).count();
            prop_assert_eq!(got.len(), expected, "a[{}]={}", op, n);
            prop_assert!(got.iter().all(|(a, _)| holds(*a, n)));
        }
    }

    #[test]
    fn prop_desc_then_asc_sort(rows in proptest::collection::vec((-5i64..5, -5i64..5), 0..40)) {
        let col = collection(&rows);
        let got = run(&col, vec![p("sort", "-a,b"), p("limit", 1000)]);
        prop_assert_eq!(got.len(), rows.len());
        for w in got.windows(2) {
            let ((a0, b0), (a1, b1)) = (w[0], w[1]);
            prop_assert!(a0 > a1 || (a0 == a1 && b0 <= b1), "{:?} before {:?}", w[0], w[1]);
        }
    }

    #[test]
    fn prop_page_window(
        rows in proptest::collection::vec((0i64..1000, 0i64..10), 0..60),
        page in 1usize..8,
        limit in 1usize..15,
    ) {
        let col = collection(&rows);
        let full = run(&col, vec![p("sort", "a,b"), p("limit", 1000)]);
        let got = run(&col, vec![p("sort", "a,b"), p("page", page), p("limit", limit)]);
        let start = ((page - 1) * limit).min(full.len());
        let end = (page * limit).min(full.len());
        prop_assert_eq!(got, full[start..end].to_vec());
    }
}
