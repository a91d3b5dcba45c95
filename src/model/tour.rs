use super::{BeforePersist, HiddenWhen, ModelDescriptor, PersistCtx, Populate, PopulateKind, Virtual};
use crate::errors::AppError;
use crate::query::Projection;
use crate::schema::{DocValidator, FieldSpec, FieldType, Schema};
use bson::{Bson, Document as BsonDocument};

pub const COLLECTION: &str = "tours";
pub const DIFFICULTIES: [&str; 3] = ["easy", "medium", "difficult"];
pub const DEFAULT_RATINGS_AVERAGE: f64 = 4.5;

#[must_use]
pub fn schema() -> Schema {
    Schema::new(vec![
        FieldSpec::string("name")
            .required("A tour must have a name")
            .unique()
            .trim()
            .max_len(40, "A tour name must have less or equal than 40 characters")
            .min_len(10, "A tour name must have more or equal than 10 characters"),
        FieldSpec::string("slug"),
        FieldSpec::number("duration").required("A tour must have a duration"),
        FieldSpec::number("maxGroupSize").required("A tour must have a group size"),
        FieldSpec::string("difficulty")
            .required("A tour must have a difficulty")
            .one_of(&DIFFICULTIES, "Difficulty is either: easy, medium, difficult"),
        FieldSpec::number("ratingsAverage")
            .default_value(DEFAULT_RATINGS_AVERAGE)
            .min(1.0, "Rating must be above 1.0")
            .max(5.0, "Rating must be below 5.0")
            .round(1),
        FieldSpec::number("ratingsQuantity").default_value(0_i32),
        FieldSpec::number("price").required("A tour must have a price"),
        FieldSpec::number("priceDiscount"),
        FieldSpec::string("summary").trim().required("A tour must have a description"),
        FieldSpec::string("description").trim(),
        FieldSpec::string("imageCover").required("A tour must have a cover image"),
        FieldSpec::array("images", FieldType::String),
        FieldSpec::date("createdAt").default_now().hidden(),
        FieldSpec::array("startDates", FieldType::Date),
        FieldSpec::boolean("secretTour").default_value(false),
        FieldSpec::point("startLocation"),
        FieldSpec::array("locations", FieldType::Point),
        FieldSpec::array("guides", FieldType::ObjectId),
    ])
    .validator(DocValidator {
        path: "priceDiscount",
        message: "Discount price should be below regular price",
        check: discount_below_price,
        // the rule reads `price`, which a partial update may not carry
        on_update: false,
    })
}

fn discount_below_price(doc: &BsonDocument) -> bool {
    let num = |k: &str| match doc.get(k) {
        Some(Bson::Int32(i)) => Some(f64::from(*i)),
        #[allow(clippy::cast_precision_loss)]
        Some(Bson::Int64(i)) => Some(*i as f64),
        Some(Bson::Double(f)) => Some(*f),
        _ => None,
    };
    match (num("priceDiscount"), num("price")) {
        (Some(discount), Some(price)) => discount < price,
        _ => true,
    }
}

/// Lowercase, with runs of non-alphanumerics collapsed to single dashes.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

fn derive_slug(ctx: &mut PersistCtx<'_>) -> Result<(), AppError> {
    if !(ctx.is_new() || ctx.is_modified("name")) {
        return Ok(());
    }
    if let Ok(name) = ctx.doc.get_str("name") {
        let slug = slugify(name);
        ctx.doc.insert("slug", slug);
    }
    Ok(())
}

fn duration_weeks(doc: &BsonDocument) -> Option<Bson> {
    let d = match doc.get("duration")? {
        Bson::Int32(i) => f64::from(*i),
        #[allow(clippy::cast_precision_loss)]
        Bson::Int64(i) => *i as f64,
        Bson::Double(f) => *f,
        _ => return None,
    };
    Some(Bson::Double(d / 7.0))
}

/// Virtual `reviews` population, requested by single-tour reads.
#[must_use]
pub fn reviews_populate() -> Populate {
    Populate {
        path: "reviews",
        target: super::review::COLLECTION,
        kind: PopulateKind::Virtual { foreign_field: "tour" },
        select: None,
    }
}

#[must_use]
pub fn descriptor() -> ModelDescriptor {
    ModelDescriptor {
        name: "tour",
        collection: COLLECTION,
        schema: schema(),
        hidden_when: Some(HiddenWhen { field: "secretTour", value: Bson::Boolean(true) }),
        derived: &["ratingsQuantity", "ratingsAverage"],
        before_persist: vec![BeforePersist { name: "derive slug", run: derive_slug }],
        after_persist: Vec::new(),
        populate: vec![Populate {
            path: "guides",
            target: super::user::COLLECTION,
            kind: PopulateKind::Many,
            select: Some(Projection::Exclude(vec!["__v".into(), "passwordChangedAt".into()])),
        }],
        virtuals: vec![Virtual { name: "durationWeeks", compute: duration_weeks }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn slugs() {
        assert_eq!(slugify("The Forest Hiker"), "the-forest-hiker");
        assert_eq!(slugify("  Sea & Sun -- Tour!"), "sea-sun-tour");
    }

    #[test]
    fn discount_rule() {
        assert!(discount_below_price(&doc! { "price": 500, "priceDiscount": 100 }));
        assert!(!discount_below_price(&doc! { "price": 500, "priceDiscount": 600.0 }));
        assert!(discount_below_price(&doc! { "price": 500 }));
    }

    #[test]
    fn weeks_virtual() {
        assert_eq!(duration_weeks(&doc! { "duration": 14 }), Some(Bson::Double(2.0)));
        assert_eq!(duration_weeks(&doc! {}), None);
    }
}
