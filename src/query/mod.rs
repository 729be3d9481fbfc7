use mongodb::bson::{Bson, Document, doc};
use mongodb::options::FindOptions;
use rocket::request::{self, FromRequest, Outcome, Request};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use serde::Serialize;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 25;

/// Keys consumed by the pipeline itself; everything else is a filter.
const RESERVED: [&str; 4] = ["select", "sort", "page", "limit"];

/// Raw query-string pairs of a list request, url-decoded. Collected as a
/// guard because the operator syntax (`price[gte]=5`) doesn't map onto
/// Rocket's form field types.
pub struct ListParams(pub Vec<(String, String)>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ListParams {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let pairs = req
            .query_fields()
            .map(|field| {
                (
                    field.name.source().as_str().to_string(),
                    field.value.to_string(),
                )
            })
            .collect();

        Outcome::Success(ListParams(pairs))
    }
}

impl<'a> OpenApiFromRequest<'a> for ListParams {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

/// `next`/`prev` blocks of a list response. Both absent serializes as `{}`.
#[derive(Debug, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Pagination {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<PageCursor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<PageCursor>,
}

#[derive(Debug, Serialize, JsonSchema, PartialEq, Eq)]
pub struct PageCursor {
    pub page: i64,
    pub limit: i64,
}

/// A parsed list request: typed bson filter plus select/sort/page/limit.
#[derive(Debug)]
pub struct ListQuery {
    pub filter: Document,
    projection: Option<Document>,
    sort: Document,
    pub page: i64,
    pub limit: i64,
}

impl ListQuery {
    pub fn parse(params: &[(String, String)]) -> Result<ListQuery, String> {
        let mut filter = Document::new();
        let mut projection = None;
        let mut sort = None;
        let mut page = DEFAULT_PAGE;
        let mut limit = DEFAULT_LIMIT;

        for (key, value) in params {
            match key.as_str() {
                "select" => projection = Some(parse_select(value)),
                "sort" => sort = Some(parse_sort(value)),
                "page" => page = value.parse::<i64>().unwrap_or(DEFAULT_PAGE).max(1),
                "limit" => limit = value.parse::<i64>().unwrap_or(DEFAULT_LIMIT).max(1),
                _ => apply_filter(&mut filter, key, value)?,
            }
        }

        Ok(ListQuery {
            filter,
            projection,
            sort: sort.unwrap_or_else(|| doc! { "created_at": -1 }),
            page,
            limit,
        })
    }

    // page and limit are caller-supplied, so the math saturates instead of
    // overflowing; a saturated skip reads past the collection and returns
    // an empty page.
    pub fn skip(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn find_options(&self) -> FindOptions {
        let mut options = FindOptions::default();
        options.projection = self.projection.clone();
        options.sort = Some(self.sort.clone());
        options.skip = Some(self.skip() as u64);
        options.limit = Some(self.limit);
        options
    }

    /// `total` is the whole-collection count, not the filtered count, so
    /// `next` can overshoot under filters. Inherited behavior.
    pub fn pagination(&self, total: u64) -> Pagination {
        let skip = self.skip();

        let next = if (skip.saturating_add(self.limit) as u64) < total {
            Some(PageCursor {
                page: self.page.saturating_add(1),
                limit: self.limit,
            })
        } else {
            None
        };

        let prev = if skip > 0 {
            Some(PageCursor {
                page: self.page - 1,
                limit: self.limit,
            })
        } else {
            None
        };

        Pagination { next, prev }
    }
}

/// Translates a single query pair into the filter document. `field=value`
/// is equality; `field[op]=value` maps op through the operator table.
fn apply_filter(filter: &mut Document, key: &str, value: &str) -> Result<(), String> {
    debug_assert!(!RESERVED.contains(&key));

    match split_operator_key(key)? {
        Some((field, op)) => {
            validate_field(field)?;
            let mongo_op = operator(op).ok_or_else(|| format!("unknown query operator: {}", op))?;

            let bson_value = if op == "in" {
                Bson::Array(value.split(',').map(parse_value).collect())
            } else {
                parse_value(value)
            };

            // Merge with earlier operators on the same field, e.g.
            // price[gte]=1&price[lte]=9.
            let merge = matches!(filter.get(field), Some(Bson::Document(_)));
            if merge {
                if let Some(Bson::Document(existing)) = filter.get_mut(field) {
                    existing.insert(mongo_op, bson_value);
                }
            } else {
                filter.insert(field, doc! { mongo_op: bson_value });
            }
        }
        None => {
            validate_field(key)?;
            filter.insert(key, parse_value(value));
        }
    }

    Ok(())
}

/// Field names come straight off the query string; anything that would be
/// read by Mongo as an operator (`$where=...`, `a.$gt`) is refused instead
/// of passed through to the filter.
fn validate_field(field: &str) -> Result<(), String> {
    if field.starts_with('$') || field.contains(".$") {
        return Err(format!("malformed filter key: {}", field));
    }
    Ok(())
}

/// `price[gte]` -> Some(("price", "gte")); `price` -> None.
fn split_operator_key(key: &str) -> Result<Option<(&str, &str)>, String> {
    match key.find('[') {
        Some(open) => {
            if !key.ends_with(']') || open == 0 {
                return Err(format!("malformed filter key: {}", key));
            }
            Ok(Some((&key[..open], &key[open + 1..key.len() - 1])))
        }
        None => Ok(None),
    }
}

fn operator(token: &str) -> Option<&'static str> {
    match token {
        "gt" => Some("$gt"),
        "gte" => Some("$gte"),
        "lt" => Some("$lt"),
        "lte" => Some("$lte"),
        "in" => Some("$in"),
        _ => None,
    }
}

/// Query values arrive as strings; numbers and booleans must become typed
/// bson or Mongo comparisons silently match nothing.
fn parse_value(raw: &str) -> Bson {
    if let Ok(i) = raw.parse::<i64>() {
        return Bson::Int64(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Bson::Double(f);
    }
    match raw {
        "true" => Bson::Boolean(true),
        "false" => Bson::Boolean(false),
        _ => Bson::String(raw.to_string()),
    }
}

fn parse_select(value: &str) -> Document {
    let mut projection = Document::new();
    for field in value.split(',').filter(|f| !f.is_empty()) {
        projection.insert(field, 1_i32);
    }
    projection
}

fn parse_sort(value: &str) -> Document {
    let mut sort = Document::new();
    for field in value.split(',').filter(|f| !f.is_empty()) {
        match field.strip_prefix('-') {
            Some(name) => sort.insert(name, -1_i32),
            None => sort.insert(field, 1_i32),
        };
    }
    sort
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_when_no_params() {
        let q = ListQuery::parse(&[]).unwrap();
        assert_eq!(q.page, 1);
        assert_eq!(q.limit, 25);
        assert_eq!(q.skip(), 0);
        assert!(q.filter.is_empty());

        let options = q.find_options();
        assert_eq!(options.sort, Some(doc! { "created_at": -1 }));
        assert_eq!(options.projection, None);
    }

    #[test]
    fn equality_filter_keeps_reserved_keys_out() {
        let q = ListQuery::parse(&pairs(&[
            ("name", "Hertz"),
            ("select", "name"),
            ("sort", "name"),
            ("page", "2"),
            ("limit", "10"),
        ]))
        .unwrap();

        assert_eq!(q.filter, doc! { "name": "Hertz" });
        assert_eq!(q.page, 2);
        assert_eq!(q.limit, 10);
        assert_eq!(q.skip(), 10);
    }

    #[test]
    fn operator_suffixes_translate_to_mongo_operators() {
        let q = ListQuery::parse(&pairs(&[("seats[gt]", "4"), ("price[lte]", "99.5")])).unwrap();

        assert_eq!(q.filter.get_document("seats").unwrap(), &doc! { "$gt": 4_i64 });
        assert_eq!(
            q.filter.get_document("price").unwrap(),
            &doc! { "$lte": 99.5_f64 }
        );
    }

    #[test]
    fn operators_on_the_same_field_merge() {
        let q = ListQuery::parse(&pairs(&[("price[gte]", "1"), ("price[lte]", "9")])).unwrap();

        assert_eq!(
            q.filter.get_document("price").unwrap(),
            &doc! { "$gte": 1_i64, "$lte": 9_i64 }
        );
    }

    #[test]
    fn in_operator_splits_on_commas() {
        let q = ListQuery::parse(&pairs(&[("name[in]", "Avis,Hertz")])).unwrap();

        assert_eq!(
            q.filter.get_document("name").unwrap(),
            &doc! { "$in": ["Avis", "Hertz"] }
        );
    }

    #[test]
    fn unknown_operator_is_a_parse_error() {
        let err = ListQuery::parse(&pairs(&[("price[within]", "5")])).unwrap_err();
        assert!(err.contains("within"), "{}", err);
    }

    #[test]
    fn malformed_bracket_key_is_a_parse_error() {
        assert!(ListQuery::parse(&pairs(&[("price[gt", "5")])).is_err());
        assert!(ListQuery::parse(&pairs(&[("[gt]", "5")])).is_err());
    }

    #[test]
    fn boolean_values_become_typed_bson() {
        let q = ListQuery::parse(&pairs(&[("available", "true")])).unwrap();
        assert_eq!(q.filter.get_bool("available").unwrap(), true);
    }

    #[test]
    fn select_builds_a_projection() {
        let q = ListQuery::parse(&pairs(&[("select", "name,address")])).unwrap();
        let options = q.find_options();
        assert_eq!(
            options.projection,
            Some(doc! { "name": 1_i32, "address": 1_i32 })
        );
    }

    #[test]
    fn sort_handles_mixed_directions() {
        let q = ListQuery::parse(&pairs(&[("sort", "name,-created_at")])).unwrap();
        let options = q.find_options();
        assert_eq!(
            options.sort,
            Some(doc! { "name": 1_i32, "created_at": -1_i32 })
        );
    }

    #[test]
    fn non_numeric_page_falls_back_to_defaults() {
        let q = ListQuery::parse(&pairs(&[("page", "abc"), ("limit", "-3")])).unwrap();
        assert_eq!(q.page, 1);
        assert_eq!(q.limit, 1); // clamped, negative limits would invert reads
    }

    #[test]
    fn pagination_next_present_iff_more_items_remain() {
        // 26 items, limit 25: page 1 has a next, page 2 does not.
        let q = ListQuery::parse(&[]).unwrap();
        let p = q.pagination(26);
        assert_eq!(p.next, Some(PageCursor { page: 2, limit: 25 }));
        assert_eq!(p.prev, None);

        let q = ListQuery::parse(&pairs(&[("page", "2")])).unwrap();
        let p = q.pagination(26);
        assert_eq!(p.next, None);
        assert_eq!(p.prev, Some(PageCursor { page: 1, limit: 25 }));
    }

    #[test]
    fn pagination_exact_boundary_has_no_next() {
        // page * limit == total means everything was served
        let q = ListQuery::parse(&pairs(&[("page", "2"), ("limit", "5")])).unwrap();
        let p = q.pagination(10);
        assert_eq!(p.next, None);
        assert_eq!(p.prev, Some(PageCursor { page: 1, limit: 5 }));
    }

    #[test]
    fn huge_page_and_limit_saturate_instead_of_overflowing() {
        let q = ListQuery::parse(&pairs(&[
            ("page", "9223372036854775807"),
            ("limit", "25"),
        ]))
        .unwrap();

        // skip saturates at i64::MAX rather than wrapping negative
        assert_eq!(q.skip(), i64::MAX);

        let p = q.pagination(100);
        assert_eq!(p.next, None);
        assert_eq!(p.prev, Some(PageCursor { page: i64::MAX - 1, limit: 25 }));

        let q = ListQuery::parse(&pairs(&[
            ("page", "9223372036854775807"),
            ("limit", "9223372036854775807"),
        ]))
        .unwrap();
        assert_eq!(q.skip(), i64::MAX);
        assert_eq!(q.pagination(100).next, None);
    }

    #[test]
    fn dollar_prefixed_keys_are_rejected() {
        let err = ListQuery::parse(&pairs(&[("$where", "this.name.length > 0")])).unwrap_err();
        assert!(err.contains("malformed filter key"), "{}", err);

        assert!(ListQuery::parse(&pairs(&[("$gt", "1")])).is_err());
        assert!(ListQuery::parse(&pairs(&[("review.$rating", "5")])).is_err());
        assert!(ListQuery::parse(&pairs(&[("$where[gt]", "1")])).is_err());
    }

    #[test]
    fn empty_pagination_serializes_as_empty_object() {
        let q = ListQuery::parse(&[]).unwrap();
        let p = q.pagination(10);
        assert_eq!(serde_json::to_value(&p).unwrap(), serde_json::json!({}));
    }
}
