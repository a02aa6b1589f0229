use std::cmp::Ordering;

use serde_json::Value;

use super::error::FilterError;
use super::filter_where::{compare_values, is_valid_identifier};
use super::types::{FilterOrderInfo, SortDirection};

pub struct FilterOrder;

impl FilterOrder {
    pub fn validate_and_parse(order: &Value) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let infos = match order {
            Value::String(s) => Self::parse_order_string(s),
            Value::Array(arr) => {
                // Expect array of strings like ["updatedAt desc", "title asc"]
                let mut out = Vec::new();
                for v in arr {
                    if let Value::String(s) = v { out.extend(Self::parse_order_string(s)); }
                }
                out
            }
            Value::Object(obj) => {
                // { "updatedAt": "desc", "title": "asc" }
                obj.iter()
                    .map(|(k, v)| FilterOrderInfo {
                        column: k.clone(),
                        sort: Self::parse_direction(v.as_str().unwrap_or("asc")),
                    })
                    .collect()
            }
            _ => vec![],
        };

        for info in &infos {
            if !is_valid_identifier(&info.column) {
                return Err(FilterError::InvalidColumn(format!("Invalid order column: {}", info.column)));
            }
        }
        Ok(infos)
    }

    fn parse_direction(dir: &str) -> SortDirection {
        if dir.eq_ignore_ascii_case("desc") { SortDirection::Desc } else { SortDirection::Asc }
    }

    fn parse_order_string(s: &str) -> Vec<FilterOrderInfo> {
        // split on commas, then each token into column and direction
        let mut out = Vec::new();
        for part in s.split(',') {
            let mut it = part.split_whitespace();
            if let Some(col) = it.next() {
                let sort = Self::parse_direction(it.next().unwrap_or("asc"));
                out.push(FilterOrderInfo { column: col.to_string(), sort });
            }
        }
        out
    }

    pub fn generate(infos: &[FilterOrderInfo]) -> String {
        if infos.is_empty() { return String::new(); }
        let parts: Vec<String> = infos
            .iter()
            .map(|i| format!("\"{}\" {}", i.column, i.sort.to_sql()))
            .collect();
        format!("ORDER BY {}", parts.join(", "))
    }

    /// Order two documents by the parsed sort keys. Missing or incomparable
    /// values sort last, like NULLS LAST.
    pub fn compare(infos: &[FilterOrderInfo], a: &Value, b: &Value) -> Ordering {
        for info in infos {
            let ordering = match (a.get(&info.column), b.get(&info.column)) {
                (Some(x), Some(y)) if !x.is_null() && !y.is_null() => {
                    let ord = compare_values(x, y).unwrap_or(Ordering::Equal);
                    match info.sort {
                        SortDirection::Asc => ord,
                        SortDirection::Desc => ord.reverse(),
                    }
                }
                (Some(x), _) if !x.is_null() => Ordering::Less,
                (_, Some(y)) if !y.is_null() => Ordering::Greater,
                _ => Ordering::Equal,
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_every_accepted_shape() {
        let from_string = FilterOrder::validate_and_parse(&json!("updatedAt desc, title")).unwrap();
        assert_eq!(from_string.len(), 2);
        assert_eq!(from_string[0].sort, SortDirection::Desc);
        assert_eq!(from_string[1].sort, SortDirection::Asc);

        let from_object = FilterOrder::validate_and_parse(&json!({ "title": "DESC" })).unwrap();
        assert_eq!(FilterOrder::generate(&from_object), "ORDER BY \"title\" DESC");

        assert!(FilterOrder::validate_and_parse(&json!("title; drop")).is_err());
    }

    #[test]
    fn compare_sorts_missing_values_last() {
        let infos = FilterOrder::validate_and_parse(&json!("title desc")).unwrap();
        let mut docs = vec![json!({ "title": "b" }), json!({}), json!({ "title": "c" })];
        docs.sort_by(|a, b| FilterOrder::compare(&infos, a, b));
        assert_eq!(docs, vec![json!({ "title": "c" }), json!({ "title": "b" }), json!({})]);
    }
}
