use serde_json::{json, Map, Value};

use super::opaque_id::{encode_product_id, encode_shop_id};
use crate::catalog::CatalogEntity;

/// Public representation of a catalog entity: opaque ids everywhere,
/// internal field names left out.
pub fn entity_to_api_value(entity: &CatalogEntity) -> Value {
    let mut out = Map::new();
    out.insert("_id".to_string(), json!(encode_product_id(&entity.id)));
    out.insert("shopId".to_string(), json!(encode_shop_id(&entity.shop_id)));
    out.insert(
        "ancestors".to_string(),
        Value::Array(entity.ancestors.iter().map(|a| json!(encode_product_id(a))).collect()),
    );
    out.insert("isDeleted".to_string(), json!(entity.is_deleted));
    out.insert("isVisible".to_string(), json!(entity.is_visible));
    if let Some(title) = &entity.title {
        out.insert("title".to_string(), json!(title));
    }
    if let Some(updated_at) = &entity.updated_at {
        out.insert("updatedAt".to_string(), json!(updated_at));
    }
    Value::Object(out)
}

pub fn entities_to_api_value(entities: &[CatalogEntity]) -> Value {
    Value::Array(entities.iter().map(entity_to_api_value).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::opaque_id::decode_product_id;

    #[test]
    fn encodes_ids_and_ancestors() {
        let entity = CatalogEntity::new("v1", "s1").with_ancestors(["p1"]);
        let value = entity_to_api_value(&entity);
        assert_eq!(decode_product_id(value["_id"].as_str().unwrap()).unwrap(), "v1");
        assert_eq!(decode_product_id(value["ancestors"][0].as_str().unwrap()).unwrap(), "p1");
        assert_eq!(value["isVisible"], json!(false));
        assert!(value.get("title").is_none());
    }
}
