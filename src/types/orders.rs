use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

fn one() -> i32 {
    1
}

#[derive(Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub product_slug: String,
    #[serde(default = "one")]
    pub quantity: i32,
    pub address_id: Option<Uuid>,
}

#[derive(Deserialize, ToSchema)]
pub struct SetOrderAddressRequest {
    pub address_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_defaults_to_one() {
        let req: CreateOrderRequest =
            serde_json::from_str(r#"{"product_slug": "mesh-router"}"#).unwrap();
        assert_eq!(req.quantity, 1);
        assert!(req.address_id.is_none());
    }
}
