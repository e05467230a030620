//! Common order-API fixtures.

use serde_json::{json, Value};

/// Suffix of the surface reflectance clip the pipeline summarizes.
pub const CLIP_SUFFIX: &str = "_3B_AnalyticMS_SR_clip.tif";

/// Typical delivered item names.
pub mod items {
    pub const CLIP_A: &str = "20230712_180201_24_2262_3B_AnalyticMS_SR_clip.tif";
    pub const CLIP_B: &str = "20230714_175951_11_241c_3B_AnalyticMS_SR_clip.tif";
    pub const METADATA_A: &str = "20230712_180201_24_2262_metadata.json";
    pub const UDM_A: &str = "20230712_180201_24_2262_3B_udm2_clip.tif";
}

/// Order-status body with the given state and `(location, name)` results.
///
/// Names are nested under the order id, the way deliveries are laid out.
///
/// # Example
///
/// ```
/// use test_utils::order_status_json;
///
/// let body = order_status_json("success", &[("http://h/a", "a.tif")]);
/// assert_eq!(body["state"], "success");
/// assert_eq!(body["_links"]["results"][0]["location"], "http://h/a");
/// ```
pub fn order_status_json(state: &str, results: &[(&str, &str)]) -> Value {
    let results: Vec<Value> = results
        .iter()
        .map(|(location, name)| {
            json!({
                "delivery": "success",
                "expires_at": "2030-01-01T00:00:00.000Z",
                "location": location,
                "name": name,
            })
        })
        .collect();

    json!({
        "id": "9c2e7d1a-0000-4000-8000-000000000000",
        "name": "fixture order",
        "state": state,
        "last_message": format!("Order is {}", state),
        "_links": {
            "_self": "https://api.example.com/compute/ops/orders/v2/fixture",
            "results": results,
        },
    })
}

/// Task input as the orchestrator supplies it for one site.
pub fn task_input_json(order_url: &str, site: &str) -> Value {
    json!({
        "predecessor_outputs": {
            "search_and_order": {
                "order_url": order_url,
                "name": site,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_without_results() {
        let body = order_status_json("running", &[]);
        assert_eq!(body["state"], "running");
        assert_eq!(body["_links"]["results"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_item_names_use_clip_suffix() {
        assert!(items::CLIP_A.ends_with(CLIP_SUFFIX));
        assert!(items::CLIP_B.ends_with(CLIP_SUFFIX));
        assert!(!items::UDM_A.ends_with(CLIP_SUFFIX));
    }
}
