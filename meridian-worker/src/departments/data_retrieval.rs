//! Pulls raw commerce data (orders, products, customers) for downstream
//! departments to analyze. The only department that talks to the commerce
//! backend directly rather than reasoning over already-fetched data.

use async_trait::async_trait;
use meridian_shared::error::Result;
use serde::Serialize;
use serde_json::json;

use crate::context::TaskContext;
use crate::department::DepartmentHandler;

#[derive(Serialize)]
struct FetchArgs<'a> {
    path: &'a str,
}

pub struct DataRetrievalHandler;

#[async_trait]
impl DepartmentHandler for DataRetrievalHandler {
    async fn handle(&self, ctx: &TaskContext) -> Result<serde_json::Value> {
        let path = ctx
            .task_details
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or("/admin/api/orders.json")
            .to_string();
        let account_name = ctx
            .task_details
            .get("shop_domain")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let client = ctx.external_client(account_name.clone());
        let commerce = ctx.commerce_client(&account_name);
        let args = FetchArgs { path: &path };

        let data = client
            .cached_read("data_retrieval.fetch", &args, |token| {
                let commerce = commerce.clone();
                let path = path.clone();
                async move { commerce.get(&token, &path).await }
            })
            .await?;

        Ok(json!({ "source": path, "data": data }))
    }
}
