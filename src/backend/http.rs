// ==========================================
// 仓储定价运营系统 - HTTP 后端实现
// ==========================================
// 职责: 通过 REST + JSON 调用后端定价服务
// 说明: 非 2xx 响应转为 BackendError::Status，携带原始响应体作为错误日志
// ==========================================

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;

use crate::backend::{
    BackendError, BackendResult, FacilityQuery, PricingBackend, PublishAllRequest,
    PublishIndividualRequest, RawFacilitiesResponse, RawRecord, UnitSettingsRequest,
};
use crate::perf::PerfGuard;

pub struct HttpPricingBackend {
    base_url: String,
    base: Url,
    token: Option<String>,
    client: Client,
}

impl HttpPricingBackend {
    /// 创建 HTTP 后端
    ///
    /// # 参数
    /// - `base_url`: 服务根地址（末尾斜杠可有可无）
    /// - `token`: Bearer 令牌（None 表示匿名）
    /// - `timeout`: 单次请求超时
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> BackendResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.trim_end_matches('/').to_string();
        let base = Url::parse(&base_url)
            .map_err(|e| BackendError::Transport(format!("无效的后端地址 {}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(BackendError::Transport(format!("无效的后端地址: {}", base_url)));
        }
        Ok(Self {
            base_url,
            base,
            token: token.filter(|t| !t.trim().is_empty()),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 在根地址后逐段追加路径；每段单独百分号编码（id 中的 `/`、空格等不会改变路径结构）
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> BackendResult<Response> {
        let response = self.authorize(builder).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), body = %body, "后端返回错误状态");
        Err(BackendError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> BackendResult<T> {
        let response = self.send(builder).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait]
impl PricingBackend for HttpPricingBackend {
    async fn fetch_facilities(&self, query: &FacilityQuery) -> BackendResult<RawFacilitiesResponse> {
        let _perf = PerfGuard::new("backend.fetch_facilities");
        let mut params: Vec<(&str, String)> = vec![
            ("page", query.page.to_string()),
            ("page_size", query.page_size.to_string()),
        ];
        if let Some(from) = query.date_from {
            params.push(("date_from", from.to_string()));
        }
        if let Some(to) = query.date_to {
            params.push(("date_to", to.to_string()));
        }
        if !query.facility_ids.is_empty() {
            params.push(("facility_ids", query.facility_ids.join(",")));
        }

        let builder = self.client.get(self.endpoint(&["facilities"])).query(&params);
        self.send_json(builder).await
    }

    async fn fetch_link_candidates(&self, facility_id: &str) -> BackendResult<Vec<RawRecord>> {
        let _perf = PerfGuard::new("backend.fetch_link_candidates");
        let builder = self
            .client
            .get(self.endpoint(&["facilities", facility_id, "unit-types"]));
        self.send_json(builder).await
    }

    async fn publish_all(&self, request: &PublishAllRequest) -> BackendResult<()> {
        let _perf = PerfGuard::new("backend.publish_all");
        let builder = self.client.post(self.endpoint(&["ecri", "publish"])).json(request);
        self.send(builder).await.map(|_| ())
    }

    async fn publish_individual(&self, request: &PublishIndividualRequest) -> BackendResult<()> {
        let _perf = PerfGuard::new("backend.publish_individual");
        let builder = self.client.post(self.endpoint(&["ecri", "publish", "facility"])).json(request);
        self.send(builder).await.map(|_| ())
    }

    async fn update_unit_settings(&self, request: &UnitSettingsRequest) -> BackendResult<()> {
        let _perf = PerfGuard::new("backend.update_unit_settings");
        let url = self.endpoint(&[
            "facilities",
            request.facility_id.as_str(),
            "unit-types",
            request.unit_type_id.as_str(),
            "settings",
        ]);
        let builder = self.client.put(url).json(request);
        self.send(builder).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining_and_blank_token() {
        let backend =
            HttpPricingBackend::new("https://pricing.example.com/api/", Some("  ".to_string()), Duration::from_secs(5))
                .unwrap();

        assert_eq!(backend.base_url(), "https://pricing.example.com/api");
        assert_eq!(
            backend.endpoint(&["ecri", "publish"]).as_str(),
            "https://pricing.example.com/api/ecri/publish"
        );
        assert!(backend.token.is_none());
    }

    #[test]
    fn test_path_segments_are_encoded() {
        let backend =
            HttpPricingBackend::new("https://pricing.example.com/api", None, Duration::from_secs(5)).unwrap();

        let url = backend.endpoint(&["facilities", "f1/../admin", "unit-types", "5x5 ?#", "settings"]);

        assert_eq!(
            url.as_str(),
            "https://pricing.example.com/api/facilities/f1%2F..%2Fadmin/unit-types/5x5%20%3F%23/settings"
        );
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let result = HttpPricingBackend::new("not a url", None, Duration::from_secs(5));

        assert!(matches!(result, Err(BackendError::Transport(_))));
    }
}
