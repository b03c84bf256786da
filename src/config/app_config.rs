// ==========================================
// 仓储定价运营系统 - 应用配置快照
// ==========================================
// 职责: 启动时一次性读取的配置值，供应用层组装后端与会话
// ==========================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::FacilityQuery;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// 后端定价服务根地址
    pub api_base_url: String,
    /// Bearer 令牌（快照序列化时不输出）
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
    pub request_timeout_secs: u64,
    /// 门店拉取分页大小
    pub page_size: u32,
    /// 未指定操作员时的默认值
    pub default_operator: String,
    /// 审计日志保留天数（0 表示不清理）
    pub audit_retention_days: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api".to_string(),
            api_token: None,
            request_timeout_secs: 30,
            page_size: 100,
            default_operator: "operator".to_string(),
            audit_retention_days: 90,
        }
    }
}

impl AppConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// 全组合拉取的默认查询条件
    pub fn facility_query(&self) -> FacilityQuery {
        FacilityQuery {
            page_size: self.page_size.max(1),
            ..FacilityQuery::default()
        }
    }
}
