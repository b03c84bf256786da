// ==========================================
// Mock 后端定价服务 - 用于集成测试
// ==========================================
// 职责: 内存中响应拉取/发布/设置推送，记录调用，可注入失败与发布钩子
// ==========================================

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use facility_pricing_ops::backend::{
    BackendError, BackendResult, FacilityQuery, PricingBackend, PublishAllRequest,
    PublishIndividualRequest, RawFacilitiesResponse, RawRecord, UnitSettingsRequest,
};

/// 记录的后端调用
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    FetchFacilities,
    FetchLinkCandidates(String),
    PublishAll(Vec<String>),
    PublishIndividual { facility_id: String, ecri_ids: Vec<String> },
    UpdateSettings(UnitSettingsRequest),
}

type PublishHook = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub struct MockBackend {
    facilities: Mutex<RawFacilitiesResponse>,
    candidates: Mutex<HashMap<String, Vec<RawRecord>>>,
    fetch_failure: Mutex<Option<BackendError>>,
    publish_failure: Mutex<Option<BackendError>>,
    settings_failure: Mutex<Option<BackendError>>,
    publish_hook: Mutex<Option<PublishHook>>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockBackend {
    pub fn new(facilities: RawFacilitiesResponse) -> Self {
        Self {
            facilities: Mutex::new(facilities),
            ..Default::default()
        }
    }

    pub fn set_facilities(&self, facilities: RawFacilitiesResponse) {
        *self.facilities.lock().unwrap() = facilities;
    }

    pub fn set_candidates(&self, facility_id: &str, records: Vec<RawRecord>) {
        self.candidates
            .lock()
            .unwrap()
            .insert(facility_id.to_string(), records);
    }

    pub fn fail_fetch(&self, err: Option<BackendError>) {
        *self.fetch_failure.lock().unwrap() = err;
    }

    pub fn fail_publish(&self, err: Option<BackendError>) {
        *self.publish_failure.lock().unwrap() = err;
    }

    pub fn fail_settings(&self, err: Option<BackendError>) {
        *self.settings_failure.lock().unwrap() = err;
    }

    /// 发布调用进行中（请求已发出、响应未返回）时执行的钩子
    pub fn on_publish(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.publish_hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn publish_calls(&self) -> Vec<MockCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, MockCall::PublishAll(_) | MockCall::PublishIndividual { .. }))
            .collect()
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn run_publish(&self) -> BackendResult<()> {
        if let Some(hook) = self.publish_hook.lock().unwrap().as_ref() {
            hook();
        }
        match self.publish_failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PricingBackend for MockBackend {
    async fn fetch_facilities(&self, _query: &FacilityQuery) -> BackendResult<RawFacilitiesResponse> {
        self.record(MockCall::FetchFacilities);
        if let Some(err) = self.fetch_failure.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.facilities.lock().unwrap().clone())
    }

    async fn fetch_link_candidates(&self, facility_id: &str) -> BackendResult<Vec<RawRecord>> {
        self.record(MockCall::FetchLinkCandidates(facility_id.to_string()));
        self.candidates
            .lock()
            .unwrap()
            .get(facility_id)
            .cloned()
            .ok_or_else(|| BackendError::Status {
                status: 404,
                body: format!("facility {} not found", facility_id),
            })
    }

    async fn publish_all(&self, request: &PublishAllRequest) -> BackendResult<()> {
        self.record(MockCall::PublishAll(request.ecri_ids.clone()));
        self.run_publish()
    }

    async fn publish_individual(&self, request: &PublishIndividualRequest) -> BackendResult<()> {
        self.record(MockCall::PublishIndividual {
            facility_id: request.facility_id.clone(),
            ecri_ids: request.ecri_ids.clone(),
        });
        self.run_publish()
    }

    async fn update_unit_settings(&self, request: &UnitSettingsRequest) -> BackendResult<()> {
        self.record(MockCall::UpdateSettings(request.clone()));
        match self.settings_failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
