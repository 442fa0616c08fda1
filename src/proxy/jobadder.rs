use crate::config::{IntegrationConfig, IntegrationKind};
use crate::error::AppError;
use crate::oauth::OAuthManager;
use crate::proxy::params::{flexible_id, Limit, Offset, Query, ResourceId};
use crate::proxy::upstream::UpstreamClient;
use crate::proxy::{parse_request, reauth_message, to_json, ApiProxy, ListResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Proxy request, tagged by `endpoint`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "endpoint", rename_all = "camelCase")]
pub enum JobAdderRequest {
    Jobs {
        #[serde(default)]
        limit: Option<Limit>,
        #[serde(default)]
        offset: Option<Offset>,
        #[serde(default)]
        search: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Job { job_id: ResourceId },
    Candidates {
        #[serde(default)]
        limit: Option<Limit>,
        #[serde(default)]
        offset: Option<Offset>,
        #[serde(default)]
        search: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Candidate { candidate_id: ResourceId },
    #[serde(rename_all = "camelCase")]
    JobApplications {
        job_id: ResourceId,
        #[serde(default)]
        limit: Option<Limit>,
        #[serde(default)]
        offset: Option<Offset>,
    },
    #[serde(rename_all = "camelCase")]
    Application { application_id: ResourceId },
    Placements {
        #[serde(default)]
        limit: Option<Limit>,
        #[serde(default)]
        offset: Option<Offset>,
    },
    #[serde(rename_all = "camelCase")]
    Placement { placement_id: ResourceId },
}

// ---------------------------------------------------------------------------
// Upstream (JobAdder v2) shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    total_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Named {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPersonRef {
    #[serde(deserialize_with = "flexible_id")]
    candidate_id: String,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}

impl ApiPersonRef {
    fn full_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiJobRef {
    #[serde(deserialize_with = "flexible_id")]
    job_id: String,
    #[serde(default)]
    job_title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiJob {
    #[serde(deserialize_with = "flexible_id")]
    job_id: String,
    #[serde(default)]
    job_title: Option<String>,
    #[serde(default)]
    company: Option<Named>,
    #[serde(default)]
    location: Option<Named>,
    #[serde(default)]
    status: Option<Named>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCandidate {
    #[serde(deserialize_with = "flexible_id")]
    candidate_id: String,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    mobile: Option<String>,
    #[serde(default)]
    status: Option<Named>,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiApplication {
    #[serde(deserialize_with = "flexible_id")]
    application_id: String,
    candidate: ApiPersonRef,
    job: ApiJobRef,
    #[serde(default)]
    status: Option<Named>,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPlacement {
    #[serde(deserialize_with = "flexible_id")]
    placement_id: String,
    candidate: ApiPersonRef,
    job: ApiJobRef,
    #[serde(default)]
    status: Option<Named>,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
}

fn name_of(named: Option<Named>) -> Option<String> {
    named.and_then(|n| n.name)
}

// ---------------------------------------------------------------------------
// Local records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub title: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl From<ApiJob> for Job {
    fn from(job: ApiJob) -> Self {
        Self {
            id: job.job_id,
            title: job.job_title.unwrap_or_default(),
            company: name_of(job.company),
            location: name_of(job.location),
            status: name_of(job.status),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<String>,
}

impl From<ApiCandidate> for Candidate {
    fn from(candidate: ApiCandidate) -> Self {
        Self {
            id: candidate.candidate_id,
            first_name: candidate.first_name,
            last_name: candidate.last_name,
            email: candidate.email,
            // 没有座机时退回手机号
            phone: candidate.phone.or(candidate.mobile),
            status: name_of(candidate.status),
            created_at: candidate.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    pub candidate_id: String,
    pub candidate_name: String,
    pub job_id: String,
    pub job_title: Option<String>,
    pub status: Option<String>,
    pub applied_at: Option<String>,
}

impl From<ApiApplication> for Application {
    fn from(application: ApiApplication) -> Self {
        Self {
            id: application.application_id,
            candidate_name: application.candidate.full_name(),
            candidate_id: application.candidate.candidate_id,
            job_id: application.job.job_id,
            job_title: application.job.job_title,
            status: name_of(application.status),
            applied_at: application.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub id: String,
    pub candidate_id: String,
    pub candidate_name: String,
    pub job_id: String,
    pub job_title: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl From<ApiPlacement> for Placement {
    fn from(placement: ApiPlacement) -> Self {
        Self {
            id: placement.placement_id,
            candidate_name: placement.candidate.full_name(),
            candidate_id: placement.candidate.candidate_id,
            job_id: placement.job.job_id,
            job_title: placement.job.job_title,
            status: name_of(placement.status),
            start_date: placement.start_date,
            end_date: placement.end_date,
        }
    }
}

// ---------------------------------------------------------------------------
// Proxy
// ---------------------------------------------------------------------------

/// JobAdder REST API proxy
pub struct JobAdderProxy {
    oauth: Arc<OAuthManager>,
    upstream: UpstreamClient,
}

impl JobAdderProxy {
    pub fn new(
        oauth: Arc<OAuthManager>,
        config: &IntegrationConfig,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        Ok(Self {
            oauth,
            upstream: UpstreamClient::new(config.api_base_url(), timeout)?,
        })
    }

    /// Run an already validated request with `access_token`
    pub async fn execute(
        &self,
        access_token: &str,
        request: JobAdderRequest,
    ) -> Result<Value, AppError> {
        match request {
            JobAdderRequest::Jobs {
                limit,
                offset,
                search,
            } => {
                let path = format!("/jobs{}", list_query(limit, offset, search));
                self.list::<ApiJob, Job>(access_token, &path, limit, offset).await
            }
            JobAdderRequest::Job { job_id } => {
                self.single::<ApiJob, Job>(access_token, &format!("/jobs/{}", job_id))
                    .await
            }
            JobAdderRequest::Candidates {
                limit,
                offset,
                search,
            } => {
                let path = format!("/candidates{}", list_query(limit, offset, search));
                self.list::<ApiCandidate, Candidate>(access_token, &path, limit, offset)
                    .await
            }
            JobAdderRequest::Candidate { candidate_id } => {
                self.single::<ApiCandidate, Candidate>(
                    access_token,
                    &format!("/candidates/{}", candidate_id),
                )
                .await
            }
            JobAdderRequest::JobApplications {
                job_id,
                limit,
                offset,
            } => {
                let path = format!(
                    "/jobs/{}/applications{}",
                    job_id,
                    list_query(limit, offset, None)
                );
                self.list::<ApiApplication, Application>(access_token, &path, limit, offset)
                    .await
            }
            JobAdderRequest::Application { application_id } => {
                self.single::<ApiApplication, Application>(
                    access_token,
                    &format!("/applications/{}", application_id),
                )
                .await
            }
            JobAdderRequest::Placements { limit, offset } => {
                let path = format!("/placements{}", list_query(limit, offset, None));
                self.list::<ApiPlacement, Placement>(access_token, &path, limit, offset)
                    .await
            }
            JobAdderRequest::Placement { placement_id } => {
                self.single::<ApiPlacement, Placement>(
                    access_token,
                    &format!("/placements/{}", placement_id),
                )
                .await
            }
        }
    }

    async fn list<A, L>(
        &self,
        access_token: &str,
        path: &str,
        limit: Option<Limit>,
        offset: Option<Offset>,
    ) -> Result<Value, AppError>
    where
        A: serde::de::DeserializeOwned,
        L: From<A> + Serialize,
    {
        let page: ApiList<A> = self.upstream.get_json(access_token, path).await?;
        let items: Vec<L> = page.items.into_iter().map(L::from).collect();

        to_json(&ListResponse {
            total: page.total_count.unwrap_or(items.len() as u64),
            items,
            limit: limit.map(Limit::get),
            offset: offset.map(Offset::get),
        })
    }

    async fn single<A, L>(&self, access_token: &str, path: &str) -> Result<Value, AppError>
    where
        A: serde::de::DeserializeOwned,
        L: From<A> + Serialize,
    {
        let record: A = self.upstream.get_json(access_token, path).await?;
        to_json(&L::from(record))
    }
}

fn list_query(limit: Option<Limit>, offset: Option<Offset>, search: Option<String>) -> String {
    Query::new()
        .push_opt("limit", limit.map(Limit::get))
        .push_opt("offset", offset.map(Offset::get))
        .push_opt("keywords", search.filter(|s| !s.trim().is_empty()))
        .finish()
}

#[async_trait]
impl ApiProxy for JobAdderProxy {
    fn integration(&self) -> IntegrationKind {
        IntegrationKind::JobAdder
    }

    async fn handle(&self, user_id: &str, body: Value) -> Result<Value, AppError> {
        let request: JobAdderRequest = parse_request(body)?;

        let access_token = self
            .oauth
            .get_valid_access_token(user_id)
            .await?
            .ok_or_else(|| AppError::AuthRequired(reauth_message(IntegrationKind::JobAdder)))?;

        self.execute(&access_token, request).await
    }
}
