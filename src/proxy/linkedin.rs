use crate::config::{IntegrationConfig, IntegrationKind};
use crate::error::AppError;
use crate::oauth::OAuthManager;
use crate::proxy::params::{flexible_id, urn_id, Limit, Offset, Query, ResourceId};
use crate::proxy::upstream::UpstreamClient;
use crate::proxy::{parse_request, reauth_message, to_json, ApiProxy, ListResponse};
use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const RESTLI_PROTOCOL_VERSION: &str = "2.0.0";
const ANALYTICS_FIELDS: &str =
    "impressions,clicks,costInLocalCurrency,externalWebsiteConversions,pivotValues";

/// Proxy request, tagged by `endpoint`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "endpoint", rename_all = "camelCase")]
pub enum LinkedInRequest {
    AdAccounts {
        #[serde(default)]
        limit: Option<Limit>,
        #[serde(default)]
        offset: Option<Offset>,
    },
    #[serde(rename_all = "camelCase")]
    CampaignGroups {
        account_id: ResourceId,
        #[serde(default)]
        limit: Option<Limit>,
        #[serde(default)]
        offset: Option<Offset>,
    },
    #[serde(rename_all = "camelCase")]
    Campaigns {
        account_id: ResourceId,
        #[serde(default)]
        limit: Option<Limit>,
        #[serde(default)]
        offset: Option<Offset>,
    },
    #[serde(rename_all = "camelCase")]
    Campaign {
        account_id: ResourceId,
        campaign_id: ResourceId,
    },
    #[serde(rename_all = "camelCase")]
    Creatives {
        account_id: ResourceId,
        #[serde(default)]
        campaign_id: Option<ResourceId>,
        #[serde(default)]
        limit: Option<Limit>,
        #[serde(default)]
        offset: Option<Offset>,
    },
    #[serde(rename_all = "camelCase")]
    Analytics {
        campaign_id: ResourceId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    },
}

impl LinkedInRequest {
    /// Cross-field checks serde cannot express
    pub fn validate(&self) -> Result<(), AppError> {
        if let Self::Analytics {
            start_date,
            end_date,
            ..
        } = self
        {
            if start_date > end_date {
                return Err(AppError::Validation(format!(
                    "startDate {} is after endDate {}",
                    start_date, end_date
                )));
            }
        }
        Ok(())
    }
}

// Upstream (LinkedIn Marketing API, Rest.li 2.0) shapes

#[derive(Debug, Deserialize)]
struct ApiCollection<T> {
    #[serde(default = "Vec::new")]
    elements: Vec<T>,
    #[serde(default)]
    paging: Option<ApiPaging>,
}

#[derive(Debug, Deserialize)]
struct ApiPaging {
    #[serde(default)]
    start: u32,
    #[serde(default)]
    count: u32,
    #[serde(default)]
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiAdAccount {
    #[serde(deserialize_with = "flexible_id")]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(rename = "type", default)]
    account_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiCampaignGroup {
    #[serde(deserialize_with = "flexible_id")]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    account: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMoney {
    amount: String,
    currency_code: String,
}

#[derive(Debug, Deserialize)]
struct ApiRunSchedule {
    #[serde(default)]
    start: Option<i64>,
    #[serde(default)]
    end: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCampaign {
    #[serde(deserialize_with = "flexible_id")]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(rename = "type", default)]
    campaign_type: Option<String>,
    #[serde(default)]
    account: Option<String>,
    #[serde(default)]
    campaign_group: Option<String>,
    #[serde(default)]
    objective_type: Option<String>,
    #[serde(default)]
    cost_type: Option<String>,
    #[serde(default)]
    daily_budget: Option<ApiMoney>,
    #[serde(default)]
    run_schedule: Option<ApiRunSchedule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCreative {
    #[serde(deserialize_with = "flexible_id")]
    id: String,
    #[serde(default)]
    campaign: Option<String>,
    #[serde(default)]
    intended_status: Option<String>,
    #[serde(default)]
    is_serving: Option<bool>,
    #[serde(default)]
    created_at: Option<i64>,
    #[serde(default)]
    last_modified_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiAnalytics {
    #[serde(default)]
    impressions: u64,
    #[serde(default)]
    clicks: u64,
    #[serde(default)]
    cost_in_local_currency: Option<String>,
    #[serde(default)]
    external_website_conversions: u64,
}

/// Epoch milliseconds to RFC 3339
fn millis_to_rfc3339(millis: i64) -> Option<String> {
    DateTime::from_timestamp_millis(millis).map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true))
}

// Local records

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdAccount {
    pub id: String,
    pub name: Option<String>,
    pub currency: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub account_type: Option<String>,
}

impl From<ApiAdAccount> for AdAccount {
    fn from(account: ApiAdAccount) -> Self {
        Self {
            id: urn_id(&account.id),
            name: account.name,
            currency: account.currency,
            status: account.status,
            account_type: account.account_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignGroup {
    pub id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub account_id: Option<String>,
}

impl From<ApiCampaignGroup> for CampaignGroup {
    fn from(group: ApiCampaignGroup) -> Self {
        Self {
            id: urn_id(&group.id),
            name: group.name,
            status: group.status,
            account_id: group.account.as_deref().map(urn_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Budget {
    pub amount: String,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub campaign_type: Option<String>,
    pub account_id: Option<String>,
    pub campaign_group_id: Option<String>,
    pub objective: Option<String>,
    pub cost_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_budget: Option<Budget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_at: Option<String>,
}

impl From<ApiCampaign> for Campaign {
    fn from(campaign: ApiCampaign) -> Self {
        let (start_at, end_at) = match campaign.run_schedule {
            Some(schedule) => (
                schedule.start.and_then(millis_to_rfc3339),
                schedule.end.and_then(millis_to_rfc3339),
            ),
            None => (None, None),
        };

        Self {
            id: urn_id(&campaign.id),
            name: campaign.name,
            status: campaign.status,
            campaign_type: campaign.campaign_type,
            account_id: campaign.account.as_deref().map(urn_id),
            campaign_group_id: campaign.campaign_group.as_deref().map(urn_id),
            objective: campaign.objective_type,
            cost_type: campaign.cost_type,
            daily_budget: campaign.daily_budget.map(|b| Budget {
                amount: b.amount,
                currency: b.currency_code,
            }),
            start_at,
            end_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Creative {
    pub id: String,
    pub campaign_id: Option<String>,
    pub status: Option<String>,
    pub serving: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl From<ApiCreative> for Creative {
    fn from(creative: ApiCreative) -> Self {
        Self {
            id: urn_id(&creative.id),
            campaign_id: creative.campaign.as_deref().map(urn_id),
            status: creative.intended_status,
            serving: creative.is_serving.unwrap_or(false),
            created_at: creative.created_at.and_then(millis_to_rfc3339),
            updated_at: creative.last_modified_at.and_then(millis_to_rfc3339),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignAnalytics {
    pub campaign_id: String,
    pub impressions: u64,
    pub clicks: u64,
    pub spend: f64,
    pub conversions: u64,
    pub ctr: f64,
}

impl CampaignAnalytics {
    /// Sum analytics rows into one total for the date range. A cost that
    /// is present but not a number fails the whole response.
    fn aggregate(campaign_id: &str, rows: Vec<ApiAnalytics>) -> Result<Self, AppError> {
        let mut totals = Self {
            campaign_id: campaign_id.to_string(),
            impressions: 0,
            clicks: 0,
            spend: 0.0,
            conversions: 0,
            ctr: 0.0,
        };

        for row in rows {
            totals.impressions += row.impressions;
            totals.clicks += row.clicks;
            totals.conversions += row.external_website_conversions;
            if let Some(cost) = row.cost_in_local_currency.as_deref() {
                totals.spend += cost.trim().parse::<f64>().map_err(|_| {
                    tracing::warn!(
                        campaign_id = %campaign_id,
                        cost = %cost,
                        "Unparseable costInLocalCurrency in analytics row"
                    );
                    AppError::Upstream {
                        status: StatusCode::BAD_GATEWAY,
                        message: format!(
                            "Unexpected upstream response: costInLocalCurrency '{}' is not a number",
                            cost
                        ),
                        retry_after: None,
                    }
                })?;
            }
        }

        if totals.impressions > 0 {
            totals.ctr = totals.clicks as f64 / totals.impressions as f64;
        }

        Ok(totals)
    }
}

/// LinkedIn Marketing API proxy
pub struct LinkedInProxy {
    oauth: Arc<OAuthManager>,
    upstream: UpstreamClient,
}

impl LinkedInProxy {
    pub fn new(
        oauth: Arc<OAuthManager>,
        config: &IntegrationConfig,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let upstream = UpstreamClient::new(config.api_base_url(), timeout)?
            .with_header("LinkedIn-Version", config.api_version())
            .with_header("X-Restli-Protocol-Version", RESTLI_PROTOCOL_VERSION);

        Ok(Self { oauth, upstream })
    }

    /// Run an already validated request with `access_token`
    pub async fn execute(
        &self,
        access_token: &str,
        request: LinkedInRequest,
    ) -> Result<Value, AppError> {
        request.validate()?;

        match request {
            LinkedInRequest::AdAccounts { limit, offset } => {
                let path = format!("/adAccounts{}", search_query(limit, offset));
                self.list::<ApiAdAccount, AdAccount>(access_token, &path, limit, offset)
                    .await
            }
            LinkedInRequest::CampaignGroups {
                account_id,
                limit,
                offset,
            } => {
                let path = format!(
                    "/adAccounts/{}/adCampaignGroups{}",
                    account_id,
                    search_query(limit, offset)
                );
                self.list::<ApiCampaignGroup, CampaignGroup>(access_token, &path, limit, offset)
                    .await
            }
            LinkedInRequest::Campaigns {
                account_id,
                limit,
                offset,
            } => {
                let path = format!(
                    "/adAccounts/{}/adCampaigns{}",
                    account_id,
                    search_query(limit, offset)
                );
                self.list::<ApiCampaign, Campaign>(access_token, &path, limit, offset)
                    .await
            }
            LinkedInRequest::Campaign {
                account_id,
                campaign_id,
            } => {
                let path = format!("/adAccounts/{}/adCampaigns/{}", account_id, campaign_id);
                let campaign: ApiCampaign = self.upstream.get_json(access_token, &path).await?;
                to_json(&Campaign::from(campaign))
            }
            LinkedInRequest::Creatives {
                account_id,
                campaign_id,
                limit,
                offset,
            } => {
                let mut query = Query::new().push("q", "criteria");
                if let Some(campaign_id) = &campaign_id {
                    query = query.push_raw("campaigns", &campaign_list(campaign_id));
                }
                let query = query
                    .push_opt("start", offset.map(Offset::get))
                    .push_opt("count", limit.map(Limit::get))
                    .finish();

                let path = format!("/adAccounts/{}/creatives{}", account_id, query);
                self.list::<ApiCreative, Creative>(access_token, &path, limit, offset)
                    .await
            }
            LinkedInRequest::Analytics {
                campaign_id,
                start_date,
                end_date,
            } => {
                let query = Query::new()
                    .push("q", "analytics")
                    .push("pivot", "CAMPAIGN")
                    .push("timeGranularity", "ALL")
                    .push_raw("dateRange", &date_range(start_date, end_date))
                    .push_raw("campaigns", &campaign_list(&campaign_id))
                    .push_raw("fields", ANALYTICS_FIELDS)
                    .finish();

                let rows: ApiCollection<ApiAnalytics> = self
                    .upstream
                    .get_json(access_token, &format!("/adAnalytics{}", query))
                    .await?;

                to_json(&CampaignAnalytics::aggregate(
                    campaign_id.as_str(),
                    rows.elements,
                )?)
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
        let page: ApiCollection<A> = self.upstream.get_json(access_token, path).await?;
        let items: Vec<L> = page.elements.into_iter().map(L::from).collect();
        let paging = page.paging;

        to_json(&ListResponse {
            total: paging
                .as_ref()
                .and_then(|p| p.total)
                .unwrap_or(items.len() as u64),
            limit: limit
                .map(Limit::get)
                .or_else(|| paging.as_ref().map(|p| p.count).filter(|c| *c > 0)),
            offset: offset
                .map(Offset::get)
                .or_else(|| paging.as_ref().map(|p| p.start)),
            items,
        })
    }
}

fn search_query(limit: Option<Limit>, offset: Option<Offset>) -> String {
    Query::new()
        .push("q", "search")
        .push_opt("start", offset.map(Offset::get))
        .push_opt("count", limit.map(Limit::get))
        .finish()
}

fn campaign_list(campaign_id: &ResourceId) -> String {
    format!("List(urn%3Ali%3AsponsoredCampaign%3A{})", campaign_id)
}

fn date_range(start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "(start:(year:{},month:{},day:{}),end:(year:{},month:{},day:{}))",
        start.year(),
        start.month(),
        start.day(),
        end.year(),
        end.month(),
        end.day()
    )
}

#[async_trait]
impl ApiProxy for LinkedInProxy {
    fn integration(&self) -> IntegrationKind {
        IntegrationKind::LinkedIn
    }

    async fn handle(&self, user_id: &str, body: Value) -> Result<Value, AppError> {
        let request: LinkedInRequest = parse_request(body)?;
        request.validate()?;

        let access_token = self
            .oauth
            .get_valid_access_token(user_id)
            .await?
            .ok_or_else(|| AppError::AuthRequired(reauth_message(IntegrationKind::LinkedIn)))?;

        self.execute(&access_token, request).await
    }
}
