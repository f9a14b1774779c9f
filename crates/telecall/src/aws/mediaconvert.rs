//! AWS Elemental MediaConvert job lookups.
//!
//! MediaConvert serves each account from its own endpoint, which has to be
//! discovered before any job can be read.
use aws_config::SdkConfig;
use aws_sdk_mediaconvert::{
    config::Region,
    types::{Endpoint, Job},
    Client,
};

use super::service_error;
use crate::{
    ApiRequest, ApiResponse, ClientConfig, ClientFactory, Discovery, InvalidArgumentSnafu, Result,
    ServiceClient, ServiceEndpoint,
};

/// Looks up a job by id.
pub const GET_JOB: &str = "get-job";

/// Region the MediaConvert lookups default to.
pub const DEFAULT_REGION: &str = "us-west-2";

#[derive(Clone, Debug)]
pub struct MediaConvert {
    sdk: SdkConfig,
}

impl MediaConvert {
    pub fn new(sdk: SdkConfig) -> Self {
        MediaConvert { sdk }
    }
}

impl ClientFactory for MediaConvert {
    type Client = MediaConvertClient;

    fn service_name(&self) -> &str {
        "MediaConvert"
    }

    fn discovery(&self) -> Discovery {
        Discovery::Dynamic
    }

    fn operations(&self) -> &[&'static str] {
        &[GET_JOB]
    }

    fn connect(&self, config: &ClientConfig) -> MediaConvertClient {
        let mut builder = aws_sdk_mediaconvert::config::Builder::from(&self.sdk)
            .region(Region::new(config.region().to_owned()));
        if let Some(url) = config.endpoint_url() {
            log::debug!("binding MediaConvert client to {url}");
            builder = builder.endpoint_url(url);
        }
        MediaConvertClient {
            client: Client::from_conf(builder.build()),
            region: config.region().to_owned(),
        }
    }

    fn report(&self, _identifier: &str, response: &ApiResponse) -> String {
        job_report(response)
    }
}

/// `The ARN of the job is <arn>.`
pub fn job_report(response: &ApiResponse) -> String {
    format!(
        "The ARN of the job is {}.",
        response.primary_identifier().unwrap_or("unknown")
    )
}

pub struct MediaConvertClient {
    client: Client,
    region: String,
}

impl ServiceClient for MediaConvertClient {
    #[allow(deprecated)]
    async fn describe_endpoints(&self, max_results: i32) -> Result<Vec<ServiceEndpoint>> {
        let out = self
            .client
            .describe_endpoints()
            .max_results(max_results)
            .send()
            .await
            .map_err(service_error)?;
        Ok(service_endpoints(out.endpoints(), &self.region))
    }

    async fn call(&self, request: &ApiRequest) -> Result<ApiResponse> {
        match request.operation_name() {
            GET_JOB => self.get_job(request.str_param("id")?).await,
            operation => InvalidArgumentSnafu {
                reason: format!("MediaConvert does not support the operation '{operation}'"),
            }
            .fail(),
        }
    }
}

impl MediaConvertClient {
    async fn get_job(&self, id: &str) -> Result<ApiResponse> {
        let out = self
            .client
            .get_job()
            .id(id)
            .send()
            .await
            .map_err(service_error)?;
        Ok(match out.job() {
            Some(job) => ApiResponse::new(job.arn().map(str::to_owned), job_payload(job)),
            None => ApiResponse::new(None, serde_json::Value::Null),
        })
    }
}

/// Converts discovered endpoints, in the order the provider listed them.
///
/// Endpoints without a URL are unusable and skipped.
pub fn service_endpoints(endpoints: &[Endpoint], region: &str) -> Vec<ServiceEndpoint> {
    endpoints
        .iter()
        .filter_map(|e| e.url())
        .map(|url| ServiceEndpoint {
            url: url.to_owned(),
            region: region.to_owned(),
        })
        .collect()
}

fn job_payload(job: &Job) -> serde_json::Value {
    let mut payload = serde_json::Map::new();
    let mut put = |key: &str, value: Option<serde_json::Value>| {
        if let Some(value) = value {
            payload.insert(key.to_owned(), value);
        }
    };
    put("arn", job.arn().map(Into::into));
    put("id", job.id().map(Into::into));
    put("status", job.status().map(|s| s.as_str().into()));
    put("queue", job.queue().map(Into::into));
    put("createdAt", job.created_at().map(|t| t.secs().into()));
    put("errorMessage", job.error_message().map(Into::into));
    serde_json::Value::Object(payload)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn endpoints_keep_provider_order_and_skip_missing_urls() {
        let endpoints = vec![
            Endpoint::builder().url("https://abc.mediaconvert.example").build(),
            Endpoint::builder().build(),
            Endpoint::builder().url("https://def.mediaconvert.example").build(),
        ];
        assert_eq!(
            vec![
                ServiceEndpoint {
                    url: "https://abc.mediaconvert.example".into(),
                    region: "us-west-2".into(),
                },
                ServiceEndpoint {
                    url: "https://def.mediaconvert.example".into(),
                    region: "us-west-2".into(),
                },
            ],
            service_endpoints(&endpoints, "us-west-2")
        );
    }

    #[test]
    fn report_without_arn() {
        let response = ApiResponse::new(None, serde_json::Value::Null);
        assert_eq!("The ARN of the job is unknown.", job_report(&response));
    }

    #[tokio::test]
    async fn factory_binds_discovered_endpoint() {
        let sdk = SdkConfig::builder()
            .behavior_version(aws_config::BehaviorVersion::latest())
            .build();
        let factory = MediaConvert::new(sdk);
        let config = ClientConfig::new(DEFAULT_REGION).with_endpoint(ServiceEndpoint {
            url: "https://abc.mediaconvert.example".into(),
            region: "eu-west-1".into(),
        });
        let client = factory.connect(&config);
        assert_eq!("eu-west-1", client.region);
        assert_eq!(Discovery::Dynamic, factory.discovery());
    }
}
