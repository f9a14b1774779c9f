//! Amazon Lightsail region lookups.
use aws_config::SdkConfig;
use aws_sdk_lightsail::{config::Region, types::Region as LightsailRegion, Client};

use super::service_error;
use crate::{
    ApiRequest, ApiResponse, ClientConfig, ClientFactory, Discovery, InvalidArgumentSnafu, Result,
    ServiceClient,
};

/// Looks up one region by name among all the regions Lightsail offers.
pub const GET_REGION: &str = "get-region";

pub const DEFAULT_REGION: &str = "us-east-2";

#[derive(Clone, Debug)]
pub struct Lightsail {
    sdk: SdkConfig,
}

impl Lightsail {
    pub fn new(sdk: SdkConfig) -> Self {
        Lightsail { sdk }
    }
}

impl ClientFactory for Lightsail {
    type Client = LightsailClient;

    fn service_name(&self) -> &str {
        "Lightsail"
    }

    fn discovery(&self) -> Discovery {
        Discovery::Static
    }

    fn operations(&self) -> &[&'static str] {
        &[GET_REGION]
    }

    fn connect(&self, config: &ClientConfig) -> LightsailClient {
        let mut builder = aws_sdk_lightsail::config::Builder::from(&self.sdk)
            .region(Region::new(config.region().to_owned()));
        if let Some(url) = config.endpoint_url() {
            builder = builder.endpoint_url(url);
        }
        LightsailClient {
            client: Client::from_conf(builder.build()),
        }
    }

    fn report(&self, identifier: &str, response: &ApiResponse) -> String {
        match response.primary_identifier() {
            Some(name) => format!("The region {name} is available."),
            None => format!("No region named {identifier} was found."),
        }
    }
}

pub struct LightsailClient {
    client: Client,
}

impl ServiceClient for LightsailClient {
    async fn call(&self, request: &ApiRequest) -> Result<ApiResponse> {
        match request.operation_name() {
            GET_REGION => self.get_region(request.str_param("id")?).await,
            operation => InvalidArgumentSnafu {
                reason: format!("Lightsail does not support the operation '{operation}'"),
            }
            .fail(),
        }
    }
}

impl LightsailClient {
    async fn get_region(&self, name: &str) -> Result<ApiResponse> {
        let out = self
            .client
            .get_regions()
            .include_availability_zones(false)
            .include_relational_database_availability_zones(false)
            .send()
            .await
            .map_err(service_error)?;
        let regions = out.regions();
        log::debug!("Lightsail returned {} regions", regions.len());
        Ok(ApiResponse::new(
            find_region(regions, name),
            regions_payload(regions),
        ))
    }
}

/// Returns the name of the region called `name`, if Lightsail listed it.
pub fn find_region(regions: &[LightsailRegion], name: &str) -> Option<String> {
    regions
        .iter()
        .filter_map(|r| r.name())
        .find(|n| n.as_str() == name)
        .map(|n| n.as_str().to_owned())
}

fn regions_payload(regions: &[LightsailRegion]) -> serde_json::Value {
    let regions = regions
        .iter()
        .map(|r| {
            serde_json::json!({
                "name": r.name().map(|n| n.as_str()),
                "displayName": r.display_name(),
                "continentCode": r.continent_code(),
                "description": r.description(),
            })
        })
        .collect::<Vec<_>>();
    serde_json::json!({ "regions": regions })
}

#[cfg(test)]
mod test {
    use aws_sdk_lightsail::types::RegionName;
    use pretty_assertions::assert_eq;

    use super::*;

    fn regions() -> Vec<LightsailRegion> {
        vec![
            LightsailRegion::builder()
                .name(RegionName::UsEast2)
                .display_name("Ohio")
                .continent_code("NA")
                .build(),
            LightsailRegion::builder()
                .name(RegionName::from("eu-west-1"))
                .display_name("Ireland")
                .build(),
            LightsailRegion::builder().display_name("Nameless").build(),
        ]
    }

    #[test]
    fn finds_region_by_exact_name() {
        assert_eq!(Some("eu-west-1".to_string()), find_region(&regions(), "eu-west-1"));
        assert_eq!(None, find_region(&regions(), "EU-WEST-1"));
        assert_eq!(None, find_region(&regions(), "ap-south-1"));
    }

    #[test]
    fn payload_lists_every_region() {
        let payload = regions_payload(&regions());
        assert_eq!(3, payload["regions"].as_array().map(Vec::len).unwrap_or_default());
        assert_eq!("Ohio", payload["regions"][0]["displayName"]);
        assert_eq!(serde_json::Value::Null, payload["regions"][2]["name"]);
    }

    #[tokio::test]
    async fn report_lines() {
        let sdk = SdkConfig::builder()
            .behavior_version(aws_config::BehaviorVersion::latest())
            .build();
        let factory = Lightsail::new(sdk);
        let found = ApiResponse::new(Some("us-east-2".into()), serde_json::Value::Null);
        let missing = ApiResponse::new(None, serde_json::Value::Null);
        assert_eq!(
            "The region us-east-2 is available.",
            factory.report("us-east-2", &found)
        );
        assert_eq!(
            "No region named mars-1 was found.",
            factory.report("mars-1", &missing)
        );
    }
}
