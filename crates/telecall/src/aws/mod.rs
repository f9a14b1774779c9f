//! Telecall for AWS.
//!
//! Each module here provides a [`ClientFactory`](crate::ClientFactory)
//! backed by the official SDK for one service.

use aws_config::{BehaviorVersion, Region};
use aws_smithy_types::error::{display::DisplayErrorContext, metadata::ProvideErrorMetadata};

pub use aws_config::SdkConfig;

pub mod dynamodb;
pub mod lightsail;
pub mod mediaconvert;

/// Loads the shared SDK configuration (credentials, retry and timeout
/// settings) from the environment, pinned to `region`.
pub async fn load_sdk_config(region: &str) -> SdkConfig {
    log::debug!("loading AWS configuration for {region}");
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_owned()))
        .load()
        .await
}

/// Maps an error from any of the service SDKs to
/// [`Error::Service`](crate::Error::Service), keeping the provider's message
/// verbatim. Every SDK re-exports these error traits from `aws-smithy-types`.
pub(crate) fn service_error<E>(err: E) -> crate::Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let code = err.code().map(str::to_owned);
    let message = match err.message() {
        Some(message) => message.to_owned(),
        None => DisplayErrorContext(&err).to_string(),
    };
    log::trace!("provider error {code:?}: {message}");
    crate::Error::Service { code, message }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn errors_from_every_sdk_map_to_service_errors() {
        let dynamodb = aws_sdk_dynamodb::operation::scan::ScanError::generic(
            aws_sdk_dynamodb::error::ErrorMetadata::builder()
                .code("ResourceNotFoundException")
                .message("Requested resource not found")
                .build(),
        );
        let lightsail = aws_sdk_lightsail::operation::get_regions::GetRegionsError::generic(
            aws_sdk_lightsail::error::ErrorMetadata::builder()
                .code("AccessDeniedException")
                .message("User is not authorized to perform: lightsail:GetRegions")
                .build(),
        );

        match service_error(dynamodb) {
            crate::Error::Service { code, message } => {
                assert_eq!(Some("ResourceNotFoundException".to_string()), code);
                assert_eq!("Requested resource not found", message);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(
            "User is not authorized to perform: lightsail:GetRegions",
            service_error(lightsail).to_string()
        );
    }

    #[test]
    fn missing_message_falls_back_to_the_error_context() {
        let err = aws_sdk_mediaconvert::operation::get_job::GetJobError::generic(
            aws_sdk_mediaconvert::error::ErrorMetadata::builder()
                .code("InternalServerErrorException")
                .build(),
        );
        match service_error(err) {
            crate::Error::Service { code, message } => {
                assert_eq!(Some("InternalServerErrorException".to_string()), code);
                assert!(!message.is_empty());
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
