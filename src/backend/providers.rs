//! Per-provider constructors. Each returns an [`ObjectBackend`] whose
//! location base matches the public URL scheme of that provider.

use object_store::memory::InMemory;

use crate::{
    backend::{ObjectBackend, Provider},
    BackendConfig, ConfigError,
};
#[cfg(any(feature = "s3", feature = "gcs", feature = "azure"))]
use crate::Credentials;

/// Builds an S3 (or S3-compatible) backend.
#[cfg(feature = "s3")]
pub fn s3(
    config: &BackendConfig,
) -> Result<ObjectBackend<object_store::aws::AmazonS3>, ConfigError> {
    use object_store::aws::AmazonS3Builder;

    config.validate()?;
    let Some(Credentials::S3 {
        access_key_id,
        secret_access_key,
        session_token,
    }) = &config.credentials
    else {
        return Err(ConfigError::CredentialsMismatch {
            provider: Provider::S3,
        });
    };

    let region = config.region.clone().unwrap_or_else(|| "us-east-1".to_owned());
    let mut builder = AmazonS3Builder::new()
        .with_bucket_name(&config.bucket)
        .with_region(&region)
        .with_access_key_id(access_key_id)
        .with_secret_access_key(secret_access_key);
    if let Some(token) = session_token {
        builder = builder.with_token(token);
    }
    if let Some(endpoint) = &config.endpoint {
        builder = builder
            .with_endpoint(endpoint)
            .with_allow_http(endpoint.starts_with("http://"));
    }

    let store = builder.build().map_err(|err| ConfigError::Provider {
        provider: Provider::S3,
        message: err.to_string(),
    })?;

    let base_url = match (&config.public_url, &config.endpoint) {
        (Some(public), _) => public.clone(),
        // Path-style addressing for custom endpoints.
        (None, Some(endpoint)) => {
            format!("{}/{}", endpoint.trim_end_matches('/'), config.bucket)
        }
        (None, None) => format!("https://{}.s3.{}.amazonaws.com", config.bucket, region),
    };
    Ok(ObjectBackend::new(store, Provider::S3, base_url))
}

/// Builds an S3 backend. Always fails: the `s3` feature is disabled.
#[cfg(not(feature = "s3"))]
pub fn s3(config: &BackendConfig) -> Result<ObjectBackend<InMemory>, ConfigError> {
    config.validate()?;
    Err(ConfigError::ProviderDisabled {
        provider: Provider::S3,
    })
}

/// Builds a Google Cloud Storage backend.
#[cfg(feature = "gcs")]
pub fn gcs(
    config: &BackendConfig,
) -> Result<ObjectBackend<object_store::gcp::GoogleCloudStorage>, ConfigError> {
    use object_store::gcp::GoogleCloudStorageBuilder;

    config.validate()?;
    let Some(Credentials::Gcs {
        service_account_key,
    }) = &config.credentials
    else {
        return Err(ConfigError::CredentialsMismatch {
            provider: Provider::Gcs,
        });
    };

    let store = GoogleCloudStorageBuilder::new()
        .with_bucket_name(&config.bucket)
        .with_service_account_key(service_account_key)
        .build()
        .map_err(|err| ConfigError::Provider {
            provider: Provider::Gcs,
            message: err.to_string(),
        })?;

    let base_url = config
        .public_url
        .clone()
        .unwrap_or_else(|| format!("https://storage.googleapis.com/{}", config.bucket));
    Ok(ObjectBackend::new(store, Provider::Gcs, base_url))
}

/// Builds a GCS backend. Always fails: the `gcs` feature is disabled.
#[cfg(not(feature = "gcs"))]
pub fn gcs(config: &BackendConfig) -> Result<ObjectBackend<InMemory>, ConfigError> {
    config.validate()?;
    Err(ConfigError::ProviderDisabled {
        provider: Provider::Gcs,
    })
}

/// Builds an Azure Blob Storage backend. The bucket names the container.
#[cfg(feature = "azure")]
pub fn azure(
    config: &BackendConfig,
) -> Result<ObjectBackend<object_store::azure::MicrosoftAzure>, ConfigError> {
    use object_store::azure::MicrosoftAzureBuilder;

    config.validate()?;
    let Some(Credentials::Azure {
        account,
        access_key,
    }) = &config.credentials
    else {
        return Err(ConfigError::CredentialsMismatch {
            provider: Provider::Azure,
        });
    };

    let store = MicrosoftAzureBuilder::new()
        .with_account(account)
        .with_access_key(access_key)
        .with_container_name(&config.bucket)
        .build()
        .map_err(|err| ConfigError::Provider {
            provider: Provider::Azure,
            message: err.to_string(),
        })?;

    let base_url = config.public_url.clone().unwrap_or_else(|| {
        format!("https://{account}.blob.core.windows.net/{}", config.bucket)
    });
    Ok(ObjectBackend::new(store, Provider::Azure, base_url))
}

/// Builds an Azure backend. Always fails: the `azure` feature is disabled.
#[cfg(not(feature = "azure"))]
pub fn azure(config: &BackendConfig) -> Result<ObjectBackend<InMemory>, ConfigError> {
    config.validate()?;
    Err(ConfigError::ProviderDisabled {
        provider: Provider::Azure,
    })
}

/// Builds a process-local backend that keeps objects in memory.
pub fn memory(config: &BackendConfig) -> ObjectBackend<InMemory> {
    let base_url = config
        .public_url
        .clone()
        .unwrap_or_else(|| format!("memory://{}", config.bucket));
    ObjectBackend::new(InMemory::new(), Provider::Memory, base_url)
}
