//! Custom Resource Definitions for the Kyma operator
//!
//! `Kyma` is the primary resource. `IstioConfiguration` is a typed dependent;
//! `ServerlessConfiguration` is addressed dynamically by group/version/kind and
//! only its spec payload is modeled here.

mod istio_configuration;
mod kyma;
mod serverless_configuration;

pub use istio_configuration::{
    IstioConfiguration, IstioConfigurationSpec, ISTIO_SEED_SUFFIX,
};
pub use kyma::{Kyma, KymaSpec};
pub use serverless_configuration::{
    serverless_api_resource, GithubRepository, ServerlessConfigurationSpec, SERVERLESS_GROUP,
    SERVERLESS_KIND, SERVERLESS_NAME_SUFFIX, SERVERLESS_PLURAL, SERVERLESS_VERSION,
};
