//! ServerlessConfiguration payload types
//!
//! The Serverless component operator owns this CRD, so the operator never links
//! against its schema. Objects are written through the dynamic API using the
//! group/version/kind constants below; the spec struct only shapes the payload.

use kube::core::{ApiResource, GroupVersionKind};
use serde::{Deserialize, Serialize};

/// API group of ServerlessConfiguration
pub const SERVERLESS_GROUP: &str = "kyma.kyma-project.io";
/// API version of ServerlessConfiguration
pub const SERVERLESS_VERSION: &str = "v1alpha1";
/// Kind of ServerlessConfiguration
pub const SERVERLESS_KIND: &str = "ServerlessConfiguration";
/// Plural resource name of ServerlessConfiguration
pub const SERVERLESS_PLURAL: &str = "serverlessconfigurations";
/// Suffix appended to the Kyma name to form the ServerlessConfiguration name
pub const SERVERLESS_NAME_SUFFIX: &str = "-serverless";

/// Dynamic API resource for ServerlessConfiguration
pub fn serverless_api_resource() -> ApiResource {
    let gvk = GroupVersionKind::gvk(SERVERLESS_GROUP, SERVERLESS_VERSION, SERVERLESS_KIND);
    ApiResource::from_gvk_with_plural(&gvk, SERVERLESS_PLURAL)
}

/// Spec of a ServerlessConfiguration
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerlessConfigurationSpec {
    /// Prefix shared by serverless resources, taken from the Kyma seed
    pub common_prefix: String,
    /// Source repository for function code
    pub github_repository: GithubRepository,
}

/// Repository coordinates handed to the Serverless component
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GithubRepository {
    /// Repository auth key
    pub auth_key: String,
    /// Repository URL
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_resource_uses_explicit_plural() {
        let ar = serverless_api_resource();
        assert_eq!(ar.group, "kyma.kyma-project.io");
        assert_eq!(ar.version, "v1alpha1");
        assert_eq!(ar.api_version, "kyma.kyma-project.io/v1alpha1");
        assert_eq!(ar.kind, "ServerlessConfiguration");
        assert_eq!(ar.plural, "serverlessconfigurations");
    }

    #[test]
    fn spec_serializes_camel_case() {
        let spec = ServerlessConfigurationSpec {
            common_prefix: "alpha".to_string(),
            github_repository: GithubRepository {
                auth_key: "key".to_string(),
                url: "https://example.com/repo".to_string(),
            },
        };
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["commonPrefix"], "alpha");
        assert_eq!(value["githubRepository"]["authKey"], "key");
        assert_eq!(value["githubRepository"]["url"], "https://example.com/repo");
    }
}
