//! Least-privilege access policy granted to a tenant user.

use serde::{Deserialize, Serialize};

const POLICY_VERSION: &str = "2012-10-17";

/// Actions a tenant may perform, and nothing else.
pub const TENANT_ACTIONS: [&str; 5] = [
    "s3:GetObject",
    "s3:PutObject",
    "s3:DeleteObject",
    "s3:ListBucket",
    "s3:GetBucketLocation",
];

/// IAM-style policy document, serialized in the PascalCase shape the storage
/// service expects.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<PolicyStatement>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub effect: String,
    pub action: Vec<String>,
    pub resource: Vec<String>,
}

impl PolicyDocument {
    /// Grant read-write access on `bucket_name` and its objects only.
    pub fn for_bucket(bucket_name: &str) -> Self {
        Self {
            version: POLICY_VERSION.into(),
            statement: vec![PolicyStatement {
                effect: "Allow".into(),
                action: TENANT_ACTIONS.iter().map(|a| a.to_string()).collect(),
                resource: vec![
                    format!("arn:aws:s3:::{}", bucket_name),
                    format!("arn:aws:s3:::{}/*", bucket_name),
                ],
            }],
        }
    }

    /// All resources named by any statement.
    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.statement
            .iter()
            .flat_map(|s| s.resource.iter().map(String::as_str))
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
