//! Queue access policy allowing a topic to deliver into a queue.

use pubsub_flow::{QueueArn, TopicArn};
use serde::{Deserialize, Serialize};

pub const POLICY_VERSION: &str = "2008-10-17";
pub const SEND_MESSAGE_ACTION: &str = "SQS:SendMessage";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub id: String,
    pub statement: Vec<PolicyStatement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub sid: String,
    pub effect: String,
    pub principal: Principal,
    pub action: String,
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    #[serde(rename = "AWS")]
    pub aws: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Condition {
    pub arn_equals: SourceArnCondition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceArnCondition {
    #[serde(rename = "aws:SourceArn")]
    pub source_arn: String,
}

impl PolicyDocument {
    /// A policy letting `topic` send to `queue`.
    ///
    /// `millis` makes the statement id unique per run.
    pub fn allow_topic(queue: &QueueArn, topic: &TopicArn, millis: i64) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            id: format!("{queue}/SQSDefaultPolicy"),
            statement: vec![PolicyStatement {
                sid: format!("Sid{millis}"),
                effect: "Allow".to_string(),
                principal: Principal {
                    aws: "*".to_string(),
                },
                action: SEND_MESSAGE_ACTION.to_string(),
                resource: queue.to_string(),
                condition: Some(Condition {
                    arn_equals: SourceArnCondition {
                        source_arn: topic.to_string(),
                    },
                }),
            }],
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Whether any statement lets `topic` send messages to `queue`.
    pub fn allows_source(&self, queue: &QueueArn, topic: &TopicArn) -> bool {
        self.statement
            .iter()
            .any(|statement| statement.allows_source(queue, topic))
    }
}

impl PolicyStatement {
    fn allows_source(&self, queue: &QueueArn, topic: &TopicArn) -> bool {
        let action_matches = self.action.eq_ignore_ascii_case(SEND_MESSAGE_ACTION)
            || self.action == "*"
            || self.action.eq_ignore_ascii_case("SQS:*");
        let source_matches = match &self.condition {
            Some(condition) => condition.arn_equals.source_arn == topic.as_str(),
            None => true,
        };

        self.effect == "Allow"
            && self.principal.aws == "*"
            && action_matches
            && self.resource == queue.as_str()
            && source_matches
    }
}
